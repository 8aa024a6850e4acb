use common::Pod;
use futures::future::join_all;
use log::debug;

use crate::cycle_state::CycleState;
use crate::models::NodeInfo;
use crate::plugins::{
    Code, FilterPlugin, NodeScore, PreFilterPlugin, PreScorePlugin, ScorePlugin, Status,
};

/// Outcome of one scheduling attempt.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub pod_name: String,
    pub node_name: String,
    /// Normalized scores of every node that passed filtering.
    pub scores: Vec<NodeScore>,
}

/// Runs one scheduling attempt of `pod` against `nodes`.
///
/// Filter and Score are evaluated concurrently for all nodes against the same
/// cycle state. A failing PreFilter, PreScore or Score aborts the attempt; a
/// failing Filter only rules out that node. The highest normalized score
/// wins, ties going to the node name that sorts first.
pub async fn schedule_pod<P>(plugin: &P, pod: &Pod, nodes: &[NodeInfo]) -> Result<Assignment, Status>
where
    P: PreFilterPlugin + FilterPlugin + PreScorePlugin + ScorePlugin,
{
    let mut state = CycleState::new();

    let status = plugin.pre_filter(&mut state, pod, nodes).await;
    if !status.is_success() {
        return Err(status);
    }

    let statuses = join_all(nodes.iter().map(|n| plugin.filter(&state, pod, n))).await;
    let feasible: Vec<NodeInfo> = nodes
        .iter()
        .zip(statuses)
        .filter_map(|(node, status)| {
            if status.is_success() {
                Some(node.clone())
            } else {
                debug!(
                    "node {} filtered out for pod {}: {:?} {}",
                    node.name, pod.metadata.name, status.reasons, status.err
                );
                None
            }
        })
        .collect();
    if feasible.is_empty() {
        return Err(Status::new(
            Code::Unschedulable,
            vec![format!("0/{} nodes are available", nodes.len())],
        ));
    }

    let status = plugin.pre_score(&mut state, pod, &feasible).await;
    if !status.is_success() {
        return Err(status);
    }

    let results = join_all(feasible.iter().map(|n| plugin.score(&state, pod, n))).await;
    let mut scores = Vec::with_capacity(feasible.len());
    for (node, (score, status)) in feasible.iter().zip(results) {
        if !status.is_success() {
            return Err(status);
        }
        scores.push(NodeScore {
            name: node.name.clone(),
            score,
        });
    }

    if let Some(extension) = plugin.score_extension() {
        let status = extension.normalize_score(&state, pod, &mut scores);
        if !status.is_success() {
            return Err(status);
        }
    }

    let best = scores
        .iter()
        .max_by(|a, b| a.score.cmp(&b.score).then_with(|| b.name.cmp(&a.name)))
        .map(|s| s.name.clone())
        .unwrap_or_default();
    Ok(Assignment {
        pod_name: pod.metadata.name.clone(),
        node_name: best,
        scores,
    })
}
