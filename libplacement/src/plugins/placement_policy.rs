use std::sync::Arc;

use async_trait::async_trait;
use common::{EnforcementMode, PlacementPolicy, Pod};
use log::{debug, trace, warn};

use crate::{
    core::{
        labels::has_matching_labels,
        manager::PolicyManager,
        policy_info::{PolicyInfo, pod_key},
    },
    cycle_state::CycleState,
    models::NodeInfo,
    plugins::{
        Code, FilterPlugin, MAX_NODE_SCORE, MIN_NODE_SCORE, NodeScore, Plugin, PreFilterPlugin,
        PreScorePlugin, ScoreExtension, ScorePlugin, Status,
    },
};

pub const NAME: &str = "PlacementPolicy";

const POD_STATE_KEY: &str = "PlacementPolicyPodState";

const ERR_REASON_MANAGED: &str =
    "node(s) didn't match the node selector of the pod's placement policy";
const ERR_REASON_UNMANAGED: &str =
    "node(s) matched the node selector of the pod's placement policy, whose target is already met";

/// Schedules pods according to the placement policy they fall under.
///
/// Strict policies commit the pod's membership at PreFilter and filter out
/// nodes that disagree with it. Best-effort policies never filter; their
/// membership is committed at PreScore and only biases scoring.
pub struct PlacementPolicyPlugin {
    manager: Arc<PolicyManager>,
}

impl PlacementPolicyPlugin {
    pub fn new(manager: Arc<PolicyManager>) -> Self {
        Self { manager }
    }
}

/// How far the pod got through membership registration in this cycle.
#[derive(Clone, Debug)]
enum PodState {
    NoPolicy,
    /// Best-effort policy chosen, membership not committed yet.
    Matched(PolicyDecision),
    /// Membership committed; `info` is the post-commit snapshot.
    Added(PolicyDecision),
}

#[derive(Clone, Debug)]
struct PolicyDecision {
    policy: PlacementPolicy,
    info: PolicyInfo,
    pod_key: String,
}

impl PolicyDecision {
    fn node_matches(&self, node: &NodeInfo) -> bool {
        has_matching_labels(&node.labels, &self.policy.spec.node_selector.match_labels)
    }

    fn pod_managed(&self) -> bool {
        self.info.pod_is_managed_by_policy(&self.pod_key)
    }

    /// Managed pods belong on matching nodes, the rest on non-matching ones.
    fn node_agrees(&self, node: &NodeInfo) -> bool {
        self.node_matches(node) == self.pod_managed()
    }
}

fn get_pod_state(state: &CycleState) -> Result<&PodState, Status> {
    state.read::<PodState>(POD_STATE_KEY).ok_or_else(|| {
        Status::error(&format!("{NAME}: reading {POD_STATE_KEY:?} from cycle state")).with_plugin(NAME)
    })
}

fn error_status(msg: String) -> Status {
    Status::error(&msg).with_plugin(NAME)
}

impl Plugin for PlacementPolicyPlugin {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl PreFilterPlugin for PlacementPolicyPlugin {
    async fn pre_filter(&self, state: &mut CycleState, pod: &Pod, _nodes: &[NodeInfo]) -> Status {
        let policy = match self.manager.get_placement_policy_for_pod(pod).await {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                state.write(POD_STATE_KEY, PodState::NoPolicy);
                return Status::default();
            }
            Err(e) => {
                return error_status(format!(
                    "failed to get placement policy for pod {}: {e}",
                    pod.metadata.name
                ));
            }
        };
        let key = match pod_key(pod) {
            Ok(key) => key,
            Err(e) => return error_status(e.to_string()),
        };
        let info = match self.manager.get_policy_info(&policy).await {
            Ok(info) => info,
            Err(e) => {
                return error_status(format!(
                    "failed to get policy info of {}/{}: {e}",
                    policy.namespace(),
                    policy.name()
                ));
            }
        };

        let pod_state = match policy.spec.enforcement_mode {
            EnforcementMode::BestEffort => PodState::Matched(PolicyDecision {
                policy,
                info,
                pod_key: key,
            }),
            EnforcementMode::Strict => {
                let info = match self.manager.add_pod(pod, &info).await {
                    Ok(info) => info,
                    Err(e) => {
                        return error_status(format!(
                            "failed to add pod {} to placement policy {}: {e}",
                            pod.metadata.name,
                            policy.name()
                        ));
                    }
                };
                PodState::Added(PolicyDecision {
                    policy,
                    info,
                    pod_key: key,
                })
            }
        };
        state.write(POD_STATE_KEY, pod_state);
        Status::default()
    }
}

#[async_trait]
impl FilterPlugin for PlacementPolicyPlugin {
    async fn filter(&self, state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status {
        let decision = match get_pod_state(state) {
            Ok(PodState::Added(decision)) => decision,
            // Best-effort policies never filter.
            Ok(PodState::NoPolicy | PodState::Matched(_)) => return Status::default(),
            Err(status) => return status,
        };
        if decision.node_agrees(node_info) {
            trace!(
                "pod {} fits node {} under placement policy {}",
                pod.metadata.name,
                node_info.name,
                decision.policy.name()
            );
            return Status::default();
        }
        let reason = if decision.pod_managed() {
            ERR_REASON_MANAGED
        } else {
            ERR_REASON_UNMANAGED
        };
        Status::new(Code::Unschedulable, vec![reason.to_string()]).with_plugin(NAME)
    }
}

#[async_trait]
impl PreScorePlugin for PlacementPolicyPlugin {
    async fn pre_score(&self, state: &mut CycleState, pod: &Pod, _nodes: &[NodeInfo]) -> Status {
        let decision = match get_pod_state(state) {
            Ok(PodState::Matched(decision)) => decision.clone(),
            Ok(PodState::NoPolicy | PodState::Added(_)) => return Status::default(),
            Err(status) => return status,
        };

        // Pick up edits made to the policy since PreFilter.
        let namespace = decision.policy.namespace();
        let name = decision.policy.name();
        let latest = match self.manager.get_policy(namespace, name).await {
            Ok(latest) => latest.filter(|pp| {
                has_matching_labels(&pod.metadata.labels, &pp.spec.pod_selector.match_labels)
            }),
            Err(e) => {
                return error_status(format!(
                    "failed to get placement policy {namespace}/{name}: {e}"
                ));
            }
        };
        let Some(policy) = latest else {
            warn!(
                "placement policy {namespace}/{name} no longer applies to pod {}",
                pod.metadata.name
            );
            state.write(POD_STATE_KEY, PodState::NoPolicy);
            return Status::default();
        };

        let info = match self.manager.get_policy_info(&policy).await {
            Ok(info) => info,
            Err(e) => {
                return error_status(format!(
                    "failed to get policy info of {namespace}/{name}: {e}"
                ));
            }
        };
        let info = match self.manager.add_pod(pod, &info).await {
            Ok(info) => info,
            Err(e) => {
                return error_status(format!(
                    "failed to add pod {} to placement policy {name}: {e}",
                    pod.metadata.name
                ));
            }
        };
        state.write(
            POD_STATE_KEY,
            PodState::Added(PolicyDecision {
                policy,
                info,
                pod_key: decision.pod_key,
            }),
        );
        Status::default()
    }
}

#[async_trait]
impl ScorePlugin for PlacementPolicyPlugin {
    async fn score(&self, state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> (i64, Status) {
        let decision = match get_pod_state(state) {
            Ok(PodState::Added(decision)) => decision,
            Ok(PodState::NoPolicy) => return (0, Status::default()),
            Ok(PodState::Matched(_)) => {
                return (
                    0,
                    error_status(format!(
                        "membership of pod {} was not committed before scoring",
                        pod.metadata.name
                    )),
                );
            }
            Err(status) => return (0, status),
        };
        let score = if decision.node_agrees(node_info) {
            MAX_NODE_SCORE
        } else {
            MIN_NODE_SCORE
        };
        trace!(
            "pod {} scored {score} on node {} (policy {}, managed {})",
            pod.metadata.name,
            node_info.name,
            decision.policy.name(),
            decision.pod_managed()
        );
        (score, Status::default())
    }

    fn score_extension(&self) -> Option<&dyn ScoreExtension> {
        Some(self)
    }
}

impl ScoreExtension for PlacementPolicyPlugin {
    /// Min-max rescales the scores onto `[MIN_NODE_SCORE, MAX_NODE_SCORE]`.
    /// Equal scores all become `MIN_NODE_SCORE`.
    fn normalize_score(&self, _: &CycleState, pod: &Pod, scores: &mut [NodeScore]) -> Status {
        let (Some(highest), Some(lowest)) = (
            scores.iter().map(|s| s.score).max(),
            scores.iter().map(|s| s.score).min(),
        ) else {
            return Status::default();
        };
        let old_range = highest - lowest;
        let new_range = MAX_NODE_SCORE - MIN_NODE_SCORE;
        for node_score in scores.iter_mut() {
            node_score.score = if old_range == 0 {
                MIN_NODE_SCORE
            } else {
                (node_score.score - lowest) * new_range / old_range + MIN_NODE_SCORE
            };
        }
        debug!("normalized scores for pod {}: {:?}", pod.metadata.name, scores);
        Status::default()
    }
}
