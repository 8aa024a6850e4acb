//! Scheduler plugin extension points.
//!
//! The functionality of each extension point corresponds to its namesake in
//! Kubernetes. Some comments are also quoted from the Kubernetes codebase.

use async_trait::async_trait;
use common::Pod;

use crate::cycle_state::CycleState;
use crate::models::NodeInfo;

pub mod placement_policy;

/// Highest score a Score plugin may return after normalization.
pub const MAX_NODE_SCORE: i64 = 100;
/// Lowest score a Score plugin may return after normalization.
pub const MIN_NODE_SCORE: i64 = 0;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
}

#[async_trait]
pub trait PreFilterPlugin: Plugin {
    /// Executes at scheduling cycle start. All plugins must return success or pod is rejected.
    async fn pre_filter(&self, state: &mut CycleState, pod: &Pod, nodes: &[NodeInfo]) -> Status;
}

/// Evaluates if a node can run a pod. Returns Success, Unschedulable, or Error.
///
/// Invoked concurrently for every candidate node of the same pod, so it only
/// gets shared access to the cycle state.
#[async_trait]
pub trait FilterPlugin: Plugin {
    async fn filter(&self, state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status;
}

/// Informational plugin called after filtering phase with list of viable nodes
#[async_trait]
pub trait PreScorePlugin: Plugin {
    /// Executes with nodes that passed filtering. All must return success or pod is rejected.
    async fn pre_score(&self, state: &mut CycleState, pod: &Pod, nodes: &[NodeInfo]) -> Status;
}

/// Plugin that ranks nodes passing the filtering phase
#[async_trait]
pub trait ScorePlugin: Plugin {
    /// Assigns a score to a node (higher = better fit). Must return success.
    async fn score(&self, state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> (i64, Status);

    fn score_extension(&self) -> Option<&dyn ScoreExtension> {
        None
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeScore {
    pub name: String,
    pub score: i64,
}

pub trait ScoreExtension: Send + Sync {
    /// Rescales the raw scores of every node for `pod` in place.
    fn normalize_score(&self, state: &CycleState, pod: &Pod, scores: &mut [NodeScore]) -> Status;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub reasons: Vec<String>,
    pub err: String,
    pub plugin: String,
}

impl Default for Status {
    /// Default success status
    fn default() -> Self {
        Self {
            code: Code::Success,
            reasons: vec![],
            err: String::new(),
            plugin: String::new(),
        }
    }
}

impl Status {
    pub fn new(code: Code, reasons: Vec<String>) -> Self {
        Status {
            code,
            reasons,
            err: String::new(),
            plugin: String::new(),
        }
    }

    pub fn error(error: &str) -> Self {
        Self {
            code: Code::Error,
            err: error.to_string(),
            ..Default::default()
        }
    }

    pub fn with_plugin(mut self, plugin: &str) -> Self {
        self.plugin = plugin.to_string();
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}

/// Code is the Status code/type which is returned from plugins.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Code {
    /// Success means that plugin ran correctly and found pod schedulable.
    Success,
    /// Error is one of the failures, used for internal plugin errors, unexpected input, etc.
    /// Plugin shouldn't return this code for expected failures, like Unschedulable.
    /// Since it's the unexpected failure, the scheduling queue registers the pod without unschedulable plugins.
    /// Meaning, the Pod will be requeued to activeQ/backoffQ soon.
    Error,
    /// Unschedulable is one of the failures, used when a plugin finds a pod unschedulable.
    /// If it's returned from PreFilter or Filter, the scheduler might attempt to
    /// run other postFilter plugins like preemption to get this pod scheduled.
    Unschedulable,
}
