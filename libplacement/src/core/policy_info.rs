use std::collections::HashSet;

use common::{Action, IntOrString, Pod};

use crate::core::target::compute_target;
use crate::error::{PlacementError, Result};

/// Returns the key a pod is tracked under: its uid, which is stable across
/// updates and unique across re-creations with the same name.
pub fn pod_key(pod: &Pod) -> Result<String> {
    if pod.metadata.uid.is_empty() {
        return Err(PlacementError::PodKey {
            namespace: pod.metadata.namespace.clone(),
            name: pod.metadata.name.clone(),
        });
    }
    Ok(pod.metadata.uid.clone())
}

/// Membership bookkeeping for one placement policy.
///
/// `managed_pods` is always a subset of `qualified_pods`, and `target_met`
/// always reflects the current set sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyInfo {
    pub namespace: String,
    pub name: String,
    action: Action,
    target_size: IntOrString,
    qualified_pods: HashSet<String>,
    managed_pods: HashSet<String>,
    target_met: bool,
}

impl PolicyInfo {
    pub fn new(namespace: &str, name: &str, action: Action, target_size: IntOrString) -> Self {
        // A malformed target is reported by the first add/remove instead.
        let target_met = compute_target(&target_size, 0, action)
            .map(|target| target <= 0)
            .unwrap_or(false);
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            action,
            target_size,
            qualified_pods: HashSet::new(),
            managed_pods: HashSet::new(),
            target_met,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn target_size(&self) -> &IntOrString {
        &self.target_size
    }

    /// Replaces the policy body and re-evaluates `target_met` against the
    /// current membership. On error nothing changes.
    pub fn set_spec(&mut self, action: Action, target_size: IntOrString) -> Result<()> {
        let target = compute_target(&target_size, self.qualified_pods.len(), action)?;
        self.action = action;
        self.target_size = target_size;
        self.target_met = self.managed_pods.len() as i64 >= target;
        Ok(())
    }

    pub fn qualified_pods(&self) -> &HashSet<String> {
        &self.qualified_pods
    }

    pub fn managed_pods(&self) -> &HashSet<String> {
        &self.managed_pods
    }

    pub fn target_met(&self) -> bool {
        self.target_met
    }

    pub fn is_empty(&self) -> bool {
        self.qualified_pods.is_empty()
    }

    pub fn pod_qualifies_for_policy(&self, key: &str) -> bool {
        self.qualified_pods.contains(key)
    }

    pub fn pod_is_managed_by_policy(&self, key: &str) -> bool {
        self.managed_pods.contains(key)
    }

    pub fn add_pod(&mut self, pod: &Pod) -> Result<()> {
        let key = pod_key(pod)?;
        self.add_pod_key(&key)
    }

    pub fn remove_pod(&mut self, pod: &Pod) -> Result<()> {
        let key = pod_key(pod)?;
        self.remove_pod_key(&key)
    }

    /// Registers a qualifying pod. The pod only becomes managed when the
    /// target is not already met once it has been counted as qualifying.
    pub fn add_pod_key(&mut self, key: &str) -> Result<()> {
        if self.pod_qualifies_for_policy(key) {
            return Ok(());
        }
        let target = self.target_for(self.qualified_pods.len() + 1)?;
        self.qualified_pods.insert(key.to_string());
        self.target_met = self.managed_pods.len() as i64 >= target;
        if self.target_met {
            return Ok(());
        }
        self.managed_pods.insert(key.to_string());
        self.set_target_met()
    }

    pub fn remove_pod_key(&mut self, key: &str) -> Result<()> {
        if !self.pod_qualifies_for_policy(key) {
            return Ok(());
        }
        self.target_for(self.qualified_pods.len() - 1)?;
        self.qualified_pods.remove(key);
        self.managed_pods.remove(key);
        self.set_target_met()
    }

    /// Overwrites `existing` with this info's spec, target state and
    /// membership, keeping `existing` as the stored object.
    pub fn merge(&self, existing: &mut PolicyInfo) {
        existing.namespace.clone_from(&self.namespace);
        existing.name.clone_from(&self.name);
        existing.action = self.action;
        existing.target_size = self.target_size.clone();
        existing.target_met = self.target_met;
        existing.qualified_pods = self.qualified_pods.clone();
        existing.managed_pods = self.managed_pods.clone();
    }

    fn target_for(&self, qualifying: usize) -> Result<i64> {
        compute_target(&self.target_size, qualifying, self.action)
    }

    fn set_target_met(&mut self) -> Result<()> {
        let target = self.target_for(self.qualified_pods.len())?;
        self.target_met = self.managed_pods.len() as i64 >= target;
        Ok(())
    }
}
