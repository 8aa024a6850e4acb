use std::collections::HashMap;

use async_trait::async_trait;
use common::{PlacementPolicy, Pod};
use tokio::sync::RwLock;

use crate::core::labels::has_matching_labels;
use crate::core::manager::{PodLister, PolicyLister};

/// A shortcut of the placement policies and pods in the cluster.
///
/// Keep it fed from the object store (see [`crate::with_xline`]); the
/// scheduler only ever reads it through the lister traits.
#[derive(Default)]
pub struct Cache {
    /// namespace -> name -> policy
    policies: HashMap<String, HashMap<String, PlacementPolicy>>,
    /// "namespace/name" -> pod
    pods: HashMap<String, Pod>,
}

fn pod_cache_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a policy unless one with the same namespace and name is cached.
    pub fn add_policy(&mut self, policy: PlacementPolicy) -> bool {
        let ns = self
            .policies
            .entry(policy.namespace().to_string())
            .or_default();
        if ns.contains_key(policy.name()) {
            return false;
        }
        ns.insert(policy.name().to_string(), policy);
        true
    }

    /// Adds or replaces a policy.
    pub fn upsert_policy(&mut self, policy: PlacementPolicy) -> Option<PlacementPolicy> {
        self.policies
            .entry(policy.namespace().to_string())
            .or_default()
            .insert(policy.name().to_string(), policy)
    }

    /// Replaces `old` with `new`, dropping `old` when the policy was renamed.
    pub fn update_policy(&mut self, old: &PlacementPolicy, new: PlacementPolicy) {
        if old.namespace() != new.namespace() || old.name() != new.name() {
            self.delete_policy(old.namespace(), old.name());
        }
        self.upsert_policy(new);
    }

    pub fn delete_policy(&mut self, namespace: &str, name: &str) -> Option<PlacementPolicy> {
        let ns = self.policies.get_mut(namespace)?;
        let removed = ns.remove(name);
        if ns.is_empty() {
            self.policies.remove(namespace);
        }
        removed
    }

    /// Policies of `namespace`, ordered by name.
    pub fn list_policies(&self, namespace: &str) -> Vec<PlacementPolicy> {
        let mut list: Vec<_> = self
            .policies
            .get(namespace)
            .map(|ns| ns.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    pub fn get_policy(&self, namespace: &str, name: &str) -> Option<PlacementPolicy> {
        self.policies
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .cloned()
    }

    pub fn update_pod(&mut self, pod: Pod) -> Option<Pod> {
        let key = pod_cache_key(&pod.metadata.namespace, &pod.metadata.name);
        self.pods.insert(key, pod)
    }

    pub fn remove_pod(&mut self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods.remove(&pod_cache_key(namespace, name))
    }

    pub fn get_pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods.get(&pod_cache_key(namespace, name)).cloned()
    }

    pub fn list_pods(&self, selector: &HashMap<String, String>) -> Vec<Pod> {
        self.pods
            .values()
            .filter(|p| has_matching_labels(&p.metadata.labels, selector))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PolicyLister for RwLock<Cache> {
    async fn list_policies(&self, namespace: &str) -> anyhow::Result<Vec<PlacementPolicy>> {
        Ok(self.read().await.list_policies(namespace))
    }

    async fn get_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<PlacementPolicy>> {
        Ok(self.read().await.get_policy(namespace, name))
    }
}

#[async_trait]
impl PodLister for RwLock<Cache> {
    async fn list_pods(&self, selector: &HashMap<String, String>) -> anyhow::Result<Vec<Pod>> {
        Ok(self.read().await.list_pods(selector))
    }
}
