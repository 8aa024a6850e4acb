use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{PlacementPolicy, Pod};
use log::{debug, info};

use crate::core::labels::has_matching_labels;
use crate::core::policy_info::{PolicyInfo, pod_key};
use crate::core::registry::PolicyInfos;
use crate::error::Result;

/// Read access to the placement policies known to the cluster.
#[async_trait]
pub trait PolicyLister: Send + Sync {
    async fn list_policies(&self, namespace: &str) -> anyhow::Result<Vec<PlacementPolicy>>;

    async fn get_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<PlacementPolicy>>;
}

/// Read access to the pods known to the cluster.
#[async_trait]
pub trait PodLister: Send + Sync {
    /// Lists pods in every namespace whose labels include `selector`.
    async fn list_pods(&self, selector: &HashMap<String, String>) -> anyhow::Result<Vec<Pod>>;
}

/// Picks the policy whose pod selector matches `pod_labels`.
///
/// Higher weight wins; equal weights fall back to the policy name, ascending.
pub fn select_policy(
    policies: Vec<PlacementPolicy>,
    pod_labels: &HashMap<String, String>,
) -> Option<PlacementPolicy> {
    policies
        .into_iter()
        .filter(|pp| has_matching_labels(pod_labels, &pp.spec.pod_selector.match_labels))
        .min_by(|a, b| {
            (Reverse(a.spec.weight), a.name()).cmp(&(Reverse(b.spec.weight), b.name()))
        })
}

pub struct PolicyManager {
    policy_lister: Arc<dyn PolicyLister>,
    pod_lister: Arc<dyn PodLister>,
    policy_infos: PolicyInfos,
}

impl PolicyManager {
    pub fn new(policy_lister: Arc<dyn PolicyLister>, pod_lister: Arc<dyn PodLister>) -> Self {
        Self {
            policy_lister,
            pod_lister,
            policy_infos: PolicyInfos::new(),
        }
    }

    pub fn policy_infos(&self) -> &PolicyInfos {
        &self.policy_infos
    }

    /// Returns the placement policy that applies to `pod`, if any.
    pub async fn get_placement_policy_for_pod(&self, pod: &Pod) -> Result<Option<PlacementPolicy>> {
        let policies = self
            .policy_lister
            .list_policies(&pod.metadata.namespace)
            .await?;
        let selected = select_policy(policies, &pod.metadata.labels);
        match &selected {
            Some(pp) => debug!(
                "pod {}/{} matched placement policy {} (weight {})",
                pod.metadata.namespace,
                pod.metadata.name,
                pp.name(),
                pp.spec.weight
            ),
            None => debug!(
                "no placement policy for pod {}/{}",
                pod.metadata.namespace, pod.metadata.name
            ),
        }
        Ok(selected)
    }

    /// Fetches the current version of a policy from the lister.
    pub async fn get_policy(&self, namespace: &str, name: &str) -> Result<Option<PlacementPolicy>> {
        Ok(self.policy_lister.get_policy(namespace, name).await?)
    }

    /// Returns a snapshot of the bookkeeping for `policy`, creating it if
    /// needed. The snapshot carries the policy's current action and target,
    /// with `target_met` evaluated against them.
    pub async fn get_policy_info(&self, policy: &PlacementPolicy) -> Result<PolicyInfo> {
        let body = &policy.spec.policy;
        let mut info = self
            .policy_infos
            .get_or_create(policy.namespace(), policy.name(), body.action, &body.target_size)
            .await;
        info.set_spec(body.action, body.target_size.clone())?;
        Ok(info)
    }

    /// Counts `pod` toward the policy described by `policy_info` and returns
    /// the stored result. The action and target of `policy_info` replace the
    /// stored ones.
    pub async fn add_pod(&self, pod: &Pod, policy_info: &PolicyInfo) -> Result<PolicyInfo> {
        let key = pod_key(pod)?;
        let seed = || {
            Some(PolicyInfo::new(
                &policy_info.namespace,
                &policy_info.name,
                policy_info.action(),
                policy_info.target_size().clone(),
            ))
        };
        let updated = self
            .policy_infos
            .modify(&policy_info.namespace, &policy_info.name, seed, |info| {
                info.set_spec(policy_info.action(), policy_info.target_size().clone())?;
                info.add_pod_key(&key)
            })
            .await?;
        // The seed always yields an entry.
        let updated = updated.unwrap_or_else(|| policy_info.clone());
        info!(
            "pod {}/{} added to placement policy {}: managed={} target_met={} ({}/{} managed)",
            pod.metadata.namespace,
            pod.metadata.name,
            updated.name,
            updated.pod_is_managed_by_policy(&key),
            updated.target_met(),
            updated.managed_pods().len(),
            updated.qualified_pods().len(),
        );
        Ok(updated)
    }

    /// Drops `pod` from whichever policy in its namespace tracks it.
    pub async fn remove_pod(&self, pod: &Pod) -> Result<()> {
        let key = pod_key(pod)?;
        let namespace = &pod.metadata.namespace;
        let infos = self.policy_infos.list_by_namespace(namespace).await;
        let Some(name) = infos
            .into_iter()
            .find(|(_, info)| info.pod_qualifies_for_policy(&key))
            .map(|(name, _)| name)
        else {
            return Ok(());
        };
        let updated = self
            .policy_infos
            .modify(namespace, &name, || None, |info| info.remove_pod_key(&key))
            .await?;
        if let Some(info) = updated {
            info!(
                "pod {}/{} removed from placement policy {}: target_met={} ({}/{} managed)",
                namespace,
                pod.metadata.name,
                name,
                info.target_met(),
                info.managed_pods().len(),
                info.qualified_pods().len(),
            );
        }
        Ok(())
    }

    pub async fn get_pods_with_labels(&self, selector: &HashMap<String, String>) -> Result<Vec<Pod>> {
        Ok(self.pod_lister.list_pods(selector).await?)
    }
}
