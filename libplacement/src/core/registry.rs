use std::collections::HashMap;

use common::{Action, IntOrString};
use tokio::sync::RwLock;

use crate::core::policy_info::PolicyInfo;
use crate::error::Result;

type Infos = HashMap<String, HashMap<String, PolicyInfo>>;

/// Registry of [`PolicyInfo`] keyed by namespace, then policy name.
///
/// An entry is created on the first pod associated with a policy and dropped
/// once its last qualifying pod is removed. Callers only ever receive
/// snapshots; all mutation goes through the registry's write lock.
#[derive(Default)]
pub struct PolicyInfos {
    infos: RwLock<Infos>,
}

impl PolicyInfos {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(
        &self,
        namespace: &str,
        name: &str,
        action: Action,
        target_size: &IntOrString,
    ) -> PolicyInfo {
        if let Some(info) = self.get(namespace, name).await {
            return info;
        }
        let mut infos = self.infos.write().await;
        // Another task may have created it between the two locks.
        infos
            .entry(namespace.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| PolicyInfo::new(namespace, name, action, target_size.clone()))
            .clone()
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Option<PolicyInfo> {
        let infos = self.infos.read().await;
        infos.get(namespace).and_then(|ns| ns.get(name)).cloned()
    }

    /// Merges `incoming` into the stored entry, creating it if needed, and
    /// returns the stored result.
    pub async fn update(&self, namespace: &str, name: &str, incoming: PolicyInfo) -> PolicyInfo {
        let mut infos = self.infos.write().await;
        store(&mut infos, namespace, name, incoming)
    }

    pub async fn remove(&self, namespace: &str, name: &str) -> Option<PolicyInfo> {
        let mut infos = self.infos.write().await;
        evict(&mut infos, namespace, name)
    }

    pub async fn list_by_namespace(&self, namespace: &str) -> HashMap<String, PolicyInfo> {
        let infos = self.infos.read().await;
        infos.get(namespace).cloned().unwrap_or_default()
    }

    pub async fn namespaces(&self) -> Vec<String> {
        let infos = self.infos.read().await;
        infos.keys().cloned().collect()
    }

    /// Applies `f` to a copy of the stored entry (or to `seed()` when there is
    /// none) and writes the result back with [`PolicyInfos::update`]
    /// semantics, all under one write lock. An entry left without qualifying
    /// pods is removed. On error the stored entry is untouched.
    ///
    /// Returns `Ok(None)` when there is no entry and `seed` yields none.
    pub(crate) async fn modify<S, F>(
        &self,
        namespace: &str,
        name: &str,
        seed: S,
        f: F,
    ) -> Result<Option<PolicyInfo>>
    where
        S: FnOnce() -> Option<PolicyInfo>,
        F: FnOnce(&mut PolicyInfo) -> Result<()>,
    {
        let mut infos = self.infos.write().await;
        let existing = infos.get(namespace).and_then(|ns| ns.get(name)).cloned();
        let Some(mut incoming) = existing.or_else(seed) else {
            return Ok(None);
        };
        f(&mut incoming)?;
        if incoming.is_empty() {
            evict(&mut infos, namespace, name);
            return Ok(Some(incoming));
        }
        Ok(Some(store(&mut infos, namespace, name, incoming)))
    }
}

fn store(infos: &mut Infos, namespace: &str, name: &str, incoming: PolicyInfo) -> PolicyInfo {
    let ns = infos.entry(namespace.to_string()).or_default();
    match ns.get_mut(name) {
        Some(existing) => {
            incoming.merge(existing);
            existing.clone()
        }
        None => {
            ns.insert(name.to_string(), incoming.clone());
            incoming
        }
    }
}

fn evict(infos: &mut Infos, namespace: &str, name: &str) -> Option<PolicyInfo> {
    let ns = infos.get_mut(namespace)?;
    let removed = ns.remove(name);
    if ns.is_empty() {
        infos.remove(namespace);
    }
    removed
}
