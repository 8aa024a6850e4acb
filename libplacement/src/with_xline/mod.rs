use std::sync::Arc;

use anyhow::Context;
use common::{PlacementPolicy, Pod};
use etcd_client::{Client, Event, EventType, WatchOptions, WatchResponse};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use tokio::{select, sync::RwLock, task::JoinHandle};

mod utils;

pub use utils::parse_policy_key;

use crate::{
    cache::Cache,
    config::XlineConfig,
    core::manager::PolicyManager,
    with_xline::utils::{decode, list_with_prefix},
};

/// Keeps `cache` in sync with the policies and pods stored in xline, and
/// feeds pod deletions to `manager`.
///
/// Existing objects are loaded before this returns; the watch then runs on a
/// spawned task whose handle is returned.
pub async fn run_placement_watcher_with_xline(
    config: &XlineConfig,
    cache: Arc<RwLock<Cache>>,
    manager: Arc<PolicyManager>,
) -> Result<JoinHandle<()>, anyhow::Error> {
    let endpoints: Vec<&str> = config.endpoints.iter().map(String::as_str).collect();
    let mut client = Client::connect(&endpoints, None)
        .await
        .with_context(|| format!("Failed to connect to xline at {endpoints:?}"))?;

    let policies: Vec<PlacementPolicy> = list_with_prefix(&mut client, &config.policy_prefix).await?;
    let pods: Vec<Pod> = list_with_prefix(&mut client, &config.pod_prefix).await?;
    info!(
        "loaded {} placement policies and {} pods from xline",
        policies.len(),
        pods.len()
    );
    {
        let mut guard = cache.write().await;
        for p in policies {
            if !guard.add_policy(p.clone()) {
                warn!("duplicate placement policy {}/{} in xline", p.namespace(), p.name());
            }
        }
        for p in pods {
            guard.update_pod(p);
        }
    }

    // Previous values tell policy edits from creations, and identify
    // deleted pods.
    let (policy_watcher, mut policy_stream) = client
        .watch(
            config.policy_prefix.clone(),
            Some(WatchOptions::new().with_prefix().with_prev_key()),
        )
        .await?;
    let (pod_watcher, mut pod_stream) = client
        .watch(
            config.pod_prefix.clone(),
            Some(WatchOptions::new().with_prefix().with_prev_key()),
        )
        .await?;

    let policy_prefix = config.policy_prefix.clone();
    let handle = tokio::spawn(async move {
        let _watchers = (policy_watcher, pod_watcher);
        loop {
            select! {
                msg = policy_stream.message() => {
                    let Some(resp) = next_response("placement policy", msg) else { break };
                    handle_policy_update(&cache, &policy_prefix, resp).await;
                }
                msg = pod_stream.message() => {
                    let Some(resp) = next_response("pod", msg) else { break };
                    handle_pod_update(&cache, &manager, resp).await;
                }
            }
        }
        warn!("placement policy watcher stopped");
    });
    Ok(handle)
}

async fn handle_policy_update(cache: &RwLock<Cache>, prefix: &str, resp: WatchResponse) {
    for e in resp.events() {
        let Some(kv) = e.kv() else { continue };
        match e.event_type() {
            EventType::Put => {
                let Some(policy) = decode_event::<PlacementPolicy>(e, false) else {
                    continue;
                };
                info!(
                    "placement policy {}/{} updated",
                    policy.namespace(),
                    policy.name()
                );
                let old = decode_event::<PlacementPolicy>(e, true);
                let mut guard = cache.write().await;
                match old {
                    Some(old) => guard.update_policy(&old, policy),
                    None => {
                        guard.upsert_policy(policy);
                    }
                }
            }
            EventType::Delete => {
                let key = String::from_utf8_lossy(kv.key());
                match parse_policy_key(&key, prefix) {
                    Some((namespace, name)) => {
                        info!("placement policy {namespace}/{name} deleted");
                        cache.write().await.delete_policy(&namespace, &name);
                    }
                    None => warn!("unexpected placement policy key {key}"),
                }
            }
        }
    }
}

async fn handle_pod_update(cache: &RwLock<Cache>, manager: &PolicyManager, resp: WatchResponse) {
    for e in resp.events() {
        match e.event_type() {
            EventType::Put => {
                if let Some(pod) = decode_event::<Pod>(e, false) {
                    cache.write().await.update_pod(pod);
                }
            }
            EventType::Delete => {
                let Some(pod) = decode_event::<Pod>(e, true) else {
                    continue;
                };
                cache
                    .write()
                    .await
                    .remove_pod(&pod.metadata.namespace, &pod.metadata.name);
                if let Err(err) = manager.remove_pod(&pod).await {
                    error!(
                        "failed to remove pod {}/{} from placement policies: {err}",
                        pod.metadata.namespace, pod.metadata.name
                    );
                }
            }
        }
    }
}

/// Unwraps one watch message. `None` means the stream is finished: it was
/// closed, or it failed and will not recover without a new watch.
fn next_response(
    kind: &str,
    msg: Result<Option<WatchResponse>, etcd_client::Error>,
) -> Option<WatchResponse> {
    match msg {
        Ok(Some(resp)) => Some(resp),
        Ok(None) => {
            warn!("{kind} watch stream closed");
            None
        }
        Err(e) => {
            error!("{kind} watch failed: {e:?}");
            None
        }
    }
}

fn decode_event<T: DeserializeOwned>(e: &Event, prev: bool) -> Option<T> {
    let kv = if prev { e.prev_kv() } else { e.kv() }?;
    match decode::<T>(kv) {
        Ok(v) => Some(v),
        Err(err) => {
            warn!(
                "skipping undecodable value at {}: {err:?}",
                String::from_utf8_lossy(kv.key())
            );
            None
        }
    }
}
