//! Needs a running xline (or etcd) at 127.0.0.1:2379:
//! `cargo test -p libplacement --test xline_test -- --ignored`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{
    Action, EnforcementMode, IntOrString, LabelSelector, ObjectMeta, PlacementPolicy,
    PlacementPolicySpec, Pod, Policy,
};
use etcd_client::{Client, DeleteOptions};
use libplacement::cache::Cache;
use libplacement::config::XlineConfig;
use libplacement::core::manager::PolicyManager;
use libplacement::with_xline::run_placement_watcher_with_xline;
use serial_test::serial;
use tokio::sync::RwLock;
use tokio::time::sleep;

const ETCD_ENDPOINTS: &[&str] = &["127.0.0.1:2379"];
const POLICY_PREFIX: &str = "/test/placementpolicies/";
const POD_PREFIX: &str = "/test/pods/";

struct EtcdTestClient {
    client: Client,
}

impl EtcdTestClient {
    async fn new() -> Result<Self, anyhow::Error> {
        let client = Client::connect(ETCD_ENDPOINTS, None).await?;
        Ok(Self { client })
    }

    async fn put_policy(&mut self, policy: &PlacementPolicy) -> Result<(), anyhow::Error> {
        let key = format!("{POLICY_PREFIX}{}/{}", policy.namespace(), policy.name());
        let value = serde_yaml::to_string(policy)?;
        self.client.put(key, value, None).await?;
        Ok(())
    }

    async fn delete_policy(&mut self, namespace: &str, name: &str) -> Result<(), anyhow::Error> {
        let key = format!("{POLICY_PREFIX}{namespace}/{name}");
        self.client.delete(key, None).await?;
        Ok(())
    }

    async fn put_pod(&mut self, pod: &Pod) -> Result<(), anyhow::Error> {
        let key = format!("{POD_PREFIX}{}", pod.metadata.name);
        let value = serde_yaml::to_string(pod)?;
        self.client.put(key, value, None).await?;
        Ok(())
    }

    async fn delete_pod(&mut self, name: &str) -> Result<(), anyhow::Error> {
        let key = format!("{POD_PREFIX}{name}");
        self.client.delete(key, None).await?;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), anyhow::Error> {
        for prefix in [POLICY_PREFIX, POD_PREFIX] {
            self.client
                .delete(prefix, Some(DeleteOptions::new().with_prefix()))
                .await?;
        }
        Ok(())
    }
}

fn test_config() -> XlineConfig {
    XlineConfig {
        endpoints: ETCD_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
        policy_prefix: POLICY_PREFIX.to_string(),
        pod_prefix: POD_PREFIX.to_string(),
    }
}

fn create_test_policy(name: &str) -> PlacementPolicy {
    PlacementPolicy {
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        },
        spec: PlacementPolicySpec {
            weight: 1,
            enforcement_mode: EnforcementMode::Strict,
            pod_selector: LabelSelector {
                match_labels: HashMap::from([("app".to_string(), "web".to_string())]),
            },
            node_selector: LabelSelector::default(),
            policy: Policy {
                action: Action::Must,
                target_size: IntOrString::Int(1),
            },
        },
    }
}

fn create_test_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: "default".to_string(),
            uid: format!("uid-{name}"),
            labels: HashMap::from([("app".to_string(), "web".to_string())]),
        },
    }
}

async fn start_watcher() -> (Arc<RwLock<Cache>>, Arc<PolicyManager>) {
    let cache = Arc::new(RwLock::new(Cache::new()));
    let manager = Arc::new(PolicyManager::new(cache.clone(), cache.clone()));
    run_placement_watcher_with_xline(&test_config(), cache.clone(), manager.clone())
        .await
        .expect("Failed to start watcher");
    (cache, manager)
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_watcher_loads_existing_objects() {
    let mut etcd_client = EtcdTestClient::new().await.expect("Failed to connect to etcd");
    etcd_client.cleanup().await.expect("Failed to cleanup etcd");

    etcd_client
        .put_policy(&create_test_policy("web"))
        .await
        .expect("Failed to put policy");
    etcd_client
        .put_pod(&create_test_pod("web-1"))
        .await
        .expect("Failed to put pod");

    let (cache, _) = start_watcher().await;
    {
        let cache = cache.read().await;
        assert!(cache.get_policy("default", "web").is_some());
        assert!(cache.get_pod("default", "web-1").is_some());
    }

    etcd_client.cleanup().await.expect("Failed to cleanup etcd");
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_watcher_follows_policy_changes() {
    let mut etcd_client = EtcdTestClient::new().await.expect("Failed to connect to etcd");
    etcd_client.cleanup().await.expect("Failed to cleanup etcd");

    let (cache, _) = start_watcher().await;

    let mut policy = create_test_policy("web");
    etcd_client.put_policy(&policy).await.expect("Failed to put policy");
    sleep(Duration::from_millis(500)).await;
    assert_eq!(
        cache.read().await.get_policy("default", "web").map(|p| p.spec.weight),
        Some(1)
    );

    policy.spec.weight = 7;
    etcd_client.put_policy(&policy).await.expect("Failed to put policy");
    sleep(Duration::from_millis(500)).await;
    assert_eq!(
        cache.read().await.get_policy("default", "web").map(|p| p.spec.weight),
        Some(7)
    );

    etcd_client
        .delete_policy("default", "web")
        .await
        .expect("Failed to delete policy");
    sleep(Duration::from_millis(500)).await;
    assert!(cache.read().await.get_policy("default", "web").is_none());

    etcd_client.cleanup().await.expect("Failed to cleanup etcd");
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_watcher_releases_deleted_pods() {
    let mut etcd_client = EtcdTestClient::new().await.expect("Failed to connect to etcd");
    etcd_client.cleanup().await.expect("Failed to cleanup etcd");

    let policy = create_test_policy("web");
    etcd_client.put_policy(&policy).await.expect("Failed to put policy");
    let (cache, manager) = start_watcher().await;

    let pod = create_test_pod("web-1");
    etcd_client.put_pod(&pod).await.expect("Failed to put pod");
    sleep(Duration::from_millis(500)).await;
    assert!(cache.read().await.get_pod("default", "web-1").is_some());

    let info = manager
        .get_policy_info(&policy)
        .await
        .expect("Failed to get policy info");
    manager.add_pod(&pod, &info).await.expect("Failed to add pod");
    assert!(manager.policy_infos().get("default", "web").await.is_some());

    etcd_client.delete_pod("web-1").await.expect("Failed to delete pod");
    sleep(Duration::from_millis(500)).await;
    assert!(cache.read().await.get_pod("default", "web-1").is_none());
    assert!(manager.policy_infos().get("default", "web").await.is_none());

    etcd_client.cleanup().await.expect("Failed to cleanup etcd");
}
