use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct PlacementConfig {
    pub xline_config: XlineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XlineConfig {
    pub endpoints: Vec<String>,
    /// Placement policies live under `<policy_prefix><namespace>/<name>`.
    #[serde(default = "default_policy_prefix")]
    pub policy_prefix: String,
    #[serde(default = "default_pod_prefix")]
    pub pod_prefix: String,
}

fn default_policy_prefix() -> String {
    "/registry/placementpolicies/".to_string()
}

fn default_pod_prefix() -> String {
    "/registry/pods/".to_string()
}

impl Default for XlineConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["127.0.0.1:2379".to_string()],
            policy_prefix: default_policy_prefix(),
            pod_prefix: default_pod_prefix(),
        }
    }
}

pub fn load_config(path: &str) -> Result<PlacementConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    let cfg: PlacementConfig =
        serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
