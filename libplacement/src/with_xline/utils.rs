use anyhow::Context;
use etcd_client::{Client, GetOptions, KeyValue};
use log::warn;
use serde::de::DeserializeOwned;

pub fn decode<T: DeserializeOwned>(kv: &KeyValue) -> Result<T, anyhow::Error> {
    serde_yaml::from_slice(kv.value())
        .with_context(|| format!("decoding {}", String::from_utf8_lossy(kv.key())))
}

/// Decodes every value under `prefix`, skipping the ones that fail.
pub async fn list_with_prefix<T: DeserializeOwned>(
    client: &mut Client,
    prefix: &str,
) -> Result<Vec<T>, anyhow::Error> {
    let resp = client
        .get(prefix, Some(GetOptions::new().with_prefix()))
        .await
        .with_context(|| format!("listing {prefix}"))?;
    let mut result = Vec::new();
    for kv in resp.kvs() {
        match decode(kv) {
            Ok(v) => result.push(v),
            Err(e) => warn!("{e:?}"),
        }
    }
    Ok(result)
}

/// Splits `<prefix><namespace>/<name>` into its namespace and name.
pub fn parse_policy_key(key: &str, prefix: &str) -> Option<(String, String)> {
    let (namespace, name) = key.strip_prefix(prefix)?.split_once('/')?;
    if namespace.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((namespace.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "/registry/placementpolicies/";

    #[test]
    fn test_parse_policy_key() {
        assert_eq!(
            parse_policy_key("/registry/placementpolicies/default/web", PREFIX),
            Some(("default".to_string(), "web".to_string()))
        );
    }

    #[test]
    fn test_parse_policy_key_rejects_malformed() {
        for key in [
            "/registry/pods/default/web",
            "/registry/placementpolicies/web",
            "/registry/placementpolicies//web",
            "/registry/placementpolicies/default/",
            "/registry/placementpolicies/a/b/c",
        ] {
            assert_eq!(parse_policy_key(key, PREFIX), None, "{key}");
        }
    }
}
