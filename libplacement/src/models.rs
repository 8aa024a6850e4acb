use std::collections::HashMap;

/// The view of a node the scheduler hands to Filter and Score.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl NodeInfo {
    pub fn new(name: &str, labels: HashMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            labels,
        }
    }
}
