use std::{any::Any, collections::HashMap};

/// Storage scoped to one scheduling attempt of one pod.
///
/// Plugins write at PreFilter/PreScore and read during the per-node
/// Filter/Score fan-out, which only ever gets a shared reference.
#[derive(Default)]
pub struct CycleState {
    storage: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<T: 'static>(&self, key: &str) -> Option<&T> {
        self.storage.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn write<T: Any + Send + Sync>(&mut self, key: &str, value: T) {
        self.storage.insert(key.to_string(), Box::new(value));
    }
}
