//! # Flow registry: name → running [`FlowSource`].
//!
//! One async mutex guards the whole map, so "is the name free?" and "insert"
//! happen as one step and two concurrent `add_flow` calls for the same name
//! cannot both win.
//!
//! ## Rules
//! - Names are unique at every instant.
//! - Rollback and cleanup remove an entry only if it is still the same
//!   source (`Arc::ptr_eq`), never a newer flow that reused the name.
//! - Entries are not drained at shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::IngestError;
use crate::sources::FlowSource;

pub(crate) struct FlowRegistry {
    flows: Mutex<HashMap<String, Arc<FlowSource>>>,
}

impl FlowRegistry {
    pub(crate) fn new() -> Self {
        Self {
            flows: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves `name` and inserts the source built by `make`.
    ///
    /// `make` runs under the lock, only when the name is free.
    pub(crate) async fn insert_with<F>(&self, name: &str, make: F) -> Result<Arc<FlowSource>, IngestError>
    where
        F: FnOnce() -> Result<Arc<FlowSource>, IngestError>,
    {
        let mut flows = self.flows.lock().await;
        if flows.contains_key(name) {
            return Err(IngestError::DuplicateFlow {
                name: name.to_string(),
            });
        }
        let source = make()?;
        flows.insert(name.to_string(), Arc::clone(&source));
        Ok(source)
    }

    /// Removes and returns the entry for `name`.
    pub(crate) async fn remove(&self, name: &str) -> Option<Arc<FlowSource>> {
        self.flows.lock().await.remove(name)
    }

    /// Removes the entry of `source`'s flow if it still points at `source`.
    pub(crate) async fn remove_same(&self, source: &Arc<FlowSource>) -> bool {
        let mut flows = self.flows.lock().await;
        let name = source.flow().name();
        match flows.get(name) {
            Some(current) if Arc::ptr_eq(current, source) => {
                flows.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Returns true if `source` is still the registered entry for its flow.
    pub(crate) async fn contains_same(&self, source: &Arc<FlowSource>) -> bool {
        let flows = self.flows.lock().await;
        flows
            .get(source.flow().name())
            .is_some_and(|current| Arc::ptr_eq(current, source))
    }

    pub(crate) async fn len(&self) -> usize {
        self.flows.lock().await.len()
    }

    /// Registered names, sorted.
    pub(crate) async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.flows.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Copies out every registered source.
    pub(crate) async fn snapshot(&self) -> Vec<Arc<FlowSource>> {
        self.flows.lock().await.values().cloned().collect()
    }
}
