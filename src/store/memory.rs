//! In-process implementation of the replicated store: a path-keyed JSON map
//! with every mutation published on a broadcast channel. Backs all tests and
//! local development; production wires a remote-store implementation of the
//! same trait.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tracing::debug;

use super::{ReplicatedStore, StoreError, StoreEvent, StoreResult};

/// Size of the broadcast channel for change events.
const EVENT_BUFFER_SIZE: usize = 256;

#[derive(Clone)]
pub struct MemoryStore {
    map: Arc<RwLock<BTreeMap<String, JsonValue>>>,
    events: broadcast::Sender<StoreEvent>,
    /// When set, all operations fail as unreachable. Test hook.
    offline: Arc<RwLock<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            map: Arc::new(RwLock::new(BTreeMap::new())),
            events,
            offline: Arc::new(RwLock::new(false)),
        }
    }

    /// Simulate the transport dropping. Subsequent operations fail until
    /// called again with `false`.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.write() = offline;
    }

    fn check_online(&self) -> StoreResult<()> {
        if *self.offline.read() {
            return Err(StoreError::Unreachable("store offline".to_string()));
        }
        Ok(())
    }

    fn publish(&self, path: &str, value: Option<JsonValue>) {
        // No subscribers is fine; send only fails when nobody listens.
        let _ = self.events.send(StoreEvent { path: path.to_string(), value });
    }
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl ReplicatedStore for MemoryStore {
    async fn get(&self, path: &str) -> StoreResult<Option<JsonValue>> {
        self.check_online()?;
        Ok(self.map.read().get(path).cloned())
    }

    async fn set(&self, path: &str, value: JsonValue) -> StoreResult<()> {
        self.check_online()?;
        self.map.write().insert(path.to_string(), value.clone());
        debug!(target: "clinauth::store", "set path='{}'", path);
        self.publish(path, Some(value));
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.check_online()?;
        let existed = self.map.write().remove(path).is_some();
        if existed {
            debug!(target: "clinauth::store", "delete path='{}'", path);
            self.publish(path, None);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<(String, JsonValue)>> {
        self.check_online()?;
        let want = format!("{}/", prefix.trim_end_matches('/'));
        let map = self.map.read();
        let mut out = Vec::new();
        for (path, value) in map.range(want.clone()..) {
            let Some(rest) = path.strip_prefix(&want) else { break };
            // Direct children only
            if rest.is_empty() || rest.contains('/') { continue; }
            out.push((rest.to_string(), value.clone()));
        }
        Ok(out)
    }

    fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
