//! The shared reference to the currently active server.
//!
//! The slot is swapped atomically (`ArcSwapOption`), so readers always see a
//! whole instance or none. Alongside the slot the handle keeps a registry of
//! every instance that was started and not yet retired, which covers the
//! handover window where the new instance serves before it is published.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;

use crate::http::ServerInstance;

/// Single-slot holder of the active [`ServerInstance`] plus the live registry.
///
/// Only the reload loop writes; anyone may read snapshots.
#[derive(Default)]
pub struct ApplicationHandle {
    current: ArcSwapOption<ServerInstance>,
    live: DashMap<u64, Arc<ServerInstance>>,
}

impl ApplicationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the active instance.
    pub fn current(&self) -> Option<Arc<ServerInstance>> {
        self.current.load_full()
    }

    /// Record a started instance before it can be published.
    pub fn register(&self, instance: Arc<ServerInstance>) {
        self.live.insert(instance.generation(), instance);
    }

    /// Make `instance` the active one, returning the instance it replaced.
    pub fn publish(&self, instance: Arc<ServerInstance>) -> Option<Arc<ServerInstance>> {
        self.live
            .entry(instance.generation())
            .or_insert_with(|| Arc::clone(&instance));
        self.current.swap(Some(instance))
    }

    /// Drop a retired instance from the registry.
    pub fn forget(&self, generation: u64) {
        self.live.remove(&generation);
    }

    /// Every started, not yet retired instance, oldest first.
    pub fn live(&self) -> Vec<Arc<ServerInstance>> {
        let mut instances: Vec<_> = self.live.iter().map(|e| Arc::clone(e.value())).collect();
        instances.sort_by_key(|instance| instance.generation());
        instances
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Empty the slot and the registry, handing back everything that still
    /// needs retiring.
    pub fn take_all(&self) -> Vec<Arc<ServerInstance>> {
        let current = self.current.swap(None);
        let mut instances = self.live();
        self.live.clear();

        if let Some(current) = current {
            if !instances.iter().any(|i| i.generation() == current.generation()) {
                instances.push(current);
            }
        }
        instances
    }
}

impl std::fmt::Debug for ApplicationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationHandle")
            .field("current", &self.current().map(|i| i.generation()))
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::http::build_router;
    use crate::net::bind_reusable;
    use std::time::Duration;

    fn start(generation: u64) -> Arc<ServerInstance> {
        let config = Arc::new(ServerConfig {
            bind_address: "127.0.0.1:0".into(),
            payload: format!("v{generation}").into(),
        });
        let listener = bind_reusable(&config.bind_address, 128).unwrap();
        let app = build_router(Arc::clone(&config), Duration::from_secs(5));
        Arc::new(ServerInstance::start(generation, config, listener, app).unwrap())
    }

    #[tokio::test]
    async fn publish_swaps_single_slot() {
        let handle = ApplicationHandle::new();
        assert!(handle.current().is_none());

        assert!(handle.publish(start(1)).is_none());
        let replaced = handle.publish(start(2)).unwrap();
        assert_eq!(replaced.generation(), 1);
        assert_eq!(handle.current().unwrap().generation(), 2);
    }

    #[tokio::test]
    async fn registry_tracks_unpublished_instances() {
        let handle = ApplicationHandle::new();
        handle.publish(start(1));
        handle.register(start(2));

        let generations: Vec<_> = handle.live().iter().map(|i| i.generation()).collect();
        assert_eq!(generations, vec![1, 2]);

        handle.forget(1);
        assert_eq!(handle.live_count(), 1);
    }

    #[tokio::test]
    async fn take_all_empties_handle() {
        let handle = ApplicationHandle::new();
        handle.publish(start(1));
        handle.register(start(2));

        let taken: Vec<_> = handle.take_all().iter().map(|i| i.generation()).collect();
        assert_eq!(taken, vec![1, 2]);
        assert!(handle.current().is_none());
        assert_eq!(handle.live_count(), 0);
    }

    #[tokio::test]
    async fn snapshot_survives_swap() {
        let handle = ApplicationHandle::new();
        handle.publish(start(1));

        let snapshot = handle.current().unwrap();
        handle.publish(start(2));
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(snapshot.config().payload, "v1");
    }
}
