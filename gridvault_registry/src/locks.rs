// Per-network serialization and the recovery dedupe log.
//
// Registry mutations for one `NetworkId` must never interleave; mutations
// for different ids may run concurrently. `LockTable` holds a lazily-created
// mutex per id in a concurrent map, exposed only through a closure-scoped
// `serialized` call so no lock handle can leak out and outlive its entry.
//
// Ids are derived from world geometry, so the table would otherwise grow for
// the life of the process; `evict_unused` drops entries no mutation is
// currently inside.

use dashmap::DashMap;
use gridvault_topology::types::NetworkId;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct LockTable {
    locks: DashMap<NetworkId, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the lock for `id` held. Lazily creates the lock on first
    /// use.
    pub fn serialized<R>(&self, id: NetworkId, f: impl FnOnce() -> R) -> R {
        let slot = {
            let entry = self.locks.entry(id).or_default();
            // Clone out and release the map shard before blocking on the
            // mutex, or a held lock could stall unrelated ids on the same
            // shard.
            Arc::clone(entry.value())
        };
        // The data behind the mutex is (), so a poisoned lock carries no
        // broken state worth preserving.
        let _guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }

    /// Drop locks nobody is holding. A mutation in flight keeps its entry's
    /// `Arc` count above one, so it is never evicted under a caller.
    pub fn evict_unused(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Remembers which dissolved networks have already had their reclamation
/// logged, so a bay-by-bay restoration does not repeat the same line.
#[derive(Default)]
pub struct RecoveryLog {
    seen: DashMap<NetworkId, ()>,
}

impl RecoveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per id.
    pub fn first_sighting(&self, id: NetworkId) -> bool {
        self.seen.insert(id, ()).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridvault_topology::types::{BlockPos, WorldId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn net(x: i32) -> NetworkId {
        NetworkId(BlockPos::new(WorldId(0), x, 0, 0))
    }

    #[test]
    fn serialized_runs_the_closure_and_returns_its_value() {
        let table = LockTable::new();
        let out = table.serialized(net(0), || 7);
        assert_eq!(out, 7);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn same_id_never_interleaves_across_threads() {
        let table = LockTable::new();
        let counter = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        table.serialized(net(0), || {
                            let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(inside, Ordering::SeqCst);
                            counter.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                });
            }
        });

        assert_eq!(peak.load(Ordering::SeqCst), 1, "at most one holder per id");
    }

    #[test]
    fn different_ids_do_not_block_each_other() {
        // Thread A parks inside id 0 until thread B finishes work under id 1.
        let table = LockTable::new();
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        std::thread::scope(|scope| {
            let table = &table;
            scope.spawn(move || {
                table.serialized(net(0), || {
                    rx.recv().ok();
                });
            });
            scope.spawn(|| {
                table.serialized(net(1), || ());
                tx.send(()).ok();
            });
        });
    }

    #[test]
    fn evict_unused_keeps_held_locks() {
        let table = LockTable::new();
        table.serialized(net(0), || ());
        table.serialized(net(1), || ());
        assert_eq!(table.len(), 2);

        let evicted = table.serialized(net(0), || table.evict_unused());
        assert_eq!(evicted, 1, "only the idle lock goes");
        assert_eq!(table.len(), 1);

        assert_eq!(table.evict_unused(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn recovery_log_reports_each_id_once() {
        let log = RecoveryLog::new();
        assert!(log.first_sighting(net(0)));
        assert!(!log.first_sighting(net(0)));
        assert!(log.first_sighting(net(1)));
    }
}
