// Data-access seam between the registry and whatever holds the rows.
//
// `NetworkStore` is the read side plus a factory for write transactions;
// `StoreTx` queues writes and applies them atomically on `commit`. The
// registry composes every mutation as one transaction, so a store failure
// leaves persisted state exactly as it was.
//
// `StoreMarkers` and `StoreBindings` adapt a store into the read-only views
// the topology walks consume. Walks are infallible by contract — a row that
// cannot be read is treated as absent, and real failures surface later at
// the transactional boundary.

use crate::error::RegistryError;
use crate::schema::{BlockRow, DiskId, DiskRow, NetworkRow, SlotRow, TerminalRow};
use gridvault_topology::grid::{MarkerView, NetworkBindings};
use gridvault_topology::types::{BlockPos, NetworkId, NetworkRef, UnitKind};
use std::time::{SystemTime, UNIX_EPOCH};

/// Read access to the persisted tables, plus transaction creation.
pub trait NetworkStore {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    /// Open a write transaction. Writes are invisible to readers until
    /// `commit`.
    fn begin(&self) -> Result<Self::Tx<'_>, RegistryError>;

    fn network(&self, id: NetworkId) -> Result<Option<NetworkRow>, RegistryError>;
    fn network_ids(&self) -> Result<Vec<NetworkId>, RegistryError>;

    fn block_at(&self, pos: BlockPos) -> Result<Option<BlockRow>, RegistryError>;
    fn blocks_of(&self, id: NetworkId) -> Result<Vec<(BlockPos, BlockRow)>, RegistryError>;

    /// Slot rows at one drive-bay coordinate, whatever their tag.
    fn slots_at(&self, pos: BlockPos) -> Result<Vec<SlotRow>, RegistryError>;
    /// Slot rows currently bound to a live network.
    fn slots_bound_to(&self, id: NetworkId) -> Result<Vec<(BlockPos, SlotRow)>, RegistryError>;

    fn disk(&self, id: DiskId) -> Result<Option<DiskRow>, RegistryError>;

    fn terminal_at(&self, pos: BlockPos) -> Result<Option<TerminalRow>, RegistryError>;
    fn terminals_bound_to(&self, id: NetworkId)
    -> Result<Vec<(BlockPos, TerminalRow)>, RegistryError>;

    fn marker_at(&self, pos: BlockPos) -> Result<Option<UnitKind>, RegistryError>;
    /// Every marker row. Used to rebuild the world model after a reopen.
    fn markers(&self) -> Result<Vec<(BlockPos, UnitKind)>, RegistryError>;

    fn has_security_terminal(&self, id: NetworkId) -> Result<bool, RegistryError> {
        Ok(!self.terminals_bound_to(id)?.is_empty())
    }
}

/// One queued-write transaction. Dropping without `commit` discards
/// everything.
pub trait StoreTx {
    fn upsert_network(&mut self, id: NetworkId, row: NetworkRow);
    fn delete_network(&mut self, id: NetworkId);

    fn insert_block(&mut self, pos: BlockPos, row: BlockRow);
    fn delete_blocks_of(&mut self, id: NetworkId);

    /// Insert or replace the slot with the same `slot_number` at `pos`.
    fn upsert_slot(&mut self, pos: BlockPos, row: SlotRow);
    fn upsert_disk(&mut self, id: DiskId, row: DiskRow);

    fn upsert_terminal(&mut self, pos: BlockPos, row: TerminalRow);
    fn delete_terminal(&mut self, pos: BlockPos);

    fn set_marker(&mut self, pos: BlockPos, kind: UnitKind);
    fn clear_marker(&mut self, pos: BlockPos);

    fn commit(self) -> Result<(), RegistryError>;
}

// ---------------------------------------------------------------------------
// Time source
// ---------------------------------------------------------------------------

/// Timestamp source for `created_at`/`last_accessed` stamps.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually-advanced time for deterministic tests.
#[derive(Default)]
pub struct FixedClock {
    now: std::sync::atomic::AtomicU64,
}

impl FixedClock {
    pub fn at(millis: u64) -> Self {
        let clock = Self::default();
        clock.set(millis);
        clock
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.now.load(std::sync::atomic::Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Topology-view adapters
// ---------------------------------------------------------------------------

/// Marker lookups backed by the `custom_block_markers` table.
pub struct StoreMarkers<'a, S> {
    store: &'a S,
}

impl<'a, S: NetworkStore> StoreMarkers<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<S: NetworkStore> MarkerView for StoreMarkers<'_, S> {
    fn marker_at(&self, pos: BlockPos) -> Option<UnitKind> {
        self.store.marker_at(pos).ok().flatten()
    }
}

/// Network associations backed by the `network_blocks` table. Membership
/// rows are deleted together with their network, so a row implies a live
/// binding; everything else is standalone.
pub struct StoreBindings<'a, S> {
    store: &'a S,
}

impl<'a, S: NetworkStore> StoreBindings<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<S: NetworkStore> NetworkBindings for StoreBindings<'_, S> {
    fn binding(&self, pos: BlockPos) -> NetworkRef {
        match self.store.block_at(pos) {
            Ok(Some(row)) => NetworkRef::Bound(row.network),
            _ => NetworkRef::Standalone,
        }
    }

    fn has_security_terminal(&self, id: NetworkId) -> bool {
        self.store.has_security_terminal(id).unwrap_or(false)
    }
}
