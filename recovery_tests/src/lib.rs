// Test-only world harness for network lifecycle integration tests.
//
// Wraps a real `NetworkEngine` over a real `MemoryStore` so the integration
// scenarios exercise the exact code paths a live deployment runs: every edit
// goes through place/remove/sweep, every persisted read through the store
// traits. The only test-specific code here is the placement assertion
// helpers and the direct slot/disk seeding used by the recovery scenarios.
//
// See also: `tests/full_pipeline.rs` for lifecycle scenarios and
// `tests/orphan_recovery.rs` for dissolve/rebuild round trips.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gridvault_registry::engine::{EngineConfig, EngineEvent, NetworkEngine, PlaceOutcome};
use gridvault_registry::memory::MemoryStore;
use gridvault_registry::schema::{DiskId, DiskRow, SlotRow};
use gridvault_registry::store::{FixedClock, NetworkStore, StoreTx};
use gridvault_topology::types::{
    BlockPos, Network, NetworkId, NetworkRef, OwnerId, UnitKind, WorldId,
};

/// Shorthand for a position in the default test world.
pub fn pos(x: i32, y: i32, z: i32) -> BlockPos {
    BlockPos::new(WorldId(0), x, y, z)
}

/// `p` shifted `d` cells along +x.
pub fn east(p: BlockPos, d: i32) -> BlockPos {
    BlockPos::new(p.world, p.x + d, p.y, p.z)
}

/// Unique temp path for snapshot round-trip tests.
pub fn temp_snapshot_path(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "gridvault-it-{label}-{}-{nanos}.json",
        std::process::id()
    ))
}

/// Hand-built minimal network value for direct registry calls (threaded
/// tests bypass the engine, which is single-writer by design).
pub fn minimal_network(server: BlockPos, owner: &OwnerId) -> Network {
    Network {
        id: NetworkId(server),
        owner: owner.clone(),
        server,
        drive_bays: [east(server, 1)].into(),
        terminals: [east(server, 2)].into(),
        security_terminal: None,
        exporters: Default::default(),
        importers: Default::default(),
        cables: Default::default(),
    }
}

/// A real engine plus direct handles to its store and clock.
pub struct WorldHarness {
    pub engine: NetworkEngine<MemoryStore>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub owner: OwnerId,
}

impl WorldHarness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::in_memory()))
    }

    /// Harness over a store that snapshots to `path` on every commit.
    pub fn with_snapshot(path: &Path) -> Self {
        Self::with_store(Arc::new(MemoryStore::open(path).expect("open store")))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        let clock = Arc::new(FixedClock::at(1_000));
        let engine =
            NetworkEngine::with_clock(Arc::clone(&store), EngineConfig::default(), clock.clone())
                .expect("engine open");
        Self {
            engine,
            store,
            clock,
            owner: OwnerId("integrator".into()),
        }
    }

    pub fn place(&mut self, p: BlockPos, kind: UnitKind) -> PlaceOutcome {
        self.engine.place_unit(p, kind, &self.owner).expect("place_unit")
    }

    /// Place expecting a formed network; returns its id.
    pub fn place_forms(&mut self, p: BlockPos, kind: UnitKind) -> NetworkId {
        match self.place(p, kind) {
            PlaceOutcome::Formed(id) => id,
            other => panic!("expected formation at {p}, got {other:?}"),
        }
    }

    /// Build the minimal valid network: Server at `origin`, DriveBay and
    /// Terminal along +x. Returns the network id (always `origin`).
    pub fn build_minimal(&mut self, origin: BlockPos) -> NetworkId {
        self.place(origin, UnitKind::Server);
        self.place(east(origin, 1), UnitKind::DriveBay);
        self.place_forms(east(origin, 2), UnitKind::Terminal)
    }

    /// Seed one occupied slot under `bay`, bound to `id`, holding `disk`.
    pub fn seed_slot(
        &self,
        bay: BlockPos,
        id: NetworkId,
        slot_number: u32,
        disk: DiskId,
        used_cells: u32,
    ) {
        let mut tx = self.store.begin().expect("begin");
        tx.upsert_disk(
            disk,
            DiskRow {
                network: NetworkRef::Bound(id),
                tier: 1,
                max_cells: 64,
                used_cells,
            },
        );
        tx.upsert_slot(
            bay,
            SlotRow {
                network: NetworkRef::Bound(id),
                slot_number,
                disk_id: Some(disk),
            },
        );
        tx.commit().expect("commit");
    }

    /// Serialize the slot rows under `bay` plus the disks they hold — the
    /// payload whose bytes must survive a dissolve/rebuild cycle.
    pub fn slot_state_json(&self, bay: BlockPos) -> String {
        let slots = self.store.slots_at(bay).expect("slots_at");
        let disks: Vec<_> = slots
            .iter()
            .filter_map(|slot| slot.disk_id)
            .map(|id| (id, self.store.disk(id).expect("disk read")))
            .collect();
        serde_json::to_string(&(slots, disks)).expect("serialize slot state")
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.engine.drain_events()
    }
}

impl Default for WorldHarness {
    fn default() -> Self {
        Self::new()
    }
}
