// Engine: the world-edit entry point that ties the pipeline together.
//
// Placement: conflict gate first (pure simulation, world untouched on veto),
// then the edit commits, then detect → validate decides whether a network
// forms, stays standalone, or the edit is undone as oversized.
// Removal: the edit commits, every fragment left standing around the hole is
// re-detected, surviving networks re-register, dissolved ones unregister.
// Sweep: periodic re-validation of everything persisted, for drift the
// normal event flow never saw.
//
// The engine owns the world model — a sparse material grid standing in for
// the host voxel world — plus the registry. Collaborators observe lifecycle
// through drained `EngineEvent`s; the engine itself runs on the single
// world-mutation thread, while the registry underneath is safe to share
// with background work.

use crate::error::RegistryError;
use crate::registry::NetworkRegistry;
use crate::schema::{DiskRow, SlotRow, TerminalRow};
use crate::store::{Clock, NetworkStore, StoreBindings, StoreMarkers, StoreTx, SystemClock};
use gridvault_topology::classify::classify;
use gridvault_topology::config::NetworkLimits;
use gridvault_topology::conflict::{ConflictReason, Placement, check_placement};
use gridvault_topology::detect::{detect, detect_all};
use gridvault_topology::grid::{SparseGrid, face_neighbors};
use gridvault_topology::types::{
    BlockPos, Material, Network, NetworkId, NetworkRef, OwnerId, UnitKind,
};
use gridvault_topology::validate::{
    CapacityFault, InvalidReason, Verdict, validate, validate_detection,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub limits: NetworkLimits,
}

/// Lifecycle notifications for downstream collaborators (storage allocator,
/// presentation). Drained in order of occurrence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    NetworkFormed(Network),
    NetworkDissolved(NetworkId),
    PlacementRejected {
        pos: BlockPos,
        kind: UnitKind,
        reason: ConflictReason,
    },
    PlacementReverted {
        pos: BlockPos,
        kind: UnitKind,
        fault: CapacityFault,
    },
}

/// What a placement call did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// A valid network (re)formed and is registered under this id.
    Formed(NetworkId),
    /// The unit stands, but no valid network surrounds it yet.
    Standalone,
    /// Vetoed before any mutation; the world is untouched.
    Rejected(ConflictReason),
    /// Placed, found oversized, undone again. The caller refunds the unit.
    Reverted(CapacityFault),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub refreshed: usize,
    pub dissolved: usize,
    pub evicted_locks: usize,
}

pub struct NetworkEngine<S> {
    grid: SparseGrid,
    store: Arc<S>,
    registry: NetworkRegistry<S>,
    config: EngineConfig,
    events: Vec<EngineEvent>,
}

impl<S: NetworkStore + Sync> NetworkEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self, RegistryError> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<S>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        // Rebuild the world model from the marker table, so a store opened
        // from snapshot starts with its units standing.
        let mut grid = SparseGrid::new();
        for (pos, kind) in store.markers()? {
            grid.set(pos, kind.expected_material());
        }
        let registry = NetworkRegistry::with_clock(Arc::clone(&store), clock);
        Ok(Self {
            grid,
            store,
            registry,
            config,
            events: Vec::new(),
        })
    }

    pub fn registry(&self) -> &NetworkRegistry<S> {
        &self.registry
    }

    pub fn grid(&self) -> &SparseGrid {
        &self.grid
    }

    /// Take all events accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Report a world change made outside the engine (worldgen, scripts).
    /// Only the world model updates; `sweep` reconciles persisted networks
    /// with it later.
    pub fn sync_world_cell(&mut self, pos: BlockPos, material: Option<Material>) {
        match material {
            Some(material) => self.grid.set(pos, material),
            None => self.grid.clear(pos),
        }
    }

    /// Place a unit. The conflict gate runs first and can veto the edit with
    /// the world left completely untouched.
    pub fn place_unit(
        &mut self,
        pos: BlockPos,
        kind: UnitKind,
        owner: &OwnerId,
    ) -> Result<PlaceOutcome, RegistryError> {
        let store = Arc::clone(&self.store);
        let markers = StoreMarkers::new(&*store);
        let bindings = StoreBindings::new(&*store);

        if let Placement::Conflict(reason) =
            check_placement(&self.grid, &markers, &bindings, &self.config.limits, pos, kind)
        {
            debug!("placement of {kind:?} at {pos} vetoed: {reason}");
            self.events.push(EngineEvent::PlacementRejected {
                pos,
                kind,
                reason: reason.clone(),
            });
            return Ok(PlaceOutcome::Rejected(reason));
        }

        // Commit the edit: world cell plus marker row. A security terminal
        // also gets its ownership row, created once and never overwritten.
        self.grid.set(pos, kind.expected_material());
        let created_terminal =
            kind == UnitKind::SecurityTerminal && store.terminal_at(pos)?.is_none();
        let mut tx = store.begin()?;
        tx.set_marker(pos, kind);
        if created_terminal {
            tx.upsert_terminal(
                pos,
                TerminalRow {
                    owner: owner.clone(),
                    network: NetworkRef::None,
                },
            );
        }
        tx.commit()?;

        let verdict = {
            let detection = detect(&self.grid, &markers, &bindings, &self.config.limits, pos);
            validate_detection(&detection, owner, &self.config.limits)
        };
        match verdict {
            Verdict::Valid(network) => {
                let id = network.id;
                self.registry.register(&network)?;
                self.events.push(EngineEvent::NetworkFormed(network));
                Ok(PlaceOutcome::Formed(id))
            }
            Verdict::Invalid(InvalidReason::Structural(_)) => Ok(PlaceOutcome::Standalone),
            Verdict::Invalid(InvalidReason::Oversized(fault)) => {
                // Undo the edit; the caller refunds the unit to the actor.
                self.grid.clear(pos);
                let mut tx = store.begin()?;
                tx.clear_marker(pos);
                if created_terminal {
                    tx.delete_terminal(pos);
                }
                tx.commit()?;
                warn!("placement of {kind:?} at {pos} reverted: {fault}");
                self.events.push(EngineEvent::PlacementReverted {
                    pos,
                    kind,
                    fault: fault.clone(),
                });
                Ok(PlaceOutcome::Reverted(fault))
            }
        }
    }

    /// Remove the unit at `pos`, if there is one. Fragments left standing
    /// re-register; a network that lost its validity dissolves with its slot
    /// state orphaned in place.
    pub fn remove_unit(&mut self, pos: BlockPos) -> Result<(), RegistryError> {
        let store = Arc::clone(&self.store);
        let kind = {
            let markers = StoreMarkers::new(&*store);
            classify(&self.grid, &markers, pos)
        };
        let Some(kind) = kind else {
            return Ok(());
        };
        let prior = store.block_at(pos)?.map(|row| row.network);

        self.grid.clear(pos);
        let mut tx = store.begin()?;
        tx.clear_marker(pos);
        if kind == UnitKind::SecurityTerminal {
            tx.delete_terminal(pos);
        }
        if kind == UnitKind::DriveBay {
            if let Some(id) = prior {
                orphan_bay_slots(&*store, &mut tx, pos, id)?;
            }
        }
        tx.commit()?;

        self.settle_after_removal(&[pos], prior.into_iter().collect())
    }

    /// Bulk removal (an explosion). All edits commit in one transaction, then
    /// the surviving ring around the blast is re-detected fragment by
    /// fragment.
    pub fn remove_units(&mut self, positions: &[BlockPos]) -> Result<(), RegistryError> {
        let store = Arc::clone(&self.store);
        let removed: BTreeSet<BlockPos> = positions.iter().copied().collect();

        let mut doomed: Vec<(BlockPos, UnitKind, Option<NetworkId>)> = Vec::new();
        {
            let markers = StoreMarkers::new(&*store);
            for &pos in &removed {
                if let Some(kind) = classify(&self.grid, &markers, pos) {
                    let prior = store.block_at(pos)?.map(|row| row.network);
                    doomed.push((pos, kind, prior));
                }
            }
        }
        if doomed.is_empty() {
            return Ok(());
        }

        let mut tx = store.begin()?;
        for &(pos, kind, prior) in &doomed {
            self.grid.clear(pos);
            tx.clear_marker(pos);
            if kind == UnitKind::SecurityTerminal {
                tx.delete_terminal(pos);
            }
            if kind == UnitKind::DriveBay {
                if let Some(id) = prior {
                    orphan_bay_slots(&*store, &mut tx, pos, id)?;
                }
            }
        }
        tx.commit()?;

        let priors: BTreeSet<NetworkId> = doomed.iter().filter_map(|&(_, _, prior)| prior).collect();
        let removed_units: Vec<BlockPos> = doomed.iter().map(|&(pos, _, _)| pos).collect();
        self.settle_after_removal(&removed_units, priors)
    }

    /// Re-validate every persisted network against the current world.
    /// Catches drift reported through `sync_world_cell` and any edit the
    /// normal event flow missed. Also evicts idle per-id locks.
    pub fn sweep(&mut self) -> Result<SweepReport, RegistryError> {
        let store = Arc::clone(&self.store);
        let markers = StoreMarkers::new(&*store);
        let bindings = StoreBindings::new(&*store);

        let mut report = SweepReport::default();
        let mut stale: Vec<NetworkId> = Vec::new();
        let mut jobs: Vec<(NetworkId, OwnerId, BlockPos)> = Vec::new();
        for id in store.network_ids()? {
            let Some(row) = store.network(id)? else {
                continue;
            };
            report.examined += 1;

            let blocks = store.blocks_of(id)?;
            let seed = blocks
                .iter()
                .find(|(_, block)| block.kind == UnitKind::Server)
                .or(blocks.first())
                .map(|&(pos, _)| pos);
            match seed {
                Some(seed) => jobs.push((id, row.owner, seed)),
                // Metadata without membership rows: stale, retire it.
                None => stale.push(id),
            }
        }

        // Registered networks are pairwise non-adjacent (every placement that
        // would bridge two of them is vetoed), so detecting them all against
        // one snapshot and mutating afterwards matches the serial order.
        let seeds: Vec<BlockPos> = jobs.iter().map(|&(_, _, seed)| seed).collect();
        let detections = detect_all(&self.grid, &markers, &bindings, &self.config.limits, &seeds);

        for id in stale {
            self.registry.unregister(id)?;
            self.events.push(EngineEvent::NetworkDissolved(id));
            report.dissolved += 1;
        }
        for ((id, owner, _), (_, detection)) in jobs.into_iter().zip(detections) {
            match validate_detection(&detection, &owner, &self.config.limits) {
                Verdict::Valid(network) if network.id == id => {
                    if self.register_if_changed(&network)? {
                        report.refreshed += 1;
                    }
                }
                Verdict::Valid(network) => {
                    // The server moved out from under this id; identity
                    // migrates. Retire the old row first so its slot state
                    // orphans, then let the new registration reclaim it.
                    self.registry.unregister(id)?;
                    self.events.push(EngineEvent::NetworkDissolved(id));
                    self.register_if_changed(&network)?;
                    report.refreshed += 1;
                    report.dissolved += 1;
                }
                Verdict::Invalid(_) => {
                    self.registry.unregister(id)?;
                    self.events.push(EngineEvent::NetworkDissolved(id));
                    report.dissolved += 1;
                }
            }
        }
        report.evicted_locks = self.registry.evict_unused_locks();
        Ok(report)
    }

    /// Re-detect every fragment left standing around freshly-removed cells,
    /// re-register survivors, and dissolve prior networks nothing continued.
    fn settle_after_removal(
        &mut self,
        removed: &[BlockPos],
        priors: BTreeSet<NetworkId>,
    ) -> Result<(), RegistryError> {
        let store = Arc::clone(&self.store);
        let markers = StoreMarkers::new(&*store);
        let bindings = StoreBindings::new(&*store);

        let removed_set: BTreeSet<BlockPos> = removed.iter().copied().collect();
        let mut seeds: BTreeSet<BlockPos> = BTreeSet::new();
        for &pos in removed {
            for neighbor in face_neighbors(pos) {
                if !removed_set.contains(&neighbor)
                    && classify(&self.grid, &markers, neighbor).is_some()
                {
                    seeds.insert(neighbor);
                }
            }
        }

        let seed_list: Vec<BlockPos> = seeds.into_iter().collect();
        let results = detect_all(&self.grid, &markers, &bindings, &self.config.limits, &seed_list);

        let mut claimed: BTreeSet<BlockPos> = BTreeSet::new();
        let mut kept: BTreeSet<NetworkId> = BTreeSet::new();
        for (seed, detection) in results {
            // Seeds inside an already-walked fragment repeat its result.
            if claimed.contains(&seed) {
                continue;
            }
            claimed.insert(seed);
            let Some(candidate) = detection.candidate() else {
                continue;
            };
            claimed.extend(candidate.members().map(|(pos, _)| pos));

            // A fragment continues a persisted identity only if its server
            // coordinate already has a metadata row; fresh valid fragments
            // wait for the next placement to claim an owner.
            let owner = match candidate.servers.iter().next() {
                Some(&server) => store.network(NetworkId(server))?.map(|row| row.owner),
                None => None,
            };
            let Some(owner) = owner else {
                continue;
            };
            if let Verdict::Valid(network) = validate(candidate, &owner, &self.config.limits) {
                let id = network.id;
                self.register_if_changed(&network)?;
                kept.insert(id);
            }
        }

        for id in priors {
            if !kept.contains(&id) {
                self.registry.unregister(id)?;
                self.events.push(EngineEvent::NetworkDissolved(id));
            }
        }
        Ok(())
    }

    /// Register only when membership actually drifted from the stored rows,
    /// so unchanged survivors do not spam formation events.
    fn register_if_changed(&mut self, network: &Network) -> Result<bool, RegistryError> {
        let stored: BTreeSet<(BlockPos, UnitKind)> = self
            .store
            .blocks_of(network.id)?
            .into_iter()
            .map(|(pos, row)| (pos, row.kind))
            .collect();
        let next: BTreeSet<(BlockPos, UnitKind)> = network.members().into_iter().collect();
        if stored == next && self.registry.is_valid(network.id)? {
            return Ok(false);
        }
        self.registry.register(network)?;
        self.events.push(EngineEvent::NetworkFormed(network.clone()));
        Ok(true)
    }
}

/// Slot rows under a demolished bay wait at their coordinate for a rebuild;
/// the disks inside detach from the live network.
fn orphan_bay_slots<S: NetworkStore>(
    store: &S,
    tx: &mut S::Tx<'_>,
    bay: BlockPos,
    id: NetworkId,
) -> Result<(), RegistryError> {
    for slot in store.slots_at(bay)? {
        if slot.network != NetworkRef::Bound(id) {
            continue;
        }
        if let Some(disk_id) = slot.disk_id {
            if let Some(disk) = store.disk(disk_id)? {
                if disk.network == NetworkRef::Bound(id) {
                    tx.upsert_disk(
                        disk_id,
                        DiskRow {
                            network: NetworkRef::None,
                            ..disk
                        },
                    );
                }
            }
        }
        tx.upsert_slot(
            bay,
            SlotRow {
                network: NetworkRef::Orphaned(id),
                ..slot
            },
        );
    }
    Ok(())
}
