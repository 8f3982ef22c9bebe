// Network registry: durable membership, soft-delete, and reclamation.
//
// `register` and `unregister` are the only durable mutation points in the
// whole engine. Each runs as one store transaction under the per-id lock, so
// two near-simultaneous edits to the same network cannot interleave their
// writes, and a store failure leaves nothing half-applied.
//
// Dissolution is a soft delete for dependent state: membership and metadata
// rows go away, but drive-bay slot rows are retagged `Orphaned(id)` and disk
// rows keep their contents with the association nulled. Registration runs
// the inverse — restoration — on every pass: orphaned slot rows at the new
// network's bay coordinates are reclaimed and their detached disks
// re-associated. Restoration is idempotent; running it when nothing is
// orphaned changes nothing.

use crate::error::RegistryError;
use crate::locks::{LockTable, RecoveryLog};
use crate::schema::{BlockRow, DiskRow, NetworkRow, SlotRow, TerminalRow};
use crate::store::{Clock, NetworkStore, StoreTx, SystemClock};
use gridvault_topology::types::{Network, NetworkId, NetworkRef};
use log::{info, warn};
use std::sync::Arc;

pub struct NetworkRegistry<S> {
    store: Arc<S>,
    locks: LockTable,
    recovery: RecoveryLog,
    clock: Arc<dyn Clock>,
}

impl<S: NetworkStore> NetworkRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            locks: LockTable::new(),
            recovery: RecoveryLog::new(),
            clock,
        }
    }

    /// A persisted id is valid iff its metadata row exists. Orphaned and
    /// standalone placeholders never reach here — they carry no id to ask
    /// about.
    pub fn is_valid(&self, id: NetworkId) -> Result<bool, RegistryError> {
        Ok(self.store.network(id)?.is_some())
    }

    /// Durably record a validated network: metadata upsert, full membership
    /// rewrite, security-terminal association, then restoration of any
    /// orphaned slot state under its drive bays. One transaction, serialized
    /// per id.
    ///
    /// Registering the same network value twice leaves identical persisted
    /// state (timestamps aside).
    pub fn register(&self, network: &Network) -> Result<(), RegistryError> {
        let id = network.id;
        self.locks.serialized(id, || {
            let now = self.clock.now_millis();
            let created_at = match self.store.network(id)? {
                Some(existing) => existing.created_at,
                None => now,
            };

            let mut tx = self.store.begin()?;
            tx.upsert_network(
                id,
                NetworkRow {
                    owner: network.owner.clone(),
                    created_at,
                    last_accessed: now,
                },
            );

            // Membership: delete then reinsert, so shrinkage never leaves
            // stale rows behind.
            tx.delete_blocks_of(id);
            for (pos, kind) in network.members() {
                tx.insert_block(pos, BlockRow { network: id, kind });
            }

            // The terminal row's owner is whoever placed it; only the
            // association moves with the network.
            if let Some(pos) = network.security_terminal {
                let row = match self.store.terminal_at(pos)? {
                    Some(existing) => TerminalRow {
                        network: NetworkRef::Bound(id),
                        ..existing
                    },
                    None => TerminalRow {
                        owner: network.owner.clone(),
                        network: NetworkRef::Bound(id),
                    },
                };
                tx.upsert_terminal(pos, row);
            }

            self.restore_orphans(network, &mut tx)?;

            tx.commit()?;
            info!(
                "registered network {id} ({} units, {} cables)",
                network.unit_count(),
                network.cable_count()
            );
            Ok(())
        })
    }

    /// Reclaim slot and disk state waiting at this network's bay
    /// coordinates. Runs inside `register`'s transaction.
    fn restore_orphans(&self, network: &Network, tx: &mut S::Tx<'_>) -> Result<(), RegistryError> {
        let id = network.id;
        for &bay in &network.drive_bays {
            for slot in self.store.slots_at(bay)? {
                match slot.network {
                    NetworkRef::Orphaned(old) => {
                        if self.recovery.first_sighting(old) {
                            warn!("reclaiming slot state orphaned by dissolved network {old}");
                        }
                        self.reattach_detached_disk(&slot, id, tx)?;
                        tx.upsert_slot(
                            bay,
                            SlotRow {
                                network: NetworkRef::Bound(id),
                                ..slot
                            },
                        );
                    }
                    // Already ours; a disk may still be detached if the
                    // network dissolved and reformed between inserts.
                    NetworkRef::Bound(bound) if bound == id => {
                        self.reattach_detached_disk(&slot, id, tx)?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn reattach_detached_disk(
        &self,
        slot: &SlotRow,
        id: NetworkId,
        tx: &mut S::Tx<'_>,
    ) -> Result<(), RegistryError> {
        let Some(disk_id) = slot.disk_id else {
            return Ok(());
        };
        if let Some(disk) = self.store.disk(disk_id)? {
            if disk.network == NetworkRef::None {
                tx.upsert_disk(
                    disk_id,
                    DiskRow {
                        network: NetworkRef::Bound(id),
                        ..disk
                    },
                );
            }
        }
        Ok(())
    }

    /// Retire a persisted network. Membership and metadata rows are deleted;
    /// slot rows flip to `Orphaned(id)` and their disks are detached in
    /// place; the security terminal keeps its owner with the association
    /// nulled. A no-op when the id is already gone.
    pub fn unregister(&self, id: NetworkId) -> Result<(), RegistryError> {
        self.locks.serialized(id, || {
            if self.store.network(id)?.is_none() {
                return Ok(());
            }

            let mut tx = self.store.begin()?;
            for (pos, slot) in self.store.slots_bound_to(id)? {
                if let Some(disk_id) = slot.disk_id {
                    if let Some(disk) = self.store.disk(disk_id)? {
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
                    pos,
                    SlotRow {
                        network: NetworkRef::Orphaned(id),
                        ..slot
                    },
                );
            }
            for (pos, terminal) in self.store.terminals_bound_to(id)? {
                tx.upsert_terminal(
                    pos,
                    TerminalRow {
                        network: NetworkRef::None,
                        ..terminal
                    },
                );
            }
            tx.delete_blocks_of(id);
            tx.delete_network(id);
            tx.commit()?;
            info!("unregistered network {id}; dependent slots tagged for recovery");
            Ok(())
        })
    }

    /// Drop per-id locks no mutation currently holds.
    pub fn evict_unused_locks(&self) -> usize {
        self.locks.evict_unused()
    }
}
