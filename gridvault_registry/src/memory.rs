// In-memory store with an optional JSON snapshot on disk.
//
// The memory image is the source of truth. A transaction queues writes; on
// commit they are applied to a copy of the image, the snapshot (when a path
// is configured) is written from that copy first, and only then does the
// copy replace the live image. A failed snapshot write therefore aborts the
// commit with both memory and disk untouched — all-or-nothing.
//
// Snapshot writes go through a temp file in the same directory followed by a
// rename, so a crash mid-write never leaves a half-written file under the
// live name.

use crate::error::RegistryError;
use crate::schema::{BlockRow, DiskId, DiskRow, NetworkRow, SlotRow, TerminalRow};
use crate::store::{Clock, NetworkStore, StoreTx, SystemClock};
use gridvault_topology::types::{BlockPos, NetworkId, NetworkRef, UnitKind};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const SNAPSHOT_VERSION: u32 = 1;

/// The complete table image. All map keys serialize as strings, so the
/// snapshot is plain JSON objects throughout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Tables {
    networks: BTreeMap<NetworkId, NetworkRow>,
    blocks: BTreeMap<BlockPos, BlockRow>,
    slots: BTreeMap<BlockPos, Vec<SlotRow>>,
    disks: BTreeMap<DiskId, DiskRow>,
    terminals: BTreeMap<BlockPos, TerminalRow>,
    markers: BTreeMap<BlockPos, UnitKind>,
}

// Parsed first, alone: the version gate must fire before any attempt to
// decode tables whose shape may have changed.
#[derive(Deserialize)]
struct SnapshotHeader {
    version: u32,
}

#[derive(Deserialize)]
struct SnapshotFile {
    saved_at: u64,
    tables: Tables,
}

#[derive(Serialize)]
struct SnapshotView<'a> {
    version: u32,
    saved_at: u64,
    tables: &'a Tables,
}

#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// A store with no snapshot file. State lives and dies with the value.
    pub fn in_memory() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            path: None,
        }
    }

    /// Open a snapshot-backed store. A missing file means a fresh store; a
    /// present one is loaded and version-checked.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let tables = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let header: SnapshotHeader = serde_json::from_str(&raw)?;
            if header.version != SNAPSHOT_VERSION {
                return Err(RegistryError::SnapshotVersion {
                    expected: SNAPSHOT_VERSION,
                    found: header.version,
                });
            }
            let snapshot: SnapshotFile = serde_json::from_str(&raw)?;
            info!(
                "loaded {} networks from snapshot {} (saved at {})",
                snapshot.tables.networks.len(),
                path.display(),
                snapshot.saved_at
            );
            snapshot.tables
        } else {
            Tables::default()
        };
        Ok(Self {
            tables: Mutex::new(tables),
            path: Some(path),
        })
    }

    /// Write the current image to the snapshot file. No-op for a pure
    /// in-memory store.
    pub fn save(&self) -> Result<(), RegistryError> {
        if let Some(path) = &self.path {
            write_snapshot(path, &self.lock_tables())?;
        }
        Ok(())
    }

    // The image is only ever replaced wholesale by a committed transaction,
    // so even after a panic elsewhere the tables are a complete committed
    // state and the poison flag can be cleared.
    fn lock_tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn write_snapshot(path: &Path, tables: &Tables) -> Result<(), RegistryError> {
    let view = SnapshotView {
        version: SNAPSHOT_VERSION,
        saved_at: SystemClock.now_millis(),
        tables,
    };
    let json = serde_json::to_string_pretty(&view)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json.as_bytes())?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl NetworkStore for MemoryStore {
    type Tx<'a> = MemTx<'a>;

    fn begin(&self) -> Result<Self::Tx<'_>, RegistryError> {
        Ok(MemTx {
            store: self,
            ops: Vec::new(),
        })
    }

    fn network(&self, id: NetworkId) -> Result<Option<NetworkRow>, RegistryError> {
        Ok(self.lock_tables().networks.get(&id).cloned())
    }

    fn network_ids(&self) -> Result<Vec<NetworkId>, RegistryError> {
        Ok(self.lock_tables().networks.keys().copied().collect())
    }

    fn block_at(&self, pos: BlockPos) -> Result<Option<BlockRow>, RegistryError> {
        Ok(self.lock_tables().blocks.get(&pos).copied())
    }

    fn blocks_of(&self, id: NetworkId) -> Result<Vec<(BlockPos, BlockRow)>, RegistryError> {
        Ok(self
            .lock_tables()
            .blocks
            .iter()
            .filter(|(_, row)| row.network == id)
            .map(|(&pos, &row)| (pos, row))
            .collect())
    }

    fn slots_at(&self, pos: BlockPos) -> Result<Vec<SlotRow>, RegistryError> {
        Ok(self.lock_tables().slots.get(&pos).cloned().unwrap_or_default())
    }

    fn slots_bound_to(&self, id: NetworkId) -> Result<Vec<(BlockPos, SlotRow)>, RegistryError> {
        Ok(self
            .lock_tables()
            .slots
            .iter()
            .flat_map(|(&pos, rows)| rows.iter().map(move |&row| (pos, row)))
            .filter(|(_, row)| row.network == NetworkRef::Bound(id))
            .collect())
    }

    fn disk(&self, id: DiskId) -> Result<Option<DiskRow>, RegistryError> {
        Ok(self.lock_tables().disks.get(&id).copied())
    }

    fn terminal_at(&self, pos: BlockPos) -> Result<Option<TerminalRow>, RegistryError> {
        Ok(self.lock_tables().terminals.get(&pos).cloned())
    }

    fn terminals_bound_to(
        &self,
        id: NetworkId,
    ) -> Result<Vec<(BlockPos, TerminalRow)>, RegistryError> {
        Ok(self
            .lock_tables()
            .terminals
            .iter()
            .filter(|(_, row)| row.network == NetworkRef::Bound(id))
            .map(|(&pos, row)| (pos, row.clone()))
            .collect())
    }

    fn marker_at(&self, pos: BlockPos) -> Result<Option<UnitKind>, RegistryError> {
        Ok(self.lock_tables().markers.get(&pos).copied())
    }

    fn markers(&self) -> Result<Vec<(BlockPos, UnitKind)>, RegistryError> {
        Ok(self
            .lock_tables()
            .markers
            .iter()
            .map(|(&pos, &kind)| (pos, kind))
            .collect())
    }
}

enum StoreOp {
    UpsertNetwork(NetworkId, NetworkRow),
    DeleteNetwork(NetworkId),
    InsertBlock(BlockPos, BlockRow),
    DeleteBlocksOf(NetworkId),
    UpsertSlot(BlockPos, SlotRow),
    UpsertDisk(DiskId, DiskRow),
    UpsertTerminal(BlockPos, TerminalRow),
    DeleteTerminal(BlockPos),
    SetMarker(BlockPos, UnitKind),
    ClearMarker(BlockPos),
}

fn apply(tables: &mut Tables, op: StoreOp) {
    match op {
        StoreOp::UpsertNetwork(id, row) => {
            tables.networks.insert(id, row);
        }
        StoreOp::DeleteNetwork(id) => {
            tables.networks.remove(&id);
        }
        StoreOp::InsertBlock(pos, row) => {
            tables.blocks.insert(pos, row);
        }
        StoreOp::DeleteBlocksOf(id) => {
            tables.blocks.retain(|_, row| row.network != id);
        }
        StoreOp::UpsertSlot(pos, row) => {
            let slots = tables.slots.entry(pos).or_default();
            match slots.iter_mut().find(|s| s.slot_number == row.slot_number) {
                Some(existing) => *existing = row,
                None => {
                    slots.push(row);
                    slots.sort_by_key(|s| s.slot_number);
                }
            }
        }
        StoreOp::UpsertDisk(id, row) => {
            tables.disks.insert(id, row);
        }
        StoreOp::UpsertTerminal(pos, row) => {
            tables.terminals.insert(pos, row);
        }
        StoreOp::DeleteTerminal(pos) => {
            tables.terminals.remove(&pos);
        }
        StoreOp::SetMarker(pos, kind) => {
            tables.markers.insert(pos, kind);
        }
        StoreOp::ClearMarker(pos) => {
            tables.markers.remove(&pos);
        }
    }
}

/// Queued writes against a `MemoryStore`.
pub struct MemTx<'a> {
    store: &'a MemoryStore,
    ops: Vec<StoreOp>,
}

impl StoreTx for MemTx<'_> {
    fn upsert_network(&mut self, id: NetworkId, row: NetworkRow) {
        self.ops.push(StoreOp::UpsertNetwork(id, row));
    }

    fn delete_network(&mut self, id: NetworkId) {
        self.ops.push(StoreOp::DeleteNetwork(id));
    }

    fn insert_block(&mut self, pos: BlockPos, row: BlockRow) {
        self.ops.push(StoreOp::InsertBlock(pos, row));
    }

    fn delete_blocks_of(&mut self, id: NetworkId) {
        self.ops.push(StoreOp::DeleteBlocksOf(id));
    }

    fn upsert_slot(&mut self, pos: BlockPos, row: SlotRow) {
        self.ops.push(StoreOp::UpsertSlot(pos, row));
    }

    fn upsert_disk(&mut self, id: DiskId, row: DiskRow) {
        self.ops.push(StoreOp::UpsertDisk(id, row));
    }

    fn upsert_terminal(&mut self, pos: BlockPos, row: TerminalRow) {
        self.ops.push(StoreOp::UpsertTerminal(pos, row));
    }

    fn delete_terminal(&mut self, pos: BlockPos) {
        self.ops.push(StoreOp::DeleteTerminal(pos));
    }

    fn set_marker(&mut self, pos: BlockPos, kind: UnitKind) {
        self.ops.push(StoreOp::SetMarker(pos, kind));
    }

    fn clear_marker(&mut self, pos: BlockPos) {
        self.ops.push(StoreOp::ClearMarker(pos));
    }

    fn commit(self) -> Result<(), RegistryError> {
        let mut tables = self.store.lock_tables();
        let mut next = tables.clone();
        for op in self.ops {
            apply(&mut next, op);
        }
        if let Some(path) = &self.store.path {
            write_snapshot(path, &next)?;
        }
        *tables = next;
        Ok(())
    }
}
