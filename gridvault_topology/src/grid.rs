// Spatial access for detection walks.
//
// Detection needs three read-only views of the world: what material occupies
// a cell, what unit kind (if any) is marked there, and what persisted network
// association a cell carries. Each is a trait so the walk can run against the
// live store, an in-memory fixture, or a hypothetical overlay without
// knowing the difference.
//
// Connectivity is strictly 6-adjacent (face neighbors). Diagonal contact
// never links units.

use crate::types::{BlockPos, Material, NetworkId, NetworkRef, UnitKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The six face-adjacent offsets. Order is fixed so walks are reproducible.
pub const FACE_OFFSETS: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// The six face neighbors of a position, in `FACE_OFFSETS` order. Neighbors
/// never cross worlds.
pub fn face_neighbors(pos: BlockPos) -> [BlockPos; 6] {
    FACE_OFFSETS.map(|(dx, dy, dz)| BlockPos::new(pos.world, pos.x + dx, pos.y + dy, pos.z + dz))
}

// ---------------------------------------------------------------------------
// Read-only world views
// ---------------------------------------------------------------------------

/// Material lookup. `None` means the cell is empty or holds a material
/// outside the recognized signature set.
pub trait UnitGrid {
    fn material_at(&self, pos: BlockPos) -> Option<Material>;
}

/// Marker lookup: the unit kind recorded for a cell when its unit was
/// placed. Ground truth for disambiguating shared materials.
pub trait MarkerView {
    fn marker_at(&self, pos: BlockPos) -> Option<UnitKind>;
}

/// Persisted network association lookup.
pub trait NetworkBindings {
    /// The association recorded for this cell. Cells with no record are
    /// `Standalone` — physically present, persisted nowhere.
    fn binding(&self, pos: BlockPos) -> NetworkRef;

    /// Whether the given valid network contains a SecurityTerminal. Used by
    /// the conflict census, which cannot afford to walk into bound networks.
    fn has_security_terminal(&self, id: NetworkId) -> bool;
}

// ---------------------------------------------------------------------------
// Sparse in-memory implementations
// ---------------------------------------------------------------------------

/// Sparse material grid over an unbounded world. Absent cells are empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SparseGrid {
    cells: BTreeMap<BlockPos, Material>,
}

impl SparseGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, pos: BlockPos, material: Material) {
        self.cells.insert(pos, material);
    }

    pub fn clear(&mut self, pos: BlockPos) {
        self.cells.remove(&pos);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl UnitGrid for SparseGrid {
    fn material_at(&self, pos: BlockPos) -> Option<Material> {
        self.cells.get(&pos).copied()
    }
}

/// Sparse marker table, the fixture-side counterpart of the persisted marker
/// rows.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarkerTable {
    markers: BTreeMap<BlockPos, UnitKind>,
}

impl MarkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, pos: BlockPos, kind: UnitKind) {
        self.markers.insert(pos, kind);
    }

    pub fn clear(&mut self, pos: BlockPos) {
        self.markers.remove(&pos);
    }
}

impl MarkerView for MarkerTable {
    fn marker_at(&self, pos: BlockPos) -> Option<UnitKind> {
        self.markers.get(&pos).copied()
    }
}

/// In-memory binding table for tests and standalone detection. Cells without
/// an entry report `Standalone`.
#[derive(Clone, Debug, Default)]
pub struct BindingTable {
    bindings: BTreeMap<BlockPos, NetworkRef>,
    secured: BTreeSet<NetworkId>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, pos: BlockPos, binding: NetworkRef) {
        self.bindings.insert(pos, binding);
    }

    /// Mark a network as containing a SecurityTerminal.
    pub fn with_security(&mut self, id: NetworkId) {
        self.secured.insert(id);
    }
}

impl NetworkBindings for BindingTable {
    fn binding(&self, pos: BlockPos) -> NetworkRef {
        self.bindings
            .get(&pos)
            .copied()
            .unwrap_or(NetworkRef::Standalone)
    }

    fn has_security_terminal(&self, id: NetworkId) -> bool {
        self.secured.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorldId;

    fn pos(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos::new(WorldId(0), x, y, z)
    }

    #[test]
    fn face_neighbors_are_six_distinct_adjacent_cells() {
        let center = pos(2, 3, 4);
        let neighbors = face_neighbors(center);
        assert_eq!(neighbors.len(), 6);
        let unique: BTreeSet<_> = neighbors.iter().copied().collect();
        assert_eq!(unique.len(), 6);
        for n in neighbors {
            let d = (n.x - center.x).abs() + (n.y - center.y).abs() + (n.z - center.z).abs();
            assert_eq!(d, 1, "face neighbor must be exactly one step away");
            assert_eq!(n.world, center.world);
        }
    }

    #[test]
    fn sparse_grid_set_clear_lookup() {
        let mut grid = SparseGrid::new();
        assert!(grid.is_empty());
        assert_eq!(grid.material_at(pos(0, 0, 0)), None);

        grid.set(pos(0, 0, 0), Material::ServerChassis);
        grid.set(pos(1, 0, 0), Material::Conduit);
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.material_at(pos(0, 0, 0)), Some(Material::ServerChassis));
        assert_eq!(grid.material_at(pos(1, 0, 0)), Some(Material::Conduit));

        grid.clear(pos(0, 0, 0));
        assert_eq!(grid.material_at(pos(0, 0, 0)), None);
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn binding_table_defaults_to_standalone() {
        let mut table = BindingTable::new();
        let id = NetworkId(pos(9, 9, 9));
        assert_eq!(table.binding(pos(0, 0, 0)), NetworkRef::Standalone);

        table.bind(pos(0, 0, 0), NetworkRef::Bound(id));
        table.bind(pos(1, 0, 0), NetworkRef::Orphaned(id));
        assert_eq!(table.binding(pos(0, 0, 0)), NetworkRef::Bound(id));
        assert_eq!(table.binding(pos(1, 0, 0)), NetworkRef::Orphaned(id));

        assert!(!table.has_security_terminal(id));
        table.with_security(id);
        assert!(table.has_security_terminal(id));
    }
}
