// Unit classification: material signature + marker agreement.
//
// A cell is a unit only when both halves agree: the world holds a recognized
// material there AND a marker records a kind that material can house. Either
// half alone is insufficient — a look-alike decorative block has the material
// but no marker, and a stale marker left under a mined-out cell has no
// material.

use crate::grid::{MarkerView, UnitGrid};
use crate::types::{BlockPos, UnitKind};

/// Classify the cell at `pos`. Returns `None` unless a recognized material
/// and a compatible marker are both present.
pub fn classify<G: UnitGrid, M: MarkerView>(
    grid: &G,
    markers: &M,
    pos: BlockPos,
) -> Option<UnitKind> {
    let material = grid.material_at(pos)?;
    let kind = markers.marker_at(pos)?;
    if material.candidate_kinds().contains(&kind) {
        Some(kind)
    } else {
        // Marker disagrees with the material occupying the cell — e.g. the
        // unit was mined and a different signature block placed over a stale
        // marker. Treat as not-a-unit.
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{MarkerTable, SparseGrid};
    use crate::types::{Material, WorldId};

    fn pos(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos::new(WorldId(0), x, y, z)
    }

    #[test]
    fn classify_requires_both_material_and_marker() {
        let mut grid = SparseGrid::new();
        let mut markers = MarkerTable::new();
        let p = pos(0, 0, 0);

        // Empty cell.
        assert_eq!(classify(&grid, &markers, p), None);

        // Material without a marker: decorative look-alike.
        grid.set(p, Material::ServerChassis);
        assert_eq!(classify(&grid, &markers, p), None);

        // Both present and compatible.
        markers.set(p, UnitKind::Server);
        assert_eq!(classify(&grid, &markers, p), Some(UnitKind::Server));

        // Marker without material: stale record under a mined cell.
        grid.clear(p);
        assert_eq!(classify(&grid, &markers, p), None);
    }

    #[test]
    fn classify_rejects_incompatible_marker() {
        let mut grid = SparseGrid::new();
        let mut markers = MarkerTable::new();
        let p = pos(1, 0, 0);

        grid.set(p, Material::Conduit);
        markers.set(p, UnitKind::Server);
        assert_eq!(classify(&grid, &markers, p), None);
    }

    #[test]
    fn classify_disambiguates_shared_materials() {
        let mut grid = SparseGrid::new();
        let mut markers = MarkerTable::new();
        let a = pos(0, 0, 0);
        let b = pos(1, 0, 0);

        // Same material, different markers: the marker decides.
        grid.set(a, Material::TerminalPanel);
        grid.set(b, Material::TerminalPanel);
        markers.set(a, UnitKind::Terminal);
        markers.set(b, UnitKind::SecurityTerminal);

        assert_eq!(classify(&grid, &markers, a), Some(UnitKind::Terminal));
        assert_eq!(classify(&grid, &markers, b), Some(UnitKind::SecurityTerminal));
    }
}
