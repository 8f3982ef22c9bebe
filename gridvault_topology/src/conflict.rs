// Placement conflict analysis: simulate before mutating.
//
// `check_placement` answers "if a unit of this kind existed at this cell,
// would the surface it joins hold two or more sources of Server, or two or
// more sources of SecurityTerminal?" — with the world left completely
// untouched. The hypothetical unit is overlaid on the real grid and marker
// views, never written.
//
// The census walk differs from detection in one way: it never adopts a home
// network. Every currently-valid bound id it touches is summarized as one
// source (a valid network holds exactly one Server by construction) and the
// walk stops at its border. Standalone and orphaned units are walked and
// counted by their physical kind, the proposed unit included.

use crate::classify::classify;
use crate::config::NetworkLimits;
use crate::grid::{MarkerView, NetworkBindings, UnitGrid, face_neighbors};
use crate::types::{BlockPos, Material, NetworkId, NetworkRef, UnitKind};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// Outcome of a placement check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    NoConflict,
    Conflict(ConflictReason),
}

/// Why a placement was vetoed. Each variant carries every source the census
/// found, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictReason {
    DuplicateServerSource {
        /// Valid persisted networks reachable from the proposed cell.
        networks: BTreeSet<NetworkId>,
        /// Standalone or orphaned Server units reachable, the proposed unit
        /// included when it is a Server.
        standalone: BTreeSet<BlockPos>,
    },
    DuplicateSecurityTerminalSource {
        /// Valid persisted networks reachable that contain a SecurityTerminal.
        networks: BTreeSet<NetworkId>,
        standalone: BTreeSet<BlockPos>,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::DuplicateServerSource {
                networks,
                standalone,
            } => {
                if networks.len() >= 2 && standalone.is_empty() {
                    write!(
                        f,
                        "would merge {} valid networks that each contain a server",
                        networks.len()
                    )
                } else {
                    write!(
                        f,
                        "duplicate server source: {} bound network(s) and {} standalone server(s) reachable",
                        networks.len(),
                        standalone.len()
                    )
                }
            }
            ConflictReason::DuplicateSecurityTerminalSource {
                networks,
                standalone,
            } => {
                write!(
                    f,
                    "duplicate security terminal source: {} bound network(s) and {} standalone terminal(s) reachable",
                    networks.len(),
                    standalone.len()
                )
            }
        }
    }
}

// Overlay views presenting the proposed unit as if already placed.

struct HypotheticalGrid<'a, G> {
    inner: &'a G,
    pos: BlockPos,
    material: Material,
}

impl<G: UnitGrid> UnitGrid for HypotheticalGrid<'_, G> {
    fn material_at(&self, pos: BlockPos) -> Option<Material> {
        if pos == self.pos {
            Some(self.material)
        } else {
            self.inner.material_at(pos)
        }
    }
}

struct HypotheticalMarkers<'a, M> {
    inner: &'a M,
    pos: BlockPos,
    kind: UnitKind,
}

impl<M: MarkerView> MarkerView for HypotheticalMarkers<'_, M> {
    fn marker_at(&self, pos: BlockPos) -> Option<UnitKind> {
        if pos == self.pos {
            Some(self.kind)
        } else {
            self.inner.marker_at(pos)
        }
    }
}

/// Decide whether placing `kind` at `pos` would bridge two or more Server
/// sources, or two or more SecurityTerminal sources. Pure read.
pub fn check_placement<G, M, B>(
    grid: &G,
    markers: &M,
    bindings: &B,
    limits: &NetworkLimits,
    pos: BlockPos,
    kind: UnitKind,
) -> Placement
where
    G: UnitGrid,
    M: MarkerView,
    B: NetworkBindings,
{
    let grid = HypotheticalGrid {
        inner: grid,
        pos,
        material: kind.expected_material(),
    };
    let markers = HypotheticalMarkers {
        inner: markers,
        pos,
        kind,
    };

    let mut touched: BTreeSet<NetworkId> = BTreeSet::new();
    let mut standalone_servers: BTreeSet<BlockPos> = BTreeSet::new();
    let mut standalone_security: BTreeSet<BlockPos> = BTreeSet::new();

    let mut visited: FxHashSet<BlockPos> = FxHashSet::default();
    let mut queue: VecDeque<BlockPos> = VecDeque::new();
    visited.insert(pos);
    queue.push_back(pos);

    let mut popped = 0usize;
    while let Some(cell) = queue.pop_front() {
        if popped >= limits.walk_budget {
            // Undercounting here is safe: a surface the census cannot finish
            // cannot validate either, so the subsequent detection truncates
            // and the placement is reverted before anything registers.
            break;
        }
        popped += 1;

        let Some(cell_kind) = classify(&grid, &markers, cell) else {
            continue;
        };

        if let NetworkRef::Bound(id) = bindings.binding(cell) {
            // One source per valid network; never walk inside it.
            touched.insert(id);
            continue;
        }

        match cell_kind {
            UnitKind::Server => {
                standalone_servers.insert(cell);
            }
            UnitKind::SecurityTerminal => {
                standalone_security.insert(cell);
            }
            _ => {}
        }

        for neighbor in face_neighbors(cell) {
            if visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    if touched.len() + standalone_servers.len() >= 2 {
        return Placement::Conflict(ConflictReason::DuplicateServerSource {
            networks: touched,
            standalone: standalone_servers,
        });
    }

    let secured: BTreeSet<NetworkId> = touched
        .iter()
        .copied()
        .filter(|&id| bindings.has_security_terminal(id))
        .collect();
    if secured.len() + standalone_security.len() >= 2 {
        return Placement::Conflict(ConflictReason::DuplicateSecurityTerminalSource {
            networks: secured,
            standalone: standalone_security,
        });
    }

    Placement::NoConflict
}
