// Topology detection: breadth-first discovery of the connected component
// around a seed coordinate.
//
// The traversal starts from every face-adjacent neighbor of the seed (the
// seed cell itself is re-entered through whichever neighbor propagates back
// into it), expands across 6-connectivity only, and records every classified
// unit into a `CandidateNetwork`. Cells that classify as nothing are dropped
// without expansion.
//
// Expansion rules, the subtle part:
// - Any unit not bound to a currently-valid persisted network (standalone or
//   orphaned) propagates connectivity through itself, cables and non-cables
//   alike. A chain of terminals and drive bays with no cable is one network.
// - The first currently-valid persisted id encountered is adopted as the
//   walk's home network and its members are walked normally.
// - A unit bound to a *different* currently-valid id is never recorded or
//   expanded through; its id goes into `touched_networks` for the conflict
//   analyzer. Two distinct valid networks do not merge through mere
//   adjacency.
//
// A second Server or second SecurityTerminal among recorded members aborts
// the walk immediately.
//
// Detection is a pure read: no world or store mutation happens here.

use crate::classify::classify;
use crate::config::NetworkLimits;
use crate::grid::{MarkerView, NetworkBindings, UnitGrid, face_neighbors};
use crate::types::{BlockPos, CandidateNetwork, NetworkId, NetworkRef, UnitKind};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Outcome of one detection walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Detection {
    /// The walk completed (or hit its visit budget, see
    /// `CandidateNetwork::truncated`).
    Complete(CandidateNetwork),
    /// A second Server was discovered mid-walk; aborted.
    DuplicateServer { first: BlockPos, second: BlockPos },
    /// A second SecurityTerminal was discovered mid-walk; aborted.
    DuplicateSecurityTerminal { first: BlockPos, second: BlockPos },
}

impl Detection {
    pub fn candidate(&self) -> Option<&CandidateNetwork> {
        match self {
            Detection::Complete(candidate) => Some(candidate),
            _ => None,
        }
    }
}

/// Walk the component reachable from `seed`'s neighbors.
///
/// Deterministic for a given world state: the queue order is fixed by
/// `FACE_OFFSETS` and all output sets are ordered, so two walks from the same
/// seed produce equal candidates.
pub fn detect<G, M, B>(
    grid: &G,
    markers: &M,
    bindings: &B,
    limits: &NetworkLimits,
    seed: BlockPos,
) -> Detection
where
    G: UnitGrid,
    M: MarkerView,
    B: NetworkBindings,
{
    let mut candidate = CandidateNetwork::new(seed);
    let mut home: Option<NetworkId> = None;

    // The visited set is hash-ordered for speed; it never influences output
    // ordering, only membership.
    let mut visited: FxHashSet<BlockPos> = FxHashSet::default();
    let mut queue: VecDeque<BlockPos> = VecDeque::new();
    for neighbor in face_neighbors(seed) {
        if visited.insert(neighbor) {
            queue.push_back(neighbor);
        }
    }

    let mut popped = 0usize;
    while let Some(cell) = queue.pop_front() {
        if popped >= limits.walk_budget {
            candidate.truncated = true;
            break;
        }
        popped += 1;

        let Some(kind) = classify(grid, markers, cell) else {
            continue;
        };

        match bindings.binding(cell) {
            NetworkRef::Bound(id) => match home {
                None => home = Some(id),
                Some(adopted) if adopted == id => {}
                Some(_) => {
                    // Foreign valid network: note it and stop at the border.
                    candidate.touched_networks.insert(id);
                    continue;
                }
            },
            NetworkRef::Orphaned(_) | NetworkRef::Standalone | NetworkRef::None => {}
        }

        if kind == UnitKind::Server {
            if let Some(&first) = candidate.servers.iter().next() {
                return Detection::DuplicateServer {
                    first,
                    second: cell,
                };
            }
        }
        if kind == UnitKind::SecurityTerminal {
            if let Some(&first) = candidate.security_terminals.iter().next() {
                return Detection::DuplicateSecurityTerminal {
                    first,
                    second: cell,
                };
            }
        }

        candidate.record(cell, kind);

        for neighbor in face_neighbors(cell) {
            if visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    Detection::Complete(candidate)
}

/// Run independent detection walks for many seeds in parallel. Each walk is
/// read-only, so they share the world views freely. Order of the result
/// matches the seed order.
pub fn detect_all<G, M, B>(
    grid: &G,
    markers: &M,
    bindings: &B,
    limits: &NetworkLimits,
    seeds: &[BlockPos],
) -> Vec<(BlockPos, Detection)>
where
    G: UnitGrid + Sync,
    M: MarkerView + Sync,
    B: NetworkBindings + Sync,
{
    seeds
        .par_iter()
        .map(|&seed| (seed, detect(grid, markers, bindings, limits, seed)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{BindingTable, MarkerTable, SparseGrid};
    use crate::types::WorldId;

    fn pos(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos::new(WorldId(0), x, y, z)
    }

    struct Fixture {
        grid: SparseGrid,
        markers: MarkerTable,
        bindings: BindingTable,
        limits: NetworkLimits,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                grid: SparseGrid::new(),
                markers: MarkerTable::new(),
                bindings: BindingTable::new(),
                limits: NetworkLimits::default(),
            }
        }

        fn unit(&mut self, p: BlockPos, kind: UnitKind) -> &mut Self {
            self.grid.set(p, kind.expected_material());
            self.markers.set(p, kind);
            self
        }

        fn bound_unit(&mut self, p: BlockPos, kind: UnitKind, id: NetworkId) -> &mut Self {
            self.unit(p, kind);
            self.bindings.bind(p, NetworkRef::Bound(id));
            self
        }

        fn detect(&self, seed: BlockPos) -> Detection {
            detect(&self.grid, &self.markers, &self.bindings, &self.limits, seed)
        }
    }

    /// Server, DriveBay, Terminal in a face-adjacent row — the minimal
    /// complete network, no cable needed.
    fn minimal_chain() -> Fixture {
        let mut f = Fixture::new();
        f.unit(pos(0, 0, 0), UnitKind::Server)
            .unit(pos(1, 0, 0), UnitKind::DriveBay)
            .unit(pos(2, 0, 0), UnitKind::Terminal);
        f
    }

    #[test]
    fn minimal_chain_is_one_component() {
        let f = minimal_chain();
        let Detection::Complete(c) = f.detect(pos(0, 0, 0)) else {
            panic!("expected a complete walk");
        };
        assert_eq!(c.servers.len(), 1);
        assert_eq!(c.drive_bays.len(), 1);
        assert_eq!(c.terminals.len(), 1);
        assert_eq!(c.cables.len(), 0);
        assert!(!c.truncated);
        assert!(c.touched_networks.is_empty());
    }

    #[test]
    fn detection_is_idempotent() {
        let f = minimal_chain();
        assert_eq!(f.detect(pos(0, 0, 0)), f.detect(pos(0, 0, 0)));
    }

    #[test]
    fn detection_is_seed_symmetric() {
        let f = minimal_chain();
        let walks: Vec<_> = [pos(0, 0, 0), pos(1, 0, 0), pos(2, 0, 0)]
            .into_iter()
            .map(|seed| match f.detect(seed) {
                Detection::Complete(c) => c,
                other => panic!("expected complete walk, got {other:?}"),
            })
            .collect();
        assert!(walks[0].same_membership(&walks[1]));
        assert!(walks[1].same_membership(&walks[2]));
    }

    #[test]
    fn walk_starts_from_neighbors_so_an_isolated_unit_is_invisible() {
        let mut f = Fixture::new();
        f.unit(pos(0, 0, 0), UnitKind::Server);
        let Detection::Complete(c) = f.detect(pos(0, 0, 0)) else {
            panic!("expected a complete walk");
        };
        // No neighbor propagates back into the seed, so nothing is found.
        assert_eq!(c.member_count(), 0);
    }

    #[test]
    fn unknown_cells_do_not_bridge() {
        let mut f = Fixture::new();
        f.unit(pos(0, 0, 0), UnitKind::Server)
            // gap at (1,0,0)
            .unit(pos(2, 0, 0), UnitKind::Terminal);
        let Detection::Complete(c) = f.detect(pos(0, 0, 0)) else {
            panic!("expected a complete walk");
        };
        assert_eq!(c.servers.len(), 1);
        assert_eq!(c.terminals.len(), 0, "gap must stop the walk");
    }

    #[test]
    fn diagonal_contact_does_not_connect() {
        let mut f = Fixture::new();
        f.unit(pos(0, 0, 0), UnitKind::Server)
            .unit(pos(1, 1, 0), UnitKind::Terminal);
        let Detection::Complete(c) = f.detect(pos(0, 0, 0)) else {
            panic!("expected a complete walk");
        };
        assert_eq!(c.terminals.len(), 0);
    }

    #[test]
    fn every_unbound_kind_propagates_like_a_cable() {
        // Server - Exporter - DriveBay - SecurityTerminal - Terminal chain:
        // no cable anywhere, still one component.
        let mut f = Fixture::new();
        f.unit(pos(0, 0, 0), UnitKind::Server)
            .unit(pos(1, 0, 0), UnitKind::Exporter)
            .unit(pos(2, 0, 0), UnitKind::DriveBay)
            .unit(pos(3, 0, 0), UnitKind::SecurityTerminal)
            .unit(pos(4, 0, 0), UnitKind::Terminal);
        let Detection::Complete(c) = f.detect(pos(0, 0, 0)) else {
            panic!("expected a complete walk");
        };
        assert_eq!(c.member_count(), 5);
        assert_eq!(c.terminals.len(), 1, "terminal beyond the security terminal must be reached");
    }

    #[test]
    fn second_server_aborts_the_walk() {
        let mut f = Fixture::new();
        f.unit(pos(0, 0, 0), UnitKind::Server)
            .unit(pos(1, 0, 0), UnitKind::Cable)
            .unit(pos(2, 0, 0), UnitKind::Server);
        match f.detect(pos(1, 0, 0)) {
            Detection::DuplicateServer { first, second } => {
                assert_ne!(first, second);
            }
            other => panic!("expected duplicate server, got {other:?}"),
        }
    }

    #[test]
    fn second_security_terminal_aborts_the_walk() {
        let mut f = Fixture::new();
        f.unit(pos(0, 0, 0), UnitKind::SecurityTerminal)
            .unit(pos(1, 0, 0), UnitKind::Cable)
            .unit(pos(2, 0, 0), UnitKind::SecurityTerminal);
        assert!(matches!(
            f.detect(pos(1, 0, 0)),
            Detection::DuplicateSecurityTerminal { .. }
        ));
    }

    #[test]
    fn walk_adopts_the_first_valid_network_as_home() {
        // A persisted network A plus a fresh standalone terminal touching it:
        // the walk must expand through A and include both.
        let a = NetworkId(pos(0, 0, 0));
        let mut f = Fixture::new();
        f.bound_unit(pos(0, 0, 0), UnitKind::Server, a)
            .bound_unit(pos(1, 0, 0), UnitKind::DriveBay, a)
            .bound_unit(pos(2, 0, 0), UnitKind::Terminal, a)
            .unit(pos(3, 0, 0), UnitKind::Terminal); // the new placement
        let Detection::Complete(c) = f.detect(pos(3, 0, 0)) else {
            panic!("expected a complete walk");
        };
        assert_eq!(c.servers.len(), 1);
        assert_eq!(c.terminals.len(), 2);
        assert!(c.touched_networks.is_empty());
    }

    #[test]
    fn foreign_valid_network_is_touched_but_not_merged() {
        // Two persisted networks physically adjacent. Walking from inside A
        // must not absorb B's units.
        let a = NetworkId(pos(0, 0, 0));
        let b = NetworkId(pos(3, 0, 0));
        let mut f = Fixture::new();
        f.bound_unit(pos(0, 0, 0), UnitKind::Server, a)
            .bound_unit(pos(1, 0, 0), UnitKind::Terminal, a)
            .bound_unit(pos(2, 0, 0), UnitKind::Terminal, b)
            .bound_unit(pos(3, 0, 0), UnitKind::Server, b);
        let Detection::Complete(c) = f.detect(pos(0, 0, 0)) else {
            panic!("expected a complete walk");
        };
        assert_eq!(c.servers.len(), 1, "B's server must stay outside");
        assert_eq!(c.terminals.len(), 1);
        assert_eq!(c.touched_networks, [b].into());
    }

    #[test]
    fn orphaned_units_propagate_like_standalone_ones() {
        let old = NetworkId(pos(9, 9, 9));
        let mut f = Fixture::new();
        f.unit(pos(0, 0, 0), UnitKind::Server)
            .unit(pos(1, 0, 0), UnitKind::DriveBay)
            .unit(pos(2, 0, 0), UnitKind::Terminal);
        f.bindings.bind(pos(1, 0, 0), NetworkRef::Orphaned(old));
        let Detection::Complete(c) = f.detect(pos(0, 0, 0)) else {
            panic!("expected a complete walk");
        };
        assert_eq!(c.member_count(), 3);
        assert!(c.touched_networks.is_empty(), "orphaned ids are not live networks");
    }

    #[test]
    fn walk_budget_marks_truncation() {
        let mut f = Fixture::new();
        f.unit(pos(0, 0, 0), UnitKind::Server);
        for x in 1..32 {
            f.unit(pos(x, 0, 0), UnitKind::Cable);
        }
        f.limits.walk_budget = 8;
        let Detection::Complete(c) = f.detect(pos(0, 0, 0)) else {
            panic!("expected a complete walk");
        };
        assert!(c.truncated);
        assert!(c.member_count() < 32);
    }

    #[test]
    fn detect_all_matches_individual_walks() {
        let f = minimal_chain();
        let seeds = [pos(0, 0, 0), pos(2, 0, 0), pos(9, 9, 9)];
        let all = detect_all(&f.grid, &f.markers, &f.bindings, &f.limits, &seeds);
        assert_eq!(all.len(), 3);
        for (seed, detection) in all {
            assert_eq!(detection, f.detect(seed));
        }
    }
}
