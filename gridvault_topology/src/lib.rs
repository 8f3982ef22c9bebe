// gridvault_topology — pure storage-network topology library.
//
// This crate contains all the deterministic logic for discovering and judging
// storage networks in a voxel world: which placed units are connected, whether
// the connected set forms a legal network, and whether a proposed placement
// would collide with networks that already exist. It performs no I/O and holds
// no shared state; everything here is a pure function of the grid, the marker
// table, the current bindings, and the input coordinate.
//
// Module overview:
// - `types.rs`:    BlockPos, unit kinds, materials, network identities, and
//                  the candidate/validated network values.
// - `grid.rs`:     Grid, marker, and binding abstractions plus the in-memory
//                  implementations (`SparseGrid`, `MarkerTable`, `BindingTable`).
// - `classify.rs`: Material-signature + marker double-check unit classifier.
// - `detect.rs`:   Breadth-first flood fill producing candidate networks.
// - `validate.rs`: Closed-world invariant checks (unit counts, ceilings).
// - `conflict.rs`: Pre-commit placement conflict analysis.
// - `config.rs`:   NetworkLimits — the tunable size ceilings.
//
// The companion crate `gridvault_registry` layers durable registration,
// orphan recovery, and the world-edit pipeline on top of this library. That
// boundary is enforced at the compiler level — this crate cannot block on a
// store, take a lock, or write a log line.
//
// **Critical constraint: determinism.** Detection must yield identical
// results for identical inputs, on every machine. Ordered collections are
// `BTreeSet`/`BTreeMap`; the only hash containers are `FxHashSet` visited
// sets that never influence output ordering.

pub mod classify;
pub mod config;
pub mod conflict;
pub mod detect;
pub mod grid;
pub mod types;
pub mod validate;
