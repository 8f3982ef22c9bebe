// gridvault_registry — durable registration and recovery for storage
// networks.
//
// Where `gridvault_topology` answers "what network is this?", this crate
// answers "and what happens to its contents?". It owns the persistence
// schema, the transactional store, the per-network lock table, the
// registration/unregistration flows with orphaned-slot recovery, and the
// engine that drives the whole pipeline off world edits.
//
// Module overview:
// - `schema.rs`:   Persisted row types and the network-reference tag codec.
// - `store.rs`:    The `NetworkStore`/`StoreTx` traits, clock abstraction,
//                  and adapters that present a store as topology views.
// - `memory.rs`:   In-memory store with an optional JSON snapshot file.
// - `locks.rs`:    Per-network mutual exclusion and the recovery log.
// - `registry.rs`: Transactional register/unregister with orphan recovery.
// - `engine.rs`:   World-edit pipeline (place, remove, sweep) and events.
// - `error.rs`:    The crate-wide error type.
//
// **Critical constraint: all-or-nothing persistence.** Every mutation of
// network state goes through one `StoreTx`; a crash between edits may lose
// the latest transaction but never tears one apart. Orphaned slot rows are
// parked under their bay coordinate and reclaimed on the next registration
// at that coordinate, so a dissolve/rebuild cycle is lossless.

pub mod engine;
pub mod error;
pub mod locks;
pub mod memory;
pub mod registry;
pub mod schema;
pub mod store;

pub use engine::{EngineConfig, EngineEvent, NetworkEngine, PlaceOutcome, SweepReport};
pub use error::RegistryError;
pub use memory::MemoryStore;
pub use registry::NetworkRegistry;
pub use store::{Clock, FixedClock, NetworkStore, StoreTx, SystemClock};
