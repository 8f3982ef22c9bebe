// Core types shared across the topology engine.
//
// Defines spatial coordinates (`BlockPos`), the closed set of unit kinds and
// their world materials, network identities (`NetworkId`, `NetworkRef`), and
// the candidate/validated network values produced by detection and
// validation. All types derive `Serialize`/`Deserialize` for persistence and
// snapshot transfer.
//
// **Critical constraint: stable identity.** A `NetworkId` is derived from the
// Server unit's coordinate, so it survives any recomputation in which the
// Server does not move. Identity is never generated from entropy.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::{SmallVec, smallvec};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// Identifier of a voxel world (dimension). Compact u32, assigned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub u32);

/// A block position in a voxel world. Each component is in block units.
///
/// The grid is sparse and unbounded — there is no world size here; the only
/// ceilings are the configured network limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub world: WorldId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }

    /// Parse the canonical `world:x:y:z` form. Returns `None` on malformed
    /// input.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(':');
        let world = parts.next()?.parse::<u32>().ok()?;
        let x = parts.next()?.parse::<i32>().ok()?;
        let y = parts.next()?.parse::<i32>().ok()?;
        let z = parts.next()?.parse::<i32>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(WorldId(world), x, y, z))
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.world.0, self.x, self.y, self.z)
    }
}

// Custom serde: serialize as the canonical `world:x:y:z` string so BlockPos
// can be used as a JSON map key (serde_json requires string keys).
impl Serialize for BlockPos {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BlockPos {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BlockPos::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid block position"))
    }
}

// ---------------------------------------------------------------------------
// Unit kinds and materials
// ---------------------------------------------------------------------------

/// The closed set of unit kinds participating in network topology.
///
/// "Empty or not ours" is represented as `Option<UnitKind>::None` at the
/// classifier output, not as an enum variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitKind {
    Server,
    DriveBay,
    Terminal,
    SecurityTerminal,
    Cable,
    Exporter,
    Importer,
}

impl UnitKind {
    pub const ALL: [UnitKind; 7] = [
        UnitKind::Server,
        UnitKind::DriveBay,
        UnitKind::Terminal,
        UnitKind::SecurityTerminal,
        UnitKind::Cable,
        UnitKind::Exporter,
        UnitKind::Importer,
    ];

    /// Required kinds: a network must contain a Server, a DriveBay, and a
    /// Terminal to be valid. Everything else is optional.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            UnitKind::Server | UnitKind::DriveBay | UnitKind::Terminal
        )
    }

    pub fn is_cable(self) -> bool {
        self == UnitKind::Cable
    }

    /// The world material this kind is built from. Several kinds share a
    /// material — the marker table disambiguates (see `classify.rs`).
    pub fn expected_material(self) -> Material {
        match self {
            UnitKind::Server => Material::ServerChassis,
            UnitKind::DriveBay => Material::BayHousing,
            UnitKind::Terminal | UnitKind::SecurityTerminal => Material::TerminalPanel,
            UnitKind::Cable => Material::Conduit,
            UnitKind::Exporter | UnitKind::Importer => Material::MountedHead,
        }
    }
}

/// World material signatures that network units are built from.
///
/// A cell whose material matches a signature is not necessarily a unit — an
/// ordinary decorative block can coincide with one of these. The marker table
/// is the ground truth; the material is only the first half of the check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Material {
    ServerChassis,
    BayHousing,
    TerminalPanel,
    MountedHead,
    Conduit,
}

impl Material {
    /// The unit kinds this material can house. `TerminalPanel` and
    /// `MountedHead` are ambiguous on their own.
    pub fn candidate_kinds(self) -> SmallVec<[UnitKind; 2]> {
        match self {
            Material::ServerChassis => smallvec![UnitKind::Server],
            Material::BayHousing => smallvec![UnitKind::DriveBay],
            Material::TerminalPanel => smallvec![UnitKind::Terminal, UnitKind::SecurityTerminal],
            Material::MountedHead => smallvec![UnitKind::Exporter, UnitKind::Importer],
            Material::Conduit => smallvec![UnitKind::Cable],
        }
    }
}

// ---------------------------------------------------------------------------
// Network identity
// ---------------------------------------------------------------------------

/// Identity of a persisted network, derived from its Server's coordinate.
///
/// Stable across recomputation as long as the Server does not move. If a
/// Server is destroyed and a different one is later placed at the same
/// coordinate, the new network reuses this identity — which is what lets
/// orphaned drive-bay state at matching coordinates be reclaimed.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NetworkId(pub BlockPos);

impl NetworkId {
    pub fn parse(s: &str) -> Option<Self> {
        BlockPos::parse(s).map(NetworkId)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit's relationship to persisted network state, decoded once at the
/// schema boundary. Only `Bound` ids participate in uniqueness and conflict
/// checks; the other variants are placeholders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NetworkRef {
    /// Member of a currently-valid persisted network.
    Bound(NetworkId),
    /// Was persisted under this id; the network has since dissolved. The
    /// record is retained for reclamation, addressable by exact coordinate.
    Orphaned(NetworkId),
    /// Physically present but part of no persisted network.
    Standalone,
    /// No association at all (schema NULL).
    None,
}

impl NetworkRef {
    /// The id if currently bound to a valid network.
    pub fn bound_id(self) -> Option<NetworkId> {
        match self {
            NetworkRef::Bound(id) => Some(id),
            _ => None,
        }
    }
}

/// Opaque owner identity, supplied by the host environment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Candidate network — one detection pass's immutable result
// ---------------------------------------------------------------------------

/// The maximal connected component reachable from one seed, partitioned by
/// unit kind. An immutable snapshot: each world edit produces a fresh
/// candidate that supersedes or dissolves whatever was persisted before.
///
/// `BTreeSet` throughout so that two detections of the same component compare
/// equal regardless of traversal order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateNetwork {
    /// The coordinate detection started from.
    pub seed: Option<BlockPos>,
    pub servers: BTreeSet<BlockPos>,
    pub drive_bays: BTreeSet<BlockPos>,
    pub terminals: BTreeSet<BlockPos>,
    pub security_terminals: BTreeSet<BlockPos>,
    pub exporters: BTreeSet<BlockPos>,
    pub importers: BTreeSet<BlockPos>,
    pub cables: BTreeSet<BlockPos>,
    /// Distinct currently-valid network ids the walk touched without
    /// expanding into. Consumed by the conflict analyzer.
    pub touched_networks: BTreeSet<NetworkId>,
    /// Set when the walk gave up at the visit budget. A truncated candidate
    /// never validates.
    pub truncated: bool,
}

impl CandidateNetwork {
    pub fn new(seed: BlockPos) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Record a discovered member into its kind bucket.
    pub fn record(&mut self, pos: BlockPos, kind: UnitKind) {
        let bucket = match kind {
            UnitKind::Server => &mut self.servers,
            UnitKind::DriveBay => &mut self.drive_bays,
            UnitKind::Terminal => &mut self.terminals,
            UnitKind::SecurityTerminal => &mut self.security_terminals,
            UnitKind::Exporter => &mut self.exporters,
            UnitKind::Importer => &mut self.importers,
            UnitKind::Cable => &mut self.cables,
        };
        bucket.insert(pos);
    }

    /// Units counted against the unit ceiling — every kind except cables.
    pub fn unit_count(&self) -> usize {
        self.servers.len()
            + self.drive_bays.len()
            + self.terminals.len()
            + self.security_terminals.len()
            + self.exporters.len()
            + self.importers.len()
    }

    pub fn cable_count(&self) -> usize {
        self.cables.len()
    }

    /// Total recorded members, cables included.
    pub fn member_count(&self) -> usize {
        self.unit_count() + self.cables.len()
    }

    /// Every member coordinate with its kind.
    pub fn members(&self) -> impl Iterator<Item = (BlockPos, UnitKind)> + '_ {
        let tag = |set: &'_ BTreeSet<BlockPos>, kind: UnitKind| {
            set.iter().map(move |&p| (p, kind)).collect::<Vec<_>>()
        };
        tag(&self.servers, UnitKind::Server)
            .into_iter()
            .chain(tag(&self.drive_bays, UnitKind::DriveBay))
            .chain(tag(&self.terminals, UnitKind::Terminal))
            .chain(tag(&self.security_terminals, UnitKind::SecurityTerminal))
            .chain(tag(&self.exporters, UnitKind::Exporter))
            .chain(tag(&self.importers, UnitKind::Importer))
            .chain(tag(&self.cables, UnitKind::Cable))
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.servers.contains(&pos)
            || self.drive_bays.contains(&pos)
            || self.terminals.contains(&pos)
            || self.security_terminals.contains(&pos)
            || self.exporters.contains(&pos)
            || self.importers.contains(&pos)
            || self.cables.contains(&pos)
    }

    /// Membership comparison that ignores the seed and bookkeeping fields.
    /// Two walks of the same component from different seeds are the same
    /// network.
    pub fn same_membership(&self, other: &Self) -> bool {
        self.servers == other.servers
            && self.drive_bays == other.drive_bays
            && self.terminals == other.terminals
            && self.security_terminals == other.security_terminals
            && self.exporters == other.exporters
            && self.importers == other.importers
            && self.cables == other.cables
    }
}

// ---------------------------------------------------------------------------
// Validated network — the unit of persistence
// ---------------------------------------------------------------------------

/// A candidate that passed validation. Exactly-one-Server and
/// at-most-one-SecurityTerminal are encoded structurally, so a `Network`
/// cannot express the states validation rejects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub owner: OwnerId,
    pub server: BlockPos,
    pub drive_bays: BTreeSet<BlockPos>,
    pub terminals: BTreeSet<BlockPos>,
    pub security_terminal: Option<BlockPos>,
    pub exporters: BTreeSet<BlockPos>,
    pub importers: BTreeSet<BlockPos>,
    pub cables: BTreeSet<BlockPos>,
}

impl Network {
    /// Every member coordinate with its kind, cables included.
    pub fn members(&self) -> Vec<(BlockPos, UnitKind)> {
        let mut out = vec![(self.server, UnitKind::Server)];
        out.extend(self.drive_bays.iter().map(|&p| (p, UnitKind::DriveBay)));
        out.extend(self.terminals.iter().map(|&p| (p, UnitKind::Terminal)));
        if let Some(st) = self.security_terminal {
            out.push((st, UnitKind::SecurityTerminal));
        }
        out.extend(self.exporters.iter().map(|&p| (p, UnitKind::Exporter)));
        out.extend(self.importers.iter().map(|&p| (p, UnitKind::Importer)));
        out.extend(self.cables.iter().map(|&p| (p, UnitKind::Cable)));
        out
    }

    /// All member coordinates as a set.
    pub fn all_units(&self) -> BTreeSet<BlockPos> {
        self.members().into_iter().map(|(p, _)| p).collect()
    }

    /// Units counted against the unit ceiling — every kind except cables.
    pub fn unit_count(&self) -> usize {
        1 + self.drive_bays.len()
            + self.terminals.len()
            + usize::from(self.security_terminal.is_some())
            + self.exporters.len()
            + self.importers.len()
    }

    pub fn cable_count(&self) -> usize {
        self.cables.len()
    }
}
