// Persisted row types and the network-tag codec.
//
// One row struct per table: `networks`, `network_blocks`, `drive_bay_slots`,
// `storage_disks`, `security_terminals`. Rows are keyed by their natural key
// (coordinate or disk id) in the store, so the key does not repeat inside
// the row.
//
// The persisted form of a network association is a string tag — a bare id,
// `orphaned_{id}`, `standalone`, or SQL-style null. `ref_codec` decodes that
// tag into `NetworkRef` exactly once, here at the schema boundary. Business
// logic above this layer never string-matches orphan tags.

use gridvault_topology::types::{NetworkId, NetworkRef, OwnerId, UnitKind};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Stable identifier of a storage disk item, assigned by the host inventory
/// system. Survives the disk moving between bays and networks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiskId(pub u64);

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Serialized as a decimal string so it can be used as a JSON map key.
impl Serialize for DiskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DiskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>()
            .map(DiskId)
            .map_err(|_| serde::de::Error::custom("invalid disk id"))
    }
}

/// Metadata row for a live network (`networks` table). Presence of this row
/// is what makes a `NetworkId` valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRow {
    pub owner: OwnerId,
    /// Millis since the epoch; preserved across re-registrations.
    pub created_at: u64,
    pub last_accessed: u64,
}

/// Membership row (`network_blocks` table), unique per coordinate. Deleted
/// wholesale with its network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub network: NetworkId,
    pub kind: UnitKind,
}

/// Drive-bay slot row (`drive_bay_slots` table). Unlike membership rows,
/// slot rows survive their network: on dissolution the tag flips to
/// `Orphaned` and the row waits at its coordinate for a reclaiming network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRow {
    #[serde(with = "ref_codec")]
    pub network: NetworkRef,
    pub slot_number: u32,
    pub disk_id: Option<DiskId>,
}

/// Disk row (`storage_disks` table). Capacity bookkeeping belongs to the
/// inventory collaborator; the fields ride along untouched through orphaning
/// and restoration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskRow {
    #[serde(with = "ref_codec")]
    pub network: NetworkRef,
    pub tier: u8,
    pub max_cells: u32,
    pub used_cells: u32,
}

/// Security terminal row (`security_terminals` table), keyed by coordinate.
/// The owner is set when the terminal is first placed and never overwritten
/// by network churn; only the association field moves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRow {
    pub owner: OwnerId,
    #[serde(with = "ref_codec")]
    pub network: NetworkRef,
}

/// Codec between `NetworkRef` and the persisted tag form.
pub mod ref_codec {
    use super::*;

    const ORPHAN_PREFIX: &str = "orphaned_";
    const STANDALONE_TAG: &str = "standalone";

    pub fn serialize<S: Serializer>(r: &NetworkRef, serializer: S) -> Result<S::Ok, S::Error> {
        match r {
            NetworkRef::Bound(id) => serializer.collect_str(id),
            NetworkRef::Orphaned(id) => serializer.collect_str(&format_args!("{ORPHAN_PREFIX}{id}")),
            NetworkRef::Standalone => serializer.serialize_str(STANDALONE_TAG),
            NetworkRef::None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NetworkRef, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(NetworkRef::None),
            Some(tag) => parse_tag(&tag)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid network tag `{tag}`"))),
        }
    }

    /// Strict tag parser. Anything that is not a well-formed id, orphan tag,
    /// or the standalone sentinel is rejected rather than guessed at.
    pub fn parse_tag(tag: &str) -> Option<NetworkRef> {
        if tag == STANDALONE_TAG {
            return Some(NetworkRef::Standalone);
        }
        if let Some(rest) = tag.strip_prefix(ORPHAN_PREFIX) {
            return NetworkId::parse(rest).map(NetworkRef::Orphaned);
        }
        NetworkId::parse(tag).map(NetworkRef::Bound)
    }
}
