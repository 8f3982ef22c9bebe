// Network validation: closed-world invariants over a candidate component.
//
// A candidate becomes a persistable `Network` only when it holds exactly one
// Server, at least one DriveBay, at least one Terminal, at most one
// SecurityTerminal, and sits under the configured unit and cable ceilings.
//
// The two failure families are deliberately distinct. Structural faults are
// ordinary: every partially-built network hits them and the caller simply
// does not persist anything. Capacity faults mean the edit that produced the
// candidate must be undone and refunded, so they carry their own tag.
// Capacity is checked first: an over-ceiling component must trigger the
// revert even when it is also structurally incomplete.

use crate::config::NetworkLimits;
use crate::detect::Detection;
use crate::types::{BlockPos, CandidateNetwork, Network, NetworkId, OwnerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validation outcome. `Valid` carries the persistable network value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Valid(Network),
    Invalid(InvalidReason),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    /// Incomplete or over-unique membership. Common and silent: the
    /// candidate is simply not persisted.
    Structural(StructuralFault),
    /// A size ceiling was blown. The caller must revert the causing edit.
    Oversized(CapacityFault),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralFault {
    MissingServer,
    DuplicateServer { first: BlockPos, second: BlockPos },
    MissingDriveBay,
    MissingTerminal,
    DuplicateSecurityTerminal { first: BlockPos, second: BlockPos },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityFault {
    TooManyUnits { units: usize, max: usize },
    TooManyCables { cables: usize, max: usize },
    /// The detection walk hit its visit budget, so the true counts are
    /// unknown. Treated as over-ceiling.
    WalkBudgetExceeded,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Structural(fault) => write!(f, "{fault}"),
            InvalidReason::Oversized(fault) => write!(f, "{fault}"),
        }
    }
}

impl fmt::Display for StructuralFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralFault::MissingServer => write!(f, "no server present"),
            StructuralFault::DuplicateServer { first, second } => {
                write!(f, "more than one server (at {first} and {second})")
            }
            StructuralFault::MissingDriveBay => write!(f, "no drive bay present"),
            StructuralFault::MissingTerminal => write!(f, "no terminal present"),
            StructuralFault::DuplicateSecurityTerminal { first, second } => {
                write!(f, "more than one security terminal (at {first} and {second})")
            }
        }
    }
}

impl fmt::Display for CapacityFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityFault::TooManyUnits { units, max } => {
                write!(f, "{units} units exceeds the limit of {max}")
            }
            CapacityFault::TooManyCables { cables, max } => {
                write!(f, "{cables} cables exceeds the limit of {max}")
            }
            CapacityFault::WalkBudgetExceeded => {
                write!(f, "component too large to walk within budget")
            }
        }
    }
}

/// Judge a candidate. On success the returned `Network` takes its identity
/// from the Server coordinate and the given owner.
pub fn validate(candidate: &CandidateNetwork, owner: &OwnerId, limits: &NetworkLimits) -> Verdict {
    use InvalidReason::{Oversized, Structural};

    if candidate.truncated {
        return Verdict::Invalid(Oversized(CapacityFault::WalkBudgetExceeded));
    }
    let units = candidate.unit_count();
    if units > limits.max_units {
        return Verdict::Invalid(Oversized(CapacityFault::TooManyUnits {
            units,
            max: limits.max_units,
        }));
    }
    let cables = candidate.cable_count();
    if cables > limits.max_cables {
        return Verdict::Invalid(Oversized(CapacityFault::TooManyCables {
            cables,
            max: limits.max_cables,
        }));
    }

    let mut servers = candidate.servers.iter().copied();
    let server = match (servers.next(), servers.next()) {
        (Some(server), None) => server,
        (None, _) => return Verdict::Invalid(Structural(StructuralFault::MissingServer)),
        (Some(first), Some(second)) => {
            return Verdict::Invalid(Structural(StructuralFault::DuplicateServer {
                first,
                second,
            }));
        }
    };
    if candidate.drive_bays.is_empty() {
        return Verdict::Invalid(Structural(StructuralFault::MissingDriveBay));
    }
    if candidate.terminals.is_empty() {
        return Verdict::Invalid(Structural(StructuralFault::MissingTerminal));
    }
    let security_terminal = {
        let mut terminals = candidate.security_terminals.iter().copied();
        let first = terminals.next();
        if let (Some(first), Some(second)) = (first, terminals.next()) {
            return Verdict::Invalid(Structural(StructuralFault::DuplicateSecurityTerminal {
                first,
                second,
            }));
        }
        first
    };

    Verdict::Valid(Network {
        id: NetworkId(server),
        owner: owner.clone(),
        server,
        drive_bays: candidate.drive_bays.clone(),
        terminals: candidate.terminals.clone(),
        security_terminal,
        exporters: candidate.exporters.clone(),
        importers: candidate.importers.clone(),
        cables: candidate.cables.clone(),
    })
}

/// Judge a raw detection outcome. The mid-walk duplicate aborts map onto the
/// corresponding structural faults.
pub fn validate_detection(
    detection: &Detection,
    owner: &OwnerId,
    limits: &NetworkLimits,
) -> Verdict {
    match detection {
        Detection::Complete(candidate) => validate(candidate, owner, limits),
        Detection::DuplicateServer { first, second } => Verdict::Invalid(
            InvalidReason::Structural(StructuralFault::DuplicateServer {
                first: *first,
                second: *second,
            }),
        ),
        Detection::DuplicateSecurityTerminal { first, second } => Verdict::Invalid(
            InvalidReason::Structural(StructuralFault::DuplicateSecurityTerminal {
                first: *first,
                second: *second,
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{UnitKind, WorldId};

    fn pos(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos::new(WorldId(0), x, y, z)
    }

    fn owner() -> OwnerId {
        OwnerId("player-1".into())
    }

    fn candidate(units: &[(BlockPos, UnitKind)]) -> CandidateNetwork {
        let mut c = CandidateNetwork::new(pos(0, 0, 0));
        for &(p, kind) in units {
            c.record(p, kind);
        }
        c
    }

    fn minimal() -> CandidateNetwork {
        candidate(&[
            (pos(0, 0, 0), UnitKind::Server),
            (pos(1, 0, 0), UnitKind::DriveBay),
            (pos(2, 0, 0), UnitKind::Terminal),
        ])
    }

    #[test]
    fn minimal_candidate_is_valid() {
        let verdict = validate(&minimal(), &owner(), &NetworkLimits::default());
        let Verdict::Valid(network) = verdict else {
            panic!("expected valid, got {verdict:?}");
        };
        assert_eq!(network.id, NetworkId(pos(0, 0, 0)));
        assert_eq!(network.server, pos(0, 0, 0));
        assert_eq!(network.owner, owner());
        assert_eq!(network.security_terminal, None);
        assert_eq!(network.unit_count(), 3);
    }

    #[test]
    fn missing_required_kinds_are_structural() {
        let cases = [
            (
                candidate(&[(pos(1, 0, 0), UnitKind::DriveBay), (pos(2, 0, 0), UnitKind::Terminal)]),
                StructuralFault::MissingServer,
            ),
            (
                candidate(&[(pos(0, 0, 0), UnitKind::Server), (pos(2, 0, 0), UnitKind::Terminal)]),
                StructuralFault::MissingDriveBay,
            ),
            (
                candidate(&[(pos(0, 0, 0), UnitKind::Server), (pos(1, 0, 0), UnitKind::DriveBay)]),
                StructuralFault::MissingTerminal,
            ),
        ];
        for (c, fault) in cases {
            assert_eq!(
                validate(&c, &owner(), &NetworkLimits::default()),
                Verdict::Invalid(InvalidReason::Structural(fault))
            );
        }
    }

    #[test]
    fn duplicate_server_is_structural() {
        let mut c = minimal();
        c.record(pos(5, 0, 0), UnitKind::Server);
        let verdict = validate(&c, &owner(), &NetworkLimits::default());
        assert!(matches!(
            verdict,
            Verdict::Invalid(InvalidReason::Structural(StructuralFault::DuplicateServer { .. }))
        ));
    }

    #[test]
    fn one_security_terminal_is_optional_two_are_not() {
        let mut c = minimal();
        assert!(validate(&c, &owner(), &NetworkLimits::default()).is_valid());

        c.record(pos(3, 0, 0), UnitKind::SecurityTerminal);
        let Verdict::Valid(network) = validate(&c, &owner(), &NetworkLimits::default()) else {
            panic!("one security terminal must stay valid");
        };
        assert_eq!(network.security_terminal, Some(pos(3, 0, 0)));

        c.record(pos(4, 0, 0), UnitKind::SecurityTerminal);
        assert!(matches!(
            validate(&c, &owner(), &NetworkLimits::default()),
            Verdict::Invalid(InvalidReason::Structural(
                StructuralFault::DuplicateSecurityTerminal { .. }
            ))
        ));
    }

    #[test]
    fn unit_ceiling_is_a_capacity_fault() {
        let mut c = minimal();
        for x in 10..20 {
            c.record(pos(x, 0, 0), UnitKind::Exporter);
        }
        let limits = NetworkLimits {
            max_units: 5,
            ..NetworkLimits::default()
        };
        assert_eq!(
            validate(&c, &owner(), &limits),
            Verdict::Invalid(InvalidReason::Oversized(CapacityFault::TooManyUnits {
                units: 13,
                max: 5,
            }))
        );
    }

    #[test]
    fn cable_ceiling_is_a_capacity_fault() {
        let mut c = minimal();
        for x in 10..20 {
            c.record(pos(x, 0, 0), UnitKind::Cable);
        }
        let limits = NetworkLimits {
            max_cables: 4,
            ..NetworkLimits::default()
        };
        assert_eq!(
            validate(&c, &owner(), &limits),
            Verdict::Invalid(InvalidReason::Oversized(CapacityFault::TooManyCables {
                cables: 10,
                max: 4,
            }))
        );
    }

    #[test]
    fn cables_do_not_count_toward_the_unit_ceiling() {
        let mut c = minimal();
        for x in 10..40 {
            c.record(pos(x, 0, 0), UnitKind::Cable);
        }
        let limits = NetworkLimits {
            max_units: 3,
            max_cables: 100,
            ..NetworkLimits::default()
        };
        assert!(validate(&c, &owner(), &limits).is_valid());
    }

    #[test]
    fn capacity_wins_over_structural() {
        // Over the ceiling and missing a terminal: the revert must happen.
        let mut c = candidate(&[(pos(0, 0, 0), UnitKind::Server)]);
        for x in 10..20 {
            c.record(pos(x, 0, 0), UnitKind::Exporter);
        }
        let limits = NetworkLimits {
            max_units: 5,
            ..NetworkLimits::default()
        };
        assert!(matches!(
            validate(&c, &owner(), &limits),
            Verdict::Invalid(InvalidReason::Oversized(_))
        ));
    }

    #[test]
    fn truncated_walk_never_validates() {
        let mut c = minimal();
        c.truncated = true;
        assert_eq!(
            validate(&c, &owner(), &NetworkLimits::default()),
            Verdict::Invalid(InvalidReason::Oversized(CapacityFault::WalkBudgetExceeded))
        );
    }

    #[test]
    fn detection_aborts_map_to_structural_faults() {
        let detection = Detection::DuplicateServer {
            first: pos(0, 0, 0),
            second: pos(2, 0, 0),
        };
        assert_eq!(
            validate_detection(&detection, &owner(), &NetworkLimits::default()),
            Verdict::Invalid(InvalidReason::Structural(StructuralFault::DuplicateServer {
                first: pos(0, 0, 0),
                second: pos(2, 0, 0),
            }))
        );
    }

    #[test]
    fn fault_messages_are_human_readable() {
        let fault = InvalidReason::Structural(StructuralFault::MissingServer);
        assert_eq!(fault.to_string(), "no server present");
        let fault = InvalidReason::Oversized(CapacityFault::TooManyCables { cables: 7, max: 4 });
        assert_eq!(fault.to_string(), "7 cables exceeds the limit of 4");
    }
}
