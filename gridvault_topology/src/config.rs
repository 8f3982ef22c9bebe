// Tuning limits for detection and validation.

use serde::{Deserialize, Serialize};

/// Size ceilings applied to every detected component.
///
/// `walk_budget` bounds the traversal itself. Every visited cell was enqueued
/// either as a seed or as one of the six neighbors of a recorded member, so
/// the budget must exceed `6 * (max_units + max_cables)` or legitimately-sized
/// networks would be reported as truncated before their real counts are
/// known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLimits {
    /// Maximum non-cable units per network.
    pub max_units: usize,
    /// Maximum cables per network.
    pub max_cables: usize,
    /// Maximum cells a single detection walk may visit before giving up.
    pub walk_budget: usize,
}

impl Default for NetworkLimits {
    fn default() -> Self {
        Self {
            max_units: 128,
            max_cables: 512,
            walk_budget: 4096,
        }
    }
}
