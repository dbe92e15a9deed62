use serde::{Deserialize, Serialize};

/// Priority class for messages on a node's queue. Same transport, different
/// scheduling: `Steer > Collect > Followup`, FIFO within each lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Steer,
    Collect,
    Followup,
}

impl Lane {
    /// All lanes in dispatch-priority order.
    pub const IN_PRIORITY_ORDER: [Lane; 3] = [Lane::Steer, Lane::Collect, Lane::Followup];

    /// Lower is higher priority; used only for sorting, never serialized.
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Lane::Steer => 0,
            Lane::Collect => 1,
            Lane::Followup => 2,
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lane::Steer => "steer",
            Lane::Collect => "collect",
            Lane::Followup => "followup",
        };
        f.write_str(s)
    }
}
