//! Topology selection
//!
//! Maps a requested mode name to a thread-graph construction strategy.

use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Thread roles a topology arranges, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    /// Pulls packets from one capture server
    Receive,
    /// Parses packets into flow keys
    Decode,
    /// Flow-pinned detection
    Detect,
    /// Records detection results
    Output,
    /// Full pipeline in a single thread
    Worker,
}

impl ThreadRole {
    /// Thread-name prefix for this role
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Receive => "RX#",
            Self::Decode => "DC#",
            Self::Detect => "DT#",
            Self::Output => "OU#",
            Self::Worker => "W#",
        }
    }
}

/// The three acquisition topologies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// One combined thread per configured server
    Single,
    /// Receive and decode pinned per server, detection fanned out across
    /// a flow-pinned pool
    AutoFp,
    /// Full pipeline per server thread, no cross-thread hand-off
    Workers,
}

impl Topology {
    /// Engine default when no mode is requested
    pub const DEFAULT: Topology = Topology::AutoFp;

    pub fn name(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::AutoFp => "autofp",
            Self::Workers => "workers",
        }
    }

    /// Human-readable description, shown by the runmode registry
    pub fn description(&self) -> &'static str {
        match self {
            Self::Single => "Single threaded ipc mode",
            Self::AutoFp => {
                "Multi threaded ipc mode. Packets from each flow are assigned \
                 to a single detect thread."
            }
            Self::Workers => {
                "Ipc workers mode, each thread does all tasks from \
                 acquisition to logging"
            }
        }
    }

    /// Thread-role sequence this topology builds per server (the detect
    /// pool and output thread of autofp are shared, not per-server)
    pub fn thread_roles(&self) -> &'static [ThreadRole] {
        match self {
            Self::Single => &[ThreadRole::Worker],
            Self::AutoFp => &[
                ThreadRole::Receive,
                ThreadRole::Decode,
                ThreadRole::Detect,
                ThreadRole::Output,
            ],
            Self::Workers => &[ThreadRole::Worker],
        }
    }

    /// Whether the topology hands packets across threads
    pub fn uses_handoff(&self) -> bool {
        matches!(self, Self::AutoFp)
    }
}

impl FromStr for Topology {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "single" => Ok(Self::Single),
            "autofp" => Ok(Self::AutoFp),
            "workers" => Ok(Self::Workers),
            other => Err(ConfigError::UnknownTopology(other.to_string())),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_modes_parse() {
        assert_eq!("single".parse::<Topology>().unwrap(), Topology::Single);
        assert_eq!("autofp".parse::<Topology>().unwrap(), Topology::AutoFp);
        assert_eq!("workers".parse::<Topology>().unwrap(), Topology::Workers);
    }

    #[test]
    fn test_unknown_mode_fails() {
        assert_eq!(
            "bogus".parse::<Topology>(),
            Err(ConfigError::UnknownTopology("bogus".to_string()))
        );
    }

    #[test]
    fn test_mode_names_are_case_sensitive() {
        assert!("AutoFp".parse::<Topology>().is_err());
    }

    #[test]
    fn test_default_is_autofp() {
        assert_eq!(Topology::DEFAULT, Topology::AutoFp);
    }

    #[test]
    fn test_roundtrip_name() {
        for mode in [Topology::Single, Topology::AutoFp, Topology::Workers] {
            assert_eq!(mode.name().parse::<Topology>().unwrap(), mode);
        }
    }

    #[test]
    fn test_only_autofp_hands_off() {
        assert!(Topology::AutoFp.uses_handoff());
        assert!(!Topology::Single.uses_handoff());
        assert!(!Topology::Workers.uses_handoff());
    }
}
