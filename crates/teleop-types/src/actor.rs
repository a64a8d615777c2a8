//! Actor roles.

use serde::{Deserialize, Serialize};

/// One of the two fixed participants of a teleoperation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    /// The human operator's interface.
    #[serde(rename = "UI")]
    Ui,
    /// The remote device being driven.
    Robot,
}

impl Actor {
    /// The role on the other side of the pair.
    #[must_use]
    pub fn peer(self) -> Self {
        match self {
            Self::Ui => Self::Robot,
            Self::Robot => Self::Ui,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ui => write!(f, "UI"),
            Self::Robot => write!(f, "Robot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_wire_names() {
        assert_eq!(serde_json::to_string(&Actor::Ui).unwrap(), "\"UI\"");
        assert_eq!(serde_json::to_string(&Actor::Robot).unwrap(), "\"Robot\"");
        assert!(serde_json::from_str::<Actor>("\"Ui\"").is_err());
    }

    #[test]
    fn peer_is_involution() {
        assert_eq!(Actor::Ui.peer(), Actor::Robot);
        assert_eq!(Actor::Robot.peer().peer(), Actor::Robot);
    }
}
