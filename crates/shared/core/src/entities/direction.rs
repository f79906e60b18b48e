use serde::{Deserialize, Serialize};

/// Direction of a binary option (call = price goes up, put = price goes down)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Call,
    Put,
}

impl Direction {
    /// Returns the opposite direction
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Call => Direction::Put,
            Direction::Put => Direction::Call,
        }
    }

    /// Action name used in `openOrder` commands
    pub fn as_action(&self) -> &'static str {
        match self {
            Direction::Call => "call",
            Direction::Put => "put",
        }
    }

    /// Decode the numeric `command` field of a deal (0 = call, 1 = put)
    pub fn from_command(command: i64) -> Option<Self> {
        match command {
            0 => Some(Direction::Call),
            1 => Some(Direction::Put),
            _ => None,
        }
    }
}
