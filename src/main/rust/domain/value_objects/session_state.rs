use std::fmt;

use serde::Serialize;

/// Broadcast lifecycle states owned by the session manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No broadcast; eligible for start
    Idle,
    /// Acquiring resources and connecting (also used while recovering a lost connection)
    Connecting,
    /// Publishing; frames are forwarded
    Live,
    /// Tearing down
    Stopping,
    /// Start or recovery failed; settles back to Idle
    Failed(String),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Live => write!(f, "LIVE"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Failed(reason) => write!(f, "FAILED ({})", reason),
        }
    }
}

impl SessionState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Connecting => 1.0,
            Self::Live => 2.0,
            Self::Stopping => 3.0,
            Self::Failed(_) => 4.0,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// States a caller may observe once an operation has returned
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Idle | Self::Live)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}
