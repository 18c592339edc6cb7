use std::fmt;

/// Network publish session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Disconnected,
    Connecting,
    ConnectedUnpublished,
    Publishing,
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::ConnectedUnpublished => write!(f, "CONNECTED_UNPUBLISHED"),
            Self::Publishing => write!(f, "PUBLISHING"),
        }
    }
}

impl PublishState {
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    pub fn can_publish(&self) -> bool {
        matches!(self, Self::ConnectedUnpublished)
    }

    pub fn is_publishing(&self) -> bool {
        matches!(self, Self::Publishing)
    }
}

impl Default for PublishState {
    fn default() -> Self {
        Self::Disconnected
    }
}
