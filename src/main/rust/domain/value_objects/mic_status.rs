use std::fmt;

use serde::{Serialize, Serializer};

use crate::domain::errors::CaptureError;

/// Answer from the platform permission provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// User-visible microphone status, independent of the connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicStatus {
    NotStarted,
    Active,
    Stopped,
    SetupFailed,
    NoMicFound,
    PermissionDenied,
}

impl MicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Active => "Mic active",
            Self::Stopped => "Mic stopped",
            Self::SetupFailed => "Mic setup failed",
            Self::NoMicFound => "No mic found",
            Self::PermissionDenied => "Mic permission denied",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for MicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MicStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<&CaptureError> for MicStatus {
    fn from(err: &CaptureError) -> Self {
        match err {
            CaptureError::DeviceUnavailable => Self::NoMicFound,
            CaptureError::ConfigurationFailed(_) => Self::SetupFailed,
            CaptureError::PermissionDenied => Self::PermissionDenied,
        }
    }
}

impl Default for MicStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}
