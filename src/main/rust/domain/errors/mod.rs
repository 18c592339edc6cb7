use thiserror::Error;

use crate::domain::value_objects::SessionState;

/// Failures opening or running the microphone capture pipeline
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No audio input device available")]
    DeviceUnavailable,

    #[error("Capture pipeline configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("Microphone permission not granted")]
    PermissionDenied,
}

/// Failures establishing the network connection to the streaming endpoint
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Connection aborted by close")]
    Aborted,

    #[error("Already connected")]
    AlreadyConnected,
}

/// Failures announcing the outbound stream on an established connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("Invalid stream key")]
    InvalidStreamKey,

    #[error("Server rejected publish: {0}")]
    ServerRejected(String),

    #[error("Publish requires a connected, unpublished session")]
    NotConnected,

    #[error("Publish timed out")]
    Timeout,

    #[error("Publish aborted by close")]
    Aborted,
}

/// Error taxonomy driving the propagation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Microphone permission denied or restricted (degrade)
    Permission,
    /// No device or capture configuration failure (degrade)
    Device,
    /// Unreachable, timeout or handshake failure (fatal to start)
    Network,
    /// Server rejected the stream key or publish (fatal to start)
    Protocol,
    /// Errors while tearing down (logged only)
    Teardown,
    /// Invalid configuration or misuse of the API
    Configuration,
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpointUrl(String),

    #[error("Invalid mixer configuration: {0}")]
    InvalidMixerConfig(String),

    #[error("Mixer has not been configured")]
    MixerNotConfigured,

    #[error("Mixer is already configured")]
    MixerAlreadyConfigured,

    #[error("Audio routing configuration failed: {0}")]
    AudioRoutingFailed(String),

    #[error("Session is busy ({0})")]
    SessionBusy(SessionState),

    #[error("Start aborted: session was stopped while connecting")]
    StartAborted,

    #[error("Teardown failed: {0}")]
    Teardown(String),

    #[error("Sink is closed")]
    SinkClosed,

    #[error("Invalid backoff multiplier: must be > 1.0")]
    InvalidBackoffMultiplier,
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Capture(CaptureError::PermissionDenied) => ErrorKind::Permission,
            Self::Capture(_) => ErrorKind::Device,
            Self::Connect(_) | Self::StartAborted => ErrorKind::Network,
            Self::Publish(_) | Self::SinkClosed => ErrorKind::Protocol,
            Self::Teardown(_) => ErrorKind::Teardown,
            Self::AudioRoutingFailed(_) => ErrorKind::Device,
            Self::InvalidEndpointUrl(_)
            | Self::InvalidMixerConfig(_)
            | Self::MixerNotConfigured
            | Self::MixerAlreadyConfigured
            | Self::SessionBusy(_)
            | Self::InvalidBackoffMultiplier => ErrorKind::Configuration,
        }
    }

    /// Whether this error must abort an in-progress start.
    ///
    /// Audio routing is a device concern but the session cannot run without it.
    pub fn is_fatal_to_start(&self) -> bool {
        match self {
            Self::AudioRoutingFailed(_) => true,
            other => !matches!(
                other.kind(),
                ErrorKind::Permission | ErrorKind::Device | ErrorKind::Teardown
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
