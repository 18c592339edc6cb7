pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    BroadcastSessionManager, BroadcastStatus, CaptureController, MediaMixer, PublishSession,
    SessionPorts, StatusBoard,
};
pub use config::{Config, MicPermission};
pub use domain::entities::{BroadcastLifecycle, StateTransition};
pub use domain::errors::{DomainError, ErrorKind, Result};
pub use domain::ports::{
    AudioInput, AudioRouting, CaptureStream, MediaSink, MetricsReporter, PermissionProvider,
    StreamConnection, StreamingClient, VideoSource,
};
pub use domain::value_objects::{
    AudioSample, BroadcastConfig, EndpointConfig, MediaFrame, MicStatus, MixerConfig,
    PermissionStatus, ReconnectPolicy, SessionState, StreamKey, VideoFrame, VideoMode,
};
pub use infrastructure::gstreamer::{
    GStreamerMicrophone, GStreamerRtmpClient, GStreamerTestSource, PipelineBuilder,
};
pub use infrastructure::metrics::{serve_metrics, PrometheusReporter};
pub use infrastructure::platform::{DesktopAudioRouting, StaticPermissionProvider};
