mod audio_input;
mod audio_routing;
mod metrics_reporter;
mod permission_provider;
mod streaming_client;

pub use audio_input::{AudioInput, CaptureStream, FrameCallback, SampleCallback, VideoSource};
pub use audio_routing::AudioRouting;
pub use metrics_reporter::MetricsReporter;
pub use permission_provider::PermissionProvider;
pub use streaming_client::{MediaSink, StreamConnection, StreamingClient};
