mod app_sink_capture;
mod gstreamer_microphone;
mod gstreamer_rtmp_client;
mod gstreamer_test_source;
mod pipeline_builder;

pub use app_sink_capture::AppSinkCapture;
pub use gstreamer_microphone::GStreamerMicrophone;
pub use gstreamer_rtmp_client::GStreamerRtmpClient;
pub use gstreamer_test_source::GStreamerTestSource;
pub use pipeline_builder::{PipelineBuilder, AUDIO_CHANNELS, AUDIO_RATE};
