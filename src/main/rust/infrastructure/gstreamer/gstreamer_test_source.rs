use std::time::Instant;

use bytes::Bytes;

use super::app_sink_capture::{buffer_timestamp_ms, AppSinkCapture};
use super::PipelineBuilder;
use crate::domain::errors::CaptureError;
use crate::domain::ports::{CaptureStream, FrameCallback, VideoSource};
use crate::domain::value_objects::{MixerConfig, VideoFrame};

/// `videotestsrc` camera emitting frames in the mixer's video mode
pub struct GStreamerTestSource {
    mixer: MixerConfig,
}

impl GStreamerTestSource {
    pub fn new(mixer: MixerConfig) -> Self {
        Self { mixer }
    }
}

impl VideoSource for GStreamerTestSource {
    fn start(&self, mut on_frame: FrameCallback) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let started = Instant::now();
        let capture = AppSinkCapture::start(
            "test-source",
            &PipelineBuilder::build_test_source_string(&self.mixer),
            PipelineBuilder::VIDEO_SINK,
            move |buffer| {
                let Ok(map) = buffer.map_readable() else {
                    return;
                };
                let keyframe = !buffer.flags().contains(gstreamer::BufferFlags::DELTA_UNIT);
                let timestamp = buffer_timestamp_ms(buffer, started.elapsed().as_millis());
                on_frame(
                    VideoFrame::new(timestamp, Bytes::copy_from_slice(map.as_slice()))
                        .with_keyframe(keyframe),
                );
            },
        )?;

        Ok(Box::new(capture))
    }
}
