use std::time::Instant;

use bytes::Bytes;
use gstreamer::prelude::*;

use super::app_sink_capture::{buffer_timestamp_ms, AppSinkCapture};
use super::PipelineBuilder;
use crate::domain::errors::CaptureError;
use crate::domain::ports::{AudioInput, CaptureStream, SampleCallback};
use crate::domain::value_objects::AudioSample;

/// Default system microphone captured through `autoaudiosrc`
pub struct GStreamerMicrophone {
    track: u8,
}

impl GStreamerMicrophone {
    pub fn new() -> Self {
        Self { track: 0 }
    }

    /// Mixer track the captured samples are tagged with
    pub fn with_track(mut self, track: u8) -> Self {
        self.track = track;
        self
    }

    fn ensure_device() -> Result<(), CaptureError> {
        let monitor = gstreamer::DeviceMonitor::new();
        monitor.add_filter(Some("Audio/Source"), None);
        if monitor.start().is_err() {
            // No provider can enumerate devices here; let the pipeline decide
            tracing::debug!("Audio device monitor unavailable, skipping device check");
            return Ok(());
        }
        let found = monitor.devices().into_iter().next().is_some();
        monitor.stop();

        if found {
            Ok(())
        } else {
            Err(CaptureError::DeviceUnavailable)
        }
    }
}

impl Default for GStreamerMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInput for GStreamerMicrophone {
    fn open(&self, mut on_sample: SampleCallback) -> Result<Box<dyn CaptureStream>, CaptureError> {
        Self::ensure_device()?;

        let track = self.track;
        let started = Instant::now();
        let capture = AppSinkCapture::start(
            "microphone",
            &PipelineBuilder::build_microphone_string(),
            PipelineBuilder::MIC_SINK,
            move |buffer| {
                let Ok(map) = buffer.map_readable() else {
                    return;
                };
                let timestamp = buffer_timestamp_ms(buffer, started.elapsed().as_millis());
                on_sample(AudioSample::new(
                    track,
                    timestamp,
                    Bytes::copy_from_slice(map.as_slice()),
                ));
            },
        )?;

        Ok(Box::new(capture))
    }
}
