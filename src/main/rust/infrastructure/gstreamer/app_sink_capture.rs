use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use gstreamer::prelude::*;
use gstreamer_app::AppSink;

use crate::domain::errors::{CaptureError, DomainError, Result};
use crate::domain::ports::CaptureStream;

/// Timeout for sample polling (100ms allows responsive shutdown)
const PULL_TIMEOUT_MS: u64 = 100;

/// A playing pipeline whose app sink is drained on a dedicated thread
pub struct AppSinkCapture {
    name: &'static str,
    pipeline: gstreamer::Pipeline,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AppSinkCapture {
    /// Launch `pipeline_str` and hand every buffer reaching `sink_name` to `on_buffer`
    pub fn start<F>(
        name: &'static str,
        pipeline_str: &str,
        sink_name: &str,
        mut on_buffer: F,
    ) -> std::result::Result<Self, CaptureError>
    where
        F: FnMut(&gstreamer::BufferRef) + Send + 'static,
    {
        tracing::info!("Creating {} pipeline: {}", name, pipeline_str);
        let pipeline = gstreamer::parse::launch(pipeline_str)
            .map_err(|e| CaptureError::ConfigurationFailed(e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| CaptureError::ConfigurationFailed("not a pipeline".to_string()))?;

        let sink = pipeline
            .by_name(sink_name)
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| {
                CaptureError::ConfigurationFailed(format!("missing app sink '{}'", sink_name))
            })?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CaptureError::ConfigurationFailed(e.to_string()));
        }

        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let running = running.clone();
            std::thread::Builder::new()
                .name(format!("{}-capture", name))
                .spawn(move || {
                    let timeout = gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT_MS);
                    while running.load(Ordering::SeqCst) {
                        match sink.try_pull_sample(timeout) {
                            Some(sample) => {
                                if let Some(buffer) = sample.buffer() {
                                    on_buffer(buffer);
                                }
                            }
                            None if sink.is_eos() => {
                                tracing::debug!("{} pipeline reached end of stream", name);
                                break;
                            }
                            None => {}
                        }
                    }
                })
                .map_err(|e| CaptureError::ConfigurationFailed(e.to_string()))
        };

        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                let _ = pipeline.set_state(gstreamer::State::Null);
                return Err(e);
            }
        };

        Ok(Self {
            name,
            pipeline,
            running,
            thread: Some(thread),
        })
    }
}

impl CaptureStream for AppSinkCapture {
    fn close(mut self: Box<Self>) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let result = self
            .pipeline
            .set_state(gstreamer::State::Null)
            .map(|_| ())
            .map_err(|e| DomainError::Teardown(format!("{} pipeline: {}", self.name, e)));

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("{} capture thread panicked", self.name);
            }
        }
        tracing::debug!("{} pipeline stopped", self.name);
        result
    }
}

/// Buffer timestamp in milliseconds, falling back to `fallback_ms`.
///
/// Saturates at `u32::MAX` instead of wrapping.
pub fn buffer_timestamp_ms(buffer: &gstreamer::BufferRef, fallback_ms: u128) -> u32 {
    match buffer.pts() {
        Some(pts) => saturating_ms(u128::from(pts.mseconds())),
        None => saturating_ms(fallback_ms),
    }
}

fn saturating_ms(ms: u128) -> u32 {
    u32::try_from(ms).unwrap_or(u32::MAX)
}
