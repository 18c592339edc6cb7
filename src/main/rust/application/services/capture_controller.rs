use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::MixerInput;
use crate::domain::errors::CaptureError;
use crate::domain::ports::{AudioInput, CaptureStream, PermissionProvider, SampleCallback};

/// Opaque reference to an open microphone pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHandle {
    id: Uuid,
}

impl CaptureHandle {
    fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

struct ActiveCapture {
    handle: CaptureHandle,
    stream: Box<dyn CaptureStream>,
}

/// Completion of a capture stop; the device is released on the blocking pool
pub struct CaptureRelease {
    task: Option<JoinHandle<()>>,
}

impl CaptureRelease {
    fn done() -> Self {
        Self { task: None }
    }

    pub async fn wait(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                tracing::warn!("Capture release task failed: {}", e);
            }
        }
    }
}

/// Owns the microphone capture session and feeds its samples to the mixer
pub struct CaptureController {
    input: Arc<dyn AudioInput>,
    permissions: Arc<dyn PermissionProvider>,
    output: MixerInput,
    // Held across the blocking open so start/stop never interleave
    active: Mutex<Option<ActiveCapture>>,
    current: parking_lot::Mutex<Option<CaptureHandle>>,
}

impl CaptureController {
    pub fn new(
        input: Arc<dyn AudioInput>,
        permissions: Arc<dyn PermissionProvider>,
        output: MixerInput,
    ) -> Self {
        Self {
            input,
            permissions,
            output,
            active: Mutex::new(None),
            current: parking_lot::Mutex::new(None),
        }
    }

    /// Handle of the open capture, if any
    pub fn handle(&self) -> Option<CaptureHandle> {
        self.current.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Open the microphone; returns the existing handle when already open
    pub async fn start(&self) -> Result<CaptureHandle, CaptureError> {
        let mut active = self.active.lock().await;
        if let Some(capture) = active.as_ref() {
            return Ok(capture.handle.clone());
        }

        if !self.permissions.query_audio_permission().is_granted() {
            return Err(CaptureError::PermissionDenied);
        }

        let input = self.input.clone();
        let output = self.output.clone();
        let on_sample: SampleCallback = Box::new(move |sample| {
            output.submit_audio(sample);
        });

        let stream = tokio::task::spawn_blocking(move || input.open(on_sample))
            .await
            .map_err(|e| CaptureError::ConfigurationFailed(format!("capture start task: {}", e)))??;

        let handle = CaptureHandle::new();
        tracing::info!(capture_id = %handle.id(), "Microphone capture started");

        *self.current.lock() = Some(handle.clone());
        *active = Some(ActiveCapture {
            handle: handle.clone(),
            stream,
        });
        Ok(handle)
    }

    /// Halt capture. Returns immediately; the device is released in the
    /// background and the returned value resolves once it is.
    pub async fn stop(&self) -> CaptureRelease {
        let taken = self.active.lock().await.take();
        let Some(capture) = taken else {
            return CaptureRelease::done();
        };
        self.current.lock().take();

        let id = capture.handle.id();
        tracing::info!(capture_id = %id, "Stopping microphone capture");
        let task = tokio::task::spawn_blocking(move || {
            if let Err(e) = capture.stream.close() {
                tracing::warn!(capture_id = %id, "Error releasing microphone (ignored): {}", e);
            } else {
                tracing::debug!(capture_id = %id, "Microphone released");
            }
        });

        CaptureRelease { task: Some(task) }
    }
}
