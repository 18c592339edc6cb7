//! In-memory fakes for every port, shared by unit and integration tests.
//!
//! Compiled for the crate's own tests and, through the `test-support`
//! feature, for the integration tests under `src/test/rust`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Condvar, Mutex};
use tokio::sync::{watch, Notify};

use super::PublishHandle;
use crate::domain::errors::{CaptureError, ConnectError, DomainError, PublishError, Result};
use crate::domain::ports::{
    AudioInput, AudioRouting, CaptureStream, MediaSink, MetricsReporter, PermissionProvider,
    SampleCallback, StreamConnection, StreamingClient,
};
use crate::domain::value_objects::{
    AudioRoutingOptions, AudioSample, EndpointConfig, MediaFrame, MediaKind, MicStatus,
    PermissionStatus, SessionState, StreamKey,
};

/// Blocks callers of `pass` while closed
#[derive(Default)]
struct Gate {
    closed: Mutex<bool>,
    opened: Condvar,
    waiting: AtomicUsize,
}

impl Gate {
    fn close(&self) {
        *self.closed.lock() = true;
    }

    fn open(&self) {
        *self.closed.lock() = false;
        self.opened.notify_all();
    }

    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    fn pass(&self) {
        let mut closed = self.closed.lock();
        if !*closed {
            return;
        }
        self.waiting.fetch_add(1, Ordering::SeqCst);
        while *closed {
            self.opened.wait(&mut closed);
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct NullMetrics;

impl MetricsReporter for NullMetrics {
    fn report_state_change(&self, _state: &SessionState) {}
    fn report_audio_enabled(&self, _enabled: bool) {}
    fn report_mic_status(&self, _status: MicStatus) {}
    fn report_frame_forwarded(&self, _kind: MediaKind, _bytes: usize) {}
    fn report_frame_dropped(&self, _kind: MediaKind) {}
    fn report_reconnect_attempt(&self) {}
    fn report_uptime(&self, _uptime_secs: f64) {}
}

#[derive(Clone, Default)]
pub struct CountingSink {
    frames: Arc<Mutex<Vec<MediaFrame>>>,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> PublishHandle {
        PublishHandle::new(Arc::new(self.clone()))
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn frames(&self) -> Vec<MediaFrame> {
        self.frames.lock().clone()
    }
}

impl MediaSink for CountingSink {
    fn write(&self, frame: MediaFrame) -> Result<()> {
        self.frames.lock().push(frame);
        Ok(())
    }
}

#[derive(Default)]
struct Script {
    connect_error: Mutex<Option<ConnectError>>,
    publish_error: Mutex<Option<PublishError>>,
    fail_close: AtomicBool,
    gated: AtomicBool,
    connect_started: Notify,
    connect_released: Notify,
    connects: AtomicUsize,
    closes: AtomicUsize,
    loss: Mutex<Option<watch::Sender<Option<String>>>>,
    sink: CountingSink,
}

/// Streaming client whose outcomes are decided up front
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Script>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(self, error: ConnectError) -> Self {
        self.set_connect_error(Some(error));
        self
    }

    /// Change the outcome of later connects
    pub fn set_connect_error(&self, error: Option<ConnectError>) {
        *self.script.connect_error.lock() = error;
    }

    pub fn fail_publish(self, error: PublishError) -> Self {
        *self.script.publish_error.lock() = Some(error);
        self
    }

    pub fn fail_close(self) -> Self {
        self.script.fail_close.store(true, Ordering::SeqCst);
        self
    }

    /// Hold every connect until `release_connect`
    pub fn gate_connect(self) -> Self {
        self.script.gated.store(true, Ordering::SeqCst);
        self
    }

    pub async fn wait_connect_started(&self) {
        self.script.connect_started.notified().await;
    }

    pub fn release_connect(&self) {
        self.script.gated.store(false, Ordering::SeqCst);
        self.script.connect_released.notify_one();
    }

    pub fn sink(&self) -> CountingSink {
        self.script.sink.clone()
    }

    pub fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.script.closes.load(Ordering::SeqCst)
    }

    /// Drop the most recent connection from the server side
    pub fn lose_connection(&self, reason: &str) {
        if let Some(loss) = self.script.loss.lock().as_ref() {
            loss.send_replace(Some(reason.to_string()));
        }
    }
}

#[async_trait]
impl StreamingClient for ScriptedClient {
    async fn connect(
        &self,
        _endpoint: &EndpointConfig,
    ) -> std::result::Result<Box<dyn StreamConnection>, ConnectError> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        self.script.connect_started.notify_one();
        if self.script.gated.load(Ordering::SeqCst) {
            self.script.connect_released.notified().await;
        }
        if let Some(error) = self.script.connect_error.lock().clone() {
            return Err(error);
        }

        let (loss_tx, loss_rx) = watch::channel(None);
        *self.script.loss.lock() = Some(loss_tx);
        Ok(Box::new(ScriptedConnection {
            script: self.script.clone(),
            loss: loss_rx,
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Script>,
    loss: watch::Receiver<Option<String>>,
}

#[async_trait]
impl StreamConnection for ScriptedConnection {
    async fn publish(
        &mut self,
        _stream_key: &StreamKey,
    ) -> std::result::Result<Arc<dyn MediaSink>, PublishError> {
        if let Some(error) = self.script.publish_error.lock().clone() {
            return Err(error);
        }
        Ok(Arc::new(self.script.sink.clone()))
    }

    async fn close(&mut self) -> Result<()> {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_close.load(Ordering::SeqCst) {
            return Err(DomainError::Teardown("socket reset".to_string()));
        }
        Ok(())
    }

    fn loss_signal(&self) -> watch::Receiver<Option<String>> {
        self.loss.clone()
    }
}

#[derive(Default)]
struct AudioScript {
    calls: Mutex<Vec<&'static str>>,
    open_error: Mutex<Option<CaptureError>>,
    callback: Mutex<Option<SampleCallback>>,
    open_gate: Gate,
    close_gate: Gate,
}

/// Microphone that delivers samples only when told to
#[derive(Clone, Default)]
pub struct FakeAudioInput {
    script: Arc<AudioScript>,
}

impl FakeAudioInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(self, error: CaptureError) -> Self {
        *self.script.open_error.lock() = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.script.calls.lock().clone()
    }

    /// Hold every `open` on the blocking pool until `release_open`
    pub fn hold_open(&self) {
        self.script.open_gate.close();
    }

    pub fn release_open(&self) {
        self.script.open_gate.open();
    }

    pub fn opens_waiting(&self) -> usize {
        self.script.open_gate.waiting()
    }

    /// Hold every stream `close` until `release_close`
    pub fn hold_close(&self) {
        self.script.close_gate.close();
    }

    pub fn release_close(&self) {
        self.script.close_gate.open();
    }

    pub fn closes_waiting(&self) -> usize {
        self.script.close_gate.waiting()
    }

    pub fn emit(&self, sample: AudioSample) {
        if let Some(callback) = self.script.callback.lock().as_mut() {
            callback(sample);
        }
    }
}

impl AudioInput for FakeAudioInput {
    fn open(
        &self,
        on_sample: SampleCallback,
    ) -> std::result::Result<Box<dyn CaptureStream>, CaptureError> {
        self.script.open_gate.pass();
        if let Some(error) = self.script.open_error.lock().clone() {
            return Err(error);
        }
        self.script.calls.lock().push("open");
        *self.script.callback.lock() = Some(on_sample);
        Ok(Box::new(FakeCaptureStream {
            script: self.script.clone(),
        }))
    }
}

struct FakeCaptureStream {
    script: Arc<AudioScript>,
}

impl CaptureStream for FakeCaptureStream {
    fn close(self: Box<Self>) -> Result<()> {
        self.script.close_gate.pass();
        self.script.callback.lock().take();
        self.script.calls.lock().push("close");
        Ok(())
    }
}

pub struct FixedPermissions {
    status: PermissionStatus,
}

impl FixedPermissions {
    pub fn new(status: PermissionStatus) -> Self {
        Self { status }
    }
}

#[async_trait]
impl PermissionProvider for FixedPermissions {
    fn query_audio_permission(&self) -> PermissionStatus {
        self.status
    }

    async fn request_audio_permission(&self) -> PermissionStatus {
        self.status
    }
}

pub struct NoopRouting;

#[async_trait]
impl AudioRouting for NoopRouting {
    async fn configure_for_play_and_record(&self, _options: &AudioRoutingOptions) -> Result<()> {
        Ok(())
    }
}

/// Audio routing that always refuses the play-and-record session
pub struct FailingRouting;

#[async_trait]
impl AudioRouting for FailingRouting {
    async fn configure_for_play_and_record(&self, _options: &AudioRoutingOptions) -> Result<()> {
        Err(DomainError::AudioRoutingFailed("session in use".to_string()))
    }
}
