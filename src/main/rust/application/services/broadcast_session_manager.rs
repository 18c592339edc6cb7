use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::status_board::{
    connection_failed_status, reconnecting_status, STATUS_CONNECTING, STATUS_DISCONNECTED,
    STATUS_LIVE,
};
use super::{
    BroadcastStatus, CaptureController, CaptureHandle, MediaMixer, MixerStatsSnapshot,
    PublishHandle, PublishSession, StatusBoard,
};
use crate::domain::entities::{BroadcastLifecycle, StateTransition};
use crate::domain::errors::{ConnectError, DomainError, PublishError, Result};
use crate::domain::ports::{
    AudioInput, AudioRouting, MetricsReporter, PermissionProvider, StreamingClient,
};
use crate::domain::value_objects::{
    AudioSample, BroadcastConfig, MediaKind, MicStatus, PermissionStatus, PublishState,
    SessionState, StreamKey, VideoFrame,
};

/// Platform adapters the session manager drives
#[derive(Clone)]
pub struct SessionPorts {
    pub permissions: Arc<dyn PermissionProvider>,
    pub routing: Arc<dyn AudioRouting>,
    pub audio_input: Arc<dyn AudioInput>,
    pub streaming_client: Arc<dyn StreamingClient>,
    pub metrics: Arc<dyn MetricsReporter>,
}

struct ManagerInner {
    config: BroadcastConfig,
    lifecycle: Mutex<BroadcastLifecycle>,
    // Mirrors `lifecycle` for the frame path, which must not contend on the lock
    live: AtomicBool,
    audio_enabled: AtomicBool,
    mic_permission_granted: AtomicBool,
    stream_key: Mutex<Option<StreamKey>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    // Serializes capture reconciliation; held across device open/close
    audio_gate: tokio::sync::Mutex<()>,
    permissions: Arc<dyn PermissionProvider>,
    routing: Arc<dyn AudioRouting>,
    capture: CaptureController,
    mixer: MediaMixer,
    publish: PublishSession,
    status: StatusBoard,
    metrics: Arc<dyn MetricsReporter>,
}

impl ManagerInner {
    /// Apply a guarded lifecycle step and publish every state it recorded
    fn transition(&self, apply: impl FnOnce(&mut BroadcastLifecycle) -> bool) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        let before = lifecycle.transition_count();
        if !apply(&mut lifecycle) {
            return false;
        }

        let recorded = (lifecycle.transition_count() - before) as usize;
        let history = lifecycle.history();
        let skip = history.len().saturating_sub(recorded);
        for step in history.skip(skip) {
            self.metrics.report_state_change(&step.to);
            tracing::debug!(from = %step.from, to = %step.to, "Session state changed");
        }
        let state = lifecycle.current_state().clone();
        self.live.store(state.is_live(), Ordering::Release);
        self.status.set_state(state);
        true
    }

    /// Still the start (or recovery) identified by `epoch`, and still connecting
    fn is_current(&self, epoch: u64) -> bool {
        let lifecycle = self.lifecycle.lock();
        lifecycle.epoch() == epoch && *lifecycle.current_state() == SessionState::Connecting
    }

    fn is_superseded(&self, epoch: u64) -> bool {
        self.lifecycle.lock().epoch() != epoch
    }

    fn set_mic_status(&self, mic_status: MicStatus) {
        self.status.set_mic_status(mic_status);
        self.metrics.report_mic_status(mic_status);
    }

    async fn resolve_permission(&self) -> bool {
        match self.permissions.query_audio_permission() {
            PermissionStatus::Granted => true,
            PermissionStatus::Denied => false,
            PermissionStatus::Undetermined => {
                tracing::info!("Requesting microphone permission");
                self.permissions.request_audio_permission().await.is_granted()
            }
        }
    }
}

/// Top-level coordinator of a broadcast session.
///
/// Cheap to clone; all clones drive the same session. Control operations may be
/// called concurrently: every step re-checks the lifecycle after each
/// suspension point, so a `stop()` issued mid-start always wins.
#[derive(Clone)]
pub struct BroadcastSessionManager {
    inner: Arc<ManagerInner>,
}

impl BroadcastSessionManager {
    /// Build the session and start the mixer's forwarding task.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: BroadcastConfig, ports: SessionPorts) -> Result<Self> {
        let mixer = MediaMixer::new(ports.metrics.clone());
        mixer.configure(config.mixer().clone())?;
        let mixer_input = mixer.input().ok_or(DomainError::MixerNotConfigured)?;

        let capture =
            CaptureController::new(ports.audio_input, ports.permissions.clone(), mixer_input);
        let audio_enabled = config.audio_enabled();
        ports.metrics.report_audio_enabled(audio_enabled);
        ports.metrics.report_state_change(&SessionState::Idle);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                lifecycle: Mutex::new(BroadcastLifecycle::new()),
                live: AtomicBool::new(false),
                audio_enabled: AtomicBool::new(audio_enabled),
                mic_permission_granted: AtomicBool::new(false),
                stream_key: Mutex::new(None),
                monitor: Mutex::new(None),
                audio_gate: tokio::sync::Mutex::new(()),
                permissions: ports.permissions,
                routing: ports.routing,
                capture,
                mixer,
                publish: PublishSession::new(ports.streaming_client),
                status: StatusBoard::new(audio_enabled),
                metrics: ports.metrics,
                config,
            }),
        })
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.lifecycle.lock().current_state().clone()
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    pub fn status(&self) -> BroadcastStatus {
        self.inner.status.snapshot()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<BroadcastStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.inner.audio_enabled.load(Ordering::Acquire)
    }

    pub fn capture_handle(&self) -> Option<CaptureHandle> {
        self.inner.capture.handle()
    }

    pub fn publish_state(&self) -> PublishState {
        self.inner.publish.state()
    }

    pub fn mixer_stats(&self) -> MixerStatsSnapshot {
        self.inner.mixer.stats()
    }

    pub fn history(&self) -> Vec<StateTransition> {
        self.inner.lifecycle.lock().history().cloned().collect()
    }

    pub fn last_failure(&self) -> Option<String> {
        self.inner.lifecycle.lock().last_failure().map(str::to_string)
    }

    /// Go live: Idle -> Connecting -> Live, or Connecting -> Failed -> Idle.
    ///
    /// Microphone problems degrade to a video-only broadcast; routing, network
    /// and protocol failures are fatal. Returns `StartAborted` if `stop()` ran
    /// before the session reached Live.
    pub async fn start(&self, stream_key: &str) -> Result<()> {
        let inner = &self.inner;

        let mut epoch = 0;
        let began = inner.transition(|lifecycle| {
            let began = lifecycle.begin_connecting();
            epoch = lifecycle.epoch();
            began
        });
        if !began {
            let state = self.state();
            tracing::warn!(%state, "Start ignored: session is not idle");
            return Err(DomainError::SessionBusy(state));
        }
        inner.status.update(|status| {
            status.connection_status = STATUS_CONNECTING.to_string();
            status.session_id = None;
        });
        tracing::info!(endpoint = %inner.config.endpoint().url(), "Starting broadcast");

        let audio_wanted = inner.audio_enabled.load(Ordering::Acquire);
        let granted = if audio_wanted {
            inner.resolve_permission().await
        } else {
            inner.permissions.query_audio_permission().is_granted()
        };
        inner.mic_permission_granted.store(granted, Ordering::Release);
        if !inner.is_current(epoch) {
            return self.abort_start(epoch).await;
        }

        if let Err(e) = inner
            .routing
            .configure_for_play_and_record(inner.config.routing())
            .await
        {
            let error = match e {
                DomainError::AudioRoutingFailed(_) => e,
                other => DomainError::AudioRoutingFailed(other.to_string()),
            };
            return Err(self.fail_start(epoch, error).await);
        }
        if !inner.is_current(epoch) {
            return self.abort_start(epoch).await;
        }

        if audio_wanted {
            if granted {
                self.start_capture().await;
            } else {
                tracing::warn!("Microphone permission denied; broadcasting without audio");
                inner.set_mic_status(MicStatus::PermissionDenied);
            }
            if !inner.is_current(epoch) {
                return self.abort_start(epoch).await;
            }
        }

        let key = match StreamKey::new(stream_key) {
            Ok(key) => key,
            Err(e) => return Err(self.fail_start(epoch, e.into()).await),
        };
        *inner.stream_key.lock() = Some(key.clone());

        let handle = match self.connect_and_publish(&key).await {
            Ok(handle) => handle,
            Err(DomainError::Connect(ConnectError::Aborted))
            | Err(DomainError::Publish(PublishError::Aborted)) => {
                return self.abort_start(epoch).await;
            }
            Err(e) => {
                if !inner.is_current(epoch) {
                    return self.abort_start(epoch).await;
                }
                return Err(self.fail_start(epoch, e).await);
            }
        };

        if !self.go_live(epoch, handle).await {
            return self.abort_start(epoch).await;
        }
        tracing::info!(stream_key = %key, "Broadcast is live");
        Ok(())
    }

    /// Tear everything down and return to Idle. No-op when already idle.
    ///
    /// A call that overlaps another stop returns once that teardown finishes.
    pub async fn stop(&self) {
        let inner = &self.inner;

        let mut previous = None;
        let mut uptime = None;
        let mut in_progress = false;
        let stopping = inner.transition(|lifecycle| {
            in_progress = *lifecycle.current_state() == SessionState::Stopping;
            uptime = lifecycle.uptime();
            previous = lifecycle.begin_stopping();
            previous.is_some()
        });
        if !stopping {
            if in_progress {
                tracing::debug!("Stop already in progress; waiting for teardown");
                self.wait_while_stopping().await;
            } else {
                tracing::debug!("Stop ignored: session already idle");
            }
            return;
        }
        if let Some(uptime) = uptime {
            inner.metrics.report_uptime(uptime.as_secs_f64());
        }
        tracing::info!(from = ?previous, "Stopping broadcast");

        if let Some(monitor) = inner.monitor.lock().take() {
            monitor.abort();
        }
        self.release_resources().await;

        inner.transition(|lifecycle| lifecycle.finish_stopping());
        inner.stream_key.lock().take();
        inner.status.update(|status| {
            status.connection_status = STATUS_DISCONNECTED.to_string();
            status.session_id = None;
        });
        tracing::info!("Broadcast stopped");
    }

    async fn wait_while_stopping(&self) {
        let mut status = self.inner.status.subscribe();
        loop {
            let stopping = status.borrow_and_update().state == SessionState::Stopping;
            if !stopping || status.changed().await.is_err() {
                return;
            }
        }
    }

    /// Flip audio enablement and return the new value.
    ///
    /// While Live this starts or stops the microphone; otherwise only the flag
    /// changes and takes effect at the next start.
    pub async fn toggle_audio(&self) -> bool {
        let inner = &self.inner;
        let enabled = !inner.audio_enabled.fetch_xor(true, Ordering::AcqRel);
        inner.status.set_audio_enabled(enabled);
        inner.metrics.report_audio_enabled(enabled);
        tracing::info!(enabled, "Audio toggled");

        if self.is_live() {
            self.reconcile_audio().await;
        }
        enabled
    }

    /// Hand a video frame to the mixer. Dropped unless Live.
    pub fn submit_video_frame(&self, frame: VideoFrame) -> bool {
        if !self.is_live() {
            self.inner.metrics.report_frame_dropped(MediaKind::Video);
            tracing::trace!("Video frame dropped: session not live");
            return false;
        }
        self.inner.mixer.submit_video(frame)
    }

    /// Hand an audio sample from a non-microphone source to the mixer
    pub fn submit_audio_sample(&self, sample: AudioSample) -> bool {
        if !self.is_live() {
            self.inner.metrics.report_frame_dropped(MediaKind::Audio);
            tracing::trace!("Audio sample dropped: session not live");
            return false;
        }
        self.inner.mixer.submit_audio(sample)
    }

    async fn connect_and_publish(&self, key: &StreamKey) -> Result<PublishHandle> {
        let inner = &self.inner;
        inner.publish.connect(inner.config.endpoint()).await?;
        let handle = inner.publish.publish(key).await?;
        Ok(handle)
    }

    /// Connecting -> Live for `epoch`, then route frames to `handle`
    async fn go_live(&self, epoch: u64, handle: PublishHandle) -> bool {
        let inner = &self.inner;
        if !inner.transition(|lifecycle| lifecycle.epoch() == epoch && lifecycle.enter_live()) {
            return false;
        }

        if let Err(e) = inner.mixer.attach_sink(handle.clone()).await {
            tracing::error!("Failed to attach publish sink: {}", e);
        }
        if !self.is_live() || inner.is_superseded(epoch) {
            inner.mixer.detach_sink().await;
            return false;
        }

        inner.status.update(|status| {
            status.connection_status = STATUS_LIVE.to_string();
            status.session_id = Some(handle.id().to_string());
        });
        self.spawn_connection_monitor(epoch);
        self.reconcile_audio().await;
        true
    }

    async fn start_capture(&self) -> bool {
        let inner = &self.inner;
        match inner.capture.start().await {
            Ok(handle) => {
                tracing::debug!(capture_id = %handle.id(), "Microphone active");
                inner.set_mic_status(MicStatus::Active);
                true
            }
            Err(e) => {
                tracing::warn!("Microphone unavailable, continuing without audio: {}", e);
                inner.set_mic_status(MicStatus::from(&e));
                false
            }
        }
    }

    /// Bring capture in line with the audio flag.
    ///
    /// Runs until capture matches the flag as it reads after the last device
    /// call, so toggles that land while the device is opening are honoured.
    async fn reconcile_audio(&self) {
        let inner = &self.inner;
        let _serial = inner.audio_gate.lock().await;

        loop {
            // Capture survives recovery, so Connecting still counts
            let wanted = inner.audio_enabled.load(Ordering::Acquire)
                && matches!(self.state(), SessionState::Live | SessionState::Connecting);
            if wanted == inner.capture.is_active() {
                return;
            }

            if wanted {
                if !inner.mic_permission_granted.load(Ordering::Acquire) {
                    tracing::warn!(
                        "Microphone permission was not granted at start; audio stays off"
                    );
                    inner.set_mic_status(MicStatus::PermissionDenied);
                    return;
                }
                if !self.start_capture().await {
                    return;
                }
            } else {
                inner.capture.stop().await.wait().await;
                inner.set_mic_status(MicStatus::Stopped);
            }
        }
    }

    /// Close the connection, release the microphone and detach the sink
    async fn release_resources(&self) {
        let inner = &self.inner;
        if let Some(handle) = inner.publish.handle() {
            handle.revoke();
        }

        let capturing = inner.capture.is_active();
        let (_, release, _) = tokio::join!(
            inner.publish.close(),
            inner.capture.stop(),
            inner.mixer.detach_sink()
        );
        release.wait().await;

        if capturing || inner.status.snapshot().mic_status.is_active() {
            inner.set_mic_status(MicStatus::Stopped);
        }
    }

    async fn fail_start(&self, epoch: u64, error: DomainError) -> DomainError {
        tracing::error!("Broadcast start failed: {}", error);
        self.fail(epoch, error.to_string()).await;
        error
    }

    /// Connecting -> Failed -> Idle after releasing everything acquired
    async fn fail(&self, epoch: u64, reason: String) {
        let inner = &self.inner;
        if inner.is_superseded(epoch) {
            return;
        }
        self.release_resources().await;

        let failed = inner.transition(|lifecycle| {
            lifecycle.epoch() == epoch && lifecycle.fail(reason.clone())
        });
        if failed {
            inner.stream_key.lock().take();
            inner.status.update(|status| {
                status.connection_status = connection_failed_status(&reason);
                status.session_id = None;
            });
        }
    }

    /// A `stop()` overtook this start; release anything acquired after its teardown
    async fn abort_start(&self, epoch: u64) -> Result<()> {
        if !self.inner.is_superseded(epoch) {
            self.release_resources().await;
        }
        tracing::info!("Start aborted: session stopped while connecting");
        Err(DomainError::StartAborted)
    }

    fn spawn_connection_monitor(&self, epoch: u64) {
        let Some(mut loss) = self.inner.publish.loss_signal() else {
            return;
        };
        let manager = self.clone();

        let mut slot = self.inner.monitor.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            let reason = loop {
                let lost = loss.borrow_and_update().clone();
                if let Some(reason) = lost {
                    break reason;
                }
                if loss.changed().await.is_err() {
                    return;
                }
            };
            // Detach from stop()'s reach; recovery re-checks state after every step
            manager.inner.monitor.lock().take();
            manager.recover(epoch, reason).await;
        }));
    }

    /// Live -> Connecting, then retry connect/publish per the reconnect policy.
    ///
    /// Capture keeps running throughout; frames are dropped until Live again.
    async fn recover(&self, epoch: u64, reason: String) {
        let inner = &self.inner;
        let lost = inner.transition(|lifecycle| {
            lifecycle.epoch() == epoch && lifecycle.begin_recovery(reason.clone())
        });
        if !lost {
            return;
        }
        tracing::warn!("Connection lost: {}", reason);
        inner.status.set_session_id(None);

        if let Some(handle) = inner.publish.handle() {
            handle.revoke();
        }
        tokio::join!(inner.mixer.detach_sink(), inner.publish.close());

        let policy = inner.config.reconnect().clone();
        let key = inner.stream_key.lock().clone();
        let mut last_error = reason;

        if let Some(key) = key.filter(|_| policy.is_enabled()) {
            for attempt in 1..=policy.max_attempts() {
                let delay = policy.delay_for_attempt(attempt);
                inner.status.set_connection_status(reconnecting_status(attempt));
                inner.metrics.report_reconnect_attempt();
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

                tokio::time::sleep(delay).await;
                if !inner.is_current(epoch) {
                    return;
                }

                match self.connect_and_publish(&key).await {
                    Ok(handle) => {
                        if self.go_live(epoch, handle).await {
                            tracing::info!(attempt, "Reconnected");
                        }
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(attempt, "Reconnect attempt failed: {}", e);
                        if !inner.is_current(epoch) {
                            return;
                        }
                        inner.publish.close().await;
                        last_error = e.to_string();
                    }
                }
            }
        }

        tracing::error!("Giving up on lost connection: {}", last_error);
        self.fail(epoch, last_error).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::{
        FakeAudioInput, FixedPermissions, NoopRouting, NullMetrics, ScriptedClient,
    };
    use std::time::Duration;

    use crate::domain::errors::CaptureError;
    use crate::domain::value_objects::EndpointConfig;

    fn manager(
        client: ScriptedClient,
        input: FakeAudioInput,
        permission: PermissionStatus,
    ) -> BroadcastSessionManager {
        let endpoint = EndpointConfig::new("rtmp://localhost/live".to_string()).unwrap();
        let ports = SessionPorts {
            permissions: Arc::new(FixedPermissions::new(permission)),
            routing: Arc::new(NoopRouting),
            audio_input: Arc::new(input),
            streaming_client: Arc::new(client),
            metrics: Arc::new(NullMetrics),
        };
        BroadcastSessionManager::new(BroadcastConfig::new(endpoint), ports).unwrap()
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_goes_live_with_microphone() {
        let input = FakeAudioInput::new();
        let session = manager(ScriptedClient::new(), input.clone(), PermissionStatus::Granted);

        session.start("key1").await.unwrap();

        assert_eq!(session.state(), SessionState::Live);
        assert!(session.capture_handle().is_some());
        let status = session.status();
        assert_eq!(status.connection_status, STATUS_LIVE);
        assert_eq!(status.mic_status, MicStatus::Active);
        assert!(status.session_id.is_some());
    }

    #[tokio::test]
    async fn test_missing_device_degrades_to_video_only() {
        let input = FakeAudioInput::new().fail_open(CaptureError::DeviceUnavailable);
        let session = manager(ScriptedClient::new(), input, PermissionStatus::Granted);

        session.start("key1").await.unwrap();

        assert_eq!(session.state(), SessionState::Live);
        assert_eq!(session.status().mic_status, MicStatus::NoMicFound);
        assert!(session.capture_handle().is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_settles_idle() {
        let client = ScriptedClient::new().fail_connect(ConnectError::Timeout);
        let input = FakeAudioInput::new();
        let session = manager(client, input.clone(), PermissionStatus::Granted);

        let result = session.start("key1").await;

        assert!(matches!(result, Err(DomainError::Connect(ConnectError::Timeout))));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            session.status().connection_status,
            connection_failed_status("Connection timed out")
        );
        assert_eq!(input.calls(), vec!["open", "close"]);
        assert!(session
            .history()
            .iter()
            .any(|step| matches!(step.to, SessionState::Failed(_))));
    }

    #[tokio::test]
    async fn test_second_start_is_busy() {
        let session = manager(
            ScriptedClient::new(),
            FakeAudioInput::new(),
            PermissionStatus::Granted,
        );
        session.start("key1").await.unwrap();

        let result = session.start("key1").await;
        assert!(matches!(
            result,
            Err(DomainError::SessionBusy(SessionState::Live))
        ));
        assert_eq!(session.state(), SessionState::Live);
    }

    #[tokio::test]
    async fn test_stop_releases_everything_once() {
        let client = ScriptedClient::new();
        let input = FakeAudioInput::new();
        let session = manager(client.clone(), input.clone(), PermissionStatus::Granted);
        session.start("key1").await.unwrap();

        session.stop().await;
        session.stop().await;

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.publish_state(), PublishState::Disconnected);
        assert_eq!(client.closes(), 1);
        assert_eq!(input.calls(), vec!["open", "close"]);
        let status = session.status();
        assert_eq!(status.connection_status, STATUS_DISCONNECTED);
        assert_eq!(status.mic_status, MicStatus::Stopped);
    }

    #[tokio::test]
    async fn test_video_frames_only_reach_sink_while_live() {
        let client = ScriptedClient::new();
        let session = manager(client.clone(), FakeAudioInput::new(), PermissionStatus::Granted);

        assert!(!session.submit_video_frame(VideoFrame::new(0, vec![1])));
        session.start("key1").await.unwrap();
        assert!(session.submit_video_frame(VideoFrame::new(33, vec![1])));
        session.inner.mixer.flush().await;
        session.stop().await;
        assert!(!session.submit_video_frame(VideoFrame::new(66, vec![1])));

        assert_eq!(client.sink().count(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_toggles_leave_capture_matching_flag() {
        let input = FakeAudioInput::new();
        let session = manager(ScriptedClient::new(), input.clone(), PermissionStatus::Granted);
        session.start("key1").await.unwrap();
        assert!(!session.toggle_audio().await);

        input.hold_open();
        let enabling = {
            let session = session.clone();
            tokio::spawn(async move { session.toggle_audio().await })
        };
        wait_for(|| input.opens_waiting() == 1).await;

        let disabling = {
            let session = session.clone();
            tokio::spawn(async move { session.toggle_audio().await })
        };
        wait_for(|| !session.is_audio_enabled()).await;
        input.release_open();

        assert!(enabling.await.unwrap());
        assert!(!disabling.await.unwrap());
        assert!(!session.is_audio_enabled());
        assert!(session.capture_handle().is_none());
        assert_eq!(input.calls(), vec!["open", "close", "open", "close"]);
        assert_eq!(session.status().mic_status, MicStatus::Stopped);
        assert_eq!(session.state(), SessionState::Live);
    }

    #[tokio::test]
    async fn test_overlapping_stop_waits_for_teardown() {
        let input = FakeAudioInput::new();
        let session = manager(ScriptedClient::new(), input.clone(), PermissionStatus::Granted);
        session.start("key1").await.unwrap();
        input.hold_close();

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.stop().await })
        };
        wait_for(|| input.closes_waiting() == 1).await;
        assert_eq!(session.state(), SessionState::Stopping);

        let second = {
            let session = session.clone();
            tokio::spawn(async move { session.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        input.release_close();
        second.await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        first.await.unwrap();
        assert_eq!(input.calls(), vec!["open", "close"]);
    }
}
