use std::sync::Arc;
use std::time::Duration;

use broadcast_session::application::services::test_support::{
    FailingRouting, FakeAudioInput, FixedPermissions, NoopRouting, NullMetrics, ScriptedClient,
};
use broadcast_session::application::services::{connection_failed_status, STATUS_LIVE};
use broadcast_session::domain::errors::{CaptureError, ConnectError, PublishError};
use broadcast_session::domain::value_objects::PublishState;
use broadcast_session::{
    AudioRouting, AudioSample, BroadcastConfig, BroadcastSessionManager, DomainError,
    EndpointConfig, MediaFrame, MicStatus, MixerConfig, PermissionStatus, PipelineBuilder,
    ReconnectPolicy, SessionPorts, SessionState, StreamKey, VideoFrame, VideoMode,
};

struct Harness {
    session: BroadcastSessionManager,
    client: ScriptedClient,
    input: FakeAudioInput,
}

struct HarnessBuilder {
    permission: PermissionStatus,
    client: ScriptedClient,
    input: FakeAudioInput,
    routing_fails: bool,
    audio_enabled: bool,
    reconnect: ReconnectPolicy,
    mixer: Option<MixerConfig>,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            permission: PermissionStatus::Granted,
            client: ScriptedClient::new(),
            input: FakeAudioInput::new(),
            routing_fails: false,
            audio_enabled: true,
            reconnect: ReconnectPolicy::disabled(),
            mixer: None,
        }
    }

    fn permission(mut self, permission: PermissionStatus) -> Self {
        self.permission = permission;
        self
    }

    fn client(mut self, client: ScriptedClient) -> Self {
        self.client = client;
        self
    }

    fn input(mut self, input: FakeAudioInput) -> Self {
        self.input = input;
        self
    }

    fn routing_fails(mut self) -> Self {
        self.routing_fails = true;
        self
    }

    fn muted(mut self) -> Self {
        self.audio_enabled = false;
        self
    }

    fn mixer(mut self, mixer: MixerConfig) -> Self {
        self.mixer = Some(mixer);
        self
    }

    fn reconnect(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.reconnect = ReconnectPolicy::new(
            attempts,
            Duration::from_millis(delay_ms),
            Duration::from_millis(delay_ms * 4),
            2.0,
        )
        .unwrap();
        self
    }

    fn build(self) -> Harness {
        let endpoint = EndpointConfig::new("rtmp://ingest.example.com/live".to_string()).unwrap();
        let mut config = BroadcastConfig::new(endpoint)
            .with_audio_enabled(self.audio_enabled)
            .with_reconnect(self.reconnect);
        if let Some(mixer) = self.mixer {
            config = config.with_mixer(mixer);
        }
        let routing: Arc<dyn AudioRouting> = if self.routing_fails {
            Arc::new(FailingRouting)
        } else {
            Arc::new(NoopRouting)
        };
        let ports = SessionPorts {
            permissions: Arc::new(FixedPermissions::new(self.permission)),
            routing,
            audio_input: Arc::new(self.input.clone()),
            streaming_client: Arc::new(self.client.clone()),
            metrics: Arc::new(NullMetrics),
        };

        Harness {
            session: BroadcastSessionManager::new(config, ports).unwrap(),
            client: self.client,
            input: self.input,
        }
    }
}

/// Poll `check` until it holds, failing the test after about two seconds
async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {}", what);
}

fn frame(timestamp: u32, byte: u8) -> VideoFrame {
    VideoFrame::new(timestamp, vec![byte; 16]).with_keyframe(timestamp == 0)
}

fn assert_settled(state: &SessionState) {
    assert!(
        matches!(state, SessionState::Idle | SessionState::Live),
        "session left in {}",
        state
    );
}

#[test]
fn test_gstreamer_init() {
    assert!(gstreamer::init().is_ok());
}

#[test]
fn test_publish_pipeline_targets_endpoint_with_key() {
    let endpoint = EndpointConfig::new("rtmp://ingest.example.com/live".to_string()).unwrap();
    let mixer = MixerConfig::default();

    let pipeline = PipelineBuilder::build_publish_string(&endpoint, "key1", &mixer);

    assert!(pipeline.contains("rtmp://ingest.example.com/live/key1"));
    assert!(pipeline.contains("flvmux"));
    assert!(pipeline.contains("rtmp2sink"));
}

#[test]
fn test_stream_key_is_masked_in_display() {
    let key = StreamKey::new("live_123456789").unwrap();
    assert_eq!(key.to_string(), "live****");
    assert_eq!(key.expose(), "live_123456789");
}

#[tokio::test]
async fn test_end_to_end_live_frame_then_stop() {
    let h = HarnessBuilder::new().build();

    h.session.start("key1").await.unwrap();
    assert_eq!(h.session.state(), SessionState::Live);
    assert!(h.session.capture_handle().is_some());
    assert_eq!(h.session.status().connection_status, STATUS_LIVE);

    let f1 = frame(0, 1);
    assert!(h.session.submit_video_frame(f1.clone()));
    let sink = h.client.sink();
    eventually("f1 reaches the sink", || sink.frames().len() == 1).await;
    assert_eq!(sink.frames(), vec![MediaFrame::Video(f1)]);

    h.session.stop().await;
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.session.capture_handle().is_none());
    assert_eq!(h.input.calls(), vec!["open", "close"]);

    assert!(!h.session.submit_video_frame(frame(33, 2)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(sink.frames().len(), 1);
}

#[tokio::test]
async fn test_state_always_settles() {
    let h = HarnessBuilder::new().build();

    h.session.start("key1").await.unwrap();
    assert_settled(&h.session.state());
    let _ = h.session.start("key1").await;
    assert_settled(&h.session.state());
    h.session.stop().await;
    assert_settled(&h.session.state());
    h.session.stop().await;
    assert_settled(&h.session.state());

    h.client.set_connect_error(Some(ConnectError::Timeout));
    assert!(h.session.start("key1").await.is_err());
    assert_settled(&h.session.state());

    h.client.set_connect_error(None);
    h.session.start("key1").await.unwrap();
    assert_eq!(h.session.state(), SessionState::Live);
}

#[tokio::test]
async fn test_stop_twice_matches_stop_once() {
    let h = HarnessBuilder::new().build();
    h.session.start("key1").await.unwrap();

    h.session.stop().await;
    let once = (h.session.state(), h.session.status(), h.input.calls(), h.client.closes());
    h.session.stop().await;
    let twice = (h.session.state(), h.session.status(), h.input.calls(), h.client.closes());

    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_start_while_live_changes_nothing() {
    let h = HarnessBuilder::new().build();
    h.session.start("key1").await.unwrap();
    let capture = h.session.capture_handle();
    let status = h.session.status();

    let result = h.session.start("key2").await;

    assert!(matches!(result, Err(DomainError::SessionBusy(SessionState::Live))));
    assert_eq!(h.session.state(), SessionState::Live);
    assert_eq!(h.session.capture_handle(), capture);
    assert_eq!(h.session.status(), status);
    assert_eq!(h.client.connects(), 1);
    assert_eq!(h.input.calls(), vec!["open"]);
}

#[tokio::test]
async fn test_frames_never_reach_sink_unless_live() {
    let h = HarnessBuilder::new()
        .client(ScriptedClient::new().gate_connect())
        .build();

    assert!(!h.session.submit_video_frame(frame(0, 1)));

    let starting = {
        let session = h.session.clone();
        tokio::spawn(async move { session.start("key1").await })
    };
    h.client.wait_connect_started().await;
    assert_eq!(h.session.state(), SessionState::Connecting);
    assert!(!h.session.submit_video_frame(frame(33, 2)));

    h.client.release_connect();
    starting.await.unwrap().unwrap();
    h.session.stop().await;
    assert!(!h.session.submit_video_frame(frame(66, 3)));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.client.sink().frames().is_empty());
}

#[tokio::test]
async fn test_secondary_audio_track_is_gated_on_live() {
    let h = HarnessBuilder::new()
        .muted()
        .mixer(MixerConfig::new(VideoMode::Passthrough, 2).unwrap())
        .build();
    let music = AudioSample::new(1, 0, vec![7u8; 8]);

    assert!(!h.session.submit_audio_sample(music.clone()));

    h.session.start("key1").await.unwrap();
    assert!(h.session.submit_audio_sample(music.clone()));
    let sink = h.client.sink();
    eventually("sample reaches the sink", || sink.frames().len() == 1).await;
    assert_eq!(sink.frames(), vec![MediaFrame::Audio(music)]);

    h.session.stop().await;
    assert!(!h.session.submit_audio_sample(AudioSample::new(1, 20, vec![7u8; 8])));
}

#[tokio::test]
async fn test_permission_denied_goes_live_video_only() {
    let h = HarnessBuilder::new().permission(PermissionStatus::Denied).build();

    h.session.start("key1").await.unwrap();

    assert_eq!(h.session.state(), SessionState::Live);
    assert_eq!(h.session.status().mic_status.as_str(), "Mic permission denied");
    assert!(h.session.capture_handle().is_none());
    assert!(h.input.calls().is_empty());
}

#[tokio::test]
async fn test_missing_microphone_goes_live_video_only() {
    let h = HarnessBuilder::new()
        .input(FakeAudioInput::new().fail_open(CaptureError::DeviceUnavailable))
        .build();

    h.session.start("key1").await.unwrap();

    assert_eq!(h.session.state(), SessionState::Live);
    assert_eq!(h.session.status().mic_status, MicStatus::NoMicFound);
}

#[tokio::test]
async fn test_toggle_twice_starts_then_stops_capture() {
    let h = HarnessBuilder::new().muted().build();
    h.session.start("key1").await.unwrap();
    let original = h.session.is_audio_enabled();
    assert!(h.input.calls().is_empty());

    assert!(h.session.toggle_audio().await);
    assert_eq!(h.session.status().mic_status, MicStatus::Active);
    assert!(!h.session.toggle_audio().await);

    assert_eq!(h.session.is_audio_enabled(), original);
    assert_eq!(h.input.calls(), vec!["open", "close"]);
    assert_eq!(h.session.status().mic_status, MicStatus::Stopped);
    assert_eq!(h.session.state(), SessionState::Live);
}

#[tokio::test]
async fn test_toggle_while_idle_only_flips_flag() {
    let h = HarnessBuilder::new().build();

    assert!(!h.session.toggle_audio().await);
    assert!(!h.session.status().audio_enabled);
    assert!(h.input.calls().is_empty());

    h.session.start("key1").await.unwrap();
    assert!(h.session.capture_handle().is_none());
    assert_eq!(h.session.status().mic_status, MicStatus::NotStarted);
}

#[tokio::test]
async fn test_toggle_without_permission_does_not_prompt() {
    let h = HarnessBuilder::new()
        .muted()
        .permission(PermissionStatus::Denied)
        .build();
    h.session.start("key1").await.unwrap();

    assert!(h.session.toggle_audio().await);

    assert!(h.input.calls().is_empty());
    assert_eq!(h.session.status().mic_status, MicStatus::PermissionDenied);
    assert_eq!(h.session.state(), SessionState::Live);
}

#[tokio::test]
async fn test_publish_failure_rolls_back() {
    let h = HarnessBuilder::new()
        .client(
            ScriptedClient::new()
                .fail_publish(PublishError::ServerRejected("bad key".to_string())),
        )
        .build();

    let result = h.session.start("key1").await;

    assert!(matches!(result, Err(DomainError::Publish(PublishError::ServerRejected(_)))));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.session.publish_state(), PublishState::Disconnected);
    assert_eq!(h.input.calls(), vec!["open", "close"]);
    assert!(h.session.capture_handle().is_none());
    assert_eq!(h.client.closes(), 1);
    assert_eq!(
        h.session.status().connection_status,
        connection_failed_status("Server rejected publish: bad key")
    );
    assert_eq!(
        h.session.last_failure().as_deref(),
        Some("Server rejected publish: bad key")
    );
}

#[tokio::test]
async fn test_invalid_stream_key_fails_start() {
    let h = HarnessBuilder::new().build();

    let result = h.session.start("bad/key").await;

    assert!(matches!(result, Err(DomainError::Publish(PublishError::InvalidStreamKey))));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.client.connects(), 0);
    assert_eq!(h.input.calls(), vec!["open", "close"]);
}

#[tokio::test]
async fn test_routing_failure_is_fatal() {
    let h = HarnessBuilder::new().routing_fails().build();

    let result = h.session.start("key1").await;

    assert!(matches!(result, Err(DomainError::AudioRoutingFailed(_))));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.client.connects(), 0);
    assert!(h.input.calls().is_empty());
}

#[tokio::test]
async fn test_stop_during_start_wins() {
    let h = HarnessBuilder::new()
        .client(ScriptedClient::new().gate_connect())
        .build();

    let starting = {
        let session = h.session.clone();
        tokio::spawn(async move { session.start("key1").await })
    };
    h.client.wait_connect_started().await;

    h.session.stop().await;
    assert_eq!(h.session.state(), SessionState::Idle);
    h.client.release_connect();

    let result = starting.await.unwrap();
    assert!(matches!(result, Err(DomainError::StartAborted)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.session.publish_state(), PublishState::Disconnected);
    assert!(h.session.capture_handle().is_none());
    assert_eq!(h.input.calls(), vec!["open", "close"]);
    assert_eq!(h.client.closes(), 1);
    assert!(!h.session.submit_video_frame(frame(0, 1)));
}

#[tokio::test]
async fn test_status_subscribers_observe_live() {
    let h = HarnessBuilder::new().build();
    let mut status = h.session.subscribe();

    h.session.start("key1").await.unwrap();

    status.changed().await.unwrap();
    let snapshot = status.borrow_and_update().clone();
    assert_eq!(snapshot.state, SessionState::Live);
    assert!(snapshot.session_id.is_some());
}

#[tokio::test]
async fn test_lost_connection_without_policy_ends_session() {
    let h = HarnessBuilder::new().build();
    h.session.start("key1").await.unwrap();

    h.client.lose_connection("socket closed");

    eventually("session ends", || h.session.state() == SessionState::Idle).await;
    assert_eq!(
        h.session.status().connection_status,
        connection_failed_status("socket closed")
    );
    assert_eq!(h.input.calls(), vec!["open", "close"]);
}

#[tokio::test]
async fn test_lost_connection_recovers_and_keeps_capture() {
    let h = HarnessBuilder::new().reconnect(3, 10).build();
    h.session.start("key1").await.unwrap();
    let capture = h.session.capture_handle();

    h.client.lose_connection("socket closed");

    eventually("session reconnects", || {
        h.client.connects() == 2 && h.session.is_live()
    })
    .await;
    assert_eq!(h.session.capture_handle(), capture);
    assert_eq!(h.input.calls(), vec!["open"]);
    assert_eq!(h.session.status().connection_status, STATUS_LIVE);

    let sink = h.client.sink();
    assert!(h.session.submit_video_frame(frame(0, 9)));
    eventually("frame after recovery", || sink.frames().len() == 1).await;
}

#[tokio::test]
async fn test_exhausted_recovery_fails_to_idle() {
    let h = HarnessBuilder::new().reconnect(2, 5).build();
    h.session.start("key1").await.unwrap();

    h.client
        .set_connect_error(Some(ConnectError::NetworkUnreachable("no route".to_string())));
    h.client.lose_connection("socket closed");

    eventually("recovery gives up", || h.session.state() == SessionState::Idle).await;
    assert_eq!(h.client.connects(), 3);
    assert_eq!(h.input.calls(), vec!["open", "close"]);
    assert!(h
        .session
        .status()
        .connection_status
        .starts_with("Connection Failed: Network unreachable"));
}

#[tokio::test]
async fn test_stop_during_recovery_wins() {
    let h = HarnessBuilder::new().reconnect(3, 200).build();
    h.session.start("key1").await.unwrap();

    h.client.lose_connection("socket closed");
    eventually("recovery begins", || {
        h.session.status().connection_status.starts_with("Reconnecting")
    })
    .await;
    assert_eq!(h.session.state(), SessionState::Connecting);

    h.session.stop().await;
    assert_eq!(h.session.state(), SessionState::Idle);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.client.connects(), 1);
    assert_eq!(h.input.calls(), vec!["open", "close"]);
}
