use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{MediaKind, MicStatus, SessionState};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Session state (0=Idle, 1=Connecting, 2=Live, 3=Stopping, 4=Failed)
    pub static ref SESSION_STATE: Gauge = Gauge::new(
        "broadcast_session_state",
        "Current broadcast session state"
    ).expect("metric can be created");

    pub static ref AUDIO_ENABLED: IntGauge = IntGauge::new(
        "broadcast_audio_enabled",
        "Whether microphone audio is enabled (1) or muted (0)"
    ).expect("metric can be created");

    pub static ref MIC_ACTIVE: IntGauge = IntGauge::new(
        "broadcast_mic_active",
        "Whether the microphone is currently capturing"
    ).expect("metric can be created");

    pub static ref FRAMES_FORWARDED: IntCounterVec = IntCounterVec::new(
        Opts::new("broadcast_frames_forwarded_total", "Frames handed to the publish sink"),
        &["kind"]
    ).expect("metric can be created");

    pub static ref BYTES_FORWARDED: IntCounterVec = IntCounterVec::new(
        Opts::new("broadcast_bytes_forwarded_total", "Payload bytes handed to the publish sink"),
        &["kind"]
    ).expect("metric can be created");

    pub static ref FRAMES_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("broadcast_frames_dropped_total", "Frames dropped before reaching the sink"),
        &["kind"]
    ).expect("metric can be created");

    pub static ref RECONNECT_ATTEMPTS: IntCounter = IntCounter::new(
        "broadcast_reconnect_attempts_total",
        "Total number of reconnection attempts after connection loss"
    ).expect("metric can be created");

    // Length of the last completed live period
    pub static ref UPTIME_SECONDS: Gauge = Gauge::new(
        "broadcast_live_uptime_seconds",
        "Duration of the most recent live period"
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(SESSION_STATE.clone()))?;
        REGISTRY.register(Box::new(AUDIO_ENABLED.clone()))?;
        REGISTRY.register(Box::new(MIC_ACTIVE.clone()))?;
        REGISTRY.register(Box::new(FRAMES_FORWARDED.clone()))?;
        REGISTRY.register(Box::new(BYTES_FORWARDED.clone()))?;
        REGISTRY.register(Box::new(FRAMES_DROPPED.clone()))?;
        REGISTRY.register(Box::new(RECONNECT_ATTEMPTS.clone()))?;
        REGISTRY.register(Box::new(UPTIME_SECONDS.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_state_change(&self, state: &SessionState) {
        SESSION_STATE.set(state.as_metric());
    }

    fn report_audio_enabled(&self, enabled: bool) {
        AUDIO_ENABLED.set(i64::from(enabled));
    }

    fn report_mic_status(&self, status: MicStatus) {
        MIC_ACTIVE.set(i64::from(status.is_active()));
    }

    fn report_frame_forwarded(&self, kind: MediaKind, bytes: usize) {
        FRAMES_FORWARDED.with_label_values(&[kind.as_str()]).inc();
        BYTES_FORWARDED
            .with_label_values(&[kind.as_str()])
            .inc_by(bytes as u64);
    }

    fn report_frame_dropped(&self, kind: MediaKind) {
        FRAMES_DROPPED.with_label_values(&[kind.as_str()]).inc();
    }

    fn report_reconnect_attempt(&self) {
        RECONNECT_ATTEMPTS.inc();
    }

    fn report_uptime(&self, uptime_secs: f64) {
        UPTIME_SECONDS.set(uptime_secs);
    }
}
