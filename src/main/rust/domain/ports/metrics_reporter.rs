use crate::domain::value_objects::{MediaKind, MicStatus, SessionState};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_state_change(&self, state: &SessionState);
    fn report_audio_enabled(&self, enabled: bool);
    fn report_mic_status(&self, status: MicStatus);
    fn report_frame_forwarded(&self, kind: MediaKind, bytes: usize);
    fn report_frame_dropped(&self, kind: MediaKind);
    fn report_reconnect_attempt(&self);
    fn report_uptime(&self, uptime_secs: f64);
}
