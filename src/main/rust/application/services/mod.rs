mod broadcast_session_manager;
mod capture_controller;
mod media_mixer;
mod publish_session;
mod status_board;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use broadcast_session_manager::{BroadcastSessionManager, SessionPorts};
pub use capture_controller::{CaptureController, CaptureHandle, CaptureRelease};
pub use media_mixer::{MediaMixer, MixerInput, MixerStats, MixerStatsSnapshot, DROP_LOG_INTERVAL};
pub use publish_session::{PublishHandle, PublishSession};
pub use status_board::{
    connection_failed_status, reconnecting_status, BroadcastStatus, StatusBoard,
    STATUS_CONNECTING, STATUS_DISCONNECTED, STATUS_LIVE,
};
