use serde::Serialize;
use tokio::sync::watch;

use crate::domain::value_objects::{MicStatus, SessionState};

pub const STATUS_DISCONNECTED: &str = "Disconnected";
pub const STATUS_CONNECTING: &str = "Connecting…";
pub const STATUS_LIVE: &str = "Live";

/// Everything a UI layer observes about the broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastStatus {
    pub state: SessionState,
    pub connection_status: String,
    pub audio_enabled: bool,
    pub mic_status: MicStatus,
    pub session_id: Option<String>,
}

impl BroadcastStatus {
    fn initial(audio_enabled: bool) -> Self {
        Self {
            state: SessionState::Idle,
            connection_status: STATUS_DISCONNECTED.to_string(),
            audio_enabled,
            mic_status: MicStatus::NotStarted,
            session_id: None,
        }
    }
}

pub fn connection_failed_status(reason: &str) -> String {
    format!("Connection Failed: {}", reason)
}

pub fn reconnecting_status(attempt: u32) -> String {
    format!("Reconnecting (attempt {})…", attempt)
}

/// Observable status container with get/subscribe semantics.
///
/// Writers are the session manager's control-plane steps; readers may poll
/// `snapshot()` or await changes on a `subscribe()` receiver.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<BroadcastStatus>,
}

impl StatusBoard {
    pub fn new(audio_enabled: bool) -> Self {
        let (tx, _rx) = watch::channel(BroadcastStatus::initial(audio_enabled));
        Self { tx }
    }

    pub fn snapshot(&self) -> BroadcastStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BroadcastStatus> {
        self.tx.subscribe()
    }

    pub fn set_state(&self, state: SessionState) {
        self.update(|status| status.state = state);
    }

    pub fn set_connection_status(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|status| status.connection_status = text);
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.update(|status| status.audio_enabled = enabled);
    }

    pub fn set_mic_status(&self, mic_status: MicStatus) {
        self.update(|status| status.mic_status = mic_status);
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        self.update(|status| status.session_id = session_id);
    }

    /// Apply a change, notifying subscribers only if something changed
    pub fn update(&self, apply: impl FnOnce(&mut BroadcastStatus)) {
        self.tx.send_if_modified(|status| {
            let before = status.clone();
            apply(status);
            *status != before
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let board = StatusBoard::new(true);
        let status = board.snapshot();
        assert_eq!(status.state, SessionState::Idle);
        assert_eq!(status.connection_status, "Disconnected");
        assert!(status.audio_enabled);
        assert_eq!(status.mic_status, MicStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let board = StatusBoard::new(false);
        let mut rx = board.subscribe();

        board.set_state(SessionState::Connecting);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().state, SessionState::Connecting);
    }

    #[test]
    fn test_unchanged_update_does_not_notify() {
        let board = StatusBoard::new(false);
        let mut rx = board.subscribe();
        rx.borrow_and_update();

        board.set_audio_enabled(false);
        assert!(!rx.has_changed().unwrap());

        board.set_audio_enabled(true);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_serializes_status_strings() {
        let board = StatusBoard::new(true);
        board.set_mic_status(MicStatus::PermissionDenied);

        let json = serde_json::to_value(board.snapshot()).unwrap();
        assert_eq!(json["mic_status"], "Mic permission denied");
        assert_eq!(json["state"], "idle");
        assert_eq!(json["connection_status"], "Disconnected");
    }

    #[test]
    fn test_status_texts() {
        assert_eq!(connection_failed_status("Timeout"), "Connection Failed: Timeout");
        assert_eq!(reconnecting_status(2), "Reconnecting (attempt 2)…");
    }
}
