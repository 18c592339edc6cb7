use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::domain::value_objects::SessionState;

/// Transitions kept for inspection; older ones are discarded
pub const MAX_HISTORY: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// Broadcast lifecycle: the single owner of `SessionState`.
///
/// Transitions are guarded: every `begin_*`/`enter_*` call names the state it
/// expects to leave and is refused when the current state differs. Callers that
/// suspended between two steps use the return value to detect that a concurrent
/// `stop()` already moved the session on.
#[derive(Debug)]
pub struct BroadcastLifecycle {
    current_state: SessionState,
    state_history: VecDeque<StateTransition>,
    transitions: u64,
    live_since: Option<Instant>,
    last_failure: Option<String>,
    // Incremented on every start so suspended callers can tell sessions apart
    epoch: u64,
}

impl BroadcastLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
            state_history: VecDeque::with_capacity(MAX_HISTORY),
            transitions: 0,
            live_since: None,
            last_failure: None,
            epoch: 0,
        }
    }

    pub fn current_state(&self) -> &SessionState {
        &self.current_state
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.live_since.map(|start| start.elapsed())
    }

    /// Transitions recorded since creation, including discarded ones
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.back()
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// The most recent transitions, oldest first
    pub fn history(&self) -> impl DoubleEndedIterator<Item = &StateTransition> + ExactSizeIterator {
        self.state_history.iter()
    }

    /// Identifies the session begun by the latest `begin_connecting`
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Idle -> Connecting
    pub fn begin_connecting(&mut self) -> bool {
        if !self.current_state.is_idle() {
            return false;
        }
        self.epoch += 1;
        self.record_transition(SessionState::Connecting, None);
        true
    }

    /// Connecting -> Live
    pub fn enter_live(&mut self) -> bool {
        if self.current_state != SessionState::Connecting {
            return false;
        }
        self.record_transition(SessionState::Live, None);
        self.live_since = Some(Instant::now());
        true
    }

    /// Live -> Connecting, while recovering a lost connection
    pub fn begin_recovery(&mut self, reason: String) -> bool {
        if !self.current_state.is_live() {
            return false;
        }
        self.record_transition(SessionState::Connecting, Some(reason));
        self.live_since = None;
        true
    }

    /// Connecting -> Failed -> Idle.
    ///
    /// Returns false if the session already left `Connecting`.
    pub fn fail(&mut self, reason: String) -> bool {
        if self.current_state != SessionState::Connecting {
            return false;
        }
        self.record_transition(SessionState::Failed(reason.clone()), Some(reason.clone()));
        self.record_transition(SessionState::Idle, Some(reason.clone()));
        self.last_failure = Some(reason);
        self.live_since = None;
        true
    }

    /// Any non-idle state -> Stopping. Returns the state that was left.
    pub fn begin_stopping(&mut self) -> Option<SessionState> {
        match self.current_state {
            SessionState::Idle | SessionState::Stopping => None,
            _ => {
                let previous = self.current_state.clone();
                self.record_transition(SessionState::Stopping, Some("Stopped by user".to_string()));
                self.live_since = None;
                Some(previous)
            }
        }
    }

    /// Stopping -> Idle
    pub fn finish_stopping(&mut self) -> bool {
        if self.current_state != SessionState::Stopping {
            return false;
        }
        self.record_transition(SessionState::Idle, None);
        true
    }

    fn record_transition(&mut self, new_state: SessionState, reason: Option<String>) {
        let transition = StateTransition {
            from: self.current_state.clone(),
            to: new_state.clone(),
            timestamp: Instant::now(),
            reason,
        };

        if self.state_history.len() == MAX_HISTORY {
            self.state_history.pop_front();
        }
        self.state_history.push_back(transition);
        self.transitions += 1;
        self.current_state = new_state;
    }
}

impl Default for BroadcastLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
