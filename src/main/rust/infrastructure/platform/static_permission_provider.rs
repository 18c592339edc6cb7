use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::ports::PermissionProvider;
use crate::domain::value_objects::PermissionStatus;

/// Permission decided by configuration rather than an interactive prompt.
///
/// While undetermined, the first request resolves to the configured answer
/// and that answer sticks, as a platform prompt would.
pub struct StaticPermissionProvider {
    status: Mutex<PermissionStatus>,
    prompt_answer: PermissionStatus,
}

impl StaticPermissionProvider {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: Mutex::new(status),
            prompt_answer: PermissionStatus::Granted,
        }
    }

    pub fn with_prompt_answer(mut self, answer: PermissionStatus) -> Self {
        self.prompt_answer = answer;
        self
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissionProvider {
    fn query_audio_permission(&self) -> PermissionStatus {
        *self.status.lock()
    }

    async fn request_audio_permission(&self) -> PermissionStatus {
        let mut status = self.status.lock();
        if *status == PermissionStatus::Undetermined {
            tracing::info!(answer = ?self.prompt_answer, "Microphone permission prompt answered");
            *status = self.prompt_answer;
        }
        *status
    }
}
