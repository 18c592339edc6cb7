use async_trait::async_trait;

use crate::domain::value_objects::PermissionStatus;

/// Port for the platform microphone permission prompt
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Current permission without prompting
    fn query_audio_permission(&self) -> PermissionStatus;

    /// Prompt the user; only meaningful while undetermined
    async fn request_audio_permission(&self) -> PermissionStatus;
}
