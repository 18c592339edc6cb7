use async_trait::async_trait;

use crate::domain::errors::Result;
use crate::domain::value_objects::AudioRoutingOptions;

/// Port for platform audio session configuration
#[async_trait]
pub trait AudioRouting: Send + Sync {
    /// Configure simultaneous playback and recording
    async fn configure_for_play_and_record(&self, options: &AudioRoutingOptions) -> Result<()>;
}
