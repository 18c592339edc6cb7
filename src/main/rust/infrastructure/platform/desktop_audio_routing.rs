use async_trait::async_trait;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::AudioRouting;
use crate::domain::value_objects::AudioRoutingOptions;

/// Elements the capture and publish pipelines cannot run without
const REQUIRED_ELEMENTS: [&str; 4] = ["autoaudiosrc", "audiomixer", "voaacenc", "flvmux"];

/// Desktop audio has no session category to switch; configuring for
/// play-and-record means checking the audio elements are installed.
pub struct DesktopAudioRouting;

impl DesktopAudioRouting {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DesktopAudioRouting {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioRouting for DesktopAudioRouting {
    async fn configure_for_play_and_record(&self, options: &AudioRoutingOptions) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_ELEMENTS
            .iter()
            .copied()
            .filter(|name| gstreamer::ElementFactory::find(name).is_none())
            .collect();

        if !missing.is_empty() {
            return Err(DomainError::AudioRoutingFailed(format!(
                "missing GStreamer elements: {}",
                missing.join(", ")
            )));
        }

        tracing::debug!(
            allow_bluetooth = options.allow_bluetooth,
            default_to_speaker = options.default_to_speaker,
            mix_with_others = options.mix_with_others,
            "Audio routing configured for play and record"
        );
        Ok(())
    }
}
