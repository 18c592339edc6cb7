/// Options passed to the platform when configuring play-and-record routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioRoutingOptions {
    pub allow_bluetooth: bool,
    pub default_to_speaker: bool,
    pub mix_with_others: bool,
}

impl Default for AudioRoutingOptions {
    fn default() -> Self {
        Self {
            allow_bluetooth: true,
            default_to_speaker: true,
            mix_with_others: true,
        }
    }
}
