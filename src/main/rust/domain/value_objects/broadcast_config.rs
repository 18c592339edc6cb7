use super::{AudioRoutingOptions, EndpointConfig, MixerConfig, ReconnectPolicy};

/// Everything the session manager needs besides its collaborators
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    endpoint: EndpointConfig,
    mixer: MixerConfig,
    routing: AudioRoutingOptions,
    reconnect: ReconnectPolicy,
    audio_enabled: bool,
}

impl BroadcastConfig {
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            mixer: MixerConfig::default(),
            routing: AudioRoutingOptions::default(),
            reconnect: ReconnectPolicy::disabled(),
            audio_enabled: true,
        }
    }

    pub fn with_mixer(mut self, mixer: MixerConfig) -> Self {
        self.mixer = mixer;
        self
    }

    pub fn with_routing(mut self, routing: AudioRoutingOptions) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_audio_enabled(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn mixer(&self) -> &MixerConfig {
        &self.mixer
    }

    pub fn routing(&self) -> &AudioRoutingOptions {
        &self.routing
    }

    pub fn reconnect(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }
}
