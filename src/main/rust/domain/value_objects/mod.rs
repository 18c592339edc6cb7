mod audio_routing_options;
mod broadcast_config;
mod endpoint_config;
mod media_frame;
mod mic_status;
mod mixer_config;
mod publish_state;
mod reconnect_policy;
mod session_state;
mod stream_key;

pub use audio_routing_options::AudioRoutingOptions;
pub use broadcast_config::BroadcastConfig;
pub use endpoint_config::EndpointConfig;
pub use media_frame::{AudioSample, MediaFrame, MediaKind, VideoFrame};
pub use mic_status::{MicStatus, PermissionStatus};
pub use mixer_config::{MixerConfig, VideoFormat, VideoMode, MAX_AUDIO_TRACKS};
pub use publish_state::PublishState;
pub use reconnect_policy::ReconnectPolicy;
pub use session_state::SessionState;
pub use stream_key::StreamKey;
