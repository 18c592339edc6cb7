use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::domain::errors::Result;
use crate::domain::value_objects::{
    BroadcastConfig, EndpointConfig, MixerConfig, PermissionStatus, ReconnectPolicy, StreamKey,
    VideoFormat, VideoMode,
};

/// How the microphone permission prompt is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MicPermission {
    Granted,
    Denied,
    /// Undetermined until the session asks, then granted
    Prompt,
}

impl MicPermission {
    pub fn initial_status(&self) -> PermissionStatus {
        match self {
            Self::Granted => PermissionStatus::Granted,
            Self::Denied => PermissionStatus::Denied,
            Self::Prompt => PermissionStatus::Undetermined,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "broadcast-session",
    version = "0.1.0",
    about = "Live broadcast session: camera and microphone published over RTMP"
)]
pub struct Config {
    /// RTMP ingest URL (rtmp://host[:port]/app)
    #[arg(long, env = "RTMP_URL", default_value = "rtmp://localhost:1935/live")]
    pub rtmp_url: String,

    /// Stream key appended to the ingest URL
    #[arg(long, env = "STREAM_KEY", hide_env_values = true)]
    pub stream_key: String,

    /// Start with the microphone disabled
    #[arg(long)]
    pub mute: bool,

    /// Answer to the microphone permission prompt
    #[arg(long, value_enum, default_value = "prompt")]
    pub mic_permission: MicPermission,

    /// Number of audio tracks mixed into the stream
    #[arg(long, default_value = "1")]
    pub audio_tracks: u8,

    /// Video handling: passthrough (pre-encoded H.264) or mixed (raw, encoded here)
    #[arg(long, default_value = "passthrough")]
    pub video_mode: String,

    /// Mixer ingress queue capacity in frames
    #[arg(long, default_value = "256")]
    pub frame_queue: usize,

    /// Connect timeout in milliseconds
    #[arg(long, default_value = "5000")]
    pub connect_timeout_ms: u64,

    /// Publish timeout in milliseconds
    #[arg(long, default_value = "10000")]
    pub publish_timeout_ms: u64,

    /// Reconnection attempts after losing a live connection (0 disables)
    #[arg(long, default_value = "3")]
    pub reconnect_attempts: u32,

    /// Initial reconnection delay in seconds
    #[arg(long, default_value = "1")]
    pub reconnect_initial_delay: u64,

    /// Maximum reconnection delay in seconds
    #[arg(long, default_value = "30")]
    pub reconnect_max_delay: u64,

    /// Reconnection backoff multiplier
    #[arg(long, default_value = "2.0")]
    pub reconnect_multiplier: f64,

    /// Metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "9003")]
    pub metrics_port: u16,

    /// Test source width
    #[arg(long, default_value = "1280")]
    pub width: u32,

    /// Test source height
    #[arg(long, default_value = "720")]
    pub height: u32,

    /// Test source frame rate
    #[arg(long, default_value = "30")]
    pub fps: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.rtmp_url.starts_with("rtmp://") && !self.rtmp_url.starts_with("rtmps://") {
            anyhow::bail!("RTMP URL must start with rtmp:// or rtmps://");
        }

        StreamKey::new(self.stream_key.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid stream key: {}", e))?;

        Self::validate_port(self.metrics_port, "metrics")?;

        if self.frame_queue == 0 {
            anyhow::bail!("Frame queue cannot be 0");
        }

        if self.connect_timeout_ms == 0 || self.publish_timeout_ms == 0 {
            anyhow::bail!("Connect and publish timeouts cannot be 0");
        }

        if self.reconnect_multiplier <= 1.0 {
            anyhow::bail!("Reconnect multiplier must be > 1.0");
        }

        if self.reconnect_initial_delay == 0 {
            anyhow::bail!("Initial reconnection delay cannot be 0");
        }

        if self.reconnect_max_delay < self.reconnect_initial_delay {
            anyhow::bail!(
                "Maximum reconnection delay ({}) cannot be less than initial delay ({})",
                self.reconnect_max_delay,
                self.reconnect_initial_delay
            );
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn to_mixer_config(&self) -> Result<MixerConfig> {
        let video_mode: VideoMode = self.video_mode.parse()?;
        let format = VideoFormat::new(self.width, self.height, self.fps)?;
        Ok(MixerConfig::new(video_mode, self.audio_tracks)?
            .with_frame_queue(self.frame_queue)?
            .with_video_format(format))
    }

    pub fn to_reconnect_policy(&self) -> Result<ReconnectPolicy> {
        ReconnectPolicy::new(
            self.reconnect_attempts,
            Duration::from_secs(self.reconnect_initial_delay),
            Duration::from_secs(self.reconnect_max_delay),
            self.reconnect_multiplier,
        )
    }

    pub fn to_broadcast_config(&self) -> Result<BroadcastConfig> {
        let endpoint = EndpointConfig::new(self.rtmp_url.clone())?;
        Ok(BroadcastConfig::new(endpoint)
            .with_mixer(self.to_mixer_config()?)
            .with_reconnect(self.to_reconnect_policy()?)
            .with_audio_enabled(!self.mute))
    }
}
