use std::fmt;
use std::str::FromStr;

use crate::domain::errors::{DomainError, Result};

/// Upper bound on simultaneously mixed audio tracks
pub const MAX_AUDIO_TRACKS: u8 = 8;

const DEFAULT_FRAME_QUEUE: usize = 256;

/// How video frames are treated on their way to the publish sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMode {
    /// Encoded frames are forwarded unmodified
    Passthrough,
    /// Raw frames are composed and encoded by the protocol client
    Mixed,
}

impl VideoMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "passthrough" => Ok(Self::Passthrough),
            "mixed" => Ok(Self::Mixed),
            other => Err(DomainError::InvalidMixerConfig(format!(
                "unknown video mode '{}'",
                other
            ))),
        }
    }
}

impl Default for VideoMode {
    fn default() -> Self {
        Self::Passthrough
    }
}

/// Geometry and rate of the raw video the pipelines negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoFormat {
    pub fn new(width: u32, height: u32, fps: u32) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(DomainError::InvalidMixerConfig(format!(
                "video size must be even and non-zero, got {}x{}",
                width, height
            )));
        }
        if fps == 0 || fps > 120 {
            return Err(DomainError::InvalidMixerConfig(format!(
                "frame rate must be between 1 and 120, got {}",
                fps
            )));
        }
        Ok(Self { width, height, fps })
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerConfig {
    video_mode: VideoMode,
    audio_tracks: u8,
    frame_queue: usize,
    video_format: VideoFormat,
}

impl MixerConfig {
    pub fn new(video_mode: VideoMode, audio_tracks: u8) -> Result<Self> {
        if audio_tracks == 0 || audio_tracks > MAX_AUDIO_TRACKS {
            return Err(DomainError::InvalidMixerConfig(format!(
                "audio tracks must be between 1 and {}, got {}",
                MAX_AUDIO_TRACKS, audio_tracks
            )));
        }

        Ok(Self {
            video_mode,
            audio_tracks,
            frame_queue: DEFAULT_FRAME_QUEUE,
            video_format: VideoFormat::default(),
        })
    }

    /// Capacity of the ingress queue; submissions beyond it are dropped
    pub fn with_frame_queue(mut self, frame_queue: usize) -> Result<Self> {
        if frame_queue == 0 {
            return Err(DomainError::InvalidMixerConfig(
                "frame queue cannot be 0".to_string(),
            ));
        }
        self.frame_queue = frame_queue;
        Ok(self)
    }

    pub fn with_video_format(mut self, video_format: VideoFormat) -> Self {
        self.video_format = video_format;
        self
    }

    pub fn video_mode(&self) -> VideoMode {
        self.video_mode
    }

    pub fn audio_tracks(&self) -> u8 {
        self.audio_tracks
    }

    pub fn frame_queue(&self) -> usize {
        self.frame_queue
    }

    pub fn video_format(&self) -> VideoFormat {
        self.video_format
    }

    pub fn accepts_track(&self, track: u8) -> bool {
        track < self.audio_tracks
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            video_mode: VideoMode::Passthrough,
            audio_tracks: 1,
            frame_queue: DEFAULT_FRAME_QUEUE,
            video_format: VideoFormat::default(),
        }
    }
}
