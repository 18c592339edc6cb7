use std::fmt;

use bytes::Bytes;

/// Media kind, used for per-kind accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A block of captured audio for one track. Timestamps are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSample {
    pub track: u8,
    pub timestamp: u32,
    pub payload: Bytes,
}

impl AudioSample {
    pub fn new(track: u8, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            track,
            timestamp,
            payload: payload.into(),
        }
    }
}

/// An externally produced video frame. Timestamps are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub timestamp: u32,
    pub keyframe: bool,
    pub payload: Bytes,
}

impl VideoFrame {
    pub fn new(timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            keyframe: false,
            payload: payload.into(),
        }
    }

    pub fn with_keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaFrame {
    Audio(AudioSample),
    Video(VideoFrame),
}

impl MediaFrame {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Audio(_) => MediaKind::Audio,
            Self::Video(_) => MediaKind::Video,
        }
    }

    pub fn timestamp(&self) -> u32 {
        match self {
            Self::Audio(sample) => sample.timestamp,
            Self::Video(frame) => frame.timestamp,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Audio(sample) => sample.payload.len(),
            Self::Video(frame) => frame.payload.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<AudioSample> for MediaFrame {
    fn from(sample: AudioSample) -> Self {
        Self::Audio(sample)
    }
}

impl From<VideoFrame> for MediaFrame {
    fn from(frame: VideoFrame) -> Self {
        Self::Video(frame)
    }
}
