use crate::domain::errors::{CaptureError, Result};
use crate::domain::value_objects::{AudioSample, VideoFrame};

/// Called from the capture thread for every captured sample
pub type SampleCallback = Box<dyn FnMut(AudioSample) + Send>;

/// Called from the source thread for every produced frame
pub type FrameCallback = Box<dyn FnMut(VideoFrame) + Send>;

/// Port for the microphone hardware.
///
/// Both calls block on hardware and must not run on the control plane.
pub trait AudioInput: Send + Sync {
    /// Open the input device, attach it to a capture pipeline and start
    /// delivering samples on a background thread
    fn open(&self, on_sample: SampleCallback) -> std::result::Result<Box<dyn CaptureStream>, CaptureError>;
}

/// Port for an external producer of video frames
pub trait VideoSource: Send + Sync {
    fn start(&self, on_frame: FrameCallback) -> std::result::Result<Box<dyn CaptureStream>, CaptureError>;
}

/// A running capture pipeline
pub trait CaptureStream: Send {
    /// Halt delivery and release the device (blocking)
    fn close(self: Box<Self>) -> Result<()>;
}
