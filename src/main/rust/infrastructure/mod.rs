pub mod gstreamer;
pub mod metrics;
pub mod platform;
