use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use super::PublishHandle;
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{AudioSample, MediaFrame, MediaKind, MixerConfig, VideoFrame};

/// Log a warning every N dropped frames rather than per frame
pub const DROP_LOG_INTERVAL: u64 = 100;

enum MixerCommand {
    Frame(MediaFrame),
    Attach(PublishHandle),
    Detach(oneshot::Sender<()>),
    Flush(oneshot::Sender<()>),
}

/// Forwarded/dropped counters per media kind
#[derive(Debug, Default)]
pub struct MixerStats {
    audio_forwarded: AtomicU64,
    video_forwarded: AtomicU64,
    audio_dropped: AtomicU64,
    video_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MixerStatsSnapshot {
    pub audio_forwarded: u64,
    pub video_forwarded: u64,
    pub audio_dropped: u64,
    pub video_dropped: u64,
}

impl MixerStats {
    pub fn snapshot(&self) -> MixerStatsSnapshot {
        MixerStatsSnapshot {
            audio_forwarded: self.audio_forwarded.load(Ordering::Relaxed),
            video_forwarded: self.video_forwarded.load(Ordering::Relaxed),
            audio_dropped: self.audio_dropped.load(Ordering::Relaxed),
            video_dropped: self.video_dropped.load(Ordering::Relaxed),
        }
    }

    fn forwarded(&self, kind: MediaKind) {
        match kind {
            MediaKind::Audio => self.audio_forwarded.fetch_add(1, Ordering::Relaxed),
            MediaKind::Video => self.video_forwarded.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Returns the running drop count for the kind
    fn dropped(&self, kind: MediaKind) -> u64 {
        let prev = match kind {
            MediaKind::Audio => self.audio_dropped.fetch_add(1, Ordering::Relaxed),
            MediaKind::Video => self.video_dropped.fetch_add(1, Ordering::Relaxed),
        };
        prev + 1
    }
}

struct MixerShared {
    stats: MixerStats,
    sink_attached: AtomicBool,
    metrics: Arc<dyn MetricsReporter>,
}

impl MixerShared {
    fn record_forwarded(&self, kind: MediaKind, bytes: usize) {
        self.stats.forwarded(kind);
        self.metrics.report_frame_forwarded(kind, bytes);
    }

    fn record_drop(&self, kind: MediaKind, reason: &str) {
        let count = self.stats.dropped(kind);
        self.metrics.report_frame_dropped(kind);
        if count % DROP_LOG_INTERVAL == 0 {
            tracing::warn!(%kind, reason, "Dropped {} {} frames", count, kind);
        } else {
            tracing::trace!(%kind, reason, "Dropped frame");
        }
    }
}

/// Cheap, clonable submission handle usable from any thread.
///
/// Submissions never block: with no sink attached, or with the queue full,
/// the frame is dropped (drop-newest).
#[derive(Clone)]
pub struct MixerInput {
    tx: mpsc::Sender<MixerCommand>,
    config: MixerConfig,
    shared: Arc<MixerShared>,
}

impl MixerInput {
    pub fn submit_audio(&self, sample: AudioSample) -> bool {
        if !self.config.accepts_track(sample.track) {
            tracing::debug!(track = sample.track, "Audio sample for unknown track");
            self.shared.record_drop(MediaKind::Audio, "unknown track");
            return false;
        }
        self.submit(MediaFrame::Audio(sample))
    }

    pub fn submit_video(&self, frame: VideoFrame) -> bool {
        self.submit(MediaFrame::Video(frame))
    }

    fn submit(&self, frame: MediaFrame) -> bool {
        let kind = frame.kind();
        if !self.shared.sink_attached.load(Ordering::Acquire) {
            self.shared.record_drop(kind, "no sink");
            return false;
        }

        match self.tx.try_send(MixerCommand::Frame(frame)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.shared.record_drop(kind, "queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.shared.record_drop(kind, "mixer closed");
                false
            }
        }
    }
}

/// Single multiplexing point between frame producers and the publish sink
pub struct MediaMixer {
    input: OnceLock<MixerInput>,
    shared: Arc<MixerShared>,
}

impl MediaMixer {
    pub fn new(metrics: Arc<dyn MetricsReporter>) -> Self {
        Self {
            input: OnceLock::new(),
            shared: Arc::new(MixerShared {
                stats: MixerStats::default(),
                sink_attached: AtomicBool::new(false),
                metrics,
            }),
        }
    }

    /// Fix the video mode and audio track layout and start the forwarding task.
    ///
    /// Must be called once, inside a Tokio runtime, before frames are accepted.
    pub fn configure(&self, config: MixerConfig) -> Result<()> {
        if self.input.get().is_some() {
            return Err(DomainError::MixerAlreadyConfigured);
        }

        let (tx, rx) = mpsc::channel(config.frame_queue());
        let input = MixerInput {
            tx,
            config: config.clone(),
            shared: self.shared.clone(),
        };
        self.input
            .set(input)
            .map_err(|_| DomainError::MixerAlreadyConfigured)?;

        tokio::spawn(Self::forward_loop(rx, self.shared.clone()));

        tracing::info!(
            video_mode = %config.video_mode(),
            audio_tracks = config.audio_tracks(),
            frame_queue = config.frame_queue(),
            "Mixer configured"
        );
        Ok(())
    }

    pub fn config(&self) -> Option<&MixerConfig> {
        self.input.get().map(|input| &input.config)
    }

    /// Submission handle for producers, available once configured
    pub fn input(&self) -> Option<MixerInput> {
        self.input.get().cloned()
    }

    pub fn is_sink_attached(&self) -> bool {
        self.shared.sink_attached.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> MixerStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn submit_audio(&self, sample: AudioSample) -> bool {
        match self.input.get() {
            Some(input) => input.submit_audio(sample),
            None => {
                self.shared.record_drop(MediaKind::Audio, "not configured");
                false
            }
        }
    }

    pub fn submit_video(&self, frame: VideoFrame) -> bool {
        match self.input.get() {
            Some(input) => input.submit_video(frame),
            None => {
                self.shared.record_drop(MediaKind::Video, "not configured");
                false
            }
        }
    }

    /// Route subsequent submissions to `handle`
    pub async fn attach_sink(&self, handle: PublishHandle) -> Result<()> {
        let input = self.input.get().ok_or(DomainError::MixerNotConfigured)?;
        let id = handle.id();
        input
            .tx
            .send(MixerCommand::Attach(handle))
            .await
            .map_err(|_| DomainError::SinkClosed)?;
        self.shared.sink_attached.store(true, Ordering::Release);
        tracing::debug!(publish_id = %id, "Sink attached");
        Ok(())
    }

    /// Stop routing to the current sink.
    ///
    /// Frames queued before the call are delivered to the old sink before this
    /// returns; frames submitted afterwards are dropped.
    pub async fn detach_sink(&self) {
        let Some(input) = self.input.get() else {
            return;
        };
        self.shared.sink_attached.store(false, Ordering::Release);

        let (ack_tx, ack_rx) = oneshot::channel();
        if input.tx.send(MixerCommand::Detach(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        tracing::debug!("Sink detached");
    }

    /// Wait until every frame queued so far has been handed to the sink
    pub async fn flush(&self) {
        let Some(input) = self.input.get() else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if input.tx.send(MixerCommand::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    async fn forward_loop(mut rx: mpsc::Receiver<MixerCommand>, shared: Arc<MixerShared>) {
        let mut sink: Option<PublishHandle> = None;

        while let Some(command) = rx.recv().await {
            match command {
                MixerCommand::Frame(frame) => {
                    let kind = frame.kind();
                    let bytes = frame.len();
                    let Some(handle) = sink.as_ref() else {
                        shared.record_drop(kind, "no sink");
                        continue;
                    };
                    match handle.forward(frame) {
                        Ok(true) => shared.record_forwarded(kind, bytes),
                        Ok(false) => shared.record_drop(kind, "not publishing"),
                        Err(e) => {
                            tracing::warn!(%kind, "Sink write failed: {}", e);
                            shared.record_drop(kind, "sink error");
                        }
                    }
                }
                MixerCommand::Attach(handle) => sink = Some(handle),
                MixerCommand::Detach(ack) => {
                    sink = None;
                    let _ = ack.send(());
                }
                MixerCommand::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }

        tracing::debug!("Mixer forwarding task finished");
    }
}
