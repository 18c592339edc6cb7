use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use tokio::net::TcpStream;
use tokio::sync::watch;

use super::PipelineBuilder;
use crate::domain::errors::{ConnectError, DomainError, PublishError, Result};
use crate::domain::ports::{MediaSink, StreamConnection, StreamingClient};
use crate::domain::value_objects::{EndpointConfig, MediaFrame, MixerConfig, StreamKey};

/// Timeout for bus polling (100ms allows responsive shutdown)
const BUS_POLL_TIMEOUT_MS: u64 = 100;

/// RTMP publisher built on `flvmux ! rtmp2sink`.
///
/// `rtmp2sink` performs the RTMP handshake itself once the pipeline starts, so
/// `connect` only proves the endpoint accepts TCP connections and `publish`
/// waits for the pipeline to reach PLAYING or report an error.
pub struct GStreamerRtmpClient {
    mixer: MixerConfig,
    connect_timeout: Duration,
    publish_timeout: Duration,
}

impl GStreamerRtmpClient {
    pub fn new(mixer: MixerConfig, connect_timeout: Duration, publish_timeout: Duration) -> Self {
        Self {
            mixer,
            connect_timeout,
            publish_timeout,
        }
    }
}

#[async_trait]
impl StreamingClient for GStreamerRtmpClient {
    async fn connect(
        &self,
        endpoint: &EndpointConfig,
    ) -> std::result::Result<Box<dyn StreamConnection>, ConnectError> {
        let address = endpoint.address();
        tracing::debug!(%address, "Probing streaming endpoint");

        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Err(_) => Err(ConnectError::Timeout),
            Ok(Err(e)) => Err(ConnectError::NetworkUnreachable(format!("{}: {}", address, e))),
            Ok(Ok(_probe)) => Ok(Box::new(RtmpConnection::new(
                endpoint.clone(),
                self.mixer.clone(),
                self.publish_timeout,
            ))),
        }
    }
}

struct RunningPipeline {
    pipeline: gstreamer::Pipeline,
    sources: Vec<AppSrc>,
    closed: Arc<AtomicBool>,
    watcher: Option<JoinHandle<()>>,
}

struct RtmpConnection {
    endpoint: EndpointConfig,
    mixer: MixerConfig,
    publish_timeout: Duration,
    loss_tx: Arc<watch::Sender<Option<String>>>,
    loss_rx: watch::Receiver<Option<String>>,
    running: Option<RunningPipeline>,
}

impl RtmpConnection {
    fn new(endpoint: EndpointConfig, mixer: MixerConfig, publish_timeout: Duration) -> Self {
        let (loss_tx, loss_rx) = watch::channel(None);
        Self {
            endpoint,
            mixer,
            publish_timeout,
            loss_tx: Arc::new(loss_tx),
            loss_rx,
            running: None,
        }
    }

    fn launch(
        pipeline_str: &str,
        audio_tracks: u8,
        timeout: Duration,
    ) -> std::result::Result<(gstreamer::Pipeline, RtmpSink), PublishError> {
        let pipeline = gstreamer::parse::launch(pipeline_str)
            .map_err(|e| PublishError::ServerRejected(format!("pipeline: {}", e)))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| PublishError::ServerRejected("not a pipeline".to_string()))?;

        let video = Self::app_src(&pipeline, PipelineBuilder::VIDEO_SRC)?;
        let audio = (0..audio_tracks)
            .map(|track| Self::app_src(&pipeline, &PipelineBuilder::audio_src_name(track)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(PublishError::ServerRejected(e.to_string()));
        }
        if let Err(e) = Self::await_playing(&pipeline, timeout) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(e);
        }

        Ok((pipeline, RtmpSink { video, audio }))
    }

    fn app_src(
        pipeline: &gstreamer::Pipeline,
        name: &str,
    ) -> std::result::Result<AppSrc, PublishError> {
        pipeline
            .by_name(name)
            .and_then(|element| element.downcast::<AppSrc>().ok())
            .ok_or_else(|| PublishError::ServerRejected(format!("missing app source '{}'", name)))
    }

    fn await_playing(
        pipeline: &gstreamer::Pipeline,
        timeout: Duration,
    ) -> std::result::Result<(), PublishError> {
        let bus = pipeline
            .bus()
            .ok_or_else(|| PublishError::ServerRejected("pipeline has no bus".to_string()))?;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PublishError::Timeout);
            }
            let wait = gstreamer::ClockTime::from_mseconds(remaining.as_millis() as u64);
            let Some(msg) = bus.timed_pop(wait) else {
                return Err(PublishError::Timeout);
            };

            match msg.view() {
                gstreamer::MessageView::Error(err) => {
                    return Err(PublishError::ServerRejected(format!(
                        "{} ({:?})",
                        err.error(),
                        err.debug()
                    )));
                }
                gstreamer::MessageView::StateChanged(state_changed) => {
                    let from_pipeline = state_changed
                        .src()
                        .map(|s| s == pipeline)
                        .unwrap_or(false);
                    if from_pipeline && state_changed.current() == gstreamer::State::Playing {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    /// Report asynchronous pipeline failures as connection loss
    fn watch_bus(
        bus: gstreamer::Bus,
        closed: Arc<AtomicBool>,
        loss: Arc<watch::Sender<Option<String>>>,
    ) {
        let timeout = gstreamer::ClockTime::from_mseconds(BUS_POLL_TIMEOUT_MS);

        while !closed.load(Ordering::SeqCst) {
            let Some(msg) = bus.timed_pop(timeout) else {
                continue;
            };
            match msg.view() {
                gstreamer::MessageView::Error(err) => {
                    let reason = format!(
                        "Error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    );
                    tracing::warn!(debug = ?err.debug(), "{}", reason);
                    loss.send_replace(Some(reason));
                    return;
                }
                gstreamer::MessageView::Eos(_) => {
                    if !closed.load(Ordering::SeqCst) {
                        loss.send_replace(Some("End of stream".to_string()));
                    }
                    return;
                }
                gstreamer::MessageView::Warning(warn) => {
                    tracing::warn!(
                        "Warning from {:?}: {} ({:?})",
                        warn.src().map(|s| s.path_string()),
                        warn.error(),
                        warn.debug()
                    );
                }
                _ => {}
            }
        }
    }

    fn shutdown(running: RunningPipeline) -> Result<()> {
        let RunningPipeline {
            pipeline,
            sources,
            closed,
            watcher,
        } = running;

        closed.store(true, Ordering::SeqCst);
        for source in &sources {
            let _ = source.end_of_stream();
        }
        let result = pipeline
            .set_state(gstreamer::State::Null)
            .map(|_| ())
            .map_err(|e| DomainError::Teardown(e.to_string()));

        if let Some(watcher) = watcher {
            if watcher.join().is_err() {
                tracing::warn!("RTMP bus watcher panicked");
            }
        }
        result
    }
}

#[async_trait]
impl StreamConnection for RtmpConnection {
    async fn publish(
        &mut self,
        stream_key: &StreamKey,
    ) -> std::result::Result<Arc<dyn MediaSink>, PublishError> {
        if self.running.is_some() {
            return Err(PublishError::NotConnected);
        }

        let location = self.endpoint.publish_location(&stream_key.masked());
        tracing::info!(%location, video_mode = %self.mixer.video_mode(), "Creating publish pipeline");

        let pipeline_str =
            PipelineBuilder::build_publish_string(&self.endpoint, stream_key.expose(), &self.mixer);
        let audio_tracks = self.mixer.audio_tracks();
        let timeout = self.publish_timeout;

        let (pipeline, sink) = tokio::task::spawn_blocking(move || {
            Self::launch(&pipeline_str, audio_tracks, timeout)
        })
        .await
        .map_err(|e| PublishError::ServerRejected(format!("publish task: {}", e)))??;

        let closed = Arc::new(AtomicBool::new(false));
        let mut watcher = None;
        if let Some(bus) = pipeline.bus() {
            let closed = closed.clone();
            let loss = self.loss_tx.clone();
            match std::thread::Builder::new()
                .name("rtmp-bus".to_string())
                .spawn(move || Self::watch_bus(bus, closed, loss))
            {
                Ok(handle) => watcher = Some(handle),
                Err(e) => tracing::warn!("Failed to start RTMP bus watcher: {}", e),
            }
        }

        let mut sources = vec![sink.video.clone()];
        sources.extend(sink.audio.iter().cloned());
        self.running = Some(RunningPipeline {
            pipeline,
            sources,
            closed,
            watcher,
        });

        Ok(Arc::new(sink))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || Self::shutdown(running))
            .await
            .map_err(|e| DomainError::Teardown(e.to_string()))?
    }

    fn loss_signal(&self) -> watch::Receiver<Option<String>> {
        self.loss_rx.clone()
    }
}

/// Pushes frames into the publish pipeline's app sources
struct RtmpSink {
    video: AppSrc,
    audio: Vec<AppSrc>,
}

impl MediaSink for RtmpSink {
    fn write(&self, frame: MediaFrame) -> Result<()> {
        let (source, buffer) = match frame {
            MediaFrame::Video(frame) => {
                let mut buffer = gstreamer::Buffer::from_slice(frame.payload);
                if !frame.keyframe {
                    buffer
                        .make_mut()
                        .set_flags(gstreamer::BufferFlags::DELTA_UNIT);
                }
                (&self.video, buffer)
            }
            MediaFrame::Audio(sample) => {
                let source = self
                    .audio
                    .get(sample.track as usize)
                    .ok_or_else(|| DomainError::InvalidMixerConfig(format!(
                        "no audio source for track {}",
                        sample.track
                    )))?;
                (source, gstreamer::Buffer::from_slice(sample.payload))
            }
        };

        source
            .push_buffer(buffer)
            .map(|_| ())
            .map_err(|_| DomainError::SinkClosed)
    }
}
