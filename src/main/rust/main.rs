use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use broadcast_session::{
    serve_metrics, BroadcastSessionManager, Config, DesktopAudioRouting, GStreamerMicrophone,
    GStreamerRtmpClient, GStreamerTestSource, PrometheusReporter, SessionPorts,
    StaticPermissionProvider, VideoSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    let filter = if config.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Initialize GStreamer (infrastructure concern)
    gstreamer::init()?;

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    info!("Starting broadcast session v{}", env!("CARGO_PKG_VERSION"));
    info!("  RTMP endpoint: {}", config.rtmp_url);
    info!("  Video mode: {}", config.video_mode);
    info!("  Audio: {}", if config.mute { "muted" } else { "enabled" });
    info!("  Metrics port: {}", config.metrics_port);

    // Convert CLI config to domain configs
    let broadcast_config = config
        .to_broadcast_config()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let mixer_config = broadcast_config.mixer().clone();

    // Create infrastructure implementations (dependency injection)
    let ports = SessionPorts {
        permissions: Arc::new(StaticPermissionProvider::new(
            config.mic_permission.initial_status(),
        )),
        routing: Arc::new(DesktopAudioRouting::new()),
        audio_input: Arc::new(GStreamerMicrophone::new()),
        streaming_client: Arc::new(GStreamerRtmpClient::new(
            mixer_config.clone(),
            config.connect_timeout(),
            config.publish_timeout(),
        )),
        metrics: Arc::new(PrometheusReporter::new()),
    };

    // Create application service
    let session = BroadcastSessionManager::new(broadcast_config, ports)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    // Start metrics server
    let metrics_port = config.metrics_port;
    let metrics_session = session.clone();
    tokio::spawn(async move {
        serve_metrics(metrics_port, metrics_session).await;
    });

    // Log every status change
    let mut status_rx = session.subscribe();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            info!(
                state = %status.state,
                mic = %status.mic_status,
                audio = status.audio_enabled,
                "{}",
                status.connection_status
            );
        }
    });

    // Feed the test pattern camera into the session
    let source = GStreamerTestSource::new(mixer_config);
    let feed = session.clone();
    let video = tokio::task::spawn_blocking(move || {
        source.start(Box::new(move |frame| {
            feed.submit_video_frame(frame);
        }))
    })
    .await?
    .map_err(|e| anyhow::anyhow!("Failed to start video source: {}", e))?;

    if let Err(e) = session.start(&config.stream_key).await {
        error!("Failed to go live: {}", e);
        close_video(video).await;
        return Err(anyhow::anyhow!("{}", e));
    }

    info!("-------------------------------------------------------");
    info!("Broadcast Live");
    info!("   Endpoint: {}", config.rtmp_url);
    info!("   Metrics:  http://0.0.0.0:{}/metrics", config.metrics_port);
    info!("   Status:   http://0.0.0.0:{}/status", config.metrics_port);
    info!("   Ctrl+C stops, SIGUSR1 toggles the microphone");
    info!("-------------------------------------------------------");

    run_until_shutdown(&session).await;

    session.stop().await;
    close_video(video).await;

    info!("Broadcast shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or for the session to end on its own, toggling audio on SIGUSR1
async fn run_until_shutdown(session: &BroadcastSessionManager) {
    let mut status_rx = session.subscribe();
    let ended = async move {
        while status_rx.changed().await.is_ok() {
            if status_rx.borrow_and_update().state.is_idle() {
                return;
            }
        }
    };
    tokio::pin!(ended);

    #[cfg(unix)]
    let mut toggle = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1()) {
        Ok(signal) => Some(signal),
        Err(e) => {
            warn!("SIGUSR1 handler unavailable: {}", e);
            None
        }
    };

    loop {
        #[cfg(unix)]
        let toggled = async {
            match toggle.as_mut() {
                Some(signal) => signal.recv().await,
                None => std::future::pending().await,
            }
        };
        #[cfg(not(unix))]
        let toggled = std::future::pending::<Option<()>>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for ctrl+c: {}", e);
                }
                info!("Received shutdown signal");
                return;
            }
            _ = &mut ended => {
                warn!("Broadcast ended: {}", session.status().connection_status);
                return;
            }
            Some(()) = toggled => {
                let enabled = session.toggle_audio().await;
                info!("Microphone {}", if enabled { "enabled" } else { "muted" });
            }
        }
    }
}

async fn close_video(video: Box<dyn broadcast_session::CaptureStream>) {
    match tokio::task::spawn_blocking(move || video.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Error stopping video source (ignored): {}", e),
        Err(e) => warn!("Video source shutdown task failed: {}", e),
    }
}
