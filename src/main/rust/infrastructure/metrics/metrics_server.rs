use serde::Serialize;
use warp::Filter;

use super::PrometheusReporter;
use crate::application::services::{BroadcastSessionManager, BroadcastStatus, MixerStatsSnapshot};

/// Health check response structure
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: BroadcastStatus,
    publish_state: String,
    frames: MixerStatsSnapshot,
}

fn status_response(session: &BroadcastSessionManager) -> StatusResponse {
    StatusResponse {
        status: session.status(),
        publish_state: session.publish_state().to_string(),
        frames: session.mixer_stats(),
    }
}

pub async fn serve_metrics(port: u16, session: BroadcastSessionManager) {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_route = warp::path("metrics").map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_route = warp::path("health").map(|| {
        let response = HealthResponse {
            status: "healthy",
            service: "broadcast-session",
            version: env!("CARGO_PKG_VERSION"),
        };
        warp::reply::json(&response)
    });

    // Liveness probe endpoint (minimal check - is the process running?)
    let liveness_route =
        warp::path("livez").map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));

    // Readiness probe endpoint (is the broadcast on air?)
    let ready_session = session.clone();
    let readiness_route = warp::path("readyz").map(move || {
        let (status, code) = if ready_session.is_live() {
            ("ready", warp::http::StatusCode::OK)
        } else {
            ("not live", warp::http::StatusCode::SERVICE_UNAVAILABLE)
        };
        let response = HealthResponse {
            status,
            service: "broadcast-session",
            version: env!("CARGO_PKG_VERSION"),
        };
        warp::reply::with_status(warp::reply::json(&response), code)
    });

    let status_route =
        warp::path("status").map(move || warp::reply::json(&status_response(&session)));

    let routes = metrics_route
        .or(health_route)
        .or(liveness_route)
        .or(readiness_route)
        .or(status_route)
        .with(cors);

    tracing::info!("Metrics server starting on port {}", port);

    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
}
