//! HTTP surface next to the device listener: service status, health, a
//! test-injection route that runs a frame through the decoder without a
//! device connection, and the Prometheus scrape endpoint.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::tracker::{self, Packet, TypedPayload, commands};

pub const SERVICE_NAME: &str = "tracker-gateway";

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub tcp_port: u16,
    pub http_port: u16,
    pub started_at: Instant,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(tcp_port: u16, http_port: u16, metrics_handle: Option<PrometheusHandle>) -> Self {
        Self {
            tcp_port,
            http_port,
            started_at: Instant::now(),
            metrics_handle,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedCommand {
    pub code: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub service: &'static str,
    pub status: &'static str,
    pub tcp_port: u16,
    pub http_port: u16,
    pub supported_commands: Vec<SupportedCommand>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since the service started
    pub uptime: f64,
}

#[derive(Debug, Deserialize)]
pub struct TestPacketRequest {
    pub packet: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TestPacketResponse {
    Parsed {
        success: bool,
        packet: Packet,
        payload: TypedPayload,
    },
    Rejected {
        success: bool,
        error: String,
        frame: String,
    },
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: SERVICE_NAME,
        status: "running",
        tcp_port: state.tcp_port,
        http_port: state.http_port,
        supported_commands: commands::supported_commands()
            .iter()
            .map(|c| SupportedCommand {
                code: c.code,
                name: c.display_name,
            })
            .collect(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

/// Decode a frame posted by hand; no acknowledgment is sent anywhere
async fn test_packet(Json(request): Json<TestPacketRequest>) -> impl IntoResponse {
    match tracker::decode_frame(&request.packet) {
        Ok((packet, payload)) => {
            debug!("Test packet decoded as {}", packet.command_name);
            (
                StatusCode::OK,
                Json(TestPacketResponse::Parsed {
                    success: true,
                    packet,
                    payload,
                }),
            )
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(TestPacketResponse::Rejected {
                success: false,
                error: e.to_string(),
                frame: request.packet,
            }),
        ),
    }
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}

// Middleware for request logging
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start_time = Instant::now();

    let response = next.run(request).await;

    debug!(
        "{} {} {} in {:.2}ms",
        method,
        path,
        response.status().as_u16(),
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/test", post(test_packet))
        .route("/metrics", get(render_metrics))
        .with_state(state)
        .layer(middleware::from_fn(request_logging_middleware))
}

pub async fn start_web_server(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")?;

    Ok(())
}
