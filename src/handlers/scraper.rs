//! Scraper control endpoints
//!
//! `start` returns as soon as the run is accepted; setup progress (browser
//! launch, challenge pages, failures) shows up in the operator log.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::status::AppState;
use crate::session::{is_valid_channel, SessionState};

/// Body of `POST /scraper/start`
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    /// Channel to scrape
    pub channel: String,
}

/// Scraper state as reported by the control endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperResponse {
    /// `success` or `error`
    pub status: String,
    /// Lifecycle state after the request
    pub state: SessionState,
    /// Channel of the current or last run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Explanation for errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScraperResponse {
    fn from_state(state: &AppState) -> Self {
        Self {
            status: "success".to_string(),
            state: state.scraper().state(),
            channel: state.scraper().channel(),
            message: None,
        }
    }

    fn error(state: &AppState, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            ..Self::from_state(state)
        }
    }
}

/// `GET /scraper`
pub async fn scraper_status_handler(State(state): State<Arc<AppState>>) -> Json<ScraperResponse> {
    Json(ScraperResponse::from_state(&state))
}

/// `POST /scraper/start`
///
/// 400 for a malformed channel, 409 while a run is active, otherwise 202
/// with setup continuing in the background.
#[instrument(skip_all, fields(channel = %request.channel))]
pub async fn start_scraper_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Response {
    let channel = request.channel.trim().to_string();
    if !is_valid_channel(&channel) {
        let body = ScraperResponse::error(&state, format!("Invalid channel id: {channel:?}"));
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }
    if state.scraper().is_running() {
        let body = ScraperResponse::error(&state, "Scraper is already running");
        return (StatusCode::CONFLICT, Json(body)).into_response();
    }

    info!("Scraper start requested");
    let scraper = state.scraper().clone();
    let run_channel = channel.clone();
    tokio::spawn(async move {
        if let Err(e) = scraper.start(&run_channel).await {
            warn!(error = %e, "Scraper did not start");
        }
    });

    let body = ScraperResponse {
        status: "success".to_string(),
        state: state.scraper().state(),
        channel: Some(channel),
        message: Some("Scraper starting".to_string()),
    };
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

/// `POST /scraper/stop`
#[instrument(skip_all)]
pub async fn stop_scraper_handler(State(state): State<Arc<AppState>>) -> Json<ScraperResponse> {
    info!("Scraper stop requested");
    state.scraper().stop().await;
    Json(ScraperResponse::from_state(&state))
}
