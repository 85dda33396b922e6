//! HTTP surface
//!
//! | Route                    | Method | Handler                         |
//! |--------------------------|--------|---------------------------------|
//! | `/kick-webhook`          | POST   | signed webhook deliveries       |
//! | `/kick_webhook`          | POST   | same, legacy path               |
//! | `/health`, `/ready`      | GET    | probes                          |
//! | `/status`, `/metrics`    | GET    | server status                   |
//! | `/messages`              | GET    | stored chat messages            |
//! | `/messages/clear`        | POST   | empty message stores            |
//! | `/events`                | GET    | operator log                    |
//! | `/scraper`               | GET    | scraper state                   |
//! | `/scraper/start`, `stop` | POST   | scraper control                 |

pub mod messages;
pub mod scraper;
pub mod status;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::cors::cors_layer;
use crate::webhook::webhook_router;

pub use status::AppState;

/// Full application router
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(status::health_handler))
        .route("/ready", get(status::readiness_handler))
        .route("/status", get(status::status_handler))
        .route("/metrics", get(status::metrics_handler))
        .route("/messages", get(messages::messages_handler))
        .route("/messages/clear", post(messages::clear_messages_handler))
        .route("/events", get(messages::events_handler))
        .route("/scraper", get(scraper::scraper_status_handler))
        .route("/scraper/start", post(scraper::start_scraper_handler))
        .route("/scraper/stop", post(scraper::stop_scraper_handler))
        .with_state(Arc::clone(&state));

    api.merge(webhook_router(Arc::clone(state.webhook())))
        .layer(cors_layer())
}
