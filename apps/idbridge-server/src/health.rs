//! Liveness endpoint.

use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Instant;

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Record the process start for `uptime_seconds`.
pub fn mark_started() {
    STARTED.get_or_init(Instant::now);
}

/// GET /health
pub async fn health_handler() -> Json<Value> {
    let uptime = STARTED.get().map_or(0, |t| t.elapsed().as_secs());
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
