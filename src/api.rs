//! REST API Server for the spend guardian
//!
//! Exposes the two core operations over HTTP: declare-or-update-goal and
//! ingest-event. Both return the structured cycle report.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::agent::Orchestrator;
use crate::error::GuardianError;
use crate::models::{GoalPeriod, InboundEvent, NewGoal};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GoalRequest {
    pub user_id: Option<String>,
    pub title: Option<String>,
    /// Minor currency units (paise, cents).
    pub target_minor: i64,
    pub budget_minor: i64,
    pub currency: Option<String>,
    /// Defaults to the current calendar month when absent.
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Helpers — String → Uuid
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

fn status_for(error: &GuardianError) -> StatusCode {
    match error {
        GuardianError::InvalidPeriod(_)
        | GuardianError::InvalidAmount(_)
        | GuardianError::UnknownUser(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Declare-or-update-goal Endpoint
/// =============================

async fn declare_goal(
    State(state): State<ApiState>,
    Json(req): Json<GoalRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let user_id = parse_or_stable_uuid(req.user_id.as_deref(), "anonymous-user");
    let now = Utc::now();

    let period = match (req.period_start, req.period_end) {
        (Some(start), Some(end)) => GoalPeriod::new(start, end),
        _ => GoalPeriod::calendar_month(now),
    };

    info!(user_id = ?user_id, "Received goal declaration");

    let goal = NewGoal {
        title: req.title,
        target_minor: req.target_minor,
        budget_minor: req.budget_minor,
        currency: req.currency.unwrap_or_else(|| "INR".to_string()),
        period,
    };

    match state.orchestrator.declare_goal(user_id, goal, now).await {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))),
        Err(e) => (
            status_for(&e),
            Json(ApiResponse::error(format!("Goal declaration failed: {}", e))),
        ),
    }
}

/// =============================
/// Ingest-event Endpoint
/// =============================

async fn ingest_event(
    State(state): State<ApiState>,
    Json(event): Json<InboundEvent>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(
        user_id = ?event.user_id(),
        idempotency_key = %event.idempotency_key(),
        "Received inbound event"
    );

    match state.orchestrator.run_cycle(event).await {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))),
        Err(e) => (
            status_for(&e),
            Json(ApiResponse::error(format!("Event cycle failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/api/goal", post(declare_goal))
        .route("/api/event", post(ingest_event))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = stable_uuid_from_string("whatsapp:+911234567890");
        let b = stable_uuid_from_string("whatsapp:+911234567890");
        assert_eq!(a, b);
        assert_ne!(a, stable_uuid_from_string("whatsapp:+910000000000"));
    }

    #[test]
    fn test_parse_or_stable_uuid_accepts_real_uuid() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_or_stable_uuid(Some(&id.to_string()), "seed"), id);
    }

    #[test]
    fn test_blank_value_falls_back_to_seed() {
        let from_blank = parse_or_stable_uuid(Some("  "), "seed");
        let from_none = parse_or_stable_uuid(None, "seed");
        assert_eq!(from_blank, from_none);
    }
}
