//! Simple REST API server example for the point engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `GET /point/{id}` - Current balance of a user
//! - `GET /point/{id}/histories` - Charge/use history of a user
//! - `PATCH /point/{id}/charge` - Add points
//! - `PATCH /point/{id}/use` - Spend points
//!
//! ## Example Usage
//!
//! ```bash
//! # Charge
//! curl -X PATCH http://localhost:3000/point/1/charge \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": 1000}'
//!
//! # Use
//! curl -X PATCH http://localhost:3000/point/1/use \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": 250}'
//!
//! # Balance and history
//! curl http://localhost:3000/point/1
//! curl http://localhost:3000/point/1/histories
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use point_ledger_rs::{EngineConfig, PointEngine, PointError, Transaction, UserBalance, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

// === Request/Response DTOs ===

/// Request body for charge and use.
///
/// ```json
/// {"amount": 1000}
/// ```
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: i64,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the point engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PointEngine>,
}

// === Error Handling ===

/// Converts engine failures into HTTP responses.
pub enum AppError {
    Point(PointError),
    /// The blocking engine task did not complete.
    Internal(String),
}

impl From<PointError> for AppError {
    fn from(err: PointError) -> Self {
        AppError::Point(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error) = match &self {
            AppError::Point(err) => {
                let (status, code) = match err {
                    PointError::InvalidUserId => (StatusCode::BAD_REQUEST, "INVALID_USER_ID"),
                    PointError::InvalidAmount => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
                    PointError::InsufficientBalance => {
                        (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE")
                    }
                    PointError::BalanceCeilingExceeded { .. } => {
                        (StatusCode::BAD_REQUEST, "MAXIMUM_POINT")
                    }
                    PointError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
                    PointError::LockTimeout { .. } => {
                        (StatusCode::SERVICE_UNAVAILABLE, "LOCK_TIMEOUT")
                    }
                    PointError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE"),
                };
                (status, code, err.to_string())
            }
            AppError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message.clone())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// Runs an engine call off the async runtime, since it may block on a user lock.
async fn run_blocking<T, F>(state: AppState, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&PointEngine) -> Result<T, PointError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state.engine))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

// === Handlers ===

/// GET /point/{id} - Current balance.
async fn point(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserBalance>, AppError> {
    run_blocking(state, move |engine| engine.balance(UserId(id)))
        .await
        .map(Json)
}

/// GET /point/{id}/histories - Transactions in the order they were applied.
async fn histories(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    run_blocking(state, move |engine| engine.history(UserId(id)))
        .await
        .map(Json)
}

/// PATCH /point/{id}/charge - Add points.
async fn charge(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<UserBalance>, AppError> {
    run_blocking(state, move |engine| engine.charge(UserId(id), request.amount))
        .await
        .map(Json)
}

/// PATCH /point/{id}/use - Spend points.
async fn use_points(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<UserBalance>, AppError> {
    run_blocking(state, move |engine| engine.use_points(UserId(id), request.amount))
        .await
        .map(Json)
}

// === Router ===

/// Creates the application router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/point/{id}", get(point))
        .route("/point/{id}/histories", get(histories))
        .route("/point/{id}/charge", patch(charge))
        .route("/point/{id}/use", patch(use_points))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = EngineConfig::from_env();
    tracing::info!(
        max_balance = config.max_balance,
        lock_timeout = ?config.lock_timeout,
        "engine configuration loaded"
    );

    let state = AppState {
        engine: Arc::new(PointEngine::with_config(config)),
    };
    let app = create_router(state);

    let listener = TcpListener::bind("0.0.0.0:3000").await.unwrap();
    tracing::info!("point server listening on http://localhost:3000");

    axum::serve(listener, app).await.unwrap();
}
