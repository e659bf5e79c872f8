// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Integration tests for the REST API server with concurrent requests.
//!
//! These tests verify that the server correctly handles many concurrent
//! requests on the same and on different users while keeping balances and
//! histories consistent.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use point_ledger_rs::{
    EngineConfig, PointEngine, PointError, Transaction, TransactionKind, UserBalance, UserId,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

// === DTOs (duplicated from the server demo for test isolation) ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Server Setup ===

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PointEngine>,
}

pub enum AppError {
    Point(PointError),
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

async fn point(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserBalance>, AppError> {
    run_blocking(state, move |engine| engine.balance(UserId(id)))
        .await
        .map(Json)
}

async fn histories(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    run_blocking(state, move |engine| engine.history(UserId(id)))
        .await
        .map(Json)
}

async fn charge(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<UserBalance>, AppError> {
    run_blocking(state, move |engine| engine.charge(UserId(id), request.amount))
        .await
        .map(Json)
}

async fn use_points(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<UserBalance>, AppError> {
    run_blocking(state, move |engine| engine.use_points(UserId(id), request.amount))
        .await
        .map(Json)
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/point/{id}", get(point))
        .route("/point/{id}/histories", get(histories))
        .route("/point/{id}/charge", patch(charge))
        .route("/point/{id}/use", patch(use_points))
        .with_state(state)
}

/// Test server that binds to an ephemeral port.
struct TestServer {
    base_url: String,
    engine: Arc<PointEngine>,
}

impl TestServer {
    async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    async fn with_config(config: EngineConfig) -> Self {
        let engine = Arc::new(PointEngine::with_config(config));
        let state = AppState {
            engine: engine.clone(),
        };

        let app = create_router(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to be ready by polling with retries
        let client = Client::new();
        let health_url = format!("{}/point/1", base_url);
        for _ in 0..50 {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }

        TestServer { base_url, engine }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// === Tests ===
// These tests are ignored in CI due to connection issues on some platforms.
// Run manually with: cargo test --test server_test -- --ignored

/// Charge, use and read back through the HTTP surface.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn charge_use_and_history_round_trip() {
    let server = TestServer::new().await;
    let client = Client::new();

    let charged: UserBalance = client
        .patch(server.url("/point/1/charge"))
        .json(&AmountRequest { amount: 1_000 })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(charged.point, 1_000);

    let used: UserBalance = client
        .patch(server.url("/point/1/use"))
        .json(&AmountRequest { amount: 400 })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(used.point, 600);

    let balance: UserBalance = client
        .get(server.url("/point/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(balance.point, 600);

    let history: Vec<Transaction> = client
        .get(server.url("/point/1/histories"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, TransactionKind::Charge);
    assert_eq!(history[1].kind, TransactionKind::Use);
    assert_eq!(history[1].amount, 400);
}

/// Engine errors map to their client-facing status codes.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn errors_map_to_status_codes() {
    let server = TestServer::with_config(
        EngineConfig::default()
            .with_max_balance(1_000)
            .with_lock_timeout(Duration::from_millis(50)),
    )
    .await;
    let client = Client::new();

    let cases = [
        ("/point/1/charge", 0, StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
        ("/point/0/charge", 10, StatusCode::BAD_REQUEST, "INVALID_USER_ID"),
        ("/point/1/use", 10, StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE"),
        ("/point/1/charge", 1_001, StatusCode::BAD_REQUEST, "MAXIMUM_POINT"),
    ];
    for (path, amount, status, code) in cases {
        let response = client
            .patch(server.url(path))
            .json(&AmountRequest { amount })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), status.as_u16(), "{path}");
        let body: ErrorResponse = response.json().await.unwrap();
        assert_eq!(body.code, code);
    }

    // Hold user 2's lock so the request times out.
    let lock = server.engine.locks().get_lock(UserId(2));
    let guard = lock.acquire(Duration::from_millis(10)).unwrap();
    let response = client
        .patch(server.url("/point/2/charge"))
        .json(&AmountRequest { amount: 10 })
        .send()
        .await
        .unwrap();
    guard.release();
    assert_eq!(
        response.status().as_u16(),
        StatusCode::SERVICE_UNAVAILABLE.as_u16()
    );

    assert!(server.engine.history(UserId(1)).unwrap().is_empty());
    assert!(server.engine.history(UserId(2)).unwrap().is_empty());
}

/// Concurrent charges to a single user lose no updates.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_charges_single_user() {
    let server = TestServer::new().await;
    let client = Client::new();

    const NUM_CHARGES: usize = 500;
    const AMOUNT_PER_CHARGE: i64 = 3;

    let start = Instant::now();
    let mut handles = Vec::with_capacity(NUM_CHARGES);

    for _ in 0..NUM_CHARGES {
        let client = client.clone();
        let url = server.url("/point/1/charge");

        let handle = tokio::spawn(async move {
            let response = client
                .patch(&url)
                .json(&AmountRequest {
                    amount: AMOUNT_PER_CHARGE,
                })
                .send()
                .await
                .unwrap();
            response.status()
        });

        handles.push(handle);
    }

    let results: Vec<_> = futures::future::join_all(handles).await;
    let elapsed = start.elapsed();

    let successful = results
        .iter()
        .filter(|r| r.as_ref().unwrap().is_success())
        .count();

    println!(
        "Single user: {} charges in {:?} ({:.0} req/s)",
        NUM_CHARGES,
        elapsed,
        NUM_CHARGES as f64 / elapsed.as_secs_f64()
    );

    assert_eq!(successful, NUM_CHARGES, "All charges should succeed");
    assert_eq!(
        server.engine.balance(UserId(1)).unwrap().point,
        NUM_CHARGES as i64 * AMOUNT_PER_CHARGE
    );
    assert_eq!(server.engine.history(UserId(1)).unwrap().len(), NUM_CHARGES);
}

/// Concurrent charges and uses spread over many users.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_mixed_operations_multiple_users() {
    let server = TestServer::new().await;
    let client = Client::new();

    const NUM_USERS: i64 = 20;
    const OPS_PER_USER: usize = 30;
    const BATCH_SIZE: usize = 100; // Limit concurrent connections

    let mut all_requests: Vec<(i64, &'static str)> = Vec::new();
    for user in 1..=NUM_USERS {
        for i in 0..OPS_PER_USER {
            all_requests.push((user, if i % 3 == 2 { "use" } else { "charge" }));
        }
    }

    for batch in all_requests.chunks(BATCH_SIZE) {
        let mut handles = Vec::with_capacity(batch.len());
        for &(user, op) in batch {
            let client = client.clone();
            let url = server.url(&format!("/point/{user}/{op}"));
            handles.push(tokio::spawn(async move {
                client
                    .patch(&url)
                    .json(&AmountRequest { amount: 10 })
                    .send()
                    .await
                    .unwrap()
                    .status()
            }));
        }
        futures::future::join_all(handles).await;
    }

    for user in 1..=NUM_USERS {
        let balance = server.engine.balance(UserId(user)).unwrap();
        let delta: i64 = server
            .engine
            .history(UserId(user))
            .unwrap()
            .iter()
            .map(|tx| tx.delta())
            .sum();
        assert!(balance.point >= 0);
        assert_eq!(balance.point, delta, "user {user} ledger disagrees with balance");
    }
}
