//! HTTP server for the account message store
//!
//! Exposes a [`SqliteStore`] over HTTP so several client processes can share
//! one store. Mirrors the store contract exactly: snapshot reads and
//! whole-list replace, plus an admin append helper.
//!
//! # Routes
//!
//! - `GET /health` - Liveness check
//! - `POST /accounts/{account}` - Provision an empty account
//! - `GET /accounts/{account}/snapshot` - Full snapshot with derived unread count
//! - `PUT /accounts/{account}/messages` - Replace the whole message list
//! - `POST /accounts/{account}/messages` - Admin append (inserts at head)
//! - `GET /metrics` - Prometheus text exposition
//!
//! # Example
//!
//! ```no_run
//! use inbox_sync::inbox::StoreServer;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = StoreServer::new(PathBuf::from("inbox.db"))
//!         .expect("Failed to create server");
//!
//!     server.run("127.0.0.1:8086").await.expect("Server failed");
//! }
//! ```

use super::store::{append_message, MessageStore, StoreError};
use super::{AccountId, Message, MessageKind, SqliteStore};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind error: {0}")]
    Bind(String),
}

/// Shared server state
struct AppState {
    store: SqliteStore,
}

/// HTTP server for the message store
pub struct StoreServer {
    state: Arc<AppState>,
}

impl StoreServer {
    /// Create a server backed by the SQLite database at `db_path`
    pub fn new(db_path: PathBuf) -> Result<Self, ServerError> {
        let store = SqliteStore::open(db_path)?;
        Ok(Self::with_store(store))
    }

    /// Create a server around an existing store
    pub fn with_store(store: SqliteStore) -> Self {
        Self {
            state: Arc::new(AppState { store }),
        }
    }

    fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route("/accounts/{account}", post(provision))
            .route("/accounts/{account}/snapshot", get(get_snapshot))
            .route(
                "/accounts/{account}/messages",
                post(append).put(replace_messages),
            )
            .with_state(state)
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!(addr = addr, "Store server listening");
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        axum::serve(listener, Self::router(self.state))
            .await
            .map_err(ServerError::Io)
    }

    /// Get a reference to the store (for testing)
    pub fn store(&self) -> &SqliteStore {
        &self.state.store
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

/// Snapshot as served over the wire
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub messages: Vec<Message>,
    pub unread_count: usize,
}

/// Whole-list replace body
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplaceRequest {
    pub messages: Vec<Message>,
}

/// Admin append body
#[derive(Debug, Serialize, Deserialize)]
pub struct AppendRequest {
    #[serde(default)]
    pub kind: MessageKind,
    pub text: String,
    #[serde(default)]
    pub sender: Option<String>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn store_error(e: StoreError) -> ApiError {
    let status = match &e {
        StoreError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Rejected(_) => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics() -> impl IntoResponse {
    crate::metrics::render()
}

async fn provision(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account = AccountId::new(account);
    state.store.provision(&account).await.map_err(store_error)?;
    tracing::info!(account = %account, "Provisioned account");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true })),
    ))
}

async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account = AccountId::new(account);
    let snapshot = state
        .store
        .get_snapshot(&account)
        .await
        .map_err(store_error)?;

    Ok(Json(SnapshotResponse {
        unread_count: snapshot.unread_count(),
        messages: snapshot.messages,
    }))
}

async fn replace_messages(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    Json(req): Json<ReplaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = AccountId::new(account);
    let count = req.messages.len();
    state
        .store
        .replace_messages(&account, req.messages)
        .await
        .map_err(store_error)?;

    tracing::debug!(account = %account, messages = count, "Replaced message list");
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn append(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    Json(req): Json<AppendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = AccountId::new(account);
    let mut message = Message::new(req.kind, req.text);
    if let Some(sender) = req.sender {
        message = message.with_sender(sender);
    }
    let id = message.id.clone();

    append_message(&state.store, &account, message)
        .await
        .map_err(store_error)?;

    tracing::info!(account = %account, message_id = %id, "Appended message");
    Ok(Json(serde_json::json!({ "success": true, "id": id })))
}
