//! Browser UI: one embedded page plus a small JSON/SSE API.
//!
//! Every browser tab creates its own session and keeps the returned id. All
//! state lives in that session's [`SessionState`]; the staging directory is
//! the only thing sessions share.
//!
//! # Endpoints
//!
//! | Method   | Path                                  | Description |
//! |----------|---------------------------------------|-------------|
//! | `GET`    | `/`                                   | The page |
//! | `GET`    | `/health`                             | Health check |
//! | `POST`   | `/api/sessions`                       | Create a session |
//! | `GET`    | `/api/sessions/{id}`                  | Session snapshot |
//! | `POST`   | `/api/sessions/{id}/key`              | Validate and apply an API key |
//! | `POST`   | `/api/sessions/{id}/files`            | Add picked files (multipart) |
//! | `DELETE` | `/api/sessions/{id}/files/{name}`     | Drop a pending file |
//! | `POST`   | `/api/sessions/{id}/index`            | Upload and index pending files |
//! | `POST`   | `/api/sessions/{id}/chat`             | Ask a question (SSE answer) |
//! | `POST`   | `/api/sessions/{id}/reset`            | Clean up and reset the session |

mod handlers;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{FileSearchService, GeminiClient};
use crate::config::Settings;
use crate::error::Result;
use crate::staging::Staging;

pub use state::{ChatMessage, Role, SessionSnapshot, SessionState};

/// Builds a service handle from an API key.
pub type ClientFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn FileSearchService>> + Send + Sync>;

pub type SharedSession = Arc<Mutex<SessionState>>;

const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    staging: Staging,
    sessions: Arc<RwLock<HashMap<Uuid, SharedSession>>>,
    client_factory: ClientFactory,
    /// Key used to pre-populate new sessions; empty when unset.
    default_api_key: String,
}

impl AppState {
    pub fn new(
        settings: Settings,
        client_factory: ClientFactory,
        default_api_key: Option<String>,
    ) -> Self {
        Self {
            staging: Staging::new(&settings.docs_dir),
            settings: Arc::new(settings),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            client_factory,
            default_api_key: default_api_key.unwrap_or_default(),
        }
    }

    /// State backed by the real Gemini API, keyed from `GEMINI_API_KEY`.
    pub fn gemini(settings: Settings) -> Self {
        let base_url = settings.base_url.clone();
        let factory: ClientFactory = Arc::new(move |key: &str| {
            let client = GeminiClient::new(key)?.with_base_url(&base_url);
            Ok(Arc::new(client) as Arc<dyn FileSearchService>)
        });
        Self::new(settings, factory, std::env::var("GEMINI_API_KEY").ok())
    }

    fn new_session(&self) -> SessionState {
        let key = self.default_api_key.trim();
        let client = if key.is_empty() {
            None
        } else {
            (self.client_factory)(key).ok()
        };
        SessionState::new(key, client)
    }

    async fn session(&self, id: Uuid) -> std::result::Result<SharedSession, AppError> {
        let session = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(format!("no session with id {}", id)))?;
        session.lock().await.touch();
        Ok(session)
    }

    /// Drops sessions idle for longer than `session_idle_timeout`.
    ///
    /// A session whose lock is held is busy and always kept.
    async fn expire_idle_sessions(&self) {
        let timeout = self.settings.session_idle_timeout;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(state) => state.idle_for() < timeout,
            Err(_) => true,
        });
        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired, "idle sessions dropped");
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index_page))
        .route("/health", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route("/api/sessions/{id}", get(handlers::get_session))
        .route("/api/sessions/{id}/key", post(handlers::apply_key))
        .route("/api/sessions/{id}/files", post(handlers::add_files))
        .route("/api/sessions/{id}/files/{name}", delete(handlers::remove_file))
        .route("/api/sessions/{id}/index", post(handlers::index_documents))
        .route("/api/sessions/{id}/chat", post(handlers::chat))
        .route("/api/sessions/{id}/reset", post(handlers::reset_session))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves the UI on `settings.bind` until the process is stopped.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let bind = settings.bind.clone();
    let app = router(AppState::gemini(settings));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("UI listening on http://{}", bind);
    println!("Open http://{} in your browser.", bind);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub(crate) struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// A remote call failed; the message is shown to the user unchanged.
fn upstream_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream".to_string(),
        message: message.into(),
    }
}
