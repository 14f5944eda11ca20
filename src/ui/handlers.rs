use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        Html,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

use super::state::{ChatMessage, SessionSnapshot, SessionState};
use super::{bad_request, upstream_error, AppError, AppState};
use crate::citations::cite_documents;
use crate::client::FileSearchService;
use crate::config::is_supported;
use crate::documents::list_documents;
use crate::error::RagError;
use crate::query::{stream_response, StreamCollector};
use crate::types::FileSearchStore;
use crate::ui::state::PendingFile;
use crate::upload::upload_docs;

type ApiResult<T> = std::result::Result<Json<T>, AppError>;

fn require_client(
    session: &SessionState,
) -> std::result::Result<Arc<dyn FileSearchService>, AppError> {
    session.client.clone().ok_or_else(|| {
        bad_request(
            RagError::Configuration("enter a valid API key to get started".into()).to_string(),
        )
    })
}

pub(super) async fn index_page() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: String,
    version: String,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Sessions ============

#[derive(Serialize)]
pub(super) struct SessionCreated {
    id: Uuid,
    session: SessionSnapshot,
}

pub(super) async fn create_session(State(state): State<AppState>) -> Json<SessionCreated> {
    state.expire_idle_sessions().await;
    let id = Uuid::new_v4();
    let session = state.new_session();
    let snapshot = session.snapshot();
    state
        .sessions
        .write()
        .await
        .insert(id, Arc::new(Mutex::new(session)));
    debug!(%id, "session created");
    Json(SessionCreated {
        id,
        session: snapshot,
    })
}

pub(super) async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSnapshot> {
    let session = state.session(id).await?;
    let snapshot = session.lock().await.snapshot();
    Ok(Json(snapshot))
}

// ============ API key ============

#[derive(Deserialize)]
pub(super) struct ApiKeyRequest {
    api_key: String,
}

#[derive(Serialize)]
pub(super) struct ApiKeyResponse {
    message: String,
    session: SessionSnapshot,
}

/// Builds a client for the key and makes one cheap call to prove it works.
///
/// A rejected key also clears the session's previous credentials.
pub(super) async fn apply_key(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApiKeyRequest>,
) -> ApiResult<ApiKeyResponse> {
    let session = state.session(id).await?;
    let key = req.api_key.trim().to_string();
    if key.is_empty() {
        return Err(bad_request("Please enter an API key."));
    }

    let validated = match (state.client_factory)(&key) {
        Ok(client) => client.check_credentials().await.map(|_| client),
        Err(e) => Err(e),
    };

    let mut session = session.lock().await;
    match validated {
        Ok(client) => {
            session.set_client(key, client);
            Ok(Json(ApiKeyResponse {
                message: "API key validated!".to_string(),
                session: session.snapshot(),
            }))
        }
        Err(e) => {
            session.clear_client();
            Err(bad_request(format!("Invalid API key: {}", e)))
        }
    }
}

// ============ Pending files ============

pub(super) async fn add_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<SessionSnapshot> {
    let session = state.session(id).await?;

    let mut picked = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !is_supported(std::path::Path::new(&name)) {
            return Err(bad_request(format!("Unsupported file type: {}", name)));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.to_string()))?;
        picked.push((name, bytes.to_vec()));
    }

    let mut session = session.lock().await;
    require_client(&session)?;
    for (name, bytes) in picked {
        if !session.add_pending(&name, bytes) {
            debug!(file = %name, "already pending or indexed, skipped");
        }
    }
    session.bump_uploader_key();
    Ok(Json(session.snapshot()))
}

pub(super) async fn remove_file(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
) -> ApiResult<SessionSnapshot> {
    let session = state.session(id).await?;
    let mut session = session.lock().await;
    session.remove_pending(&name);
    Ok(Json(session.snapshot()))
}

// ============ Indexing ============

#[derive(Serialize)]
pub(super) struct IndexResponse {
    progress: Vec<String>,
    session: SessionSnapshot,
}

/// Saves pending files, indexes them into a fresh store, and lists the result.
///
/// The session is only updated once everything succeeded.
pub(super) async fn index_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<IndexResponse> {
    let session = state.session(id).await?;
    let (client, pending) = {
        let session = session.lock().await;
        let client = require_client(&session)?;
        if session.pending_files.is_empty() {
            return Err(bad_request("No files pending upload."));
        }
        (client, session.pending_files.clone())
    };

    let mut progress = vec!["Saving files to staging area...".to_string()];
    match run_indexing(&state, client.as_ref(), &pending, &mut progress).await {
        Ok((store, names)) => {
            let mut session = session.lock().await;
            session.finish_upload_batch(store, names);
            progress.push("Indexing complete!".to_string());
            Ok(Json(IndexResponse {
                progress,
                session: session.snapshot(),
            }))
        }
        Err(e) => {
            warn!("indexing failed: {}", e);
            Err(upstream_error(format!("Error during indexing: {}", e)))
        }
    }
}

async fn run_indexing(
    state: &AppState,
    client: &dyn FileSearchService,
    pending: &[PendingFile],
    progress: &mut Vec<String>,
) -> crate::error::Result<(FileSearchStore, Vec<String>)> {
    let saved = state
        .staging
        .save_files(pending.iter().map(|f| (f.name.as_str(), f.bytes.as_slice())))?;

    let on_progress: &mut (dyn FnMut(&str) + Send) =
        &mut |name: &str| progress.push(format!("Indexed: {}", name));
    let store = upload_docs(
        Some(client),
        &state.staging,
        Some(&saved),
        &state.settings,
        Some(on_progress),
    )
    .await?;

    let names = list_documents(&store, Some(client)).await?;
    Ok((store, names))
}

// ============ Chat ============

#[derive(Deserialize)]
pub(super) struct ChatRequest {
    prompt: String,
}

type SseItem = std::result::Result<Event, Infallible>;
type EventSender = mpsc::Sender<SseItem>;

/// SSE splits data on any line break but only `\n` survives the page's parser.
fn sse_data(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn sse_event(name: &str, text: &str) -> SseItem {
    Ok(Event::default().event(name).data(sse_data(text)))
}

/// Streams the answer as `text` events, then one `citations` or `error` event.
///
/// The transcript receives the user entry up front and the assistant entry
/// once the stream has ended.
pub(super) async fn chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Sse<KeepAliveStream<ReceiverStream<SseItem>>>, AppError> {
    let session = state.session(id).await?;
    let prompt = req.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(bad_request("prompt must not be empty"));
    }

    let (client, store) = {
        let mut session = session.lock().await;
        let client = require_client(&session)?;
        let store = session.store.clone().ok_or_else(|| {
            bad_request("Upload and index your documents using the sidebar to get started.")
        })?;
        session.push_message(ChatMessage::user(&prompt));
        (client, store)
    };

    let model = state.settings.model.clone();
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let message = match relay_answer(&prompt, &store, &model, client.as_ref(), &tx).await {
            Ok((answer, citations)) => {
                let _ = tx.send(sse_event("citations", &citations)).await;
                ChatMessage::assistant(answer, citations)
            }
            Err(e) => {
                let msg = format!("An error occurred while generating a response: {}", e);
                let _ = tx.send(sse_event("error", &msg)).await;
                ChatMessage::assistant(msg, "")
            }
        };
        session.lock().await.push_message(message);
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// Forwards text fragments in arrival order and returns (answer, citations).
async fn relay_answer(
    prompt: &str,
    store: &FileSearchStore,
    model: &str,
    client: &dyn FileSearchService,
    tx: &EventSender,
) -> crate::error::Result<(String, String)> {
    let stream = stream_response(prompt, store, model, Some(client)).await?;
    let mut collector = StreamCollector::new(stream);
    let mut answer = String::new();

    while let Some(text) = collector.next_text().await {
        let text = text?;
        answer.push_str(&text);
        if tx.send(sse_event("text", &text)).await.is_err() {
            debug!("client went away, stopping stream");
            break;
        }
    }

    let citations = cite_documents(collector.last().and_then(|r| r.first_candidate()));
    Ok((answer, citations))
}

// ============ Reset ============

/// Empties the staging directory and resets the session, keeping the API key.
pub(super) async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSnapshot> {
    let session = state.session(id).await?;
    match state.staging.cleanup() {
        Ok(removed) => debug!(removed, "staging cleaned on reset"),
        Err(e) => warn!("cleanup failed: {}", e),
    }
    let mut session = session.lock().await;
    session.reset();
    Ok(Json(session.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_data_normalises_line_breaks() {
        assert_eq!(sse_data("line one\rline two"), "line one\nline two");
        assert_eq!(sse_data("a\r\nb\nc"), "a\nb\nc");
        assert_eq!(sse_data("plain"), "plain");
    }
}
