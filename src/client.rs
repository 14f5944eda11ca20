use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::DEFAULT_BASE_URL;
use crate::error::{RagError, Result};
use crate::stream::{decode_sse, ResponseStream};
use crate::types::{
    DocumentPage, FileSearchStore, GenerateContentRequest, GenerateContentResponse, ModelList,
    Operation,
};

/// Resource name sent when a store came back from the service without one.
pub const MISSING_STORE_NAME: &str = "no_name_found";

const API_VERSION: &str = "v1beta";
const DOCUMENT_PAGE_SIZE: u32 = 20;

/// The remote operations the pipeline needs from a hosted RAG service.
#[async_trait]
pub trait FileSearchService: Send + Sync {
    /// Creates a new, empty store. Never looks up existing stores.
    async fn create_store(&self, display_name: &str) -> Result<FileSearchStore>;

    /// Starts indexing one local file into `store`.
    async fn upload_to_store(
        &self,
        store: &FileSearchStore,
        path: &Path,
        display_name: &str,
    ) -> Result<Operation>;

    /// Refreshes an operation handle.
    async fn get_operation(&self, operation: &Operation) -> Result<Operation>;

    async fn list_documents_page(
        &self,
        store: &FileSearchStore,
        page_token: Option<&str>,
    ) -> Result<DocumentPage>;

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ResponseStream>;

    /// Cheap authenticated call used to confirm the credentials work.
    async fn check_credentials(&self) -> Result<()>;
}

/// Handle to the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Creates a client for the given API key. Performs no network I/O.
    pub fn new(api_key: &str) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(RagError::Configuration("API key must not be empty".into()));
        }
        Ok(Self {
            http: Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Creates a client from `GEMINI_API_KEY` (and `GEMINI_BASE_URL`, if set).
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| RagError::Configuration("GEMINI_API_KEY is not set".into()))?;
        let client = Self::new(&key)?;
        Ok(match std::env::var("GEMINI_BASE_URL") {
            Ok(url) => client.with_base_url(&url),
            Err(_) => client,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, path)
    }
}

/// Lazily built process-wide client, `None` when no key is configured.
static DEFAULT_CLIENT: OnceLock<Option<GeminiClient>> = OnceLock::new();

pub fn default_client() -> Option<&'static GeminiClient> {
    DEFAULT_CLIENT
        .get_or_init(|| GeminiClient::from_env().ok())
        .as_ref()
}

/// Returns `client` if given, otherwise the process-wide default.
pub fn resolve_client<'a>(
    client: Option<&'a dyn FileSearchService>,
) -> Result<&'a dyn FileSearchService> {
    select_client(
        client,
        default_client().map(|c| c as &dyn FileSearchService),
    )
}

/// Picks the explicit client over the fallback; fails when neither exists.
pub fn select_client<'a>(
    client: Option<&'a dyn FileSearchService>,
    fallback: Option<&'a dyn FileSearchService>,
) -> Result<&'a dyn FileSearchService> {
    client.or(fallback).ok_or_else(|| {
        RagError::Configuration(
            "no Gemini client available: set GEMINI_API_KEY or enter an API key".into(),
        )
    })
}

pub(crate) fn store_resource(store: &FileSearchStore) -> &str {
    store
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(MISSING_STORE_NAME)
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "xml" => "text/xml",
        _ => "application/octet-stream",
    }
}

/// Maps a non-success response to [`RagError::Api`], preferring the API's own message.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RagError::Api {
        status: status.as_u16(),
        message: api_error_message(&body),
    })
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl FileSearchService for GeminiClient {
    #[instrument(skip(self))]
    async fn create_store(&self, display_name: &str) -> Result<FileSearchStore> {
        let resp = self
            .http
            .post(self.url("fileSearchStores"))
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({ "displayName": display_name }))
            .send()
            .await?;
        let store: FileSearchStore = check_status(resp).await?.json().await?;
        debug!(store = ?store.name, "created file search store");
        Ok(store)
    }

    #[instrument(skip(self, store), fields(store = store_resource(store)))]
    async fn upload_to_store(
        &self,
        store: &FileSearchStore,
        path: &Path,
        display_name: &str,
    ) -> Result<Operation> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RagError::io(path, e))?;
        let mime = mime_type(path);

        // Resumable protocol: the start request carries metadata, the
        // returned session URL receives the bytes.
        let start = self
            .http
            .post(format!(
                "{}/upload/{}/{}:uploadToFileSearchStore",
                self.base_url,
                API_VERSION,
                store_resource(store)
            ))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime)
            .json(&json!({ "displayName": display_name, "mimeType": mime }))
            .send()
            .await?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| RagError::Api {
                status: start.status().as_u16(),
                message: "upload session URL missing from response".into(),
            })?;

        let resp = self
            .http
            .post(upload_url)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(bytes)
            .send()
            .await?;
        let operation: Operation = check_status(resp).await?.json().await?;
        debug!(operation = %operation.name, "upload accepted");
        Ok(operation)
    }

    async fn get_operation(&self, operation: &Operation) -> Result<Operation> {
        let resp = self
            .http
            .get(self.url(&operation.name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    async fn list_documents_page(
        &self,
        store: &FileSearchStore,
        page_token: Option<&str>,
    ) -> Result<DocumentPage> {
        let mut query = vec![("pageSize", DOCUMENT_PAGE_SIZE.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let resp = self
            .http
            .get(self.url(&format!("{}/documents", store_resource(store))))
            .header("x-goog-api-key", &self.api_key)
            .query(&query)
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    #[instrument(skip(self, request))]
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let resp = self
            .http
            .post(self.url(&format!("models/{}:generateContent", model)))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    #[instrument(skip(self, request))]
    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ResponseStream> {
        let resp = self
            .http
            .post(self.url(&format!("models/{}:streamGenerateContent", model)))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;
        Ok(decode_sse(check_status(resp).await?.bytes_stream()))
    }

    async fn check_credentials(&self) -> Result<()> {
        let resp = self
            .http
            .get(self.url("models"))
            .header("x-goog-api-key", &self.api_key)
            .query(&[("pageSize", "1")])
            .send()
            .await?;
        let models: ModelList = check_status(resp).await?.json().await?;
        debug!(count = models.models.len(), "credentials accepted");
        Ok(())
    }
}
