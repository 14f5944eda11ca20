//! Per-session state of the browser UI.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::client::FileSearchService;
use crate::types::FileSearchStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Formatted citation block; empty for user messages and errors.
    pub citations: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            citations: String::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, citations: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            citations: citations.into(),
        }
    }
}

/// A file picked in the browser but not uploaded yet.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingFileInfo {
    pub name: String,
    pub size: usize,
}

/// What the page needs to render a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub has_client: bool,
    pub api_key_set: bool,
    pub store: Option<String>,
    pub indexed_names: Vec<String>,
    pub pending_files: Vec<PendingFileInfo>,
    pub messages: Vec<ChatMessage>,
    pub file_uploader_key: u64,
}

/// Everything one browser session owns. Sessions never share an instance.
pub struct SessionState {
    pub api_key: String,
    pub client: Option<Arc<dyn FileSearchService>>,
    pub store: Option<FileSearchStore>,
    pub indexed_names: Vec<String>,
    pub messages: Vec<ChatMessage>,
    /// Insertion-ordered; names are unique.
    pub pending_files: Vec<PendingFile>,
    /// Bumped whenever the file picker must come back empty.
    pub file_uploader_key: u64,
    last_active: Instant,
}

impl SessionState {
    pub fn new(api_key: impl Into<String>, client: Option<Arc<dyn FileSearchService>>) -> Self {
        Self {
            api_key: api_key.into(),
            client,
            store: None,
            indexed_names: Vec::new(),
            messages: Vec::new(),
            pending_files: Vec::new(),
            file_uploader_key: 0,
            last_active: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    pub fn set_client(&mut self, api_key: impl Into<String>, client: Arc<dyn FileSearchService>) {
        self.api_key = api_key.into();
        self.client = Some(client);
    }

    pub fn clear_client(&mut self) {
        self.api_key.clear();
        self.client = None;
    }

    /// Stages a picked file unless the name is already pending or indexed.
    pub fn add_pending(&mut self, name: &str, bytes: Vec<u8>) -> bool {
        let duplicate = self.pending_files.iter().any(|f| f.name == name)
            || self.indexed_names.iter().any(|n| n == name);
        if duplicate {
            return false;
        }
        self.pending_files.push(PendingFile {
            name: name.to_string(),
            bytes,
        });
        true
    }

    pub fn remove_pending(&mut self, name: &str) -> bool {
        let before = self.pending_files.len();
        self.pending_files.retain(|f| f.name != name);
        self.pending_files.len() != before
    }

    pub fn bump_uploader_key(&mut self) {
        self.file_uploader_key += 1;
    }

    /// Applies a successful upload batch.
    pub fn finish_upload_batch(&mut self, store: FileSearchStore, indexed_names: Vec<String>) {
        self.store = Some(store);
        self.indexed_names = indexed_names;
        self.pending_files.clear();
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Clears everything except the credentials.
    pub fn reset(&mut self) {
        self.store = None;
        self.indexed_names.clear();
        self.messages.clear();
        self.pending_files.clear();
        self.bump_uploader_key();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            has_client: self.client.is_some(),
            api_key_set: !self.api_key.is_empty(),
            store: self.store.as_ref().and_then(|s| s.name.clone()),
            indexed_names: self.indexed_names.clone(),
            pending_files: self
                .pending_files
                .iter()
                .map(|f| PendingFileInfo {
                    name: f.name.clone(),
                    size: f.bytes.len(),
                })
                .collect(),
            messages: self.messages.clone(),
            file_uploader_key: self.file_uploader_key,
        }
    }
}
