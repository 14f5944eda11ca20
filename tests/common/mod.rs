#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use gemini_rag::stream::ResponseStream;
use gemini_rag::types::{
    Candidate, Content, Document, DocumentPage, FileSearchStore, GenerateContentRequest,
    GenerateContentResponse, GroundingChunk, GroundingMetadata, Operation, Part,
    RetrievedContext,
};
use gemini_rag::{FileSearchService, RagError, Result, Settings};

/// In-memory stand-in for the Gemini File Search API.
pub struct FakeService {
    /// Polls an upload needs before it reports done.
    pub polls_until_done: u32,
    /// Fragments returned by generation; the last one carries grounding.
    pub fragments: Vec<GenerateContentResponse>,
    /// Display name whose upload is rejected.
    pub reject_upload: Option<String>,
    pub valid_credentials: bool,
    /// Makes both generation calls fail with a server error.
    pub fail_generation: bool,
    state: Mutex<FakeState>,
}

#[derive(Default)]
pub struct FakeState {
    pub stores_created: u32,
    pub documents: HashMap<String, Vec<Document>>,
    pub uploads: Vec<String>,
    pub polls: u32,
    pending: HashMap<String, (String, String, u32)>,
    pub requests: Vec<GenerateContentRequest>,
}

impl FakeService {
    pub fn new(fragments: Vec<GenerateContentResponse>) -> Self {
        Self {
            polls_until_done: 2,
            fragments,
            reject_upload: None,
            valid_credentials: true,
            fail_generation: false,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_documents(store: &str, names: &[Option<&str>]) -> Self {
        let fake = Self::new(Vec::new());
        fake.state.lock().unwrap().documents.insert(
            store.to_string(),
            names
                .iter()
                .enumerate()
                .map(|(i, n)| Document {
                    name: format!("{}/documents/{}", store, i),
                    display_name: n.map(str::to_string),
                })
                .collect(),
        );
        fake
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn generation_failure(&self) -> Result<()> {
        if self.fail_generation {
            return Err(RagError::Api {
                status: 500,
                message: "model overloaded".into(),
            });
        }
        Ok(())
    }

    fn finish(&self, state: &mut FakeState, op_name: &str) {
        if let Some((store, display, _)) = state.pending.remove(op_name) {
            let docs = state.documents.entry(store.clone()).or_default();
            let idx = docs.len();
            docs.push(Document {
                name: format!("{}/documents/{}", store, idx),
                display_name: Some(display),
            });
        }
    }
}

#[async_trait]
impl FileSearchService for FakeService {
    async fn create_store(&self, display_name: &str) -> Result<FileSearchStore> {
        let mut state = self.state();
        state.stores_created += 1;
        let name = format!("fileSearchStores/{}-{}", display_name, state.stores_created);
        state.documents.insert(name.clone(), Vec::new());
        Ok(FileSearchStore {
            name: Some(name),
            display_name: Some(display_name.to_string()),
        })
    }

    async fn upload_to_store(
        &self,
        store: &FileSearchStore,
        path: &Path,
        display_name: &str,
    ) -> Result<Operation> {
        std::fs::read(path).map_err(|e| RagError::io(path, e))?;
        if self.reject_upload.as_deref() == Some(display_name) {
            return Err(RagError::Api {
                status: 400,
                message: format!("cannot index {}", display_name),
            });
        }

        let mut state = self.state();
        state.uploads.push(display_name.to_string());
        let op_name = format!("operations/{}", display_name);
        let store_name = store.name.clone().unwrap_or_default();
        state.pending.insert(
            op_name.clone(),
            (store_name, display_name.to_string(), self.polls_until_done),
        );

        let done = self.polls_until_done == 0;
        if done {
            self.finish(&mut state, &op_name);
        }
        Ok(Operation {
            name: op_name,
            done,
            error: None,
        })
    }

    async fn get_operation(&self, operation: &Operation) -> Result<Operation> {
        let mut state = self.state();
        state.polls += 1;
        let remaining = match state.pending.get_mut(&operation.name) {
            Some(entry) => {
                entry.2 = entry.2.saturating_sub(1);
                entry.2
            }
            None => 0,
        };
        if remaining == 0 {
            self.finish(&mut state, &operation.name);
        }
        Ok(Operation {
            name: operation.name.clone(),
            done: remaining == 0,
            error: None,
        })
    }

    /// Pages hold one document each so page tokens get exercised.
    async fn list_documents_page(
        &self,
        store: &FileSearchStore,
        page_token: Option<&str>,
    ) -> Result<DocumentPage> {
        let state = self.state();
        let docs = state
            .documents
            .get(store.name.as_deref().unwrap_or_default())
            .cloned()
            .unwrap_or_default();
        let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let documents: Vec<Document> = docs.iter().skip(start).take(1).cloned().collect();
        let next_page_token = (start + 1 < docs.len()).then(|| (start + 1).to_string());
        Ok(DocumentPage {
            documents,
            next_page_token,
        })
    }

    async fn generate_content(
        &self,
        _model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.state().requests.push(request.clone());
        self.generation_failure()?;
        let text: String = self.fragments.iter().filter_map(|f| f.text()).collect();
        let grounding = self
            .fragments
            .last()
            .and_then(|f| f.candidates.first())
            .and_then(|c| c.grounding_metadata.clone());
        Ok(GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".into()),
                    parts: vec![Part::text(text)],
                }),
                grounding_metadata: grounding,
            }],
        })
    }

    async fn stream_generate_content(
        &self,
        _model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ResponseStream> {
        self.state().requests.push(request.clone());
        self.generation_failure()?;
        let fragments: Vec<Result<GenerateContentResponse>> =
            self.fragments.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(fragments).boxed())
    }

    async fn check_credentials(&self) -> Result<()> {
        if self.valid_credentials {
            Ok(())
        } else {
            Err(RagError::Api {
                status: 400,
                message: "API key not valid. Please pass a valid API key.".into(),
            })
        }
    }
}

pub fn text_fragment(text: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some("model".into()),
                parts: vec![Part::text(text)],
            }),
            grounding_metadata: None,
        }],
    }
}

/// Final fragment carrying grounding chunks with the given titles.
pub fn grounded_fragment(titles: &[&str]) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: None,
            grounding_metadata: Some(GroundingMetadata {
                grounding_chunks: Some(
                    titles
                        .iter()
                        .map(|t| GroundingChunk {
                            retrieved_context: Some(RetrievedContext {
                                title: Some(t.to_string()),
                                text: None,
                            }),
                        })
                        .collect(),
                ),
            }),
        }],
    }
}

pub fn test_settings(docs_dir: &Path) -> Settings {
    Settings {
        docs_dir: docs_dir.to_path_buf(),
        poll_interval: Duration::from_millis(1),
        ..Settings::default()
    }
}
