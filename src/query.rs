use futures::StreamExt;
use tracing::debug;

use crate::client::{resolve_client, FileSearchService};
use crate::error::Result;
use crate::stream::ResponseStream;
use crate::types::{
    Content, FileSearch, FileSearchStore, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part, ThinkingConfig, Tool,
};

/// Keeps answers inside the retrieved documents.
pub const SYSTEM_INSTRUCTION: &str = "Base your responses on the provided documents. \
     If the answer is not in the documents, say it's not in the knowledge base.";

pub const MINIMAL_THINKING_LEVEL: &str = "minimal";

/// Whether the model accepts `thinkingConfig.thinkingLevel`.
///
/// Only the Gemini 3 family does; older models reject the field.
pub fn supports_thinking_level(model: &str) -> bool {
    model
        .trim_start_matches("models/")
        .starts_with("gemini-3")
}

/// Builds a request bound to `store` through a single file search tool.
///
/// A store without a resource name yields an empty binding, which leaves the
/// answer ungrounded.
pub fn build_request(prompt: &str, store: &FileSearchStore, model: &str) -> GenerateContentRequest {
    let store_names = store
        .name
        .iter()
        .filter(|n| !n.is_empty())
        .cloned()
        .collect();

    let generation_config = supports_thinking_level(model).then(|| GenerationConfig {
        thinking_config: Some(ThinkingConfig {
            thinking_level: MINIMAL_THINKING_LEVEL.to_string(),
        }),
    });

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(prompt)],
        }],
        tools: vec![Tool {
            file_search: FileSearch {
                file_search_store_names: store_names,
            },
        }],
        system_instruction: Content {
            role: None,
            parts: vec![Part::text(SYSTEM_INSTRUCTION)],
        },
        generation_config,
    }
}

/// Generates a complete grounded answer.
pub async fn generate_response(
    prompt: &str,
    store: &FileSearchStore,
    model: &str,
    client: Option<&dyn FileSearchService>,
) -> Result<GenerateContentResponse> {
    let client = resolve_client(client)?;
    let request = build_request(prompt, store, model);
    debug!(model, "generating response");
    client.generate_content(model, &request).await
}

/// Generates a grounded answer as a lazy stream of fragments.
///
/// Only the final fragment is guaranteed to carry grounding metadata.
pub async fn stream_response(
    prompt: &str,
    store: &FileSearchStore,
    model: &str,
    client: Option<&dyn FileSearchService>,
) -> Result<ResponseStream> {
    let client = resolve_client(client)?;
    let request = build_request(prompt, store, model);
    debug!(model, "streaming response");
    client.stream_generate_content(model, &request).await
}

/// Yields the text of a response stream while remembering its last fragment.
pub struct StreamCollector {
    stream: ResponseStream,
    last: Option<GenerateContentResponse>,
}

impl StreamCollector {
    pub fn new(stream: ResponseStream) -> Self {
        Self { stream, last: None }
    }

    /// Next non-empty text fragment, `None` once the stream is exhausted.
    pub async fn next_text(&mut self) -> Option<Result<String>> {
        while let Some(fragment) = self.stream.next().await {
            let fragment = match fragment {
                Ok(fragment) => fragment,
                Err(e) => return Some(Err(e)),
            };
            let text = fragment.text();
            self.last = Some(fragment);
            if let Some(text) = text {
                return Some(Ok(text));
            }
        }
        None
    }

    /// The most recent fragment; after exhaustion, the one holding grounding metadata.
    pub fn last(&self) -> Option<&GenerateContentResponse> {
        self.last.as_ref()
    }
}
