use crate::types::Candidate;

pub const NO_CANDIDATES: &str = "No candidates available.";
pub const NO_CITATIONS: &str = "No citations found in the candidates.";

/// Titles of the retrieved chunks a candidate was grounded in, in chunk order.
///
/// Chunks without a retrieved-context title are skipped.
pub fn citation_titles(candidate: &Candidate) -> Vec<String> {
    candidate
        .grounding_metadata
        .as_ref()
        .and_then(|meta| meta.grounding_chunks.as_ref())
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|chunk| chunk.retrieved_context.as_ref())
                .filter_map(|ctx| ctx.title.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Formats the citations of a candidate as a `- title` list.
pub fn cite_documents(candidate: Option<&Candidate>) -> String {
    let Some(candidate) = candidate else {
        return NO_CANDIDATES.to_string();
    };

    let titles = citation_titles(candidate);
    if titles.is_empty() {
        return NO_CITATIONS.to_string();
    }

    titles
        .iter()
        .map(|title| format!("- {}", title))
        .collect::<Vec<_>>()
        .join("\n")
}
