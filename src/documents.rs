use crate::client::{resolve_client, FileSearchService};
use crate::error::Result;
use crate::types::FileSearchStore;

/// Shown for documents the service returns without a display name.
pub const UNNAMED_DOCUMENT: &str = "Unnamed document";

/// Display names of every document in `store`, in the service's order.
///
/// Follows page tokens until the listing is exhausted.
pub async fn list_documents(
    store: &FileSearchStore,
    client: Option<&dyn FileSearchService>,
) -> Result<Vec<String>> {
    let client = resolve_client(client)?;
    let mut names = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = client
            .list_documents_page(store, page_token.as_deref())
            .await?;

        names.extend(page.documents.into_iter().map(|doc| {
            doc.display_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNNAMED_DOCUMENT.to_string())
        }));

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(names)
}

/// Prints the indexed documents, one per line, and returns their names.
pub async fn check_docs(
    store: &FileSearchStore,
    client: Option<&dyn FileSearchService>,
) -> Result<Vec<String>> {
    let names = list_documents(store, client).await?;
    for name in &names {
        println!("{}", name);
    }
    Ok(names)
}
