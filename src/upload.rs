use tracing::{debug, info};

use crate::client::{resolve_client, FileSearchService};
use crate::config::Settings;
use crate::error::{RagError, Result};
use crate::staging::Staging;
use crate::types::{FileSearchStore, Operation};

/// Creates a new remote store. Never reuses an existing one with the same name.
pub async fn create_store(
    client: Option<&dyn FileSearchService>,
    display_name: &str,
) -> Result<FileSearchStore> {
    let client = resolve_client(client)?;
    let store = client.create_store(display_name).await?;
    info!(
        "Created file search store with name: {}",
        store.name.as_deref().unwrap_or("<unnamed>")
    );
    Ok(store)
}

/// Polls an operation every `settings.poll_interval` until it reports done.
///
/// There is no timeout: an operation that never completes blocks forever.
async fn wait_for(
    client: &dyn FileSearchService,
    mut operation: Operation,
    settings: &Settings,
) -> Result<Operation> {
    while !operation.done {
        tokio::time::sleep(settings.poll_interval).await;
        operation = client.get_operation(&operation).await?;
        debug!(operation = %operation.name, done = operation.done, "polled");
    }
    if let Some(err) = &operation.error {
        return Err(RagError::Operation {
            name: operation.name.clone(),
            message: err.message.clone(),
        });
    }
    Ok(operation)
}

/// Creates one store and indexes staged files into it, strictly in order.
///
/// With `files = None` every file currently in the staging directory is
/// uploaded. `on_progress` runs after each file finishes indexing; without it
/// a line is printed. The first remote failure aborts the batch and is
/// returned as is, with no record of which files made it.
pub async fn upload_docs(
    client: Option<&dyn FileSearchService>,
    staging: &Staging,
    files: Option<&[String]>,
    settings: &Settings,
    mut on_progress: Option<&mut (dyn FnMut(&str) + Send)>,
) -> Result<FileSearchStore> {
    let client = resolve_client(client)?;

    let files = match files {
        Some(files) => files.to_vec(),
        None => staging.staged_files()?,
    };

    let store = create_store(Some(client), &settings.store_display_name).await?;

    for file in &files {
        let path = staging.path_of(file);
        let operation = client.upload_to_store(&store, &path, file).await?;
        wait_for(client, operation, settings).await?;

        match on_progress.as_deref_mut() {
            Some(progress) => progress(file),
            None => println!("Finished uploading file: {}", file),
        }
    }

    Ok(store)
}
