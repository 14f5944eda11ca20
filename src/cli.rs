use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use crate::citations::cite_documents;
use crate::client::FileSearchService;
use crate::config::Settings;
use crate::documents::check_docs;
use crate::query::{generate_response, stream_response, StreamCollector};
use crate::staging::{read_line, Staging};
use crate::upload::upload_docs;

/// Options of one terminal session.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    /// Files to stage; when empty the terminal picker is shown.
    pub files: Vec<PathBuf>,
    /// Question to ask; when `None` the user is prompted.
    pub prompt: Option<String>,
    /// Print the answer as it arrives instead of all at once.
    pub stream: bool,
}

/// Runs select → upload → check → generate → cite, then always cleans up.
///
/// Ctrl-C ends the pipeline early but still runs cleanup. Remote calls go
/// through `client`, or the process-wide default client when it is `None`.
pub async fn run(
    settings: &Settings,
    options: CliOptions,
    client: Option<&dyn FileSearchService>,
) -> Result<()> {
    let staging = Staging::new(&settings.docs_dir);

    let outcome = tokio::select! {
        result = pipeline(settings, &staging, options, client) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted by user.");
            Ok(())
        }
    };

    println!("\nstep 4: cleanup docs");
    match staging.cleanup() {
        Ok(removed) => println!(
            "Cleaned up {} file(s) from {}",
            removed,
            staging.dir().display()
        ),
        Err(e) => warn!("cleanup failed: {}", e),
    }

    outcome
}

async fn pipeline(
    settings: &Settings,
    staging: &Staging,
    options: CliOptions,
    client: Option<&dyn FileSearchService>,
) -> Result<()> {
    println!("step 0: select documents");
    let copied = if options.files.is_empty() {
        let picker = staging.clone();
        tokio::task::spawn_blocking(move || picker.select_and_copy_files())
            .await
            .context("file picker task failed")??
    } else {
        staging.copy_to_staging(&options.files)?
    };

    if copied.is_empty() {
        println!(
            "No new files selected, using existing {} contents.",
            staging.dir().display()
        );
    } else {
        println!(
            "Added {} file(s) to {}: {}",
            copied.len(),
            staging.dir().display(),
            copied.join(", ")
        );
    }

    println!("\nstep 1: upload docs");
    let files = (!copied.is_empty()).then_some(copied.as_slice());
    let store = upload_docs(client, staging, files, settings, None)
        .await
        .context("Failed to upload documents")?;

    println!("\nstep 2: check docs");
    check_docs(&store, client).await?;

    println!("\nstep 3: generate response");
    let prompt = match options.prompt {
        Some(prompt) => prompt,
        None => read_prompt().await?,
    };
    let prompt = if prompt.trim().is_empty() {
        settings.default_prompt.clone()
    } else {
        prompt
    };

    let citations = if options.stream {
        let stream = stream_response(&prompt, &store, &settings.model, client).await?;
        let mut collector = StreamCollector::new(stream);
        let mut stdout = std::io::stdout();
        while let Some(text) = collector.next_text().await {
            print!("{}", text?);
            stdout.flush().ok();
        }
        println!();
        cite_documents(collector.last().and_then(|r| r.first_candidate()))
    } else {
        let response = generate_response(&prompt, &store, &settings.model, client).await?;
        println!("{}", response.text().unwrap_or_default());
        cite_documents(response.first_candidate())
    };

    println!("\nCitations:");
    println!("{}", citations);
    Ok(())
}

async fn read_prompt() -> Result<String> {
    let prompt = "Enter your prompt (or press Enter to use default)";
    tokio::task::spawn_blocking(move || read_line(prompt))
        .await
        .context("prompt task failed")?
        .context("Failed to read prompt")
}
