use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use gemini_rag::cli::{self, CliOptions};
use gemini_rag::{ui, Settings};

/// Gemini RAG: chat with your documents through Gemini File Search.
///
/// Documents are staged locally, uploaded to a File Search store, and
/// questions are answered from that store with citations.
#[derive(Parser)]
#[command(name = "gemini-rag")]
#[command(version)]
#[command(about = "Ask questions about your documents with Gemini File Search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one terminal session
    ///
    /// Stages documents, uploads them to a new store, asks one question,
    /// prints the answer with citations, and cleans up the staging directory.
    Cli {
        /// Document to stage (repeatable); without it you are prompted for paths
        #[arg(short, long = "file", value_name = "FILE_PATH")]
        files: Vec<PathBuf>,

        /// Question to ask; without it you are prompted
        #[arg(short, long)]
        prompt: Option<String>,

        /// Print the answer only once it is complete
        #[arg(long)]
        no_stream: bool,
    },

    /// Serve the browser UI
    Serve {
        /// Address to listen on (defaults to UI_BIND or 127.0.0.1:8501)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
}

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut settings = Settings::from_env();

    let result = match cli.command {
        Commands::Cli {
            files,
            prompt,
            no_stream,
        } => {
            let options = CliOptions {
                files,
                prompt,
                stream: !no_stream,
            };
            cli::run(&settings, options, None).await
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                settings.bind = bind;
            }
            ui::serve(settings).await
        }
    };

    // Exit explicitly: a terminal prompt abandoned by Ctrl-C may still hold
    // a blocking thread that the runtime would otherwise wait for.
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}
