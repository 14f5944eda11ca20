use std::path::{Path, PathBuf};
use std::time::Duration;

/// Model used for answer generation unless `GEMINI_MODEL` says otherwise.
pub const MODEL: &str = "gemini-2.5-flash-lite";

/// Display name given to every file search store this tool creates.
pub const FILE_SEARCH_STORE_NAME: &str = "rag-demo";

/// Sample question used when the user submits an empty prompt.
pub const TEST_PROMPT: &str = "En una frase, cuales son las etapas del roadmap";

/// Local staging directory for documents waiting to be uploaded.
pub const DOCS_DIR: &str = "./docs/";

/// File types accepted by Gemini File Search.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "html", "htm", "csv", "md", "xml"];

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub const DEFAULT_BIND: &str = "127.0.0.1:8501";

/// UI sessions untouched for this long are dropped.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Runtime settings, resolved from the environment with the constants above as defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub store_display_name: String,
    pub default_prompt: String,
    pub docs_dir: PathBuf,
    /// Delay between two polls of an upload operation.
    pub poll_interval: Duration,
    pub base_url: String,
    pub bind: String,
    pub session_idle_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: MODEL.to_string(),
            store_display_name: FILE_SEARCH_STORE_NAME.to_string(),
            default_prompt: TEST_PROMPT.to_string(),
            docs_dir: PathBuf::from(DOCS_DIR),
            poll_interval: DEFAULT_POLL_INTERVAL,
            base_url: DEFAULT_BASE_URL.to_string(),
            bind: DEFAULT_BIND.to_string(),
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
        }
    }
}

impl Settings {
    /// Reads overrides from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_secs: u64 = std::env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| defaults.poll_interval.as_secs().to_string())
            .parse()
            .unwrap_or(defaults.poll_interval.as_secs());
        let idle_secs = std::env::var("SESSION_IDLE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.session_idle_timeout.as_secs());

        Self {
            model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            store_display_name: std::env::var("FILE_SEARCH_STORE_NAME")
                .unwrap_or(defaults.store_display_name),
            default_prompt: defaults.default_prompt,
            docs_dir: std::env::var("DOCS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.docs_dir),
            poll_interval: Duration::from_secs(poll_secs),
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            bind: std::env::var("UI_BIND").unwrap_or(defaults.bind),
            session_idle_timeout: Duration::from_secs(idle_secs),
        }
    }
}

/// Returns true when the file extension is on the File Search allow-list.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
