use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

/// Headless browser configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    /// Hard cap on navigation + load-event wait. A render that exceeds this
    /// is a fetch failure, never a partial document.
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    #[serde(default)]
    pub sandbox: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Sync cycle configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_render_retries")]
    pub max_render_retries: usize,

    /// Seller identity stamped on newly added products.
    #[serde(default = "default_company")]
    pub default_company: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_render_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "shelfwatch/0.1 (personal price tracker)".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/shelfwatch.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_request_delay_ms() -> u64 {
    1500
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_max_render_retries() -> usize {
    3
}
fn default_company() -> String {
    "Walmart".to_string()
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SHELFWATCH").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig {
                render_timeout_secs: default_render_timeout_secs(),
                sandbox: false,
                user_agent: default_user_agent(),
            },
            storage: StorageConfig {
                db_path: default_db_path(),
                run_migrations: true,
            },
            sync: SyncConfig {
                request_delay_ms: default_request_delay_ms(),
                jitter_ms: default_jitter_ms(),
                max_render_retries: default_max_render_retries(),
                default_company: default_company(),
            },
        }
    }
}
