//! Headless browser session management.
//!
//! One `Session` owns one Chrome process and one tab, reused serially across
//! renders. The process is torn down when the `Session` drops, so every exit
//! path of a caller — including extraction panics bubbling up as errors —
//! releases the browser.

use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::BrowserConfig;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Rendering failure. Recoverable at record granularity during a batch cycle;
/// user-visible during a one-off fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to launch headless browser: {0}")]
    Launch(#[source] anyhow::Error),

    #[error("navigation failed for {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("renderer returned an empty document for {url}")]
    EmptyDocument { url: String },

    #[error("render task for {url} did not complete: {source}")]
    Join {
        url: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

// ── Renderer / Session ────────────────────────────────────────────────────────

/// Factory for browser sessions.
pub struct Renderer {
    config: BrowserConfig,
}

impl Renderer {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Launch a Chrome process and open the tab that all renders will share.
    pub fn open(&self) -> Result<Session, FetchError> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(self.config.sandbox)
            // A cycle idles between records (polite delay); keep the browser
            // alive well past any single render.
            .idle_browser_timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| FetchError::Launch(anyhow::anyhow!(e)))?;

        let browser = Browser::new(options).map_err(FetchError::Launch)?;
        let tab = browser.new_tab().map_err(FetchError::Launch)?;

        tab.set_default_timeout(Duration::from_secs(self.config.render_timeout_secs));
        tab.set_user_agent(&self.config.user_agent, None, None)
            .map_err(FetchError::Launch)?;

        debug!("Browser session opened");
        Ok(Session { _browser: browser, tab })
    }
}

/// A live browser process plus its single tab. Dropping the session kills
/// the Chrome process.
pub struct Session {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl Session {
    /// Navigate to `url`, wait for the load event (bounded by the configured
    /// timeout) and return the rendered HTML. Timeouts and navigation errors
    /// surface as `FetchError` — never as partial or empty HTML.
    pub async fn render(&self, url: &str) -> Result<String, FetchError> {
        debug!("Rendering {}", url);

        let tab = Arc::clone(&self.tab);
        let target = url.to_string();

        // CDP calls are blocking; keep them off the async runtime so the
        // render stays an ordinary suspension point for the orchestrator.
        let handle = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            tab.get_content()
        });

        let html = match handle.await {
            Ok(Ok(html)) => html,
            Ok(Err(source)) => {
                return Err(FetchError::Navigation {
                    url: url.to_string(),
                    source,
                });
            }
            Err(source) => {
                return Err(FetchError::Join {
                    url: url.to_string(),
                    source,
                });
            }
        };

        if html.trim().is_empty() {
            return Err(FetchError::EmptyDocument {
                url: url.to_string(),
            });
        }

        Ok(html)
    }
}
