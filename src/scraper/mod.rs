pub mod extract;
pub mod stock;

use async_trait::async_trait;
use chrono::Utc;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::debug;

use crate::browser::{FetchError, Session};
use crate::config::SyncConfig;
use crate::models::ProductObservation;

use self::extract::PageFields;
use self::stock::classify;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable observation source. The production implementation drives a
/// browser session; tests substitute canned observations.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch_product(
        &self,
        url: &str,
        expected_seller: &str,
    ) -> Result<ProductObservation, FetchError>;
}

// ── Page scraper ──────────────────────────────────────────────────────────────

/// Renders a page through one shared browser session, extracts fields and
/// classifies stock. Rendering is the only failure surface — extraction and
/// classification degrade to empty fields / `OutOfStock`.
pub struct PageScraper {
    session: Session,
    retry_delay_ms: u64,
    max_render_retries: usize,
}

impl PageScraper {
    pub fn new(session: Session, config: &SyncConfig) -> Self {
        Self {
            session,
            retry_delay_ms: config.request_delay_ms,
            max_render_retries: config.max_render_retries,
        }
    }

    async fn render_with_retry(&self, url: &str) -> Result<String, FetchError> {
        let strategy = FixedInterval::from_millis(self.retry_delay_ms).take(self.max_render_retries);
        Retry::spawn(strategy, || self.session.render(url)).await
    }
}

#[async_trait]
impl ProductSource for PageScraper {
    async fn fetch_product(
        &self,
        url: &str,
        expected_seller: &str,
    ) -> Result<ProductObservation, FetchError> {
        let html = self.render_with_retry(url).await?;

        let fields = PageFields::extract(&html);
        let stock = classify(
            &fields.seller_text,
            &fields.out_of_stock_text,
            &fields.delivery_text,
            expected_seller,
        );

        debug!(
            title = %fields.title,
            price = %fields.price_raw,
            %stock,
            "Observed {}", url
        );

        Ok(ProductObservation {
            title: fields.title,
            price: fields.price_raw,
            stock,
            url: url.to_string(),
            observed_at: Utc::now().naive_utc(),
        })
    }
}
