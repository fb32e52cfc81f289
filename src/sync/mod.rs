//! Sync orchestrator: runs the two-phase refresh cycle over the catalog.
//!
//! ## Cycle shape
//!
//! Phase 1 (snapshot): every record shifts `new_price`/`new_stock` into the
//! `old_*` columns and is marked `Not Updated`. This completes for the whole
//! catalog before any page is fetched.
//!
//! Phase 2 (refresh): one browser session is opened and reused serially
//! across every record in catalog order. A record whose page fails to render
//! stays `Not Updated` with its pre-cycle `new_*` values intact; the cycle
//! carries on with the next record. One bad URL never aborts the batch.

use anyhow::{Context, Result};
use rand::RngExt;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::Renderer;
use crate::config::{AppConfig, SyncConfig};
use crate::models::TrackedProduct;
use crate::scraper::{PageScraper, ProductSource};
use crate::storage::{Catalog, StoreError};
use crate::utils;

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub total: usize,
    pub updated: usize,
    pub failed: usize,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct SyncCycle {
    config: AppConfig,
    cancel: CancellationToken,
}

impl SyncCycle {
    pub fn new(config: AppConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub async fn run(&self) -> Result<CycleReport> {
        let catalog = Catalog::open(&self.config.storage.db_path)
            .context("Failed to open catalog")?;

        if self.config.storage.run_migrations {
            catalog.run_migrations()?;
        }

        let run_id = catalog.begin_cycle().unwrap_or(0);

        info!("=== Phase 1: snapshot shift ===");
        let products = snapshot_catalog(&catalog)?;
        info!("{} records shifted", products.len());

        info!("=== Phase 2: refresh ({} records) ===", products.len());
        let session = Renderer::new(&self.config.browser)
            .open()
            .context("Failed to open browser session")?;
        let scraper = PageScraper::new(session, &self.config.sync);

        let report = refresh_products(
            &catalog,
            &scraper,
            &products,
            &self.config.sync,
            &self.cancel,
        )
        .await?;

        // The scraper (and with it the browser session) drops here, on the
        // error path above included.
        drop(scraper);

        let error_msg = if report.failed > 0 {
            Some(format!("{} records failed to refresh", report.failed))
        } else {
            None
        };
        catalog
            .finish_cycle(
                run_id,
                report.total,
                report.updated,
                report.failed,
                error_msg.as_deref(),
            )
            .ok();

        info!(
            "=== Done: {} total | {} updated | {} failed ===",
            report.total, report.updated, report.failed
        );

        Ok(report)
    }
}

// ── Phases ────────────────────────────────────────────────────────────────────

/// Phase 1. Shifts every record and returns the catalog snapshot that phase 2
/// will iterate, in enumeration order.
pub fn snapshot_catalog(catalog: &Catalog) -> Result<Vec<TrackedProduct>, StoreError> {
    let products = catalog.all()?;
    for product in &products {
        catalog.snapshot_shift(&product.sku)?;
    }
    Ok(products)
}

/// Phase 2. Fetches each record through `source`, writing fresh `new_*`
/// values on success and leaving the record `Not Updated` on fetch failure.
/// Cancellation is honored between records, never mid-render.
pub async fn refresh_products<S: ProductSource>(
    catalog: &Catalog,
    source: &S,
    products: &[TrackedProduct],
    config: &SyncConfig,
    cancel: &CancellationToken,
) -> Result<CycleReport, StoreError> {
    let mut updated = 0usize;
    let mut failed = 0usize;

    for product in products {
        if cancel.is_cancelled() {
            warn!(
                "Cycle cancelled; {} records left untouched",
                products.len() - updated - failed
            );
            break;
        }

        polite_delay(config).await;

        match source.fetch_product(&product.url, &product.company).await {
            Ok(obs) => {
                catalog.apply_refresh(
                    &product.sku,
                    &obs.title,
                    &utils::dollar_price(&obs.price),
                    obs.stock,
                    obs.observed_at,
                )?;
                info!("{}: {} [{}]", product.sku, obs.price, obs.stock);
                updated += 1;
            }
            Err(e) => {
                warn!("{}: refresh failed: {:#}", product.sku, anyhow::Error::from(e));
                failed += 1;
            }
        }
    }

    Ok(CycleReport {
        total: products.len(),
        updated,
        failed,
    })
}

/// Sleep for the configured delay + random jitter.
async fn polite_delay(config: &SyncConfig) {
    let jitter = if config.jitter_ms > 0 {
        rand::rng().random_range(0..=config.jitter_ms)
    } else {
        0
    };
    let total = Duration::from_millis(config.request_delay_ms + jitter);
    if !total.is_zero() {
        sleep(total).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FetchError;
    use crate::models::{ProductObservation, StockState, UpdateStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;

    struct FakeSource {
        fail: HashSet<String>,
    }

    #[async_trait]
    impl ProductSource for FakeSource {
        async fn fetch_product(
            &self,
            url: &str,
            _expected_seller: &str,
        ) -> Result<ProductObservation, FetchError> {
            if self.fail.contains(url) {
                return Err(FetchError::Navigation {
                    url: url.to_string(),
                    source: anyhow::anyhow!("navigation timed out"),
                });
            }
            Ok(ProductObservation {
                title: "Fresh Title".into(),
                price: "9.99".into(),
                stock: StockState::InStock,
                url: url.to_string(),
                observed_at: Utc::now().naive_utc(),
            })
        }
    }

    fn test_config() -> SyncConfig {
        SyncConfig {
            request_delay_ms: 0,
            jitter_ms: 0,
            max_render_retries: 0,
            default_company: "Walmart".into(),
        }
    }

    fn seeded_catalog() -> Catalog {
        let cat = Catalog::open_in_memory().unwrap();
        cat.run_migrations().unwrap();
        for (sku, url) in [
            ("A-1", "https://example.com/ip/1"),
            ("B-2", "https://example.com/ip/2"),
            ("C-3", "https://example.com/ip/3"),
        ] {
            let obs = ProductObservation {
                title: format!("Product {sku}"),
                price: "10.00".into(),
                stock: StockState::InStock,
                url: url.into(),
                observed_at: Utc::now().naive_utc(),
            };
            cat.insert(&crate::models::TrackedProduct::from_observation(
                &obs, sku, "Walmart",
            ))
            .unwrap();
        }
        cat
    }

    #[tokio::test]
    async fn one_failing_record_does_not_abort_the_cycle() {
        let cat = seeded_catalog();
        let source = FakeSource {
            fail: HashSet::from(["https://example.com/ip/2".to_string()]),
        };

        let products = snapshot_catalog(&cat).unwrap();
        let report =
            refresh_products(&cat, &source, &products, &test_config(), &CancellationToken::new())
                .await
                .unwrap();

        assert_eq!(
            report,
            CycleReport {
                total: 3,
                updated: 2,
                failed: 1
            }
        );

        let a = cat.find_by_sku("A-1").unwrap().unwrap();
        assert_eq!(a.update_status, UpdateStatus::Updated);
        assert_eq!(a.new_price, "$9.99");
        // Cycle invariant: old values hold the pre-cycle new values.
        assert_eq!(a.old_price, "$10.00");
        assert!(a.last_synced_at.is_some());

        let b = cat.find_by_sku("B-2").unwrap().unwrap();
        assert_eq!(b.update_status, UpdateStatus::NotUpdated);
        // Failed refresh leaves new values unchanged from before the cycle.
        assert_eq!(b.new_price, "$10.00");
        assert_eq!(b.new_stock, StockState::InStock);

        let c = cat.find_by_sku("C-3").unwrap().unwrap();
        assert_eq!(c.update_status, UpdateStatus::Updated);
    }

    #[tokio::test]
    async fn refresh_success_updates_title_and_stock() {
        let cat = seeded_catalog();
        let source = FakeSource { fail: HashSet::new() };

        let products = snapshot_catalog(&cat).unwrap();
        let report =
            refresh_products(&cat, &source, &products, &test_config(), &CancellationToken::new())
                .await
                .unwrap();

        assert_eq!(report.updated, 3);
        let a = cat.find_by_sku("A-1").unwrap().unwrap();
        assert_eq!(a.title, "Fresh Title");
        assert_eq!(a.new_stock, StockState::InStock);
    }

    #[test]
    fn cancellation_stops_between_records_without_corrupting_state() {
        let cat = seeded_catalog();
        let source = FakeSource { fail: HashSet::new() };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let products = snapshot_catalog(&cat).unwrap();
        let report = tokio_test::block_on(refresh_products(
            &cat,
            &source,
            &products,
            &test_config(),
            &cancel,
        ))
        .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.updated, 0);
        assert_eq!(report.failed, 0);

        // Every record is cleanly mid-cycle: shifted, pending, untouched.
        for p in cat.all().unwrap() {
            assert_eq!(p.update_status, UpdateStatus::NotUpdated);
            assert_eq!(p.new_price, "$10.00");
            assert_eq!(p.old_price, "$10.00");
        }
    }
}
