use crate::models::{ParseStateError, TrackedProduct, UpdateStatus};
use chrono::{NaiveDateTime, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("product with sku {sku} already exists in the catalog")]
    DuplicateKey { sku: String },

    #[error("no product with sku {sku} in the catalog")]
    NotFound { sku: String },

    #[error(transparent)]
    Db(#[from] duckdb::Error),

    #[error("could not create catalog directory: {0}")]
    Io(#[from] std::io::Error),
}

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    sku             VARCHAR PRIMARY KEY,
    url             VARCHAR NOT NULL,
    company         VARCHAR NOT NULL,
    title           VARCHAR NOT NULL DEFAULT '',
    new_price       VARCHAR NOT NULL DEFAULT '',
    old_price       VARCHAR NOT NULL DEFAULT '',
    new_stock       VARCHAR NOT NULL,
    old_stock       VARCHAR NOT NULL,
    update_status   VARCHAR NOT NULL DEFAULT 'Updated',
    created_at      TIMESTAMP NOT NULL,
    last_synced_at  TIMESTAMP
);

CREATE TABLE IF NOT EXISTS sync_runs (
    id                  BIGINT PRIMARY KEY,
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    products_total      INTEGER DEFAULT 0,
    products_updated    INTEGER DEFAULT 0,
    products_failed     INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_products_status ON products (update_status);
CREATE INDEX IF NOT EXISTS idx_products_stock  ON products (new_stock);
"#;

const PRODUCT_COLS: &str = "sku, url, company, title, new_price, old_price, \
                            new_stock, old_stock, update_status, created_at, last_synced_at";

// ── Row mapping ───────────────────────────────────────────────────────────────

fn parse_col<T>(idx: usize, raw: &str) -> duckdb::Result<T>
where
    T: FromStr<Err = ParseStateError>,
{
    raw.parse().map_err(|e: ParseStateError| {
        duckdb::Error::FromSqlConversionFailure(idx, duckdb::types::Type::Text, Box::new(e))
    })
}

fn row_to_product(row: &duckdb::Row<'_>) -> duckdb::Result<TrackedProduct> {
    let new_stock: String = row.get(6)?;
    let old_stock: String = row.get(7)?;
    let update_status: String = row.get(8)?;

    Ok(TrackedProduct {
        sku: row.get(0)?,
        url: row.get(1)?,
        company: row.get(2)?,
        title: row.get(3)?,
        new_price: row.get(4)?,
        old_price: row.get(5)?,
        new_stock: parse_col(6, &new_stock)?,
        old_stock: parse_col(7, &old_stock)?,
        update_status: parse_col(8, &update_status)?,
        created_at: row.get(9)?,
        last_synced_at: row.get(10)?,
    })
}

// ── Catalog ───────────────────────────────────────────────────────────────────

/// Keyed record store for tracked products, plus the sync-run audit log.
pub struct Catalog {
    conn: Connection,
}

/// Summary row from the sync-run audit log.
#[derive(Debug, Clone)]
pub struct SyncRunSummary {
    pub id: i64,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub status: String,
    pub total: i64,
    pub updated: i64,
    pub failed: i64,
    pub error_msg: Option<String>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL)?;
        self.conn.execute_batch(INDEXES)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Keyed access ──────────────────────────────────────────────────────────

    /// Insert a new tracked product. Fails with `DuplicateKey` when the sku
    /// is already present — uniqueness is a business rule, checked here
    /// rather than surfaced as a constraint violation.
    pub fn insert(&self, product: &TrackedProduct) -> Result<(), StoreError> {
        if self.find_by_sku(&product.sku)?.is_some() {
            return Err(StoreError::DuplicateKey {
                sku: product.sku.clone(),
            });
        }

        self.conn.execute(
            &format!(
                "INSERT INTO products ({PRODUCT_COLS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                product.sku,
                product.url,
                product.company,
                product.title,
                product.new_price,
                product.old_price,
                product.new_stock.as_str(),
                product.old_stock.as_str(),
                product.update_status.as_str(),
                product.created_at,
                product.last_synced_at,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_sku(&self, sku: &str) -> Result<Option<TrackedProduct>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLS} FROM products WHERE sku = ?");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![sku], row_to_product)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, sku: &str) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM products WHERE sku = ?", params![sku])?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                sku: sku.to_string(),
            });
        }
        Ok(())
    }

    /// Full catalog in enumeration order. Ordered by sku so iteration is
    /// deterministic for the same catalog snapshot.
    pub fn all(&self) -> Result<Vec<TrackedProduct>, StoreError> {
        self.select_products("")
    }

    pub fn product_count(&self) -> Result<i64, StoreError> {
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM products")?;
        Ok(stmt.query_row([], |r| r.get(0))?)
    }

    // ── Cycle writes ──────────────────────────────────────────────────────────

    /// Phase-1 write: shift new→old and mark the record pending refresh.
    pub fn snapshot_shift(&self, sku: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE products SET old_price = new_price, old_stock = new_stock, \
             update_status = ? WHERE sku = ?",
            params![UpdateStatus::NotUpdated.as_str(), sku],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                sku: sku.to_string(),
            });
        }
        Ok(())
    }

    /// Phase-2 write: store the fresh observation and mark the record done.
    pub fn apply_refresh(
        &self,
        sku: &str,
        title: &str,
        new_price: &str,
        new_stock: crate::models::StockState,
        observed_at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE products SET title = ?, new_price = ?, new_stock = ?, \
             update_status = ?, last_synced_at = ? WHERE sku = ?",
            params![
                title,
                new_price,
                new_stock.as_str(),
                UpdateStatus::Updated.as_str(),
                observed_at,
                sku
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                sku: sku.to_string(),
            });
        }
        Ok(())
    }

    // ── Presentation queries ──────────────────────────────────────────────────

    pub fn in_stock(&self) -> Result<Vec<TrackedProduct>, StoreError> {
        self.select_products("WHERE new_stock = 'In stock'")
    }

    pub fn out_of_stock(&self) -> Result<Vec<TrackedProduct>, StoreError> {
        self.select_products("WHERE new_stock = 'Out of stock'")
    }

    pub fn back_in_stock(&self) -> Result<Vec<TrackedProduct>, StoreError> {
        self.select_products("WHERE old_stock = 'Out of stock' AND new_stock = 'In stock'")
    }

    pub fn price_changed(&self) -> Result<Vec<TrackedProduct>, StoreError> {
        self.select_products("WHERE old_price <> new_price")
    }

    pub fn updated(&self) -> Result<Vec<TrackedProduct>, StoreError> {
        self.select_products("WHERE update_status = 'Updated'")
    }

    pub fn not_updated(&self) -> Result<Vec<TrackedProduct>, StoreError> {
        self.select_products("WHERE update_status = 'Not Updated'")
    }

    fn select_products(&self, where_clause: &str) -> Result<Vec<TrackedProduct>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLS} FROM products {where_clause} ORDER BY sku");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_product)?;
        let mut products = Vec::new();
        for row in rows {
            products.push(row?);
        }
        Ok(products)
    }

    // ── Sync run log ──────────────────────────────────────────────────────────

    pub fn begin_cycle(&self) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO sync_runs (id, started_at, status) \
             VALUES ((SELECT COALESCE(MAX(id), 0) + 1 FROM sync_runs), ?, 'running')",
            params![Utc::now().naive_utc()],
        )?;
        let mut stmt = self.conn.prepare("SELECT MAX(id) FROM sync_runs")?;
        Ok(stmt.query_row([], |r| r.get(0))?)
    }

    pub fn finish_cycle(
        &self,
        run_id: i64,
        total: usize,
        updated: usize,
        failed: usize,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE sync_runs SET finished_at = ?, status = ?, products_total = ?, \
             products_updated = ?, products_failed = ?, error_msg = ? WHERE id = ?",
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                total as i64,
                updated as i64,
                failed as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_cycle(&self) -> Result<Option<SyncRunSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, status, products_total, \
             products_updated, products_failed, error_msg \
             FROM sync_runs ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map([], |r| {
            Ok(SyncRunSummary {
                id: r.get(0)?,
                started_at: r.get(1)?,
                finished_at: r.get(2)?,
                status: r.get(3)?,
                total: r.get(4)?,
                updated: r.get(5)?,
                failed: r.get(6)?,
                error_msg: r.get(7)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductObservation, StockState, TrackedProduct};
    use chrono::NaiveDate;

    fn catalog() -> Catalog {
        let c = Catalog::open_in_memory().unwrap();
        c.run_migrations().unwrap();
        c
    }

    // Whole-second timestamp so struct equality survives the TIMESTAMP
    // column's microsecond precision.
    fn observed_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap()
    }

    fn sample(sku: &str, url: &str, stock: StockState) -> TrackedProduct {
        let obs = ProductObservation {
            title: format!("Product {sku}"),
            price: "10.00".into(),
            stock,
            url: url.into(),
            observed_at: observed_at(),
        };
        TrackedProduct::from_observation(&obs, sku, "Walmart")
    }

    #[test]
    fn insert_then_find_round_trips_with_updated_status() {
        let cat = catalog();
        let p = sample("A-1", "https://example.com/ip/1", StockState::InStock);
        cat.insert(&p).unwrap();

        let found = cat.find_by_sku("A-1").unwrap().expect("record present");
        assert_eq!(found, p);
        assert_eq!(found.update_status, UpdateStatus::Updated);
    }

    #[test]
    fn duplicate_sku_is_rejected() {
        let cat = catalog();
        let p = sample("A-1", "https://example.com/ip/1", StockState::InStock);
        cat.insert(&p).unwrap();

        let err = cat.insert(&p).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { sku } if sku == "A-1"));
    }

    #[test]
    fn delete_missing_sku_is_not_found() {
        let cat = catalog();
        let err = cat.delete("ghost").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn all_returns_catalog_in_sku_order() {
        let cat = catalog();
        for sku in ["C-3", "A-1", "B-2"] {
            cat.insert(&sample(sku, "https://example.com/ip/x", StockState::InStock))
                .unwrap();
        }
        let skus: Vec<String> = cat.all().unwrap().into_iter().map(|p| p.sku).collect();
        assert_eq!(skus, vec!["A-1", "B-2", "C-3"]);
    }

    #[test]
    fn snapshot_shift_moves_new_into_old_and_marks_pending() {
        let cat = catalog();
        cat.insert(&sample("A-1", "https://example.com/ip/1", StockState::InStock))
            .unwrap();
        cat.apply_refresh(
            "A-1",
            "Product A-1",
            "$12.50",
            StockState::OutOfStock,
            Utc::now().naive_utc(),
        )
        .unwrap();

        cat.snapshot_shift("A-1").unwrap();
        let p = cat.find_by_sku("A-1").unwrap().unwrap();
        assert_eq!(p.old_price, "$12.50");
        assert_eq!(p.old_stock, StockState::OutOfStock);
        assert_eq!(p.update_status, UpdateStatus::NotUpdated);
    }

    #[test]
    fn presentation_queries_filter_on_expected_predicates() {
        let cat = catalog();
        cat.insert(&sample("A-1", "https://example.com/ip/1", StockState::InStock))
            .unwrap();
        cat.insert(&sample("B-2", "https://example.com/ip/2", StockState::OutOfStock))
            .unwrap();

        // B-2 comes back in stock at a new price.
        cat.snapshot_shift("B-2").unwrap();
        cat.apply_refresh(
            "B-2",
            "Product B-2",
            "$8.00",
            StockState::InStock,
            Utc::now().naive_utc(),
        )
        .unwrap();

        let in_stock: Vec<_> = cat.in_stock().unwrap().into_iter().map(|p| p.sku).collect();
        assert_eq!(in_stock, vec!["A-1", "B-2"]);

        assert!(cat.out_of_stock().unwrap().is_empty());

        let back: Vec<_> = cat
            .back_in_stock()
            .unwrap()
            .into_iter()
            .map(|p| p.sku)
            .collect();
        assert_eq!(back, vec!["B-2"]);

        let changed: Vec<_> = cat
            .price_changed()
            .unwrap()
            .into_iter()
            .map(|p| p.sku)
            .collect();
        assert_eq!(changed, vec!["B-2"]);

        assert_eq!(cat.updated().unwrap().len(), 2);
        assert!(cat.not_updated().unwrap().is_empty());
    }

    #[test]
    fn cycle_log_records_counts() {
        let cat = catalog();
        let id = cat.begin_cycle().unwrap();
        cat.finish_cycle(id, 3, 2, 1, Some("1 record failed")).unwrap();

        let run = cat.last_cycle().unwrap().expect("run logged");
        assert_eq!(run.id, id);
        assert_eq!(run.status, "error");
        assert_eq!((run.total, run.updated, run.failed), (3, 2, 1));
        assert!(run.finished_at.is_some());
    }
}
