use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ── Stock state ───────────────────────────────────────────────────────────────

/// Binary availability derived from the page's stock signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockState {
    InStock,
    OutOfStock,
}

impl StockState {
    /// Canonical catalog representation ("In stock" / "Out of stock").
    pub fn as_str(&self) -> &'static str {
        match self {
            StockState::InStock => "In stock",
            StockState::OutOfStock => "Out of stock",
        }
    }
}

impl fmt::Display for StockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unrecognized catalog value: {0:?}")]
pub struct ParseStateError(pub String);

impl FromStr for StockState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In stock" => Ok(StockState::InStock),
            "Out of stock" => Ok(StockState::OutOfStock),
            other => Err(ParseStateError(other.to_string())),
        }
    }
}

// ── Update status ─────────────────────────────────────────────────────────────

/// Per-record sync progress marker. `NotUpdated` is only ever observable
/// while a cycle is in flight (or after a record's refresh failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    Updated,
    NotUpdated,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Updated => "Updated",
            UpdateStatus::NotUpdated => "Not Updated",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateStatus {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Updated" => Ok(UpdateStatus::Updated),
            "Not Updated" => Ok(UpdateStatus::NotUpdated),
            other => Err(ParseStateError(other.to_string())),
        }
    }
}

// ── Product observation ───────────────────────────────────────────────────────

/// One fetch of one page. Ephemeral — no identity beyond the call that
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductObservation {
    pub title: String,
    /// Decimal-as-string, e.g. "24.99". Empty when the page exposed no price.
    pub price: String,
    pub stock: StockState,
    pub url: String,
    pub observed_at: NaiveDateTime,
}

// ── Tracked product ───────────────────────────────────────────────────────────

/// Persistent catalog record. `(old_price, old_stock)` always hold the values
/// of the previous completed sync cycle; a cycle shifts new→old before
/// writing fresh new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedProduct {
    pub sku: String,
    pub url: String,
    /// Expected seller identity, compared against the page's seller text.
    pub company: String,
    pub title: String,
    pub new_price: String,
    pub old_price: String,
    pub new_stock: StockState,
    pub old_stock: StockState,
    pub update_status: UpdateStatus,
    pub created_at: NaiveDateTime,
    pub last_synced_at: Option<NaiveDateTime>,
}

impl TrackedProduct {
    /// Build a fresh record from a one-off fetch. Old values start equal to
    /// new values and the record reads `Updated` until its first cycle.
    pub fn from_observation(obs: &ProductObservation, sku: &str, company: &str) -> Self {
        let price = crate::utils::dollar_price(&obs.price);
        Self {
            sku: sku.trim().to_string(),
            url: obs.url.clone(),
            company: company.to_string(),
            title: obs.title.clone(),
            new_price: price.clone(),
            old_price: price,
            new_stock: obs.stock,
            old_stock: obs.stock,
            update_status: UpdateStatus::Updated,
            created_at: obs.observed_at,
            last_synced_at: None,
        }
    }
}
