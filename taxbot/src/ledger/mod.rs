//! Ledger engine: the single totals record and the arithmetic over it.
//!
//! Categories map to record fields through a closed enum; unknown category
//! tokens are rejected during command validation and never reach this module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod store;

/// Tax category. Parsed from the command token (lowercased once by the
/// caller), displayed under its field label in replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Pcp,
    Weed,
}

impl Category {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "pcp" => Some(Category::Pcp),
            "iarba" => Some(Category::Weed),
            _ => None,
        }
    }

    /// Label used in user-facing replies.
    pub fn label(self) -> &'static str {
        match self {
            Category::Pcp => "piperidina",
            Category::Weed => "iarba",
        }
    }

    /// Column holding this category's total in the persisted record.
    pub fn field(self) -> &'static str {
        match self {
            Category::Pcp => "pcp_total",
            Category::Weed => "weed_total",
        }
    }
}

/// The sole persisted aggregate: one running total per category.
///
/// Invariant: both totals are non-negative. There is exactly one record per
/// deployment; the store adapter owns it and the engine never caches it
/// across calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub pcp_total: i64,
    pub weed_total: i64,
}

impl LedgerRecord {
    /// The record a reset writes: both totals back to zero.
    pub fn zeroed() -> Self {
        Self::default()
    }

    pub fn total_for(&self, category: Category) -> i64 {
        match category {
            Category::Pcp => self.pcp_total,
            Category::Weed => self.weed_total,
        }
    }

    pub fn with_total(mut self, category: Category, value: i64) -> Self {
        match category {
            Category::Pcp => self.pcp_total = value,
            Category::Weed => self.weed_total = value,
        }
        self
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger total would become negative")]
    NegativeResult,
    #[error("ledger total overflow")]
    Overflow,
}

/// `current + delta`, rejecting a negative result. Normal operation never
/// decrements.
pub fn apply_delta(current: i64, delta: i64) -> Result<i64, LedgerError> {
    let next = current.checked_add(delta).ok_or(LedgerError::Overflow)?;
    if next < 0 {
        return Err(LedgerError::NegativeResult);
    }
    Ok(next)
}

/// Per-category totals plus their sum, as reported by `!suma`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsReport {
    pub pcp: i64,
    pub weed: i64,
    pub combined: i64,
}

impl TotalsReport {
    pub fn from_record(record: &LedgerRecord) -> Self {
        Self {
            pcp: record.pcp_total,
            weed: record.weed_total,
            combined: record.pcp_total + record.weed_total,
        }
    }
}
