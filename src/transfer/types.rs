//! Transfer Core Types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::state::TransactionStatus;
use crate::account::AccountId;

/// Transaction ID - ULID-based unique identifier
///
/// Monotonic and sortable, no coordination needed between processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Inbound transfer request (already shaped by the request layer)
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub payer_id: AccountId,
    pub payee_id: AccountId,
    pub amount: Decimal,
    pub description: Option<String>,
}

impl TransferRequest {
    pub fn new(payer_id: AccountId, payee_id: AccountId, amount: Decimal) -> Self {
        Self {
            payer_id,
            payee_id,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Durable record of one transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub payer_id: AccountId,
    pub payee_id: AccountId,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// New record in `Pending` status
    pub fn pending(req: &TransferRequest, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            payer_id: req.payer_id,
            payee_id: req.payee_id,
            amount,
            status: TransactionStatus::Pending,
            description: req.description.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this record moved to `status`
    pub fn with_status(&self, status: TransactionStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Per-account transaction statistics (`GET /transactions/account/{id}/stats`)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountStats {
    /// Sum of completed transfers sent
    pub total_sent: Decimal,
    /// Sum of completed transfers received
    pub total_received: Decimal,
    pub total_transactions_sent: u64,
    pub total_transactions_received: u64,
    pub pending_transactions: u64,
}

impl AccountStats {
    /// Fold one transaction into the stats of `account_id`
    pub fn accumulate(&mut self, account_id: AccountId, tx: &TransactionRecord) {
        let completed = tx.status == TransactionStatus::Completed;
        let involved = tx.payer_id == account_id || tx.payee_id == account_id;

        if tx.payer_id == account_id {
            self.total_transactions_sent += 1;
            if completed {
                self.total_sent += tx.amount;
            }
        }
        if tx.payee_id == account_id {
            self.total_transactions_received += 1;
            if completed {
                self.total_received += tx.amount;
            }
        }
        if involved && tx.status == TransactionStatus::Pending {
            self.pending_transactions += 1;
        }
    }
}

/// Filters for the transaction listing; every field is optional and ANDed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub payer_id: Option<AccountId>,
    pub payee_id: Option<AccountId>,
    /// Inclusive, compared against the UTC date of `created_at`
    pub date_from: Option<NaiveDate>,
    /// Inclusive, compared against the UTC date of `created_at`
    pub date_to: Option<NaiveDate>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &TransactionRecord) -> bool {
        let day = tx.created_at.date_naive();
        self.status.is_none_or(|s| tx.status == s)
            && self.payer_id.is_none_or(|id| tx.payer_id == id)
            && self.payee_id.is_none_or(|id| tx.payee_id == id)
            && self.date_from.is_none_or(|from| day >= from)
            && self.date_to.is_none_or(|to| day <= to)
    }

    /// Canonical query string, identical for equivalent requests
    pub fn canonical_query(&self, page: PageRequest) -> String {
        let mut parts = vec![
            format!("page={}", page.page),
            format!("per_page={}", page.per_page),
        ];
        if let Some(status) = self.status {
            parts.push(format!("status={}", status));
        }
        if let Some(id) = self.payer_id {
            parts.push(format!("payer_id={}", id));
        }
        if let Some(id) = self.payee_id {
            parts.push(format!("payee_id={}", id));
        }
        if let Some(from) = self.date_from {
            parts.push(format!("date_from={}", from));
        }
        if let Some(to) = self.date_to {
            parts.push(format!("date_to={}", to));
        }
        parts.join("&")
    }
}

/// 1-based page selection for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: u32 = 15;
    pub const MAX_PER_PAGE: u32 = 100;

    /// Missing or zero values fall back to page 1 / the default size;
    /// `per_page` is capped at [`Self::MAX_PER_PAGE`]
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            per_page: per_page
                .filter(|n| *n > 0)
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .min(Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of transactions, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionPage {
    pub data: Vec<TransactionRecord>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub last_page: u32,
}

impl TransactionPage {
    pub fn new(data: Vec<TransactionRecord>, total: u64, page: PageRequest) -> Self {
        let pages = total.div_ceil(u64::from(page.per_page.max(1))).max(1);
        Self {
            data,
            total,
            page: page.page,
            per_page: page.per_page,
            last_page: u32::try_from(pages).unwrap_or(u32::MAX),
        }
    }
}
