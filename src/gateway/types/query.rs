//! Query-string types for listing endpoints

use chrono::NaiveDate;
use serde::Deserialize;

use super::response::ApiError;
use crate::account::AccountId;
use crate::transfer::{PageRequest, TransactionFilter, TransactionStatus};

/// `GET /api/v1/transactions` query parameters
///
/// Dates are `YYYY-MM-DD` and inclusive. `per_page` defaults to 15 and is
/// capped at 100.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionListQuery {
    pub status: Option<String>,
    pub payer_id: Option<i64>,
    pub payee_id: Option<i64>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl TransactionListQuery {
    pub fn into_filter(self) -> Result<(TransactionFilter, PageRequest), ApiError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<TransactionStatus>)
            .transpose()
            .map_err(ApiError::bad_request)?;

        let filter = TransactionFilter {
            status,
            payer_id: self.payer_id.map(AccountId),
            payee_id: self.payee_id.map(AccountId),
            date_from: parse_date("date_from", self.date_from.as_deref())?,
            date_to: parse_date("date_to", self.date_to.as_deref())?,
        };
        Ok((filter, PageRequest::new(self.page, self.per_page)))
    }
}

fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ApiError::bad_request(format!("Invalid {}: {}", field, s)))
    })
    .transpose()
}
