//! Money types for the API boundary
//!
//! - `StrictDecimal`: format-validated amount input
//! - `TransferBody`: `POST /api/v1/transfer` payload

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::account::AccountId;
use crate::money::parse_amount;
use crate::transfer::TransferRequest;

/// Strict format Decimal - validates format during deserialization
///
/// Accepts a JSON string or number and applies [`parse_amount`] to its
/// textual form:
/// - Rejects `.5` (must be `0.5`)
/// - Rejects `5.` (must be `5.0` or `5`)
/// - Rejects signed values and empty strings
///
/// Positivity, precision and range are business rules checked by the
/// transfer core.
#[derive(Debug, Clone, Copy)]
pub struct StrictDecimal(Decimal);

impl StrictDecimal {
    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl<'de> Deserialize<'de> for StrictDecimal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let raw = match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(D::Error::custom(format!(
                    "amount must be a string or number, got {}",
                    other
                )));
            }
        };

        parse_amount(&raw)
            .map(StrictDecimal)
            .map_err(|e| D::Error::custom(e.to_string()))
    }
}

/// Transfer request body
#[derive(Debug, Deserialize)]
pub struct TransferBody {
    pub payer: i64,
    pub payee: i64,
    pub value: StrictDecimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferBody {
    pub fn into_request(self) -> TransferRequest {
        let req = TransferRequest::new(
            AccountId(self.payer),
            AccountId(self.payee),
            self.value.inner(),
        );
        match self.description {
            Some(d) => req.with_description(d),
            None => req,
        }
    }
}
