//! Data models for accounts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier.
///
/// Totally ordered: the transfer core locks account rows in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl AccountId {
    #[inline]
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Account role (capability flag)
///
/// Role IDs are stored as SMALLINT in `accounts.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum AccountRole {
    /// Regular account: may send and receive
    SenderCapable = 1,
    /// Merchant account: may only receive
    ReceiverOnly = 2,
}

impl AccountRole {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AccountRole::SenderCapable),
            2 => Some(AccountRole::ReceiverOnly),
            _ => None,
        }
    }

    /// Whether an account with this role may be the payer of a transfer
    #[inline]
    pub fn can_send(&self) -> bool {
        matches!(self, AccountRole::SenderCapable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::SenderCapable => "sender_capable",
            AccountRole::ReceiverOnly => "receiver_only",
        }
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Balance-holding account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// Contact address used by the notifier
    pub email: String,
    pub role: AccountRole,
    /// Never negative
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn has_sufficient_balance(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

/// Balance-only view (`GET /accounts/{id}/balance`)
#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub account_id: AccountId,
    pub balance: Decimal,
}

impl From<&Account> for BalanceView {
    fn from(a: &Account) -> Self {
        Self {
            account_id: a.id,
            balance: a.balance,
        }
    }
}
