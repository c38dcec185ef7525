//! Transaction Status
//!
//! Status IDs are stored as SMALLINT in `transactions.status`.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Transaction status
///
/// `Pending` is the only non-terminal state:
///
/// ```text
/// PENDING → COMPLETED
///    ↓
///  FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TransactionStatus {
    /// Created inside the transfer unit, balances not yet committed
    Pending = 0,

    /// Terminal: balances moved and committed
    Completed = 10,

    /// Terminal: processing failed after authorization, no balances moved
    Failed = -10,
}

impl TransactionStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Status transitions are one-directional and only leave `Pending`
    #[inline]
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Completed)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransactionStatus::Pending),
            10 => Some(TransactionStatus::Completed),
            -10 => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("Unknown transaction status: {}", other)),
        }
    }
}

impl TryFrom<i16> for TransactionStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransactionStatus::from_id(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_transitions_only_leave_pending() {
        use TransactionStatus::*;

        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_invalid_status_id() {
        assert!(TransactionStatus::from_id(5).is_none());
        assert!(TransactionStatus::try_from(-99).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransactionStatus::Pending.to_string(), "pending");
        assert_eq!(TransactionStatus::Completed.to_string(), "completed");
        assert_eq!(TransactionStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_parse_status_name() {
        assert_eq!(
            "completed".parse::<TransactionStatus>(),
            Ok(TransactionStatus::Completed)
        );
        assert_eq!("pending".parse::<TransactionStatus>(), Ok(TransactionStatus::Pending));
        assert!("COMPLETED".parse::<TransactionStatus>().is_err());
        assert!("done".parse::<TransactionStatus>().is_err());
    }
}
