//! Terminal outcomes of asynchronous tasks.
//!
//! A [`Settlement`] records how a single task ended: fulfilled with a value
//! or rejected with a reason. Once produced it never changes.
//!
//! [`AggregateFailure`] is the failure produced by [`any`](crate::combinator::any)
//! when every observed task rejected. It carries all reasons in input order,
//! so callers can tell it apart from a plain single rejection by type alone.
//!
//! # Examples
//!
//! ```rust
//! use settle::settlement::{Settlement, Status};
//!
//! let fulfilled: Settlement<i32, String> = Settlement::from(Ok(42));
//! assert_eq!(fulfilled.status(), Status::Fulfilled);
//! assert_eq!(fulfilled.value(), Some(&42));
//!
//! let rejected: Settlement<i32, String> = Settlement::rejected("boom".to_string());
//! assert_eq!(rejected.status().to_string(), "rejected");
//! assert_eq!(rejected.into_result(), Err("boom".to_string()));
//! ```

mod aggregate;

pub use aggregate::AggregateFailure;

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// =============================================================================
// Status
// =============================================================================

/// The tag of a [`Settlement`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Status {
    /// The task produced a value.
    Fulfilled,
    /// The task failed with a reason.
    Rejected,
}

impl fmt::Display for Status {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fulfilled => write!(formatter, "fulfilled"),
            Self::Rejected => write!(formatter, "rejected"),
        }
    }
}

// =============================================================================
// Settlement
// =============================================================================

/// The outcome record of a task.
///
/// With the `serde` feature enabled a settlement serializes as a tagged
/// record, `{"status": "fulfilled", "value": ..}` or
/// `{"status": "rejected", "reason": ..}`.
///
/// # Type Parameters
///
/// - `T`: The value type of a fulfilled task.
/// - `E`: The reason type of a rejected task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "lowercase"))]
pub enum Settlement<T, E> {
    /// The task fulfilled with `value`.
    Fulfilled {
        /// The produced value.
        value: T,
    },
    /// The task rejected with `reason`.
    Rejected {
        /// The failure reason.
        reason: E,
    },
}

impl<T, E> Settlement<T, E> {
    /// Creates a fulfilled settlement.
    pub const fn fulfilled(value: T) -> Self {
        Self::Fulfilled { value }
    }

    /// Creates a rejected settlement.
    pub const fn rejected(reason: E) -> Self {
        Self::Rejected { reason }
    }

    /// Returns the tag of this settlement.
    pub const fn status(&self) -> Status {
        match self {
            Self::Fulfilled { .. } => Status::Fulfilled,
            Self::Rejected { .. } => Status::Rejected,
        }
    }

    /// Returns `true` if the task fulfilled.
    pub const fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled { .. })
    }

    /// Returns `true` if the task rejected.
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns the fulfilled value, if any.
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled { value } => Some(value),
            Self::Rejected { .. } => None,
        }
    }

    /// Returns the rejection reason, if any.
    pub const fn reason(&self) -> Option<&E> {
        match self {
            Self::Fulfilled { .. } => None,
            Self::Rejected { reason } => Some(reason),
        }
    }

    /// Converts the settlement into a `Result`.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Fulfilled { value } => Ok(value),
            Self::Rejected { reason } => Err(reason),
        }
    }

    /// Maps the fulfilled value, leaving a rejection untouched.
    pub fn map<U, F>(self, function: F) -> Settlement<U, E>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Fulfilled { value } => Settlement::Fulfilled {
                value: function(value),
            },
            Self::Rejected { reason } => Settlement::Rejected { reason },
        }
    }

    /// Maps the rejection reason, leaving a fulfilled value untouched.
    pub fn map_reason<F2, F>(self, function: F) -> Settlement<T, F2>
    where
        F: FnOnce(E) -> F2,
    {
        match self {
            Self::Fulfilled { value } => Settlement::Fulfilled { value },
            Self::Rejected { reason } => Settlement::Rejected {
                reason: function(reason),
            },
        }
    }
}

impl<T, E> From<Result<T, E>> for Settlement<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Fulfilled { value },
            Err(reason) => Self::Rejected { reason },
        }
    }
}

impl<T, E> From<Settlement<T, E>> for Result<T, E> {
    fn from(settlement: Settlement<T, E>) -> Self {
        settlement.into_result()
    }
}
