use std::error::Error;
use std::fmt;

/// The failure produced when every task in a collection rejected.
///
/// `reasons()[i]` is the rejection reason of input task `i`. An aggregate
/// failure built from an empty collection has no reasons.
///
/// # Examples
///
/// ```rust
/// use settle::settlement::AggregateFailure;
///
/// let failure = AggregateFailure::new(vec!["a", "b"]);
/// assert_eq!(failure.reasons(), &["a", "b"]);
/// assert_eq!(failure.to_string(), "all 2 tasks were rejected");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateFailure<E> {
    reasons: Vec<E>,
}

impl<E> AggregateFailure<E> {
    /// Creates an aggregate failure from index-aligned reasons.
    pub const fn new(reasons: Vec<E>) -> Self {
        Self { reasons }
    }

    /// Returns the reasons in input order.
    pub fn reasons(&self) -> &[E] {
        &self.reasons
    }

    /// Consumes the failure and returns its reasons.
    pub fn into_reasons(self) -> Vec<E> {
        self.reasons
    }

    /// Number of collected reasons.
    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    /// Returns `true` if the failure came from an empty collection.
    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

impl<E> fmt::Display for AggregateFailure<E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reasons.is_empty() {
            write!(formatter, "no tasks were given, so none could fulfill")
        } else {
            write!(formatter, "all {} tasks were rejected", self.reasons.len())
        }
    }
}

impl<E: fmt::Debug> Error for AggregateFailure<E> {}

impl<E> IntoIterator for AggregateFailure<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.reasons.into_iter()
    }
}
