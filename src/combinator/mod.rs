//! Aggregation combinators over collections of tasks.
//!
//! Each combinator takes a finite collection of [`Task`]s and returns one
//! future whose completion follows a distinct policy:
//!
//! | Combinator | Fulfills | Rejects | Empty input |
//! |------------|----------|---------|-------------|
//! | [`all`] | every task fulfilled (values in input order) | first rejection | `Ok(vec![])` |
//! | [`all_settled`] | every task settled | never | `vec![]` |
//! | [`any`] | first fulfillment | every task rejected ([`AggregateFailure`](crate::settlement::AggregateFailure)) | `Err` with no reasons |
//! | [`race`] | first settlement, if a fulfillment | first settlement, if a rejection | never settles |
//!
//! # Ordering
//!
//! Output positions always follow input positions. Settlement order only
//! affects when an aggregate completes, never where a value lands.
//!
//! Pre-settled tasks ([`Task::fulfilled`], [`Task::rejected`]) are observed
//! on the first poll, in input order, before any pending task is polled.
//!
//! # Cancellation
//!
//! No combinator cancels the tasks it observes. Once an aggregate has
//! settled it stops looking at the remaining tasks. Tasks created with
//! [`Task::spawn`] keep running on the runtime with their results discarded;
//! in-place futures are only driven while the aggregate is polled and are
//! dropped with it. There is no built-in timeout: race the aggregate against
//! a timer task instead.

mod all;
mod all_settled;
mod any;
mod race;

pub use all::{All, all};
pub use all_settled::{AllSettled, all_settled};
pub use any::{Any, any};
pub use race::{Race, race};

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{FuturesUnordered, StreamExt};

use crate::task::Task;

// =============================================================================
// Indexed Task
// =============================================================================

/// A task tagged with its position in the input collection.
struct Indexed<T, E> {
    index: usize,
    task: Task<T, E>,
}

impl<T, E> Future for Indexed<T, E> {
    type Output = (usize, Result<T, E>);

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.task)
            .poll(context)
            .map(|result| (this.index, result))
    }
}

// =============================================================================
// Contestants
// =============================================================================

/// The input collection of a combinator, yielding settlements as they occur.
///
/// Pre-settled tasks are split off at construction so they are yielded
/// first and in input order; the rest are polled through
/// `FuturesUnordered`, which only polls tasks that have been woken.
pub(crate) struct Contestants<T, E> {
    eager: VecDeque<(usize, Result<T, E>)>,
    pending: FuturesUnordered<Indexed<T, E>>,
    total: usize,
}

impl<T, E> Contestants<T, E> {
    pub(crate) fn new<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = Task<T, E>>,
    {
        let mut eager = VecDeque::new();
        let pending = FuturesUnordered::new();
        let mut total = 0;

        for (index, task) in tasks.into_iter().enumerate() {
            match task.into_settled() {
                Ok(result) => eager.push_back((index, result)),
                Err(task) => pending.push(Indexed { index, task }),
            }
            total += 1;
        }

        Self {
            eager,
            pending,
            total,
        }
    }

    /// Number of tasks in the original input.
    pub(crate) const fn len(&self) -> usize {
        self.total
    }

    /// Yields the next settlement, or `None` once every task has settled.
    pub(crate) fn poll_next(
        &mut self,
        context: &mut Context<'_>,
    ) -> Poll<Option<(usize, Result<T, E>)>> {
        if let Some(settled) = self.eager.pop_front() {
            return Poll::Ready(Some(settled));
        }
        self.pending.poll_next_unpin(context)
    }
}
