use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::Contestants;
use crate::task::Task;

/// Waits for every task to fulfill, failing fast on the first rejection.
///
/// The output fulfills with the values in input order once every task has
/// fulfilled. As soon as one task rejects, the output rejects with that
/// reason and the remaining tasks are no longer observed. An empty input
/// fulfills with an empty vector on the first poll.
///
/// # Examples
///
/// ```rust
/// use settle::combinator::all;
/// use settle::task::Task;
///
/// # futures::executor::block_on(async {
/// let values = all(vec![Task::<i32, &str>::fulfilled(1), Task::fulfilled(2), Task::fulfilled(3)]).await;
/// assert_eq!(values, Ok(vec![1, 2, 3]));
///
/// let failed = all(vec![Task::fulfilled(1), Task::rejected("boom"), Task::fulfilled(3)]).await;
/// assert_eq!(failed, Err("boom"));
/// # });
/// ```
pub fn all<T, E, I>(tasks: I) -> All<T, E>
where
    I: IntoIterator<Item = Task<T, E>>,
{
    let contestants = Contestants::new(tasks);
    let values = std::iter::repeat_with(|| None)
        .take(contestants.len())
        .collect();
    All {
        contestants,
        values,
        finished: false,
    }
}

/// Future returned by [`all`].
#[must_use = "futures do nothing unless polled"]
pub struct All<T, E> {
    contestants: Contestants<T, E>,
    values: Vec<Option<T>>,
    finished: bool,
}

// Settled values are moved out, never pinned in place.
impl<T, E> Unpin for All<T, E> {}

impl<T, E> Future for All<T, E> {
    type Output = Result<Vec<T>, E>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.finished, "All polled after completion");

        loop {
            match this.contestants.poll_next(context) {
                Poll::Ready(Some((index, Ok(value)))) => this.values[index] = Some(value),
                Poll::Ready(Some((index, Err(reason)))) => {
                    tracing::trace!(combinator = "all", index, "rejected");
                    this.finished = true;
                    return Poll::Ready(Err(reason));
                }
                Poll::Ready(None) => {
                    tracing::trace!(
                        combinator = "all",
                        count = this.values.len(),
                        "fulfilled"
                    );
                    this.finished = true;
                    let values = std::mem::take(&mut this.values);
                    return Poll::Ready(Ok(values.into_iter().flatten().collect()));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T, E> fmt::Debug for All<T, E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("All")
            .field("total", &self.contestants.len())
            .field(
                "fulfilled",
                &self.values.iter().filter(|slot| slot.is_some()).count(),
            )
            .field("finished", &self.finished)
            .finish()
    }
}
