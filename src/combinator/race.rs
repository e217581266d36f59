use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::Contestants;
use crate::task::Task;

/// Settles with whichever task settles first, fulfilled or rejected.
///
/// The first settlement is adopted verbatim; every later one is ignored. A
/// pre-settled task wins on the first poll, so racing an eager value against
/// pending work resolves to the eager value immediately.
///
/// # Empty Input
///
/// Racing an empty collection never settles. This is intentional: among zero
/// contestants there is no first settlement, so the output waits forever. Do
/// not "fix" it by rejecting on empty input; callers who need a bound should
/// race against a timer task.
///
/// # Examples
///
/// ```rust
/// use futures::FutureExt;
/// use settle::combinator::race;
/// use settle::task::Task;
///
/// # futures::executor::block_on(async {
/// let winner = race(vec![Task::<i32, ()>::never(), Task::fulfilled(7)]).await;
/// assert_eq!(winner, Ok(7));
///
/// let empty = race(Vec::<Task<i32, ()>>::new());
/// assert_eq!(empty.now_or_never(), None);
/// # });
/// ```
pub fn race<T, E, I>(tasks: I) -> Race<T, E>
where
    I: IntoIterator<Item = Task<T, E>>,
{
    Race {
        contestants: Contestants::new(tasks),
        finished: false,
    }
}

/// Future returned by [`race`].
#[must_use = "futures do nothing unless polled"]
pub struct Race<T, E> {
    contestants: Contestants<T, E>,
    finished: bool,
}

// Settled values are moved out, never pinned in place.
impl<T, E> Unpin for Race<T, E> {}

impl<T, E> Future for Race<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.finished, "Race polled after completion");

        match this.contestants.poll_next(context) {
            Poll::Ready(Some((index, result))) => {
                tracing::trace!(
                    combinator = "race",
                    index,
                    fulfilled = result.is_ok(),
                    "settled"
                );
                this.finished = true;
                Poll::Ready(result)
            }
            // No contestants left to wake us: the race with no entrants never ends.
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> fmt::Debug for Race<T, E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Race")
            .field("total", &self.contestants.len())
            .field("finished", &self.finished)
            .finish()
    }
}
