use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::Contestants;
use crate::settlement::AggregateFailure;
use crate::task::Task;

/// Waits for the first task to fulfill.
///
/// The output fulfills with the first value produced; later settlements are
/// ignored. It rejects only once every task has rejected, with an
/// [`AggregateFailure`] whose reasons are in input order. An empty input
/// rejects with an empty `AggregateFailure` on the first poll.
///
/// The failure is assembled only after every input has settled, so each
/// position of [`AggregateFailure::reasons`] holds the reason of the task at
/// that position. If one task never settles while the others reject, the
/// output stays pending.
///
/// # Examples
///
/// ```rust
/// use settle::combinator::any;
/// use settle::task::Task;
///
/// # futures::executor::block_on(async {
/// let first = any(vec![Task::rejected("a"), Task::fulfilled("b"), Task::rejected("c")]).await;
/// assert_eq!(first, Ok("b"));
///
/// let failure = any(vec![Task::<(), _>::rejected("a"), Task::rejected("b")]).await.unwrap_err();
/// assert_eq!(failure.reasons(), &["a", "b"]);
/// # });
/// ```
pub fn any<T, E, I>(tasks: I) -> Any<T, E>
where
    I: IntoIterator<Item = Task<T, E>>,
{
    let contestants = Contestants::new(tasks);
    let reasons = std::iter::repeat_with(|| None)
        .take(contestants.len())
        .collect();
    Any {
        contestants,
        reasons,
        finished: false,
    }
}

/// Future returned by [`any`].
#[must_use = "futures do nothing unless polled"]
pub struct Any<T, E> {
    contestants: Contestants<T, E>,
    reasons: Vec<Option<E>>,
    finished: bool,
}

// Settled values are moved out, never pinned in place.
impl<T, E> Unpin for Any<T, E> {}

impl<T, E> Future for Any<T, E> {
    type Output = Result<T, AggregateFailure<E>>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.finished, "Any polled after completion");

        loop {
            match this.contestants.poll_next(context) {
                Poll::Ready(Some((index, Ok(value)))) => {
                    tracing::trace!(combinator = "any", index, "fulfilled");
                    this.finished = true;
                    return Poll::Ready(Ok(value));
                }
                Poll::Ready(Some((index, Err(reason)))) => this.reasons[index] = Some(reason),
                Poll::Ready(None) => {
                    tracing::trace!(
                        combinator = "any",
                        count = this.reasons.len(),
                        "rejected"
                    );
                    this.finished = true;
                    let reasons = std::mem::take(&mut this.reasons);
                    return Poll::Ready(Err(AggregateFailure::new(
                        reasons.into_iter().flatten().collect(),
                    )));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T, E> fmt::Debug for Any<T, E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Any")
            .field("total", &self.contestants.len())
            .field(
                "rejected",
                &self.reasons.iter().filter(|slot| slot.is_some()).count(),
            )
            .field("finished", &self.finished)
            .finish()
    }
}
