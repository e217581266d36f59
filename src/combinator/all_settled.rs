use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::Contestants;
use crate::settlement::Settlement;
use crate::task::Task;

/// Waits for every task to settle and reports each outcome.
///
/// The output never fails: it yields one [`Settlement`] per input, in input
/// order, once every task has either fulfilled or rejected. An empty input
/// yields an empty vector on the first poll.
///
/// # Examples
///
/// ```rust
/// use settle::combinator::all_settled;
/// use settle::settlement::Settlement;
/// use settle::task::Task;
///
/// # futures::executor::block_on(async {
/// let outcomes = all_settled(vec![Task::fulfilled(1), Task::<i32, &str>::rejected("no")]).await;
/// assert_eq!(outcomes, vec![Settlement::fulfilled(1), Settlement::rejected("no")]);
/// # });
/// ```
pub fn all_settled<T, E, I>(tasks: I) -> AllSettled<T, E>
where
    I: IntoIterator<Item = Task<T, E>>,
{
    let contestants = Contestants::new(tasks);
    let slots = std::iter::repeat_with(|| None)
        .take(contestants.len())
        .collect();
    AllSettled {
        contestants,
        slots,
        finished: false,
    }
}

/// Future returned by [`all_settled`].
#[must_use = "futures do nothing unless polled"]
pub struct AllSettled<T, E> {
    contestants: Contestants<T, E>,
    slots: Vec<Option<Settlement<T, E>>>,
    finished: bool,
}

// Settled values are moved out, never pinned in place.
impl<T, E> Unpin for AllSettled<T, E> {}

impl<T, E> Future for AllSettled<T, E> {
    type Output = Vec<Settlement<T, E>>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.finished, "AllSettled polled after completion");

        loop {
            match this.contestants.poll_next(context) {
                Poll::Ready(Some((index, result))) => {
                    this.slots[index] = Some(Settlement::from(result));
                }
                Poll::Ready(None) => {
                    tracing::trace!(
                        combinator = "all_settled",
                        count = this.slots.len(),
                        "settled"
                    );
                    this.finished = true;
                    let slots = std::mem::take(&mut this.slots);
                    return Poll::Ready(slots.into_iter().flatten().collect());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T, E> fmt::Debug for AllSettled<T, E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AllSettled")
            .field("total", &self.contestants.len())
            .field(
                "settled",
                &self.slots.iter().filter(|slot| slot.is_some()).count(),
            )
            .field("finished", &self.finished)
            .finish()
    }
}
