//! A handle to one unit of asynchronous work.
//!
//! A [`Task<T, E>`] is a future resolving to `Result<T, E>`. It is either
//! pre-settled (an eager value or error that is ready on the first poll) or
//! backed by a boxed future. Treating eager values as a variant of the same
//! type lets the combinators accept mixed collections without sniffing types
//! at runtime.
//!
//! # Evaluation Semantics
//!
//! | Constructor | Runs when |
//! |-------------|-----------|
//! | [`Task::fulfilled`], [`Task::rejected`] | Already settled |
//! | [`Task::new`] | The thunk runs on the first poll |
//! | [`Task::from_future`] | Whenever the wrapped future runs |
//! | [`Task::spawn`] | Immediately, on the tokio runtime |
//! | [`Task::never`] | Never settles |
//!
//! Tasks are driven only while something polls them. A task created with
//! [`Task::spawn`] is the exception: it keeps running to completion even
//! after every handle observing it has been dropped, which is how an
//! aggregate that has already settled leaves its losers running.
//!
//! # Examples
//!
//! ```rust
//! use settle::task::Task;
//!
//! # futures::executor::block_on(async {
//! let eager: Task<i32, String> = Task::fulfilled(1);
//! assert!(eager.is_settled());
//! assert_eq!(eager.await, Ok(1));
//!
//! let deferred: Task<i32, String> = Task::new(|| async { Ok(20 + 1) });
//! assert!(!deferred.is_settled());
//! assert_eq!(deferred.await, Ok(21));
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use pin_project_lite::pin_project;

use crate::settlement::Settlement;

type Thunk<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;

// =============================================================================
// Task Struct Definition
// =============================================================================

pin_project! {
    /// A unit of asynchronous work resolving to `Result<T, E>`.
    ///
    /// `Task` implements `Future` directly and is always `Unpin`, so it can be
    /// awaited, stored in collections and polled through `Pin::new`.
    ///
    /// # Type Parameters
    ///
    /// - `T`: The value produced on fulfillment.
    /// - `E`: The reason produced on rejection.
    pub struct Task<T, E> {
        #[pin]
        state: TaskState<T, E>,
    }
}

pin_project! {
    /// Internal state machine for `Task`.
    ///
    /// - `Settled` -> `Completed` (ready on the first poll)
    /// - `Defer` -> `Running` (the thunk creates the future on the first poll)
    /// - `Running` -> `Completed` (when the inner future completes)
    /// - `Never` stays `Never`
    #[project = TaskStateProj]
    enum TaskState<T, E> {
        Settled {
            result: Option<Result<T, E>>,
        },
        Defer {
            thunk: Option<Thunk<T, E>>,
        },
        Running {
            #[pin]
            future: BoxFuture<'static, Result<T, E>>,
        },
        Never,
        Completed,
    }
}

impl<T, E> Task<T, E> {
    /// Creates a task that is already fulfilled with `value`.
    pub const fn fulfilled(value: T) -> Self {
        Self {
            state: TaskState::Settled {
                result: Some(Ok(value)),
            },
        }
    }

    /// Creates a task that is already rejected with `reason`.
    pub const fn rejected(reason: E) -> Self {
        Self {
            state: TaskState::Settled {
                result: Some(Err(reason)),
            },
        }
    }

    /// Creates a pre-settled task adopting `settlement`.
    pub fn settled(settlement: Settlement<T, E>) -> Self {
        Self {
            state: TaskState::Settled {
                result: Some(settlement.into_result()),
            },
        }
    }

    /// Creates a task that never settles.
    ///
    /// Useful as a contestant in [`race`](crate::combinator::race) or as a
    /// stand-in for work that hangs.
    pub const fn never() -> Self {
        Self {
            state: TaskState::Never,
        }
    }

    /// Returns `true` if the task was created pre-settled and has not been
    /// polled yet.
    pub const fn is_settled(&self) -> bool {
        matches!(self.state, TaskState::Settled { result: Some(_) })
    }

    /// Extracts the result of a pre-settled task, or gives the task back.
    pub(crate) fn into_settled(self) -> Result<Result<T, E>, Self> {
        match self.state {
            TaskState::Settled {
                result: Some(result),
            } => Ok(result),
            state => Err(Self { state }),
        }
    }
}

impl<T: 'static, E: 'static> Task<T, E> {
    /// Creates a deferred task. `action` is invoked on the first poll.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settle::task::Task;
    ///
    /// # futures::executor::block_on(async {
    /// let task: Task<&str, ()> = Task::new(|| async { Ok("done") });
    /// assert_eq!(task.await, Ok("done"));
    /// # });
    /// ```
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            state: TaskState::Defer {
                thunk: Some(Box::new(move || Box::pin(action()))),
            },
        }
    }

    /// Wraps an existing future.
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            state: TaskState::Running {
                future: Box::pin(future),
            },
        }
    }
}

#[cfg(feature = "spawn")]
impl<T: Send + 'static, E: Send + 'static> Task<T, E> {
    /// Spawns `future` onto the current tokio runtime and returns a task
    /// observing it.
    ///
    /// The spawned work is detached: dropping the returned task, or an
    /// aggregate that contains it, does not stop it. A panic inside the
    /// spawned future resumes on the awaiting side. Work cancelled by runtime
    /// shutdown never settles.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        Self::from_future(async move {
            match handle.await {
                Ok(result) => result,
                Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
                Err(_) => std::future::pending().await,
            }
        })
    }
}

impl<T, E> From<Settlement<T, E>> for Task<T, E> {
    fn from(settlement: Settlement<T, E>) -> Self {
        Self::settled(settlement)
    }
}

impl<T, E> From<Result<T, E>> for Task<T, E> {
    fn from(result: Result<T, E>) -> Self {
        Self {
            state: TaskState::Settled {
                result: Some(result),
            },
        }
    }
}

// =============================================================================
// Future Implementation
// =============================================================================

impl<T, E> Future for Task<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        loop {
            match this.state.as_mut().project() {
                TaskStateProj::Settled { result } => {
                    // INVARIANT: a settled task is polled once before moving to Completed
                    let result = result.take().expect(
                        "Task internal error: settled result was already consumed. \
                         This indicates the Task was polled after completion.",
                    );
                    this.state.set(TaskState::Completed);
                    return Poll::Ready(result);
                }
                TaskStateProj::Defer { thunk } => {
                    let thunk = thunk.take().expect(
                        "Task internal error: deferred thunk was already consumed. \
                         This indicates a state machine invariant violation.",
                    );
                    let future = thunk();
                    this.state.set(TaskState::Running { future });
                }
                TaskStateProj::Running { future } => {
                    return match future.poll(context) {
                        Poll::Ready(result) => {
                            this.state.set(TaskState::Completed);
                            Poll::Ready(result)
                        }
                        Poll::Pending => Poll::Pending,
                    };
                }
                TaskStateProj::Never => return Poll::Pending,
                TaskStateProj::Completed => {
                    panic!("Task polled after completion");
                }
            }
        }
    }
}

impl<T, E> fmt::Debug for Task<T, E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            TaskState::Settled { result: Some(_) } => "Settled",
            TaskState::Defer { .. } => "Deferred",
            TaskState::Running { .. } => "Running",
            TaskState::Never => "Never",
            TaskState::Settled { result: None } | TaskState::Completed => "Completed",
        };
        formatter.debug_struct("Task").field("state", &state).finish()
    }
}

static_assertions::assert_impl_all!(Task<i32, String>: Send, Unpin);
static_assertions::assert_impl_all!(Task<std::rc::Rc<i32>, String>: Unpin);
