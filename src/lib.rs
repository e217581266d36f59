//! # settle
//!
//! Promise-style completion policies for Rust futures, plus an async
//! memoization layer that caches, deduplicates and refreshes the results of
//! an asynchronous producer.
//!
//! ## Overview
//!
//! - **Task**: [`Task<T, E>`](task::Task), a handle to one asynchronous unit of
//!   work producing `Result<T, E>`. Eager values are pre-settled tasks.
//! - **Settlement**: [`Settlement<T, E>`](settlement::Settlement), the terminal
//!   outcome of a task, and [`AggregateFailure<E>`](settlement::AggregateFailure).
//! - **Combinators**: [`all`](combinator::all), [`all_settled`](combinator::all_settled),
//!   [`any`](combinator::any) and [`race`](combinator::race).
//! - **Memoization**: [`Memoized`](memo::Memoized), [`BoundedMemoized`](memo::BoundedMemoized),
//!   [`DedupMemoized`](memo::DedupMemoized) and [`RefreshingMemoized`](memo::RefreshingMemoized).
//!
//! ## Feature Flags
//!
//! - `combinator`: The four aggregation combinators (default)
//! - `memo`: Memoized producers (default, implies `spawn`)
//! - `spawn`: [`Task::spawn`](task::Task::spawn) on the ambient tokio runtime
//! - `serde`: Serialization of [`Settlement`](settlement::Settlement) records
//! - `full`: Enable all features
//!
//! ## Example
//!
//! ```rust
//! use settle::prelude::*;
//!
//! # futures::executor::block_on(async {
//! let tasks = vec![
//!     Task::<i32, &str>::fulfilled(1),
//!     Task::fulfilled(2),
//!     Task::fulfilled(3),
//! ];
//! assert_eq!(all(tasks).await, Ok(vec![1, 2, 3]));
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types and functions.
///
/// # Usage
///
/// ```rust
/// use settle::prelude::*;
/// ```
pub mod prelude {
    pub use crate::settlement::{AggregateFailure, Settlement, Status};
    pub use crate::task::Task;

    #[cfg(feature = "combinator")]
    pub use crate::combinator::{all, all_settled, any, race};

    #[cfg(feature = "memo")]
    pub use crate::memo::{
        BoundedMemoized, DedupMemoized, MemoBuilder, MemoConfig, Memoized, RefreshThreshold,
        RefreshingMemoized,
    };
}

pub mod settlement;
pub mod task;

#[cfg(feature = "combinator")]
pub mod combinator;

#[cfg(feature = "memo")]
pub mod memo;
