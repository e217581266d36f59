//! Cache key derivation.
//!
//! Every memoized producer maps its call arguments to a [`CacheKey`] through
//! a [`KeyResolver`]. The default, [`JsonKey`], serializes the arguments with
//! `serde_json`, so structurally equal arguments share a cache entry.

use std::fmt;

use serde::Serialize;

use super::error::KeyError;

/// Key under which a producer result is cached.
pub type CacheKey = String;

/// Maps call arguments to a cache key.
pub trait KeyResolver<A>: Send + Sync {
    /// Derives the key for `args`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when no key can be derived.
    fn resolve(&self, args: &A) -> Result<CacheKey, KeyError>;
}

/// Structural key: the `serde_json` serialization of the arguments.
///
/// # Examples
///
/// ```rust
/// use settle::memo::{JsonKey, KeyResolver};
///
/// let key = JsonKey.resolve(&("user", 42)).unwrap();
/// assert_eq!(key, r#"["user",42]"#);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonKey;

impl<A: Serialize> KeyResolver<A> for JsonKey {
    fn resolve(&self, args: &A) -> Result<CacheKey, KeyError> {
        Ok(serde_json::to_string(args)?)
    }
}

/// Key computed by a closure.
///
/// # Examples
///
/// ```rust
/// use settle::memo::{FnKey, KeyResolver};
///
/// let by_id = FnKey::new(|user: &(u32, String)| user.0.to_string());
/// assert_eq!(by_id.resolve(&(7, "ignored".to_string())).unwrap(), "7");
/// ```
#[derive(Clone, Copy)]
pub struct FnKey<F>(F);

impl<F> FnKey<F> {
    /// Wraps `function` as a key resolver.
    pub const fn new(function: F) -> Self {
        Self(function)
    }
}

impl<A, F> KeyResolver<A> for FnKey<F>
where
    F: Fn(&A) -> CacheKey + Send + Sync,
{
    fn resolve(&self, args: &A) -> Result<CacheKey, KeyError> {
        Ok((self.0)(args))
    }
}

impl<F> fmt::Debug for FnKey<F> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("FnKey(..)")
    }
}
