/// Result wrapper shared by every typed router operation

use crate::error::{GredisError, GredisResult};
use crate::utils::format_duration;
use std::fmt;
use std::time::Duration;

/// Remaining lifetime of a key as reported by TTL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ttl {
    /// Key does not exist
    #[default]
    Missing,
    /// Key exists without an expiry
    NoExpiry,
    /// Key expires after the given duration
    ExpiresIn(Duration),
}

impl Ttl {
    /// Interpret the integer reply of TTL (-2 missing, -1 persistent)
    pub fn from_seconds(seconds: i64) -> Self {
        match seconds {
            -2 => Ttl::Missing,
            s if s < 0 => Ttl::NoExpiry,
            s => Ttl::ExpiresIn(Duration::from_secs(s as u64)),
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Ttl::ExpiresIn(duration) => Some(*duration),
            _ => None,
        }
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Missing => write!(f, "missing"),
            Ttl::NoExpiry => write!(f, "no expiry"),
            Ttl::ExpiresIn(duration) => write!(f, "expires in {}", format_duration(*duration)),
        }
    }
}

/// Value-or-error of one store operation
///
/// `value()` degrades to the type's zero value so callers that only care
/// about the happy path can stay terse; `error()` and `result()` expose the
/// failure for everyone else.
#[derive(Debug)]
pub struct Outcome<T> {
    inner: GredisResult<T>,
}

impl<T> Outcome<T> {
    pub fn ok(value: T) -> Self {
        Self { inner: Ok(value) }
    }

    pub fn err(error: GredisError) -> Self {
        Self { inner: Err(error) }
    }

    pub fn is_ok(&self) -> bool {
        self.inner.is_ok()
    }

    pub fn error(&self) -> Option<&GredisError> {
        self.inner.as_ref().err()
    }

    /// Borrowing view of the wrapped result
    pub fn result(&self) -> Result<&T, &GredisError> {
        self.inner.as_ref()
    }

    pub fn into_result(self) -> GredisResult<T> {
        self.inner
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        Outcome {
            inner: self.inner.map(f),
        }
    }
}

impl<T: Default> Outcome<T> {
    /// Wrapped value, or `T::default()` on failure
    pub fn value(self) -> T {
        self.inner.unwrap_or_default()
    }
}

impl<T: Clone + Default> Outcome<T> {
    /// Cloned value without consuming the outcome
    pub fn value_cloned(&self) -> T {
        self.inner.as_ref().map(T::clone).unwrap_or_default()
    }
}

impl<T> From<GredisResult<T>> for Outcome<T> {
    fn from(inner: GredisResult<T>) -> Self {
        Self { inner }
    }
}

impl<T> From<Outcome<T>> for GredisResult<T> {
    fn from(outcome: Outcome<T>) -> Self {
        outcome.inner
    }
}
