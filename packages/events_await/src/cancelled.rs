use std::error::Error as StdError;

use thiserror::Error;

/// A type-erased error that is safe to move between threads.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The default error used to signal that a wait was cancelled.
///
/// This is what [`Cancelled`] wraps unless a different error type has been installed via
/// [`set_cancellation_error_type()`][crate::set_cancellation_error_type].
#[derive(Clone, Copy, Debug, Default, Eq, Error, PartialEq)]
#[error("Aborted")]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
pub struct AbortError;

/// The wait for an event was cancelled before a qualifying event arrived.
///
/// The concrete error inside is produced by the process-wide cancellation error type that was
/// installed at the moment cancellation was observed, [`AbortError`] by default. Use
/// [`is()`][Self::is] or [`downcast_ref()`][Self::downcast_ref] to inspect it.
///
/// # Example
///
/// ```rust
/// use events_await::{AbortError, Cancelled};
///
/// let cancelled = Cancelled::new(AbortError);
///
/// assert!(cancelled.is::<AbortError>());
/// assert_eq!(cancelled.to_string(), "Aborted");
/// ```
#[derive(Debug, Error)]
#[error("{inner}")]
pub struct Cancelled {
    #[source]
    inner: BoxError,
}

impl Cancelled {
    /// Wraps the error that describes the cancellation.
    #[must_use]
    pub fn new<E>(inner: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            inner: inner.into(),
        }
    }

    /// Builds the error using whatever cancellation error type is installed right now.
    #[must_use]
    pub(crate) fn from_installed_type() -> Self {
        Self {
            inner: crate::cancellation_error_type().create(),
        }
    }

    /// Whether the wrapped error is of type `E`.
    #[must_use]
    pub fn is<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.inner.is::<E>()
    }

    /// The wrapped error as `E`, if it is of that type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// The wrapped error.
    #[must_use]
    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.inner
    }

    /// Consumes the wrapper, returning the wrapped error.
    #[must_use]
    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}
