//! Process-wide choice of the error that describes a cancelled wait.
//!
//! The installed type is read at the moment cancellation is observed, not when a wait starts,
//! so replacing it also affects waits that are already in flight. Waits that have already
//! settled keep whatever error they were settled with.

use std::any::type_name;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;

use crate::{AbortError, BoxError};

// Read on every cancellation and written rarely, if ever.
static INSTALLED: LazyLock<ArcSwap<CancellationErrorType>> =
    LazyLock::new(|| ArcSwap::from_pointee(CancellationErrorType::abort()));

/// Constructs the error carried by [`Cancelled`][crate::Cancelled] when a wait is cancelled.
///
/// # Example
///
/// ```rust
/// use events_await::{CancellationErrorType, set_cancellation_error_type};
///
/// #[derive(Debug, Default, thiserror::Error)]
/// #[error("request was withdrawn")]
/// struct Withdrawn;
///
/// set_cancellation_error_type(CancellationErrorType::of::<Withdrawn>());
/// ```
pub struct CancellationErrorType {
    name: &'static str,
    factory: Box<dyn Fn() -> BoxError + Send + Sync>,
}

impl CancellationErrorType {
    /// Creates a cancellation error type from a factory function.
    ///
    /// The factory is called once per cancelled wait.
    #[must_use]
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> BoxError + Send + Sync + 'static,
    {
        Self {
            name: "<custom>",
            factory: Box::new(factory),
        }
    }

    /// Creates a cancellation error type that produces `E::default()`.
    #[must_use]
    pub fn of<E>() -> Self
    where
        E: StdError + Default + Send + Sync + 'static,
    {
        Self {
            name: type_name::<E>(),
            factory: Box::new(|| Box::new(E::default())),
        }
    }

    /// The cancellation error type installed by default, producing [`AbortError`].
    #[must_use]
    pub fn abort() -> Self {
        Self::of::<AbortError>()
    }

    /// Constructs a new error of this type.
    #[must_use]
    pub fn create(&self) -> BoxError {
        (self.factory)()
    }
}

impl Default for CancellationErrorType {
    fn default() -> Self {
        Self::abort()
    }
}

impl fmt::Debug for CancellationErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationErrorType")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The cancellation error type currently installed for the whole process.
#[must_use]
pub fn cancellation_error_type() -> Arc<CancellationErrorType> {
    INSTALLED.load_full()
}

/// Replaces the cancellation error type for the whole process.
///
/// This affects every wait that has not yet been cancelled, including waits already in flight.
pub fn set_cancellation_error_type(error_type: CancellationErrorType) {
    INSTALLED.store(Arc::new(error_type));
}

/// Restores the default cancellation error type, [`AbortError`].
pub fn reset_cancellation_error_type() {
    set_cancellation_error_type(CancellationErrorType::abort());
}
