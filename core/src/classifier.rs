//! Failure classification for [`CircuitBreaker::call`](crate::CircuitBreaker::call)
//!
//! Decides whether an error returned by a wrapped operation is reported to
//! the window as a failure. An ignored error is reported like a completed
//! call, so it still counts as slow when it took too long.

use std::any::Any;
use std::time::Duration;

/// What `call()` knows about an operation that returned `Err`
#[derive(Debug)]
pub struct FailureContext<'a> {
    pub circuit_name: &'a str,
    /// The `E` value from the closure's `Result<T, E>`, type-erased
    pub error: &'a dyn Any,
    /// Wall time the operation ran before erroring
    pub duration: Duration,
}

impl FailureContext<'_> {
    /// The error as `E`, or `None` when the closure returned another type
    pub fn error_as<E: 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }
}

/// Verdict on errors seen by `call()`
///
/// # Examples
///
/// ```rust
/// use breaker_window::{FailureClassifier, FailureContext};
/// use std::io;
///
/// /// A missing resource says nothing about the health of the backend
/// #[derive(Debug)]
/// struct IgnoreNotFound;
///
/// impl FailureClassifier for IgnoreNotFound {
///     fn is_failure(&self, ctx: &FailureContext<'_>) -> bool {
///         ctx.error_as::<io::Error>()
///             .is_none_or(|e| e.kind() != io::ErrorKind::NotFound)
///     }
/// }
/// ```
pub trait FailureClassifier: Send + Sync + std::fmt::Debug {
    /// `false` reports the call as if it had succeeded
    fn is_failure(&self, ctx: &FailureContext<'_>) -> bool;
}

/// Counts every error; what `call()` does when no classifier is set
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn is_failure(&self, _ctx: &FailureContext<'_>) -> bool {
        true
    }
}

/// Adapts a closure into a [`FailureClassifier`]
pub struct PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> FailureClassifier for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn is_failure(&self, ctx: &FailureContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn context<'a>(error: &'a dyn Any, duration: Duration) -> FailureContext<'a> {
        FailureContext {
            circuit_name: "inventory",
            error,
            duration,
        }
    }

    #[test]
    fn test_default_classifier_counts_any_error() {
        let timeout = io::Error::from(io::ErrorKind::TimedOut);

        assert!(DefaultClassifier.is_failure(&context(&timeout, Duration::ZERO)));
        assert!(DefaultClassifier.is_failure(&context(&42u16, Duration::from_secs(3))));
    }

    #[test]
    fn test_io_error_kinds() {
        let classifier = PredicateClassifier::new(|ctx| {
            ctx.error_as::<io::Error>().is_none_or(|e| {
                !matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                )
            })
        });

        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        let missing = io::Error::from(io::ErrorKind::NotFound);
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);

        assert!(classifier.is_failure(&context(&refused, Duration::from_millis(2))));
        assert!(!classifier.is_failure(&context(&missing, Duration::from_millis(2))));
        assert!(!classifier.is_failure(&context(&denied, Duration::from_millis(2))));
        // Not an io::Error at all
        assert!(classifier.is_failure(&context(&"boom", Duration::ZERO)));
    }

    #[test]
    fn test_error_as_matches_exact_type() {
        let status: u16 = 503;
        let ctx = context(&status, Duration::ZERO);

        assert_eq!(ctx.error_as::<u16>(), Some(&503));
        assert!(ctx.error_as::<u32>().is_none());
        assert_eq!(ctx.circuit_name, "inventory");
    }

    #[test]
    fn test_only_errors_after_deadline_count() {
        let deadline = Duration::from_millis(250);
        let classifier = PredicateClassifier::new(move |ctx| ctx.duration >= deadline);

        assert!(!classifier.is_failure(&context(&"reset", Duration::from_millis(40))));
        assert!(classifier.is_failure(&context(&"reset", Duration::from_millis(250))));
        assert_eq!(format!("{:?}", classifier), "PredicateClassifier { .. }");
    }
}
