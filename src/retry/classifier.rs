use crate::error::{ErrorClass, FlightdeckError};

/// Maps a failure to its retry class.
///
/// Deliberately a pure `(error) -> ErrorClass` seam rather than structural
/// inspection: the default implementation matches keywords in the failure
/// message, and a backend that returns typed errors can swap in its own
/// classifier (any `Fn(&FlightdeckError) -> ErrorClass` qualifies).
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &FlightdeckError) -> ErrorClass;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&FlightdeckError) -> ErrorClass + Send + Sync,
{
    fn classify(&self, error: &FlightdeckError) -> ErrorClass {
        self(error)
    }
}

/// Default heuristic classifier: structured error variants map directly,
/// everything else goes through message keyword matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl ErrorClassifier for KeywordClassifier {
    fn classify(&self, error: &FlightdeckError) -> ErrorClass {
        error.class()
    }
}
