//! Tri-state outcome for one correlation token.

use crate::Error;

/// What became of one correlated request.
///
/// `Value` and `Failure` are produced by the dispatcher and travel through the
/// notification channel. `TimedOut` is never delivered; a join synthesizes it
/// for tokens still pending when its deadline fires.
#[derive(Debug)]
pub enum CorrelatedResult<T> {
    Value(T),
    Failure(Error),
    TimedOut,
}

impl<T> CorrelatedResult<T> {
    /// Build an outcome from a call result.
    pub fn from_result(result: crate::Result<T>) -> Self {
        match result {
            Ok(value) => CorrelatedResult::Value(value),
            Err(e) => CorrelatedResult::Failure(e),
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, CorrelatedResult::Value(_))
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CorrelatedResult::Value(_) => "value",
            CorrelatedResult::Failure(_) => "failure",
            CorrelatedResult::TimedOut => "timed out",
        }
    }

    pub fn value(self) -> Option<T> {
        match self {
            CorrelatedResult::Value(v) => Some(v),
            CorrelatedResult::Failure(_) | CorrelatedResult::TimedOut => None,
        }
    }
}
