//! Correlation tokens.
//!
//! A token links an asynchronous reply back to the request that caused it.
//! Tokens come from one atomic counter per registry, so every dispatch site
//! that shares a registry sees strictly increasing, never repeated values.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier for one outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(u64);

impl CorrelationToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "corr-{}", self.0)
    }
}

/// Issues correlation tokens.
///
/// Share one instance (behind an `Arc`) between every dispatcher that feeds
/// the same notification channel.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    counter: AtomicU64,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token distinct from every token issued before or concurrently.
    pub fn issue(&self) -> CorrelationToken {
        CorrelationToken(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Number of tokens issued so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}
