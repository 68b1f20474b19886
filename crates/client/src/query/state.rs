//! Published query state and per-query options.

use std::time::Duration;

use serde::Serialize;

use opsdash_core::SHORT_TTL;

/// Default quiet period before a filter change is queried.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Where a coordinator is in its request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Debouncing,
    CacheCheck,
    Fetching,
    Settled,
    Error,
}

/// The `{data, loading, error}` triple a view renders, plus the phase and
/// sequence that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
    pub phase: Phase,
    pub sequence: u64,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self { data: None, loading: false, error: None, phase: Phase::Idle, sequence: 0 }
    }
}

impl<T> QueryState<T> {
    /// Resolved, successfully or not, with nothing in flight.
    pub fn is_terminal(&self) -> bool {
        !self.loading && matches!(self.phase, Phase::Settled | Phase::Error)
    }
}

/// Per-query options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Lifetime of cached payloads; picks the shared cache instance.
    pub ttl: Duration,
    pub debounce: Duration,
    /// Issue the query even when no filter is selected.
    pub allow_empty: bool,
    /// Params that must be non-blank for the query to be issued at all.
    pub required: &'static [&'static str],
    /// Re-run the current query as soon as the invalidation bus is bumped.
    pub refetch_on_invalidation: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { ttl: SHORT_TTL, debounce: DEFAULT_DEBOUNCE, allow_empty: false, required: &[], refetch_on_invalidation: true }
    }
}

impl QueryOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    pub fn with_required(mut self, required: &'static [&'static str]) -> Self {
        self.required = required;
        self
    }

    pub fn refetch_on_invalidation(mut self, enabled: bool) -> Self {
        self.refetch_on_invalidation = enabled;
        self
    }
}
