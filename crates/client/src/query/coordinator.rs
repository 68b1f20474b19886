//! Per-query fetch coordination.
//!
//! A [`FetchCoordinator`] owns one logical query: it debounces parameter
//! changes, consults the shared [`TtlCache`], calls the [`ReadService`] on a
//! miss, and publishes `{data, loading, error}` through a watch channel.
//!
//! Every settled parameter set gets a new sequence number. A resolution is
//! committed only if its sequence is still the latest one; sequence
//! allocation, that check and publication share one lock so the ordering holds
//! on a multi-threaded runtime too. Superseded requests are also cancelled
//! through a per-sequence token, which drops the in-flight transport future.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use opsdash_core::{CacheKey, Debouncer, Error, InvalidationBus, QueryDescriptor, TtlCache};

use super::state::{Phase, QueryOptions, QueryState};
use crate::remote::ReadService;

/// Handle to one live query.
///
/// Dropping the handle tears the query down: the debounce timer and driver
/// task are aborted and any in-flight resolution is discarded.
pub struct FetchCoordinator<P, T> {
    inner: Arc<Inner<T>>,
    debouncer: Debouncer<P>,
    driver: JoinHandle<()>,
}

pub(crate) struct Deps {
    pub service: Arc<dyn ReadService>,
    pub cache: Arc<TtlCache>,
    pub bus: Arc<InvalidationBus>,
}

impl<P, T> FetchCoordinator<P, T>
where
    P: Serialize + Clone + PartialEq + Send + Sync + 'static,
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Start a query. The initial params are processed without delay.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn start(endpoint: String, params: P, options: QueryOptions, deps: Deps) -> Self {
        let observed_signal = deps.bus.current();
        let signal_rx = deps.bus.subscribe();
        let inner = Arc::new(Inner {
            endpoint,
            options,
            service: deps.service,
            cache: deps.cache,
            bus: deps.bus,
            state: watch::Sender::new(QueryState::default()),
            progress: Mutex::new(Progress {
                sequence: 0,
                observed_signal,
                current: None,
                token: CancellationToken::new(),
                debounced_from: None,
            }),
        });

        let debouncer = Debouncer::new(params.clone(), options.debounce);
        if let Some(ticket) = inner.begin_settled(QueryDescriptor::from_params(&inner.endpoint, &params)) {
            tokio::spawn(inner.clone().resolve(ticket));
        }
        let driver = tokio::spawn(drive(inner.clone(), debouncer.subscribe(), signal_rx, params));

        Self { inner, debouncer, driver }
    }

    /// Feed new raw params; they are queried once they stop changing.
    pub fn set_params(&self, params: P) {
        self.debouncer.set(params);
        self.inner.mark_debouncing();
    }

    /// Change the debounce delay; a pending change waits the new delay.
    pub fn set_debounce(&self, delay: std::time::Duration) {
        self.debouncer.set_delay(delay);
    }

    /// Snapshot of the published state.
    pub fn state(&self) -> QueryState<T> {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every published state change.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.state.subscribe()
    }

    /// Wait for the next state with nothing in flight.
    pub async fn settled(&self) -> QueryState<T> {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(QueryState::is_terminal).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        }
    }

    /// Drop this query's cache entry and re-run it now, bypassing debounce.
    pub fn invalidate(&self) {
        if let Some(ticket) = self.inner.begin_current(false, true) {
            tokio::spawn(self.inner.clone().resolve(ticket));
        }
    }

    /// Re-run the current query with a forced cache miss.
    ///
    /// Resolves once the fetch has been committed or discarded.
    pub async fn refetch(&self) {
        if let Some(ticket) = self.inner.begin_current(true, false) {
            if let Err(e) = tokio::spawn(self.inner.clone().resolve(ticket)).await {
                tracing::warn!(endpoint = %self.inner.endpoint, error = %e, "refetch task failed");
            }
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }
}

impl<P, T> Drop for FetchCoordinator<P, T> {
    fn drop(&mut self) {
        // The debouncer aborts its own timer when it drops.
        self.driver.abort();
        self.inner.teardown();
    }
}

struct Inner<T> {
    endpoint: String,
    options: QueryOptions,
    service: Arc<dyn ReadService>,
    cache: Arc<TtlCache>,
    bus: Arc<InvalidationBus>,
    state: watch::Sender<QueryState<T>>,
    progress: Mutex<Progress>,
}

struct Progress {
    /// Highest sequence allocated; only its resolution may publish.
    sequence: u64,
    /// Invalidation signal value this instance last fetched under.
    observed_signal: u64,
    /// Descriptor of the latest settled, non-blank params.
    current: Option<QueryDescriptor>,
    token: CancellationToken,
    /// Phase to restore if debouncing settles on unchanged params.
    debounced_from: Option<Phase>,
}

/// Everything a resolution needs, captured when its sequence is allocated.
struct Ticket {
    sequence: u64,
    descriptor: QueryDescriptor,
    key: CacheKey,
    signal: u64,
    forced: bool,
    token: CancellationToken,
}

type Outcome<T> = Result<(T, Option<Value>), Error>;

impl<T> Inner<T> {
    fn teardown(&self) {
        let mut progress = self.progress.lock();
        progress.token.cancel();
        progress.sequence += 1;
        tracing::debug!(endpoint = %self.endpoint, "query torn down");
    }
}

impl<T> Inner<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn allocate(&self, progress: &mut Progress) -> u64 {
        progress.token.cancel();
        progress.token = CancellationToken::new();
        progress.sequence += 1;
        tracing::debug!(endpoint = %self.endpoint, sequence = progress.sequence, "sequence allocated");
        progress.sequence
    }

    /// Start processing a freshly settled parameter set.
    ///
    /// Params that cannot be normalized publish an error state and issue no
    /// request: without a descriptor there is no query string to send, so a
    /// cache-bypassing direct fetch is not possible.
    fn begin_settled(&self, descriptor: Result<QueryDescriptor, Error>) -> Option<Ticket> {
        let mut progress = self.progress.lock();
        let sequence = self.allocate(&mut progress);
        progress.debounced_from = None;

        match descriptor {
            Err(err) => {
                tracing::error!(endpoint = %self.endpoint, error = %err, "query params cannot be normalized");
                progress.current = None;
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(err.to_string());
                    s.phase = Phase::Error;
                    s.sequence = sequence;
                });
                None
            }
            Ok(descriptor) if self.is_empty_query(&descriptor) => {
                tracing::debug!(endpoint = %self.endpoint, sequence, "no filter selected; skipping query");
                progress.current = None;
                self.state.send_replace(QueryState { phase: Phase::Settled, sequence, ..Default::default() });
                None
            }
            Ok(descriptor) => {
                progress.current = Some(descriptor);
                self.ticket(&mut progress, sequence, false)
            }
        }
    }

    /// No filter selected, or a required filter left blank.
    fn is_empty_query(&self, descriptor: &QueryDescriptor) -> bool {
        (descriptor.is_blank() && !self.options.allow_empty) || descriptor.lacks_any(self.options.required)
    }

    /// Re-run the current settled params under a new sequence.
    ///
    /// A parameter change still debouncing keeps the published phase at
    /// `Debouncing`; the re-run only updates what that phase falls back to.
    fn begin_current(&self, force: bool, evict: bool) -> Option<Ticket> {
        let mut progress = self.progress.lock();
        let descriptor = progress.current.as_ref()?;
        if evict {
            self.cache.invalidate(&descriptor.cache_key());
        }
        let sequence = self.allocate(&mut progress);
        self.ticket(&mut progress, sequence, force)
    }

    fn ticket(&self, progress: &mut Progress, sequence: u64, force: bool) -> Option<Ticket> {
        let descriptor = progress.current.clone()?;
        let signal = self.bus.current();
        let forced = force || signal != progress.observed_signal;
        self.state.send_modify(|s| {
            s.sequence = sequence;
            enter(progress, s, Phase::CacheCheck);
        });
        Some(Ticket {
            sequence,
            key: descriptor.cache_key(),
            descriptor,
            signal,
            forced,
            token: progress.token.clone(),
        })
    }

    async fn resolve(self: Arc<Self>, ticket: Ticket) {
        if !ticket.forced
            && let Some(data) = self.read_cache(&ticket)
        {
            self.commit(&ticket, Ok((data, None)));
            return;
        }

        if !self.mark_fetching(ticket.sequence) {
            return;
        }

        let result = tokio::select! {
            _ = ticket.token.cancelled() => {
                let err = Error::Cancelled { sequence: ticket.sequence };
                tracing::debug!(endpoint = %self.endpoint, error = %err, "request abandoned");
                return;
            }
            result = self.service.read(&ticket.descriptor) => result,
        };

        let outcome = result.and_then(|value| {
            let data = serde_json::from_value::<T>(value.clone())?;
            Ok((data, Some(value)))
        });
        self.commit(&ticket, outcome);
    }

    fn read_cache(&self, ticket: &Ticket) -> Option<T> {
        let cached = self.cache.get_entry(&ticket.key)?;
        if cached.signal != ticket.signal {
            tracing::debug!(
                key = %ticket.key.fingerprint(),
                stored = cached.signal,
                current = ticket.signal,
                "cached value predates invalidation"
            );
            return None;
        }
        match serde_json::from_value::<T>(cached.value) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(key = %ticket.key.fingerprint(), error = %e, "cached payload does not decode; refetching");
                self.cache.invalidate(&ticket.key);
                None
            }
        }
    }

    fn mark_fetching(&self, sequence: u64) -> bool {
        let mut progress = self.progress.lock();
        if progress.sequence != sequence {
            return false;
        }
        self.state.send_modify(|s| {
            s.loading = true;
            enter(&mut progress, s, Phase::Fetching);
        });
        true
    }

    /// Publish a resolution if its sequence is still current.
    fn commit(&self, ticket: &Ticket, outcome: Outcome<T>) {
        let mut progress = self.progress.lock();
        if progress.sequence != ticket.sequence {
            let err = Error::Cancelled { sequence: ticket.sequence };
            tracing::debug!(endpoint = %self.endpoint, latest = progress.sequence, error = %err, "discarding stale response");
            return;
        }

        match outcome {
            Ok((data, fresh)) => {
                if let Some(value) = fresh {
                    self.cache.set_with_signal(ticket.key.clone(), value, ticket.signal);
                    progress.observed_signal = ticket.signal;
                }
                self.state.send_modify(|s| {
                    s.data = Some(data);
                    s.loading = false;
                    s.error = None;
                    s.sequence = ticket.sequence;
                    enter(&mut progress, s, Phase::Settled);
                });
            }
            Err(err) if err.is_user_visible() => {
                tracing::warn!(endpoint = %self.endpoint, sequence = ticket.sequence, error = %err, "query failed");
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(err.to_string());
                    enter(&mut progress, s, Phase::Error);
                });
            }
            Err(_) => {}
        }
    }

    fn mark_debouncing(&self) {
        let mut progress = self.progress.lock();
        self.state.send_if_modified(|s| {
            if s.phase == Phase::Debouncing {
                return false;
            }
            progress.debounced_from = Some(s.phase);
            s.phase = Phase::Debouncing;
            true
        });
    }

    /// Debouncing settled on the params already being served.
    fn restore_phase(&self) {
        let mut progress = self.progress.lock();
        let previous = progress.debounced_from.take();
        self.state.send_if_modified(|s| {
            if s.phase != Phase::Debouncing {
                return false;
            }
            s.phase = previous.unwrap_or(Phase::Settled);
            true
        });
    }
}

/// Move to `phase`, unless a pending parameter change holds the state in
/// `Debouncing`; then `phase` is what debouncing falls back to.
fn enter<T>(progress: &mut Progress, state: &mut QueryState<T>, phase: Phase) {
    if state.phase == Phase::Debouncing && progress.debounced_from.is_some() {
        progress.debounced_from = Some(phase);
    } else {
        state.phase = phase;
    }
}

/// Route settled params and invalidation bumps into new sequences.
async fn drive<P, T>(
    inner: Arc<Inner<T>>, mut settled: watch::Receiver<P>, mut signal: watch::Receiver<u64>, mut last: P,
) where
    P: Serialize + Clone + PartialEq + Send + Sync + 'static,
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let live = inner.options.refetch_on_invalidation;
    loop {
        let ticket = tokio::select! {
            changed = settled.changed() => {
                if changed.is_err() {
                    return;
                }
                let params = settled.borrow_and_update().clone();
                if params == last {
                    inner.restore_phase();
                    continue;
                }
                let descriptor = QueryDescriptor::from_params(&inner.endpoint, &params);
                last = params;
                inner.begin_settled(descriptor)
            }
            changed = signal.changed(), if live => {
                if changed.is_err() {
                    return;
                }
                let value = *signal.borrow_and_update();
                tracing::debug!(endpoint = %inner.endpoint, signal = value, "invalidation observed; re-running query");
                inner.begin_current(false, false)
            }
        };

        if let Some(ticket) = ticket {
            tokio::spawn(inner.clone().resolve(ticket));
        }
    }
}
