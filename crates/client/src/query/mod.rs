//! Query client: the entry point views use to open live queries.
//!
//! A [`QueryClient`] holds what every query shares: the read service, the
//! invalidation bus, and one [`TtlCache`] per distinct TTL. Coordinators opened
//! with the same TTL therefore hit each other's entries.

mod coordinator;
mod state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use opsdash_core::{AppConfig, Error, InvalidationBus, TtlCache};

use crate::endpoints::EndpointFamily;
use crate::remote::{HttpConfig, HttpReadService, ReadService};

pub use coordinator::FetchCoordinator;
pub use state::{DEFAULT_DEBOUNCE, Phase, QueryOptions, QueryState};

use coordinator::Deps;

/// Shared context for every query in a session.
pub struct QueryClient {
    service: Arc<dyn ReadService>,
    bus: Arc<InvalidationBus>,
    caches: Mutex<HashMap<Duration, Arc<TtlCache>>>,
    config: AppConfig,
}

impl QueryClient {
    pub fn new(service: Arc<dyn ReadService>, config: AppConfig) -> Self {
        Self::with_bus(service, config, Arc::new(InvalidationBus::new()))
    }

    /// Share an existing bus, e.g. with a mutation layer.
    pub fn with_bus(service: Arc<dyn ReadService>, config: AppConfig, bus: Arc<InvalidationBus>) -> Self {
        Self { service, bus, caches: Mutex::new(HashMap::new()), config }
    }

    /// Client backed by [`HttpReadService`] built from `config`.
    pub fn from_config(config: AppConfig) -> Result<Self, Error> {
        let service = HttpReadService::new(HttpConfig::from(&config))?;
        Ok(Self::new(Arc::new(service), config))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The cache shared by all queries using `ttl`, created on first use.
    pub fn cache(&self, ttl: Duration) -> Arc<TtlCache> {
        self.caches.lock().entry(ttl).or_insert_with(|| Arc::new(TtlCache::new(ttl))).clone()
    }

    pub fn bus(&self) -> &Arc<InvalidationBus> {
        &self.bus
    }

    /// Signal that server data changed. Returns the new signal value.
    pub fn bump_invalidation(&self) -> u64 {
        self.bus.bump()
    }

    /// Options using the configured debounce and short TTL.
    pub fn default_options(&self) -> QueryOptions {
        QueryOptions::default().with_ttl(self.config.short_ttl()).with_debounce(self.config.debounce())
    }

    /// Open a live query on `endpoint`.
    ///
    /// The initial params are resolved immediately; later changes go through
    /// [`FetchCoordinator::set_params`]. Must be called within a tokio runtime.
    pub fn query<P, T>(&self, endpoint: impl Into<String>, params: P, options: QueryOptions) -> FetchCoordinator<P, T>
    where
        P: Serialize + Clone + PartialEq + Send + Sync + 'static,
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let deps = Deps { service: self.service.clone(), cache: self.cache(options.ttl), bus: self.bus.clone() };
        FetchCoordinator::start(endpoint.into(), params, options, deps)
    }

    /// Open a live query on a typed endpoint family with its configured TTL.
    pub fn query_family<F, T>(&self, params: F::Params) -> FetchCoordinator<F::Params, T>
    where
        F: EndpointFamily,
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let options =
            self.default_options().with_ttl(self.config.ttl_for(F::TTL_CLASS)).with_required(F::REQUIRED);
        self.query(F::PATH, params, options)
    }

    /// Drop expired entries from every cache. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        self.caches.lock().values().map(|cache| cache.purge_expired()).sum()
    }

    /// Drop cached entries for an endpoint from every cache.
    pub fn invalidate_endpoint(&self, endpoint: &str) -> usize {
        self.caches.lock().values().map(|cache| cache.invalidate_endpoint(endpoint)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::endpoints::{BaseParams, CityList, DriverList, FilterParams, SlaMetrics};
    use opsdash_core::QueryDescriptor;

    struct Echo;

    #[async_trait]
    impl ReadService for Echo {
        async fn read(&self, query: &QueryDescriptor) -> Result<Value, Error> {
            Ok(json!({"endpoint": query.endpoint()}))
        }
    }

    fn client() -> QueryClient {
        QueryClient::new(Arc::new(Echo), AppConfig::default())
    }

    #[test]
    fn test_caches_shared_per_ttl() {
        let client = client();
        let a = client.cache(Duration::from_secs(60));
        let b = client.cache(Duration::from_secs(60));
        let c = client.cache(Duration::from_secs(120));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_default_options_follow_config() {
        let config = AppConfig { debounce_ms: 50, ..Default::default() };
        let client = QueryClient::new(Arc::new(Echo), config);
        let options = client.default_options();
        assert_eq!(options.debounce, Duration::from_millis(50));
        assert_eq!(options.ttl, opsdash_core::SHORT_TTL);
    }

    #[test]
    fn test_bump_invalidation() {
        let client = client();
        assert_eq!(client.bump_invalidation(), 1);
        assert_eq!(client.bus().current(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_family_uses_class_ttl() {
        let client = client();

        let cities = client.query_family::<CityList, Value>(BaseParams { base: Some("X".into()) });
        cities.settled().await;
        let metrics = client.query_family::<SlaMetrics, Value>(FilterParams::for_base("X"));
        metrics.settled().await;

        let long = client.cache(client.config().long_ttl());
        let short = client.cache(client.config().short_ttl());
        assert_eq!(long.len(), 1);
        assert_eq!(short.len(), 1);
        assert_eq!(metrics.state().data, Some(json!({"endpoint": "/api/metrics/sla"})));

        assert_eq!(client.invalidate_endpoint("/api/cities"), 1);
        assert!(long.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_family_skips_query_without_base() {
        let client = client();
        let drivers = client.query_family::<DriverList, Value>(FilterParams::default().with_cities(["Lima"]));
        let state = drivers.settled().await;
        assert_eq!(state.data, None);
        assert_eq!(state.error, None);
        assert_eq!(state.phase, Phase::Settled);
        assert!(client.cache(client.config().short_ttl()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_spans_caches() {
        let client = client();
        let metrics = client.query_family::<SlaMetrics, Value>(FilterParams::for_base("X"));
        metrics.settled().await;

        tokio::time::advance(client.config().short_ttl()).await;
        assert_eq!(client.purge_expired(), 1);
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = AppConfig { base_url: "not a url".into(), ..Default::default() };
        assert!(matches!(QueryClient::from_config(config), Err(Error::InvalidInput(_))));
    }
}
