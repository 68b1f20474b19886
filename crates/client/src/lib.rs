//! Client side of the operations dashboard.
//!
//! This crate provides the remote read service, typed endpoint families, and
//! the debounced, cached, sequence-guarded query coordinators views render
//! from.

pub mod endpoints;
pub mod query;
pub mod remote;

pub use endpoints::{BaseParams, CityList, DriverList, EndpointFamily, FilterParams, SlaMetrics};
pub use query::{DEFAULT_DEBOUNCE, FetchCoordinator, Phase, QueryClient, QueryOptions, QueryState};
pub use remote::{Envelope, HttpConfig, HttpReadService, ReadService};
