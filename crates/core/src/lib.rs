//! Core types and shared functionality for opsdash.
//!
//! This crate provides:
//! - Canonical cache keys for query descriptors
//! - In-memory TTL cache
//! - Debounce primitive and invalidation bus
//! - Unified error types
//! - Configuration structures

pub mod bus;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod key;

pub use bus::InvalidationBus;
pub use cache::{Cached, LONG_TTL, SHORT_TTL, TtlCache};
pub use config::{AppConfig, ConfigError, TtlClass};
pub use debounce::Debouncer;
pub use error::Error;
pub use key::{CacheKey, QueryDescriptor};
