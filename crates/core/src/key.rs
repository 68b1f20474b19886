//! Canonical cache keys for query descriptors.
//!
//! A [`QueryDescriptor`] is an endpoint plus a bag of parameters. Two
//! descriptors with the same endpoint and the same parameter values produce
//! the same [`CacheKey`] regardless of field order or array element order.
//!
//! ### Encoding
//! - Null (absent) values are dropped, at every nesting level.
//! - Parameter names are sorted lexicographically.
//! - Values use their JSON text; arrays are sorted by element encoding and
//!   objects by key.
//! - Layout: `endpoint?k1=v1&k2=v2`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::Error;

/// Canonical string identity of a query.
///
/// The endpoint length is kept alongside the text, so an endpoint that itself
/// contains `?` still splits correctly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    text: String,
    endpoint_len: usize,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Endpoint portion of the key.
    pub fn endpoint(&self) -> &str {
        &self.text[..self.endpoint_len]
    }

    /// Short SHA-256 fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// The semantic identity of a query: an endpoint and its normalized params.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    endpoint: String,
    params: BTreeMap<String, Value>,
}

impl QueryDescriptor {
    /// Create a descriptor with no parameters.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), params: BTreeMap::new() }
    }

    /// Build a descriptor from any serializable key/value params.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if `params` cannot be serialized, and
    /// `Error::InvalidInput` if it does not serialize to an object (or unit).
    pub fn from_params<P: Serialize + ?Sized>(endpoint: &str, params: &P) -> Result<Self, Error> {
        let value = serde_json::to_value(params)?;
        let mut descriptor = Self::new(endpoint);
        match value {
            Value::Object(map) => {
                for (name, value) in map {
                    descriptor = descriptor.with(name, value);
                }
            }
            Value::Null => {}
            other => {
                return Err(Error::InvalidInput(format!(
                    "query params for {endpoint} must be a key/value object, got {}",
                    kind(&other)
                )));
            }
        }
        Ok(descriptor)
    }

    /// Add a parameter. Null values are treated as absent.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = strip_nulls(value.into());
        let name = name.into();
        if value.is_null() {
            self.params.remove(&name);
        } else {
            self.params.insert(name, value);
        }
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// True when no filter is selected: no params, or only blank ones.
    pub fn is_blank(&self) -> bool {
        self.params.values().all(is_blank_value)
    }

    /// True if any of `names` is absent or blank.
    pub fn lacks_any(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.params.get(*name).is_none_or(is_blank_value))
    }

    /// Canonical cache key for this descriptor.
    pub fn cache_key(&self) -> CacheKey {
        let pairs: Vec<String> =
            self.params.iter().map(|(name, value)| format!("{name}={}", canonical(value))).collect();
        CacheKey { text: format!("{}?{}", self.endpoint, pairs.join("&")), endpoint_len: self.endpoint.len() }
    }

    /// Request query pairs in normalized order.
    ///
    /// Arrays expand to one pair per element; nested objects use their
    /// canonical encoding.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (name, value) in &self.params {
            match value {
                Value::Array(items) => {
                    let mut encoded: Vec<String> = items.iter().map(scalar_text).collect();
                    encoded.sort();
                    pairs.extend(encoded.into_iter().map(|v| (name.clone(), v)));
                }
                other => pairs.push((name.clone(), scalar_text(other))),
            }
        }
        pairs
    }
}

/// Compute the cache key for an endpoint and serializable params.
pub fn cache_key<P: Serialize + ?Sized>(endpoint: &str, params: &P) -> Result<CacheKey, Error> {
    Ok(QueryDescriptor::from_params(endpoint, params)?.cache_key())
}

fn is_blank_value(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

fn canonical(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let mut encoded: Vec<String> = items.iter().map(canonical).collect();
            encoded.sort();
            format!("[{}]", encoded.join(","))
        }
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let encoded: Vec<String> = fields
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical(v)))
                .collect();
            format!("{{{}}}", encoded.join(","))
        }
        scalar => scalar.to_string(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => canonical(value),
        scalar => scalar.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
