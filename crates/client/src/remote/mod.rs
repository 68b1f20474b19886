//! Remote read service boundary.
//!
//! ### Contract
//! - `GET <base_url><endpoint>?<query>`
//! - Success: `200 { "success": true, "data": <payload> }`
//! - Failure: non-2xx status, or `{ "success": false, "detail": "..." }`
//!
//! Transport failures map to `Error::Network`, every failure shape with a
//! response maps to `Error::Server`. No retries are attempted.

pub mod envelope;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::Value;
use url::Url;

use opsdash_core::{AppConfig, Error, QueryDescriptor};

pub use envelope::Envelope;

/// Read-only access to the dashboard's remote data.
#[async_trait]
pub trait ReadService: Send + Sync {
    /// Fetch the payload for a query.
    async fn read(&self, query: &QueryDescriptor) -> Result<Value, Error>;
}

/// Configuration for the HTTP read service.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL the endpoint paths are appended to.
    pub base_url: String,
    /// Request timeout (default: 20s)
    pub timeout: Duration,
    /// User agent string (default: "opsdash/0.1")
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for HttpConfig {
    fn from(config: &AppConfig) -> Self {
        Self { base_url: config.base_url.clone(), timeout: config.timeout(), user_agent: config.user_agent.clone() }
    }
}

/// reqwest-backed [`ReadService`].
#[derive(Debug, Clone)]
pub struct HttpReadService {
    http: Client,
    base_url: String,
}

impl HttpReadService {
    /// Create a new read service with the given configuration.
    pub fn new(config: HttpConfig) -> Result<Self, Error> {
        Url::parse(&config.base_url).map_err(|e| Error::InvalidInput(format!("invalid base URL: {e}")))?;

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string() })
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, Error> {
        let path = if endpoint.starts_with('/') { endpoint.to_string() } else { format!("/{endpoint}") };
        Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| Error::InvalidInput(format!("invalid endpoint {endpoint}: {e}")))
    }
}

#[async_trait]
impl ReadService for HttpReadService {
    async fn read(&self, query: &QueryDescriptor) -> Result<Value, Error> {
        let start = Instant::now();
        let url = self.endpoint_url(query.endpoint())?;

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "application/json")
            .query(&query.query_pairs())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Network(format!("request to {} timed out", query.endpoint()))
                } else {
                    Error::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        tracing::debug!(
            endpoint = query.endpoint(),
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "read service responded"
        );

        envelope::parse(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> HttpReadService {
        HttpReadService::new(HttpConfig { base_url: server.uri(), ..Default::default() }).unwrap()
    }

    #[test]
    fn test_http_config_default() {
        let config = HttpConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.timeout, Duration::from_millis(20_000));
        assert_eq!(config.user_agent, "opsdash/0.1");
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        let result = HttpReadService::new(HttpConfig { base_url: "::nope".into(), ..Default::default() });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_read_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/metrics/sla"))
            .and(query_param("base", "X"))
            .and(query_param("cities", "Lima"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"on_time": 41}})))
            .expect(1)
            .mount(&server)
            .await;

        let query = QueryDescriptor::new("/api/metrics/sla").with("base", "X").with("cities", json!(["Lima"]));
        let value = service(&server).read(&query).await.unwrap();
        assert_eq!(value, json!({"on_time": 41}));
    }

    #[tokio::test]
    async fn test_read_success_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cities"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": false, "detail": "base not found"})),
            )
            .mount(&server)
            .await;

        let err = service(&server).read(&QueryDescriptor::new("/api/cities")).await.unwrap_err();
        assert_eq!(err, Error::Server { status: Some(200), detail: "base not found".into() });
    }

    #[tokio::test]
    async fn test_read_non_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = service(&server).read(&QueryDescriptor::new("/api/drivers")).await.unwrap_err();
        assert_eq!(err, Error::Server { status: Some(503), detail: "HTTP 503".into() });
    }

    #[tokio::test]
    async fn test_read_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/metrics/sla"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "data": {}}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = HttpConfig { base_url: server.uri(), timeout: Duration::from_millis(100), ..Default::default() };
        let service = HttpReadService::new(config).unwrap();
        let err = service.read(&QueryDescriptor::new("/api/metrics/sla")).await.unwrap_err();
        assert_eq!(err, Error::Network("request to /api/metrics/sla timed out".into()));
    }

    #[tokio::test]
    async fn test_read_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let service = HttpReadService::new(HttpConfig { base_url: uri, ..Default::default() }).unwrap();
        let err = service.read(&QueryDescriptor::new("/api/drivers")).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let service =
            HttpReadService::new(HttpConfig { base_url: "https://ops.example.com/v2/".into(), ..Default::default() })
                .unwrap();
        assert_eq!(service.endpoint_url("/api/cities").unwrap().as_str(), "https://ops.example.com/v2/api/cities");
        assert_eq!(service.endpoint_url("api/cities").unwrap().as_str(), "https://ops.example.com/v2/api/cities");
    }
}
