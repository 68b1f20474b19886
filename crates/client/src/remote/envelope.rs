//! Response envelope parsing.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use opsdash_core::Error;

/// Raw `{success, data, detail}` envelope returned by the read service.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    /// Usually a string; validation failures may carry a structured value.
    #[serde(default)]
    pub detail: Option<Value>,
}

impl Envelope {
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Turn a status and body into the payload or a server error.
pub fn parse(status: StatusCode, body: &[u8]) -> Result<Value, Error> {
    let envelope = serde_json::from_slice::<Envelope>(body);

    if !status.is_success() {
        let detail = envelope.ok().and_then(|e| e.detail_text());
        return Err(Error::server(Some(status.as_u16()), detail));
    }

    let envelope = envelope
        .map_err(|e| Error::server(Some(status.as_u16()), Some(format!("invalid response body: {e}"))))?;

    if !envelope.success {
        return Err(Error::server(Some(status.as_u16()), envelope.detail_text()));
    }

    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_success() {
        let body = br#"{"success": true, "data": [{"name": "Lima"}]}"#;
        assert_eq!(parse(StatusCode::OK, body).unwrap(), json!([{"name": "Lima"}]));
    }

    #[test]
    fn test_parse_detail_from_error_status() {
        let body = br#"{"detail": "Not authenticated"}"#;
        let err = parse(StatusCode::UNAUTHORIZED, body).unwrap_err();
        assert_eq!(err, Error::Server { status: Some(401), detail: "Not authenticated".into() });
    }

    #[test]
    fn test_parse_structured_detail() {
        let body = br#"{"detail": [{"loc": ["query", "base"], "msg": "field required"}]}"#;
        let err = parse(StatusCode::UNPROCESSABLE_ENTITY, body).unwrap_err();
        assert!(err.to_string().contains("field required"));
    }

    #[test]
    fn test_parse_missing_success_flag() {
        let err = parse(StatusCode::OK, br#"{"data": 1}"#).unwrap_err();
        assert_eq!(err, Error::Server { status: Some(200), detail: "HTTP 200".into() });
    }

    #[test]
    fn test_parse_invalid_body() {
        let err = parse(StatusCode::OK, b"<html>").unwrap_err();
        assert!(err.to_string().contains("invalid response body"));
    }
}
