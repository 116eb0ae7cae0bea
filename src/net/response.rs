//! Buffered HTTP response model.
//!
//! Holds the final URL, status code + reason phrase, headers and the raw
//! body bytes of one response. `headers` is an `http::HeaderMap`, so header
//! lookups are case-insensitive.
use http::HeaderMap;
use serde::de::DeserializeOwned;

use crate::errors::Result;

/// Simple structure for HTTP responses.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL of the response (after redirects, if any).
    pub url: url::Url,

    /// Numeric HTTP status code (e.g., `200`, `404`).
    pub status: u16,

    /// Human-readable reason phrase (e.g., `"OK"`, `"Not Found"`).
    ///
    /// May be `"Unknown"` for non-standard codes.
    pub status_text: String,

    /// Response headers as a case-insensitive map.
    pub headers: HeaderMap,

    /// Raw response body bytes.
    pub body: Vec<u8>,
}

impl Response {
    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> Response {
        Response {
            url: url::Url::parse("http://localhost:8255/config").unwrap(),
            status,
            status_text: String::new(),
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn success_range() {
        assert!(response(200, "").is_success());
        assert!(response(204, "").is_success());
        assert!(!response(304, "").is_success());
        assert!(!response(404, "").is_success());
        assert!(!response(500, "").is_success());
    }

    #[test]
    fn parses_json_body() {
        let map: serde_json::Map<String, serde_json::Value> =
            response(200, r#"{"a": 1}"#).json().unwrap();
        assert_eq!(map["a"], serde_json::json!(1));
        assert!(response(200, "not json").json::<serde_json::Value>().is_err());
    }
}
