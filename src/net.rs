//! HTTP plumbing for the remote key/value backend.
//!
//! The remote backend never talks to reqwest directly. It builds a
//! [`Request`] and hands it to an [`HttpTransport`], which makes the round
//! trip and returns a fully buffered [`Response`]. [`ReqwestTransport`] is
//! the production transport; tests plug in their own to record requests.
use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, Method};

use crate::errors::Result;

mod fetch;
mod response;

pub use fetch::ReqwestTransport;
pub use response::Response;

/// Name of the header carrying the JSON-encoded key selector.
pub const KEYS_HEADER: &str = "x-keys";

/// A buffered HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: url::Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: url::Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        Self {
            method,
            url,
            headers,
            body: None,
        }
    }

    /// Value of the `X-Keys` header, if one is set.
    pub fn keys_header(&self) -> Option<&str> {
        self.headers.get(KEYS_HEADER).and_then(|v| v.to_str().ok())
    }
}

/// Performs one HTTP round trip.
///
/// Only transport-level failures are errors; any status code, including
/// 4xx/5xx, comes back as a [`Response`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

#[cfg(test)]
pub(crate) mod testing;
