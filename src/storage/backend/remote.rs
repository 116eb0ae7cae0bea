//! Client for the remote key/value service.
//!
//! Every call is exactly one HTTP round trip against a fixed base URL (by
//! default `<scheme>://<host>:8255/config`, see
//! [`StoreConfig::remote_base_url`](crate::config::StoreConfig::remote_base_url)):
//!
//! | operation | request |
//! | --- | --- |
//! | get all | `GET`, `X-Keys: ""` |
//! | get keys | `GET`, `X-Keys: ["a","b"]` |
//! | set | `POST`, body `{"a": …}` |
//! | remove | `DELETE`, `X-Keys: ["a"]` |
//! | clear | `DELETE`, no `X-Keys` |
//!
//! Headers have practical size limits, so key lists whose JSON would be
//! longer than `max_keys_header_len` are not sent as-is: a read falls back
//! to fetching everything and filters locally, a removal is split into
//! several requests.
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderValue, Method};
use serde_json::{Map, Value as Json};
use url::Url;

use crate::errors::{Result, StorageError};
use crate::net::{HttpTransport, Request, Response, KEYS_HEADER};
use crate::storage::backend::{KeySelector, StorageBackend};

pub const DEFAULT_MAX_KEYS_HEADER_LEN: usize = 4096;

pub struct RemoteBackend {
    url: Url,
    transport: Arc<dyn HttpTransport>,
    max_keys_header_len: usize,
}

impl RemoteBackend {
    pub fn new(url: Url, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            url,
            transport,
            max_keys_header_len: DEFAULT_MAX_KEYS_HEADER_LEN,
        }
    }

    pub fn with_max_keys_header_len(mut self, len: usize) -> Self {
        self.max_keys_header_len = len;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn request(&self, method: Method) -> Request {
        Request::new(method, self.url.clone())
    }

    /// Sends `request`; any non-2xx status becomes [`StorageError::Http`].
    async fn execute(&self, operation: &'static str, request: Request) -> Result<Response> {
        match self.transport.send(request).await {
            Ok(res) if res.is_success() => Ok(res),
            Ok(res) => {
                let err = StorageError::Http {
                    operation,
                    status: res.status,
                    status_text: res.status_text,
                };
                log::error!("[Storage] Error talking to {}: {}", self.url, err);
                Err(err)
            }
            Err(e) => {
                log::error!("[Storage] Error talking to {}: {}", self.url, e);
                Err(e)
            }
        }
    }

    /// Splits `keys` into groups whose header fits the length limit. A key
    /// that is too long on its own still gets its own group.
    fn chunk_keys<'a>(&self, keys: &'a [String]) -> Result<Vec<&'a [String]>> {
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < keys.len() {
            let mut end = start + 1;
            while end < keys.len() && keys_header(&keys[start..=end])?.len() <= self.max_keys_header_len {
                end += 1;
            }
            chunks.push(&keys[start..end]);
            start = end;
        }
        Ok(chunks)
    }
}

/// JSON array of `keys`, with non-ASCII escaped so it is a valid header value.
fn keys_header(keys: &[String]) -> Result<String> {
    let json = serde_json::to_string(keys)?;
    if json.bytes().all(|b| b.is_ascii() && b != 0x7f) {
        return Ok(json);
    }

    let mut out = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        if c.is_ascii() && c != '\x7f' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    Ok(out)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| StorageError::InvalidConfig(format!("invalid X-Keys header: {e}")))
}

#[async_trait]
impl StorageBackend for RemoteBackend {
    async fn get(&self, keys: KeySelector<'_>) -> Result<Map<String, Json>> {
        let header = match keys {
            KeySelector::All => String::new(),
            KeySelector::Keys([]) => return Ok(Map::new()),
            KeySelector::Keys(list) => {
                let header = keys_header(list)?;
                if header.len() > self.max_keys_header_len {
                    log::warn!(
                        "[Storage] {} keys do not fit in X-Keys, fetching all and filtering",
                        list.len()
                    );
                    String::new()
                } else {
                    header
                }
            }
        };

        let mut request = self.request(Method::GET);
        request.headers.insert(KEYS_HEADER, header_value(&header)?);
        let res = self.execute("fetch data", request).await?;

        if res.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        let map = match res.json::<Json>()? {
            Json::Object(map) => map,
            other => {
                return Err(StorageError::InvalidResponse(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        Ok(match keys {
            KeySelector::All => map,
            selector => map.into_iter().filter(|(k, _)| selector.matches(k)).collect(),
        })
    }

    async fn set(&self, items: Map<String, Json>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut request = self.request(Method::POST);
        request.body = Some(serde_json::to_vec(&items)?);
        self.execute("save data", request).await?;
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        for chunk in self.chunk_keys(keys)? {
            let mut request = self.request(Method::DELETE);
            request.headers.insert(KEYS_HEADER, header_value(&keys_header(chunk)?)?);
            self.execute("remove data", request).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.execute("clear data", self.request(Method::DELETE)).await?;
        Ok(())
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::RecordingTransport;
    use serde_json::json;

    fn backend() -> (Arc<RecordingTransport>, RemoteBackend) {
        let transport = Arc::new(RecordingTransport::new());
        let url = Url::parse("http://localhost:8255/config").unwrap();
        (transport.clone(), RemoteBackend::new(url, transport))
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn set_posts_items_as_json_body() {
        let (transport, backend) = backend();
        let items = json!({"a": 1}).as_object().cloned().unwrap();
        backend.set(items).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].url.as_str(), "http://localhost:8255/config");
        assert_eq!(
            requests[0].headers.get("content-type").unwrap(),
            "application/json"
        );
        let body: Json = serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"a": 1}));
    }

    #[tokio::test]
    async fn remove_sends_keys_header() {
        let (transport, backend) = backend();
        backend.remove(&keys(&["a"])).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(requests[0].keys_header(), Some(r#"["a"]"#));
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn clear_deletes_without_keys_header() {
        let (transport, backend) = backend();
        backend.clear().await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::DELETE);
        assert!(requests[0].keys_header().is_none());
    }

    #[tokio::test]
    async fn get_all_sends_empty_selector() {
        let (transport, backend) = backend();
        transport.reply(200, "OK", r#"{"a": 1, "b": {"__type": "undefined", "value": null}}"#);

        let map = backend.get(KeySelector::All).await.unwrap();
        assert_eq!(map.len(), 2);

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].keys_header(), Some(""));
    }

    #[tokio::test]
    async fn get_keys_sends_json_selector() {
        let (transport, backend) = backend();
        transport.reply(200, "OK", r#"{"a": 1}"#);

        let wanted = keys(&["a", "b"]);
        let map = backend.get(KeySelector::Keys(&wanted)).await.unwrap();
        assert_eq!(Json::Object(map), json!({"a": 1}));
        assert_eq!(transport.requests()[0].keys_header(), Some(r#"["a","b"]"#));
    }

    #[tokio::test]
    async fn long_selector_falls_back_to_all_and_filters() {
        let (transport, backend) = backend();
        let backend = backend.with_max_keys_header_len(8);
        transport.reply(200, "OK", r#"{"alpha": 1, "beta": 2, "gamma": 3}"#);

        let wanted = keys(&["alpha", "gamma"]);
        let map = backend.get(KeySelector::Keys(&wanted)).await.unwrap();

        assert_eq!(Json::Object(map), json!({"alpha": 1, "gamma": 3}));
        assert_eq!(transport.requests()[0].keys_header(), Some(""));
    }

    #[tokio::test]
    async fn long_removal_is_split_within_limit() {
        let (transport, backend) = backend();
        // ["k0","k1"] is 11 bytes, three keys would be 16
        let backend = backend.with_max_keys_header_len(12);

        backend
            .remove(&keys(&["k0", "k1", "k2", "k3", "k4"]))
            .await
            .unwrap();

        let headers: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.keys_header().unwrap().to_string())
            .collect();
        assert_eq!(headers, vec![r#"["k0","k1"]"#, r#"["k2","k3"]"#, r#"["k4"]"#]);
    }

    #[tokio::test]
    async fn empty_requests_are_not_sent() {
        let (transport, backend) = backend();
        backend.set(Map::new()).await.unwrap();
        backend.remove(&[]).await.unwrap();
        assert!(backend.get(KeySelector::Keys(&[])).await.unwrap().is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn non_success_status_names_operation() {
        let (transport, backend) = backend();
        transport.reply(503, "Service Unavailable", "");

        let err = backend.clear().await.unwrap_err();
        match &err {
            StorageError::Http { operation, status, status_text } => {
                assert_eq!(*operation, "clear data");
                assert_eq!(*status, 503);
                assert_eq!(status_text, "Service Unavailable");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.to_string(), "Failed to clear data: 503 Service Unavailable");
    }

    #[tokio::test]
    async fn network_errors_propagate_unchanged() {
        let (transport, backend) = backend();
        transport.fail("connection refused");

        let err = backend.get(KeySelector::All).await.unwrap_err();
        assert!(matches!(err, StorageError::Network(ref m) if m == "connection refused"));
    }

    #[tokio::test]
    async fn non_object_body_is_invalid() {
        let (transport, backend) = backend();
        transport.reply(200, "OK", "[1, 2]");

        let err = backend.get(KeySelector::All).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn empty_body_reads_as_empty_map() {
        let (transport, backend) = backend();
        transport.reply(204, "No Content", "");
        assert!(backend.get(KeySelector::All).await.unwrap().is_empty());
    }

    #[test]
    fn non_ascii_keys_are_escaped() {
        let header = keys_header(&keys(&["café"])).unwrap();
        assert_eq!(header, r#"["caf\u00e9"]"#);
        assert!(HeaderValue::from_str(&header).is_ok());

        let parsed: Vec<String> = serde_json::from_str(&header).unwrap();
        assert_eq!(parsed, keys(&["café"]));
    }
}
