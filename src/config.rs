use std::path::PathBuf;

use url::Url;

use crate::errors::{Result, StorageError};

const DEFAULT_USER_AGENT: &str = "NewTabStore/0.1";
const DEFAULT_ORIGIN: &str = "http://localhost";

/// Port of the sibling key/value service, relative to the dashboard origin.
pub const DEFAULT_REMOTE_PORT: u16 = 8255;
/// Path of the key/value resource on the sibling service.
pub const DEFAULT_REMOTE_PATH: &str = "/config";
/// Browsers hand out roughly this much local storage per origin.
pub const DEFAULT_LOCAL_QUOTA_BYTES: usize = 5 * 1024 * 1024;
/// Local flag that survives a quota wipe.
pub const OPT_OUT_KEY: &str = "_sentry-opt-out";

/// Which bulk backend sits underneath the default store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// The remote key/value service at [`StoreConfig::remote_base_url`].
    Remote,
    /// An in-process map, nothing survives the process.
    Memory,
}

/// Physical area underneath the local-storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAreaKind {
    Memory,
    JsonFile(PathBuf),
    Sqlite(PathBuf),
}

/// Configuration for the storage service and the stores it wires up.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Origin the dashboard is served from. Only scheme and host are used.
    pub origin: Url,
    /// Port of the remote key/value service
    pub remote_port: u16,
    /// Path of the remote key/value resource
    pub remote_path: String,
    /// User agent string for HTTP requests
    pub user_agent: String,
    pub backend: BackendKind,
    pub local_area: LocalAreaKind,
    /// Byte quota of the local area, `None` for unlimited
    pub local_quota_bytes: Option<usize>,
    /// Wipe-and-retry once when a local write hits the quota
    pub quota_recovery: bool,
    /// Local keys kept across a quota wipe
    pub preserved_keys: Vec<String>,
    /// Namespace of the large-value store inside the default store
    pub large_prefix: String,
    /// Namespace of the cache store inside local storage
    pub cache_prefix: String,
    /// Longest `X-Keys` header the remote backend will send
    pub max_keys_header_len: usize,
    /// Capacity of the change-event channel
    pub event_channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            remote_port: DEFAULT_REMOTE_PORT,
            remote_path: DEFAULT_REMOTE_PATH.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            backend: BackendKind::Remote,
            local_area: LocalAreaKind::Memory,
            local_quota_bytes: Some(DEFAULT_LOCAL_QUOTA_BYTES),
            quota_recovery: true,
            preserved_keys: vec![OPT_OUT_KEY.to_string()],
            large_prefix: "large-".to_string(),
            cache_prefix: "_".to_string(),
            max_keys_header_len: 4096,
            event_channel_capacity: 64,
        }
    }
}

impl StoreConfig {
    /// Parses `origin` and uses it as the dashboard origin.
    pub fn with_origin(mut self, origin: &str) -> Result<Self> {
        self.origin = Url::parse(origin)
            .map_err(|e| StorageError::InvalidConfig(format!("origin {origin:?}: {e}")))?;
        Ok(self)
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_local_area(mut self, area: LocalAreaKind) -> Self {
        self.local_area = area;
        self
    }

    pub fn with_local_quota(mut self, quota: Option<usize>) -> Self {
        self.local_quota_bytes = quota;
        self
    }

    /// Base URL of the remote key/value service: `<scheme>://<host>:<port><path>`.
    ///
    /// Port and path of the origin itself are ignored.
    pub fn remote_base_url(&self) -> Result<Url> {
        let host = self.origin.host_str().ok_or_else(|| {
            StorageError::InvalidConfig(format!("origin {} has no host", self.origin))
        })?;

        // IPv6 literals come back without brackets from host_str()
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };

        let raw = format!(
            "{}://{}:{}{}",
            self.origin.scheme(),
            host,
            self.remote_port,
            self.remote_path
        );
        Url::parse(&raw).map_err(|e| StorageError::InvalidConfig(format!("remote url {raw:?}: {e}")))
    }
}
