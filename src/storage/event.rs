use crate::codec::Value;

/// Which of the service's stores a change went through.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoreScope {
    Default,
    Large,
    Cache,
}

/// A change made through one of the service's stores.
#[derive(Clone, Debug, PartialEq)]
pub struct StorageEvent {
    pub scope: StoreScope,
    /// Key as the caller named it (no namespace prefix). `None` for a clear.
    pub key: Option<String>,
    /// Value after the change. `None` for a removal or a clear.
    pub new_value: Option<Value>,
}

impl StorageEvent {
    pub fn is_clear(&self) -> bool {
        self.key.is_none()
    }
}
