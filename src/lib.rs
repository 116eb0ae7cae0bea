//! Storage layer of a customizable "new tab" dashboard.
//!
//! See [`storage`] for the store contract and its backends, [`codec`] for
//! how values are written, and [`config`] for how the process-wide stores
//! are wired.
pub mod codec;
pub mod config;
pub mod errors;
pub mod net;
pub mod storage;

pub use codec::Value;
pub use errors::{Result, StorageError};
pub use storage::{Storage, StorageExt, StorageHandle, StorageService};
