//! # Portraify Store
//!
//! The bounded entity store and its persistence layer: photo and portrait
//! collections with recency-based truncation, a compressed persistence
//! adapter with two-stage quota recovery, and pluggable key-value backends
//! (in-memory and file-backed) that enforce a hard byte capacity.

pub mod adapter;
pub mod backend;
pub mod models;
pub mod store;

pub use adapter::{CompressedAdapter, PersistError, WriteOutcome};
pub use backend::{BackendError, FileBackend, MemoryBackend, StorageBackend};
pub use models::{
    AppState, GeneratedPortrait, PersistedState, Photo, PortraitDraft, Settings, SettingsPatch,
    Subscription, SubscriptionPatch,
};
pub use store::{EntityStatus, PortraitStore};
