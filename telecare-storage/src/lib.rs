//! Telecare Storage
//!
//! In-process state and the narrow collaborator interfaces the resilience
//! layer talks to:
//!
//! - [`TtlCache`]: bounded key/value store with per-entry expiry and tags
//! - [`PatientStore`]: persistence collaborator (`get_by_id`, `update`, ...)
//! - [`Messenger`]: text-message delivery collaborator

pub mod cache;
pub mod messaging;
pub mod patient;

pub use cache::{CacheStats, TtlCache, DEFAULT_CACHE_CAPACITY};
pub use messaging::{
    Messenger, RecordingMessenger, SentMessage, UnconfiguredMessenger, NO_GATEWAY_REASON,
};
pub use patient::{InMemoryPatientStore, PatientRecord, PatientStore};
