//! Telecare Core - Shared Types
//!
//! Data types shared by every Telecare crate: the error taxonomy, health
//! reporting types, normalized AI results and the clock abstraction used by
//! every time-dependent component.

pub mod ai;
pub mod clock;
pub mod error;
pub mod health;

pub use ai::{ProviderResult, ResponseSource, LOCAL_FALLBACK_PROVIDER};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    ConfigError, LlmError, StorageError, TelecareError, TelecareResult, ValidationError,
};
pub use health::{aggregate_status, HealthStatus, ServiceHealth, SystemHealth};

use sha2::{Digest, Sha256};

/// Compute a hex-encoded SHA-256 digest of `content`.
///
/// Used for content-derived cache keys, so equal inputs always map to the
/// same key across processes.
pub fn content_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Truncate a message to at most `max_chars` characters, appending an
/// ellipsis when anything was cut. Operates on char boundaries.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
