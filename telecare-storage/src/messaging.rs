//! Messaging collaborator.
//!
//! Text delivery (SMS gateway, OTP) is external. Callers only need a
//! delivery id back or an error to log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use telecare_core::{StorageError, TelecareResult};
use uuid::Uuid;

/// Sends a text message and returns the gateway's delivery id.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> TelecareResult<String>;
}

/// [`Messenger`] for deployments without an SMS gateway.
///
/// Every send fails, so callers report the notification as not delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredMessenger;

pub const NO_GATEWAY_REASON: &str = "no messaging gateway configured";

#[async_trait]
impl Messenger for UnconfiguredMessenger {
    async fn send_text(&self, to: &str, _body: &str) -> TelecareResult<String> {
        Err(StorageError::DeliveryFailed {
            recipient: to.to_string(),
            reason: NO_GATEWAY_REASON.to_string(),
        }
        .into())
    }
}

/// A message captured by [`RecordingMessenger`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub delivery_id: String,
    pub to: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// [`Messenger`] that keeps messages in memory instead of delivering them.
///
/// Test double only: nothing leaves the process and the log is never
/// drained. Can be switched into a failing mode to exercise delivery-error
/// paths.
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A messenger whose every delivery fails.
    pub fn failing() -> Self {
        let messenger = Self::default();
        messenger.set_failing(true);
        messenger
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages delivered so far, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, to: &str, body: &str) -> TelecareResult<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::DeliveryFailed {
                recipient: to.to_string(),
                reason: "gateway unavailable".to_string(),
            }
            .into());
        }

        let delivery_id = format!("msg_{}", Uuid::now_v7().simple());
        let message = SentMessage {
            delivery_id: delivery_id.clone(),
            to: to.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
        };
        self.sent
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(message);

        tracing::debug!(delivery_id = %delivery_id, "Text message recorded");
        Ok(delivery_id)
    }
}
