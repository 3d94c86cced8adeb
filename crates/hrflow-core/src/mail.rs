//! Mail adapter interface: the engine's only way out to a mail server.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A rendered mail ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub subject: String,
    pub body: String,
    /// Sender, either `addr@host` or `Name <addr@host>`.
    pub from: String,
    pub to: Vec<String>,
    /// Send the body as `text/html` instead of `text/plain`.
    #[serde(default)]
    pub html: bool,
}

/// Transport-level delivery failure. Always retryable on the next tick.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Mail adapter consumed by the dispatch pipeline.
///
/// `render` must be deterministic and side-effect free. `deliver` may be
/// called concurrently for distinct entities.
#[async_trait]
pub trait MailAdapter: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &str;

    /// Render a template with its JSON context into a mail body.
    fn render(&self, template_id: &str, context: &serde_json::Value) -> Result<String>;

    /// Deliver one mail.
    async fn deliver(&self, mail: &OutgoingMail) -> std::result::Result<(), DeliveryError>;
}
