//! Error types shared by all HRFlow crates.

use crate::mail::DeliveryError;

/// Errors raised by the notification engine.
#[derive(Debug, thiserror::Error)]
pub enum HrFlowError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    /// Bad or missing entity data (no recipient address, malformed date).
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// A mail went out but its guard/audit commit failed. Risks a duplicate send.
    #[error("Persistence error after delivery: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HrFlowError>;
