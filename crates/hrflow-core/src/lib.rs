//! # HRFlow Core
//!
//! Shared pieces for the HRFlow notification engine:
//! - [`config`]: TOML configuration (`~/.hrflow/config.toml`)
//! - [`error`]: the error taxonomy used across crates
//! - [`mail`]: the mail adapter interface the engine delivers through

pub mod config;
pub mod error;
pub mod mail;

pub use config::HrFlowConfig;
pub use error::{HrFlowError, Result};
pub use mail::{DeliveryError, MailAdapter, OutgoingMail};
