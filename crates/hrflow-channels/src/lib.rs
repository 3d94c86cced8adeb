//! # HRFlow Channels
//!
//! Mail adapters implementing [`hrflow_core::MailAdapter`]:
//! - [`SmtpMailer`]: STARTTLS relay via lettre
//! - [`LogMailer`]: dry run, writes mails to the log
//!
//! Both render bodies from [`Templates`].

pub mod console;
pub mod email;
pub mod templates;

use std::sync::Arc;

use hrflow_core::error::{HrFlowError, Result};
use hrflow_core::{HrFlowConfig, MailAdapter};

pub use console::LogMailer;
pub use email::SmtpMailer;
pub use templates::Templates;

/// Pick the mail adapter named by `mail.transport`.
pub fn mailer_from_config(config: &HrFlowConfig) -> Result<Arc<dyn MailAdapter>> {
    match config.mail.transport.as_str() {
        "smtp" => Ok(Arc::new(SmtpMailer::from_config(config)?)),
        "log" => Ok(Arc::new(LogMailer::new(email::templates_for(config)))),
        other => Err(HrFlowError::Config(format!(
            "unknown mail transport '{other}' (expected 'smtp' or 'log')"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailer_from_config() {
        let mut config = HrFlowConfig::default();
        assert_eq!(mailer_from_config(&config).unwrap().name(), "log");

        config.mail.transport = "pigeon".into();
        assert!(mailer_from_config(&config).is_err());
    }
}
