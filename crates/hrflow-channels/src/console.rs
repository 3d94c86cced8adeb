//! Log-only mail adapter for dry runs and local development.
//! Mails are written to the tracing log and always "delivered".

use async_trait::async_trait;
use hrflow_core::error::Result;
use hrflow_core::mail::{DeliveryError, MailAdapter, OutgoingMail};

use crate::templates::Templates;

pub struct LogMailer {
    templates: Templates,
}

impl LogMailer {
    pub fn new(templates: Templates) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl MailAdapter for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    fn render(&self, template_id: &str, context: &serde_json::Value) -> Result<String> {
        self.templates.render(template_id, context)
    }

    async fn deliver(&self, mail: &OutgoingMail) -> std::result::Result<(), DeliveryError> {
        if mail.to.is_empty() {
            return Err(DeliveryError::InvalidAddress(String::new()));
        }
        tracing::info!(
            "📧 [dry-run] {} → {}\n{}",
            mail.subject,
            mail.to.join(", "),
            mail.body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_delivers() {
        let mailer = LogMailer::new(Templates::builtin());
        let body = mailer
            .render("farewell", &serde_json::json!({"employee_name": "Dan"}))
            .unwrap();
        let mail = OutgoingMail {
            subject: "Farewell".into(),
            body,
            from: "noreply@example.com".into(),
            to: vec!["dan@example.com".into()],
            html: false,
        };
        assert!(mailer.deliver(&mail).await.is_ok());
    }

    #[tokio::test]
    async fn test_log_mailer_rejects_empty_recipients() {
        let mailer = LogMailer::new(Templates::builtin());
        let mail = OutgoingMail {
            subject: "x".into(),
            body: String::new(),
            from: "noreply@example.com".into(),
            to: Vec::new(),
            html: false,
        };
        assert!(mailer.deliver(&mail).await.is_err());
    }
}
