//! SMTP mail adapter: async lettre transport over STARTTLS.

use async_trait::async_trait;
use hrflow_core::config::{SmtpConfig, expand_path};
use hrflow_core::error::{HrFlowError, Result};
use hrflow_core::mail::{DeliveryError, MailAdapter, OutgoingMail};
use hrflow_core::HrFlowConfig;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::templates::Templates;

/// Delivers notifications through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    templates: Templates,
    host: String,
}

impl SmtpMailer {
    /// Build the relay transport from SMTP settings.
    pub fn new(smtp: &SmtpConfig, templates: Templates) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .map_err(|e| HrFlowError::Config(format!("SMTP relay: {e}")))?
            .port(smtp.port);

        if !smtp.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                smtp.username.clone(),
                smtp.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            templates,
            host: smtp.host.clone(),
        })
    }

    /// Build from the full config, honouring `mail.templates_dir`.
    pub fn from_config(config: &HrFlowConfig) -> Result<Self> {
        Self::new(&config.smtp, templates_for(config))
    }
}

/// Template set for a config: built-ins plus the optional override directory,
/// rendering HTML when `mail.html` is set.
pub fn templates_for(config: &HrFlowConfig) -> Templates {
    let templates = match &config.mail.templates_dir {
        Some(dir) => Templates::with_dir(&expand_path(dir)),
        None => Templates::builtin(),
    };
    templates.html(config.mail.html)
}

/// Build a lettre message from an outgoing mail.
pub fn build_message(mail: &OutgoingMail) -> std::result::Result<Message, DeliveryError> {
    let from: Mailbox = mail
        .from
        .parse()
        .map_err(|_| DeliveryError::InvalidAddress(mail.from.clone()))?;

    let mut builder = Message::builder().from(from).subject(mail.subject.as_str());
    for to in &mail.to {
        let mailbox: Mailbox = to
            .parse()
            .map_err(|_| DeliveryError::InvalidAddress(to.clone()))?;
        builder = builder.to(mailbox);
    }

    let content_type = if mail.html {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };

    builder
        .header(content_type)
        .body(mail.body.clone())
        .map_err(|e| DeliveryError::Transport(format!("Build email: {e}")))
}

#[async_trait]
impl MailAdapter for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    fn render(&self, template_id: &str, context: &serde_json::Value) -> Result<String> {
        self.templates.render(template_id, context)
    }

    async fn deliver(&self, mail: &OutgoingMail) -> std::result::Result<(), DeliveryError> {
        let message = build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Transport(format!("SMTP send via {}: {e}", self.host)))?;

        tracing::info!("📤 Email sent to: {}", mail.to.join(", "));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &[&str]) -> OutgoingMail {
        OutgoingMail {
            subject: "Leave Starts Tomorrow".into(),
            body: "Hello".into(),
            from: "HR Team <noreply@example.com>".into(),
            to: to.iter().map(|s| s.to_string()).collect(),
            html: false,
        }
    }

    #[test]
    fn test_build_message_multiple_recipients() {
        let message = build_message(&mail(&["a@example.com", "b@example.com"])).unwrap();
        let envelope = message.envelope();
        assert_eq!(envelope.to().len(), 2);
        assert_eq!(
            envelope.from().map(|a| a.to_string()),
            Some("noreply@example.com".to_string())
        );
    }

    #[test]
    fn test_build_message_invalid_recipient() {
        let err = build_message(&mail(&["not an address"])).unwrap_err();
        assert_eq!(err, DeliveryError::InvalidAddress("not an address".into()));
    }

    #[test]
    fn test_templates_for_config() {
        let mut config = HrFlowConfig::default();
        assert!(templates_for(&config).source("welcome").is_ok());

        let context = serde_json::json!({"employee_name": "<Dee>", "last_working_day": "2024-06-28"});
        let plain = templates_for(&config).render("farewell", &context).unwrap();
        assert!(plain.starts_with("Hello <Dee>,\n"));

        config.mail.html = true;
        let html = templates_for(&config).render("farewell", &context).unwrap();
        assert!(html.starts_with("Hello &lt;Dee&gt;,<br>\n"));
    }
}
