//! SMTP email alert channel.
//!
//! Sends the subject, the plain-text body and the episode's JPEG evidence as
//! attachments. The connection is TLS from the first byte on port 465, or
//! upgraded with STARTTLS when `starttls` is set.

use anyhow::{anyhow, Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;

use super::{AlertMessage, Notifier};

pub const DEFAULT_SMTP_PORT: u16 = 465;
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub starttls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub recipients: Vec<String>,
}

pub struct EmailNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailNotifier {
    /// Validates addresses and builds the transport. Connects lazily on send.
    pub fn new(settings: EmailSettings) -> Result<Self> {
        if settings.smtp_host.trim().is_empty() {
            return Err(anyhow!("SMTP host must not be empty"));
        }
        let from: Mailbox = settings
            .from
            .parse()
            .with_context(|| format!("invalid sender address '{}'", settings.from))?;
        if settings.recipients.is_empty() {
            return Err(anyhow!("email channel needs at least one recipient"));
        }
        let recipients = settings
            .recipients
            .iter()
            .map(|to| {
                to.parse::<Mailbox>()
                    .with_context(|| format!("invalid recipient address '{}'", to))
            })
            .collect::<Result<Vec<_>>>()?;

        let builder = if settings.starttls {
            SmtpTransport::starttls_relay(&settings.smtp_host)
        } else {
            SmtpTransport::relay(&settings.smtp_host)
        }
        .with_context(|| format!("invalid SMTP relay {}", settings.smtp_host))?;
        let mut builder = builder
            .port(settings.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(password)) = (settings.username, settings.password) {
            builder = builder.credentials(Credentials::new(user, password));
        }
        Ok(Self {
            transport: builder.build(),
            from,
            recipients,
        })
    }

    fn build_message(&self, message: &AlertMessage) -> Result<Message> {
        let jpeg = ContentType::parse("image/jpeg").map_err(|e| anyhow!("{}", e))?;
        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(message.body.clone()));
        for attachment in &message.attachments {
            parts = parts.singlepart(
                Attachment::new(attachment.file_name.clone())
                    .body(attachment.bytes.clone(), jpeg.clone()),
            );
        }
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());
        for to in &self.recipients {
            builder = builder.to(to.clone());
        }
        builder.multipart(parts).context("failed to build alert email")
    }
}

impl Notifier for EmailNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }

    fn send(&mut self, message: &AlertMessage) -> Result<()> {
        let email = self.build_message(message)?;
        let response = self
            .transport
            .send(&email)
            .context("SMTP delivery failed")?;
        log::info!(
            "email alert for {} accepted ({} attachments, code {})",
            message.source_id,
            message.attachments.len(),
            response.code()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Attachment as EvidenceAttachment;

    fn settings() -> EmailSettings {
        EmailSettings {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            starttls: false,
            username: Some("sentinel".to_string()),
            password: Some("secret".to_string()),
            from: "Crash Sentinel <sentinel@example.com>".to_string(),
            recipients: vec!["ops@example.com".to_string(), "dispatch@example.com".to_string()],
        }
    }

    #[test]
    fn email_carries_subject_body_and_evidence() -> Result<()> {
        let notifier = EmailNotifier::new(settings())?;
        let mut alert = AlertMessage::new("highway_cam");
        alert.attachments.push(EvidenceAttachment {
            file_name: "accident_frame_0001.jpg".to_string(),
            bytes: vec![0xff, 0xd8, 0xff, 0xd9],
        });

        let raw = String::from_utf8(notifier.build_message(&alert)?.formatted())?;
        assert!(raw.contains(&format!("Subject: {}", alert.subject)));
        assert!(raw.contains("ops@example.com"));
        assert!(raw.contains("dispatch@example.com"));
        assert!(raw.contains("Content-Type: image/jpeg"));
        assert!(raw.contains("accident_frame_0001.jpg"));
        assert!(raw.contains("multipart/mixed"));
        Ok(())
    }

    #[test]
    fn rejects_bad_addresses() {
        let mut bad_from = settings();
        bad_from.from = "not an address".to_string();
        assert!(EmailNotifier::new(bad_from).is_err());

        let mut nobody = settings();
        nobody.recipients.clear();
        assert!(EmailNotifier::new(nobody).is_err());

        let mut bad_to = settings();
        bad_to.recipients.push("@nowhere".to_string());
        assert!(EmailNotifier::new(bad_to).is_err());
    }
}
