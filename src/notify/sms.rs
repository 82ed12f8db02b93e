//! Short-message alert channel over an HTTP gateway.
//!
//! Sends the plain-text alert (never attachments) as
//! `POST <gateway_url>` with body `{"recipients": [...], "message": "..."}`
//! and the API key in an `x-api-key` header.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::time::Duration;

use super::{AlertMessage, Notifier};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct SmsSettings {
    pub gateway_url: String,
    pub api_key: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    recipients: &'a [String],
    message: &'a str,
}

pub struct SmsNotifier {
    gateway: url::Url,
    api_key: String,
    recipients: Vec<String>,
    agent: ureq::Agent,
}

impl SmsNotifier {
    pub fn new(settings: SmsSettings) -> Result<Self> {
        let gateway = url::Url::parse(&settings.gateway_url)
            .with_context(|| format!("invalid SMS gateway url {}", settings.gateway_url))?;
        if !matches!(gateway.scheme(), "http" | "https") {
            return Err(anyhow!(
                "SMS gateway must be http(s): {}",
                settings.gateway_url
            ));
        }
        if settings.recipients.is_empty() {
            return Err(anyhow!("SMS channel needs at least one recipient"));
        }
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Ok(Self {
            gateway,
            api_key: settings.api_key,
            recipients: settings.recipients,
            agent,
        })
    }

    fn request_body<'a>(&'a self, message: &'a AlertMessage) -> SmsRequest<'a> {
        SmsRequest {
            recipients: &self.recipients,
            message: &message.short_text,
        }
    }
}

impl Notifier for SmsNotifier {
    fn channel(&self) -> &'static str {
        "sms"
    }

    fn send(&mut self, message: &AlertMessage) -> Result<()> {
        let body = serde_json::to_value(self.request_body(message))?;
        match self
            .agent
            .post(self.gateway.as_str())
            .set("x-api-key", &self.api_key)
            .send_json(body)
        {
            Ok(response) => {
                log::info!(
                    "SMS alert accepted by gateway (status {}, {} recipients)",
                    response.status(),
                    self.recipients.len()
                );
                Ok(())
            }
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                Err(anyhow!("gateway returned {}: {}", code, detail.trim()))
            }
            Err(e) => Err(anyhow!("gateway request failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str, recipients: &[&str]) -> SmsSettings {
        SmsSettings {
            gateway_url: url.to_string(),
            api_key: "key".to_string(),
            recipients: recipients.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn rejects_bad_gateway_or_empty_recipients() {
        assert!(SmsNotifier::new(settings("not a url", &["+15550100"])).is_err());
        assert!(SmsNotifier::new(settings("ftp://gw/send", &["+15550100"])).is_err());
        assert!(SmsNotifier::new(settings("https://gw.example/send", &[])).is_err());
    }

    #[test]
    fn request_carries_short_text_only() {
        let notifier =
            SmsNotifier::new(settings("https://gw.example/send", &["+15550100"])).unwrap();
        let message = AlertMessage::new("clip");
        let json = serde_json::to_value(notifier.request_body(&message)).unwrap();
        assert_eq!(json["recipients"][0], "+15550100");
        assert_eq!(json["message"], message.short_text.as_str());
        assert!(json.get("attachments").is_none());
    }

    #[test]
    fn unreachable_gateway_is_an_error() {
        let mut notifier =
            SmsNotifier::new(settings("http://127.0.0.1:9/send", &["+15550100"])).unwrap();
        assert!(notifier.send(&AlertMessage::new("clip")).is_err());
    }
}
