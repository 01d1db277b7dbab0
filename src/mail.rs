use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()>;
}

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendGridMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": mail.to }] }],
            "from": { "email": self.from },
            "subject": mail.subject,
            "content": [{ "type": "text/plain", "value": mail.text }],
        });
        self.client
            .post(SENDGRID_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("sendgrid request")?
            .error_for_status()
            .context("sendgrid response")?;
        info!(to = %mail.to, subject = %mail.subject, "mail sent");
        Ok(())
    }
}

/// Used when no SendGrid key is configured: the message only goes to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        info!(to = %mail.to, subject = %mail.subject, text = %mail.text, "mail (not sent, no SENDGRID_API_KEY)");
        Ok(())
    }
}

pub fn password_reset_mail(to: &str, base_url: &str, token: &str) -> OutgoingMail {
    let link = format!(
        "{}/reset-password?token={}",
        base_url.trim_end_matches('/'),
        token
    );
    OutgoingMail {
        to: to.to_string(),
        subject: "Reset your password".into(),
        text: format!(
            "Someone requested a password reset for your account.\n\nOpen {link} to choose a new password. If this wasn't you, ignore this email."
        ),
    }
}
