//! Outbound notification email.
//!
//! Delivery goes through [`Mailer`]; production uses [`SmtpMailer`] against the
//! configured relay (Resend SMTP by default, authenticated with `EMAIL_API_KEY`).

use std::sync::LazyLock;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Message},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use regex::Regex;

use crate::core::config::EmailConfig;
use crate::core::shared::utils::html_escape;

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;

    /// Address used for ticket notifications.
    fn support_inbox(&self) -> &str;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    support_inbox: String,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from)
            .field("support_inbox", &self.support_inbox)
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    pub fn from_config(config: &EmailConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(config.smtp_user.clone(), config.api_key.clone());
        // 465 is implicit TLS; anything else negotiates STARTTLS.
        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .with_context(|| format!("SMTP relay error for {}", config.smtp_host))?;

        Ok(Self {
            transport: builder.port(config.smtp_port).credentials(creds).build(),
            from: config.from.clone(),
            support_inbox: config.support_inbox.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse().context("Invalid from address")?)
            .to(email.to.parse().context("Invalid to address")?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .context("Failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("Failed to send email")?;
        log::info!("Email sent to {}", email.to);
        Ok(())
    }

    fn support_inbox(&self) -> &str {
        &self.support_inbox
    }
}

pub fn ticket_notification(
    to: &str,
    name: &str,
    email: &str,
    reason: &str,
    description: &str,
) -> OutgoingEmail {
    let body = html_escape(description).replace('\n', "<br />");
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("[Support Ticket] {}", reason),
        html: format!(
            r#"<h2>New Support Ticket</h2>
<p><strong>From:</strong> {name} ({email})</p>
<p><strong>Subject:</strong> {reason}</p>
<hr />
<p>{body}</p>"#,
            name = html_escape(name),
            email = html_escape(email),
            reason = html_escape(reason),
            body = body,
        ),
    }
}

pub fn email_change_verification(to: &str, name: &str, verify_url: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Verify your new email address".to_string(),
        html: format!(
            r#"<h2>Confirm your email change</h2>
<p>Hi {name},</p>
<p>Click the link below to use this address for your Lx2 Hub account. The link expires in one hour.</p>
<p><a href="{url}">{url}</a></p>
<p>If you did not request this change, you can ignore this email.</p>"#,
            name = html_escape(name),
            url = html_escape(verify_url),
        ),
    }
}
