//! Email notification of new stars
//!
//! Two transports are available: direct SMTP submission (STARTTLS on the
//! submission port) and AWS SES. Both implement [`Notifier`], which is the seam
//! the check run talks to.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{optional_var, require_var, ConfigError, NotifyConfig, Transport};
use crate::delta::RepoUpdates;

/// A composed email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub sender: String,
    pub receiver: String,
    pub subject: String,
    pub body: String,
}

/// Delivers a notification email
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Notification) -> Result<()>;
}

/// Addresses and credentials read from the environment
#[derive(Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub sender: String,
    pub receiver: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSettings")
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl MailSettings {
    /// Resolve the variables named in the config
    ///
    /// The receiver falls back to the sender. A password is only required for SMTP.
    pub fn resolve<F>(config: &NotifyConfig, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sender = require_var(lookup, &config.sender_env)?;
        let receiver = optional_var(lookup, &config.receiver_env).unwrap_or_else(|| sender.clone());
        let password = match config.transport {
            Transport::Smtp => Some(require_var(lookup, &config.password_env)?),
            Transport::Ses => None,
        };

        Ok(Self {
            sender,
            receiver,
            password,
        })
    }

    pub fn notification(&self, subject: &str, body: String) -> Notification {
        Notification {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            subject: subject.to_string(),
            body,
        }
    }
}

/// Plain-text summary, one block per repository in name order
pub fn compose_body(updates: &RepoUpdates) -> String {
    let mut body = String::new();
    for (name, update) in updates {
        body.push_str(&format!(
            "{}\nNew Stars: +{}\nTotal Stars: {}\n\n",
            name, update.new_stars, update.current_total
        ));
    }
    body
}

/// Build the notifier for the configured transport
pub async fn build_notifier(
    config: &NotifyConfig,
    settings: &MailSettings,
) -> Result<Box<dyn Notifier>> {
    match config.transport {
        Transport::Smtp => Ok(Box::new(SmtpNotifier::new(config, settings)?)),
        Transport::Ses => Ok(Box::new(SesNotifier::new(&config.ses_region).await)),
    }
}

/// SMTP submission with STARTTLS
pub struct SmtpNotifier {
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(config: &NotifyConfig, settings: &MailSettings) -> Result<Self> {
        use lettre::transport::smtp::authentication::Credentials;

        let password = settings
            .password
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv(config.password_env.clone()))?;

        let transport =
            lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&config.smtp_host)
                .with_context(|| format!("Invalid SMTP relay: {}", config.smtp_host))?
                .port(config.smtp_port)
                .credentials(Credentials::new(settings.sender.clone(), password))
                .build();

        debug!(
            "SMTP transport configured for {}:{}",
            config.smtp_host, config.smtp_port
        );
        Ok(Self { transport })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, message: &Notification) -> Result<()> {
        use lettre::message::header::ContentType;
        use lettre::AsyncTransport;

        let email = lettre::Message::builder()
            .from(message.sender.parse().context("Invalid sender address")?)
            .to(message.receiver.parse().context("Invalid receiver address")?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .context("Failed to build email")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email via SMTP")?;

        info!("Notification sent to {} via SMTP", message.receiver);
        Ok(())
    }
}

/// AWS SES v2 `SendEmail`
pub struct SesNotifier {
    client: aws_sdk_sesv2::Client,
}

impl SesNotifier {
    pub async fn new(region: &str) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_sesv2::config::Region::new(region.to_string()))
            .load()
            .await;

        debug!("SES client configured for region {}", region);
        Self {
            client: aws_sdk_sesv2::Client::new(&shared),
        }
    }
}

#[async_trait]
impl Notifier for SesNotifier {
    async fn send(&self, message: &Notification) -> Result<()> {
        use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};

        let subject = Content::builder()
            .data(message.subject.clone())
            .build()
            .context("Failed to build email subject")?;
        let text = Content::builder()
            .data(message.body.clone())
            .build()
            .context("Failed to build email body")?;

        let content = EmailContent::builder()
            .simple(
                Message::builder()
                    .subject(subject)
                    .body(Body::builder().text(text).build())
                    .build(),
            )
            .build();

        self.client
            .send_email()
            .from_email_address(message.sender.clone())
            .destination(
                Destination::builder()
                    .to_addresses(message.receiver.clone())
                    .build(),
            )
            .content(content)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", aws_sdk_sesv2::error::DisplayErrorContext(&e)))
            .context("Failed to send email via SES")?;

        info!("Notification sent to {} via SES", message.receiver);
        Ok(())
    }
}
