//! Outgoing account notifications.
//!
//! Production builds deliver through [`SmtpMailer`]. Without SMTP settings the
//! server falls back to [`LogMailer`], which only writes messages to the log
//! and is meant for local development.

use async_trait::async_trait;
use tracing::{debug, info};

pub mod smtp;
pub mod templates;

pub use smtp::SmtpMailer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error so the caller can roll back.
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()>;
}

/// Development sender: records the envelope at info, the body at debug.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        info!(to = %message.to, subject = %message.subject, "mail send stub");
        debug!(body = %message.body, "mail body");
        Ok(())
    }
}
