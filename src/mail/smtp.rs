use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use super::{MailMessage, Mailer};
use crate::config::SmtpConfig;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig, company_name: &str) -> anyhow::Result<Self> {
        let address = cfg
            .from
            .parse()
            .with_context(|| format!("invalid SMTP_FROM {:?}", cfg.from))?;
        let from = Mailbox::new(Some(company_name.to_string()), address);

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .context("build SMTP transport")?
            .port(cfg.port)
            .timeout(Some(Duration::from_secs(10)));
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(message
                .to
                .parse()
                .with_context(|| format!("invalid recipient {:?}", message.to))?)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .context("build email")?;

        self.transport.send(email).await.context("smtp send")?;
        info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}
