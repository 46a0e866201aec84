// src/notify/email.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::format::{ChannelFormat, Markup};
use super::{ChannelId, ChannelSender, SendError};
use crate::config::EmailConfig;

const SMTPS_PORT: u16 = 465;

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    subject: String,
}

impl EmailSender {
    /// Port 465 uses implicit TLS, anything else STARTTLS.
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        if cfg.smtp_host.trim().is_empty() {
            bail!("email needs smtp_host");
        }
        let builder = if cfg.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
        }
        .with_context(|| format!("invalid smtp_host `{}`", cfg.smtp_host))?
        .port(cfg.smtp_port)
        .timeout(Some(cfg.common.timeout()));

        let builder = if cfg.smtp_user.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(cfg.smtp_user.clone(), cfg.smtp_pass.clone()))
        };

        let from: Mailbox = cfg
            .from
            .parse()
            .with_context(|| format!("invalid email `from`: `{}`", cfg.from))?;
        let to = cfg
            .to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .with_context(|| format!("invalid email recipient `{addr}`"))
            })
            .collect::<Result<Vec<_>>>()?;
        if to.is_empty() {
            bail!("email needs at least one recipient");
        }

        Ok(Self {
            mailer: builder.build(),
            from,
            to,
            subject: cfg.subject.clone(),
        })
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    async fn send(&self, text: &str, format: &ChannelFormat) -> Result<(), SendError> {
        let content_type = match format.markup {
            Markup::Html => header::ContentType::TEXT_HTML,
            _ => header::ContentType::TEXT_PLAIN,
        };
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(self.subject.clone())
            .header(content_type);
        for rcpt in &self.to {
            builder = builder.to(rcpt.clone());
        }
        let msg = builder
            .body(text.to_string())
            .map_err(|e| SendError::Rejected(format!("building email: {e}")))?;

        self.mailer.send(msg).await.map_err(|e| {
            if e.is_permanent() {
                SendError::Rejected(e.to_string())
            } else {
                SendError::Transport(e.to_string())
            }
        })?;
        Ok(())
    }

    fn channel(&self) -> ChannelId {
        ChannelId::Email
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelCommon;

    fn cfg() -> EmailConfig {
        EmailConfig {
            common: ChannelCommon::default(),
            smtp_host: "smtp.example.test".into(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_pass: String::new(),
            from: "Brief Bot <bot@example.test>".into(),
            to: vec!["reader@example.test".into()],
            subject: "News brief".into(),
        }
    }

    #[test]
    fn bad_addresses_are_config_errors() {
        let mut c = cfg();
        c.to = vec!["not an address".into()];
        assert!(EmailSender::from_config(&c).is_err());

        let mut c = cfg();
        c.to.clear();
        assert!(EmailSender::from_config(&c).is_err());

        let mut c = cfg();
        c.smtp_host = " ".into();
        assert!(EmailSender::from_config(&c).is_err());
    }
}
