//! Outbound mail capability. Delivery itself lives outside this crate; the
//! core only hands over recipient, purpose and the raw token.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::domain::VerificationKind;

#[derive(Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub kind: VerificationKind,
    pub token: String,
}

impl fmt::Debug for OutgoingMail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingMail")
            .field("to", &self.to)
            .field("kind", &self.kind)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()>;
}

/// Either no mail capability at all, or a sender to hand mails to.
#[derive(Clone, Default)]
pub enum Mailer {
    #[default]
    Disabled,
    Enabled(Arc<dyn MailSender>),
}

impl Mailer {
    pub fn enabled(sender: impl MailSender + 'static) -> Self {
        Mailer::Enabled(Arc::new(sender))
    }

    /// Fire and forget: delivery runs on its own task and a failure is only
    /// logged.
    pub fn dispatch(&self, mail: OutgoingMail) {
        match self {
            Mailer::Disabled => debug!(to = %mail.to, kind = mail.kind.as_str(), "mailer disabled, dropping mail"),
            Mailer::Enabled(sender) => {
                let sender = sender.clone();
                tokio::spawn(async move {
                    let to = mail.to.clone();
                    let kind = mail.kind;
                    if let Err(e) = sender.send(mail).await {
                        warn!(to = %to, kind = kind.as_str(), error = %e, "mail delivery failed");
                    }
                });
            }
        }
    }
}

/// Logs that a mail would be sent. The token is never written out.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        info!(to = %mail.to, kind = mail.kind.as_str(), "mail_sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingMailer;

    #[tokio::test]
    async fn enabled_mailer_delivers_in_background() {
        let recorder = RecordingMailer::default();
        let mailer = Mailer::enabled(recorder.clone());
        mailer.dispatch(OutgoingMail { to: "a@example.com".into(), kind: VerificationKind::EmailVerification, token: "t".into() });
        let sent = recorder.wait_for(1).await;
        assert_eq!(sent[0].to, "a@example.com");
        assert_eq!(sent[0].token, "t");
    }

    #[tokio::test]
    async fn disabled_mailer_is_a_no_op() {
        let mailer = Mailer::default();
        assert!(matches!(mailer, Mailer::Disabled));
        mailer.dispatch(OutgoingMail { to: "a@example.com".into(), kind: VerificationKind::PasswordReset, token: "t".into() });
    }

    #[test]
    fn debug_redacts_token() {
        let mail = OutgoingMail { to: "a@example.com".into(), kind: VerificationKind::PasswordReset, token: "secret-token".into() };
        assert!(!format!("{mail:?}").contains("secret-token"));
    }
}
