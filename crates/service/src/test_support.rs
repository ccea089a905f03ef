#![cfg(test)]
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use configs::auth::AuthSettings;

use crate::auth::mail::{MailSender, Mailer, OutgoingMail};
use crate::auth::repo::SeaOrmAuthRepository;
use crate::auth::repository::mock::MockAuthRepository;
use crate::auth::revocation::MokaRevocationStore;
use crate::auth::AuthService;

/// Defaults with the cheapest bcrypt cost.
pub fn fast_settings() -> AuthSettings {
    AuthSettings { jwt_secret: "test-secret".into(), hash_cost: 4, ..AuthSettings::default() }
}

/// Repository over a fresh migrated sqlite file.
pub async fn sqlite_repo() -> SeaOrmAuthRepository {
    let db = models::db::connect_sqlite_temp().await.expect("sqlite test database");
    SeaOrmAuthRepository::new(db)
}

pub fn mock_service(settings: AuthSettings) -> (Arc<MockAuthRepository>, AuthService<MockAuthRepository>, RecordingMailer) {
    let repo = Arc::new(MockAuthRepository::default());
    let mailer = RecordingMailer::default();
    let svc = AuthService::from_settings(
        repo.clone(),
        &settings,
        Arc::new(MokaRevocationStore::default()),
        Mailer::enabled(mailer.clone()),
    )
    .expect("service from settings");
    (repo, svc, mailer)
}

/// Keeps every mail it is handed.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl RecordingMailer {
    /// Waits (up to two seconds) until at least `n` mails arrived.
    pub async fn wait_for(&self, n: usize) -> Vec<OutgoingMail> {
        for _ in 0..200 {
            {
                let sent = self.sent.lock().unwrap();
                if sent.len() >= n {
                    return sent.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} mails, got {}", self.sent.lock().unwrap().len());
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl MailSender for FailingMailer {
    async fn send(&self, _mail: OutgoingMail) -> anyhow::Result<()> {
        anyhow::bail!("smtp unavailable")
    }
}
