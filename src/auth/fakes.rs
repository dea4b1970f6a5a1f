use std::sync::Mutex;

use anyhow::anyhow;
use axum::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{CredentialRepository, RepoError, TokenPurpose, UserRecord};
use crate::notify::{EmailMessage, Notifier};

#[derive(Default)]
struct Store {
    users: Vec<(UserRecord, String)>,
    tokens: Vec<(Uuid, TokenPurpose, String)>,
    issued: usize,
    calls: usize,
    reset_calls: usize,
}

/// Keeps plain passwords and live tokens in memory; counts every call.
#[derive(Default)]
pub struct FakeRepository {
    store: Mutex<Store>,
    reject_creates: Option<Vec<String>>,
    unavailable: bool,
}

impl FakeRepository {
    pub fn rejecting_creates(mut self, errors: Vec<String>) -> Self {
        self.reject_creates = Some(errors);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn user(&self, email: &str) -> Option<UserRecord> {
        let store = self.store.lock().unwrap();
        store
            .users
            .iter()
            .find(|(u, _)| u.email == email)
            .map(|(u, _)| u.clone())
    }

    pub fn calls(&self) -> usize {
        self.store.lock().unwrap().calls
    }

    pub fn reset_calls(&self) -> usize {
        self.store.lock().unwrap().reset_calls
    }

    fn enter(&self) -> Result<std::sync::MutexGuard<'_, Store>, RepoError> {
        let mut store = self.store.lock().unwrap();
        store.calls += 1;
        if self.unavailable {
            return Err(RepoError::Storage(anyhow!("credential store unavailable")));
        }
        Ok(store)
    }
}

fn take_token(store: &mut Store, user_id: Uuid, purpose: TokenPurpose, token: &str) -> bool {
    let before = store.tokens.len();
    store
        .tokens
        .retain(|(u, p, t)| !(*u == user_id && *p == purpose && t == token));
    if store.tokens.len() == before {
        return false;
    }
    store.tokens.retain(|(u, p, _)| !(*u == user_id && *p == purpose));
    true
}

#[async_trait]
impl CredentialRepository for FakeRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let store = self.enter()?;
        Ok(store.users.iter().find(|(u, _)| u.id == id).map(|(u, _)| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let store = self.enter()?;
        Ok(store
            .users
            .iter()
            .find(|(u, _)| u.email == email)
            .map(|(u, _)| u.clone()))
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<UserRecord, RepoError> {
        let mut store = self.enter()?;
        if let Some(errors) = &self.reject_creates {
            return Err(RepoError::Policy(errors.clone()));
        }
        if store.users.iter().any(|(u, _)| u.email == email) {
            return Err(RepoError::Policy(vec![format!(
                "Email '{email}' is already taken."
            )]));
        }
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: String::new(),
            email_confirmed: false,
            created_at: OffsetDateTime::now_utc(),
        };
        store.users.push((user.clone(), password.to_string()));
        Ok(user)
    }

    async fn check_password(&self, user: &UserRecord, password: &str) -> Result<bool, RepoError> {
        let store = self.enter()?;
        Ok(store
            .users
            .iter()
            .any(|(u, p)| u.id == user.id && p == password))
    }

    async fn generate_token(
        &self,
        user: &UserRecord,
        purpose: TokenPurpose,
    ) -> Result<String, RepoError> {
        let mut store = self.enter()?;
        store.issued += 1;
        // deliberately full of characters that are unsafe in a url
        let token = format!("tok+{}/{}==", store.issued, purpose.as_str());
        store.tokens.retain(|(u, p, _)| !(*u == user.id && *p == purpose));
        store.tokens.push((user.id, purpose, token.clone()));
        Ok(token)
    }

    async fn confirm_email(&self, user: &UserRecord, token: &str) -> Result<(), RepoError> {
        let mut store = self.enter()?;
        if !take_token(&mut store, user.id, TokenPurpose::EmailConfirmation, token) {
            return Err(RepoError::InvalidToken);
        }
        if let Some((u, _)) = store.users.iter_mut().find(|(u, _)| u.id == user.id) {
            u.email_confirmed = true;
        }
        Ok(())
    }

    async fn reset_password(
        &self,
        user: &UserRecord,
        token: &str,
        new_password: &str,
    ) -> Result<(), RepoError> {
        let mut store = self.enter()?;
        store.reset_calls += 1;
        if !take_token(&mut store, user.id, TokenPurpose::PasswordReset, token) {
            return Err(RepoError::InvalidToken);
        }
        if let Some((_, p)) = store.users.iter_mut().find(|(u, _)| u.id == user.id) {
            *p = new_password.to_string();
        }
        Ok(())
    }
}

/// Records every message; optionally fails each delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<EmailMessage>>,
    attempts: Mutex<usize>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Messages that were delivered.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        if self.fail {
            anyhow::bail!("smtp relay refused connection");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
