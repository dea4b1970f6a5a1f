use axum::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use super::repo_types::{TokenPurpose, UserRecord};

/// Description reported for unknown, expired or already consumed tokens.
pub const INVALID_TOKEN: &str = "Invalid token.";

#[derive(Debug, Error)]
pub enum RepoError {
    /// Store-side policy rejected the write; descriptions in reporting order.
    #[error("rejected by credential policy: {}", .0.join("; "))]
    Policy(Vec<String>),
    #[error("invalid token")]
    InvalidToken,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RepoError {
    /// Human-readable sub-errors, empty for storage faults.
    pub fn descriptions(&self) -> Vec<String> {
        match self {
            RepoError::Policy(errors) => errors.clone(),
            RepoError::InvalidToken => vec![INVALID_TOKEN.to_string()],
            RepoError::Storage(_) => Vec::new(),
        }
    }
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    /// Create a user whose username is its email. Policy violations come back
    /// as [`RepoError::Policy`].
    async fn create_user(&self, email: &str, password: &str) -> Result<UserRecord, RepoError>;

    async fn check_password(&self, user: &UserRecord, password: &str) -> Result<bool, RepoError>;

    /// Issue an opaque single-use token for `purpose`.
    async fn generate_token(
        &self,
        user: &UserRecord,
        purpose: TokenPurpose,
    ) -> Result<String, RepoError>;

    /// Consume an email-confirmation token and mark the account confirmed.
    async fn confirm_email(&self, user: &UserRecord, token: &str) -> Result<(), RepoError>;

    /// Consume a password-reset token and replace the password.
    async fn reset_password(
        &self,
        user: &UserRecord,
        token: &str,
        new_password: &str,
    ) -> Result<(), RepoError>;
}
