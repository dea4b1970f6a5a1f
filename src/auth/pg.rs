use anyhow::Context;
use axum::async_trait;
use base64ct::{Base64, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use super::password::{hash_password, is_valid_email, policy_violations, verify_password};
use super::repo::{CredentialRepository, RepoError, TokenPurpose, UserRecord};

/// How long an issued one-time token stays redeemable.
pub const TOKEN_LIFETIME: Duration = Duration::hours(24);

const TOKEN_BYTES: usize = 32;

#[derive(Clone)]
pub struct PgCredentialRepository {
    db: PgPool,
}

impl PgCredentialRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Random token text. Standard base64, so it may contain `+`, `/` and `=`.
pub(crate) fn new_token() -> String {
    let mut raw = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut raw);
    Base64::encode_string(&raw)
}

fn duplicate_email(email: &str) -> String {
    format!("Email '{email}' is already taken.")
}

/// Delete a live token matching user and purpose; `false` when none matched.
async fn take_token(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    purpose: TokenPurpose,
    token: &str,
) -> anyhow::Result<bool> {
    let taken = sqlx::query_scalar::<_, Uuid>(
        r#"
        DELETE FROM one_time_tokens
         WHERE token_hash = $1 AND user_id = $2 AND purpose = $3 AND expires_at > now()
        RETURNING user_id
        "#,
    )
    .bind(hash_token(token))
    .bind(user_id)
    .bind(purpose.as_str())
    .fetch_optional(&mut **tx)
    .await
    .context("consume one-time token")?;

    if taken.is_some() {
        sqlx::query(r#"DELETE FROM one_time_tokens WHERE user_id = $1 AND purpose = $2"#)
            .bind(user_id)
            .bind(purpose.as_str())
            .execute(&mut **tx)
            .await
            .context("invalidate sibling tokens")?;
    }
    Ok(taken.is_some())
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, email, password_hash, email_confirmed, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, email, password_hash, email_confirmed, created_at
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<UserRecord, RepoError> {
        let mut errors = Vec::new();
        if !is_valid_email(email) {
            errors.push(format!("Email '{email}' is invalid."));
        } else if self.find_by_email(email).await?.is_some() {
            errors.push(duplicate_email(email));
        }
        errors.extend(policy_violations(password));
        if !errors.is_empty() {
            return Err(RepoError::Policy(errors));
        }

        let hash = hash_password(password)?;
        // the unique index settles concurrent registrations for one email
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            RETURNING id, email, password_hash, email_confirmed, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hash)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;

        match user {
            Some(user) => {
                info!(user_id = %user.id, "user row created");
                Ok(user)
            }
            None => Err(RepoError::Policy(vec![duplicate_email(email)])),
        }
    }

    async fn check_password(&self, user: &UserRecord, password: &str) -> Result<bool, RepoError> {
        Ok(verify_password(password, &user.password_hash)?)
    }

    async fn generate_token(
        &self,
        user: &UserRecord,
        purpose: TokenPurpose,
    ) -> Result<String, RepoError> {
        let token = new_token();
        let expires_at = OffsetDateTime::now_utc() + TOKEN_LIFETIME;

        let mut tx = self.db.begin().await.context("begin tx")?;
        // a new token supersedes every earlier one of the same purpose
        sqlx::query(
            r#"
            DELETE FROM one_time_tokens
             WHERE user_id = $1 AND (purpose = $2 OR expires_at <= now())
            "#,
        )
        .bind(user.id)
        .bind(purpose.as_str())
        .execute(&mut *tx)
        .await
        .context("purge superseded tokens")?;
        sqlx::query(
            r#"
            INSERT INTO one_time_tokens (token_hash, user_id, purpose, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(hash_token(&token))
        .bind(user.id)
        .bind(purpose.as_str())
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .context("insert one-time token")?;
        tx.commit().await.context("commit tx")?;

        debug!(user_id = %user.id, purpose = purpose.as_str(), "one-time token issued");
        Ok(token)
    }

    async fn confirm_email(&self, user: &UserRecord, token: &str) -> Result<(), RepoError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        if !take_token(&mut tx, user.id, TokenPurpose::EmailConfirmation, token).await? {
            return Err(RepoError::InvalidToken);
        }
        sqlx::query(r#"UPDATE users SET email_confirmed = TRUE WHERE id = $1"#)
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .context("mark email confirmed")?;
        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn reset_password(
        &self,
        user: &UserRecord,
        token: &str,
        new_password: &str,
    ) -> Result<(), RepoError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        if !take_token(&mut tx, user.id, TokenPurpose::PasswordReset, token).await? {
            return Err(RepoError::InvalidToken);
        }
        // dropping the tx on a policy failure keeps the token redeemable
        let errors = policy_violations(new_password);
        if !errors.is_empty() {
            return Err(RepoError::Policy(errors));
        }
        let hash = hash_password(new_password)?;
        sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(user.id)
            .bind(hash)
            .execute(&mut *tx)
            .await
            .context("update password hash")?;
        tx.commit().await.context("commit tx")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable() {
        let first = hash_token("token");
        let second = hash_token("token");
        let different = hash_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn new_tokens_are_unique_base64() {
        let a = new_token();
        let b = new_token();
        assert_ne!(a, b);
        assert_eq!(Base64::decode_vec(&a).expect("standard base64").len(), TOKEN_BYTES);
    }
}
