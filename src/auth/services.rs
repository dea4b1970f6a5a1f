use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use url::{form_urlencoded, Url};
use uuid::Uuid;

use super::claims::SessionIdentity;
use super::dto::{LoginRequest, RegisterRequest, ResetPasswordRequest, WorkflowOutcome};
use super::error::{WorkflowError, GENERIC_FAILURE};
use super::jwt::SessionKeys;
use super::repo::{CredentialRepository, RepoError, TokenPurpose, UserRecord};
use super::token_codec;
use crate::notify::{EmailMessage, Notifier};

pub const CONFIRM_SUBJECT: &str = "Confirm Your Email";
pub const RESET_SUBJECT: &str = "Reset Password";

const PASSWORD_MISMATCH: &str = "Confirm password does not match";
const USER_NOT_CREATED: &str = "User did not create";
const USER_CREATED: &str = "User created successfully!";
const UNKNOWN_LOGIN_EMAIL: &str = "there is no user with that Email Address";
const INVALID_PASSWORD: &str = "Invalid Password";
const USER_NOT_FOUND: &str = "User not found";
const EMAIL_NOT_CONFIRMED: &str = "Email did not confirmed";
const EMAIL_CONFIRMED: &str = "Email confirmed successfully";
const NO_USER_FOR_EMAIL: &str = "No user associated with email";
const RESET_LINK_SENT: &str = "Reset password URL has been sent to the email successfully!";
const RESET_MISMATCH: &str = "Password does not match its confirmation";
const PASSWORD_RESET: &str = "Password has been reset successfully";

#[derive(Clone)]
pub struct IdentityWorkflow {
    repo: Arc<dyn CredentialRepository>,
    notifier: Arc<dyn Notifier>,
    keys: SessionKeys,
    app_url: Url,
}

fn storage(err: RepoError) -> WorkflowError {
    WorkflowError::Storage(anyhow::Error::new(err))
}

/// `{base}/{path}?k=v&...` with every value form-encoded.
fn link(base: &Url, path: &str, params: &[(&str, &str)]) -> String {
    let query: String = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{}/{}?{}", base.as_str().trim_end_matches('/'), path, query)
}

fn outcome(result: Result<WorkflowOutcome, WorkflowError>) -> WorkflowOutcome {
    match result {
        Ok(ok) => ok,
        Err(err) => {
            match &err {
                WorkflowError::Storage(_) | WorkflowError::Signing(_) => {
                    error!(error = %err, "workflow operation failed")
                }
                _ => info!(reason = %err, "workflow operation rejected"),
            }
            err.into()
        }
    }
}

impl IdentityWorkflow {
    pub fn new(
        repo: Arc<dyn CredentialRepository>,
        notifier: Arc<dyn Notifier>,
        keys: SessionKeys,
        app_url: Url,
    ) -> Self {
        Self {
            repo,
            notifier,
            keys,
            app_url,
        }
    }

    pub fn confirmation_url(&self, user_id: Uuid, encoded_token: &str) -> String {
        let id = user_id.to_string();
        link(
            &self.app_url,
            "confirmemail",
            &[("userid", id.as_str()), ("token", encoded_token)],
        )
    }

    pub fn reset_url(&self, email: &str, encoded_token: &str) -> String {
        link(
            &self.app_url,
            "resetpassword",
            &[("email", email), ("token", encoded_token)],
        )
    }

    /// Delivery is awaited but its failure never changes the outcome; it is
    /// logged so operators can resend.
    async fn dispatch(&self, message: EmailMessage) {
        match self.notifier.send(&message).await {
            Ok(()) => info!(to = %message.to, subject = %message.subject, "email dispatched"),
            Err(e) => error!(
                error = %e,
                to = %message.to,
                subject = %message.subject,
                "email dispatch failed"
            ),
        }
    }

    async fn user_by_email(
        &self,
        email: &str,
        missing: &'static str,
    ) -> Result<UserRecord, WorkflowError> {
        self.repo
            .find_by_email(email)
            .await
            .map_err(storage)?
            .ok_or(WorkflowError::NotFound(missing))
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: &RegisterRequest) -> WorkflowOutcome {
        outcome(self.try_register(req).await)
    }

    async fn try_register(&self, req: &RegisterRequest) -> Result<WorkflowOutcome, WorkflowError> {
        if req.password != req.confirm_password {
            return Err(WorkflowError::Validation(PASSWORD_MISMATCH));
        }

        let user = match self.repo.create_user(&req.email, &req.password).await {
            Ok(user) => user,
            Err(RepoError::Storage(e)) => return Err(WorkflowError::Storage(e)),
            Err(rejected) => {
                return Err(WorkflowError::Repository {
                    message: USER_NOT_CREATED,
                    errors: rejected.descriptions(),
                })
            }
        };

        // the account exists from here on; token or mail trouble is logged, not rolled back
        match self
            .repo
            .generate_token(&user, TokenPurpose::EmailConfirmation)
            .await
        {
            Ok(token) => {
                let url = self.confirmation_url(user.id, &token_codec::encode(token.as_bytes()));
                self.dispatch(EmailMessage {
                    to: user.email.clone(),
                    subject: CONFIRM_SUBJECT.into(),
                    html_body: format!(
                        "<h1>Welcome</h1><p>Please confirm your email by \
                         <a href='{url}'>clicking here</a></p>"
                    ),
                })
                .await;
            }
            Err(e) => {
                error!(error = %e, user_id = %user.id, "confirmation token not issued")
            }
        }

        info!(user_id = %user.id, "user registered");
        Ok(WorkflowOutcome::success(USER_CREATED))
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn login(&self, req: &LoginRequest) -> WorkflowOutcome {
        outcome(self.try_login(req, OffsetDateTime::now_utc()).await)
    }

    async fn try_login(
        &self,
        req: &LoginRequest,
        now: OffsetDateTime,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let user = self.user_by_email(&req.email, UNKNOWN_LOGIN_EMAIL).await?;

        let ok = self
            .repo
            .check_password(&user, &req.password)
            .await
            .map_err(storage)?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(WorkflowError::CredentialRejected {
                message: INVALID_PASSWORD,
                errors: Vec::new(),
            });
        }

        let issued = self
            .keys
            .issue(
                &SessionIdentity {
                    email: req.email.clone(),
                    subject_id: user.id,
                },
                now,
            )
            .map_err(WorkflowError::Signing)?;

        info!(user_id = %user.id, "user logged in");
        Ok(WorkflowOutcome {
            success: true,
            message: issued.token,
            errors: Vec::new(),
            expiry: Some(issued.expires_at),
        })
    }

    #[instrument(skip(self, token))]
    pub async fn confirm_email(&self, user_id: &str, token: &str) -> WorkflowOutcome {
        outcome(self.try_confirm_email(user_id, token).await)
    }

    async fn try_confirm_email(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        // an id that is not a uuid cannot name any user
        let id = Uuid::parse_str(user_id.trim())
            .map_err(|_| WorkflowError::NotFound(USER_NOT_FOUND))?;
        let user = self
            .repo
            .find_by_id(id)
            .await
            .map_err(storage)?
            .ok_or(WorkflowError::NotFound(USER_NOT_FOUND))?;

        let raw = token_codec::decode_text(token).map_err(|source| {
            WorkflowError::TransportDecode {
                message: EMAIL_NOT_CONFIRMED,
                source,
            }
        })?;

        match self.repo.confirm_email(&user, &raw).await {
            Ok(()) => {
                info!(user_id = %user.id, "email confirmed");
                Ok(WorkflowOutcome::success(EMAIL_CONFIRMED))
            }
            Err(RepoError::Storage(e)) => Err(WorkflowError::Storage(e)),
            Err(rejected) => Err(WorkflowError::CredentialRejected {
                message: EMAIL_NOT_CONFIRMED,
                errors: rejected.descriptions(),
            }),
        }
    }

    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> WorkflowOutcome {
        outcome(self.try_forgot_password(email).await)
    }

    async fn try_forgot_password(&self, email: &str) -> Result<WorkflowOutcome, WorkflowError> {
        let user = self.user_by_email(email, NO_USER_FOR_EMAIL).await?;

        let token = self
            .repo
            .generate_token(&user, TokenPurpose::PasswordReset)
            .await
            .map_err(storage)?;
        let url = self.reset_url(email, &token_codec::encode(token.as_bytes()));

        self.dispatch(EmailMessage {
            to: email.to_string(),
            subject: RESET_SUBJECT.into(),
            html_body: format!(
                "<h1>Follow the instructions to reset your password</h1>\
                 <p>To reset your password <a href='{url}'>click here</a></p>"
            ),
        })
        .await;

        Ok(WorkflowOutcome::success(RESET_LINK_SENT))
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn reset_password(&self, req: &ResetPasswordRequest) -> WorkflowOutcome {
        outcome(self.try_reset_password(req).await)
    }

    async fn try_reset_password(
        &self,
        req: &ResetPasswordRequest,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let user = self.user_by_email(&req.email, NO_USER_FOR_EMAIL).await?;

        if req.new_password != req.confirm_password {
            return Err(WorkflowError::Validation(RESET_MISMATCH));
        }

        let raw = token_codec::decode_text(&req.token).map_err(|source| {
            WorkflowError::TransportDecode {
                message: GENERIC_FAILURE,
                source,
            }
        })?;

        match self.repo.reset_password(&user, &raw, &req.new_password).await {
            Ok(()) => {
                info!(user_id = %user.id, "password reset");
                Ok(WorkflowOutcome::success(PASSWORD_RESET))
            }
            Err(RepoError::Storage(e)) => Err(WorkflowError::Storage(e)),
            Err(rejected @ RepoError::InvalidToken) => Err(WorkflowError::CredentialRejected {
                message: GENERIC_FAILURE,
                errors: rejected.descriptions(),
            }),
            Err(rejected) => Err(WorkflowError::Repository {
                message: GENERIC_FAILURE,
                errors: rejected.descriptions(),
            }),
        }
    }
}
