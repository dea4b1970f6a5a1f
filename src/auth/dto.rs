use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::password::is_valid_email;

const MAX_EMAIL_LEN: usize = 50;
const MIN_PASSWORD_FIELD_LEN: usize = 5;
const MAX_PASSWORD_FIELD_LEN: usize = 50;

// Absent fields deserialize as empty strings so `Validate` reports them.

/// Request body for user registration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Request body for login.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Query string of the emailed confirmation link.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfirmEmailQuery {
    pub userid: String,
    pub token: String,
}

/// Query string of the emailed reset link.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ResetLinkQuery {
    pub email: String,
    pub token: String,
}

/// Uniform envelope returned by every workflow operation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkflowOutcome {
    pub success: bool,
    pub message: String,
    pub errors: Vec<String>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<OffsetDateTime>,
}

impl WorkflowOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            errors: Vec::new(),
            expiry: None,
        }
    }

    pub fn failure(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors,
            expiry: None,
        }
    }
}

/// Public view of the authenticated caller.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
}

fn check_email(email: &str, errors: &mut Vec<String>) {
    if email.is_empty() {
        errors.push("The Email field is required.".into());
    } else if email.chars().count() > MAX_EMAIL_LEN {
        errors.push(format!(
            "The field Email must be a string with a maximum length of {MAX_EMAIL_LEN}."
        ));
    } else if !is_valid_email(email) {
        errors.push("The Email field is not a valid e-mail address.".into());
    }
}

fn check_password_field(field: &str, value: &str, errors: &mut Vec<String>) {
    let len = value.chars().count();
    if value.is_empty() {
        errors.push(format!("The {field} field is required."));
    } else if !(MIN_PASSWORD_FIELD_LEN..=MAX_PASSWORD_FIELD_LEN).contains(&len) {
        errors.push(format!(
            "The field {field} must be a string with a minimum length of \
             {MIN_PASSWORD_FIELD_LEN} and a maximum length of {MAX_PASSWORD_FIELD_LEN}."
        ));
    }
}

/// Shape checks that run before a request reaches the workflow.
pub trait Validate {
    fn validate(&self) -> Vec<String>;
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_email(&self.email, &mut errors);
        check_password_field("Password", &self.password, &mut errors);
        check_password_field("ConfirmPassword", &self.confirm_password, &mut errors);
        errors
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_email(&self.email, &mut errors);
        check_password_field("Password", &self.password, &mut errors);
        errors
    }
}

impl Validate for ForgotPasswordRequest {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_email(&self.email, &mut errors);
        errors
    }
}

impl Validate for ResetPasswordRequest {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_email(&self.email, &mut errors);
        if self.token.trim().is_empty() {
            errors.push("The Token field is required.".into());
        }
        check_password_field("NewPassword", &self.new_password, &mut errors);
        check_password_field("ConfirmPassword", &self.confirm_password, &mut errors);
        errors
    }
}

impl Validate for ResetLinkQuery {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        check_email(&self.email, &mut errors);
        if self.token.trim().is_empty() {
            errors.push("The token parameter is required.".into());
        }
        errors
    }
}

impl Validate for ConfirmEmailQuery {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.userid.trim().is_empty() {
            errors.push("The userid parameter is required.".into());
        }
        if self.token.trim().is_empty() {
            errors.push("The token parameter is required.".into());
        }
        errors
    }
}
