use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::error;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex");
    }
    EMAIL_RE.is_match(email)
}

/// Every password rule `plain` breaks, in a stable order.
pub fn policy_violations(plain: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if plain.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "Passwords must be at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    if plain.chars().all(|c| c.is_alphanumeric()) {
        errors.push("Passwords must have at least one non alphanumeric character.".into());
    }
    if !plain.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Passwords must have at least one digit ('0'-'9').".into());
    }
    if !plain.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Passwords must have at least one lowercase ('a'-'z').".into());
    }
    if !plain.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Passwords must have at least one uppercase ('A'-'Z').".into());
    }
    errors
}
