use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Configuration problems are fatal at startup, never per request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("token signing key must be at least {min} bytes")]
    SigningKey { min: usize },
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Public base for links sent by email, e.g. `https://example.com/api/auth`.
    pub app_url: Url,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let app_url = required("APP_URL")?;
        let app_url = Url::parse(&app_url).map_err(|e| ConfigError::Invalid {
            name: "APP_URL",
            reason: e.to_string(),
        })?;

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: optional("JWT_ISSUER").unwrap_or_else(|| "authflow".into()),
            audience: optional("JWT_AUDIENCE").unwrap_or_else(|| "authflow-users".into()),
        };

        let mail = MailConfig {
            api_url: optional("MAIL_API_URL"),
            api_key: optional("MAIL_API_KEY"),
            from: optional("MAIL_FROM").unwrap_or_else(|| "no-reply@localhost".into()),
        };
        if let Some(api_url) = &mail.api_url {
            Url::parse(api_url).map_err(|e| ConfigError::Invalid {
                name: "MAIL_API_URL",
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            database_url,
            app_url,
            jwt,
            mail,
        })
    }
}
