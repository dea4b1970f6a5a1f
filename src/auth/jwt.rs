use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::{SessionClaims, SessionIdentity};
use crate::config::{ConfigError, JwtConfig};

/// Fixed lifetime of every session token.
pub const SESSION_TTL: Duration = Duration::days(30);

/// HS256 keys need at least 128 bits of secret.
pub const MIN_SECRET_BYTES: usize = 16;

/// Signing and verification keys plus the issuer/audience they are bound to.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

/// A freshly signed session token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

impl SessionKeys {
    pub fn new(cfg: &JwtConfig) -> Result<Self, ConfigError> {
        if cfg.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::SigningKey {
                min: MIN_SECRET_BYTES,
            });
        }
        if cfg.issuer.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_ISSUER"));
        }
        if cfg.audience.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_AUDIENCE"));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        })
    }

    pub fn issue(
        &self,
        identity: &SessionIdentity,
        now: OffsetDateTime,
    ) -> anyhow::Result<IssuedToken> {
        let iat = now.unix_timestamp();
        let exp = (now + SESSION_TTL).unix_timestamp();
        let claims = SessionClaims {
            email: identity.email.clone(),
            sub: identity.subject_id,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %identity.subject_id, "session token signed");
        Ok(IssuedToken {
            token,
            expires_at: OffsetDateTime::from_unix_timestamp(exp)?,
        })
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::Encoding;
    use uuid::Uuid;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> SessionKeys {
        SessionKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
        })
        .expect("valid jwt config")
    }

    fn identity() -> SessionIdentity {
        SessionIdentity {
            email: "a@x.com".into(),
            subject_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let keys = make_keys("0123456789abcdef", "test-issuer", "test-aud");
        let who = identity();
        let now = OffsetDateTime::now_utc();
        let issued = keys.issue(&who, now).expect("issue");
        let claims = keys.verify(&issued.token).expect("verify");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.sub, who.subject_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.iat, now.unix_timestamp());
    }

    #[test]
    fn expiry_is_thirty_days_after_issuance() {
        let keys = make_keys("0123456789abcdef", "iss", "aud");
        let now = OffsetDateTime::now_utc();
        let issued = keys.issue(&identity(), now).expect("issue");
        let claims = keys.verify(&issued.token).expect("verify");
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
        assert_eq!(issued.expires_at.unix_timestamp(), claims.exp);
        assert!((issued.expires_at - (now + Duration::days(30))).abs() < Duration::seconds(1));
    }

    #[test]
    fn email_claim_uses_capitalised_name() {
        let keys = make_keys("0123456789abcdef", "iss", "aud");
        let issued = keys.issue(&identity(), OffsetDateTime::now_utc()).unwrap();
        let payload = issued.token.split('.').nth(1).unwrap();
        let json = base64ct::Base64UrlUnpadded::decode_vec(payload).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["Email"], "a@x.com");
        assert!(value.get("sub").is_some());
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("same-secret-0123456", "good-iss", "good-aud");
        let bad = make_keys("same-secret-0123456", "bad-iss", "bad-aud");
        let issued = good.issue(&identity(), OffsetDateTime::now_utc()).unwrap();
        assert!(bad.verify(&issued.token).is_err());
    }

    #[test]
    fn verify_rejects_other_secret() {
        let a = make_keys("secret-a-0123456789", "iss", "aud");
        let b = make_keys("secret-b-0123456789", "iss", "aud");
        let issued = a.issue(&identity(), OffsetDateTime::now_utc()).unwrap();
        assert!(b.verify(&issued.token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys("0123456789abcdef", "iss", "aud");
        let long_ago = OffsetDateTime::now_utc() - Duration::days(31);
        let issued = keys.issue(&identity(), long_ago).unwrap();
        assert!(keys.verify(&issued.token).is_err());
    }

    #[test]
    fn short_or_missing_secret_is_a_config_error() {
        let err = SessionKeys::new(&JwtConfig {
            secret: "short".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
        })
        .err()
        .expect("short secret must fail");
        assert!(matches!(err, ConfigError::SigningKey { min: 16 }));

        let err = SessionKeys::new(&JwtConfig {
            secret: "0123456789abcdef".into(),
            issuer: " ".into(),
            audience: "aud".into(),
        })
        .err()
        .expect("blank issuer must fail");
        assert!(matches!(err, ConfigError::Missing("JWT_ISSUER")));
    }
}
