use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload carried by session tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    #[serde(rename = "Email")]
    pub email: String, // login email
    pub sub: Uuid,     // user ID
    pub iat: i64,      // issued at (unix timestamp)
    pub exp: i64,      // expires at (unix timestamp)
    pub iss: String,   // issuer
    pub aud: String,   // audience
}

/// Identity a session token is minted for.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub email: String,
    pub subject_id: Uuid,
}
