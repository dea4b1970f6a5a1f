//! Unpadded base64url wrapping for one-time tokens carried in links.

use base64ct::{Base64UrlUnpadded, Encoding};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenCodecError {
    #[error("invalid base64url encoding")]
    Base64,
    #[error("token is not valid utf-8")]
    Utf8,
}

pub fn encode(raw: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(raw)
}

pub fn decode(encoded: &str) -> Result<Vec<u8>, TokenCodecError> {
    Base64UrlUnpadded::decode_vec(encoded.trim()).map_err(|_| TokenCodecError::Base64)
}

/// Decode and interpret the payload as the repository's textual token.
pub fn decode_text(encoded: &str) -> Result<String, TokenCodecError> {
    let bytes = decode(encoded)?;
    String::from_utf8(bytes).map_err(|_| TokenCodecError::Utf8)
}
