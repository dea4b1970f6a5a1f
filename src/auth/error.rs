use thiserror::Error;

use super::dto::WorkflowOutcome;
use super::repo::INVALID_TOKEN;
use super::token_codec::TokenCodecError;

/// Message shown for faults the caller can do nothing about.
pub const GENERIC_FAILURE: &str = "Something went wrong";

/// Why a workflow operation failed. Converted into a [`WorkflowOutcome`] at
/// the engine boundary; never returned to callers as an error.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{message}")]
    CredentialRejected {
        message: &'static str,
        errors: Vec<String>,
    },
    #[error("{message}")]
    Repository {
        message: &'static str,
        errors: Vec<String>,
    },
    #[error("{message}: {source}")]
    TransportDecode {
        message: &'static str,
        source: TokenCodecError,
    },
    #[error("credential store failure: {0:#}")]
    Storage(anyhow::Error),
    #[error("session token signing failed: {0:#}")]
    Signing(anyhow::Error),
}

impl From<WorkflowError> for WorkflowOutcome {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(message) | WorkflowError::NotFound(message) => {
                WorkflowOutcome::failure(message, Vec::new())
            }
            WorkflowError::CredentialRejected { message, errors }
            | WorkflowError::Repository { message, errors } => {
                WorkflowOutcome::failure(message, errors)
            }
            // a token that does not decode is indistinguishable from a bad token
            WorkflowError::TransportDecode { message, .. } => {
                WorkflowOutcome::failure(message, vec![INVALID_TOKEN.to_string()])
            }
            WorkflowError::Storage(_) | WorkflowError::Signing(_) => {
                WorkflowOutcome::failure(GENERIC_FAILURE, Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failures_look_like_rejected_tokens() {
        let outcome: WorkflowOutcome = WorkflowError::TransportDecode {
            message: "Email did not confirmed",
            source: TokenCodecError::Base64,
        }
        .into();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Email did not confirmed");
        assert_eq!(outcome.errors, vec!["Invalid token.".to_string()]);
    }

    #[test]
    fn repository_errors_keep_their_order() {
        let outcome: WorkflowOutcome = WorkflowError::Repository {
            message: "User did not create",
            errors: vec!["b".into(), "a".into(), "b".into()],
        }
        .into();
        assert_eq!(outcome.errors, vec!["b", "a", "b"]);
    }

    #[test]
    fn internal_faults_hide_details() {
        let outcome: WorkflowOutcome =
            WorkflowError::Storage(anyhow::anyhow!("connection reset")).into();
        assert_eq!(outcome.message, GENERIC_FAILURE);
        assert!(outcome.errors.is_empty());
    }
}
