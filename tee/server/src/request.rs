use tee_types::{AttestationTokenRequest, PKI_TOKEN_TYPE};
use thiserror::Error;

/// A token request that passed validation. The token type is always PKI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRequest {
    pub audience: String,
    pub nonces: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("failed to parse attestation token request")]
    Parse(#[source] serde_json::Error),

    #[error("invalid token type: {0}")]
    UnsupportedTokenType(String),

    #[error("audience not set")]
    MissingAudience,
}

/// Parses and validates the raw body of a token request.
pub fn validate(body: &[u8]) -> Result<AttestationRequest, ValidationError> {
    let request: AttestationTokenRequest =
        serde_json::from_slice(body).map_err(ValidationError::Parse)?;

    if request.token_type != PKI_TOKEN_TYPE {
        return Err(ValidationError::UnsupportedTokenType(request.token_type));
    }

    if request.audience.is_empty() {
        return Err(ValidationError::MissingAudience);
    }

    Ok(AttestationRequest {
        audience: request.audience,
        nonces: request.nonces,
    })
}
