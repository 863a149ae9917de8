pub mod claims;
pub mod config;
pub mod http;
pub mod pki;
pub mod request;

use claims::{build_claims, ClaimsConfig};
use jsonwebtoken::{Algorithm, Header};
use pki::SigningMaterial;
use request::{validate, ValidationError};
use std::time::{SystemTime, UNIX_EPOCH};
use tee_types::ClaimSet;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
#[error("failed to sign attestation token: {0}")]
pub struct SigningError(#[from] jsonwebtoken::errors::Error);

#[derive(Error, Debug)]
pub enum IssueError {
    #[error(transparent)]
    Rejected(#[from] ValidationError),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Turns a claim set into a compact, signed JWT.
pub trait SignToken {
    fn sign(&self, claims: &ClaimSet) -> Result<String, SigningError>;
}

impl SignToken for SigningMaterial {
    // RS256 with the certificate chain in `x5c`, leaf first.
    fn sign(&self, claims: &ClaimSet) -> Result<String, SigningError> {
        let mut header = Header::new(Algorithm::RS256);
        header.x5c = Some(self.certificate_chain().to_vec());
        Ok(jsonwebtoken::encode(&header, claims, self.key())?)
    }
}

/// Validates token requests, builds their claims and signs them.
///
/// Holds no per-request state, so one instance can be shared by all
/// connections behind an `Arc`.
#[derive(Debug)]
pub struct TokenIssuer<S: SignToken = SigningMaterial> {
    signer: S,
    claims_config: ClaimsConfig,
}

impl<S: SignToken> TokenIssuer<S> {
    pub fn new(signer: S, claims_config: ClaimsConfig) -> Self {
        TokenIssuer {
            signer,
            claims_config,
        }
    }

    /// Issues a token for the raw request body, stamped with the current time.
    pub fn issue(&self, body: &[u8]) -> Result<String, IssueError> {
        self.issue_at(body, unix_now())
    }

    pub fn issue_at(&self, body: &[u8], issued_at: u64) -> Result<String, IssueError> {
        let request = validate(body).map_err(|err| {
            warn!("Rejected attestation token request: {}", err);
            err
        })?;

        info!(audience = %request.audience, nonces = request.nonces.len(), "Creating new token");
        let claims = build_claims(
            &self.claims_config,
            &request.audience,
            &request.nonces,
            issued_at,
        );

        let token = self.signer.sign(&claims).map_err(|err| {
            error!(audience = %request.audience, "Error signing token: {}", err);
            err
        })?;

        debug!(exp = claims.exp, "New token successfully signed");
        Ok(token)
    }
}

fn unix_now() -> u64 {
    seconds_since_epoch(SystemTime::now())
}

fn seconds_since_epoch(now: SystemTime) -> u64 {
    match now.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs(),
        Err(err) => {
            warn!("System clock is {:?} before the Unix epoch, stamping tokens at 0", err.duration());
            0
        }
    }
}
