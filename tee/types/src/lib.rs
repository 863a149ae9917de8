use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Socket the Confidential Space launcher exposes to workloads.
pub const DEFAULT_SOCKET_PATH: &str = "/run/container_launcher/teeserver.sock";
pub const TOKEN_ENDPOINT: &str = "/v1/token";
pub const PKI_TOKEN_TYPE: &str = "PKI";

/// Body of a `POST /v1/token` request.
///
/// Missing and `null` fields decode to their empty value so the server can report
/// which one is wrong instead of failing with a generic parse error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationTokenRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub audience: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub token_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nonces: Vec<String>,
}

impl AttestationTokenRequest {
    pub fn pki(audience: &str, nonces: Vec<String>) -> Self {
        AttestationTokenRequest {
            audience: audience.to_owned(),
            token_type: PKI_TOKEN_TYPE.to_owned(),
            nonces,
        }
    }

    // Binds arbitrary bytes (e.g. TLS exported keying material) to the token
    // by appending them hex encoded to the nonce list.
    pub fn with_binary_nonce(mut self, data: &[u8]) -> Self {
        self.nonces.push(hex::encode(data));
        self
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// JSON body of every non-200 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

/// Payload of a Confidential Space attestation token.
///
/// https://cloud.google.com/confidential-computing/confidential-space/docs/reference/token-claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    pub aud: String,
    pub exp: u64,
    pub iat: u64,
    pub iss: String,
    pub nbf: u64,
    pub sub: String,
    pub eat_nonce: Vec<String>,
    pub eat_profile: String,
    pub secboot: bool,
    pub oemid: u32,
    pub hwmodel: String,
    pub swname: String,
    pub swversion: Vec<String>,
    pub dbgstat: String,
    pub google_service_accounts: Vec<String>,
    pub submods: SubModules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubModules {
    pub confidential_space: ConfidentialSpace,
    pub container: Container,
    pub gce: Gce,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidentialSpace {
    pub monitoring_enabled: MonitoringEnabled,
    pub support_attributes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringEnabled {
    pub memory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub image_digest: String,
    pub image_id: String,
    pub image_reference: String,
    pub image_signatures: Vec<ImageSignature>,
    pub restart_policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSignature {
    pub key_id: String,
    pub signature: String,
    pub signature_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gce {
    pub instance_id: String,
    pub instance_name: String,
    pub project_id: String,
    pub project_number: String,
    pub zone: String,
}
