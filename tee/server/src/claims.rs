use serde::Deserialize;
use std::collections::BTreeMap;
use tee_types::{
    ClaimSet, ConfidentialSpace, Container, Gce, ImageSignature, MonitoringEnabled, SubModules,
};

pub const DEFAULT_GOOGLE_SERVICE_ACCOUNT: &str = "tee-mock-server@localhost.gserviceaccount.com";
pub const DEFAULT_TOKEN_EXPIRATION_IN_MINUTES: u32 = 5;

/// The simulated platform and workload every token describes.
///
/// `Default` is a Confidential Space VM on AMD SEV running the stock nginx
/// image. A different profile can be loaded from JSON at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformProfile {
    pub issuer: String,
    pub eat_profile: String,
    pub secboot: bool,
    pub oemid: u32,
    pub hwmodel: String,
    pub swname: String,
    pub swversion: Vec<String>,
    pub dbgstat: String,
    pub confidential_space: ConfidentialSpace,
    pub container: Container,
    pub gce: Gce,
}

impl PlatformProfile {
    /// Compute Engine resource path of the simulated VM, used as `sub`.
    pub fn subject(&self) -> String {
        format!(
            "https://www.googleapis.com/compute/v1/projects/{}/zones/{}/instances/{}",
            self.gce.project_id, self.gce.zone, self.gce.instance_name
        )
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        let env = [
            ("HOSTNAME", "HOST_NAME"),
            ("NGINX_VERSION", "1.27.0"),
            ("NJS_RELEASE", "2~bookworm"),
            ("NJS_VERSION", "0.8.4"),
            (
                "PATH",
                "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
            ),
            ("PKG_RELEASE", "2~bookworm"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>();

        let image_signatures = [
            ("<hexadecimal-sha256-fingerprint-public-key1>", "RSASSA_PSS_SHA256"),
            ("<hexadecimal-sha256-fingerprint-public-key2>", "RSASSA_PSS_SHA256"),
            ("<hexadecimal-sha256-fingerprint-public-key3>", "ECDSA_P256_SHA256"),
        ]
        .into_iter()
        .map(|(key_id, algorithm)| ImageSignature {
            key_id: key_id.to_string(),
            signature: "<base64-encoded-signature>".to_string(),
            signature_algorithm: algorithm.to_string(),
        })
        .collect();

        PlatformProfile {
            issuer: "https://confidentialcomputing.googleapis.com".to_string(),
            eat_profile: "https://cloud.google.com/confidential-computing/confidential-space/docs/reference/token-claims".to_string(),
            secboot: true,
            oemid: 11129,
            hwmodel: "GCP_AMD_SEV".to_string(),
            swname: "CONFIDENTIAL_SPACE".to_string(),
            swversion: vec!["240900".to_string()],
            dbgstat: "disabled-since-boot".to_string(),
            confidential_space: ConfidentialSpace {
                monitoring_enabled: MonitoringEnabled { memory: false },
                support_attributes: vec![
                    "LATEST".to_string(),
                    "STABLE".to_string(),
                    "USABLE".to_string(),
                ],
            },
            container: Container {
                args: vec![
                    "/customnonce".to_string(),
                    "/docker-entrypoint.sh".to_string(),
                    "nginx".to_string(),
                    "-g".to_string(),
                    "daemon off;".to_string(),
                ],
                env,
                image_digest:
                    "sha256:67682bda769fae1ccf5183192b8daf37b64cae99c6c3302650f6f8bf5f0f95df"
                        .to_string(),
                image_id: "sha256:fffffc90d343cbcb01a5032edac86db5998c536cd0a366514121a45c6723765c"
                    .to_string(),
                image_reference: "docker.io/library/nginx:latest".to_string(),
                image_signatures,
                restart_policy: "Never".to_string(),
            },
            gce: Gce {
                instance_id: "INSTANCE_ID".to_string(),
                instance_name: "INSTANCE_NAME".to_string(),
                project_id: "PROJECT_ID".to_string(),
                project_number: "PROJECT_NUMBER".to_string(),
                zone: "us-central1-a".to_string(),
            },
        }
    }
}

/// Everything the claim builder needs apart from the request itself.
#[derive(Debug, Clone)]
pub struct ClaimsConfig {
    pub google_service_account: String,
    pub token_expiration_in_minutes: u32,
    pub profile: PlatformProfile,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        ClaimsConfig {
            google_service_account: DEFAULT_GOOGLE_SERVICE_ACCOUNT.to_string(),
            token_expiration_in_minutes: DEFAULT_TOKEN_EXPIRATION_IN_MINUTES,
            profile: PlatformProfile::default(),
        }
    }
}

/// Builds the claims of one token. `issued_at` is seconds since the UNIX epoch.
pub fn build_claims(
    config: &ClaimsConfig,
    audience: &str,
    nonces: &[String],
    issued_at: u64,
) -> ClaimSet {
    let profile = &config.profile;
    let lifetime = u64::from(config.token_expiration_in_minutes) * 60;

    ClaimSet {
        aud: audience.to_owned(),
        exp: issued_at + lifetime,
        iat: issued_at,
        iss: profile.issuer.clone(),
        nbf: issued_at,
        sub: profile.subject(),
        eat_nonce: nonces.to_vec(),
        eat_profile: profile.eat_profile.clone(),
        secboot: profile.secboot,
        oemid: profile.oemid,
        hwmodel: profile.hwmodel.clone(),
        swname: profile.swname.clone(),
        swversion: profile.swversion.clone(),
        dbgstat: profile.dbgstat.clone(),
        google_service_accounts: vec![config.google_service_account.clone()],
        submods: SubModules {
            confidential_space: profile.confidential_space.clone(),
            container: profile.container.clone(),
            gce: profile.gce.clone(),
        },
    }
}
