use crate::claims::{
    ClaimsConfig, PlatformProfile, DEFAULT_GOOGLE_SERVICE_ACCOUNT,
    DEFAULT_TOKEN_EXPIRATION_IN_MINUTES,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use tee_types::DEFAULT_SOCKET_PATH;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error reading platform profile {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid platform profile {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Command line arguments of the mock server. Every flag can also be set
/// through a `TEE_` prefixed environment variable.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Unix socket to serve the token endpoint on
    #[arg(long, env = "TEE_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: PathBuf,

    /// Service account reported in `google_service_accounts`
    #[arg(long, env = "TEE_GOOGLE_SERVICE_ACCOUNT", default_value = DEFAULT_GOOGLE_SERVICE_ACCOUNT)]
    pub google_service_account: String,

    /// Lifetime of issued tokens
    #[arg(long, env = "TEE_TOKEN_EXPIRATION_IN_MINUTES", default_value_t = DEFAULT_TOKEN_EXPIRATION_IN_MINUTES)]
    pub token_expiration_in_minutes: u32,

    /// Directory with leaf-key.pem, leaf.pem, intermediate.pem and root.pem.
    /// The embedded test PKI is used when unset.
    #[arg(long, env = "TEE_PKI_DIR")]
    pub pki_dir: Option<PathBuf>,

    /// JSON file replacing the simulated platform and workload claims
    #[arg(long, env = "TEE_PLATFORM_PROFILE")]
    pub platform_profile: Option<PathBuf>,
}

impl Config {
    pub fn claims_config(&self) -> Result<ClaimsConfig, ConfigError> {
        let profile = match &self.platform_profile {
            Some(path) => load_platform_profile(path)?,
            None => PlatformProfile::default(),
        };

        Ok(ClaimsConfig {
            google_service_account: self.google_service_account.clone(),
            token_expiration_in_minutes: self.token_expiration_in_minutes,
            profile,
        })
    }
}

pub fn load_platform_profile(path: &Path) -> Result<PlatformProfile, ConfigError> {
    let data = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
