use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::EncodingKey;
use rustls_pki_types::{pem::PemObject, CertificateDer};
use std::path::PathBuf;
use thiserror::Error;

const SIGNING_KEY_FILE: &str = "leaf-key.pem";
const LEAF_FILE: &str = "leaf.pem";
const INTERMEDIATE_FILE: &str = "intermediate.pem";
const ROOT_FILE: &str = "root.pem";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("error reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode PEM block containing the certificate {name}: {reason:?}")]
    Pem {
        name: &'static str,
        reason: rustls_pki_types::pem::Error,
    },

    #[error("error parsing private key: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),

    #[error("certificate chain is empty")]
    EmptyChain,

    #[error("certificate chain entry {0} is empty")]
    EmptyCertificate(usize),
}

/// Source of the signing key and the certificate chain that vouches for it.
pub trait KeyChainProvider {
    /// PEM encoded RSA private key of the leaf certificate.
    fn signing_key_pem(&self) -> Result<String, ProviderError>;

    /// PEM encoded certificates ordered leaf, intermediate, root.
    fn certificate_chain_pem(&self) -> Result<Vec<(&'static str, String)>, ProviderError>;

    fn root_certificate_pem(&self) -> Result<String, ProviderError>;
}

/// Key material compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedPki;

impl KeyChainProvider for EmbeddedPki {
    fn signing_key_pem(&self) -> Result<String, ProviderError> {
        Ok(include_str!("../pki/leaf-key.pem").to_owned())
    }

    fn certificate_chain_pem(&self) -> Result<Vec<(&'static str, String)>, ProviderError> {
        Ok(vec![
            (LEAF_FILE, include_str!("../pki/leaf.pem").to_owned()),
            (INTERMEDIATE_FILE, include_str!("../pki/intermediate.pem").to_owned()),
            (ROOT_FILE, include_str!("../pki/root.pem").to_owned()),
        ])
    }

    fn root_certificate_pem(&self) -> Result<String, ProviderError> {
        Ok(include_str!("../pki/root.pem").to_owned())
    }
}

/// Key material read from a directory laid out like the embedded one:
/// `leaf-key.pem`, `leaf.pem`, `intermediate.pem` and `root.pem`.
#[derive(Debug, Clone)]
pub struct DirectoryPki {
    dir: PathBuf,
}

impl DirectoryPki {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryPki { dir: dir.into() }
    }

    fn read(&self, name: &str) -> Result<String, ProviderError> {
        let path = self.dir.join(name);
        std::fs::read_to_string(&path).map_err(|source| ProviderError::Read { path, source })
    }
}

impl KeyChainProvider for DirectoryPki {
    fn signing_key_pem(&self) -> Result<String, ProviderError> {
        self.read(SIGNING_KEY_FILE)
    }

    fn certificate_chain_pem(&self) -> Result<Vec<(&'static str, String)>, ProviderError> {
        [LEAF_FILE, INTERMEDIATE_FILE, ROOT_FILE]
            .into_iter()
            .map(|name| Ok((name, self.read(name)?)))
            .collect()
    }

    fn root_certificate_pem(&self) -> Result<String, ProviderError> {
        self.read(ROOT_FILE)
    }
}

/// RSA signing key plus the `x5c` chain, loaded once and shared read-only.
#[derive(Clone)]
pub struct SigningMaterial {
    key: EncodingKey,
    certificate_chain: Vec<String>,
}

impl SigningMaterial {
    /// `certificate_chain` holds standard base64 DER certificates, leaf first.
    pub fn new(key: EncodingKey, certificate_chain: Vec<String>) -> Result<Self, ProviderError> {
        if certificate_chain.is_empty() {
            return Err(ProviderError::EmptyChain);
        }
        if let Some(index) = certificate_chain.iter().position(String::is_empty) {
            return Err(ProviderError::EmptyCertificate(index));
        }

        Ok(SigningMaterial {
            key,
            certificate_chain,
        })
    }

    pub fn load<P: KeyChainProvider>(provider: &P) -> Result<Self, ProviderError> {
        let key = EncodingKey::from_rsa_pem(provider.signing_key_pem()?.as_bytes())?;
        let certificate_chain = provider
            .certificate_chain_pem()?
            .into_iter()
            .map(|(name, pem)| base64_encoded_der(name, &pem))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(key, certificate_chain)
    }

    pub fn key(&self) -> &EncodingKey {
        &self.key
    }

    pub fn certificate_chain(&self) -> &[String] {
        &self.certificate_chain
    }
}

impl std::fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("key", &"<redacted>")
            .field("certificate_chain", &self.certificate_chain.len())
            .finish()
    }
}

fn base64_encoded_der(name: &'static str, pem: &str) -> Result<String, ProviderError> {
    let der = CertificateDer::from_pem_slice(pem.as_bytes())
        .map_err(|reason| ProviderError::Pem { name, reason })?;
    Ok(STANDARD.encode(der.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::{DirectoryPki, EmbeddedPki, KeyChainProvider, ProviderError, SigningMaterial};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use jsonwebtoken::EncodingKey;
    use rustls_pki_types::{pem::PemObject, CertificateDer};

    #[test]
    fn test_embedded_chain_is_leaf_first() {
        let material = SigningMaterial::load(&EmbeddedPki).unwrap();
        let chain = material.certificate_chain();
        assert_eq!(chain.len(), 3);

        let expected = [
            include_str!("../pki/leaf.pem"),
            include_str!("../pki/intermediate.pem"),
            include_str!("../pki/root.pem"),
        ];
        for (encoded, pem) in chain.iter().zip(expected) {
            let der = CertificateDer::from_pem_slice(pem.as_bytes()).unwrap();
            assert_eq!(STANDARD.decode(encoded).unwrap(), der.as_ref());
            assert!(!encoded.contains('\n'));
        }
    }

    #[test]
    fn test_root_certificate_pem() {
        let root = EmbeddedPki.root_certificate_pem().unwrap();
        assert!(root.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_directory_provider_matches_embedded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("leaf-key.pem"), EmbeddedPki.signing_key_pem().unwrap())
            .unwrap();
        for (name, pem) in EmbeddedPki.certificate_chain_pem().unwrap() {
            std::fs::write(dir.path().join(name), pem).unwrap();
        }

        let provider = DirectoryPki::new(dir.path());
        let loaded = SigningMaterial::load(&provider).unwrap();
        let embedded = SigningMaterial::load(&EmbeddedPki).unwrap();
        assert_eq!(loaded.certificate_chain(), embedded.certificate_chain());
    }

    #[test]
    fn test_directory_provider_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SigningMaterial::load(&DirectoryPki::new(dir.path())).unwrap_err();
        assert!(matches!(err, ProviderError::Read { .. }));
    }

    #[test]
    fn test_invalid_certificate_pem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("leaf-key.pem"), EmbeddedPki.signing_key_pem().unwrap())
            .unwrap();
        std::fs::write(dir.path().join("leaf.pem"), "not a certificate").unwrap();
        std::fs::write(dir.path().join("intermediate.pem"), "").unwrap();
        std::fs::write(dir.path().join("root.pem"), "").unwrap();

        let err = SigningMaterial::load(&DirectoryPki::new(dir.path())).unwrap_err();
        assert!(matches!(err, ProviderError::Pem { name: "leaf.pem", .. }));
    }

    #[test]
    fn test_invalid_signing_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("leaf-key.pem"), "garbage").unwrap();
        let err = SigningMaterial::load(&DirectoryPki::new(dir.path())).unwrap_err();
        assert!(matches!(err, ProviderError::Key(_)));
    }

    #[test]
    fn test_chain_invariants() {
        let key = EncodingKey::from_secret(b"unused");
        assert!(matches!(
            SigningMaterial::new(key.clone(), vec![]),
            Err(ProviderError::EmptyChain)
        ));
        assert!(matches!(
            SigningMaterial::new(key, vec!["AAAA".to_string(), String::new()]),
            Err(ProviderError::EmptyCertificate(1))
        ));
    }
}
