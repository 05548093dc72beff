//! Configuration types for the SCEP client.
//!
//! A client needs four things before it can speak to a CA: the endpoint
//! URL, an RSA identity (certificate plus private key) for signing and
//! decrypting pkiMessages, a callback that decides whether to trust the
//! CA certificate, and optionally a CA profile name. Everything is
//! validated when the configuration is built; an invalid client is never
//! constructed.

use std::sync::Arc;
use std::time::Duration;

use der::DecodePem;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use url::Url;
use x509_cert::Certificate;

use crate::error::{Result, ScepError};
use crate::message::codec::DigestAlgorithm;
use crate::message::envelope::ContentCipher;
use crate::oids;

/// Callback deciding whether a CA certificate is trusted.
///
/// The callback receives the candidate certificate and returns the
/// verdict; a typical implementation displays the fingerprint for
/// out-of-band confirmation. Positive verdicts are cached per client
/// instance, so the callback is invoked at most once per distinct
/// certificate.
pub type CaVerifier = Arc<dyn Fn(&Certificate) -> bool + Send + Sync>;

/// The client's enrollment identity.
///
/// Both the certificate key and the private key must be RSA; SCEP
/// requires it for signing and decrypting pkiMessages. For an initial
/// enrollment this is a self-signed certificate over the key pair being
/// enrolled; for a renewal it is the certificate being replaced.
#[derive(Clone)]
pub struct ClientIdentity {
    /// The identity certificate.
    pub certificate: Certificate,

    /// The matching RSA private key.
    pub private_key: RsaPrivateKey,
}

impl ClientIdentity {
    /// Create an identity from parsed parts.
    pub fn new(certificate: Certificate, private_key: RsaPrivateKey) -> Self {
        Self {
            certificate,
            private_key,
        }
    }

    /// Parse an identity from PEM-encoded certificate and key.
    ///
    /// The key may be PKCS#8 (`PRIVATE KEY`) or PKCS#1
    /// (`RSA PRIVATE KEY`).
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certificate = Certificate::from_pem(cert_pem)
            .map_err(|e| ScepError::config(format!("invalid identity certificate: {}", e)))?;
        let key_str = std::str::from_utf8(key_pem)
            .map_err(|_| ScepError::config("identity key is not valid UTF-8 PEM"))?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(key_str)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(key_str))
            .map_err(|e| ScepError::config(format!("invalid identity key: {}", e)))?;
        Ok(Self {
            certificate,
            private_key,
        })
    }

    /// Load an identity from PEM files on disk.
    pub fn from_files(
        cert_path: impl AsRef<std::path::Path>,
        key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self> {
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        Self::from_pem(&cert_pem, &key_pem)
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("subject", &self.certificate.tbs_certificate.subject)
            .finish_non_exhaustive()
    }
}

/// Configuration for a SCEP client.
#[derive(Clone)]
pub struct ScepClientConfig {
    /// The CA (or RA) endpoint URL.
    pub url: Url,

    /// The enrollment identity.
    pub identity: ClientIdentity,

    /// CA trust verification callback.
    pub verifier: CaVerifier,

    /// Optional CA profile, sent as the `message` query parameter of the
    /// informational operations.
    pub profile: Option<String>,

    /// Preferred content cipher; honored only if the CA advertises it.
    pub preferred_cipher: Option<ContentCipher>,

    /// Preferred message digest; honored only if the CA advertises it.
    pub preferred_digest: Option<DigestAlgorithm>,

    /// HTTP request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for ScepClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScepClientConfig")
            .field("url", &self.url)
            .field("identity", &self.identity)
            .field("profile", &self.profile)
            .field("preferred_cipher", &self.preferred_cipher)
            .field("preferred_digest", &self.preferred_digest)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ScepClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ScepClientConfigBuilder {
        ScepClientConfigBuilder::default()
    }
}

/// Builder for [`ScepClientConfig`].
#[derive(Default)]
pub struct ScepClientConfigBuilder {
    url: Option<Url>,
    identity: Option<ClientIdentity>,
    verifier: Option<CaVerifier>,
    profile: Option<String>,
    preferred_cipher: Option<ContentCipher>,
    preferred_digest: Option<DigestAlgorithm>,
    timeout: Option<Duration>,
}

impl ScepClientConfigBuilder {
    /// Set the CA endpoint URL.
    pub fn url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Set the CA endpoint from a pre-parsed URL.
    pub fn url_parsed(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Set the enrollment identity.
    pub fn identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the CA trust verification callback.
    pub fn verifier<F>(mut self, verifier: F) -> Self
    where
        F: Fn(&Certificate) -> bool + Send + Sync + 'static,
    {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Select a CA profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Prefer a content cipher (narrowing only; the CA must advertise it).
    pub fn preferred_cipher(mut self, cipher: ContentCipher) -> Self {
        self.preferred_cipher = Some(cipher);
        self
    }

    /// Prefer a message digest (narrowing only; the CA must advertise it).
    pub fn preferred_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.preferred_digest = Some(digest);
        self
    }

    /// Set the HTTP request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a required field is missing,
    /// the URL has a non-HTTP scheme, a query string, or a fragment, or
    /// the identity certificate does not carry an RSA key.
    pub fn build(self) -> Result<ScepClientConfig> {
        let url = self.url.ok_or_else(|| ScepError::config("URL is required"))?;
        let identity = self
            .identity
            .ok_or_else(|| ScepError::config("identity is required"))?;
        let verifier = self
            .verifier
            .ok_or_else(|| ScepError::config("CA verification callback is required"))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ScepError::config(format!(
                "URL scheme must be http or https, got {:?}",
                url.scheme()
            )));
        }
        if url.query().is_some() {
            return Err(ScepError::config("URL must not contain a query string"));
        }
        if url.fragment().is_some() {
            return Err(ScepError::config("URL must not contain a fragment"));
        }

        let spki_alg = &identity
            .certificate
            .tbs_certificate
            .subject_public_key_info
            .algorithm
            .oid;
        if *spki_alg != oids::ID_RSA_ENCRYPTION {
            return Err(ScepError::config(format!(
                "identity certificate key must be RSA, got algorithm {}",
                spki_alg
            )));
        }

        Ok(ScepClientConfig {
            url,
            identity,
            verifier,
            profile: self.profile,
            preferred_cipher: self.preferred_cipher,
            preferred_digest: self.preferred_digest,
            timeout: self.timeout.unwrap_or(Duration::from_secs(30)),
        })
    }
}
