//! The SCEP client façade.
//!
//! A [`Client`] binds the endpoint, the enrollment identity, and the CA
//! trust callback together and exposes the protocol's five public
//! operations: capability discovery, CA certificate distribution,
//! rollover distribution, enrollment, and certificate/CRL queries.
//!
//! The client holds two caches for its lifetime: advertised capabilities
//! keyed by profile, and the set of CA certificates the user has
//! approved. Transports are created per operation; the client itself is
//! just configuration plus those caches, so sharing it behind an `Arc`
//! across tasks is safe.
//!
//! # Example
//!
//! ```no_run
//! use scep_client::{Client, ClientIdentity, ScepClientConfig};
//!
//! # async fn example() -> scep_client::Result<()> {
//! let identity = ClientIdentity::from_files("client.crt", "client.key")?;
//! let config = ScepClientConfig::builder()
//!     .url("http://ca.example.com/cgi-bin/pkiclient.exe")?
//!     .identity(identity)
//!     .verifier(|_ca| true) // confirm the fingerprint out of band
//!     .build()?;
//!
//! let client = Client::new(config)?;
//! let caps = client.capabilities().await?;
//! println!("CA supports POST: {}", caps.post_supported());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use x509_cert::crl::CertificateList;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use crate::capabilities::Capabilities;
use crate::chain::CaChain;
use crate::config::ScepClientConfig;
use crate::error::{Result, ScepError};
use crate::message::codec::{DigestAlgorithm, PkiMessageDecoder, PkiMessageEncoder};
use crate::message::envelope::{ContentCipher, EnvelopeDecoder, EnvelopeEncoder};
use crate::message::pkcs7::IssuerAndSerialNumber;
use crate::message::MessageType;
use crate::transaction::{EnrollmentTransaction, QueryTransaction, TransactionState};
use crate::transport::{Transport, TransportMethod};
use crate::trust::TrustCache;

/// A SCEP requester bound to one CA endpoint.
#[derive(Debug)]
pub struct Client {
    config: ScepClientConfig,
    http: reqwest::Client,
    capabilities: Mutex<HashMap<String, Capabilities>>,
    trust: TrustCache,
}

impl Client {
    /// Create a client from a validated configuration.
    pub fn new(config: ScepClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            http,
            capabilities: Mutex::new(HashMap::new()),
            trust: TrustCache::new(),
        })
    }

    /// The client configuration.
    pub fn config(&self) -> &ScepClientConfig {
        &self.config
    }

    /// The capabilities the CA advertises, cached per profile.
    ///
    /// The first call issues a `GetCACaps` request; later calls are
    /// served from the cache. A failed probe is not cached.
    pub async fn capabilities(&self) -> Result<Capabilities> {
        let key = self.profile_key();
        if let Some(caps) = self
            .capabilities
            .lock()
            .expect("capability cache poisoned")
            .get(&key)
        {
            return Ok(caps.clone());
        }

        let caps = self
            .informational_transport()
            .get_ca_caps(self.config.profile.as_deref())
            .await?;
        tracing::debug!(?caps, "CA capabilities fetched");
        self.capabilities
            .lock()
            .expect("capability cache poisoned")
            .insert(key, caps.clone());
        Ok(caps)
    }

    /// Fetch and resolve the CA (and RA) certificate chain.
    ///
    /// The CA certificate is run through the trust callback; a positive
    /// verdict is cached, a negative one fails with a trust error.
    pub async fn ca_certificates(&self) -> Result<CaChain> {
        let certs = self
            .informational_transport()
            .get_ca_cert(self.config.profile.as_deref())
            .await?;
        let chain = CaChain::resolve(certs)?;
        self.trust.verify(chain.ca(), &self.config.verifier)?;
        Ok(chain)
    }

    /// Fetch the CA's rollover (next-generation) certificate chain.
    ///
    /// Requires the `GetNextCACert` capability; the response must be
    /// signed under the current CA certificate.
    pub async fn rollover_certificates(&self) -> Result<Vec<Certificate>> {
        if !self.capabilities().await?.rollover_supported() {
            return Err(ScepError::unsupported("GetNextCACert"));
        }
        let chain = self.ca_certificates().await?;
        self.informational_transport()
            .get_next_ca_cert(self.config.profile.as_deref(), chain.ca())
            .await
    }

    /// Prepare an enrollment transaction for `csr`.
    ///
    /// The transaction is returned unsent; the caller drives `send` and,
    /// while the CA keeps the request pending, `poll`. A self-signed
    /// identity enrolls as `PKCSReq`; an identity issued by a CA renews
    /// as `RenewalReq` when the CA advertises `Renewal`.
    pub async fn enroll(&self, csr: CertReq) -> Result<EnrollmentTransaction> {
        let caps = self.capabilities().await?;
        let chain = self.ca_certificates().await?;

        let identity = &self.config.identity.certificate;
        let self_signed =
            identity.tbs_certificate.subject == identity.tbs_certificate.issuer;
        let renewal = !self_signed && caps.renewal_supported();

        let transport = self.transactional_transport(&caps);
        let encoder = self.encoder(&caps, chain.recipient().clone());
        let decoder = self.decoder(chain.certificates().to_vec());

        EnrollmentTransaction::new(
            transport,
            encoder,
            decoder,
            csr,
            chain.ca().clone(),
            renewal,
        )
    }

    /// Query the CA for an issued certificate by serial number.
    pub async fn certificate(&self, serial: &SerialNumber) -> Result<Vec<Certificate>> {
        let caps = self.capabilities().await?;
        let chain = self.ca_certificates().await?;

        let subject = IssuerAndSerialNumber {
            issuer: chain.ca().tbs_certificate.issuer.clone(),
            serial_number: serial.clone(),
        };
        let mut transaction = QueryTransaction::new(
            self.transactional_transport(&caps),
            self.encoder(&caps, chain.recipient().clone()),
            self.decoder(chain.certificates().to_vec()),
            subject,
            MessageType::GetCert,
        )?;

        match transaction.send().await? {
            TransactionState::CertIssued => Ok(transaction
                .cert_store()
                .map(|store| store.certificates().to_vec())
                .unwrap_or_default()),
            _ => Err(ScepError::OperationFailure {
                fail_info: transaction
                    .fail_info()
                    .ok_or_else(|| ScepError::protocol("query failed without failInfo"))?,
            }),
        }
    }

    /// Query the CA for its certificate revocation list.
    ///
    /// Returns the first CRL of the decoded store, or `None` when the CA
    /// answered with an empty store. CAs that publish their CRL through
    /// distribution points do not serve it over SCEP; that case fails
    /// with an unsupported-operation error.
    pub async fn crl(&self) -> Result<Option<CertificateList>> {
        let caps = self.capabilities().await?;
        let chain = self.ca_certificates().await?;

        if chain.ca_has_distribution_points() {
            return Err(ScepError::unsupported(
                "CA publishes its CRL via distribution points",
            ));
        }

        let subject = IssuerAndSerialNumber::from_certificate(chain.ca());
        let mut transaction = QueryTransaction::new(
            self.transactional_transport(&caps),
            self.encoder(&caps, chain.recipient().clone()),
            self.decoder(chain.certificates().to_vec()),
            subject,
            MessageType::GetCrl,
        )?;

        match transaction.send().await? {
            TransactionState::CertIssued => Ok(transaction
                .cert_store()
                .and_then(|store| store.crls().first().cloned())),
            _ => Err(ScepError::OperationFailure {
                fail_info: transaction
                    .fail_info()
                    .ok_or_else(|| ScepError::protocol("query failed without failInfo"))?,
            }),
        }
    }

    fn profile_key(&self) -> String {
        self.config.profile.clone().unwrap_or_default()
    }

    /// Transport for the always-GET informational operations.
    fn informational_transport(&self) -> Transport {
        Transport::new(
            self.http.clone(),
            self.config.url.clone(),
            TransportMethod::Get,
        )
    }

    /// Transport for PKIOperation, POST when the CA advertises it.
    fn transactional_transport(&self, caps: &Capabilities) -> Transport {
        let method = if caps.post_supported() {
            TransportMethod::Post
        } else {
            TransportMethod::Get
        };
        Transport::new(self.http.clone(), self.config.url.clone(), method)
    }

    fn encoder(&self, caps: &Capabilities, recipient: Certificate) -> PkiMessageEncoder {
        let cipher = ContentCipher::negotiate(caps, self.config.preferred_cipher);
        let digest = DigestAlgorithm::negotiate(caps, self.config.preferred_digest);
        tracing::debug!(
            cipher = cipher.as_str(),
            digest = digest.as_str(),
            "negotiated message algorithms"
        );
        PkiMessageEncoder::new(
            self.config.identity.certificate.clone(),
            self.config.identity.private_key.clone(),
            EnvelopeEncoder::new(recipient, cipher),
            digest,
        )
    }

    fn decoder(&self, trusted_signers: Vec<Certificate>) -> PkiMessageDecoder {
        PkiMessageDecoder::with_trusted_signers(
            EnvelopeDecoder::new(
                self.config.identity.certificate.clone(),
                self.config.identity.private_key.clone(),
            ),
            trusted_signers,
        )
    }
}
