//! Shared test infrastructure: a fixture PKI with fixed RSA keys and a
//! wiremock-backed SCEP CA that decodes real client messages and answers
//! with real CertRep messages built from the crate's own codecs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};

use base64::prelude::*;
use der::asn1::{Any, BitString, OctetString, UtcTime};
use der::{DateTime, Encode};
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};
use x509_cert::crl::{CertificateList, TbsCertList};
use x509_cert::ext::pkix::{KeyUsage, KeyUsages};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::{Certificate, TbsCertificate, Version};

use scep_client::message::codec::{
    sign_data, DigestAlgorithm, PkiMessageDecoder, PkiMessageEncoder,
};
use scep_client::message::envelope::{ContentCipher, EnvelopeDecoder, EnvelopeEncoder};
use scep_client::message::pkcs7::degenerate_bag;
use scep_client::message::{FailInfo, MessageType, Nonce, PkiMessage, PkiStatus, TransactionId};

const SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
const KEY_USAGE_OID: &str = "2.5.29.15";
const CRL_DP_OID: &str = "2.5.29.31";

fn rsa_alg() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: const_oid::ObjectIdentifier::new_unwrap(SHA256_WITH_RSA),
        parameters: Some(Any::null()),
    }
}

fn validity() -> Validity {
    let not_before = DateTime::new(2024, 1, 1, 0, 0, 0).unwrap();
    let not_after = DateTime::new(2034, 1, 1, 0, 0, 0).unwrap();
    Validity {
        not_before: Time::UtcTime(UtcTime::from_date_time(not_before).unwrap()),
        not_after: Time::UtcTime(UtcTime::from_date_time(not_after).unwrap()),
    }
}

fn spki_for(key: &RsaPublicKey) -> SubjectPublicKeyInfoOwned {
    use der::Decode;
    let der = key.to_public_key_der().unwrap();
    SubjectPublicKeyInfoOwned::from_der(der.as_bytes()).unwrap()
}

/// Issue a certificate signed by `signer_key`, optionally with a
/// KeyUsage extension and a CRLDistributionPoints marker.
pub fn make_cert(
    subject: &str,
    issuer: &str,
    subject_key: &RsaPublicKey,
    signer_key: &RsaPrivateKey,
    serial: u8,
    key_usage: Option<KeyUsage>,
    with_crl_dp: bool,
) -> Certificate {
    use std::str::FromStr;

    let mut extensions = Vec::new();
    if let Some(ku) = key_usage {
        extensions.push(Extension {
            extn_id: const_oid::ObjectIdentifier::new_unwrap(KEY_USAGE_OID),
            critical: true,
            extn_value: OctetString::new(ku.to_der().unwrap()).unwrap(),
        });
    }
    if with_crl_dp {
        // Content is irrelevant to the client; only presence is checked.
        extensions.push(Extension {
            extn_id: const_oid::ObjectIdentifier::new_unwrap(CRL_DP_OID),
            critical: false,
            extn_value: OctetString::new(vec![0x30, 0x00]).unwrap(),
        });
    }

    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[serial]).unwrap(),
        signature: rsa_alg(),
        issuer: Name::from_str(issuer).unwrap(),
        validity: validity(),
        subject: Name::from_str(subject).unwrap(),
        subject_public_key_info: spki_for(subject_key),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: (!extensions.is_empty()).then_some(extensions),
    };

    let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(signer_key.clone());
    let signature = signer.sign(&tbs.to_der().unwrap()).to_vec();

    Certificate {
        tbs_certificate: tbs,
        signature_algorithm: rsa_alg(),
        signature: BitString::from_bytes(&signature).unwrap(),
    }
}

/// Build a minimal CRL issued by the CA.
pub fn make_crl(ca: &TestIdentity) -> CertificateList {
    let tbs = TbsCertList {
        version: Version::V2,
        signature: rsa_alg(),
        issuer: ca.cert.tbs_certificate.subject.clone(),
        this_update: validity().not_before,
        next_update: Some(validity().not_after),
        revoked_certificates: None,
        crl_extensions: None,
    };
    let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(ca.key.clone());
    let signature = signer.sign(&tbs.to_der().unwrap()).to_vec();
    CertificateList {
        tbs_cert_list: tbs,
        signature_algorithm: rsa_alg(),
        signature: BitString::from_bytes(&signature).unwrap(),
    }
}

/// A certificate plus its private key.
#[derive(Clone)]
pub struct TestIdentity {
    pub cert: Certificate,
    pub key: RsaPrivateKey,
}

/// The fixture PKI: one CA, signing and encryption RAs, a client
/// identity, and a certificate pre-issued over the client key.
pub struct TestPki {
    pub ca: TestIdentity,
    pub next_ca: TestIdentity,
    pub ra_sig: TestIdentity,
    pub ra_enc: TestIdentity,
    pub client: TestIdentity,
    pub issued: Certificate,
}

static PKI: OnceLock<TestPki> = OnceLock::new();

/// The shared fixture PKI; built once per test binary.
pub fn pki() -> &'static TestPki {
    PKI.get_or_init(|| {
        let ca_key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let next_ca_key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let ra_sig_key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let ra_enc_key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let client_key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();

        let ca_usage = KeyUsage(
            KeyUsages::DigitalSignature | KeyUsages::KeyCertSign | KeyUsages::CRLSign,
        );
        let ca = make_cert(
            "CN=Test CA",
            "CN=Test CA",
            &ca_key.to_public_key(),
            &ca_key,
            1,
            Some(ca_usage),
            false,
        );
        let next_ca = make_cert(
            "CN=Test CA G2",
            "CN=Test CA G2",
            &next_ca_key.to_public_key(),
            &next_ca_key,
            2,
            None,
            false,
        );
        let ra_sig = make_cert(
            "CN=Test RA Signing",
            "CN=Test CA",
            &ra_sig_key.to_public_key(),
            &ca_key,
            3,
            Some(KeyUsage(KeyUsages::DigitalSignature.into())),
            false,
        );
        let ra_enc = make_cert(
            "CN=Test RA Encryption",
            "CN=Test CA",
            &ra_enc_key.to_public_key(),
            &ca_key,
            4,
            Some(KeyUsage(KeyUsages::KeyEncipherment.into())),
            false,
        );
        let client = make_cert(
            "CN=Test Client",
            "CN=Test Client",
            &client_key.to_public_key(),
            &client_key,
            5,
            None,
            false,
        );
        let issued = make_cert(
            "CN=Test Client",
            "CN=Test CA",
            &client_key.to_public_key(),
            &ca_key,
            6,
            None,
            false,
        );

        TestPki {
            ca: TestIdentity { cert: ca, key: ca_key },
            next_ca: TestIdentity {
                cert: next_ca,
                key: next_ca_key,
            },
            ra_sig: TestIdentity {
                cert: ra_sig,
                key: ra_sig_key,
            },
            ra_enc: TestIdentity {
                cert: ra_enc,
                key: ra_enc_key,
            },
            client: TestIdentity {
                cert: client,
                key: client_key,
            },
            issued,
        }
    })
}

/// How the mock CA answers PKIOperation exchanges.
pub enum CaBehavior {
    /// SUCCESS with the given certificate bag payload.
    Issue(Vec<u8>),
    /// PENDING for the first `n` exchanges, then SUCCESS with the bag.
    PendingThenIssue(u32, Vec<u8>),
    /// PENDING on every exchange.
    PendingAlways,
    /// FAILURE with the given failInfo.
    Fail(FailInfo),
    /// SUCCESS but the recipientNonce does not echo the senderNonce.
    WrongRecipientNonce(Vec<u8>),
    /// SUCCESS but under a different transaction identifier.
    WrongTransactionId(Vec<u8>),
    /// A degenerate (unsigned) signedData instead of a CertRep.
    Unsigned,
}

/// A record of one decoded client exchange.
pub struct SeenRequest {
    pub message_type: MessageType,
    pub transaction_id: String,
    pub sender_nonce: Nonce,
    pub payload: Option<Vec<u8>>,
}

/// Mock CA endpoint logic behind wiremock.
///
/// Decodes each incoming PKIOperation with the recipient identity the
/// client encrypts for, then builds a CertRep per the configured
/// behavior, signed by the configured signer.
pub struct PkiOperationResponder {
    /// Identity the client envelopes payloads for (CA or encryption RA).
    pub recipient: TestIdentity,
    /// Identity that signs CertRep responses (CA or signing RA).
    pub signer: TestIdentity,
    /// Certificate CertRep payloads are enveloped for.
    pub client_cert: Certificate,
    pub behavior: CaBehavior,
    pub exchanges: AtomicU32,
    pub seen: Mutex<Vec<SeenRequest>>,
}

impl PkiOperationResponder {
    pub fn new(
        recipient: TestIdentity,
        signer: TestIdentity,
        client_cert: Certificate,
        behavior: CaBehavior,
    ) -> Self {
        Self {
            recipient,
            signer,
            client_cert,
            behavior,
            exchanges: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn encoder(&self) -> PkiMessageEncoder {
        PkiMessageEncoder::new(
            self.signer.cert.clone(),
            self.signer.key.clone(),
            EnvelopeEncoder::new(self.client_cert.clone(), ContentCipher::Aes128Cbc),
            DigestAlgorithm::Sha256,
        )
    }

    fn decoder(&self) -> PkiMessageDecoder {
        PkiMessageDecoder::new(EnvelopeDecoder::new(
            self.recipient.cert.clone(),
            self.recipient.key.clone(),
        ))
    }

    fn message_bytes(request: &Request) -> Vec<u8> {
        if request.method.as_str() == "POST" {
            request.body.clone()
        } else {
            let message = request
                .url
                .query_pairs()
                .find(|(k, _)| k == "message")
                .map(|(_, v)| v.into_owned())
                .expect("GET PKIOperation without message parameter");
            BASE64_URL_SAFE.decode(message.as_bytes()).unwrap()
        }
    }

    fn build_response(&self, incoming: &PkiMessage) -> Vec<u8> {
        let round = self.exchanges.fetch_add(1, Ordering::SeqCst);

        let reply = match &self.behavior {
            CaBehavior::Issue(bag) => {
                PkiMessage::cert_rep(incoming, PkiStatus::Success, None, Some(bag.clone()))
            }
            CaBehavior::PendingThenIssue(n, bag) => {
                if round < *n {
                    PkiMessage::cert_rep(incoming, PkiStatus::Pending, None, None)
                } else {
                    PkiMessage::cert_rep(incoming, PkiStatus::Success, None, Some(bag.clone()))
                }
            }
            CaBehavior::PendingAlways => {
                PkiMessage::cert_rep(incoming, PkiStatus::Pending, None, None)
            }
            CaBehavior::Fail(fail_info) => {
                PkiMessage::cert_rep(incoming, PkiStatus::Failure, Some(*fail_info), None)
            }
            CaBehavior::WrongRecipientNonce(bag) => {
                let mut reply =
                    PkiMessage::cert_rep(incoming, PkiStatus::Success, None, Some(bag.clone()));
                reply.recipient_nonce = Some(Nonce::generate());
                reply
            }
            CaBehavior::WrongTransactionId(bag) => {
                let mut reply =
                    PkiMessage::cert_rep(incoming, PkiStatus::Success, None, Some(bag.clone()));
                reply.transaction_id = TransactionId::generate();
                reply
            }
            CaBehavior::Unsigned => {
                return degenerate_bag(&[self.signer.cert.clone()], &[]).unwrap();
            }
        };
        self.encoder().encode(&reply).unwrap()
    }
}

impl Respond for PkiOperationResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let wire = Self::message_bytes(request);
        let incoming = self.decoder().decode(&wire).expect("undecodable request");
        self.seen.lock().unwrap().push(SeenRequest {
            message_type: incoming.message_type,
            transaction_id: incoming.transaction_id.as_str().to_string(),
            sender_nonce: incoming.sender_nonce,
            payload: incoming.payload.clone(),
        });
        let body = self.build_response(&incoming);
        ResponseTemplate::new(200)
            .insert_header("Content-Type", "application/x-pki-message")
            .set_body_bytes(body)
    }
}

/// Mock SCEP server wrapping wiremock with one method per operation.
pub struct MockScepServer {
    server: MockServer,
}

impl MockScepServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Mount a GetCACaps response with the given body.
    pub async fn mock_caps(&self, body: &str) {
        Mock::given(method("GET"))
            .and(query_param("operation", "GetCACaps"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", "text/plain"),
            )
            .mount(&self.server)
            .await;
    }

    /// Mount a GetCACaps response that asserts a single fetch.
    pub async fn mock_caps_once(&self, body: &str) {
        Mock::given(method("GET"))
            .and(query_param("operation", "GetCACaps"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", "text/plain"),
            )
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Mount a GetCACert response carrying a single DER certificate.
    pub async fn mock_ca_cert_single(&self, cert: &Certificate) {
        Mock::given(method("GET"))
            .and(query_param("operation", "GetCACert"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(cert.to_der().unwrap())
                    .insert_header("Content-Type", "application/x-x509-ca-cert"),
            )
            .mount(&self.server)
            .await;
    }

    /// Mount a GetCACert response carrying a degenerate certificate bag.
    pub async fn mock_ca_cert_bag(&self, certs: &[Certificate]) {
        Mock::given(method("GET"))
            .and(query_param("operation", "GetCACert"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(degenerate_bag(certs, &[]).unwrap())
                    .insert_header("Content-Type", "application/x-x509-ca-ra-cert"),
            )
            .mount(&self.server)
            .await;
    }

    /// Mount a GetNextCACert response: a bag of `rollover` signed by
    /// `signer`.
    pub async fn mock_next_ca_cert(&self, rollover: &[Certificate], signer: &TestIdentity) {
        let bag = degenerate_bag(rollover, &[]).unwrap();
        let signed = sign_data(&bag, &signer.cert, &signer.key, DigestAlgorithm::Sha256).unwrap();
        Mock::given(method("GET"))
            .and(query_param("operation", "GetNextCACert"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(signed)
                    .insert_header("Content-Type", "application/x-x509-next-ca-cert"),
            )
            .mount(&self.server)
            .await;
    }

    /// Mount a PKIOperation responder for both GET and POST.
    pub async fn mock_pki_operation(&self, responder: std::sync::Arc<PkiOperationResponder>) {
        Mock::given(method("POST"))
            .and(query_param("operation", "PKIOperation"))
            .respond_with(ArcRespond(responder.clone()))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("operation", "PKIOperation"))
            .respond_with(ArcRespond(responder))
            .mount(&self.server)
            .await;
    }
}

/// Adapter so a shared responder can back multiple mounts.
struct ArcRespond(std::sync::Arc<PkiOperationResponder>);

impl Respond for ArcRespond {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.0.respond(request)
    }
}

/// A client configuration against `server` with an always-yes verifier.
pub fn client_config(server_url: &str) -> scep_client::ScepClientConfig {
    scep_client::ScepClientConfig::builder()
        .url(server_url)
        .unwrap()
        .identity(scep_client::ClientIdentity::new(
            pki().client.cert.clone(),
            pki().client.key.clone(),
        ))
        .verifier(|_| true)
        .build()
        .unwrap()
}

/// A degenerate bag holding the pre-issued client certificate.
pub fn issued_bag() -> Vec<u8> {
    degenerate_bag(&[pki().issued.clone()], &[]).unwrap()
}
