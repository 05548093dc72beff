//! Signed-data packaging of SCEP pkiMessages.
//!
//! The encoder wraps an enveloped payload in a one-signer `signedData`
//! whose authenticated attributes carry the SCEP attribute set; the
//! decoder verifies an incoming `signedData` against the signer
//! certificate it embeds, extracts the attributes, and decrypts the
//! payload. Decoding always verifies before anything inspects message
//! content, so an unsigned or tampered response can never influence the
//! transaction state.

use der::asn1::{Any, ObjectIdentifier, OctetString, OctetStringRef, PrintableStringRef, SetOfVec};
use der::Encode;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::Certificate;

use crate::capabilities::{Capabilities, Capability};
use crate::error::{Result, ScepError};
use crate::message::envelope::{EnvelopeDecoder, EnvelopeEncoder};
use crate::message::pkcs7::{
    self, EncapsulatedContentInfo, IssuerAndSerialNumber, SignedData, SignerInfo,
};
use crate::message::{FailInfo, MessageType, Nonce, PkiMessage, PkiStatus, TransactionId};
use crate::oids;

/// Message digests SCEP can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-1, the universal floor.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Pick the strongest digest the CA advertises.
    ///
    /// A caller preference narrows the choice only if the CA advertises
    /// the preferred algorithm.
    pub fn negotiate(caps: &Capabilities, preferred: Option<DigestAlgorithm>) -> Self {
        let default = match caps.strongest_digest() {
            Capability::Sha512 => Self::Sha512,
            Capability::Sha256 => Self::Sha256,
            _ => Self::Sha1,
        };
        let advertised = |d: DigestAlgorithm| match d {
            Self::Sha1 => true,
            Self::Sha256 => caps.contains(Capability::Sha256),
            Self::Sha512 => caps.contains(Capability::Sha512),
        };
        match preferred {
            Some(p) if advertised(p) => p,
            _ => default,
        }
    }

    /// The digest algorithm OID.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            Self::Sha1 => oids::ID_SHA1,
            Self::Sha256 => oids::ID_SHA256,
            Self::Sha512 => oids::ID_SHA512,
        }
    }

    /// Human-readable algorithm name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Hash `data` with this algorithm.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        use sha1::Digest;
        match self {
            Self::Sha1 => sha1::Sha1::digest(data).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    /// Resolve a digest algorithm OID.
    pub fn from_digest_oid(oid: &ObjectIdentifier) -> Result<Self> {
        if *oid == oids::ID_SHA1 {
            Ok(Self::Sha1)
        } else if *oid == oids::ID_SHA256 {
            Ok(Self::Sha256)
        } else if *oid == oids::ID_SHA512 {
            Ok(Self::Sha512)
        } else {
            Err(ScepError::protocol(format!(
                "unsupported digest algorithm {}",
                oid
            )))
        }
    }

    /// Resolve the digest used by an RSA signature algorithm OID.
    pub fn from_signature_oid(oid: &ObjectIdentifier) -> Result<Self> {
        if *oid == oids::ID_SHA1_WITH_RSA {
            Ok(Self::Sha1)
        } else if *oid == oids::ID_SHA256_WITH_RSA {
            Ok(Self::Sha256)
        } else if *oid == oids::ID_SHA512_WITH_RSA {
            Ok(Self::Sha512)
        } else {
            Err(ScepError::protocol(format!(
                "unsupported signature algorithm {}",
                oid
            )))
        }
    }
}

/// Extract the RSA public key of a certificate.
pub(crate) fn rsa_public_key(cert: &Certificate) -> Result<RsaPublicKey> {
    let spki_der = cert.tbs_certificate.subject_public_key_info.to_der()?;
    RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| ScepError::protocol(format!("certificate key is not RSA: {}", e)))
}

/// Sign `msg` with RSA PKCS#1 v1.5 under the given digest.
fn sign_rsa(digest: DigestAlgorithm, key: &RsaPrivateKey, msg: &[u8]) -> Vec<u8> {
    match digest {
        DigestAlgorithm::Sha1 => {
            let signer = rsa::pkcs1v15::SigningKey::<sha1::Sha1>::new(key.clone());
            signer.sign(msg).to_vec()
        }
        DigestAlgorithm::Sha256 => {
            let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(key.clone());
            signer.sign(msg).to_vec()
        }
        DigestAlgorithm::Sha512 => {
            let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha512>::new(key.clone());
            signer.sign(msg).to_vec()
        }
    }
}

/// Verify an RSA PKCS#1 v1.5 signature over `msg`.
pub(crate) fn verify_rsa_signature(
    digest: DigestAlgorithm,
    public_key: &RsaPublicKey,
    msg: &[u8],
    sig: &[u8],
) -> Result<()> {
    let signature = rsa::pkcs1v15::Signature::try_from(sig)
        .map_err(|e| ScepError::protocol(format!("malformed signature: {}", e)))?;
    let verified = match digest {
        DigestAlgorithm::Sha1 => rsa::pkcs1v15::VerifyingKey::<sha1::Sha1>::new(public_key.clone())
            .verify(msg, &signature)
            .is_ok(),
        DigestAlgorithm::Sha256 => {
            rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(public_key.clone())
                .verify(msg, &signature)
                .is_ok()
        }
        DigestAlgorithm::Sha512 => {
            rsa::pkcs1v15::VerifyingKey::<sha2::Sha512>::new(public_key.clone())
                .verify(msg, &signature)
                .is_ok()
        }
    };
    if verified {
        Ok(())
    } else {
        Err(ScepError::protocol("signature verification failed"))
    }
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    let mut values = SetOfVec::new();
    values.insert(value)?;
    Ok(Attribute { oid, values })
}

fn printable(s: &str) -> Result<Any> {
    let value = PrintableStringRef::new(s)
        .map_err(|e| ScepError::protocol(format!("value is not printable: {}", e)))?;
    Ok(Any::encode_from(&value)?)
}

fn find_attr<'a>(attrs: &'a SetOfVec<Attribute>, oid: &ObjectIdentifier) -> Option<&'a Any> {
    attrs
        .iter()
        .find(|attr| attr.oid == *oid)
        .and_then(|attr| attr.values.iter().next())
}

fn printable_attr(attrs: &SetOfVec<Attribute>, oid: &ObjectIdentifier) -> Result<Option<String>> {
    match find_attr(attrs, oid) {
        None => Ok(None),
        Some(any) => {
            let value = any
                .decode_as::<PrintableStringRef<'_>>()
                .map_err(|e| ScepError::protocol(format!("attribute {} is not printable: {}", oid, e)))?;
            Ok(Some(value.as_str().to_string()))
        }
    }
}

fn octet_attr(attrs: &SetOfVec<Attribute>, oid: &ObjectIdentifier) -> Result<Option<Vec<u8>>> {
    match find_attr(attrs, oid) {
        None => Ok(None),
        Some(any) => {
            let value = any
                .decode_as::<OctetStringRef<'_>>()
                .map_err(|e| ScepError::protocol(format!("attribute {} is not an octet string: {}", oid, e)))?;
            Ok(Some(value.as_bytes().to_vec()))
        }
    }
}

/// Encodes pkiMessages into signed-and-enveloped CMS DER.
#[derive(Clone)]
pub struct PkiMessageEncoder {
    signer: Certificate,
    key: RsaPrivateKey,
    envelope: EnvelopeEncoder,
    digest: DigestAlgorithm,
}

impl PkiMessageEncoder {
    /// Create an encoder signing as `signer` and encrypting payloads with
    /// `envelope`.
    pub fn new(
        signer: Certificate,
        key: RsaPrivateKey,
        envelope: EnvelopeEncoder,
        digest: DigestAlgorithm,
    ) -> Self {
        Self {
            signer,
            key,
            envelope,
            digest,
        }
    }

    /// Encode `msg` into the DER of its outer `ContentInfo`.
    pub fn encode(&self, msg: &PkiMessage) -> Result<Vec<u8>> {
        let econtent = match &msg.payload {
            Some(payload) => Some(self.envelope.encrypt(payload)?),
            None => None,
        };
        let digested = econtent.as_deref().unwrap_or(&[]);
        let message_digest = self.digest.digest(digested);

        let mut attrs = SetOfVec::new();
        attrs.insert(attribute(
            oids::ID_CONTENT_TYPE,
            Any::encode_from(&oids::ID_DATA)?,
        )?)?;
        attrs.insert(attribute(
            oids::ID_MESSAGE_DIGEST,
            Any::encode_from(&OctetString::new(message_digest)?)?,
        )?)?;
        attrs.insert(attribute(
            oids::ID_SCEP_MESSAGE_TYPE,
            printable(msg.message_type.as_wire_str())?,
        )?)?;
        attrs.insert(attribute(
            oids::ID_SCEP_TRANSACTION_ID,
            printable(msg.transaction_id.as_str())?,
        )?)?;
        attrs.insert(attribute(
            oids::ID_SCEP_SENDER_NONCE,
            Any::encode_from(&OctetString::new(msg.sender_nonce.as_bytes().as_slice())?)?,
        )?)?;
        if let Some(nonce) = &msg.recipient_nonce {
            attrs.insert(attribute(
                oids::ID_SCEP_RECIPIENT_NONCE,
                Any::encode_from(&OctetString::new(nonce.as_bytes().as_slice())?)?,
            )?)?;
        }
        if let Some(status) = &msg.pki_status {
            attrs.insert(attribute(
                oids::ID_SCEP_PKI_STATUS,
                printable(status.as_wire_str())?,
            )?)?;
        }
        if let Some(fail_info) = &msg.fail_info {
            attrs.insert(attribute(
                oids::ID_SCEP_FAIL_INFO,
                printable(fail_info.as_wire_str())?,
            )?)?;
        }

        // The signature covers the SET OF encoding of the attributes.
        let attrs_der = attrs.to_der()?;
        let signature = sign_rsa(self.digest, &self.key, &attrs_der);

        let signer_info = SignerInfo {
            version: 1,
            sid: IssuerAndSerialNumber::from_certificate(&self.signer),
            digest_alg: AlgorithmIdentifierOwned {
                oid: self.digest.oid(),
                parameters: Some(Any::null()),
            },
            signed_attrs: Some(attrs),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: oids::ID_RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            signature: OctetString::new(signature)?,
        };

        let mut digest_algorithms = SetOfVec::new();
        digest_algorithms.insert(AlgorithmIdentifierOwned {
            oid: self.digest.oid(),
            parameters: Some(Any::null()),
        })?;
        let mut certificates = SetOfVec::new();
        certificates.insert(self.signer.clone())?;
        let mut signer_infos = SetOfVec::new();
        signer_infos.insert(signer_info)?;

        let signed_data = SignedData {
            version: 1,
            digest_algorithms,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: oids::ID_DATA,
                econtent: match econtent {
                    Some(bytes) => Some(OctetString::new(bytes)?),
                    None => None,
                },
            },
            certificates: Some(certificates),
            crls: None,
            signer_infos,
        };

        tracing::debug!(
            message_type = msg.message_type.as_wire_str(),
            transaction_id = %msg.transaction_id,
            digest = self.digest.as_str(),
            "encoded pkiMessage"
        );
        pkcs7::wrap_signed_data(&signed_data)
    }
}

impl std::fmt::Debug for PkiMessageEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkiMessageEncoder")
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

/// Decodes and verifies incoming pkiMessages.
#[derive(Debug, Clone)]
pub struct PkiMessageDecoder {
    envelope: EnvelopeDecoder,
    trusted_signers: Vec<Certificate>,
}

impl PkiMessageDecoder {
    /// Create a decoder that accepts any embedded signer certificate
    /// whose signature verifies.
    ///
    /// Used where the peer is not known in advance (a CA decoding
    /// requester messages); clients should prefer
    /// [`with_trusted_signers`](Self::with_trusted_signers).
    pub fn new(envelope: EnvelopeDecoder) -> Self {
        Self {
            envelope,
            trusted_signers: Vec::new(),
        }
    }

    /// Create a decoder that additionally requires the signer to be one
    /// of `trusted` (the CA and RA certificates).
    pub fn with_trusted_signers(envelope: EnvelopeDecoder, trusted: Vec<Certificate>) -> Self {
        Self {
            envelope,
            trusted_signers: trusted,
        }
    }

    /// Decode and verify `der_bytes`, returning the logical message.
    ///
    /// Verification order is fixed: signature first, attribute extraction
    /// second, payload decryption last.
    pub fn decode(&self, der_bytes: &[u8]) -> Result<PkiMessage> {
        let signed_data = pkcs7::unwrap_signed_data(der_bytes)?;
        let (signer_cert, attrs) = verify_one_signer(&signed_data)?;

        if !self.trusted_signers.is_empty() {
            let signer_der = signer_cert.to_der()?;
            let trusted = self
                .trusted_signers
                .iter()
                .any(|c| c.to_der().map(|der| der == signer_der).unwrap_or(false));
            if !trusted {
                return Err(ScepError::protocol(
                    "response signed by neither the CA nor the RA",
                ));
            }
        }

        let message_type = MessageType::parse(&require_printable(
            &attrs,
            &oids::ID_SCEP_MESSAGE_TYPE,
            "messageType",
        )?)?;
        let transaction_id = TransactionId::from_string(require_printable(
            &attrs,
            &oids::ID_SCEP_TRANSACTION_ID,
            "transactionID",
        )?);
        let sender_nonce = Nonce::from_slice(&require_octets(
            &attrs,
            &oids::ID_SCEP_SENDER_NONCE,
            "senderNonce",
        )?)?;
        let recipient_nonce = octet_attr(&attrs, &oids::ID_SCEP_RECIPIENT_NONCE)?
            .map(|bytes| Nonce::from_slice(&bytes))
            .transpose()?;
        let pki_status = printable_attr(&attrs, &oids::ID_SCEP_PKI_STATUS)?
            .map(|token| PkiStatus::parse(&token))
            .transpose()?;
        let fail_info = printable_attr(&attrs, &oids::ID_SCEP_FAIL_INFO)?
            .map(|token| FailInfo::parse(&token))
            .transpose()?;

        let payload = match &signed_data.encap_content_info.econtent {
            Some(econtent) => Some(self.envelope.decrypt(econtent.as_bytes())?),
            None => None,
        };

        tracing::debug!(
            message_type = message_type.as_wire_str(),
            transaction_id = %transaction_id,
            status = ?pki_status,
            "decoded pkiMessage"
        );
        Ok(PkiMessage {
            message_type,
            transaction_id,
            sender_nonce,
            recipient_nonce,
            pki_status,
            fail_info,
            payload,
        })
    }
}

fn require_printable(
    attrs: &SetOfVec<Attribute>,
    oid: &ObjectIdentifier,
    name: &str,
) -> Result<String> {
    printable_attr(attrs, oid)?
        .ok_or_else(|| ScepError::protocol(format!("missing {} attribute", name)))
}

fn require_octets(
    attrs: &SetOfVec<Attribute>,
    oid: &ObjectIdentifier,
    name: &str,
) -> Result<Vec<u8>> {
    octet_attr(attrs, oid)?
        .ok_or_else(|| ScepError::protocol(format!("missing {} attribute", name)))
}

/// Verify a one-signer `SignedData` and return the signer certificate and
/// its authenticated attributes.
fn verify_one_signer(signed_data: &SignedData) -> Result<(Certificate, SetOfVec<Attribute>)> {
    let mut signers = signed_data.signer_infos.iter();
    let signer_info = signers
        .next()
        .ok_or_else(|| ScepError::protocol("response is unsigned"))?;
    if signers.next().is_some() {
        return Err(ScepError::protocol("response has more than one signer"));
    }

    let signer_cert = signed_data
        .certificates
        .as_ref()
        .and_then(|certs| certs.iter().find(|c| signer_info.sid.matches(c)))
        .cloned()
        .ok_or_else(|| ScepError::protocol("signer certificate not present in response"))?;

    let attrs = signer_info
        .signed_attrs
        .clone()
        .ok_or_else(|| ScepError::protocol("response has no authenticated attributes"))?;

    let digest = DigestAlgorithm::from_digest_oid(&signer_info.digest_alg.oid)?;

    // The messageDigest attribute must match the eContent.
    let econtent_bytes = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .map(|oct| oct.as_bytes().to_vec())
        .unwrap_or_default();
    let expected_digest = digest.digest(&econtent_bytes);
    let message_digest = require_octets(&attrs, &oids::ID_MESSAGE_DIGEST, "messageDigest")?;
    if message_digest != expected_digest {
        return Err(ScepError::protocol("messageDigest does not match content"));
    }

    // The signature covers the SET OF encoding of the attributes.
    let sig_digest = match DigestAlgorithm::from_signature_oid(&signer_info.signature_algorithm.oid)
    {
        Ok(d) => d,
        Err(_) if signer_info.signature_algorithm.oid == oids::ID_RSA_ENCRYPTION => digest,
        Err(e) => return Err(e),
    };
    let public_key = rsa_public_key(&signer_cert)?;
    let attrs_der = attrs.to_der()?;
    verify_rsa_signature(
        sig_digest,
        &public_key,
        &attrs_der,
        signer_info.signature.as_bytes(),
    )?;

    Ok((signer_cert, attrs))
}

/// Parse and verify a `GetNextCACert` response.
///
/// The body is a `signedData` whose signer must be anchored at the
/// current CA certificate (the CA itself, or a certificate it signed);
/// the payload is a degenerate bag holding the rollover chain.
pub fn parse_next_ca_bag(body: &[u8], current_ca: &Certificate) -> Result<Vec<Certificate>> {
    let signed_data = pkcs7::unwrap_signed_data(body)?;
    let (signer_cert, _attrs) = verify_one_signer(&signed_data)?;

    let anchored = signer_cert.to_der()? == current_ca.to_der()?
        || crate::chain::verify_cert_signature(&signer_cert, current_ca).is_ok();
    if !anchored {
        return Err(ScepError::protocol(
            "rollover bag signer is not anchored at the current CA",
        ));
    }

    let bag = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| ScepError::protocol("rollover response has no content"))?;
    let inner = pkcs7::unwrap_signed_data(bag.as_bytes())?;
    let certs = pkcs7::extract_certificates(&inner);
    if certs.is_empty() {
        return Err(ScepError::protocol("rollover bag contains no certificates"));
    }
    Ok(certs)
}

/// Sign an opaque payload into a one-signer `signedData` (DER).
///
/// This is the CA side of `GetNextCACert`: the payload (a degenerate
/// certificate bag) is carried as the content, with contentType and
/// messageDigest as the only authenticated attributes.
pub fn sign_data(
    payload: &[u8],
    signer: &Certificate,
    key: &RsaPrivateKey,
    digest: DigestAlgorithm,
) -> Result<Vec<u8>> {
    let message_digest = digest.digest(payload);

    let mut attrs = SetOfVec::new();
    attrs.insert(attribute(
        oids::ID_CONTENT_TYPE,
        Any::encode_from(&oids::ID_DATA)?,
    )?)?;
    attrs.insert(attribute(
        oids::ID_MESSAGE_DIGEST,
        Any::encode_from(&OctetString::new(message_digest)?)?,
    )?)?;

    let attrs_der = attrs.to_der()?;
    let signature = sign_rsa(digest, key, &attrs_der);

    let signer_info = SignerInfo {
        version: 1,
        sid: IssuerAndSerialNumber::from_certificate(signer),
        digest_alg: AlgorithmIdentifierOwned {
            oid: digest.oid(),
            parameters: Some(Any::null()),
        },
        signed_attrs: Some(attrs),
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: oids::ID_RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        signature: OctetString::new(signature)?,
    };

    let mut digest_algorithms = SetOfVec::new();
    digest_algorithms.insert(AlgorithmIdentifierOwned {
        oid: digest.oid(),
        parameters: Some(Any::null()),
    })?;
    let mut certificates = SetOfVec::new();
    certificates.insert(signer.clone())?;
    let mut signer_infos = SetOfVec::new();
    signer_infos.insert(signer_info)?;

    let signed_data = SignedData {
        version: 1,
        digest_algorithms,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: oids::ID_DATA,
            econtent: Some(OctetString::new(payload)?),
        },
        certificates: Some(certificates),
        crls: None,
        signer_infos,
    };
    pkcs7::wrap_signed_data(&signed_data)
}
