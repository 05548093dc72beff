//! The PKCS#7 profile SCEP messages are built from.
//!
//! SCEP constrains PKCS#7 heavily: exactly one signer, exactly one
//! key-transport recipient, and both are identified by issuer and serial
//! number. The types below encode that profile directly instead of the
//! full CMS grammar, which keeps every field the codecs touch explicit.
//!
//! ```text
//! ContentInfo ::= SEQUENCE {
//!     contentType ContentType,
//!     content [0] EXPLICIT ANY DEFINED BY contentType OPTIONAL }
//! ```

use der::asn1::{Any, OctetString, SetOfVec};
use der::{Decode, Encode, Sequence, ValueOrd};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::crl::CertificateList;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use crate::error::{Result, ScepError};
use crate::oids;

/// The outermost PKCS#7 wrapper.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct ContentInfo {
    /// Content type OID (`signedData` or `envelopedData` here).
    pub content_type: der::asn1::ObjectIdentifier,

    /// The content, tagged by its type.
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", constructed = "true")]
    pub content: Any,
}

/// `SignedData` restricted to the shapes SCEP produces: one signer for
/// pkiMessages, none for degenerate certificate bags.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct SignedData {
    /// Syntax version.
    pub version: u8,

    /// Digest algorithms used by the signers.
    pub digest_algorithms: SetOfVec<AlgorithmIdentifierOwned>,

    /// The signed content.
    pub encap_content_info: EncapsulatedContentInfo,

    /// Certificates shipped alongside the content.
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub certificates: Option<SetOfVec<Certificate>>,

    /// CRLs shipped alongside the content.
    #[asn1(
        context_specific = "1",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub crls: Option<SetOfVec<CertificateList>>,

    /// Per-signer information; empty for degenerate bags.
    pub signer_infos: SetOfVec<SignerInfo>,
}

/// The content a `SignedData` covers.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct EncapsulatedContentInfo {
    /// Content type of the signed payload (`data` throughout SCEP).
    pub econtent_type: der::asn1::ObjectIdentifier,

    /// The payload itself; absent in degenerate bags and status-only
    /// responses.
    #[asn1(
        context_specific = "0",
        tag_mode = "EXPLICIT",
        constructed = "false",
        optional = "true"
    )]
    pub econtent: Option<OctetString>,
}

/// One signer of a `SignedData`.
#[derive(Clone, Debug, PartialEq, Eq, Sequence, ValueOrd)]
pub struct SignerInfo {
    /// Syntax version; 1 for issuer-and-serial signer identification.
    pub version: u8,

    /// The signer, identified by issuer and serial number.
    pub sid: IssuerAndSerialNumber,

    /// Digest algorithm used over the content.
    pub digest_alg: AlgorithmIdentifierOwned,

    /// Authenticated attributes; SCEP pkiMessages always carry them.
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub signed_attrs: Option<SetOfVec<Attribute>>,

    /// Signature algorithm.
    pub signature_algorithm: AlgorithmIdentifierOwned,

    /// The signature value.
    pub signature: OctetString,
}

/// `EnvelopedData` restricted to a single key-transport recipient.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct EnvelopedData {
    /// Syntax version; 0 for issuer-and-serial recipient identification.
    pub version: u8,

    /// The recipients able to unwrap the content-encryption key.
    pub recipient_infos: SetOfVec<KeyTransRecipientInfo>,

    /// The symmetrically encrypted payload.
    pub encrypted_content_info: EncryptedContentInfo,
}

/// A key-transport recipient of an `EnvelopedData`.
#[derive(Clone, Debug, PartialEq, Eq, Sequence, ValueOrd)]
pub struct KeyTransRecipientInfo {
    /// Syntax version; 0 for issuer-and-serial recipient identification.
    pub version: u8,

    /// The recipient, identified by issuer and serial number.
    pub rid: IssuerAndSerialNumber,

    /// Algorithm the content-encryption key is wrapped with.
    pub key_enc_alg: AlgorithmIdentifierOwned,

    /// The wrapped content-encryption key.
    pub encrypted_key: OctetString,
}

/// The symmetrically encrypted payload of an `EnvelopedData`.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct EncryptedContentInfo {
    /// Content type of the plaintext (`data` throughout SCEP).
    pub content_type: der::asn1::ObjectIdentifier,

    /// Content-encryption algorithm, parameters carrying the IV.
    pub content_enc_alg: AlgorithmIdentifierOwned,

    /// The ciphertext.
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "false",
        optional = "true"
    )]
    pub encrypted_content: Option<OctetString>,
}

/// Certificate identification by issuer name and serial number.
#[derive(Clone, Debug, PartialEq, Eq, Sequence, ValueOrd)]
pub struct IssuerAndSerialNumber {
    /// Issuer distinguished name.
    pub issuer: Name,

    /// Certificate serial number.
    pub serial_number: SerialNumber,
}

impl IssuerAndSerialNumber {
    /// Identify the given certificate.
    pub fn from_certificate(cert: &Certificate) -> Self {
        Self {
            issuer: cert.tbs_certificate.issuer.clone(),
            serial_number: cert.tbs_certificate.serial_number.clone(),
        }
    }

    /// Whether this identifies `cert`.
    pub fn matches(&self, cert: &Certificate) -> bool {
        self.issuer == cert.tbs_certificate.issuer
            && self.serial_number == cert.tbs_certificate.serial_number
    }
}

/// Wrap a `SignedData` in a `ContentInfo` and encode to DER.
pub fn wrap_signed_data(signed_data: &SignedData) -> Result<Vec<u8>> {
    let content_info = ContentInfo {
        content_type: oids::ID_SIGNED_DATA,
        content: Any::encode_from(signed_data)?,
    };
    Ok(content_info.to_der()?)
}

/// Wrap an `EnvelopedData` in a `ContentInfo` and encode to DER.
pub fn wrap_enveloped_data(enveloped: &EnvelopedData) -> Result<Vec<u8>> {
    let content_info = ContentInfo {
        content_type: oids::ID_ENVELOPED_DATA,
        content: Any::encode_from(enveloped)?,
    };
    Ok(content_info.to_der()?)
}

/// Parse a `ContentInfo` and extract the `SignedData` within.
pub fn unwrap_signed_data(der_bytes: &[u8]) -> Result<SignedData> {
    let content_info = ContentInfo::from_der(der_bytes)
        .map_err(|e| ScepError::protocol(format!("malformed ContentInfo: {}", e)))?;
    if content_info.content_type != oids::ID_SIGNED_DATA {
        return Err(ScepError::protocol(format!(
            "expected signedData, got content type {}",
            content_info.content_type
        )));
    }
    content_info
        .content
        .decode_as::<SignedData>()
        .map_err(|e| ScepError::protocol(format!("malformed SignedData: {}", e)))
}

/// Parse a `ContentInfo` and extract the `EnvelopedData` within.
pub fn unwrap_enveloped_data(der_bytes: &[u8]) -> Result<EnvelopedData> {
    let content_info = ContentInfo::from_der(der_bytes)
        .map_err(|e| ScepError::protocol(format!("malformed ContentInfo: {}", e)))?;
    if content_info.content_type != oids::ID_ENVELOPED_DATA {
        return Err(ScepError::protocol(format!(
            "expected envelopedData, got content type {}",
            content_info.content_type
        )));
    }
    content_info
        .content
        .decode_as::<EnvelopedData>()
        .map_err(|e| ScepError::protocol(format!("malformed EnvelopedData: {}", e)))
}

/// Build a degenerate certificates-only `SignedData` bag.
///
/// No signers, no digest algorithms, no content; just the certificate
/// (and optionally CRL) payload. Returns the DER of the wrapping
/// `ContentInfo`.
pub fn degenerate_bag(certs: &[Certificate], crls: &[CertificateList]) -> Result<Vec<u8>> {
    let mut cert_set = SetOfVec::new();
    for cert in certs {
        cert_set.insert(cert.clone())?;
    }
    let mut crl_set = SetOfVec::new();
    for crl in crls {
        crl_set.insert(crl.clone())?;
    }

    let signed_data = SignedData {
        version: 1,
        digest_algorithms: SetOfVec::new(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: oids::ID_DATA,
            econtent: None,
        },
        certificates: (!certs.is_empty()).then_some(cert_set),
        crls: (!crls.is_empty()).then_some(crl_set),
        signer_infos: SetOfVec::new(),
    };
    wrap_signed_data(&signed_data)
}

/// The certificates carried by a `SignedData`, in set order.
pub fn extract_certificates(signed_data: &SignedData) -> Vec<Certificate> {
    signed_data
        .certificates
        .as_ref()
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default()
}

/// The CRLs carried by a `SignedData`, in set order.
pub fn extract_crls(signed_data: &SignedData) -> Vec<CertificateList> {
    signed_data
        .crls
        .as_ref()
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default()
}

/// Parse a `GetCACert` response body.
///
/// The body is either a degenerate certificates-only signedData (CA plus
/// RA certificates) or a single bare DER X.509 certificate (CA only).
pub fn parse_cert_bag(body: &[u8]) -> Result<Vec<Certificate>> {
    if let Ok(signed_data) = unwrap_signed_data(body) {
        let certs = extract_certificates(&signed_data);
        if certs.is_empty() {
            return Err(ScepError::protocol("certificate bag contains no certificates"));
        }
        return Ok(certs);
    }

    let cert = Certificate::from_der(body)
        .map_err(|e| ScepError::protocol(format!("response is neither a certificate bag nor a certificate: {}", e)))?;
    Ok(vec![cert])
}
