//! SCEP message model.
//!
//! This module defines the logical pieces every `pkiMessage` carries:
//! the message type, transaction identifier, nonces, and (on responses)
//! the pkiStatus / failInfo disposition. The CMS packaging lives in the
//! sibling [`codec`](crate::message::codec) and
//! [`envelope`](crate::message::envelope) modules.

pub mod codec;
pub mod envelope;
pub mod pkcs7;

use der::Encode;
use rand::RngCore;
use sha1::{Digest, Sha1};
use x509_cert::request::CertReq;

use crate::error::{Result, ScepError};

/// The `messageType` authenticated attribute.
///
/// Wire values are decimal strings; the numeric assignments are fixed by
/// the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Response to any transactional request.
    CertRep = 3,
    /// Enrollment request renewing an existing certificate.
    RenewalReq = 17,
    /// Initial enrollment request carrying a PKCS#10 CSR.
    PkcsReq = 19,
    /// Poll for a previously submitted, still-pending enrollment.
    CertPoll = 20,
    /// Query for an issued certificate by issuer and serial.
    GetCert = 21,
    /// Query for the CA's certificate revocation list.
    GetCrl = 22,
}

impl MessageType {
    /// The decimal token carried in the authenticated attribute.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::CertRep => "3",
            Self::RenewalReq => "17",
            Self::PkcsReq => "19",
            Self::CertPoll => "20",
            Self::GetCert => "21",
            Self::GetCrl => "22",
        }
    }

    /// Parse the decimal token from the authenticated attribute.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "3" => Ok(Self::CertRep),
            "17" => Ok(Self::RenewalReq),
            "19" => Ok(Self::PkcsReq),
            "20" => Ok(Self::CertPoll),
            "21" => Ok(Self::GetCert),
            "22" => Ok(Self::GetCrl),
            other => Err(ScepError::protocol(format!(
                "unknown messageType {:?}",
                other
            ))),
        }
    }
}

/// The `pkiStatus` authenticated attribute of a CertRep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PkiStatus {
    /// Request granted; the response carries the certificate store.
    Success = 0,
    /// Request rejected; failInfo names the reason.
    Failure = 2,
    /// Request received but not yet acted upon; poll later.
    Pending = 3,
}

impl PkiStatus {
    /// The decimal token carried in the authenticated attribute.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::Success => "0",
            Self::Failure => "2",
            Self::Pending => "3",
        }
    }

    /// Parse the decimal token from the authenticated attribute.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "0" => Ok(Self::Success),
            "2" => Ok(Self::Failure),
            "3" => Ok(Self::Pending),
            other => Err(ScepError::protocol(format!(
                "unknown pkiStatus {:?}",
                other
            ))),
        }
    }
}

/// The `failInfo` authenticated attribute of a FAILURE CertRep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FailInfo {
    /// Unrecognized or unsupported algorithm.
    BadAlg = 0,
    /// Integrity check (signature verification) failed at the CA.
    BadMessageCheck = 1,
    /// Transaction not permitted or supported.
    BadRequest = 2,
    /// The signingTime attribute was too far off the CA clock.
    BadTime = 3,
    /// No certificate could be identified matching the request.
    BadCertId = 4,
}

impl FailInfo {
    /// The decimal token carried in the authenticated attribute.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::BadAlg => "0",
            Self::BadMessageCheck => "1",
            Self::BadRequest => "2",
            Self::BadTime => "3",
            Self::BadCertId => "4",
        }
    }

    /// Parse the decimal token from the authenticated attribute.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "0" => Ok(Self::BadAlg),
            "1" => Ok(Self::BadMessageCheck),
            "2" => Ok(Self::BadRequest),
            "3" => Ok(Self::BadTime),
            "4" => Ok(Self::BadCertId),
            other => Err(ScepError::protocol(format!(
                "unknown failInfo {:?}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FailInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BadAlg => "badAlg",
            Self::BadMessageCheck => "badMessageCheck",
            Self::BadRequest => "badRequest",
            Self::BadTime => "badTime",
            Self::BadCertId => "badCertId",
        };
        write!(f, "{} ({})", name, self.as_wire_str())
    }
}

/// A 16-byte random nonce tying a response to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; 16]);

impl Nonce {
    /// Generate a fresh random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw nonce bytes received on the wire.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| ScepError::protocol(format!("nonce must be 16 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// The raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// SCEP transaction identifier.
///
/// For enrollment the identifier is a stable function of the CSR's public
/// key, so a resent request is recognized by the CA as the same
/// transaction. Queries use a fresh random identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionId(String);

impl TransactionId {
    /// Derive the identifier for an enrollment from its CSR.
    ///
    /// SHA-1 over the DER-encoded SubjectPublicKeyInfo, rendered as
    /// lowercase hex: 40 printable characters, identical for identical
    /// CSRs.
    pub fn from_csr(csr: &CertReq) -> Result<Self> {
        let spki_der = csr.info.public_key.to_der()?;
        let digest = Sha1::digest(&spki_der);
        Ok(Self(to_hex(&digest)))
    }

    /// Generate a fresh identifier for a non-enrollment transaction.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(to_hex(&bytes))
    }

    /// Wrap an identifier received on the wire.
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// The identifier as a printable string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// The logical content of one SCEP pkiMessage.
///
/// `payload` holds the cleartext DER that travels inside the enveloped
/// data: a PKCS#10 CSR, an IssuerAndSerialNumber, or a degenerate
/// certificates-only signedData, depending on `message_type`. Responses
/// with FAILURE or PENDING status carry no payload.
#[derive(Debug, Clone)]
pub struct PkiMessage {
    /// The messageType attribute.
    pub message_type: MessageType,
    /// The transactionID attribute.
    pub transaction_id: TransactionId,
    /// The senderNonce attribute.
    pub sender_nonce: Nonce,
    /// The recipientNonce attribute (responses only).
    pub recipient_nonce: Option<Nonce>,
    /// The pkiStatus attribute (responses only).
    pub pki_status: Option<PkiStatus>,
    /// The failInfo attribute (FAILURE responses only).
    pub fail_info: Option<FailInfo>,
    /// Cleartext DER carried inside the enveloped data, if any.
    pub payload: Option<Vec<u8>>,
}

impl PkiMessage {
    /// Build a request message with a fresh sender nonce.
    pub fn request(
        message_type: MessageType,
        transaction_id: TransactionId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            message_type,
            transaction_id,
            sender_nonce: Nonce::generate(),
            recipient_nonce: None,
            pki_status: None,
            fail_info: None,
            payload: Some(payload),
        }
    }

    /// Build a CertRep answering `request` with the given disposition.
    pub fn cert_rep(
        request: &PkiMessage,
        pki_status: PkiStatus,
        fail_info: Option<FailInfo>,
        payload: Option<Vec<u8>>,
    ) -> Self {
        Self {
            message_type: MessageType::CertRep,
            transaction_id: request.transaction_id.clone(),
            sender_nonce: Nonce::generate(),
            recipient_nonce: Some(request.sender_nonce),
            pki_status: Some(pki_status),
            fail_info,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_round_trip() {
        for mt in [
            MessageType::CertRep,
            MessageType::RenewalReq,
            MessageType::PkcsReq,
            MessageType::CertPoll,
            MessageType::GetCert,
            MessageType::GetCrl,
        ] {
            assert_eq!(MessageType::parse(mt.as_wire_str()).unwrap(), mt);
        }
        assert!(MessageType::parse("4").is_err());
    }

    #[test]
    fn test_pki_status_round_trip() {
        for st in [PkiStatus::Success, PkiStatus::Failure, PkiStatus::Pending] {
            assert_eq!(PkiStatus::parse(st.as_wire_str()).unwrap(), st);
        }
        // "1" is unassigned.
        assert!(PkiStatus::parse("1").is_err());
    }

    #[test]
    fn test_fail_info_display() {
        assert_eq!(FailInfo::BadMessageCheck.to_string(), "badMessageCheck (1)");
    }

    #[test]
    fn test_nonce_generation_is_fresh() {
        let a = Nonce::generate();
        let b = Nonce::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_nonce_from_slice_rejects_wrong_length() {
        assert!(Nonce::from_slice(&[0u8; 15]).is_err());
        assert!(Nonce::from_slice(&[0u8; 16]).is_ok());
    }

    #[test]
    fn test_transaction_id_is_printable_hex() {
        let id = TransactionId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
