//! The SCEP transaction state machine.
//!
//! A transaction is one correlated request/response exchange (plus polls
//! while the CA keeps it pending). Two variants share the same outer
//! loop: enrollment (`PKCSReq`/`RenewalReq`, pollable via `CertPoll`) and
//! queries (`GetCert`/`GetCRL`, for which PENDING is a protocol
//! violation). Every response must echo the transaction identifier and
//! the sender nonce of the request it answers, or the exchange is
//! rejected as tampered or misrouted.

use der::Encode;
use x509_cert::crl::CertificateList;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use crate::error::{Result, ScepError};
use crate::message::codec::{PkiMessageDecoder, PkiMessageEncoder};
use crate::message::pkcs7::{self, IssuerAndSerialNumber};
use crate::message::{FailInfo, MessageType, PkiMessage, PkiStatus, TransactionId};
use crate::transport::Transport;

/// The state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Nothing sent yet.
    Initial,
    /// The CA issued the requested material; the store is available.
    CertIssued,
    /// Enrollment is awaiting manual approval; poll to make progress.
    CertReqPending,
    /// The CA rejected the request; failInfo is available.
    CertNonExistent,
}

/// The decoded content of a SUCCESS CertRep: a degenerate signedData
/// holding certificates and/or CRLs.
#[derive(Debug, Clone, Default)]
pub struct CertStore {
    certificates: Vec<Certificate>,
    crls: Vec<CertificateList>,
}

impl CertStore {
    /// Parse a degenerate certificate bag (ContentInfo DER).
    pub fn parse(bag_der: &[u8]) -> Result<Self> {
        let signed_data = pkcs7::unwrap_signed_data(bag_der)?;
        Ok(Self {
            certificates: pkcs7::extract_certificates(&signed_data),
            crls: pkcs7::extract_crls(&signed_data),
        })
    }

    /// The certificates in the store.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// The CRLs in the store.
    pub fn crls(&self) -> &[CertificateList] {
        &self.crls
    }
}

/// Check the correlation invariants of a CertRep and return its status.
fn validate_cert_rep(request: &PkiMessage, response: &PkiMessage) -> Result<PkiStatus> {
    if response.message_type != MessageType::CertRep {
        return Err(ScepError::protocol(format!(
            "expected CertRep, got messageType {}",
            response.message_type.as_wire_str()
        )));
    }
    if response.transaction_id != request.transaction_id {
        return Err(ScepError::protocol("transactionID mismatch in response"));
    }
    match response.recipient_nonce {
        Some(nonce) if nonce == request.sender_nonce => {}
        Some(_) => {
            return Err(ScepError::protocol(
                "recipientNonce does not echo the senderNonce",
            ))
        }
        None => return Err(ScepError::protocol("response carries no recipientNonce")),
    }
    response
        .pki_status
        .ok_or_else(|| ScepError::protocol("CertRep carries no pkiStatus"))
}

/// An enrollment transaction driving a CSR to a terminal state.
///
/// `send` submits the CSR; while the CA answers PENDING, `poll` re-asks
/// under the same transaction identifier with a fresh nonce.
#[derive(Debug)]
pub struct EnrollmentTransaction {
    transport: Transport,
    encoder: PkiMessageEncoder,
    decoder: PkiMessageDecoder,
    csr: CertReq,
    issuer: Certificate,
    transaction_id: TransactionId,
    renewal: bool,
    state: TransactionState,
    fail_info: Option<FailInfo>,
    store: Option<CertStore>,
}

impl EnrollmentTransaction {
    /// Create a transaction for `csr`, correlated against the issuing
    /// `ca`. When `renewal` is set the request goes out as `RenewalReq`.
    pub fn new(
        transport: Transport,
        encoder: PkiMessageEncoder,
        decoder: PkiMessageDecoder,
        csr: CertReq,
        ca: Certificate,
        renewal: bool,
    ) -> Result<Self> {
        let transaction_id = TransactionId::from_csr(&csr)?;
        Ok(Self {
            transport,
            encoder,
            decoder,
            csr,
            issuer: ca,
            transaction_id,
            renewal,
            state: TransactionState::Initial,
            fail_info: None,
            store: None,
        })
    }

    /// The stable transaction identifier derived from the CSR.
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// The current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The certificate store, available once the state is `CertIssued`.
    pub fn cert_store(&self) -> Option<&CertStore> {
        self.store.as_ref()
    }

    /// The CA's failInfo, available once the state is `CertNonExistent`.
    pub fn fail_info(&self) -> Option<FailInfo> {
        self.fail_info
    }

    /// Submit the CSR and classify the CA's answer.
    pub async fn send(&mut self) -> Result<TransactionState> {
        let message_type = if self.renewal {
            MessageType::RenewalReq
        } else {
            MessageType::PkcsReq
        };
        let payload = self.csr.to_der()?;
        let request = PkiMessage::request(message_type, self.transaction_id.clone(), payload);
        self.exchange(request).await
    }

    /// Poll a pending enrollment.
    ///
    /// The transaction identifier stays stable; the nonce is fresh on
    /// every poll.
    pub async fn poll(&mut self) -> Result<TransactionState> {
        if self.state != TransactionState::CertReqPending {
            return Err(ScepError::protocol(
                "poll is only valid while the enrollment is pending",
            ));
        }
        let subject = IssuerAndSerialNumber {
            issuer: self.issuer.tbs_certificate.subject.clone(),
            serial_number: SerialNumber::new(&[0])?,
        };
        let request = PkiMessage::request(
            MessageType::CertPoll,
            self.transaction_id.clone(),
            subject.to_der()?,
        );
        self.exchange(request).await
    }

    async fn exchange(&mut self, request: PkiMessage) -> Result<TransactionState> {
        let wire = self.encoder.encode(&request)?;
        let response_der = self.transport.pki_operation(&wire).await?;
        let response = self.decoder.decode(&response_der)?;
        let status = validate_cert_rep(&request, &response)?;

        self.state = match status {
            PkiStatus::Success => {
                let bag = response.payload.as_deref().ok_or_else(|| {
                    ScepError::protocol("SUCCESS CertRep carries no certificate store")
                })?;
                self.store = Some(CertStore::parse(bag)?);
                TransactionState::CertIssued
            }
            PkiStatus::Failure => {
                self.fail_info = Some(response.fail_info.ok_or_else(|| {
                    ScepError::protocol("FAILURE CertRep carries no failInfo")
                })?);
                TransactionState::CertNonExistent
            }
            PkiStatus::Pending => TransactionState::CertReqPending,
        };
        tracing::debug!(
            transaction_id = %self.transaction_id,
            state = ?self.state,
            "enrollment exchange complete"
        );
        Ok(self.state)
    }
}

/// A non-enrollment transaction: `GetCert` or `GetCRL`.
///
/// The outer loop matches enrollment, but a PENDING answer is illegal
/// here and is surfaced as a protocol error.
#[derive(Debug)]
pub struct QueryTransaction {
    transport: Transport,
    encoder: PkiMessageEncoder,
    decoder: PkiMessageDecoder,
    subject: IssuerAndSerialNumber,
    message_type: MessageType,
    transaction_id: TransactionId,
    state: TransactionState,
    fail_info: Option<FailInfo>,
    store: Option<CertStore>,
}

impl QueryTransaction {
    /// Create a query for the certificate or CRL identified by `subject`.
    ///
    /// `message_type` must be `GetCert` or `GetCrl`.
    pub fn new(
        transport: Transport,
        encoder: PkiMessageEncoder,
        decoder: PkiMessageDecoder,
        subject: IssuerAndSerialNumber,
        message_type: MessageType,
    ) -> Result<Self> {
        if !matches!(message_type, MessageType::GetCert | MessageType::GetCrl) {
            return Err(ScepError::protocol(format!(
                "messageType {} is not a query",
                message_type.as_wire_str()
            )));
        }
        Ok(Self {
            transport,
            encoder,
            decoder,
            subject,
            message_type,
            transaction_id: TransactionId::generate(),
            state: TransactionState::Initial,
            fail_info: None,
            store: None,
        })
    }

    /// The current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The certificate store, available once the state is `CertIssued`.
    pub fn cert_store(&self) -> Option<&CertStore> {
        self.store.as_ref()
    }

    /// The CA's failInfo, available once the state is `CertNonExistent`.
    pub fn fail_info(&self) -> Option<FailInfo> {
        self.fail_info
    }

    /// Run the query to its terminal state.
    pub async fn send(&mut self) -> Result<TransactionState> {
        let request = PkiMessage::request(
            self.message_type,
            self.transaction_id.clone(),
            self.subject.to_der()?,
        );
        let wire = self.encoder.encode(&request)?;
        let response_der = self.transport.pki_operation(&wire).await?;
        let response = self.decoder.decode(&response_der)?;
        let status = validate_cert_rep(&request, &response)?;

        self.state = match status {
            PkiStatus::Success => {
                let bag = response.payload.as_deref().ok_or_else(|| {
                    ScepError::protocol("SUCCESS CertRep carries no certificate store")
                })?;
                self.store = Some(CertStore::parse(bag)?);
                TransactionState::CertIssued
            }
            PkiStatus::Failure => {
                self.fail_info = Some(response.fail_info.ok_or_else(|| {
                    ScepError::protocol("FAILURE CertRep carries no failInfo")
                })?);
                TransactionState::CertNonExistent
            }
            PkiStatus::Pending => {
                return Err(ScepError::protocol(
                    "CA answered a query transaction with PENDING",
                ));
            }
        };
        tracing::debug!(
            transaction_id = %self.transaction_id,
            state = ?self.state,
            "query exchange complete"
        );
        Ok(self.state)
    }
}
