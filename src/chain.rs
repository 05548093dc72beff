//! CA / RA certificate chain resolution.
//!
//! `GetCACert` returns one to three certificates as an unordered set:
//! exactly one CA, optionally one RA, or (the Entrust deployment shape)
//! one CA plus separate signing and encryption RAs. The order is not
//! specified, so the CA is identified structurally: it is the certificate
//! whose public key verifies the signature on another member of the set.

use der::{Decode, Encode};
use x509_cert::ext::pkix::KeyUsage;
use x509_cert::Certificate;

use crate::error::{Result, ScepError};
use crate::message::codec::{rsa_public_key, verify_rsa_signature, DigestAlgorithm};
use crate::oids;

/// The resolved certificate chain of a SCEP endpoint.
#[derive(Debug, Clone)]
pub struct CaChain {
    certs: Vec<Certificate>,
    ca_index: usize,
    recipient_index: usize,
}

impl CaChain {
    /// Resolve a `GetCACert` result.
    ///
    /// Fails with a protocol error when the set has a forbidden size or
    /// no member passes the CA signature test.
    pub fn resolve(certs: Vec<Certificate>) -> Result<Self> {
        let ca_index = select_ca(&certs)?;
        let recipient_index = select_recipient(&certs, ca_index)?;
        Ok(Self {
            certs,
            ca_index,
            recipient_index,
        })
    }

    /// All certificates, in the order the CA returned them.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certs
    }

    /// The CA certificate.
    pub fn ca(&self) -> &Certificate {
        &self.certs[self.ca_index]
    }

    /// The certificate enrollment payloads are encrypted for: the
    /// encryption RA when present, the CA otherwise.
    pub fn recipient(&self) -> &Certificate {
        &self.certs[self.recipient_index]
    }

    /// Whether the CA certificate carries a CRLDistributionPoints
    /// extension (in which case the CRL is not available via GetCRL).
    pub fn ca_has_distribution_points(&self) -> bool {
        self.ca()
            .tbs_certificate
            .extensions
            .as_ref()
            .map(|exts| {
                exts.iter()
                    .any(|ext| ext.extn_id == oids::ID_CE_CRL_DISTRIBUTION_POINTS)
            })
            .unwrap_or(false)
    }
}

/// Verify that `cert` is signed by `issuer`'s key.
pub(crate) fn verify_cert_signature(cert: &Certificate, issuer: &Certificate) -> Result<()> {
    let digest = DigestAlgorithm::from_signature_oid(&cert.signature_algorithm.oid)?;
    let tbs = cert.tbs_certificate.to_der()?;
    let sig = cert
        .signature
        .as_bytes()
        .ok_or_else(|| ScepError::protocol("certificate signature has unused bits"))?;
    let public_key = rsa_public_key(issuer)?;
    verify_rsa_signature(digest, &public_key, &tbs, sig)
}

/// Identify the CA within the unordered set.
fn select_ca(certs: &[Certificate]) -> Result<usize> {
    match certs.len() {
        0 => return Err(ScepError::protocol("GetCACert returned no certificates")),
        1 => return Ok(0),
        2 | 3 => {}
        n => {
            return Err(ScepError::protocol(format!(
                "GetCACert returned {} certificates, expected 1 to 3",
                n
            )))
        }
    }

    // The RA certificates must have been issued by the CA, so the CA is
    // the member whose key verifies the signature on another member.
    for (i, candidate) in certs.iter().enumerate() {
        for (j, issued) in certs.iter().enumerate() {
            if i == j {
                continue;
            }
            if verify_cert_signature(issued, candidate).is_ok() {
                return Ok(i);
            }
        }
    }
    Err(ScepError::protocol("no CA found in certificate chain"))
}

/// Identify the recipient for enveloped payloads.
fn select_recipient(certs: &[Certificate], ca_index: usize) -> Result<usize> {
    match certs.len() {
        1 => Ok(0),
        2 => Ok(1 - ca_index),
        3 => {
            // One CA and two RAs. The encryption RA asserts neither
            // digitalSignature (bit 0) nor cRLSign (bit 6).
            let mut encryption_ra = None;
            for (i, cert) in certs.iter().enumerate() {
                if i == ca_index {
                    continue;
                }
                let usage = key_usage(cert)?;
                let is_encryption = match usage {
                    Some(ku) => !ku.digital_signature() && !ku.crl_sign(),
                    None => false,
                };
                if is_encryption {
                    if encryption_ra.is_some() {
                        return Err(ScepError::protocol(
                            "both RA certificates look like encryption certificates",
                        ));
                    }
                    encryption_ra = Some(i);
                }
            }
            encryption_ra
                .ok_or_else(|| ScepError::protocol("no encryption RA found in certificate chain"))
        }
        _ => unreachable!("chain size validated by select_ca"),
    }
}

fn key_usage(cert: &Certificate) -> Result<Option<KeyUsage>> {
    let Some(exts) = cert.tbs_certificate.extensions.as_ref() else {
        return Ok(None);
    };
    for ext in exts.iter() {
        if ext.extn_id == oids::ID_CE_KEY_USAGE {
            let usage = KeyUsage::from_der(ext.extn_value.as_bytes())
                .map_err(|e| ScepError::protocol(format!("malformed keyUsage extension: {}", e)))?;
            return Ok(Some(usage));
        }
    }
    Ok(None)
}
