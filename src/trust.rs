//! CA trust verification cache.
//!
//! The user-supplied callback is the authority on whether a CA
//! certificate is trusted (typically by confirming its fingerprint out of
//! band). Positive verdicts are memoized for the lifetime of the client,
//! so the callback runs at most once per distinct certificate; negative
//! verdicts are not cached and the user may be asked again.

use std::collections::HashSet;
use std::sync::Mutex;

use der::Encode;
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

use crate::config::CaVerifier;
use crate::error::{Result, ScepError};

/// Set of approved certificate fingerprints plus the verification flow.
#[derive(Debug, Default)]
pub struct TrustCache {
    approved: Mutex<HashSet<[u8; 32]>>,
}

impl TrustCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify `cert`, consulting the cache before the callback.
    pub fn verify(&self, cert: &Certificate, verifier: &CaVerifier) -> Result<()> {
        let fp = fingerprint(cert)?;

        if self.approved.lock().expect("trust cache poisoned").contains(&fp) {
            tracing::debug!("trust cache hit");
            return Ok(());
        }

        if verifier(cert) {
            self.approved
                .lock()
                .expect("trust cache poisoned")
                .insert(fp);
            Ok(())
        } else {
            Err(ScepError::trust(
                "CA certificate rejected by verification callback",
            ))
        }
    }
}

/// SHA-256 fingerprint over the DER-encoded certificate.
pub fn fingerprint(cert: &Certificate) -> Result<[u8; 32]> {
    let der = cert.to_der()?;
    Ok(Sha256::digest(&der).into())
}

/// Format a fingerprint as a colon-separated hex string.
pub fn format_fingerprint(fp: &[u8; 32]) -> String {
    fp.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}
