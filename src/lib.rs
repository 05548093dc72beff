//! # scep-client
//!
//! A Rust client for the Simple Certificate Enrollment Protocol (SCEP,
//! RFC 8894).
//!
//! SCEP lets a requester obtain, renew, and query X.509 certificates
//! from a CA over plain HTTP: enrollment payloads travel inside
//! signed-and-encrypted CMS messages, so the channel itself needs no
//! protection. This crate implements the requester side:
//!
//! - **Capability discovery** (`GetCACaps`) with per-profile caching and
//!   algorithm negotiation (AES/3DES, SHA-512/SHA-256/SHA-1, GET/POST)
//! - **CA/RA chain distribution** (`GetCACert`) with structural CA
//!   identification and encryption-RA selection
//! - **Rollover distribution** (`GetNextCACert`) verified against the
//!   current CA
//! - **Enrollment** (`PKCSReq`/`RenewalReq`) as a pollable transaction
//!   with stable transaction identifiers and fresh nonces
//! - **Queries** (`GetCert`/`GetCRL`) as one-shot transactions
//!
//! ## Quick start
//!
//! ```no_run
//! use scep_client::{Client, ClientIdentity, ScepClientConfig, TransactionState};
//! use scep_client::csr::CsrBuilder;
//!
//! #[tokio::main]
//! async fn main() -> scep_client::Result<()> {
//!     let identity = ClientIdentity::from_files("client.crt", "client.key")?;
//!     let config = ScepClientConfig::builder()
//!         .url("http://ca.example.com/cgi-bin/pkiclient.exe")?
//!         .identity(identity.clone())
//!         .verifier(|_ca| true) // confirm the CA fingerprint out of band
//!         .build()?;
//!     let client = Client::new(config)?;
//!
//!     let csr = CsrBuilder::new()
//!         .common_name("device.example.com")
//!         .build(&identity.private_key)?;
//!
//!     let mut transaction = client.enroll(csr).await?;
//!     let mut state = transaction.send().await?;
//!     while state == TransactionState::CertReqPending {
//!         tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!         state = transaction.poll().await?;
//!     }
//!
//!     if let Some(store) = transaction.cert_store() {
//!         println!("issued {} certificate(s)", store.certificates().len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Trust model
//!
//! The CA certificate is authenticated by the caller-supplied
//! verification callback (typically a fingerprint check against a value
//! delivered out of band). Positive verdicts are cached per client
//! instance; the callback runs at most once per distinct CA certificate.
//! Message integrity and confidentiality come from the CMS layer, not
//! the transport.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod capabilities;
pub mod chain;
pub mod client;
pub mod config;
pub mod csr;
pub mod error;
pub mod message;
pub mod oids;
pub mod transaction;
pub mod transport;
pub mod trust;

// Re-export the main types at the crate root for convenience.
pub use capabilities::{Capabilities, Capability};
pub use chain::CaChain;
pub use client::Client;
pub use config::{CaVerifier, ClientIdentity, ScepClientConfig, ScepClientConfigBuilder};
pub use error::{Result, ScepError};
pub use message::codec::DigestAlgorithm;
pub use message::envelope::ContentCipher;
pub use message::{FailInfo, MessageType, PkiStatus, TransactionId};
pub use transaction::{CertStore, EnrollmentTransaction, QueryTransaction, TransactionState};

// Re-export x509_cert::Certificate for convenience.
pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
