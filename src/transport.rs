//! HTTP transport for SCEP operations.
//!
//! Every exchange is a single request against the CA endpoint with an
//! `operation` query parameter. The three informational operations are
//! always GET; `PKIOperation` is GET with a base64url `message` parameter
//! or POST with the binary message body, depending on the CA's
//! advertised capabilities. Responses are dispatched by the content type
//! each operation expects; anything else is a protocol error. The
//! transport never retries.

use base64::prelude::*;
use reqwest::header::CONTENT_TYPE;
use url::Url;
use x509_cert::Certificate;

use crate::capabilities::Capabilities;
use crate::error::{Result, ScepError};
use crate::message::codec::parse_next_ca_bag;
use crate::message::pkcs7::parse_cert_bag;

/// Content types used on the wire.
pub mod content_types {
    /// PKIOperation request and CertRep response bodies.
    pub const PKI_MESSAGE: &str = "application/x-pki-message";

    /// GetCACert response carrying a single DER certificate.
    pub const CA_CERT: &str = "application/x-x509-ca-cert";

    /// GetCACert response carrying a CA/RA certificate bag.
    pub const CA_RA_CERT: &str = "application/x-x509-ca-ra-cert";

    /// GetNextCACert response.
    pub const NEXT_CA_CERT: &str = "application/x-x509-next-ca-cert";
}

/// SCEP operation names as they appear in the `operation` parameter.
pub mod operations {
    /// Capability query.
    pub const GET_CA_CAPS: &str = "GetCACaps";

    /// CA/RA certificate distribution.
    pub const GET_CA_CERT: &str = "GetCACert";

    /// Rollover certificate distribution.
    pub const GET_NEXT_CA_CERT: &str = "GetNextCACert";

    /// Transactional PKI message exchange.
    pub const PKI_OPERATION: &str = "PKIOperation";
}

/// How `PKIOperation` requests travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMethod {
    /// Message in the `message` query parameter, base64url encoded.
    Get,
    /// Binary message in the request body.
    Post,
}

/// A transport bound to one endpoint for one operation's lifetime.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    url: Url,
    method: TransportMethod,
}

impl Transport {
    /// Create a transport over an existing HTTP client.
    pub fn new(http: reqwest::Client, url: Url, method: TransportMethod) -> Self {
        Self { http, url, method }
    }

    /// Issue `GetCACaps` and parse the capability list.
    pub async fn get_ca_caps(&self, profile: Option<&str>) -> Result<Capabilities> {
        let response = self.get(operations::GET_CA_CAPS, profile).await?;
        let body = response.text().await?;
        Ok(Capabilities::parse(&body))
    }

    /// Issue `GetCACert` and parse the returned certificates.
    pub async fn get_ca_cert(&self, profile: Option<&str>) -> Result<Vec<Certificate>> {
        let response = self.get(operations::GET_CA_CERT, profile).await?;
        check_content_type(&response, &[content_types::CA_CERT, content_types::CA_RA_CERT])?;
        let body = response.bytes().await?;
        parse_cert_bag(&body)
    }

    /// Issue `GetNextCACert` and parse the rollover chain, verifying the
    /// response signature against the current CA certificate.
    pub async fn get_next_ca_cert(
        &self,
        profile: Option<&str>,
        current_ca: &Certificate,
    ) -> Result<Vec<Certificate>> {
        let response = self.get(operations::GET_NEXT_CA_CERT, profile).await?;
        check_content_type(&response, &[content_types::NEXT_CA_CERT])?;
        let body = response.bytes().await?;
        parse_next_ca_bag(&body, current_ca)
    }

    /// Exchange one `PKIOperation` message, returning the response DER.
    pub async fn pki_operation(&self, message: &[u8]) -> Result<Vec<u8>> {
        let response = match self.method {
            TransportMethod::Get => {
                let mut url = self.url.clone();
                url.query_pairs_mut()
                    .append_pair("operation", operations::PKI_OPERATION)
                    .append_pair("message", &BASE64_URL_SAFE.encode(message));
                tracing::debug!(%url, "GET PKIOperation");
                self.http.get(url).send().await?.error_for_status()?
            }
            TransportMethod::Post => {
                let mut url = self.url.clone();
                url.query_pairs_mut()
                    .append_pair("operation", operations::PKI_OPERATION);
                tracing::debug!(%url, body_len = message.len(), "POST PKIOperation");
                self.http
                    .post(url)
                    .header(CONTENT_TYPE, content_types::PKI_MESSAGE)
                    .body(message.to_vec())
                    .send()
                    .await?
                    .error_for_status()?
            }
        };
        check_content_type(&response, &[content_types::PKI_MESSAGE])?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Issue an informational GET with the optional profile message.
    async fn get(&self, operation: &str, profile: Option<&str>) -> Result<reqwest::Response> {
        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("operation", operation);
            if let Some(profile) = profile {
                pairs.append_pair("message", profile);
            }
        }
        tracing::debug!(%url, "GET {}", operation);
        Ok(self.http.get(url).send().await?.error_for_status()?)
    }
}

/// Reject responses whose content type is not one of `expected`.
fn check_content_type(response: &reqwest::Response, expected: &[&str]) -> Result<()> {
    let actual = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let base = actual.split(';').next().unwrap_or("").trim();
    if expected.iter().any(|e| base.eq_ignore_ascii_case(e)) {
        Ok(())
    } else {
        Err(ScepError::invalid_content_type(expected.join(" or "), actual))
    }
}
