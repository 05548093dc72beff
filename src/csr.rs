//! PKCS#10 certificate signing request generation.
//!
//! SCEP enrolls RSA keys, so the builder signs the request with the same
//! RSA key pair that will be certified (proof of possession). The
//! resulting [`CertReq`] feeds straight into
//! [`Client::enroll`](crate::Client::enroll).

use std::str::FromStr;

use der::asn1::{Any, BitString, Ia5String, OctetString, PrintableStringRef, SetOfVec};
use der::{Decode, Encode};
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::error::{Result, ScepError};
use crate::oids;

/// Builder for PKCS#10 certificate signing requests.
///
/// # Example
///
/// ```no_run
/// use scep_client::csr::CsrBuilder;
/// # fn example(key: &rsa::RsaPrivateKey) -> scep_client::Result<()> {
/// let csr = CsrBuilder::new()
///     .common_name("device.example.com")
///     .organization("Example Corp")
///     .san_dns("device.example.com")
///     .challenge_password("secret-otp")
///     .build(key)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CsrBuilder {
    rdn_parts: Vec<String>,
    challenge_password: Option<String>,
    san_dns: Vec<String>,
}

impl CsrBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Common Name (CN) of the subject.
    pub fn common_name(mut self, cn: impl AsRef<str>) -> Self {
        self.rdn_parts.push(format!("CN={}", cn.as_ref()));
        self
    }

    /// Set the Organization (O) of the subject.
    pub fn organization(mut self, org: impl AsRef<str>) -> Self {
        self.rdn_parts.push(format!("O={}", org.as_ref()));
        self
    }

    /// Set the Organizational Unit (OU) of the subject.
    pub fn organizational_unit(mut self, ou: impl AsRef<str>) -> Self {
        self.rdn_parts.push(format!("OU={}", ou.as_ref()));
        self
    }

    /// Set the Country (C) of the subject.
    pub fn country(mut self, country: impl AsRef<str>) -> Self {
        self.rdn_parts.push(format!("C={}", country.as_ref()));
        self
    }

    /// Attach the CA-issued challenge password.
    pub fn challenge_password(mut self, password: impl Into<String>) -> Self {
        self.challenge_password = Some(password.into());
        self
    }

    /// Add a DNS subject alternative name.
    pub fn san_dns(mut self, dns: impl Into<String>) -> Self {
        self.san_dns.push(dns.into());
        self
    }

    /// Build and sign the request with `key`.
    pub fn build(&self, key: &RsaPrivateKey) -> Result<CertReq> {
        if self.rdn_parts.is_empty() {
            return Err(ScepError::config("CSR subject must not be empty"));
        }
        let subject = Name::from_str(&self.rdn_parts.join(","))
            .map_err(|e| ScepError::config(format!("invalid CSR subject: {}", e)))?;

        let spki_der = key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| ScepError::config(format!("failed to encode public key: {}", e)))?;
        let public_key = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes())?;

        let mut attributes = SetOfVec::new();
        if let Some(password) = &self.challenge_password {
            let value = PrintableStringRef::new(password)
                .map_err(|e| ScepError::config(format!("challenge password is not printable: {}", e)))?;
            let mut values = SetOfVec::new();
            values.insert(Any::encode_from(&value)?)?;
            attributes.insert(Attribute {
                oid: oids::ID_CHALLENGE_PASSWORD,
                values,
            })?;
        }
        if !self.san_dns.is_empty() {
            let names = self
                .san_dns
                .iter()
                .map(|dns| {
                    Ia5String::new(dns)
                        .map(GeneralName::DnsName)
                        .map_err(|e| ScepError::config(format!("invalid DNS name: {}", e)))
                })
                .collect::<Result<Vec<_>>>()?;
            let san = SubjectAltName(names);
            let extensions = vec![Extension {
                extn_id: const_oid::db::rfc5280::ID_CE_SUBJECT_ALT_NAME,
                critical: false,
                extn_value: OctetString::new(san.to_der()?)?,
            }];
            let mut values = SetOfVec::new();
            values.insert(Any::encode_from(&extensions)?)?;
            attributes.insert(Attribute {
                oid: oids::ID_EXTENSION_REQUEST,
                values,
            })?;
        }

        let info = CertReqInfo {
            version: Version::V1,
            subject,
            public_key,
            attributes,
        };

        let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(key.clone());
        let signature = signer.sign(&info.to_der()?).to_vec();

        Ok(CertReq {
            info,
            algorithm: AlgorithmIdentifierOwned {
                oid: oids::ID_SHA256_WITH_RSA,
                parameters: Some(Any::null()),
            },
            signature: BitString::from_bytes(&signature)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_subject_rejected() {
        use rand::rngs::OsRng;
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        assert!(CsrBuilder::new().build(&key).is_err());
    }
}
