//! Object identifiers used on the wire.
//!
//! SCEP fixes its authenticated-attribute OIDs under the VeriSign arc
//! `2.16.840.1.113733.1.9`; the remaining identifiers are the standard
//! PKCS#7 content types and the digest, cipher, and signature algorithms
//! the protocol negotiates.

use const_oid::ObjectIdentifier;

/// PKCS#7 `data` content type.
pub const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");

/// PKCS#7 `signedData` content type.
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// PKCS#7 `envelopedData` content type.
pub const ID_ENVELOPED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.3");

/// PKCS#9 `contentType` authenticated attribute.
pub const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");

/// PKCS#9 `messageDigest` authenticated attribute.
pub const ID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// PKCS#9 `challengePassword` CSR attribute.
pub const ID_CHALLENGE_PASSWORD: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.7");

/// PKCS#9 `extensionRequest` CSR attribute.
pub const ID_EXTENSION_REQUEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");

/// SCEP `messageType` authenticated attribute.
pub const ID_SCEP_MESSAGE_TYPE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.2");

/// SCEP `pkiStatus` authenticated attribute.
pub const ID_SCEP_PKI_STATUS: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.3");

/// SCEP `failInfo` authenticated attribute.
pub const ID_SCEP_FAIL_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.4");

/// SCEP `senderNonce` authenticated attribute.
pub const ID_SCEP_SENDER_NONCE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.5");

/// SCEP `recipientNonce` authenticated attribute.
pub const ID_SCEP_RECIPIENT_NONCE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.6");

/// SCEP `transactionID` authenticated attribute.
pub const ID_SCEP_TRANSACTION_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.7");

/// `rsaEncryption` public key algorithm.
pub const ID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// `sha1WithRSAEncryption` signature algorithm.
pub const ID_SHA1_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");

/// `sha256WithRSAEncryption` signature algorithm.
pub const ID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// `sha384WithRSAEncryption` signature algorithm.
pub const ID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");

/// `sha512WithRSAEncryption` signature algorithm.
pub const ID_SHA512_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

/// SHA-1 digest algorithm.
pub const ID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");

/// SHA-256 digest algorithm.
pub const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// SHA-512 digest algorithm.
pub const ID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

/// AES-128 in CBC mode.
pub const ID_AES128_CBC: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.2");

/// Triple-DES (EDE3) in CBC mode.
pub const ID_DES_EDE3_CBC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.3.7");

/// X.509 `keyUsage` extension.
pub const ID_CE_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");

/// X.509 `cRLDistributionPoints` extension.
pub const ID_CE_CRL_DISTRIBUTION_POINTS: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.29.31");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scep_arc() {
        // All SCEP attributes live under the same arc.
        for oid in [
            ID_SCEP_MESSAGE_TYPE,
            ID_SCEP_PKI_STATUS,
            ID_SCEP_FAIL_INFO,
            ID_SCEP_SENDER_NONCE,
            ID_SCEP_RECIPIENT_NONCE,
            ID_SCEP_TRANSACTION_ID,
        ] {
            assert!(oid.to_string().starts_with("2.16.840.1.113733.1.9."));
        }
    }

    #[test]
    fn test_content_types_distinct() {
        assert_ne!(ID_DATA, ID_SIGNED_DATA);
        assert_ne!(ID_SIGNED_DATA, ID_ENVELOPED_DATA);
    }
}
