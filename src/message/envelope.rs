//! Enveloped-data encryption for SCEP payloads.
//!
//! The cleartext of every transactional message (CSR, issuer-and-serial
//! query, certificate bag) travels inside a PKCS#7 `envelopedData`: a
//! fresh symmetric content-encryption key, wrapped with RSA key transport
//! for a single recipient. The cipher is negotiated from the CA's
//! advertised capabilities, AES-128-CBC preferred and Triple-DES-CBC as
//! the floor.

use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use der::asn1::{Any, OctetString, SetOfVec};
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

use crate::capabilities::{Capabilities, Capability};
use crate::error::{Result, ScepError};
use crate::message::pkcs7::{
    self, EncryptedContentInfo, EnvelopedData, IssuerAndSerialNumber, KeyTransRecipientInfo,
};
use crate::oids;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type TdesCbcEnc = cbc::Encryptor<des::TdesEde3>;
type TdesCbcDec = cbc::Decryptor<des::TdesEde3>;

/// Content-encryption ciphers SCEP can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCipher {
    /// AES-128 in CBC mode.
    Aes128Cbc,
    /// Triple-DES (EDE3) in CBC mode.
    TripleDesCbc,
}

impl ContentCipher {
    /// Pick the cipher for a CA advertising `caps`.
    ///
    /// AES-128-CBC when advertised, Triple-DES-CBC otherwise. A caller
    /// preference narrows the choice only if the CA advertises the
    /// preferred cipher.
    pub fn negotiate(caps: &Capabilities, preferred: Option<ContentCipher>) -> Self {
        let default = if caps.contains(Capability::Aes) {
            Self::Aes128Cbc
        } else {
            Self::TripleDesCbc
        };
        match preferred {
            Some(Self::Aes128Cbc) if caps.contains(Capability::Aes) => Self::Aes128Cbc,
            Some(Self::TripleDesCbc) if caps.contains(Capability::TripleDes) => Self::TripleDesCbc,
            _ => default,
        }
    }

    /// The algorithm identifier OID.
    pub fn oid(&self) -> der::asn1::ObjectIdentifier {
        match self {
            Self::Aes128Cbc => oids::ID_AES128_CBC,
            Self::TripleDesCbc => oids::ID_DES_EDE3_CBC,
        }
    }

    /// Symmetric key length in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::TripleDesCbc => 24,
        }
    }

    /// Cipher block (and IV) length in bytes.
    pub fn iv_len(&self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::TripleDesCbc => 8,
        }
    }

    /// Human-readable algorithm name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes128Cbc => "AES-128-CBC",
            Self::TripleDesCbc => "3DES-CBC",
        }
    }

    fn from_oid(oid: &der::asn1::ObjectIdentifier) -> Result<Self> {
        if *oid == oids::ID_AES128_CBC {
            Ok(Self::Aes128Cbc)
        } else if *oid == oids::ID_DES_EDE3_CBC {
            Ok(Self::TripleDesCbc)
        } else {
            Err(ScepError::protocol(format!(
                "unsupported content-encryption algorithm {}",
                oid
            )))
        }
    }
}

/// Encrypts payloads for a single recipient certificate.
#[derive(Debug, Clone)]
pub struct EnvelopeEncoder {
    recipient: Certificate,
    cipher: ContentCipher,
}

impl EnvelopeEncoder {
    /// Create an encoder targeting `recipient` with the given cipher.
    pub fn new(recipient: Certificate, cipher: ContentCipher) -> Self {
        Self { recipient, cipher }
    }

    /// The recipient certificate payloads are encrypted for.
    pub fn recipient(&self) -> &Certificate {
        &self.recipient
    }

    /// Encrypt `plaintext` into an `envelopedData` ContentInfo (DER).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut rng = rand::rngs::OsRng;

        let mut key = vec![0u8; self.cipher.key_len()];
        rng.fill_bytes(&mut key);
        let mut iv = vec![0u8; self.cipher.iv_len()];
        rng.fill_bytes(&mut iv);

        let ciphertext = match self.cipher {
            ContentCipher::Aes128Cbc => Aes128CbcEnc::new_from_slices(&key, &iv)
                .map_err(|e| ScepError::protocol(format!("cipher init failed: {}", e)))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            ContentCipher::TripleDesCbc => TdesCbcEnc::new_from_slices(&key, &iv)
                .map_err(|e| ScepError::protocol(format!("cipher init failed: {}", e)))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };

        let spki_der = der::Encode::to_der(&self.recipient.tbs_certificate.subject_public_key_info)?;
        let recipient_key = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| ScepError::protocol(format!("recipient key is not RSA: {}", e)))?;
        let encrypted_key = recipient_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, &key)
            .map_err(|e| ScepError::protocol(format!("key transport failed: {}", e)))?;

        let ktri = KeyTransRecipientInfo {
            version: 0,
            rid: IssuerAndSerialNumber::from_certificate(&self.recipient),
            key_enc_alg: AlgorithmIdentifierOwned {
                oid: oids::ID_RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            encrypted_key: OctetString::new(encrypted_key)?,
        };

        let mut recipient_infos = SetOfVec::new();
        recipient_infos.insert(ktri)?;

        let enveloped = EnvelopedData {
            version: 0,
            recipient_infos,
            encrypted_content_info: EncryptedContentInfo {
                content_type: oids::ID_DATA,
                content_enc_alg: AlgorithmIdentifierOwned {
                    oid: self.cipher.oid(),
                    parameters: Some(Any::encode_from(&OctetString::new(iv)?)?),
                },
                encrypted_content: Some(OctetString::new(ciphertext)?),
            },
        };

        tracing::debug!(
            cipher = self.cipher.as_str(),
            plaintext_len = plaintext.len(),
            "enveloped payload"
        );
        pkcs7::wrap_enveloped_data(&enveloped)
    }
}

/// Decrypts enveloped-data addressed to the client identity.
#[derive(Clone)]
pub struct EnvelopeDecoder {
    identity: Certificate,
    key: RsaPrivateKey,
}

impl EnvelopeDecoder {
    /// Create a decoder for the identity certificate and its private key.
    pub fn new(identity: Certificate, key: RsaPrivateKey) -> Self {
        Self { identity, key }
    }

    /// Decrypt an `envelopedData` ContentInfo (DER) into its cleartext.
    pub fn decrypt(&self, enveloped_der: &[u8]) -> Result<Vec<u8>> {
        let enveloped = pkcs7::unwrap_enveloped_data(enveloped_der)?;

        let recipient = enveloped
            .recipient_infos
            .iter()
            .find(|ri| ri.rid.matches(&self.identity))
            .ok_or_else(|| {
                ScepError::protocol("no recipient matches the client identity")
            })?;

        if recipient.key_enc_alg.oid != oids::ID_RSA_ENCRYPTION {
            return Err(ScepError::protocol(format!(
                "unsupported key-encryption algorithm {}",
                recipient.key_enc_alg.oid
            )));
        }

        let key = self
            .key
            .decrypt(Pkcs1v15Encrypt, recipient.encrypted_key.as_bytes())
            .map_err(|e| ScepError::protocol(format!("key unwrap failed: {}", e)))?;

        let eci = &enveloped.encrypted_content_info;
        let cipher = ContentCipher::from_oid(&eci.content_enc_alg.oid)?;
        if key.len() != cipher.key_len() {
            return Err(ScepError::protocol(format!(
                "unwrapped key has wrong size for {}: {}",
                cipher.as_str(),
                key.len()
            )));
        }

        let iv = eci
            .content_enc_alg
            .parameters
            .as_ref()
            .ok_or_else(|| ScepError::protocol("missing cipher IV parameter"))?
            .decode_as::<OctetString>()
            .map_err(|e| ScepError::protocol(format!("malformed cipher IV: {}", e)))?;

        let ciphertext = eci
            .encrypted_content
            .as_ref()
            .ok_or_else(|| ScepError::protocol("envelopedData has no encrypted content"))?;

        let plaintext = match cipher {
            ContentCipher::Aes128Cbc => {
                Aes128CbcDec::new_from_slices(&key, iv.as_bytes())
                    .map_err(|e| ScepError::protocol(format!("cipher init failed: {}", e)))?
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext.as_bytes())
            }
            ContentCipher::TripleDesCbc => {
                TdesCbcDec::new_from_slices(&key, iv.as_bytes())
                    .map_err(|e| ScepError::protocol(format!("cipher init failed: {}", e)))?
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext.as_bytes())
            }
        }
        .map_err(|_| ScepError::protocol("content decryption failed"))?;

        Ok(plaintext)
    }
}

impl std::fmt::Debug for EnvelopeDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeDecoder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_defaults_to_aes_when_advertised() {
        let caps = Capabilities::parse("AES\nDES3\n");
        assert_eq!(
            ContentCipher::negotiate(&caps, None),
            ContentCipher::Aes128Cbc
        );
    }

    #[test]
    fn test_negotiate_falls_back_to_triple_des() {
        let caps = Capabilities::parse("SHA-256\n");
        assert_eq!(
            ContentCipher::negotiate(&caps, None),
            ContentCipher::TripleDesCbc
        );
    }

    #[test]
    fn test_preference_honored_only_when_advertised() {
        let caps = Capabilities::parse("AES\nDES3\n");
        assert_eq!(
            ContentCipher::negotiate(&caps, Some(ContentCipher::TripleDesCbc)),
            ContentCipher::TripleDesCbc
        );

        let aes_only = Capabilities::parse("AES\n");
        assert_eq!(
            ContentCipher::negotiate(&aes_only, Some(ContentCipher::TripleDesCbc)),
            ContentCipher::Aes128Cbc
        );
    }

    #[test]
    fn test_cipher_parameters() {
        assert_eq!(ContentCipher::Aes128Cbc.key_len(), 16);
        assert_eq!(ContentCipher::Aes128Cbc.iv_len(), 16);
        assert_eq!(ContentCipher::TripleDesCbc.key_len(), 24);
        assert_eq!(ContentCipher::TripleDesCbc.iv_len(), 8);
    }
}
