//! Codec-level tests: envelope and pkiMessage round-trips, tamper
//! rejection, and rollover bag verification.

mod common;

use common::{make_cert, pki};

use der::Encode;
use scep_client::csr::CsrBuilder;
use scep_client::message::codec::{
    parse_next_ca_bag, sign_data, DigestAlgorithm, PkiMessageDecoder, PkiMessageEncoder,
};
use scep_client::message::envelope::{ContentCipher, EnvelopeDecoder, EnvelopeEncoder};
use scep_client::message::pkcs7::degenerate_bag;
use scep_client::message::{MessageType, PkiMessage, TransactionId};
use scep_client::ScepError;

fn client_encoder(cipher: ContentCipher, digest: DigestAlgorithm) -> PkiMessageEncoder {
    let pki = pki();
    PkiMessageEncoder::new(
        pki.client.cert.clone(),
        pki.client.key.clone(),
        EnvelopeEncoder::new(pki.ca.cert.clone(), cipher),
        digest,
    )
}

fn ca_decoder() -> PkiMessageDecoder {
    let pki = pki();
    PkiMessageDecoder::new(EnvelopeDecoder::new(pki.ca.cert.clone(), pki.ca.key.clone()))
}

#[test]
fn envelope_round_trips_payload_bytes() {
    let pki = pki();
    let payload = b"the quick brown fox jumps over the lazy dog";

    for cipher in [ContentCipher::Aes128Cbc, ContentCipher::TripleDesCbc] {
        let encoder = EnvelopeEncoder::new(pki.client.cert.clone(), cipher);
        let enveloped = encoder.encrypt(payload).unwrap();

        let decoder = EnvelopeDecoder::new(pki.client.cert.clone(), pki.client.key.clone());
        let decrypted = decoder.decrypt(&enveloped).unwrap();
        assert_eq!(decrypted, payload, "{} round trip", cipher.as_str());
    }
}

#[test]
fn envelope_rejects_wrong_recipient() {
    let pki = pki();
    let encoder = EnvelopeEncoder::new(pki.ca.cert.clone(), ContentCipher::Aes128Cbc);
    let enveloped = encoder.encrypt(b"secret").unwrap();

    // The client is not the recipient.
    let decoder = EnvelopeDecoder::new(pki.client.cert.clone(), pki.client.key.clone());
    assert!(matches!(
        decoder.decrypt(&enveloped),
        Err(ScepError::Protocol(_))
    ));
}

#[test]
fn pki_message_round_trips_bit_exactly() {
    let pki = pki();
    let csr = CsrBuilder::new()
        .common_name("device.example.com")
        .build(&pki.client.key)
        .unwrap();

    for digest in [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha512,
    ] {
        let request = PkiMessage::request(
            MessageType::PkcsReq,
            TransactionId::from_csr(&csr).unwrap(),
            csr.to_der().unwrap(),
        );
        let wire = client_encoder(ContentCipher::Aes128Cbc, digest)
            .encode(&request)
            .unwrap();
        let decoded = ca_decoder().decode(&wire).unwrap();

        assert_eq!(decoded.message_type, request.message_type);
        assert_eq!(decoded.transaction_id, request.transaction_id);
        assert_eq!(decoded.sender_nonce, request.sender_nonce);
        assert_eq!(decoded.payload.as_deref(), Some(csr.to_der().unwrap().as_slice()));
        assert!(decoded.recipient_nonce.is_none());
        assert!(decoded.pki_status.is_none());
    }
}

/// Offset of `needle` within `haystack`.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("region not found in message")
}

#[test]
fn tampered_message_is_rejected() {
    use scep_client::message::pkcs7::unwrap_signed_data;

    let pki = pki();
    let csr = CsrBuilder::new()
        .common_name("device.example.com")
        .build(&pki.client.key)
        .unwrap();
    let request = PkiMessage::request(
        MessageType::PkcsReq,
        TransactionId::from_csr(&csr).unwrap(),
        csr.to_der().unwrap(),
    );
    let wire = client_encoder(ContentCipher::Aes128Cbc, DigestAlgorithm::Sha256)
        .encode(&request)
        .unwrap();
    let signed_data = unwrap_signed_data(&wire).unwrap();

    // A mutated byte inside the authenticated attributes (transactionID,
    // nonce, ...) breaks the signature over the attribute set.
    let signer_info = signed_data.signer_infos.iter().next().unwrap();
    let attrs_der = signer_info.signed_attrs.as_ref().unwrap().to_der().unwrap();
    // Skip the SET header; the implicit [0] tag on the wire differs.
    let attrs_body = &attrs_der[2..];
    let attrs_at = find_subslice(&wire, attrs_body);

    // A mutated byte inside the enveloped content breaks the
    // messageDigest attribute.
    let econtent = signed_data.encap_content_info.econtent.as_ref().unwrap();
    let content_at = find_subslice(&wire, econtent.as_bytes());

    // A mutated byte of the signature value itself.
    let sig_at = find_subslice(&wire, signer_info.signature.as_bytes());

    for (what, offset) in [
        ("signed attribute", attrs_at + attrs_body.len() / 2),
        ("enveloped content", content_at + econtent.as_bytes().len() / 2),
        ("signature", sig_at + 4),
    ] {
        let mut mutated = wire.clone();
        mutated[offset] ^= 0x01;
        assert!(
            ca_decoder().decode(&mutated).is_err(),
            "mutated {} byte was accepted",
            what
        );
    }
}

#[test]
fn unsigned_response_is_rejected() {
    let pki = pki();
    let bag = degenerate_bag(&[pki.ca.cert.clone()], &[]).unwrap();
    let err = ca_decoder().decode(&bag).unwrap_err();
    assert!(matches!(err, ScepError::Protocol(_)));
    assert!(err.to_string().contains("unsigned"));
}

#[test]
fn transaction_id_is_stable_per_key() {
    let pki = pki();
    let csr_a = CsrBuilder::new()
        .common_name("device.example.com")
        .build(&pki.client.key)
        .unwrap();
    let csr_b = CsrBuilder::new()
        .common_name("renamed.example.com")
        .build(&pki.client.key)
        .unwrap();
    let csr_other = CsrBuilder::new()
        .common_name("device.example.com")
        .build(&pki.ra_enc.key)
        .unwrap();

    // Same public key, same identifier; different key, different one.
    let id_a = TransactionId::from_csr(&csr_a).unwrap();
    let id_b = TransactionId::from_csr(&csr_b).unwrap();
    let id_other = TransactionId::from_csr(&csr_other).unwrap();
    assert_eq!(id_a, id_b);
    assert_ne!(id_a, id_other);
    assert_eq!(id_a.as_str().len(), 40);
}

#[test]
fn next_ca_bag_verifies_signer_anchor() {
    let pki = pki();
    let bag = degenerate_bag(&[pki.next_ca.cert.clone()], &[]).unwrap();

    // Signed by the current CA: accepted.
    let signed = sign_data(&bag, &pki.ca.cert, &pki.ca.key, DigestAlgorithm::Sha256).unwrap();
    let rollover = parse_next_ca_bag(&signed, &pki.ca.cert).unwrap();
    assert_eq!(rollover.len(), 1);
    assert_eq!(
        rollover[0].tbs_certificate.subject,
        pki.next_ca.cert.tbs_certificate.subject
    );

    // Signed by a certificate the CA issued: accepted.
    let signed_by_ra = sign_data(
        &bag,
        &pki.ra_sig.cert,
        &pki.ra_sig.key,
        DigestAlgorithm::Sha256,
    )
    .unwrap();
    assert!(parse_next_ca_bag(&signed_by_ra, &pki.ca.cert).is_ok());

    // Signed by an unrelated self-signed certificate: rejected.
    let signed_by_other = sign_data(
        &bag,
        &pki.next_ca.cert,
        &pki.next_ca.key,
        DigestAlgorithm::Sha256,
    )
    .unwrap();
    assert!(parse_next_ca_bag(&signed_by_other, &pki.ca.cert).is_err());
}

#[test]
fn spliced_content_fails_digest_check() {
    use der::asn1::OctetString;
    use scep_client::message::pkcs7::{unwrap_signed_data, wrap_signed_data};

    let pki = pki();
    let bag = degenerate_bag(&[pki.ca.cert.clone()], &[]).unwrap();
    let signed = sign_data(&bag, &pki.ca.cert, &pki.ca.key, DigestAlgorithm::Sha256).unwrap();

    // Replace the signed content with a different bag, keeping the
    // original signature and attributes.
    let other_bag = degenerate_bag(&[pki.next_ca.cert.clone()], &[]).unwrap();
    let mut spliced = unwrap_signed_data(&signed).unwrap();
    spliced.encap_content_info.econtent = Some(OctetString::new(other_bag).unwrap());
    let spliced_der = wrap_signed_data(&spliced).unwrap();

    let err = parse_next_ca_bag(&spliced_der, &pki.ca.cert).unwrap_err();
    assert!(err.to_string().contains("messageDigest"));
}

#[test]
fn cert_with_unrelated_signer_fails_verification() {
    let pki = pki();
    // A certificate claiming the CA as issuer but signed by another key.
    let forged = make_cert(
        "CN=Forged RA",
        "CN=Test CA",
        &pki.ra_sig.key.to_public_key(),
        &pki.next_ca.key,
        9,
        None,
        false,
    );
    let bag = degenerate_bag(&[pki.next_ca.cert.clone()], &[]).unwrap();
    let signed = sign_data(&bag, &forged, &pki.next_ca.key, DigestAlgorithm::Sha256);
    // The signer is embedded but does not chain to the current CA.
    assert!(parse_next_ca_bag(&signed.unwrap(), &pki.ca.cert).is_err());
}
