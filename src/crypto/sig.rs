//! Handshake signature verification.
//!
//! Certificates are carried as opaque DER blobs (see
//! [`crate::handshake::Certificate`]); this module does not parse X.509 and
//! instead verifies directly against the subjectPublicKeyInfo bytes the
//! caller extracts, the same boundary the corpus draws between its
//! certificate-chain validation and its raw signature primitives.

use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier as _;
use p256::ecdsa::signature::Verifier as P256Verifier;
use p384::ecdsa::signature::Verifier as P384Verifier;
use rsa::pkcs1v15::Signature as RsaPkcs1Signature;
use rsa::pss::{Signature as RsaPssSignature, VerifyingKey as RsaPssVerifyingKey};
use rsa::signature::Verifier as RsaVerifier;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha384};

use crate::error::{ErrorKind, Result, TlsError};

/// `enum { ... } SignatureScheme;` restricted to the schemes this engine
/// can verify. RSA-PKCS1 schemes appear only in `CertificateRequest`
/// advertisements and certificate chain validation, never as a scheme this
/// engine itself signs with in `CertificateVerify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SignatureScheme {
    EcdsaSecp256r1Sha256,
    EcdsaSecp384r1Sha384,
    RsaPssRsaeSha256,
    RsaPssRsaeSha384,
    RsaPkcs1Sha256,
    Ed25519,
}

impl SignatureScheme {
    pub const fn value(self) -> u16 {
        match self {
            Self::RsaPkcs1Sha256 => 0x0401,
            Self::EcdsaSecp256r1Sha256 => 0x0403,
            Self::RsaPssRsaeSha256 => 0x0804,
            Self::RsaPssRsaeSha384 => 0x0805,
            Self::EcdsaSecp384r1Sha384 => 0x0503,
            Self::Ed25519 => 0x0807,
        }
    }

    pub const fn from_value(value: u16) -> Option<Self> {
        match value {
            0x0401 => Some(Self::RsaPkcs1Sha256),
            0x0403 => Some(Self::EcdsaSecp256r1Sha256),
            0x0804 => Some(Self::RsaPssRsaeSha256),
            0x0805 => Some(Self::RsaPssRsaeSha384),
            0x0503 => Some(Self::EcdsaSecp384r1Sha384),
            0x0807 => Some(Self::Ed25519),
            _ => None,
        }
    }

    /// Verifies `signature` over `message` under `public_key`, the raw
    /// public-key encoding appropriate to this scheme (a SEC1 point for the
    /// ECDSA schemes, 32 raw bytes for Ed25519, or an RSA DER
    /// subjectPublicKeyInfo for the RSA schemes).
    pub fn verify(self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        let bad_sig = || TlsError::new(ErrorKind::DecryptError, "signature verification failed");
        match self {
            Self::Ed25519 => {
                let key_bytes: [u8; 32] = public_key
                    .try_into()
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed ed25519 public key"))?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "invalid ed25519 public key"))?;
                let sig_bytes: [u8; 64] = signature
                    .try_into()
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed ed25519 signature"))?;
                let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
                key.verify(message, &sig).map_err(|_| bad_sig())
            }
            Self::EcdsaSecp256r1Sha256 => {
                let point = p256::EncodedPoint::from_bytes(public_key)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed secp256r1 public key"))?;
                let key = p256::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "invalid secp256r1 public key"))?;
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed ecdsa signature"))?;
                key.verify(message, &sig).map_err(|_| bad_sig())
            }
            Self::EcdsaSecp384r1Sha384 => {
                let point = p384::EncodedPoint::from_bytes(public_key)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed secp384r1 public key"))?;
                let key = p384::ecdsa::VerifyingKey::from_encoded_point(&point)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "invalid secp384r1 public key"))?;
                let sig = p384::ecdsa::Signature::from_der(signature)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed ecdsa signature"))?;
                key.verify(message, &sig).map_err(|_| bad_sig())
            }
            Self::RsaPssRsaeSha256 => {
                let key: RsaPublicKey = rsa::pkcs8::DecodePublicKey::from_public_key_der(public_key)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed rsa public key"))?;
                let verifying = RsaPssVerifyingKey::<Sha256>::new(key);
                let sig = RsaPssSignature::try_from(signature)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed rsa-pss signature"))?;
                verifying.verify(message, &sig).map_err(|_| bad_sig())
            }
            Self::RsaPssRsaeSha384 => {
                let key: RsaPublicKey = rsa::pkcs8::DecodePublicKey::from_public_key_der(public_key)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed rsa public key"))?;
                let verifying = RsaPssVerifyingKey::<Sha384>::new(key);
                let sig = RsaPssSignature::try_from(signature)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed rsa-pss signature"))?;
                verifying.verify(message, &sig).map_err(|_| bad_sig())
            }
            Self::RsaPkcs1Sha256 => {
                let key: RsaPublicKey = rsa::pkcs8::DecodePublicKey::from_public_key_der(public_key)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed rsa public key"))?;
                let verifying = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key);
                let sig = RsaPkcs1Signature::try_from(signature)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed rsa-pkcs1 signature"))?;
                verifying.verify(message, &sig).map_err(|_| bad_sig())
            }
        }
    }
}

/// The 64 0x20 bytes prepended to every `CertificateVerify` signature input,
/// separating it cryptographically from TLS 1.2's signature format.
pub const SIGNATURE_CONTEXT_PAD: [u8; 64] = [0x20; 64];

pub const CLIENT_CERT_VERIFY_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";
pub const SERVER_CERT_VERIFY_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";

/// Builds the content actually signed/verified for `CertificateVerify`:
/// the pad, a context string, a zero byte, then the transcript hash.
pub fn certificate_verify_content(context: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(64 + context.len() + 1 + transcript_hash.len());
    content.extend_from_slice(&SIGNATURE_CONTEXT_PAD);
    content.extend_from_slice(context);
    content.push(0);
    content.extend_from_slice(transcript_hash);
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    /// RFC 8032 section 7.1, test vector 1.
    #[test]
    fn ed25519_rfc8032_vector_1() {
        let secret = hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60").unwrap();
        let public = hex::decode("d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a").unwrap();
        let expected_sig = hex::decode(
            "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065224901555\
             fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b",
        )
        .unwrap();

        let secret: [u8; 32] = secret.try_into().unwrap();
        let signing = SigningKey::from_bytes(&secret);
        assert_eq!(signing.verifying_key().to_bytes().to_vec(), public);

        let sig = signing.sign(b"");
        assert_eq!(sig.to_bytes().to_vec(), expected_sig);

        SignatureScheme::Ed25519.verify(&public, b"", &expected_sig).unwrap();
    }

    #[test]
    fn ed25519_rejects_bit_flipped_message() {
        let secret: [u8; 32] = hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60")
            .unwrap()
            .try_into()
            .unwrap();
        let signing = SigningKey::from_bytes(&secret);
        let public = signing.verifying_key().to_bytes();
        let sig = signing.sign(b"");

        assert!(SignatureScheme::Ed25519
            .verify(&public, b"\x00", &sig.to_bytes())
            .is_err());
    }

    /// Adding the curve's group order `l` to the upper (scalar) half of a
    /// valid signature produces a different 64-byte string that an
    /// implementation checking `S` unreduced would still accept. A
    /// spec-compliant verifier must reject it.
    #[test]
    fn ed25519_rejects_scalar_malleability() {
        const GROUP_ORDER: [u8; 32] = [
            0xed, 0xd3, 0xf5, 0x5c, 0x1a, 0x63, 0x12, 0x58, 0xd6, 0x9c, 0xf7, 0xa2, 0xde, 0xf9, 0xde, 0x14, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10,
        ];

        let secret: [u8; 32] = hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60")
            .unwrap()
            .try_into()
            .unwrap();
        let signing = SigningKey::from_bytes(&secret);
        let public = signing.verifying_key().to_bytes();
        let sig = signing.sign(b"");
        let mut sig_bytes = sig.to_bytes();

        let mut carry: u16 = 0;
        for i in 0..32 {
            let sum = sig_bytes[32 + i] as u16 + GROUP_ORDER[i] as u16 + carry;
            sig_bytes[32 + i] = sum as u8;
            carry = sum >> 8;
        }
        assert_ne!(sig_bytes, sig.to_bytes(), "malleated signature must differ from the original");

        assert!(SignatureScheme::Ed25519.verify(&public, b"", &sig_bytes).is_err());
    }
}
