//! Record protection AEADs.

use aes_gcm::aead::{Aead as _, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce as GcmNonce};
use chacha20poly1305::ChaCha20Poly1305;

use crate::error::{ErrorKind, Result, TlsError};

/// The record-protection AEAD negotiated by a [`crate::cipher_suite::CipherSuite`].
///
/// All three variants use a 12-byte nonce and a 16-byte tag, so the record
/// layer's framing logic is algorithm-independent; only key generation and
/// the seal/open calls differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
    Chacha20Poly1305,
}

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

impl AeadAlgorithm {
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm => 32,
            Self::Chacha20Poly1305 => 32,
        }
    }

    pub const fn nonce_len(self) -> usize {
        NONCE_LEN
    }

    /// Encrypts `plaintext` in place, appending the authentication tag, and
    /// returns the combined ciphertext-plus-tag.
    pub fn seal(self, key: &[u8], nonce: &[u8; NONCE_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = GcmNonce::from_slice(nonce);
        let payload = Payload { msg: plaintext, aad };
        let out = match self {
            Self::Aes128Gcm => {
                let cipher = Aes128Gcm::new_from_slice(key)
                    .map_err(|_| TlsError::new(ErrorKind::InternalError, "bad AES-128-GCM key length"))?;
                cipher.encrypt(nonce, payload)
            }
            Self::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key)
                    .map_err(|_| TlsError::new(ErrorKind::InternalError, "bad AES-256-GCM key length"))?;
                cipher.encrypt(nonce, payload)
            }
            Self::Chacha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(key)
                    .map_err(|_| TlsError::new(ErrorKind::InternalError, "bad ChaCha20-Poly1305 key length"))?;
                cipher.encrypt(nonce, payload)
            }
        };
        out.map_err(|_| TlsError::new(ErrorKind::InternalError, "AEAD seal failed"))
    }

    /// Decrypts and verifies `ciphertext` (which includes the trailing tag),
    /// returning the plaintext or a `DecryptError` on authentication failure.
    ///
    /// A tag mismatch must never be distinguishable from any other failure
    /// mode on the wire -- see Design Notes, "Record decrypt failures are
    /// uniform".
    pub fn open(self, key: &[u8], nonce: &[u8; NONCE_LEN], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let nonce = GcmNonce::from_slice(nonce);
        let payload = Payload { msg: ciphertext, aad };
        let out = match self {
            Self::Aes128Gcm => {
                let cipher = Aes128Gcm::new_from_slice(key)
                    .map_err(|_| TlsError::new(ErrorKind::InternalError, "bad AES-128-GCM key length"))?;
                cipher.decrypt(nonce, payload)
            }
            Self::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key)
                    .map_err(|_| TlsError::new(ErrorKind::InternalError, "bad AES-256-GCM key length"))?;
                cipher.decrypt(nonce, payload)
            }
            Self::Chacha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(key)
                    .map_err(|_| TlsError::new(ErrorKind::InternalError, "bad ChaCha20-Poly1305 key length"))?;
                cipher.decrypt(nonce, payload)
            }
        };
        out.map_err(|_| TlsError::new(ErrorKind::DecryptError, "record authentication failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_128_gcm_round_trips() {
        let key = [0x42u8; 16];
        let nonce = [0x24u8; NONCE_LEN];
        let aad = b"record header";
        let plaintext = b"application data";

        let ciphertext = AeadAlgorithm::Aes128Gcm.seal(&key, &nonce, aad, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);

        let decrypted = AeadAlgorithm::Aes128Gcm.open(&key, &nonce, aad, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let key = [0x11u8; 32];
        let nonce = [0x01u8; NONCE_LEN];
        let mut ciphertext = AeadAlgorithm::Chacha20Poly1305
            .seal(&key, &nonce, b"", b"hello")
            .unwrap();
        *ciphertext.last_mut().unwrap() ^= 0xff;

        assert!(AeadAlgorithm::Chacha20Poly1305.open(&key, &nonce, b"", &ciphertext).is_err());
    }

    #[test]
    fn wrong_aad_is_rejected() {
        let key = [0x99u8; 32];
        let nonce = [0x02u8; NONCE_LEN];
        let ciphertext = AeadAlgorithm::Aes256Gcm.seal(&key, &nonce, b"aad-a", b"hello").unwrap();
        assert!(AeadAlgorithm::Aes256Gcm.open(&key, &nonce, b"aad-b", &ciphertext).is_err());
    }
}
