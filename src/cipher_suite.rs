//! Negotiable cipher suites.
//!
//! Each suite names an AEAD algorithm and the hash algorithm used to drive
//! its key schedule and transcript hash; RFC 8446 does not permit mixing the
//! two independently of the wire codepoint the way TLS 1.2 did.

use crate::crypto::aead::AeadAlgorithm;
use crate::crypto::hash::HashAlgorithm;

/// `enum { ... } CipherSuite;` restricted to the TLS 1.3 AEAD suites this
/// engine implements.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CipherSuite {
    Aes128GcmSha256 = 0x1301,
    Aes256GcmSha384 = 0x1302,
    Chacha20Poly1305Sha256 = 0x1303,
}

impl CipherSuite {
    pub const fn value(self) -> [u8; 2] {
        (self as u16).to_be_bytes()
    }

    pub const fn hash(self) -> HashAlgorithm {
        match self {
            Self::Aes128GcmSha256 => HashAlgorithm::Sha256,
            Self::Aes256GcmSha384 => HashAlgorithm::Sha384,
            Self::Chacha20Poly1305Sha256 => HashAlgorithm::Sha256,
        }
    }

    pub const fn aead(self) -> AeadAlgorithm {
        match self {
            Self::Aes128GcmSha256 => AeadAlgorithm::Aes128Gcm,
            Self::Aes256GcmSha384 => AeadAlgorithm::Aes256Gcm,
            Self::Chacha20Poly1305Sha256 => AeadAlgorithm::Chacha20Poly1305,
        }
    }

    /// Preference order used when more than one proposed suite is supported:
    /// prefer AES-GCM over ChaCha20-Poly1305, and the stronger suite within
    /// a family, matching the corpus's default preference list.
    pub const ALL: [CipherSuite; 3] = [
        Self::Aes128GcmSha256,
        Self::Aes256GcmSha384,
        Self::Chacha20Poly1305Sha256,
    ];
}

impl TryFrom<[u8; 2]> for CipherSuite {
    type Error = [u8; 2];

    fn try_from(value: [u8; 2]) -> Result<Self, [u8; 2]> {
        match u16::from_be_bytes(value) {
            0x1301 => Ok(Self::Aes128GcmSha256),
            0x1302 => Ok(Self::Aes256GcmSha384),
            0x1303 => Ok(Self::Chacha20Poly1305Sha256),
            _ => Err(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_value() {
        for suite in CipherSuite::ALL {
            assert_eq!(CipherSuite::try_from(suite.value()).unwrap(), suite);
        }
    }

    #[test]
    fn unknown_value_is_rejected() {
        assert!(CipherSuite::try_from([0x00, 0x00]).is_err());
    }
}
