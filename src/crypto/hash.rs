//! The hash algorithms the key schedule and transcript hash run on.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384};

/// A running hash, boxed behind an enum rather than a trait object since
/// only two concrete algorithms are ever negotiated.
#[derive(Debug, Clone)]
pub enum RunningHash {
    Sha256(Sha256),
    Sha384(Sha384),
}

impl RunningHash {
    pub fn new(alg: HashAlgorithm) -> Self {
        match alg {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => Self::Sha384(Sha384::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
        }
    }

    /// Returns the digest of everything hashed so far without consuming the
    /// running state, matching the "transcript hash at this point" queries
    /// the handshake state machine needs at several junctures.
    pub fn clone_finalize(&self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.clone().finalize().to_vec(),
            Self::Sha384(h) => h.clone().finalize().to_vec(),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha256(_) => HashAlgorithm::Sha256,
            Self::Sha384(_) => HashAlgorithm::Sha384,
        }
    }
}

/// The hash algorithm backing a cipher suite's key schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
        }
    }

    /// The digest of the empty string, used as `Transcript-Hash([])` in the
    /// early-secret derivation path when no ClientHello has been sent yet.
    pub fn empty_hash(self) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::new().finalize().to_vec(),
            Self::Sha384 => Sha384::new().finalize().to_vec(),
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
        }
    }

    pub fn hmac(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Sha384 => {
                let mut mac = Hmac::<Sha384>::new_from_slice(key).expect("hmac accepts any key length");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hash_matches_known_constant() {
        let h = HashAlgorithm::Sha256.empty_hash();
        assert_eq!(
            hex::encode(h),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn running_hash_matches_one_shot_digest() {
        let mut running = RunningHash::new(HashAlgorithm::Sha256);
        running.update(b"hello ");
        running.update(b"world");
        assert_eq!(running.clone_finalize(), HashAlgorithm::Sha256.digest(b"hello world"));
    }
}
