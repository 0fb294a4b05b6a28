//! Key-exchange groups.

use p256::ecdh::EphemeralSecret as P256Secret;
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::EncodedPoint as P256Point;
use p384::ecdh::EphemeralSecret as P384Secret;
use p384::EncodedPoint as P384Point;
use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{EphemeralSecret as X25519Secret, PublicKey as X25519Public};

use crate::error::{ErrorKind, Result, TlsError};

/// `enum { ... } NamedGroup;` restricted to the groups this engine offers
/// and accepts key shares for.
///
/// `secp521r1` is deliberately absent -- see Design Notes, "Unsupported
/// named groups".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NamedGroup {
    Secp256r1,
    Secp384r1,
    X25519,
}

impl NamedGroup {
    pub const fn value(self) -> u16 {
        match self {
            Self::Secp256r1 => 0x0017,
            Self::Secp384r1 => 0x0018,
            Self::X25519 => 0x001D,
        }
    }

    pub const fn from_value(value: u16) -> Option<Self> {
        match value {
            0x0017 => Some(Self::Secp256r1),
            0x0018 => Some(Self::Secp384r1),
            0x001D => Some(Self::X25519),
            _ => None,
        }
    }

    /// The encoded length of a public key share for this group.
    pub const fn public_len(self) -> usize {
        match self {
            Self::Secp256r1 => 65,
            Self::Secp384r1 => 97,
            Self::X25519 => 32,
        }
    }
}

/// An ephemeral key-exchange keypair for one named group.
///
/// Holds onto the private key only long enough to compute the shared
/// secret once the peer's share arrives; [`KeyShare::agree`] consumes it.
pub enum KeyShare {
    Secp256r1 { secret: P256Secret, public: [u8; 65] },
    Secp384r1 { secret: P384Secret, public: [u8; 97] },
    X25519 { secret: X25519Secret, public: [u8; 32] },
}

impl KeyShare {
    pub fn generate<R: RngCore + CryptoRng>(group: NamedGroup, rng: &mut R) -> Self {
        match group {
            NamedGroup::Secp256r1 => {
                let secret = P256Secret::random(rng);
                let public = P256Point::from(secret.public_key());
                let mut buf = [0u8; 65];
                buf.copy_from_slice(public.as_bytes());
                Self::Secp256r1 { secret, public: buf }
            }
            NamedGroup::Secp384r1 => {
                let secret = P384Secret::random(rng);
                let public = P384Point::from(secret.public_key());
                let mut buf = [0u8; 97];
                buf.copy_from_slice(public.as_bytes());
                Self::Secp384r1 { secret, public: buf }
            }
            NamedGroup::X25519 => {
                let secret = X25519Secret::random_from_rng(rng);
                let public = X25519Public::from(&secret);
                Self::X25519 {
                    secret,
                    public: *public.as_bytes(),
                }
            }
        }
    }

    pub fn group(&self) -> NamedGroup {
        match self {
            Self::Secp256r1 { .. } => NamedGroup::Secp256r1,
            Self::Secp384r1 { .. } => NamedGroup::Secp384r1,
            Self::X25519 { .. } => NamedGroup::X25519,
        }
    }

    pub fn public_bytes(&self) -> &[u8] {
        match self {
            Self::Secp256r1 { public, .. } => public.as_slice(),
            Self::Secp384r1 { public, .. } => public.as_slice(),
            Self::X25519 { public, .. } => public.as_slice(),
        }
    }

    /// Consumes this keypair's private half to compute the ECDHE/X25519
    /// shared secret with `peer_public`.
    pub fn agree(self, peer_public: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Secp256r1 { secret, .. } => {
                let point = P256Point::from_bytes(peer_public)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed secp256r1 key share"))?;
                let public = p256::PublicKey::from_encoded_point(&point);
                if public.is_none().into() {
                    return Err(TlsError::new(ErrorKind::IllegalParameter, "secp256r1 point not on curve"));
                }
                let shared = secret.diffie_hellman(&public.unwrap());
                Ok(shared.raw_secret_bytes().to_vec())
            }
            Self::Secp384r1 { secret, .. } => {
                let point = P384Point::from_bytes(peer_public)
                    .map_err(|_| TlsError::new(ErrorKind::DecodeError, "malformed secp384r1 key share"))?;
                let public = p384::PublicKey::from_encoded_point(&point);
                if public.is_none().into() {
                    return Err(TlsError::new(ErrorKind::IllegalParameter, "secp384r1 point not on curve"));
                }
                let shared = secret.diffie_hellman(&public.unwrap());
                Ok(shared.raw_secret_bytes().to_vec())
            }
            Self::X25519 { secret, .. } => {
                if peer_public.len() != 32 {
                    return Err(TlsError::new(ErrorKind::DecodeError, "malformed x25519 key share"));
                }
                let mut peer = [0u8; 32];
                peer.copy_from_slice(peer_public);
                let shared = secret.diffie_hellman(&X25519Public::from(peer));
                if !bool::from(shared.was_contributory()) {
                    return Err(TlsError::new(
                        ErrorKind::HandshakeFailure,
                        "x25519 shared secret is non-contributory (low-order point)",
                    ));
                }
                Ok(shared.as_bytes().to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn x25519_agreement_is_symmetric() {
        let mut rng = OsRng;
        let a = KeyShare::generate(NamedGroup::X25519, &mut rng);
        let b = KeyShare::generate(NamedGroup::X25519, &mut rng);

        let a_pub = a.public_bytes().to_vec();
        let b_pub = b.public_bytes().to_vec();

        let a_shared = a.agree(&b_pub).unwrap();
        let b_shared = b.agree(&a_pub).unwrap();
        assert_eq!(a_shared, b_shared);
        assert_eq!(a_shared.len(), 32);
    }

    #[test]
    fn x25519_rejects_all_zero_peer_share() {
        let mut rng = OsRng;
        let a = KeyShare::generate(NamedGroup::X25519, &mut rng);
        let low_order_point = [0u8; 32];
        let err = a.agree(&low_order_point).unwrap_err();
        assert_eq!(err.kind, ErrorKind::HandshakeFailure);
    }

    #[test]
    fn secp256r1_agreement_is_symmetric() {
        let mut rng = OsRng;
        let a = KeyShare::generate(NamedGroup::Secp256r1, &mut rng);
        let b = KeyShare::generate(NamedGroup::Secp256r1, &mut rng);

        let a_pub = a.public_bytes().to_vec();
        let b_pub = b.public_bytes().to_vec();

        let a_shared = a.agree(&b_pub).unwrap();
        let b_shared = b.agree(&a_pub).unwrap();
        assert_eq!(a_shared, b_shared);
    }
}
