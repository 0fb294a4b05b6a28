//! Host-supplied configuration for a [`crate::context::HandshakeContext`].

use std::time::Duration;

use crate::cipher_suite::CipherSuite;
use crate::crypto::kex::NamedGroup;
use crate::crypto::sig::SignatureScheme;

/// A local identity: a certificate chain (leaf first) plus the private key
/// material needed to produce `CertificateVerify`, represented as raw,
/// already-extracted key bytes rather than a PKCS#8 blob -- see Design
/// Notes, "Private keys are pre-extracted".
#[derive(Clone)]
pub struct Identity {
    pub certificate_chain: Vec<Vec<u8>>,
    pub signature_scheme: SignatureScheme,
    pub private_key: PrivateKey,
}

/// The private signing key backing an [`Identity`], one variant per
/// supported [`SignatureScheme`] family.
#[derive(Clone)]
pub enum PrivateKey {
    Ed25519(ed25519_dalek::SigningKey),
    EcdsaP256(p256::ecdsa::SigningKey),
    EcdsaP384(p384::ecdsa::SigningKey),
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("certificate_chain_len", &self.certificate_chain.len())
            .field("signature_scheme", &self.signature_scheme)
            .finish()
    }
}

/// Options shared by both client and server contexts.
#[derive(Debug, Clone)]
pub struct CommonOptions {
    /// Cipher suites offered/accepted, most preferred first.
    pub cipher_suites: Vec<CipherSuite>,
    /// Named groups offered/accepted for key exchange, most preferred first.
    pub groups: Vec<NamedGroup>,
    /// Signature schemes this endpoint will accept on the peer's
    /// `CertificateVerify`.
    pub signature_schemes: Vec<SignatureScheme>,
    /// Maximum number of KeyUpdate messages to process before refusing to
    /// continue decrypting, bounding an unbounded-rekey resource attack.
    pub max_key_updates: u32,
    /// Maximum number of post-handshake handshake messages (`KeyUpdate` and
    /// `NewSessionTicket` combined) accepted within any `phh_limit_time`
    /// window, bounding a peer that floods PHH messages within a single
    /// window rather than over the connection's whole lifetime.
    pub phh_limit: u32,
    /// The width of the fixed window `phh_limit` is measured over; the
    /// window resets in full once this much time has elapsed since it
    /// opened, rather than sliding continuously.
    pub phh_limit_time: Duration,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            cipher_suites: CipherSuite::ALL.to_vec(),
            groups: vec![NamedGroup::X25519, NamedGroup::Secp256r1, NamedGroup::Secp384r1],
            signature_schemes: vec![
                SignatureScheme::Ed25519,
                SignatureScheme::EcdsaSecp256r1Sha256,
                SignatureScheme::EcdsaSecp384r1Sha384,
                SignatureScheme::RsaPssRsaeSha256,
            ],
            max_key_updates: 1 << 20,
            phh_limit: 100,
            phh_limit_time: Duration::from_secs(3600),
        }
    }
}

/// Client-specific configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub common: CommonOptions,
    pub server_name: Option<String>,
    /// A resumption PSK carried over from a previous connection's
    /// `NewSessionTicket`, along with its identity bytes.
    pub psk: Option<ClientPsk>,
    /// Offer a client certificate if the server requests one.
    pub identity: Option<Identity>,
}

#[derive(Debug, Clone)]
pub struct ClientPsk {
    pub identity: Vec<u8>,
    pub secret: Vec<u8>,
    pub obfuscated_ticket_age: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            common: CommonOptions::default(),
            server_name: None,
            psk: None,
            identity: None,
        }
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub common: CommonOptions,
    pub identity: Identity,
    pub request_client_certificate: bool,
    /// Issue a `NewSessionTicket` with this lifetime (seconds) immediately
    /// after the handshake completes; `None` to issue no ticket.
    pub session_ticket_lifetime: Option<u32>,
    /// A single PSK this server will accept in a ClientHello's
    /// `pre_shared_key` extension, matched against the offered identity by
    /// byte equality. `None` means PSK resumption is not offered.
    pub psk: Option<ServerPsk>,
}

#[derive(Debug, Clone)]
pub struct ServerPsk {
    pub identity: Vec<u8>,
    pub secret: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_common_options_prefer_x25519_and_aes_gcm() {
        let opts = CommonOptions::default();
        assert_eq!(opts.groups[0], NamedGroup::X25519);
        assert_eq!(opts.cipher_suites[0], CipherSuite::Aes128GcmSha256);
    }
}
