//! The TLS 1.3 key schedule: the sequence of HKDF-Extract/Expand-Label
//! calls that turns (EC)DHE and PSK inputs into traffic secrets.
//!
//! # References
//!
//! * [RFC 8446 Section 7.1](https://datatracker.ietf.org/doc/html/rfc8446#section-7.1)

use hkdf::Hkdf;
use sha2::{Sha256, Sha384};
use zeroize::Zeroize;

use crate::crypto::hash::{HashAlgorithm, RunningHash};
use crate::error::{proto_err, ErrorKind, Result};

/// `HKDF-Expand-Label(Secret, Label, Context, Length)`.
fn hkdf_expand_label(alg: HashAlgorithm, secret: &[u8], label: &[u8], context: &[u8], len: usize) -> Vec<u8> {
    let mut hkdf_label = Vec::with_capacity(2 + 1 + 6 + label.len() + 1 + context.len());
    hkdf_label.extend_from_slice(&(len as u16).to_be_bytes());

    let full_label_len = 6 + label.len();
    hkdf_label.push(full_label_len as u8);
    hkdf_label.extend_from_slice(b"tls13 ");
    hkdf_label.extend_from_slice(label);

    hkdf_label.push(context.len() as u8);
    hkdf_label.extend_from_slice(context);

    let mut out = vec![0u8; len];
    match alg {
        HashAlgorithm::Sha256 => {
            let hk = Hkdf::<Sha256>::from_prk(secret).expect("secret is a valid HKDF PRK");
            hk.expand(&hkdf_label, &mut out).expect("expand length is valid");
        }
        HashAlgorithm::Sha384 => {
            let hk = Hkdf::<Sha384>::from_prk(secret).expect("secret is a valid HKDF PRK");
            hk.expand(&hkdf_label, &mut out).expect("expand length is valid");
        }
    }
    out
}

fn hkdf_extract(alg: HashAlgorithm, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
    match alg {
        HashAlgorithm::Sha256 => Hkdf::<Sha256>::extract(Some(salt), ikm).0.to_vec(),
        HashAlgorithm::Sha384 => Hkdf::<Sha384>::extract(Some(salt), ikm).0.to_vec(),
    }
}

/// `Derive-Secret(Secret, Label, Messages)`, where `Messages` is the
/// transcript hash computed over the messages seen so far.
fn derive_secret(alg: HashAlgorithm, secret: &[u8], label: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    hkdf_expand_label(alg, secret, label, transcript_hash, alg.output_len())
}

/// A derived read/write traffic key and its associated static IV, from
/// which the per-record nonce is produced by XORing in the sequence number.
#[derive(Debug, Clone)]
pub struct TrafficKeys {
    pub key: Vec<u8>,
    pub iv: [u8; 12],
}

impl Drop for TrafficKeys {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

/// Tracks how far a [`KeySchedule`] has advanced through RFC 8446 Figure
/// 2's one-way chain, so a call made before its predecessor stage is
/// rejected with [`ErrorKind::InternalError`] instead of panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    New,
    Early,
    Handshake,
    Master,
}

/// The four phase-secrets in RFC 8446 Figure 2's key schedule, plus the
/// transcript hash and HKDF algorithm driving them.
///
/// Phases advance strictly forward (`new` -> `early` -> `handshake` ->
/// `master`); there is no API to go backward, matching the one-way nature
/// of the schedule. Every accessor that depends on a prior stage having run
/// returns `Err(ErrorKind::InternalError)` instead of panicking when called
/// out of order.
pub struct KeySchedule {
    alg: HashAlgorithm,
    stage: Stage,
    transcript: RunningHash,
    early_secret: Option<Vec<u8>>,
    handshake_secret: Option<Vec<u8>>,
    master_secret: Option<Vec<u8>>,
    pub client_handshake_traffic_secret: Option<Vec<u8>>,
    pub server_handshake_traffic_secret: Option<Vec<u8>>,
    pub client_application_traffic_secret: Option<Vec<u8>>,
    pub server_application_traffic_secret: Option<Vec<u8>>,
    pub exporter_master_secret: Option<Vec<u8>>,
    pub resumption_master_secret: Option<Vec<u8>>,
}

impl Drop for KeySchedule {
    fn drop(&mut self) {
        for secret in [
            &mut self.early_secret,
            &mut self.handshake_secret,
            &mut self.master_secret,
            &mut self.client_handshake_traffic_secret,
            &mut self.server_handshake_traffic_secret,
            &mut self.client_application_traffic_secret,
            &mut self.server_application_traffic_secret,
            &mut self.exporter_master_secret,
            &mut self.resumption_master_secret,
        ] {
            if let Some(s) = secret {
                s.zeroize();
            }
        }
    }
}

impl KeySchedule {
    pub fn new(alg: HashAlgorithm) -> Self {
        Self {
            alg,
            stage: Stage::New,
            transcript: RunningHash::new(alg),
            early_secret: None,
            handshake_secret: None,
            master_secret: None,
            client_handshake_traffic_secret: None,
            server_handshake_traffic_secret: None,
            client_application_traffic_secret: None,
            server_application_traffic_secret: None,
            exporter_master_secret: None,
            resumption_master_secret: None,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.alg
    }

    pub fn update_transcript(&mut self, message: &[u8]) {
        self.transcript.update(message);
    }

    pub fn transcript_hash(&self) -> Vec<u8> {
        self.transcript.clone_finalize()
    }

    /// Replaces the transcript with the synthetic `message_hash` the spec
    /// mandates after a HelloRetryRequest: a single `message_hash` handshake
    /// header wrapping the hash of everything seen before the retry.
    pub fn reset_transcript_for_hello_retry_request(&mut self) {
        let prior_hash = self.transcript_hash();
        let mut synthetic = Vec::with_capacity(4 + prior_hash.len());
        synthetic.push(254); // HandshakeType::MessageHash
        let len = prior_hash.len() as u32;
        synthetic.extend_from_slice(&len.to_be_bytes()[1..]);
        synthetic.extend_from_slice(&prior_hash);

        self.transcript = RunningHash::new(self.alg);
        self.transcript.update(&synthetic);
    }

    /// Derives the early secret from `psk` (all zeros of the hash's output
    /// length when no PSK is in use) and the resumption/external binder key.
    pub fn initialize_early_secret(&mut self, psk: Option<&[u8]>) {
        let ikm = psk.map(<[u8]>::to_vec).unwrap_or_else(|| vec![0u8; self.alg.output_len()]);
        let salt = vec![0u8; self.alg.output_len()];
        self.early_secret = Some(hkdf_extract(self.alg, &salt, &ikm));
        self.stage = Stage::Early;
    }

    fn require(&self, stage: Stage, what: &str) -> Result<()> {
        if self.stage < stage {
            return Err(proto_err!(
                ErrorKind::InternalError,
                "key schedule stage {stage:?} required for {what}, but schedule is at {:?}",
                self.stage
            ));
        }
        Ok(())
    }

    /// The binder key derived from the early secret, used to authenticate a
    /// PSK identity in a ClientHello before the rest of the handshake runs.
    pub fn binder_key(&self, external: bool) -> Result<Vec<u8>> {
        self.require(Stage::Early, "binder_key")?;
        let early = self.early_secret.as_ref().unwrap();
        let label: &[u8] = if external { b"ext binder" } else { b"res binder" };
        Ok(derive_secret(self.alg, early, label, &self.alg.empty_hash()))
    }

    pub fn compute_binder(&self, binder_key: &[u8], transcript_hash_to_truncated_hello: &[u8]) -> Vec<u8> {
        let finished_key = hkdf_expand_label(self.alg, binder_key, b"finished", &[], self.alg.output_len());
        self.alg.hmac(&finished_key, transcript_hash_to_truncated_hello)
    }

    /// Advances from the early secret to the handshake secret, mixing in
    /// the (EC)DHE shared secret.
    pub fn initialize_handshake_secret(&mut self, dhe_shared_secret: &[u8]) -> Result<()> {
        self.require(Stage::Early, "initialize_handshake_secret")?;
        let early = self.early_secret.clone().unwrap();
        let derived = derive_secret(self.alg, &early, b"derived", &self.alg.empty_hash());
        self.handshake_secret = Some(hkdf_extract(self.alg, &derived, dhe_shared_secret));

        let th = self.transcript_hash();
        let handshake = self.handshake_secret.as_ref().unwrap();
        self.client_handshake_traffic_secret = Some(derive_secret(self.alg, handshake, b"c hs traffic", &th));
        self.server_handshake_traffic_secret = Some(derive_secret(self.alg, handshake, b"s hs traffic", &th));
        self.stage = Stage::Handshake;
        Ok(())
    }

    /// Advances from the handshake secret to the master secret. Must be
    /// called after the transcript includes up through `ServerHello` but the
    /// derived application traffic secrets are only meaningful once the
    /// transcript additionally includes the server's `Finished`.
    pub fn initialize_master_secret(&mut self) -> Result<()> {
        self.require(Stage::Handshake, "initialize_master_secret")?;
        let handshake = self.handshake_secret.as_ref().unwrap();
        let derived = derive_secret(self.alg, handshake, b"derived", &self.alg.empty_hash());
        let zeros = vec![0u8; self.alg.output_len()];
        self.master_secret = Some(hkdf_extract(self.alg, &derived, &zeros));
        self.stage = Stage::Master;
        Ok(())
    }

    /// Derives the application traffic secrets and exporter master secret
    /// from the master secret, using the transcript hash through
    /// `ServerFinished`.
    pub fn derive_application_secrets(&mut self) -> Result<()> {
        self.require(Stage::Master, "derive_application_secrets")?;
        let master = self.master_secret.as_ref().unwrap();
        let th = self.transcript_hash();
        self.client_application_traffic_secret = Some(derive_secret(self.alg, master, b"c ap traffic", &th));
        self.server_application_traffic_secret = Some(derive_secret(self.alg, master, b"s ap traffic", &th));
        self.exporter_master_secret = Some(derive_secret(self.alg, master, b"exp master", &th));
        Ok(())
    }

    /// Derives the resumption master secret, using the transcript hash
    /// through the client's `Finished`.
    pub fn derive_resumption_secret(&mut self) -> Result<()> {
        self.require(Stage::Master, "derive_resumption_secret")?;
        let master = self.master_secret.as_ref().unwrap();
        let th = self.transcript_hash();
        self.resumption_master_secret = Some(derive_secret(self.alg, master, b"res master", &th));
        Ok(())
    }

    /// `Derive-Secret(PSK, "resumption", "")` for a `NewSessionTicket`'s
    /// per-ticket PSK.
    pub fn resumption_psk(&self, ticket_nonce: &[u8]) -> Result<Vec<u8>> {
        self.require(Stage::Master, "resumption_psk")?;
        let resumption = self.resumption_master_secret.as_ref().unwrap();
        Ok(hkdf_expand_label(self.alg, resumption, b"resumption", ticket_nonce, self.alg.output_len()))
    }

    /// The HMAC-based `finished_key` and verify-data computation shared by
    /// both client and server `Finished` messages (section 4.4.4).
    pub fn verify_data(&self, base_key: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
        let finished_key = hkdf_expand_label(self.alg, base_key, b"finished", &[], self.alg.output_len());
        self.alg.hmac(&finished_key, transcript_hash)
    }

    /// `KeyUpdate`'s `application_traffic_secret_N+1` derivation (section 7.2).
    pub fn update_application_traffic_secret(&self, secret: &[u8]) -> Vec<u8> {
        hkdf_expand_label(self.alg, secret, b"traffic upd", &[], self.alg.output_len())
    }

    /// Derives the record-layer key and IV from a traffic secret.
    pub fn traffic_keys(&self, secret: &[u8], key_len: usize) -> TrafficKeys {
        let key = hkdf_expand_label(self.alg, secret, b"key", &[], key_len);
        let iv_bytes = hkdf_expand_label(self.alg, secret, b"iv", &[], 12);
        let mut iv = [0u8; 12];
        iv.copy_from_slice(&iv_bytes);
        TrafficKeys { key, iv }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_secrets_are_deterministic_given_same_transcript() {
        let mut a = KeySchedule::new(HashAlgorithm::Sha256);
        let mut b = KeySchedule::new(HashAlgorithm::Sha256);

        for ks in [&mut a, &mut b] {
            ks.initialize_early_secret(None);
            ks.update_transcript(b"client hello bytes");
            ks.update_transcript(b"server hello bytes");
            ks.initialize_handshake_secret(&[0x42; 32]).unwrap();
            ks.update_transcript(b"encrypted extensions");
            ks.update_transcript(b"certificate");
            ks.update_transcript(b"certificate verify");
            ks.update_transcript(b"server finished");
            ks.initialize_master_secret().unwrap();
            ks.derive_application_secrets().unwrap();
        }

        assert_eq!(
            a.client_application_traffic_secret,
            b.client_application_traffic_secret
        );
        assert_eq!(
            a.server_application_traffic_secret,
            b.server_application_traffic_secret
        );
        assert_ne!(
            a.client_application_traffic_secret,
            a.server_application_traffic_secret
        );
    }

    #[test]
    fn traffic_keys_have_requested_length() {
        let mut ks = KeySchedule::new(HashAlgorithm::Sha384);
        ks.initialize_early_secret(None);
        ks.initialize_handshake_secret(&[0x11; 48]).unwrap();
        let secret = ks.client_handshake_traffic_secret.clone().unwrap();
        let keys = ks.traffic_keys(&secret, 32);
        assert_eq!(keys.key.len(), 32);
        assert_eq!(keys.iv.len(), 12);
    }

    #[test]
    fn key_update_derivation_changes_secret() {
        let mut ks = KeySchedule::new(HashAlgorithm::Sha256);
        ks.initialize_early_secret(None);
        ks.initialize_handshake_secret(&[0x01; 32]).unwrap();
        ks.initialize_master_secret().unwrap();
        ks.derive_application_secrets().unwrap();
        let secret0 = ks.client_application_traffic_secret.clone().unwrap();
        let secret1 = ks.update_application_traffic_secret(&secret0);
        assert_ne!(secret0, secret1);
        assert_eq!(secret1.len(), 32);
    }

    #[test]
    fn out_of_order_calls_fail_instead_of_panicking() {
        let ks = KeySchedule::new(HashAlgorithm::Sha256);
        assert_eq!(ks.binder_key(false).unwrap_err().kind, ErrorKind::InternalError);
        assert_eq!(ks.resumption_psk(&[]).unwrap_err().kind, ErrorKind::InternalError);

        let mut ks = KeySchedule::new(HashAlgorithm::Sha256);
        assert_eq!(
            ks.initialize_handshake_secret(&[0x00; 32]).unwrap_err().kind,
            ErrorKind::InternalError
        );
        assert_eq!(ks.initialize_master_secret().unwrap_err().kind, ErrorKind::InternalError);

        ks.initialize_early_secret(None);
        ks.binder_key(false).unwrap();
        assert_eq!(ks.initialize_master_secret().unwrap_err().kind, ErrorKind::InternalError);
        assert_eq!(ks.derive_application_secrets().unwrap_err().kind, ErrorKind::InternalError);
    }
}
