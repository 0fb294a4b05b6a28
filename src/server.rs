//! The server-side handshake driver.

use rand_core::{OsRng, RngCore};

use crate::bytes::{ByteReader, ByteWriter};
use crate::cipher_suite::CipherSuite;
use crate::context::{HandshakeContext, Role};
use crate::crypto::hash::RunningHash;
use crate::crypto::kex::{KeyShare, NamedGroup};
use crate::crypto::sig::{self, SignatureScheme};
use crate::error::{ErrorKind, Result, TlsError};
use crate::extensions::{
    self, server_key_share_body, server_pre_shared_key_body, signature_algorithms_body,
    supported_versions_server_body, ExtensionReader, ExtensionType, KeyShareEntry,
};
use crate::handshake::{
    Certificate, CertificateEntry, CertificateRequest, CertificateVerify, ClientHello, EncryptedExtensions, Finished,
    Handshake, NewSessionTicket, ServerHello, HELLO_RETRY_REQUEST_RANDOM,
};
use crate::io::{HandshakeIo, IoStatus};
use crate::key_schedule::KeySchedule;
use crate::options::{ServerOptions, ServerPsk};

enum ServerState {
    Start,
    WaitClientCertificate,
    WaitClientCertificateVerify,
    WaitClientFinished,
    Connected,
}

/// A server connection, driving the handshake against a peer reachable
/// through `IO`.
pub struct ServerConnection<IO: HandshakeIo> {
    ctx: HandshakeContext<IO>,
    options: ServerOptions,
    state: ServerState,
}

enum NegotiatedGroup {
    Share(KeyShareEntry),
    RetryWith(NamedGroup),
}

impl<IO: HandshakeIo> ServerConnection<IO> {
    pub fn new(io: IO, options: ServerOptions) -> Self {
        let common = &options.common;
        let ctx = HandshakeContext::new(io, Role::Server, common.max_key_updates, common.phh_limit, common.phh_limit_time);
        Self {
            ctx,
            options,
            state: ServerState::Start,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_connected()
    }

    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        self.ctx.peer_certificates()
    }

    pub fn write_application_data(&mut self, data: &[u8]) -> Result<IoStatus> {
        self.ctx.write_application_data(data)
    }

    pub fn read_application_data(&mut self, out: &mut Vec<u8>) -> Result<IoStatus> {
        self.ctx.read_application_data(out)
    }

    pub fn request_key_update(&mut self, request_peer_update: bool) -> Result<()> {
        let request = if request_peer_update {
            crate::handshake::KeyUpdateRequest::Requested
        } else {
            crate::handshake::KeyUpdateRequest::NotRequested
        };
        self.ctx.send_key_update(request)
    }

    pub fn close(&mut self) -> IoStatus {
        self.ctx.close()
    }

    /// Drives the handshake as far as it can go without blocking.
    pub fn handshake(&mut self) -> IoStatus {
        loop {
            match self.step() {
                Ok(Some(status)) => return status,
                Ok(None) => continue,
                Err(err) => {
                    let alert = err.kind.wire_alert();
                    self.ctx.queue_fatal_alert(alert);
                    let _ = self.ctx.flush_pending_out();
                    return IoStatus::Failure;
                }
            }
        }
    }

    fn negotiate_cipher_suite(&self, offered: &[[u8; 2]]) -> Result<CipherSuite> {
        self.options
            .common
            .cipher_suites
            .iter()
            .copied()
            .find(|suite| offered.contains(&suite.value()))
            .ok_or_else(|| TlsError::new(ErrorKind::NoSharedCipher, "no mutually supported cipher suite"))
    }

    /// Finds the first server-preferred group the client already sent a key
    /// share for, or, failing that, the first mutually supported named
    /// group with no matching share -- which drives a HelloRetryRequest.
    fn negotiate_group(&self, client_hello: &ClientHello) -> Result<NegotiatedGroup> {
        let mut reader = ExtensionReader::new(ByteReader::new(&client_hello.extensions));
        let mut offered_shares = Vec::new();
        let mut offered_groups = Vec::new();

        while let Some((ext_type, mut body)) = reader.next_extension()? {
            if ext_type == ExtensionType::KeyShare as u16 {
                let mut list = body.read_reader_u16()?;
                while !list.is_empty() {
                    if let Some(entry) = KeyShareEntry::parse_lenient(&mut list)? {
                        offered_shares.push(entry);
                    }
                }
            } else if ext_type == ExtensionType::SupportedGroups as u16 {
                let mut list = body.read_reader_u16()?;
                while !list.is_empty() {
                    let raw = list.read_u16()?;
                    if let Some(group) = NamedGroup::from_value(raw) {
                        offered_groups.push(group);
                    }
                }
            }
        }

        for group in &self.options.common.groups {
            if let Some(entry) = offered_shares.iter().find(|e| e.group == *group) {
                return Ok(NegotiatedGroup::Share(entry.clone()));
            }
        }
        for group in &self.options.common.groups {
            if offered_groups.contains(group) {
                return Ok(NegotiatedGroup::RetryWith(*group));
            }
        }
        Err(TlsError::new(ErrorKind::HandshakeFailure, "no mutually supported named group"))
    }

    /// Checks a ClientHello's `pre_shared_key` extension, if any, against
    /// the single configured PSK: the offered identity must match by byte
    /// equality and the binder must verify over the truncated ClientHello
    /// (RFC 8446 section 4.2.11.2). Returns the matched PSK, or `None` if no
    /// PSK was offered, none is configured, or the identity didn't match --
    /// all of which fall back to a full, non-resuming handshake rather than
    /// an error. A matching identity with a bad binder is fatal.
    fn verify_offered_psk(
        &self,
        client_hello: &ClientHello,
        client_hello_raw: &[u8],
        suite: CipherSuite,
    ) -> Result<Option<ServerPsk>> {
        let Some(configured) = &self.options.psk else {
            return Ok(None);
        };

        let mut reader = ExtensionReader::new(ByteReader::new(&client_hello.extensions));
        let mut offered = None;
        let mut offers_dhe_ke = false;
        while let Some((ext_type, mut body)) = reader.next_extension()? {
            if ext_type == ExtensionType::PreSharedKey as u16 {
                offered = Some(extensions::parse_client_pre_shared_key(&mut body)?);
            } else if ext_type == ExtensionType::PskKeyExchangeModes as u16 {
                let mut modes = body.read_reader_u8()?;
                while !modes.is_empty() {
                    if modes.read_u8()? == extensions::PSK_DHE_KE {
                        offers_dhe_ke = true;
                    }
                }
            }
        }
        let Some((identity, binder)) = offered else {
            return Ok(None);
        };
        if !offers_dhe_ke || identity.identity != configured.identity {
            return Ok(None);
        }

        let hash_alg = suite.hash();
        let hash_len = hash_alg.output_len();
        if client_hello_raw.len() < hash_len {
            return Err(TlsError::new(ErrorKind::DecodeError, "ClientHello too short to carry a PSK binder"));
        }
        let truncated = &client_hello_raw[..client_hello_raw.len() - hash_len];
        let mut transcript = RunningHash::new(hash_alg);
        transcript.update(truncated);
        let transcript_hash = transcript.clone_finalize();

        let mut binder_schedule = KeySchedule::new(hash_alg);
        binder_schedule.initialize_early_secret(Some(&configured.secret));
        let binder_key = binder_schedule
            .binder_key(false)
            .expect("early secret was just initialized above");
        let expected_binder = binder_schedule.compute_binder(&binder_key, &transcript_hash);

        if !constant_time_eq(&expected_binder, &binder) {
            return Err(TlsError::new(ErrorKind::DecryptError, "PSK binder verification failed"));
        }
        Ok(Some(configured.clone()))
    }

    fn step(&mut self) -> Result<Option<IoStatus>> {
        match &self.state {
            ServerState::Start => {
                if self.ctx.flush_pending_out().is_err() {
                    return Ok(Some(IoStatus::WantPollOut));
                }
                let Some((message, client_hello_raw)) = self.ctx.next_handshake_message()? else {
                    return Ok(Some(IoStatus::WantPollIn));
                };
                let Handshake::ClientHello(client_hello) = message else {
                    return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected ClientHello"));
                };

                let suite = self.negotiate_cipher_suite(&client_hello.cipher_suites)?;
                self.ctx.cipher_suite = Some(suite);
                let psk_match = self.verify_offered_psk(&client_hello, &client_hello_raw, suite)?;
                if self.ctx.key_schedule.is_none() {
                    let mut ks = KeySchedule::new(suite.hash());
                    ks.initialize_early_secret(psk_match.as_ref().map(|psk| psk.secret.as_slice()));
                    self.ctx.key_schedule = Some(ks);
                }
                self.ctx.key_schedule.as_mut().unwrap().update_transcript(&client_hello_raw);

                match self.negotiate_group(&client_hello)? {
                    NegotiatedGroup::RetryWith(group) => {
                        self.send_hello_retry_request(suite, group)?;
                        // `Start` is re-entered; the next ClientHello must
                        // carry a key share for `group`.
                        Ok(None)
                    }
                    NegotiatedGroup::Share(entry) => {
                        self.complete_key_exchange(suite, entry, psk_match.is_some())?;
                        Ok(None)
                    }
                }
            }
            ServerState::WaitClientCertificate => {
                if self.ctx.flush_pending_out().is_err() {
                    return Ok(Some(IoStatus::WantPollOut));
                }
                let Some((message, _raw)) = self.ctx.next_handshake_message()? else {
                    return Ok(Some(IoStatus::WantPollIn));
                };
                let Handshake::Certificate(cert) = message else {
                    return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected client Certificate"));
                };
                if cert.entries.is_empty() {
                    self.state = ServerState::WaitClientFinished;
                } else {
                    self.ctx.peer_certificates = cert.entries.iter().map(|e| e.cert_data.clone()).collect();
                    self.state = ServerState::WaitClientCertificateVerify;
                }
                Ok(None)
            }
            ServerState::WaitClientCertificateVerify => {
                let transcript_hash = self.ctx.key_schedule.as_ref().unwrap().transcript_hash();
                let Some((message, _raw)) = self.ctx.next_handshake_message()? else {
                    return Ok(Some(IoStatus::WantPollIn));
                };
                let Handshake::CertificateVerify(cv) = message else {
                    return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected client CertificateVerify"));
                };
                let scheme = SignatureScheme::from_value(cv.algorithm)
                    .ok_or_else(|| TlsError::new(ErrorKind::IllegalParameter, "unknown signature scheme"))?;
                let leaf = self
                    .ctx
                    .peer_certificates
                    .first()
                    .ok_or_else(|| TlsError::new(ErrorKind::CertificateRequired, "no client certificate to verify against"))?;
                let content = sig::certificate_verify_content(sig::CLIENT_CERT_VERIFY_CONTEXT, &transcript_hash);
                scheme.verify(leaf, &content, &cv.signature)?;
                self.state = ServerState::WaitClientFinished;
                Ok(None)
            }
            ServerState::WaitClientFinished => {
                if self.ctx.flush_pending_out().is_err() {
                    return Ok(Some(IoStatus::WantPollOut));
                }
                let transcript_hash = self.ctx.key_schedule.as_ref().unwrap().transcript_hash();
                let Some((message, _raw)) = self.ctx.next_handshake_message()? else {
                    return Ok(Some(IoStatus::WantPollIn));
                };
                let Handshake::Finished(finished) = message else {
                    return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected client Finished"));
                };

                let ks = self.ctx.key_schedule.as_ref().unwrap();
                let client_secret = ks.client_handshake_traffic_secret.clone().unwrap();
                let expected = ks.verify_data(&client_secret, &transcript_hash);
                if !constant_time_eq(&expected, &finished.verify_data) {
                    return Err(TlsError::new(ErrorKind::VerifyFailed, "client Finished verify_data mismatch"));
                }

                self.ctx.key_schedule.as_mut().unwrap().derive_resumption_secret()?;

                let ks = self.ctx.key_schedule.as_ref().unwrap();
                let client_app = ks.client_application_traffic_secret.clone().unwrap();
                let server_app = ks.server_application_traffic_secret.clone().unwrap();
                self.ctx.install_traffic_secrets(&client_app, &server_app);

                self.ctx.connected = true;
                self.state = ServerState::Connected;

                if let Some(lifetime) = self.options.session_ticket_lifetime {
                    self.send_session_ticket(lifetime)?;
                }
                if self.ctx.flush_pending_out().is_err() {
                    return Ok(Some(IoStatus::WantPollOut));
                }
                Ok(Some(IoStatus::Success))
            }
            ServerState::Connected => {
                if self.ctx.flush_pending_out().is_err() {
                    return Ok(Some(IoStatus::WantPollOut));
                }
                Ok(Some(IoStatus::Success))
            }
        }
    }

    fn send_hello_retry_request(&mut self, suite: CipherSuite, group: NamedGroup) -> Result<()> {
        let mut ext_out = ByteWriter::new();
        extensions::write_extension(&mut ext_out, ExtensionType::SupportedVersions, &supported_versions_server_body());
        let mut key_share_body = ByteWriter::new();
        key_share_body.push_u16(group.value());
        extensions::write_extension(&mut ext_out, ExtensionType::KeyShare, &key_share_body.finish());

        let hello = ServerHello {
            random: HELLO_RETRY_REQUEST_RANDOM,
            legacy_session_id_echo: Vec::new(),
            cipher_suite: suite.value(),
            extensions: ext_out.finish(),
        };
        self.ctx.queue_handshake(&Handshake::ServerHello(hello))?;
        self.ctx
            .key_schedule
            .as_mut()
            .unwrap()
            .reset_transcript_for_hello_retry_request();
        let _ = self.ctx.flush_pending_out();
        Ok(())
    }

    fn complete_key_exchange(&mut self, suite: CipherSuite, client_entry: KeyShareEntry, psk_accepted: bool) -> Result<()> {
        let server_share = KeyShare::generate(client_entry.group, &mut OsRng);
        let server_public = server_share.public_bytes().to_vec();
        let shared_secret = server_share.agree(&client_entry.key_exchange)?;

        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);

        let mut ext_out = ByteWriter::new();
        extensions::write_extension(&mut ext_out, ExtensionType::SupportedVersions, &supported_versions_server_body());
        let entry = KeyShareEntry {
            group: client_entry.group,
            key_exchange: server_public,
        };
        extensions::write_extension(&mut ext_out, ExtensionType::KeyShare, &server_key_share_body(&entry));
        if psk_accepted {
            extensions::write_extension(&mut ext_out, ExtensionType::PreSharedKey, &server_pre_shared_key_body(0));
        }

        let hello = ServerHello {
            random,
            legacy_session_id_echo: Vec::new(),
            cipher_suite: suite.value(),
            extensions: ext_out.finish(),
        };
        self.ctx.queue_handshake(&Handshake::ServerHello(hello))?;

        self.ctx
            .key_schedule
            .as_mut()
            .unwrap()
            .initialize_handshake_secret(&shared_secret)?;
        let ks = self.ctx.key_schedule.as_ref().unwrap();
        let client_secret = ks.client_handshake_traffic_secret.clone().unwrap();
        let server_secret = ks.server_handshake_traffic_secret.clone().unwrap();
        self.ctx.install_traffic_secrets(&client_secret, &server_secret);

        self.ctx.queue_handshake(&Handshake::EncryptedExtensions(EncryptedExtensions {
            extensions: Vec::new(),
        }))?;

        if self.options.request_client_certificate {
            self.ctx.queue_handshake(&Handshake::CertificateRequest(CertificateRequest {
                certificate_request_context: Vec::new(),
                extensions: signature_algorithms_extension(&self.options.common.signature_schemes),
            }))?;
        }

        let entries: Vec<CertificateEntry> = self
            .options
            .identity
            .certificate_chain
            .iter()
            .map(|der| CertificateEntry {
                cert_data: der.clone(),
                extensions: Vec::new(),
            })
            .collect();
        self.ctx.queue_handshake(&Handshake::Certificate(Certificate {
            certificate_request_context: Vec::new(),
            entries,
        }))?;

        let transcript_hash = self.ctx.key_schedule.as_ref().unwrap().transcript_hash();
        let content = sig::certificate_verify_content(sig::SERVER_CERT_VERIFY_CONTEXT, &transcript_hash);
        let signature = sign_with_identity(&self.options.identity, &content);
        self.ctx.queue_handshake(&Handshake::CertificateVerify(CertificateVerify {
            algorithm: self.options.identity.signature_scheme.value(),
            signature,
        }))?;

        let finished_transcript = self.ctx.key_schedule.as_ref().unwrap().transcript_hash();
        let ks = self.ctx.key_schedule.as_ref().unwrap();
        let server_secret = ks.server_handshake_traffic_secret.clone().unwrap();
        let verify_data = ks.verify_data(&server_secret, &finished_transcript);
        self.ctx.queue_handshake(&Handshake::Finished(Finished { verify_data }))?;

        self.ctx.key_schedule.as_mut().unwrap().initialize_master_secret()?;
        self.ctx.key_schedule.as_mut().unwrap().derive_application_secrets()?;

        self.state = if self.options.request_client_certificate {
            ServerState::WaitClientCertificate
        } else {
            ServerState::WaitClientFinished
        };
        Ok(())
    }

    fn send_session_ticket(&mut self, lifetime: u32) -> Result<()> {
        let mut nonce = [0u8; 8];
        OsRng.fill_bytes(&mut nonce);
        let mut age_add = [0u8; 4];
        OsRng.fill_bytes(&mut age_add);

        let psk = self.ctx.key_schedule.as_ref().unwrap().resumption_psk(&nonce)?;
        let mut ticket_body = ByteWriter::new();
        ticket_body.push_vec_u16(&psk);

        let message = Handshake::NewSessionTicket(NewSessionTicket {
            ticket_lifetime: lifetime,
            ticket_age_add: u32::from_be_bytes(age_add),
            ticket_nonce: nonce.to_vec(),
            ticket: ticket_body.finish(),
            extensions: Vec::new(),
        });
        self.ctx.queue_handshake(&message)?;
        Ok(())
    }
}

fn signature_algorithms_extension(schemes: &[SignatureScheme]) -> Vec<u8> {
    let mut out = ByteWriter::new();
    extensions::write_extension(&mut out, ExtensionType::SignatureAlgorithms, &signature_algorithms_body(schemes));
    out.finish()
}

fn sign_with_identity(identity: &crate::options::Identity, content: &[u8]) -> Vec<u8> {
    use crate::options::PrivateKey;
    use ed25519_dalek::Signer as _;
    use p256::ecdsa::signature::Signer as P256Signer;
    use p384::ecdsa::signature::Signer as P384Signer;

    match &identity.private_key {
        PrivateKey::Ed25519(key) => key.sign(content).to_bytes().to_vec(),
        PrivateKey::EcdsaP256(key) => {
            let sig: p256::ecdsa::Signature = P256Signer::sign(key, content);
            sig.to_der().as_bytes().to_vec()
        }
        PrivateKey::EcdsaP384(key) => {
            let sig: p384::ecdsa::Signature = P384Signer::sign(key, content);
            sig.to_der().as_bytes().to_vec()
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.ct_eq(b).into()
}
