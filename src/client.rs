//! The client-side handshake driver.

use rand_core::{OsRng, RngCore};

use crate::bytes::ByteWriter;
use crate::cipher_suite::CipherSuite;
use crate::context::{HandshakeContext, Role};
use crate::crypto::hash::RunningHash;
use crate::crypto::kex::{KeyShare, NamedGroup};
use crate::crypto::sig::{self, SignatureScheme};
use crate::error::{ErrorKind, Result, TlsError};
use crate::extensions::{
    self, client_key_share_body, psk_key_exchange_modes_body, server_name_body, signature_algorithms_body,
    supported_groups_body, supported_versions_client_body, ExtensionReader, ExtensionType, KeyShareEntry,
    PskIdentity, PSK_DHE_KE,
};
use crate::handshake::{Certificate, CertificateVerify, ClientHello, Finished, Handshake};
use crate::handshake_codec;
use crate::io::{HandshakeIo, IoStatus};
use crate::key_schedule::KeySchedule;
use crate::options::{ClientOptions, ClientPsk};

enum ClientState {
    Start,
    WaitServerHello {
        ephemeral: KeyShare,
        client_hello_raw: Vec<u8>,
        retried: bool,
    },
    WaitEncryptedExtensions,
    WaitCertificateRequestOrCertificate,
    WaitCertificate {
        certificate_request_context: Vec<u8>,
    },
    WaitCertificateVerify {
        certificate_request_context: Vec<u8>,
    },
    WaitServerFinished {
        certificate_request_context: Vec<u8>,
        client_auth_requested: bool,
    },
    Connected,
}

/// A client connection, driving the handshake against a peer reachable
/// through `IO`.
pub struct ClientConnection<IO: HandshakeIo> {
    ctx: HandshakeContext<IO>,
    options: ClientOptions,
    state: ClientState,
}

impl<IO: HandshakeIo> ClientConnection<IO> {
    pub fn new(io: IO, options: ClientOptions) -> Self {
        let common = &options.common;
        let ctx = HandshakeContext::new(io, Role::Client, common.max_key_updates, common.phh_limit, common.phh_limit_time);
        Self {
            ctx,
            options,
            state: ClientState::Start,
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

    fn build_client_hello(&self, group: NamedGroup, key_share: &KeyShare) -> ClientHello {
        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);

        let cipher_suites = self.options.common.cipher_suites.iter().map(|s| s.value()).collect();

        let mut ext_out = ByteWriter::new();
        extensions::write_extension(&mut ext_out, ExtensionType::SupportedVersions, &supported_versions_client_body());
        extensions::write_extension(
            &mut ext_out,
            ExtensionType::SupportedGroups,
            &supported_groups_body(&self.options.common.groups),
        );
        extensions::write_extension(
            &mut ext_out,
            ExtensionType::SignatureAlgorithms,
            &signature_algorithms_body(&self.options.common.signature_schemes),
        );
        let entry = KeyShareEntry {
            group,
            key_exchange: key_share.public_bytes().to_vec(),
        };
        extensions::write_extension(&mut ext_out, ExtensionType::KeyShare, &client_key_share_body(&[entry]));
        if let Some(name) = &self.options.server_name {
            extensions::write_extension(&mut ext_out, ExtensionType::ServerName, &server_name_body(name));
        }
        if self.options.psk.is_some() {
            extensions::write_extension(
                &mut ext_out,
                ExtensionType::PskKeyExchangeModes,
                &psk_key_exchange_modes_body(&[PSK_DHE_KE]),
            );
        }

        let mut hello = ClientHello {
            random,
            legacy_session_id: Vec::new(),
            cipher_suites,
            extensions: ext_out.finish(),
        };
        if let Some(psk) = self.options.psk.clone() {
            self.attach_psk_binder(&mut hello, &psk);
        }
        hello
    }

    /// Appends a `pre_shared_key` extension offering `psk` as the ClientHello's
    /// last extension (RFC 8446 section 4.2.11), computing its binder over the
    /// message with a same-length all-zero placeholder in the binder's place.
    fn attach_psk_binder(&self, hello: &mut ClientHello, psk: &ClientPsk) {
        let hash_alg = self.options.common.cipher_suites[0].hash();
        let hash_len = hash_alg.output_len();

        let identity = PskIdentity {
            identity: psk.identity.clone(),
            obfuscated_ticket_age: psk.obfuscated_ticket_age,
        };
        let body = extensions::client_pre_shared_key_body(&identity, &vec![0u8; hash_len]);
        let mut ext_out = ByteWriter::new();
        ext_out.push_bytes(&hello.extensions);
        extensions::write_extension(&mut ext_out, ExtensionType::PreSharedKey, &body);
        hello.extensions = ext_out.finish();

        let encoded = handshake_codec::encode(&Handshake::ClientHello(hello.clone()));
        let truncated = &encoded[..encoded.len() - hash_len];

        let mut transcript = RunningHash::new(hash_alg);
        transcript.update(truncated);
        let transcript_hash = transcript.clone_finalize();

        let mut binder_schedule = KeySchedule::new(hash_alg);
        binder_schedule.initialize_early_secret(Some(&psk.secret));
        let binder_key = binder_schedule
            .binder_key(false)
            .expect("early secret was just initialized above");
        let binder = binder_schedule.compute_binder(&binder_key, &transcript_hash);

        let tail_start = hello.extensions.len() - hash_len;
        hello.extensions[tail_start..].copy_from_slice(&binder);
    }

    /// Drives the handshake as far as it can go without blocking, returning
    /// the status the caller should act on: `Success` once connected,
    /// `WantPollIn`/`WantPollOut` to retry after the wire becomes ready
    /// again, or `Failure`/`Alert` on a terminal error.
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

    /// Performs one state transition, or reports that the connection is
    /// blocked on I/O right now.
    fn step(&mut self) -> Result<Option<IoStatus>> {
        match &self.state {
            ClientState::Start => {
                let group = self.options.common.groups[0];
                let key_share = KeyShare::generate(group, &mut OsRng);
                let hello = self.build_client_hello(group, &key_share);
                let raw = self.ctx.queue_handshake(&Handshake::ClientHello(hello))?;
                self.state = ClientState::WaitServerHello {
                    ephemeral: key_share,
                    client_hello_raw: raw,
                    retried: false,
                };
                Ok(None)
            }
            ClientState::WaitServerHello { .. } => {
                if self.ctx.flush_pending_out().is_err() {
                    return Ok(Some(IoStatus::WantPollOut));
                }
                let Some((message, raw_sh)) = self.ctx.next_handshake_message()? else {
                    return Ok(Some(IoStatus::WantPollIn));
                };
                let Handshake::ServerHello(server_hello) = message else {
                    return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected ServerHello"));
                };
                let ClientState::WaitServerHello {
                    ephemeral,
                    client_hello_raw,
                    retried,
                } = core::mem::replace(&mut self.state, ClientState::Connected)
                else {
                    unreachable!()
                };

                let suite = CipherSuite::try_from(server_hello.cipher_suite)
                    .map_err(|_| TlsError::new(ErrorKind::HandshakeFailure, "server selected an unsupported cipher suite"))?;
                if !self.options.common.cipher_suites.contains(&suite) {
                    return Err(TlsError::new(ErrorKind::HandshakeFailure, "server selected a cipher suite we didn't offer"));
                }
                self.ctx.cipher_suite = Some(suite);

                if self.ctx.key_schedule.is_none() {
                    let psk_accepted = server_offered_psk(&server_hello.extensions)?;
                    let accepted_psk = self.options.psk.as_ref().filter(|_| psk_accepted);
                    let mut ks = KeySchedule::new(suite.hash());
                    ks.initialize_early_secret(accepted_psk.map(|psk| psk.secret.as_slice()));
                    ks.update_transcript(&client_hello_raw);
                    self.ctx.key_schedule = Some(ks);
                }

                if server_hello.is_hello_retry_request() {
                    if retried {
                        return Err(TlsError::new(ErrorKind::HandshakeFailure, "server sent more than one HelloRetryRequest"));
                    }
                    self.ctx.key_schedule.as_mut().unwrap().update_transcript(&raw_sh);
                    self.ctx
                        .key_schedule
                        .as_mut()
                        .unwrap()
                        .reset_transcript_for_hello_retry_request();

                    let new_group = find_hrr_group(&server_hello.extensions)?;
                    if !self.options.common.groups.contains(&new_group) {
                        return Err(TlsError::new(ErrorKind::IllegalParameter, "HelloRetryRequest selected an unoffered group"));
                    }
                    let new_share = KeyShare::generate(new_group, &mut OsRng);
                    let hello = self.build_client_hello(new_group, &new_share);
                    let raw = self.ctx.queue_handshake(&Handshake::ClientHello(hello))?;
                    self.state = ClientState::WaitServerHello {
                        ephemeral: new_share,
                        client_hello_raw: raw,
                        retried: true,
                    };
                    return Ok(None);
                }

                let downgrade_tail = &server_hello.random[24..];
                if downgrade_tail == crate::handshake::DOWNGRADE_SENTINEL_TLS12
                    || downgrade_tail == crate::handshake::DOWNGRADE_SENTINEL_TLS11_OR_BELOW
                {
                    return Err(TlsError::new(ErrorKind::IllegalParameter, "server signaled a downgrade from TLS 1.3"));
                }

                self.ctx.key_schedule.as_mut().unwrap().update_transcript(&raw_sh);

                let entry = find_server_key_share(&server_hello.extensions)?;
                if entry.group != ephemeral.group() {
                    return Err(TlsError::new(ErrorKind::IllegalParameter, "ServerHello key_share group mismatch"));
                }
                let shared_secret = ephemeral.agree(&entry.key_exchange)?;
                self.ctx
                    .key_schedule
                    .as_mut()
                    .unwrap()
                    .initialize_handshake_secret(&shared_secret)?;

                let ks = self.ctx.key_schedule.as_ref().unwrap();
                let client_secret = ks.client_handshake_traffic_secret.clone().unwrap();
                let server_secret = ks.server_handshake_traffic_secret.clone().unwrap();
                self.ctx.install_traffic_secrets(&client_secret, &server_secret);

                self.state = ClientState::WaitEncryptedExtensions;
                Ok(None)
            }
            ClientState::WaitEncryptedExtensions => {
                let Some((message, _raw)) = self.ctx.next_handshake_message()? else {
                    return Ok(Some(IoStatus::WantPollIn));
                };
                let Handshake::EncryptedExtensions(_ee) = message else {
                    return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected EncryptedExtensions"));
                };
                self.state = ClientState::WaitCertificateRequestOrCertificate;
                Ok(None)
            }
            ClientState::WaitCertificateRequestOrCertificate => {
                let Some((message, _raw)) = self.ctx.next_handshake_message()? else {
                    return Ok(Some(IoStatus::WantPollIn));
                };
                match message {
                    Handshake::CertificateRequest(req) => {
                        self.state = ClientState::WaitCertificate {
                            certificate_request_context: req.certificate_request_context,
                        };
                    }
                    Handshake::Certificate(cert) => {
                        self.store_peer_certificate(&cert)?;
                        self.state = ClientState::WaitCertificateVerify {
                            certificate_request_context: cert.certificate_request_context,
                        };
                    }
                    _ => return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected Certificate or CertificateRequest")),
                }
                Ok(None)
            }
            ClientState::WaitCertificate { .. } => {
                let Some((message, _raw)) = self.ctx.next_handshake_message()? else {
                    return Ok(Some(IoStatus::WantPollIn));
                };
                let Handshake::Certificate(cert) = message else {
                    return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected Certificate"));
                };
                self.store_peer_certificate(&cert)?;
                self.state = ClientState::WaitCertificateVerify {
                    certificate_request_context: cert.certificate_request_context,
                };
                Ok(None)
            }
            ClientState::WaitCertificateVerify { .. } => {
                let ClientState::WaitCertificateVerify {
                    certificate_request_context,
                } = core::mem::replace(&mut self.state, ClientState::Connected)
                else {
                    unreachable!()
                };
                let transcript_hash = self.ctx.key_schedule.as_ref().unwrap().transcript_hash();
                let Some((message, _raw)) = self.ctx.next_handshake_message()? else {
                    self.state = ClientState::WaitCertificateVerify { certificate_request_context };
                    return Ok(Some(IoStatus::WantPollIn));
                };
                let Handshake::CertificateVerify(cv) = message else {
                    return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected CertificateVerify"));
                };
                self.verify_server_certificate_verify(&cv, &transcript_hash)?;
                self.state = ClientState::WaitServerFinished {
                    certificate_request_context,
                    client_auth_requested: true,
                };
                Ok(None)
            }
            ClientState::WaitServerFinished { .. } => {
                let transcript_hash = self.ctx.key_schedule.as_ref().unwrap().transcript_hash();
                let Some((message, _raw)) = self.ctx.next_handshake_message()? else {
                    return Ok(Some(IoStatus::WantPollIn));
                };
                let Handshake::Finished(finished) = message else {
                    return Err(TlsError::new(ErrorKind::UnexpectedMessage, "expected Finished"));
                };
                let ClientState::WaitServerFinished {
                    certificate_request_context,
                    client_auth_requested,
                } = core::mem::replace(&mut self.state, ClientState::Connected)
                else {
                    unreachable!()
                };

                let ks = self.ctx.key_schedule.as_ref().unwrap();
                let server_secret = ks.server_handshake_traffic_secret.clone().unwrap();
                let expected = ks.verify_data(&server_secret, &transcript_hash);
                if !constant_time_eq(&expected, &finished.verify_data) {
                    return Err(TlsError::new(ErrorKind::VerifyFailed, "server Finished verify_data mismatch"));
                }

                self.ctx.key_schedule.as_mut().unwrap().initialize_master_secret()?;

                if client_auth_requested {
                    if let Some(identity) = self.options.identity.clone() {
                        self.send_client_certificate(&identity, &certificate_request_context)?;
                    } else {
                        self.ctx.queue_handshake(&Handshake::Certificate(Certificate {
                            certificate_request_context,
                            entries: Vec::new(),
                        }))?;
                    }
                }

                let client_finished_transcript = self.ctx.key_schedule.as_ref().unwrap().transcript_hash();
                let ks = self.ctx.key_schedule.as_ref().unwrap();
                let client_secret = ks.client_handshake_traffic_secret.clone().unwrap();
                let verify_data = ks.verify_data(&client_secret, &client_finished_transcript);
                self.ctx.queue_handshake(&Handshake::Finished(Finished { verify_data }))?;

                self.ctx.key_schedule.as_mut().unwrap().derive_application_secrets()?;
                self.ctx.key_schedule.as_mut().unwrap().derive_resumption_secret()?;

                let ks = self.ctx.key_schedule.as_ref().unwrap();
                let client_app = ks.client_application_traffic_secret.clone().unwrap();
                let server_app = ks.server_application_traffic_secret.clone().unwrap();
                self.ctx.install_traffic_secrets(&client_app, &server_app);

                if self.ctx.flush_pending_out().is_err() {
                    self.state = ClientState::Connected;
                    self.ctx.connected = true;
                    return Ok(Some(IoStatus::WantPollOut));
                }
                self.ctx.connected = true;
                self.state = ClientState::Connected;
                Ok(Some(IoStatus::Success))
            }
            ClientState::Connected => {
                if self.ctx.flush_pending_out().is_err() {
                    return Ok(Some(IoStatus::WantPollOut));
                }
                self.ctx.connected = true;
                Ok(Some(IoStatus::Success))
            }
        }
    }

    fn store_peer_certificate(&mut self, cert: &Certificate) -> Result<()> {
        if cert.entries.is_empty() {
            return Err(TlsError::new(ErrorKind::CertificateRequired, "server sent an empty certificate chain"));
        }
        self.ctx.peer_certificates = cert.entries.iter().map(|e| e.cert_data.clone()).collect();
        Ok(())
    }

    fn verify_server_certificate_verify(&self, cv: &CertificateVerify, transcript_hash: &[u8]) -> Result<()> {
        let scheme = SignatureScheme::from_value(cv.algorithm)
            .ok_or_else(|| TlsError::new(ErrorKind::IllegalParameter, "unknown signature scheme in CertificateVerify"))?;
        let leaf = self
            .ctx
            .peer_certificates
            .first()
            .ok_or_else(|| TlsError::new(ErrorKind::CertificateRequired, "no peer certificate to verify against"))?;
        let content = sig::certificate_verify_content(sig::SERVER_CERT_VERIFY_CONTEXT, transcript_hash);
        scheme.verify(leaf, &content, &cv.signature)
    }

    fn send_client_certificate(&mut self, identity: &crate::options::Identity, context: &[u8]) -> Result<()> {
        let entries = identity
            .certificate_chain
            .iter()
            .map(|der| crate::handshake::CertificateEntry {
                cert_data: der.clone(),
                extensions: Vec::new(),
            })
            .collect();
        self.ctx.queue_handshake(&Handshake::Certificate(Certificate {
            certificate_request_context: context.to_vec(),
            entries,
        }))?;

        let transcript_hash = self.ctx.key_schedule.as_ref().unwrap().transcript_hash();
        let content = sig::certificate_verify_content(sig::CLIENT_CERT_VERIFY_CONTEXT, &transcript_hash);
        let signature = sign_with_identity(identity, &content);
        self.ctx.queue_handshake(&Handshake::CertificateVerify(CertificateVerify {
            algorithm: identity.signature_scheme.value(),
            signature,
        }))?;
        Ok(())
    }
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

fn find_server_key_share(extensions: &[u8]) -> Result<KeyShareEntry> {
    let mut reader = ExtensionReader::new(crate::bytes::ByteReader::new(extensions));
    while let Some((ext_type, mut body)) = reader.next_extension()? {
        if ext_type == ExtensionType::KeyShare as u16 {
            return KeyShareEntry::parse(&mut body);
        }
    }
    Err(TlsError::new(ErrorKind::MissingExtension, "ServerHello is missing key_share"))
}

fn find_hrr_group(extensions: &[u8]) -> Result<NamedGroup> {
    let mut reader = ExtensionReader::new(crate::bytes::ByteReader::new(extensions));
    while let Some((ext_type, mut body)) = reader.next_extension()? {
        if ext_type == ExtensionType::KeyShare as u16 {
            let raw = body.read_u16()?;
            return NamedGroup::from_value(raw)
                .ok_or_else(|| TlsError::new(ErrorKind::IllegalParameter, "HelloRetryRequest named an unsupported group"));
        }
    }
    Err(TlsError::new(ErrorKind::MissingExtension, "HelloRetryRequest is missing key_share"))
}

/// Whether the ServerHello's extensions include a `pre_shared_key`
/// selecting our (only) offered identity. The index itself isn't checked
/// against anything since this engine only ever offers a single identity.
fn server_offered_psk(extensions: &[u8]) -> Result<bool> {
    let mut reader = ExtensionReader::new(crate::bytes::ByteReader::new(extensions));
    while let Some((ext_type, mut body)) = reader.next_extension()? {
        if ext_type == ExtensionType::PreSharedKey as u16 {
            extensions::parse_server_pre_shared_key(&mut body)?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.ct_eq(b).into()
}
