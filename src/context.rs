//! Shared handshake-context plumbing: wire framing, record reassembly, and
//! transcript bookkeeping common to both [`crate::client`] and
//! [`crate::server`].

use std::time::{Duration, Instant};

use crate::alert::{Alert, AlertDescription};
use crate::bytes::ByteReader;
use crate::bytes::ByteWriter;
use crate::buffer::RecvBuffer;
use crate::cipher_suite::CipherSuite;
use crate::error::{proto_err, ErrorKind, Result, TlsError};
use crate::handshake::Handshake;
use crate::handshake_codec::{self, Parsed};
use crate::io::{HandshakeIo, IoStatus, WouldBlock};
use crate::key_schedule::KeySchedule;
use crate::record::{ContentType, RecordHeader, RECORD_HEADER_LEN};
use crate::record_layer::RecordLayer;

/// The single-byte body a `ChangeCipherSpec` record must carry, per RFC
/// 8446 section 5: the type is kept only for middlebox compatibility, and
/// this is its sole legal value.
const CHANGE_CIPHER_SPEC_BODY: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// State and behavior shared by client and server handshake drivers.
///
/// Parameterized directly over the host's [`HandshakeIo`] implementation
/// rather than a trait object, so the engine costs nothing beyond the
/// concrete I/O type the host already pays for.
pub struct HandshakeContext<IO: HandshakeIo> {
    pub(crate) io: IO,
    pub(crate) role: Role,
    pub(crate) recv_buffer: RecvBuffer,
    pub(crate) handshake_in: Vec<u8>,
    pub(crate) pending_out: Vec<u8>,
    pub(crate) pending_out_sent: usize,
    pub(crate) key_schedule: Option<KeySchedule>,
    pub(crate) cipher_suite: Option<CipherSuite>,
    pub(crate) record_layer: Option<RecordLayer>,
    pub(crate) key_update_count: u32,
    pub(crate) max_key_updates: u32,
    pub(crate) peer_certificates: Vec<Vec<u8>>,
    pub(crate) connected: bool,
    pub(crate) closed: bool,
    /// A `NewSessionTicket` body that couldn't be handed to the host yet
    /// because [`HandshakeIo::phh_recv`] reported `WouldBlock`; retried
    /// before anything else is processed out of `handshake_in`.
    pending_phh: Option<Vec<u8>>,
    phh_limit: u32,
    phh_limit_time: Duration,
    phh_window_start: Option<Instant>,
    phh_window_count: u32,
}

impl<IO: HandshakeIo> HandshakeContext<IO> {
    pub(crate) fn new(io: IO, role: Role, max_key_updates: u32, phh_limit: u32, phh_limit_time: Duration) -> Self {
        Self {
            io,
            role,
            recv_buffer: RecvBuffer::new(),
            handshake_in: Vec::new(),
            pending_out: Vec::new(),
            pending_out_sent: 0,
            key_schedule: None,
            cipher_suite: None,
            record_layer: None,
            key_update_count: 0,
            max_key_updates,
            peer_certificates: Vec::new(),
            connected: false,
            closed: false,
            pending_phh: None,
            phh_limit,
            phh_limit_time,
            phh_window_start: None,
            phh_window_count: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        &self.peer_certificates
    }

    pub fn into_io(self) -> IO {
        self.io
    }

    /// Encodes `message`, feeds it to the transcript hash if a key schedule
    /// already exists, and appends the (possibly encrypted) record to
    /// `pending_out`. Returns the raw encoded message (header plus body)
    /// so callers can feed it to the transcript themselves once a key
    /// schedule becomes available, for the first Hello of a connection
    /// where the hash algorithm isn't known yet when it's sent.
    pub(crate) fn queue_handshake(&mut self, message: &Handshake) -> Result<Vec<u8>> {
        let encoded = handshake_codec::encode(message);
        if let Some(ks) = &mut self.key_schedule {
            ks.update_transcript(&encoded);
        }
        self.io.handshake_message_sent(message);

        let mut framed = ByteWriter::new();
        match &mut self.record_layer {
            Some(layer) => layer.seal_into(ContentType::Handshake, &encoded, &mut framed)?,
            None => crate::record_layer::write_plaintext_record(ContentType::Handshake, &encoded, &mut framed),
        }
        self.pending_out.extend_from_slice(framed.as_slice());
        Ok(encoded)
    }

    pub(crate) fn queue_fatal_alert(&mut self, description: AlertDescription) {
        let alert = Alert::fatal(description);
        let mut body = ByteWriter::new();
        alert.serialize(&mut body);
        let body = body.finish();

        let mut framed = ByteWriter::new();
        match &mut self.record_layer {
            Some(layer) => {
                let _ = layer.seal_into(ContentType::Alert, &body, &mut framed);
            }
            None => crate::record_layer::write_plaintext_record(ContentType::Alert, &body, &mut framed),
        }
        self.pending_out.extend_from_slice(framed.as_slice());
        self.io.alert(description);
        self.closed = true;
    }

    pub(crate) fn queue_close_notify(&mut self) {
        let alert = Alert::warning(AlertDescription::CloseNotify);
        let mut body = ByteWriter::new();
        alert.serialize(&mut body);
        let body = body.finish();

        let mut framed = ByteWriter::new();
        match &mut self.record_layer {
            Some(layer) => {
                let _ = layer.seal_into(ContentType::Alert, &body, &mut framed);
            }
            None => crate::record_layer::write_plaintext_record(ContentType::Alert, &body, &mut framed),
        }
        self.pending_out.extend_from_slice(framed.as_slice());
        self.closed = true;
    }

    /// Drains `pending_out` to the wire, retaining any unsent remainder
    /// across calls.
    pub(crate) fn flush_pending_out(&mut self) -> core::result::Result<(), WouldBlock> {
        while self.pending_out_sent < self.pending_out.len() {
            let n = self.io.wire_write(&self.pending_out[self.pending_out_sent..])?;
            if n == 0 {
                return Err(WouldBlock);
            }
            self.pending_out_sent += n;
        }
        self.pending_out.clear();
        self.pending_out_sent = 0;
        Ok(())
    }

    /// Reads and, once keys are installed, opens the next record, skipping
    /// `ChangeCipherSpec` compatibility records transparently. Returns
    /// `Ok(None)` when the wire has nothing more to offer right now.
    pub(crate) fn try_read_record(&mut self) -> Result<Option<(ContentType, Vec<u8>)>> {
        loop {
            {
                let io = &mut self.io;
                let recv_buffer = &mut self.recv_buffer;
                if recv_buffer.fill_to(RECORD_HEADER_LEN, |buf| io.wire_read(buf)).is_err() {
                    return Ok(None);
                }
            }
            let header = {
                let mut header_reader = ByteReader::new(&self.recv_buffer.as_slice()[..RECORD_HEADER_LEN]);
                RecordHeader::parse(&mut header_reader)?
            };
            let total = RECORD_HEADER_LEN + header.length as usize;
            {
                let io = &mut self.io;
                let recv_buffer = &mut self.recv_buffer;
                if recv_buffer.fill_to(total, |buf| io.wire_read(buf)).is_err() {
                    return Ok(None);
                }
            }

            let record = self.recv_buffer.as_slice()[..total].to_vec();
            self.recv_buffer.consume(total);
            self.recv_buffer.compact();

            if header.content_type == ContentType::ChangeCipherSpec {
                self.accept_legacy_change_cipher_spec(&record[RECORD_HEADER_LEN..])?;
                continue;
            }

            let body = &record[RECORD_HEADER_LEN..];
            let (content_type, payload) = match &mut self.record_layer {
                Some(layer) => layer.open_record(&header, body)?,
                None => (header.content_type, body.to_vec()),
            };
            return Ok(Some((content_type, payload)));
        }
    }

    /// Pulls the next complete handshake message out of the reassembly
    /// buffer, reading and decrypting more records as needed. Returns
    /// `Ok(None)` when blocked on input.
    ///
    /// An incoming alert is processed and surfaced as an error; incoming
    /// application data before the handshake has completed is a protocol
    /// violation.
    pub(crate) fn next_handshake_message(&mut self) -> Result<Option<(Handshake, Vec<u8>)>> {
        let finished_len = self
            .key_schedule
            .as_ref()
            .map(|ks| ks.algorithm().output_len())
            .unwrap_or(32);

        loop {
            match handshake_codec::try_parse_one(&self.handshake_in, finished_len)? {
                Parsed::Message { message, consumed } => {
                    let raw = self.handshake_in[..consumed].to_vec();
                    self.handshake_in.drain(0..consumed);
                    if let Some(ks) = &mut self.key_schedule {
                        ks.update_transcript(&raw);
                    }
                    self.io.handshake_message_received(&message);
                    return Ok(Some((message, raw)));
                }
                Parsed::Incomplete => match self.try_read_record()? {
                    None => return Ok(None),
                    Some((ContentType::Handshake, payload)) => self.handshake_in.extend_from_slice(&payload),
                    Some((ContentType::ChangeCipherSpec, _)) => {
                        // The legacy compatibility CCS is always sent unencrypted and is
                        // already consumed by `try_read_record`'s header check; reaching
                        // this arm means a decrypted record's *inner* type claimed to be
                        // ChangeCipherSpec, which RFC 8446 never does.
                        return Err(proto_err!(ErrorKind::UnexpectedMessage, "encrypted record claimed a ChangeCipherSpec inner type"));
                    }
                    Some((ContentType::Alert, payload)) => {
                        let mut reader = ByteReader::new(&payload);
                        let alert = Alert::parse(&mut reader)?;
                        self.io.alert(alert.description);
                        self.closed = true;
                        return Err(TlsError::new(ErrorKind::from(alert.description), "peer sent a fatal alert"));
                    }
                    Some((ContentType::ApplicationData, _)) => {
                        return Err(TlsError::new(
                            ErrorKind::UnexpectedMessage,
                            "application data received before the handshake completed",
                        ));
                    }
                },
            }
        }
    }

    /// Accepts a middlebox-compatibility `ChangeCipherSpec` record (RFC
    /// 8446 section 5, Appendix D.4): always unencrypted, always a single
    /// `{0x01}` body, and never legal once the handshake has completed --
    /// by then both peers have long since switched to encrypted records,
    /// so a CCS at that point can only be a peer confused about the
    /// connection's state, not a compatibility artifact.
    fn accept_legacy_change_cipher_spec(&self, body: &[u8]) -> Result<()> {
        if self.connected {
            return Err(proto_err!(
                ErrorKind::UnexpectedMessage,
                "ChangeCipherSpec received after the handshake completed"
            ));
        }
        if body != [CHANGE_CIPHER_SPEC_BODY] {
            return Err(proto_err!(
                ErrorKind::DecodeError,
                "ChangeCipherSpec body must be the single byte 0x01, got {body:?}"
            ));
        }
        Ok(())
    }

    /// Installs a fresh record layer from a pair of traffic secrets,
    /// resetting both directions' sequence numbers to zero.
    pub(crate) fn install_traffic_secrets(&mut self, client_secret: &[u8], server_secret: &[u8]) {
        let suite = self.cipher_suite.expect("cipher suite negotiated before keys are installed");
        let ks = self.key_schedule.as_ref().expect("key schedule exists before keys are installed");
        let aead = suite.aead();
        let key_len = aead.key_len();

        let client_keys = ks.traffic_keys(client_secret, key_len);
        let server_keys = ks.traffic_keys(server_secret, key_len);

        let (mut write_keys, mut read_keys) = match self.role {
            Role::Client => (client_keys, server_keys),
            Role::Server => (server_keys, client_keys),
        };

        self.record_layer = Some(RecordLayer::new(
            crate::record_layer::DirectionState::new(aead, std::mem::take(&mut write_keys.key), write_keys.iv),
            crate::record_layer::DirectionState::new(aead, std::mem::take(&mut read_keys.key), read_keys.iv),
        ));
    }

    /// Writes one or more encrypted application-data records.
    pub fn write_application_data(&mut self, data: &[u8]) -> Result<IoStatus> {
        if self.record_layer.is_none() || !self.connected {
            return Err(TlsError::new(ErrorKind::InternalError, "write attempted before handshake completed"));
        }
        let mut framed = ByteWriter::new();
        {
            let layer = self.record_layer.as_mut().unwrap();
            layer.seal_into(ContentType::ApplicationData, data, &mut framed)?;
        }
        self.pending_out.extend_from_slice(framed.as_slice());
        match self.flush_pending_out() {
            Ok(()) => Ok(IoStatus::Success),
            Err(WouldBlock) => Ok(IoStatus::WantPollOut),
        }
    }

    /// Reads and decrypts the next application-data record, handling any
    /// interleaved post-handshake handshake messages (`NewSessionTicket`,
    /// `KeyUpdate`) transparently. Appends plaintext to `out` on success.
    pub fn read_application_data(&mut self, out: &mut Vec<u8>) -> Result<IoStatus> {
        loop {
            if self.pending_phh.is_some() && !self.try_flush_pending_phh() {
                return Ok(IoStatus::WantPollOut);
            }
            if !self.handshake_in.is_empty() {
                if let Some((message, _raw)) = self.next_handshake_message()? {
                    self.handle_post_handshake_message(message)?;
                    continue;
                }
            }
            match self.try_read_record()? {
                None => return Ok(IoStatus::WantPollIn),
                Some((ContentType::ApplicationData, payload)) => {
                    out.extend_from_slice(&payload);
                    return Ok(IoStatus::Success);
                }
                Some((ContentType::Handshake, payload)) => {
                    self.handshake_in.extend_from_slice(&payload);
                }
                Some((ContentType::ChangeCipherSpec, _)) => {
                    return Err(proto_err!(ErrorKind::UnexpectedMessage, "encrypted record claimed a ChangeCipherSpec inner type"));
                }
                Some((ContentType::Alert, payload)) => {
                    let mut reader = ByteReader::new(&payload);
                    let alert = Alert::parse(&mut reader)?;
                    self.io.alert(alert.description);
                    if alert.description == AlertDescription::CloseNotify {
                        self.closed = true;
                        return Ok(IoStatus::Eof);
                    }
                    self.closed = true;
                    return Err(TlsError::new(ErrorKind::from(alert.description), "peer sent a fatal alert"));
                }
            }
        }
    }

    fn handle_post_handshake_message(&mut self, message: Handshake) -> Result<()> {
        self.check_phh_rate_limit()?;
        match message {
            Handshake::NewSessionTicket(ticket) => {
                let mut body = ByteWriter::new();
                body.push_u32(ticket.ticket_lifetime);
                body.push_u32(ticket.ticket_age_add);
                body.push_vec_u8(&ticket.ticket_nonce);
                body.push_vec_u16(&ticket.ticket);
                let body = body.finish();
                if self.io.phh_recv(&body).is_err() {
                    self.pending_phh = Some(body);
                }
                Ok(())
            }
            Handshake::KeyUpdate(ku) => {
                self.key_update_count += 1;
                if self.key_update_count > self.max_key_updates {
                    return Err(proto_err!(ErrorKind::InternalError, "too many KeyUpdate messages received"));
                }
                self.rekey_read_direction()?;
                if ku.request_update == crate::handshake::KeyUpdateRequest::Requested {
                    self.send_key_update(crate::handshake::KeyUpdateRequest::NotRequested)?;
                }
                self.io.phh_sent();
                Ok(())
            }
            _ => Err(proto_err!(ErrorKind::UnexpectedMessage, "unexpected post-handshake message")),
        }
    }

    /// Retries handing a buffered `NewSessionTicket` body to the host.
    /// Returns `true` once nothing is pending (either there was nothing to
    /// flush, or the host just accepted it).
    fn try_flush_pending_phh(&mut self) -> bool {
        let Some(body) = self.pending_phh.take() else {
            return true;
        };
        if self.io.phh_recv(&body).is_ok() {
            true
        } else {
            self.pending_phh = Some(body);
            false
        }
    }

    /// Bounds how many `NewSessionTicket`/`KeyUpdate` messages a peer may
    /// send within any `phh_limit_time` window, independent of
    /// `max_key_updates`'s whole-connection cap: a peer pacing itself just
    /// under the lifetime cap but bursting within a single window should
    /// still be refused. The window is fixed rather than sliding -- it
    /// resets entirely once `phh_limit_time` has elapsed since it opened.
    fn check_phh_rate_limit(&mut self) -> Result<()> {
        let now = self.io.now();
        let window_still_open = matches!(self.phh_window_start, Some(start) if now.duration_since(start) < self.phh_limit_time);
        if !window_still_open {
            self.phh_window_start = Some(now);
            self.phh_window_count = 0;
        }
        self.phh_window_count += 1;
        if self.phh_window_count > self.phh_limit {
            return Err(proto_err!(
                ErrorKind::InternalError,
                "more than {} post-handshake messages within {:?}",
                self.phh_limit,
                self.phh_limit_time
            ));
        }
        Ok(())
    }

    /// Derives and installs `application_traffic_secret_N+1` for the read
    /// direction only, per RFC 8446 section 4.6.3: each side updates its
    /// own sending keys independently of the other's.
    fn rekey_read_direction(&mut self) -> Result<()> {
        let suite = self.cipher_suite.expect("cipher suite negotiated");
        let ks = self.key_schedule.as_mut().expect("key schedule exists");
        let current = match self.role {
            Role::Client => ks.server_application_traffic_secret.clone(),
            Role::Server => ks.client_application_traffic_secret.clone(),
        }
        .expect("application traffic secret established");

        let updated = ks.update_application_traffic_secret(&current);
        match self.role {
            Role::Client => ks.server_application_traffic_secret = Some(updated.clone()),
            Role::Server => ks.client_application_traffic_secret = Some(updated.clone()),
        }
        let mut keys = ks.traffic_keys(&updated, suite.aead().key_len());
        let layer = self.record_layer.as_mut().expect("record layer installed");
        layer.read = crate::record_layer::DirectionState::new(suite.aead(), std::mem::take(&mut keys.key), keys.iv);
        Ok(())
    }

    /// Requests a key update on the write direction, optionally asking the
    /// peer to update its own sending keys in turn.
    pub fn send_key_update(&mut self, request: crate::handshake::KeyUpdateRequest) -> Result<()> {
        let message = Handshake::KeyUpdate(crate::handshake::KeyUpdate { request_update: request });
        let encoded = handshake_codec::encode(&message);
        self.io.handshake_message_sent(&message);

        let mut framed = ByteWriter::new();
        {
            let layer = self.record_layer.as_mut().expect("record layer installed");
            layer.seal_into(ContentType::Handshake, &encoded, &mut framed)?;
        }
        self.pending_out.extend_from_slice(framed.as_slice());
        if self.flush_pending_out().is_err() {
            // The partial write is retained in `pending_out`; the next
            // `write_application_data` or explicit flush call drains it.
        }

        let suite = self.cipher_suite.expect("cipher suite negotiated");
        let ks = self.key_schedule.as_mut().expect("key schedule exists");
        let current = match self.role {
            Role::Client => ks.client_application_traffic_secret.clone(),
            Role::Server => ks.server_application_traffic_secret.clone(),
        }
        .expect("application traffic secret established");
        let updated = ks.update_application_traffic_secret(&current);
        match self.role {
            Role::Client => ks.client_application_traffic_secret = Some(updated.clone()),
            Role::Server => ks.server_application_traffic_secret = Some(updated.clone()),
        }
        let mut keys = ks.traffic_keys(&updated, suite.aead().key_len());
        let layer = self.record_layer.as_mut().expect("record layer installed");
        layer.write = crate::record_layer::DirectionState::new(suite.aead(), std::mem::take(&mut keys.key), keys.iv);
        Ok(())
    }

    pub fn close(&mut self) -> IoStatus {
        if !self.closed {
            self.queue_close_notify();
        }
        match self.flush_pending_out() {
            Ok(()) => IoStatus::Success,
            Err(WouldBlock) => IoStatus::WantPollOut,
        }
    }
}
