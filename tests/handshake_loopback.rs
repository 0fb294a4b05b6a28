//! End-to-end client/server handshake over an in-memory duplex pipe.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tls13_core::crypto::sig::SignatureScheme;
use tls13_core::{ClientConnection, ClientOptions, Identity, IoStatus, PrivateKey, ServerConnection, ServerOptions};
use tls13_core::WouldBlock;

#[derive(Clone)]
struct Pipe(Rc<RefCell<VecDeque<u8>>>);

impl Pipe {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(VecDeque::new())))
    }
}

/// One endpoint of an in-memory duplex connection: reads from `inbound`,
/// writes to `outbound`. Never blocks -- both queues are unbounded, so a
/// test alternates calling `handshake()` on each side until both report
/// `Success`.
struct LoopbackIo {
    inbound: Pipe,
    outbound: Pipe,
}

impl tls13_core::HandshakeIo for LoopbackIo {
    fn wire_read(&mut self, buf: &mut [u8]) -> Result<usize, WouldBlock> {
        let mut q = self.inbound.0.borrow_mut();
        if q.is_empty() {
            return Err(WouldBlock);
        }
        let n = buf.len().min(q.len());
        for slot in buf.iter_mut().take(n) {
            *slot = q.pop_front().unwrap();
        }
        Ok(n)
    }

    fn wire_write(&mut self, buf: &[u8]) -> Result<usize, WouldBlock> {
        self.outbound.0.borrow_mut().extend(buf.iter().copied());
        Ok(buf.len())
    }
}

fn make_pair() -> (LoopbackIo, LoopbackIo) {
    let a_to_b = Pipe::new();
    let b_to_a = Pipe::new();
    let client_io = LoopbackIo {
        inbound: b_to_a.clone(),
        outbound: a_to_b.clone(),
    };
    let server_io = LoopbackIo {
        inbound: a_to_b,
        outbound: b_to_a,
    };
    (client_io, server_io)
}

/// Wraps a [`LoopbackIo`], counting how many times the engine reports a
/// post-handshake handshake message sent to the peer.
struct CountingIo {
    inner: LoopbackIo,
    phh_sent_count: Rc<RefCell<u32>>,
}

impl tls13_core::HandshakeIo for CountingIo {
    fn wire_read(&mut self, buf: &mut [u8]) -> Result<usize, WouldBlock> {
        self.inner.wire_read(buf)
    }

    fn wire_write(&mut self, buf: &[u8]) -> Result<usize, WouldBlock> {
        self.inner.wire_write(buf)
    }

    fn phh_sent(&mut self) {
        *self.phh_sent_count.borrow_mut() += 1;
    }
}

fn server_identity() -> Identity {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;
    let signing = SigningKey::generate(&mut OsRng);
    Identity {
        certificate_chain: vec![signing.verifying_key().to_bytes().to_vec()],
        signature_scheme: SignatureScheme::Ed25519,
        private_key: PrivateKey::Ed25519(signing),
    }
}

/// Drives both sides to completion, alternating `handshake()` calls until
/// each has reported `Success` at least once and neither is still blocked.
fn run_to_connected<CIO: tls13_core::HandshakeIo, SIO: tls13_core::HandshakeIo>(
    client: &mut ClientConnection<CIO>,
    server: &mut ServerConnection<SIO>,
) {
    for _ in 0..64 {
        let client_status = client.handshake();
        let server_status = server.handshake();
        if client.is_connected() && server.is_connected() {
            return;
        }
        assert!(
            matches!(client_status, IoStatus::WantPollIn | IoStatus::WantPollOut | IoStatus::Success),
            "client handshake failed: {client_status:?}"
        );
        assert!(
            matches!(server_status, IoStatus::WantPollIn | IoStatus::WantPollOut | IoStatus::Success),
            "server handshake failed: {server_status:?}"
        );
    }
    panic!("handshake did not converge within the round budget");
}

#[test]
fn full_handshake_reaches_connected_and_exchanges_application_data() {
    let (client_io, server_io) = make_pair();
    let mut client = ClientConnection::new(client_io, ClientOptions::default());
    let mut server = ServerConnection::new(
        server_io,
        ServerOptions {
            common: Default::default(),
            identity: server_identity(),
            request_client_certificate: false,
            session_ticket_lifetime: None,
            psk: None,
        },
    );

    run_to_connected(&mut client, &mut server);
    assert!(client.is_connected());
    assert!(server.is_connected());

    let status = client.write_application_data(b"hello from client").unwrap();
    assert_eq!(status, IoStatus::Success);

    let mut received = Vec::new();
    for _ in 0..16 {
        match server.read_application_data(&mut received).unwrap() {
            IoStatus::Success => break,
            IoStatus::WantPollIn => continue,
            other => panic!("unexpected status: {other:?}"),
        }
    }
    assert_eq!(received, b"hello from client");
}

#[test]
fn key_update_round_trip_keeps_application_data_flowing() {
    let (client_io, server_io) = make_pair();
    let mut client = ClientConnection::new(client_io, ClientOptions::default());
    let mut server = ServerConnection::new(
        server_io,
        ServerOptions {
            common: Default::default(),
            identity: server_identity(),
            request_client_certificate: false,
            session_ticket_lifetime: None,
            psk: None,
        },
    );
    run_to_connected(&mut client, &mut server);

    client.request_key_update(false).unwrap();
    client.write_application_data(b"after key update").unwrap();

    let mut received = Vec::new();
    for _ in 0..16 {
        match server.read_application_data(&mut received).unwrap() {
            IoStatus::Success => break,
            IoStatus::WantPollIn => continue,
            other => panic!("unexpected status: {other:?}"),
        }
    }
    assert_eq!(received, b"after key update");
}

#[test]
fn requested_key_update_triggers_a_reciprocal_key_update() {
    let (client_io, server_io) = make_pair();
    let mut client = ClientConnection::new(client_io, ClientOptions::default());
    let server_phh_sent = Rc::new(RefCell::new(0u32));
    let mut server = ServerConnection::new(
        CountingIo {
            inner: server_io,
            phh_sent_count: server_phh_sent.clone(),
        },
        ServerOptions {
            common: Default::default(),
            identity: server_identity(),
            request_client_certificate: false,
            session_ticket_lifetime: None,
            psk: None,
        },
    );
    run_to_connected(&mut client, &mut server);

    client.request_key_update(true).unwrap();
    client.write_application_data(b"after requested key update").unwrap();

    let mut received = Vec::new();
    for _ in 0..16 {
        match server.read_application_data(&mut received).unwrap() {
            IoStatus::Success => break,
            IoStatus::WantPollIn => continue,
            other => panic!("unexpected status: {other:?}"),
        }
    }
    assert_eq!(received, b"after requested key update");
    assert_eq!(*server_phh_sent.borrow(), 1, "server must send a reciprocal KeyUpdate(NotRequested)");
}
