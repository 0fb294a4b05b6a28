//! A handshake where the server's only acceptable group has no matching
//! key share in the first ClientHello, forcing a HelloRetryRequest round.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tls13_core::crypto::kex::NamedGroup;
use tls13_core::crypto::sig::SignatureScheme;
use tls13_core::{ClientConnection, ClientOptions, CommonOptions, Identity, IoStatus, PrivateKey, ServerConnection, ServerOptions};
use tls13_core::WouldBlock;

#[derive(Clone)]
struct Pipe(Rc<RefCell<VecDeque<u8>>>);

impl Pipe {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(VecDeque::new())))
    }
}

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

#[test]
fn server_only_group_forces_a_retry_and_still_connects() {
    let (client_io, server_io) = make_pair();
    // The client offers a key share for its first preferred group
    // (X25519) but the server will only accept secp384r1, which the
    // client did advertise in `supported_groups` without a matching share.
    let client = ClientConnection::new(client_io, ClientOptions::default());
    let server_options = ServerOptions {
        common: CommonOptions {
            groups: vec![NamedGroup::Secp384r1],
            ..CommonOptions::default()
        },
        identity: server_identity(),
        request_client_certificate: false,
        session_ticket_lifetime: Some(7200),
        psk: None,
    };
    let mut server = ServerConnection::new(server_io, server_options);
    let mut client = client;

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
    panic!("handshake did not converge after a HelloRetryRequest round");
}
