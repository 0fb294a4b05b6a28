//! Core TLS 1.3 (RFC 8446) protocol engine: the handshake state machine,
//! key schedule, and record layer, composed into client and server
//! connection drivers.
//!
//! This crate implements the wire protocol only. It does not open sockets,
//! parse certificates, or drive an event loop -- the host supplies I/O
//! through [`io::HandshakeIo`] and gets back raw certificate bytes to
//! validate however its environment requires (see `options` and the crate
//! README for the boundary this draws).
//!
//! # References
//!
//! * [RFC 8446: The Transport Layer Security (TLS) Protocol Version 1.3](https://datatracker.ietf.org/doc/html/rfc8446)

pub mod alert;
pub mod buffer;
pub mod bytes;
pub mod cipher_suite;
pub mod client;
pub mod context;
pub mod crypto;
pub mod error;
pub mod extensions;
pub mod handshake;
pub mod handshake_codec;
pub mod io;
pub mod key_schedule;
pub mod options;
pub mod record;
pub mod record_layer;
pub mod server;

/// The wire value of TLS 1.3 in the `supported_versions` extension.
pub const TLS_1_3_VERSION: u16 = 0x0304;

pub use client::ClientConnection;
pub use context::Role;
pub use error::{ErrorKind, Result, TlsError};
pub use io::{HandshakeIo, IoStatus, WouldBlock};
pub use options::{ClientOptions, ClientPsk, CommonOptions, Identity, PrivateKey, ServerOptions};
pub use server::ServerConnection;
