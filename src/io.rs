//! The capability surface the engine consumes from its host: wire I/O,
//! alerts, and post-handshake handshake delivery.
//!
//! # Design
//!
//! The corpus's lower-level engine models this as five raw function pointers
//! plus a `void*` callback argument (a C-compatible ABI). In idiomatic Rust
//! the equivalent is a single object-safe trait, passed by `&mut dyn`
//! reference rather than carried as a back-pointer cycle through the record
//! layer -- see Design Notes, "Cyclic callbacks".

use std::time::Instant;

use crate::alert::AlertDescription;
use crate::handshake::Handshake;

/// Signals that a callback has no more bytes to offer (or accept) right now
/// and the caller should poll and retry later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldBlock;

/// The status returned from a top-level [`crate::context::HandshakeContext`]
/// entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IoStatus {
    /// The call completed; any out-parameter (bytes read, say) is valid.
    Success,
    /// The peer closed the connection cleanly (`close_notify`).
    Eof,
    /// A fatal, unrecoverable error occurred; the session is no longer usable.
    Failure,
    /// An alert was sent or received and fully processed.
    Alert,
    /// The wire has no more input right now; poll for readability and retry.
    WantPollIn,
    /// The wire cannot accept more output right now; poll for writability and retry.
    WantPollOut,
    /// Call the same entry point again immediately with no external event.
    WantRetry,
    /// The peer is not speaking TLS 1.3; defer to a legacy stack.
    ///
    /// This core carries no legacy stack, so in practice this status is
    /// always converted into a `ProtocolVersion` failure before it reaches
    /// the caller -- see Design Notes, "Legacy interop return codes".
    UseLegacy,
}

/// Capabilities the host application provides to the engine.
///
/// Implementations are free to buffer, to perform actual socket I/O, or (as
/// the test suite does) to shuttle bytes directly between two in-process
/// instances.
pub trait HandshakeIo {
    /// Reads up to `buf.len()` bytes from the wire into `buf`, returning the
    /// number of bytes read, `Ok(0)` for a clean peer close, or
    /// `Err(WouldBlock)` if none are available yet.
    fn wire_read(&mut self, buf: &mut [u8]) -> Result<usize, WouldBlock>;

    /// Writes `buf` to the wire, returning the number of bytes accepted
    /// (which may be less than `buf.len()`) or `Err(WouldBlock)` if none
    /// could be written right now.
    fn wire_write(&mut self, buf: &[u8]) -> Result<usize, WouldBlock>;

    /// Notifies the host of an alert sent or received on this connection.
    fn alert(&mut self, description: AlertDescription) {
        let _ = description;
    }

    /// Delivers a `NewSessionTicket` body to the host, after
    /// [`crate::context::HandshakeContext`]'s post-handshake message rate
    /// limit (`phh_limit` messages per `phh_limit_time` window, see
    /// [`crate::options::CommonOptions`]) has accepted it. `KeyUpdate`
    /// carries no body and is surfaced only through [`Self::phh_sent`] and
    /// [`Self::handshake_message_received`].
    ///
    /// Returning `Err(WouldBlock)` leaves the ticket queued; the engine
    /// retries delivery on the next call into the context rather than
    /// dropping it.
    fn phh_recv(&mut self, body: &[u8]) -> Result<(), WouldBlock> {
        let _ = body;
        Ok(())
    }

    /// Notifies the host that a post-handshake handshake message has been
    /// sent to the peer.
    fn phh_sent(&mut self) {}

    /// Observer invoked with every handshake message as it is sent.
    fn handshake_message_sent(&mut self, message: &Handshake) {
        let _ = message;
    }

    /// Observer invoked with every handshake message as it is received.
    fn handshake_message_received(&mut self, message: &Handshake) {
        let _ = message;
    }

    /// The clock the post-handshake message rate limiter measures its
    /// window against. Hosts with their own notion of time (a test harness
    /// replaying a fixed schedule, an embedded target with no OS clock)
    /// can override this; the default is the platform monotonic clock.
    fn now(&self) -> Instant {
        Instant::now()
    }
}
