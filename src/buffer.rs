//! The growable buffer the record layer stages partial records into.

use crate::io::WouldBlock;

/// A byte buffer that grows as bytes are appended and is consumed from the
/// front, used by the record layer to accumulate a record (or a handshake
/// message fragment) that arrives split across multiple `wire_read` calls.
#[derive(Debug, Default, Clone)]
pub struct RecvBuffer {
    data: Vec<u8>,
    /// Number of bytes at the front of `data` already handed out and safe to
    /// drop on the next `compact`.
    consumed: usize,
}

impl RecvBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn available(&self) -> usize {
        self.data.len() - self.consumed
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.consumed..]
    }

    /// Drops already-consumed bytes from the front once they no longer need
    /// to be retained, keeping the buffer from growing without bound across
    /// a long-lived connection.
    pub fn compact(&mut self) {
        if self.consumed > 0 {
            self.data.drain(0..self.consumed);
            self.consumed = 0;
        }
    }

    /// Marks `n` bytes at the front as consumed; they remain addressable via
    /// [`RecvBuffer::as_slice`] until the next [`RecvBuffer::compact`] call,
    /// matching the "previous handshake record" replay the handshake codec
    /// needs when a message straddles a read.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.available(), "consumed more than was buffered");
        self.consumed += n;
    }

    /// Attempts to grow the buffer by reading from `read_cb` until at least
    /// `want` bytes are available (beyond what's already consumed) or the
    /// callback signals it would block.
    ///
    /// Returns `Ok(())` once `want` bytes are available, or `Err(WouldBlock)`
    /// if the wire has no more to offer right now -- the caller (the record
    /// layer) should then surface `WantPollIn` and retry on the next
    /// invocation with the partially filled buffer intact.
    pub fn fill_to<F>(&mut self, want: usize, mut read_cb: F) -> Result<(), WouldBlock>
    where
        F: FnMut(&mut [u8]) -> Result<usize, WouldBlock>,
    {
        while self.available() < want {
            let mut chunk = [0u8; 4096];
            let n = read_cb(&mut chunk)?;
            if n == 0 {
                return Err(WouldBlock);
            }
            self.data.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_in_multiple_short_reads() {
        let chunks = [b"he".as_slice(), b"llo".as_slice()];
        let mut idx = 0;
        let mut buf = RecvBuffer::new();
        buf.fill_to(5, |out| {
            if idx >= chunks.len() {
                return Err(WouldBlock);
            }
            let c = chunks[idx];
            out[..c.len()].copy_from_slice(c);
            idx += 1;
            Ok(c.len())
        })
        .unwrap();

        assert_eq!(buf.as_slice(), b"hello");
    }

    #[test]
    fn consume_then_compact_drops_front() {
        let mut buf = RecvBuffer::new();
        buf.fill_to(5, |out| {
            out[..5].copy_from_slice(b"hello");
            Ok(5)
        })
        .unwrap();

        buf.consume(2);
        assert_eq!(buf.as_slice(), b"llo");
        buf.compact();
        assert_eq!(buf.as_slice(), b"llo");
    }
}
