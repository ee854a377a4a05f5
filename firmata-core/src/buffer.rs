//! Buffered byte channel between the serial reader and the decoder.
//!
//! Bytes arriving from the wire are appended one at a time; a configurable
//! trigger decides when the registered consumer is notified. The consumer may
//! drain the buffer from inside the notification, mid-batch, before the
//! remaining bytes of the batch are appended.

use alloc::vec;
use alloc::vec::Vec;

/// Initial buffer capacity; doubles whenever an append would overflow.
const INITIAL_CAPACITY: usize = 64;

/// When the consumer is notified of buffered bytes.
///
/// Exactly one policy is active at a time; replacing it takes effect on the
/// next append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPolicy {
    /// Notify while at least this many unread bytes are buffered.
    ByteCount(usize),
    /// Notify whenever this byte value is appended.
    UntilByte(u8),
}

/// Growable byte store with sequential-consume semantics.
///
/// Unread bytes occupy `[read_cursor, write_cursor)`. Once the buffer is
/// fully drained both cursors rewind to zero, so steady-state traffic never
/// grows the allocation. This is a rewind-on-empty store, not a ring: bytes
/// are always appended at the write cursor.
pub struct SerialBuffer {
    buf: Vec<u8>,
    read_cursor: usize,
    write_cursor: usize,
    trigger: TriggerPolicy,
    closed: bool,
}

impl SerialBuffer {
    /// Create an empty buffer with the default one-byte trigger.
    pub fn new() -> Self {
        Self {
            buf: vec![0; INITIAL_CAPACITY],
            read_cursor: 0,
            write_cursor: 0,
            trigger: TriggerPolicy::ByteCount(1),
            closed: false,
        }
    }

    /// Replace the active trigger policy. Takes effect on the next append.
    pub fn set_trigger(&mut self, policy: TriggerPolicy) {
        self.trigger = policy;
    }

    /// Number of unread bytes.
    pub fn available(&self) -> usize {
        self.write_cursor - self.read_cursor
    }

    /// Append a batch of bytes, notifying `on_ready` as the trigger fires.
    ///
    /// Each byte is appended individually; when a byte satisfies the active
    /// trigger, `on_ready` runs before the remaining bytes of the batch are
    /// appended and may drain the buffer via [`SerialBuffer::read_byte`].
    /// After `close` this is a no-op.
    pub fn feed(&mut self, bytes: &[u8], mut on_ready: impl FnMut(&mut Self)) {
        for &byte in bytes {
            if self.closed {
                return;
            }
            self.push(byte);
            if self.trigger_satisfied(byte) {
                on_ready(self);
            }
        }
    }

    /// Pop one byte, FIFO. Returns `None` when empty or closed.
    ///
    /// Draining the last byte rewinds both cursors to zero.
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.closed || self.read_cursor == self.write_cursor {
            return None;
        }
        let byte = self.buf[self.read_cursor];
        self.read_cursor += 1;
        if self.read_cursor == self.write_cursor {
            // rewind
            self.read_cursor = 0;
            self.write_cursor = 0;
        }
        Some(byte)
    }

    /// Discard all unread bytes and rewind.
    pub fn clear(&mut self) {
        self.read_cursor = 0;
        self.write_cursor = 0;
    }

    /// Mark the buffer closed: pending notifications are suppressed and any
    /// later append or read is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn push(&mut self, byte: u8) {
        if self.write_cursor == self.buf.len() {
            let doubled = self.buf.len() * 2;
            self.buf.resize(doubled, 0);
        }
        self.buf[self.write_cursor] = byte;
        self.write_cursor += 1;
    }

    fn trigger_satisfied(&self, appended: u8) -> bool {
        match self.trigger {
            TriggerPolicy::ByteCount(n) => self.available() >= n,
            TriggerPolicy::UntilByte(b) => appended == b,
        }
    }
}

impl Default for SerialBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn bytes_come_back_in_fifo_order() {
        let mut buffer = SerialBuffer::new();
        buffer.feed(&[1, 2, 3], |_| {});
        assert_eq!(buffer.read_byte(), Some(1));
        assert_eq!(buffer.read_byte(), Some(2));
        assert_eq!(buffer.read_byte(), Some(3));
        assert_eq!(buffer.read_byte(), None);
    }

    #[test]
    fn cursors_rewind_when_fully_drained() {
        let mut buffer = SerialBuffer::new();
        buffer.feed(&[10, 20], |_| {});
        buffer.read_byte();
        buffer.read_byte();
        assert_eq!(buffer.read_cursor, 0);
        assert_eq!(buffer.write_cursor, 0);
    }

    #[test]
    fn capacity_doubles_without_losing_bytes() {
        let mut buffer = SerialBuffer::new();
        let payload: Vec<u8> = (0..255).collect();
        buffer.feed(&payload, |_| {});
        assert_eq!(buffer.available(), payload.len());
        for expected in &payload {
            assert_eq!(buffer.read_byte(), Some(*expected));
        }
    }

    #[test]
    fn byte_count_trigger_fires_per_satisfying_byte() {
        let mut buffer = SerialBuffer::new();
        buffer.set_trigger(TriggerPolicy::ByteCount(3));
        let mut fired = 0;
        buffer.feed(&[1, 2, 3, 4], |_| fired += 1);
        // Fires on the third byte and again on the fourth while >= 3 remain.
        assert_eq!(fired, 2);
    }

    #[test]
    fn until_byte_trigger_fires_on_the_delimiter() {
        let mut buffer = SerialBuffer::new();
        buffer.set_trigger(TriggerPolicy::UntilByte(b'\n'));
        let mut fired = 0;
        buffer.feed(b"ab\ncd\n", |_| fired += 1);
        assert_eq!(fired, 2);
    }

    #[test]
    fn consumer_may_drain_mid_batch() {
        let mut buffer = SerialBuffer::new();
        let mut seen = Vec::new();
        buffer.feed(&[5, 6, 7], |buf| {
            while let Some(byte) = buf.read_byte() {
                seen.push(byte);
            }
        });
        assert_eq!(seen, [5, 6, 7]);
        assert_eq!(buffer.available(), 0);
    }

    #[test]
    fn clear_discards_unread_bytes_and_rewinds() {
        let mut buffer = SerialBuffer::new();
        buffer.feed(&[1, 2, 3], |_| {});
        buffer.read_byte();
        buffer.clear();
        assert_eq!(buffer.available(), 0);
        assert_eq!(buffer.read_cursor, 0);
        assert_eq!(buffer.write_cursor, 0);
        // The buffer keeps working after a clear.
        buffer.feed(&[9], |_| {});
        assert_eq!(buffer.read_byte(), Some(9));
    }

    #[test]
    fn closed_buffer_ignores_feeds_and_reads() {
        let mut buffer = SerialBuffer::new();
        buffer.feed(&[1], |_| {});
        buffer.close();
        let mut fired = 0;
        buffer.feed(&[2, 3], |_| fired += 1);
        assert_eq!(fired, 0);
        assert_eq!(buffer.read_byte(), None);
        assert!(buffer.is_closed());
    }
}
