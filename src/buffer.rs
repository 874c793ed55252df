//! Fixed-capacity linear byte buffer with explicit fill/drain modes.
//!
//! A [`ByteBuffer`] tracks three cursors over one contiguous region:
//! `position`, `limit`, and an optional `mark`, with the invariant
//!
//! ```text
//! 0 <= mark <= position <= limit <= capacity
//! ```
//!
//! The buffer is always in one of two implied modes. In *fill mode* writes
//! via [`put`](ByteBuffer::put) (or [`fill_from`](ByteBuffer::fill_from))
//! advance `position` toward `limit == capacity`. Calling
//! [`flip`](ByteBuffer::flip) switches to *drain mode*: `limit` drops to the
//! old `position`, `position` returns to zero, and reads via
//! [`get`](ByteBuffer::get) (or [`drain_to`](ByteBuffer::drain_to)) consume
//! the filled region. Forgetting the flip is the classic bug with this kind
//! of buffer; every transfer in this crate goes fill -> flip -> drain ->
//! clear/compact.
//!
//! [`compact`](ByteBuffer::compact) supports partial-write retry: it moves
//! the unread tail to the front and returns the buffer to fill mode so the
//! remaining bytes survive until the next writable event.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    mark: Option<usize>,
}

impl ByteBuffer {
    /// Allocates a buffer in fill mode: `position = 0`, `limit = capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            position: 0,
            limit: capacity,
            mark: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes left between `position` and `limit`.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Appends `src` at `position`. Fails without mutating when `src` does
    /// not fit below `limit`.
    pub fn put(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.remaining() {
            return Err(Error::BufferOverflow {
                requested: src.len(),
                remaining: self.remaining(),
            });
        }
        self.data[self.position..self.position + src.len()].copy_from_slice(src);
        self.position += src.len();
        Ok(())
    }

    /// Consumes the next `n` bytes, returning them as a slice. Fails without
    /// mutating when fewer than `n` bytes remain.
    pub fn get(&mut self, n: usize) -> Result<&[u8]> {
        if n > self.remaining() {
            return Err(Error::BufferUnderflow {
                requested: n,
                remaining: self.remaining(),
            });
        }
        let start = self.position;
        self.position += n;
        Ok(&self.data[start..start + n])
    }

    /// Switches fill mode to drain mode: `limit = position`, `position = 0`,
    /// mark discarded. Mandatory before transferring data out.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
        self.mark = None;
    }

    /// Readies the buffer for a fresh fill: `position = 0`,
    /// `limit = capacity`, mark discarded. The underlying bytes are not
    /// erased, only forgotten.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity();
        self.mark = None;
    }

    /// Rewinds `position` to 0 keeping `limit`, so already-drained data can
    /// be read again. Discards the mark.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.mark = None;
    }

    /// Records the current `position` for a later [`reset`](Self::reset).
    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    /// Moves `position` back to the marked value.
    pub fn reset(&mut self) -> Result<()> {
        match self.mark {
            Some(m) => {
                self.position = m;
                Ok(())
            }
            None => Err(Error::InvalidMark),
        }
    }

    /// Moves the unread region `[position, limit)` to offset 0 and returns
    /// to fill mode with `position` just past it. Used when a write only
    /// partially drained the buffer and the tail must be preserved for the
    /// next writable event.
    pub fn compact(&mut self) {
        let unread = self.limit - self.position;
        self.data.copy_within(self.position..self.limit, 0);
        self.position = unread;
        self.limit = self.capacity();
        self.mark = None;
    }

    /// The readable region `[position, limit)` without consuming it.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Fills from `reader` into `[position, limit)`, advancing `position` by
    /// the number of bytes read. Returns `Ok(0)` on EOF or when the buffer
    /// has no room.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        let n = reader.read(&mut self.data[self.position..self.limit])?;
        self.position += n;
        Ok(n)
    }

    /// Fills via a caller-supplied read into the free region, advancing
    /// `position` by the returned count. Lets positional reads
    /// (`recv_from`-style calls) land directly in the buffer.
    pub fn fill_with<F>(&mut self, read: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        let n = read(&mut self.data[self.position..self.limit])?;
        debug_assert!(n <= self.limit - self.position);
        self.position += n;
        Ok(n)
    }

    /// Drains `[position, limit)` into `writer`, advancing `position` by the
    /// number of bytes accepted. A short write leaves the unread tail in
    /// place for [`compact`](Self::compact).
    pub fn drain_to<W: Write>(&mut self, writer: &mut W) -> io::Result<usize> {
        if self.position == self.limit {
            return Ok(0);
        }
        let n = writer.write(&self.data[self.position..self.limit])?;
        self.position += n;
        Ok(n)
    }
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity())
            .field("mark", &self.mark)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn invariant(buf: &ByteBuffer) {
        if let Some(m) = buf.mark {
            assert!(m <= buf.position);
        }
        assert!(buf.position <= buf.limit);
        assert!(buf.limit <= buf.capacity());
    }

    #[test]
    fn put_flip_get_round_trip() {
        let mut buf = ByteBuffer::with_capacity(1024);
        buf.put(b"abc").unwrap();
        buf.put(b"de").unwrap();
        assert_eq!(buf.position(), 5);
        assert_eq!(buf.limit(), 1024);

        buf.flip();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 5);
        assert_eq!(buf.get(5).unwrap(), b"abcde");
        assert!(!buf.has_remaining());
        invariant(&buf);
    }

    #[test]
    fn clear_restores_fill_mode_from_any_state() {
        let mut buf = ByteBuffer::with_capacity(16);
        buf.put(b"xyz").unwrap();
        buf.flip();
        buf.get(1).unwrap();
        buf.mark();

        buf.clear();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), buf.capacity());
        assert!(buf.reset().is_err());
        invariant(&buf);
    }

    #[test]
    fn rewind_allows_rereading() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.put(b"hey").unwrap();
        buf.flip();
        assert_eq!(buf.get(3).unwrap(), b"hey");
        buf.rewind();
        assert_eq!(buf.limit(), 3);
        assert_eq!(buf.get(3).unwrap(), b"hey");
    }

    #[test]
    fn mark_and_reset_restore_position() {
        let mut buf = ByteBuffer::with_capacity(1024);
        buf.put(b"abcd").unwrap();
        buf.flip();

        assert_eq!(buf.get(2).unwrap(), b"ab");
        buf.mark();
        assert_eq!(buf.get(2).unwrap(), b"cd");
        assert_eq!(buf.position(), 4);

        buf.reset().unwrap();
        assert_eq!(buf.position(), 2);
        assert_eq!(buf.remaining(), 2);
        invariant(&buf);
    }

    #[test]
    fn reset_without_mark_fails() {
        let mut buf = ByteBuffer::with_capacity(4);
        assert!(matches!(buf.reset(), Err(Error::InvalidMark)));
    }

    #[test]
    fn overflow_and_underflow_do_not_mutate() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.put(b"ab").unwrap();
        let err = buf.put(b"cdefg").unwrap_err();
        assert!(matches!(
            err,
            Error::BufferOverflow {
                requested: 5,
                remaining: 2
            }
        ));
        assert_eq!(buf.position(), 2);

        buf.flip();
        let err = buf.get(3).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferUnderflow {
                requested: 3,
                remaining: 2
            }
        ));
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn compact_preserves_unread_tail() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.put(b"abcdef").unwrap();
        buf.flip();
        buf.get(2).unwrap();

        buf.compact();
        assert_eq!(buf.position(), 4);
        assert_eq!(buf.limit(), 8);
        buf.put(b"gh").unwrap();
        buf.flip();
        assert_eq!(buf.get(6).unwrap(), b"cdefgh");
        invariant(&buf);
    }

    /// A writer that accepts at most `cap` bytes per call, forcing the
    /// partial-write path.
    struct CappedWriter {
        accepted: Vec<u8>,
        cap: usize,
    }

    impl Write for CappedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.cap);
            self.accepted.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn drain_compact_cycle_loses_nothing() {
        let payload: Vec<u8> = (0u8..200).collect();
        let mut writer = CappedWriter {
            accepted: Vec::new(),
            cap: 7,
        };
        let mut buf = ByteBuffer::with_capacity(64);

        let mut sent = 0;
        while sent < payload.len() {
            let chunk = (payload.len() - sent).min(buf.remaining());
            buf.put(&payload[sent..sent + chunk]).unwrap();
            sent += chunk;

            buf.flip();
            buf.drain_to(&mut writer).unwrap();
            buf.compact();
            invariant(&buf);
        }
        // flush whatever compact left behind
        loop {
            buf.flip();
            let n = buf.drain_to(&mut writer).unwrap();
            buf.compact();
            if n == 0 && writer.accepted.len() == payload.len() {
                break;
            }
        }
        assert_eq!(writer.accepted, payload);
    }

    #[test]
    fn fill_from_reads_into_free_region() {
        let mut buf = ByteBuffer::with_capacity(8);
        let mut src: &[u8] = b"hello";
        let n = buf.fill_from(&mut src).unwrap();
        assert_eq!(n, 5);
        buf.flip();
        assert_eq!(buf.as_slice(), b"hello");
    }
}
