//! Growable receive/send buffers decoupled from socket I/O.
//!
//! The receive buffer is a flat byte arena with three cursors:
//!
//! ```text
//! 0 ........ used ........ pos ........ avail ........ capacity
//!   reclaimable  dispatched     unread        free
//! ```
//!
//! Invariant: `used <= pos <= avail <= capacity`. Bytes before `used` belong
//! to frames already returned to the caller and may be reclaimed by sliding
//! the unread region to offset 0; when nothing is reclaimable the buffer
//! doubles instead.

/// Receive-side byte arena.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: Vec<u8>,
    avail: usize,
    pos: usize,
    used: usize,
}

impl RecvBuffer {
    /// Create a buffer with the given initial capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(2)],
            avail: 0,
            pos: 0,
            used: 0,
        }
    }

    /// The unread region: bytes filled but not yet dispatched into a frame.
    #[must_use]
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.pos..self.avail]
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn unread_len(&self) -> usize {
        self.avail - self.pos
    }

    /// Total capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Ensure at least `threshold` bytes of free space before the next read:
    /// compact if reclaimable bytes exist, otherwise double the capacity.
    pub fn ensure_space(&mut self, threshold: usize) {
        if self.buf.len() - self.avail >= threshold {
            return;
        }
        if self.used > 0 {
            self.compact();
        }
        while self.buf.len() - self.avail < threshold {
            self.buf.resize(self.buf.len() * 2, 0);
        }
    }

    /// Slide unread bytes to offset 0, reclaiming everything before `used`.
    pub fn compact(&mut self) {
        if self.used == 0 {
            return;
        }
        self.buf.copy_within(self.used..self.avail, 0);
        self.pos -= self.used;
        self.avail -= self.used;
        self.used = 0;
    }

    /// The writable tail of the buffer; fill it with a socket read and call
    /// [`RecvBuffer::advance_avail`] with the byte count.
    pub fn space(&mut self) -> &mut [u8] {
        &mut self.buf[self.avail..]
    }

    /// Record `n` freshly read bytes.
    pub fn advance_avail(&mut self, n: usize) {
        debug_assert!(self.avail + n <= self.buf.len());
        self.avail += n;
    }

    /// Dispatch `n` unread bytes into a frame (advances `pos`).
    pub fn advance_pos(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.avail);
        self.pos += n;
    }

    /// Mark all dispatched bytes as reclaimable. When everything buffered has
    /// been consumed the cursors snap back to 0 so the next frame starts at
    /// the buffer head.
    pub fn reclaim(&mut self) {
        self.used = self.pos;
        if self.used == self.avail {
            self.used = 0;
            self.pos = 0;
            self.avail = 0;
        }
    }

    /// Drop all buffered state (used when a connection is re-established).
    pub fn reset(&mut self) {
        self.avail = 0;
        self.pos = 0;
        self.used = 0;
    }

    /// Append bytes directly, bypassing `space()`/`advance_avail`. Used to
    /// preserve bytes that arrived piggybacked on the handshake response.
    pub fn push_unread(&mut self, data: &[u8]) {
        while self.buf.len() - self.avail < data.len() {
            self.ensure_space(data.len());
        }
        self.buf[self.avail..self.avail + data.len()].copy_from_slice(data);
        self.avail += data.len();
    }

    #[cfg(test)]
    fn cursors(&self) -> (usize, usize, usize) {
        (self.used, self.pos, self.avail)
    }
}

/// Send-side scratch buffer growing by fixed increments.
#[derive(Debug)]
pub struct SendBuffer {
    buf: Vec<u8>,
    increment: usize,
}

impl SendBuffer {
    /// Create a scratch buffer with the given initial capacity and growth
    /// increment.
    #[must_use]
    pub fn new(capacity: usize, increment: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            increment: increment.max(1),
        }
    }

    /// Reset the buffer for a new frame, making room for `needed` bytes.
    /// Capacity grows in whole increments, never shrinks.
    pub fn begin(&mut self, needed: usize) {
        self.buf.clear();
        if needed > self.buf.capacity() {
            let mut target = self.buf.capacity().max(self.increment);
            while target < needed {
                target += self.increment;
            }
            self.buf.reserve_exact(target - self.buf.len());
        }
    }

    /// Append bytes to the current frame.
    pub fn put(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Append a single byte.
    pub fn put_u8(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// The assembled frame bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Direct access to the underlying vector for the frame encoders.
    pub fn vec_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    /// Mutable view of the assembled frame (for in-place masking).
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Bytes currently in the frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the frame is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
