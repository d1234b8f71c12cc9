//! Fixed-capacity byte ring.
//!
//! `ByteRing` owns a heap buffer allocated once, at creation, and keeps an
//! explicit free-space counter so that the whole capacity is usable.
//!
//! `push` and `pop` are all-or-nothing: they either move the whole slice or
//! leave the ring untouched. `read` moves as many bytes as are available.
//!
//! ```rust
//! # use hyperdrive::queues::ring::ByteRing;
//! let mut ring = ByteRing::try_with_capacity(4).unwrap();
//!
//! ring.push(b"abc").unwrap();
//! assert!(ring.push(b"de").is_err()); // Only one byte left
//!
//! let mut out = [0; 2];
//! ring.pop(&mut out).unwrap();
//! assert_eq!(&out, b"ab");
//!
//! ring.push(b"de").unwrap(); // Wraps around
//! let mut out = [0; 8];
//! assert_eq!(ring.read(&mut out), 3);
//! assert_eq!(&out[..3], b"cde");
//! ```
use alloc::{boxed::Box, collections::TryReserveError, vec::Vec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingError {
    /// Not enough free space to push the whole slice.
    Full,
    /// Not enough buffered bytes to fill the whole slice.
    Insufficient,
}

impl core::fmt::Display for RingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => f.write_str("Ring buffer is full"),
            Self::Insufficient => f.write_str("Ring buffer does not hold enough bytes"),
        }
    }
}

impl core::error::Error for RingError {}

#[derive(Debug)]
pub struct ByteRing {
    buffer: Box<[u8]>,
    /// Index of the next byte to read.
    head: usize,
    /// Index of the next byte to write.
    tail: usize,
    free: usize,
}

impl ByteRing {
    /// Allocates a ring able to hold `capacity` bytes.
    ///
    /// ## Errors
    ///
    /// Returns an error if the backing buffer cannot be allocated.
    pub fn try_with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(capacity)?;
        buffer.resize(capacity, 0);
        Ok(Self {
            buffer: buffer.into_boxed_slice(),
            head: 0,
            tail: 0,
            free: capacity,
        })
    }

    #[must_use]
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    #[inline]
    pub const fn free_space(&self) -> usize {
        self.free
    }

    #[must_use]
    #[inline]
    /// Returns the number of buffered bytes.
    pub const fn len(&self) -> usize {
        self.capacity() - self.free
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.free == self.capacity()
    }

    #[must_use]
    #[inline]
    pub const fn is_full(&self) -> bool {
        self.free == 0
    }

    /// Appends the whole of `data`.
    ///
    /// ## Errors
    ///
    /// Returns `RingError::Full` without writing anything if `data` does not fit.
    pub fn push(&mut self, data: &[u8]) -> Result<(), RingError> {
        if data.len() > self.free {
            return Err(RingError::Full);
        }

        let first = data.len().min(self.capacity() - self.tail);
        self.buffer[self.tail..self.tail + first].copy_from_slice(&data[..first]);
        self.buffer[..data.len() - first].copy_from_slice(&data[first..]);

        self.tail = (self.tail + data.len()) % self.capacity().max(1);
        self.free -= data.len();
        Ok(())
    }

    /// Fills the whole of `out` from the ring.
    ///
    /// ## Errors
    ///
    /// Returns `RingError::Insufficient` without consuming anything if fewer
    /// than `out.len()` bytes are buffered.
    pub fn pop(&mut self, out: &mut [u8]) -> Result<(), RingError> {
        if out.len() > self.len() {
            return Err(RingError::Insufficient);
        }
        self.take(out);
        Ok(())
    }

    /// Moves up to `out.len()` bytes out of the ring and returns how many were moved.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len());
        self.take(&mut out[..count]);
        count
    }

    fn take(&mut self, out: &mut [u8]) {
        let first = out.len().min(self.capacity() - self.head);
        out[..first].copy_from_slice(&self.buffer[self.head..self.head + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.buffer[..rest]);

        self.head = (self.head + out.len()) % self.capacity().max(1);
        self.free += out.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo() {
        let mut ring = ByteRing::try_with_capacity(8).unwrap();
        assert!(ring.is_empty());

        ring.push(&[1, 2, 3]).unwrap();
        ring.push(&[4, 5]).unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.free_space(), 3);

        let mut out = [0; 5];
        ring.pop(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_full_capacity_usable() {
        let mut ring = ByteRing::try_with_capacity(4).unwrap();
        ring.push(&[1, 2, 3, 4]).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.push(&[5]), Err(RingError::Full));
    }

    #[test]
    fn test_all_or_nothing() {
        let mut ring = ByteRing::try_with_capacity(4).unwrap();
        ring.push(&[1, 2, 3]).unwrap();

        assert_eq!(ring.push(&[4, 5]), Err(RingError::Full));
        assert_eq!(ring.len(), 3);

        let mut out = [0; 4];
        assert_eq!(ring.pop(&mut out), Err(RingError::Insufficient));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_wrap_around() {
        let mut ring = ByteRing::try_with_capacity(5).unwrap();
        let mut out = [0; 3];

        for round in 0..10u8 {
            let data = [round, round + 1, round + 2];
            ring.push(&data).unwrap();
            ring.pop(&mut out).unwrap();
            assert_eq!(out, data);
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_partial_read() {
        let mut ring = ByteRing::try_with_capacity(6).unwrap();
        ring.push(&[9, 8]).unwrap();

        let mut out = [0; 4];
        assert_eq!(ring.read(&mut out), 2);
        assert_eq!(out[..2], [9, 8]);
        assert_eq!(ring.read(&mut out), 0);
    }
}
