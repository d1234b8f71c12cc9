//! UDP header.
use crate::{
    NetworkError, NetworkResult,
    utils::{read_be16, write_be16},
};

const SOURCE_PORT: usize = 0;
const DEST_PORT: usize = 2;
const LENGTH: usize = 4;
const CHECKSUM: usize = 6;

/// Length of the UDP header (fixed).
pub const HEADER_LEN: usize = 8;

/// A read/write wrapper around a UDP packet buffer.
#[derive(Debug, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    #[must_use]
    #[inline]
    pub const fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// # Errors
    ///
    /// Returns `Invalid` if the buffer is too short for the header or for the
    /// length field.
    pub fn new(buffer: T) -> NetworkResult<Self> {
        let packet = Self::new_unchecked(buffer);
        let len = packet.buffer.as_ref().len();
        if len < HEADER_LEN {
            return Err(NetworkError::Invalid);
        }
        let field = usize::from(packet.len());
        if field < HEADER_LEN || field > len {
            return Err(NetworkError::Invalid);
        }
        Ok(packet)
    }

    #[must_use]
    #[inline]
    pub fn src_port(&self) -> u16 {
        read_be16(self.buffer.as_ref(), SOURCE_PORT)
    }

    #[must_use]
    #[inline]
    pub fn dst_port(&self) -> u16 {
        read_be16(self.buffer.as_ref(), DEST_PORT)
    }

    #[must_use]
    #[inline]
    /// Return the length field (header included).
    pub fn len(&self) -> u16 {
        read_be16(self.buffer.as_ref(), LENGTH)
    }

    #[must_use]
    #[inline]
    pub fn checksum(&self) -> u16 {
        read_be16(self.buffer.as_ref(), CHECKSUM)
    }

    #[must_use]
    #[inline]
    /// Return whether the datagram carries no payload.
    pub fn is_empty(&self) -> bool {
        usize::from(self.len()) <= HEADER_LEN
    }

    #[must_use]
    #[inline]
    /// Return the payload, bounded by the length field.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[HEADER_LEN..usize::from(self.len())]
    }
}

/// A high-level representation of a UDP header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload_len: usize,
}

impl Repr {
    #[must_use]
    #[inline]
    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// Write the header into the first `HEADER_LEN` octets of `buffer`.
    ///
    /// The checksum is left at zero, meaning "not computed".
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the buffer is too short or the payload too long.
    pub fn emit(&self, buffer: &mut [u8]) -> NetworkResult<()> {
        let len = u16::try_from(self.buffer_len()).map_err(|_| NetworkError::Invalid)?;
        let header = buffer.get_mut(..HEADER_LEN).ok_or(NetworkError::Invalid)?;
        write_be16(header, SOURCE_PORT, self.src_port);
        write_be16(header, DEST_PORT, self.dst_port);
        write_be16(header, LENGTH, len);
        write_be16(header, CHECKSUM, 0);
        Ok(())
    }
}
