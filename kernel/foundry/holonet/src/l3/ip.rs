//! IPv4 header.
//!
//! Options are never emitted. On receive, the header length field is honoured
//! so that options are skipped, but their content is ignored.
use crate::{
    NetworkError, NetworkResult,
    utils::{checksum, read_be16, read_be32, write_be16, write_be32},
};
pub use core::net::Ipv4Addr;

const VERSION_IHL: usize = 0;
const TOTAL_LEN: usize = 2;
const TTL: usize = 8;
const PROTOCOL: usize = 9;
const HEADER_CHECKSUM: usize = 10;
const SOURCE_ADDR: usize = 12;
const DEST_ADDR: usize = 16;

/// Length of the IPv4 header without options.
pub const HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
/// IPv4 protocol number.
pub enum Protocol {
    Tcp = 6,
    Udp = 17,
}

impl TryFrom<u8> for Protocol {
    type Error = NetworkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(Self::Tcp),
            17 => Ok(Self::Udp),
            _ => Err(NetworkError::Unsupported),
        }
    }
}

impl From<Protocol> for u8 {
    fn from(value: Protocol) -> Self {
        value as Self
    }
}

/// A read/write wrapper around an IPv4 packet buffer.
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

    /// Wrap a buffer, checking that the header and total length fit in it.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the buffer is shorter than the header or the
    /// advertised total length, or if the header length is below the minimum.
    pub fn new(buffer: T) -> NetworkResult<Self> {
        let packet = Self::new_unchecked(buffer);
        let len = packet.buffer.as_ref().len();
        if len < HEADER_LEN {
            return Err(NetworkError::Invalid);
        }
        let header_len = packet.header_len();
        let total_len = usize::from(packet.total_len());
        if header_len < HEADER_LEN || total_len < header_len || total_len > len {
            return Err(NetworkError::Invalid);
        }
        Ok(packet)
    }

    #[must_use]
    #[inline]
    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[must_use]
    #[inline]
    pub fn version(&self) -> u8 {
        self.buffer.as_ref()[VERSION_IHL] >> 4
    }

    #[must_use]
    #[inline]
    /// Return the header length in octets (IHL × 4).
    pub fn header_len(&self) -> usize {
        usize::from(self.buffer.as_ref()[VERSION_IHL] & 0x0F) * 4
    }

    #[must_use]
    #[inline]
    pub fn total_len(&self) -> u16 {
        read_be16(self.buffer.as_ref(), TOTAL_LEN)
    }

    #[must_use]
    #[inline]
    pub fn ttl(&self) -> u8 {
        self.buffer.as_ref()[TTL]
    }

    #[must_use]
    #[inline]
    /// Return the raw protocol field.
    pub fn protocol(&self) -> u8 {
        self.buffer.as_ref()[PROTOCOL]
    }

    #[must_use]
    #[inline]
    pub fn checksum(&self) -> u16 {
        read_be16(self.buffer.as_ref(), HEADER_CHECKSUM)
    }

    #[must_use]
    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(read_be32(self.buffer.as_ref(), SOURCE_ADDR))
    }

    #[must_use]
    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(read_be32(self.buffer.as_ref(), DEST_ADDR))
    }

    #[must_use]
    #[inline]
    /// Return the payload, bounded by the total length field.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[self.header_len()..usize::from(self.total_len())]
    }
}

/// A high-level representation of an option-less IPv4 header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub protocol: Protocol,
    pub payload_len: usize,
    pub ttl: u8,
}

impl Repr {
    #[must_use]
    #[inline]
    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// Write the header into the first `HEADER_LEN` octets of `buffer`,
    /// checksum included.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the buffer is too short or the payload too long.
    pub fn emit(&self, buffer: &mut [u8]) -> NetworkResult<()> {
        let total_len = u16::try_from(self.buffer_len()).map_err(|_| NetworkError::Invalid)?;
        let header = buffer
            .get_mut(..HEADER_LEN)
            .ok_or(NetworkError::Invalid)?;

        header.fill(0);
        header[VERSION_IHL] = 0x45;
        write_be16(header, TOTAL_LEN, total_len);
        header[TTL] = self.ttl;
        header[PROTOCOL] = self.protocol.into();
        write_be32(header, SOURCE_ADDR, self.src_addr.to_bits());
        write_be32(header, DEST_ADDR, self.dst_addr.to_bits());

        let sum = checksum(header);
        write_be16(header, HEADER_CHECKSUM, sum);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec;

    static PACKET_BYTES: [u8; 24] = [
        0x45, 0x00, 0x00, 0x18, // Version, IHL, total length 24
        0x00, 0x00, 0x00, 0x00, // Identification, flags
        0x0a, 0x11, 0x00, 0x00, // TTL 10, UDP, checksum
        0xc0, 0xa8, 0x00, 0x0c, // 192.168.0.12
        0xc0, 0xa8, 0x00, 0x02, // 192.168.0.2
        0xde, 0xad, 0xbe, 0xef, // Payload
    ];

    #[test]
    fn test_deconstruct() {
        let packet = Packet::new(&PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.version(), 4);
        assert_eq!(packet.header_len(), 20);
        assert_eq!(packet.ttl(), 10);
        assert_eq!(Protocol::try_from(packet.protocol()), Ok(Protocol::Udp));
        assert_eq!(packet.src_addr(), Ipv4Addr::new(192, 168, 0, 12));
        assert_eq!(packet.dst_addr(), Ipv4Addr::new(192, 168, 0, 2));
        assert_eq!(packet.payload(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_payload_bounded_by_total_len() {
        let mut bytes = vec![0u8; 60];
        bytes[..24].copy_from_slice(&PACKET_BYTES);
        let packet = Packet::new(&bytes[..]).unwrap();
        assert_eq!(packet.payload().len(), 4);
    }

    #[test]
    fn test_reject_truncated() {
        assert!(Packet::new(&PACKET_BYTES[..22]).is_err());
        let mut bytes = PACKET_BYTES;
        bytes[0] = 0x44; // IHL below minimum
        assert!(Packet::new(&bytes[..]).is_err());
    }

    #[test]
    fn test_emit_checksum_verifies() {
        let repr = Repr {
            src_addr: Ipv4Addr::new(192, 168, 0, 2),
            dst_addr: Ipv4Addr::new(192, 168, 0, 12),
            protocol: Protocol::Tcp,
            payload_len: 20,
            ttl: 10,
        };
        let mut bytes = vec![0u8; repr.buffer_len()];
        repr.emit(&mut bytes).unwrap();

        let packet = Packet::new(&bytes[..]).unwrap();
        assert_eq!(packet.total_len(), 40);
        assert_ne!(packet.checksum(), 0);
        assert_eq!(checksum(&bytes[..HEADER_LEN]), 0);
    }
}
