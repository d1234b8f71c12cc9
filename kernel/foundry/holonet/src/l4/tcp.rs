//! TCP header.
use crate::{
    NetworkError, NetworkResult,
    l3::ip::{Ipv4Addr, Protocol},
    utils::{Checksum, read_be16, read_be32, write_be16, write_be32},
};

const SOURCE_PORT: usize = 0;
const DEST_PORT: usize = 2;
const SEQUENCE_NUM: usize = 4;
const ACK_NUM: usize = 8;
const DATA_OFFSET: usize = 12;
const FLAGS: usize = 13;
const WINDOW_SIZE: usize = 14;
const CHECKSUM: usize = 16;

/// Length of the TCP header without options.
pub const HEADER_LEN: usize = 20;
/// `HEADER_LEN` in 32-bit words, as stored in the data offset field.
const HEADER_WORDS: u8 = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
/// TCP control bits, as laid out in the flags octet.
pub struct Flags(u8);

impl Flags {
    pub const FIN: Self = Self(0x01);
    pub const SYN: Self = Self(0x02);
    pub const RST: Self = Self(0x04);
    pub const PSH: Self = Self(0x08);
    pub const ACK: Self = Self(0x10);
    pub const URG: Self = Self(0x20);
    pub const ECE: Self = Self(0x40);
    pub const CWR: Self = Self(0x80);

    #[must_use]
    #[inline]
    pub const fn from_bits(value: u8) -> Self {
        Self(value)
    }

    #[must_use]
    #[inline]
    pub const fn to_bits(self) -> u8 {
        self.0
    }

    #[must_use]
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    #[inline]
    pub const fn fin(self) -> bool {
        self.contains(Self::FIN)
    }

    #[must_use]
    #[inline]
    pub const fn syn(self) -> bool {
        self.contains(Self::SYN)
    }

    #[must_use]
    #[inline]
    pub const fn rst(self) -> bool {
        self.contains(Self::RST)
    }

    #[must_use]
    #[inline]
    pub const fn ack(self) -> bool {
        self.contains(Self::ACK)
    }
}

impl core::ops::BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A read/write wrapper around a TCP segment buffer.
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
    /// Returns `Invalid` if the buffer is too short for the header, or the data
    /// offset points outside of the buffer.
    pub fn new(buffer: T) -> NetworkResult<Self> {
        let packet = Self::new_unchecked(buffer);
        let len = packet.buffer.as_ref().len();
        if len < HEADER_LEN {
            return Err(NetworkError::Invalid);
        }
        let header_len = packet.header_len();
        if header_len < HEADER_LEN || header_len > len {
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
    pub fn seq_number(&self) -> u32 {
        read_be32(self.buffer.as_ref(), SEQUENCE_NUM)
    }

    #[must_use]
    #[inline]
    pub fn ack_number(&self) -> u32 {
        read_be32(self.buffer.as_ref(), ACK_NUM)
    }

    #[must_use]
    #[inline]
    /// Return the header length in octets (data offset × 4).
    pub fn header_len(&self) -> usize {
        usize::from(self.buffer.as_ref()[DATA_OFFSET] >> 4) * 4
    }

    #[must_use]
    #[inline]
    pub fn flags(&self) -> Flags {
        Flags::from_bits(self.buffer.as_ref()[FLAGS])
    }

    #[must_use]
    #[inline]
    pub fn window_len(&self) -> u16 {
        read_be16(self.buffer.as_ref(), WINDOW_SIZE)
    }

    #[must_use]
    #[inline]
    pub fn checksum(&self) -> u16 {
        read_be16(self.buffer.as_ref(), CHECKSUM)
    }

    #[must_use]
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[self.header_len()..]
    }
}

/// A high-level representation of an option-less TCP header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_number: u32,
    pub ack_number: u32,
    pub flags: Flags,
    pub window_len: u16,
}

impl Repr {
    /// Parse the fixed header fields of a segment.
    #[must_use]
    pub fn parse<T: AsRef<[u8]>>(packet: &Packet<T>) -> Self {
        Self {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            seq_number: packet.seq_number(),
            ack_number: packet.ack_number(),
            flags: packet.flags(),
            window_len: packet.window_len(),
        }
    }

    /// Write the header into `segment`, whose tail already holds the payload,
    /// and fill the checksum over the IPv4 pseudo-header, header and payload.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the segment is shorter than a header or longer
    /// than a length field can describe.
    pub fn emit(&self, segment: &mut [u8], src_addr: Ipv4Addr, dst_addr: Ipv4Addr) -> NetworkResult<()> {
        if segment.len() < HEADER_LEN {
            return Err(NetworkError::Invalid);
        }
        let tcp_len = u16::try_from(segment.len()).map_err(|_| NetworkError::Invalid)?;

        let header = &mut segment[..HEADER_LEN];
        header.fill(0);
        write_be16(header, SOURCE_PORT, self.src_port);
        write_be16(header, DEST_PORT, self.dst_port);
        write_be32(header, SEQUENCE_NUM, self.seq_number);
        write_be32(header, ACK_NUM, self.ack_number);
        header[DATA_OFFSET] = HEADER_WORDS << 4;
        header[FLAGS] = self.flags.to_bits();
        write_be16(header, WINDOW_SIZE, self.window_len);

        let sum = Checksum::new()
            .add(&pseudo_header(src_addr, dst_addr, tcp_len))
            .add(segment)
            .finish();
        write_be16(segment, CHECKSUM, sum);
        Ok(())
    }
}

/// IPv4 pseudo-header covered by the TCP checksum.
#[must_use]
pub fn pseudo_header(src_addr: Ipv4Addr, dst_addr: Ipv4Addr, tcp_len: u16) -> [u8; 12] {
    let mut pseudo = [0; 12];
    write_be32(&mut pseudo, 0, src_addr.to_bits());
    write_be32(&mut pseudo, 4, dst_addr.to_bits());
    pseudo[9] = Protocol::Tcp.into();
    write_be16(&mut pseudo, 10, tcp_len);
    pseudo
}
