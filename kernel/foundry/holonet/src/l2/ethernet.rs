//! Ethernet II framing.
use crate::{
    NetworkError, NetworkResult,
    utils::{read_be16, write_be16},
};

const DESTINATION: core::ops::Range<usize> = 0..6;
const SOURCE: core::ops::Range<usize> = 6..12;
/// Offset of the `EtherType` field.
const ETHERTYPE: usize = 12;

/// The Ethernet header length
pub const HEADER_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
/// Ethernet protocol type.
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
}

impl TryFrom<u16> for EtherType {
    type Error = NetworkError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0800 => Ok(Self::Ipv4),
            0x0806 => Ok(Self::Arp),
            _ => Err(NetworkError::Unsupported),
        }
    }
}

impl From<EtherType> for u16 {
    fn from(value: EtherType) -> Self {
        value as Self
    }
}

/// A six-octet Ethernet II address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The broadcast address.
    pub const BROADCAST: Self = Self([0xff; 6]);
    /// The all-zero address, used for unknown targets.
    pub const UNSPECIFIED: Self = Self([0; 6]);

    #[must_use]
    #[inline]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    #[must_use]
    /// Copy an address out of the first six octets of `data`.
    ///
    /// Returns `None` if `data` is shorter than six octets.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        data.get(..6)
            .and_then(|bytes| bytes.try_into().ok())
            .map(Self)
    }

    #[must_use]
    #[inline]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    #[must_use]
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl core::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// A read/write wrapper around an Ethernet II frame buffer.
#[derive(Debug, Clone)]
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Frame<T> {
    #[must_use]
    #[inline]
    pub const fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// # Errors
    ///
    /// Returns `Invalid` if the buffer is shorter than a header.
    pub fn new(buffer: T) -> NetworkResult<Self> {
        if buffer.as_ref().len() < HEADER_LEN {
            return Err(NetworkError::Invalid);
        }
        Ok(Self::new_unchecked(buffer))
    }

    #[must_use]
    #[inline]
    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[must_use]
    #[inline]
    pub fn dst_addr(&self) -> MacAddress {
        MacAddress(self.buffer.as_ref()[DESTINATION].try_into().unwrap_or_default())
    }

    #[must_use]
    #[inline]
    pub fn src_addr(&self) -> MacAddress {
        MacAddress(self.buffer.as_ref()[SOURCE].try_into().unwrap_or_default())
    }

    #[must_use]
    #[inline]
    /// Return the raw `EtherType` field, in host order.
    pub fn ethertype(&self) -> u16 {
        read_be16(self.buffer.as_ref(), ETHERTYPE)
    }

    #[must_use]
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[HEADER_LEN..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Frame<T> {
    #[inline]
    pub fn set_dst_addr(&mut self, value: MacAddress) {
        self.buffer.as_mut()[DESTINATION].copy_from_slice(&value.octets());
    }

    #[inline]
    pub fn set_src_addr(&mut self, value: MacAddress) {
        self.buffer.as_mut()[SOURCE].copy_from_slice(&value.octets());
    }

    #[inline]
    pub fn set_ethertype(&mut self, value: EtherType) {
        write_be16(self.buffer.as_mut(), ETHERTYPE, value.into());
    }
}

/// A high-level representation of an Ethernet II header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr: MacAddress,
    pub dst_addr: MacAddress,
    pub ethertype: EtherType,
}

impl Repr {
    /// Parse an Ethernet II frame header.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if the `EtherType` is neither IPv4 nor ARP.
    pub fn parse<T: AsRef<[u8]>>(frame: &Frame<T>) -> NetworkResult<Self> {
        Ok(Self {
            src_addr: frame.src_addr(),
            dst_addr: frame.dst_addr(),
            ethertype: EtherType::try_from(frame.ethertype())?,
        })
    }

    /// Return the header as it appears on the wire.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut header = [0; HEADER_LEN];
        let mut frame = Frame::new_unchecked(&mut header[..]);
        frame.set_dst_addr(self.dst_addr);
        frame.set_src_addr(self.src_addr);
        frame.set_ethertype(self.ethertype);
        header
    }
}
