//! ARP packets for Ethernet/IPv4.
//!
//! Only the Ethernet hardware type with IPv4 protocol addresses is handled, so
//! the layout is fixed at 28 octets.
use crate::{
    NetworkError, NetworkResult,
    l2::ethernet::{EtherType, MacAddress},
    l3::ip::Ipv4Addr,
    utils::{read_be16, read_be32, write_be16, write_be32},
};

const HARDWARE_TYPE: usize = 0;
const PROTOCOL_TYPE: usize = 2;
const HARDWARE_LEN: usize = 4;
const PROTOCOL_LEN: usize = 5;
const OPERATION: usize = 6;
const SENDER_HW: core::ops::Range<usize> = 8..14;
const SENDER_PROTO: usize = 14;
const TARGET_HW: core::ops::Range<usize> = 18..24;
const TARGET_PROTO: usize = 24;

/// Length of an Ethernet/IPv4 ARP packet.
pub const PACKET_LEN: usize = 28;

/// ARP hardware type for Ethernet.
const HARDWARE_ETHERNET: u16 = 1;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[repr(u16)]
/// ARP operation type.
pub enum Operation {
    Request = 1,
    Reply = 2,
}

impl TryFrom<u16> for Operation {
    type Error = NetworkError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Self::Request),
            2 => Ok(Self::Reply),
            _ => Err(NetworkError::Invalid),
        }
    }
}

/// A read/write wrapper around an ARP packet buffer.
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
    /// Returns `Invalid` if the buffer is too short.
    pub fn new(buffer: T) -> NetworkResult<Self> {
        if buffer.as_ref().len() < PACKET_LEN {
            return Err(NetworkError::Invalid);
        }
        Ok(Self::new_unchecked(buffer))
    }

    #[must_use]
    #[inline]
    pub fn hardware_type(&self) -> u16 {
        read_be16(self.buffer.as_ref(), HARDWARE_TYPE)
    }

    #[must_use]
    #[inline]
    pub fn protocol_type(&self) -> u16 {
        read_be16(self.buffer.as_ref(), PROTOCOL_TYPE)
    }

    #[must_use]
    #[inline]
    pub fn hardware_len(&self) -> u8 {
        self.buffer.as_ref()[HARDWARE_LEN]
    }

    #[must_use]
    #[inline]
    pub fn protocol_len(&self) -> u8 {
        self.buffer.as_ref()[PROTOCOL_LEN]
    }

    #[must_use]
    #[inline]
    pub fn operation(&self) -> u16 {
        read_be16(self.buffer.as_ref(), OPERATION)
    }

    #[must_use]
    #[inline]
    pub fn sender_hardware_addr(&self) -> MacAddress {
        MacAddress(self.buffer.as_ref()[SENDER_HW].try_into().unwrap_or_default())
    }

    #[must_use]
    #[inline]
    pub fn sender_protocol_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(read_be32(self.buffer.as_ref(), SENDER_PROTO))
    }

    #[must_use]
    #[inline]
    pub fn target_hardware_addr(&self) -> MacAddress {
        MacAddress(self.buffer.as_ref()[TARGET_HW].try_into().unwrap_or_default())
    }

    #[must_use]
    #[inline]
    pub fn target_protocol_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(read_be32(self.buffer.as_ref(), TARGET_PROTO))
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Fill the fixed Ethernet/IPv4 fields and the operation.
    pub fn set_header(&mut self, operation: Operation) {
        let data = self.buffer.as_mut();
        write_be16(data, HARDWARE_TYPE, HARDWARE_ETHERNET);
        write_be16(data, PROTOCOL_TYPE, EtherType::Ipv4.into());
        data[HARDWARE_LEN] = 6;
        data[PROTOCOL_LEN] = 4;
        write_be16(data, OPERATION, operation as u16);
    }

    #[inline]
    pub fn set_sender(&mut self, mac: MacAddress, ip: Ipv4Addr) {
        let data = self.buffer.as_mut();
        data[SENDER_HW].copy_from_slice(&mac.octets());
        write_be32(data, SENDER_PROTO, ip.to_bits());
    }

    #[inline]
    pub fn set_target(&mut self, mac: MacAddress, ip: Ipv4Addr) {
        let data = self.buffer.as_mut();
        data[TARGET_HW].copy_from_slice(&mac.octets());
        write_be32(data, TARGET_PROTO, ip.to_bits());
    }
}

/// A high-level representation of an Ethernet/IPv4 ARP packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub operation: Operation,
    pub source_hardware_addr: MacAddress,
    pub source_protocol_addr: Ipv4Addr,
    pub target_hardware_addr: MacAddress,
    pub target_protocol_addr: Ipv4Addr,
}

impl Repr {
    /// Parse an ARP packet.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for anything other than Ethernet/IPv4,
    /// and `Invalid` for an unknown operation.
    pub fn parse<T: AsRef<[u8]>>(packet: &Packet<T>) -> NetworkResult<Self> {
        if packet.hardware_type() != HARDWARE_ETHERNET
            || packet.protocol_type() != u16::from(EtherType::Ipv4)
            || packet.hardware_len() != 6
            || packet.protocol_len() != 4
        {
            return Err(NetworkError::Unsupported);
        }

        Ok(Self {
            operation: Operation::try_from(packet.operation())?,
            source_hardware_addr: packet.sender_hardware_addr(),
            source_protocol_addr: packet.sender_protocol_addr(),
            target_hardware_addr: packet.target_hardware_addr(),
            target_protocol_addr: packet.target_protocol_addr(),
        })
    }

    /// Return the packet as it appears on the wire.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let mut bytes = [0; PACKET_LEN];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.set_header(self.operation);
        packet.set_sender(self.source_hardware_addr, self.source_protocol_addr);
        packet.set_target(self.target_hardware_addr, self.target_protocol_addr);
        bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static REQUEST_BYTES: [u8; 28] = [
        0x00, 0x01, // Ethernet
        0x08, 0x00, // IPv4
        0x06, 0x04, // Lengths
        0x00, 0x01, // Request
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, // SHA
        0xc0, 0xa8, 0x00, 0x02, // SPA
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // THA
        0xc0, 0xa8, 0x00, 0x0c, // TPA
    ];

    #[test]
    fn test_parse_request() {
        let packet = Packet::new(&REQUEST_BYTES[..]).unwrap();
        let repr = Repr::parse(&packet).unwrap();

        assert_eq!(repr.operation, Operation::Request);
        assert_eq!(repr.source_hardware_addr, MacAddress([0, 1, 2, 3, 4, 5]));
        assert_eq!(repr.source_protocol_addr, Ipv4Addr::new(192, 168, 0, 2));
        assert_eq!(repr.target_hardware_addr, MacAddress::UNSPECIFIED);
        assert_eq!(repr.target_protocol_addr, Ipv4Addr::new(192, 168, 0, 12));
    }

    #[test]
    fn test_emit_request() {
        let repr = Repr {
            operation: Operation::Request,
            source_hardware_addr: MacAddress([0, 1, 2, 3, 4, 5]),
            source_protocol_addr: Ipv4Addr::new(192, 168, 0, 2),
            target_hardware_addr: MacAddress::UNSPECIFIED,
            target_protocol_addr: Ipv4Addr::new(192, 168, 0, 12),
        };
        assert_eq!(repr.to_bytes(), REQUEST_BYTES);
    }

    #[test]
    fn test_reject_foreign_hardware() {
        let mut bytes = REQUEST_BYTES;
        bytes[1] = 6; // IEEE 802
        let packet = Packet::new(&bytes[..]).unwrap();
        assert_eq!(Repr::parse(&packet), Err(NetworkError::Unsupported));

        let mut bytes = REQUEST_BYTES;
        bytes[7] = 3; // RARP request
        let packet = Packet::new(&bytes[..]).unwrap();
        assert_eq!(Repr::parse(&packet), Err(NetworkError::Invalid));
    }
}
