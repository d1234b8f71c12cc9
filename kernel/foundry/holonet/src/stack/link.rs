//! Ethernet layer of the stack.
use super::Stack;
use crate::{
    NetworkError, NetworkResult,
    l2::ethernet::{EtherType, Frame, HEADER_LEN, MacAddress, Repr},
    packet::{Handler, PacketBuf},
};

impl Stack {
    /// Send `payload` to `dst_addr` in a single Ethernet frame.
    ///
    /// # Errors
    ///
    /// Returns the error of the link driver if it refuses the frame.
    pub fn link_transmit(
        &self,
        dst_addr: MacAddress,
        ethertype: EtherType,
        payload: &[u8],
    ) -> NetworkResult<()> {
        let header = Repr {
            src_addr: self.config.mac,
            dst_addr,
            ethertype,
        }
        .to_bytes();

        self.nic.with_locked(|nic| nic.transmit(&header, payload))?;
        self.stats.frame_sent();
        Ok(())
    }
}

pub(crate) fn ethernet_rx(stack: &Stack, packet: &mut PacketBuf) {
    let parsed = Frame::new(packet.payload()).and_then(|frame| Repr::parse(&frame));

    let next = match parsed {
        Ok(repr) => match repr.ethertype {
            EtherType::Arp => Handler::Arp,
            EtherType::Ipv4 => Handler::Ipv4,
        },
        Err(NetworkError::Unsupported) => {
            stack.stats.unknown_ethertype();
            Handler::Drop
        }
        Err(_) => Handler::Drop,
    };

    packet.advance(HEADER_LEN);
    packet.set_handler(next);
}
