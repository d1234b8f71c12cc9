//! IPv4 layer of the stack.
//!
//! Outgoing datagrams are not sent by the caller: they are queued and the TX
//! task sends them once the MAC address of their next hop is known, because
//! resolving it may have to wait for the network.
use super::Stack;
use crate::{
    NetworkError, NetworkResult,
    l2::ethernet::EtherType,
    l3::ip::{self, HEADER_LEN, Ipv4Addr, Protocol},
    packet::{Handler, Ipv4Info, PacketBuf},
};
use alloc::vec::Vec;
use hyperdrive::{
    locks::irq::IrqLock,
    queues::slot::SlotList,
    sync::{WaitQueue, block_until},
};

/// TTL of every emitted datagram.
pub const DEFAULT_TTL: u8 = 10;

#[derive(Debug)]
struct PendingTransmit {
    protocol: Protocol,
    dst_addr: Ipv4Addr,
    /// Header room followed by the payload.
    datagram: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct Ipv4 {
    tx_queue: IrqLock<SlotList<PendingTransmit>>,
    waitq: WaitQueue,
}

impl Ipv4 {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tx_queue: IrqLock::new(SlotList::new()),
            waitq: WaitQueue::new(),
        }
    }
}

impl Stack {
    /// Queue `payload` for transmission to `dst_addr`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the payload cannot be copied or queued.
    pub fn ipv4_send(&self, protocol: Protocol, dst_addr: Ipv4Addr, payload: &[u8]) -> NetworkResult<()> {
        let mut datagram = self.ipv4_buffer(payload.len())?;
        datagram[HEADER_LEN..].copy_from_slice(payload);
        self.ipv4_enqueue(protocol, dst_addr, datagram)
    }

    /// Allocate a zeroed datagram with room for the IPv4 header in front of
    /// `payload_len` bytes.
    pub(crate) fn ipv4_buffer(&self, payload_len: usize) -> NetworkResult<Vec<u8>> {
        let len = HEADER_LEN + payload_len;
        let mut datagram = Vec::new();
        if datagram.try_reserve_exact(len).is_err() {
            self.stats.out_of_memory();
            return Err(NetworkError::OutOfMemory);
        }
        datagram.resize(len, 0);
        Ok(datagram)
    }

    pub(crate) fn ipv4_enqueue(
        &self,
        protocol: Protocol,
        dst_addr: Ipv4Addr,
        datagram: Vec<u8>,
    ) -> NetworkResult<()> {
        let pending = PendingTransmit {
            protocol,
            dst_addr,
            datagram,
        };
        if self
            .ipv4
            .tx_queue
            .with_locked(|queue| queue.add_tail(pending))
            .is_err()
        {
            self.stats.out_of_memory();
            return Err(NetworkError::OutOfMemory);
        }
        self.ipv4.waitq.wake_all();
        Ok(())
    }

    #[must_use]
    #[inline]
    /// Number of datagrams waiting for the TX task.
    pub fn tx_pending(&self) -> usize {
        self.ipv4.tx_queue.with_locked(|queue| queue.len())
    }

    /// Body of the TX task: sends queued datagrams in order.
    pub async fn tx_task(&self) {
        loop {
            block_until(&self.ipv4.waitq, || {
                self.ipv4.tx_queue.with_locked(|queue| !queue.is_empty())
            })
            .await;

            while let Some(pending) = self.ipv4.tx_queue.with_locked(SlotList::pop_head) {
                self.ipv4_transmit(pending).await;
            }
        }
    }

    async fn ipv4_transmit(&self, pending: PendingTransmit) {
        let PendingTransmit {
            protocol,
            dst_addr,
            mut datagram,
        } = pending;

        let next_hop = self.config.next_hop(dst_addr);
        let mac = match self.arp_resolve(next_hop).await {
            Ok(mac) => mac,
            Err(err) => {
                self.stats.unresolved();
                log::debug!("Dropping datagram to {dst_addr}, next hop {next_hop}: {err}");
                return;
            }
        };

        let repr = ip::Repr {
            src_addr: self.config.ip,
            dst_addr,
            protocol,
            payload_len: datagram.len() - HEADER_LEN,
            ttl: DEFAULT_TTL,
        };
        let sent = repr
            .emit(&mut datagram)
            .and_then(|()| self.link_transmit(mac, EtherType::Ipv4, &datagram));
        if let Err(err) = sent {
            log::warn!("Failed to send datagram to {dst_addr}: {err}");
        }
    }
}

pub(crate) fn ipv4_rx(stack: &Stack, packet: &mut PacketBuf) {
    let header = ip::Packet::new(packet.payload()).map(|datagram| {
        (
            datagram.version(),
            datagram.ttl(),
            datagram.protocol(),
            datagram.header_len(),
            usize::from(datagram.total_len()),
            Ipv4Info {
                src_addr: datagram.src_addr(),
                dst_addr: datagram.dst_addr(),
            },
        )
    });

    let Ok((version, ttl, protocol, header_len, total_len, info)) = header else {
        stack.stats.ipv4_dropped();
        packet.set_handler(Handler::Drop);
        return;
    };

    if version != 4 || ttl == 0 || info.dst_addr != stack.config.ip {
        stack.stats.ipv4_dropped();
        log::trace!("Dropping datagram from {} to {}", info.src_addr, info.dst_addr);
        packet.set_handler(Handler::Drop);
        return;
    }

    let next = match Protocol::try_from(protocol) {
        Ok(Protocol::Tcp) => Handler::Tcp,
        Ok(Protocol::Udp) => Handler::Udp,
        Err(_) => {
            stack.stats.ipv4_dropped();
            Handler::Drop
        }
    };

    packet.set_ipv4(info);
    packet.truncate(total_len);
    packet.advance(header_len);
    packet.set_handler(next);
}
