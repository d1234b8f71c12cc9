//! ARP resolver.
//!
//! Resolved addresses are appended to a table that is never pruned. A lookup
//! miss broadcasts a request and parks the caller on the ARP wait queue until
//! a reply comes in or [`Stack::arp_tick`] gives up on the request.
use super::Stack;
use crate::{
    NetworkError, NetworkResult,
    l2::ethernet::{EtherType, MacAddress},
    l3::{arp as wire, ip::Ipv4Addr},
    packet::{Handler, PacketBuf},
};
use hyperdrive::{
    locks::irq::IrqLock,
    queues::slot::{SlotKey, SlotList},
    sync::{WaitQueue, block_until},
};

/// Number of ticks an unanswered request is waited for.
pub const ARP_TIMEOUT_TICKS: u32 = 250;

#[derive(Debug, Clone, Copy)]
struct ArpEntry {
    mac: MacAddress,
    ip: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Requested,
    Resolved(MacAddress),
    TimedOut,
}

#[derive(Debug)]
struct PendingRequest {
    target: Ipv4Addr,
    ticks: u32,
    state: RequestState,
}

impl PendingRequest {
    #[must_use]
    #[inline]
    const fn is_finished(&self) -> bool {
        !matches!(self.state, RequestState::Requested)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Arp {
    table: IrqLock<SlotList<ArpEntry>>,
    pending: IrqLock<SlotList<PendingRequest>>,
    waitq: WaitQueue,
}

impl Arp {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            table: IrqLock::new(SlotList::new()),
            pending: IrqLock::new(SlotList::new()),
            waitq: WaitQueue::new(),
        }
    }
}

/// Removes a pending request when its resolve call ends, even early.
struct PendingGuard<'a> {
    pending: &'a IrqLock<SlotList<PendingRequest>>,
    key: SlotKey,
}

impl PendingGuard<'_> {
    fn take(&self) -> Option<PendingRequest> {
        self.pending.with_locked(|pending| pending.remove(self.key))
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.take();
    }
}

impl Stack {
    #[must_use]
    /// Look `ip` up in the ARP table, without sending anything.
    pub fn arp_lookup(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        self.arp.table.with_locked(|table| {
            table
                .iter()
                .find(|(_, entry)| entry.ip == ip)
                .map(|(_, entry)| entry.mac)
        })
    }

    #[must_use]
    #[inline]
    pub fn arp_table_len(&self) -> usize {
        self.arp.table.with_locked(|table| table.len())
    }

    #[must_use]
    #[inline]
    /// Number of requests still registered, answered or not.
    pub fn arp_pending_len(&self) -> usize {
        self.arp.pending.with_locked(|pending| pending.len())
    }

    /// Find the MAC address of `ip`, asking the network if it is not known yet.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if no reply arrives within [`ARP_TIMEOUT_TICKS`],
    /// `OutOfMemory` if the request cannot be registered, or the link error if
    /// the request cannot be sent.
    pub async fn arp_resolve(&self, ip: Ipv4Addr) -> NetworkResult<MacAddress> {
        if let Some(mac) = self.arp_lookup(ip) {
            return Ok(mac);
        }

        // Registered before the request goes out, so that a fast reply finds it.
        let key = self
            .arp
            .pending
            .with_locked(|pending| {
                pending.add_tail(PendingRequest {
                    target: ip,
                    ticks: 0,
                    state: RequestState::Requested,
                })
            })
            .map_err(|_| {
                self.stats.out_of_memory();
                NetworkError::OutOfMemory
            })?;
        let guard = PendingGuard {
            pending: &self.arp.pending,
            key,
        };

        let request = wire::Repr {
            operation: wire::Operation::Request,
            source_hardware_addr: self.config.mac,
            source_protocol_addr: self.config.ip,
            target_hardware_addr: MacAddress::UNSPECIFIED,
            target_protocol_addr: ip,
        };
        self.link_transmit(MacAddress::BROADCAST, EtherType::Arp, &request.to_bytes())?;
        log::trace!("ARP request sent for {ip}");

        block_until(&self.arp.waitq, || {
            self.arp.pending.with_locked(|pending| {
                pending
                    .get(key)
                    .is_none_or(PendingRequest::is_finished)
            })
        })
        .await;

        match guard.take().map(|request| request.state) {
            Some(RequestState::Resolved(mac)) => Ok(mac),
            Some(_) => Err(NetworkError::TimedOut),
            // Answered requests leave the list once their address is in the table.
            None => self.arp_lookup(ip).ok_or(NetworkError::TimedOut),
        }
    }

    /// Age pending requests by one tick, timing out the oldest ones.
    pub fn arp_tick(&self) {
        let expired = self.arp.pending.with_locked(|pending| {
            let mut expired = false;
            pending.for_each_mut(|_, request| {
                if request.is_finished() {
                    return;
                }
                request.ticks += 1;
                if request.ticks >= ARP_TIMEOUT_TICKS {
                    log::debug!("ARP request for {} timed out", request.target);
                    request.state = RequestState::TimedOut;
                    expired = true;
                }
            });
            expired
        });

        if expired {
            self.arp.waitq.wake_all();
        }
    }

    fn arp_reply_received(&self, ip: Ipv4Addr, mac: MacAddress) {
        let awaited = |request: &PendingRequest| !request.is_finished() && request.target == ip;

        let matched = self
            .arp
            .pending
            .with_locked(|pending| pending.iter().any(|(_, request)| awaited(request)));
        if !matched {
            return;
        }

        log::debug!("ARP resolved {ip} to {mac}");
        let recorded = self
            .arp
            .table
            .with_locked(|table| table.add_tail(ArpEntry { mac, ip }))
            .is_ok();
        if !recorded {
            self.stats.out_of_memory();
        }

        self.arp.pending.with_locked(|pending| {
            pending.retain(|_, request| {
                if !awaited(request) {
                    return true;
                }
                if recorded {
                    return false;
                }
                // The table is full: the waiter reads the address from its request.
                request.state = RequestState::Resolved(mac);
                true
            });
        });
        self.arp.waitq.wake_all();
    }

    fn arp_reply_to(&self, request: &wire::Repr) {
        let reply = wire::Repr {
            operation: wire::Operation::Reply,
            source_hardware_addr: self.config.mac,
            source_protocol_addr: self.config.ip,
            target_hardware_addr: request.source_hardware_addr,
            target_protocol_addr: request.source_protocol_addr,
        };
        if let Err(err) = self.link_transmit(
            request.source_hardware_addr,
            EtherType::Arp,
            &reply.to_bytes(),
        ) {
            log::debug!("Failed to answer ARP request: {err}");
        }
    }
}

pub(crate) fn arp_rx(stack: &Stack, packet: &mut PacketBuf) {
    let parsed = wire::Packet::new(packet.payload()).and_then(|arp| wire::Repr::parse(&arp));
    packet.set_handler(Handler::Drop);

    let repr = match parsed {
        Ok(repr) => repr,
        Err(err) => {
            log::trace!("Dropping ARP packet: {err}");
            return;
        }
    };

    match repr.operation {
        wire::Operation::Request if repr.target_protocol_addr == stack.config.ip => {
            stack.arp_reply_to(&repr);
        }
        wire::Operation::Reply if repr.target_hardware_addr == stack.config.mac => {
            stack.arp_reply_received(repr.source_protocol_addr, repr.source_hardware_addr);
        }
        _ => {}
    }
}
