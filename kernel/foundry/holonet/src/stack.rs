//! The network stack context.
//!
//! Every table the protocol layers share (protocol registry, ARP table, pending
//! requests, TX queue, UDP listeners, TCP control blocks) is a field of
//! [`Stack`], which is meant to be shared behind an `Arc` between the RX task,
//! the TX task, the tick handler and the application tasks.
use crate::{
    NetConfig, Nic, NetworkResult,
    packet::{Handler, PacketBuf},
    protocol::{ProtocolDescriptor, Registry},
    stats::{Stats, StatsSnapshot},
};
use alloc::boxed::Box;
use hyperdrive::{
    locks::irq::IrqLock,
    queues::slot::SlotList,
    sync::{WaitQueue, block_until},
};

pub mod arp;
pub mod ipv4;
pub mod link;
pub mod tcp;
pub mod udp;

pub struct Stack {
    config: NetConfig,
    nic: IrqLock<Box<dyn Nic + Send>>,
    protocols: Registry,
    rx_queue: IrqLock<SlotList<PacketBuf>>,
    rx_waitq: WaitQueue,
    arp: arp::Arp,
    ipv4: ipv4::Ipv4,
    udp: udp::Udp,
    tcp: tcp::Tcp,
    stats: Stats,
}

impl core::fmt::Debug for Stack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("config", &self.config)
            .field("protocols", &self.protocols.len())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl Stack {
    #[must_use]
    /// Create a stack on top of `nic`.
    ///
    /// No protocol is registered yet, see [`Self::register_default_protocols`].
    pub fn new(config: NetConfig, nic: impl Nic + Send + 'static) -> Self {
        Self {
            config,
            nic: IrqLock::new(Box::new(nic)),
            protocols: Registry::new(),
            rx_queue: IrqLock::new(SlotList::new()),
            rx_waitq: WaitQueue::new(),
            arp: arp::Arp::new(),
            ipv4: ipv4::Ipv4::new(),
            udp: udp::Udp::new(),
            tcp: tcp::Tcp::new(),
            stats: Stats::new(),
        }
    }

    #[must_use]
    #[inline]
    pub const fn config(&self) -> &NetConfig {
        &self.config
    }

    #[must_use]
    #[inline]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Register a receive handler.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the registry cannot grow.
    pub fn register_protocol(&self, descriptor: ProtocolDescriptor) -> NetworkResult<()> {
        self.protocols.register(descriptor)
    }

    /// Register the Ethernet, ARP, IPv4, UDP and TCP receive handlers.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the registry cannot grow.
    pub fn register_default_protocols(&self) -> NetworkResult<()> {
        let descriptors = [
            ProtocolDescriptor {
                handler: Handler::Ethernet,
                rx: link::ethernet_rx,
            },
            ProtocolDescriptor {
                handler: Handler::Arp,
                rx: arp::arp_rx,
            },
            ProtocolDescriptor {
                handler: Handler::Ipv4,
                rx: ipv4::ipv4_rx,
            },
            ProtocolDescriptor {
                handler: Handler::Udp,
                rx: udp::udp_rx,
            },
            ProtocolDescriptor {
                handler: Handler::Tcp,
                rx: tcp::tcp_rx,
            },
        ];
        for descriptor in descriptors {
            self.protocols.register(descriptor)?;
        }
        Ok(())
    }

    /// Hand a received frame over to the stack.
    ///
    /// The frame is copied, so the driver can recycle its buffer as soon as
    /// this returns. This is safe to call from interrupt context.
    pub fn frame_received(&self, frame: &[u8]) {
        self.stats.frame_received();

        let packet = match PacketBuf::try_from_slice(frame) {
            Ok(packet) => packet,
            Err(err) => {
                self.stats.out_of_memory();
                log::warn!("Dropping received frame: {err}");
                return;
            }
        };

        let queued = self
            .rx_queue
            .with_locked(|queue| queue.add_tail(packet).is_ok());
        if queued {
            self.rx_waitq.wake_all();
        } else {
            self.stats.out_of_memory();
            log::warn!("RX queue is full, dropping frame");
        }
    }

    #[must_use]
    #[inline]
    /// Number of received frames waiting for the RX task.
    pub fn rx_pending(&self) -> usize {
        self.rx_queue.with_locked(|queue| queue.len())
    }

    /// Dispatch every queued frame. Returns how many were processed.
    pub fn process_pending_frames(&self) -> usize {
        let mut processed = 0;
        while let Some(packet) = self.rx_queue.with_locked(SlotList::pop_head) {
            self.dispatch(packet);
            processed += 1;
        }
        processed
    }

    /// Body of the RX task: sleeps until frames are queued, then dispatches them.
    pub async fn rx_task(&self) {
        loop {
            block_until(&self.rx_waitq, || {
                self.rx_queue.with_locked(|queue| !queue.is_empty())
            })
            .await;
            self.process_pending_frames();
        }
    }

    /// Run a packet through the receive handlers until it is dropped.
    fn dispatch(&self, mut packet: PacketBuf) {
        loop {
            let handler = packet.handler();
            if handler == Handler::Drop {
                break;
            }

            let Some(rx) = self.protocols.lookup(handler) else {
                self.stats.unhandled();
                log::trace!("No handler registered for {handler:?}");
                packet.set_handler(Handler::Drop);
                continue;
            };

            rx(self, &mut packet);

            if packet.handler() == handler {
                // Consumed by a terminal layer.
                packet.set_handler(Handler::Drop);
            }
        }
    }
}
