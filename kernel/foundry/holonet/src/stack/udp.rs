//! UDP layer of the stack.
use super::Stack;
use crate::{
    NetworkError, NetworkResult,
    l3::ip::{self, Ipv4Addr, Protocol},
    l4::udp::{HEADER_LEN, Packet, Repr},
    packet::{Handler, PacketBuf},
};
use alloc::vec::Vec;
use hyperdrive::{
    locks::irq::IrqLock,
    queues::slot::{SlotKey, SlotList},
    sync::{WaitQueue, block_until},
};

#[derive(Debug)]
struct Listener {
    port: u16,
    buffer: Vec<u8>,
    filled: usize,
}

impl Listener {
    #[must_use]
    #[inline]
    const fn is_full(&self) -> bool {
        self.filled == self.buffer.len()
    }

    /// Append as much of `payload` as still fits.
    fn deliver(&mut self, payload: &[u8]) {
        let count = (self.buffer.len() - self.filled).min(payload.len());
        self.buffer[self.filled..self.filled + count].copy_from_slice(&payload[..count]);
        self.filled += count;
    }
}

#[derive(Debug, Default)]
pub(crate) struct Udp {
    listeners: IrqLock<SlotList<Listener>>,
    waitq: WaitQueue,
}

impl Udp {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            listeners: IrqLock::new(SlotList::new()),
            waitq: WaitQueue::new(),
        }
    }
}

struct ListenerGuard<'a> {
    listeners: &'a IrqLock<SlotList<Listener>>,
    key: SlotKey,
}

impl ListenerGuard<'_> {
    fn take(&self) -> Option<Listener> {
        self.listeners.with_locked(|listeners| listeners.remove(self.key))
    }
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.take();
    }
}

impl Stack {
    /// Send `payload` in one datagram, from port 0.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the datagram cannot be queued and `Invalid` if
    /// the payload does not fit in a datagram.
    pub fn udp_send(&self, dst_port: u16, dst_addr: Ipv4Addr, payload: &[u8]) -> NetworkResult<()> {
        let repr = Repr {
            src_port: 0,
            dst_port,
            payload_len: payload.len(),
        };
        let mut datagram = self.ipv4_buffer(repr.buffer_len())?;
        let udp = &mut datagram[ip::HEADER_LEN..];
        repr.emit(udp)?;
        udp[HEADER_LEN..].copy_from_slice(payload);
        self.ipv4_enqueue(Protocol::Udp, dst_addr, datagram)
    }

    /// Wait until `buf` has been filled by datagrams sent to `port`.
    ///
    /// Datagram boundaries are not kept: consecutive datagrams are appended to
    /// each other, and the tail of the one that overflows `buf` is lost.
    ///
    /// # Errors
    ///
    /// Returns `AddressInUse` if another call is already receiving on `port`,
    /// and `OutOfMemory` if the listener cannot be registered.
    pub async fn udp_receive(&self, port: u16, buf: &mut [u8]) -> NetworkResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(buf.len())
            .map_err(|_| NetworkError::OutOfMemory)?;
        buffer.resize(buf.len(), 0);

        let key = self.udp.listeners.with_locked(|listeners| {
            if listeners.iter().any(|(_, listener)| listener.port == port) {
                return Err(NetworkError::AddressInUse);
            }
            listeners
                .add_tail(Listener {
                    port,
                    buffer,
                    filled: 0,
                })
                .map_err(|_| NetworkError::OutOfMemory)
        })?;
        let guard = ListenerGuard {
            listeners: &self.udp.listeners,
            key,
        };

        block_until(&self.udp.waitq, || {
            self.udp
                .listeners
                .with_locked(|listeners| listeners.get(key).is_none_or(Listener::is_full))
        })
        .await;

        let listener = guard.take().ok_or(NetworkError::NotConnected)?;
        buf[..listener.filled].copy_from_slice(&listener.buffer[..listener.filled]);
        Ok(listener.filled)
    }

    #[must_use]
    #[inline]
    pub fn udp_listener_count(&self) -> usize {
        self.udp.listeners.with_locked(|listeners| listeners.len())
    }
}

pub(crate) fn udp_rx(stack: &Stack, packet: &mut PacketBuf) {
    packet.set_handler(Handler::Drop);

    let Ok(datagram) = Packet::new(packet.payload()) else {
        log::trace!("Dropping malformed UDP datagram");
        return;
    };
    let port = datagram.dst_port();
    let payload = datagram.payload();

    let delivered = stack.udp.listeners.with_locked(|listeners| {
        let mut delivered = false;
        listeners.for_each_mut(|_, listener| {
            if listener.port == port {
                listener.deliver(payload);
                delivered = true;
            }
        });
        delivered
    });

    if delivered {
        stack.udp.waitq.wake_all();
    } else {
        log::trace!("No listener on UDP port {port}");
    }
}

#[cfg(test)]
mod test {
    use super::super::testing::*;
    use super::*;
    use alloc::vec;
    use core::{pin::pin, task::Poll};

    fn udp_frame(dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let repr = Repr {
            src_port: 5353,
            dst_port,
            payload_len: payload.len(),
        };
        let mut datagram = vec![0; repr.buffer_len()];
        repr.emit(&mut datagram).unwrap();
        datagram[HEADER_LEN..].copy_from_slice(payload);
        ipv4_frame(Protocol::Udp, &datagram)
    }

    #[test]
    fn test_receive_exact_length() {
        let (stack, _nic) = new_stack();
        let mut buf = [0u8; 10];
        {
            let mut receive = pin!(stack.udp_receive(7000, &mut buf));
            assert!(poll(receive.as_mut()).is_pending());
            assert_eq!(stack.udp_listener_count(), 1);

            deliver(&stack, &udp_frame(7000, b"0123456789"));
            assert_eq!(poll(receive.as_mut()), Poll::Ready(Ok(10)));
        }
        assert_eq!(stack.udp_listener_count(), 0);
        assert_eq!(&buf, b"0123456789");
    }

    #[test]
    fn test_receive_accumulates() {
        let (stack, _nic) = new_stack();
        let mut buf = [0u8; 6];
        {
            let mut receive = pin!(stack.udp_receive(7000, &mut buf));
            assert!(poll(receive.as_mut()).is_pending());

            deliver(&stack, &udp_frame(7000, b"abcd"));
            assert!(poll(receive.as_mut()).is_pending());
            deliver(&stack, &udp_frame(7001, b"zz"));
            assert!(poll(receive.as_mut()).is_pending());
            deliver(&stack, &udp_frame(7000, b"efgh"));
            assert_eq!(poll(receive.as_mut()), Poll::Ready(Ok(6)));
        }
        assert_eq!(&buf, b"abcdef");
    }

    #[test]
    fn test_port_in_use() {
        let (stack, _nic) = new_stack();
        let mut first_buf = [0u8; 4];
        let mut second_buf = [0u8; 4];
        let mut first = pin!(stack.udp_receive(7000, &mut first_buf));
        let mut second = pin!(stack.udp_receive(7000, &mut second_buf));

        assert!(poll(first.as_mut()).is_pending());
        assert_eq!(
            poll(second.as_mut()),
            Poll::Ready(Err(NetworkError::AddressInUse))
        );
        assert_eq!(stack.udp_listener_count(), 1);
    }

    #[test]
    fn test_fan_out_to_same_port() {
        // Two listeners on one port can only be registered behind the back of
        // `udp_receive`, but the receive path still serves both.
        let (stack, _nic) = new_stack();
        let keys: Vec<_> = (0..2)
            .map(|_| {
                stack.udp.listeners.with_locked(|listeners| {
                    listeners
                        .add_tail(Listener {
                            port: 7000,
                            buffer: vec![0; 3],
                            filled: 0,
                        })
                        .unwrap()
                })
            })
            .collect();

        deliver(&stack, &udp_frame(7000, b"hello"));
        stack.udp.listeners.with_locked(|listeners| {
            for key in &keys {
                let listener = listeners.get(*key).unwrap();
                assert!(listener.is_full());
                assert_eq!(listener.buffer, b"hel");
            }
        });
    }

    #[test]
    fn test_empty_buffer() {
        let (stack, _nic) = new_stack();
        let mut empty = [0u8; 0];
        let mut receive = pin!(stack.udp_receive(7000, &mut empty));
        assert_eq!(poll(receive.as_mut()), Poll::Ready(Ok(0)));
        assert_eq!(stack.udp_listener_count(), 0);
    }

    #[test]
    fn test_send() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);

        stack.udp_send(7000, PEER_IP, b"hi").unwrap();
        flush_tx(&stack);

        let sent = nic.take_sent();
        assert_eq!(sent.len(), 1);
        let datagram = sent_ipv4(&sent[0]);
        let udp = Packet::new(datagram.payload()).unwrap();
        assert_eq!(udp.src_port(), 0);
        assert_eq!(udp.dst_port(), 7000);
        assert_eq!(udp.len(), 10);
        assert_eq!(udp.checksum(), 0);
        assert_eq!(udp.payload(), b"hi");
    }
}
