//! TCP connections.
//!
//! Only a subset of the protocol is implemented:
//!
//! - a single segment is in flight at a time, and it is never retransmitted,
//! - only the passive side of a close is supported (the peer sends FIN first),
//! - the receive window is whatever is left in the receive ring.
//!
//! Every control block carries one timer, armed when a segment that expects an
//! answer is sent and cleared by any segment received on the connection. An
//! expired timer is only reported by [`Stack::tcp_timed_out`].
use super::Stack;
use crate::{
    NetworkError, NetworkResult,
    l3::ip::{self, Ipv4Addr, Protocol},
    l4::tcp::{Flags, HEADER_LEN, Packet, Repr},
    packet::{Handler, PacketBuf},
};
use core::sync::atomic::{AtomicU16, Ordering};
use hyperdrive::{
    locks::irq::IrqLock,
    queues::{
        ring::ByteRing,
        slot::{SlotKey, SlotList},
    },
    sync::{WaitQueue, block_until},
};

/// Ticks before an unanswered segment flags its connection as timed out.
pub const TCP_TIMEOUT_TICKS: u32 = 250;
/// Initial sequence number of every connection.
pub const INITIAL_SEQ: u32 = 1024;
/// Capacity of the receive ring of a connection.
pub const RX_BUFFER_LEN: usize = 1024;
/// First local port handed out to outgoing connections.
pub const EPHEMERAL_PORT_START: u16 = 49152;
/// Largest payload put in a single segment.
const MSS: usize = 1460;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Handle to a TCP connection.
pub struct Connection(SlotKey);

/// What the receive path has to do once the control block is released.
enum Reply {
    Nothing,
    Ack,
    Release,
}

#[derive(Debug)]
struct Tcb {
    local_port: u16,
    remote_port: u16,
    remote_addr: Ipv4Addr,
    seq: u32,
    ack: u32,
    peer_window: u16,
    state: TcpState,
    timeout: u32,
    timer_armed: bool,
    timed_out: bool,
    unacked: u32,
    rx: ByteRing,
}

impl Tcb {
    fn new(local_port: u16, remote_port: u16, remote_addr: Ipv4Addr, state: TcpState) -> NetworkResult<Self> {
        let rx = ByteRing::try_with_capacity(RX_BUFFER_LEN).map_err(|_| NetworkError::OutOfMemory)?;
        Ok(Self {
            local_port,
            remote_port,
            remote_addr,
            seq: INITIAL_SEQ,
            ack: 0,
            peer_window: 0,
            state,
            timeout: 0,
            timer_armed: false,
            timed_out: false,
            unacked: 0,
            rx,
        })
    }

    #[must_use]
    #[inline]
    fn matches(&self, remote_addr: Ipv4Addr, segment: &Repr) -> bool {
        self.local_port == segment.dst_port
            && self.remote_port == segment.src_port
            && self.remote_addr == remote_addr
    }

    #[must_use]
    #[inline]
    fn window(&self) -> u16 {
        u16::try_from(self.rx.free_space()).unwrap_or(u16::MAX)
    }

    #[must_use]
    fn segment(&self, flags: Flags) -> Repr {
        Repr {
            src_port: self.local_port,
            dst_port: self.remote_port,
            seq_number: self.seq,
            ack_number: self.ack,
            flags,
            window_len: self.window(),
        }
    }

    const fn arm_timer(&mut self) {
        self.timeout = TCP_TIMEOUT_TICKS;
        self.timer_armed = true;
        self.timed_out = false;
    }

    const fn clear_timer(&mut self) {
        self.timeout = 0;
        self.timer_armed = false;
        self.timed_out = false;
    }

    const fn tick(&mut self) {
        if !self.timer_armed {
            return;
        }
        if self.timeout == 0 {
            self.timed_out = true;
            self.timer_armed = false;
        } else {
            self.timeout -= 1;
        }
    }

    /// Run the state machine on an incoming segment.
    fn process(&mut self, remote_addr: Ipv4Addr, segment: &Repr, payload: &[u8]) -> Reply {
        let flags = segment.flags;

        if flags.rst()
            && matches!(
                self.state,
                TcpState::SynReceived
                    | TcpState::Established
                    | TcpState::CloseWait
                    | TcpState::LastAck
            )
        {
            log::debug!("Connection to {remote_addr}:{} reset", self.remote_port);
            return Reply::Release;
        }

        match self.state {
            TcpState::SynSent => {
                if flags.syn() && flags.ack() {
                    self.seq = self.seq.wrapping_add(1);
                    self.ack = segment.seq_number.wrapping_add(1);
                    self.peer_window = segment.window_len;
                    self.state = TcpState::Established;
                    return Reply::Ack;
                }
                self.state = TcpState::Closed;
                Reply::Nothing
            }
            TcpState::Listen => {
                if flags.syn() {
                    self.remote_addr = remote_addr;
                    self.remote_port = segment.src_port;
                    self.ack = segment.seq_number.wrapping_add(1);
                    self.peer_window = segment.window_len;
                    self.state = TcpState::SynReceived;
                }
                Reply::Nothing
            }
            TcpState::SynReceived => {
                if flags.ack() {
                    self.seq = segment.ack_number;
                    self.peer_window = segment.window_len;
                    self.state = TcpState::Established;
                }
                Reply::Nothing
            }
            TcpState::Established => self.process_established(segment, payload),
            TcpState::CloseWait => {
                if flags.ack() {
                    self.acknowledge(segment.ack_number);
                }
                Reply::Nothing
            }
            TcpState::LastAck => {
                if flags.ack() && segment.ack_number == self.seq.wrapping_add(1) {
                    Reply::Release
                } else {
                    Reply::Nothing
                }
            }
            TcpState::Closed
            | TcpState::FinWait1
            | TcpState::FinWait2
            | TcpState::Closing
            | TcpState::TimeWait => Reply::Nothing,
        }
    }

    fn process_established(&mut self, segment: &Repr, payload: &[u8]) -> Reply {
        let flags = segment.flags;
        let mut acked = 0;
        let mut reply = false;

        if flags.ack() {
            acked = self.acknowledge(segment.ack_number);
        }
        self.peer_window = segment.window_len;

        if !payload.is_empty() {
            reply = true;
            if segment.seq_number != self.ack {
                log::trace!("Out of order segment, expected {}", self.ack);
            } else if self.rx.push(payload).is_ok() {
                #[expect(clippy::cast_possible_truncation, reason = "Segments fit in a frame")]
                let len = payload.len() as u32;
                self.ack = self.ack.wrapping_add(len);
            } else {
                log::debug!("Receive ring full, dropping {} bytes", payload.len());
            }
        }

        if flags.fin() {
            self.ack = self.ack.wrapping_add(1);
            self.state = TcpState::CloseWait;
            reply = true;
        }

        if reply || acked == 0 {
            Reply::Ack
        } else {
            Reply::Nothing
        }
    }

    /// Account for the peer acknowledging up to `ack_number`, returning the
    /// number of newly acknowledged bytes.
    fn acknowledge(&mut self, ack_number: u32) -> u32 {
        let delta = ack_number.wrapping_sub(self.seq);
        if delta == 0 || delta > self.unacked {
            return 0;
        }
        self.seq = ack_number;
        self.unacked -= delta;
        delta
    }
}

/// Build the RST answering a segment that belongs to no connection.
fn reset_for(segment: &Repr, payload_len: usize) -> Option<Repr> {
    if segment.flags.rst() {
        return None;
    }

    let reset = if segment.flags.ack() {
        Repr {
            src_port: segment.dst_port,
            dst_port: segment.src_port,
            seq_number: segment.ack_number,
            ack_number: 0,
            flags: Flags::RST,
            window_len: 0,
        }
    } else {
        #[expect(clippy::cast_possible_truncation, reason = "Segments fit in a frame")]
        let mut ack = segment.seq_number.wrapping_add(payload_len as u32);
        if segment.flags.syn() {
            ack = ack.wrapping_add(1);
        }
        if segment.flags.fin() {
            ack = ack.wrapping_add(1);
        }
        Repr {
            src_port: segment.dst_port,
            dst_port: segment.src_port,
            seq_number: 0,
            ack_number: ack,
            flags: Flags::RST | Flags::ACK,
            window_len: 0,
        }
    };
    Some(reset)
}

#[derive(Debug)]
pub(crate) struct Tcp {
    tcbs: IrqLock<SlotList<Tcb>>,
    waitq: WaitQueue,
    next_port: AtomicU16,
}

impl Default for Tcp {
    fn default() -> Self {
        Self::new()
    }
}

impl Tcp {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tcbs: IrqLock::new(SlotList::new()),
            waitq: WaitQueue::new(),
            next_port: AtomicU16::new(EPHEMERAL_PORT_START),
        }
    }

    fn ephemeral_port(&self) -> u16 {
        let next = |port: u16| {
            Some(if port == u16::MAX {
                EPHEMERAL_PORT_START
            } else {
                port + 1
            })
        };
        match self
            .next_port
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, next)
        {
            Ok(port) | Err(port) => port,
        }
    }
}

impl Stack {
    /// Open a connection to `remote_addr:remote_port`.
    ///
    /// # Errors
    ///
    /// Returns `Refused` if the peer answers anything but SYN+ACK,
    /// `OutOfMemory` if the connection cannot be allocated.
    pub async fn tcp_connect(&self, remote_port: u16, remote_addr: Ipv4Addr) -> NetworkResult<Connection> {
        let local_port = self.tcp.ephemeral_port();
        let mut tcb = Tcb::new(local_port, remote_port, remote_addr, TcpState::SynSent)?;
        tcb.arm_timer();
        let syn = tcb.segment(Flags::SYN);

        let key = self
            .tcp
            .tcbs
            .with_locked(|tcbs| tcbs.add_tail(tcb))
            .map_err(|_| NetworkError::OutOfMemory)?;
        let conn = Connection(key);

        if let Err(err) = self.tcp_transmit(syn, remote_addr, &[]) {
            self.tcp_release(conn);
            return Err(err);
        }

        block_until(&self.tcp.waitq, || {
            self.tcp_state(conn) != Some(TcpState::SynSent)
        })
        .await;

        if self.tcp_state(conn) == Some(TcpState::Established) {
            log::debug!("Connected to {remote_addr}:{remote_port} from port {local_port}");
            Ok(conn)
        } else {
            self.tcp_release(conn);
            Err(NetworkError::Refused)
        }
    }

    /// Wait for a peer to connect to `local_port`.
    ///
    /// # Errors
    ///
    /// Returns `AddressInUse` if somebody is already listening on the port,
    /// `Reset` if the handshake is aborted, `OutOfMemory` if the connection
    /// cannot be allocated.
    pub async fn tcp_listen(&self, local_port: u16) -> NetworkResult<Connection> {
        let tcb = Tcb::new(local_port, 0, Ipv4Addr::UNSPECIFIED, TcpState::Listen)?;
        let key = self.tcp.tcbs.with_locked(|tcbs| {
            if tcbs
                .iter()
                .any(|(_, tcb)| tcb.state == TcpState::Listen && tcb.local_port == local_port)
            {
                return Err(NetworkError::AddressInUse);
            }
            tcbs.add_tail(tcb).map_err(|_| NetworkError::OutOfMemory)
        })?;
        let conn = Connection(key);

        block_until(&self.tcp.waitq, || self.tcp_state(conn) != Some(TcpState::Listen)).await;

        let syn_ack = self.tcp.tcbs.with_locked(|tcbs| {
            let tcb = tcbs
                .get_mut(key)
                .filter(|tcb| tcb.state == TcpState::SynReceived)?;
            tcb.seq = INITIAL_SEQ;
            tcb.arm_timer();
            Some((tcb.segment(Flags::SYN | Flags::ACK), tcb.remote_addr))
        });
        let Some((syn_ack, remote_addr)) = syn_ack else {
            self.tcp_release(conn);
            return Err(NetworkError::Reset);
        };
        if let Err(err) = self.tcp_transmit(syn_ack, remote_addr, &[]) {
            self.tcp_release(conn);
            return Err(err);
        }

        block_until(&self.tcp.waitq, || {
            self.tcp_state(conn) != Some(TcpState::SynReceived)
        })
        .await;

        if self.tcp_state(conn) == Some(TcpState::Established) {
            log::debug!("Accepted connection from {remote_addr} on port {local_port}");
            Ok(conn)
        } else {
            self.tcp_release(conn);
            Err(NetworkError::Reset)
        }
    }

    /// Send `data`, waiting for each segment to be acknowledged before the next.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if the connection is not established or goes
    /// away while waiting, or the error of the IPv4 layer.
    pub async fn tcp_send(&self, conn: Connection, data: &[u8]) -> NetworkResult<()> {
        for chunk in data.chunks(MSS) {
            #[expect(clippy::cast_possible_truncation, reason = "Chunks are at most one MSS")]
            let len = chunk.len() as u32;

            let (segment, remote_addr) = self.tcp.tcbs.with_locked(|tcbs| {
                let tcb = tcbs.get_mut(conn.0).ok_or(NetworkError::NotConnected)?;
                if !matches!(tcb.state, TcpState::Established | TcpState::CloseWait) {
                    return Err(NetworkError::NotConnected);
                }
                tcb.unacked += len;
                tcb.arm_timer();
                Ok((tcb.segment(Flags::ACK | Flags::PSH), tcb.remote_addr))
            })?;

            if let Err(err) = self.tcp_transmit(segment, remote_addr, chunk) {
                self.tcp.tcbs.with_locked(|tcbs| {
                    if let Some(tcb) = tcbs.get_mut(conn.0) {
                        tcb.unacked -= len;
                    }
                });
                return Err(err);
            }

            block_until(&self.tcp.waitq, || {
                self.tcp
                    .tcbs
                    .with_locked(|tcbs| tcbs.get(conn.0).is_none_or(|tcb| tcb.unacked == 0))
            })
            .await;

            if self.tcp_state(conn).is_none() {
                return Err(NetworkError::NotConnected);
            }
        }
        Ok(())
    }

    /// Fill `buf` with received data.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the peer closes the connection before `buf` is
    /// full, and `NotConnected` if the connection goes away.
    pub async fn tcp_receive(&self, conn: Connection, buf: &mut [u8]) -> NetworkResult<usize> {
        let mut read = 0;
        while read < buf.len() {
            block_until(&self.tcp.waitq, || {
                self.tcp.tcbs.with_locked(|tcbs| {
                    tcbs.get(conn.0)
                        .is_none_or(|tcb| !tcb.rx.is_empty() || tcb.state != TcpState::Established)
                })
            })
            .await;

            read += self.tcp.tcbs.with_locked(|tcbs| {
                let tcb = tcbs.get_mut(conn.0).ok_or(NetworkError::NotConnected)?;
                match tcb.rx.read(&mut buf[read..]) {
                    0 => Err(NetworkError::Closed),
                    count => Ok(count),
                }
            })?;
        }
        Ok(read)
    }

    /// Answer the FIN of the peer with ours.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` unless the peer has already closed its side,
    /// `NotConnected` if the connection does not exist.
    pub fn tcp_close(&self, conn: Connection) -> NetworkResult<()> {
        let (segment, remote_addr) = self.tcp.tcbs.with_locked(|tcbs| {
            let tcb = tcbs.get_mut(conn.0).ok_or(NetworkError::NotConnected)?;
            if tcb.state != TcpState::CloseWait {
                return Err(NetworkError::Unsupported);
            }
            tcb.state = TcpState::LastAck;
            tcb.arm_timer();
            Ok((tcb.segment(Flags::FIN | Flags::ACK), tcb.remote_addr))
        })?;
        self.tcp_transmit(segment, remote_addr, &[])
    }

    /// Age the timers of every connection by one tick.
    pub fn tcp_tick(&self) {
        self.tcp
            .tcbs
            .with_locked(|tcbs| tcbs.for_each_mut(|_, tcb| tcb.tick()));
    }

    #[must_use]
    /// Returns the state of `conn`, or `None` once it has been released.
    pub fn tcp_state(&self, conn: Connection) -> Option<TcpState> {
        self.tcp
            .tcbs
            .with_locked(|tcbs| tcbs.get(conn.0).map(|tcb| tcb.state))
    }

    #[must_use]
    /// Returns whether the timer of `conn` expired since it was last armed.
    pub fn tcp_timed_out(&self, conn: Connection) -> bool {
        self.tcp
            .tcbs
            .with_locked(|tcbs| tcbs.get(conn.0).is_some_and(|tcb| tcb.timed_out))
    }

    #[must_use]
    /// Number of received bytes waiting to be read on `conn`.
    pub fn tcp_available(&self, conn: Connection) -> usize {
        self.tcp
            .tcbs
            .with_locked(|tcbs| tcbs.get(conn.0).map_or(0, |tcb| tcb.rx.len()))
    }

    #[must_use]
    #[inline]
    pub fn tcp_connection_count(&self) -> usize {
        self.tcp.tcbs.with_locked(|tcbs| tcbs.len())
    }

    fn tcp_release(&self, conn: Connection) {
        self.tcp.tcbs.with_locked(|tcbs| drop(tcbs.remove(conn.0)));
    }

    fn tcp_transmit(&self, segment: Repr, remote_addr: Ipv4Addr, payload: &[u8]) -> NetworkResult<()> {
        let mut datagram = self.ipv4_buffer(HEADER_LEN + payload.len())?;
        let tcp = &mut datagram[ip::HEADER_LEN..];
        tcp[HEADER_LEN..].copy_from_slice(payload);
        segment.emit(tcp, self.config.ip, remote_addr)?;
        self.ipv4_enqueue(Protocol::Tcp, remote_addr, datagram)
    }
}

pub(crate) fn tcp_rx(stack: &Stack, packet: &mut PacketBuf) {
    packet.set_handler(Handler::Drop);

    let Some(info) = packet.ipv4() else {
        return;
    };
    let Ok(segment) = Packet::new(packet.payload()) else {
        log::trace!("Dropping malformed TCP segment");
        return;
    };
    let repr = Repr::parse(&segment);
    let payload = segment.payload();
    let remote_addr = info.src_addr;

    let answer = stack.tcp.tcbs.with_locked(|tcbs| {
        let key = tcbs
            .find_key(|tcb| tcb.state != TcpState::Listen && tcb.matches(remote_addr, &repr))
            .or_else(|| {
                tcbs.find_key(|tcb| tcb.state == TcpState::Listen && tcb.local_port == repr.dst_port)
            });
        let Some(key) = key else {
            return reset_for(&repr, payload.len());
        };
        let tcb = tcbs.get_mut(key)?;

        tcb.clear_timer();
        match tcb.process(remote_addr, &repr, payload) {
            Reply::Nothing => None,
            Reply::Ack => Some(tcb.segment(Flags::ACK)),
            Reply::Release => {
                drop(tcbs.remove(key));
                None
            }
        }
    });

    if let Some(answer) = answer {
        if answer.flags.rst() {
            log::debug!("Resetting segment from {remote_addr}:{}", repr.src_port);
        }
        if let Err(err) = stack.tcp_transmit(answer, remote_addr, &[]) {
            log::debug!("Failed to answer TCP segment: {err}");
        }
    }

    stack.tcp.waitq.wake_all();
}

#[cfg(test)]
mod test {
    use super::super::testing::*;
    use super::*;
    use alloc::vec::Vec;
    use core::{pin::pin, task::Poll};

    const PEER_PORT: u16 = 80;
    const PEER_SEQ: u32 = 5000;

    fn peer_segment(dst_port: u16, seq_number: u32, ack_number: u32, flags: Flags) -> Repr {
        Repr {
            src_port: PEER_PORT,
            dst_port,
            seq_number,
            ack_number,
            flags,
            window_len: 4096,
        }
    }

    fn sent_segments(stack: &Stack, nic: &MockNic) -> Vec<(Repr, Vec<u8>)> {
        flush_tx(stack);
        nic.take_sent().iter().map(|frame| sent_tcp(frame)).collect()
    }

    /// Run a client handshake and return the connection and its local port.
    fn connected(stack: &Stack, nic: &MockNic) -> (Connection, u16) {
        let mut connect = pin!(stack.tcp_connect(PEER_PORT, PEER_IP));
        assert!(poll(connect.as_mut()).is_pending());
        let (syn, _) = sent_segments(stack, nic).remove(0);

        deliver(
            stack,
            &tcp_frame(
                peer_segment(syn.src_port, PEER_SEQ, INITIAL_SEQ + 1, Flags::SYN | Flags::ACK),
                &[],
            ),
        );
        let Poll::Ready(Ok(conn)) = poll(connect.as_mut()) else {
            panic!("handshake did not complete");
        };
        sent_segments(stack, nic);
        (conn, syn.src_port)
    }

    #[test]
    fn test_connect_handshake() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);

        let mut connect = pin!(stack.tcp_connect(PEER_PORT, PEER_IP));
        assert!(poll(connect.as_mut()).is_pending());

        let sent = sent_segments(&stack, &nic);
        assert_eq!(sent.len(), 1);
        let syn = sent[0].0;
        assert_eq!(syn.flags, Flags::SYN);
        assert_eq!(syn.seq_number, INITIAL_SEQ);
        assert_eq!(syn.dst_port, PEER_PORT);
        assert_eq!(syn.src_port, EPHEMERAL_PORT_START);
        assert_eq!(usize::from(syn.window_len), RX_BUFFER_LEN);

        deliver(
            &stack,
            &tcp_frame(
                peer_segment(syn.src_port, PEER_SEQ, INITIAL_SEQ + 1, Flags::SYN | Flags::ACK),
                &[],
            ),
        );
        let conn = match poll(connect.as_mut()) {
            Poll::Ready(Ok(conn)) => conn,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(stack.tcp_state(conn), Some(TcpState::Established));

        let sent = sent_segments(&stack, &nic);
        assert_eq!(sent.len(), 1);
        let ack = sent[0].0;
        assert_eq!(ack.flags, Flags::ACK);
        assert_eq!(ack.seq_number, INITIAL_SEQ + 1);
        assert_eq!(ack.ack_number, PEER_SEQ + 1);
    }

    #[test]
    fn test_connect_refused() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);

        let mut connect = pin!(stack.tcp_connect(PEER_PORT, PEER_IP));
        assert!(poll(connect.as_mut()).is_pending());
        let syn = sent_segments(&stack, &nic)[0].0;
        assert_eq!(stack.tcp_connection_count(), 1);

        deliver(
            &stack,
            &tcp_frame(
                peer_segment(syn.src_port, 0, INITIAL_SEQ + 1, Flags::RST | Flags::ACK),
                &[],
            ),
        );
        assert_eq!(
            poll(connect.as_mut()),
            Poll::Ready(Err(NetworkError::Refused))
        );
        assert_eq!(stack.tcp_connection_count(), 0);
        assert!(sent_segments(&stack, &nic).is_empty());
    }

    #[test]
    fn test_listen_handshake() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);

        let mut listen = pin!(stack.tcp_listen(8080));
        assert!(poll(listen.as_mut()).is_pending());
        assert!(sent_segments(&stack, &nic).is_empty());

        let syn = Repr {
            src_port: 40000,
            dst_port: 8080,
            seq_number: PEER_SEQ,
            ack_number: 0,
            flags: Flags::SYN,
            window_len: 4096,
        };
        deliver(&stack, &tcp_frame(syn, &[]));
        assert!(poll(listen.as_mut()).is_pending());

        let sent = sent_segments(&stack, &nic);
        assert_eq!(sent.len(), 1);
        let syn_ack = sent[0].0;
        assert_eq!(syn_ack.flags, Flags::SYN | Flags::ACK);
        assert_eq!(syn_ack.seq_number, INITIAL_SEQ);
        assert_eq!(syn_ack.ack_number, PEER_SEQ + 1);
        assert_eq!(syn_ack.dst_port, 40000);

        let ack = Repr {
            seq_number: PEER_SEQ + 1,
            ack_number: INITIAL_SEQ + 1,
            flags: Flags::ACK,
            ..syn
        };
        deliver(&stack, &tcp_frame(ack, &[]));
        let conn = match poll(listen.as_mut()) {
            Poll::Ready(Ok(conn)) => conn,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(stack.tcp_state(conn), Some(TcpState::Established));
        assert!(sent_segments(&stack, &nic).is_empty());
    }

    #[test]
    fn test_listen_port_in_use() {
        let (stack, _nic) = new_stack();
        let mut first = pin!(stack.tcp_listen(8080));
        let mut second = pin!(stack.tcp_listen(8080));
        assert!(poll(first.as_mut()).is_pending());
        assert_eq!(
            poll(second.as_mut()),
            Poll::Ready(Err(NetworkError::AddressInUse))
        );
    }

    #[test]
    fn test_data_delivery() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);
        let (conn, port) = connected(&stack, &nic);

        deliver(
            &stack,
            &tcp_frame(
                peer_segment(port, PEER_SEQ + 1, INITIAL_SEQ + 1, Flags::ACK | Flags::PSH),
                b"hello ",
            ),
        );
        deliver(
            &stack,
            &tcp_frame(
                peer_segment(port, PEER_SEQ + 7, INITIAL_SEQ + 1, Flags::ACK | Flags::PSH),
                b"world",
            ),
        );
        assert_eq!(stack.tcp_available(conn), 11);

        let acks = sent_segments(&stack, &nic);
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[0].0.ack_number, PEER_SEQ + 7);
        assert_eq!(acks[1].0.ack_number, PEER_SEQ + 12);
        assert_eq!(usize::from(acks[1].0.window_len), RX_BUFFER_LEN - 11);

        let mut buf = [0u8; 11];
        {
            let mut receive = pin!(stack.tcp_receive(conn, &mut buf));
            assert_eq!(poll(receive.as_mut()), Poll::Ready(Ok(11)));
        }
        assert_eq!(&buf, b"hello world");
        assert_eq!(stack.tcp_available(conn), 0);
    }

    #[test]
    fn test_receive_waits_for_data() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);
        let (conn, port) = connected(&stack, &nic);

        let mut buf = [0u8; 4];
        {
            let mut receive = pin!(stack.tcp_receive(conn, &mut buf));
            assert!(poll(receive.as_mut()).is_pending());

            deliver(
                &stack,
                &tcp_frame(peer_segment(port, PEER_SEQ + 1, INITIAL_SEQ + 1, Flags::ACK), b"ab"),
            );
            assert!(poll(receive.as_mut()).is_pending());
            deliver(
                &stack,
                &tcp_frame(peer_segment(port, PEER_SEQ + 3, INITIAL_SEQ + 1, Flags::ACK), b"cd"),
            );
            assert_eq!(poll(receive.as_mut()), Poll::Ready(Ok(4)));
        }
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn test_send_waits_for_ack() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);
        let (conn, port) = connected(&stack, &nic);

        let mut send = pin!(stack.tcp_send(conn, b"data"));
        assert!(poll(send.as_mut()).is_pending());

        let sent = sent_segments(&stack, &nic);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.flags, Flags::ACK | Flags::PSH);
        assert_eq!(sent[0].0.seq_number, INITIAL_SEQ + 1);
        assert_eq!(sent[0].1, b"data");

        deliver(
            &stack,
            &tcp_frame(peer_segment(port, PEER_SEQ + 1, INITIAL_SEQ + 5, Flags::ACK), &[]),
        );
        assert_eq!(poll(send.as_mut()), Poll::Ready(Ok(())));
        // A pure acknowledgement of our data is not answered.
        assert!(sent_segments(&stack, &nic).is_empty());
    }

    #[test]
    fn test_duplicate_ack_is_echoed() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);
        let (_conn, port) = connected(&stack, &nic);

        deliver(
            &stack,
            &tcp_frame(peer_segment(port, PEER_SEQ + 1, INITIAL_SEQ + 1, Flags::ACK), &[]),
        );
        let sent = sent_segments(&stack, &nic);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.flags, Flags::ACK);
    }

    #[test]
    fn test_passive_close() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);
        let (conn, port) = connected(&stack, &nic);

        assert_eq!(stack.tcp_close(conn), Err(NetworkError::Unsupported));

        deliver(
            &stack,
            &tcp_frame(
                peer_segment(port, PEER_SEQ + 1, INITIAL_SEQ + 1, Flags::FIN | Flags::ACK),
                &[],
            ),
        );
        assert_eq!(stack.tcp_state(conn), Some(TcpState::CloseWait));
        let sent = sent_segments(&stack, &nic);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.ack_number, PEER_SEQ + 2);

        let mut buf = [0u8; 1];
        {
            let mut receive = pin!(stack.tcp_receive(conn, &mut buf));
            assert_eq!(
                poll(receive.as_mut()),
                Poll::Ready(Err(NetworkError::Closed))
            );
        }

        stack.tcp_close(conn).unwrap();
        assert_eq!(stack.tcp_state(conn), Some(TcpState::LastAck));
        let sent = sent_segments(&stack, &nic);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.flags, Flags::FIN | Flags::ACK);

        deliver(
            &stack,
            &tcp_frame(peer_segment(port, PEER_SEQ + 2, INITIAL_SEQ + 2, Flags::ACK), &[]),
        );
        assert_eq!(stack.tcp_state(conn), None);
        assert_eq!(stack.tcp_connection_count(), 0);
    }

    #[test]
    fn test_unknown_segment_is_reset() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);

        deliver(
            &stack,
            &tcp_frame(peer_segment(9999, PEER_SEQ, 0, Flags::SYN), &[]),
        );
        let sent = sent_segments(&stack, &nic);
        assert_eq!(sent.len(), 1);
        let reset = sent[0].0;
        assert_eq!(reset.flags, Flags::RST | Flags::ACK);
        assert_eq!(reset.seq_number, 0);
        assert_eq!(reset.ack_number, PEER_SEQ + 1);
        assert_eq!(reset.src_port, 9999);
        assert_eq!(reset.dst_port, PEER_PORT);

        deliver(
            &stack,
            &tcp_frame(peer_segment(9999, PEER_SEQ, 777, Flags::ACK), b"xyz"),
        );
        let reset = sent_segments(&stack, &nic)[0].0;
        assert_eq!(reset.flags, Flags::RST);
        assert_eq!(reset.seq_number, 777);

        // Never answer a reset with a reset.
        deliver(
            &stack,
            &tcp_frame(peer_segment(9999, PEER_SEQ, 0, Flags::RST), &[]),
        );
        assert!(sent_segments(&stack, &nic).is_empty());
        assert_eq!(stack.tcp_connection_count(), 0);
    }

    #[test]
    fn test_timer() {
        let (stack, nic) = new_stack();
        resolve_peer(&stack, &nic);

        let mut connect = pin!(stack.tcp_connect(PEER_PORT, PEER_IP));
        assert!(poll(connect.as_mut()).is_pending());
        let conn = Connection(stack.tcp.tcbs.with_locked(|tcbs| tcbs.head_key().unwrap()));

        for _ in 0..TCP_TIMEOUT_TICKS {
            stack.tcp_tick();
        }
        assert!(!stack.tcp_timed_out(conn));
        stack.tcp_tick();
        assert!(stack.tcp_timed_out(conn));

        // Nothing acts on the expired timer.
        assert!(poll(connect.as_mut()).is_pending());
        assert_eq!(stack.tcp_state(conn), Some(TcpState::SynSent));
    }

    #[test]
    fn test_ephemeral_ports_wrap() {
        let tcp = Tcp::new();
        tcp.next_port.store(u16::MAX, Ordering::Relaxed);
        assert_eq!(tcp.ephemeral_port(), u16::MAX);
        assert_eq!(tcp.ephemeral_port(), EPHEMERAL_PORT_START);
    }
}
