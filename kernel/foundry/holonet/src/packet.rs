//! Received packets as they travel up the stack.
//!
//! A [`PacketBuf`] owns a copy of the whole frame and a cursor over the part
//! that the next layer has to look at. Each receive handler narrows the
//! cursor to its payload and retags the packet with the next [`Handler`].
use crate::{NetworkError, NetworkResult, l3::ip::Ipv4Addr};
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Protocol layer that should process a packet next.
pub enum Handler {
    Ethernet,
    Arp,
    Ipv4,
    Udp,
    Tcp,
    /// Processing is over, the packet can be freed.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Addresses decoded by the IPv4 layer, for the transport layers.
pub struct Ipv4Info {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
}

#[derive(Debug)]
pub struct PacketBuf {
    data: Vec<u8>,
    start: usize,
    end: usize,
    handler: Handler,
    ipv4: Option<Ipv4Info>,
}

impl PacketBuf {
    /// Copy a received frame into a new packet, tagged for the Ethernet layer.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the copy cannot be allocated.
    pub fn try_from_slice(frame: &[u8]) -> NetworkResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(frame.len())
            .map_err(|_| NetworkError::OutOfMemory)?;
        data.extend_from_slice(frame);

        Ok(Self {
            end: data.len(),
            data,
            start: 0,
            handler: Handler::Ethernet,
            ipv4: None,
        })
    }

    #[must_use]
    #[inline]
    /// The whole frame, headers included.
    pub fn frame(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    #[inline]
    /// The bytes not yet consumed by a lower layer.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Strip `count` bytes off the front of the payload.
    pub fn advance(&mut self, count: usize) {
        self.start = self.start.saturating_add(count).min(self.end);
    }

    /// Shorten the payload to at most `len` bytes, dropping trailing padding.
    pub fn truncate(&mut self, len: usize) {
        self.end = self.end.min(self.start.saturating_add(len));
    }

    #[must_use]
    #[inline]
    pub const fn handler(&self) -> Handler {
        self.handler
    }

    #[inline]
    pub const fn set_handler(&mut self, handler: Handler) {
        self.handler = handler;
    }

    #[must_use]
    #[inline]
    pub const fn ipv4(&self) -> Option<Ipv4Info> {
        self.ipv4
    }

    #[inline]
    pub const fn set_ipv4(&mut self, info: Ipv4Info) {
        self.ipv4 = Some(info);
    }
}
