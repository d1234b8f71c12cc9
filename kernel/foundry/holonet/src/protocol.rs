//! Registry of protocol receive handlers.
use crate::{
    NetworkError, NetworkResult,
    packet::{Handler, PacketBuf},
    stack::Stack,
};
use hyperdrive::{locks::irq::IrqLock, queues::slot::SlotList};

/// Receive handler of a protocol layer.
///
/// The handler consumes its header from the packet and retags it with the
/// next layer, or with [`Handler::Drop`]. Leaving the tag untouched means the
/// packet was fully consumed.
pub type RxHandler = fn(&Stack, &mut PacketBuf);

#[derive(Clone, Copy)]
pub struct ProtocolDescriptor {
    pub handler: Handler,
    pub rx: RxHandler,
}

impl core::fmt::Debug for ProtocolDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProtocolDescriptor")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    protocols: IrqLock<SlotList<ProtocolDescriptor>>,
}

impl Registry {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            protocols: IrqLock::new(SlotList::new()),
        }
    }

    /// Append a descriptor.
    ///
    /// Registration is meant to happen once, before any frame is dispatched.
    /// If two descriptors share a tag, the first one registered wins.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the registry cannot grow.
    pub fn register(&self, descriptor: ProtocolDescriptor) -> NetworkResult<()> {
        self.protocols
            .with_locked(|protocols| protocols.add_tail(descriptor).map(drop))
            .map_err(|_| NetworkError::OutOfMemory)
    }

    #[must_use]
    /// Find the receive handler registered for `handler`.
    pub fn lookup(&self, handler: Handler) -> Option<RxHandler> {
        self.protocols.with_locked(|protocols| {
            protocols
                .iter()
                .find(|(_, descriptor)| descriptor.handler == handler)
                .map(|(_, descriptor)| descriptor.rx)
        })
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.protocols.with_locked(|protocols| protocols.len())
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
