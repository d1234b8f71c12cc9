//! Receive side of the Ethernet MAC driver.
//!
//! The MAC DMAs incoming frames into a ring of small fragment buffers. A frame
//! larger than one buffer spans several descriptors, the last of which is
//! flagged in its status word. [`FrameAssembler`] gathers the fragments and hands
//! complete frames to the network stack, which copies them.

use alloc::vec::Vec;
use holonet::Stack;

/// Size of each receive fragment buffer.
pub const RX_FRAGMENT_LEN: usize = 127;
/// Largest frame accepted, VLAN tag included.
pub const MAX_FRAME_LEN: usize = 1522;

/// Status word written back by the MAC for each receive descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxStatus(u32);

impl RxStatus {
    /// Size of the fragment minus one.
    const SIZE_MASK: u32 = 0x7FF;
    /// The fragment ends its frame.
    const LAST_FLAG: u32 = 1 << 30;

    #[must_use]
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    #[inline]
    pub const fn fragment_len(self) -> usize {
        (self.0 & Self::SIZE_MASK) as usize + 1
    }

    #[must_use]
    #[inline]
    pub const fn is_last(self) -> bool {
        self.0 & Self::LAST_FLAG != 0
    }
}

#[derive(Debug, Default)]
pub struct FrameAssembler {
    frame: Vec<u8>,
    /// Set when the frame being gathered has been given up on.
    discarding: bool,
    dropped: u64,
}

impl FrameAssembler {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            frame: Vec::new(),
            discarding: false,
            dropped: 0,
        }
    }

    #[must_use]
    #[inline]
    /// Number of frames given up on, because they were too large or memory ran out.
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Handles the fragment described by `status`, stored at the start of `buffer`.
    ///
    /// Returns `true` if the fragment completed a frame that was delivered to `stack`.
    pub fn receive(&mut self, stack: &Stack, status: RxStatus, buffer: &[u8]) -> bool {
        let len = status.fragment_len().min(buffer.len());
        self.push(&buffer[..len]);

        if !status.is_last() {
            return false;
        }

        let delivered = !self.discarding;
        if delivered {
            stack.frame_received(&self.frame);
        } else {
            self.dropped += 1;
        }
        self.frame.clear();
        self.discarding = false;
        delivered
    }

    fn push(&mut self, fragment: &[u8]) {
        if self.discarding {
            return;
        }
        if self.frame.len() + fragment.len() > MAX_FRAME_LEN {
            log::debug!("Oversized frame, discarding it");
            self.discarding = true;
            return;
        }
        if self.frame.try_reserve(fragment.len()).is_err() {
            log::warn!("Out of memory while gathering a frame");
            self.discarding = true;
            return;
        }
        self.frame.extend_from_slice(fragment);
    }
}
