//! Traffic and drop counters.
use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    frames_received: AtomicU32,
    frames_sent: AtomicU32,
    unknown_ethertype: AtomicU32,
    ipv4_dropped: AtomicU32,
    unhandled: AtomicU32,
    unresolved: AtomicU32,
    out_of_memory: AtomicU32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// A point-in-time copy of [`Stats`].
pub struct StatsSnapshot {
    pub frames_received: u32,
    pub frames_sent: u32,
    /// Frames whose `EtherType` is neither ARP nor IPv4.
    pub unknown_ethertype: u32,
    /// Datagrams dropped for their version, TTL, destination or protocol.
    pub ipv4_dropped: u32,
    /// Packets tagged for a layer that has no registered handler.
    pub unhandled: u32,
    /// Outgoing datagrams whose next hop could not be resolved.
    pub unresolved: u32,
    pub out_of_memory: u32,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub(crate) fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl Stats {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            frames_received: AtomicU32::new(0),
            frames_sent: AtomicU32::new(0),
            unknown_ethertype: AtomicU32::new(0),
            ipv4_dropped: AtomicU32::new(0),
            unhandled: AtomicU32::new(0),
            unresolved: AtomicU32::new(0),
            out_of_memory: AtomicU32::new(0),
        }
    }

    counter! {
        frame_received => frames_received,
        frame_sent => frames_sent,
        unknown_ethertype => unknown_ethertype,
        ipv4_dropped => ipv4_dropped,
        unhandled => unhandled,
        unresolved => unresolved,
        out_of_memory => out_of_memory,
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            unknown_ethertype: self.unknown_ethertype.load(Ordering::Relaxed),
            ipv4_dropped: self.ipv4_dropped.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            out_of_memory: self.out_of_memory.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = Stats::new();
        stats.frame_received();
        stats.frame_received();
        stats.unresolved();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.unresolved, 1);
        assert_eq!(snapshot.frames_sent, 0);
    }
}
