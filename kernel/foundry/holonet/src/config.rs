//! Static addressing of the interface.
use crate::{l2::ethernet::MacAddress, l3::ip::Ipv4Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Addresses the stack answers to, and where to route off-link traffic.
pub struct NetConfig {
    pub mac: MacAddress,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl NetConfig {
    #[must_use]
    #[inline]
    pub const fn new(mac: MacAddress, ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            mac,
            ip,
            netmask,
            gateway,
        }
    }

    #[must_use]
    #[inline]
    /// Returns whether `addr` is on the local subnet.
    pub const fn is_local(&self, addr: Ipv4Addr) -> bool {
        let mask = self.netmask.to_bits();
        addr.to_bits() & mask == self.ip.to_bits() & mask
    }

    #[must_use]
    #[inline]
    /// Returns the address whose MAC a datagram for `dst` must be sent to.
    pub const fn next_hop(&self, dst: Ipv4Addr) -> Ipv4Addr {
        if self.is_local(dst) { dst } else { self.gateway }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CONFIG: NetConfig = NetConfig::new(
        MacAddress([0, 1, 2, 3, 4, 5]),
        Ipv4Addr::new(192, 168, 0, 2),
        Ipv4Addr::new(255, 255, 255, 0),
        Ipv4Addr::new(192, 168, 0, 1),
    );

    #[test]
    fn test_next_hop() {
        let local = Ipv4Addr::new(192, 168, 0, 12);
        assert!(CONFIG.is_local(local));
        assert_eq!(CONFIG.next_hop(local), local);

        let remote = Ipv4Addr::new(10, 0, 0, 1);
        assert!(!CONFIG.is_local(remote));
        assert_eq!(CONFIG.next_hop(remote), CONFIG.gateway);
    }
}
