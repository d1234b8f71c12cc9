//! Network bring-up.
//!
//! Creates the stack on top of the link driver, registers the protocol
//! handlers, spawns the RX and TX tasks and hooks the ARP and TCP timers to the
//! timer tick.
use crate::{
    process::{Scheduler, SchedulerError},
    time::{TimeError, Ticks},
};
use alloc::sync::Arc;
use holonet::{NetConfig, NetworkError, Nic, Stack, l2::ethernet::MacAddress, l3::ip::Ipv4Addr};

/// Addressing of the board.
pub const CONFIG: NetConfig = NetConfig::new(
    MacAddress([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]),
    Ipv4Addr::new(192, 168, 0, 2),
    Ipv4Addr::new(255, 255, 255, 0),
    Ipv4Addr::new(192, 168, 0, 1),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BringUpError {
    #[error("Network stack: {0}")]
    Network(#[from] NetworkError),
    #[error("Scheduler: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Tick: {0}")]
    Tick(#[from] TimeError),
}

/// Brings the network up with the board addressing.
///
/// # Errors
///
/// Returns an error if memory runs out while registering handlers, tasks or tick work.
pub fn init(
    scheduler: &Scheduler,
    ticks: &Ticks,
    nic: impl Nic + Send + 'static,
) -> Result<Arc<Stack>, BringUpError> {
    init_with(CONFIG, scheduler, ticks, nic)
}

/// Brings the network up with the given addressing.
///
/// # Errors
///
/// Returns an error if memory runs out while registering handlers, tasks or tick work.
pub fn init_with(
    config: NetConfig,
    scheduler: &Scheduler,
    ticks: &Ticks,
    nic: impl Nic + Send + 'static,
) -> Result<Arc<Stack>, BringUpError> {
    let stack = Arc::new(Stack::new(config, nic));
    stack.register_default_protocols()?;

    let rx = stack.clone();
    scheduler.spawn("net-rx", async move { rx.rx_task().await })?;
    let tx = stack.clone();
    scheduler.spawn("net-tx", async move { tx.tx_task().await })?;

    let arp = stack.clone();
    ticks.register("arp", move || arp.arp_tick())?;
    let tcp = stack.clone();
    ticks.register("tcp", move || tcp.tcp_tick())?;

    log::info!(
        "Network up: {} ({}), netmask {}, gateway {}",
        config.ip,
        config.mac,
        config.netmask,
        config.gateway
    );
    Ok(stack)
}
