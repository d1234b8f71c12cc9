#![no_std]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]
//! Holonet is the network stack of the kernel.
//!
//! Frames handed over by the link driver go through [`Stack::frame_received`]
//! and are dispatched layer by layer (Ethernet, ARP or IPv4, UDP or TCP) by the
//! RX task. Outgoing datagrams are queued and sent by the TX task once their next
//! hop has been resolved.

extern crate alloc;
use thiserror::Error;

pub mod config;
pub mod l2;
pub mod l3;
pub mod l4;
pub mod packet;
pub mod protocol;
pub mod stack;
pub mod stats;
pub mod utils;

pub use config::NetConfig;
pub use stack::{Stack, tcp::Connection, tcp::TcpState};

/// Link driver as seen by the stack.
pub trait Nic {
    /// Send one frame made of an Ethernet header followed by its payload.
    ///
    /// The two slices are handed to the hardware as separate descriptors,
    /// so the payload is never copied behind the header.
    ///
    /// # Errors
    ///
    /// Returns `Link` if the frame could not be queued for transmission.
    fn transmit(&mut self, header: &[u8], payload: &[u8]) -> NetworkResult<()>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors that can occur when using the network stack
pub enum NetworkError {
    #[error("Out of memory")]
    /// A buffer could not be allocated
    OutOfMemory,
    #[error("Input is invalid")]
    /// The input is invalid
    Invalid,
    #[error("Unsupported operation")]
    /// The operation is not supported
    Unsupported,
    #[error("Address resolution timed out")]
    /// No ARP reply arrived in time
    TimedOut,
    #[error("Connection refused")]
    /// The peer refused the connection
    Refused,
    #[error("Connection reset")]
    /// The peer reset the connection
    Reset,
    #[error("Address already in use")]
    /// A listener is already registered on this port
    AddressInUse,
    #[error("Connection closed by peer")]
    /// The peer closed its side of the connection
    Closed,
    #[error("Not connected")]
    /// The connection does not exist anymore
    NotConnected,
    #[error("Link driver failure")]
    /// The link driver refused the frame
    Link,
}

pub type NetworkResult<T> = Result<T, NetworkError>;
