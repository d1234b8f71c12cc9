//! Network layer wire formats.

pub mod arp;
pub mod ip;
