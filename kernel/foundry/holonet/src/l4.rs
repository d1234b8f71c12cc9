//! Transport layer wire formats.

pub mod tcp;
pub mod udp;
