//! Drivers for the devices the kernel talks to.

pub mod nic;
