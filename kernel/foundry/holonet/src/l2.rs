//! Link layer wire formats.

pub mod ethernet;
