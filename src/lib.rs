//! Host-side control of a two-axis anechoic chamber turntable over RS-232.

pub mod abort;
pub mod config;
pub mod transport;
pub mod turntable;
