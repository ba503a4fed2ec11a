//! Implementations of the domain ports.

pub mod simulated;
