//! Domain types and rules: amounts, addresses, recipient batches, the session
//! state machine's states, and the ports to the outside world.

pub mod address;
pub mod amount;
pub mod batch;
pub mod ports;
pub mod recipient;
pub mod state;
