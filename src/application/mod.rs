//! Application layer containing the batch payment workflow.
//!
//! This module defines the `PaymentOrchestrator`, the state machine that takes a
//! recipient list through token approval and the batched transfer. Progress is
//! reported on a `tokio` channel so any front end can follow along.

pub mod orchestrator;
