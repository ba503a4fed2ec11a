#![allow(dead_code)]

use alloy_primitives::{Address, U256};
use batchpay::application::orchestrator::{PaymentOrchestrator, StatusStream};
use batchpay::config::OrchestratorConfig;
use batchpay::domain::state::StatusEvent;
use batchpay::infrastructure::simulated::SimulatedLedger;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;

pub const TOKEN: &str = "0x00000000000000000000000000000000000000aa";
pub const ALICE: &str = "0x1111111111111111111111111111111111111111";
pub const BOB: &str = "0x2222222222222222222222222222222222222222";
pub const FEE: u64 = 1000;

pub fn token() -> Address {
    TOKEN.parse().unwrap()
}

pub fn operator() -> Address {
    Address::repeat_byte(0x01)
}

/// A ledger with an 18-decimal token, a funded operator and a wallet to connect.
pub fn funded_ledger() -> SimulatedLedger {
    let ledger = SimulatedLedger::new(Address::repeat_byte(0xbc), U256::from(FEE));
    ledger.deploy_token(token(), 18);
    ledger.mint(token(), operator(), U256::from(10u64).pow(U256::from(24u64)));
    ledger.set_wallet(Some(operator()));
    ledger
}

pub fn orchestrator(ledger: &SimulatedLedger) -> (PaymentOrchestrator, StatusStream) {
    PaymentOrchestrator::new(
        Arc::new(ledger.clone()),
        Arc::new(ledger.clone()),
        Arc::new(ledger.clone()),
        OrchestratorConfig::default(),
    )
}

pub fn drain(stream: &mut StatusStream) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = stream.try_recv() {
        events.push(event);
    }
    events
}

pub fn units(value: &str) -> U256 {
    U256::from_str_radix(value, 10).unwrap()
}

pub fn write_recipients(path: &Path, rows: &[(&str, &str)]) -> Result<(), Error> {
    let mut file = std::fs::File::create(path)?;
    for (address, amount) in rows {
        writeln!(file, "{address},{amount}")?;
    }
    file.flush()
}
