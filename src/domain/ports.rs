use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;

/// Proof that a submitted transaction was included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Handle to a submitted transaction that has not been confirmed yet.
#[async_trait]
pub trait PendingTx: Send {
    fn tx_hash(&self) -> TxHash;

    /// Waits for the network to include the transaction. No timeout is applied
    /// here; the implementation owns any timeout or retry policy.
    async fn await_confirmation(self: Box<Self>) -> Result<Receipt>;
}

pub type PendingTxBox = Box<dyn PendingTx>;

#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Asks the wallet for an account able to sign on the operator's behalf.
    async fn request_connection(&self) -> Result<Address>;
}

/// Read and approve operations against ERC-20 style token contracts.
#[async_trait]
pub trait TokenClient: Send + Sync {
    async fn precision(&self, token: Address) -> Result<u8>;
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<PendingTxBox>;
}

/// The batch payment contract: one call pays every recipient and charges a fee.
#[async_trait]
pub trait BatchPaymentClient: Send + Sync {
    /// Address the token allowance must be granted to.
    fn address(&self) -> Address;
    async fn fee(&self) -> Result<U256>;
    async fn batch_transfer(
        &self,
        token: Address,
        recipients: Vec<Address>,
        amounts: Vec<U256>,
    ) -> Result<PendingTxBox>;
}

pub type WalletConnectorRef = Arc<dyn WalletConnector>;
pub type TokenClientRef = Arc<dyn TokenClient>;
pub type BatchPaymentClientRef = Arc<dyn BatchPaymentClient>;
