use crate::domain::ports::{
    BatchPaymentClient, PendingTx, PendingTxBox, Receipt, TokenClient, WalletConnector,
};
use crate::error::{BatchPayError, Result};
use alloy_primitives::{Address, TxHash, U256, keccak256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct TokenState {
    decimals: u8,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl TokenState {
    fn balance(&self, owner: Address) -> U256 {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }
}

/// How the next submission of a given kind should go wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InjectedFailure {
    /// The signer declines; nothing reaches the network.
    Rejected,
    /// Mined, but reverted with the given reason.
    Reverted(String),
}

#[derive(Debug, Default)]
struct LedgerState {
    tokens: HashMap<Address, TokenState>,
    fee: U256,
    wallet: Option<Address>,
    wallet_rejects: bool,
    signer: Option<Address>,
    nonce: u64,
    block: u64,
    approval_submissions: usize,
    transfer_submissions: usize,
    approval_failure: Option<InjectedFailure>,
    transfer_failure: Option<InjectedFailure>,
}

#[derive(Debug, Clone)]
enum Operation {
    Approve {
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    },
    BatchTransfer {
        token: Address,
        sender: Address,
        recipients: Vec<Address>,
        amounts: Vec<U256>,
    },
}

/// An in-process stand-in for a wallet, ERC-20 tokens and the batch contract.
///
/// Cloning is cheap and every clone shares the same ledger, so one instance
/// can be handed to the orchestrator as all three collaborators while a test
/// keeps a handle to inspect balances and inject failures. State changes are
/// applied when a transaction is confirmed, not when it is submitted.
#[derive(Clone)]
pub struct SimulatedLedger {
    batch_contract: Address,
    state: Arc<RwLock<LedgerState>>,
    paused: Arc<watch::Sender<bool>>,
}

impl SimulatedLedger {
    /// Creates an empty ledger whose batch contract lives at `batch_contract`
    /// and charges `fee` base units per batch.
    pub fn new(batch_contract: Address, fee: U256) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            batch_contract,
            state: Arc::new(RwLock::new(LedgerState {
                fee,
                ..LedgerState::default()
            })),
            paused: Arc::new(paused),
        }
    }

    pub fn batch_contract(&self) -> Address {
        self.batch_contract
    }

    pub fn deploy_token(&self, token: Address, decimals: u8) {
        self.write().tokens.insert(
            token,
            TokenState {
                decimals,
                ..TokenState::default()
            },
        );
    }

    pub fn mint(&self, token: Address, owner: Address, amount: U256) {
        let mut state = self.write();
        let balance = state
            .tokens
            .entry(token)
            .or_default()
            .balances
            .entry(owner)
            .or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.write()
            .tokens
            .entry(token)
            .or_default()
            .allowances
            .insert((owner, spender), amount);
    }

    /// Sets the account the wallet hands out; `None` means no wallet installed.
    pub fn set_wallet(&self, account: Option<Address>) {
        self.write().wallet = account;
    }

    pub fn reject_connections(&self, reject: bool) {
        self.write().wallet_rejects = reject;
    }

    pub fn reject_next_approval(&self) {
        self.write().approval_failure = Some(InjectedFailure::Rejected);
    }

    pub fn revert_next_approval(&self, reason: impl Into<String>) {
        self.write().approval_failure = Some(InjectedFailure::Reverted(reason.into()));
    }

    pub fn reject_next_transfer(&self) {
        self.write().transfer_failure = Some(InjectedFailure::Rejected);
    }

    pub fn revert_next_transfer(&self, reason: impl Into<String>) {
        self.write().transfer_failure = Some(InjectedFailure::Reverted(reason.into()));
    }

    /// Holds every pending transaction unconfirmed until resumed.
    pub fn pause_confirmations(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_confirmations(&self) {
        self.paused.send_replace(false);
    }

    pub fn balance(&self, token: Address, owner: Address) -> U256 {
        self.read()
            .tokens
            .get(&token)
            .map(|t| t.balance(owner))
            .unwrap_or_default()
    }

    pub fn allowance_of(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.read()
            .tokens
            .get(&token)
            .map(|t| t.allowance(owner, spender))
            .unwrap_or_default()
    }

    pub fn approval_submissions(&self) -> usize {
        self.read().approval_submissions
    }

    pub fn transfer_submissions(&self) -> usize {
        self.read().transfer_submissions
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn signer(&self) -> Result<Address> {
        self.read().signer.ok_or(BatchPayError::WalletUnavailable)
    }

    fn submit(&self, operation: Operation, failure: Option<InjectedFailure>) -> Result<PendingTxBox> {
        let revert = match failure {
            Some(InjectedFailure::Rejected) => {
                return Err(BatchPayError::TransactionFailed(
                    "user rejected transaction".to_string(),
                ));
            }
            Some(InjectedFailure::Reverted(reason)) => Some(reason),
            None => None,
        };

        let tx_hash = {
            let mut state = self.write();
            state.nonce += 1;
            keccak256(state.nonce.to_be_bytes())
        };
        tracing::debug!(%tx_hash, ?operation, "simulated transaction submitted");

        Ok(Box::new(SimulatedTx {
            ledger: self.clone(),
            tx_hash,
            operation,
            revert,
        }))
    }

    /// Applies a confirmed operation, or reverts it without side effects.
    fn execute(&self, operation: &Operation) -> std::result::Result<u64, String> {
        let mut state = self.write();
        match operation {
            Operation::Approve {
                token,
                owner,
                spender,
                amount,
            } => {
                let token = state
                    .tokens
                    .get_mut(token)
                    .ok_or_else(|| format!("no token contract at {token}"))?;
                token.allowances.insert((*owner, *spender), *amount);
            }
            Operation::BatchTransfer {
                token,
                sender,
                recipients,
                amounts,
            } => {
                let fee = state.fee;
                let batch_contract = self.batch_contract;
                let token = state
                    .tokens
                    .get_mut(token)
                    .ok_or_else(|| format!("no token contract at {token}"))?;

                let needed = amounts
                    .iter()
                    .try_fold(fee, |acc, amount| acc.checked_add(*amount))
                    .ok_or_else(|| "arithmetic overflow".to_string())?;
                let allowance = token.allowance(*sender, batch_contract);
                if allowance < needed {
                    return Err("ERC20: insufficient allowance".to_string());
                }
                let balance = token.balance(*sender);
                if balance < needed {
                    return Err("ERC20: transfer amount exceeds balance".to_string());
                }

                // Credits are computed on a copy so an overflow reverts the whole transfer.
                let mut balances = token.balances.clone();
                balances.insert(*sender, balance - needed);
                let credits = recipients
                    .iter()
                    .zip(amounts)
                    .chain(std::iter::once((&batch_contract, &fee)));
                for (recipient, amount) in credits {
                    let entry = balances.entry(*recipient).or_default();
                    *entry = entry
                        .checked_add(*amount)
                        .ok_or_else(|| "arithmetic overflow".to_string())?;
                }
                token.balances = balances;
                token
                    .allowances
                    .insert((*sender, batch_contract), allowance - needed);
            }
        }
        state.block += 1;
        Ok(state.block)
    }
}

#[async_trait]
impl WalletConnector for SimulatedLedger {
    async fn request_connection(&self) -> Result<Address> {
        let mut state = self.write();
        let account = state.wallet.ok_or(BatchPayError::WalletUnavailable)?;
        if state.wallet_rejects {
            return Err(BatchPayError::ConnectionRejected(
                "user rejected the request".to_string(),
            ));
        }
        state.signer = Some(account);
        Ok(account)
    }
}

#[async_trait]
impl TokenClient for SimulatedLedger {
    async fn precision(&self, token: Address) -> Result<u8> {
        self.read()
            .tokens
            .get(&token)
            .map(|t| t.decimals)
            .ok_or_else(|| BatchPayError::TransactionFailed(format!("no token contract at {token}")))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        Ok(self.allowance_of(token, owner, spender))
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        Ok(self.balance(token, owner))
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<PendingTxBox> {
        let owner = self.signer()?;
        let failure = {
            let mut state = self.write();
            state.approval_submissions += 1;
            state.approval_failure.take()
        };
        self.submit(
            Operation::Approve {
                token,
                owner,
                spender,
                amount,
            },
            failure,
        )
    }
}

#[async_trait]
impl BatchPaymentClient for SimulatedLedger {
    fn address(&self) -> Address {
        self.batch_contract
    }

    async fn fee(&self) -> Result<U256> {
        Ok(self.read().fee)
    }

    async fn batch_transfer(
        &self,
        token: Address,
        recipients: Vec<Address>,
        amounts: Vec<U256>,
    ) -> Result<PendingTxBox> {
        if recipients.len() != amounts.len() {
            return Err(BatchPayError::TransactionFailed(
                "recipients and amounts length mismatch".to_string(),
            ));
        }
        let sender = self.signer()?;
        let failure = {
            let mut state = self.write();
            state.transfer_submissions += 1;
            state.transfer_failure.take()
        };
        self.submit(
            Operation::BatchTransfer {
                token,
                sender,
                recipients,
                amounts,
            },
            failure,
        )
    }
}

struct SimulatedTx {
    ledger: SimulatedLedger,
    tx_hash: TxHash,
    operation: Operation,
    revert: Option<String>,
}

#[async_trait]
impl PendingTx for SimulatedTx {
    fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    async fn await_confirmation(self: Box<Self>) -> Result<Receipt> {
        let mut paused = self.ledger.paused.subscribe();
        if paused.wait_for(|paused| !*paused).await.is_err() {
            return Err(BatchPayError::TransactionFailed(
                "ledger shut down".to_string(),
            ));
        }

        let tx_hash = self.tx_hash;
        let reverted = |reason: String| {
            BatchPayError::TransactionFailed(format!("transaction {tx_hash} reverted: {reason}"))
        };
        if let Some(reason) = self.revert.clone() {
            return Err(reverted(reason));
        }
        let block_number = self.ledger.execute(&self.operation).map_err(reverted)?;

        Ok(Receipt {
            tx_hash,
            block_number,
        })
    }
}
