use crate::config::{ApprovalPolicy, OrchestratorConfig};
use crate::domain::address::parse_token_address;
use crate::domain::amount::from_base_units;
use crate::domain::batch::BatchRequest;
use crate::domain::ports::{BatchPaymentClientRef, Receipt, TokenClientRef, WalletConnectorRef};
use crate::domain::recipient::{PreviewTotal, RecipientRecord, preview_total};
use crate::domain::state::{OrchestrationState, StatusEvent};
use crate::error::{BatchPayError, Result};
use crate::interfaces::csv::recipient_reader::parse_recipients;
use alloy_primitives::Address;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

pub type StatusStream = mpsc::UnboundedReceiver<StatusEvent>;

struct Session {
    state: OrchestrationState,
    version: u64,
    recipients: Vec<RecipientRecord>,
}

/// Drives one operator session through connect, approve and pay.
///
/// The session lock is only taken for synchronous checks and transitions and is
/// never held across a network call. Approve and pay are serialized by the
/// in-flight states instead: while one is waiting on the network every other
/// command fails fast with `OperationInProgress`.
pub struct PaymentOrchestrator {
    wallet: WalletConnectorRef,
    token_client: TokenClientRef,
    batch_client: BatchPaymentClientRef,
    config: OrchestratorConfig,
    session: Mutex<Session>,
    status: mpsc::UnboundedSender<StatusEvent>,
}

impl PaymentOrchestrator {
    /// Creates a new orchestrator and the stream its status events are sent to.
    pub fn new(
        wallet: WalletConnectorRef,
        token_client: TokenClientRef,
        batch_client: BatchPaymentClientRef,
        config: OrchestratorConfig,
    ) -> (Self, StatusStream) {
        let (status, stream) = mpsc::unbounded_channel();
        let orchestrator = Self {
            wallet,
            token_client,
            batch_client,
            config,
            session: Mutex::new(Session {
                state: OrchestrationState::Disconnected,
                version: 0,
                recipients: Vec::new(),
            }),
            status,
        };
        (orchestrator, stream)
    }

    pub fn current_state(&self) -> OrchestrationState {
        self.session().state.clone()
    }

    /// Incremented on every state transition.
    pub fn version(&self) -> u64 {
        self.session().version
    }

    /// Advisory check of a token address; does not touch the session.
    pub fn validate_token_address(&self, input: &str) -> Result<Address> {
        parse_token_address(input)
    }

    /// Replaces the recipient list with the valid rows of `text`.
    ///
    /// Only affects the next approval. An already approved batch keeps the
    /// amounts it was approved with. The list is stored even when the preview
    /// cannot be computed, so a later approval never sees the previous input.
    pub fn set_csv_input(&self, text: &str) -> Result<PreviewTotal> {
        let recipients = parse_recipients(text);
        let preview = preview_total(&recipients);
        self.session().recipients = recipients;

        let preview = preview?;
        tracing::debug!(
            recipients = preview.recipients,
            total = %preview.total,
            "recipient list updated"
        );
        Ok(preview)
    }

    pub async fn connect(&self) -> Result<Address> {
        if let Some(operation) = self.session().state.in_flight() {
            return Err(self.reject(BatchPayError::OperationInProgress(operation)));
        }

        let account = match self.wallet.request_connection().await {
            Ok(account) => account,
            Err(e) => {
                self.emit(StatusEvent::error(format!("Connection failed: {e}")));
                return Err(e);
            }
        };

        let mut session = self.session();
        if let Some(operation) = session.state.in_flight() {
            return Err(self.reject(BatchPayError::OperationInProgress(operation)));
        }
        self.transition(&mut session, OrchestrationState::Connected { account });
        drop(session);

        self.emit(StatusEvent::info("Wallet connected. Ready to configure."));
        Ok(account)
    }

    pub fn disconnect(&self) -> Result<()> {
        let mut session = self.session();
        if let Some(operation) = session.state.in_flight() {
            return Err(self.reject(BatchPayError::OperationInProgress(operation)));
        }
        self.transition(&mut session, OrchestrationState::Disconnected);
        drop(session);

        self.emit(StatusEvent::info("Wallet disconnected."));
        Ok(())
    }

    /// Grants the batch contract an allowance covering the current recipient
    /// list plus the protocol fee.
    ///
    /// Any previously approved batch is dropped as soon as the session is
    /// connected, even when the token or recipient checks fail. On failure the
    /// session falls back to `Ready` (or `Connected` for a rejected input),
    /// never to `Approved`, so a stale batch cannot be paid.
    pub async fn approve(&self, token_input: &str) -> Result<Arc<BatchRequest>> {
        let (account, token, records) = {
            let mut session = self.session();
            if let Some(operation) = session.state.in_flight() {
                return Err(self.reject(BatchPayError::OperationInProgress(operation)));
            }
            let Some(account) = session.state.account() else {
                return Err(self.reject(BatchPayError::NotConnected));
            };
            let checked = parse_token_address(token_input).and_then(|token| {
                if session.recipients.is_empty() {
                    Err(BatchPayError::NoValidRecipients)
                } else {
                    Ok(token)
                }
            });
            let token = match checked {
                Ok(token) => token,
                Err(e) => {
                    if session.state.can_pay() {
                        self.transition(&mut session, OrchestrationState::Connected { account });
                    }
                    return Err(self.reject(e));
                }
            };

            let records = session.recipients.clone();
            self.transition(&mut session, OrchestrationState::Ready { account, token });
            self.transition(&mut session, OrchestrationState::Approving { account, token });
            (account, token, records)
        };

        let guard = InFlight::new(self, OrchestrationState::Ready { account, token });
        match self.run_approval(account, token, &records).await {
            Ok(request) => {
                let request = Arc::new(request);
                guard.settle(OrchestrationState::Approved {
                    account,
                    request: Arc::clone(&request),
                });
                self.emit(StatusEvent::success("Approved! You can now batch pay."));
                Ok(request)
            }
            Err(e) => {
                guard.fall_back();
                self.emit(StatusEvent::error(format!("Approval failed: {e}")));
                Err(e)
            }
        }
    }

    async fn run_approval(
        &self,
        account: Address,
        token: Address,
        records: &[RecipientRecord],
    ) -> Result<BatchRequest> {
        self.emit(StatusEvent::info("Checking token..."));
        let precision = self.token_client.precision(token).await?;
        let fee = self.batch_client.fee().await?;
        let request = BatchRequest::build(token, records, precision, fee)?;
        let spender = self.batch_client.address();

        tracing::info!(
            %token,
            precision,
            recipients = request.recipients().len(),
            total = %request.total_base_units(),
            fee = %request.fee_base_units(),
            required = %request.required_allowance(),
            "batch computed"
        );

        if self.config.approval_policy == ApprovalPolicy::CheckAllowance {
            let current = self.token_client.allowance(token, account, spender).await?;
            if current >= request.required_allowance() {
                self.emit(StatusEvent::info(format!(
                    "Existing allowance already covers {} tokens, no approval needed.",
                    request.display_required_allowance()
                )));
                return Ok(request);
            }
        }

        self.emit(StatusEvent::info(format!(
            "Approving {} tokens...",
            request.display_required_allowance()
        )));
        let pending = self
            .token_client
            .approve(token, spender, request.required_allowance())
            .await?;
        self.emit(StatusEvent::info(format!(
            "Approving... waiting for confirmation ({})",
            pending.tx_hash()
        )));
        let receipt = pending.await_confirmation().await?;
        tracing::info!(tx_hash = %receipt.tx_hash, block = receipt.block_number, "approval confirmed");

        Ok(request)
    }

    /// Sends the approved batch exactly as it was approved.
    ///
    /// The current recipient input is not consulted. On failure the session
    /// stays `Approved` so the payment can be retried without a new approval.
    pub async fn pay(&self) -> Result<Receipt> {
        let (account, request) = {
            let mut session = self.session();
            if let Some(operation) = session.state.in_flight() {
                return Err(self.reject(BatchPayError::OperationInProgress(operation)));
            }
            let OrchestrationState::Approved { account, request } = &session.state else {
                return Err(self.reject(BatchPayError::NotApproved));
            };
            let (account, request) = (*account, Arc::clone(request));
            self.transition(
                &mut session,
                OrchestrationState::Paying {
                    account,
                    request: Arc::clone(&request),
                },
            );
            (account, request)
        };

        let guard = InFlight::new(
            self,
            OrchestrationState::Approved {
                account,
                request: Arc::clone(&request),
            },
        );
        match self.run_payment(account, &request).await {
            Ok(receipt) => {
                guard.settle(OrchestrationState::Completed {
                    account,
                    request,
                    receipt,
                });
                self.emit(StatusEvent::success("Batch payment successful."));
                Ok(receipt)
            }
            Err(e) => {
                guard.fall_back();
                self.emit(StatusEvent::error(format!("Payment failed: {e}")));
                Err(e)
            }
        }
    }

    async fn run_payment(&self, account: Address, request: &BatchRequest) -> Result<Receipt> {
        let balance = self.token_client.balance_of(request.token(), account).await?;
        if balance < request.required_allowance() {
            self.emit(StatusEvent::info(format!(
                "Balance of {} tokens is below the {} tokens this batch needs.",
                from_base_units(balance, request.precision()),
                request.display_required_allowance()
            )));
        }

        self.emit(StatusEvent::info("Sending transaction..."));
        let (recipients, amounts) = request.transfer_arrays();
        let pending = self
            .batch_client
            .batch_transfer(request.token(), recipients, amounts)
            .await?;
        self.emit(StatusEvent::info(format!(
            "Transaction sent: {}. Waiting...",
            pending.tx_hash()
        )));
        let receipt = pending.await_confirmation().await?;
        tracing::info!(tx_hash = %receipt.tx_hash, block = receipt.block_number, "batch transfer confirmed");
        Ok(receipt)
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, session: &mut Session, next: OrchestrationState) {
        tracing::debug!(from = %session.state, to = %next, "state transition");
        session.state = next;
        session.version += 1;
    }

    fn emit(&self, event: StatusEvent) {
        tracing::info!(severity = %event.severity, status = %event.message, "status event");
        // Nobody listening is fine.
        let _ = self.status.send(event);
    }

    fn reject(&self, error: BatchPayError) -> BatchPayError {
        self.emit(StatusEvent::error(error.to_string()));
        error
    }
}

/// Keeps an in-flight state honest if its future is dropped mid-operation.
///
/// Whatever was already submitted may still land on chain, but the session
/// must not stay stuck in `Approving`/`Paying` forever.
struct InFlight<'a> {
    orchestrator: &'a PaymentOrchestrator,
    fallback: Option<OrchestrationState>,
}

impl<'a> InFlight<'a> {
    fn new(orchestrator: &'a PaymentOrchestrator, fallback: OrchestrationState) -> Self {
        Self {
            orchestrator,
            fallback: Some(fallback),
        }
    }

    fn settle(mut self, next: OrchestrationState) {
        self.fallback = None;
        let mut session = self.orchestrator.session();
        self.orchestrator.transition(&mut session, next);
    }

    fn fall_back(mut self) {
        if let Some(fallback) = self.fallback.take() {
            let mut session = self.orchestrator.session();
            self.orchestrator.transition(&mut session, fallback);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(fallback) = self.fallback.take() {
            tracing::warn!(state = %fallback, "operation abandoned before confirmation");
            let mut session = self.orchestrator.session();
            self.orchestrator.transition(&mut session, fallback);
        }
    }
}
