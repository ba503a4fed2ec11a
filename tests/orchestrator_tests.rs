mod common;

use alloy_primitives::{Address, U256};
use batchpay::domain::state::{OrchestrationState, Severity};
use batchpay::error::BatchPayError;
use batchpay::infrastructure::simulated::SimulatedLedger;
use common::*;

#[tokio::test]
async fn test_pay_before_approve_is_rejected_without_network_call() {
    let ledger = funded_ledger();
    let (orchestrator, mut stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},1")).unwrap();

    assert_eq!(orchestrator.pay().await, Err(BatchPayError::NotApproved));
    assert_eq!(ledger.transfer_submissions(), 0);
    assert_eq!(ledger.approval_submissions(), 0);

    let events = drain(&mut stream);
    assert_eq!(events.last().unwrap().severity, Severity::Error);
}

#[tokio::test]
async fn test_failed_approval_returns_to_ready_and_can_be_retried() {
    let ledger = funded_ledger();
    let (orchestrator, mut stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator
        .set_csv_input(&format!("{ALICE},1.5\n{BOB},2.5"))
        .unwrap();

    ledger.revert_next_approval("token paused");
    let result = orchestrator.approve(TOKEN).await;
    assert!(matches!(result, Err(BatchPayError::TransactionFailed(ref msg)) if msg.contains("token paused")));
    assert_eq!(
        orchestrator.current_state(),
        OrchestrationState::Ready {
            account: operator(),
            token: token(),
        }
    );
    assert_eq!(orchestrator.pay().await, Err(BatchPayError::NotApproved));

    let failure = drain(&mut stream)
        .into_iter()
        .find(|e| e.severity == Severity::Error)
        .unwrap();
    assert!(failure.message.starts_with("Approval failed:"));

    let request = orchestrator.approve(TOKEN).await.unwrap();
    assert_eq!(request.required_allowance(), units("4000000000000001000"));
    assert_eq!(ledger.approval_submissions(), 2);
    assert_eq!(
        ledger.allowance_of(token(), operator(), ledger.batch_contract()),
        units("4000000000000001000")
    );
}

#[tokio::test]
async fn test_rejected_approval_invalidates_previous_batch() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},1")).unwrap();
    orchestrator.approve(TOKEN).await.unwrap();
    assert!(orchestrator.current_state().can_pay());

    orchestrator.set_csv_input(&format!("{ALICE},5")).unwrap();
    ledger.reject_next_approval();
    assert!(orchestrator.approve(TOKEN).await.is_err());

    assert!(!orchestrator.current_state().can_pay());
    assert_eq!(orchestrator.pay().await, Err(BatchPayError::NotApproved));
}

#[tokio::test]
async fn test_pay_uses_the_approved_batch_not_the_current_input() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator
        .set_csv_input(&format!("{ALICE},1.5\n{BOB},2.5"))
        .unwrap();
    orchestrator.approve(TOKEN).await.unwrap();

    let preview = orchestrator
        .set_csv_input(&format!("{ALICE},100\n{BOB},200"))
        .unwrap();
    assert_eq!(preview.total, "300");

    orchestrator.pay().await.unwrap();

    assert_eq!(
        ledger.balance(token(), ALICE.parse().unwrap()),
        units("1500000000000000000")
    );
    assert_eq!(
        ledger.balance(token(), BOB.parse().unwrap()),
        units("2500000000000000000")
    );
    assert_eq!(
        ledger.balance(token(), ledger.batch_contract()),
        units(&FEE.to_string())
    );
    assert!(matches!(
        orchestrator.current_state(),
        OrchestrationState::Completed { .. }
    ));
}

#[tokio::test]
async fn test_concurrent_approve_is_rejected_while_pending() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},1")).unwrap();
    ledger.pause_confirmations();

    let (first, second, ()) = tokio::join!(
        orchestrator.approve(TOKEN),
        orchestrator.approve(TOKEN),
        async {
            tokio::task::yield_now().await;
            ledger.resume_confirmations();
        }
    );

    assert!(first.is_ok());
    assert_eq!(second, Err(BatchPayError::OperationInProgress("approval")));
    assert_eq!(ledger.approval_submissions(), 1);
    assert!(orchestrator.current_state().can_pay());
}

#[tokio::test]
async fn test_concurrent_pay_is_rejected_while_pending() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},1")).unwrap();
    orchestrator.approve(TOKEN).await.unwrap();
    ledger.pause_confirmations();

    let (first, second, third, ()) = tokio::join!(
        orchestrator.pay(),
        orchestrator.pay(),
        orchestrator.approve(TOKEN),
        async {
            tokio::task::yield_now().await;
            ledger.resume_confirmations();
        }
    );

    assert!(first.is_ok());
    assert_eq!(second, Err(BatchPayError::OperationInProgress("payment")));
    assert!(matches!(third, Err(BatchPayError::OperationInProgress(_))));
    assert_eq!(ledger.transfer_submissions(), 1);
}

#[tokio::test]
async fn test_failed_payment_keeps_approval_for_retry() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},2")).unwrap();
    let request = orchestrator.approve(TOKEN).await.unwrap();

    ledger.revert_next_transfer("out of gas");
    assert!(matches!(
        orchestrator.pay().await,
        Err(BatchPayError::TransactionFailed(_))
    ));
    assert_eq!(orchestrator.current_state().approved_request(), Some(&request));

    orchestrator.pay().await.unwrap();
    assert_eq!(ledger.approval_submissions(), 1);
    assert_eq!(ledger.transfer_submissions(), 2);
    assert_eq!(
        ledger.balance(token(), ALICE.parse().unwrap()),
        units("2000000000000000000")
    );
}

#[tokio::test]
async fn test_completed_batch_cannot_be_paid_twice() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},1")).unwrap();
    orchestrator.approve(TOKEN).await.unwrap();
    orchestrator.pay().await.unwrap();

    assert_eq!(orchestrator.pay().await, Err(BatchPayError::NotApproved));
    assert_eq!(ledger.transfer_submissions(), 1);
}

#[tokio::test]
async fn test_amount_too_precise_for_token_fails_whole_batch() {
    let ledger = funded_ledger();
    ledger.deploy_token(token(), 2);
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator
        .set_csv_input(&format!("{ALICE},1.25\n{BOB},0.001"))
        .unwrap();

    assert!(matches!(
        orchestrator.approve(TOKEN).await,
        Err(BatchPayError::InvalidAmount(_))
    ));
    assert_eq!(ledger.approval_submissions(), 0);
    assert_eq!(orchestrator.current_state().name(), "ready");
}

#[tokio::test]
async fn test_connection_failures() {
    let ledger = funded_ledger();
    let (orchestrator, mut stream) = orchestrator(&ledger);

    ledger.set_wallet(None);
    assert_eq!(
        orchestrator.connect().await,
        Err(BatchPayError::WalletUnavailable)
    );

    ledger.set_wallet(Some(operator()));
    ledger.reject_connections(true);
    assert!(matches!(
        orchestrator.connect().await,
        Err(BatchPayError::ConnectionRejected(_))
    ));
    assert_eq!(orchestrator.current_state(), OrchestrationState::Disconnected);

    let events = drain(&mut stream);
    assert!(events.iter().all(|e| e.message.starts_with("Connection failed:")));

    ledger.reject_connections(false);
    assert_eq!(orchestrator.connect().await, Ok(operator()));
}

#[tokio::test]
async fn test_rejected_input_still_replaces_the_recipient_list() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},1")).unwrap();

    let too_fine = format!("{BOB},7\n{ALICE},0.{}1", "0".repeat(80));
    assert!(matches!(
        orchestrator.set_csv_input(&too_fine),
        Err(BatchPayError::InvalidAmount(_))
    ));

    assert!(matches!(
        orchestrator.approve(TOKEN).await,
        Err(BatchPayError::InvalidAmount(_))
    ));
    assert_eq!(ledger.approval_submissions(), 0);
    assert!(!orchestrator.current_state().can_pay());
}

#[tokio::test]
async fn test_failed_input_checks_drop_an_approved_batch() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},1")).unwrap();
    orchestrator.approve(TOKEN).await.unwrap();

    orchestrator.set_csv_input("").unwrap();
    assert_eq!(
        orchestrator.approve(TOKEN).await,
        Err(BatchPayError::NoValidRecipients)
    );
    assert_eq!(
        orchestrator.current_state(),
        OrchestrationState::Connected { account: operator() }
    );
    assert_eq!(orchestrator.pay().await, Err(BatchPayError::NotApproved));

    orchestrator.set_csv_input(&format!("{ALICE},1")).unwrap();
    orchestrator.approve(TOKEN).await.unwrap();
    assert!(matches!(
        orchestrator.approve("0xnot-a-token").await,
        Err(BatchPayError::InvalidTokenAddress(_))
    ));
    assert_eq!(orchestrator.pay().await, Err(BatchPayError::NotApproved));
    assert_eq!(ledger.transfer_submissions(), 0);
}

#[tokio::test]
async fn test_partial_allowance_is_topped_up_to_the_exact_requirement() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    ledger.set_allowance(token(), operator(), ledger.batch_contract(), units("3000000000000000000"));
    orchestrator
        .set_csv_input(&format!("{ALICE},1.5\n{BOB},2.5"))
        .unwrap();

    let request = orchestrator.approve(TOKEN).await.unwrap();

    assert_eq!(ledger.approval_submissions(), 1);
    assert_eq!(
        ledger.allowance_of(token(), operator(), ledger.batch_contract()),
        request.required_allowance()
    );
    assert_eq!(request.required_allowance(), units("4000000000000001000"));
}

#[tokio::test]
async fn test_connect_and_disconnect_are_rejected_while_paying() {
    let ledger = funded_ledger();
    let (orchestrator, _stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},1")).unwrap();
    orchestrator.approve(TOKEN).await.unwrap();
    ledger.pause_confirmations();

    let (paid, (connected, disconnected)) = tokio::join!(orchestrator.pay(), async {
        tokio::task::yield_now().await;
        let connected = orchestrator.connect().await;
        let disconnected = orchestrator.disconnect();
        ledger.resume_confirmations();
        (connected, disconnected)
    });

    assert!(paid.is_ok());
    assert_eq!(connected, Err(BatchPayError::OperationInProgress("payment")));
    assert_eq!(disconnected, Err(BatchPayError::OperationInProgress("payment")));
    assert!(matches!(
        orchestrator.current_state(),
        OrchestrationState::Completed { .. }
    ));
}

#[tokio::test]
async fn test_low_balance_is_reported_before_sending() {
    let ledger = SimulatedLedger::new(Address::repeat_byte(0xbc), U256::from(FEE));
    ledger.deploy_token(token(), 18);
    ledger.mint(token(), operator(), units("1000000000000000000"));
    ledger.set_wallet(Some(operator()));
    let (orchestrator, mut stream) = orchestrator(&ledger);
    orchestrator.connect().await.unwrap();
    orchestrator.set_csv_input(&format!("{ALICE},5")).unwrap();
    orchestrator.approve(TOKEN).await.unwrap();

    assert!(matches!(
        orchestrator.pay().await,
        Err(BatchPayError::TransactionFailed(_))
    ));

    let messages: Vec<String> = drain(&mut stream).into_iter().map(|e| e.message).collect();
    assert!(messages.contains(
        &"Balance of 1 tokens is below the 5.000000000000001 tokens this batch needs.".to_string()
    ));
    assert!(orchestrator.current_state().can_pay());
}
