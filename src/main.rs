use alloy_primitives::{Address, TxHash, U256, address};
use batchpay::application::orchestrator::PaymentOrchestrator;
use batchpay::config::{ApprovalPolicy, DEFAULT_BATCH_CONTRACT, OrchestratorConfig};
use batchpay::domain::address::parse_token_address;
use batchpay::domain::amount::to_base_units;
use batchpay::infrastructure::simulated::SimulatedLedger;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Account the simulated wallet signs with.
const OPERATOR: Address = address!("0x0101010101010101010101010101010101010101");

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Recipients CSV file (`address,amount` per line), or `-` for stdin
    input: PathBuf,

    /// Token contract to pay with
    #[arg(long)]
    token: String,

    /// Batch payment contract the allowance is granted to
    #[arg(long, default_value_t = DEFAULT_BATCH_CONTRACT)]
    batch_contract: Address,

    /// Whether to skip approval when the existing allowance already suffices
    #[arg(long, value_enum, default_value_t = ApprovalPolicy::CheckAllowance)]
    approval_policy: ApprovalPolicy,

    /// Decimals of the simulated token
    #[arg(long, default_value_t = 18)]
    decimals: u8,

    /// Protocol fee charged by the simulated batch contract, in base units
    #[arg(long, default_value_t = U256::ZERO)]
    fee: U256,

    /// Operator balance of the simulated token, in whole tokens
    #[arg(long, default_value = "1000000")]
    balance: String,

    /// Stop after the approval step
    #[arg(long)]
    approve_only: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Summary {
    state: String,
    recipients: usize,
    preview_total: String,
    required_allowance: String,
    tx_hash: Option<TxHash>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let input = read_input(&cli.input).into_diagnostic()?;
    let token = parse_token_address(&cli.token).into_diagnostic()?;

    let ledger = SimulatedLedger::new(cli.batch_contract, cli.fee);
    ledger.deploy_token(token, cli.decimals);
    ledger.mint(
        token,
        OPERATOR,
        to_base_units(&cli.balance, cli.decimals).into_diagnostic()?,
    );
    ledger.set_wallet(Some(OPERATOR));

    let config = OrchestratorConfig::default().with_approval_policy(cli.approval_policy);
    let (orchestrator, mut status) = PaymentOrchestrator::new(
        Arc::new(ledger.clone()),
        Arc::new(ledger.clone()),
        Arc::new(ledger),
        config,
    );

    let printer = tokio::spawn(async move {
        while let Some(event) = status.recv().await {
            eprintln!("{event}");
        }
    });

    let preview = orchestrator.set_csv_input(&input).into_diagnostic()?;
    let outcome = async {
        orchestrator.connect().await?;
        let request = orchestrator.approve(&cli.token).await?;
        let receipt = if cli.approve_only {
            None
        } else {
            Some(orchestrator.pay().await?)
        };
        Ok::<_, batchpay::error::BatchPayError>((request, receipt))
    }
    .await;

    let state = orchestrator.current_state();
    // Dropping the orchestrator closes the status stream so the printer drains.
    drop(orchestrator);
    printer.await.into_diagnostic()?;

    let (request, receipt) = outcome.into_diagnostic()?;
    let summary = Summary {
        state: state.to_string(),
        recipients: preview.recipients,
        preview_total: preview.total,
        required_allowance: request.display_required_allowance(),
        tx_hash: receipt.map(|r| r.tx_hash),
    };

    if cli.json {
        println!("{}", serde_json::to_string(&summary).into_diagnostic()?);
    } else {
        println!("state: {}", summary.state);
        println!("recipients: {}", summary.recipients);
        println!("preview_total: {}", summary.preview_total);
        println!("required_allowance: {}", summary.required_allowance);
        if let Some(tx_hash) = summary.tx_hash {
            println!("tx_hash: {tx_hash}");
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> io::Result<String> {
    if path.as_os_str() == "-" {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        Ok(input)
    } else {
        std::fs::read_to_string(path)
    }
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
