use thiserror::Error;

pub type Result<T> = std::result::Result<T, BatchPayError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchPayError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid token address: {0}")]
    InvalidTokenAddress(String),
    #[error("No valid recipients")]
    NoValidRecipients,
    #[error("No compatible wallet available")]
    WalletUnavailable,
    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),
    #[error("Wallet not connected")]
    NotConnected,
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
    #[error("Batch not approved, approve before paying")]
    NotApproved,
    #[error("Another {0} is already in progress")]
    OperationInProgress(&'static str),
    #[error("IO error: {0}")]
    Io(String),
    #[error("CSV error: {0}")]
    Csv(String),
}

impl From<std::io::Error> for BatchPayError {
    fn from(err: std::io::Error) -> Self {
        BatchPayError::Io(err.to_string())
    }
}

impl From<csv::Error> for BatchPayError {
    fn from(err: csv::Error) -> Self {
        BatchPayError::Csv(err.to_string())
    }
}
