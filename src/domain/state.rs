use crate::domain::batch::BatchRequest;
use crate::domain::ports::Receipt;
use alloy_primitives::Address;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of one operator session.
///
/// `Approving` and `Paying` are the in-flight states; every other state is a
/// stable point the session can be left in and retried from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrchestrationState {
    Disconnected,
    Connected {
        account: Address,
    },
    Ready {
        account: Address,
        token: Address,
    },
    Approving {
        account: Address,
        token: Address,
    },
    Approved {
        account: Address,
        request: Arc<BatchRequest>,
    },
    Paying {
        account: Address,
        request: Arc<BatchRequest>,
    },
    Completed {
        account: Address,
        request: Arc<BatchRequest>,
        receipt: Receipt,
    },
}

impl OrchestrationState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected { .. } => "connected",
            Self::Ready { .. } => "ready",
            Self::Approving { .. } => "approving",
            Self::Approved { .. } => "approved",
            Self::Paying { .. } => "paying",
            Self::Completed { .. } => "completed",
        }
    }

    pub fn account(&self) -> Option<Address> {
        match self {
            Self::Disconnected => None,
            Self::Connected { account }
            | Self::Ready { account, .. }
            | Self::Approving { account, .. }
            | Self::Approved { account, .. }
            | Self::Paying { account, .. }
            | Self::Completed { account, .. } => Some(*account),
        }
    }

    /// The approved batch, if one is waiting to be paid.
    pub fn approved_request(&self) -> Option<&Arc<BatchRequest>> {
        match self {
            Self::Approved { request, .. } => Some(request),
            _ => None,
        }
    }

    /// Names the operation currently waiting on the network, if any.
    pub fn in_flight(&self) -> Option<&'static str> {
        match self {
            Self::Approving { .. } => Some("approval"),
            Self::Paying { .. } => Some("payment"),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight().is_some()
    }

    /// Approval needs a connected wallet and nothing else in flight.
    pub fn can_approve(&self) -> bool {
        !matches!(self, Self::Disconnected) && !self.is_busy()
    }

    pub fn can_pay(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

impl fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Success => f.write_str("SUCCESS"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// A progress notification for whichever front end is listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub message: String,
    pub severity: Severity,
}

impl StatusEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Info,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Success,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}
