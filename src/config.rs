use alloy_primitives::{Address, address};

/// Batch payment contract used when none is configured.
pub const DEFAULT_BATCH_CONTRACT: Address = address!("0xc1AD5414f3dE089F47A00736Bf5990cAC7aC05e5");

/// Whether an approval transaction is sent when the existing allowance
/// already covers the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ApprovalPolicy {
    /// Read the current allowance first and skip approval when it suffices.
    #[default]
    CheckAllowance,
    /// Always submit a fresh approval for the exact required amount.
    Always,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub approval_policy: ApprovalPolicy,
}

impl OrchestratorConfig {
    pub fn with_approval_policy(mut self, approval_policy: ApprovalPolicy) -> Self {
        self.approval_policy = approval_policy;
        self
    }
}
