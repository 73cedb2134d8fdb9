use alloy_primitives::{hex, Address, Bytes};

use crate::forking::{ForkError, ForkId};

/// Errors produced by the script host.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// A call or create reverted.
    #[error("execution reverted at {address}: {}", revert_reason(.message, .data))]
    Revert {
        /// The contract whose execution reverted.
        address: Address,
        /// The decoded `Error(string)` message, if the revert data carried one.
        message: Option<String>,
        /// The raw revert data.
        data: Bytes,
    },

    /// Execution halted with an exceptional result.
    #[error("execution halted: {0}")]
    Halt(String),

    /// A contract creation did not land at the expected address.
    #[error("create address mismatch: expected {expected}, got {actual}")]
    CreateAddressMismatch {
        /// The address derived from the deployer nonce.
        expected: Address,
        /// The address reported by the EVM.
        actual: Address,
    },

    /// Contract creation failed without reverting.
    #[error("failed to create contract, return: {returned}")]
    CreateFailed {
        /// A shortened hex rendering of the return data.
        returned: String,
    },

    /// Cheat codes were enabled twice on the same host.
    #[error("cheatcodes are already enabled")]
    CheatsAlreadyEnabled,

    /// A prank and a broadcast were mixed in the same frame.
    #[error("prank conflict: {0}")]
    PrankConflict(String),

    /// A frame-scoped operation was requested outside of any call frame.
    #[error("no call frame")]
    NoCallFrame,

    /// The requested contract artifact does not exist.
    #[error("artifact {contract} not found in {name}")]
    ArtifactMissing {
        /// The source file name, e.g. `Proxy.sol`.
        name: String,
        /// The contract name.
        contract: String,
    },

    /// The artifact exists but could not be used.
    #[error("invalid artifact: {0}")]
    Artifact(String),

    /// A fork id that was never created.
    #[error("fork {0} does not exist")]
    ForkMissing(ForkId),

    /// Forkable state failure.
    #[error(transparent)]
    Fork(#[from] ForkError),

    /// A binding signature is not part of the referenced ABI.
    #[error("ABI check failed for {0}")]
    AbiCheck(String),

    /// ABI encoding or decoding failure.
    #[error("ABI error: {0}")]
    Abi(String),

    /// The cheat code is deliberately not supported by this host.
    #[error("cheatcode {0} is not supported")]
    UnsupportedCheat(String),

    /// A cheat code failed; the message is returned to the calling script.
    #[error("{0}")]
    Cheatcode(String),

    /// A host-side precompile is already installed at the address.
    #[error("already have existing precompile override at {0}")]
    PrecompileExists(Address),

    /// A direct state access failed.
    #[error("database error: {0}")]
    Database(String),

    /// The EVM rejected the transaction before executing it.
    #[error("EVM error: {0}")]
    Evm(String),

    /// File access failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<alloy_sol_types::Error> for ScriptError {
    fn from(err: alloy_sol_types::Error) -> Self {
        Self::Abi(err.to_string())
    }
}

impl From<alloy_dyn_abi::Error> for ScriptError {
    fn from(err: alloy_dyn_abi::Error) -> Self {
        Self::Abi(err.to_string())
    }
}

fn revert_reason(message: &Option<String>, data: &Bytes) -> String {
    message.clone().unwrap_or_else(|| hex::encode_prefixed(data))
}

/// Result type of the script host.
pub type Result<T, E = ScriptError> = std::result::Result<T, E>;
