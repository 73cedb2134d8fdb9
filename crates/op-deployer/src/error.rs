use op_script::ScriptError;

use crate::broadcaster::MultiError;

/// Errors produced while deploying.
#[derive(Debug, thiserror::Error)]
pub enum DeployerError {
    /// The intent failed validation.
    #[error("invalid intent: {0}")]
    ConfigInvalid(String),

    /// A field that is fixed after the first apply was changed.
    #[error("{field} cannot be changed after the first apply: {applied} -> {requested}")]
    ImmutableChanged {
        /// The intent field name.
        field: &'static str,
        /// The value of the last applied intent.
        applied: String,
        /// The value of the current intent.
        requested: String,
    },

    /// The state file was written by an unsupported schema version.
    #[error("unsupported state version {0}")]
    UnsupportedVersion(u32),

    /// A contract is not part of the artifact bundle.
    #[error("artifact {contract} not found in {name}")]
    ArtifactMissing {
        /// The source file name.
        name: String,
        /// The contract name.
        contract: String,
    },

    /// The artifact bundle could not be located, downloaded or unpacked.
    #[error("failed to fetch artifacts: {0}")]
    ArtifactBundleFetch(String),

    /// An L1 RPC request failed.
    #[error("L1 RPC error: {0}")]
    Rpc(String),

    /// A deployment script reported outputs that do not match the chain.
    #[error("invalid deployment output: {0}")]
    InvalidOutput(String),

    /// Script execution failed.
    #[error(transparent)]
    Script(ScriptError),

    /// One or more broadcast transactions failed.
    #[error("broadcast failed: {0}")]
    Broadcast(#[from] MultiError),

    /// File access failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML decoding failure.
    #[error(transparent)]
    TomlDecode(#[from] toml::de::Error),

    /// TOML encoding failure.
    #[error(transparent)]
    TomlEncode(#[from] toml::ser::Error),
}

impl From<ScriptError> for DeployerError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::ArtifactMissing { name, contract } => {
                Self::ArtifactMissing { name, contract }
            }
            err => Self::Script(err),
        }
    }
}

impl<E: std::fmt::Display> From<alloy_transport::RpcError<E>> for DeployerError {
    fn from(err: alloy_transport::RpcError<E>) -> Self {
        Self::Rpc(err.to_string())
    }
}

/// Result type of the deployer.
pub type Result<T, E = DeployerError> = std::result::Result<T, E>;
