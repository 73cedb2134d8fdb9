//! Overlay state with forks of remote chains.
//!
//! [`ForkableState`] routes every account access to either the base state or one of its forks.
//! A fork is an in-memory [`CacheDB`](revm::database::CacheDB) layered over a read-only
//! [`ForkSource`].

use std::{fmt, time::Duration};

use alloy_primitives::{B256, U256};
use revm::database::DBErrorMarker;
use serde::{Deserialize, Serialize};

mod cache;
pub use cache::*;

mod db;
pub use db::*;

mod diff;
pub use diff::*;

mod rpc;
pub use rpc::*;

mod source;
pub use source::*;

mod state;
pub use state::*;

/// Identifies a fork in a [`ForkableState`]. The zero id is the base state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ForkId(pub U256);

impl ForkId {
    /// The base state.
    pub const BASE: Self = Self(U256::ZERO);

    /// Returns `true` for the base state id.
    pub fn is_base(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<u64> for ForkId {
    fn from(id: u64) -> Self {
        Self(U256::from(id))
    }
}

impl From<U256> for ForkId {
    fn from(id: U256) -> Self {
        Self(id)
    }
}

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors of the forkable state and its sources.
#[derive(Debug, thiserror::Error)]
pub enum ForkError {
    /// The fork id was never created.
    #[error("fork {0} does not exist")]
    Missing(ForkId),

    /// The RPC endpoint returned an error.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The RPC endpoint did not answer in time.
    #[error("RPC request timed out after {0:?}")]
    Timeout(Duration),

    /// The pinned block could not be found.
    #[error("block {0} not found")]
    BlockNotFound(String),

    /// Code was requested by a hash no layer knows about.
    #[error("code {0} not found")]
    CodeNotFound(B256),

    /// The source returned code revm cannot load.
    #[error("invalid bytecode: {0}")]
    Bytecode(String),

    /// Blocking access needs a multi-threaded tokio runtime.
    #[error("fork source runtime: {0}")]
    Runtime(String),

    /// A url or alias that the fork factory cannot resolve.
    #[error("unknown fork source {0:?}")]
    UnknownSource(String),
}

impl DBErrorMarker for ForkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_zero_id_is_base() {
        assert!(ForkId::BASE.is_base());
        assert!(ForkId::default().is_base());
        assert!(!ForkId::from(1).is_base());
        assert!(!ForkId(U256::MAX).is_base());
    }
}
