use std::fmt;

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::Address;
use alloy_provider::{DynProvider, Provider};
use async_trait::async_trait;

use crate::{BlockRef, DeployerError, Result};

/// The L1 reads the pipeline needs.
#[async_trait]
pub trait L1Client: fmt::Debug + Send + Sync {
    /// The chain ID of the L1.
    async fn chain_id(&self) -> Result<u64>;

    /// The pending nonce of `address`.
    async fn nonce(&self, address: Address) -> Result<u64>;

    /// The latest L1 block.
    async fn latest_block(&self) -> Result<BlockRef>;
}

/// An [`L1Client`] over a JSON-RPC provider.
#[derive(Clone)]
pub struct RpcL1Client(pub DynProvider);

impl fmt::Debug for RpcL1Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RpcL1Client").finish_non_exhaustive()
    }
}

#[async_trait]
impl L1Client for RpcL1Client {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.0.get_chain_id().await?)
    }

    async fn nonce(&self, address: Address) -> Result<u64> {
        Ok(self.0.get_transaction_count(address).pending().await?)
    }

    async fn latest_block(&self) -> Result<BlockRef> {
        let block = self
            .0
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| DeployerError::Rpc("latest block not found".to_string()))?;
        Ok(BlockRef {
            number: block.header.number,
            hash: block.header.hash,
            parent_hash: block.header.parent_hash,
            timestamp: block.header.timestamp,
        })
    }
}
