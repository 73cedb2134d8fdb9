//! Signing, publishing and confirming L1 transactions.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use alloy_eips::{eip2718::Encodable2718, BlockNumberOrTag};
use alloy_network::{Ethereum, EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{DynProvider, Provider};
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Multiplier applied to the suggested priority fee.
pub const TIP_MULTIPLIER: u128 = 20;

/// Fee per blob gas. Deployments never post blobs.
pub const BLOB_FEE: u128 = 1;

/// Errors of a single transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    /// An RPC request failed.
    #[error("RPC error: {0}")]
    Rpc(String),
    /// The transaction could not be built or signed.
    #[error("failed to sign transaction: {0}")]
    Sign(String),
    /// No receipt was seen within the send timeout.
    #[error("transaction {0} not confirmed in time")]
    SendTimeout(B256),
    /// The node dropped the transaction from its mempool.
    #[error("transaction {0} not found in mempool")]
    NotInMempool(B256),
    /// The send task was aborted.
    #[error("transaction send aborted: {0}")]
    Aborted(String),
}

impl<E: fmt::Display> From<alloy_transport::RpcError<E>> for TxError {
    fn from(err: alloy_transport::RpcError<E>) -> Self {
        Self::Rpc(err.to_string())
    }
}

/// A transaction to be nonced, signed and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCandidate {
    /// The call target, `None` for creations.
    pub to: Option<Address>,
    /// Call data or init code.
    pub input: Bytes,
    /// Transferred value.
    pub value: U256,
    /// Gas limit of the transaction.
    pub gas_limit: u64,
}

/// A published and mined transaction.
#[derive(Debug, Clone)]
pub struct SentTx {
    /// The transaction hash.
    pub tx_hash: B256,
    /// The receipt, successful or not.
    pub receipt: TransactionReceipt,
}

/// A transaction in flight, see [`TxManager::send_async`].
#[derive(Debug)]
pub struct PendingTx(JoinHandle<Result<SentTx, TxError>>);

impl PendingTx {
    /// Waits for the transaction to be mined.
    pub async fn wait(self) -> Result<SentTx, TxError> {
        self.0.await.map_err(|err| TxError::Aborted(err.to_string()))?
    }

    /// A pending transaction that already finished.
    pub fn ready(result: Result<SentTx, TxError>) -> Self {
        Self(tokio::spawn(async move { result }))
    }
}

/// Sends transactions from a single account.
pub trait TxManager: fmt::Debug + Send + Sync {
    /// The sending account.
    fn from(&self) -> Address;

    /// Assigns the next nonce to `candidate` and starts sending it.
    ///
    /// Nonces are assigned in call order before this returns.
    fn send_async(&self, candidate: TxCandidate) -> PendingTx;
}

/// Fees of the deployer gas-price policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPrices {
    /// Priority fee per gas.
    pub tip: u128,
    /// Padded base fee.
    pub base_fee: u128,
    /// Fee per blob gas.
    pub blob_fee: u128,
}

impl GasPrices {
    /// Applies the deployer policy to a suggested tip and the latest base fee: the tip is
    /// multiplied by [`TIP_MULTIPLIER`] and the base fee padded by half.
    pub const fn deployer(suggested_tip: u128, base_fee: u128) -> Self {
        Self {
            tip: suggested_tip.saturating_mul(TIP_MULTIPLIER),
            base_fee: base_fee.saturating_add(base_fee / 2),
            blob_fee: BLOB_FEE,
        }
    }

    /// `tip + 2 * base_fee`.
    pub const fn fee_cap(&self) -> u128 {
        self.tip.saturating_add(self.base_fee.saturating_mul(2))
    }
}

/// Timeouts of an [`AlloyTxManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxManagerConfig {
    /// Timeout of a single RPC request.
    pub network_timeout: Duration,
    /// Time to wait for a receipt after publishing.
    pub tx_send_timeout: Duration,
    /// Time after which a transaction without receipt must be visible in the mempool.
    pub tx_not_in_mempool_timeout: Duration,
    /// Interval between receipt queries.
    pub receipt_query_interval: Duration,
}

impl Default for TxManagerConfig {
    fn default() -> Self {
        Self {
            network_timeout: Duration::from_secs(10),
            tx_send_timeout: Duration::from_secs(5 * 60),
            tx_not_in_mempool_timeout: Duration::from_secs(60),
            receipt_query_interval: Duration::from_secs(1),
        }
    }
}

/// A [`TxManager`] signing with a local key and sending through an alloy provider.
///
/// Nonces are tracked locally from the pending nonce at construction. A failed transaction
/// leaves a nonce gap, so callers are expected to abort and start over with a new manager.
#[derive(Clone)]
pub struct AlloyTxManager {
    inner: Arc<Inner>,
}

struct Inner {
    provider: DynProvider,
    wallet: EthereumWallet,
    from: Address,
    chain_id: u64,
    nonce: AtomicU64,
    config: TxManagerConfig,
}

impl fmt::Debug for AlloyTxManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlloyTxManager")
            .field("from", &self.inner.from)
            .field("chain_id", &self.inner.chain_id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl AlloyTxManager {
    /// Creates a manager for `signer`, reading the chain ID and the pending nonce from L1.
    pub async fn new(
        provider: DynProvider,
        signer: PrivateKeySigner,
        config: TxManagerConfig,
    ) -> Result<Self, TxError> {
        let from = signer.address();
        let chain_id = provider.get_chain_id().await?;
        let nonce = provider.get_transaction_count(from).pending().await?;
        info!(%from, chain_id, nonce, "Created transaction manager");
        Ok(Self {
            inner: Arc::new(Inner {
                provider,
                wallet: EthereumWallet::from(signer),
                from,
                chain_id,
                nonce: AtomicU64::new(nonce),
                config,
            }),
        })
    }

    fn next_nonce(&self) -> u64 {
        self.inner.nonce.fetch_add(1, Ordering::SeqCst)
    }
}

impl TxManager for AlloyTxManager {
    fn from(&self) -> Address {
        self.inner.from
    }

    fn send_async(&self, candidate: TxCandidate) -> PendingTx {
        let nonce = self.next_nonce();
        let inner = self.inner.clone();
        PendingTx(tokio::spawn(async move { inner.send(candidate, nonce).await }))
    }
}

impl Inner {
    async fn send(&self, candidate: TxCandidate, nonce: u64) -> Result<SentTx, TxError> {
        let prices = self.gas_prices().await?;
        let mut request = TransactionRequest::default()
            .with_from(self.from)
            .with_nonce(nonce)
            .with_chain_id(self.chain_id)
            .with_gas_limit(candidate.gas_limit)
            .with_max_priority_fee_per_gas(prices.tip)
            .with_max_fee_per_gas(prices.fee_cap())
            .with_value(candidate.value)
            .with_input(candidate.input);
        match candidate.to {
            Some(to) => request.set_to(to),
            None => request.set_create(),
        }

        let envelope = TransactionBuilder::<Ethereum>::build(request, &self.wallet)
            .await
            .map_err(|err| TxError::Sign(err.to_string()))?;
        let tx_hash = *envelope.tx_hash();
        debug!(%tx_hash, nonce, gas_limit = candidate.gas_limit, "Publishing transaction");
        let _pending = self
            .with_timeout(self.provider.send_raw_transaction(&envelope.encoded_2718()))
            .await??;

        let receipt = tokio::time::timeout(self.config.tx_send_timeout, self.wait(tx_hash))
            .await
            .map_err(|_| TxError::SendTimeout(tx_hash))??;
        info!(%tx_hash, nonce, status = ReceiptResponse::status(&receipt), "Transaction mined");
        Ok(SentTx { tx_hash, receipt })
    }

    async fn wait(&self, tx_hash: B256) -> Result<TransactionReceipt, TxError> {
        let started = Instant::now();
        let mut mempool_checked = false;
        loop {
            if let Some(receipt) =
                self.with_timeout(self.provider.get_transaction_receipt(tx_hash)).await??
            {
                return Ok(receipt);
            }
            if !mempool_checked && started.elapsed() >= self.config.tx_not_in_mempool_timeout {
                mempool_checked = true;
                let tx = self.with_timeout(self.provider.get_transaction_by_hash(tx_hash)).await??;
                if tx.is_none() {
                    warn!(%tx_hash, "Transaction dropped from mempool");
                    return Err(TxError::NotInMempool(tx_hash));
                }
            }
            tokio::time::sleep(self.config.receipt_query_interval).await;
        }
    }

    async fn gas_prices(&self) -> Result<GasPrices, TxError> {
        let tip = self.with_timeout(self.provider.get_max_priority_fee_per_gas()).await??;
        let block = self
            .with_timeout(self.provider.get_block_by_number(BlockNumberOrTag::Latest))
            .await??
            .ok_or_else(|| TxError::Rpc("latest block not found".to_string()))?;
        let base_fee = block.header.base_fee_per_gas.unwrap_or_default();
        let prices = GasPrices::deployer(tip, base_fee.into());
        debug!(?prices, "Estimated gas prices");
        Ok(prices)
    }

    async fn with_timeout<F: std::future::IntoFuture>(&self, f: F) -> Result<F::Output, TxError> {
        tokio::time::timeout(self.config.network_timeout, f.into_future())
            .await
            .map_err(|_| TxError::Rpc("request timed out".to_string()))
    }
}
