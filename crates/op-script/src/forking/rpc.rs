use std::{
    collections::HashMap,
    fmt,
    future::{Future, IntoFuture},
    num::NonZeroUsize,
    sync::Arc,
    time::Duration,
};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{BlockId, BlockNumberOrTag};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::{debug, info};

use super::{
    CachedSource, ForkBlock, ForkError, ForkSource, ForkSourceFactory, DEFAULT_CACHE_SIZE,
};

/// Timeout and retry policy of RPC-backed fork sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per request, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles after every failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound of the retry delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Runs RPC futures to completion from synchronous EVM database calls.
#[derive(Debug)]
enum BlockingRuntime {
    Handle(Handle),
    Runtime(Runtime),
}

impl BlockingRuntime {
    fn new() -> Result<Self, ForkError> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                Err(ForkError::Runtime("a multi-threaded tokio runtime is required".to_string()))
            }
            Ok(handle) => Ok(Self::Handle(handle)),
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map(Self::Runtime)
                .map_err(|err| ForkError::Runtime(err.to_string())),
        }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        match self {
            Self::Handle(handle) => tokio::task::block_in_place(move || handle.block_on(future)),
            Self::Runtime(runtime) => runtime.block_on(future),
        }
    }
}

async fn with_retry<T, E, F, Fut>(
    retry: &RetryConfig,
    method: &str,
    mut request: F,
) -> Result<T, ForkError>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: IntoFuture<Output = Result<T, E>>,
{
    let mut backoff = retry.initial_backoff;
    let mut last_error = ForkError::Timeout(retry.timeout);
    for attempt in 1..=retry.max_attempts.max(1) {
        match tokio::time::timeout(retry.timeout, request()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => last_error = ForkError::Rpc(format!("{method}: {err}")),
            Err(_) => last_error = ForkError::Timeout(retry.timeout),
        }
        if attempt < retry.max_attempts {
            debug!(method, attempt, ?backoff, error = %last_error, "Retrying fork source request");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(retry.max_backoff);
        }
    }
    Err(last_error)
}

/// A [`ForkSource`] reading a remote chain over JSON-RPC, pinned by block hash.
pub struct RpcSource {
    alias: String,
    provider: DynProvider,
    block_hash: B256,
    state_root: B256,
    retry: RetryConfig,
    runtime: BlockingRuntime,
}

impl fmt::Debug for RpcSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcSource")
            .field("alias", &self.alias)
            .field("block_hash", &self.block_hash)
            .field("state_root", &self.state_root)
            .finish_non_exhaustive()
    }
}

impl RpcSource {
    /// Connects to `url` and pins the source to `block`.
    pub fn connect(url: &str, block: ForkBlock) -> Result<Self, ForkError> {
        Self::connect_with(url, block, RetryConfig::default())
    }

    /// Connects to `url` with an explicit retry policy.
    pub fn connect_with(
        url: &str,
        block: ForkBlock,
        retry: RetryConfig,
    ) -> Result<Self, ForkError> {
        let runtime = BlockingRuntime::new()?;
        let parsed =
            url.parse().map_err(|err| ForkError::Rpc(format!("invalid url {url}: {err}")))?;
        let provider =
            ProviderBuilder::new().disable_recommended_fillers().connect_http(parsed).erased();
        let (block_hash, state_root) = runtime.block_on(pinned_block(&provider, block, &retry))?;
        info!(url, %block_hash, %state_root, "Pinned fork source");
        Ok(Self { alias: url.to_string(), provider, block_hash, state_root, retry, runtime })
    }

    /// Reports `alias` from [`ForkSource::url_or_alias`] instead of the url.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// The hash of the pinned block.
    pub const fn block_hash(&self) -> B256 {
        self.block_hash
    }

    fn block_id(&self) -> BlockId {
        BlockId::hash(self.block_hash)
    }
}

async fn pinned_block(
    provider: &DynProvider,
    block: ForkBlock,
    retry: &RetryConfig,
) -> Result<(B256, B256), ForkError> {
    let tag = match block {
        ForkBlock::Latest => BlockNumberOrTag::Latest,
        ForkBlock::Number(number) => BlockNumberOrTag::Number(number),
        ForkBlock::Transaction(hash) => {
            let tx = with_retry(retry, "eth_getTransactionByHash", || {
                provider.get_transaction_by_hash(hash)
            })
            .await?
            .ok_or_else(|| ForkError::BlockNotFound(format!("of transaction {hash}")))?;
            let block_hash = tx
                .block_hash
                .ok_or_else(|| ForkError::BlockNotFound(format!("of pending transaction {hash}")))?;
            let block = with_retry(retry, "eth_getBlockByHash", || {
                provider.get_block_by_hash(block_hash)
            })
            .await?
            .ok_or_else(|| ForkError::BlockNotFound(block_hash.to_string()))?;
            return Ok((block.header.hash, block.header.state_root));
        }
    };
    let block = with_retry(retry, "eth_getBlockByNumber", || provider.get_block_by_number(tag))
        .await?
        .ok_or_else(|| ForkError::BlockNotFound(tag.to_string()))?;
    Ok((block.header.hash, block.header.state_root))
}

impl ForkSource for RpcSource {
    fn url_or_alias(&self) -> &str {
        &self.alias
    }

    fn state_root(&self) -> B256 {
        self.state_root
    }

    fn nonce(&self, address: Address) -> Result<u64, ForkError> {
        let block = self.block_id();
        self.runtime.block_on(with_retry(&self.retry, "eth_getTransactionCount", || {
            self.provider.get_transaction_count(address).block_id(block)
        }))
    }

    fn balance(&self, address: Address) -> Result<U256, ForkError> {
        let block = self.block_id();
        self.runtime.block_on(with_retry(&self.retry, "eth_getBalance", || {
            self.provider.get_balance(address).block_id(block)
        }))
    }

    fn storage_at(&self, address: Address, key: B256) -> Result<B256, ForkError> {
        let block = self.block_id();
        let slot = U256::from_be_bytes(key.0);
        let value = self.runtime.block_on(with_retry(&self.retry, "eth_getStorageAt", || {
            self.provider.get_storage_at(address, slot).block_id(block)
        }))?;
        Ok(B256::from(value.to_be_bytes::<32>()))
    }

    fn code(&self, address: Address) -> Result<Bytes, ForkError> {
        let block = self.block_id();
        self.runtime.block_on(with_retry(&self.retry, "eth_getCode", || {
            self.provider.get_code_at(address).block_id(block)
        }))
    }
}

/// Opens cached [`RpcSource`]s for urls and named endpoints.
#[derive(Debug, Clone)]
pub struct RpcForkFactory {
    endpoints: HashMap<String, String>,
    retry: RetryConfig,
    cache_size: NonZeroUsize,
}

impl Default for RpcForkFactory {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            retry: RetryConfig::default(),
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl RpcForkFactory {
    /// A factory accepting plain `http(s)` urls only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `alias` as a name for `url`.
    pub fn with_endpoint(mut self, alias: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(alias.into(), url.into());
        self
    }

    /// Sets the retry policy of created sources.
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the LRU capacity of created sources.
    pub const fn with_cache_size(mut self, cache_size: NonZeroUsize) -> Self {
        self.cache_size = cache_size;
        self
    }

    fn resolve<'a>(&'a self, url_or_alias: &'a str) -> Result<&'a str, ForkError> {
        if let Some(url) = self.endpoints.get(url_or_alias) {
            return Ok(url);
        }
        if url_or_alias.starts_with("http://") || url_or_alias.starts_with("https://") {
            return Ok(url_or_alias);
        }
        Err(ForkError::UnknownSource(url_or_alias.to_string()))
    }
}

impl ForkSourceFactory for RpcForkFactory {
    fn fork_source(
        &self,
        url_or_alias: &str,
        block: ForkBlock,
    ) -> Result<Arc<dyn ForkSource>, ForkError> {
        let url = self.resolve(url_or_alias)?;
        let source = RpcSource::connect_with(url, block, self.retry)?.with_alias(url_or_alias);
        Ok(Arc::new(CachedSource::with_capacity(source, self.cache_size)))
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use serde_json::{json, Value};
    use wiremock::{
        matchers::{body_partial_json, method},
        Mock, MockServer, Request, Respond, ResponseTemplate,
    };

    use super::*;

    fn rpc_result(result: Value) -> impl Respond {
        move |request: &Request| {
            let id = serde_json::from_slice::<Value>(&request.body)
                .ok()
                .and_then(|body| body.get("id").cloned())
                .unwrap_or(json!(0));
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": id, "result": result.clone()}))
        }
    }

    fn block_json(hash: B256, state_root: B256) -> Value {
        json!({
            "hash": hash,
            "parentHash": B256::ZERO,
            "sha3Uncles": B256::ZERO,
            "miner": Address::ZERO,
            "stateRoot": state_root,
            "transactionsRoot": B256::ZERO,
            "receiptsRoot": B256::ZERO,
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "difficulty": "0x0",
            "number": "0x10",
            "gasLimit": "0x1c9c380",
            "gasUsed": "0x0",
            "timestamp": "0x0",
            "extraData": "0x",
            "mixHash": B256::ZERO,
            "nonce": "0x0000000000000000",
            "baseFeePerGas": "0x1",
            "uncles": [],
            "transactions": []
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rpc_source_pins_block_and_reads_nonce() {
        let server = MockServer::start().await;
        let hash = B256::repeat_byte(0x11);
        let state_root = B256::repeat_byte(0x22);
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getBlockByNumber"})))
            .respond_with(rpc_result(block_json(hash, state_root)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getTransactionCount"})))
            .respond_with(rpc_result(json!("0x2a")))
            .mount(&server)
            .await;

        let source = RpcSource::connect(&server.uri(), ForkBlock::Number(16)).unwrap();
        assert_eq!(source.block_hash(), hash);
        assert_eq!(source.state_root(), state_root);
        let alice = address!("0x00000000000000000000000000000000000a11ce");
        assert_eq!(source.nonce(alice).unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rpc_errors_are_retried_then_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let retry = RetryConfig {
            timeout: Duration::from_secs(1),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };
        let err = RpcSource::connect_with(&server.uri(), ForkBlock::Latest, retry).unwrap_err();
        assert!(matches!(err, ForkError::Rpc(_)), "{err}");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[test]
    fn test_factory_rejects_unknown_alias() {
        let factory = RpcForkFactory::new().with_endpoint("mainnet", "http://localhost:8545");
        assert_eq!(factory.resolve("mainnet").unwrap(), "http://localhost:8545");
        assert!(matches!(
            factory.fork_source("sepolia", ForkBlock::Latest),
            Err(ForkError::UnknownSource(_))
        ));
    }
}
