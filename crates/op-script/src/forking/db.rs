use std::sync::Arc;

use alloy_primitives::{keccak256, Address, B256, U256};
use revm::{
    database::CacheDB,
    primitives::{StorageKey, StorageValue, KECCAK_EMPTY},
    state::{AccountInfo, Bytecode},
    DatabaseRef,
};

use super::{ForkError, ForkSource};

/// An in-memory layer over a [`SourceDb`].
pub type LayerDb = CacheDB<SourceDb>;

/// The host's block hash for `number`: `keccak256` of the big-endian number in a 32-byte word.
pub fn script_block_hash(number: u64) -> B256 {
    keccak256(U256::from(number).to_be_bytes::<32>())
}

/// Adapts an optional [`ForkSource`] to revm's [`DatabaseRef`]. Without a source every account
/// is absent.
#[derive(Debug, Clone, Default)]
pub struct SourceDb {
    source: Option<Arc<dyn ForkSource>>,
}

impl SourceDb {
    /// A database with no accounts.
    pub const fn empty() -> Self {
        Self { source: None }
    }

    /// A database reading through `source`.
    pub fn new(source: Arc<dyn ForkSource>) -> Self {
        Self { source: Some(source) }
    }

    /// The backing source, if any.
    pub fn source(&self) -> Option<&Arc<dyn ForkSource>> {
        self.source.as_ref()
    }
}

impl DatabaseRef for SourceDb {
    type Error = ForkError;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let Some(source) = &self.source else { return Ok(None) };
        let nonce = source.nonce(address)?;
        let balance = source.balance(address)?;
        let code = source.code(address)?;
        if nonce == 0 && balance.is_zero() && code.is_empty() {
            return Ok(None);
        }
        let (code_hash, bytecode) = if code.is_empty() {
            (KECCAK_EMPTY, Bytecode::default())
        } else {
            let bytecode = Bytecode::new_raw_checked(code)
                .map_err(|err| ForkError::Bytecode(err.to_string()))?;
            (bytecode.hash_slow(), bytecode)
        };
        Ok(Some(AccountInfo::new(balance, nonce, code_hash, bytecode)))
    }

    fn code_by_hash_ref(&self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        // Code is always returned inline with the account.
        Err(ForkError::CodeNotFound(code_hash))
    }

    fn storage_ref(
        &self,
        address: Address,
        index: StorageKey,
    ) -> Result<StorageValue, Self::Error> {
        let Some(source) = &self.source else { return Ok(StorageValue::ZERO) };
        let value = source.storage_at(address, B256::from(index.to_be_bytes::<32>()))?;
        Ok(U256::from_be_bytes(value.0))
    }

    fn block_hash_ref(&self, number: u64) -> Result<B256, Self::Error> {
        Ok(script_block_hash(number))
    }
}
