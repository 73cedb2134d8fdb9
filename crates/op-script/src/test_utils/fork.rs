use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    forking::{AllocsSource, ForkBlock, ForkError, ForkSource, ForkSourceFactory},
    Allocs,
};

/// Serves in-memory chains to the `createFork` cheat codes.
///
/// Each alias maps block numbers to the state at that block. [`ForkBlock::Latest`] resolves to
/// the highest block of the alias.
#[derive(Debug, Default, Clone)]
pub struct MemoryForkFactory {
    chains: HashMap<String, BTreeMap<u64, Allocs>>,
}

impl MemoryForkFactory {
    /// Adds the state of `alias` at block `number`.
    pub fn with_block(mut self, alias: impl Into<String>, number: u64, allocs: Allocs) -> Self {
        self.chains.entry(alias.into()).or_default().insert(number, allocs);
        self
    }
}

impl ForkSourceFactory for MemoryForkFactory {
    fn fork_source(
        &self,
        url_or_alias: &str,
        block: ForkBlock,
    ) -> Result<Arc<dyn ForkSource>, ForkError> {
        let chain = self
            .chains
            .get(url_or_alias)
            .ok_or_else(|| ForkError::UnknownSource(url_or_alias.to_string()))?;
        let allocs = match block {
            ForkBlock::Latest => chain.last_key_value().map(|(_, allocs)| allocs),
            ForkBlock::Number(number) => chain.get(&number),
            ForkBlock::Transaction(_) => None,
        }
        .ok_or_else(|| ForkError::BlockNotFound(format!("{block:?}")))?;
        Ok(Arc::new(AllocsSource::new(url_or_alias, allocs.clone())))
    }
}
