//! The cumulative deployment record and the work directory it lives in.

use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use alloy_primitives::{Address, Bytes, B256};
use auto_impl::auto_impl;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use op_script::Allocs;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::{DeployerError, Intent, Result};

/// The state schema version this build reads and writes.
pub const STATE_VERSION: u32 = 1;

/// File name of the intent inside the work directory.
pub const INTENT_FILE: &str = "intent.toml";

/// File name of the state inside the work directory.
pub const STATE_FILE: &str = "state.json";

/// The deployment record, stored as `state.json` in the work directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// Schema version, must equal [`STATE_VERSION`].
    pub version: u32,
    /// The last intent applied in full.
    #[serde(default)]
    pub applied_intent: Option<Intent>,
    /// Salt of every CREATE2 deployment, chosen once on the first apply.
    #[serde(default)]
    pub create2_salt: B256,
    /// Addresses of the superchain contracts.
    #[serde(default)]
    pub superchain_deployment: Option<SuperchainDeployment>,
    /// Addresses of the shared implementations.
    #[serde(default)]
    pub implementations_deployment: Option<ImplementationsDeployment>,
    /// One entry per deployed L2 chain.
    #[serde(default)]
    pub chains: Vec<ChainState>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            applied_intent: None,
            create2_salt: B256::ZERO,
            superchain_deployment: None,
            implementations_deployment: None,
            chains: Vec::new(),
        }
    }
}

impl State {
    /// The deployment record of chain `id`, if it was deployed.
    pub fn chain(&self, id: B256) -> Option<&ChainState> {
        self.chains.iter().find(|chain| chain.id == id)
    }

    /// The deployment record of chain `id`, mutably.
    pub fn chain_mut(&mut self, id: B256) -> Option<&mut ChainState> {
        self.chains.iter_mut().find(|chain| chain.id == id)
    }

    /// Names of every recorded address that is zero.
    pub fn zero_addresses(&self) -> Vec<String> {
        let mut zero = Vec::new();
        if let Some(superchain) = &self.superchain_deployment {
            collect_zero(&mut zero, "superchain", superchain.addresses());
        }
        if let Some(implementations) = &self.implementations_deployment {
            collect_zero(&mut zero, "implementations", implementations.addresses());
        }
        for chain in &self.chains {
            collect_zero(&mut zero, &format!("chain {}", chain.id), chain.addresses());
        }
        zero
    }
}

fn collect_zero(out: &mut Vec<String>, scope: &str, addresses: Vec<(&'static str, Address)>) {
    out.extend(
        addresses
            .into_iter()
            .filter(|(_, address)| address.is_zero())
            .map(|(name, _)| format!("{scope}: {name}")),
    );
}

/// Addresses of the superchain contracts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct SuperchainDeployment {
    pub proxy_admin_address: Address,
    pub superchain_config_proxy_address: Address,
    pub superchain_config_impl_address: Address,
    pub protocol_versions_proxy_address: Address,
    pub protocol_versions_impl_address: Address,
    /// The L1 state after the superchain scripts ran.
    #[serde(default)]
    pub state_dump: Option<Allocs>,
}

impl SuperchainDeployment {
    fn addresses(&self) -> Vec<(&'static str, Address)> {
        vec![
            ("proxyAdminAddress", self.proxy_admin_address),
            ("superchainConfigProxyAddress", self.superchain_config_proxy_address),
            ("superchainConfigImplAddress", self.superchain_config_impl_address),
            ("protocolVersionsProxyAddress", self.protocol_versions_proxy_address),
            ("protocolVersionsImplAddress", self.protocol_versions_impl_address),
        ]
    }
}

/// Addresses of the implementations shared by every chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ImplementationsDeployment {
    pub opcm_proxy_address: Address,
    #[serde(rename = "delayedWETHImplAddress")]
    pub delayed_weth_impl_address: Address,
    pub optimism_portal_impl_address: Address,
    pub preimage_oracle_singleton_address: Address,
    #[serde(rename = "mipsSingletonAddress")]
    pub mips_singleton_address: Address,
    pub system_config_impl_address: Address,
    pub l1_cross_domain_messenger_impl_address: Address,
    #[serde(rename = "l1ERC721BridgeImplAddress")]
    pub l1_erc721_bridge_impl_address: Address,
    pub l1_standard_bridge_impl_address: Address,
    #[serde(rename = "optimismMintableERC20FactoryImplAddress")]
    pub optimism_mintable_erc20_factory_impl_address: Address,
    pub dispute_game_factory_impl_address: Address,
    /// The L1 state after the implementation scripts ran.
    #[serde(default)]
    pub state_dump: Option<Allocs>,
}

impl ImplementationsDeployment {
    fn addresses(&self) -> Vec<(&'static str, Address)> {
        vec![
            ("opcmProxyAddress", self.opcm_proxy_address),
            ("delayedWETHImplAddress", self.delayed_weth_impl_address),
            ("optimismPortalImplAddress", self.optimism_portal_impl_address),
            ("preimageOracleSingletonAddress", self.preimage_oracle_singleton_address),
            ("mipsSingletonAddress", self.mips_singleton_address),
            ("systemConfigImplAddress", self.system_config_impl_address),
            ("l1CrossDomainMessengerImplAddress", self.l1_cross_domain_messenger_impl_address),
            ("l1ERC721BridgeImplAddress", self.l1_erc721_bridge_impl_address),
            ("l1StandardBridgeImplAddress", self.l1_standard_bridge_impl_address),
            (
                "optimismMintableERC20FactoryImplAddress",
                self.optimism_mintable_erc20_factory_impl_address,
            ),
            ("disputeGameFactoryImplAddress", self.dispute_game_factory_impl_address),
        ]
    }
}

/// The deployment record of one L2 chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ChainState {
    /// The L2 chain ID as a 32-byte word.
    pub id: B256,
    pub proxy_admin_address: Address,
    pub address_manager_address: Address,
    #[serde(rename = "l1ERC721BridgeProxyAddress")]
    pub l1_erc721_bridge_proxy_address: Address,
    pub system_config_proxy_address: Address,
    #[serde(rename = "optimismMintableERC20FactoryProxyAddress")]
    pub optimism_mintable_erc20_factory_proxy_address: Address,
    pub l1_standard_bridge_proxy_address: Address,
    pub l1_cross_domain_messenger_proxy_address: Address,
    pub optimism_portal_proxy_address: Address,
    pub dispute_game_factory_proxy_address: Address,
    pub anchor_state_registry_proxy_address: Address,
    pub anchor_state_registry_impl_address: Address,
    pub fault_dispute_game_address: Address,
    pub permissioned_dispute_game_address: Address,
    #[serde(rename = "delayedWETHPermissionedGameProxyAddress")]
    pub delayed_weth_permissioned_game_proxy_address: Address,
    #[serde(rename = "delayedWETHPermissionlessGameProxyAddress")]
    pub delayed_weth_permissionless_game_proxy_address: Address,
    /// The L2 genesis state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocs: Option<GzipData<Allocs>>,
    /// The L1 block the L2 genesis was generated at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_block: Option<BlockRef>,
}

impl ChainState {
    fn addresses(&self) -> Vec<(&'static str, Address)> {
        vec![
            ("proxyAdminAddress", self.proxy_admin_address),
            ("addressManagerAddress", self.address_manager_address),
            ("l1ERC721BridgeProxyAddress", self.l1_erc721_bridge_proxy_address),
            ("systemConfigProxyAddress", self.system_config_proxy_address),
            (
                "optimismMintableERC20FactoryProxyAddress",
                self.optimism_mintable_erc20_factory_proxy_address,
            ),
            ("l1StandardBridgeProxyAddress", self.l1_standard_bridge_proxy_address),
            ("l1CrossDomainMessengerProxyAddress", self.l1_cross_domain_messenger_proxy_address),
            ("optimismPortalProxyAddress", self.optimism_portal_proxy_address),
            ("disputeGameFactoryProxyAddress", self.dispute_game_factory_proxy_address),
            ("anchorStateRegistryProxyAddress", self.anchor_state_registry_proxy_address),
            ("anchorStateRegistryImplAddress", self.anchor_state_registry_impl_address),
            ("permissionedDisputeGameAddress", self.permissioned_dispute_game_address),
            (
                "delayedWETHPermissionedGameProxyAddress",
                self.delayed_weth_permissioned_game_proxy_address,
            ),
        ]
    }
}

/// A reference to an L1 block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BlockRef {
    #[serde(with = "alloy_serde::quantity")]
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub timestamp: u64,
}

/// A value stored as gzipped JSON, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipData<T>(pub T);

impl<T: Serialize> GzipData<T> {
    /// The gzipped JSON encoding of the value.
    pub fn encode(&self) -> Result<Bytes> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        serde_json::to_writer(&mut encoder, &self.0)?;
        Ok(encoder.finish()?.into())
    }
}

impl<T: DeserializeOwned> GzipData<T> {
    /// Decodes gzipped JSON.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut json = Vec::new();
        GzDecoder::new(data).read_to_end(&mut json)?;
        Ok(Self(serde_json::from_slice(&json)?))
    }
}

impl<T: Serialize> Serialize for GzipData<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.encode().map_err(serde::ser::Error::custom)?.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for GzipData<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = Bytes::deserialize(deserializer)?;
        Self::decode(&data).map_err(serde::de::Error::custom)
    }
}

/// Persists the state after every pipeline stage.
#[auto_impl(&, Box, Arc)]
pub trait StateWriter: std::fmt::Debug + Send + Sync {
    /// Writes `state`.
    fn write_state(&self, state: &State) -> Result<()>;
}

/// Writes `state.json` into a work directory.
#[derive(Debug, Clone)]
pub struct WorkdirStateWriter(pub PathBuf);

impl StateWriter for WorkdirStateWriter {
    fn write_state(&self, state: &State) -> Result<()> {
        write_state(&self.0, state)
    }
}

/// Drops every state update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStateWriter;

impl StateWriter for NoopStateWriter {
    fn write_state(&self, _state: &State) -> Result<()> {
        Ok(())
    }
}

/// Reads `intent.toml` from `workdir`.
pub fn read_intent(workdir: &Path) -> Result<Intent> {
    let data = fs::read_to_string(workdir.join(INTENT_FILE))?;
    Ok(toml::from_str(&data)?)
}

/// Writes `intent.toml` into `workdir`.
pub fn write_intent(workdir: &Path, intent: &Intent) -> Result<()> {
    atomic_write(&workdir.join(INTENT_FILE), toml::to_string_pretty(intent)?.as_bytes())
}

/// Reads `state.json` from `workdir`, rejecting unsupported versions.
pub fn read_state(workdir: &Path) -> Result<State> {
    let data = fs::read(workdir.join(STATE_FILE))?;
    let state: State = serde_json::from_slice(&data)?;
    if state.version != STATE_VERSION {
        return Err(DeployerError::UnsupportedVersion(state.version));
    }
    Ok(state)
}

/// Writes `state.json` into `workdir`.
pub fn write_state(workdir: &Path, state: &State) -> Result<()> {
    atomic_write(&workdir.join(STATE_FILE), &serde_json::to_vec_pretty(state)?)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    debug!(path = %path.display(), "Wrote file");
    Ok(())
}
