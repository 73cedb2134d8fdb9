use alloy_primitives::{keccak256, Address, U256};
use alloy_sol_types::sol;
use op_script::{
    abi_fields, with_precompile_at_address, with_script, Allocs, BoundCall, Host, Precompile,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{ChainIntent, DeployerError, Intent, Result};

/// The account that deploys the L2 predeploys. It must not survive into the genesis allocs.
pub fn l2_genesis_deployer() -> Address {
    Address::from_word(keccak256("System genesis deployer"))
}

/// Where `L2Genesis.s.sol` reads its deploy config from.
pub fn deploy_config_address() -> Address {
    Address::from_word(keccak256("DeployConfig"))
}

/// The batch inbox of `l2_chain_id`: a zero byte followed by the first 19 bytes of the hashed
/// chain ID.
pub fn batch_inbox_address(l2_chain_id: U256) -> Address {
    let hash = keccak256(l2_chain_id.to_be_bytes::<32>());
    let mut address = [0u8; 20];
    address[1..].copy_from_slice(&hash[..19]);
    Address::from(address)
}

/// The L2 deploy config read by `L2Genesis.s.sol`.
///
/// Deploy overrides are merged over the generated values by JSON key, so every key here is a
/// valid override. Every field is required: an override that nulls one is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct L2InitConfig {
    #[serde(rename = "l1ChainID")]
    pub l1_chain_id: u64,
    #[serde(rename = "l2ChainID")]
    pub l2_chain_id: U256,
    pub l2_block_time: u64,
    pub max_sequencer_drift: u64,
    pub sequencer_window_size: u64,
    pub channel_timeout: u64,
    pub batch_inbox_address: Address,
    pub batch_sender_address: Address,
    pub p2p_sequencer_address: Address,
    pub proxy_admin_owner: Address,
    pub final_system_owner: Address,
    pub base_fee_vault_recipient: Address,
    pub l1_fee_vault_recipient: Address,
    pub sequencer_fee_vault_recipient: Address,
    pub enable_governance: bool,
    pub governance_token_symbol: String,
    pub governance_token_name: String,
    pub governance_token_owner: Address,
    pub gas_price_oracle_base_fee_scalar: u32,
    pub gas_price_oracle_blob_base_fee_scalar: u32,
    #[serde(rename = "eip1559Denominator")]
    pub eip1559_denominator: u64,
    #[serde(rename = "eip1559Elasticity")]
    pub eip1559_elasticity: u64,
    #[serde(rename = "eip1559DenominatorCanyon")]
    pub eip1559_denominator_canyon: u64,
    pub l2_genesis_block_gas_limit: u64,
    pub fund_dev_accounts: bool,
    pub use_fault_proofs: bool,
    #[serde(rename = "useAltDA")]
    pub use_alt_da: bool,
}
abi_fields!(L2InitConfig {
    l1_chain_id as "l1ChainID",
    l2_chain_id as "l2ChainID",
    l2_block_time,
    max_sequencer_drift,
    sequencer_window_size,
    channel_timeout,
    batch_inbox_address,
    batch_sender_address,
    p2p_sequencer_address,
    proxy_admin_owner,
    final_system_owner,
    base_fee_vault_recipient,
    l1_fee_vault_recipient,
    sequencer_fee_vault_recipient,
    enable_governance,
    governance_token_symbol,
    governance_token_name,
    governance_token_owner,
    gas_price_oracle_base_fee_scalar,
    gas_price_oracle_blob_base_fee_scalar,
    eip1559_denominator,
    eip1559_elasticity,
    eip1559_denominator_canyon,
    l2_genesis_block_gas_limit,
    fund_dev_accounts,
    use_fault_proofs,
    use_alt_da as "useAltDA",
});

impl L2InitConfig {
    /// The config of `chain`, with the global and then the chain overrides of `intent` applied.
    pub fn new(intent: &Intent, chain: &ChainIntent) -> Result<Self> {
        let combine = |reason: String| {
            DeployerError::ConfigInvalid(format!("failed to combine L2 init config: {reason}"))
        };
        let defaults = Self::defaults(intent, chain);
        let Value::Object(mut merged) =
            serde_json::to_value(&defaults).map_err(|err| combine(err.to_string()))?
        else {
            return Err(combine("config is not an object".to_string()));
        };
        for (key, value) in intent.global_deploy_overrides.iter().chain(&chain.deploy_overrides) {
            merged.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(merged)).map_err(|err| combine(err.to_string()))
    }

    fn defaults(intent: &Intent, chain: &ChainIntent) -> Self {
        let roles = chain.roles.resolved();
        let l2_chain_id = chain.chain_id();
        Self {
            l1_chain_id: intent.l1_chain_id,
            l2_chain_id,
            l2_block_time: 2,
            max_sequencer_drift: 600,
            sequencer_window_size: 3600,
            channel_timeout: 300,
            batch_inbox_address: batch_inbox_address(l2_chain_id),
            batch_sender_address: roles.batcher,
            p2p_sequencer_address: roles.unsafe_block_signer,
            proxy_admin_owner: roles.proxy_admin_owner,
            final_system_owner: roles.proxy_admin_owner,
            base_fee_vault_recipient: chain.base_fee_vault_recipient,
            l1_fee_vault_recipient: chain.l1_fee_vault_recipient,
            sequencer_fee_vault_recipient: chain.sequencer_fee_vault_recipient,
            enable_governance: true,
            governance_token_symbol: "OP".to_string(),
            governance_token_name: "Optimism".to_string(),
            governance_token_owner: roles.governance_token_owner,
            gas_price_oracle_base_fee_scalar: 1368,
            gas_price_oracle_blob_base_fee_scalar: 801_949,
            eip1559_denominator: chain.eip1559_denominator,
            eip1559_elasticity: chain.eip1559_elasticity,
            eip1559_denominator_canyon: 250,
            l2_genesis_block_gas_limit: 30_000_000,
            fund_dev_accounts: intent.fund_dev_accounts,
            use_fault_proofs: intent.use_fault_proofs,
            use_alt_da: intent.use_alt_da,
        }
    }
}

/// Inputs of `L2Genesis.s.sol`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct L2GenesisInput {
    pub config: L2InitConfig,
    pub l1_cross_domain_messenger_proxy: Address,
    pub l1_standard_bridge_proxy: Address,
    pub l1_erc721_bridge_proxy: Address,
}

sol! {
    /// Entry point of the L2 genesis script, configured through env vars and the deploy config.
    function runWithEnv() external;
}

#[derive(Debug, Default)]
struct L2GenesisScript {
    run_with_env: BoundCall<runWithEnvCall>,
}
op_script::hydrate!(L2GenesisScript { run_with_env });

/// Runs the L2 genesis script on `host` and returns the resulting genesis allocs.
///
/// `host` should run as [`l2_genesis_deployer`] with broadcasts discarded.
pub fn l2_genesis(host: &mut Host, input: L2GenesisInput) -> Result<Allocs> {
    host.set_env_var(
        "L2GENESIS_L1CrossDomainMessengerProxy",
        input.l1_cross_domain_messenger_proxy.to_string(),
    );
    host.set_env_var("L2GENESIS_L1StandardBridgeProxy", input.l1_standard_bridge_proxy.to_string());
    host.set_env_var("L2GENESIS_L1ERC721BridgeProxy", input.l1_erc721_bridge_proxy.to_string());

    let config_cleanup = with_precompile_at_address(
        host,
        deploy_config_address(),
        Box::new(Precompile::fields(input.config)?),
    )?;
    let result =
        with_script::<L2GenesisScript>(host, "L2Genesis.s.sol", "L2Genesis").and_then(
            |(script, address, cleanup)| {
                let ran = script
                    .run_with_env
                    .call(&mut host.script_backend(address), &runWithEnvCall {});
                cleanup.run(host)?;
                ran
            },
        );
    config_cleanup.run(host)?;
    result?;

    let mut allocs = host.state_dump()?;
    let deployer = l2_genesis_deployer();
    let deployer_nonce = allocs.remove(&deployer).map(|account| account.nonce).unwrap_or_default();
    debug!(%deployer, nonce = deployer_nonce, "Removed genesis deployer from allocs");
    for nonce in 0..=deployer_nonce {
        let leftover = deployer.create(nonce);
        if allocs.contains_key(&leftover) {
            return Err(DeployerError::InvalidOutput(format!(
                "genesis deployer contract {leftover} (nonce {nonce}) left in L2 allocs"
            )));
        }
    }
    info!(accounts = allocs.len(), "Generated L2 genesis allocs");
    Ok(allocs)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, B256};
    use op_script::{test_utils::BytecodeBuilder, ArtifactsFs, Context};
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{opcm::test_utils::insert_genesis_script, ArtifactsLocator, ChainRoles};

    const PREDEPLOY: Address = address!("0x4200000000000000000000000000000000000015");

    fn intent() -> (Intent, ChainIntent) {
        let intent = Intent::new(900, ArtifactsLocator::File("/tmp".into()), "dev");
        let chain = ChainIntent {
            id: B256::with_last_byte(10),
            eip1559_denominator: 50,
            eip1559_elasticity: 6,
            roles: ChainRoles {
                proxy_admin_owner: Address::repeat_byte(1),
                unsafe_block_signer: Address::repeat_byte(2),
                batcher: Address::repeat_byte(3),
                ..Default::default()
            },
            ..Default::default()
        };
        (intent, chain)
    }

    fn genesis_host(predeploy: Address) -> Host {
        let deployer = l2_genesis_deployer();
        let context =
            Context { chain_id: 10, sender: deployer, origin: deployer, ..Default::default() };
        let mut host = Host::new(ArtifactsFs::in_memory(), context);
        host.enable_cheats().unwrap();
        insert_genesis_script(host.artifacts_mut(), predeploy);
        host
    }

    fn genesis_input() -> L2GenesisInput {
        let (intent, chain) = intent();
        L2GenesisInput {
            config: L2InitConfig::new(&intent, &chain).unwrap(),
            l1_cross_domain_messenger_proxy: Address::repeat_byte(0x11),
            l1_standard_bridge_proxy: Address::repeat_byte(0x12),
            l1_erc721_bridge_proxy: Address::repeat_byte(0x13),
        }
    }

    #[test]
    fn test_defaults_follow_intent() {
        let (intent, chain) = intent();
        let config = L2InitConfig::new(&intent, &chain).unwrap();
        assert_eq!(config.l1_chain_id, 900);
        assert_eq!(config.l2_chain_id, U256::from(10));
        assert_eq!(config.final_system_owner, Address::repeat_byte(1));
        assert_eq!(config.governance_token_owner, Address::repeat_byte(1));
        assert_eq!(config.batch_sender_address, Address::repeat_byte(3));
        assert_eq!(config.batch_inbox_address.0[0], 0);
        assert_eq!(config.batch_inbox_address.0[1..], keccak256(chain.id)[..19]);
    }

    #[test]
    fn test_chain_overrides_win() {
        let (mut intent, mut chain) = intent();
        intent.global_deploy_overrides.insert("l2BlockTime".into(), json!(3));
        intent.global_deploy_overrides.insert("enableGovernance".into(), json!(false));
        chain.deploy_overrides.insert("l2BlockTime".into(), json!(1));

        let config = L2InitConfig::new(&intent, &chain).unwrap();
        assert_eq!(config.l2_block_time, 1);
        assert!(!config.enable_governance);
    }

    #[rstest]
    #[case::proxy_admin_owner("proxyAdminOwner")]
    #[case::base_fee_vault("baseFeeVaultRecipient")]
    #[case::l1_fee_vault("l1FeeVaultRecipient")]
    #[case::sequencer_fee_vault("sequencerFeeVaultRecipient")]
    #[case::l1_chain_id("l1ChainID")]
    #[case::l2_chain_id("l2ChainID")]
    fn test_null_override_is_rejected(#[case] key: &str) {
        let (mut intent, chain) = intent();
        intent.global_deploy_overrides.insert(key.into(), Value::Null);
        let err = L2InitConfig::new(&intent, &chain).unwrap_err();
        assert!(matches!(err, DeployerError::ConfigInvalid(_)));
        assert!(err.to_string().contains("failed to combine L2 init config"), "{err}");
    }

    #[test]
    fn test_l2_genesis_collects_predeploys() {
        let mut host = genesis_host(PREDEPLOY);

        let allocs = l2_genesis(&mut host, genesis_input()).unwrap();
        assert_eq!(allocs.keys().collect::<Vec<_>>(), vec![&PREDEPLOY]);
        assert_eq!(allocs[&PREDEPLOY].balance, U256::from(1));
        assert!(!host.has_precompile_override(&deploy_config_address()));
        assert_eq!(
            host.get_env_var("L2GENESIS_L1StandardBridgeProxy"),
            Some(Address::repeat_byte(0x12).to_string().as_str())
        );
    }

    #[test]
    fn test_leftover_deployer_contract_is_rejected() {
        let mut host = genesis_host(PREDEPLOY);
        let init_code = BytecodeBuilder::init_code(BytecodeBuilder::default(), [0x00]);
        let created = host.create(l2_genesis_deployer(), init_code, U256::ZERO).unwrap();

        let err = l2_genesis(&mut host, genesis_input()).unwrap_err();
        assert!(matches!(err, DeployerError::InvalidOutput(_)), "{err}");
        assert!(err.to_string().contains(&created.address.to_string()), "{err}");
    }
}
