use alloy_primitives::{b256, Address, Log, B256, U256};
use alloy_sol_types::{sol, SolEvent, SolType};
use op_script::{abi_fields, Host};

use crate::{ChainRoles, DeployerError, Result};

/// Dispute game type of the permissioned fault dispute game.
pub const PERMISSIONED_GAME_TYPE: u32 = 1;

/// Absolute prestate of the standard fault proof program.
pub const STANDARD_PRESTATE: B256 =
    b256!("0x038512e02c4c3f7bdaec27d00edf55b7155e0905301e1a88083e4e0a6764d54c");

/// Output fields a permissioned-only chain leaves unset.
pub const OPTIONAL_OPCHAIN_OUTPUTS: &[&str] =
    &["faultDisputeGame", "delayedWETHPermissionlessGameProxy"];

sol! {
    /// Emitted by the OP Contracts Manager for every deployed chain.
    event Deployed(
        uint256 indexed outputVersion,
        uint256 indexed l2ChainId,
        address indexed deployer,
        bytes deployOutput
    );

    /// The `deployOutput` payload of [`Deployed`].
    struct DeployOutput {
        address opChainProxyAdmin;
        address addressManager;
        address l1ERC721BridgeProxy;
        address systemConfigProxy;
        address optimismMintableERC20FactoryProxy;
        address l1StandardBridgeProxy;
        address l1CrossDomainMessengerProxy;
        address optimismPortalProxy;
        address disputeGameFactoryProxy;
        address anchorStateRegistryProxy;
        address anchorStateRegistryImpl;
        address faultDisputeGame;
        address permissionedDisputeGame;
        address delayedWETHPermissionedGameProxy;
        address delayedWETHPermissionlessGameProxy;
    }
}

/// Inputs of `DeployOPChain.s.sol`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DeployOPChainInput {
    pub op_chain_proxy_admin_owner: Address,
    pub system_config_owner: Address,
    pub batcher: Address,
    pub unsafe_block_signer: Address,
    pub proposer: Address,
    pub challenger: Address,
    pub basefee_scalar: u32,
    pub blob_base_fee_scalar: u32,
    pub l2_chain_id: U256,
    pub opcm_proxy: Address,
    pub salt_mixer: String,
    pub gas_limit: u64,
    pub dispute_game_type: u32,
    pub dispute_absolute_prestate: B256,
    pub dispute_max_game_depth: u64,
    pub dispute_split_depth: u64,
    pub dispute_clock_extension: u64,
    pub dispute_max_clock_duration: u64,
}
abi_fields!(DeployOPChainInput {
    op_chain_proxy_admin_owner,
    system_config_owner,
    batcher,
    unsafe_block_signer,
    proposer,
    challenger,
    basefee_scalar,
    blob_base_fee_scalar,
    l2_chain_id,
    opcm_proxy,
    salt_mixer,
    gas_limit,
    dispute_game_type,
    dispute_absolute_prestate,
    dispute_max_game_depth,
    dispute_split_depth,
    dispute_clock_extension,
    dispute_max_clock_duration,
});

impl DeployOPChainInput {
    /// Inputs for a chain with `roles`, using the standard fee and dispute parameters.
    pub fn standard(
        l2_chain_id: U256,
        roles: &ChainRoles,
        opcm_proxy: Address,
        salt_mixer: impl Into<String>,
    ) -> Self {
        let roles = roles.resolved();
        Self {
            op_chain_proxy_admin_owner: roles.proxy_admin_owner,
            system_config_owner: roles.system_config_owner,
            batcher: roles.batcher,
            unsafe_block_signer: roles.unsafe_block_signer,
            proposer: roles.proposer,
            challenger: roles.challenger,
            basefee_scalar: 1368,
            blob_base_fee_scalar: 801_949,
            l2_chain_id,
            opcm_proxy,
            salt_mixer: salt_mixer.into(),
            gas_limit: 60_000_000,
            dispute_game_type: PERMISSIONED_GAME_TYPE,
            dispute_absolute_prestate: STANDARD_PRESTATE,
            dispute_max_game_depth: 73,
            dispute_split_depth: 30,
            dispute_clock_extension: 10_800,
            dispute_max_clock_duration: 302_400,
        }
    }
}

/// Outputs of `DeployOPChain.s.sol`, in the order of the `Deployed` event payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DeployOPChainOutput {
    pub op_chain_proxy_admin: Address,
    pub address_manager: Address,
    pub l1_erc721_bridge_proxy: Address,
    pub system_config_proxy: Address,
    pub optimism_mintable_erc20_factory_proxy: Address,
    pub l1_standard_bridge_proxy: Address,
    pub l1_cross_domain_messenger_proxy: Address,
    pub optimism_portal_proxy: Address,
    pub dispute_game_factory_proxy: Address,
    pub anchor_state_registry_proxy: Address,
    pub anchor_state_registry_impl: Address,
    pub fault_dispute_game: Address,
    pub permissioned_dispute_game: Address,
    pub delayed_weth_permissioned_game_proxy: Address,
    pub delayed_weth_permissionless_game_proxy: Address,
}
abi_fields!(DeployOPChainOutput {
    op_chain_proxy_admin,
    address_manager,
    l1_erc721_bridge_proxy as "l1ERC721BridgeProxy",
    system_config_proxy,
    optimism_mintable_erc20_factory_proxy as "optimismMintableERC20FactoryProxy",
    l1_standard_bridge_proxy,
    l1_cross_domain_messenger_proxy,
    optimism_portal_proxy,
    dispute_game_factory_proxy,
    anchor_state_registry_proxy,
    anchor_state_registry_impl,
    fault_dispute_game,
    permissioned_dispute_game,
    delayed_weth_permissioned_game_proxy as "delayedWETHPermissionedGameProxy",
    delayed_weth_permissionless_game_proxy as "delayedWETHPermissionlessGameProxy",
});

impl From<DeployOutput> for DeployOPChainOutput {
    fn from(out: DeployOutput) -> Self {
        Self {
            op_chain_proxy_admin: out.opChainProxyAdmin,
            address_manager: out.addressManager,
            l1_erc721_bridge_proxy: out.l1ERC721BridgeProxy,
            system_config_proxy: out.systemConfigProxy,
            optimism_mintable_erc20_factory_proxy: out.optimismMintableERC20FactoryProxy,
            l1_standard_bridge_proxy: out.l1StandardBridgeProxy,
            l1_cross_domain_messenger_proxy: out.l1CrossDomainMessengerProxy,
            optimism_portal_proxy: out.optimismPortalProxy,
            dispute_game_factory_proxy: out.disputeGameFactoryProxy,
            anchor_state_registry_proxy: out.anchorStateRegistryProxy,
            anchor_state_registry_impl: out.anchorStateRegistryImpl,
            fault_dispute_game: out.faultDisputeGame,
            permissioned_dispute_game: out.permissionedDisputeGame,
            delayed_weth_permissioned_game_proxy: out.delayedWETHPermissionedGameProxy,
            delayed_weth_permissionless_game_proxy: out.delayedWETHPermissionlessGameProxy,
        }
    }
}

/// Deploys the L1 contracts of one chain through the OP Contracts Manager.
pub fn deploy_opchain(host: &mut Host, input: DeployOPChainInput) -> Result<DeployOPChainOutput> {
    super::run_deploy_script(
        host,
        "DeployOPChain.s.sol",
        "DeployOPChain",
        input,
        OPTIONAL_OPCHAIN_OUTPUTS,
    )
}

/// Decodes the output of the `Deployed` event that `opcm` emitted for `l2_chain_id` among
/// `logs`, if any.
pub fn find_deployed_output<'a>(
    logs: impl IntoIterator<Item = &'a Log>,
    opcm: Address,
    l2_chain_id: U256,
) -> Result<Option<DeployOPChainOutput>> {
    for log in logs {
        if log.address != opcm || log.topics().first() != Some(&Deployed::SIGNATURE_HASH) {
            continue;
        }
        let event = Deployed::decode_log_data(&log.data)
            .map_err(|err| DeployerError::InvalidOutput(format!("bad Deployed event: {err}")))?;
        if event.l2ChainId != l2_chain_id {
            continue;
        }
        let output = <DeployOutput as SolType>::abi_decode(&event.deployOutput)
            .map_err(|err| DeployerError::InvalidOutput(format!("bad deploy output: {err}")))?;
        return Ok(Some(output.into()));
    }
    Ok(None)
}
