use alloy_primitives::{B256, U256};
use op_script::ArtifactsFs;
use tracing::info;

use super::{l1_host, l2_host, Env};
use crate::{
    opcm::{
        deploy_implementations, deploy_opchain, deploy_superchain, find_deployed_output,
        l2_genesis, DeployImplementationsInput, DeployOPChainInput, DeployOPChainOutput,
        DeploySuperchainInput, L2GenesisInput, L2InitConfig,
    },
    ChainState, DeployerError, GzipData, ImplementationsDeployment, Intent, Result, State,
    SuperchainDeployment, STATE_VERSION,
};

/// The major protocol version the deployed contracts require and recommend.
const OP_STACK_MAJOR_VERSION: u32 = 8;

/// Encodes a version-0 protocol version word.
pub fn protocol_version(major: u32, minor: u32, patch: u32) -> B256 {
    let mut word = B256::ZERO;
    word[16..20].copy_from_slice(&major.to_be_bytes());
    word[20..24].copy_from_slice(&minor.to_be_bytes());
    word[24..28].copy_from_slice(&patch.to_be_bytes());
    word
}

/// Checks the state version, the immutable intent fields and the L1 chain ID, and picks the
/// CREATE2 salt on the first apply.
pub async fn init(env: &Env, intent: &Intent, state: &mut State) -> Result<()> {
    if state.version != STATE_VERSION {
        return Err(DeployerError::UnsupportedVersion(state.version));
    }
    if let Some(applied) = &state.applied_intent {
        intent.check_immutable(applied)?;
    }
    let chain_id = env.l1_client.chain_id().await?;
    if chain_id != intent.l1_chain_id {
        return Err(DeployerError::ConfigInvalid(format!(
            "L1 chain ID mismatch: RPC reports {chain_id}, intent has {}",
            intent.l1_chain_id
        )));
    }
    if state.create2_salt.is_zero() {
        state.create2_salt = B256::random();
        info!(salt = %state.create2_salt, "Picked CREATE2 salt");
    }
    Ok(())
}

/// Deploys the superchain contracts once.
pub async fn deploy_superchain_stage(
    env: &Env,
    artifacts: &ArtifactsFs,
    intent: &Intent,
    state: &mut State,
) -> Result<()> {
    if state.superchain_deployment.is_some() {
        info!("superchain deployment not needed");
        return Ok(());
    }
    let mut host = l1_host(env, artifacts, intent, None).await?;
    let roles = &intent.superchain_roles;
    let version = protocol_version(OP_STACK_MAJOR_VERSION, 0, 0);
    let output = deploy_superchain(
        &mut host,
        DeploySuperchainInput {
            superchain_proxy_admin_owner: roles.proxy_admin_owner,
            protocol_versions_owner: roles.protocol_versions_owner,
            guardian: roles.guardian,
            paused: false,
            required_protocol_version: version,
            recommended_protocol_version: version,
        },
    )?;
    info!(proxy_admin = %output.superchain_proxy_admin, "Deployed superchain");

    state.superchain_deployment = Some(SuperchainDeployment {
        proxy_admin_address: output.superchain_proxy_admin,
        superchain_config_proxy_address: output.superchain_config_proxy,
        superchain_config_impl_address: output.superchain_config_impl,
        protocol_versions_proxy_address: output.protocol_versions_proxy,
        protocol_versions_impl_address: output.protocol_versions_impl,
        state_dump: Some(host.state_dump()?),
    });
    Ok(())
}

/// Deploys the shared implementations and the OP Contracts Manager once.
pub async fn deploy_implementations_stage(
    env: &Env,
    artifacts: &ArtifactsFs,
    intent: &Intent,
    state: &mut State,
) -> Result<()> {
    if state.implementations_deployment.is_some() {
        info!("implementations deployment not needed");
        return Ok(());
    }
    let superchain = state.superchain_deployment.as_ref().ok_or_else(|| {
        DeployerError::InvalidOutput("superchain must be deployed first".to_string())
    })?;
    let mut host = l1_host(env, artifacts, intent, superchain.state_dump.as_ref()).await?;
    let output = deploy_implementations(
        &mut host,
        DeployImplementationsInput::standard(
            state.create2_salt,
            intent.contracts_release.as_str(),
            superchain.superchain_config_proxy_address,
            superchain.protocol_versions_proxy_address,
            intent.superchain_roles.proxy_admin_owner,
        ),
    )?;
    info!(opcm_proxy = %output.opcm_proxy, "Deployed implementations");

    state.implementations_deployment = Some(ImplementationsDeployment {
        opcm_proxy_address: output.opcm_proxy,
        delayed_weth_impl_address: output.delayed_weth_impl,
        optimism_portal_impl_address: output.optimism_portal_impl,
        preimage_oracle_singleton_address: output.preimage_oracle_singleton,
        mips_singleton_address: output.mips_singleton,
        system_config_impl_address: output.system_config_impl,
        l1_cross_domain_messenger_impl_address: output.l1_cross_domain_messenger_impl,
        l1_erc721_bridge_impl_address: output.l1_erc721_bridge_impl,
        l1_standard_bridge_impl_address: output.l1_standard_bridge_impl,
        optimism_mintable_erc20_factory_impl_address: output.optimism_mintable_erc20_factory_impl,
        dispute_game_factory_impl_address: output.dispute_game_factory_impl,
        state_dump: Some(host.state_dump()?),
    });
    Ok(())
}

/// Deploys the L1 contracts of chain `id` once.
///
/// The stage sends its own broadcasts, so the `Deployed` event of the OP Contracts Manager can be
/// checked against the script outputs.
pub async fn deploy_opchain_stage(
    env: &Env,
    artifacts: &ArtifactsFs,
    intent: &Intent,
    state: &mut State,
    id: B256,
) -> Result<()> {
    if state.chain(id).is_some() {
        info!(chain = %<U256 as From<B256>>::from(id), "opchain deployment not needed");
        return Ok(());
    }
    let chain = intent.chain(id)?;
    let implementations = state.implementations_deployment.as_ref().ok_or_else(|| {
        DeployerError::InvalidOutput("implementations must be deployed first".to_string())
    })?;
    let opcm = implementations.opcm_proxy_address;
    let mut host = l1_host(env, artifacts, intent, implementations.state_dump.as_ref()).await?;
    let input = DeployOPChainInput::standard(
        chain.chain_id(),
        &chain.roles,
        opcm,
        state.create2_salt.to_string(),
    );
    let output = deploy_opchain(&mut host, input)?;

    let (results, sent) = env.broadcaster.broadcast().await;
    sent?;
    let logs = results
        .iter()
        .filter_map(|result| result.receipt.as_ref())
        .flat_map(|receipt| receipt.inner.logs())
        .map(|log| &log.inner);
    if let Some(deployed) = find_deployed_output(logs, opcm, chain.chain_id())? {
        if deployed != output {
            return Err(DeployerError::InvalidOutput(format!(
                "Deployed event of chain {} does not match the script outputs",
                chain.chain_id()
            )));
        }
    }
    info!(
        chain = %chain.chain_id(),
        system_config = %output.system_config_proxy,
        "Deployed opchain"
    );

    state.chains.push(chain_state(id, output));
    Ok(())
}

fn chain_state(id: B256, output: DeployOPChainOutput) -> ChainState {
    ChainState {
        id,
        proxy_admin_address: output.op_chain_proxy_admin,
        address_manager_address: output.address_manager,
        l1_erc721_bridge_proxy_address: output.l1_erc721_bridge_proxy,
        system_config_proxy_address: output.system_config_proxy,
        optimism_mintable_erc20_factory_proxy_address: output
            .optimism_mintable_erc20_factory_proxy,
        l1_standard_bridge_proxy_address: output.l1_standard_bridge_proxy,
        l1_cross_domain_messenger_proxy_address: output.l1_cross_domain_messenger_proxy,
        optimism_portal_proxy_address: output.optimism_portal_proxy,
        dispute_game_factory_proxy_address: output.dispute_game_factory_proxy,
        anchor_state_registry_proxy_address: output.anchor_state_registry_proxy,
        anchor_state_registry_impl_address: output.anchor_state_registry_impl,
        fault_dispute_game_address: output.fault_dispute_game,
        permissioned_dispute_game_address: output.permissioned_dispute_game,
        delayed_weth_permissioned_game_proxy_address: output.delayed_weth_permissioned_game_proxy,
        delayed_weth_permissionless_game_proxy_address: output
            .delayed_weth_permissionless_game_proxy,
        allocs: None,
        start_block: None,
    }
}

/// Generates the L2 genesis allocs of chain `id` once, recording the current L1 block as the
/// chain's start.
pub async fn generate_l2_genesis_stage(
    env: &Env,
    artifacts: &ArtifactsFs,
    intent: &Intent,
    state: &mut State,
    id: B256,
) -> Result<()> {
    let chain_intent = intent.chain(id)?;
    let chain = state.chain_mut(id).ok_or_else(|| {
        DeployerError::InvalidOutput(format!("chain {} must be deployed first", <U256 as From<B256>>::from(id)))
    })?;
    if chain.allocs.is_some() {
        info!(chain = %<U256 as From<B256>>::from(id), "L2 genesis not needed");
        return Ok(());
    }
    let config = L2InitConfig::new(intent, chain_intent)?;
    let mut host = l2_host(artifacts, chain_intent.chain_id())?;
    let allocs = l2_genesis(
        &mut host,
        L2GenesisInput {
            config,
            l1_cross_domain_messenger_proxy: chain.l1_cross_domain_messenger_proxy_address,
            l1_standard_bridge_proxy: chain.l1_standard_bridge_proxy_address,
            l1_erc721_bridge_proxy: chain.l1_erc721_bridge_proxy_address,
        },
    )?;
    let start_block = env.l1_client.latest_block().await?;
    info!(chain = %<U256 as From<B256>>::from(id), start = start_block.number, "Generated L2 genesis");

    chain.allocs = Some(GzipData(allocs));
    chain.start_block = Some(start_block);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_layout() {
        let version = protocol_version(8, 1, 2);
        assert_eq!(version[..16], [0; 16]);
        assert_eq!(version[19], 8);
        assert_eq!(version[23], 1);
        assert_eq!(version[27], 2);
        assert_eq!(version[28..], [0; 4]);
    }
}
