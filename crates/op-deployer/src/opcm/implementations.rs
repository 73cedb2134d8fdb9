use alloy_primitives::{Address, B256, U256};
use op_script::{abi_fields, Host};

use crate::Result;

/// Inputs of `DeployImplementations.s.sol`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DeployImplementationsInput {
    pub salt: B256,
    pub withdrawal_delay_seconds: U256,
    pub min_proposal_size_bytes: U256,
    pub challenge_period_seconds: U256,
    pub proof_maturity_delay_seconds: U256,
    pub dispute_game_finality_delay_seconds: U256,
    pub mips_version: U256,
    /// The contracts release, e.g. `op-contracts/v1.6.0`.
    pub release: String,
    pub superchain_config_proxy: Address,
    pub protocol_versions_proxy: Address,
    pub opcm_proxy_owner: Address,
    pub use_interop: bool,
}
abi_fields!(DeployImplementationsInput {
    salt,
    withdrawal_delay_seconds,
    min_proposal_size_bytes,
    challenge_period_seconds,
    proof_maturity_delay_seconds,
    dispute_game_finality_delay_seconds,
    mips_version,
    release,
    superchain_config_proxy,
    protocol_versions_proxy,
    opcm_proxy_owner,
    use_interop,
});

impl DeployImplementationsInput {
    /// Inputs with the standard fault proof parameters.
    pub fn standard(
        salt: B256,
        release: impl Into<String>,
        superchain_config_proxy: Address,
        protocol_versions_proxy: Address,
        opcm_proxy_owner: Address,
    ) -> Self {
        Self {
            salt,
            withdrawal_delay_seconds: U256::from(604_800),
            min_proposal_size_bytes: U256::from(126_000),
            challenge_period_seconds: U256::from(86_400),
            proof_maturity_delay_seconds: U256::from(604_800),
            dispute_game_finality_delay_seconds: U256::from(302_400),
            mips_version: U256::from(1),
            release: release.into(),
            superchain_config_proxy,
            protocol_versions_proxy,
            opcm_proxy_owner,
            use_interop: false,
        }
    }
}

/// Outputs of `DeployImplementations.s.sol`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DeployImplementationsOutput {
    pub opcm_proxy: Address,
    pub delayed_weth_impl: Address,
    pub optimism_portal_impl: Address,
    pub preimage_oracle_singleton: Address,
    pub mips_singleton: Address,
    pub system_config_impl: Address,
    pub l1_cross_domain_messenger_impl: Address,
    pub l1_erc721_bridge_impl: Address,
    pub l1_standard_bridge_impl: Address,
    pub optimism_mintable_erc20_factory_impl: Address,
    pub dispute_game_factory_impl: Address,
}
abi_fields!(DeployImplementationsOutput {
    opcm_proxy,
    delayed_weth_impl as "delayedWETHImpl",
    optimism_portal_impl,
    preimage_oracle_singleton,
    mips_singleton,
    system_config_impl,
    l1_cross_domain_messenger_impl,
    l1_erc721_bridge_impl as "l1ERC721BridgeImpl",
    l1_standard_bridge_impl,
    optimism_mintable_erc20_factory_impl as "optimismMintableERC20FactoryImpl",
    dispute_game_factory_impl,
});

/// Deploys the implementations shared by every chain, and the OP Contracts Manager.
pub fn deploy_implementations(
    host: &mut Host,
    input: DeployImplementationsInput,
) -> Result<DeployImplementationsOutput> {
    super::run_deploy_script(
        host,
        "DeployImplementations.s.sol",
        "DeployImplementations",
        input,
        &[],
    )
}
