use alloy_primitives::{Address, B256};
use op_script::{abi_fields, Host};

use crate::Result;

/// Inputs of `DeploySuperchain.s.sol`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DeploySuperchainInput {
    pub superchain_proxy_admin_owner: Address,
    pub protocol_versions_owner: Address,
    pub guardian: Address,
    pub paused: bool,
    pub required_protocol_version: B256,
    pub recommended_protocol_version: B256,
}
abi_fields!(DeploySuperchainInput {
    superchain_proxy_admin_owner,
    protocol_versions_owner,
    guardian,
    paused,
    required_protocol_version,
    recommended_protocol_version,
});

/// Outputs of `DeploySuperchain.s.sol`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DeploySuperchainOutput {
    pub superchain_proxy_admin: Address,
    pub superchain_config_impl: Address,
    pub superchain_config_proxy: Address,
    pub protocol_versions_impl: Address,
    pub protocol_versions_proxy: Address,
}
abi_fields!(DeploySuperchainOutput {
    superchain_proxy_admin,
    superchain_config_impl,
    superchain_config_proxy,
    protocol_versions_impl,
    protocol_versions_proxy,
});

/// Deploys the superchain contracts.
pub fn deploy_superchain(
    host: &mut Host,
    input: DeploySuperchainInput,
) -> Result<DeploySuperchainOutput> {
    super::run_deploy_script(host, "DeploySuperchain.s.sol", "DeploySuperchain", input, &[])
}

#[cfg(test)]
mod tests {
    use op_script::{test_utils::cheats_host, DEFAULT_SENDER};

    use super::*;
    use crate::{
        opcm::test_utils::{insert_script, writing_script},
        DeployerError,
    };

    #[test]
    fn test_deploy_superchain_reads_outputs() {
        let mut host = cheats_host();
        insert_script(
            host.artifacts_mut(),
            "DeploySuperchain.s.sol",
            "DeploySuperchain",
            writing_script::<DeploySuperchainOutput>(),
        );

        let output = deploy_superchain(&mut host, DeploySuperchainInput::default()).unwrap();
        // Broadcast creations come from the tx origin.
        assert_eq!(output.superchain_proxy_admin, DEFAULT_SENDER.create(0));
        assert_eq!(output.protocol_versions_proxy, DEFAULT_SENDER.create(4));

        let dump = host.state_dump().unwrap();
        assert!(dump.contains_key(&output.superchain_config_proxy));
        // Scripts and input/output precompiles never end up in the dump.
        assert_eq!(dump.len(), 6, "{:?}", dump.keys().collect::<Vec<_>>());
    }

    #[test]
    fn test_unset_output_is_rejected() {
        let mut host = cheats_host();
        insert_script(
            host.artifacts_mut(),
            "DeploySuperchain.s.sol",
            "DeploySuperchain",
            op_script::test_utils::BytecodeBuilder::default().return_empty().build(),
        );

        let err = deploy_superchain(&mut host, DeploySuperchainInput::default()).unwrap_err();
        assert!(matches!(err, DeployerError::InvalidOutput(_)), "{err}");
        assert!(err.to_string().contains("superchainProxyAdmin is not set"), "{err}");
    }
}
