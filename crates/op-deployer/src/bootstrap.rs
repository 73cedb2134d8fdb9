//! One-shot deployment of the superchain and the OP Contracts Manager, without a work directory.

use std::sync::Arc;

use alloy_primitives::Address;
use op_script::ArtifactsFs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    apply_pipeline, ArtifactsLocator, DeployerError, Env, ImplementationsDeployment, Intent,
    NoopStateWriter, Result, State, SuperchainDeployment, SuperchainRoles,
};

/// What to bootstrap.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Where the artifacts were fetched from. Recorded in the intent only.
    pub artifacts_locator: ArtifactsLocator,
    /// Identifier of the contract implementations release.
    pub contracts_release: String,
    /// Owners of the superchain contracts. Unset roles default to the deployer.
    pub superchain_roles: SuperchainRoles,
}

/// Addresses deployed by [`bootstrap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapOutput {
    /// The superchain contracts.
    pub superchain: SuperchainDeployment,
    /// The implementations and the OP Contracts Manager.
    pub implementations: ImplementationsDeployment,
}

/// Deploys the superchain and the implementations to the L1 of `env`.
///
/// State is not persisted: the returned output carries the addresses without state dumps.
pub async fn bootstrap(
    env: &Env,
    artifacts: &ArtifactsFs,
    config: BootstrapConfig,
) -> Result<BootstrapOutput> {
    let l1_chain_id = env.l1_client.chain_id().await?;
    let or_deployer = |role: Address| if role.is_zero() { env.deployer } else { role };
    let mut intent = Intent::new(l1_chain_id, config.artifacts_locator, config.contracts_release);
    intent.superchain_roles = SuperchainRoles {
        proxy_admin_owner: or_deployer(config.superchain_roles.proxy_admin_owner),
        protocol_versions_owner: or_deployer(config.superchain_roles.protocol_versions_owner),
        guardian: or_deployer(config.superchain_roles.guardian),
    };

    let env = Env { state_writer: Arc::new(NoopStateWriter), ..env.clone() };
    let mut state = State::default();
    apply_pipeline(&env, artifacts, &intent, &mut state).await?;

    let missing = || DeployerError::InvalidOutput("bootstrap deployed nothing".to_string());
    let mut superchain = state.superchain_deployment.ok_or_else(missing)?;
    let mut implementations = state.implementations_deployment.ok_or_else(missing)?;
    superchain.state_dump = None;
    implementations.state_dump = None;
    info!(opcm_proxy = %implementations.opcm_proxy_address, "Bootstrapped");
    Ok(BootstrapOutput { superchain, implementations })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use op_script::{Broadcast, BroadcastHook};

    use super::*;
    use crate::{
        opcm::{
            test_utils::{insert_script, writing_script},
            DeployImplementationsOutput, DeploySuperchainOutput,
        },
        BlockRef, BroadcastResult, Broadcaster, L1Client, MultiError,
    };

    const DEPLOYER: Address = Address::repeat_byte(0xd1);

    /// An L1 that includes every broadcast as soon as it is hooked.
    #[derive(Debug, Default)]
    struct InstantL1 {
        nonce: AtomicU64,
    }

    impl BroadcastHook for InstantL1 {
        fn hook(&self, _broadcast: Broadcast) {
            self.nonce.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Broadcaster for InstantL1 {
        async fn broadcast(&self) -> (Vec<BroadcastResult>, Result<(), MultiError>) {
            (Vec::new(), Ok(()))
        }
    }

    #[async_trait]
    impl L1Client for InstantL1 {
        async fn chain_id(&self) -> Result<u64> {
            Ok(11155111)
        }

        async fn nonce(&self, _address: Address) -> Result<u64> {
            Ok(self.nonce.load(Ordering::SeqCst))
        }

        async fn latest_block(&self) -> Result<BlockRef> {
            Ok(BlockRef::default())
        }
    }

    #[tokio::test]
    async fn test_bootstrap_prints_addresses() {
        let mut fs = ArtifactsFs::in_memory();
        insert_script(
            &mut fs,
            "DeploySuperchain.s.sol",
            "DeploySuperchain",
            writing_script::<DeploySuperchainOutput>(),
        );
        insert_script(
            &mut fs,
            "DeployImplementations.s.sol",
            "DeployImplementations",
            writing_script::<DeployImplementationsOutput>(),
        );
        let l1 = Arc::new(InstantL1::default());
        let env = Env {
            l1_client: l1.clone(),
            broadcaster: l1,
            state_writer: Arc::new(NoopStateWriter),
            deployer: DEPLOYER,
        };
        let config = BootstrapConfig {
            artifacts_locator: ArtifactsLocator::File("/tmp/artifacts".into()),
            contracts_release: "op-contracts/v1.6.0".to_string(),
            superchain_roles: SuperchainRoles::default(),
        };

        let output = bootstrap(&env, &fs, config).await.unwrap();
        assert_eq!(output.superchain.proxy_admin_address, DEPLOYER.create(0));
        assert!(output.superchain.state_dump.is_none());
        assert_eq!(output.implementations.opcm_proxy_address, DEPLOYER.create(5));

        let json = serde_json::to_value(&output).unwrap();
        assert!(json["implementations"]["opcmProxyAddress"].is_string(), "{json}");
    }
}
