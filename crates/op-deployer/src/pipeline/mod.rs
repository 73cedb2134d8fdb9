//! The apply pipeline: idempotent stages that drive the L1 and the state file towards the intent.

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use op_script::{Allocs, ArtifactsFs, Context, Host};
use tracing::info;

use crate::{
    opcm::l2_genesis_deployer, Broadcaster, BroadcasterHook, DeployerError, DiscardBroadcaster,
    Intent, Result, State, StateWriter,
};

mod l1;
pub use l1::*;

mod stages;
pub use stages::*;

/// The collaborators of a pipeline run.
#[derive(Debug, Clone)]
pub struct Env {
    /// Reads from the L1.
    pub l1_client: Arc<dyn L1Client>,
    /// Sends the broadcasts of the L1 scripts.
    pub broadcaster: Arc<dyn Broadcaster>,
    /// Persists the state after every stage.
    pub state_writer: Arc<dyn StateWriter>,
    /// The account that signs every L1 transaction.
    pub deployer: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    DeploySuperchain,
    DeployImplementations,
    DeployOpChain(B256),
    GenerateL2Genesis(B256),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::DeploySuperchain => f.write_str("deploy-superchain"),
            Self::DeployImplementations => f.write_str("deploy-implementations"),
            Self::DeployOpChain(id) => write!(f, "deploy-opchain-{}", <U256 as From<B256>>::from(*id)),
            Self::GenerateL2Genesis(id) => write!(f, "generate-l2-genesis-{}", <U256 as From<B256>>::from(*id)),
        }
    }
}

/// Applies `intent` on top of `state`.
///
/// Stages run in order and skip work already recorded in `state`. After each stage the
/// broadcasts are sent and the state is written. `state.applied_intent` is only set once every
/// stage succeeded, so a failed run resumes from its first incomplete stage.
pub async fn apply_pipeline(
    env: &Env,
    artifacts: &ArtifactsFs,
    intent: &Intent,
    state: &mut State,
) -> Result<()> {
    intent.check()?;

    let mut stages = vec![Stage::Init, Stage::DeploySuperchain, Stage::DeployImplementations];
    for chain in &intent.chains {
        stages.push(Stage::DeployOpChain(chain.id));
        stages.push(Stage::GenerateL2Genesis(chain.id));
    }

    for stage in stages {
        info!(%stage, "Running stage");
        match stage {
            Stage::Init => init(env, intent, state).await?,
            Stage::DeploySuperchain => {
                deploy_superchain_stage(env, artifacts, intent, state).await?
            }
            Stage::DeployImplementations => {
                deploy_implementations_stage(env, artifacts, intent, state).await?
            }
            Stage::DeployOpChain(id) => {
                deploy_opchain_stage(env, artifacts, intent, state, id).await?
            }
            Stage::GenerateL2Genesis(id) => {
                generate_l2_genesis_stage(env, artifacts, intent, state, id).await?
            }
        }
        let (_, sent) = env.broadcaster.broadcast().await;
        sent?;
        env.state_writer.write_state(state)?;
    }

    let zero = state.zero_addresses();
    if !zero.is_empty() {
        return Err(DeployerError::InvalidOutput(format!(
            "zero addresses in state: {}",
            zero.join(", ")
        )));
    }
    state.applied_intent = Some(intent.clone());
    env.state_writer.write_state(state)?;
    info!(chains = intent.chains.len(), "Pipeline applied");
    Ok(())
}

/// A host on the L1 as the deployer, seeded with `seed` and reporting broadcasts to the
/// broadcaster of `env`.
async fn l1_host(
    env: &Env,
    artifacts: &ArtifactsFs,
    intent: &Intent,
    seed: Option<&Allocs>,
) -> Result<Host> {
    let context = Context {
        chain_id: intent.l1_chain_id,
        sender: env.deployer,
        origin: env.deployer,
        ..Default::default()
    };
    let hook = Arc::new(BroadcasterHook(env.broadcaster.clone()));
    let mut host = Host::new(artifacts.clone(), context).with_broadcast_hook(hook);
    host.enable_cheats()?;
    if let Some(seed) = seed {
        host.import_state(seed)?;
    }
    let nonce = env.l1_client.nonce(env.deployer).await?;
    host.set_nonce(env.deployer, nonce)?;
    Ok(host)
}

/// A host on the L2 `chain_id` as the genesis deployer, with broadcasts discarded.
fn l2_host(artifacts: &ArtifactsFs, chain_id: U256) -> Result<Host> {
    let chain_id = u64::try_from(chain_id).map_err(|_| {
        DeployerError::ConfigInvalid(format!("L2 chain ID {chain_id} does not fit 64 bits"))
    })?;
    let deployer = l2_genesis_deployer();
    let context = Context { chain_id, sender: deployer, origin: deployer, ..Default::default() };
    let mut host = Host::new(artifacts.clone(), context)
        .with_broadcast_hook(Arc::new(DiscardBroadcaster));
    host.enable_cheats()?;
    Ok(host)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use alloy_primitives::address;
    use async_trait::async_trait;
    use op_script::{Broadcast, BroadcastHook};
    use tempfile::TempDir;

    use super::*;
    use crate::{
        opcm::{
            test_utils::{insert_genesis_script, insert_script, writing_script},
            DeployImplementationsOutput, DeployOPChainOutput, DeploySuperchainOutput,
        },
        read_state, ArtifactsLocator, BlockRef, BroadcastResult, DevKeys, MultiError,
        WorkdirStateWriter,
    };

    const DEPLOYER: Address = address!("0x00000000000000000000000000000000000d3910");
    const PREDEPLOY: Address = address!("0x4200000000000000000000000000000000000016");

    /// An L1 that includes every broadcast immediately.
    #[derive(Debug)]
    struct MockL1 {
        chain_id: u64,
        pending: Mutex<Vec<Broadcast>>,
        sent: Mutex<Vec<Broadcast>>,
    }

    impl MockL1 {
        fn new(chain_id: u64) -> Arc<Self> {
            Arc::new(Self { chain_id, pending: Mutex::default(), sent: Mutex::default() })
        }

        fn sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl BroadcastHook for MockL1 {
        fn hook(&self, broadcast: Broadcast) {
            self.pending.lock().unwrap().push(broadcast);
        }
    }

    #[async_trait]
    impl Broadcaster for MockL1 {
        async fn broadcast(&self) -> (Vec<BroadcastResult>, Result<(), MultiError>) {
            let pending = std::mem::take(&mut *self.pending.lock().unwrap());
            let results = pending
                .iter()
                .map(|broadcast| BroadcastResult {
                    broadcast: broadcast.clone(),
                    tx_hash: broadcast.id,
                    receipt: None,
                    err: None,
                })
                .collect();
            self.sent.lock().unwrap().extend(pending);
            (results, Ok(()))
        }
    }

    #[async_trait]
    impl L1Client for MockL1 {
        async fn chain_id(&self) -> Result<u64> {
            Ok(self.chain_id)
        }

        async fn nonce(&self, _address: Address) -> Result<u64> {
            Ok(self.sent() as u64)
        }

        async fn latest_block(&self) -> Result<BlockRef> {
            Ok(BlockRef { number: self.sent() as u64, ..Default::default() })
        }
    }

    fn artifacts(with_implementations: bool) -> ArtifactsFs {
        let mut fs = ArtifactsFs::in_memory();
        insert_script(
            &mut fs,
            "DeploySuperchain.s.sol",
            "DeploySuperchain",
            writing_script::<DeploySuperchainOutput>(),
        );
        if with_implementations {
            insert_script(
                &mut fs,
                "DeployImplementations.s.sol",
                "DeployImplementations",
                writing_script::<DeployImplementationsOutput>(),
            );
        }
        insert_script(
            &mut fs,
            "DeployOPChain.s.sol",
            "DeployOPChain",
            writing_script::<DeployOPChainOutput>(),
        );
        insert_genesis_script(&mut fs, PREDEPLOY);
        fs
    }

    fn intent(chain_ids: &[u8]) -> Intent {
        let keys = DevKeys::default();
        let mut intent = Intent::new(900, ArtifactsLocator::File("/tmp/artifacts".into()), "dev");
        intent.superchain_roles = keys.superchain_roles(900).unwrap();
        for id in chain_ids {
            intent.chains.push(keys.chain_intent(900, B256::with_last_byte(*id)).unwrap());
        }
        intent
    }

    fn env(l1: &Arc<MockL1>, workdir: &TempDir) -> Env {
        Env {
            l1_client: l1.clone(),
            broadcaster: l1.clone(),
            state_writer: Arc::new(WorkdirStateWriter(workdir.path().to_path_buf())),
            deployer: DEPLOYER,
        }
    }

    #[tokio::test]
    async fn test_fresh_apply() {
        let workdir = TempDir::new().unwrap();
        let l1 = MockL1::new(900);
        let intent = intent(&[1]);
        let mut state = State::default();

        apply_pipeline(&env(&l1, &workdir), &artifacts(true), &intent, &mut state).await.unwrap();

        assert_eq!(state.applied_intent.as_ref(), Some(&intent));
        assert!(!state.create2_salt.is_zero());
        assert!(state.zero_addresses().is_empty(), "{:?}", state.zero_addresses());
        let superchain = state.superchain_deployment.as_ref().unwrap();
        assert_eq!(superchain.proxy_admin_address, DEPLOYER.create(0));
        let implementations = state.implementations_deployment.as_ref().unwrap();
        assert_eq!(implementations.opcm_proxy_address, DEPLOYER.create(5));
        assert_eq!(l1.sent(), 5 + 11 + 15);

        let chain = &state.chains[0];
        let allocs = &chain.allocs.as_ref().unwrap().0;
        assert!(allocs.contains_key(&PREDEPLOY));
        assert_eq!(chain.start_block.unwrap().number, 31);

        assert_eq!(read_state(workdir.path()).unwrap(), state);
    }

    #[tokio::test]
    async fn test_resume_after_failed_stage() {
        let workdir = TempDir::new().unwrap();
        let l1 = MockL1::new(900);
        let env = env(&l1, &workdir);
        let intent = intent(&[1]);

        let mut state = State::default();
        let err = apply_pipeline(&env, &artifacts(false), &intent, &mut state).await.unwrap_err();
        assert!(matches!(err, DeployerError::ArtifactMissing { .. }), "{err}");

        let mut resumed = read_state(workdir.path()).unwrap();
        let superchain = resumed.superchain_deployment.clone().unwrap();
        assert!(resumed.implementations_deployment.is_none());
        assert!(resumed.applied_intent.is_none());

        apply_pipeline(&env, &artifacts(true), &intent, &mut resumed).await.unwrap();
        assert_eq!(resumed.superchain_deployment, Some(superchain));
        assert_eq!(resumed.create2_salt, state.create2_salt);
        // The superchain was deployed exactly once.
        assert_eq!(l1.sent(), 5 + 11 + 15);
    }

    #[tokio::test]
    async fn test_multiple_chains() {
        let workdir = TempDir::new().unwrap();
        let l1 = MockL1::new(900);
        let intent = intent(&[1, 2]);
        let mut state = State::default();

        apply_pipeline(&env(&l1, &workdir), &artifacts(true), &intent, &mut state).await.unwrap();

        assert_eq!(state.chains.len(), 2);
        assert_eq!(state.chains[0].id, B256::with_last_byte(1));
        assert_eq!(state.chains[1].id, B256::with_last_byte(2));
        assert_ne!(
            state.chains[0].system_config_proxy_address,
            state.chains[1].system_config_proxy_address
        );
        for chain in &state.chains {
            assert!(!chain.allocs.as_ref().unwrap().0.is_empty());
        }
    }

    #[tokio::test]
    async fn test_immutable_change_leaves_state_untouched() {
        let workdir = TempDir::new().unwrap();
        let l1 = MockL1::new(900);
        let env = env(&l1, &workdir);
        let mut intent = intent(&[1]);
        let mut state = State::default();
        apply_pipeline(&env, &artifacts(true), &intent, &mut state).await.unwrap();
        let before = std::fs::read(workdir.path().join(crate::STATE_FILE)).unwrap();

        intent.use_fault_proofs = true;
        let err = apply_pipeline(&env, &artifacts(true), &intent, &mut state).await.unwrap_err();
        match err {
            DeployerError::ImmutableChanged { field, .. } => assert_eq!(field, "useFaultProofs"),
            err => panic!("unexpected error {err}"),
        }
        let after = std::fs::read(workdir.path().join(crate::STATE_FILE)).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_l1_chain_id_mismatch() {
        let workdir = TempDir::new().unwrap();
        let l1 = MockL1::new(901);
        let mut state = State::default();

        let err = apply_pipeline(&env(&l1, &workdir), &artifacts(true), &intent(&[]), &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployerError::ConfigInvalid(_)), "{err}");
        assert!(err.to_string().contains("L1 chain ID mismatch"), "{err}");
        assert_eq!(l1.sent(), 0);
    }
}
