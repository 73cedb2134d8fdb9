use std::{fs, path::PathBuf};

use alloy_primitives::{B256, U256};
use clap::Parser;
use op_deployer::{
    write_intent, write_state, ArtifactsLocator, ChainIntent, DevKeys, Intent, State,
    INTENT_FILE,
};
use tracing::info;

use crate::{Error, Result};

/// Create a work directory holding a new intent and an empty state
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Chain ID of the L1
    #[arg(long = "l1.chain-id", visible_alias = "l1-chain-id", env = "DEPLOYER_L1_CHAIN_ID")]
    pub l1_chain_id: u64,

    /// Work directory to create
    #[arg(long, env = "DEPLOYER_WORKDIR", default_value = ".deployer")]
    pub workdir: PathBuf,

    /// Fill every role with a key of the test mnemonic
    #[arg(long, env = "DEPLOYER_DEV")]
    pub dev: bool,

    /// Comma-separated chain IDs of the L2 chains to declare
    #[arg(long = "l2-chain-ids", value_delimiter = ',')]
    pub l2_chain_ids: Vec<u64>,

    /// Location of the contract artifacts, a `file://` directory or an `http(s)://` tarball
    #[arg(long = "artifacts-locator", default_value = "file://packages/contracts-bedrock")]
    pub artifacts_locator: String,

    /// Identifier of the contract implementations release
    #[arg(long = "contracts-release", default_value = "dev")]
    pub contracts_release: String,
}

impl Cmd {
    /// Writes `intent.toml` and `state.json` into the work directory.
    pub fn run(self) -> Result<()> {
        if self.workdir.join(INTENT_FILE).exists() {
            return Err(Error::InvalidArgument(format!(
                "{} is already initialized",
                self.workdir.display()
            )));
        }
        let intent = self.intent()?;
        fs::create_dir_all(&self.workdir)?;
        write_intent(&self.workdir, &intent)?;
        write_state(&self.workdir, &State::default())?;
        info!(workdir = %self.workdir.display(), chains = intent.chains.len(), "Initialized");
        Ok(())
    }

    /// The intent described by the flags.
    pub fn intent(&self) -> Result<Intent> {
        let locator: ArtifactsLocator = self.artifacts_locator.parse()?;
        let mut intent = Intent::new(self.l1_chain_id, locator, self.contracts_release.as_str());
        let dev_keys = DevKeys::default();
        if self.dev {
            intent.superchain_roles = dev_keys.superchain_roles(self.l1_chain_id)?;
        }
        for chain_id in &self.l2_chain_ids {
            let id = B256::from(U256::from(*chain_id));
            let chain = if self.dev {
                dev_keys.chain_intent(self.l1_chain_id, id)?
            } else {
                ChainIntent {
                    id,
                    eip1559_denominator: 50,
                    eip1559_elasticity: 6,
                    ..Default::default()
                }
            };
            intent.chains.push(chain);
        }
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use op_deployer::{read_intent, read_state, STATE_VERSION};

    use super::*;

    fn cmd(workdir: PathBuf, dev: bool) -> Cmd {
        Cmd {
            l1_chain_id: 900,
            workdir,
            dev,
            l2_chain_ids: vec![901],
            artifacts_locator: "file:///tmp/artifacts".to_string(),
            contracts_release: "dev".to_string(),
        }
    }

    #[test]
    fn test_init_dev_writes_valid_intent() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("deployer");
        cmd(workdir.clone(), true).run().unwrap();

        let intent = read_intent(&workdir).unwrap();
        intent.check().unwrap();
        assert_eq!(intent.l1_chain_id, 900);
        assert_eq!(intent.chains[0].chain_id(), U256::from(901));
        assert!(!intent.superchain_roles.guardian.is_zero());

        let state = read_state(&workdir).unwrap();
        assert_eq!(state.version, STATE_VERSION);
        assert!(state.applied_intent.is_none());
    }

    #[test]
    fn test_init_without_dev_leaves_roles_unset() {
        let dir = tempfile::tempdir().unwrap();
        let intent = cmd(dir.path().to_path_buf(), false).intent().unwrap();
        assert!(intent.superchain_roles.proxy_admin_owner.is_zero());
        assert_eq!(intent.chains[0].eip1559_denominator, 50);
        assert!(intent.check().is_err());
    }

    #[test]
    fn test_init_refuses_initialized_workdir() {
        let dir = tempfile::tempdir().unwrap();
        cmd(dir.path().to_path_buf(), true).run().unwrap();
        let err = cmd(dir.path().to_path_buf(), true).run().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    }
}
