use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use op_deployer::{
    apply_pipeline, download_artifacts, read_intent, read_state, Env, WorkdirStateWriter,
};
use tracing::info;

use crate::{L1Args, Result};

/// Deploy the intent of a work directory
#[derive(Parser, Debug)]
pub struct Cmd {
    /// L1 connection
    #[command(flatten)]
    pub l1: L1Args,

    /// Work directory created by `init`
    #[arg(long, env = "DEPLOYER_WORKDIR", default_value = ".deployer")]
    pub workdir: PathBuf,
}

impl Cmd {
    /// Runs the pipeline, writing `state.json` after every stage.
    pub async fn run(self) -> Result<()> {
        let intent = read_intent(&self.workdir)?;
        let mut state = read_state(&self.workdir)?;
        let artifacts = download_artifacts(&intent.contract_artifacts_url).await?;

        let env = Env {
            state_writer: Arc::new(WorkdirStateWriter(self.workdir.clone())),
            ..self.l1.connect().await?
        };
        apply_pipeline(&env, &artifacts.fs(), &intent, &mut state).await?;
        info!(workdir = %self.workdir.display(), chains = state.chains.len(), "Applied intent");
        Ok(())
    }
}
