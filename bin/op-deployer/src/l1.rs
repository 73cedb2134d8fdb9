use std::sync::Arc;

use alloy_provider::{Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use clap::Parser;
use op_deployer::{
    AlloyTxManager, Env, KeyedBroadcaster, NoopStateWriter, RpcL1Client, TxManager,
    TxManagerConfig,
};
use tracing::info;

use crate::{Error, Result};

/// Connection to the L1 and the key that signs the deployment.
#[derive(Parser, Debug, Clone)]
pub struct L1Args {
    /// JSON-RPC URL of the L1
    #[arg(long = "l1-rpc-url", env = "DEPLOYER_L1_RPC_URL")]
    pub l1_rpc_url: String,

    /// Hex-encoded private key of the deployer
    #[arg(long = "private-key", env = "DEPLOYER_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,
}

impl L1Args {
    /// Connects to the L1 and builds a pipeline environment sending from the private key.
    ///
    /// The returned environment does not persist state.
    pub async fn connect(&self) -> Result<Env> {
        let url = self.l1_rpc_url.parse().map_err(|err| {
            Error::InvalidArgument(format!("invalid L1 RPC URL {}: {err}", self.l1_rpc_url))
        })?;
        let signer: PrivateKeySigner = self
            .private_key
            .parse()
            .map_err(|err| Error::InvalidArgument(format!("invalid private key: {err}")))?;
        let provider =
            ProviderBuilder::new().disable_recommended_fillers().connect_http(url).erased();

        let txmgr =
            AlloyTxManager::new(provider.clone(), signer, TxManagerConfig::default()).await?;
        let deployer = txmgr.from();
        info!(%deployer, url = %self.l1_rpc_url, "Connected to L1");
        Ok(Env {
            l1_client: Arc::new(RpcL1Client(provider)),
            broadcaster: Arc::new(KeyedBroadcaster::new(txmgr)),
            state_writer: Arc::new(NoopStateWriter),
            deployer,
        })
    }
}
