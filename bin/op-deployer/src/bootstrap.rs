use std::path::PathBuf;

use alloy_primitives::Address;
use clap::Parser;
use op_deployer::{
    bootstrap, download_artifacts, ArtifactsLocator, BootstrapConfig, SuperchainRoles,
};

use crate::{L1Args, Result};

/// Deploy the superchain and the OP Contracts Manager and print their addresses
#[derive(Parser, Debug)]
pub struct Cmd {
    /// L1 connection
    #[command(flatten)]
    pub l1: L1Args,

    /// Location of the contract artifacts, a `file://` directory or an `http(s)://` tarball
    #[arg(long = "artifacts-url")]
    pub artifacts_url: String,

    /// Identifier of the contract implementations release
    #[arg(long = "contracts-release")]
    pub contracts_release: String,

    /// Owner of the superchain proxy admin. Defaults to the deployer
    #[arg(long = "superchain-proxy-admin-owner")]
    pub proxy_admin_owner: Option<Address>,

    /// Owner of `ProtocolVersions`. Defaults to the deployer
    #[arg(long = "protocol-versions-owner")]
    pub protocol_versions_owner: Option<Address>,

    /// Guardian of `SuperchainConfig`. Defaults to the deployer
    #[arg(long = "guardian")]
    pub guardian: Option<Address>,

    /// Write the addresses to this file instead of stdout
    #[arg(long = "outfile")]
    pub outfile: Option<PathBuf>,
}

impl Cmd {
    /// Deploys and prints the addresses as JSON.
    pub async fn run(self) -> Result<()> {
        let locator: ArtifactsLocator = self.artifacts_url.parse()?;
        let artifacts = download_artifacts(&locator).await?;
        let config = BootstrapConfig {
            artifacts_locator: locator,
            contracts_release: self.contracts_release,
            superchain_roles: SuperchainRoles {
                proxy_admin_owner: self.proxy_admin_owner.unwrap_or_default(),
                protocol_versions_owner: self.protocol_versions_owner.unwrap_or_default(),
                guardian: self.guardian.unwrap_or_default(),
            },
        };

        let env = self.l1.connect().await?;
        let output = bootstrap(&env, &artifacts.fs(), config).await?;
        let json = serde_json::to_string_pretty(&output)?;
        match self.outfile {
            Some(path) => std::fs::write(path, json)?,
            None => println!("{json}"),
        }
        Ok(())
    }
}
