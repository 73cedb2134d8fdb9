use clap::{Parser, Subcommand};
use op_deployer::{txmgr::TxError, DeployerError};

use crate::LogArgs;

/// Deploys OP Stack chains to an L1.
#[derive(Parser, Debug)]
#[command(name = "op-deployer", version, infer_subcommands = true)]
pub struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    pub cmd: MainCmd,

    /// Logging configuration.
    #[command(flatten)]
    pub log_args: LogArgs,
}

/// Subcommands of the deployer.
#[derive(Subcommand, Debug)]
pub enum MainCmd {
    /// Create a work directory holding a new intent and an empty state
    Init(crate::init::Cmd),
    /// Deploy the intent of a work directory
    Apply(crate::apply::Cmd),
    /// Deploy the superchain and the OP Contracts Manager and print their addresses
    Bootstrap(crate::bootstrap::Cmd),
}

/// Errors of the deployer CLI.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A flag value could not be used.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The logger could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
    /// The deployment failed.
    #[error(transparent)]
    Deployer(#[from] DeployerError),
    /// The transaction manager could not be created.
    #[error(transparent)]
    Tx(#[from] TxError),
    /// File access failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON encoding failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type of the deployer CLI.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl MainCmd {
    /// Runs the subcommand.
    pub async fn run(self) -> Result<()> {
        match self {
            Self::Init(cmd) => cmd.run(),
            Self::Apply(cmd) => cmd.run().await,
            Self::Bootstrap(cmd) => cmd.run().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "op-deployer",
            "-vv",
            "apply",
            "--l1-rpc-url",
            "http://localhost:8545",
            "--workdir",
            "/tmp/deployer",
            "--private-key",
            "0x01",
        ])
        .unwrap();
        assert_eq!(cli.log_args.verbose, 2);
        let MainCmd::Apply(cmd) = cli.cmd else { panic!("expected apply") };
        assert_eq!(cmd.workdir, PathBuf::from("/tmp/deployer"));
        assert_eq!(cmd.l1.l1_rpc_url, "http://localhost:8545");
    }

    #[test]
    fn test_parse_init_dotted_chain_id() {
        let cli = Cli::try_parse_from([
            "op-deployer",
            "init",
            "--l1.chain-id",
            "900",
            "--workdir",
            "/tmp/deployer",
            "--dev",
            "--l2-chain-ids",
            "901,902",
        ])
        .unwrap();
        let MainCmd::Init(cmd) = cli.cmd else { panic!("expected init") };
        assert_eq!(cmd.l1_chain_id, 900);
        assert!(cmd.dev);
        assert_eq!(cmd.l2_chain_ids, [901, 902]);
    }

    #[test]
    fn test_bootstrap_requires_release() {
        let err = Cli::try_parse_from([
            "op-deployer",
            "bootstrap",
            "--l1-rpc-url",
            "http://localhost:8545",
            "--private-key",
            "0x01",
            "--artifacts-url",
            "file:///tmp/artifacts",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
