//! Command line interface of the OP Stack deployer.
//!
//! `init` writes a fresh work directory, `apply` drives the L1 and the state file towards the
//! intent, and `bootstrap` deploys the shared contracts without a work directory.

mod cmd;
pub use cmd::*;

mod logging;
pub use logging::*;

mod l1;
pub use l1::*;

/// `init` subcommand.
pub mod init;

/// `apply` subcommand.
pub mod apply;

/// `bootstrap` subcommand.
pub mod bootstrap;
