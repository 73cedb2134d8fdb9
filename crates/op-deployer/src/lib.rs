//! Deploys OP Stack chains to an L1.
//!
//! An [`Intent`] declares the chains to deploy. [`apply_pipeline`] runs the deployment scripts in
//! an [`op_script::Host`] per stage, sends their broadcasts through a [`Broadcaster`] and records
//! the results in a resumable [`State`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
pub use error::*;

mod intent;
pub use intent::*;

mod artifacts;
pub use artifacts::*;

mod state;
pub use state::*;

pub mod devkeys;
pub use devkeys::DevKeys;

mod broadcaster;
pub use broadcaster::*;

pub mod txmgr;
pub use txmgr::{AlloyTxManager, TxManager, TxManagerConfig};

pub mod opcm;

mod pipeline;
pub use pipeline::*;

mod bootstrap;
pub use bootstrap::*;
