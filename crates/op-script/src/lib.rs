//! An in-process EVM host for running Solidity deployment scripts.
//!
//! The [`Host`] owns a `revm` instance over a [`ForkableState`], intercepts calls to host-side
//! precompiles and the cheat-code address, tracks a per-frame prank/broadcast stack and reports
//! broadcast-mode sub-calls to a [`BroadcastHook`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod allocs;
pub use allocs::*;

mod artifacts;
pub use artifacts::*;

pub mod forking;
pub use forking::{ForkId, ForkSource, ForkableState};

mod host;
pub use host::*;

pub mod precompile;
pub use precompile::{AbiField, AbiFields, AbiMethods, Precompile, ScriptPrecompile};

mod bindings;
pub use bindings::*;

pub mod cheatcodes;

mod scripts;
pub use scripts::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use alloy_dyn_abi;
pub use alloy_sol_types;
pub use revm;
