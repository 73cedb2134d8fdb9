//! Well-known addresses and defaults of the script host.

use alloy_primitives::{address, Address};

/// The cheat-code precompile address, `keccak("hevm cheat code")[12:]`.
pub const VM_ADDR: Address = address!("0x7109709ECfa91a80626fF3989D68f67F5b1DD12D");

/// The `console.log` sink address, the ASCII bytes of `console.log`.
pub const CONSOLE_ADDR: Address = address!("0x000000000000000000636F6e736F6c652e6c6f67");

/// The default `msg.sender` and `tx.origin`, `keccak("foundry default caller")[12:]`.
pub const DEFAULT_SENDER: Address = address!("0x1804c8AB1F12E6bbf3894d4083f33e07309d1f38");

/// Deploys script contracts, `keccak("op-stack script deployer")[12:]`.
pub const SCRIPT_DEPLOYER: Address = address!("0x76ce131128f3616871f8cda86d18fab44e4d0d8b");

/// The deterministic CREATE2 deployer. Broadcast CREATE2 deployments are routed through it.
pub const CREATE2_DEPLOYER: Address = address!("0x4e59b44847b379578588920cA78FbF26c0B4956C");

/// Gas limit used for script entry points and contract loading.
pub const DEFAULT_GAS_LIMIT: u64 = i64::MAX as u64;

/// Chain ID of a host constructed with the default [`Context`](crate::Context).
pub const DEFAULT_CHAIN_ID: u64 = 1337;

/// The standard development mnemonic.
pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
