//! Helpers for testing scripts against the host.

mod bytecode;
pub use bytecode::*;

mod fork;
pub use fork::*;

use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, Bytes, U256};

use crate::{Artifact, ArtifactsFs, Context, Host};

/// A host over an empty state with cheat codes enabled.
pub fn cheats_host() -> Host {
    let mut host = Host::new(ArtifactsFs::in_memory(), Context::default());
    host.enable_cheats().expect("cheats are enabled once");
    host
}

/// An artifact deploying `runtime` with the human-readable `abi`, e.g. `["function run()"]`.
pub fn test_artifact(abi: &[&str], runtime: Bytes) -> Artifact {
    Artifact {
        abi: JsonAbi::parse(abi.iter().copied()).expect("valid human-readable ABI"),
        bytecode: BytecodeBuilder::init_code(BytecodeBuilder::default(), &runtime),
        deployed_bytecode: runtime,
        storage_layout: None,
        metadata: None,
    }
}

/// Deploys `runtime` from the tx origin and grants it cheat-code access.
pub fn deploy_script(host: &mut Host, runtime: Bytes) -> Address {
    let init_code = BytecodeBuilder::init_code(BytecodeBuilder::default(), &runtime);
    let address = host.create(host.tx_origin(), init_code, U256::ZERO).expect("deploy").address;
    host.allow_cheatcodes(address);
    address
}
