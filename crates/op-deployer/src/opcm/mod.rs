//! Typed wrappers around the OP Contracts Manager deployment scripts.
//!
//! Each script takes the address of an input precompile and of an output precompile. Inputs are
//! read through the field getters, outputs are written back with `set(bytes4,address)`.

use std::sync::{Arc, Mutex, PoisonError};

use alloy_primitives::Address;
use alloy_sol_types::sol;
use op_script::{
    precompile::AbiFields, with_precompile_at_address, with_script, BoundCall, Host, Precompile,
};
use tracing::info;

use crate::{DeployerError, Result};

mod superchain;
pub use superchain::*;

mod implementations;
pub use implementations::*;

mod opchain;
pub use opchain::*;

mod l2genesis;
pub use l2genesis::*;

sol! {
    /// Entry point of the input/output deployment scripts.
    function run(address input, address output) external;
}

#[derive(Debug, Default)]
struct DeployScript {
    run: BoundCall<runCall>,
}
op_script::hydrate!(DeployScript { run });

/// Runs the `contract` script of `file` with `input`, returning the outputs it wrote.
///
/// Every address output must be non-zero and hold code, except those named in `optional`.
fn run_deploy_script<I, O>(
    host: &mut Host,
    file: &str,
    contract: &str,
    input: I,
    optional: &[&str],
) -> Result<O>
where
    I: AbiFields + Send + 'static,
    O: AbiFields + Default + Send + 'static,
{
    let input_address = host.reserve_script_address()?;
    let output_address = host.reserve_script_address()?;
    let output = Arc::new(Mutex::new(O::default()));

    let input_cleanup =
        with_precompile_at_address(host, input_address, Box::new(Precompile::fields(input)?))?;
    let output_precompile = Precompile::fields_shared(output.clone())?.with_field_setter()?;
    let output_cleanup =
        with_precompile_at_address(host, output_address, Box::new(output_precompile))?;

    let result = with_script::<DeployScript>(host, file, contract).and_then(
        |(script, address, cleanup)| {
            let call = runCall { input: input_address, output: output_address };
            let ran = script.run.call(&mut host.script_backend(address), &call);
            cleanup.run(host)?;
            ran
        },
    );
    output_cleanup.run(host)?;
    input_cleanup.run(host)?;
    result?;

    let output = std::mem::take(&mut *output.lock().unwrap_or_else(PoisonError::into_inner));
    check_output(host, contract, &output, optional)?;
    info!(contract, "Deployment script finished");
    Ok(output)
}

/// The named address fields of `value`.
pub fn address_fields<T: AbiFields>(value: &T) -> Vec<(String, Address)> {
    T::abi_fields()
        .into_iter()
        .filter(|field| (field.settable)(value))
        .map(|field| {
            let word = (field.get)(value);
            (field.name.into_owned(), Address::from_slice(&word[12..32]))
        })
        .collect()
}

fn check_output<T: AbiFields>(
    host: &mut Host,
    contract: &str,
    output: &T,
    optional: &[&str],
) -> Result<()> {
    for (name, address) in address_fields(output) {
        if optional.contains(&name.as_str()) {
            continue;
        }
        if address.is_zero() {
            return Err(DeployerError::InvalidOutput(format!("{contract}: {name} is not set")));
        }
        if !host.has_code(address)? {
            return Err(DeployerError::InvalidOutput(format!(
                "{contract}: {name} at {address} has no code"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_utils {
    //! Fake deployment scripts that write fixed outputs.

    use alloy_primitives::{keccak256, Address, Bytes, U256};
    use alloy_sol_types::SolCall;
    use op_script::{
        cheatcodes::Vm,
        precompile::{AbiFields, SETTER_SIGNATURE},
        test_utils::{test_artifact, BytecodeBuilder},
        ArtifactsFs, SCRIPT_DEPLOYER, VM_ADDR,
    };

    /// The output precompile of a script run on a host whose script deployer starts at nonce 0.
    pub(crate) fn output_address() -> Address {
        SCRIPT_DEPLOYER.create(1)
    }

    /// Runtime code that broadcasts one contract creation per address field of `T` and writes
    /// the created addresses to the output precompile.
    pub(crate) fn writing_script<T: AbiFields + Default>() -> Bytes {
        let child = BytecodeBuilder::init_code(BytecodeBuilder::default(), [0x00]);
        let value = T::default();
        let fields: Vec<_> = T::abi_fields()
            .into_iter()
            .filter(|field| (field.settable)(&value))
            .map(|field| field.name)
            .collect();

        let mut code = BytecodeBuilder::default()
            .call(VM_ADDR, Vm::startBroadcast_0Call {}.abi_encode());
        for slot in 0..fields.len() as u64 {
            code = code.create(&child, slot);
        }
        code = code.call(VM_ADDR, Vm::stopBroadcastCall {}.abi_encode());
        for (slot, name) in fields.iter().enumerate() {
            let mut prefix = keccak256(SETTER_SIGNATURE.as_bytes())[..4].to_vec();
            prefix.extend_from_slice(&keccak256(format!("{name}()").as_bytes())[..4]);
            prefix.extend_from_slice(&[0; 28]);
            code = code.call_with_stored_word(output_address(), prefix, slot as u64);
        }
        code.return_empty().build()
    }

    /// Registers `runtime` as `contract` of `file` with a `run(address,address)` ABI.
    pub(crate) fn insert_script(fs: &mut ArtifactsFs, file: &str, contract: &str, runtime: Bytes) {
        fs.insert(file, contract, test_artifact(&["function run(address,address)"], runtime));
    }

    /// Registers an `L2Genesis` script that etches `predeploy` with a one-byte runtime and funds
    /// it with 1 wei.
    pub(crate) fn insert_genesis_script(fs: &mut ArtifactsFs, predeploy: Address) {
        let runtime = BytecodeBuilder::default()
            .call(
                VM_ADDR,
                Vm::etchCall { target: predeploy, newRuntimeBytecode: Bytes::from_static(&[0]) }
                    .abi_encode(),
            )
            .call(
                VM_ADDR,
                Vm::dealCall { account: predeploy, newBalance: U256::from(1) }.abi_encode(),
            )
            .return_empty()
            .build();
        fs.insert(
            "L2Genesis.s.sol",
            "L2Genesis",
            test_artifact(&["function runWithEnv()"], runtime),
        );
    }
}
