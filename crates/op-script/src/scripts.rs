//! Loading scripts and precompiles into a [`Host`] for the duration of a stage.

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use crate::{new_bindings, Host, Hydrate, Result, ScriptError, ScriptPrecompile, SCRIPT_DEPLOYER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanupAction {
    WipeScript(Address),
    RemovePrecompile(Address),
}

/// Undoes a [`with_script`] or [`with_precompile_at_address`] once the caller is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "the script or precompile stays installed until `run` is called"]
pub struct Cleanup(CleanupAction);

impl Cleanup {
    /// Runs the cleanup against `host`.
    pub fn run(self, host: &mut Host) -> Result<()> {
        match self.0 {
            CleanupAction::WipeScript(address) => {
                debug!(%address, "Wiping script");
                host.wipe(address)
            }
            CleanupAction::RemovePrecompile(address) => host.set_precompile(address, None),
        }
    }
}

/// Deploys `contract` of the artifact `file` from the script deployer and hydrates bindings `B`
/// for it.
///
/// Every binding of `B` must be present in the artifact ABI. The script is granted access to the
/// cheat codes. The returned [`Cleanup`] wipes the script from the state.
pub fn with_script<B: Hydrate + Default>(
    host: &mut Host,
    file: &str,
    contract: &str,
) -> Result<(B, Address, Cleanup)> {
    let artifact = host.artifacts_mut().read_artifact(file, contract)?;
    let bindings = new_bindings::<B>(Some(&artifact.abi))?;

    let expected = host.new_script_address()?;
    let deployed = host.create(SCRIPT_DEPLOYER, artifact.bytecode.clone(), U256::ZERO)?;
    if deployed.address != expected {
        return Err(ScriptError::CreateAddressMismatch { expected, actual: deployed.address });
    }
    host.remember_artifact(deployed.address, &artifact, contract)?;
    host.allow_cheatcodes(deployed.address);
    info!(address = %deployed.address, file, contract, "Deployed script");

    Ok((bindings, deployed.address, Cleanup(CleanupAction::WipeScript(deployed.address))))
}

/// Installs `precompile` at `address` until the returned [`Cleanup`] runs.
///
/// Fails if another precompile override already lives at `address`.
pub fn with_precompile_at_address(
    host: &mut Host,
    address: Address,
    precompile: Box<dyn ScriptPrecompile>,
) -> Result<Cleanup> {
    if host.has_precompile_override(&address) {
        return Err(ScriptError::PrecompileExists(address));
    }
    host.set_precompile(address, Some(precompile))?;
    Ok(Cleanup(CleanupAction::RemovePrecompile(address)))
}

