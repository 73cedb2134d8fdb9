//! Key, label, artifact and time cheat codes.

use std::{
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use alloy_primitives::{Address, B256, U256};
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use alloy_sol_types::SolValue;
use tracing::debug;

use super::{cheat_err, Cheatcode, Vm::*};
use crate::{Result, ScriptInspector};

const DEFAULT_DERIVATION_PATH_PREFIX: &str = "m/44'/60'/0'/0/";

/// Returns the address controlled by the secp256k1 private key `key`.
pub(super) fn key_address(key: U256) -> Result<Address> {
    let signer = PrivateKeySigner::from_bytes(&B256::from(key))
        .map_err(|err| cheat_err!("invalid private key: {err}"))?;
    Ok(signer.address())
}

fn derive_key(mnemonic: &str, path: &str, index: u32) -> Result<U256> {
    let signer = MnemonicBuilder::<English>::default()
        .phrase(mnemonic)
        .derivation_path(format!("{path}{index}"))
        .and_then(|builder| builder.build())
        .map_err(|err| cheat_err!("failed to derive key at {path}{index}: {err}"))?;
    Ok(U256::from_be_slice(&signer.credential().to_bytes()))
}

impl Cheatcode for addrCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(key_address(self.privateKey)?.abi_encode())
    }
}

impl Cheatcode for rememberKeyCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(key_address(self.privateKey)?.abi_encode())
    }
}

impl Cheatcode for deriveKey_0Call {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(derive_key(&self.mnemonic, DEFAULT_DERIVATION_PATH_PREFIX, self.index)?.abi_encode())
    }
}

impl Cheatcode for deriveKey_1Call {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(derive_key(&self.mnemonic, &self.derivationPath, self.index)?.abi_encode())
    }
}

impl Cheatcode for labelCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        let Self { account, newLabel } = self;
        state.labels.insert(*account, newLabel.clone());
        Ok(Vec::new())
    }
}

impl Cheatcode for getLabelCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        let label = match state.labels.get(&self.account) {
            Some(label) => label.clone(),
            None => format!("unlabeled:{}", self.account),
        };
        Ok(label.abi_encode())
    }
}

impl Cheatcode for getCodeCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(state.artifacts.lookup(&self.artifactPath)?.bytecode.abi_encode())
    }
}

impl Cheatcode for getDeployedCodeCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(state.artifacts.lookup(&self.artifactPath)?.deployed_bytecode.abi_encode())
    }
}

impl Cheatcode for projectRootCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        let root =
            state.artifacts.root().map(|root| root.display().to_string()).unwrap_or_default();
        Ok(root.abi_encode())
    }
}

impl Cheatcode for sleepCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        let millis: u64 = self
            .duration
            .try_into()
            .map_err(|_| cheat_err!("sleep duration {} does not fit into 64 bits", self.duration))?;
        debug!(millis, "Sleeping");
        thread::sleep(Duration::from_millis(millis));
        Ok(Vec::new())
    }
}

impl Cheatcode for unixTimeCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| cheat_err!("system time is before the unix epoch: {err}"))?;
        Ok(U256::from(now.as_millis()).abi_encode())
    }
}
