//! Cheat codes served at [`VM_ADDR`](crate::VM_ADDR).
//!
//! Every cheat code is a [`Vm`] call type implementing [`Cheatcode`]. Calls are decoded with the
//! `sol!`-generated [`Vm::VmCalls`], so adding a cheat code only needs its signature in
//! [`Vm`] and an implementation.

use alloy_primitives::{hex, Address, Bytes};
use alloy_sol_types::{SolCall, SolInterface};
use tracing::{debug, trace};

use crate::{encode_revert, Result, ScriptContext, ScriptError, ScriptInspector};

/// Creates a [`ScriptError::Cheatcode`] from a format string.
macro_rules! cheat_err {
    ($($arg:tt)*) => {
        $crate::ScriptError::Cheatcode(format!($($arg)*))
    };
}
pub(crate) use cheat_err;

pub mod console;

mod env;
mod fork;
mod json;
mod prank;
mod state;
mod string;
mod utils;

mod vm;
pub use vm::Vm;

/// A cheat code.
pub(crate) trait Cheatcode: SolCall {
    /// Applies the cheat code to the host state.
    ///
    /// Implement this if the EVM context is not needed.
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        let _ = state;
        Err(ScriptError::UnsupportedCheat(Self::SIGNATURE.to_string()))
    }

    /// Applies the cheat code with access to the EVM context.
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        self.apply(ccx.state)
    }
}

/// The context a cheat code is applied in.
pub(crate) struct CheatsCtxt<'a> {
    /// Host-side state.
    pub(crate) state: &'a mut ScriptInspector,
    /// The EVM context.
    pub(crate) ecx: &'a mut ScriptContext,
    /// `msg.sender` of the cheat-code call.
    pub(crate) caller: Address,
}

/// Implements [`Cheatcode`] with an unconditional revert for deliberately unsupported cheats.
macro_rules! unsupported {
    ($($call:ident),* $(,)?) => {
        $( impl Cheatcode for Vm::$call {} )*
    };
}

unsupported!(
    difficultyCall,
    parseJson_0Call,
    parseJson_1Call,
    parseToml_0Call,
    parseToml_1Call,
    writeJson_0Call,
    writeJson_1Call,
    writeToml_0Call,
    writeToml_1Call,
    ffiCall,
    promptCall,
    mockCall_0Call,
    mockCall_1Call,
    recordCall,
    accessesCall,
    recordLogsCall,
    pauseGasMeteringCall,
    resumeGasMeteringCall,
    startStateDiffRecordingCall,
    stopAndReturnStateDiffCall,
);

fn apply<C: Cheatcode>(call: &C, ccx: &mut CheatsCtxt<'_>) -> Result<Bytes, Bytes> {
    trace!(cheat = C::SIGNATURE, caller = %ccx.caller, "Applying cheatcode");
    match call.apply_full(ccx) {
        Ok(output) => Ok(output.into()),
        Err(err) => {
            debug!(cheat = C::SIGNATURE, %err, "Cheatcode failed");
            Err(encode_revert(format!("failed to run {}, err: {err}", C::SIGNATURE)))
        }
    }
}

macro_rules! dispatch_calls {
    ($call:expr, $ccx:expr; $($variant:ident),* $(,)?) => {
        match $call {
            $( Vm::VmCalls::$variant(call) => apply(&call, $ccx), )*
        }
    };
}

/// Decodes `input` as a [`Vm`] call and applies it.
///
/// The error value is ABI-encoded revert data.
pub(crate) fn dispatch(ccx: &mut CheatsCtxt<'_>, input: &[u8]) -> Result<Bytes, Bytes> {
    let Some(selector) = input.get(..4).and_then(|selector| <[u8; 4]>::try_from(selector).ok())
    else {
        return Err(encode_revert(format!(
            "expected at least 4 bytes, but got '{}'",
            hex::encode(input)
        )));
    };
    if !Vm::VmCalls::valid_selector(selector) {
        return Err(encode_revert(format!(
            "unrecognized 4 byte signature: {}",
            hex::encode(selector)
        )));
    }
    let call = Vm::VmCalls::abi_decode(input).map_err(|err| {
        encode_revert(format!("failed to decode cheatcode 0x{}: {err}", hex::encode(selector)))
    })?;

    dispatch_calls!(call, ccx;
        // block and chain
        warp, roll, fee, coinbase, prevrandao_0, prevrandao_1, difficulty, chainId,
        getBlockNumber, getBlockTimestamp,
        // state
        store, load, etch, deal, setNonce, setNonceUnsafe, getNonce, resetNonce, dumpState,
        // pranks and broadcasts
        prank_0, prank_1, startPrank_0, startPrank_1, stopPrank,
        broadcast_0, broadcast_1, broadcast_2,
        startBroadcast_0, startBroadcast_1, startBroadcast_2, stopBroadcast, readCallers,
        // environment
        setEnv, envExists,
        envBool_0, envBool_1, envUint_0, envUint_1, envInt_0, envInt_1,
        envAddress_0, envAddress_1, envBytes32_0, envBytes32_1,
        envString_0, envString_1, envBytes_0, envBytes_1,
        envOr_0, envOr_1, envOr_2, envOr_3, envOr_4, envOr_5, envOr_6,
        envOr_7, envOr_8, envOr_9, envOr_10, envOr_11, envOr_12, envOr_13,
        // string conversion
        parseBytes, parseAddress, parseUint, parseInt, parseBytes32, parseBool,
        toString_0, toString_1, toString_2, toString_3, toString_4, toString_5,
        // json and toml
        keyExists, keyExistsJson, keyExistsToml,
        parseJson_0, parseJson_1, parseToml_0, parseToml_1, parseJsonKeys, parseTomlKeys,
        serializeJson,
        serializeBool_0, serializeBool_1, serializeUint_0, serializeUint_1,
        serializeInt_0, serializeInt_1, serializeAddress_0, serializeAddress_1,
        serializeBytes32_0, serializeBytes32_1, serializeString_0, serializeString_1,
        serializeBytes_0, serializeBytes_1,
        writeJson_0, writeJson_1, writeToml_0, writeToml_1,
        // artifacts
        getCode, getDeployedCode, projectRoot,
        // forking
        createFork_0, createFork_1, createFork_2,
        createSelectFork_0, createSelectFork_1, createSelectFork_2,
        selectFork, rollFork_0, rollFork_1, activeFork,
        makePersistent_0, makePersistent_1, makePersistent_2, makePersistent_3,
        revokePersistent_0, revokePersistent_1, isPersistent, allowCheatcodes,
        // utilities
        addr, label, getLabel, deriveKey_0, deriveKey_1, rememberKey, sleep, unixTime,
        // unsupported
        ffi, prompt, mockCall_0, mockCall_1, record, accesses, recordLogs,
        pauseGasMetering, resumeGasMetering, startStateDiffRecording, stopAndReturnStateDiff,
    )
}
