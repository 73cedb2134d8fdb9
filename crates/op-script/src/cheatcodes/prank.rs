//! `prank` and `broadcast` cheat codes.

use alloy_primitives::Address;
use alloy_sol_types::SolCall;
use tracing::info;

use super::{utils::key_address, Cheatcode, CheatsCtxt, Vm::*};
use crate::{Result, ScriptInspector};

impl Cheatcode for prank_0Call {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        state.prank(Some(self.msgSender), None, false, false)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for prank_1Call {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        state.prank(Some(self.msgSender), Some(self.txOrigin), false, false)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for startPrank_0Call {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        state.prank(Some(self.msgSender), None, true, false)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for startPrank_1Call {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        state.prank(Some(self.msgSender), Some(self.txOrigin), true, false)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for stopPrankCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        state.stop_prank(false)?;
        Ok(Vec::new())
    }
}

/// Broadcasts from `signer`. Without an explicit signer scripts broadcast from `tx.origin`.
fn broadcast(state: &mut ScriptInspector, signer: Address, repeat: bool) -> Result<()> {
    info!(%signer, repeat, "Broadcasting");
    state.prank(Some(signer), None, repeat, true)
}

impl Cheatcode for broadcast_0Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        broadcast(ccx.state, ccx.ecx.tx.caller, false)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for broadcast_1Call {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        broadcast(state, self.signer, false)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for broadcast_2Call {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        broadcast(state, key_address(self.privateKey)?, false)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for startBroadcast_0Call {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        broadcast(ccx.state, ccx.ecx.tx.caller, true)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for startBroadcast_1Call {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        broadcast(state, self.signer, true)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for startBroadcast_2Call {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        broadcast(state, key_address(self.privateKey)?, true)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for stopBroadcastCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        info!("Stop broadcasting");
        state.stop_prank(true)?;
        Ok(Vec::new())
    }
}

impl Cheatcode for readCallersCall {
    fn apply_full(&self, ccx: &mut CheatsCtxt<'_>) -> Result<Vec<u8>> {
        let frame = ccx.state.current_frame();
        let mut callers = readCallersReturn {
            callerMode: CallerMode::None,
            msgSender: frame.map(|frame| frame.caller).unwrap_or_default(),
            txOrigin: ccx.ecx.tx.caller,
        };
        if let Some(prank) = frame.and_then(|frame| frame.prank.as_ref()) {
            callers.callerMode = prank.caller_mode();
            if let Some(sender) = prank.sender {
                callers.msgSender = sender;
                if prank.broadcast {
                    callers.txOrigin = sender;
                }
            }
            if let Some(origin) = prank.origin {
                callers.txOrigin = origin;
            }
        }
        Ok(Self::abi_encode_returns(&callers))
    }
}
