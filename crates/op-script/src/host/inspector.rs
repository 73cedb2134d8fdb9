use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use alloy_primitives::{Address, Bytes};
use revm::{
    bytecode::opcode,
    context::{JournalTr, LocalContextTr},
    interpreter::{
        interpreter_types::Jumps, CallInput, CallInputs, CallOutcome, CallScheme, CreateInputs,
        CreateOutcome, CreateScheme, Gas, InstructionResult, Interpreter, InterpreterResult,
    },
    primitives::Log,
    Inspector,
};
use tracing::{debug, warn};

use super::{
    decode_revert, encode_revert, Broadcast, BroadcastHook, BroadcastKind, CallFrame, Prank,
    ScriptContext,
};
use crate::{
    cheatcodes::{self, console, CheatsCtxt},
    forking::ForkSourceFactory,
    ArtifactsFs, Result, ScriptError, ScriptPrecompile, CONSOLE_ADDR, CREATE2_DEPLOYER, VM_ADDR,
};

/// The host-side state that the EVM hooks operate on.
///
/// Everything a cheat code or a precompile may mutate lives here, so that the hooks only need
/// `&mut self` and the EVM context.
#[derive(Debug)]
pub struct ScriptInspector {
    pub(crate) artifacts: ArtifactsFs,
    pub(crate) precompiles: HashMap<Address, Box<dyn ScriptPrecompile>>,
    pub(crate) cheats_enabled: bool,
    pub(crate) cheat_access: HashSet<Address>,
    pub(crate) call_stack: Vec<CallFrame>,
    pub(crate) labels: HashMap<Address, String>,
    pub(crate) env: HashMap<String, String>,
    pub(crate) serialized: HashMap<String, String>,
    pub(crate) broadcast_hook: Option<Arc<dyn BroadcastHook>>,
    pub(crate) fork_factory: Option<Arc<dyn ForkSourceFactory>>,
    pub(crate) isolated_broadcasts: bool,
    /// Call data of the frame about to be entered.
    next_input: Bytes,
    /// Broadcasts waiting for their sub-call to return, keyed by the calling depth.
    pending: Vec<(usize, Broadcast)>,
}

impl ScriptInspector {
    pub(crate) fn new(artifacts: ArtifactsFs) -> Self {
        Self {
            artifacts,
            precompiles: HashMap::new(),
            cheats_enabled: false,
            cheat_access: HashSet::new(),
            call_stack: Vec::new(),
            labels: HashMap::new(),
            env: HashMap::new(),
            serialized: HashMap::new(),
            broadcast_hook: None,
            fork_factory: None,
            isolated_broadcasts: false,
            next_input: Bytes::new(),
            pending: Vec::new(),
        }
    }

    /// The frame currently executing, if any.
    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.call_stack.last()
    }

    /// Installs a prank on the current frame.
    pub fn prank(
        &mut self,
        sender: Option<Address>,
        origin: Option<Address>,
        repeat: bool,
        broadcast: bool,
    ) -> Result<()> {
        if self.call_stack.iter().any(|frame| {
            frame.prank.as_ref().is_some_and(|prank| prank.broadcast != broadcast)
        }) {
            return Err(ScriptError::PrankConflict(if broadcast {
                "cannot broadcast while a prank is active".to_string()
            } else {
                "cannot prank while a broadcast is active".to_string()
            }));
        }
        let frame = self.call_stack.last_mut().ok_or(ScriptError::NoCallFrame)?;
        debug!(depth = frame.depth, ?sender, ?origin, repeat, broadcast, "Prank");
        frame.prank = Some(Prank { sender, origin, prev_origin: Address::ZERO, repeat, broadcast });
        Ok(())
    }

    /// Removes the prank of the current frame. Stopping a missing prank is a no-op.
    pub fn stop_prank(&mut self, broadcast: bool) -> Result<()> {
        let frame = self.call_stack.last_mut().ok_or(ScriptError::NoCallFrame)?;
        match &frame.prank {
            Some(prank) if prank.broadcast != broadcast => {
                Err(ScriptError::PrankConflict(if broadcast {
                    "cannot stop broadcast: a prank is active".to_string()
                } else {
                    "cannot stop prank: a broadcast is active".to_string()
                }))
            }
            _ => {
                frame.prank = None;
                Ok(())
            }
        }
    }

    /// Logs the frames of the current call stack, innermost first.
    pub fn log_call_stack(&self) {
        for frame in self.call_stack.iter().rev() {
            warn!(
                depth = frame.depth,
                address = %frame.address,
                label = self.labels.get(&frame.address).map(String::as_str).unwrap_or_default(),
                selector = frame.selector().map(alloy_primitives::hex::encode).unwrap_or_default(),
                last_op = frame.last_op_name(),
                last_pc = frame.last_pc,
                last_jump_pc = frame.last_jump_pc,
                "Call frame"
            );
        }
    }

    /// Drops all execution-scoped state after a top-level operation.
    pub(crate) fn reset_frames(&mut self) {
        self.call_stack.clear();
        self.pending.clear();
        self.next_input = Bytes::new();
    }

    fn unwind(&mut self, depth: usize) {
        while self.call_stack.last().is_some_and(|frame| frame.depth > depth) {
            self.call_stack.pop();
        }
    }

    /// The prank of the frame executing at `depth`.
    fn frame_prank(&mut self, depth: usize) -> Option<&mut Prank> {
        self.call_stack.last_mut().filter(|frame| frame.depth == depth)?.prank.as_mut()
    }

    fn apply_call_prank(
        &mut self,
        ecx: &mut ScriptContext,
        inputs: &mut CallInputs,
        depth: usize,
        input: &Bytes,
    ) -> Result<()> {
        let Some(prank) = self.frame_prank(depth) else { return Ok(()) };
        if let Some(sender) = prank.sender {
            inputs.caller = sender;
        }
        if let Some(origin) = prank.origin {
            prank.prev_origin = ecx.tx.caller;
            ecx.tx.caller = origin;
        }
        if !prank.broadcast || inputs.scheme != CallScheme::Call || inputs.is_static {
            return Ok(());
        }

        let from = inputs.caller;
        let account = ecx.journaled_state.load_account(from)?.data;
        let nonce = account.info.nonce;
        account.info.nonce += 1;
        account.mark_touch();
        let broadcast = Broadcast::new(
            BroadcastKind::Call,
            from,
            Some(inputs.target_address),
            input.clone(),
            inputs.value.get(),
            nonce,
        );
        debug!(%from, to = %inputs.target_address, nonce, "Broadcast call");
        self.pending.push((depth, broadcast));
        Ok(())
    }

    fn apply_create_prank(
        &mut self,
        ecx: &mut ScriptContext,
        inputs: &mut CreateInputs,
        depth: usize,
    ) -> Result<()> {
        let Some(prank) = self.frame_prank(depth) else { return Ok(()) };
        if let Some(sender) = prank.sender {
            inputs.caller = sender;
        }
        if let Some(origin) = prank.origin {
            prank.prev_origin = ecx.tx.caller;
            ecx.tx.caller = origin;
        }
        if !prank.broadcast {
            return Ok(());
        }

        let from = inputs.caller;
        let nonce = ecx.journaled_state.load_account(from)?.data.info.nonce;
        let broadcast = match inputs.scheme {
            CreateScheme::Create2 { salt } => {
                let account = ecx.journaled_state.load_account(from)?.data;
                account.info.nonce += 1;
                account.mark_touch();
                if !inputs.value.is_zero() {
                    if let Some(err) =
                        ecx.journaled_state.transfer(from, CREATE2_DEPLOYER, inputs.value)?
                    {
                        return Err(ScriptError::Evm(format!("CREATE2 value transfer: {err:?}")));
                    }
                }
                inputs.caller = CREATE2_DEPLOYER;
                let mut data = salt.to_be_bytes::<32>().to_vec();
                data.extend_from_slice(&inputs.init_code);
                Broadcast::new(
                    BroadcastKind::Call,
                    from,
                    Some(CREATE2_DEPLOYER),
                    data.into(),
                    inputs.value,
                    nonce,
                )
            }
            _ => Broadcast::new(
                BroadcastKind::Create,
                from,
                None,
                inputs.init_code.clone(),
                inputs.value,
                nonce,
            ),
        };
        debug!(%from, nonce, kind = ?broadcast.kind, "Broadcast create");
        self.pending.push((depth, broadcast));
        Ok(())
    }

    /// Restores `tx.origin` and consumes single-use pranks once a pranked sub-call returned.
    fn finish_prank(&mut self, ecx: &mut ScriptContext, depth: usize) {
        let Some(frame) = self.call_stack.last_mut().filter(|frame| frame.depth == depth) else {
            return;
        };
        let Some(prank) = &frame.prank else { return };
        if prank.origin.is_some() {
            ecx.tx.caller = prank.prev_origin;
        }
        if !prank.repeat {
            frame.prank = None;
        }
    }

    fn finish_broadcast(
        &mut self,
        ecx: &mut ScriptContext,
        depth: usize,
        success: bool,
        gas_used: u64,
    ) {
        if !self.pending.last().is_some_and(|(pending_depth, _)| *pending_depth == depth) {
            return;
        }
        let Some((_, mut broadcast)) = self.pending.pop() else { return };
        if !success {
            debug!(from = %broadcast.from, "Dropping broadcast of failed sub-call");
            // Calls and CREATE2 deployments bump the sender nonce outside the journal.
            if broadcast.kind == BroadcastKind::Call {
                Self::undo_nonce(ecx, broadcast.from);
            }
            return;
        }
        broadcast.gas_used = gas_used;
        if let Some(hook) = &self.broadcast_hook {
            hook.hook(broadcast);
        }
    }

    fn log_revert(&self, address: Address, data: &Bytes) {
        self.log_call_stack();
        match decode_revert(data) {
            Some(message) => warn!(%address, revert_msg = %message, "Revert"),
            None => warn!(%address, data = %data, "Revert"),
        }
    }

    /// Reverts the sender nonce bump of a top-level call so calls behave like `eth_call`.
    fn undo_tx_nonce(ecx: &mut ScriptContext) {
        let caller = ecx.tx.caller;
        Self::undo_nonce(ecx, caller);
    }

    fn undo_nonce(ecx: &mut ScriptContext, address: Address) {
        match ecx.journaled_state.load_account(address) {
            Ok(account) => {
                account.data.info.nonce = account.data.info.nonce.saturating_sub(1);
            }
            Err(err) => warn!(%address, %err, "Failed to restore nonce"),
        }
    }

    fn run_cheatcode(
        &mut self,
        ecx: &mut ScriptContext,
        caller: Address,
        input: &[u8],
    ) -> Result<Bytes, Bytes> {
        if !self.call_stack.is_empty() && !self.cheat_access.contains(&caller) {
            warn!(%caller, "Cheatcode access denied");
            return Err(encode_revert(format!("no cheatcode access for {caller}")));
        }
        let mut ccx = CheatsCtxt { state: self, ecx, caller };
        cheatcodes::dispatch(&mut ccx, input)
    }
}

/// Pranks apply to plain sub-calls, never to the cheat-code or console addresses.
fn is_pranked(inputs: &CallInputs) -> bool {
    matches!(inputs.scheme, CallScheme::Call | CallScheme::StaticCall) &&
        inputs.target_address != VM_ADDR &&
        inputs.target_address != CONSOLE_ADDR
}

fn call_input_bytes(ecx: &ScriptContext, input: &CallInput) -> Bytes {
    match input {
        CallInput::SharedBuffer(range) => ecx
            .local
            .shared_memory_buffer_slice(range.clone())
            .map(|slice| Bytes::copy_from_slice(&slice))
            .unwrap_or_default(),
        CallInput::Bytes(bytes) => bytes.clone(),
    }
}

fn call_outcome(inputs: &CallInputs, result: Result<Bytes, Bytes>) -> CallOutcome {
    let (result, output) = match result {
        Ok(output) => (InstructionResult::Return, output),
        Err(output) => (InstructionResult::Revert, output),
    };
    CallOutcome::new(
        InterpreterResult::new(result, output, Gas::new(inputs.gas_limit)),
        inputs.return_memory_offset.clone(),
    )
}

impl Inspector<ScriptContext> for ScriptInspector {
    fn step(&mut self, interp: &mut Interpreter, ecx: &mut ScriptContext) {
        let depth = ecx.journaled_state.depth();
        let address = interp.input.target_address;
        let op = interp.bytecode.opcode();
        let pc = interp.bytecode.pc();
        if self.call_stack.last().is_none_or(|frame| frame.depth < depth) {
            let input = std::mem::take(&mut self.next_input);
            let caller = interp.input.caller_address;
            self.call_stack.push(CallFrame::new(depth, address, caller, input, op, pc));
        }
        let Some(frame) = self.call_stack.last_mut() else { return };
        if frame.depth != depth || frame.address != address {
            panic!("scope context changed without call-frame pop/push");
        }
        if op == opcode::JUMPDEST {
            frame.last_jump_pc = frame.last_pc;
        }
        frame.last_op = op;
        frame.last_pc = pc;
    }

    fn log(&mut self, _interp: &mut Interpreter, _ecx: &mut ScriptContext, log: Log) {
        debug!(address = %log.address, topics = log.topics().len(), "Event");
    }

    fn call(&mut self, ecx: &mut ScriptContext, inputs: &mut CallInputs) -> Option<CallOutcome> {
        let depth = ecx.journaled_state.depth();
        if depth == 0 && !self.isolated_broadcasts {
            Self::undo_tx_nonce(ecx);
        }
        let input = call_input_bytes(ecx, &inputs.input);
        self.next_input = input.clone();

        if is_pranked(inputs) {
            if let Err(err) = self.apply_call_prank(ecx, inputs, depth, &input) {
                return Some(call_outcome(inputs, Err(encode_revert(err.to_string()))));
            }
        }

        let result = if inputs.bytecode_address == VM_ADDR && self.cheats_enabled {
            self.run_cheatcode(ecx, inputs.caller, &input)
        } else if inputs.bytecode_address == CONSOLE_ADDR {
            console::log(inputs.caller, &input);
            Ok(Bytes::new())
        } else if let Some(precompile) = self.precompiles.get_mut(&inputs.bytecode_address) {
            precompile.run(&input)
        } else {
            return None;
        };
        Some(call_outcome(inputs, result))
    }

    fn call_end(
        &mut self,
        ecx: &mut ScriptContext,
        inputs: &CallInputs,
        outcome: &mut CallOutcome,
    ) {
        let depth = ecx.journaled_state.depth();
        if outcome.result.is_revert() {
            self.log_revert(inputs.target_address, &outcome.result.output);
        }
        self.finish_broadcast(ecx, depth, outcome.result.is_ok(), outcome.result.gas.spent());
        self.unwind(depth);
        if is_pranked(inputs) {
            self.finish_prank(ecx, depth);
        }
    }

    fn create(
        &mut self,
        ecx: &mut ScriptContext,
        inputs: &mut CreateInputs,
    ) -> Option<CreateOutcome> {
        self.next_input = Bytes::new();
        let depth = ecx.journaled_state.depth();
        let err = self.apply_create_prank(ecx, inputs, depth).err()?;
        Some(CreateOutcome::new(
            InterpreterResult::new(
                InstructionResult::Revert,
                encode_revert(err.to_string()),
                Gas::new(inputs.gas_limit),
            ),
            None,
        ))
    }

    fn create_end(
        &mut self,
        ecx: &mut ScriptContext,
        _inputs: &CreateInputs,
        outcome: &mut CreateOutcome,
    ) {
        let depth = ecx.journaled_state.depth();
        if outcome.result.is_revert() {
            self.log_revert(outcome.address.unwrap_or_default(), &outcome.result.output);
        }
        self.finish_broadcast(ecx, depth, outcome.result.is_ok(), outcome.result.gas.spent());
        if depth == 0 && outcome.result.is_ok() {
            if let Some(address) = outcome.address {
                self.cheat_access.insert(address);
            }
        }
        self.unwind(depth);
        self.finish_prank(ecx, depth);
    }
}
