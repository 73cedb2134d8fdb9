use alloy_primitives::{Address, Bytes};
use revm::bytecode::OpCode;

use crate::cheatcodes::Vm::CallerMode;

/// A caller override installed by `prank`/`broadcast` on the frame that invoked the cheat code.
///
/// It applies to the direct sub-calls and sub-creates of that frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prank {
    /// The `msg.sender` of pranked sub-calls.
    pub sender: Option<Address>,
    /// The `tx.origin` of pranked sub-calls.
    pub origin: Option<Address>,
    /// The `tx.origin` to restore when a pranked sub-call returns.
    pub prev_origin: Address,
    /// Keep the prank after the first sub-call returns.
    pub repeat: bool,
    /// Record the sub-calls as broadcast transactions.
    pub broadcast: bool,
}

impl Prank {
    /// The mode reported by `readCallers`.
    pub const fn caller_mode(&self) -> CallerMode {
        match (self.broadcast, self.repeat) {
            (true, false) => CallerMode::Broadcast,
            (true, true) => CallerMode::RecurrentBroadcast,
            (false, false) => CallerMode::Prank,
            (false, true) => CallerMode::RecurrentPrank,
        }
    }
}

/// A contract execution frame observed by the host.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// The journal depth of the frame.
    pub depth: usize,
    /// The executing contract.
    pub address: Address,
    /// `msg.sender` of the frame.
    pub caller: Address,
    /// The call data, empty for creations.
    pub input: Bytes,
    /// The last executed opcode.
    pub last_op: u8,
    /// The program counter of [`CallFrame::last_op`].
    pub last_pc: usize,
    /// The program counter of the last jump into a `JUMPDEST`.
    pub last_jump_pc: usize,
    /// Caller override for sub-calls.
    pub prank: Option<Prank>,
}

impl CallFrame {
    pub(crate) const fn new(
        depth: usize,
        address: Address,
        caller: Address,
        input: Bytes,
        op: u8,
        pc: usize,
    ) -> Self {
        Self {
            depth,
            address,
            caller,
            input,
            last_op: op,
            last_pc: pc,
            last_jump_pc: 0,
            prank: None,
        }
    }

    /// The selector of the frame's call data, if any.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).and_then(|selector| selector.try_into().ok())
    }

    /// Name of [`CallFrame::last_op`].
    pub fn last_op_name(&self) -> &'static str {
        OpCode::new(self.last_op).map(|op| op.as_str()).unwrap_or("INVALID")
    }
}
