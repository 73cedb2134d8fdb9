//! Hand-assembled EVM code for scripts in tests.

use alloy_primitives::{Address, Bytes, U256};
use revm::bytecode::opcode::{
    CALL, CALLER, CODECOPY, CREATE, GAS, ISZERO, JUMPDEST, JUMPI, MLOAD, MSTORE, ORIGIN, POP,
    PUSH0, RETURN, RETURNDATACOPY, RETURNDATASIZE, REVERT, SLOAD, SSTORE,
};

/// A builder for assembling EVM bytecode.
///
/// Memory is scratch space: every helper that needs memory writes its data at offset zero.
#[derive(Debug, Default, Clone)]
pub struct BytecodeBuilder {
    code: Vec<u8>,
}

impl BytecodeBuilder {
    /// Build the bytecode.
    pub fn build(self) -> Bytes {
        self.code.into()
    }

    /// Get the length of the bytecode.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Check if the bytecode is empty.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Append a single opcode or byte.
    pub fn append(mut self, opcode: u8) -> Self {
        self.code.push(opcode);
        self
    }

    /// Append a series of opcodes or bytes.
    pub fn append_many(mut self, items: impl IntoIterator<Item = u8>) -> Self {
        self.code.extend(items);
        self
    }

    /// Append a PUSH opcode and the bytes to push.
    pub fn push_bytes(mut self, bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        assert!(bytes.len() <= 32, "cannot push more than 32 bytes");
        self.code.push(PUSH0 + bytes.len() as u8);
        self.code.extend_from_slice(bytes);
        self
    }

    /// Append a PUSH8 of `number`.
    pub fn push_number(self, number: u64) -> Self {
        self.push_bytes(number.to_be_bytes())
    }

    /// Append a PUSH20 of `address`.
    pub fn push_address(self, address: Address) -> Self {
        self.push_bytes(address)
    }

    /// Append a PUSH32 of `value`.
    pub fn push_u256(self, value: U256) -> Self {
        self.push_bytes(value.to_be_bytes::<32>())
    }

    /// Store `bytes` in memory at `offset`, right-padded to full words.
    pub fn mstore(mut self, offset: usize, bytes: impl AsRef<[u8]>) -> Self {
        for (i, chunk) in bytes.as_ref().chunks(32).enumerate() {
            let mut word = [0u8; 32];
            word[..chunk.len()].copy_from_slice(chunk);
            self = self.push_bytes(word).push_number((offset + i * 32) as u64).append(MSTORE);
        }
        self
    }

    /// Store `value` at storage `slot`.
    pub fn sstore(self, slot: u64, value: U256) -> Self {
        self.push_u256(value).push_number(slot).append(SSTORE)
    }

    /// Store `msg.sender` at storage `slot`.
    pub fn store_caller(self, slot: u64) -> Self {
        self.append(CALLER).push_number(slot).append(SSTORE)
    }

    /// Store `tx.origin` at storage `slot`.
    pub fn store_origin(self, slot: u64) -> Self {
        self.append(ORIGIN).push_number(slot).append(SSTORE)
    }

    /// Store the first word of the last return data at storage `slot`.
    pub fn store_return_word(self, slot: u64) -> Self {
        self.push_number(32)
            .append_many([PUSH0, PUSH0, RETURNDATACOPY, PUSH0, MLOAD])
            .push_number(slot)
            .append(SSTORE)
    }

    /// CALL `target` with `input` and all remaining gas. A failing call reverts with its return
    /// data.
    pub fn call(self, target: Address, input: impl AsRef<[u8]>) -> Self {
        let len = input.as_ref().len() as u64;
        self.mstore(0, input)
            .append_many([PUSH0, PUSH0])
            .push_number(len)
            .append_many([PUSH0, PUSH0])
            .push_address(target)
            .append_many([GAS, CALL])
            .bubble_revert()
    }

    /// CALL `target` with `input` and all remaining gas, ignoring whether the call failed.
    pub fn try_call(self, target: Address, input: impl AsRef<[u8]>) -> Self {
        let len = input.as_ref().len() as u64;
        self.mstore(0, input)
            .append_many([PUSH0, PUSH0])
            .push_number(len)
            .append_many([PUSH0, PUSH0])
            .push_address(target)
            .append_many([GAS, CALL, POP])
    }

    /// CALL `target` with `prefix` followed by the word at storage `slot`. A failing call reverts
    /// with its return data.
    pub fn call_with_stored_word(
        self,
        target: Address,
        prefix: impl AsRef<[u8]>,
        slot: u64,
    ) -> Self {
        let len = prefix.as_ref().len() as u64;
        self.mstore(0, prefix)
            .push_number(slot)
            .append(SLOAD)
            .push_number(len)
            .append(MSTORE)
            .append_many([PUSH0, PUSH0])
            .push_number(len + 32)
            .append_many([PUSH0, PUSH0])
            .push_address(target)
            .append_many([GAS, CALL])
            .bubble_revert()
    }

    /// CREATE a contract from `init_code` and store its address at storage `slot`. A failing
    /// create reverts with its return data.
    pub fn create(self, init_code: impl AsRef<[u8]>, slot: u64) -> Self {
        let len = init_code.as_ref().len() as u64;
        self.mstore(0, init_code)
            .push_number(len)
            .append_many([PUSH0, PUSH0, CREATE])
            .append_many([0x80]) // DUP1
            .append(ISZERO)
            .append(ISZERO)
            .bubble_revert()
            .push_number(slot)
            .append(SSTORE)
    }

    /// Consumes a success flag, reverting with the last return data if it is zero.
    fn bubble_revert(self) -> Self {
        // PUSH8 dest, JUMPI, 7 revert bytes, then JUMPDEST.
        let dest = (self.len() + 9 + 1 + 7) as u64;
        self.push_number(dest)
            .append(JUMPI)
            .append_many([RETURNDATASIZE, PUSH0, PUSH0, RETURNDATACOPY, RETURNDATASIZE, PUSH0])
            .append(REVERT)
            .append(JUMPDEST)
    }

    /// Discard the top stack item.
    pub fn pop(self) -> Self {
        self.append(POP)
    }

    /// Append a RETURN opcode with empty return data.
    pub fn return_empty(self) -> Self {
        self.append_many([PUSH0, PUSH0, RETURN])
    }

    /// Append a RETURN opcode with the given return data.
    pub fn return_with_data(self, data: impl AsRef<[u8]>) -> Self {
        let len = data.as_ref().len() as u64;
        self.mstore(0, data).push_number(len).append(PUSH0).append(RETURN)
    }

    /// Append a REVERT opcode with the given return data.
    pub fn revert_with_data(self, data: impl AsRef<[u8]>) -> Self {
        let len = data.as_ref().len() as u64;
        self.mstore(0, data).push_number(len).append(PUSH0).append(REVERT)
    }

    /// Init code that runs `constructor` and then deploys `runtime`.
    pub fn init_code(constructor: Self, runtime: impl AsRef<[u8]>) -> Bytes {
        let runtime = runtime.as_ref();
        let len = runtime.len() as u64;
        // The copy prologue has a fixed size, so the runtime offset is known up front.
        let prologue = |offset: u64| {
            Self::default()
                .push_number(len)
                .push_number(offset)
                .append(PUSH0)
                .append(CODECOPY)
                .push_number(len)
                .append(PUSH0)
                .append(RETURN)
        };
        let offset = (constructor.len() + prologue(0).len()) as u64;
        let mut code = constructor.code;
        code.extend(prologue(offset).code);
        code.extend_from_slice(runtime);
        code.into()
    }
}
