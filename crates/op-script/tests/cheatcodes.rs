//! Tests for cheat codes called from scripts running in the host.

use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use op_script::{
    cheatcodes::Vm,
    test_utils::{cheats_host, deploy_script, BytecodeBuilder},
    Host, ScriptError, DEFAULT_GAS_LIMIT, VM_ADDR,
};

const PRANK_SENDER: Address = address!("0x00000000000000000000000000000000000000AA");
const PRANK_ORIGIN: Address = address!("0x00000000000000000000000000000000000000BB");
const ALICE: Address = address!("0x00000000000000000000000000000000000A11CE");
const RECORDER: Address = address!("0x0000000000000000000000000000000000001234");

/// Stores `msg.sender` at the slot given by the first calldata word and `tx.origin` at the next
/// slot.
const RECORDER_CODE: [u8; 13] = [
    0x5f, 0x35, 0x80, 0x33, 0x90, 0x55, // PUSH0 CALLDATALOAD DUP1 CALLER SWAP1 SSTORE
    0x60, 0x01, 0x01, 0x32, 0x90, 0x55, // PUSH1 1 ADD ORIGIN SWAP1 SSTORE
    0x00, // STOP
];

fn slot(index: u8) -> B256 {
    B256::with_last_byte(index)
}

fn run(host: &mut Host, script: Address) -> Result<Bytes, ScriptError> {
    let origin = host.tx_origin();
    Ok(host.call(origin, script, Bytes::new(), DEFAULT_GAS_LIMIT, U256::ZERO)?.output)
}

fn stored_address(host: &mut Host, account: Address, index: u8) -> Address {
    Address::from_word(host.storage_at(account, slot(index)).unwrap())
}

fn stored_uint(host: &mut Host, account: Address, index: u8) -> U256 {
    host.storage_at(account, slot(index)).unwrap().into()
}

#[test]
fn test_prank_applies_to_creates_until_stopped() {
    let child = BytecodeBuilder::init_code(BytecodeBuilder::default().store_caller(0), [0x00]);
    let runtime = BytecodeBuilder::default()
        .call(VM_ADDR, Vm::startPrank_0Call { msgSender: PRANK_SENDER }.abi_encode())
        .create(&child, 0)
        .call(VM_ADDR, Vm::stopPrankCall {}.abi_encode())
        .create(&child, 1)
        .return_empty()
        .build();

    let mut host = cheats_host();
    let script = deploy_script(&mut host, runtime);
    run(&mut host, script).unwrap();

    let pranked_child = stored_address(&mut host, script, 0);
    assert_eq!(stored_address(&mut host, pranked_child, 0), PRANK_SENDER);
    let plain_child = stored_address(&mut host, script, 1);
    assert_eq!(stored_address(&mut host, plain_child, 0), script);
}

/// Records the caller and origin of a call into slots `2 * index` and `2 * index + 1`.
fn record(builder: BytecodeBuilder, index: u64) -> BytecodeBuilder {
    builder.call(RECORDER, U256::from(2 * index).to_be_bytes::<32>())
}

fn recorded(host: &mut Host, index: u8) -> (Address, Address) {
    (stored_address(host, RECORDER, 2 * index), stored_address(host, RECORDER, 2 * index + 1))
}

#[test]
fn test_prank_applies_to_next_call_only() {
    let runtime = BytecodeBuilder::default().call(
        VM_ADDR,
        Vm::prank_1Call { msgSender: PRANK_SENDER, txOrigin: PRANK_ORIGIN }.abi_encode(),
    );
    let runtime = record(record(runtime, 0), 1).return_empty().build();

    let mut host = cheats_host();
    host.state_mut().set_code(RECORDER, Bytes::copy_from_slice(&RECORDER_CODE)).unwrap();
    let script = deploy_script(&mut host, runtime);
    let origin = host.tx_origin();
    run(&mut host, script).unwrap();

    assert_eq!(recorded(&mut host, 0), (PRANK_SENDER, PRANK_ORIGIN));
    assert_eq!(recorded(&mut host, 1), (script, origin));
    assert_eq!(host.tx_origin(), origin);
}

#[test]
fn test_start_prank_applies_to_calls_until_stopped() {
    let runtime = BytecodeBuilder::default()
        .call(VM_ADDR, Vm::startPrank_0Call { msgSender: PRANK_SENDER }.abi_encode());
    let runtime = record(record(runtime, 0), 1)
        .call(VM_ADDR, Vm::stopPrankCall {}.abi_encode());
    let runtime = record(runtime, 2).return_empty().build();

    let mut host = cheats_host();
    host.state_mut().set_code(RECORDER, Bytes::copy_from_slice(&RECORDER_CODE)).unwrap();
    let script = deploy_script(&mut host, runtime);
    let origin = host.tx_origin();
    run(&mut host, script).unwrap();

    assert_eq!(recorded(&mut host, 0), (PRANK_SENDER, origin));
    assert_eq!(recorded(&mut host, 1), (PRANK_SENDER, origin));
    assert_eq!(recorded(&mut host, 2), (script, origin));
}

#[test]
fn test_set_and_reset_nonce() {
    let runtime = BytecodeBuilder::default()
        .call(VM_ADDR, Vm::setNonceCall { account: ALICE, newNonce: 9 }.abi_encode())
        .call(VM_ADDR, Vm::getNonceCall { account: ALICE }.abi_encode())
        .store_return_word(0)
        .call(VM_ADDR, Vm::resetNonceCall { account: ALICE }.abi_encode())
        .call(VM_ADDR, Vm::getNonceCall { account: ALICE }.abi_encode())
        .store_return_word(1)
        .call(VM_ADDR, Vm::resetNonceCall { account: VM_ADDR }.abi_encode())
        .call(VM_ADDR, Vm::getNonceCall { account: VM_ADDR }.abi_encode())
        .store_return_word(2)
        .return_empty()
        .build();

    let mut host = cheats_host();
    let script = deploy_script(&mut host, runtime);
    run(&mut host, script).unwrap();

    assert_eq!(stored_uint(&mut host, script, 0), U256::from(9));
    assert_eq!(stored_uint(&mut host, script, 1), U256::ZERO);
    // VM_ADDR holds placeholder code, so it resets like a contract.
    assert_eq!(stored_uint(&mut host, script, 2), U256::from(1));
    assert_eq!(host.get_nonce(ALICE).unwrap(), 0);
}

#[test]
fn test_store_and_deal() {
    let runtime = BytecodeBuilder::default()
        .call(
            VM_ADDR,
            Vm::storeCall { target: ALICE, slot: slot(7), value: B256::repeat_byte(0x11) }
                .abi_encode(),
        )
        .call(VM_ADDR, Vm::dealCall { account: ALICE, newBalance: U256::from(5) }.abi_encode())
        .return_empty()
        .build();

    let mut host = cheats_host();
    let script = deploy_script(&mut host, runtime);
    run(&mut host, script).unwrap();

    assert_eq!(host.storage_at(ALICE, slot(7)).unwrap(), B256::repeat_byte(0x11));
    assert_eq!(host.balance(ALICE).unwrap(), U256::from(5));
}

#[test]
fn test_cheatcode_access_denied() {
    let runtime = BytecodeBuilder::default()
        .call(VM_ADDR, Vm::getNonceCall { account: ALICE }.abi_encode())
        .return_empty()
        .build();

    let mut host = cheats_host();
    let outsider = address!("0x0000000000000000000000000000000000C0FFEE");
    host.state_mut().set_code(outsider, runtime).unwrap();

    let err = run(&mut host, outsider).unwrap_err();
    let ScriptError::Revert { message, .. } = err else { panic!("expected revert, got {err}") };
    assert!(message.unwrap_or_default().contains("no cheatcode access"));
}

#[test]
fn test_unsupported_cheatcode_reverts() {
    let runtime = BytecodeBuilder::default()
        .call(VM_ADDR, Vm::ffiCall { commandInput: vec!["ls".to_string()] }.abi_encode())
        .return_empty()
        .build();

    let mut host = cheats_host();
    let script = deploy_script(&mut host, runtime);
    let err = run(&mut host, script).unwrap_err();
    let ScriptError::Revert { message, .. } = err else { panic!("expected revert, got {err}") };
    assert!(message.unwrap_or_default().starts_with("failed to run ffi(string[])"));
}

#[test]
fn test_unknown_selector_reverts() {
    let runtime = BytecodeBuilder::default()
        .call(VM_ADDR, [0xde, 0xad, 0xbe, 0xef])
        .return_empty()
        .build();

    let mut host = cheats_host();
    let script = deploy_script(&mut host, runtime);
    let err = run(&mut host, script).unwrap_err();
    let ScriptError::Revert { message, .. } = err else { panic!("expected revert, got {err}") };
    assert_eq!(message.unwrap_or_default(), "unrecognized 4 byte signature: deadbeef");
}

#[test]
fn test_enable_cheats_twice_fails() {
    let mut host = cheats_host();
    assert!(host.cheats_enabled());
    assert!(matches!(host.enable_cheats(), Err(ScriptError::CheatsAlreadyEnabled)));
}

#[test]
fn test_env_overlay_is_host_scoped() {
    let runtime = BytecodeBuilder::default()
        .call(
            VM_ADDR,
            Vm::envUint_0Call { name: "OP_SCRIPT_IT_CHAIN_ID".to_string() }.abi_encode(),
        )
        .store_return_word(0)
        .return_empty()
        .build();

    let mut host = cheats_host();
    host.set_env_var("OP_SCRIPT_IT_CHAIN_ID", "0x384");
    let script = deploy_script(&mut host, runtime.clone());
    run(&mut host, script).unwrap();
    assert_eq!(stored_uint(&mut host, script, 0), U256::from(900));

    let mut other = cheats_host();
    let script = deploy_script(&mut other, runtime);
    assert!(run(&mut other, script).is_err());
}
