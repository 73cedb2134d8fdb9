//! Tests for loading scripts and precompiles into a host.

use alloy_primitives::{address, Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall, SolValue};
use op_script::{
    abi_fields,
    test_utils::{cheats_host, test_artifact, BytecodeBuilder},
    with_precompile_at_address, with_script, BoundCall, Precompile, ScriptError,
    DEFAULT_GAS_LIMIT, SCRIPT_DEPLOYER,
};

sol! {
    function value() external returns (uint256);
    function run() external;
    function missing() external;
}

#[derive(Debug, Default)]
struct ValueScript {
    value: BoundCall<valueCall>,
    run: BoundCall<runCall>,
}
op_script::hydrate!(ValueScript { value, run });

#[derive(Debug, Default)]
struct BrokenScript {
    missing: BoundCall<missingCall>,
}
op_script::hydrate!(BrokenScript { missing });

fn value_runtime() -> Bytes {
    BytecodeBuilder::default().return_with_data(U256::from(42).to_be_bytes::<32>()).build()
}

#[test]
fn test_with_script_deploys_and_binds() {
    let mut host = cheats_host();
    let artifact =
        test_artifact(&["function value() returns (uint256)", "function run()"], value_runtime());
    host.artifacts_mut().insert("Value.s.sol", "ValueScript", artifact);

    let expected = host.new_script_address().unwrap();
    let (script, address, cleanup) =
        with_script::<ValueScript>(&mut host, "Value.s.sol", "ValueScript").unwrap();
    assert_eq!(address, expected);
    assert_eq!(address, SCRIPT_DEPLOYER.create(0));
    assert!(script.value.is_bound());

    let value = script.value.call(&mut host.script_backend(address), &valueCall {}).unwrap();
    assert_eq!(value, U256::from(42));

    // Scripts are excluded from state dumps even before cleanup.
    assert!(!host.state_dump().unwrap().contains_key(&address));

    cleanup.run(&mut host).unwrap();
    assert!(!host.has_code(address).unwrap());
    // The next script gets a fresh address.
    assert_eq!(host.new_script_address().unwrap(), SCRIPT_DEPLOYER.create(1));
}

#[test]
fn test_with_script_rejects_missing_abi_entries() {
    let mut host = cheats_host();
    host.artifacts_mut().insert(
        "Value.s.sol",
        "ValueScript",
        test_artifact(&["function value() returns (uint256)"], value_runtime()),
    );

    let err = with_script::<BrokenScript>(&mut host, "Value.s.sol", "ValueScript").unwrap_err();
    assert!(matches!(err, ScriptError::AbiCheck(signature) if signature == "missing()"));
    // Nothing was deployed.
    assert_eq!(host.get_nonce(SCRIPT_DEPLOYER).unwrap(), 0);
}

#[test]
fn test_with_script_missing_artifact() {
    let mut host = cheats_host();
    let err = with_script::<ValueScript>(&mut host, "Nope.s.sol", "Nope").unwrap_err();
    assert!(matches!(err, ScriptError::ArtifactMissing { .. }));
}

#[derive(Debug, Default)]
struct Output {
    proxy: Address,
}
abi_fields!(Output { proxy });

sol! {
    function proxy() external returns (address);
}

#[test]
fn test_with_precompile_at_address() {
    let at = address!("0x0000000000000000000000000000000000100001");
    let mut host = cheats_host();
    let proxy = address!("0x00000000000000000000000000000000000000BB");

    let precompile = Precompile::fields(Output { proxy }).unwrap();
    let cleanup = with_precompile_at_address(&mut host, at, Box::new(precompile)).unwrap();
    assert!(host.has_code(at).unwrap());

    let err = with_precompile_at_address(
        &mut host,
        at,
        Box::new(Precompile::fields(Output::default()).unwrap()),
    )
    .unwrap_err();
    assert!(matches!(err, ScriptError::PrecompileExists(address) if address == at));

    let origin = host.tx_origin();
    let out = host
        .call(origin, at, proxyCall {}.abi_encode().into(), DEFAULT_GAS_LIMIT, U256::ZERO)
        .unwrap()
        .output;
    assert_eq!(Address::abi_decode(&out).unwrap(), proxy);

    cleanup.run(&mut host).unwrap();
    assert!(!host.has_precompile_override(&at));
    assert!(!host.has_code(at).unwrap());
}

#[test]
fn test_reserved_addresses_precede_scripts() {
    let mut host = cheats_host();
    host.artifacts_mut().insert(
        "Value.s.sol",
        "ValueScript",
        test_artifact(&["function value() returns (uint256)", "function run()"], value_runtime()),
    );

    let input = host.reserve_script_address().unwrap();
    let output = host.reserve_script_address().unwrap();
    assert_eq!([input, output], [SCRIPT_DEPLOYER.create(0), SCRIPT_DEPLOYER.create(1)]);

    let (_, address, _cleanup) =
        with_script::<ValueScript>(&mut host, "Value.s.sol", "ValueScript").unwrap();
    assert_eq!(address, SCRIPT_DEPLOYER.create(2));
    assert!(!host.state_dump().unwrap().contains_key(&SCRIPT_DEPLOYER));
}
