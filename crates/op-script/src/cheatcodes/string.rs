//! String parsing and formatting cheat codes.

use std::str::FromStr;

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{hex, Address, Bytes, B256, I256, U256};
use alloy_sol_types::SolValue;

use super::{cheat_err, Cheatcode, Vm::*};
use crate::{Result, ScriptInspector};

/// Parses `true`/`false` in any case, or `1`/`0`.
pub(super) fn parse_bool(s: &str) -> Result<bool> {
    match s {
        "1" => Ok(true),
        "0" => Ok(false),
        s if s.eq_ignore_ascii_case("true") => Ok(true),
        s if s.eq_ignore_ascii_case("false") => Ok(false),
        s => Err(cheat_err!("invalid bool {s:?}")),
    }
}

/// Parses a decimal or `0x`-prefixed hex number in `[0, 2^256)`.
pub(super) fn parse_uint(s: &str) -> Result<U256> {
    match DynSolType::Uint(256).coerce_str(s) {
        Ok(DynSolValue::Uint(value, _)) => Ok(value),
        Ok(_) => Err(cheat_err!("invalid uint256 {s:?}")),
        Err(err) => Err(cheat_err!("invalid uint256 {s:?}: {err}")),
    }
}

/// Parses a signed decimal or hex number in `[-2^255, 2^255)`.
pub(super) fn parse_int(s: &str) -> Result<I256> {
    match DynSolType::Int(256).coerce_str(s) {
        Ok(DynSolValue::Int(value, _)) => Ok(value),
        Ok(_) => Err(cheat_err!("invalid int256 {s:?}")),
        Err(err) => Err(cheat_err!("invalid int256 {s:?}: {err}")),
    }
}

pub(super) fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s).map_err(|err| cheat_err!("invalid address {s:?}: {err}"))
}

/// Parses exactly 32 hex-encoded bytes.
pub(super) fn parse_bytes32(s: &str) -> Result<B256> {
    B256::from_str(s).map_err(|err| cheat_err!("invalid bytes32 {s:?}: {err}"))
}

pub(super) fn parse_bytes(s: &str) -> Result<Bytes> {
    hex::decode(s).map(Bytes::from).map_err(|err| cheat_err!("invalid bytes {s:?}: {err}"))
}

impl Cheatcode for parseBytesCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(parse_bytes(&self.stringifiedValue)?.abi_encode())
    }
}

impl Cheatcode for parseAddressCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(parse_address(&self.stringifiedValue)?.abi_encode())
    }
}

impl Cheatcode for parseUintCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(parse_uint(&self.stringifiedValue)?.abi_encode())
    }
}

impl Cheatcode for parseIntCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(parse_int(&self.stringifiedValue)?.abi_encode())
    }
}

impl Cheatcode for parseBytes32Call {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(parse_bytes32(&self.stringifiedValue)?.abi_encode())
    }
}

impl Cheatcode for parseBoolCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(parse_bool(&self.stringifiedValue)?.abi_encode())
    }
}

impl Cheatcode for toString_0Call {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(self.value.to_checksum(None).abi_encode())
    }
}

impl Cheatcode for toString_1Call {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(hex::encode_prefixed(&self.value).abi_encode())
    }
}

impl Cheatcode for toString_2Call {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(hex::encode_prefixed(self.value).abi_encode())
    }
}

impl Cheatcode for toString_3Call {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(self.value.to_string().abi_encode())
    }
}

impl Cheatcode for toString_4Call {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(self.value.to_string().abi_encode())
    }
}

impl Cheatcode for toString_5Call {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(self.value.to_string().abi_encode())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("true", true)]
    #[case("TRUE", true)]
    #[case("1", true)]
    #[case("false", false)]
    #[case("0", false)]
    fn test_parse_bool(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(parse_bool(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_bool_rejects_other_strings() {
        assert!(parse_bool("yes").is_err());
        assert!(parse_bool("").is_err());
    }

    #[test]
    fn test_parse_uint_bounds() {
        let max = U256::MAX.to_string();
        assert_eq!(parse_uint(&max).unwrap(), U256::MAX);
        // 2^256
        let overflow =
            "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(parse_uint(overflow).is_err());
        assert_eq!(parse_uint("0x10").unwrap(), U256::from(16));
    }

    #[test]
    fn test_parse_int_bounds() {
        let min = I256::MIN.to_string();
        assert_eq!(parse_int(&min).unwrap(), I256::MIN);
        // 2^255
        let overflow =
            "57896044618658097711785492504343953926634992332820282019728792003956564819968";
        assert!(parse_int(overflow).is_err());
        assert_eq!(parse_int("-42").unwrap(), I256::try_from(-42).unwrap());
    }

    #[test]
    fn test_parse_bytes() {
        assert_eq!(parse_bytes("0x0102").unwrap(), Bytes::from_static(&[1, 2]));
        assert_eq!(parse_bytes("0102").unwrap(), Bytes::from_static(&[1, 2]));
        assert!(parse_bytes("0x0").is_err());
        assert!(parse_bytes32("0x01").is_err());
        let word = B256::repeat_byte(0xaa);
        assert_eq!(parse_bytes32(&word.to_string()).unwrap(), word);
    }
}
