//! Decoding of `console.log` calls made by scripts.
//!
//! Calls to [`CONSOLE_ADDR`](crate::CONSOLE_ADDR) never reach the EVM. They are decoded against
//! the known `console.sol` signatures and emitted as `info` events with the
//! `op_script::console` target.

use std::{collections::HashMap, sync::LazyLock};

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{hex, keccak256, Address};
use tracing::{debug, info};

const LOG_PARAMS: [&str; 4] = ["uint256", "string", "bool", "address"];

/// Selector to parameter types of every supported `console.sol` function.
static SIGNATURES: LazyLock<HashMap<[u8; 4], Vec<DynSolType>>> = LazyLock::new(|| {
    let mut signatures = HashMap::new();
    let mut insert = |name: &str, params: &[&str]| {
        let signature = format!("{name}({})", params.join(","));
        let selector = keccak256(signature.as_bytes());
        let types = params
            .iter()
            .map(|param| match *param {
                "uint" => "uint256",
                "int" => "int256",
                other => other,
            })
            .filter_map(|param| DynSolType::parse(param).ok())
            .collect();
        signatures.insert([selector[0], selector[1], selector[2], selector[3]], types);
    };

    // `log` with one to four arguments, also under the legacy `uint` spelling.
    let mut combinations: Vec<Vec<&str>> = vec![Vec::new()];
    for _ in 0..4 {
        combinations = combinations
            .iter()
            .flat_map(|prefix| {
                LOG_PARAMS.iter().map(move |param| {
                    let mut params = prefix.clone();
                    params.push(*param);
                    params
                })
            })
            .collect();
        for params in &combinations {
            insert("log", params);
            let legacy: Vec<&str> = params
                .iter()
                .map(|param| if *param == "uint256" { "uint" } else { *param })
                .collect();
            insert("log", &legacy);
        }
    }
    insert("log", &[]);
    for param in ["int256", "bytes", "bytes32"] {
        insert("log", &[param]);
    }

    for (name, param) in [
        ("logInt", "int256"),
        ("logInt", "int"),
        ("logUint", "uint256"),
        ("logUint", "uint"),
        ("logString", "string"),
        ("logBool", "bool"),
        ("logAddress", "address"),
        ("logBytes", "bytes"),
    ] {
        insert(name, &[param]);
    }
    for size in 1..=32 {
        let param = format!("bytes{size}");
        insert(&format!("logBytes{size}"), &[param.as_str()]);
    }
    signatures
});

/// Decodes a `console.log` call and logs it. Unknown calls are logged at debug level.
pub fn log(sender: Address, input: &[u8]) {
    match decode(input) {
        Some(message) => info!(target: "op_script::console", %sender, "{message}"),
        None => debug!(%sender, input = %hex::encode(input), "Unrecognized console call"),
    }
}

fn decode(input: &[u8]) -> Option<String> {
    let selector: [u8; 4] = input.get(..4)?.try_into().ok()?;
    let types = SIGNATURES.get(&selector)?;
    let values = DynSolType::Tuple(types.clone()).abi_decode_params(&input[4..]).ok()?;
    let DynSolValue::Tuple(values) = values else { return None };
    Some(format_values(&values))
}

fn format_values(values: &[DynSolValue]) -> String {
    match values {
        [DynSolValue::String(template), args @ ..]
            if !args.is_empty() && template.contains('%') =>
        {
            format_template(template, args)
        }
        _ => values.iter().map(format_value).collect::<Vec<_>>().join(" "),
    }
}

/// Substitutes `%s`, `%d`, `%i` and `%x` in `template`. Leftover arguments are appended.
fn format_template(template: &str, args: &[DynSolValue]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(spec @ ('s' | 'd' | 'i' | 'x')) => match args.next() {
                Some(value) => {
                    chars.next();
                    out.push_str(&format_spec(value, spec));
                }
                None => out.push('%'),
            },
            _ => out.push('%'),
        }
    }
    for value in args {
        out.push(' ');
        out.push_str(&format_value(value));
    }
    out
}

fn format_spec(value: &DynSolValue, spec: char) -> String {
    match (value, spec) {
        (DynSolValue::Uint(value, _), 'x') => format!("{value:#x}"),
        _ => format_value(value),
    }
}

fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(address) => address.to_checksum(None),
        DynSolValue::Bool(value) => value.to_string(),
        DynSolValue::String(value) => value.clone(),
        DynSolValue::Uint(value, _) => value.to_string(),
        DynSolValue::Int(value, _) => value.to_string(),
        DynSolValue::Bytes(value) => hex::encode_prefixed(value),
        DynSolValue::FixedBytes(word, size) => hex::encode_prefixed(&word[..*size]),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use super::*;

    fn call(signature: &str, args: &[DynSolValue]) -> Vec<u8> {
        let mut input = keccak256(signature.as_bytes())[..4].to_vec();
        input.extend(DynSolValue::Tuple(args.to_vec()).abi_encode_params());
        input
    }

    #[test]
    fn test_log_string_selector() {
        let input = call("log(string)", &[DynSolValue::String("hello".to_string())]);
        assert_eq!(input[..4], hex!("41304fac"));
        assert_eq!(decode(&input).unwrap(), "hello");
    }

    #[test]
    fn test_decode_template() {
        let input = call(
            "log(string,uint256,address)",
            &[
                DynSolValue::String("deployed %s at %s".to_string()),
                DynSolValue::Uint(U256::from(7), 256),
                DynSolValue::Address(Address::ZERO),
            ],
        );
        assert_eq!(
            decode(&input).unwrap(),
            "deployed 7 at 0x0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_decode_legacy_uint() {
        let input = call("log(uint)", &[DynSolValue::Uint(U256::from(42), 256)]);
        assert_eq!(decode(&input).unwrap(), "42");
    }

    #[test]
    fn test_format_template_edge_cases() {
        let args = [DynSolValue::Bool(true), DynSolValue::Uint(U256::from(255), 256)];
        assert_eq!(format_template("100%% %s", &args), "100% true 255");
        assert_eq!(format_template("%x %d %s", &args[1..]), "0xff %d %s");
    }

    #[test]
    fn test_decode_unknown_selector() {
        assert!(decode(&[0xde, 0xad, 0xbe, 0xef]).is_none());
        assert!(decode(&[0x41]).is_none());
    }
}
