//! Environment variable cheat codes.
//!
//! Variables set with `setEnv` or [`Host::set_env_var`](crate::Host::set_env_var) live in the
//! host and shadow the process environment.

use alloy_sol_types::SolValue;

use super::{
    cheat_err,
    string::{parse_address, parse_bool, parse_bytes, parse_bytes32, parse_int, parse_uint},
    Cheatcode,
    Vm::*,
};
use crate::{Result, ScriptInspector};

fn lookup(state: &ScriptInspector, key: &str) -> Option<String> {
    state.env.get(key).cloned().or_else(|| std::env::var(key).ok())
}

fn parse_string(s: &str) -> Result<String> {
    Ok(s.to_string())
}

fn parse_value<T>(key: &str, value: &str, parse: fn(&str) -> Result<T>) -> Result<T> {
    parse(value).map_err(|err| cheat_err!("failed to parse env var {key:?}: {err}"))
}

fn parse_list<T>(
    key: &str,
    value: &str,
    delimiter: &str,
    parse: fn(&str) -> Result<T>,
) -> Result<Vec<T>> {
    value
        .split(delimiter)
        .enumerate()
        .map(|(i, entry)| {
            parse(entry)
                .map_err(|err| cheat_err!("failed to parse entry {i} of env var {key:?}: {err}"))
        })
        .collect()
}

fn env<T>(state: &ScriptInspector, key: &str, parse: fn(&str) -> Result<T>) -> Result<T> {
    let value =
        lookup(state, key).ok_or_else(|| cheat_err!("environment variable {key:?} not found"))?;
    parse_value(key, &value, parse)
}

fn env_list<T>(
    state: &ScriptInspector,
    key: &str,
    delimiter: &str,
    parse: fn(&str) -> Result<T>,
) -> Result<Vec<T>> {
    let value =
        lookup(state, key).ok_or_else(|| cheat_err!("environment variable {key:?} not found"))?;
    parse_list(key, &value, delimiter, parse)
}

fn env_or<T: Clone>(
    state: &ScriptInspector,
    key: &str,
    parse: fn(&str) -> Result<T>,
    default: &T,
) -> Result<T> {
    match lookup(state, key) {
        Some(value) => parse_value(key, &value, parse),
        None => Ok(default.clone()),
    }
}

fn env_or_list<T: Clone>(
    state: &ScriptInspector,
    key: &str,
    delimiter: &str,
    parse: fn(&str) -> Result<T>,
    default: &[T],
) -> Result<Vec<T>> {
    match lookup(state, key) {
        Some(value) => parse_list(key, &value, delimiter, parse),
        None => Ok(default.to_vec()),
    }
}

impl Cheatcode for setEnvCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        let Self { name, value } = self;
        if name.is_empty() {
            return Err(cheat_err!("env key must not be empty"));
        }
        if name.contains('=') {
            return Err(cheat_err!("env key must not contain = sign"));
        }
        if name.contains('\0') {
            return Err(cheat_err!("env key must not contain NUL"));
        }
        if value.contains('\0') {
            return Err(cheat_err!("env value must not contain NUL"));
        }
        state.env.insert(name.clone(), value.clone());
        Ok(Vec::new())
    }
}

impl Cheatcode for envExistsCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(lookup(state, &self.name).is_some().abi_encode())
    }
}

macro_rules! impl_env {
    ($($call:ident => $parse:path),* $(,)?) => {$(
        impl Cheatcode for $call {
            fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
                Ok(env(state, &self.name, $parse)?.abi_encode())
            }
        }
    )*};
}

macro_rules! impl_env_list {
    ($($call:ident => $parse:path),* $(,)?) => {$(
        impl Cheatcode for $call {
            fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
                Ok(env_list(state, &self.name, &self.delim, $parse)?.abi_encode())
            }
        }
    )*};
}

macro_rules! impl_env_or {
    ($($call:ident => $parse:path),* $(,)?) => {$(
        impl Cheatcode for $call {
            fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
                Ok(env_or(state, &self.name, $parse, &self.defaultValue)?.abi_encode())
            }
        }
    )*};
}

macro_rules! impl_env_or_list {
    ($($call:ident => $parse:path),* $(,)?) => {$(
        impl Cheatcode for $call {
            fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
                let value =
                    env_or_list(state, &self.name, &self.delim, $parse, &self.defaultValue)?;
                Ok(value.abi_encode())
            }
        }
    )*};
}

impl_env!(
    envBool_0Call => parse_bool,
    envUint_0Call => parse_uint,
    envInt_0Call => parse_int,
    envAddress_0Call => parse_address,
    envBytes32_0Call => parse_bytes32,
    envString_0Call => parse_string,
    envBytes_0Call => parse_bytes,
);

impl_env_list!(
    envBool_1Call => parse_bool,
    envUint_1Call => parse_uint,
    envInt_1Call => parse_int,
    envAddress_1Call => parse_address,
    envBytes32_1Call => parse_bytes32,
    envString_1Call => parse_string,
    envBytes_1Call => parse_bytes,
);

impl_env_or!(
    envOr_0Call => parse_bool,
    envOr_1Call => parse_uint,
    envOr_2Call => parse_int,
    envOr_3Call => parse_address,
    envOr_4Call => parse_bytes32,
    envOr_5Call => parse_string,
    envOr_6Call => parse_bytes,
);

impl_env_or_list!(
    envOr_7Call => parse_bool,
    envOr_8Call => parse_uint,
    envOr_9Call => parse_int,
    envOr_10Call => parse_address,
    envOr_11Call => parse_bytes32,
    envOr_12Call => parse_string,
    envOr_13Call => parse_bytes,
);

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use super::*;
    use crate::ArtifactsFs;

    fn inspector() -> ScriptInspector {
        let mut state = ScriptInspector::new(ArtifactsFs::in_memory());
        state.env.insert("OP_SCRIPT_TEST_UINTS".to_string(), "1,0x2,3".to_string());
        state.env.insert("OP_SCRIPT_TEST_BAD".to_string(), "1,x".to_string());
        state
    }

    #[test]
    fn test_env_list() {
        let state = inspector();
        let values = env_list(&state, "OP_SCRIPT_TEST_UINTS", ",", parse_uint).unwrap();
        assert_eq!(values, vec![U256::from(1), U256::from(2), U256::from(3)]);

        let err = env_list(&state, "OP_SCRIPT_TEST_BAD", ",", parse_uint).unwrap_err();
        assert!(err.to_string().contains("failed to parse entry 1"));
    }

    #[test]
    fn test_env_or_default() {
        let state = inspector();
        let default = U256::from(7);
        let value = env_or(&state, "OP_SCRIPT_TEST_MISSING", parse_uint, &default).unwrap();
        assert_eq!(value, default);
        assert!(env(&state, "OP_SCRIPT_TEST_MISSING", parse_uint).is_err());
    }

    #[test]
    fn test_set_env_validation() {
        let mut state = inspector();
        let call = setEnvCall { name: "A=B".to_string(), value: "1".to_string() };
        assert!(call.apply(&mut state).is_err());

        let call =
            setEnvCall { name: "OP_SCRIPT_TEST_SET".to_string(), value: "true".to_string() };
        call.apply(&mut state).unwrap();
        assert!(env(&state, "OP_SCRIPT_TEST_SET", parse_bool).unwrap());
        assert!(std::env::var("OP_SCRIPT_TEST_SET").is_err());
    }
}
