//! JSON and TOML cheat codes.
//!
//! Paths are either `$` for the root or start with `.` and mix dotted keys with `[i]` indices,
//! e.g. `.chains[0].roles`.

use alloy_primitives::{hex, Address, Bytes, B256, I256, U256};
use alloy_sol_types::SolValue;
use serde_json::{Map, Value};

use super::{cheat_err, Cheatcode, Vm::*};
use crate::{Result, ScriptInspector};

fn parse_json(data: &str) -> Result<Value> {
    serde_json::from_str(data).map_err(|err| cheat_err!("invalid JSON: {err}"))
}

fn parse_toml(data: &str) -> Result<Value> {
    let value: toml::Value = toml::from_str(data).map_err(|err| cheat_err!("invalid TOML: {err}"))?;
    Ok(serde_json::to_value(value)?)
}

#[derive(Debug, PartialEq, Eq)]
enum PathStep<'a> {
    Key(&'a str),
    Index(usize),
}

/// Splits the first step off `query`.
fn take_path(query: &str) -> Result<(PathStep<'_>, &str)> {
    if query.is_empty() {
        return Err(cheat_err!("empty keys are not supported"));
    }
    let dot = query.find('.');
    let bracket = query.find('[');
    match (dot, bracket) {
        (Some(dot), bracket) if bracket.is_none_or(|bracket| dot < bracket) => {
            Ok((PathStep::Key(&query[..dot]), &query[dot + 1..]))
        }
        (_, None) => Ok((PathStep::Key(query), "")),
        (_, Some(0)) => {
            let close = query.find(']').ok_or_else(|| cheat_err!("invalid query: {query:?}"))?;
            let index = query[1..close]
                .parse()
                .map_err(|err| cheat_err!("invalid index in query {query:?}: {err}"))?;
            let trailing = &query[close + 1..];
            Ok((PathStep::Index(index), trailing.strip_prefix('.').unwrap_or(trailing)))
        }
        (_, Some(bracket)) => Ok((PathStep::Key(&query[..bracket]), &query[bracket..])),
    }
}

/// Resolves a path relative to `value`, without the leading `.`.
fn lookup<'a>(value: &'a Value, query: &str) -> Result<&'a Value> {
    if query.is_empty() || query == "$" {
        return Ok(value);
    }
    let (step, trailing) = take_path(query)?;
    match (value, step) {
        (Value::Array(items), PathStep::Index(index)) => {
            let item = items.get(index).ok_or_else(|| {
                cheat_err!("index {index} larger than length {}", items.len())
            })?;
            lookup(item, trailing)
        }
        (Value::Array(_), PathStep::Key(key)) => {
            Err(cheat_err!("expected array index, but got string key in path: {key:?}"))
        }
        (Value::Object(_), PathStep::Key("$")) => {
            if !trailing.is_empty() {
                return Err(cheat_err!("cannot continue query after $ sign"));
            }
            Ok(value)
        }
        (Value::Object(map), PathStep::Key(key)) => {
            let item = map.get(key).ok_or_else(|| cheat_err!("unknown key {key:?}"))?;
            lookup(item, trailing)
        }
        (Value::Object(_), PathStep::Index(index)) => {
            Err(cheat_err!("expected string key, but got index in path: {index}"))
        }
        (other, _) => Err(cheat_err!("cannot read keys of value {other}")),
    }
}

fn normalize_key(key: &str) -> Result<&str> {
    if key == "$" {
        return Ok(key);
    }
    key.strip_prefix('.').ok_or_else(|| {
        cheat_err!("key {key:?} is invalid. A key must be \"$\" or start with \".\"")
    })
}

fn keys(value: &Value, key: &str) -> Result<Vec<String>> {
    match lookup(value, normalize_key(key)?)? {
        Value::Object(map) => Ok(map.keys().cloned().collect()),
        other => Err(cheat_err!("value {other} is not an object")),
    }
}

/// A key is either a top-level name or a `.`-prefixed path.
fn key_exists(value: &Value, key: &str) -> bool {
    match key.strip_prefix('.') {
        Some(path) => lookup(value, path).is_ok(),
        None => value.as_object().is_some_and(|map| map.contains_key(key)),
    }
}

impl Cheatcode for keyExistsCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(key_exists(&parse_json(&self.json)?, &self.key).abi_encode())
    }
}

impl Cheatcode for keyExistsJsonCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(key_exists(&parse_json(&self.json)?, &self.key).abi_encode())
    }
}

impl Cheatcode for keyExistsTomlCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(key_exists(&parse_toml(&self.toml)?, &self.key).abi_encode())
    }
}

impl Cheatcode for parseJsonKeysCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(keys(&parse_json(&self.json)?, &self.key)?.abi_encode())
    }
}

impl Cheatcode for parseTomlKeysCall {
    fn apply(&self, _state: &mut ScriptInspector) -> Result<Vec<u8>> {
        Ok(keys(&parse_toml(&self.toml)?, &self.key)?.abi_encode())
    }
}

/// Conversion of ABI values into serialized JSON.
trait ToJson {
    fn to_json(&self) -> Value;
}

impl ToJson for bool {
    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ToJson for U256 {
    fn to_json(&self) -> Value {
        u64::try_from(*self).map_or_else(|_| Value::String(self.to_string()), Value::from)
    }
}

impl ToJson for I256 {
    fn to_json(&self) -> Value {
        i64::try_from(*self).map_or_else(|_| Value::String(self.to_string()), Value::from)
    }
}

impl ToJson for Address {
    fn to_json(&self) -> Value {
        Value::String(hex::encode_prefixed(self))
    }
}

impl ToJson for B256 {
    fn to_json(&self) -> Value {
        Value::String(hex::encode_prefixed(self))
    }
}

impl ToJson for Bytes {
    fn to_json(&self) -> Value {
        Value::String(hex::encode_prefixed(self))
    }
}

impl ToJson for String {
    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }
}

impl<T: ToJson> ToJson for Vec<T> {
    fn to_json(&self) -> Value {
        Value::Array(self.iter().map(ToJson::to_json).collect())
    }
}

/// Adds `value_key` to the object `object_key` and returns the serialized object.
fn serialize(
    state: &mut ScriptInspector,
    object_key: &str,
    value_key: &str,
    value: Value,
) -> Result<Vec<u8>> {
    let mut object: Map<String, Value> = match state.serialized.get(object_key) {
        Some(json) => serde_json::from_str(json).map_err(|err| {
            cheat_err!("failed to decode existing JSON serializer state of {object_key:?}: {err}")
        })?,
        None => Map::new(),
    };
    object.insert(value_key.to_string(), value);
    let json = serde_json::to_string(&object)?;
    state.serialized.insert(object_key.to_string(), json.clone());
    Ok(json.abi_encode())
}

impl Cheatcode for serializeJsonCall {
    fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
        let Self { objectKey, value } = self;
        serde_json::from_str::<Value>(value)
            .map_err(|err| cheat_err!("invalid JSON value: {err}"))?;
        state.serialized.insert(objectKey.clone(), value.clone());
        Ok(value.abi_encode())
    }
}

macro_rules! impl_serialize {
    ($($call:ident => $field:ident),* $(,)?) => {$(
        impl Cheatcode for $call {
            fn apply(&self, state: &mut ScriptInspector) -> Result<Vec<u8>> {
                serialize(state, &self.objectKey, &self.valueKey, self.$field.to_json())
            }
        }
    )*};
}

impl_serialize!(
    serializeBool_0Call => value,
    serializeBool_1Call => values,
    serializeUint_0Call => value,
    serializeUint_1Call => values,
    serializeInt_0Call => value,
    serializeInt_1Call => values,
    serializeAddress_0Call => value,
    serializeAddress_1Call => values,
    serializeBytes32_0Call => value,
    serializeBytes32_1Call => values,
    serializeString_0Call => value,
    serializeString_1Call => values,
    serializeBytes_0Call => value,
    serializeBytes_1Call => values,
);
