//! Host-side precompiles backed by plain Rust values.
//!
//! A [`Precompile`] exposes the fields of a value as ABI getters ([`AbiFields`]) and,
//! optionally, the calls of a `sol!` interface ([`AbiMethods`]). Scripts read deployment inputs
//! from such precompiles and write their outputs back through the `set(bytes4,address)` setter.

use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::{hex, keccak256, Address, Bytes};
use alloy_sol_types::SolInterface;

use crate::{encode_revert, Result, ScriptError};

mod abi;
pub use abi::*;

/// Signature of the synthetic address-field setter.
pub const SETTER_SIGNATURE: &str = "set(bytes4,address)";

/// An address whose calls are answered by host code instead of EVM bytecode.
pub trait ScriptPrecompile: fmt::Debug + Send {
    /// Gas charged for `input`. Host precompiles are free.
    fn required_gas(&self, _input: &[u8]) -> u64 {
        0
    }

    /// Runs the precompile. `Err` carries the revert data.
    fn run(&mut self, input: &[u8]) -> Result<Bytes, Bytes>;
}

enum Entry<E> {
    Getter { name: Cow<'static, str>, get: fn(&E) -> Bytes },
    Method,
    Setter,
}

impl<E> Entry<E> {
    fn name(&self) -> &str {
        match self {
            Self::Getter { name, .. } => name,
            Self::Method => "method",
            Self::Setter => "set",
        }
    }
}

struct SettableField<E> {
    name: Cow<'static, str>,
    set: fn(&mut E, Address) -> bool,
}

/// A [`ScriptPrecompile`] over a shared value of type `E`.
pub struct Precompile<E> {
    value: Arc<Mutex<E>>,
    entries: HashMap<[u8; 4], Entry<E>>,
    settable: HashMap<[u8; 4], SettableField<E>>,
    dispatch: Option<fn(&mut E, &[u8]) -> Result<Bytes>>,
}

impl<E> fmt::Debug for Precompile<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Precompile")
            .field("type", &std::any::type_name::<E>())
            .field("entries", &self.entries.len())
            .field("settable", &self.settable.len())
            .finish()
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn dispatch_method<E: AbiMethods>(value: &mut E, input: &[u8]) -> Result<Bytes> {
    let call = E::Calls::abi_decode(input)?;
    value.call_method(call)
}

impl<E: AbiFields + Send> Precompile<E> {
    /// A precompile exposing only the fields of `value`.
    pub fn fields(value: E) -> Result<Self> {
        Self::fields_shared(Arc::new(Mutex::new(value)))
    }

    /// Like [`Precompile::fields`], over a value shared with the caller.
    pub fn fields_shared(value: Arc<Mutex<E>>) -> Result<Self> {
        let mut precompile =
            Self { value, entries: HashMap::new(), settable: HashMap::new(), dispatch: None };
        precompile.register_fields()?;
        Ok(precompile)
    }

    /// A precompile exposing the fields and the interface calls of `value`.
    pub fn new(value: E) -> Result<Self>
    where
        E: AbiMethods,
    {
        Self::new_shared(Arc::new(Mutex::new(value)))
    }

    /// Like [`Precompile::new`], over a value shared with the caller.
    pub fn new_shared(value: Arc<Mutex<E>>) -> Result<Self>
    where
        E: AbiMethods,
    {
        let mut precompile = Self {
            value,
            entries: HashMap::new(),
            settable: HashMap::new(),
            dispatch: Some(dispatch_method::<E>),
        };
        for selector in (0..E::Calls::COUNT).filter_map(E::Calls::selector_at) {
            precompile.insert(selector, Entry::Method)?;
        }
        precompile.register_fields()?;
        Ok(precompile)
    }

    /// Installs the `set(bytes4,address)` setter for the address fields.
    pub fn with_field_setter(mut self) -> Result<Self> {
        self.insert(selector(SETTER_SIGNATURE), Entry::Setter)?;
        Ok(self)
    }

    /// The wrapped value.
    pub fn handle(&self) -> Arc<Mutex<E>> {
        self.value.clone()
    }

    /// Locks the wrapped value.
    pub fn lock(&self) -> MutexGuard<'_, E> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register_fields(&mut self) -> Result<()> {
        let fields = E::abi_fields();
        let value = self.lock();
        let settable: Vec<_> = fields.iter().map(|field| (field.settable)(&value)).collect();
        drop(value);
        for (field, settable) in fields.into_iter().zip(settable) {
            let selector = selector(&format!("{}()", field.name));
            if settable {
                self.settable
                    .insert(selector, SettableField { name: field.name.clone(), set: field.set });
            }
            self.insert(selector, Entry::Getter { name: field.name, get: field.get })?;
        }
        Ok(())
    }

    fn insert(&mut self, selector: [u8; 4], entry: Entry<E>) -> Result<()> {
        if let Some(existing) = self.entries.get(&selector) {
            return Err(ScriptError::Abi(format!(
                "{} conflicts with existing ABI method {}, signature: {}",
                entry.name(),
                existing.name(),
                hex::encode(selector)
            )));
        }
        self.entries.insert(selector, entry);
        Ok(())
    }

    fn set_field(&self, value: &mut E, params: &[u8]) -> Result<Bytes> {
        if params.len() != 64 {
            return Err(ScriptError::Abi(format!(
                "cannot set address field to {} bytes",
                params.len()
            )));
        }
        if params[4..32].iter().any(|byte| *byte != 0) {
            return Err(ScriptError::Abi(format!(
                "unexpected selector content, input: {}",
                hex::encode(params)
            )));
        }
        let selector = [params[0], params[1], params[2], params[3]];
        let field = self.settable.get(&selector).ok_or_else(|| {
            ScriptError::Abi(format!("unknown address field selector 0x{}", hex::encode(selector)))
        })?;
        let address = Address::from_slice(&params[44..64]);
        tracing::trace!(field = %field.name, %address, "Setting address field");
        (field.set)(value, address);
        Ok(Bytes::new())
    }
}

impl<E: AbiFields + Send> ScriptPrecompile for Precompile<E> {
    fn run(&mut self, input: &[u8]) -> Result<Bytes, Bytes> {
        if input.len() < 4 {
            return Err(encode_revert(format!(
                "expected at least 4 bytes, but got '{}'",
                hex::encode(input)
            )));
        }
        let selector = [input[0], input[1], input[2], input[3]];
        let params = &input[4..];
        let Some(entry) = self.entries.get(&selector) else {
            return Err(encode_revert(format!(
                "unrecognized 4 byte signature: {}",
                hex::encode(selector)
            )));
        };

        let mut value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match entry {
            Entry::Getter { get, .. } => Ok(get(&value)),
            Entry::Method => match self.dispatch {
                Some(dispatch) => dispatch(&mut value, input),
                None => Err(ScriptError::Abi("no methods registered".to_string())),
            },
            Entry::Setter => self.set_field(&mut value, params),
        };
        result.map_err(|err| {
            encode_revert(format!(
                "failed to run {}, selector: 0x{}, err: {err}",
                entry.name(),
                hex::encode(selector)
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, U256};
    use alloy_sol_types::{sol, SolCall, SolValue};

    use super::*;
    use crate::decode_revert;

    sol! {
        interface IGreeter {
            function greet(string name) external returns (string);
            function add(uint64 a, uint64 b) external returns (uint64);
        }
    }

    #[derive(Debug, Default)]
    struct Greeter {
        greeting: String,
        owner: Address,
        counter: u64,
    }

    crate::abi_fields!(Greeter { greeting, owner, counter as "count" });

    impl AbiMethods for Greeter {
        type Calls = IGreeter::IGreeterCalls;

        fn call_method(&mut self, call: Self::Calls) -> Result<Bytes> {
            self.counter += 1;
            match call {
                IGreeter::IGreeterCalls::greet(call) => {
                    Ok(format!("{} {}", self.greeting, call.name).abi_encode().into())
                }
                IGreeter::IGreeterCalls::add(call) => call
                    .a
                    .checked_add(call.b)
                    .map(|sum| sum.abi_encode().into())
                    .ok_or_else(|| ScriptError::Abi("overflow".to_string())),
            }
        }
    }

    fn call(precompile: &mut Precompile<Greeter>, signature: &str, args: &[u8]) -> Bytes {
        let mut input = selector(signature).to_vec();
        input.extend_from_slice(args);
        precompile.run(&input).unwrap()
    }

    #[test]
    fn test_field_getters_read_current_value() {
        let mut precompile =
            Precompile::new(Greeter { greeting: "hello".to_string(), ..Default::default() })
                .unwrap();
        let out = call(&mut precompile, "greeting()", &[]);
        assert_eq!(String::abi_decode(&out).unwrap(), "hello");

        precompile.lock().greeting = "bye".to_string();
        let out = call(&mut precompile, "greeting()", &[]);
        assert_eq!(String::abi_decode(&out).unwrap(), "bye");

        let out = call(&mut precompile, "count()", &[]);
        assert_eq!(u64::abi_decode(&out).unwrap(), 0);
    }

    #[test]
    fn test_methods() {
        let mut precompile =
            Precompile::new(Greeter { greeting: "hi".to_string(), ..Default::default() }).unwrap();
        let input = IGreeter::greetCall { name: "bob".to_string() }.abi_encode();
        let out = precompile.run(&input).unwrap();
        assert_eq!(IGreeter::greetCall::abi_decode_returns(&out).unwrap(), "hi bob");

        let input = IGreeter::addCall { a: u64::MAX, b: 1 }.abi_encode();
        let err = precompile.run(&input).unwrap_err();
        let message = decode_revert(&err).unwrap();
        assert!(message.starts_with("failed to run method"), "{message}");
        assert!(message.ends_with("err: ABI error: overflow"), "{message}");
        assert_eq!(precompile.lock().counter, 2);
    }

    #[test]
    fn test_field_setter() {
        let mut precompile =
            Precompile::fields(Greeter::default()).unwrap().with_field_setter().unwrap();
        let owner = address!("0x00000000000000000000000000000000000000aa");
        let mut args = selector("owner()").to_vec();
        args.extend_from_slice(&[0u8; 28]);
        args.extend_from_slice(&owner.into_word().0);
        assert!(call(&mut precompile, SETTER_SIGNATURE, &args).is_empty());
        assert_eq!(precompile.lock().owner, owner);

        // Only address fields are settable.
        let mut args = selector("count()").to_vec();
        args.extend_from_slice(&[0u8; 60]);
        let mut input = selector(SETTER_SIGNATURE).to_vec();
        input.extend_from_slice(&args);
        let message = decode_revert(&precompile.run(&input).unwrap_err()).unwrap();
        assert!(message.contains("unknown address field selector"), "{message}");

        let mut input = selector(SETTER_SIGNATURE).to_vec();
        input.extend_from_slice(&[0u8; 32]);
        let message = decode_revert(&precompile.run(&input).unwrap_err()).unwrap();
        assert!(message.contains("cannot set address field to 32 bytes"), "{message}");
    }

    #[test]
    fn test_setter_selector() {
        // keccak256("set(bytes4,address)") starts with c3e39250. 0xbb3e2e9a, which some docs
        // list for this setter, is wrong.
        assert_eq!(selector(SETTER_SIGNATURE), alloy_primitives::hex!("c3e39250"));
    }

    #[test]
    fn test_dispatch_errors() {
        let mut precompile = Precompile::fields(Greeter::default()).unwrap();
        let message = decode_revert(&precompile.run(&[0x01]).unwrap_err()).unwrap();
        assert_eq!(message, "expected at least 4 bytes, but got '01'");
        let message = decode_revert(&precompile.run(&[1, 2, 3, 4]).unwrap_err()).unwrap();
        assert_eq!(message, "unrecognized 4 byte signature: 01020304");
        assert_eq!(precompile.required_gas(&[]), 0);
    }

    #[test]
    fn test_selector_conflict() {
        #[derive(Debug, Default)]
        struct Twice {
            a: U256,
            b: U256,
        }
        crate::abi_fields!(Twice { a as "value", b as "value" });

        let err = Precompile::fields(Twice::default()).unwrap_err();
        assert!(err.to_string().contains("conflicts with existing ABI method"), "{err}");
    }
}
