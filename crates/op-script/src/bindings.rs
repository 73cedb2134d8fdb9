use std::marker::PhantomData;

use alloy_json_abi::JsonAbi;
use alloy_primitives::Bytes;
use alloy_sol_types::SolCall;
use auto_impl::auto_impl;

use crate::{Result, ScriptError};

/// Executes ABI-encoded calls against a contract.
#[auto_impl(&mut, Box)]
pub trait CallBackend {
    /// Sends `data` and returns the raw return data.
    fn call(&mut self, data: Bytes) -> Result<Bytes>;
}

/// A typed binding of one contract function.
///
/// Bindings start out unbound and are bound by [`Hydrate::hydrate`], which validates the
/// function signature against the target ABI.
pub struct BoundCall<C> {
    bound: bool,
    _call: PhantomData<fn() -> C>,
}

impl<C> Default for BoundCall<C> {
    fn default() -> Self {
        Self { bound: false, _call: PhantomData }
    }
}

impl<C> std::fmt::Debug for BoundCall<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundCall")
            .field("function", &std::any::type_name::<C>())
            .field("bound", &self.bound)
            .finish()
    }
}

impl<C: SolCall> BoundCall<C> {
    /// Encodes `call`, runs it on `backend` and decodes the return value.
    pub fn call(&self, backend: &mut impl CallBackend, call: &C) -> Result<C::Return> {
        if !self.bound {
            return Err(ScriptError::Abi(format!("binding {} is not hydrated", C::SIGNATURE)));
        }
        let output = backend.call(call.abi_encode().into())?;
        Ok(C::abi_decode_returns(&output)?)
    }

    /// Returns `true` once hydrated.
    pub const fn is_bound(&self) -> bool {
        self.bound
    }
}

/// Validates a function signature before a binding is bound.
pub type AbiCheck<'a> = &'a mut dyn FnMut(&str) -> Result<()>;

/// A struct of bindings.
///
/// Implement it with [`hydrate!`](crate::hydrate). Nested binding structs hydrate recursively.
pub trait Hydrate {
    /// Binds every binding of `self`, checking each signature with `check`.
    fn hydrate(&mut self, check: AbiCheck<'_>) -> Result<()>;
}

impl<C: SolCall> Hydrate for BoundCall<C> {
    fn hydrate(&mut self, check: AbiCheck<'_>) -> Result<()> {
        check(C::SIGNATURE)?;
        self.bound = true;
        Ok(())
    }
}

/// Creates a hydrated binding struct.
///
/// Without `abi`, every signature is accepted.
pub fn new_bindings<B: Hydrate + Default>(abi: Option<&JsonAbi>) -> Result<B> {
    let mut bindings = B::default();
    match abi {
        Some(abi) => bindings.hydrate(&mut abi_check(abi))?,
        None => bindings.hydrate(&mut |_: &str| -> Result<()> { Ok(()) })?,
    }
    Ok(bindings)
}

/// A check that accepts the signatures of the functions in `abi`.
pub fn abi_check(abi: &JsonAbi) -> impl FnMut(&str) -> Result<()> + '_ {
    move |signature| {
        if abi.functions().any(|function| function.signature() == signature) {
            Ok(())
        } else {
            Err(ScriptError::AbiCheck(signature.to_string()))
        }
    }
}

/// Implements [`Hydrate`] for a struct of bindings.
///
/// Listed fields are hydrated in order. Fields that are not listed are left untouched.
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct DeployScript {
///     run: BoundCall<runCall>,
///     common: CommonBindings,
/// }
/// hydrate!(DeployScript { run, common });
/// ```
#[macro_export]
macro_rules! hydrate {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::Hydrate for $ty {
            fn hydrate(&mut self, check: $crate::AbiCheck<'_>) -> $crate::Result<()> {
                $( $crate::Hydrate::hydrate(&mut self.$field, &mut *check)?; )*
                Ok(())
            }
        }
    };
}
