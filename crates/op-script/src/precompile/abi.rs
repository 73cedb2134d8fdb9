use std::borrow::Cow;

use alloy_primitives::{Address, Bytes, FixedBytes, I256, U256};
use alloy_sol_types::{SolInterface, SolValue};

use crate::Result;

/// A struct field that can be exposed as a zero-argument ABI getter.
pub trait AbiField {
    /// The ABI encoding of the field as a single return value.
    fn abi_encode_field(&self) -> Bytes;

    /// Returns `true` for address fields, which the `set(bytes4,address)` setter may assign.
    fn is_address(&self) -> bool {
        false
    }

    /// Assigns `address` to an address field. Returns `false` for every other type.
    fn set_address(&mut self, _address: Address) -> bool {
        false
    }
}

macro_rules! impl_abi_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl AbiField for $ty {
                fn abi_encode_field(&self) -> Bytes {
                    SolValue::abi_encode(self).into()
                }
            }
        )*
    };
}

impl_abi_field!(bool, String, Bytes, U256, I256, u16, u32, u64, u128, i8, i16, i32, i64, i128);

// `SolValue` is not implemented for `u8`, a `uint8` word has the same layout as `uint256`.
impl AbiField for u8 {
    fn abi_encode_field(&self) -> Bytes {
        SolValue::abi_encode(&U256::from(*self)).into()
    }
}

impl AbiField for Address {
    fn abi_encode_field(&self) -> Bytes {
        SolValue::abi_encode(self).into()
    }

    fn is_address(&self) -> bool {
        true
    }

    fn set_address(&mut self, address: Address) -> bool {
        *self = address;
        true
    }
}

impl<const N: usize> AbiField for FixedBytes<N>
where
    Self: SolValue,
{
    fn abi_encode_field(&self) -> Bytes {
        SolValue::abi_encode(self).into()
    }
}

impl<T: SolValue> AbiField for Vec<T> {
    fn abi_encode_field(&self) -> Bytes {
        SolValue::abi_encode(self).into()
    }
}

impl<T: SolValue, const N: usize> AbiField for [T; N]
where
    Self: SolValue,
{
    fn abi_encode_field(&self) -> Bytes {
        SolValue::abi_encode(self).into()
    }
}

/// Accessors of one exposed struct field, see [`abi_fields!`](crate::abi_fields).
pub struct AbiFieldDef<S> {
    /// The ABI getter name.
    pub name: Cow<'static, str>,
    /// Encodes the current field value.
    pub get: fn(&S) -> Bytes,
    /// Assigns an address to the field, `false` if the field is not an address.
    pub set: fn(&mut S, Address) -> bool,
    /// Whether the field is an address.
    pub settable: fn(&S) -> bool,
}

/// A struct whose fields are exposed as ABI getters.
///
/// Implemented with [`abi_fields!`](crate::abi_fields).
pub trait AbiFields: Sized {
    /// The exposed fields, in declaration order.
    fn abi_fields() -> Vec<AbiFieldDef<Self>>;
}

/// A type answering the calls of a `sol!` interface.
pub trait AbiMethods {
    /// The call enum generated for the interface.
    type Calls: SolInterface;

    /// Runs `call`, returning the ABI-encoded return data.
    fn call_method(&mut self, call: Self::Calls) -> Result<Bytes>;
}

/// Converts a `snake_case` field name into its `lowerCamelCase` ABI name.
pub fn lower_camel(name: &str) -> Cow<'static, str> {
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('_').filter(|part| !part.is_empty()).enumerate() {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.extend(first.to_lowercase());
            } else {
                out.extend(first.to_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    Cow::Owned(out)
}

/// Implements [`AbiFields`] for a struct.
///
/// Every listed field becomes a getter named after the field in `lowerCamelCase`. A string
/// literal after `as` overrides the name.
///
/// ```ignore
/// abi_fields!(DeploySuperchainOutput {
///     superchain_proxy_admin,
///     delayed_weth_impl as "delayedWETHImpl",
/// });
/// ```
#[macro_export]
macro_rules! abi_fields {
    ($ty:ty { $($field:ident $(as $name:literal)?),* $(,)? }) => {
        impl $crate::precompile::AbiFields for $ty {
            fn abi_fields() -> ::std::vec::Vec<$crate::precompile::AbiFieldDef<Self>> {
                ::std::vec![$(
                    $crate::precompile::AbiFieldDef {
                        name: $crate::abi_fields!(@name $field $(, $name)?),
                        get: |value: &Self| {
                            $crate::precompile::AbiField::abi_encode_field(&value.$field)
                        },
                        set: |value: &mut Self, address| {
                            $crate::precompile::AbiField::set_address(&mut value.$field, address)
                        },
                        settable: |value: &Self| {
                            $crate::precompile::AbiField::is_address(&value.$field)
                        },
                    },
                )*]
            }
        }
    };
    (@name $field:ident, $name:literal) => {
        ::std::borrow::Cow::Borrowed($name)
    };
    (@name $field:ident) => {
        $crate::precompile::lower_camel(stringify!($field))
    };
}
