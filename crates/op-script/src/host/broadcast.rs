use std::fmt;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use auto_impl::auto_impl;
use serde::{Deserialize, Serialize};

/// The transaction kind of a [`Broadcast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastKind {
    /// A message call.
    Call,
    /// A contract creation.
    Create,
}

/// A transaction recorded by a broadcast-mode sub-call.
///
/// CREATE2 deployments are recorded as a [`BroadcastKind::Call`] to
/// [`CREATE2_DEPLOYER`](crate::CREATE2_DEPLOYER) with `salt ++ init_code` as input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    /// The sending account.
    pub from: Address,
    /// The call target, `None` for creations.
    pub to: Option<Address>,
    /// Call data or init code.
    pub input: Bytes,
    /// Transferred value.
    pub value: U256,
    /// Gas spent by the sub-call in the host.
    pub gas_used: u64,
    /// The transaction kind.
    pub kind: BroadcastKind,
    /// The sender nonce the transaction was executed with.
    pub nonce: u64,
    /// Deterministic identifier, see [`Broadcast::compute_id`].
    pub id: B256,
}

impl Broadcast {
    pub(crate) fn new(
        kind: BroadcastKind,
        from: Address,
        to: Option<Address>,
        input: Bytes,
        value: U256,
        nonce: u64,
    ) -> Self {
        let id = Self::compute_id(from, to, nonce, &input);
        Self { from, to, input, value, gas_used: 0, kind, nonce, id }
    }

    /// `keccak256(abi.encode(from, to, nonce, input))`, with the zero address for creations.
    pub fn compute_id(from: Address, to: Option<Address>, nonce: u64, input: &Bytes) -> B256 {
        keccak256((from, to.unwrap_or_default(), U256::from(nonce), input.clone()).abi_encode())
    }
}

/// Receives the broadcasts recorded by the host, in execution order.
#[auto_impl(&, Box, Arc)]
pub trait BroadcastHook: fmt::Debug + Send + Sync {
    /// Called once per successful broadcast sub-call.
    fn hook(&self, broadcast: Broadcast);
}
