//! Replaying script broadcasts as L1 transactions.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use alloy_network::ReceiptResponse;
use alloy_primitives::{Bytes, B256};
use alloy_rpc_types_eth::TransactionReceipt;
use async_trait::async_trait;
use op_script::{Broadcast, BroadcastHook, BroadcastKind};
use tracing::{debug, error, info};

use crate::txmgr::{PendingTx, TxCandidate, TxError, TxManager};

/// Base cost of every transaction.
pub const TX_GAS: u64 = 21_000;
/// Extra cost of a contract creation.
pub const TX_CREATE_GAS: u64 = 32_000;
/// Cost of a zero calldata byte.
pub const TX_DATA_ZERO_GAS: u64 = 4;
/// Cost of a non-zero calldata byte.
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;
/// Cost of a 32-byte word of init code (EIP-3860).
pub const INIT_CODE_WORD_GAS: u64 = 2;

/// Intrinsic gas of a transaction carrying `input`.
pub fn intrinsic_gas(input: &[u8], create: bool) -> u64 {
    let zeros = input.iter().filter(|byte| **byte == 0).count() as u64;
    let non_zeros = input.len() as u64 - zeros;
    let mut gas = TX_GAS + zeros * TX_DATA_ZERO_GAS + non_zeros * TX_DATA_NON_ZERO_GAS;
    if create {
        gas += TX_CREATE_GAS + (input.len() as u64).div_ceil(32) * INIT_CODE_WORD_GAS;
    }
    gas
}

/// Gas limit of the L1 transaction replaying `broadcast`: intrinsic gas plus the gas the host
/// measured, padded by half and rounded up.
pub fn padded_gas_limit(broadcast: &Broadcast) -> u64 {
    let create = broadcast.kind == BroadcastKind::Create;
    let gas = intrinsic_gas(&broadcast.input, create).saturating_add(broadcast.gas_used);
    gas.saturating_mul(3).div_ceil(2)
}

/// Why a broadcast transaction failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// The transaction was mined with status 0.
    #[error("transaction {tx_hash} reverted (broadcast {id})")]
    Reverted {
        /// The broadcast ID.
        id: B256,
        /// The mined transaction.
        tx_hash: B256,
    },
    /// The transaction manager failed.
    #[error("broadcast {id}: {source}")]
    Tx {
        /// The broadcast ID.
        id: B256,
        /// The transaction manager error.
        source: TxError,
    },
}

/// The errors of every failed transaction of a broadcast, in buffer order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiError(Vec<BroadcastError>);

impl MultiError {
    /// The collected errors.
    pub fn errors(&self) -> &[BroadcastError] {
        &self.0
    }

    /// The number of collected errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok` if nothing failed, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            errors => {
                write!(f, "{} errors occurred:", errors.len())?;
                for err in errors {
                    write!(f, "\n\t* {err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {}

impl FromIterator<BroadcastError> for MultiError {
    fn from_iter<I: IntoIterator<Item = BroadcastError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The outcome of one broadcast transaction.
#[derive(Debug, Clone)]
pub struct BroadcastResult {
    /// The recorded broadcast.
    pub broadcast: Broadcast,
    /// Hash of the sent transaction, zero if it was never published.
    pub tx_hash: B256,
    /// The receipt, if the transaction was mined.
    pub receipt: Option<TransactionReceipt>,
    /// The failure, if any.
    pub err: Option<BroadcastError>,
}

/// Collects the broadcasts of a host and sends them.
#[async_trait]
pub trait Broadcaster: BroadcastHook {
    /// Sends every buffered broadcast and empties the buffer.
    ///
    /// Returns one result per broadcast in buffer order, plus the combined error of all failed
    /// transactions.
    async fn broadcast(&self) -> (Vec<BroadcastResult>, Result<(), MultiError>);
}

/// Exposes a shared [`Broadcaster`] as the broadcast hook of a host.
#[derive(Debug, Clone)]
pub struct BroadcasterHook(pub Arc<dyn Broadcaster>);

impl BroadcastHook for BroadcasterHook {
    fn hook(&self, broadcast: Broadcast) {
        self.0.hook(broadcast);
    }
}

/// Drops every broadcast, for stages that only generate state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardBroadcaster;

impl BroadcastHook for DiscardBroadcaster {
    fn hook(&self, broadcast: Broadcast) {
        debug!(id = %broadcast.id, "Discarding broadcast");
    }
}

#[async_trait]
impl Broadcaster for DiscardBroadcaster {
    async fn broadcast(&self) -> (Vec<BroadcastResult>, Result<(), MultiError>) {
        (Vec::new(), Ok(()))
    }
}

/// Signs and sends broadcasts through a [`TxManager`].
#[derive(Debug)]
pub struct KeyedBroadcaster<T> {
    txmgr: T,
    buffer: Mutex<Vec<Broadcast>>,
}

impl<T: TxManager> KeyedBroadcaster<T> {
    /// Creates a broadcaster sending through `txmgr`.
    pub const fn new(txmgr: T) -> Self {
        Self { txmgr, buffer: Mutex::new(Vec::new()) }
    }

    /// The number of buffered broadcasts.
    pub fn pending(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<T: TxManager> BroadcastHook for KeyedBroadcaster<T> {
    fn hook(&self, broadcast: Broadcast) {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).push(broadcast);
    }
}

#[async_trait]
impl<T: TxManager> Broadcaster for KeyedBroadcaster<T> {
    async fn broadcast(&self) -> (Vec<BroadcastResult>, Result<(), MultiError>) {
        let buffer =
            std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        if buffer.is_empty() {
            return (Vec::new(), Ok(()));
        }
        info!(count = buffer.len(), from = %self.txmgr.from(), "Broadcasting transactions");

        // Every send starts before the first wait so nonces follow buffer order.
        let pending: Vec<(Broadcast, PendingTx)> = buffer
            .into_iter()
            .map(|broadcast| {
                let candidate = TxCandidate {
                    to: match broadcast.kind {
                        BroadcastKind::Call => broadcast.to,
                        BroadcastKind::Create => None,
                    },
                    input: Bytes::clone(&broadcast.input),
                    value: broadcast.value,
                    gas_limit: padded_gas_limit(&broadcast),
                };
                let tx = self.txmgr.send_async(candidate);
                (broadcast, tx)
            })
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for (broadcast, tx) in pending {
            let id = broadcast.id;
            let result = match tx.wait().await {
                Ok(sent) if ReceiptResponse::status(&sent.receipt) => BroadcastResult {
                    broadcast,
                    tx_hash: sent.tx_hash,
                    receipt: Some(sent.receipt),
                    err: None,
                },
                Ok(sent) => {
                    error!(%id, tx_hash = %sent.tx_hash, "Transaction reverted");
                    BroadcastResult {
                        broadcast,
                        tx_hash: sent.tx_hash,
                        receipt: Some(sent.receipt),
                        err: Some(BroadcastError::Reverted { id, tx_hash: sent.tx_hash }),
                    }
                }
                Err(source) => {
                    error!(%id, %source, "Transaction failed");
                    BroadcastResult {
                        broadcast,
                        tx_hash: B256::ZERO,
                        receipt: None,
                        err: Some(BroadcastError::Tx { id, source }),
                    }
                }
            };
            results.push(result);
        }

        let errors: MultiError = results.iter().filter_map(|result| result.err.clone()).collect();
        (results, errors.into_result())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, Address, U256};
    use op_script::CREATE2_DEPLOYER;
    use rstest::rstest;

    use super::*;

    fn broadcast(kind: BroadcastKind, input: &'static [u8], gas_used: u64) -> Broadcast {
        let to = (kind == BroadcastKind::Call).then_some(CREATE2_DEPLOYER);
        let input = Bytes::from_static(input);
        let id = Broadcast::compute_id(Address::ZERO, to, 0, &input);
        Broadcast {
            from: Address::ZERO,
            to,
            input,
            value: U256::ZERO,
            gas_used,
            kind,
            nonce: 0,
            id,
        }
    }

    #[rstest]
    #[case::empty_call(&[], false, 21_000)]
    #[case::mixed_call(&[0, 1, 0, 2], false, 21_000 + 2 * 4 + 2 * 16)]
    #[case::create(&[0x60; 33], true, 21_000 + 32_000 + 33 * 16 + 2 * 2)]
    fn test_intrinsic_gas(#[case] input: &[u8], #[case] create: bool, #[case] expected: u64) {
        assert_eq!(intrinsic_gas(input, create), expected);
    }

    #[test]
    fn test_padded_gas_limit_rounds_up() {
        // (21000 + 16 + 1) * 1.5 = 31525.5
        let call = broadcast(BroadcastKind::Call, &[1], 1);
        assert_eq!(padded_gas_limit(&call), 31_526);
    }

    #[test]
    fn test_multi_error_display() {
        let id = B256::ZERO;
        let one: MultiError =
            [BroadcastError::Tx { id, source: TxError::Rpc("down".into()) }].into_iter().collect();
        assert_eq!(one.to_string(), format!("broadcast {id}: RPC error: down"));

        let two: MultiError = [
            BroadcastError::Reverted { id, tx_hash: B256::repeat_byte(1) },
            BroadcastError::Tx { id, source: TxError::Rpc("down".into()) },
        ]
        .into_iter()
        .collect();
        assert!(two.to_string().starts_with("2 errors occurred:"));
        assert!(MultiError::default().into_result().is_ok());
    }

    #[tokio::test]
    async fn test_discard_broadcaster() {
        let discard = DiscardBroadcaster;
        discard.hook(broadcast(BroadcastKind::Create, &[0x60], 100));
        let (results, res) = discard.broadcast().await;
        assert!(results.is_empty());
        assert!(res.is_ok());
    }

    #[derive(Debug, Default)]
    struct FailingTxManager {
        sent: Mutex<Vec<TxCandidate>>,
    }

    impl TxManager for FailingTxManager {
        fn from(&self) -> Address {
            address!("0x00000000000000000000000000000000000000aa")
        }

        fn send_async(&self, candidate: TxCandidate) -> PendingTx {
            self.sent.lock().unwrap().push(candidate);
            PendingTx::ready(Err(TxError::Rpc("unavailable".into())))
        }
    }

    #[tokio::test]
    async fn test_keyed_broadcaster_collects_tx_errors() {
        let broadcaster = KeyedBroadcaster::new(FailingTxManager::default());
        broadcaster.hook(broadcast(BroadcastKind::Create, &[0x60, 0x00], 50_000));
        broadcaster.hook(broadcast(BroadcastKind::Call, &[1, 2, 3], 10_000));
        assert_eq!(broadcaster.pending(), 2);

        let (results, res) = broadcaster.broadcast().await;
        assert_eq!(results.len(), 2);
        assert_eq!(res.unwrap_err().len(), 2);
        assert_eq!(broadcaster.pending(), 0);

        let sent = broadcaster.txmgr.sent.lock().unwrap();
        assert_eq!(sent[0].to, None);
        assert_eq!(sent[1].to, Some(CREATE2_DEPLOYER));
        assert_eq!(sent[0].gas_limit, padded_gas_limit(&results[0].broadcast));
    }
}
