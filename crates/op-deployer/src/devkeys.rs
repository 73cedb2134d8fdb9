//! Deterministic development keys derived from a mnemonic.
//!
//! Keys live under `m/44'/60'/<kind>'/<chain>/<role>`: kind `0` for plain user accounts, `1` for
//! superchain operators and `2` for chain operators.

use alloy_primitives::{Address, B256};
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use op_script::TEST_MNEMONIC;

use crate::{ChainIntent, ChainRoles, DeployerError, Result, SuperchainRoles};

/// Roles of the superchain operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SuperchainRole {
    Deployer = 0,
    ProxyAdminOwner = 1,
    ProtocolVersionsOwner = 2,
    Guardian = 3,
    DependencySetManager = 4,
}

/// Roles of a chain operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ChainRole {
    Deployer = 0,
    Proposer = 1,
    Batcher = 2,
    SequencerP2P = 3,
    Challenger = 4,
    L2ProxyAdminOwner = 5,
    L1ProxyAdminOwner = 6,
    BaseFeeVaultRecipient = 7,
    L1FeeVaultRecipient = 8,
    SequencerFeeVaultRecipient = 9,
    SystemConfigOwner = 10,
}

/// A development key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevKey {
    /// The `n`th plain user account.
    User(u64),
    /// A superchain operator role on the L1 `chain_id`.
    Superchain {
        /// L1 chain ID.
        chain_id: u64,
        /// The role.
        role: SuperchainRole,
    },
    /// A chain operator role on the L1 `chain_id`.
    Chain {
        /// L1 chain ID.
        chain_id: u64,
        /// The role.
        role: ChainRole,
    },
}

impl DevKey {
    /// The BIP-32 derivation path of the key.
    pub fn derivation_path(&self) -> String {
        match *self {
            Self::User(index) => format!("m/44'/60'/0'/0/{index}"),
            Self::Superchain { chain_id, role } => {
                format!("m/44'/60'/1'/{chain_id}/{}", role as u32)
            }
            Self::Chain { chain_id, role } => format!("m/44'/60'/2'/{chain_id}/{}", role as u32),
        }
    }
}

/// Derives [`DevKey`]s from a mnemonic.
#[derive(Debug, Clone)]
pub struct DevKeys {
    mnemonic: String,
}

impl Default for DevKeys {
    fn default() -> Self {
        Self::new(TEST_MNEMONIC)
    }
}

impl DevKeys {
    /// Keys of `mnemonic`.
    pub fn new(mnemonic: impl Into<String>) -> Self {
        Self { mnemonic: mnemonic.into() }
    }

    /// The signer of `key`.
    pub fn signer(&self, key: DevKey) -> Result<PrivateKeySigner> {
        let path = key.derivation_path();
        let invalid = |err: String| DeployerError::ConfigInvalid(format!("dev key {path}: {err}"));
        MnemonicBuilder::<English>::default()
            .phrase(self.mnemonic.as_str())
            .derivation_path(&path)
            .map_err(|err| invalid(err.to_string()))?
            .build()
            .map_err(|err| invalid(err.to_string()))
    }

    /// The address of `key`.
    pub fn address(&self, key: DevKey) -> Result<Address> {
        Ok(self.signer(key)?.address())
    }

    /// Superchain roles for a deployment to `l1_chain_id`.
    pub fn superchain_roles(&self, l1_chain_id: u64) -> Result<SuperchainRoles> {
        let role = |role| self.address(DevKey::Superchain { chain_id: l1_chain_id, role });
        Ok(SuperchainRoles {
            proxy_admin_owner: role(SuperchainRole::ProxyAdminOwner)?,
            protocol_versions_owner: role(SuperchainRole::ProtocolVersionsOwner)?,
            guardian: role(SuperchainRole::Guardian)?,
        })
    }

    /// A chain intent for `id` with every role and fee recipient set to a chain operator key of
    /// `l1_chain_id`.
    pub fn chain_intent(&self, l1_chain_id: u64, id: B256) -> Result<ChainIntent> {
        let role = |role| self.address(DevKey::Chain { chain_id: l1_chain_id, role });
        Ok(ChainIntent {
            id,
            base_fee_vault_recipient: role(ChainRole::BaseFeeVaultRecipient)?,
            l1_fee_vault_recipient: role(ChainRole::L1FeeVaultRecipient)?,
            sequencer_fee_vault_recipient: role(ChainRole::SequencerFeeVaultRecipient)?,
            eip1559_denominator: 50,
            eip1559_elasticity: 6,
            roles: ChainRoles {
                proxy_admin_owner: role(ChainRole::L1ProxyAdminOwner)?,
                system_config_owner: role(ChainRole::SystemConfigOwner)?,
                governance_token_owner: role(ChainRole::L2ProxyAdminOwner)?,
                unsafe_block_signer: role(ChainRole::SequencerP2P)?,
                batcher: role(ChainRole::Batcher)?,
                proposer: role(ChainRole::Proposer)?,
                challenger: role(ChainRole::Challenger)?,
            },
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use alloy_primitives::address;

    use super::*;

    #[test]
    fn test_user_key_matches_test_mnemonic() {
        let keys = DevKeys::default();
        assert_eq!(
            keys.address(DevKey::User(0)).unwrap(),
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
    }

    #[test]
    fn test_derivation_paths() {
        let key = DevKey::Superchain { chain_id: 900, role: SuperchainRole::Guardian };
        assert_eq!(key.derivation_path(), "m/44'/60'/1'/900/3");
        let key = DevKey::Chain { chain_id: 900, role: ChainRole::SystemConfigOwner };
        assert_eq!(key.derivation_path(), "m/44'/60'/2'/900/10");
    }

    #[test]
    fn test_dev_chain_intent_is_valid() {
        let keys = DevKeys::default();
        let mut intent = crate::Intent::new(
            900,
            crate::ArtifactsLocator::File("/tmp/artifacts".into()),
            "dev",
        );
        intent.superchain_roles = keys.superchain_roles(900).unwrap();
        intent.chains.push(keys.chain_intent(900, B256::with_last_byte(1)).unwrap());
        intent.check().unwrap();

        let roles = &intent.chains[0].roles;
        let distinct: HashSet<_> = [roles.batcher, roles.proposer, roles.challenger].into();
        assert_eq!(distinct.len(), 3);
    }
}
