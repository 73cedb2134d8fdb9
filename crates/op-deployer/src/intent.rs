//! The user's declared deployment: which chains to deploy and who owns them.

use std::collections::HashSet;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ArtifactsLocator, DeployerError, Result};

/// Deploy overrides, merged over the generated deploy config by key.
pub type DeployOverrides = Map<String, Value>;

/// The desired deployment, stored as `intent.toml` in the work directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    /// Chain ID of the L1 the contracts are deployed to.
    #[serde(rename = "l1ChainID")]
    pub l1_chain_id: u64,
    /// Deploy the fault proof system.
    #[serde(default)]
    pub use_fault_proofs: bool,
    /// Deploy the alt-DA contracts.
    #[serde(default)]
    pub use_alt_da: bool,
    /// Prefund the development accounts in every L2 genesis.
    #[serde(default)]
    pub fund_dev_accounts: bool,
    /// Owners of the superchain contracts.
    pub superchain_roles: SuperchainRoles,
    /// Where the contract artifacts are read from.
    pub contract_artifacts_url: ArtifactsLocator,
    /// Identifier of the contract implementations release.
    pub contracts_release: String,
    /// The L2 chains, deployed in declaration order.
    #[serde(default)]
    pub chains: Vec<ChainIntent>,
    /// Overrides applied to the deploy config of every chain.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub global_deploy_overrides: DeployOverrides,
}

/// Owners of the contracts shared by every chain of the superchain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperchainRoles {
    /// Owner of the superchain proxy admin.
    pub proxy_admin_owner: Address,
    /// Owner of `ProtocolVersions`.
    pub protocol_versions_owner: Address,
    /// Guardian of `SuperchainConfig`.
    pub guardian: Address,
}

/// One L2 chain of the intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainIntent {
    /// The L2 chain ID as a 32-byte word.
    pub id: B256,
    /// Receives the base fees collected on L2.
    #[serde(default)]
    pub base_fee_vault_recipient: Address,
    /// Receives the L1 data fees collected on L2.
    #[serde(default)]
    pub l1_fee_vault_recipient: Address,
    /// Receives the priority fees collected on L2.
    #[serde(default)]
    pub sequencer_fee_vault_recipient: Address,
    /// EIP-1559 base fee change denominator.
    #[serde(default = "default_eip1559_denominator")]
    pub eip1559_denominator: u64,
    /// EIP-1559 gas target elasticity.
    #[serde(default = "default_eip1559_elasticity")]
    pub eip1559_elasticity: u64,
    /// Operator roles of the chain.
    pub roles: ChainRoles,
    /// Overrides applied to this chain's deploy config, after the global ones.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub deploy_overrides: DeployOverrides,
}

const fn default_eip1559_denominator() -> u64 {
    50
}

const fn default_eip1559_elasticity() -> u64 {
    6
}

/// Operator roles of one L2 chain.
///
/// Unset (zero) roles default to `proxy_admin_owner`, except `unsafe_block_signer` and `batcher`
/// which are required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRoles {
    /// Owner of the chain's proxy admin.
    #[serde(default)]
    pub proxy_admin_owner: Address,
    /// Owner of `SystemConfig`.
    #[serde(default)]
    pub system_config_owner: Address,
    /// Owner of the L2 governance token.
    #[serde(default)]
    pub governance_token_owner: Address,
    /// Signs unsafe blocks on the p2p network.
    #[serde(default)]
    pub unsafe_block_signer: Address,
    /// Submits batches to L1.
    #[serde(default)]
    pub batcher: Address,
    /// Proposes output roots.
    #[serde(default)]
    pub proposer: Address,
    /// Challenges invalid proposals.
    #[serde(default)]
    pub challenger: Address,
}

impl ChainRoles {
    /// The roles with every unset optional role replaced by `proxy_admin_owner`.
    pub fn resolved(&self) -> Self {
        let or_owner =
            |role: Address| if role.is_zero() { self.proxy_admin_owner } else { role };
        Self {
            proxy_admin_owner: self.proxy_admin_owner,
            system_config_owner: or_owner(self.system_config_owner),
            governance_token_owner: or_owner(self.governance_token_owner),
            unsafe_block_signer: self.unsafe_block_signer,
            batcher: self.batcher,
            proposer: or_owner(self.proposer),
            challenger: or_owner(self.challenger),
        }
    }
}

impl ChainIntent {
    /// The chain ID as an integer.
    pub fn chain_id(&self) -> U256 {
        self.id.into()
    }

    fn check(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(DeployerError::ConfigInvalid(format!("chain {}: {reason}", self.chain_id())))
        };
        if self.id.is_zero() {
            return invalid("chain ID must be set");
        }
        if self.roles.proxy_admin_owner.is_zero() {
            return invalid("proxyAdminOwner must be set");
        }
        if self.roles.unsafe_block_signer.is_zero() {
            return invalid("unsafeBlockSigner must be set");
        }
        if self.roles.batcher.is_zero() {
            return invalid("batcher must be set");
        }
        if self.eip1559_denominator == 0 {
            return invalid("eip1559Denominator must be positive");
        }
        Ok(())
    }
}

impl Intent {
    /// An intent for `l1_chain_id` without chains or roles.
    pub fn new(l1_chain_id: u64, artifacts: ArtifactsLocator, release: impl Into<String>) -> Self {
        Self {
            l1_chain_id,
            use_fault_proofs: false,
            use_alt_da: false,
            fund_dev_accounts: false,
            superchain_roles: SuperchainRoles::default(),
            contract_artifacts_url: artifacts,
            contracts_release: release.into(),
            chains: Vec::new(),
            global_deploy_overrides: DeployOverrides::new(),
        }
    }

    /// Validates the intent.
    pub fn check(&self) -> Result<()> {
        let invalid = |reason: &str| Err(DeployerError::ConfigInvalid(reason.to_string()));
        if self.l1_chain_id == 0 {
            return invalid("l1ChainID must be set");
        }
        if self.use_fault_proofs && self.use_alt_da {
            return invalid("cannot use both fault proofs and alt-DA");
        }
        let roles = &self.superchain_roles;
        if roles.proxy_admin_owner.is_zero() ||
            roles.protocol_versions_owner.is_zero() ||
            roles.guardian.is_zero()
        {
            return invalid("all superchain roles must be set");
        }
        if self.contracts_release.is_empty() {
            return invalid("contractsRelease must be set");
        }

        let mut ids = HashSet::new();
        for chain in &self.chains {
            chain.check()?;
            if !ids.insert(chain.id) {
                return invalid(&format!("duplicate chain ID {}", chain.chain_id()));
            }
        }
        Ok(())
    }

    /// Rejects changes to the fields that are fixed once an intent was applied.
    pub fn check_immutable(&self, applied: &Self) -> Result<()> {
        fn compare<T>(field: &'static str, applied: T, requested: T) -> Result<()>
        where
            T: PartialEq + ToString,
        {
            if applied == requested {
                return Ok(());
            }
            Err(DeployerError::ImmutableChanged {
                field,
                applied: applied.to_string(),
                requested: requested.to_string(),
            })
        }
        compare("l1ChainID", applied.l1_chain_id, self.l1_chain_id)?;
        compare("useFaultProofs", applied.use_fault_proofs, self.use_fault_proofs)?;
        compare("useAltDA", applied.use_alt_da, self.use_alt_da)?;
        compare("fundDevAccounts", applied.fund_dev_accounts, self.fund_dev_accounts)
    }

    /// The chain with ID `id`.
    pub fn chain(&self, id: B256) -> Result<&ChainIntent> {
        self.chains.iter().find(|chain| chain.id == id).ok_or_else(|| {
            DeployerError::ConfigInvalid(format!("chain {} not found in intent", <U256 as From<B256>>::from(id)))
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use rstest::rstest;

    use super::*;

    const OWNER: Address = address!("0x0000000000000000000000000000000000000001");
    const SIGNER: Address = address!("0x0000000000000000000000000000000000000002");
    const BATCHER: Address = address!("0x0000000000000000000000000000000000000003");

    fn valid_intent() -> Intent {
        let mut intent = Intent::new(900, ArtifactsLocator::File("/tmp/artifacts".into()), "dev");
        intent.superchain_roles = SuperchainRoles {
            proxy_admin_owner: OWNER,
            protocol_versions_owner: OWNER,
            guardian: OWNER,
        };
        intent.chains.push(ChainIntent {
            id: B256::with_last_byte(1),
            eip1559_denominator: 50,
            eip1559_elasticity: 6,
            roles: ChainRoles {
                proxy_admin_owner: OWNER,
                unsafe_block_signer: SIGNER,
                batcher: BATCHER,
                ..Default::default()
            },
            ..Default::default()
        });
        intent
    }

    #[test]
    fn test_valid_intent() {
        valid_intent().check().unwrap();
    }

    #[test]
    fn test_fault_proofs_and_alt_da_are_exclusive() {
        let mut intent = valid_intent();
        intent.use_fault_proofs = true;
        intent.use_alt_da = true;
        let err = intent.check().unwrap_err();
        assert!(err.to_string().contains("cannot use both fault proofs and alt-DA"));
    }

    #[rstest]
    #[case::no_batcher(|roles: &mut ChainRoles| roles.batcher = Address::ZERO, "batcher")]
    #[case::no_signer(
        |roles: &mut ChainRoles| roles.unsafe_block_signer = Address::ZERO,
        "unsafeBlockSigner"
    )]
    #[case::no_owner(
        |roles: &mut ChainRoles| roles.proxy_admin_owner = Address::ZERO,
        "proxyAdminOwner"
    )]
    fn test_required_chain_roles(#[case] unset: fn(&mut ChainRoles), #[case] role: &str) {
        let mut intent = valid_intent();
        unset(&mut intent.chains[0].roles);
        let err = intent.check().unwrap_err();
        assert!(matches!(err, DeployerError::ConfigInvalid(_)));
        assert!(err.to_string().contains(role), "{err}");
    }

    #[test]
    fn test_duplicate_chain_ids() {
        let mut intent = valid_intent();
        intent.chains.push(intent.chains[0].clone());
        assert!(intent.check().unwrap_err().to_string().contains("duplicate chain ID 1"));
    }

    #[test]
    fn test_roles_default_to_proxy_admin_owner() {
        let roles = valid_intent().chains[0].roles.resolved();
        assert_eq!(roles.system_config_owner, OWNER);
        assert_eq!(roles.governance_token_owner, OWNER);
        assert_eq!(roles.proposer, OWNER);
        assert_eq!(roles.challenger, OWNER);
        assert_eq!(roles.batcher, BATCHER);
        assert_eq!(roles.unsafe_block_signer, SIGNER);
    }

    #[rstest]
    #[case::chain_id(|intent: &mut Intent| intent.l1_chain_id = 901, "l1ChainID")]
    #[case::fault_proofs(|intent: &mut Intent| intent.use_fault_proofs = true, "useFaultProofs")]
    #[case::alt_da(|intent: &mut Intent| intent.use_alt_da = true, "useAltDA")]
    #[case::dev_accounts(
        |intent: &mut Intent| intent.fund_dev_accounts = true,
        "fundDevAccounts"
    )]
    fn test_immutable_fields(#[case] change: fn(&mut Intent), #[case] field: &str) {
        let applied = valid_intent();
        let mut intent = applied.clone();
        change(&mut intent);
        match intent.check_immutable(&applied).unwrap_err() {
            DeployerError::ImmutableChanged { field: changed, .. } => assert_eq!(changed, field),
            err => panic!("unexpected error {err}"),
        }
    }

    #[test]
    fn test_mutable_fields_may_change() {
        let applied = valid_intent();
        let mut intent = applied.clone();
        intent.contracts_release = "op-contracts/v1.6.0".to_string();
        intent.chains[0].roles.proposer = BATCHER;
        intent.check_immutable(&applied).unwrap();
    }

    #[test]
    fn test_toml_layout() {
        let mut intent = valid_intent();
        intent.global_deploy_overrides.insert("l2BlockTime".to_string(), 3.into());
        let encoded = toml::to_string(&intent).unwrap();
        assert!(encoded.contains("l1ChainID = 900"), "{encoded}");
        assert!(encoded.contains("contractArtifactsUrl = \"file:///tmp/artifacts\""), "{encoded}");
        assert_eq!(toml::from_str::<Intent>(&encoded).unwrap(), intent);
    }
}
