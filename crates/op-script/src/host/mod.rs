//! The script host: a `revm` instance with script-aware hooks.

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use revm::{
    context::{
        result::{ExecutionResult, Output},
        BlockEnv, CfgEnv, Context as EvmContext, TxEnv,
    },
    handler::{MainBuilder, MainContext, MainnetEvm},
    primitives::hardfork::SpecId,
    InspectCommitEvm, Journal,
};
use tracing::{debug, info, warn};

use crate::{
    forking::{ForkSourceFactory, ForkableState},
    Allocs, Artifact, ArtifactsFs, Result, ScriptError, ScriptPrecompile, CONSOLE_ADDR,
    DEFAULT_CHAIN_ID, DEFAULT_GAS_LIMIT, DEFAULT_SENDER, SCRIPT_DEPLOYER, VM_ADDR,
};

mod broadcast;
pub use broadcast::*;

mod frame;
pub use frame::*;

mod inspector;
pub use inspector::ScriptInspector;

mod revert;
pub use revert::*;

/// The `revm` context the host executes in.
pub type ScriptContext =
    EvmContext<BlockEnv, TxEnv, CfgEnv, ForkableState, Journal<ForkableState>, ()>;

/// The `revm` instance owned by a [`Host`].
pub type ScriptEvm = MainnetEvm<ScriptContext, ScriptInspector>;

/// Execution environment of a [`Host`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// Chain ID reported by `CHAINID`.
    pub chain_id: u64,
    /// Default caller of script entry points.
    pub sender: Address,
    /// Default `tx.origin`.
    pub origin: Address,
    /// Block beneficiary.
    pub fee_recipient: Address,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Block number.
    pub block_number: u64,
    /// Block timestamp.
    pub timestamp: u64,
    /// `PREVRANDAO` of the block.
    pub prev_randao: B256,
    /// Blob hashes visible to `BLOBHASH`.
    pub blob_hashes: Vec<B256>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            sender: DEFAULT_SENDER,
            origin: DEFAULT_SENDER,
            fee_recipient: Address::ZERO,
            gas_limit: DEFAULT_GAS_LIMIT,
            block_number: 0,
            timestamp: 0,
            prev_randao: B256::ZERO,
            blob_hashes: Vec::new(),
        }
    }
}

/// Result of a successful [`Host::call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    /// The return data.
    pub output: Bytes,
    /// Gas left of the supplied gas limit.
    pub gas_left: u64,
}

/// Result of a successful [`Host::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResult {
    /// The address of the new contract.
    pub address: Address,
    /// The deployed runtime code.
    pub output: Bytes,
    /// Gas left of the host gas limit.
    pub gas_left: u64,
}

/// An in-process EVM that runs Solidity scripts.
///
/// State changes of every [`Host::call`] and [`Host::create`] persist. Calls do not consume the
/// caller's nonce, so the host behaves like a sequence of `eth_call`s with committed state.
pub struct Host {
    evm: ScriptEvm,
    context: Context,
    origin: Address,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("context", &self.context)
            .field("origin", &self.origin)
            .field("state", self.state())
            .finish_non_exhaustive()
    }
}

impl Host {
    /// A host over an empty state.
    pub fn new(artifacts: ArtifactsFs, context: Context) -> Self {
        Self::with_state(artifacts, context, ForkableState::new())
    }

    /// A host over `state`.
    pub fn with_state(artifacts: ArtifactsFs, context: Context, state: ForkableState) -> Self {
        let mut cfg = CfgEnv::new_with_spec(SpecId::CANCUN);
        cfg.chain_id = context.chain_id;
        cfg.disable_nonce_check = true;
        cfg.disable_base_fee = true;
        cfg.disable_block_gas_limit = true;
        cfg.disable_eip3607 = true;

        let block = BlockEnv {
            number: U256::from(context.block_number),
            beneficiary: context.fee_recipient,
            timestamp: U256::from(context.timestamp),
            gas_limit: context.gas_limit,
            basefee: 0,
            prevrandao: Some(context.prev_randao),
            ..Default::default()
        };

        let evm = EvmContext::mainnet()
            .with_db(state)
            .with_block(block)
            .with_cfg(cfg)
            .build_mainnet_with_inspector(ScriptInspector::new(artifacts));
        Self { evm, origin: context.origin, context }
    }

    /// Keeps the caller nonce increment of top-level calls, so every broadcast-capable call
    /// advances the sender nonce like a real transaction.
    pub fn with_isolated_broadcasts(mut self) -> Self {
        self.evm.inspector.isolated_broadcasts = true;
        self
    }

    /// Reports broadcast-mode sub-calls to `hook`.
    pub fn with_broadcast_hook(mut self, hook: Arc<dyn BroadcastHook>) -> Self {
        self.evm.inspector.broadcast_hook = Some(hook);
        self
    }

    /// Resolves the urls and aliases of the `createFork` cheat codes with `factory`.
    pub fn with_fork_factory(mut self, factory: Arc<dyn ForkSourceFactory>) -> Self {
        self.evm.inspector.fork_factory = Some(factory);
        self
    }

    /// The execution environment the host was created with.
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// The state database.
    pub fn state(&self) -> &ForkableState {
        &self.evm.ctx.journaled_state.database
    }

    /// The state database, mutably.
    pub fn state_mut(&mut self) -> &mut ForkableState {
        &mut self.evm.ctx.journaled_state.database
    }

    /// The hook-side state of the host.
    pub const fn inspector(&self) -> &ScriptInspector {
        &self.evm.inspector
    }

    /// The artifact store.
    pub fn artifacts_mut(&mut self) -> &mut ArtifactsFs {
        &mut self.evm.inspector.artifacts
    }

    /// Performs a CALL. State changes persist.
    pub fn call(
        &mut self,
        from: Address,
        to: Address,
        input: Bytes,
        gas: u64,
        value: U256,
    ) -> Result<CallResult> {
        match self.transact(from, TxKind::Call(to), input, gas, value)? {
            ExecutionResult::Success { output, gas_used, .. } => Ok(CallResult {
                output: output.into_data(),
                gas_left: gas.saturating_sub(gas_used),
            }),
            ExecutionResult::Revert { output, .. } => Err(ScriptError::Revert {
                address: to,
                message: decode_revert(&output),
                data: output,
            }),
            ExecutionResult::Halt { reason, .. } => Err(ScriptError::Halt(format!("{reason:?}"))),
        }
    }

    /// Performs a CREATE from `from` at its current nonce.
    pub fn create(&mut self, from: Address, init_code: Bytes, value: U256) -> Result<CreateResult> {
        let expected = from.create(self.state_mut().nonce(from)?);
        let gas = self.context.gas_limit;
        match self.transact(from, TxKind::Create, init_code, gas, value)? {
            ExecutionResult::Success { output, gas_used, .. } => {
                let actual = match &output {
                    Output::Create(_, Some(address)) => *address,
                    _ => {
                        return Err(ScriptError::CreateFailed {
                            returned: short_hex(output.data()),
                        })
                    }
                };
                if actual != expected {
                    return Err(ScriptError::CreateAddressMismatch { expected, actual });
                }
                Ok(CreateResult {
                    address: actual,
                    output: output.into_data(),
                    gas_left: gas.saturating_sub(gas_used),
                })
            }
            ExecutionResult::Revert { output, .. } => Err(ScriptError::Revert {
                address: expected,
                message: decode_revert(&output),
                data: output,
            }),
            ExecutionResult::Halt { reason, .. } => Err(ScriptError::CreateFailed {
                returned: format!("{reason:?}"),
            }),
        }
    }

    fn transact(
        &mut self,
        from: Address,
        kind: TxKind,
        data: Bytes,
        gas_limit: u64,
        value: U256,
    ) -> Result<ExecutionResult> {
        let nonce = self.state_mut().nonce(from)?;
        let tx = TxEnv {
            caller: from,
            kind,
            data,
            value,
            gas_limit,
            gas_price: 0,
            nonce,
            chain_id: Some(self.evm.ctx.cfg.chain_id),
            blob_hashes: self.context.blob_hashes.clone(),
            ..Default::default()
        };
        let result =
            self.evm.inspect_tx_commit(tx).map_err(|err| ScriptError::Evm(err.to_string()));
        self.evm.inspector.reset_frames();
        result
    }

    /// Reads the artifact `artifact_name`/`contract_name` and deploys it from the tx origin.
    pub fn load_contract(&mut self, artifact_name: &str, contract_name: &str) -> Result<Address> {
        let artifact = self.evm.inspector.artifacts.read_artifact(artifact_name, contract_name)?;
        let deployed = self.create(self.origin, artifact.bytecode.clone(), U256::ZERO)?;
        self.remember_artifact(deployed.address, &artifact, contract_name)?;
        Ok(deployed.address)
    }

    /// Associates `address` with an artifact for call-stack logging.
    pub fn remember_artifact(
        &mut self,
        address: Address,
        artifact: &Artifact,
        contract: &str,
    ) -> Result<()> {
        if self.state_mut().code(address)? != artifact.deployed_bytecode {
            warn!(%address, contract, "State bytecode does not match artifact deployed bytecode");
        }
        self.evm.inspector.labels.entry(address).or_insert_with(|| contract.to_string());
        Ok(())
    }

    /// Installs the cheat-code precompile at [`VM_ADDR`].
    pub fn enable_cheats(&mut self) -> Result<()> {
        if self.evm.inspector.cheats_enabled {
            return Err(ScriptError::CheatsAlreadyEnabled);
        }
        // EXTCODESIZE checks in Solidity need code at the cheat-code address.
        self.state_mut().set_code(VM_ADDR, Bytes::from_static(&[0x00]))?;
        self.evm.inspector.cheats_enabled = true;
        Ok(())
    }

    /// Returns `true` once [`Host::enable_cheats`] succeeded.
    pub const fn cheats_enabled(&self) -> bool {
        self.evm.inspector.cheats_enabled
    }

    /// Grants `address` access to the cheat codes.
    pub fn allow_cheatcodes(&mut self, address: Address) {
        self.evm.inspector.cheat_access.insert(address);
    }

    /// Installs `precompile` at `address`, or removes the override and wipes the account.
    pub fn set_precompile(
        &mut self,
        address: Address,
        precompile: Option<Box<dyn ScriptPrecompile>>,
    ) -> Result<()> {
        match precompile {
            Some(precompile) => {
                debug!(%address, "Adding precompile");
                self.evm.inspector.precompiles.insert(address, precompile);
                self.state_mut().set_code(address, Bytes::from_static(&[0x00]))?;
            }
            None => {
                debug!(%address, "Removing precompile");
                self.evm.inspector.precompiles.remove(&address);
                self.wipe(address)?;
            }
        }
        Ok(())
    }

    /// Returns `true` if a host-side precompile is installed at `address`.
    pub fn has_precompile_override(&self, address: &Address) -> bool {
        self.evm.inspector.precompiles.contains_key(address)
    }

    /// Installs a prank on the executing frame.
    pub fn prank(
        &mut self,
        sender: Option<Address>,
        origin: Option<Address>,
        repeat: bool,
        broadcast: bool,
    ) -> Result<()> {
        self.evm.inspector.prank(sender, origin, repeat, broadcast)
    }

    /// Removes the prank of the executing frame.
    pub fn stop_prank(&mut self, broadcast: bool) -> Result<()> {
        self.evm.inspector.stop_prank(broadcast)
    }

    /// Dumps the base state.
    ///
    /// Script contracts, the script deployer, the cheat-code and console addresses and precompile
    /// placeholders are excluded.
    pub fn state_dump(&self) -> Result<Allocs> {
        let mut allocs = self.state().dump(crate::ForkId::BASE)?;
        let deployer_nonce = allocs.get(&SCRIPT_DEPLOYER).map(|account| account.nonce);
        for nonce in 0..=deployer_nonce.unwrap_or_default() {
            let script = SCRIPT_DEPLOYER.create(nonce);
            if allocs.remove(&script).is_some() {
                let label = self.label_of(&script);
                info!(address = %script, label, "Removing script from state dump");
            }
        }
        allocs.remove(&SCRIPT_DEPLOYER);
        allocs.remove(&VM_ADDR);
        allocs.remove(&CONSOLE_ADDR);
        for address in self.evm.inspector.precompiles.keys() {
            allocs.remove(address);
        }
        Ok(allocs)
    }

    /// Clears nonce, balance and code of `address`.
    pub fn wipe(&mut self, address: Address) -> Result<()> {
        Ok(self.state_mut().wipe(address)?)
    }

    /// Inserts every account of `allocs` into the state.
    pub fn import_state(&mut self, allocs: &Allocs) -> Result<()> {
        Ok(self.state_mut().import_allocs(allocs)?)
    }

    /// Names `address` in logs and `getLabel`.
    pub fn label(&mut self, address: Address, label: impl Into<String>) {
        let label = label.into();
        debug!(%address, %label, "Labeling");
        self.evm.inspector.labels.insert(address, label);
    }

    fn label_of(&self, address: &Address) -> &str {
        self.evm.inspector.labels.get(address).map(String::as_str).unwrap_or_default()
    }

    /// Sets a host-scoped environment variable, visible to the `env*` cheat codes.
    pub fn set_env_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.evm.inspector.env.insert(key.into(), value.into());
    }

    /// Reads a host-scoped environment variable.
    pub fn get_env_var(&self, key: &str) -> Option<&str> {
        self.evm.inspector.env.get(key).map(String::as_str)
    }

    /// The address the next script deployed by [`SCRIPT_DEPLOYER`] will get.
    pub fn new_script_address(&mut self) -> Result<Address> {
        Ok(SCRIPT_DEPLOYER.create(self.state_mut().nonce(SCRIPT_DEPLOYER)?))
    }

    /// Takes the next script address without deploying to it.
    ///
    /// Used for precompile addresses that must not collide with later scripts. Reserved addresses
    /// are excluded from [`Host::state_dump`] like scripts are.
    pub fn reserve_script_address(&mut self) -> Result<Address> {
        let nonce = self.state_mut().nonce(SCRIPT_DEPLOYER)?;
        self.state_mut().set_nonce(SCRIPT_DEPLOYER, nonce + 1)?;
        Ok(SCRIPT_DEPLOYER.create(nonce))
    }

    /// Sets the default caller of scripts and contract loading.
    pub fn set_tx_origin(&mut self, origin: Address) {
        self.origin = origin;
    }

    /// The default caller of scripts and contract loading.
    pub const fn tx_origin(&self) -> Address {
        self.origin
    }

    /// Nonce of `address`.
    pub fn get_nonce(&mut self, address: Address) -> Result<u64> {
        Ok(self.state_mut().nonce(address)?)
    }

    /// Sets the nonce of `address`.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<()> {
        Ok(self.state_mut().set_nonce(address, nonce)?)
    }

    /// Balance of `address`.
    pub fn balance(&mut self, address: Address) -> Result<U256> {
        Ok(self.state_mut().balance(address)?)
    }

    /// Sets the balance of `address`.
    pub fn set_balance(&mut self, address: Address, balance: U256) -> Result<()> {
        Ok(self.state_mut().set_balance(address, balance)?)
    }

    /// Runtime code of `address`.
    pub fn code_at(&mut self, address: Address) -> Result<Bytes> {
        Ok(self.state_mut().code(address)?)
    }

    /// Returns `true` if `address` has runtime code.
    pub fn has_code(&mut self, address: Address) -> Result<bool> {
        Ok(!self.code_at(address)?.is_empty())
    }

    /// Storage slot `key` of `address`.
    pub fn storage_at(&mut self, address: Address, key: B256) -> Result<B256> {
        let value = self.state_mut().storage(address, U256::from_be_bytes(key.0))?;
        Ok(B256::from(value.to_be_bytes::<32>()))
    }

    /// Creation code of the artifact `name`, see [`crate::parse_artifact_name`].
    pub fn get_code(&mut self, name: &str) -> Result<Bytes> {
        Ok(self.evm.inspector.artifacts.lookup(name)?.bytecode.clone())
    }

    /// Enforces or lifts the EIP-170 contract size limit. Enforced by default.
    pub fn enforce_max_code_size(&mut self, enforce: bool) {
        self.evm.ctx.cfg.limit_contract_code_size = (!enforce).then_some(usize::MAX >> 1);
    }

    /// Logs the frames of the executing call stack.
    pub fn log_call_stack(&self) {
        self.evm.inspector.log_call_stack();
    }

    /// Pins `address` to the active fork.
    pub fn make_persistent(&mut self, address: Address) {
        self.state_mut().make_persistent(address);
    }

    /// `msg.sender` of the executing frame, zero outside of execution.
    pub fn msg_sender(&self) -> Address {
        self.evm.inspector.current_frame().map(|frame| frame.caller).unwrap_or_default()
    }

    /// The address of the executing frame, zero outside of execution.
    pub fn self_address(&self) -> Address {
        self.evm.inspector.current_frame().map(|frame| frame.address).unwrap_or_default()
    }

    /// A call backend that calls `to` from the tx origin.
    pub fn script_backend(&mut self, to: Address) -> ScriptBackend<'_> {
        ScriptBackend { host: self, to }
    }
}

/// Calls a deployed script on behalf of the tx origin, see [`Host::script_backend`].
#[derive(Debug)]
pub struct ScriptBackend<'a> {
    host: &'a mut Host,
    to: Address,
}

impl crate::CallBackend for ScriptBackend<'_> {
    fn call(&mut self, data: Bytes) -> Result<Bytes> {
        let origin = self.host.tx_origin();
        Ok(self.host.call(origin, self.to, data, DEFAULT_GAS_LIMIT, U256::ZERO)?.output)
    }
}

fn short_hex(data: &[u8]) -> String {
    let hex = alloy_primitives::hex::encode(data);
    if hex.len() > 20 {
        format!("{}...", &hex[..20])
    } else {
        hex
    }
}
