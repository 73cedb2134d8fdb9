//! The cheat-code interface served at [`VM_ADDR`](crate::VM_ADDR).
//!
//! Signatures follow Foundry's `Vm.sol`, so scripts compiled against `forge-std` keep working.

#![allow(missing_docs)]

alloy_sol_types::sol! {
    #[sol(all_derives)]
    interface Vm {
        /// Caller override of the frame that calls `readCallers`.
        enum CallerMode {
            None,
            Broadcast,
            RecurrentBroadcast,
            Prank,
            RecurrentPrank,
        }

        // block and chain
        function warp(uint256 newTimestamp) external;
        function roll(uint256 newHeight) external;
        function fee(uint256 newBasefee) external;
        function coinbase(address newCoinbase) external;
        function prevrandao(bytes32 newPrevrandao) external;
        function prevrandao(uint256 newPrevrandao) external;
        function difficulty(uint256 newDifficulty) external;
        function chainId(uint256 newChainId) external;
        function getBlockNumber() external view returns (uint256 height);
        function getBlockTimestamp() external view returns (uint256 timestamp);

        // state
        function store(address target, bytes32 slot, bytes32 value) external;
        function load(address target, bytes32 slot) external view returns (bytes32 data);
        function etch(address target, bytes calldata newRuntimeBytecode) external;
        function deal(address account, uint256 newBalance) external;
        function setNonce(address account, uint64 newNonce) external;
        function setNonceUnsafe(address account, uint64 newNonce) external;
        function getNonce(address account) external view returns (uint64 nonce);
        function resetNonce(address account) external;
        function dumpState(string calldata pathToStateJson) external;

        // pranks and broadcasts
        function prank(address msgSender) external;
        function prank(address msgSender, address txOrigin) external;
        function startPrank(address msgSender) external;
        function startPrank(address msgSender, address txOrigin) external;
        function stopPrank() external;
        function broadcast() external;
        function broadcast(address signer) external;
        function broadcast(uint256 privateKey) external;
        function startBroadcast() external;
        function startBroadcast(address signer) external;
        function startBroadcast(uint256 privateKey) external;
        function stopBroadcast() external;
        function readCallers() external returns (CallerMode callerMode, address msgSender, address txOrigin);

        // environment
        function setEnv(string calldata name, string calldata value) external;
        function envExists(string calldata name) external view returns (bool result);
        function envBool(string calldata name) external view returns (bool value);
        function envBool(string calldata name, string calldata delim) external view returns (bool[] memory value);
        function envUint(string calldata name) external view returns (uint256 value);
        function envUint(string calldata name, string calldata delim) external view returns (uint256[] memory value);
        function envInt(string calldata name) external view returns (int256 value);
        function envInt(string calldata name, string calldata delim) external view returns (int256[] memory value);
        function envAddress(string calldata name) external view returns (address value);
        function envAddress(string calldata name, string calldata delim) external view returns (address[] memory value);
        function envBytes32(string calldata name) external view returns (bytes32 value);
        function envBytes32(string calldata name, string calldata delim) external view returns (bytes32[] memory value);
        function envString(string calldata name) external view returns (string memory value);
        function envString(string calldata name, string calldata delim) external view returns (string[] memory value);
        function envBytes(string calldata name) external view returns (bytes memory value);
        function envBytes(string calldata name, string calldata delim) external view returns (bytes[] memory value);
        function envOr(string calldata name, bool defaultValue) external view returns (bool value);
        function envOr(string calldata name, uint256 defaultValue) external view returns (uint256 value);
        function envOr(string calldata name, int256 defaultValue) external view returns (int256 value);
        function envOr(string calldata name, address defaultValue) external view returns (address value);
        function envOr(string calldata name, bytes32 defaultValue) external view returns (bytes32 value);
        function envOr(string calldata name, string calldata defaultValue) external view returns (string memory value);
        function envOr(string calldata name, bytes calldata defaultValue) external view returns (bytes memory value);
        function envOr(string calldata name, string calldata delim, bool[] calldata defaultValue) external view returns (bool[] memory value);
        function envOr(string calldata name, string calldata delim, uint256[] calldata defaultValue) external view returns (uint256[] memory value);
        function envOr(string calldata name, string calldata delim, int256[] calldata defaultValue) external view returns (int256[] memory value);
        function envOr(string calldata name, string calldata delim, address[] calldata defaultValue) external view returns (address[] memory value);
        function envOr(string calldata name, string calldata delim, bytes32[] calldata defaultValue) external view returns (bytes32[] memory value);
        function envOr(string calldata name, string calldata delim, string[] calldata defaultValue) external view returns (string[] memory value);
        function envOr(string calldata name, string calldata delim, bytes[] calldata defaultValue) external view returns (bytes[] memory value);

        // string conversion
        function parseBytes(string calldata stringifiedValue) external pure returns (bytes memory parsedValue);
        function parseAddress(string calldata stringifiedValue) external pure returns (address parsedValue);
        function parseUint(string calldata stringifiedValue) external pure returns (uint256 parsedValue);
        function parseInt(string calldata stringifiedValue) external pure returns (int256 parsedValue);
        function parseBytes32(string calldata stringifiedValue) external pure returns (bytes32 parsedValue);
        function parseBool(string calldata stringifiedValue) external pure returns (bool parsedValue);
        function toString(address value) external pure returns (string memory stringifiedValue);
        function toString(bytes calldata value) external pure returns (string memory stringifiedValue);
        function toString(bytes32 value) external pure returns (string memory stringifiedValue);
        function toString(bool value) external pure returns (string memory stringifiedValue);
        function toString(uint256 value) external pure returns (string memory stringifiedValue);
        function toString(int256 value) external pure returns (string memory stringifiedValue);

        // json and toml
        function keyExists(string calldata json, string calldata key) external view returns (bool);
        function keyExistsJson(string calldata json, string calldata key) external view returns (bool);
        function keyExistsToml(string calldata toml, string calldata key) external view returns (bool);
        function parseJson(string calldata json, string calldata key) external pure returns (bytes memory abiEncodedData);
        function parseJson(string calldata json) external pure returns (bytes memory abiEncodedData);
        function parseToml(string calldata toml, string calldata key) external pure returns (bytes memory abiEncodedData);
        function parseToml(string calldata toml) external pure returns (bytes memory abiEncodedData);
        function parseJsonKeys(string calldata json, string calldata key) external pure returns (string[] memory keys);
        function parseTomlKeys(string calldata toml, string calldata key) external pure returns (string[] memory keys);
        function serializeJson(string calldata objectKey, string calldata value) external returns (string memory json);
        function serializeBool(string calldata objectKey, string calldata valueKey, bool value) external returns (string memory json);
        function serializeBool(string calldata objectKey, string calldata valueKey, bool[] calldata values) external returns (string memory json);
        function serializeUint(string calldata objectKey, string calldata valueKey, uint256 value) external returns (string memory json);
        function serializeUint(string calldata objectKey, string calldata valueKey, uint256[] calldata values) external returns (string memory json);
        function serializeInt(string calldata objectKey, string calldata valueKey, int256 value) external returns (string memory json);
        function serializeInt(string calldata objectKey, string calldata valueKey, int256[] calldata values) external returns (string memory json);
        function serializeAddress(string calldata objectKey, string calldata valueKey, address value) external returns (string memory json);
        function serializeAddress(string calldata objectKey, string calldata valueKey, address[] calldata values) external returns (string memory json);
        function serializeBytes32(string calldata objectKey, string calldata valueKey, bytes32 value) external returns (string memory json);
        function serializeBytes32(string calldata objectKey, string calldata valueKey, bytes32[] calldata values) external returns (string memory json);
        function serializeString(string calldata objectKey, string calldata valueKey, string calldata value) external returns (string memory json);
        function serializeString(string calldata objectKey, string calldata valueKey, string[] calldata values) external returns (string memory json);
        function serializeBytes(string calldata objectKey, string calldata valueKey, bytes calldata value) external returns (string memory json);
        function serializeBytes(string calldata objectKey, string calldata valueKey, bytes[] calldata values) external returns (string memory json);
        function writeJson(string calldata json, string calldata path) external;
        function writeJson(string calldata json, string calldata path, string calldata valueKey) external;
        function writeToml(string calldata json, string calldata path) external;
        function writeToml(string calldata json, string calldata path, string calldata valueKey) external;

        // artifacts
        function getCode(string calldata artifactPath) external view returns (bytes memory creationBytecode);
        function getDeployedCode(string calldata artifactPath) external view returns (bytes memory runtimeBytecode);
        function projectRoot() external view returns (string memory path);

        // forking
        function createFork(string calldata urlOrAlias) external returns (uint256 forkId);
        function createFork(string calldata urlOrAlias, uint256 blockNumber) external returns (uint256 forkId);
        function createFork(string calldata urlOrAlias, bytes32 txHash) external returns (uint256 forkId);
        function createSelectFork(string calldata urlOrAlias) external returns (uint256 forkId);
        function createSelectFork(string calldata urlOrAlias, uint256 blockNumber) external returns (uint256 forkId);
        function createSelectFork(string calldata urlOrAlias, bytes32 txHash) external returns (uint256 forkId);
        function selectFork(uint256 forkId) external;
        function rollFork(uint256 blockNumber) external;
        function rollFork(uint256 forkId, uint256 blockNumber) external;
        function activeFork() external view returns (uint256 forkId);
        function makePersistent(address account) external;
        function makePersistent(address account0, address account1) external;
        function makePersistent(address account0, address account1, address account2) external;
        function makePersistent(address[] calldata accounts) external;
        function revokePersistent(address account) external;
        function revokePersistent(address[] calldata accounts) external;
        function isPersistent(address account) external view returns (bool persistent);
        function allowCheatcodes(address account) external;

        // utilities
        function addr(uint256 privateKey) external pure returns (address keyAddr);
        function label(address account, string calldata newLabel) external;
        function getLabel(address account) external view returns (string memory currentLabel);
        function deriveKey(string calldata mnemonic, uint32 index) external pure returns (uint256 privateKey);
        function deriveKey(string calldata mnemonic, string calldata derivationPath, uint32 index) external pure returns (uint256 privateKey);
        function rememberKey(uint256 privateKey) external returns (address keyAddr);
        function sleep(uint256 duration) external;
        function unixTime() external returns (uint256 milliseconds);

        // not supported by the script host
        function ffi(string[] calldata commandInput) external returns (bytes memory result);
        function prompt(string calldata promptText) external returns (string memory input);
        function mockCall(address callee, bytes calldata data, bytes calldata returnData) external;
        function mockCall(address callee, uint256 msgValue, bytes calldata data, bytes calldata returnData) external;
        function record() external;
        function accesses(address target) external returns (bytes32[] memory readSlots, bytes32[] memory writeSlots);
        function recordLogs() external;
        function pauseGasMetering() external;
        function resumeGasMetering() external;
        function startStateDiffRecording() external;
        function stopAndReturnStateDiff() external;
    }
}
