use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use alloy_json_abi::JsonAbi;
use alloy_primitives::Bytes;
use serde::Deserialize;
use tracing::trace;

use crate::{Result, ScriptError};

/// A compiled contract: ABI, creation code and runtime code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// The contract ABI.
    pub abi: JsonAbi,
    /// The creation (init) code.
    pub bytecode: Bytes,
    /// The runtime code.
    pub deployed_bytecode: Bytes,
    /// The compiler's storage layout, if emitted.
    pub storage_layout: Option<serde_json::Value>,
    /// The compiler metadata, if emitted.
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForgeArtifact {
    abi: JsonAbi,
    bytecode: ForgeBytecode,
    #[serde(default)]
    deployed_bytecode: Option<ForgeBytecode>,
    #[serde(default)]
    storage_layout: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ForgeBytecode {
    object: Bytes,
}

impl Artifact {
    /// Parses a Foundry artifact JSON document.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: ForgeArtifact = serde_json::from_slice(data)?;
        Ok(Self {
            abi: raw.abi,
            bytecode: raw.bytecode.object,
            deployed_bytecode: raw.deployed_bytecode.map(|code| code.object).unwrap_or_default(),
            storage_layout: raw.storage_layout,
            metadata: raw.metadata,
        })
    }
}

/// Splits an artifact reference into `(file, contract)`.
///
/// Accepted forms are `Name`, `Name.sol`, `Name.sol:Contract` and `Name:Contract`.
pub fn parse_artifact_name(reference: &str) -> (String, String) {
    let (file, contract) = match reference.split_once(':') {
        Some((file, contract)) => (file, contract.to_string()),
        None => (reference, reference.trim_end_matches(".sol").to_string()),
    };
    let file = if file.ends_with(".sol") { file.to_string() } else { format!("{file}.sol") };
    (file, contract)
}

/// Read access to a Foundry `forge-artifacts` directory.
///
/// Artifacts live at `<root>/<Name>.sol/<Contract>.json`. Parsed artifacts are memoized, and
/// additional in-memory artifacts can be registered with [`ArtifactsFs::insert`].
#[derive(Debug, Clone, Default)]
pub struct ArtifactsFs {
    root: Option<PathBuf>,
    cache: HashMap<(String, String), Arc<Artifact>>,
}

impl ArtifactsFs {
    /// Opens the artifact directory at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()), cache: HashMap::new() }
    }

    /// An artifact store without a backing directory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// The backing directory, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Registers an artifact under `(name, contract)`, shadowing any file on disk.
    pub fn insert(&mut self, name: &str, contract: &str, artifact: Artifact) {
        let (name, _) = parse_artifact_name(name);
        self.cache.insert((name, contract.to_string()), Arc::new(artifact));
    }

    /// Reads the artifact of `contract` compiled from the source file `name`.
    pub fn read_artifact(&mut self, name: &str, contract: &str) -> Result<Arc<Artifact>> {
        let (name, _) = parse_artifact_name(name);
        let key = (name, contract.to_string());
        if let Some(artifact) = self.cache.get(&key) {
            return Ok(artifact.clone());
        }

        let missing =
            || ScriptError::ArtifactMissing { name: key.0.clone(), contract: key.1.clone() };
        let root = self.root.as_ref().ok_or_else(missing)?;
        let path = root.join(&key.0).join(format!("{}.json", key.1));
        trace!(path = %path.display(), "Reading artifact");
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(missing()),
            Err(err) => return Err(err.into()),
        };
        let artifact = Arc::new(
            Artifact::from_json(&data)
                .map_err(|err| ScriptError::Artifact(format!("{}: {err}", path.display())))?,
        );
        self.cache.insert(key, artifact.clone());
        Ok(artifact)
    }

    /// Reads an artifact by reference, see [`parse_artifact_name`].
    pub fn lookup(&mut self, reference: &str) -> Result<Arc<Artifact>> {
        let (name, contract) = parse_artifact_name(reference);
        self.read_artifact(&name, &contract)
    }
}
