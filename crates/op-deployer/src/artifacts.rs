//! Locating and fetching contract artifact bundles.

use std::{
    fmt,
    io::Read,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use flate2::read::GzDecoder;
use op_script::ArtifactsFs;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::{DeployerError, Result};

/// Directory of the Foundry artifacts inside a bundle.
pub const FORGE_ARTIFACTS_DIR: &str = "forge-artifacts";

/// Where an artifact bundle lives: a local directory or a gzipped tarball served over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArtifactsLocator {
    /// A `file://` URL of a local directory.
    File(PathBuf),
    /// An `http://` or `https://` URL of a `.tar.gz` bundle.
    Remote(String),
}

impl FromStr for ArtifactsLocator {
    type Err = DeployerError;

    fn from_str(url: &str) -> Result<Self> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(Self::File(path.into()));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(Self::Remote(url.to_string()));
        }
        Err(DeployerError::ArtifactBundleFetch(format!("unsupported artifacts URL {url}")))
    }
}

impl fmt::Display for ArtifactsLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file://{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

impl TryFrom<String> for ArtifactsLocator {
    type Error = DeployerError;

    fn try_from(url: String) -> Result<Self> {
        url.parse()
    }
}

impl From<ArtifactsLocator> for String {
    fn from(locator: ArtifactsLocator) -> Self {
        locator.to_string()
    }
}

/// A fetched artifact bundle. Downloaded bundles are removed when this is dropped.
#[derive(Debug)]
pub struct ArtifactsBundle {
    root: PathBuf,
    _download: Option<TempDir>,
}

impl ArtifactsBundle {
    /// The directory holding the `<Name>.sol/<Contract>.json` files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A fresh artifact store over the bundle.
    pub fn fs(&self) -> ArtifactsFs {
        ArtifactsFs::new(&self.root)
    }
}

/// Fetches the bundle at `locator`. Local directories are used in place.
pub async fn download_artifacts(locator: &ArtifactsLocator) -> Result<ArtifactsBundle> {
    match locator {
        ArtifactsLocator::File(path) => {
            if !path.is_dir() {
                return Err(DeployerError::ArtifactBundleFetch(format!(
                    "{} is not a directory",
                    path.display()
                )));
            }
            Ok(ArtifactsBundle { root: artifacts_root(path), _download: None })
        }
        ArtifactsLocator::Remote(url) => {
            info!(%url, "Downloading artifacts");
            let fetch_err =
                |err: reqwest::Error| DeployerError::ArtifactBundleFetch(err.to_string());
            let response = reqwest::get(url).await.map_err(fetch_err)?;
            let response = response.error_for_status().map_err(fetch_err)?;
            let data = response.bytes().await.map_err(fetch_err)?;
            info!(bytes = data.len(), "Downloaded artifacts");

            let dir = tempfile::Builder::new().prefix("op-deployer-artifacts-").tempdir()?;
            let dest = dir.path().to_path_buf();
            tokio::task::spawn_blocking(move || untar(data.as_ref(), &dest))
                .await
                .map_err(|err| DeployerError::ArtifactBundleFetch(err.to_string()))??;
            Ok(ArtifactsBundle { root: artifacts_root(dir.path()), _download: Some(dir) })
        }
    }
}

fn artifacts_root(path: &Path) -> PathBuf {
    let nested = path.join(FORGE_ARTIFACTS_DIR);
    if nested.is_dir() {
        nested
    } else {
        path.to_path_buf()
    }
}

/// Unpacks a gzipped tarball into `dest`, rejecting entries that escape it.
pub fn untar(data: impl Read, dest: &Path) -> Result<()> {
    let bundle_err = |err: std::io::Error| DeployerError::ArtifactBundleFetch(err.to_string());
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    for entry in archive.entries().map_err(bundle_err)? {
        let mut entry = entry.map_err(bundle_err)?;
        let path = entry.path().map_err(bundle_err)?.into_owned();
        if path.components().any(|component| {
            matches!(component, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        }) {
            return Err(DeployerError::ArtifactBundleFetch(format!(
                "invalid file path in bundle: {}",
                path.display()
            )));
        }
        let target = dest.join(&path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "Extracting artifact");
        entry.unpack(&target).map_err(bundle_err)?;
    }
    Ok(())
}
