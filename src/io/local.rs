use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use super::MaskSource;
use crate::error::IoError;

/// Filesystem-backed mask source.
///
/// With a root directory, locators are resolved relative to it (a leading
/// `/` is treated as the root) and may not escape it with `..`. Without a
/// root, locators are used as plain paths. Query strings such as `?t=...`
/// cache busters are ignored on the filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalMaskSource {
    root: Option<PathBuf>,
}

impl LocalMaskSource {
    /// Source that reads locators as plain paths.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Source confined to `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Map a locator to a filesystem path.
    pub fn resolve(&self, locator: &str) -> Result<PathBuf, IoError> {
        let raw = if locator.starts_with("file://") {
            Url::parse(locator)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| IoError::InvalidLocator {
                    locator: locator.to_string(),
                    reason: "malformed file URL".to_string(),
                })?
        } else {
            let without_query = locator.split('?').next().unwrap_or(locator);
            PathBuf::from(without_query)
        };

        let Some(root) = &self.root else {
            return Ok(raw);
        };

        let mut resolved = root.clone();
        for component in raw.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    return Err(IoError::InvalidLocator {
                        locator: locator.to_string(),
                        reason: "path escapes the mask root".to_string(),
                    })
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl MaskSource for LocalMaskSource {
    async fn fetch(&self, locator: &str) -> Result<Bytes, IoError> {
        let path = self.resolve(locator)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(IoError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(IoError::Filesystem(format!("{}: {}", path.display(), e))),
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
