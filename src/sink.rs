//! Artifact delivery
//!
//! Once a job's result has been fetched the runner hands it to an
//! [`ArtifactSink`]. [`DirectorySink`] saves it to disk, which is what a
//! browser-style "save file" does for a human user.

use crate::config::{FileCollisionAction, OutputConfig};
use crate::error::{Error, Result};
use crate::types::Artifact;
use crate::utils::{get_unique_path, sanitize_filename};
use async_trait::async_trait;
use std::path::PathBuf;

/// Receiver of finished artifacts
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Take ownership of the artifact's contents
    ///
    /// Returns where the artifact ended up, for logging and display.
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf>;
}

/// Writes artifacts into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    collision: FileCollisionAction,
}

impl DirectorySink {
    /// Save into `dir`, resolving name clashes with `collision`
    pub fn new(dir: impl Into<PathBuf>, collision: FileCollisionAction) -> Self {
        Self {
            dir: dir.into(),
            collision,
        }
    }

    /// Sink matching the output settings
    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.download_dir.clone(), config.file_collision)
    }

    /// Target directory
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf> {
        let name = sanitize_filename(&artifact.filename).ok_or_else(|| Error::Delivery {
            path: self.dir.join(&artifact.filename),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "artifact has no usable filename",
            ),
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Delivery {
                path: self.dir.clone(),
                source: e,
            })?;

        let target = get_unique_path(&self.dir.join(&name), self.collision)?;

        // The final name only ever holds a complete file
        let partial = target.with_file_name(format!(".{}.part", name));
        tokio::fs::write(&partial, &artifact.bytes)
            .await
            .map_err(|e| Error::Delivery {
                path: partial.clone(),
                source: e,
            })?;
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            tokio::fs::remove_file(&partial).await.ok();
            return Err(Error::Delivery {
                path: target,
                source: e,
            });
        }

        tracing::info!(
            path = %target.display(),
            bytes = artifact.bytes.len(),
            "artifact saved"
        );
        Ok(target)
    }
}
