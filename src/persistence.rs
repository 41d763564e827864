//! Model artifact on disk
//!
//! The artifact is a single bincode blob: a format tag, the feature schema
//! version and the fitted forest. Loading rejects anything else as corrupt.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AnomalyError, Result};
use crate::features::FEATURE_SCHEMA_VERSION;
use crate::isolation_forest::IsolationForest;

const ARTIFACT_FORMAT: &str = "transaction-anomaly/isolation-forest";

#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    format: String,
    schema_version: u32,
    model: IsolationForest,
}

/// Writes `model` to `path`, creating parent directories and replacing any existing file.
pub fn save<P: AsRef<Path>>(model: &IsolationForest, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let artifact = ModelArtifact {
        format: ARTIFACT_FORMAT.to_string(),
        schema_version: FEATURE_SCHEMA_VERSION,
        model: model.clone(),
    };
    let bytes = bincode::serialize(&artifact)
        .map_err(|e| AnomalyError::ModelCorrupt(format!("failed to serialize: {}", e)))?;

    let mut file = File::create(path)?;
    file.write_all(&bytes)?;

    info!(path = %path.display(), bytes = bytes.len(), "Model saved");
    Ok(())
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<IsolationForest> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AnomalyError::ModelNotFound(path.to_path_buf()));
    }

    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let artifact: ModelArtifact = bincode::deserialize(&bytes)
        .map_err(|e| AnomalyError::ModelCorrupt(format!("{}: {}", path.display(), e)))?;
    if artifact.format != ARTIFACT_FORMAT {
        return Err(AnomalyError::ModelCorrupt(format!(
            "unexpected artifact format '{}'",
            artifact.format
        )));
    }
    if artifact.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(AnomalyError::ModelCorrupt(format!(
            "feature schema v{} does not match v{}",
            artifact.schema_version, FEATURE_SCHEMA_VERSION
        )));
    }

    info!(path = %path.display(), trees = artifact.model.n_trees(), "Model loaded");
    Ok(artifact.model)
}
