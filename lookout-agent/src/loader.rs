//! Rule list documents on disk.

use std::path::Path;

use lookout_core::RuleListDoc;
use tracing::{info, warn};

use crate::error::{AgentError, Result};

/// Read and parse one rule list document.
pub async fn read_list(path: &Path) -> Result<RuleListDoc> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|source| AgentError::RuleList {
        path: path.to_path_buf(),
        source,
    })
}

/// Read every list that can be read. A broken file is logged and skipped.
pub async fn read_lists(paths: &[impl AsRef<Path>]) -> Vec<RuleListDoc> {
    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        match read_list(path).await {
            Ok(doc) => {
                info!(path = %path.display(), list = %doc.name, "read rule list");
                docs.push(doc);
            }
            Err(err) => warn!(path = %path.display(), error = %err, "skipping rule list"),
        }
    }
    docs
}

/// Write the local marks list back to disk.
pub async fn write_list(path: &Path, doc: &RuleListDoc) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(doc).map_err(|source| AgentError::RuleList {
        path: path.to_path_buf(),
        source,
    })?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
