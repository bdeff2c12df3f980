use std::path::Path;

use crate::error::{DgrepError, Result};

/// Parse a worker list: one address per line, in order, used verbatim.
pub fn parse_workers(contents: &str) -> Vec<String> {
    contents.lines().map(str::to_string).collect()
}

/// Load the worker list from a servers file.
///
/// # Errors
///
/// Returns [`DgrepError::WorkerList`] if the file cannot be read. Callers
/// skip the dispatch entirely in that case.
pub async fn load_workers(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DgrepError::WorkerList {
            path: path.to_path_buf(),
            source,
        })?;

    let workers = parse_workers(&contents);
    tracing::debug!(path = %path.display(), workers = workers.len(), "Loaded worker list");
    Ok(workers)
}
