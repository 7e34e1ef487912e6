//! Input validation for queries and data files.

use crate::domain::errors::{DomainResult, OrchestratorError};

/// Data file extensions the analysis agents can work with.
pub const ALLOWED_EXTENSIONS: &[&str] = &["csv", "xlsx", "json", "parquet"];

/// Maximum accepted data file size in megabytes.
pub const MAX_FILE_SIZE_MB: u64 = 100;

const MIN_QUERY_LEN: usize = 10;
const MAX_QUERY_LEN: usize = 2000;

/// Validate a natural-language query before any scheduling starts.
pub fn validate_query(query: &str) -> DomainResult<()> {
    let trimmed = query.trim();

    if trimmed.is_empty() {
        return Err(OrchestratorError::InvalidQuery(
            "query cannot be empty".to_string(),
        ));
    }

    if trimmed.len() < MIN_QUERY_LEN {
        return Err(OrchestratorError::InvalidQuery(
            "query is too short, please provide more detail".to_string(),
        ));
    }

    if query.len() > MAX_QUERY_LEN {
        return Err(OrchestratorError::InvalidQuery(format!(
            "query is too long, please keep it under {MAX_QUERY_LEN} characters"
        )));
    }

    Ok(())
}

/// Validate a referenced data file by name and size.
pub fn validate_data_file(filename: &str, size_bytes: u64) -> DomainResult<()> {
    if filename.trim().is_empty() {
        return Err(OrchestratorError::InvalidQuery(
            "filename cannot be empty".to_string(),
        ));
    }

    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(OrchestratorError::InvalidQuery(format!(
            "file type '.{ext}' not allowed; allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    if size_bytes == 0 {
        return Err(OrchestratorError::InvalidQuery(
            "file is empty".to_string(),
        ));
    }

    let size_mb = size_bytes / (1024 * 1024);
    if size_mb > MAX_FILE_SIZE_MB {
        return Err(OrchestratorError::InvalidQuery(format!(
            "file too large ({size_mb}MB); maximum is {MAX_FILE_SIZE_MB}MB"
        )));
    }

    Ok(())
}
