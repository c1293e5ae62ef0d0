//! Seed list loading

use crate::{Result, UmbraError};
use std::path::Path;

/// Parses a newline-delimited seed list
///
/// Blank lines and lines starting with `#` are ignored; surrounding
/// whitespace is trimmed. Order is preserved.
pub fn parse_seeds(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Loads the seed list at `path`
///
/// # Returns
///
/// * `Ok(Vec<String>)` - The seed URLs in file order
/// * `Err(UmbraError::SeedsMissing)` - The file doesn't exist
/// * `Err(UmbraError::SeedsEmpty)` - The file has no usable lines
pub fn load_seeds(path: &Path) -> Result<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(UmbraError::SeedsMissing(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let seeds = parse_seeds(&content);
    if seeds.is_empty() {
        return Err(UmbraError::SeedsEmpty(path.display().to_string()));
    }

    tracing::debug!(count = seeds.len(), path = %path.display(), "Loaded seeds");
    Ok(seeds)
}
