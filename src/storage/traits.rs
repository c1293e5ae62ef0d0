//! Storage traits and error types
//!
//! This module defines the collaborator interfaces the crawler persists
//! through: a repository for sites, pages and media metadata, and a
//! content-addressed blob store for the payloads themselves.

use crate::storage::{
    MediaRecord, NewMedia, NewPage, PageRecord, RepositoryStats, SiteRecord, SiteStatus,
};
use crate::url::NetworkType;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid content path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// Returns true for connectivity-style failures worth retrying.
    /// Logical errors (constraints, missing rows, bad paths) are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Repository of sites, pages and media metadata
///
/// Implementations must be safe to share between crawl workers. Calls are
/// short and synchronous; the crawler wraps them in its retry policy.
pub trait SiteRepository: Send + Sync {
    /// Gets a site by its normalized URL
    fn find_site_by_url(&self, url: &str) -> StorageResult<Option<SiteRecord>>;

    /// Creates a pending site. Fails with `ConstraintViolation` if the URL exists.
    fn create_site(&self, url: &str, domain: &str, network: NetworkType)
        -> StorageResult<SiteRecord>;

    /// Persists the mutable crawl bookkeeping of a site
    fn update_site(&self, site: &SiteRecord) -> StorageResult<()>;

    /// Lists sites of one network, optionally filtered by status
    fn list_sites_by_network(
        &self,
        network: NetworkType,
        status: Option<SiteStatus>,
    ) -> StorageResult<Vec<SiteRecord>>;

    /// Records a fetched page and returns its ID
    fn create_page(&self, page: &NewPage) -> StorageResult<i64>;

    /// Gets all page rows of a site carrying the given content hash
    fn find_pages_by_site_and_hash(
        &self,
        site_id: i64,
        content_hash: &str,
    ) -> StorageResult<Vec<PageRecord>>;

    /// Gets a media file by its source URL
    fn find_media_by_url(&self, url: &str) -> StorageResult<Option<MediaRecord>>;

    /// Records a validated media file and returns its ID
    fn create_media(&self, media: &NewMedia) -> StorageResult<i64>;

    /// Aggregates for reporting
    fn statistics(&self) -> StorageResult<RepositoryStats>;

    /// Verifies the backing store answers queries
    fn health_check(&self) -> StorageResult<()>;
}

/// Content-addressed blob store
///
/// Paths are deterministic functions of the content hash, so storing the
/// same bytes twice targets the same path.
pub trait ContentStore: Send + Sync {
    /// Returns true if an object already exists at `path`
    fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Writes `bytes` to `path` and returns the locator to read it back
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> StorageResult<String>;

    /// Reads an object back by locator
    fn get(&self, locator: &str) -> StorageResult<Vec<u8>>;
}
