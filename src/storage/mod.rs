//! Storage module for persisting crawl output
//!
//! This module handles everything the crawler writes, including:
//! - Site bookkeeping (status, crawl counts, last error)
//! - Page rows keyed by URL and content hash
//! - Media metadata deduplicated by source URL
//! - Content-addressed blob storage for page text and media bytes

mod content;
mod schema;
mod sqlite;
mod traits;

pub use content::{media_path, page_path, FsContentStore};
pub use sqlite::SqliteRepository;
pub use traits::{ContentStore, SiteRepository, StorageError, StorageResult};

use crate::url::NetworkType;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Crawl status of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SiteStatus {
    /// Known but never crawled successfully
    Pending,
    /// Last crawl fetched at least one page
    Active,
    /// Last crawl fetched nothing
    Error,
}

impl SiteStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Represents a site in the database
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub network: NetworkType,
    pub status: SiteStatus,
    pub last_crawled: Option<DateTime<Utc>>,
    pub crawl_count: u32,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SiteRecord {
    /// Returns true if the site was crawled less than `window` before `now`
    pub fn crawled_within(&self, window: std::time::Duration, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_crawled else {
            return false;
        };
        match chrono::Duration::from_std(window) {
            Ok(window) => now.signed_duration_since(last) < window,
            Err(_) => true,
        }
    }
}

/// A fetched page with changed content
#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
    pub site_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub content_hash: String,
    pub storage_path: String,
    pub status_code: u16,
    pub response_time_ms: u64,
}

/// Represents a page row in the database
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub id: i64,
    pub site_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub content_hash: String,
    pub storage_path: String,
    pub status_code: u16,
    pub crawled_at: DateTime<Utc>,
    pub response_time_ms: u64,
}

/// A validated media download
#[derive(Debug, Clone, PartialEq)]
pub struct NewMedia {
    pub page_id: i64,
    pub url: String,
    pub file_type: String,
    pub file_hash: String,
    pub storage_path: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
}

/// Represents a media file in the database
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub id: i64,
    pub page_id: i64,
    pub url: String,
    pub file_type: String,
    pub file_hash: String,
    pub storage_path: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts across the repository
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryStats {
    pub sites_by_network: BTreeMap<NetworkType, u64>,
    pub sites_by_status: BTreeMap<SiteStatus, u64>,
    pub total_pages: u64,
    pub distinct_contents: u64,
    pub total_media: u64,
    pub media_bytes: u64,
}
