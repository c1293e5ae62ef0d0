//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Umbra database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawlable site, created on first reference
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    network_type TEXT NOT NULL,
    status TEXT NOT NULL,
    last_crawled TEXT,
    crawl_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sites_network ON sites(network_type, status);

-- One row per fetch whose content changed; rows accumulate over time
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL REFERENCES sites(id),
    url TEXT NOT NULL,
    title TEXT,
    content_hash TEXT NOT NULL,
    storage_path TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    crawled_at TEXT NOT NULL,
    response_time_ms INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pages_site_hash ON pages(site_id, content_hash);
CREATE INDEX IF NOT EXISTS idx_pages_url ON pages(url);

-- Validated media downloads, deduplicated by source URL
CREATE TABLE IF NOT EXISTS media_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    url TEXT NOT NULL UNIQUE,
    file_type TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    storage_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_media_hash ON media_files(file_hash);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
