//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the SiteRepository trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{SiteRepository, StorageError, StorageResult};
use crate::storage::{
    MediaRecord, NewMedia, NewPage, PageRecord, RepositoryStats, SiteRecord, SiteStatus,
};
use crate::url::NetworkType;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SITE_COLUMNS: &str = "id, url, domain, network_type, status, last_crawled, crawl_count,
     error_count, last_error, created_at";

const PAGE_COLUMNS: &str = "id, site_id, url, title, content_hash, storage_path, status_code,
     crawled_at, response_time_ms";

const MEDIA_COLUMNS: &str = "id, page_id, url, file_type, file_hash, storage_path, size_bytes,
     width, height, created_at";

/// SQLite storage backend
///
/// One connection behind a mutex; every call holds the lock only for the
/// duration of its statement.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }

    fn site_by_id(conn: &Connection, id: i64) -> StorageResult<SiteRecord> {
        conn.query_row(
            &format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS),
            params![id],
            site_from_row,
        )
        .optional()?
        .ok_or_else(|| StorageError::SiteNotFound(format!("Site ID {}", id)))
    }
}

fn parse_time(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_time(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_time(idx, v)).transpose()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    let network: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(SiteRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        network: network
            .parse::<NetworkType>()
            .map_err(|e| conversion_error(3, e))?,
        status: SiteStatus::from_db_string(&status)
            .ok_or_else(|| conversion_error(4, format!("unknown site status '{}'", status)))?,
        last_crawled: parse_optional_time(5, row.get(5)?)?,
        crawl_count: row.get(6)?,
        error_count: row.get(7)?,
        last_error: row.get(8)?,
        created_at: parse_time(9, row.get(9)?)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        content_hash: row.get(4)?,
        storage_path: row.get(5)?,
        status_code: row.get(6)?,
        crawled_at: parse_time(7, row.get(7)?)?,
        response_time_ms: row.get::<_, i64>(8)?.max(0) as u64,
    })
}

fn media_from_row(row: &Row<'_>) -> rusqlite::Result<MediaRecord> {
    Ok(MediaRecord {
        id: row.get(0)?,
        page_id: row.get(1)?,
        url: row.get(2)?,
        file_type: row.get(3)?,
        file_hash: row.get(4)?,
        storage_path: row.get(5)?,
        size_bytes: row.get::<_, i64>(6)?.max(0) as u64,
        width: row.get(7)?,
        height: row.get(8)?,
        created_at: parse_time(9, row.get(9)?)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl SiteRepository for SqliteRepository {
    fn find_site_by_url(&self, url: &str) -> StorageResult<Option<SiteRecord>> {
        let conn = self.conn()?;
        let site = conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE url = ?1", SITE_COLUMNS),
                params![url],
                site_from_row,
            )
            .optional()?;
        Ok(site)
    }

    fn create_site(
        &self,
        url: &str,
        domain: &str,
        network: NetworkType,
    ) -> StorageResult<SiteRecord> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO sites (url, domain, network_type, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                url,
                domain,
                network.as_str(),
                SiteStatus::Pending.to_db_string(),
                now
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StorageError::ConstraintViolation(format!("site {} already exists", url))
            } else {
                StorageError::Sqlite(e)
            }
        })?;

        Self::site_by_id(&conn, conn.last_insert_rowid())
    }

    fn update_site(&self, site: &SiteRecord) -> StorageResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sites SET status = ?1, last_crawled = ?2, crawl_count = ?3,
             error_count = ?4, last_error = ?5 WHERE id = ?6",
            params![
                site.status.to_db_string(),
                site.last_crawled.map(|t| t.to_rfc3339()),
                site.crawl_count,
                site.error_count,
                site.last_error,
                site.id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::SiteNotFound(site.url.clone()));
        }
        Ok(())
    }

    fn list_sites_by_network(
        &self,
        network: NetworkType,
        status: Option<SiteStatus>,
    ) -> StorageResult<Vec<SiteRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sites WHERE network_type = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY id",
            SITE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sites = stmt
            .query_map(
                params![network.as_str(), status.map(|s| s.to_db_string())],
                site_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    fn create_page(&self, page: &NewPage) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pages (site_id, url, title, content_hash, storage_path, status_code,
             crawled_at, response_time_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                page.site_id,
                page.url,
                page.title,
                page.content_hash,
                page.storage_path,
                page.status_code,
                Utc::now().to_rfc3339(),
                page.response_time_ms as i64
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn find_pages_by_site_and_hash(
        &self,
        site_id: i64,
        content_hash: &str,
    ) -> StorageResult<Vec<PageRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM pages WHERE site_id = ?1 AND content_hash = ?2 ORDER BY id",
            PAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let pages = stmt
            .query_map(params![site_id, content_hash], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    fn find_media_by_url(&self, url: &str) -> StorageResult<Option<MediaRecord>> {
        let conn = self.conn()?;
        let media = conn
            .query_row(
                &format!("SELECT {} FROM media_files WHERE url = ?1", MEDIA_COLUMNS),
                params![url],
                media_from_row,
            )
            .optional()?;
        Ok(media)
    }

    fn create_media(&self, media: &NewMedia) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO media_files (page_id, url, file_type, file_hash, storage_path,
             size_bytes, width, height, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                media.page_id,
                media.url,
                media.file_type,
                media.file_hash,
                media.storage_path,
                media.size_bytes as i64,
                media.width,
                media.height,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StorageError::ConstraintViolation(format!("media {} already exists", media.url))
            } else {
                StorageError::Sqlite(e)
            }
        })?;
        Ok(conn.last_insert_rowid())
    }

    fn statistics(&self) -> StorageResult<RepositoryStats> {
        let conn = self.conn()?;
        let mut stats = RepositoryStats::default();

        let mut stmt =
            conn.prepare("SELECT network_type, status, COUNT(*) FROM sites GROUP BY 1, 2")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (network, status, count) = row?;
            let count = count.max(0) as u64;
            if let Ok(network) = network.parse::<NetworkType>() {
                *stats.sites_by_network.entry(network).or_default() += count;
            }
            if let Some(status) = SiteStatus::from_db_string(&status) {
                *stats.sites_by_status.entry(status).or_default() += count;
            }
        }

        let (pages, contents): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT content_hash) FROM pages",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.total_pages = pages.max(0) as u64;
        stats.distinct_contents = contents.max(0) as u64;

        let (media, bytes): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM media_files",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.total_media = media.max(0) as u64;
        stats.media_bytes = bytes.max(0) as u64;

        Ok(stats)
    }

    fn health_check(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
