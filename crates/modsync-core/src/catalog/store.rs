//! SQLite-backed catalog store.
//!
//! One table holds every cached portal item keyed by `(section, id)`, a second
//! holds per-section sync bookkeeping. Writes for a page happen in a single
//! transaction, so concurrent readers see either the whole page or none of it.

use crate::catalog::types::{
    CatalogQuery, CatalogRecord, CategorySummary, QueryResult, Section, SectionCount, SortKey,
};
use crate::sync::{SyncPhase, SyncState};
use crate::{ModSyncError, Result};
use rusqlite::types::Type;
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::debug;

const RECORD_COLUMNS: &str = "section, id, name, category_id, category_name, submitter_id, \
     submitter_name, like_count, view_count, download_count, date_added, date_modified, \
     has_files, nsfw, thumbnail_url, profile_url, cached_at";

const UPSERT_SQL: &str = "
    INSERT INTO catalog_mods (section, id, name, category_id, category_name, submitter_id,
                              submitter_name, like_count, view_count, download_count,
                              date_added, date_modified, has_files, nsfw, nsfw_verified,
                              thumbnail_url, profile_url, content_hash, cached_at)
    VALUES (:section, :id, :name, :category_id, :category_name, :submitter_id,
            :submitter_name, :like_count, :view_count, :download_count,
            :date_added, :date_modified, :has_files, :nsfw, 0,
            :thumbnail_url, :profile_url, :content_hash, :cached_at)
    ON CONFLICT(section, id) DO UPDATE SET
        name = excluded.name,
        category_id = excluded.category_id,
        category_name = excluded.category_name,
        submitter_id = excluded.submitter_id,
        submitter_name = excluded.submitter_name,
        like_count = excluded.like_count,
        view_count = excluded.view_count,
        download_count = COALESCE(excluded.download_count, catalog_mods.download_count),
        date_added = excluded.date_added,
        date_modified = excluded.date_modified,
        has_files = excluded.has_files,
        nsfw = CASE WHEN catalog_mods.nsfw_verified = 1
                    THEN catalog_mods.nsfw ELSE excluded.nsfw END,
        thumbnail_url = excluded.thumbnail_url,
        profile_url = excluded.profile_url,
        cached_at = CASE WHEN catalog_mods.content_hash = excluded.content_hash
                         THEN catalog_mods.cached_at ELSE excluded.cached_at END,
        content_hash = excluded.content_hash";

/// Persistent, queryable cache of portal items.
pub struct CatalogStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl CatalogStore {
    /// Create or open a catalog at the given path.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ModSyncError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        debug!("Opened catalog store at {}", db_path.display());

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=30000;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS catalog_mods (
                section TEXT NOT NULL,
                id INTEGER NOT NULL,
                name TEXT NOT NULL,
                category_id INTEGER,
                category_name TEXT,
                submitter_id INTEGER,
                submitter_name TEXT,
                like_count INTEGER NOT NULL DEFAULT 0,
                view_count INTEGER NOT NULL DEFAULT 0,
                download_count INTEGER,
                date_added INTEGER NOT NULL,
                date_modified INTEGER NOT NULL,
                has_files INTEGER NOT NULL DEFAULT 0,
                nsfw INTEGER,
                nsfw_verified INTEGER NOT NULL DEFAULT 0,
                thumbnail_url TEXT,
                profile_url TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY (section, id)
            );

            CREATE INDEX IF NOT EXISTS idx_catalog_category
                ON catalog_mods(section, category_id);
            CREATE INDEX IF NOT EXISTS idx_catalog_likes
                ON catalog_mods(section, like_count DESC);
            CREATE INDEX IF NOT EXISTS idx_catalog_added
                ON catalog_mods(section, date_added DESC);

            CREATE TABLE IF NOT EXISTS sync_state (
                section TEXT PRIMARY KEY,
                last_sync INTEGER,
                total_count INTEGER NOT NULL DEFAULT 0,
                phase TEXT NOT NULL DEFAULT 'idle',
                current_page INTEGER NOT NULL DEFAULT 0,
                total_pages INTEGER NOT NULL DEFAULT 0,
                error TEXT
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ModSyncError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Insert or update records in one transaction.
    ///
    /// Re-inserting an existing `(section, id)` updates it in place. A detail-
    /// verified NSFW flag and a known download count survive list upserts, and
    /// `cached_at` only moves when the listed content actually changed.
    pub fn upsert(&self, records: &[CatalogRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for record in records {
                stmt.execute(named_params! {
                    ":section": record.section.as_str(),
                    ":id": record.id as i64,
                    ":name": record.name,
                    ":category_id": record.category_id.map(|v| v as i64),
                    ":category_name": record.category_name,
                    ":submitter_id": record.submitter_id.map(|v| v as i64),
                    ":submitter_name": record.submitter_name,
                    ":like_count": record.like_count as i64,
                    ":view_count": record.view_count as i64,
                    ":download_count": record.download_count.map(|v| v as i64),
                    ":date_added": record.date_added,
                    ":date_modified": record.date_modified,
                    ":has_files": record.has_files,
                    ":nsfw": record.nsfw,
                    ":thumbnail_url": record.thumbnail_url,
                    ":profile_url": record.profile_url,
                    ":content_hash": record.content_hash(),
                    ":cached_at": record.cached_at,
                })?;
            }
        }
        tx.commit()?;

        debug!("Upserted {} catalog records", records.len());
        Ok(records.len())
    }

    /// Get one record.
    pub fn get(&self, section: Section, id: u64) -> Result<Option<CatalogRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM catalog_mods WHERE section = ?1 AND id = ?2",
            RECORD_COLUMNS
        );
        let record = conn
            .query_row(&sql, params![section.as_str(), id as i64], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Filtered, sorted, paginated query.
    pub fn query(&self, query: &CatalogQuery) -> Result<QueryResult> {
        let start = Instant::now();
        let conn = self.lock()?;

        let mut where_clause = String::from("WHERE 1=1");
        let mut where_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(section) = query.section {
            where_clause.push_str(" AND section = ?");
            where_params.push(Box::new(section.as_str()));
        }
        if let Some(category_id) = query.category_id {
            where_clause.push_str(" AND category_id = ?");
            where_params.push(Box::new(category_id as i64));
        }
        if query.hide_nsfw {
            where_clause.push_str(" AND (nsfw IS NULL OR nsfw = 0)");
        }
        let term = query.text_term();
        if let Some(term) = term {
            where_clause.push_str(" AND name LIKE ? ESCAPE '\\'");
            where_params.push(Box::new(format!("%{}%", escape_like(term))));
        }

        let total_count: usize = {
            let count_sql = format!("SELECT COUNT(*) FROM catalog_mods {}", where_clause);
            let refs: Vec<&dyn rusqlite::ToSql> = where_params.iter().map(|p| p.as_ref()).collect();
            let count: i64 = conn.query_row(&count_sql, refs.as_slice(), |row| row.get(0))?;
            count as usize
        };

        let mut order_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let order_by = match (query.sort, term) {
            (SortKey::Relevance, Some(term)) => {
                order_params.push(Box::new(term.to_string()));
                order_params.push(Box::new(format!("{}%", escape_like(term))));
                "CASE WHEN name = ? COLLATE NOCASE THEN 0 \
                      WHEN name LIKE ? ESCAPE '\\' THEN 1 ELSE 2 END, \
                 like_count DESC, id ASC"
            }
            (SortKey::Relevance, None) | (SortKey::Likes, _) => "like_count DESC, id ASC",
            (SortKey::DateAdded, _) => "date_added DESC, id DESC",
            (SortKey::DateModified, _) => "date_modified DESC, id DESC",
            (SortKey::Views, _) => "view_count DESC, id ASC",
            (SortKey::Name, _) => "name COLLATE NOCASE ASC, id ASC",
        };

        let sql = format!(
            "SELECT {} FROM catalog_mods {} ORDER BY {}, section ASC LIMIT {} OFFSET {}",
            RECORD_COLUMNS, where_clause, order_by, query.limit, query.offset
        );

        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = where_params
            .iter()
            .chain(order_params.iter())
            .map(|p| p.as_ref())
            .collect();
        let mods = stmt
            .query_map(refs.as_slice(), row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(QueryResult {
            mods,
            total_count,
            offset: query.offset,
            limit: query.limit,
            query_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Number of cached rows in a section, or in the whole catalog for `None`.
    pub fn count_by_section(&self, section: Option<Section>) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = match section {
            Some(section) => conn.query_row(
                "SELECT COUNT(*) FROM catalog_mods WHERE section = ?1",
                params![section.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM catalog_mods", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    /// Row counts for every known section, zero-filled.
    pub fn section_counts(&self) -> Result<Vec<SectionCount>> {
        Section::ALL
            .iter()
            .map(|&section| {
                Ok(SectionCount {
                    section,
                    count: self.count_by_section(Some(section))?,
                })
            })
            .collect()
    }

    /// Categories observed on cached rows of a section, most populated first.
    pub fn categories(&self, section: Section) -> Result<Vec<CategorySummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT category_id, MAX(category_name), COUNT(*) FROM catalog_mods
             WHERE section = ?1 AND category_id IS NOT NULL
             GROUP BY category_id
             ORDER BY COUNT(*) DESC, category_id ASC",
        )?;
        let rows = stmt.query_map(params![section.as_str()], |row| {
            let id: i64 = row.get(0)?;
            let name: Option<String> = row.get(1)?;
            let count: i64 = row.get(2)?;
            Ok(CategorySummary {
                id: id as u64,
                name: name.unwrap_or_else(|| format!("Category {}", id)),
                item_count: count as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Apply authoritative values from a detail lookup.
    ///
    /// A given NSFW flag overwrites whatever the list pages said and is kept
    /// across later list upserts. Returns `false` when the row is not cached.
    pub fn apply_enrichment(
        &self,
        section: Section,
        id: u64,
        nsfw: Option<bool>,
        download_count: Option<u64>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE catalog_mods SET
                 nsfw = CASE WHEN ?3 IS NULL THEN nsfw ELSE ?3 END,
                 nsfw_verified = CASE WHEN ?3 IS NULL THEN nsfw_verified ELSE 1 END,
                 download_count = COALESCE(?4, download_count)
             WHERE section = ?1 AND id = ?2",
            params![
                section.as_str(),
                id as i64,
                nsfw,
                download_count.map(|v| v as i64)
            ],
        )?;

        if rows > 0 {
            debug!("Enriched {}/{} (nsfw={:?})", section, id, nsfw);
        }
        Ok(rows > 0)
    }

    /// Delete every cached row and all sync bookkeeping.
    pub fn wipe(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM catalog_mods", [])?;
        tx.execute("DELETE FROM sync_state", [])?;
        tx.commit()?;
        debug!("Wiped catalog store");
        Ok(())
    }

    /// Persist a section's sync state.
    pub fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_state (section, last_sync, total_count, phase,
                                     current_page, total_pages, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(section) DO UPDATE SET
                 last_sync = excluded.last_sync,
                 total_count = excluded.total_count,
                 phase = excluded.phase,
                 current_page = excluded.current_page,
                 total_pages = excluded.total_pages,
                 error = excluded.error",
            params![
                state.section.as_str(),
                state.last_sync,
                state.total_count as i64,
                state.phase.as_str(),
                state.current_page,
                state.total_pages,
                state.error,
            ],
        )?;
        Ok(())
    }

    /// Load a section's sync state, if it ever synced.
    pub fn load_sync_state(&self, section: Section) -> Result<Option<SyncState>> {
        let conn = self.lock()?;
        let state = conn
            .query_row(
                "SELECT section, last_sync, total_count, phase, current_page, total_pages, error
                 FROM sync_state WHERE section = ?1",
                params![section.as_str()],
                row_to_sync_state,
            )
            .optional()?;
        Ok(state)
    }
}

fn parse_section(row: &Row, idx: usize) -> rusqlite::Result<Section> {
    let raw: String = row.get(idx)?;
    raw.parse::<Section>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row) -> rusqlite::Result<CatalogRecord> {
    Ok(CatalogRecord {
        section: parse_section(row, 0)?,
        id: row.get::<_, i64>(1)? as u64,
        name: row.get(2)?,
        category_id: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
        category_name: row.get(4)?,
        submitter_id: row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
        submitter_name: row.get(6)?,
        like_count: row.get::<_, i64>(7)? as u64,
        view_count: row.get::<_, i64>(8)? as u64,
        download_count: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
        date_added: row.get(10)?,
        date_modified: row.get(11)?,
        has_files: row.get(12)?,
        nsfw: row.get(13)?,
        thumbnail_url: row.get(14)?,
        profile_url: row.get(15)?,
        cached_at: row.get(16)?,
    })
}

fn row_to_sync_state(row: &Row) -> rusqlite::Result<SyncState> {
    let phase: String = row.get(3)?;
    Ok(SyncState {
        section: parse_section(row, 0)?,
        last_sync: row.get(1)?,
        total_count: row.get::<_, i64>(2)? as u64,
        phase: SyncPhase::parse(&phase),
        current_page: row.get(4)?,
        total_pages: row.get(5)?,
        error: row.get(6)?,
    })
}

/// Escape LIKE wildcards so user text matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> CatalogStore {
        CatalogStore::open_in_memory().unwrap()
    }

    fn record(section: Section, id: u64, name: &str, likes: u64) -> CatalogRecord {
        CatalogRecord {
            id,
            section,
            name: name.to_string(),
            category_id: Some(100 + id % 3),
            category_name: Some(format!("Cat {}", 100 + id % 3)),
            submitter_id: Some(7),
            submitter_name: Some("someone".into()),
            like_count: likes,
            view_count: likes * 10,
            download_count: None,
            date_added: 1_700_000_000 + id as i64,
            date_modified: 1_700_100_000 - id as i64,
            has_files: true,
            nsfw: None,
            thumbnail_url: None,
            profile_url: format!("https://gamebanana.com/mods/{}", id),
            cached_at: 1_700_200_000,
        }
    }

    #[test]
    fn test_upsert_is_idempotent_per_key() {
        let store = create_test_store();
        let r = record(Section::Mod, 1, "Neon Abrams", 5);
        store.upsert(&[r.clone()]).unwrap();
        store.upsert(&[r.clone()]).unwrap();
        assert_eq!(store.count_by_section(Some(Section::Mod)).unwrap(), 1);

        let mut changed = r.clone();
        changed.like_count = 9;
        store.upsert(&[changed]).unwrap();
        let fetched = store.get(Section::Mod, 1).unwrap().unwrap();
        assert_eq!(fetched.like_count, 9);
        assert_eq!(store.count_by_section(None).unwrap(), 1);
    }

    #[test]
    fn test_same_id_in_two_sections_is_two_rows() {
        let store = create_test_store();
        store
            .upsert(&[
                record(Section::Mod, 1, "Thing", 1),
                record(Section::Sound, 1, "Thing", 1),
            ])
            .unwrap();
        assert_eq!(store.count_by_section(Some(Section::Mod)).unwrap(), 1);
        assert_eq!(store.count_by_section(Some(Section::Sound)).unwrap(), 1);
        assert_eq!(store.count_by_section(None).unwrap(), 2);
    }

    #[test]
    fn test_cached_at_moves_only_on_change() {
        let store = create_test_store();
        let r = record(Section::Mod, 1, "Stable", 5);
        store.upsert(&[r.clone()]).unwrap();

        let mut redelivered = r.clone();
        redelivered.cached_at += 500;
        store.upsert(&[redelivered.clone()]).unwrap();
        assert_eq!(store.get(Section::Mod, 1).unwrap().unwrap().cached_at, r.cached_at);

        redelivered.name = "Stable v2".into();
        store.upsert(&[redelivered.clone()]).unwrap();
        assert_eq!(
            store.get(Section::Mod, 1).unwrap().unwrap().cached_at,
            redelivered.cached_at
        );
    }

    #[test]
    fn test_text_query_is_case_insensitive_substring() {
        let store = create_test_store();
        store
            .upsert(&[
                record(Section::Mod, 1, "Blue Haze Skin", 3),
                record(Section::Mod, 2, "haze", 1),
                record(Section::Mod, 3, "Crimson", 10),
                record(Section::Mod, 4, "Hazel Eyes", 2),
            ])
            .unwrap();

        let result = store
            .query(&CatalogQuery {
                text: Some("HAZE".into()),
                ..CatalogQuery::section(Section::Mod)
            })
            .unwrap();

        assert_eq!(result.total_count, 3);
        let ids: Vec<u64> = result.mods.iter().map(|m| m.id).collect();
        // exact, then prefix, then substring
        assert_eq!(ids, vec![2, 4, 1]);
    }

    #[test]
    fn test_like_wildcards_are_literal() {
        let store = create_test_store();
        store
            .upsert(&[
                record(Section::Mod, 1, "100% Better", 3),
                record(Section::Mod, 2, "1000 Better", 1),
            ])
            .unwrap();
        let result = store
            .query(&CatalogQuery {
                text: Some("100%".into()),
                ..CatalogQuery::section(Section::Mod)
            })
            .unwrap();
        assert_eq!(result.total_count, 1);
        assert_eq!(result.mods[0].id, 1);
    }

    #[test]
    fn test_relevance_without_text_falls_back_to_likes() {
        let store = create_test_store();
        store
            .upsert(&[
                record(Section::Mod, 1, "a", 3),
                record(Section::Mod, 2, "b", 30),
                record(Section::Mod, 3, "c", 3),
            ])
            .unwrap();
        let result = store.query(&CatalogQuery::section(Section::Mod)).unwrap();
        let ids: Vec<u64> = result.mods.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_sort_keys_and_pagination() {
        let store = create_test_store();
        let records: Vec<_> = (1..=10)
            .map(|i| record(Section::Mod, i, &format!("Mod {:02}", 11 - i), i))
            .collect();
        store.upsert(&records).unwrap();

        let by_name = store
            .query(&CatalogQuery {
                sort: SortKey::Name,
                limit: 3,
                offset: 0,
                ..CatalogQuery::section(Section::Mod)
            })
            .unwrap();
        assert_eq!(by_name.total_count, 10);
        assert_eq!(
            by_name.mods.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![10, 9, 8]
        );

        let by_added = store
            .query(&CatalogQuery {
                sort: SortKey::DateAdded,
                limit: 2,
                offset: 2,
                ..CatalogQuery::section(Section::Mod)
            })
            .unwrap();
        assert_eq!(
            by_added.mods.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![8, 7]
        );

        let by_modified = store
            .query(&CatalogQuery {
                sort: SortKey::DateModified,
                limit: 1,
                ..CatalogQuery::section(Section::Mod)
            })
            .unwrap();
        assert_eq!(by_modified.mods[0].id, 1);

        let by_views = store
            .query(&CatalogQuery {
                sort: SortKey::Views,
                limit: 1,
                ..CatalogQuery::section(Section::Mod)
            })
            .unwrap();
        assert_eq!(by_views.mods[0].id, 10);
    }

    #[test]
    fn test_category_filter_and_categories() {
        let store = create_test_store();
        let records: Vec<_> = (1..=6)
            .map(|i| record(Section::Sound, i, &format!("Sound {}", i), i))
            .collect();
        store.upsert(&records).unwrap();

        let result = store
            .query(&CatalogQuery {
                category_id: Some(101),
                ..CatalogQuery::section(Section::Sound)
            })
            .unwrap();
        assert_eq!(result.total_count, 2);
        assert!(result.mods.iter().all(|m| m.category_id == Some(101)));

        let categories = store.categories(Section::Sound).unwrap();
        assert_eq!(categories.len(), 3);
        assert_eq!(categories.iter().map(|c| c.item_count).sum::<usize>(), 6);
    }

    #[test]
    fn test_verified_nsfw_survives_list_upsert() {
        let store = create_test_store();
        let r = record(Section::Mod, 5, "Spicy", 1);
        store.upsert(&[r.clone()]).unwrap();
        assert_eq!(store.get(Section::Mod, 5).unwrap().unwrap().nsfw, None);

        assert!(store
            .apply_enrichment(Section::Mod, 5, Some(true), Some(42))
            .unwrap());
        store.upsert(&[r]).unwrap();

        let fetched = store.get(Section::Mod, 5).unwrap().unwrap();
        assert_eq!(fetched.nsfw, Some(true));
        assert_eq!(fetched.download_count, Some(42));

        let hidden = store
            .query(&CatalogQuery {
                hide_nsfw: true,
                ..CatalogQuery::section(Section::Mod)
            })
            .unwrap();
        assert_eq!(hidden.total_count, 0);
    }

    #[test]
    fn test_enrichment_of_uncached_row() {
        let store = create_test_store();
        assert!(!store
            .apply_enrichment(Section::Mod, 99, Some(false), None)
            .unwrap());
    }

    #[test]
    fn test_sync_state_round_trip_and_wipe() {
        let store = create_test_store();
        let mut state = SyncState::new(Section::Sound);
        state.phase = SyncPhase::Error;
        state.error = Some("boom".into());
        state.current_page = 3;
        store.save_sync_state(&state).unwrap();
        store.upsert(&[record(Section::Sound, 1, "x", 1)]).unwrap();

        assert_eq!(store.load_sync_state(Section::Sound).unwrap(), Some(state));
        assert_eq!(store.load_sync_state(Section::Mod).unwrap(), None);

        store.wipe().unwrap();
        assert_eq!(store.count_by_section(None).unwrap(), 0);
        assert_eq!(store.load_sync_state(Section::Sound).unwrap(), None);
    }

    #[test]
    fn test_store_on_disk_creates_parent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("catalog.sqlite");
        let store = CatalogStore::new(&path).unwrap();
        store.upsert(&[record(Section::Mod, 1, "x", 1)]).unwrap();
        drop(store);

        let reopened = CatalogStore::new(&path).unwrap();
        assert_eq!(reopened.count_by_section(Some(Section::Mod)).unwrap(), 1);
        assert_eq!(reopened.db_path(), path.as_path());
    }
}
