//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding websites, domain
//! aliases, content sources, and spider-pool pages.
//!
//! **Write rules:**
//! - Content-source totals are computed from the collections inside the same
//!   statement that writes them; callers cannot supply them.
//! - Spider-pool pages are keyed on `(domain_alias_id, slug)`. Re-upserting a
//!   page rewrites its content and keeps its view/crawl counters.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use spiderpool_shared::{
    ContentSource, ContentSourceDef, DomainAlias, DomainPageStats, PageSpec, Result,
    SpiderPoolError, SpiderPoolPage, Website,
};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// What [`Storage::upsert_spider_page`] did with a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

const PAGE_COLUMNS: &str = "id, domain_alias_id, slug, title, content, keywords, theme, status, \
     published, views, crawler_visits, last_crawled, created_at, updated_at";

const SOURCE_COLUMNS: &str = "id, name, file_origin, is_active, paragraphs, headings, keywords, \
     total_paragraphs, total_headings, total_keywords, created_at, updated_at";

const ALIAS_COLUMNS: &str =
    "id, website_id, domain, domain_type, is_active, primary_tags, secondary_tags, created_at";

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SpiderPoolError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for the page-serving side).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SpiderPoolError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SpiderPoolError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Website / domain alias operations
    // -----------------------------------------------------------------------

    /// Insert a new website record.
    pub async fn insert_website(&self, name: &str) -> Result<Website> {
        self.check_writable()?;
        let website = Website {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO websites (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![
                    website.id.as_str(),
                    website.name.as_str(),
                    website.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(website)
    }

    /// Get a website by ID.
    pub async fn get_website(&self, id: &str) -> Result<Option<Website>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, created_at FROM websites WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Website {
                id: row.get::<String>(0).map_err(storage_err)?,
                name: row.get::<String>(1).map_err(storage_err)?,
                created_at: parse_time(&row.get::<String>(2).map_err(storage_err)?)?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Insert a domain alias. The owning website must exist.
    pub async fn insert_domain_alias(&self, alias: &DomainAlias) -> Result<()> {
        self.check_writable()?;
        if self.get_website(&alias.website_id).await?.is_none() {
            return Err(SpiderPoolError::not_found(format!(
                "website {}",
                alias.website_id
            )));
        }
        self.conn
            .execute(
                "INSERT INTO domain_aliases (id, website_id, domain, domain_type, is_active, primary_tags, secondary_tags, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    alias.id.as_str(),
                    alias.website_id.as_str(),
                    alias.domain.as_str(),
                    alias.domain_type.as_str(),
                    alias.is_active as i64,
                    to_json(&alias.primary_tags)?,
                    to_json(&alias.secondary_tags)?,
                    alias.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| insert_err(e, format!("domain {}", alias.domain)))?;
        Ok(())
    }

    /// Get a domain alias by ID.
    pub async fn get_domain_alias(&self, id: &str) -> Result<Option<DomainAlias>> {
        let sql = format!("SELECT {ALIAS_COLUMNS} FROM domain_aliases WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_alias(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Get a domain alias by its (case-insensitive) domain name.
    pub async fn get_domain_alias_by_domain(&self, domain: &str) -> Result<Option<DomainAlias>> {
        let sql = format!("SELECT {ALIAS_COLUMNS} FROM domain_aliases WHERE domain = ?1");
        let domain = domain.trim().to_ascii_lowercase();
        let mut rows = self
            .conn
            .query(&sql, params![domain.as_str()])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_alias(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List every domain alias, ordered by domain.
    pub async fn list_domain_aliases(&self) -> Result<Vec<DomainAlias>> {
        let sql = format!("SELECT {ALIAS_COLUMNS} FROM domain_aliases ORDER BY domain");
        self.collect_aliases(&sql).await
    }

    /// List active aliases classified as spider-pool hosts, ordered by domain.
    pub async fn list_spider_pool_aliases(&self) -> Result<Vec<DomainAlias>> {
        let sql = format!(
            "SELECT {ALIAS_COLUMNS} FROM domain_aliases
             WHERE domain_type = 'spider_pool' AND is_active = 1
             ORDER BY domain"
        );
        self.collect_aliases(&sql).await
    }

    async fn collect_aliases(&self, sql: &str) -> Result<Vec<DomainAlias>> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(storage_err)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_alias(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Content source operations
    // -----------------------------------------------------------------------

    /// Insert or refresh a content source keyed by name.
    ///
    /// The totals are derived from the written collections in the same
    /// statement, so a stored source can never carry mismatched counts.
    pub async fn upsert_content_source(&self, def: &ContentSourceDef) -> Result<ContentSource> {
        self.check_writable()?;
        let name = def.name.trim();
        if name.is_empty() {
            return Err(SpiderPoolError::validation("content source name is empty"));
        }

        let keywords = def.keyword_set();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO content_sources (id, name, file_origin, is_active, paragraphs, headings, keywords,
                                              total_paragraphs, total_headings, total_keywords, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(name) DO UPDATE SET
                   file_origin = excluded.file_origin,
                   is_active = excluded.is_active,
                   paragraphs = excluded.paragraphs,
                   headings = excluded.headings,
                   keywords = excluded.keywords,
                   total_paragraphs = excluded.total_paragraphs,
                   total_headings = excluded.total_headings,
                   total_keywords = excluded.total_keywords,
                   updated_at = excluded.updated_at",
                params![
                    Uuid::now_v7().to_string(),
                    name,
                    def.file_origin.as_deref(),
                    def.is_active as i64,
                    to_json(&def.paragraphs)?,
                    to_json(&def.headings)?,
                    to_json(&keywords)?,
                    def.paragraphs.len() as i64,
                    def.headings.len() as i64,
                    keywords.len() as i64,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(
            name,
            paragraphs = def.paragraphs.len(),
            headings = def.headings.len(),
            keywords = keywords.len(),
            "content source written"
        );

        self.get_content_source(name)
            .await?
            .ok_or_else(|| SpiderPoolError::Storage(format!("content source {name} vanished")))
    }

    /// Get a content source by name.
    pub async fn get_content_source(&self, name: &str) -> Result<Option<ContentSource>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM content_sources WHERE name = ?1");
        let mut rows = self.conn.query(&sql, params![name]).await.map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_source(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List all content sources, ordered by name.
    pub async fn list_content_sources(&self) -> Result<Vec<ContentSource>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM content_sources ORDER BY name");
        self.collect_sources(&sql).await
    }

    /// List active content sources, ordered by name.
    pub async fn list_active_content_sources(&self) -> Result<Vec<ContentSource>> {
        let sql = format!(
            "SELECT {SOURCE_COLUMNS} FROM content_sources WHERE is_active = 1 ORDER BY name"
        );
        self.collect_sources(&sql).await
    }

    async fn collect_sources(&self, sql: &str) -> Result<Vec<ContentSource>> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(storage_err)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_source(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Spider-pool page operations
    // -----------------------------------------------------------------------

    /// Get a page by domain alias and slug.
    pub async fn find_spider_page(
        &self,
        domain_alias_id: &str,
        slug: &str,
    ) -> Result<Option<SpiderPoolPage>> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM spider_pool_pages WHERE domain_alias_id = ?1 AND slug = ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![domain_alias_id, slug])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_page(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Write a synthesized page.
    ///
    /// An existing `(domain_alias_id, slug)` row gets its title, content,
    /// keywords, and theme replaced; status, publication flag, and counters are
    /// left alone. A new row starts with zeroed counters. An insert that still
    /// collides is reported as [`SpiderPoolError::Conflict`].
    pub async fn upsert_spider_page(&self, spec: &PageSpec) -> Result<UpsertOutcome> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let keywords = to_json(&spec.keywords)?;

        let existing = self
            .find_spider_page(&spec.domain_alias_id, &spec.slug)
            .await?;

        match existing {
            Some(page) => {
                self.conn
                    .execute(
                        "UPDATE spider_pool_pages
                         SET title = ?1, content = ?2, keywords = ?3, theme = ?4, updated_at = ?5
                         WHERE id = ?6",
                        params![
                            spec.title.as_str(),
                            spec.content.as_str(),
                            keywords,
                            spec.theme.as_str(),
                            now.as_str(),
                            page.id.as_str(),
                        ],
                    )
                    .await
                    .map_err(storage_err)?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.insert_spider_page(spec).await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Insert a new page with zeroed counters.
    ///
    /// Fails with [`SpiderPoolError::Conflict`] when the
    /// `(domain_alias_id, slug)` pair is already taken.
    pub async fn insert_spider_page(&self, spec: &PageSpec) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let keywords = to_json(&spec.keywords)?;
        self.conn
            .execute(
                "INSERT INTO spider_pool_pages (id, domain_alias_id, slug, title, content, keywords, theme,
                                                status, published, views, crawler_visits, last_crawled,
                                                created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, NULL, ?10, ?11)",
                params![
                    Uuid::now_v7().to_string(),
                    spec.domain_alias_id.as_str(),
                    spec.slug.as_str(),
                    spec.title.as_str(),
                    spec.content.as_str(),
                    keywords,
                    spec.theme.as_str(),
                    spec.status.as_str(),
                    spec.published as i64,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| insert_err(e, format!("page {}", spec.slug)))?;
        Ok(())
    }

    /// List all pages of a domain alias, grouped by theme prefix and ordered
    /// by page number within each group (`seo-9999` before `seo-10000`).
    pub async fn list_spider_pages(&self, domain_alias_id: &str) -> Result<Vec<SpiderPoolPage>> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM spider_pool_pages WHERE domain_alias_id = ?1
             ORDER BY rtrim(slug, '0123456789'), length(slug), slug"
        );
        let mut rows = self
            .conn
            .query(&sql, params![domain_alias_id])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_page(&row)?);
        }
        Ok(results)
    }

    /// Count pages of a domain alias.
    pub async fn count_spider_pages(&self, domain_alias_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM spider_pool_pages WHERE domain_alias_id = ?1",
                params![domain_alias_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as u64),
            None => Ok(0),
        }
    }

    /// Bump the view counter of a served page.
    pub async fn record_page_view(&self, domain_alias_id: &str, slug: &str) -> Result<()> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE spider_pool_pages SET views = views + 1
                 WHERE domain_alias_id = ?1 AND slug = ?2",
                params![domain_alias_id, slug],
            )
            .await
            .map_err(storage_err)?;
        require_row(changed, slug)
    }

    /// Bump the crawler counter of a page and stamp its last crawl time.
    pub async fn record_crawler_visit(&self, domain_alias_id: &str, slug: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE spider_pool_pages SET crawler_visits = crawler_visits + 1, last_crawled = ?1
                 WHERE domain_alias_id = ?2 AND slug = ?3",
                params![now.as_str(), domain_alias_id, slug],
            )
            .await
            .map_err(storage_err)?;
        require_row(changed, slug)
    }

    /// Aggregate counters across all pages of a domain alias.
    pub async fn domain_page_stats(&self, domain_alias_id: &str) -> Result<DomainPageStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(views), 0), COALESCE(SUM(crawler_visits), 0), MAX(last_crawled)
                 FROM spider_pool_pages WHERE domain_alias_id = ?1",
                params![domain_alias_id],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(DomainPageStats::default());
        };

        let last_crawled = match row.get::<String>(3).ok() {
            Some(s) => Some(parse_time(&s)?),
            None => None,
        };
        Ok(DomainPageStats {
            page_count: row.get::<i64>(0).map_err(storage_err)? as u64,
            total_views: row.get::<i64>(1).map_err(storage_err)? as u64,
            total_crawler_visits: row.get::<i64>(2).map_err(storage_err)? as u64,
            last_crawled,
        })
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn storage_err(e: libsql::Error) -> SpiderPoolError {
    SpiderPoolError::Storage(e.to_string())
}

/// Map an insert failure, promoting uniqueness violations to `Conflict`.
fn insert_err(e: libsql::Error, what: String) -> SpiderPoolError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        SpiderPoolError::Conflict(format!("{what} already exists"))
    } else {
        SpiderPoolError::Storage(message)
    }
}

fn require_row(changed: u64, slug: &str) -> Result<()> {
    if changed == 0 {
        return Err(SpiderPoolError::not_found(format!("page {slug}")));
    }
    Ok(())
}

fn to_json(values: &[String]) -> Result<String> {
    serde_json::to_string(values).map_err(|e| SpiderPoolError::Storage(e.to_string()))
}

fn from_json(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| SpiderPoolError::Storage(format!("invalid JSON column: {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SpiderPoolError::Storage(format!("invalid date: {e}")))
}

fn row_to_alias(row: &libsql::Row) -> Result<DomainAlias> {
    Ok(DomainAlias {
        id: row.get::<String>(0).map_err(storage_err)?,
        website_id: row.get::<String>(1).map_err(storage_err)?,
        domain: row.get::<String>(2).map_err(storage_err)?,
        domain_type: row.get::<String>(3).map_err(storage_err)?.parse()?,
        is_active: row.get::<i64>(4).map_err(storage_err)? != 0,
        primary_tags: from_json(&row.get::<String>(5).map_err(storage_err)?)?,
        secondary_tags: from_json(&row.get::<String>(6).map_err(storage_err)?)?,
        created_at: parse_time(&row.get::<String>(7).map_err(storage_err)?)?,
    })
}

fn row_to_source(row: &libsql::Row) -> Result<ContentSource> {
    Ok(ContentSource {
        id: row.get::<String>(0).map_err(storage_err)?,
        name: row.get::<String>(1).map_err(storage_err)?,
        file_origin: row.get::<String>(2).ok(),
        is_active: row.get::<i64>(3).map_err(storage_err)? != 0,
        paragraphs: from_json(&row.get::<String>(4).map_err(storage_err)?)?,
        headings: from_json(&row.get::<String>(5).map_err(storage_err)?)?,
        keywords: from_json(&row.get::<String>(6).map_err(storage_err)?)?,
        total_paragraphs: row.get::<i64>(7).map_err(storage_err)? as usize,
        total_headings: row.get::<i64>(8).map_err(storage_err)? as usize,
        total_keywords: row.get::<i64>(9).map_err(storage_err)? as usize,
        created_at: parse_time(&row.get::<String>(10).map_err(storage_err)?)?,
        updated_at: parse_time(&row.get::<String>(11).map_err(storage_err)?)?,
    })
}

fn row_to_page(row: &libsql::Row) -> Result<SpiderPoolPage> {
    let last_crawled = match row.get::<String>(11).ok() {
        Some(s) => Some(parse_time(&s)?),
        None => None,
    };
    Ok(SpiderPoolPage {
        id: row.get::<String>(0).map_err(storage_err)?,
        domain_alias_id: row.get::<String>(1).map_err(storage_err)?,
        slug: row.get::<String>(2).map_err(storage_err)?,
        title: row.get::<String>(3).map_err(storage_err)?,
        content: row.get::<String>(4).map_err(storage_err)?,
        keywords: from_json(&row.get::<String>(5).map_err(storage_err)?)?,
        theme: row.get::<String>(6).map_err(storage_err)?,
        status: row.get::<String>(7).map_err(storage_err)?.parse()?,
        published: row.get::<i64>(8).map_err(storage_err)? != 0,
        views: row.get::<i64>(9).map_err(storage_err)? as u64,
        crawler_visits: row.get::<i64>(10).map_err(storage_err)? as u64,
        last_crawled,
        created_at: parse_time(&row.get::<String>(12).map_err(storage_err)?)?,
        updated_at: parse_time(&row.get::<String>(13).map_err(storage_err)?)?,
    })
}
