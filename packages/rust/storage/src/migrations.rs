//! SQL migration definitions for the spider-pool database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: websites, domain_aliases, content_sources",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Tenant websites
CREATE TABLE IF NOT EXISTS websites (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Domains bound to a website
CREATE TABLE IF NOT EXISTS domain_aliases (
    id             TEXT PRIMARY KEY,
    website_id     TEXT NOT NULL REFERENCES websites(id) ON DELETE CASCADE,
    domain         TEXT NOT NULL UNIQUE,
    domain_type    TEXT NOT NULL,
    is_active      INTEGER NOT NULL DEFAULT 1,
    primary_tags   TEXT NOT NULL DEFAULT '[]',
    secondary_tags TEXT NOT NULL DEFAULT '[]',
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_domain_aliases_type ON domain_aliases(domain_type, is_active);

-- Reusable synthesis material; totals mirror the JSON array lengths
CREATE TABLE IF NOT EXISTS content_sources (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL UNIQUE,
    file_origin      TEXT,
    is_active        INTEGER NOT NULL DEFAULT 1,
    paragraphs       TEXT NOT NULL DEFAULT '[]',
    headings         TEXT NOT NULL DEFAULT '[]',
    keywords         TEXT NOT NULL DEFAULT '[]',
    total_paragraphs INTEGER NOT NULL DEFAULT 0,
    total_headings   INTEGER NOT NULL DEFAULT 0,
    total_keywords   INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Spider-pool pages with per-domain slug uniqueness",
            sql: r#"
CREATE TABLE IF NOT EXISTS spider_pool_pages (
    id              TEXT PRIMARY KEY,
    domain_alias_id TEXT NOT NULL REFERENCES domain_aliases(id) ON DELETE CASCADE,
    slug            TEXT NOT NULL,
    title           TEXT NOT NULL,
    content         TEXT NOT NULL,
    keywords        TEXT NOT NULL DEFAULT '[]',
    theme           TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'active',
    published       INTEGER NOT NULL DEFAULT 1,
    views           INTEGER NOT NULL DEFAULT 0,
    crawler_visits  INTEGER NOT NULL DEFAULT 0,
    last_crawled    TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE(domain_alias_id, slug)
);

CREATE INDEX IF NOT EXISTS idx_spider_pages_alias ON spider_pool_pages(domain_alias_id);
CREATE INDEX IF NOT EXISTS idx_spider_pages_theme ON spider_pool_pages(theme);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
