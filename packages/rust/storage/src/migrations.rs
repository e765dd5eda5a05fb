//! SQL migration definitions for the Interior database.
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
            description: "Initial schema: scrape_runs, scraped_pages, products",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per scrape action
CREATE TABLE IF NOT EXISTS scrape_runs (
    id          TEXT PRIMARY KEY,
    data_source TEXT NOT NULL,
    source_url  TEXT,
    url_count   INTEGER NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

-- Every URL attempted in a run, successful or not
CREATE TABLE IF NOT EXISTS scraped_pages (
    id            TEXT PRIMARY KEY,
    run_id        TEXT NOT NULL REFERENCES scrape_runs(id) ON DELETE CASCADE,
    url           TEXT NOT NULL,
    status        TEXT NOT NULL,
    status_code   INTEGER,
    title         TEXT,
    content_hash  TEXT,
    markdown      TEXT,
    error_message TEXT,
    tokens_in     INTEGER,
    tokens_out    INTEGER,
    fetched_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scraped_pages_run ON scraped_pages(run_id);
CREATE INDEX IF NOT EXISTS idx_scraped_pages_url ON scraped_pages(url);

-- Extracted product records
CREATE TABLE IF NOT EXISTS products (
    id          TEXT PRIMARY KEY,
    run_id      TEXT NOT NULL REFERENCES scrape_runs(id) ON DELETE CASCADE,
    page_id     TEXT NOT NULL REFERENCES scraped_pages(id) ON DELETE CASCADE,
    source_url  TEXT NOT NULL,
    brand_name  TEXT NOT NULL,
    item_name   TEXT NOT NULL,
    size        TEXT NOT NULL,
    weight      TEXT NOT NULL,
    material    TEXT NOT NULL,
    price       TEXT NOT NULL,
    description TEXT NOT NULL,
    image_urls  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_run ON products(run_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
