//! libSQL storage for saved scrape results (offline mode).
//!
//! The [`Storage`] struct wraps a local libSQL database holding scrape runs,
//! the pages crawled in each run, and the products extracted from them.
//!
//! **Access rules:**
//! - "save data" actions: read-write via [`Storage::open`]
//! - listing commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use interior_shared::{InteriorError, ProductInfo, Result};
use libsql::{Connection, Database, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn db_err(e: libsql::Error) -> InteriorError {
    InteriorError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// Outcome of a single page in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Scraped,
    Failed,
}

impl PageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scraped => "scraped",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "scraped" {
            Self::Scraped
        } else {
            Self::Failed
        }
    }
}

/// A page to record in a run.
#[derive(Debug, Clone)]
pub struct NewPage<'a> {
    pub url: &'a str,
    pub status: PageStatus,
    pub status_code: Option<u16>,
    pub title: Option<&'a str>,
    /// Page Markdown; hashed into `content_hash`.
    pub markdown: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub fetched_at: &'a str,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
}

/// Counters written when a run finishes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub scraped: usize,
    pub failed: usize,
    pub products: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// A stored scrape run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub data_source: String,
    pub source_url: Option<String>,
    pub url_count: u64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

/// A stored page row (without Markdown).
#[derive(Debug, Clone, Serialize)]
pub struct StoredPage {
    pub id: String,
    pub url: String,
    pub status: PageStatus,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    pub content_hash: Option<String>,
    pub error_message: Option<String>,
    pub fetched_at: String,
}

/// A stored product with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct StoredProduct {
    pub id: String,
    pub run_id: String,
    pub source_url: String,
    pub created_at: String,
    #[serde(flatten)]
    pub product: ProductInfo,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InteriorError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` without write access.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(InteriorError::Storage(format!(
                "no saved data at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations()
            .into_iter()
            .filter(|m| m.version > current_version)
        {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            self.conn.execute_batch(migration.sql).await.map_err(|e| {
                InteriorError::Storage(format!("migration v{} failed: {e}", migration.version))
            })?;
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let Ok(mut rows) = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await
        else {
            return 0;
        };

        match rows.next().await {
            Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
            _ => 0,
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(InteriorError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Open a transaction on this connection.
    pub async fn begin(&self) -> Result<()> {
        self.check_writable()?;
        self.conn.execute("BEGIN", params![]).await.map_err(db_err)?;
        Ok(())
    }

    pub async fn commit(&self) -> Result<()> {
        self.conn.execute("COMMIT", params![]).await.map_err(db_err)?;
        Ok(())
    }

    /// Discard everything written since [`Storage::begin`].
    pub async fn rollback(&self) -> Result<()> {
        self.conn.execute("ROLLBACK", params![]).await.map_err(db_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Start a run. Returns the generated run ID.
    pub async fn insert_run(
        &self,
        data_source: &str,
        source_url: Option<&str>,
        url_count: usize,
    ) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO scrape_runs (id, data_source, source_url, url_count, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_str(),
                    data_source,
                    source_url,
                    url_count as i64,
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Mark a run finished and record its counters.
    pub async fn finish_run(&self, run_id: &str, stats: &RunStats) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let stats_json =
            serde_json::to_string(stats).map_err(|e| InteriorError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "UPDATE scrape_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json.as_str(), run_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// List runs, newest first.
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, data_source, source_url, url_count, started_at, finished_at, stats_json
                 FROM scrape_runs ORDER BY started_at DESC, id DESC",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(RunSummary {
                id: row.get::<String>(0).map_err(db_err)?,
                data_source: row.get::<String>(1).map_err(db_err)?,
                source_url: row.get::<String>(2).ok(),
                url_count: row.get::<i64>(3).map_err(db_err)?.max(0) as u64,
                started_at: row.get::<String>(4).map_err(db_err)?,
                finished_at: row.get::<String>(5).ok(),
                stats_json: row.get::<String>(6).ok(),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Pages
    // -----------------------------------------------------------------------

    /// Record one attempted page. Returns the generated page ID.
    pub async fn insert_page(&self, run_id: &str, page: &NewPage<'_>) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let content_hash = page.markdown.map(compute_hash);
        self.conn
            .execute(
                "INSERT INTO scraped_pages
                   (id, run_id, url, status, status_code, title, content_hash, markdown,
                    error_message, fetched_at, tokens_in, tokens_out)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    id.as_str(),
                    run_id,
                    page.url,
                    page.status.as_str(),
                    page.status_code.map(i64::from),
                    page.title,
                    content_hash,
                    page.markdown,
                    page.error_message,
                    page.fetched_at,
                    page.tokens_in.map(|t| t as i64),
                    page.tokens_out.map(|t| t as i64),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Pages recorded for a run, in insertion order.
    pub async fn list_pages(&self, run_id: &str) -> Result<Vec<StoredPage>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, status, status_code, title, content_hash, error_message, fetched_at
                 FROM scraped_pages WHERE run_id = ?1 ORDER BY fetched_at, id",
                params![run_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(StoredPage {
                id: row.get::<String>(0).map_err(db_err)?,
                url: row.get::<String>(1).map_err(db_err)?,
                status: PageStatus::parse(&row.get::<String>(2).map_err(db_err)?),
                status_code: row.get::<i64>(3).ok().map(|c| c as u16),
                title: row.get::<String>(4).ok(),
                content_hash: row.get::<String>(5).ok(),
                error_message: row.get::<String>(6).ok(),
                fetched_at: row.get::<String>(7).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    /// Markdown stored for a page, if any.
    pub async fn page_markdown(&self, page_id: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT markdown FROM scraped_pages WHERE id = ?1",
                params![page_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<String>(0).ok()),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Products
    // -----------------------------------------------------------------------

    /// Store one extracted product. Returns the generated product ID.
    pub async fn insert_product(
        &self,
        run_id: &str,
        page_id: &str,
        source_url: &str,
        product: &ProductInfo,
    ) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let image_urls = serde_json::to_string(&product.image_urls)
            .map_err(|e| InteriorError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO products
                   (id, run_id, page_id, source_url, brand_name, item_name, size, weight,
                    material, price, description, image_urls, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    id.as_str(),
                    run_id,
                    page_id,
                    source_url,
                    product.brand_name.as_str(),
                    product.item_name.as_str(),
                    product.size.as_str(),
                    product.weight.as_str(),
                    product.material.as_str(),
                    product.price.as_str(),
                    product.description.as_str(),
                    image_urls.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// List stored products, newest first, optionally limited.
    pub async fn list_products(&self, limit: Option<u32>) -> Result<Vec<StoredProduct>> {
        let limit = limit.map_or(-1, i64::from);
        let mut rows = self
            .conn
            .query(
                "SELECT id, run_id, source_url, created_at, brand_name, item_name, size, weight,
                        material, price, description, image_urls
                 FROM products ORDER BY created_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let image_urls: String = row.get(11).map_err(db_err)?;
            results.push(StoredProduct {
                id: row.get::<String>(0).map_err(db_err)?,
                run_id: row.get::<String>(1).map_err(db_err)?,
                source_url: row.get::<String>(2).map_err(db_err)?,
                created_at: row.get::<String>(3).map_err(db_err)?,
                product: ProductInfo {
                    brand_name: row.get::<String>(4).map_err(db_err)?,
                    item_name: row.get::<String>(5).map_err(db_err)?,
                    size: row.get::<String>(6).map_err(db_err)?,
                    weight: row.get::<String>(7).map_err(db_err)?,
                    material: row.get::<String>(8).map_err(db_err)?,
                    price: row.get::<String>(9).map_err(db_err)?,
                    description: row.get::<String>(10).map_err(db_err)?,
                    image_urls: serde_json::from_str(&image_urls).unwrap_or_default(),
                },
            });
        }
        Ok(results)
    }
}

/// SHA-256 hex digest of page content.
fn compute_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("interior_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn pente() -> ProductInfo {
        ProductInfo {
            brand_name: "Work Plus".into(),
            item_name: "PENTE 1P SOFA".into(),
            size: "W760 D760 H670 SH425".into(),
            weight: String::new(),
            material: "Fabric, Steel".into(),
            price: "￥120,000 (tax excl.)".into(),
            description: "Compact lounge chair".into(),
            image_urls: vec!["https://example.com/pente.jpg".into()],
        }
    }

    fn scraped_page<'a>(url: &'a str, markdown: &'a str) -> NewPage<'a> {
        NewPage {
            url,
            status: PageStatus::Scraped,
            status_code: Some(200),
            title: Some("PENTE 1P SOFA"),
            markdown: Some(markdown),
            error_message: None,
            fetched_at: "2025-06-30T02:11:45+00:00",
            tokens_in: Some(1200),
            tokens_out: Some(150),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("interior_test_{}.db", Uuid::now_v7()));
        drop(Storage::open(&tmp).await.expect("first open"));
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;
        let run_id = storage
            .insert_run("sitemap", Some("https://example.com/product-sitemap.xml"), 2)
            .await
            .expect("insert run");

        storage
            .finish_run(
                &run_id,
                &RunStats {
                    scraped: 1,
                    failed: 1,
                    products: 1,
                    ..RunStats::default()
                },
            )
            .await
            .expect("finish run");

        let runs = storage.list_runs().await.expect("list runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run_id);
        assert_eq!(runs[0].url_count, 2);
        assert!(runs[0].finished_at.is_some());
        assert!(runs[0].stats_json.as_deref().unwrap().contains("\"failed\":1"));
    }

    #[tokio::test]
    async fn pages_record_success_and_failure() {
        let storage = test_storage().await;
        let run_id = storage.insert_run("page", None, 2).await.unwrap();

        let ok_id = storage
            .insert_page(&run_id, &scraped_page("https://example.com/p/1", "# PENTE"))
            .await
            .expect("insert page");
        storage
            .insert_page(
                &run_id,
                &NewPage {
                    url: "https://example.com/p/2",
                    status: PageStatus::Failed,
                    status_code: Some(404),
                    title: None,
                    markdown: None,
                    error_message: Some("HTTP 404 Not Found"),
                    fetched_at: "2025-06-30T02:11:46+00:00",
                    tokens_in: None,
                    tokens_out: None,
                },
            )
            .await
            .expect("insert failed page");

        let pages = storage.list_pages(&run_id).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].id, ok_id);
        assert_eq!(pages[0].status, PageStatus::Scraped);
        assert_eq!(pages[0].content_hash.as_deref(), Some(compute_hash("# PENTE").as_str()));
        assert_eq!(pages[1].status, PageStatus::Failed);
        assert_eq!(pages[1].status_code, Some(404));
        assert!(pages[1].content_hash.is_none());

        assert_eq!(
            storage.page_markdown(&ok_id).await.unwrap().as_deref(),
            Some("# PENTE")
        );
    }

    #[tokio::test]
    async fn products_roundtrip() {
        let storage = test_storage().await;
        let run_id = storage.insert_run("page", None, 1).await.unwrap();
        let page_id = storage
            .insert_page(&run_id, &scraped_page("https://example.com/p/1", "md"))
            .await
            .unwrap();

        storage
            .insert_product(&run_id, &page_id, "https://example.com/p/1", &pente())
            .await
            .expect("insert product");

        let products = storage.list_products(None).await.expect("list products");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product, pente());
        assert_eq!(products[0].run_id, run_id);

        let limited = storage.list_products(Some(0)).await.unwrap();
        assert!(limited.is_empty());
    }

    #[tokio::test]
    async fn rollback_discards_partial_run() {
        let storage = test_storage().await;
        storage.begin().await.expect("begin");
        let run_id = storage.insert_run("page", None, 1).await.expect("insert run");
        storage
            .insert_page(&run_id, &scraped_page("https://example.com/p", "# PENTE"))
            .await
            .expect("insert page");
        storage.rollback().await.expect("rollback");

        assert!(storage.list_runs().await.unwrap().is_empty());
        assert!(storage.list_pages(&run_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_keeps_run() {
        let storage = test_storage().await;
        storage.begin().await.expect("begin");
        storage.insert_run("page", None, 0).await.expect("insert run");
        storage.commit().await.expect("commit");

        assert_eq!(storage.list_runs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("interior_test_{}.db", Uuid::now_v7()));
        drop(Storage::open(&tmp).await.unwrap());

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.insert_run("sitemap", None, 0).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
        assert!(ro.begin().await.is_err());
        assert!(ro.list_products(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn readonly_missing_file_is_error() {
        let tmp = std::env::temp_dir().join(format!("interior_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = compute_hash("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, compute_hash("hello"));
    }
}
