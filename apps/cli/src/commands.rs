//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use interior_core::{
    ConditionDraft, ConditionSchema, ConditionTable, DataSource, LlmExtractor, SampleRecommender,
    ScrapeProgress, Session, UrlOutcome, UrlTable, discover_page_links, discover_sitemap_urls,
    product_schema, save_report, scrape_urls, validate,
};
use interior_crawler::{CrawlOptions, PageCrawler};
use interior_discovery::DiscoveryOptions;
use interior_shared::{AppConfig, FieldKind, database_path, init_config, load_config};
use interior_storage::{PageStatus, Storage, StoredPage};

/// Crates whose logs are shown at the chosen verbosity.
const LOG_TARGETS: &[&str] = &[
    "interior",
    "interior_core",
    "interior_crawler",
    "interior_discovery",
    "interior_markdown",
    "interior_shared",
    "interior_storage",
];

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Interior: furniture selection and product-data scraping.
#[derive(Parser)]
#[command(
    name = "interior",
    version,
    about = "Discover, scrape and extract furniture product data; keep furniture search conditions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List the URLs in an XML site map, with row indices.
    Sitemap {
        /// Site map URL (defaults to `defaults.sitemap_url`).
        url: Option<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List a page and the same-site links on it, with row indices.
    Links {
        /// Page URL (defaults to `defaults.page_url`).
        url: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Scrape URLs to Markdown and extract product data.
    Scrape {
        /// URLs to scrape directly.
        urls: Vec<String>,

        /// Take URLs from this site map.
        #[arg(long, conflicts_with_all = ["urls", "page"])]
        sitemap: Option<String>,

        /// Take URLs from the links on this page.
        #[arg(long, conflicts_with = "urls")]
        page: Option<String>,

        /// Row indices to scrape from the discovered table (comma-separated).
        #[arg(long, value_delimiter = ',')]
        select: Vec<usize>,

        /// Scrape every discovered row.
        #[arg(long, conflicts_with = "select")]
        all: bool,

        /// Skip LLM extraction.
        #[arg(long)]
        no_extract: bool,

        /// Save pages and products to the local database.
        #[arg(long)]
        save: bool,

        /// Write the combined Markdown to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Furniture search conditions.
    Conditions {
        #[command(subcommand)]
        action: ConditionsAction,
    },

    /// Ask for product recommendations.
    Recommend {
        /// Free-text request.
        prompt: Option<String>,

        /// Saved condition as JSON or @file (repeatable); searches with these.
        #[arg(long = "condition")]
        conditions: Vec<String>,
    },

    /// Saved products and scrape runs.
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },

    /// Print the product extraction JSON schema.
    Schema,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Condition subcommands.
#[derive(Subcommand)]
pub(crate) enum ConditionsAction {
    /// Show the condition fields and their options.
    Catalog {
        #[arg(long)]
        json: bool,
    },
    /// Validate a condition given as JSON or @file.
    Check {
        /// JSON object, or `@path` to read one from a file.
        input: String,
    },
}

/// Saved-data subcommands.
#[derive(Subcommand)]
pub(crate) enum ProductsAction {
    /// List saved products, newest first.
    List {
        #[arg(short, long)]
        limit: Option<u32>,

        #[arg(long)]
        json: bool,
    },
    /// List saved scrape runs.
    Runs {
        #[arg(long)]
        json: bool,
    },
    /// List the pages attempted in one run.
    Pages {
        run_id: String,

        #[arg(long)]
        json: bool,
    },
    /// Print the Markdown stored for one page.
    Page { page_id: String },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sitemap { url, json } => cmd_sitemap(url, json).await,
        Command::Links { url, json } => cmd_links(url, json).await,
        Command::Scrape {
            urls,
            sitemap,
            page,
            select,
            all,
            no_extract,
            save,
            out,
            json,
        } => {
            let source = match (sitemap, page) {
                (Some(url), _) => UrlSource::Sitemap(url),
                (None, Some(url)) => UrlSource::Page(url),
                (None, None) => UrlSource::Direct(urls),
            };
            let selection = if all { Selection::All } else { Selection::Rows(select) };
            cmd_scrape(ScrapeArgs {
                source,
                selection,
                extract: !no_extract,
                save,
                out,
                json,
            })
            .await
        }
        Command::Conditions { action } => match action {
            ConditionsAction::Catalog { json } => cmd_conditions_catalog(json),
            ConditionsAction::Check { input } => cmd_conditions_check(&input),
        },
        Command::Recommend { prompt, conditions } => cmd_recommend(prompt.as_deref(), &conditions),
        Command::Products { action } => match action {
            ProductsAction::List { limit, json } => cmd_products_list(limit, json).await,
            ProductsAction::Runs { json } => cmd_products_runs(json).await,
            ProductsAction::Pages { run_id, json } => cmd_products_pages(&run_id, json).await,
            ProductsAction::Page { page_id } => cmd_products_page(&page_id).await,
        },
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&product_schema())?);
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

fn discovery_options(config: &AppConfig) -> DiscoveryOptions {
    DiscoveryOptions {
        timeout_secs: config.crawl.timeout_secs,
        max_depth: config.defaults.sitemap_depth,
    }
}

fn crawler(config: &AppConfig) -> Result<PageCrawler> {
    Ok(PageCrawler::new(CrawlOptions::from(&config.crawl))?)
}

fn or_default(url: Option<String>, fallback: &str) -> String {
    url.unwrap_or_else(|| fallback.to_string())
}

async fn cmd_sitemap(url: Option<String>, json: bool) -> Result<()> {
    let config = load_config()?;
    let url = or_default(url, &config.defaults.sitemap_url);
    let table = discover_sitemap_urls(&url, &discovery_options(&config)).await?;
    print_url_table(&table, json)
}

async fn cmd_links(url: Option<String>, json: bool) -> Result<()> {
    let config = load_config()?;
    let url = or_default(url, &config.defaults.page_url);
    let table = discover_page_links(&crawler(&config)?, &url).await?;
    print_url_table(&table, json)
}

fn print_url_table(table: &UrlTable, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(table)?);
        return Ok(());
    }

    for (index, row) in table.rows.iter().enumerate() {
        match &row.lastmod {
            Some(lastmod) => println!("{index:>5}  {}  ({lastmod})", row.url),
            None => println!("{index:>5}  {}", row.url),
        }
    }
    eprintln!("{} URLs", table.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Scrape
// ---------------------------------------------------------------------------

enum UrlSource {
    Direct(Vec<String>),
    Sitemap(String),
    Page(String),
}

enum Selection {
    All,
    Rows(Vec<usize>),
}

struct ScrapeArgs {
    source: UrlSource,
    selection: Selection,
    extract: bool,
    save: bool,
    out: Option<PathBuf>,
    json: bool,
}

async fn cmd_scrape(args: ScrapeArgs) -> Result<()> {
    let config = load_config()?;
    let crawler = crawler(&config)?;
    let mut session = Session::new(ConditionSchema::from_config(&config.catalog));

    let source_url = match &args.source {
        UrlSource::Direct(urls) => {
            session.data_source = DataSource::Page;
            session.set_discovered(UrlTable::new(
                urls.iter().map(interior_core::UrlRow::new).collect(),
            ));
            session.select_urls(&(0..urls.len()).collect::<Vec<_>>());
            None
        }
        UrlSource::Sitemap(url) => {
            session.data_source = DataSource::Sitemap;
            session.set_discovered(discover_sitemap_urls(url, &discovery_options(&config)).await?);
            Some(url.clone())
        }
        UrlSource::Page(url) => {
            session.data_source = DataSource::Page;
            session.set_discovered(discover_page_links(&crawler, url).await?);
            Some(url.clone())
        }
    };

    if source_url.is_some() {
        let indices = match &args.selection {
            Selection::All => (0..session.all_urls.len()).collect(),
            Selection::Rows(rows) => rows.clone(),
        };
        session.select_urls(&indices);
    }

    if !session.can_scrape() {
        return Err(eyre!(
            "no URLs selected; pass URLs, or use --select/--all with --sitemap or --page"
        ));
    }

    let extractor = if args.extract {
        Some(LlmExtractor::gemini(&config)?)
    } else {
        None
    };

    let urls = session.selected_urls.urls();
    info!(count = urls.len(), extract = args.extract, "scraping");
    let progress = CliProgress::new(urls.len());
    let report = scrape_urls(&urls, &crawler, extractor.as_ref(), &progress).await;
    progress.finish();

    for message in report.failure_messages() {
        eprintln!("{message}");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let combined = report.combined_markdown();
        match &args.out {
            Some(path) => {
                std::fs::write(path, &combined)
                    .map_err(|e| eyre!("cannot write {}: {e}", path.display()))?;
                eprintln!("Markdown written to {}", path.display());
            }
            None => print!("{combined}"),
        }

        for outcome in &report.outcomes {
            if let UrlOutcome::Scraped {
                url,
                extraction: Some(extraction),
                extraction_error,
                ..
            } = outcome
            {
                println!("LLM: {url}\n\n{}\n", extraction.extracted_content());
                if let Some(error) = extraction_error {
                    eprintln!("Extraction failed for {url}: {error}");
                }
            }
        }
    }

    let (tokens_in, tokens_out) = report.token_usage();
    eprintln!(
        "Scraped {} of {} URLs, {} products, {tokens_in} tokens in / {tokens_out} out",
        report.scraped_count(),
        report.outcomes.len(),
        report.products().len(),
    );

    if args.save {
        let storage = Storage::open(&database_path(&config)?).await?;
        let saved = save_report(&storage, &report, session.data_source, source_url.as_deref()).await?;
        eprintln!(
            "Saved run {} ({} pages, {} products)",
            saved.run_id, saved.pages, saved.products
        );
    }

    Ok(())
}

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {msg}") {
            bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ScrapeProgress for CliProgress {
    fn url_started(&self, url: &str, _index: usize, _total: usize) {
        self.bar.set_message(url.to_string());
    }

    fn url_finished(&self, _outcome: &UrlOutcome, _index: usize, _total: usize) {
        self.bar.inc(1);
    }
}

// ---------------------------------------------------------------------------
// Conditions and recommendations
// ---------------------------------------------------------------------------

fn read_json_arg(input: &str) -> Result<String> {
    match input.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).map_err(|e| eyre!("cannot read {path}: {e}"))
        }
        None => Ok(input.to_string()),
    }
}

fn cmd_conditions_catalog(json: bool) -> Result<()> {
    let config = load_config()?;
    let schema = ConditionSchema::from_config(&config.catalog);
    if json {
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    for field in &schema.fields {
        let detail = match &field.kind {
            FieldKind::Choices { options } => options.join(" | "),
            FieldKind::Cascade { groups } => groups
                .iter()
                .map(|g| format!("{} > {}", g.label, g.children.join(" | ")))
                .collect::<Vec<_>>()
                .join("; "),
            FieldKind::Range { min, max, step } => format!("{min}..{max} mm, step {step}"),
            FieldKind::Text => "free text".to_string(),
        };
        println!("{:<12} {:<12} {detail}", field.key, field.label);
    }
    Ok(())
}

fn cmd_conditions_check(input: &str) -> Result<()> {
    let config = load_config()?;
    let schema = ConditionSchema::from_config(&config.catalog);
    let draft = ConditionDraft::from_json(&read_json_arg(input)?)?;
    let record = validate(&schema, &draft).map_err(|e| eyre!("condition rejected: {e}"))?;

    for (header, cell) in schema.headers().iter().zip(&record.cells) {
        println!("{header:<12} {cell}");
    }
    Ok(())
}

fn cmd_recommend(prompt: Option<&str>, conditions: &[String]) -> Result<()> {
    let recommender = SampleRecommender;

    if !conditions.is_empty() {
        let config = load_config()?;
        let schema = ConditionSchema::from_config(&config.catalog);
        let mut table = ConditionTable::new(&schema);
        for input in conditions {
            let draft = ConditionDraft::from_json(&read_json_arg(input)?)?;
            table.push(validate(&schema, &draft).map_err(|e| eyre!("condition rejected: {e}"))?);
        }
        println!("{}", recommender.search(&table)?);
        return Ok(());
    }

    match recommender.reply(prompt.unwrap_or_default()) {
        Some(answer) => println!("{answer}"),
        None => eprintln!("Enter a request, or pass --condition to search with saved conditions."),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Saved data
// ---------------------------------------------------------------------------

async fn open_saved(config: &AppConfig) -> Result<Storage> {
    Ok(Storage::open_readonly(&database_path(config)?).await?)
}

async fn cmd_products_list(limit: Option<u32>, json: bool) -> Result<()> {
    let config = load_config()?;
    let products = open_saved(&config).await?.list_products(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&products)?);
        return Ok(());
    }

    for stored in &products {
        let p = &stored.product;
        println!("{} / {}", p.brand_name, p.item_name);
        println!("  Size:     {}", p.size);
        println!("  Material: {}", p.material);
        println!("  Price:    {}", p.price);
        println!("  Source:   {}", stored.source_url);
    }
    eprintln!("{} products", products.len());
    Ok(())
}

async fn cmd_products_runs(json: bool) -> Result<()> {
    let config = load_config()?;
    let runs = open_saved(&config).await?.list_runs().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    for run in &runs {
        println!(
            "{}  {:<8} {:>4} URLs  {}  {}",
            run.id,
            run.data_source,
            run.url_count,
            run.started_at,
            run.source_url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn cmd_products_pages(run_id: &str, json: bool) -> Result<()> {
    let config = load_config()?;
    let pages = open_saved(&config).await?.list_pages(run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pages)?);
        return Ok(());
    }

    for page in &pages {
        println!("{}", page_line(page));
    }
    eprintln!("{} pages", pages.len());
    Ok(())
}

async fn cmd_products_page(page_id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_saved(&config).await?;
    println!("{}", stored_markdown(&storage, page_id).await?);
    Ok(())
}

fn page_line(page: &StoredPage) -> String {
    let code = page
        .status_code
        .map_or_else(|| "-".to_string(), |c| c.to_string());
    let detail = match page.status {
        PageStatus::Scraped => page.title.as_deref().unwrap_or("-"),
        PageStatus::Failed => page.error_message.as_deref().unwrap_or("-"),
    };
    format!(
        "{}  {:<7} {:>3}  {}  {}",
        page.id,
        page.status.as_str(),
        code,
        page.url,
        detail
    )
}

async fn stored_markdown(storage: &Storage, page_id: &str) -> Result<String> {
    storage
        .page_markdown(page_id)
        .await?
        .ok_or_else(|| eyre!("no Markdown stored for page {page_id}"))
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use interior_storage::NewPage;

    fn page(status: PageStatus) -> StoredPage {
        StoredPage {
            id: "0197-page".into(),
            url: "https://example.com/product/1/".into(),
            status,
            status_code: Some(404),
            title: Some("PENTE 1P SOFA".into()),
            content_hash: None,
            error_message: Some("HTTP 404 Not Found".into()),
            fetched_at: "2025-06-30T02:11:45+00:00".into(),
        }
    }

    #[test]
    fn page_line_shows_title_or_error() {
        let scraped = page_line(&page(PageStatus::Scraped));
        assert!(scraped.starts_with("0197-page  scraped 404"));
        assert!(scraped.ends_with("PENTE 1P SOFA"));

        let failed = page_line(&page(PageStatus::Failed));
        assert!(failed.contains("failed"));
        assert!(failed.ends_with("HTTP 404 Not Found"));
    }

    #[tokio::test]
    async fn stored_markdown_reads_saved_page() {
        let db = std::env::temp_dir().join(format!("interior_cli_{}.db", std::process::id()));
        let storage = Storage::open(&db).await.unwrap();
        let run_id = storage.insert_run("page", None, 2).await.unwrap();
        let mut new_page = NewPage {
            url: "https://example.com/a",
            status: PageStatus::Scraped,
            status_code: Some(200),
            title: None,
            markdown: Some("# Sofa"),
            error_message: None,
            fetched_at: "2025-06-30T02:11:45+00:00",
            tokens_in: None,
            tokens_out: None,
        };
        let scraped_id = storage.insert_page(&run_id, &new_page).await.unwrap();
        new_page.status = PageStatus::Failed;
        new_page.markdown = None;
        let failed_id = storage.insert_page(&run_id, &new_page).await.unwrap();

        assert_eq!(stored_markdown(&storage, &scraped_id).await.unwrap(), "# Sofa");
        let err = stored_markdown(&storage, &failed_id).await.unwrap_err();
        assert!(err.to_string().contains("no Markdown stored"));

        let _ = std::fs::remove_file(&db);
    }
}
