//! HTML-to-Markdown conversion and cleanup passes.
//!
//! Converts product pages to clean Markdown using the `htmd` crate, then applies
//! a series of cleanup passes to normalize headings, whitespace, links and images.

mod cleanup;
pub mod html;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use interior_shared::{InteriorError, Result};

use crate::html::{NodeAction, escape_text, rewrite};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of converting an HTML page to Markdown.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// The final Markdown content (with frontmatter).
    pub markdown: String,
    /// Page title: override, first H1, or the document `<title>`.
    pub title: String,
    /// Approximate word count of the Markdown body (excluding frontmatter).
    pub word_count: usize,
}

/// Options for the HTML-to-Markdown conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Source URL used for resolving relative links and frontmatter.
    pub source_url: String,
    /// Override title (if `None`, taken from the page).
    pub title: Option<String>,
    /// ISO 8601 timestamp for the `fetched_at` frontmatter field.
    pub fetched_at: Option<String>,
}

impl ConvertOptions {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            ..Self::default()
        }
    }
}

static MAIN_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main, [role=\"main\"]").expect("valid selector"));
static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert HTML to clean Markdown with frontmatter.
///
/// 1. Picks the content root (`<main>` or `role="main"`, else `<body>`)
/// 2. Re-serializes it with `<table>`s turned into Markdown tables
/// 3. Converts HTML → Markdown via `htmd`
/// 4. Runs the cleanup pipeline
/// 5. Prepends YAML frontmatter
#[instrument(skip(html), fields(url = %opts.source_url))]
pub fn convert(html: &str, opts: &ConvertOptions) -> Result<ConvertResult> {
    let doc = Html::parse_document(html);

    let content_html = match content_root(&doc) {
        Some(root) => rewrite(root, |el| {
            if el.value().name() == "table" {
                NodeAction::ReplaceHtml(table_to_markdown_html(el))
            } else {
                NodeAction::Keep
            }
        }),
        None => html.to_string(),
    };

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "noscript", "iframe", "svg", "template", "form",
        ])
        .build();

    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| InteriorError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw_markdown.len(), "htmd conversion complete");

    let base_url = Url::parse(&opts.source_url).ok();
    let cleaned = cleanup::run_pipeline(&raw_markdown, base_url.as_ref());

    let title = opts
        .title
        .clone()
        .or_else(|| extract_title_from_markdown(&cleaned))
        .or_else(|| document_title(&doc))
        .unwrap_or_else(|| "Untitled".to_string());

    let word_count = count_words(&cleaned);

    let frontmatter = build_frontmatter(&opts.source_url, &title, opts.fetched_at.as_deref());
    let markdown = format!("{frontmatter}\n{cleaned}");

    debug!(
        title = %title,
        word_count,
        final_len = markdown.len(),
        "conversion complete"
    );

    Ok(ConvertResult {
        markdown,
        title,
        word_count,
    })
}

/// Text of the document `<title>`, if present and non-empty.
pub fn document_title(doc: &Html) -> Option<String> {
    doc.select(&TITLE_SEL)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn content_root(doc: &Html) -> Option<ElementRef<'_>> {
    doc.select(&MAIN_SEL)
        .next()
        .or_else(|| doc.select(&BODY_SEL).next())
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Render a `<table>` as Markdown table rows, one row per line.
///
/// Rows are separated with `<br>` inside a paragraph so htmd keeps them on
/// consecutive lines. The first row is the header; `<th>`/`<td>` mixes
/// (key/value spec tables) keep their cell order.
fn table_to_markdown_html(table: ElementRef<'_>) -> String {
    let rows: Vec<Vec<String>> = table_rows(table)
        .into_iter()
        .map(|tr| {
            tr.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "th" | "td"))
                .map(|cell| collapse_whitespace(&cell.text().collect::<String>()).replace('|', "\\|"))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    let render = |cells: &[String]| {
        let mut padded = cells.to_vec();
        padded.resize(col_count, String::new());
        format!("| {} |", padded.join(" | "))
    };

    let mut lines = vec![render(&rows[0]), render(&vec!["---".to_string(); col_count])];
    lines.extend(rows[1..].iter().map(|r| render(r)));

    let body = lines
        .iter()
        .map(|l| escape_text(l))
        .collect::<Vec<_>>()
        .join("<br>");
    format!("<p>{body}</p>")
}

/// `<tr>` elements of this table, skipping rows of nested tables.
fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => {
                rows.extend(
                    child
                        .children()
                        .filter_map(ElementRef::wrap)
                        .filter(|el| el.value().name() == "tr"),
                );
            }
            _ => {}
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract title from the first H1 in the Markdown text.
fn extract_title_from_markdown(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

/// Count words in Markdown body (excluding code blocks and frontmatter).
fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    CODE_BLOCK_RE
        .replace_all(md, "")
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| matches!(c, '#' | '|' | '-' | '*')))
        .count()
}

/// Build a YAML frontmatter block.
fn build_frontmatter(source_url: &str, title: &str, fetched_at: Option<&str>) -> String {
    let mut fm = String::from("---\n");
    fm.push_str(&format!("source_url: \"{}\"\n", escape_yaml_string(source_url)));
    fm.push_str(&format!("title: \"{}\"\n", escape_yaml_string(title)));
    if let Some(ts) = fetched_at {
        fm.push_str(&format!("fetched_at: \"{ts}\"\n"));
    }
    fm.push_str("---\n");
    fm
}

/// Escape special characters in a YAML string value.
fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn load_fixture(name: &str) -> String {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures")
            .join(name);
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read fixture {name}: {e}"))
    }

    fn make_opts(url: &str) -> ConvertOptions {
        ConvertOptions::new(url)
    }

    fn body(result: &ConvertResult) -> &str {
        result.markdown.splitn(3, "---\n").nth(2).unwrap_or(&result.markdown)
    }

    #[test]
    fn convert_simple_html() {
        let html = "<html><body><main><h1>Hello World</h1><p>Some text.</p></main></body></html>";
        let result = convert(html, &make_opts("https://example.com/page")).unwrap();

        assert!(result.markdown.contains("# Hello World"));
        assert!(result.markdown.contains("Some text."));
        assert_eq!(result.title, "Hello World");
        assert!(result.word_count > 0);
    }

    #[test]
    fn convert_includes_frontmatter() {
        let html = "<html><body><main><h1>Test</h1><p>Body</p></main></body></html>";
        let result = convert(
            html,
            &ConvertOptions {
                source_url: "https://example.com/test".into(),
                title: None,
                fetched_at: Some("2025-01-15T10:30:00Z".into()),
            },
        )
        .unwrap();

        assert!(result.markdown.starts_with("---\n"));
        assert!(result.markdown.contains("source_url: \"https://example.com/test\""));
        assert!(result.markdown.contains("title: \"Test\""));
        assert!(result.markdown.contains("fetched_at: \"2025-01-15T10:30:00Z\""));
    }

    #[test]
    fn convert_prefers_main_over_body() {
        let html = r#"<html><body>
            <div class="promo">Spring sale banner</div>
            <main><h1>Content</h1><p>Important text.</p></main>
        </body></html>"#;

        let result = convert(html, &make_opts("https://example.com/")).unwrap();
        assert!(result.markdown.contains("Important text."));
        assert!(!result.markdown.contains("Spring sale"));
    }

    #[test]
    fn convert_key_value_spec_table() {
        let html = r#"<html><body><main>
            <h1>Spec</h1>
            <table>
                <tr><th>Size</th><td>W760 D760</td></tr>
                <tr><th>Price</th><td>￥120,000 (tax excl.)</td></tr>
            </table>
        </main></body></html>"#;

        let result = convert(html, &make_opts("https://example.com/spec")).unwrap();
        let md = body(&result);
        let lines: Vec<&str> = md.lines().map(str::trim).collect();
        let header = lines.iter().position(|l| *l == "| Size | W760 D760 |");
        assert!(header.is_some(), "{md}");
        let header = header.unwrap();
        assert_eq!(lines[header + 1], "| --- | --- |");
        assert_eq!(lines[header + 2], "| Price | ￥120,000 (tax excl.) |");
    }

    #[test]
    fn convert_header_table_with_ragged_rows() {
        let html = r#"<html><body><main>
            <table>
                <thead><tr><th>Name</th><th>Value</th></tr></thead>
                <tbody>
                    <tr><td>foo</td><td>bar</td></tr>
                    <tr><td>baz</td></tr>
                </tbody>
            </table>
        </main></body></html>"#;

        let result = convert(html, &make_opts("https://example.com/data")).unwrap();
        assert!(result.markdown.contains("| Name | Value |"));
        assert!(result.markdown.contains("| foo | bar |"));
        assert!(result.markdown.contains("| baz |"));
    }

    #[test]
    fn convert_no_html_tags_in_output() {
        let html = r#"<html><body><main>
            <h1>Clean Output</h1>
            <p>This should be <strong>clean</strong> markdown.</p>
            <div class="note"><span>A note.</span></div>
        </main></body></html>"#;

        let result = convert(html, &make_opts("https://example.com/clean")).unwrap();
        let md = body(&result);
        assert!(!md.contains("<p>"), "output contains <p> tags");
        assert!(!md.contains("<span"), "output contains <span> tags");
        assert!(md.contains("A note."));
    }

    #[test]
    fn convert_with_title_override() {
        let html = "<html><body><main><h1>Original</h1><p>Text</p></main></body></html>";
        let result = convert(
            html,
            &ConvertOptions {
                source_url: "https://example.com/".into(),
                title: Some("Custom Title".into()),
                fetched_at: None,
            },
        )
        .unwrap();

        assert_eq!(result.title, "Custom Title");
        assert!(result.markdown.contains("title: \"Custom Title\""));
    }

    #[test]
    fn title_falls_back_to_document_title() {
        let html = "<html><head><title> Lounge  chairs </title></head><body><p>No heading here.</p></body></html>";
        let result = convert(html, &make_opts("https://example.com/")).unwrap();
        assert_eq!(result.title, "Lounge chairs");
    }

    #[test]
    fn convert_product_fixture() {
        let html = load_fixture("pages/pente-1p-sofa.html");
        let result = convert(&html, &make_opts("https://www.example-contract.test/product/12426/")).unwrap();

        assert_eq!(result.title, "PENTE 1P SOFA");
        assert!(result.markdown.contains("W760 D760 H670 SH425"));
        assert!(result.markdown.contains("| Material | Fabric, Steel |"));
        // Relative image resolved against the page URL.
        assert!(result.markdown.contains(
            "https://www.example-contract.test/wp-content/uploads/wp_pente1psofa-3-600x600.jpg"
        ));
        // Content outside <main> is not part of the body.
        assert!(!result.markdown.contains("Copyright 2025"));
        assert!(!result.markdown.contains("dataLayer"));
    }

    #[test]
    fn convert_empty_html() {
        let html = "<html><body></body></html>";
        let result = convert(html, &make_opts("https://example.com/empty")).unwrap();
        assert_eq!(result.title, "Untitled");
    }

    #[test]
    fn word_count_excludes_code_blocks() {
        let html = r#"<html><body><main>
            <h1>Title</h1>
            <p>One two three.</p>
            <pre><code>lots of code words that should not be counted</code></pre>
        </main></body></html>"#;

        let result = convert(html, &make_opts("https://example.com/wc")).unwrap();
        assert!(result.word_count < 10, "word_count={} should exclude code", result.word_count);
    }
}
