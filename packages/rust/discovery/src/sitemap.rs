//! XML site-map parser.
//!
//! Handles the two document shapes defined by <https://www.sitemaps.org/protocol.html>:
//! - `<urlset>`: a flat list of `<url>` entries
//! - `<sitemapindex>`: a list of `<sitemap>` entries pointing at more site maps
//!
//! Element names are matched on their local part so prefixed or
//! default-namespaced documents parse the same way.

use interior_shared::{InteriorError, Result, SitemapEntry};
use sxd_document::dom::{ChildOfElement, Element};
use sxd_document::parser;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A parsed site-map document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSitemap {
    /// Page entries from a `<urlset>` root.
    Urlset(Vec<SitemapEntry>),
    /// Child site-map locations from a `<sitemapindex>` root.
    Index(Vec<String>),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a site-map XML document.
///
/// `<url>` / `<sitemap>` entries without a non-empty `<loc>` are skipped.
/// Any root other than `urlset` or `sitemapindex` is a parse error.
pub fn parse_sitemap(xml: &str) -> Result<ParsedSitemap> {
    let xml = xml.trim_start_matches('\u{feff}').trim_start();
    let package =
        parser::parse(xml).map_err(|e| InteriorError::parse(format!("invalid sitemap XML: {e}")))?;
    let document = package.as_document();

    let root = document
        .root()
        .children()
        .into_iter()
        .find_map(|child| child.element())
        .ok_or_else(|| InteriorError::parse("sitemap XML has no root element"))?;

    match root.name().local_part() {
        "urlset" => {
            let entries = child_elements(root, "url")
                .filter_map(|url| {
                    let loc = child_text(url, "loc")?;
                    Some(SitemapEntry {
                        loc,
                        lastmod: child_text(url, "lastmod"),
                        changefreq: child_text(url, "changefreq"),
                        priority: child_text(url, "priority"),
                    })
                })
                .collect();
            Ok(ParsedSitemap::Urlset(entries))
        }
        "sitemapindex" => {
            let locs = child_elements(root, "sitemap")
                .filter_map(|sitemap| child_text(sitemap, "loc"))
                .collect();
            Ok(ParsedSitemap::Index(locs))
        }
        other => Err(InteriorError::parse(format!(
            "unexpected sitemap root element <{other}>"
        ))),
    }
}

// ---------------------------------------------------------------------------
// DOM helpers
// ---------------------------------------------------------------------------

/// Direct child elements of `parent` with the given local name.
fn child_elements<'d>(parent: Element<'d>, name: &'d str) -> impl Iterator<Item = Element<'d>> {
    parent
        .children()
        .into_iter()
        .filter_map(|child| child.element())
        .filter(move |el| el.name().local_part() == name)
}

/// Trimmed text of the first child element named `name`, if non-empty.
fn child_text(parent: Element<'_>, name: &str) -> Option<String> {
    let el = parent
        .children()
        .into_iter()
        .filter_map(|child| child.element())
        .find(|el| el.name().local_part() == name)?;

    let mut text = String::new();
    collect_text(el, &mut text);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn collect_text(el: Element<'_>, out: &mut String) {
    for child in el.children() {
        match child {
            ChildOfElement::Text(t) => out.push_str(t.text()),
            ChildOfElement::Element(inner) => collect_text(inner, out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("../../../fixtures/sitemaps/{name}"))
            .expect("read sitemap fixture")
    }

    #[test]
    fn parses_urlset_fixture() {
        let parsed = parse_sitemap(&fixture("product-sitemap.xml")).expect("parse");
        let ParsedSitemap::Urlset(entries) = parsed else {
            panic!("expected urlset");
        };

        // The blank <loc> is skipped; nested <image:loc> is not mistaken for a page.
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].loc, "https://www.example-contract.test/product/");
        assert_eq!(
            entries[0].lastmod.as_deref(),
            Some("2025-06-30T02:11:45+00:00")
        );
        assert_eq!(entries[1].changefreq.as_deref(), Some("weekly"));
        assert_eq!(entries[1].priority.as_deref(), Some("0.8"));
        assert_eq!(entries[2].lastmod.as_deref(), Some("2025-05-12T08:39:51+00:00"));
    }

    #[test]
    fn cdata_loc_is_unwrapped() {
        let ParsedSitemap::Urlset(entries) =
            parse_sitemap(&fixture("product-sitemap.xml")).expect("parse")
        else {
            panic!("expected urlset");
        };
        assert_eq!(
            entries[3].loc,
            "https://www.example-contract.test/product/12001/?lang=ja&ref=sitemap"
        );
    }

    #[test]
    fn parses_sitemap_index() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.com/post-sitemap.xml</loc></sitemap>
  <sitemap><loc>https://example.com/product-sitemap.xml</loc><lastmod>2025-01-01</lastmod></sitemap>
  <sitemap><loc></loc></sitemap>
</sitemapindex>"#;
        let parsed = parse_sitemap(xml).expect("parse");
        assert_eq!(
            parsed,
            ParsedSitemap::Index(vec![
                "https://example.com/post-sitemap.xml".into(),
                "https://example.com/product-sitemap.xml".into(),
            ])
        );
    }

    #[test]
    fn prefixed_namespace_is_accepted() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sm:url><sm:loc>https://example.com/a</sm:loc></sm:url>
</sm:urlset>"#;
        let ParsedSitemap::Urlset(entries) = parse_sitemap(xml).expect("parse") else {
            panic!("expected urlset");
        };
        assert_eq!(entries, vec![SitemapEntry::new("https://example.com/a")]);
    }

    #[test]
    fn leading_whitespace_and_bom_tolerated() {
        let xml = "\u{feff}\n  <urlset><url><loc>https://example.com/</loc></url></urlset>";
        assert!(matches!(
            parse_sitemap(xml).expect("parse"),
            ParsedSitemap::Urlset(ref e) if e.len() == 1
        ));
    }

    #[test]
    fn unknown_root_is_error() {
        let err = parse_sitemap(&fixture("not-a-sitemap.xml")).unwrap_err();
        assert!(err.to_string().contains("<rss>"));
    }

    #[test]
    fn malformed_xml_is_error() {
        let err = parse_sitemap("<urlset><url><loc>x</url>").unwrap_err();
        assert!(matches!(err, InteriorError::Parse { .. }));
    }
}
