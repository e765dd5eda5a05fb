//! Post-conversion cleanup pipeline for Markdown output.
//!
//! Each pass is a `&str -> String` function applied in sequence. Product pages
//! carry a lot of layout noise (spacer characters, icon links with no text,
//! relative image paths), so the passes are aimed at leaving text an LLM can
//! read and image URLs that still resolve.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let passes: [&dyn Fn(&str) -> String; 7] = [
        &normalize_spaces,
        &normalize_headings,
        &fix_code_block_languages,
        &strip_leftover_html,
        &drop_empty_links,
        &|s: &str| resolve_links(s, base_url),
        &clean_blank_lines,
    ];

    let cleaned = passes.iter().fold(md.to_string(), |acc, pass| pass(&acc));
    ensure_trailing_newline(&cleaned)
}

// ---------------------------------------------------------------------------
// Spacing
// ---------------------------------------------------------------------------

/// Replace non-breaking and zero-width characters, trim line ends.
fn normalize_spaces(md: &str) -> String {
    md.lines()
        .map(|line| {
            line.replace(['\u{00a0}', '\u{2007}', '\u{202f}'], " ")
                .replace(['\u{200b}', '\u{feff}'], "")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of blank lines into a single blank line.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE
        .replace_all(md.trim_start_matches('\n'), "\n\n")
        .into_owned()
}

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    format!("{}\n", md.trim_end_matches('\n'))
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// Keep the first H1; later ones become H2 (product grids repeat the page title).
fn normalize_headings(md: &str) -> String {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("valid regex"));

    let mut seen_h1 = false;
    md.lines()
        .map(|line| match H1_RE.captures(line) {
            Some(caps) if seen_h1 => format!("## {}", &caps[1]),
            Some(_) => {
                seen_h1 = true;
                line.to_string()
            }
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turn `language-js` / `lang-python` / `highlight-rust` fence hints into plain names.
fn fix_code_block_languages(md: &str) -> String {
    static LANG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-|highlight-)(\w+)").expect("valid regex")
    });

    LANG_PREFIX_RE.replace_all(md, "```$1").into_owned()
}

/// Remove layout tags that survived conversion, outside fenced code.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|figure|figcaption|picture|source|font|center|label|button)(?:\s[^>]*)?/?>",
        )
        .expect("valid regex")
    });

    let mut in_code_block = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_code_block = !in_code_block;
                return line.to_string();
            }
            if in_code_block {
                line.to_string()
            } else {
                HTML_TAG_RE.replace_all(line, "").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Links and images
// ---------------------------------------------------------------------------

/// Drop links with no visible text (icon buttons, carousel arrows).
fn drop_empty_links(md: &str) -> String {
    static EMPTY_LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(^|[^!\]])\[\s*\]\([^)]*\)").expect("valid regex"));

    EMPTY_LINK_RE.replace_all(md, "$1").into_owned()
}

/// Resolve relative link and image targets against the page URL.
///
/// Product images are resolved too so extracted `image_urls` are usable.
fn resolve_links(md: &str, base_url: Option<&Url>) -> String {
    static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(!?)\[([^\]]*)\]\(([^)\s]+)((?:\s+"[^"]*")?)\)"#).expect("valid regex")
    });

    let Some(base) = base_url else {
        return md.to_string();
    };

    LINK_RE
        .replace_all(md, |caps: &Captures| {
            let (bang, text, href, title) = (&caps[1], &caps[2], &caps[3], &caps[4]);
            let keep_as_is = href.starts_with('#')
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
                || href.starts_with("data:")
                || Url::parse(href).is_ok();

            let target = if keep_as_is {
                href.to_string()
            } else {
                base.join(href)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| href.to_string())
            };
            format!("{bang}[{text}]({target}{title})")
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_headings_demotes_repeated_h1() {
        let input = "# PENTE 1P SOFA\n\nText\n\n# Related products\n\n## Sub";
        assert_eq!(
            normalize_headings(input),
            "# PENTE 1P SOFA\n\nText\n\n## Related products\n\n## Sub"
        );
    }

    #[test]
    fn blank_lines_collapse_to_one() {
        assert_eq!(clean_blank_lines("\n\nA\n\n\n\n\nB\n\nC"), "A\n\nB\n\nC");
    }

    #[test]
    fn non_breaking_spaces_normalized() {
        let input = "W760\u{00a0}D760\u{200b}   \nnext";
        assert_eq!(normalize_spaces(input), "W760 D760\nnext");
    }

    #[test]
    fn code_fence_prefix_stripped() {
        let input = "```language-javascript\nconsole.log('hi');\n```";
        assert!(fix_code_block_languages(input).starts_with("```javascript"));
    }

    #[test]
    fn leftover_layout_tags_removed_outside_code() {
        let input = "<span class=\"price\">￥120,000</span>\n```html\n<div>kept</div>\n```";
        let result = strip_leftover_html(input);
        assert!(result.starts_with("￥120,000\n"));
        assert!(result.contains("<div>kept</div>"));
    }

    #[test]
    fn empty_links_dropped_but_images_kept() {
        let input = "prev [](/slide/1) next [ ](#) ![](https://cdn.test/a.jpg) [ok](/x)";
        let result = drop_empty_links(input);
        assert_eq!(result, "prev  next  ![](https://cdn.test/a.jpg) [ok](/x)");
    }

    #[test]
    fn relative_links_and_images_resolved() {
        let base = Url::parse("https://shop.example.com/product/12426/").unwrap();
        let input = "[Catalog](../../catalog.pdf) ![Sofa](/img/pente.jpg \"Pente\")";
        assert_eq!(
            resolve_links(input, Some(&base)),
            "[Catalog](https://shop.example.com/catalog.pdf) ![Sofa](https://shop.example.com/img/pente.jpg \"Pente\")"
        );
    }

    #[test]
    fn absolute_and_special_links_untouched() {
        let base = Url::parse("https://shop.example.com/").unwrap();
        let input = "[a](https://other.com/p) [b](#top) [c](mailto:x@y.z) [d](tel:0312345678)";
        assert_eq!(resolve_links(input, Some(&base)), input);
    }

    #[test]
    fn full_pipeline_cleans_markdown() {
        let input = "# Title\n\n\n\n<div>Some\u{00a0}content</div>\n\n[](/icon)\n\n![img](a.jpg)\n\n\n";
        let base = Url::parse("https://example.com/product/1/").unwrap();
        let result = run_pipeline(input, Some(&base));

        assert!(!result.contains("\n\n\n"));
        assert!(!result.contains("<div>"));
        assert!(result.contains("Some content"));
        assert!(result.contains("![img](https://example.com/product/1/a.jpg)"));
        assert!(!result.contains("/icon"));
        assert!(result.ends_with("\n") && !result.ends_with("\n\n"));
    }
}
