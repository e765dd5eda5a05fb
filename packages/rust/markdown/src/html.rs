//! Filtering HTML serializer.
//!
//! Walks a parsed `scraper` tree and re-serializes it, letting a caller decide
//! per element whether to keep it, drop it, unwrap it, or replace it with text.
//! Used for table pre-processing here and for page sanitizing in the crawler.

use scraper::{ElementRef, Node};

/// What to do with an element while serializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    /// Emit the element with its attributes and children.
    Keep,
    /// Emit nothing for the element or its subtree.
    Drop,
    /// Emit the children but not the element's own tags.
    Unwrap,
    /// Emit the given text (escaped) instead of the element.
    ReplaceText(String),
    /// Emit the given markup verbatim instead of the element.
    ReplaceHtml(String),
}

/// Elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Serialize the children of `root`, applying `decide` to every descendant element.
pub fn rewrite<F>(root: ElementRef<'_>, mut decide: F) -> String
where
    F: FnMut(ElementRef<'_>) -> NodeAction,
{
    let mut out = String::new();
    write_children(root, &mut decide, &mut out);
    out
}

fn write_children<F>(parent: ElementRef<'_>, decide: &mut F, out: &mut String)
where
    F: FnMut(ElementRef<'_>) -> NodeAction,
{
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    write_element(el, decide, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element<F>(el: ElementRef<'_>, decide: &mut F, out: &mut String)
where
    F: FnMut(ElementRef<'_>) -> NodeAction,
{
    match decide(el) {
        NodeAction::Drop => {}
        NodeAction::Unwrap => write_children(el, decide, out),
        NodeAction::ReplaceText(text) => out.push_str(&escape_text(&text)),
        NodeAction::ReplaceHtml(html) => out.push_str(&html),
        NodeAction::Keep => {
            let name = el.value().name();
            out.push('<');
            out.push_str(name);
            for (attr, value) in el.value().attrs() {
                out.push(' ');
                out.push_str(attr);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            write_children(el, decide, out);
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

/// Escape text for use as HTML character data.
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;

    fn body_of(doc: &Html) -> ElementRef<'_> {
        let sel = scraper::Selector::parse("body").unwrap();
        doc.select(&sel).next().unwrap()
    }

    #[test]
    fn keep_everything_roundtrips_structure() {
        let doc = Html::parse_document(
            r#"<body><p class="a">Tom &amp; Jerry &lt;3</p><img alt="say &quot;hi&quot;"><br></body>"#,
        );
        let html = rewrite(body_of(&doc), |_| NodeAction::Keep);
        assert_eq!(
            html,
            r#"<p class="a">Tom &amp; Jerry &lt;3</p><img alt="say &quot;hi&quot;"><br>"#
        );
    }

    #[test]
    fn drop_unwrap_and_replace() {
        let doc = Html::parse_document(
            "<body><nav>menu</nav><a href=\"https://x.test\">link text</a><table><tr><td>1</td></tr></table></body>",
        );
        let html = rewrite(body_of(&doc), |el| match el.value().name() {
            "nav" => NodeAction::Drop,
            "a" => NodeAction::Unwrap,
            "table" => NodeAction::ReplaceText("| 1 |".into()),
            _ => NodeAction::Keep,
        });
        assert_eq!(html, "link text| 1 |");
    }

    #[test]
    fn comments_are_skipped() {
        let doc = Html::parse_document("<body><!-- tracking --><p>x</p></body>");
        assert_eq!(rewrite(body_of(&doc), |_| NodeAction::Keep), "<p>x</p>");
    }
}
