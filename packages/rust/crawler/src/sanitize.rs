//! Page sanitizing before Markdown conversion.
//!
//! Removes excluded tags and overlay elements, unwraps or drops anchors that
//! leave the site, drops off-site images, and records the links and images
//! that remain.

use scraper::{ElementRef, Html};
use url::Url;

use interior_markdown::html::{NodeAction, rewrite};

/// Tags removed regardless of configuration.
const ALWAYS_REMOVED: &[&str] = &["script", "style", "noscript", "iframe", "template"];

/// Hosts whose links are treated as social-media links.
const SOCIAL_MEDIA_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "pinterest.com",
    "tiktok.com",
    "youtube.com",
    "line.me",
    "threads.net",
];

/// Class/id fragments that mark popups, modals and consent banners.
const OVERLAY_MARKERS: &[&str] = &[
    "modal",
    "popup",
    "overlay",
    "lightbox",
    "cookie-banner",
    "cookie-consent",
    "consent-banner",
    "gdpr",
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which elements the sanitizer removes.
#[derive(Debug, Clone)]
pub struct SanitizeRules {
    /// Lowercase tag names removed with their content.
    pub excluded_tags: Vec<String>,
    pub remove_overlay_elements: bool,
    pub exclude_external_links: bool,
    pub exclude_social_media_links: bool,
    pub exclude_external_images: bool,
}

/// Links found in the sanitized page, split by host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    /// Same-site links in document order, deduplicated, fragments stripped.
    pub internal: Vec<String>,
    /// Off-site links that survived sanitizing.
    pub external: Vec<String>,
}

/// Output of [`sanitize`].
#[derive(Debug, Clone)]
pub struct SanitizedPage {
    /// Sanitized document markup.
    pub html: String,
    pub links: PageLinks,
    /// Absolute image URLs kept in the page.
    pub images: Vec<String>,
}

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

/// Sanitize `html` fetched from `base`.
pub fn sanitize(html: &str, base: &Url, rules: &SanitizeRules) -> SanitizedPage {
    let doc = Html::parse_document(html);
    let mut links = PageLinks::default();
    let mut images = Vec::new();

    let inner = rewrite(doc.root_element(), |el| {
        decide(el, base, rules, &mut links, &mut images)
    });

    SanitizedPage {
        html: format!("<html>{inner}</html>"),
        links,
        images,
    }
}

fn decide(
    el: ElementRef<'_>,
    base: &Url,
    rules: &SanitizeRules,
    links: &mut PageLinks,
    images: &mut Vec<String>,
) -> NodeAction {
    let name = el.value().name();

    if ALWAYS_REMOVED.contains(&name)
        || rules.excluded_tags.iter().any(|t| t.eq_ignore_ascii_case(name))
    {
        return NodeAction::Drop;
    }

    if rules.remove_overlay_elements && is_overlay(el) {
        return NodeAction::Drop;
    }

    match name {
        "a" => decide_anchor(el, base, rules, links),
        "img" => decide_image(el, base, rules, images),
        _ => NodeAction::Keep,
    }
}

fn decide_anchor(
    el: ElementRef<'_>,
    base: &Url,
    rules: &SanitizeRules,
    links: &mut PageLinks,
) -> NodeAction {
    let Some(target) = el.value().attr("href").and_then(|href| resolve_link(base, href)) else {
        return NodeAction::Keep;
    };

    if rules.exclude_social_media_links && is_social_media(&target) {
        return NodeAction::Drop;
    }

    if same_site(base, &target) {
        push_unique(&mut links.internal, target.to_string());
        NodeAction::Keep
    } else if rules.exclude_external_links {
        NodeAction::Unwrap
    } else {
        push_unique(&mut links.external, target.to_string());
        NodeAction::Keep
    }
}

fn decide_image(
    el: ElementRef<'_>,
    base: &Url,
    rules: &SanitizeRules,
    images: &mut Vec<String>,
) -> NodeAction {
    let src = el
        .value()
        .attr("src")
        .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
        .or_else(|| el.value().attr("data-src"));

    let Some(resolved) = src.and_then(|s| base.join(s.trim()).ok()) else {
        return NodeAction::Keep;
    };

    if rules.exclude_external_images && !same_site(base, &resolved) {
        return NodeAction::Drop;
    }

    push_unique(images, resolved.to_string());
    NodeAction::Keep
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve an `href` to an absolute http(s) URL without fragment.
fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

fn host_key(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

/// Same host, ignoring a leading `www.`.
pub fn same_site(a: &Url, b: &Url) -> bool {
    host_key(a).is_some() && host_key(a) == host_key(b)
}

fn is_social_media(url: &Url) -> bool {
    host_key(url).is_some_and(|host| {
        SOCIAL_MEDIA_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    })
}

fn is_overlay(el: ElementRef<'_>) -> bool {
    let value = el.value();
    if value.name() == "dialog"
        || value.attr("role") == Some("dialog")
        || value.attr("aria-modal") == Some("true")
    {
        return true;
    }

    let has_marker = |token: &str| {
        let token = token.to_ascii_lowercase();
        OVERLAY_MARKERS.iter().any(|m| token.contains(m))
    };
    value.classes().any(has_marker) || value.id().is_some_and(has_marker)
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> SanitizeRules {
        SanitizeRules {
            excluded_tags: vec!["header".into(), "footer".into(), "nav".into()],
            remove_overlay_elements: true,
            exclude_external_links: true,
            exclude_social_media_links: true,
            exclude_external_images: true,
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("../../../fixtures/pages/{name}"))
            .expect("read page fixture")
    }

    fn base() -> Url {
        Url::parse("https://www.example-contract.test/product/12426/").unwrap()
    }

    #[test]
    fn removes_excluded_tags_and_scripts() {
        let page = sanitize(&fixture("pente-1p-sofa.html"), &base(), &rules());
        assert!(!page.html.contains("Free consultation"));
        assert!(!page.html.contains("Copyright 2025"));
        assert!(!page.html.contains("dataLayer"));
        assert!(!page.html.contains("/case/"));
        assert!(page.html.contains("PENTE 1P SOFA"));
    }

    #[test]
    fn removes_overlays() {
        let page = sanitize(&fixture("pente-1p-sofa.html"), &base(), &rules());
        assert!(!page.html.contains("We use cookies"));
        assert!(!page.html.contains("Subscribe to our newsletter"));
    }

    #[test]
    fn external_links_unwrapped_social_links_dropped() {
        let page = sanitize(&fixture("pente-1p-sofa.html"), &base(), &rules());
        assert!(page.html.contains("partner fabric"));
        assert!(!page.html.contains("fabric-maker.test"));
        assert!(!page.html.contains(">Twitter<"));
        assert!(!page.html.contains("facebook.com"));
        assert!(page.links.external.is_empty());
    }

    #[test]
    fn internal_links_deduplicated_in_order() {
        let page = sanitize(&fixture("pente-1p-sofa.html"), &base(), &rules());
        assert_eq!(
            page.links.internal,
            vec![
                "https://www.example-contract.test/product/br/workplus/",
                "https://www.example-contract.test/product/12396/",
                "https://www.example-contract.test/product/13001/",
            ]
        );
    }

    #[test]
    fn external_images_dropped() {
        let page = sanitize(&fixture("pente-1p-sofa.html"), &base(), &rules());
        assert_eq!(
            page.images,
            vec!["https://www.example-contract.test/wp-content/uploads/wp_pente1psofa-3-600x600.jpg"]
        );
        assert!(!page.html.contains("partner-images.test"));
    }

    #[test]
    fn permissive_rules_keep_everything_outside_scripts() {
        let permissive = SanitizeRules {
            excluded_tags: Vec::new(),
            remove_overlay_elements: false,
            exclude_external_links: false,
            exclude_social_media_links: false,
            exclude_external_images: false,
        };
        let page = sanitize(&fixture("pente-1p-sofa.html"), &base(), &permissive);
        assert!(page.html.contains("Free consultation"));
        assert!(page.html.contains("We use cookies"));
        assert!(page.links.external.iter().any(|l| l.contains("fabric-maker.test")));
        assert!(page.links.external.iter().any(|l| l.contains("twitter.com")));
        assert_eq!(page.images.len(), 2);
        assert!(!page.html.contains("dataLayer"));
    }

    #[test]
    fn same_site_ignores_www() {
        let a = Url::parse("https://www.example.com/a").unwrap();
        let b = Url::parse("https://example.com/b").unwrap();
        let c = Url::parse("https://cdn.example.com/c").unwrap();
        assert!(same_site(&a, &b));
        assert!(!same_site(&a, &c));
    }

    #[test]
    fn mailto_and_anchor_links_are_not_recorded() {
        let html = r##"<html><body><a href="#top">Top</a><a href="mailto:a@b.c">Mail</a><a href="/p/1">P</a></body></html>"##;
        let page = sanitize(html, &base(), &rules());
        assert_eq!(
            page.links.internal,
            vec!["https://www.example-contract.test/p/1"]
        );
        assert!(page.html.contains("Mail"));
    }
}
