//! Core domain types shared across Interior crates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SitemapEntry
// ---------------------------------------------------------------------------

/// One `<url>` entry from an XML site map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapEntry {
    /// Canonical page URL (`<loc>`).
    pub loc: String,
    /// Last modification date as written in the site map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastmod: Option<String>,
    /// Change frequency hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changefreq: Option<String>,
    /// Priority hint (kept as text, site maps are sloppy about number formats).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl SitemapEntry {
    /// Entry with only a location.
    pub fn new(loc: impl Into<String>) -> Self {
        Self {
            loc: loc.into(),
            lastmod: None,
            changefreq: None,
            priority: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ProductInfo
// ---------------------------------------------------------------------------

/// Product fields requested from the LLM extraction call.
///
/// Every field is a free-form string as the model wrote it; missing fields
/// deserialize to empty values so a partially filled answer is still usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    #[serde(default)]
    pub brand_name: String,
    #[serde(default)]
    pub item_name: String,
    /// Size string, e.g. `W500 D500 H550`.
    #[serde(default)]
    pub size: String,
    /// Weight string, e.g. `15kg`.
    #[serde(default)]
    pub weight: String,
    /// Materials, e.g. `Fabric, Steel`.
    #[serde(default)]
    pub material: String,
    /// Price string with tax note, e.g. `￥120,000 (tax incl.)`.
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

impl ProductInfo {
    /// Names of the schema fields, in declaration order.
    pub const FIELD_NAMES: [&'static str; 8] = [
        "brand_name",
        "item_name",
        "size",
        "weight",
        "material",
        "price",
        "description",
        "image_urls",
    ];

    /// True when the model returned nothing useful.
    pub fn is_blank(&self) -> bool {
        self.brand_name.trim().is_empty()
            && self.item_name.trim().is_empty()
            && self.description.trim().is_empty()
            && self.image_urls.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Condition catalog
// ---------------------------------------------------------------------------

/// One selectable group of a cascading choice (e.g. a furniture family).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceGroup {
    pub label: String,
    #[serde(default)]
    pub children: Vec<String>,
}

impl ChoiceGroup {
    fn new(label: &str, children: &[&str]) -> Self {
        Self {
            label: label.into(),
            children: children.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

/// How a condition field is entered and what value shape it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Multi-select from a flat option list.
    Choices { options: Vec<String> },
    /// Multi-select from options grouped under parent labels.
    Cascade { groups: Vec<ChoiceGroup> },
    /// Inclusive millimetre range.
    Range { min: i64, max: i64, step: i64 },
    /// Free text.
    Text,
}

impl FieldKind {
    fn choices(options: &[&str]) -> Self {
        Self::Choices {
            options: options.iter().map(|o| (*o).to_string()).collect(),
        }
    }

    fn range(max: i64) -> Self {
        Self::Range {
            min: 0,
            max,
            step: 100,
        }
    }

    /// Every selectable leaf option, flattened for cascades.
    pub fn options(&self) -> Vec<String> {
        match self {
            Self::Choices { options } => options.clone(),
            Self::Cascade { groups } => groups
                .iter()
                .flat_map(|g| g.children.iter().cloned())
                .collect(),
            Self::Range { .. } | Self::Text => Vec::new(),
        }
    }
}

/// A single field of the condition form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Stable key used in drafts and JSON input.
    pub key: String,
    /// Column header shown to the user.
    pub label: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(key: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
        }
    }
}

/// Built-in furniture catalog used when `[catalog]` is absent.
pub fn default_catalog_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(
            "taste",
            "Taste",
            FieldKind::choices(&["ナチュラル", "インダストリアル"]),
        ),
        FieldSpec::new(
            "lead_time",
            "Lead time",
            FieldKind::choices(&["在庫品", "3週間", "1ヶ月", "1.5〜2ヶ月"]),
        ),
        FieldSpec::new(
            "price_tier",
            "Price tier",
            FieldKind::choices(&["Low", "Middle", "High"]),
        ),
        FieldSpec::new(
            "category",
            "Category",
            FieldKind::Cascade {
                groups: vec![
                    ChoiceGroup::new(
                        "ソファ",
                        &["1人掛けソファ", "2人掛けソファ", "3人掛けソファ"],
                    ),
                    ChoiceGroup::new(
                        "チェア・椅子",
                        &[
                            "オフィスチェア・ワークチェア",
                            "ミーティングチェア",
                            "ダイニングチェア",
                        ],
                    ),
                ],
            },
        ),
        FieldSpec::new("width", "Width", FieldKind::range(8000)),
        FieldSpec::new("depth", "Depth", FieldKind::range(4000)),
        FieldSpec::new("height", "Height", FieldKind::range(3000)),
        FieldSpec::new("seat_height", "Seat height", FieldKind::range(3000)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_info_tolerates_missing_fields() {
        let json = r#"{"brand_name":"Work Plus","item_name":"PENTE 1P SOFA"}"#;
        let parsed: ProductInfo = serde_json::from_str(json).expect("deserialize");
        assert_eq!(parsed.brand_name, "Work Plus");
        assert!(parsed.image_urls.is_empty());
        assert!(!parsed.is_blank());
    }

    #[test]
    fn blank_product_detected() {
        assert!(ProductInfo::default().is_blank());
    }

    #[test]
    fn default_catalog_order_and_kinds() {
        let fields = default_catalog_fields();
        let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(
            keys,
            [
                "taste",
                "lead_time",
                "price_tier",
                "category",
                "width",
                "depth",
                "height",
                "seat_height"
            ]
        );
        assert_eq!(
            fields[4].kind,
            FieldKind::Range {
                min: 0,
                max: 8000,
                step: 100
            }
        );
        assert_eq!(fields[3].kind.options().len(), 6);
    }

    #[test]
    fn sitemap_entry_skips_empty_optionals() {
        let entry = SitemapEntry::new("https://example.com/product/1/");
        let json = serde_json::to_string(&entry).expect("serialize");
        assert_eq!(json, r#"{"loc":"https://example.com/product/1/"}"#);
    }
}
