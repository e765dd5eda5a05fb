//! Sample product recommendations for the furniture screen.
//!
//! There is no real search behind this yet: both the condition search and
//! the chat box answer with the same two Work Plus sofas.

use serde::Serialize;
use tracing::debug;

use crate::conditions::ConditionTable;

/// Why a search could not run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecommendError {
    #[error("save at least one condition before searching")]
    NoConditions,
}

impl From<RecommendError> for interior_shared::InteriorError {
    fn from(e: RecommendError) -> Self {
        interior_shared::InteriorError::validation(e.to_string())
    }
}

/// One recommended product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub item_name: &'static str,
    pub brand_name: &'static str,
    pub size: &'static str,
    pub material: &'static str,
    pub price: &'static str,
    pub product_url: &'static str,
    pub image_url: &'static str,
}

const SAMPLES: [Recommendation; 2] = [
    Recommendation {
        item_name: "PENTE 1P SOFA",
        brand_name: "Work Plus",
        size: "W760 D760 H670 SH425",
        material: "Fabric, Steel",
        price: "￥120,000",
        product_url: "https://www.asplund-contract.com/product/12426/",
        image_url: "https://www.asplund-contract.com/wp-content/uploads/2024/06/wp_pente1psofa-3-600x600.jpg",
    },
    Recommendation {
        item_name: "MELTONE 1P SOFA",
        brand_name: "Work Plus",
        size: "W870 D720 H750 SH410",
        material: "Fabric, Steel",
        price: "￥110,000",
        product_url: "https://www.asplund-contract.com/product/12396/",
        image_url: "https://www.asplund-contract.com/wp-content/uploads/2024/06/wp_meltone1psofa-1-600x600.jpg",
    },
];

/// Fixed recommender returning the sample products.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleRecommender;

impl SampleRecommender {
    pub fn recommendations(&self) -> &'static [Recommendation] {
        &SAMPLES
    }

    /// Answer a chat prompt. Blank prompts get no answer.
    pub fn reply(&self, prompt: &str) -> Option<String> {
        if prompt.trim().is_empty() {
            return None;
        }
        debug!(chars = prompt.chars().count(), "chat prompt");
        Some(render_markdown(self.recommendations()))
    }

    /// Search with the saved conditions.
    pub fn search(&self, conditions: &ConditionTable) -> Result<String, RecommendError> {
        if conditions.is_empty() {
            return Err(RecommendError::NoConditions);
        }
        debug!(conditions = conditions.len(), "condition search");
        Ok(render_markdown(self.recommendations()))
    }
}

/// Render recommendations as a Markdown answer.
pub fn render_markdown(items: &[Recommendation]) -> String {
    let mut out = String::from("How about these products?\n\n");
    for item in items {
        out.push_str(&format!(
            "Product: [{name}]({url})  \nBrand: {brand}  \nSize: {size}  \nMaterial: {material}  \nPrice: {price}  \n![{name}]({image})\n\n",
            name = item.item_name,
            url = item.product_url,
            brand = item.brand_name,
            size = item.size,
            material = item.material,
            price = item.price,
            image = item.image_url,
        ));
    }
    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}
