// src/config/models.rs
//! Inference tiers: price table and the role each model plays.

use serde::{Deserialize, Serialize};

/// What a tier returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierShape {
    Text,
    Extraction,
    Embedding,
}

/// One configured inference target. Prices are compute units per million tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTier {
    pub id: String,
    pub input_price: f64,
    #[serde(default)]
    pub output_price: f64,
    pub shape: TierShape,
    /// Vector length; only meaningful for embedding tiers.
    #[serde(default)]
    pub dimensions: Option<usize>,
}

impl ModelTier {
    pub fn text(id: &str, input_price: f64, output_price: f64) -> Self {
        Self {
            id: id.to_string(),
            input_price,
            output_price,
            shape: TierShape::Text,
            dimensions: None,
        }
    }

    pub fn extraction(id: &str, input_price: f64, output_price: f64) -> Self {
        Self {
            shape: TierShape::Extraction,
            ..Self::text(id, input_price, output_price)
        }
    }

    pub fn embedding(id: &str, input_price: f64, dimensions: usize) -> Self {
        Self {
            id: id.to_string(),
            input_price,
            output_price: 0.0,
            shape: TierShape::Embedding,
            dimensions: Some(dimensions),
        }
    }
}

pub const LARGE_MODEL: &str = "@cf/meta/llama-3.3-70b-instruct-fp8-fast";
pub const CLASSIFIER_MODEL: &str = "@cf/meta/llama-3.2-1b-instruct";
pub const EXTRACTOR_MODEL: &str = "@cf/meta/llama-3.2-3b-instruct";
pub const EMBEDDING_BASELINE_MODEL: &str = "@cf/baai/bge-large-en-v1.5";
pub const EMBEDDING_TIERED_MODEL: &str = "@cf/baai/bge-small-en-v1.5";

/// Built-in price table used when the config file does not list tiers.
pub fn default_tiers() -> Vec<ModelTier> {
    vec![
        ModelTier::text(LARGE_MODEL, 26_668.0, 204_805.0),
        ModelTier::text(CLASSIFIER_MODEL, 2_457.0, 18_252.0),
        ModelTier::extraction(EXTRACTOR_MODEL, 4_625.0, 30_475.0),
        ModelTier::embedding(EMBEDDING_BASELINE_MODEL, 18_582.0, 1024),
        ModelTier::embedding(EMBEDDING_TIERED_MODEL, 1_841.0, 384),
    ]
}

/// Which model id fills each role in the strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(default = "d_large")]
    pub large: String,
    #[serde(default = "d_classifier")]
    pub classifier: String,
    #[serde(default = "d_extractor")]
    pub extractor: String,
    #[serde(default = "d_embedding_baseline")]
    pub embedding_baseline: String,
    #[serde(default = "d_embedding_tiered")]
    pub embedding_tiered: String,
}

fn d_large() -> String {
    LARGE_MODEL.to_string()
}
fn d_classifier() -> String {
    CLASSIFIER_MODEL.to_string()
}
fn d_extractor() -> String {
    EXTRACTOR_MODEL.to_string()
}
fn d_embedding_baseline() -> String {
    EMBEDDING_BASELINE_MODEL.to_string()
}
fn d_embedding_tiered() -> String {
    EMBEDDING_TIERED_MODEL.to_string()
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            large: d_large(),
            classifier: d_classifier(),
            extractor: d_extractor(),
            embedding_baseline: d_embedding_baseline(),
            embedding_tiered: d_embedding_tiered(),
        }
    }
}

/// Look up a tier by id.
pub fn find_tier<'a>(tiers: &'a [ModelTier], id: &str) -> Option<&'a ModelTier> {
    tiers.iter().find(|t| t.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_roles_are_priced() {
        let tiers = default_tiers();
        let cat = ModelCatalog::default();
        for id in [
            &cat.large,
            &cat.classifier,
            &cat.extractor,
            &cat.embedding_baseline,
            &cat.embedding_tiered,
        ] {
            assert!(find_tier(&tiers, id).is_some(), "{id} missing from price table");
        }
    }

    #[test]
    fn embedding_tiers_carry_dimensions() {
        let tiers = default_tiers();
        let emb = find_tier(&tiers, EMBEDDING_TIERED_MODEL).unwrap();
        assert_eq!(emb.shape, TierShape::Embedding);
        assert_eq!(emb.dimensions, Some(384));
        assert_eq!(emb.output_price, 0.0);
    }
}
