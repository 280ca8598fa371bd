// src/analyze/search.rs
//! Vector index capability used by `semantic_search`, plus an in-memory index.

use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours of `vector`, best first.
    async fn query(&self, vector: &[f32], top_k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Brute-force cosine index. Vectors of a different length than the query are skipped.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: RwLock<Vec<(String, Vec<f32>)>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the vector stored under `id`.
    pub fn upsert(&self, id: impl Into<String>, vector: Vec<f32>) {
        let id = id.into();
        let mut entries = self.entries.write().expect("index lock poisoned");
        match entries.iter_mut().find(|(k, _)| *k == id) {
            Some(slot) => slot.1 = vector,
            None => entries.push((id, vector)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("index lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> anyhow::Result<Vec<SearchHit>> {
        let entries = self.entries.read().expect("index lock poisoned");
        let mut hits: Vec<SearchHit> = entries
            .iter()
            .filter(|(_, v)| v.len() == vector.len())
            .filter_map(|(id, v)| {
                cosine(vector, v).map(|score| SearchHit {
                    id: id.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// `None` when either vector has zero magnitude.
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_best_matches_first() {
        let idx = InMemoryIndex::new();
        idx.upsert("east", vec![1.0, 0.0]);
        idx.upsert("north", vec![0.0, 1.0]);
        idx.upsert("northeast", vec![1.0, 1.0]);
        idx.upsert("short", vec![1.0]);

        let hits = idx.query(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "east");
        assert_eq!(hits[1].id, "northeast");
    }

    #[test]
    fn upsert_replaces_existing() {
        let idx = InMemoryIndex::new();
        idx.upsert("a", vec![1.0]);
        idx.upsert("a", vec![2.0]);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn zero_vectors_have_no_similarity() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), None);
        let s = cosine(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }
}
