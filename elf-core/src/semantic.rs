//! Semantic heuristic retrieval over a pluggable embedding backend.
//!
//! When no real embedding backend is configured, a deterministic
//! bag-of-words backend keeps the operation functional; it reports itself as
//! non-semantic so callers can tell the modes apart. Embeddings are cached
//! to disk keyed by the hash of the embedded text.

use crate::error::Result;
use crate::model::Heuristic;
use crate::storage::{HeuristicQuery, Store};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, instrument, warn};

/// Dimension of the fallback bag-of-words vectors
const BOW_DIMENSION: usize = 256;

/// A pluggable embedding backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed one text into a dense vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Whether results may be described as semantic. The bag-of-words
    /// fallback returns false.
    fn is_semantic(&self) -> bool;
}

/// Deterministic normalized bag-of-words fallback. Never claims to be
/// semantic; exists so `query_semantic` stays correct without a backend.
#[derive(Debug, Default)]
pub struct BagOfWordsBackend;

#[async_trait]
impl EmbeddingBackend for BagOfWordsBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; BOW_DIMENSION];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let bucket = word_bucket(word);
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn name(&self) -> &'static str {
        "bag-of-words"
    }

    fn is_semantic(&self) -> bool {
        false
    }
}

/// Stable FNV-1a bucket for a word.
fn word_bucket(word: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % BOW_DIMENSION as u64) as usize
}

/// Cosine similarity of two vectors; 0.0 on dimension mismatch or zero
/// norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    f64::from(dot / (norm_a * norm_b))
}

/// A heuristic scored against a task description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredHeuristic {
    pub heuristic: Heuristic,
    pub similarity: f64,
    /// Similarity plus the confidence/evidence boost
    pub score: f64,
    /// Whether the backend that produced this result is semantic
    pub semantic: bool,
}

/// Semantic searcher over the heuristic table.
pub struct SemanticSearcher<S> {
    store: S,
    backend: Box<dyn EmbeddingBackend>,
    cache_dir: Option<PathBuf>,
}

impl<S: AsRef<dyn Store>> SemanticSearcher<S> {
    pub fn new(store: S, backend: Box<dyn EmbeddingBackend>, cache_dir: Option<PathBuf>) -> Self {
        Self { store, backend, cache_dir }
    }

    /// Searcher with the non-semantic fallback backend.
    pub fn with_fallback(store: S, cache_dir: Option<PathBuf>) -> Self {
        Self::new(store, Box::new(BagOfWordsBackend), cache_dir)
    }

    /// Embed with the disk cache keyed by content hash.
    async fn embed_cached(&self, text: &str) -> Result<Vec<f32>> {
        let Some(cache_dir) = &self.cache_dir else {
            return self.backend.embed(text).await;
        };

        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(format!("{}:{}", self.backend.name(), text));
        let key: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        let cache_file = cache_dir.join(format!("{key}.json"));

        if let Ok(raw) = tokio::fs::read(&cache_file).await {
            if let Ok(vector) = serde_json::from_slice::<Vec<f32>>(&raw) {
                return Ok(vector);
            }
        }

        let vector = self.backend.embed(text).await?;
        if let Err(e) = async {
            tokio::fs::create_dir_all(cache_dir).await?;
            tokio::fs::write(&cache_file, serde_json::to_vec(&vector)?).await?;
            Ok::<(), crate::error::Error>(())
        }
        .await
        {
            warn!(error = %e, "Failed to write embedding cache");
        }
        Ok(vector)
    }

    /// Rank heuristics against a task: cosine similarity at or above the
    /// threshold, boosted by `confidence * 0.1 + min(times_validated * 0.01,
    /// 0.1)`, best first.
    #[instrument(skip(self, task))]
    pub async fn query(
        &self,
        task: &str,
        threshold: f64,
        limit: i64,
        domain: Option<&str>,
        current_location: Option<&str>,
    ) -> Result<Vec<ScoredHeuristic>> {
        let task_vector = self.embed_cached(task).await?;
        let heuristics = self
            .store
            .as_ref()
            .list_heuristics(&HeuristicQuery {
                domain: domain.map(str::to_string),
                current_location: current_location.map(str::to_string),
                include_dormant: false,
                limit: None,
            })
            .await?;

        let mut scored = Vec::new();
        for heuristic in heuristics {
            let text = match &heuristic.explanation {
                Some(explanation) => format!("{} {explanation}", heuristic.rule),
                None => heuristic.rule.clone(),
            };
            let vector = self.embed_cached(&text).await?;
            let similarity = cosine_similarity(&task_vector, &vector);
            if similarity < threshold {
                continue;
            }
            let boost = heuristic.confidence * 0.1
                + (heuristic.times_validated as f64 * 0.01).min(0.1);
            scored.push(ScoredHeuristic {
                score: similarity + boost,
                similarity,
                semantic: self.backend.is_semantic(),
                heuristic,
            });
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit as usize);
        debug!(results = scored.len(), backend = self.backend.name(), "Semantic query complete");
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn bag_of_words_is_deterministic_and_normalized() {
        let backend = BagOfWordsBackend;
        let a = backend.embed("refactor the authentication module").await.unwrap();
        let b = backend.embed("refactor the authentication module").await.unwrap();
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn overlapping_texts_score_higher_than_disjoint() {
        let backend = BagOfWordsBackend;
        let task = backend.embed("fix authentication token refresh").await.unwrap();
        let related = backend.embed("authentication token rotation rules").await.unwrap();
        let unrelated = backend.embed("optimize chess engine evaluation").await.unwrap();

        assert!(
            cosine_similarity(&task, &related) > cosine_similarity(&task, &unrelated)
        );
    }

    #[test]
    fn fallback_backend_never_claims_semantics() {
        assert!(!BagOfWordsBackend.is_semantic());
    }
}
