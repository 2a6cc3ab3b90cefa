//! Pairwise comparison and nearest-neighbour search over embeddings.
//!
//! Read-only with respect to the cache.

use serde::Serialize;

use crate::cache::infrastructure::cache_store::CacheStore;
use crate::embedding::domain::face_embedding::FaceEmbedding;
use crate::embedding::embedding_generator::{EmbeddingError, FaceEmbedder};
use crate::shared::constants::DEFAULT_SIMILARITY_THRESHOLD;
use crate::shared::similarity::cosine_similarity;

pub const DEFAULT_MATCH_LIMIT: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub similarity: f64,
    pub alignment_score1: f64,
    pub alignment_score2: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub path: String,
    pub similarity: f64,
    pub faces: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchOptions {
    pub threshold: f64,
    pub limit: usize,
    pub min_faces: Option<usize>,
    pub max_faces: Option<usize>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            limit: DEFAULT_MATCH_LIMIT,
            min_faces: None,
            max_faces: None,
        }
    }
}

impl MatchOptions {
    fn accepts(&self, faces: usize) -> bool {
        self.min_faces.map_or(true, |min| faces >= min)
            && self.max_faces.map_or(true, |max| faces <= max)
    }
}

/// Linear cosine scan: keeps candidates at or above `threshold`, best first,
/// at most `limit` of them. Candidates of another dimension are skipped.
pub fn search<'a, I>(query: &[f32], candidates: I, threshold: f64, limit: usize) -> Vec<Match>
where
    I: IntoIterator<Item = &'a FaceEmbedding>,
{
    let mut matches: Vec<Match> = candidates
        .into_iter()
        .filter(|c| {
            let comparable = c.embedding.len() == query.len();
            if !comparable {
                log::warn!(
                    "Skipping {}: {}-dim embedding, query has {}",
                    c.path,
                    c.embedding.len(),
                    query.len()
                );
            }
            comparable
        })
        .map(|c| Match {
            path: c.path.clone(),
            similarity: cosine_similarity(query, &c.embedding),
            faces: c.faces,
        })
        .filter(|m| m.similarity >= threshold)
        .collect();
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(limit);
    matches
}

/// `search` over every cached embedding, pre-filtered by face count.
pub fn find_matches(store: &CacheStore, query: &[f32], options: &MatchOptions) -> Vec<Match> {
    let index = store.load();
    let records = store.load_embeddings(&index);
    let candidates = records.iter().filter(|r| options.accepts(r.faces));
    search(query, candidates, options.threshold, options.limit)
}

/// Embeds query images on demand through the wrapped embedder.
pub struct ComparisonService {
    embedder: Box<dyn FaceEmbedder>,
}

impl ComparisonService {
    pub fn new(embedder: Box<dyn FaceEmbedder>) -> Self {
        Self { embedder }
    }

    /// `None` when either image holds no face.
    pub fn compare(
        &mut self,
        image_a: &[u8],
        image_b: &[u8],
    ) -> Result<Option<Comparison>, EmbeddingError> {
        let Some(a) = self.embedder.generate(image_a)? else {
            return Ok(None);
        };
        let Some(b) = self.embedder.generate(image_b)? else {
            return Ok(None);
        };
        Ok(Some(Comparison {
            similarity: cosine_similarity(&a.embedding, &b.embedding),
            alignment_score1: a.alignment_score(),
            alignment_score2: b.alignment_score(),
        }))
    }

    /// Cached images resembling `image`. Empty when the image holds no face.
    pub fn find_similar(
        &mut self,
        store: &CacheStore,
        image: &[u8],
        options: &MatchOptions,
    ) -> Result<Vec<Match>, EmbeddingError> {
        Ok(match self.embedder.generate(image)? {
            Some(query) => find_matches(store, &query.embedding, options),
            None => Vec::new(),
        })
    }
}
