//! Two-pass identity clustering over cached embeddings.
//!
//! Pass 1 assigns images greedily in index order against each cluster's
//! representative. Pass 2 folds clusters smaller than `MIN_CLUSTER_SIZE`
//! into their best match until nothing changes. Both passes are
//! deterministic for a fixed input order and threshold.

use std::path::Path;

use crate::cache::infrastructure::cache_store::CacheStore;
use crate::clustering::domain::cluster::Cluster;
use crate::clustering::domain::cluster_stats::{ClusterStats, ClusterSummary, SampleImage};
use crate::detection::domain::face_attributes::attribute_match;
use crate::embedding::domain::face_embedding::FaceEmbedding;
use crate::shared::similarity::{average_pairwise_similarity, cosine_similarity};

pub const MIN_CLUSTER_SIZE: usize = 2;
pub const MERGE_THRESHOLD: f64 = 0.6;
pub const MAX_SAMPLE_IMAGES: usize = 5;

const EMBEDDING_WEIGHT: f64 = 0.7;
const ATTRIBUTE_WEIGHT: f64 = 0.3;

const UNKNOWN_EPISODE: &str = "unknown";

/// Name of the directory holding the frame, `unknown` when there is none.
pub fn episode_key(path: &str) -> String {
    Path::new(path)
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN_EPISODE)
        .to_string()
}

fn attribute_term(a: &FaceEmbedding, b: &FaceEmbedding) -> f64 {
    let (a_attrs, a_conf) = a.attribute_signature();
    let (b_attrs, b_conf) = b.attribute_signature();
    attribute_match(&a_attrs, &a_conf, &b_attrs, &b_conf)
}

fn combined(embedding_similarity: f64, attribute_similarity: f64) -> f64 {
    EMBEDDING_WEIGHT * embedding_similarity + ATTRIBUTE_WEIGHT * attribute_similarity
}

/// Clusters `records` in slice order. Records without faces are ignored.
pub fn cluster_embeddings(records: &[FaceEmbedding], similarity_threshold: f64) -> ClusterStats {
    let mut clusters = assign(records, similarity_threshold);
    merge_small(records, &mut clusters);
    summarize(records, clusters)
}

/// Pass 1: join the best cluster scoring strictly above the threshold, the
/// earliest one on ties, else start a new cluster.
fn assign(records: &[FaceEmbedding], similarity_threshold: f64) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        if record.faces == 0 || record.embedding.is_empty() {
            continue;
        }

        let mut best: Option<(usize, f64)> = None;
        for (ci, cluster) in clusters.iter().enumerate() {
            let rep = &records[cluster.representative];
            let score = combined(
                cosine_similarity(&record.embedding, &rep.embedding),
                attribute_term(record, rep),
            );
            if score > similarity_threshold && best.map_or(true, |(_, b)| score > b) {
                best = Some((ci, score));
            }
        }

        let episode = episode_key(&record.path);
        match best {
            Some((ci, _)) => clusters[ci].push(idx, episode),
            None => clusters.push(Cluster::new(idx, episode)),
        }
    }
    clusters
}

/// Pass 2: fold each small cluster into its best partner above
/// `MERGE_THRESHOLD`, restarting the scan after every merge.
fn merge_small(records: &[FaceEmbedding], clusters: &mut Vec<Cluster>) {
    loop {
        let candidate = (0..clusters.len())
            .filter(|&i| clusters[i].len() < MIN_CLUSTER_SIZE)
            .find_map(|i| best_partner(records, clusters, i).map(|j| (i, j)));

        let Some((small, target)) = candidate else {
            break;
        };
        let absorbed = clusters.remove(small);
        let target = if target > small { target - 1 } else { target };
        log::trace!(
            "Merging cluster of {} into cluster of {}",
            absorbed.len(),
            clusters[target].len()
        );
        clusters[target].absorb(absorbed);
    }
}

fn best_partner(records: &[FaceEmbedding], clusters: &[Cluster], small: usize) -> Option<usize> {
    let vectors = |c: &Cluster| -> Vec<&[f32]> {
        c.members
            .iter()
            .map(|&m| records[m].embedding.as_slice())
            .collect()
    };
    let small_vectors = vectors(&clusters[small]);
    let small_rep = &records[clusters[small].representative];

    let mut best: Option<(usize, f64)> = None;
    for (j, other) in clusters.iter().enumerate() {
        if j == small {
            continue;
        }
        let score = combined(
            average_pairwise_similarity(&small_vectors, &vectors(other)),
            attribute_term(small_rep, &records[other.representative]),
        );
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((j, score));
        }
    }
    best.filter(|&(_, score)| score > MERGE_THRESHOLD)
        .map(|(j, _)| j)
}

fn summarize(records: &[FaceEmbedding], clusters: Vec<Cluster>) -> ClusterStats {
    let mut kept: Vec<Cluster> = clusters
        .into_iter()
        .filter(|c| c.len() >= MIN_CLUSTER_SIZE)
        .collect();
    kept.sort_by(|a, b| b.len().cmp(&a.len()));

    let summaries = kept
        .into_iter()
        .map(|cluster| {
            let first = &records[cluster.members[0]];
            let mut samples: Vec<SampleImage> = cluster
                .members
                .iter()
                .map(|&m| SampleImage {
                    path: records[m].path.clone(),
                    similarity: cosine_similarity(&first.embedding, &records[m].embedding),
                })
                .collect();
            samples.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            samples.truncate(MAX_SAMPLE_IMAGES);

            ClusterSummary {
                size: cluster.len(),
                episodes: cluster.episodes,
                sample_images: samples,
            }
        })
        .collect();

    ClusterStats::from_summaries(summaries)
}

/// Clusters everything the cache currently holds, in index order.
pub struct ClusterEngine<'a> {
    store: &'a CacheStore,
}

impl<'a> ClusterEngine<'a> {
    pub fn new(store: &'a CacheStore) -> Self {
        Self { store }
    }

    pub fn cluster(&self, similarity_threshold: f64) -> ClusterStats {
        let index = self.store.load();
        let records = self.store.load_embeddings(&index);
        log::info!(
            "Clustering {} embeddings at threshold {similarity_threshold}",
            records.len()
        );
        let stats = cluster_embeddings(&records, similarity_threshold);
        log::info!(
            "Found {} clusters (average size {:.1})",
            stats.total_clusters,
            stats.average_cluster_size
        );
        stats
    }
}
