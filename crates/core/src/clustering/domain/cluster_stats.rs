use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleImage {
    pub path: String,
    /// Cosine similarity to the cluster's first member.
    pub similarity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub size: usize,
    pub episodes: BTreeMap<String, usize>,
    pub sample_images: Vec<SampleImage>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStats {
    pub clusters: Vec<ClusterSummary>,
    pub total_clusters: usize,
    pub average_cluster_size: f64,
}

impl ClusterStats {
    pub fn from_summaries(clusters: Vec<ClusterSummary>) -> Self {
        let total_clusters = clusters.len();
        let average_cluster_size = if total_clusters == 0 {
            0.0
        } else {
            clusters.iter().map(|c| c.size).sum::<usize>() as f64 / total_clusters as f64
        };
        Self {
            clusters,
            total_clusters,
            average_cluster_size,
        }
    }
}
