//! Semantic clustering over item embeddings
//!
//! Complete-linkage, single pass over a canonical item order:
//! - an item may join a cluster only if its cosine similarity to every
//!   member exceeds the threshold
//! - among qualifying clusters it joins the one with the higher mean
//!   pairwise similarity (computed with the item included); ties go to
//!   the cluster created first
//! - otherwise it seeds a new cluster
//!
//! Clusters smaller than the minimum size are dissolved afterwards and their
//! items are dropped from cluster output.

use crate::knowledge::types::{ItemId, KnowledgeItem};
use crate::patterns::similarity::{cosine_similarity, dominant_dimension, validate_embedding};

/// Clustering parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Pairwise similarity must be strictly greater than this
    pub threshold: f64,
    /// Clusters below this size are dissolved
    pub min_cluster_size: usize,
    /// Expected embedding length; inferred when absent
    pub expected_dimension: Option<usize>,
}

/// A surviving cluster
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Members in join order
    pub member_ids: Vec<ItemId>,
    /// Mean pairwise cosine similarity
    pub mean_similarity: f64,
}

/// Item left out of clustering
#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedItem {
    pub id: ItemId,
    pub reason: String,
}

/// Result of a clustering pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterOutcome {
    pub clusters: Vec<Cluster>,
    pub excluded: Vec<ExcludedItem>,
    /// Dimension the embeddings were checked against
    pub dimension: Option<usize>,
}

/// Cluster under construction
struct Building<'a> {
    members: Vec<&'a KnowledgeItem>,
    pair_sum: f64,
    pair_count: usize,
}

impl Building<'_> {
    fn mean(&self) -> f64 {
        if self.pair_count == 0 {
            1.0
        } else {
            self.pair_sum / self.pair_count as f64
        }
    }
}

/// Cluster items that are already in canonical order
pub fn cluster_items(items: &[&KnowledgeItem], params: &ClusterParams) -> ClusterOutcome {
    let dimension = params
        .expected_dimension
        .or_else(|| dominant_dimension(items.iter().map(|item| item.embedding.as_slice())));

    let Some(dimension) = dimension else {
        // No item carries an embedding
        return ClusterOutcome {
            clusters: Vec::new(),
            excluded: items
                .iter()
                .map(|item| ExcludedItem {
                    id: item.id.clone(),
                    reason: "embedding is empty".to_string(),
                })
                .collect(),
            dimension: None,
        };
    };

    let mut excluded = Vec::new();
    let mut building: Vec<Building<'_>> = Vec::new();

    for item in items {
        if let Err(defect) = validate_embedding(&item.embedding, dimension) {
            tracing::warn!(item = %item.id, %defect, "excluding item from clustering");
            excluded.push(ExcludedItem {
                id: item.id.clone(),
                reason: defect.to_string(),
            });
            continue;
        }

        // (cluster index, similarity sum against members, mean with item)
        let mut best: Option<(usize, f64, f64)> = None;
        for (idx, cluster) in building.iter().enumerate() {
            let mut sum = 0.0;
            let mut qualifies = true;
            for member in &cluster.members {
                let sim = cosine_similarity(&item.embedding, &member.embedding);
                if sim <= params.threshold {
                    qualifies = false;
                    break;
                }
                sum += sim;
            }
            if !qualifies {
                continue;
            }

            let pairs = cluster.pair_count + cluster.members.len();
            let mean = (cluster.pair_sum + sum) / pairs as f64;
            match best {
                Some((_, _, best_mean)) if best_mean >= mean => {}
                _ => best = Some((idx, sum, mean)),
            }
        }

        match best {
            Some((idx, sum, _)) => {
                let cluster = &mut building[idx];
                cluster.pair_count += cluster.members.len();
                cluster.pair_sum += sum;
                cluster.members.push(item);
            }
            None => building.push(Building {
                members: vec![item],
                pair_sum: 0.0,
                pair_count: 0,
            }),
        }
    }

    let clusters = building
        .into_iter()
        .filter(|cluster| cluster.members.len() >= params.min_cluster_size)
        .map(|cluster| Cluster {
            mean_similarity: cluster.mean(),
            member_ids: cluster.members.iter().map(|m| m.id.clone()).collect(),
        })
        .collect();

    ClusterOutcome {
        clusters,
        excluded,
        dimension: Some(dimension),
    }
}
