//! Item clustering over transcript embeddings.
//!
//! Each item is represented by the centroid of its chunk vectors. Items whose
//! centroids are at least `similarity_threshold` similar are linked, and the
//! connected components of that graph are the clusters. Iteration is in item
//! id order throughout, so the same input always yields the same clusters.

use std::collections::BTreeMap;

use uuid::Uuid;

use sift_core::{centroid, cosine_similarity, defaults, Embedding};

/// Clustering parameters.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub similarity_threshold: f32,
    pub min_cluster_size: usize,
    pub max_clusters: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: defaults::TOPIC_SIMILARITY_THRESHOLD,
            min_cluster_size: defaults::TOPIC_MIN_CLUSTER_SIZE,
            max_clusters: defaults::TOPIC_MAX_CLUSTERS,
        }
    }
}

impl ClusterConfig {
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size.max(1);
        self
    }

    pub fn with_max_clusters(mut self, max: usize) -> Self {
        self.max_clusters = max;
        self
    }
}

/// An item reduced to one vector.
#[derive(Debug, Clone)]
pub struct ItemVector {
    pub item_id: Uuid,
    pub vector: Vec<f32>,
}

/// Item ids grouped into one cluster, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub item_ids: Vec<Uuid>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

/// Centroid of each owner's chunk vectors, sorted by owner id.
pub fn item_centroids(embeddings: &[Embedding]) -> Vec<ItemVector> {
    let mut by_owner: BTreeMap<Uuid, Vec<&[f32]>> = BTreeMap::new();
    for embedding in embeddings {
        by_owner
            .entry(embedding.owner_id)
            .or_default()
            .push(embedding.vector.as_slice());
    }
    by_owner
        .into_iter()
        .filter_map(|(item_id, vectors)| {
            centroid(vectors).map(|vector| ItemVector { item_id, vector })
        })
        .collect()
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Join two sets; the smaller index becomes the root.
    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Group items into clusters.
///
/// Clusters below `min_cluster_size` are dropped. The rest are returned
/// largest first (ties by smallest member id), at most `max_clusters`.
pub fn cluster_items(items: &[ItemVector], config: &ClusterConfig) -> Vec<Cluster> {
    let mut sorted: Vec<&ItemVector> = items.iter().collect();
    sorted.sort_by_key(|item| item.item_id);
    sorted.dedup_by_key(|item| item.item_id);

    let mut sets = UnionFind::new(sorted.len());
    for i in 0..sorted.len() {
        for j in (i + 1)..sorted.len() {
            if cosine_similarity(&sorted[i].vector, &sorted[j].vector) >= config.similarity_threshold {
                sets.union(i, j);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<Uuid>> = BTreeMap::new();
    for (i, item) in sorted.iter().enumerate() {
        let root = sets.find(i);
        groups.entry(root).or_default().push(item.item_id);
    }

    let mut clusters: Vec<Cluster> = groups
        .into_values()
        .filter(|ids| ids.len() >= config.min_cluster_size.max(1))
        .map(|item_ids| Cluster { item_ids })
        .collect();
    clusters.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| a.item_ids[0].cmp(&b.item_ids[0]))
    });
    clusters.truncate(config.max_clusters);
    clusters
}
