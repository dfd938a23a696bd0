use crate::config;
use crate::error::{ConfigError, Result, check_len, check_radius, check_threshold};
use crate::query::NeighborQuery;
use num_complex::Complex64;
use rayon::prelude::*;
use tracing::{debug, info_span};

/// Disjoint-set forest with path compression and union by rank.
#[derive(Clone, Debug)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merges the sets holding `a` and `b`. Returns false if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    /// Zero-based labels numbered in order of first appearance over `0..n`.
    ///
    /// Returns the label array and the number of distinct sets.
    pub fn canonical_labels(&mut self) -> (Vec<usize>, usize) {
        let n = self.len();
        let mut root_label = vec![usize::MAX; n];
        let mut labels = Vec::with_capacity(n);
        let mut next = 0;
        for i in 0..n {
            let root = self.find(i);
            if root_label[root] == usize::MAX {
                root_label[root] = next;
                next += 1;
            }
            labels.push(root_label[root]);
        }
        (labels, next)
    }
}

/// Undirected bond between particles `i < j`.
///
/// `score` is the similarity seen from `i`; the score seen from `j` is its
/// conjugate, so the real part used for thresholds is symmetric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bond {
    pub i: usize,
    pub j: usize,
    pub score: Complex64,
}

/// Shared solid-like neighbor count of a candidate pair `i < j`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedCount {
    pub i: usize,
    pub j: usize,
    pub shared: usize,
}

/// Scaling of the coefficient dot product used as a bond score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DotNormalization {
    /// `sum_m q_i conj(q_j) / (|q_i| |q_j|)`; zero when either norm vanishes.
    #[default]
    Normalized,
    /// The raw dot product. Thresholds live on a different numeric scale.
    Raw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BondPolicy {
    /// Bond `i, j` when their own score clears the bond threshold and both are solid-like.
    Direct,
    /// Bond `i, j` when they share more than `shared_threshold` solid-like neighbors.
    SharedNeighbors { shared_threshold: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterParams {
    /// Pairs closer than this enter the bond table and the connection counts.
    pub bond_radius: f64,
    /// Pairs closer than this are candidates for merging clusters.
    pub cluster_radius: f64,
    /// A bond is solid-like when the real part of its score exceeds this.
    pub bond_threshold: f64,
    /// Solid-like particles have at least this many solid-like bonds.
    pub solid_threshold: usize,
    pub normalization: DotNormalization,
    pub policy: BondPolicy,
}

impl ClusterParams {
    pub fn direct(
        bond_radius: f64,
        cluster_radius: f64,
        bond_threshold: f64,
        solid_threshold: usize,
        normalization: DotNormalization,
    ) -> Self {
        Self {
            bond_radius,
            cluster_radius,
            bond_threshold,
            solid_threshold,
            normalization,
            policy: BondPolicy::Direct,
        }
    }

    pub fn shared_neighbors(
        bond_radius: f64,
        cluster_radius: f64,
        bond_threshold: f64,
        solid_threshold: usize,
        shared_threshold: usize,
    ) -> Self {
        Self {
            bond_radius,
            cluster_radius,
            bond_threshold,
            solid_threshold,
            normalization: DotNormalization::Normalized,
            policy: BondPolicy::SharedNeighbors { shared_threshold },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_radius("bond radius", self.bond_radius)?;
        check_radius("cluster radius", self.cluster_radius)?;
        check_threshold("bond threshold", self.bond_threshold)?;
        Ok(())
    }
}

/// Output of one clustering pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterResult {
    cluster_ids: Vec<usize>,
    num_clusters: usize,
    number_of_connections: Vec<usize>,
    shared_counts: Vec<SharedCount>,
    bonds: Vec<Bond>,
    solid_threshold: usize,
}

impl ClusterResult {
    pub fn cluster_ids(&self) -> &[usize] {
        &self.cluster_ids
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// Solid-like bonds per particle.
    pub fn number_of_connections(&self) -> &[usize] {
        &self.number_of_connections
    }

    /// Shared-neighbor counts of every candidate pair; empty for the direct policy.
    pub fn shared_counts(&self) -> &[SharedCount] {
        &self.shared_counts
    }

    /// Every pair within the bond radius with its score, ordered by `(i, j)`.
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Whether particle `i` has enough solid-like bonds. False for indices
    /// outside the snapshot.
    pub fn is_solid_like(&self, i: usize) -> bool {
        self.number_of_connections
            .get(i)
            .is_some_and(|&c| c >= self.solid_threshold)
    }

    /// Solid-like member count of each cluster having at least one, largest first.
    pub fn cluster_size_histogram(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_clusters];
        for (i, &id) in self.cluster_ids.iter().enumerate() {
            if self.is_solid_like(i) {
                counts[id] += 1;
            }
        }
        counts.retain(|&c| c > 0);
        counts.sort_unstable_by(|a, b| b.cmp(a));
        counts
    }

    pub fn largest_cluster_size(&self) -> usize {
        self.cluster_size_histogram().first().copied().unwrap_or(0)
    }
}

/// Groups particles into clusters of mutually bonded solid-like particles.
///
/// `coefficients[i]` is particle `i`'s coefficient vector; all vectors must
/// have the same length. Both radii must be served by the query's index.
pub fn cluster_by_bond_threshold(
    query: &NeighborQuery<'_>,
    coefficients: &[Vec<Complex64>],
    params: &ClusterParams,
) -> Result<ClusterResult> {
    params.validate()?;
    query.check_radius(params.bond_radius)?;
    query.check_radius(params.cluster_radius)?;
    let n = query.len();
    check_len("coefficient vectors", n, coefficients.len())?;
    if let Some(first) = coefficients.first() {
        for row in coefficients {
            check_len("coefficient vector", first.len(), row.len())?;
        }
    }

    let _span = info_span!("cluster_by_bond_threshold", n_particles = n, policy = ?params.policy).entered();
    let scorer = Scorer::new(coefficients, params.normalization);
    let bonds = bond_table(query, params.bond_radius, &scorer);

    let mut number_of_connections = vec![0usize; n];
    let mut solid_neighbors: Vec<Vec<usize>> = match params.policy {
        BondPolicy::Direct => Vec::new(),
        BondPolicy::SharedNeighbors { .. } => vec![Vec::new(); n],
    };
    for bond in &bonds {
        if bond.score.re > params.bond_threshold {
            number_of_connections[bond.i] += 1;
            number_of_connections[bond.j] += 1;
            if let Some(list) = solid_neighbors.get_mut(bond.i) {
                list.push(bond.j);
            }
            if let Some(list) = solid_neighbors.get_mut(bond.j) {
                list.push(bond.i);
            }
        }
    }
    for list in &mut solid_neighbors {
        list.sort_unstable();
    }
    debug!(n_bonds = bonds.len(), "bond table built");

    // Merging is sequential; it runs after the bond table is complete.
    let mut forest = DisjointSet::new(n);
    let mut shared_counts = Vec::new();
    for i in 0..n {
        query.for_each_neighbor_unchecked(i, params.cluster_radius, |nb| {
            let j = nb.index;
            if j <= i {
                return;
            }
            let bonded = match params.policy {
                BondPolicy::Direct => {
                    number_of_connections[i] >= params.solid_threshold
                        && number_of_connections[j] >= params.solid_threshold
                        && scorer.score(i, j).re > params.bond_threshold
                }
                BondPolicy::SharedNeighbors { shared_threshold } => {
                    let shared = count_shared(&solid_neighbors[i], &solid_neighbors[j]);
                    shared_counts.push(SharedCount { i, j, shared });
                    shared > shared_threshold
                }
            };
            if bonded {
                forest.union(i, j);
            }
        });
    }
    shared_counts.sort_unstable_by_key(|c| (c.i, c.j));

    let (cluster_ids, num_clusters) = forest.canonical_labels();
    debug!(num_clusters, "clusters labeled");

    Ok(ClusterResult {
        cluster_ids,
        num_clusters,
        number_of_connections,
        shared_counts,
        bonds,
        solid_threshold: params.solid_threshold,
    })
}

struct Scorer<'a> {
    coefficients: &'a [Vec<Complex64>],
    norms: Option<Vec<f64>>,
}

impl<'a> Scorer<'a> {
    fn new(coefficients: &'a [Vec<Complex64>], normalization: DotNormalization) -> Self {
        let norms = match normalization {
            DotNormalization::Normalized => Some(
                coefficients
                    .iter()
                    .map(|q| q.iter().map(Complex64::norm_sqr).sum::<f64>().sqrt())
                    .collect(),
            ),
            DotNormalization::Raw => None,
        };
        Self {
            coefficients,
            norms,
        }
    }

    fn score(&self, i: usize, j: usize) -> Complex64 {
        let dot: Complex64 = self.coefficients[i]
            .iter()
            .zip(&self.coefficients[j])
            .map(|(a, b)| a * b.conj())
            .sum();
        match &self.norms {
            None => dot,
            Some(norms) => {
                let denom = norms[i] * norms[j];
                if denom > 0.0 {
                    dot / denom
                } else {
                    Complex64::new(0.0, 0.0)
                }
            }
        }
    }
}

/// Scores every pair `i < j` within `radius`, ordered by `(i, j)`.
fn bond_table(query: &NeighborQuery<'_>, radius: f64, scorer: &Scorer<'_>) -> Vec<Bond> {
    let n = query.len();
    let bonds_of = |i: usize| {
        let mut bonds = Vec::new();
        query.for_each_neighbor_unchecked(i, radius, |nb| {
            if nb.index > i {
                bonds.push(Bond {
                    i,
                    j: nb.index,
                    score: scorer.score(i, nb.index),
                });
            }
        });
        bonds.sort_unstable_by_key(|b| b.j);
        bonds
    };

    let per_particle: Vec<Vec<Bond>> = if n < config::get_parallel_threshold() {
        (0..n).map(bonds_of).collect()
    } else {
        (0..n)
            .into_par_iter()
            .with_min_len(config::min_chunk_len(n))
            .map(bonds_of)
            .collect()
    };
    per_particle.into_iter().flatten().collect()
}

/// Size of the intersection of two sorted index lists.
fn count_shared(a: &[usize], b: &[usize]) -> usize {
    let (mut x, mut y, mut shared) = (0, 0, 0);
    while x < a.len() && y < b.len() {
        match a[x].cmp(&b[y]) {
            std::cmp::Ordering::Less => x += 1,
            std::cmp::Ordering::Greater => y += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                x += 1;
                y += 1;
            }
        }
    }
    shared
}
