//! Greedy agglomerative multicut over the region adjacency graph.
//!
//! Cut probabilities from the classifier become additive merge costs
//! `ln((1 - p) / p)`; greedy additive edge contraction then repeatedly merges
//! the pair of blocks with the highest positive accumulated cost until only
//! repulsive (or neutral) contacts remain. Parallel edges between blocks sum
//! their costs, so a merge can flip a contact from attractive to repulsive.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use thiserror::Error;
use tracing::debug;

use agglo_core::Graph;

/// Clamp applied to probabilities before the log-odds transform.
const PROBABILITY_EPS: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum MulticutError {
    #[error("got {actual} edge weights for {expected} edges")]
    WeightCountMismatch { expected: usize, actual: usize },

    #[error("edge weight at index {0} is not finite")]
    NonFiniteWeight(usize),
}

/// Partition the graph given per-edge cut probabilities.
///
/// Returns one block label per node, indexed by node label; each block is
/// named by its smallest member so the labeling is deterministic. Nodes
/// touching no edge stay singleton blocks.
pub fn optimize(graph: &Graph, cut_probabilities: &[f64]) -> Result<Vec<u64>, MulticutError> {
    if cut_probabilities.len() != graph.num_edges() {
        return Err(MulticutError::WeightCountMismatch {
            expected: graph.num_edges(),
            actual: cut_probabilities.len(),
        });
    }
    for (index, p) in cut_probabilities.iter().enumerate() {
        if !p.is_finite() {
            return Err(MulticutError::NonFiniteWeight(index));
        }
    }

    let num_nodes = graph.num_nodes();
    let mut forest = UnionFind::new(num_nodes);

    // Accumulated merge cost between current block representatives.
    let mut contacts: HashMap<usize, HashMap<usize, f64>> = HashMap::new();
    let mut heap = BinaryHeap::new();

    for (edge, &p) in graph.edges().iter().zip(cut_probabilities) {
        let p = p.clamp(PROBABILITY_EPS, 1.0 - PROBABILITY_EPS);
        let cost = ((1.0 - p) / p).ln();
        let (u, v) = (edge.a() as usize, edge.b() as usize);
        if u == v {
            continue;
        }
        let entry = contacts.entry(u).or_default().entry(v).or_insert(0.0);
        *entry += cost;
        let cost = *entry;
        contacts.entry(v).or_default().insert(u, cost);
        heap.push(MergeCandidate { cost, u, v });
    }

    let mut merges = 0usize;
    while let Some(MergeCandidate { cost, u, v }) = heap.pop() {
        if cost <= 0.0 {
            break;
        }
        let ru = forest.find(u);
        let rv = forest.find(v);
        if ru == rv {
            continue;
        }
        // Stale entry: the contact was re-costed by an earlier merge.
        let current = contacts
            .get(&ru)
            .and_then(|m| m.get(&rv))
            .copied();
        if current != Some(cost) {
            continue;
        }

        let root = forest.union(ru, rv);
        let other = if root == ru { rv } else { ru };
        merges += 1;

        // Fold the absorbed block's contacts into the surviving root.
        let absorbed = contacts.remove(&other).unwrap_or_default();
        let mut root_contacts = contacts.remove(&root).unwrap_or_default();
        root_contacts.remove(&other);

        for (neighbor, cost) in absorbed {
            if neighbor == root {
                continue;
            }
            *root_contacts.entry(neighbor).or_insert(0.0) += cost;
        }

        for (&neighbor, &cost) in &root_contacts {
            if let Some(m) = contacts.get_mut(&neighbor) {
                m.remove(&ru);
                m.remove(&rv);
                m.insert(root, cost);
            }
            heap.push(MergeCandidate {
                cost,
                u: root,
                v: neighbor,
            });
        }
        contacts.insert(root, root_contacts);
    }

    debug!(nodes = num_nodes, merges, "multicut agglomeration finished");

    // Name each block by its smallest member.
    let mut block_name: HashMap<usize, u64> = HashMap::new();
    for node in 0..num_nodes {
        let root = forest.find(node);
        block_name
            .entry(root)
            .and_modify(|name| *name = (*name).min(node as u64))
            .or_insert(node as u64);
    }
    Ok((0..num_nodes)
        .map(|node| block_name[&forest.find(node)])
        .collect())
}

struct MergeCandidate {
    cost: f64,
    u: usize,
    v: usize,
}

impl PartialEq for MergeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}

impl Eq for MergeCandidate {}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost.total_cmp(&other.cost)
    }
}

/// Union-find with path compression and union by rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) -> usize {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return rx;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            Ordering::Less => {
                self.parent[rx] = ry;
                ry
            }
            Ordering::Greater => {
                self.parent[ry] = rx;
                rx
            }
            Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
                rx
            }
        }
    }
}
