use serde::{Deserialize, Serialize};

/// Identifier assigned to each recompute request at enqueue time.
///
/// Strictly increasing, starting at 0 for a fresh workflow.
pub type SolutionId = i64;

/// An unordered pair of fragment node labels naming a graph edge.
///
/// The constructor normalizes endpoint order, so `(a, b)` and `(b, a)` hash
/// and compare equal and can be used interchangeably as map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    a: u64,
    b: u64,
}

impl Edge {
    pub fn new(u: u64, v: u64) -> Self {
        if u <= v {
            Self { a: u, b: v }
        } else {
            Self { a: v, b: u }
        }
    }

    /// Smaller endpoint.
    pub fn a(&self) -> u64 {
        self.a
    }

    /// Larger endpoint.
    pub fn b(&self) -> u64 {
        self.b
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.a, self.b)
    }
}

/// Dense row-major matrix of per-edge feature vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl FeatureMatrix {
    /// Build a matrix from row-major data.
    ///
    /// # Panics
    /// Panics if `data.len() != rows * cols`.
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "feature matrix data length must equal rows * cols"
        );
        Self { data, rows, cols }
    }

    /// A matrix with zero rows and the given column count.
    pub fn empty(cols: usize) -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// One feature row.
    ///
    /// # Panics
    /// Panics if `row >= rows`.
    pub fn row(&self, row: usize) -> &[f64] {
        assert!(row < self.rows, "row {} out of range ({})", row, self.rows);
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// New matrix containing the given rows, in the given order.
    ///
    /// # Panics
    /// Panics if any index is out of range.
    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        FeatureMatrix::new(data, indices.len(), self.cols)
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }
}

/// Region adjacency graph derived from the edge list.
///
/// Node labels are dense enough in practice that the solution array is indexed
/// directly by node label: `num_nodes` is the largest endpoint plus one.
#[derive(Debug, Clone)]
pub struct Graph {
    num_nodes: usize,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn from_edges(edges: Vec<Edge>) -> Self {
        let num_nodes = edges
            .iter()
            .map(|e| e.b() as usize + 1)
            .max()
            .unwrap_or(0);
        Self { num_nodes, edges }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}
