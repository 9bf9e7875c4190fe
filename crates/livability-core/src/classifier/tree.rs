//! CART decision tree on Gini impurity.
//!
//! Splits are axis-aligned `x[feature] <= threshold`, with the threshold at
//! the midpoint between adjacent distinct values. Labels are class indices
//! `0..n_classes`; the owning model maps them back to livability labels.

use rand::rngs::StdRng;
use rand::seq::index;

/// Matrix of training rows plus class indices.
pub(crate) struct Dataset<'a> {
    pub rows: &'a [Vec<f32>],
    pub targets: &'a [usize],
    pub n_classes: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

/// Fitted tree. Nodes live in one arena, root at index 0.
#[derive(Debug, Clone)]
pub(crate) struct DecisionTree {
    nodes: Vec<Node>,
    depth: usize,
}

/// Candidate features per split (`None` considers all), the RNG that
/// picks them, and an optional depth cap (root = 0).
pub(crate) struct Growth<'r> {
    pub max_features: Option<usize>,
    pub max_depth: Option<usize>,
    pub rng: Option<&'r mut StdRng>,
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    impurity: f64,
}

impl DecisionTree {
    /// Grow a tree on `indices` (duplicates allowed, as in a bootstrap).
    /// Weighted Gini decrease per feature is added to `importance`.
    ///
    /// Nodes are expanded from an explicit work stack in depth-first,
    /// left-first order, so depth is bounded by memory rather than the
    /// thread stack.
    pub(crate) fn fit(
        data: &Dataset<'_>,
        indices: Vec<usize>,
        mut growth: Growth<'_>,
        importance: &mut [f64],
    ) -> Self {
        let mut nodes = vec![Node::Leaf { class: 0 }];
        let mut depth = 0;
        let mut pending = vec![(0usize, indices, 0usize)];

        while let Some((slot, indices, level)) = pending.pop() {
            depth = depth.max(level);
            let counts = class_counts(data, &indices);
            let n = indices.len();
            let parent = gini(&counts, n);
            let at_limit = growth.max_depth.map_or(false, |m| level >= m);

            let best = if n < 2 || parent == 0.0 || at_limit {
                None
            } else {
                best_split(data, &indices, &counts, parent, &mut growth)
                    .filter(|b| b.impurity < parent)
            };
            let best = match best {
                Some(b) => b,
                None => {
                    nodes[slot] = Node::Leaf { class: majority(&counts) };
                    continue;
                }
            };

            importance[best.feature] += n as f64 * (parent - best.impurity);

            let (left, right): (Vec<usize>, Vec<usize>) =
                indices.into_iter().partition(|&i| data.rows[i][best.feature] <= best.threshold);
            let (l, r) = (nodes.len(), nodes.len() + 1);
            nodes.push(Node::Leaf { class: 0 });
            nodes.push(Node::Leaf { class: 0 });
            nodes[slot] =
                Node::Split { feature: best.feature, threshold: best.threshold, left: l, right: r };
            pending.push((r, right, level + 1));
            pending.push((l, left, level + 1));
        }

        Self { nodes, depth }
    }

    pub(crate) fn predict(&self, row: &[f32]) -> usize {
        let mut at = 0;
        loop {
            match self.nodes[at] {
                Node::Leaf { class } => return class,
                Node::Split { feature, threshold, left, right } => {
                    at = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    /// Longest root-to-leaf path; a lone leaf has depth 0.
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}

fn class_counts(data: &Dataset<'_>, indices: &[usize]) -> Vec<usize> {
    let mut counts = vec![0; data.n_classes];
    for &i in indices {
        counts[data.targets[i]] += 1;
    }
    counts
}

/// Gini = 1 − Σ p_i².
fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Most frequent class; ties go to the lowest index.
fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (k, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = k;
        }
    }
    best
}

/// Features to scan at a node: a random subset first, then the rest.
/// The rest is only scanned when the subset yields no useful split.
fn candidate_features(n_features: usize, growth: &mut Growth<'_>) -> (Vec<usize>, Vec<usize>) {
    match (growth.max_features, growth.rng.as_deref_mut()) {
        (Some(m), Some(rng)) if m < n_features => {
            let mut picked = index::sample(rng, n_features, m).into_vec();
            picked.sort_unstable();
            let rest = (0..n_features).filter(|f| !picked.contains(f)).collect();
            (picked, rest)
        }
        _ => ((0..n_features).collect(), Vec::new()),
    }
}

/// Lowest weighted child impurity over the candidate features; the first
/// feature and threshold reaching it wins.
fn best_split(
    data: &Dataset<'_>,
    indices: &[usize],
    counts: &[usize],
    parent: f64,
    growth: &mut Growth<'_>,
) -> Option<BestSplit> {
    let n_features = data.rows[indices[0]].len();
    let n = indices.len();
    let mut best: Option<BestSplit> = None;
    let mut order = indices.to_vec();
    let (subset, rest) = candidate_features(n_features, growth);

    for group in [subset, rest] {
        for feature in group {
            let value = |i: usize| data.rows[i][feature];
            order.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

            let mut left = vec![0usize; data.n_classes];
            let mut right = counts.to_vec();
            for pos in 1..n {
                let moved = data.targets[order[pos - 1]];
                left[moved] += 1;
                right[moved] -= 1;

                let lo = value(order[pos - 1]);
                let hi = value(order[pos]);
                if lo >= hi {
                    continue;
                }
                let weighted =
                    pos as f64 * gini(&left, pos) + (n - pos) as f64 * gini(&right, n - pos);
                let impurity = weighted / n as f64;
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    let mid = lo + (hi - lo) / 2.0;
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some(BestSplit { feature, threshold, impurity });
                }
            }
        }
        if best.as_ref().map_or(false, |b| b.impurity < parent) {
            break;
        }
    }
    best
}
