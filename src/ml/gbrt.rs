//! Gradient-boosted regression trees
//!
//! Squared-error boosting: start from the target mean, then fit each tree
//! to the current residuals and add it scaled by the learning rate.

use super::Regressor;
use crate::config::ModelConfig;
use crate::error::{Result, SentinelError};

#[derive(Debug, Clone)]
pub struct GbrtParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
}

impl Default for GbrtParams {
    fn default() -> Self {
        Self {
            n_estimators: 120,
            max_depth: 3,
            learning_rate: 0.05,
            min_samples_leaf: 1,
        }
    }
}

impl From<&ModelConfig> for GbrtParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            learning_rate: config.learning_rate,
            min_samples_leaf: config.min_samples_leaf.max(1),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One regression tree stored as an arena; node 0 is the root
#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn fit(x: &[Vec<f64>], residuals: &[f64], params: &GbrtParams) -> Self {
        let mut tree = Tree { nodes: Vec::new() };
        let indices: Vec<usize> = (0..residuals.len()).collect();
        tree.grow(x, residuals, indices, 0, params);
        tree
    }

    fn grow(&mut self, x: &[Vec<f64>], r: &[f64], indices: Vec<usize>, depth: usize, params: &GbrtParams) -> usize {
        let id = self.nodes.len();
        let mean = indices.iter().map(|&i| r[i]).sum::<f64>() / indices.len().max(1) as f64;
        self.nodes.push(Node::Leaf(mean));

        if depth >= params.max_depth || indices.len() < 2 * params.min_samples_leaf {
            return id;
        }
        let Some((feature, threshold)) = best_split(x, r, &indices, params.min_samples_leaf) else {
            return id;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| x[i][feature] <= threshold);
        let left = self.grow(x, r, left_idx, depth + 1, params);
        let right = self.grow(x, r, right_idx, depth + 1, params);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn predict(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    id = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Split that most reduces squared error, if any improves on the parent
fn best_split(x: &[Vec<f64>], r: &[f64], indices: &[usize], min_leaf: usize) -> Option<(usize, f64)> {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| r[i]).sum();
    let parent_score = total * total / n as f64;
    let n_features = x.get(indices[0]).map(|row| row.len()).unwrap_or(0);

    let mut best: Option<(usize, f64, f64)> = None;
    for feature in 0..n_features {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += r[sorted[k]];
            let left_n = k + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }
            let here = x[sorted[k]][feature];
            let next = x[sorted[k + 1]][feature];
            if here == next {
                continue;
            }
            let right_sum = total - left_sum;
            let score = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;
            let gain = score - parent_score;
            if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                best = Some((feature, (here + next) / 2.0, gain));
            }
        }
    }
    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// Boosted ensemble of regression trees
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    params: GbrtParams,
    base: f64,
    trees: Vec<Tree>,
}

impl GradientBoostedTrees {
    pub fn new(params: GbrtParams) -> Self {
        Self {
            params,
            base: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoostedTrees {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if x.is_empty() || x.len() != y.len() {
            return Err(SentinelError::DataUnavailable(format!(
                "cannot fit on {} rows and {} targets",
                x.len(),
                y.len()
            )));
        }

        self.base = y.iter().sum::<f64>() / y.len() as f64;
        self.trees.clear();
        let mut current = vec![self.base; y.len()];

        for _ in 0..self.params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let tree = Tree::fit(x, &residuals, &self.params);
            for (pred, row) in current.iter_mut().zip(x) {
                *pred += self.params.learning_rate * tree.predict(row);
            }
            self.trees.push(tree);
        }
        Ok(())
    }

    fn predict(&self, row: &[f64]) -> f64 {
        self.base
            + self
                .trees
                .iter()
                .map(|t| self.params.learning_rate * t.predict(row))
                .sum::<f64>()
    }
}
