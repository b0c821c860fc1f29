//! Built-in estimator variants
//!
//! Small, deterministic estimators that ship with the registry so
//! every dispatch path (regression, classification, inductive and
//! transductive clustering) is usable out of the box. Anything heavier
//! belongs in an external [`EstimatorVariant`] implementation.

use super::{Estimator, EstimatorFamily, EstimatorVariant};
use crate::config::Hyperparameters;
use crate::error::ModelError;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Default ridge term for the least-squares solver. Keeps the normal
/// equations solvable on collinear inputs without visibly biasing the
/// solution.
const DEFAULT_L2: f64 = 1e-8;

const DEFAULT_CLUSTERS: u64 = 2;
const DEFAULT_MAX_ITER: u64 = 100;

fn check_matrix(x: &[Vec<f64>]) -> Result<usize, ModelError> {
    let width = x.first().map(|row| row.len()).unwrap_or(0);
    if width == 0 {
        return Err(ModelError::Estimator(anyhow!("empty input matrix")));
    }
    if x.iter().any(|row| row.len() != width) {
        return Err(ModelError::Estimator(anyhow!("ragged input matrix")));
    }
    Ok(width)
}

fn scalar_targets(x: &[Vec<f64>], y: Option<&[Vec<f64>]>) -> Result<Vec<f64>, ModelError> {
    let y = y.ok_or_else(|| ModelError::Estimator(anyhow!("estimator requires targets")))?;
    if y.len() != x.len() {
        return Err(ModelError::Estimator(anyhow!(
            "target rows ({}) do not match input rows ({})",
            y.len(),
            x.len()
        )));
    }
    y.iter()
        .map(|row| {
            if row.len() == 1 {
                Ok(row[0])
            } else {
                Err(ModelError::Estimator(anyhow!(
                    "expected scalar targets, got width {}",
                    row.len()
                )))
            }
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Solve `G w = b` by Gaussian elimination with partial pivoting.
fn solve(mut g: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ModelError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| {
                g[i][col]
                    .abs()
                    .partial_cmp(&g[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if g[pivot][col].abs() < f64::EPSILON {
            return Err(ModelError::Estimator(anyhow!(
                "singular system in least-squares fit"
            )));
        }
        g.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = g[row][col] / g[col][col];
            for k in col..n {
                g[row][k] -= factor * g[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut w = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for col in (row + 1)..n {
            acc -= g[row][col] * w[col];
        }
        w[row] = acc / g[row][row];
    }
    Ok(w)
}

// ---------------------------------------------------------------------------
// linear-regression

/// Ordinary least squares with a small ridge term, intercept fitted.
#[derive(Debug, Serialize, Deserialize)]
pub struct LeastSquares {
    l2: f64,
    /// Coefficients per input column, intercept last; None until fit.
    weights: Option<Vec<f64>>,
}

impl LeastSquares {
    fn new(l2: f64) -> Self {
        Self { l2, weights: None }
    }
}

impl Estimator for LeastSquares {
    fn family(&self) -> EstimatorFamily {
        EstimatorFamily::Regressor
    }

    fn fit(&mut self, x: &[Vec<f64>], y: Option<&[Vec<f64>]>) -> Result<(), ModelError> {
        let width = check_matrix(x)?;
        let targets = scalar_targets(x, y)?;

        // Normal equations over the intercept-augmented design matrix.
        let n = width + 1;
        let mut g = vec![vec![0.0; n]; n];
        let mut b = vec![0.0; n];
        for (row, &target) in x.iter().zip(&targets) {
            for i in 0..n {
                let xi = if i < width { row[i] } else { 1.0 };
                b[i] += xi * target;
                for j in 0..n {
                    let xj = if j < width { row[j] } else { 1.0 };
                    g[i][j] += xi * xj;
                }
            }
        }
        for (i, row) in g.iter_mut().enumerate() {
            row[i] += self.l2;
        }

        self.weights = Some(solve(g, b)?);
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| ModelError::Estimator(anyhow!("least-squares estimator not fitted")))?;
        let width = weights.len() - 1;
        x.iter()
            .map(|row| {
                if row.len() != width {
                    return Err(ModelError::Estimator(anyhow!(
                        "expected {} input columns, got {}",
                        width,
                        row.len()
                    )));
                }
                let value: f64 = row.iter().zip(weights).map(|(a, w)| a * w).sum::<f64>()
                    + weights[width];
                Ok(vec![value])
            })
            .collect()
    }

    fn save_state(&self) -> Result<serde_json::Value, ModelError> {
        Ok(serde_json::to_value(self)?)
    }
}

pub struct LeastSquaresVariant;

impl EstimatorVariant for LeastSquaresVariant {
    fn name(&self) -> &'static str {
        "linear-regression"
    }

    fn construct(&self, hyperparams: &Hyperparameters) -> Result<Box<dyn Estimator>, ModelError> {
        Ok(Box::new(LeastSquares::new(hyperparams.f64_or("l2", DEFAULT_L2)?)))
    }

    fn load(&self, state: &serde_json::Value) -> Result<Box<dyn Estimator>, ModelError> {
        let estimator: LeastSquares = serde_json::from_value(state.clone())?;
        Ok(Box::new(estimator))
    }
}

// ---------------------------------------------------------------------------
// nearest-centroid

/// Classifier that keeps a mean vector per class and predicts the
/// nearest centroid's class value.
#[derive(Debug, Serialize, Deserialize)]
pub struct NearestCentroid {
    /// (class value, centroid) in order of first appearance.
    centroids: Vec<(f64, Vec<f64>)>,
}

impl NearestCentroid {
    fn new() -> Self {
        Self {
            centroids: Vec::new(),
        }
    }
}

impl Estimator for NearestCentroid {
    fn family(&self) -> EstimatorFamily {
        EstimatorFamily::Classifier
    }

    fn fit(&mut self, x: &[Vec<f64>], y: Option<&[Vec<f64>]>) -> Result<(), ModelError> {
        let width = check_matrix(x)?;
        let targets = scalar_targets(x, y)?;

        let mut sums: Vec<(f64, Vec<f64>, usize)> = Vec::new();
        for (row, &class) in x.iter().zip(&targets) {
            match sums.iter_mut().find(|(c, _, _)| (*c - class).abs() < 1e-9) {
                Some((_, sum, count)) => {
                    for (s, v) in sum.iter_mut().zip(row) {
                        *s += v;
                    }
                    *count += 1;
                }
                None => sums.push((class, row.clone(), 1)),
            }
        }

        self.centroids = sums
            .into_iter()
            .map(|(class, sum, count)| {
                let mean = sum.iter().map(|s| s / count as f64).collect();
                (class, mean)
            })
            .collect();
        debug_assert!(self.centroids.iter().all(|(_, c)| c.len() == width));
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        if self.centroids.is_empty() {
            return Err(ModelError::Estimator(anyhow!(
                "nearest-centroid estimator not fitted"
            )));
        }
        Ok(x.iter()
            .map(|row| {
                let (class, _) = self
                    .centroids
                    .iter()
                    .min_by(|(_, a), (_, b)| {
                        squared_distance(row, a)
                            .partial_cmp(&squared_distance(row, b))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap();
                vec![*class]
            })
            .collect())
    }

    fn save_state(&self) -> Result<serde_json::Value, ModelError> {
        Ok(serde_json::to_value(self)?)
    }
}

pub struct NearestCentroidVariant;

impl EstimatorVariant for NearestCentroidVariant {
    fn name(&self) -> &'static str {
        "nearest-centroid"
    }

    fn construct(&self, _hyperparams: &Hyperparameters) -> Result<Box<dyn Estimator>, ModelError> {
        Ok(Box::new(NearestCentroid::new()))
    }

    fn load(&self, state: &serde_json::Value) -> Result<Box<dyn Estimator>, ModelError> {
        let estimator: NearestCentroid = serde_json::from_value(state.clone())?;
        Ok(Box::new(estimator))
    }
}

// ---------------------------------------------------------------------------
// k-means

/// Inductive clusterer: Lloyd iterations with deterministic
/// first-k-distinct-rows initialisation.
#[derive(Debug, Serialize, Deserialize)]
pub struct KMeans {
    clusters: usize,
    max_iter: usize,
    centroids: Vec<Vec<f64>>,
    labels: Vec<i64>,
}

impl KMeans {
    fn new(clusters: usize, max_iter: usize) -> Self {
        Self {
            clusters,
            max_iter,
            centroids: Vec::new(),
            labels: Vec::new(),
        }
    }

    fn nearest(&self, row: &[f64]) -> usize {
        self.centroids
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                squared_distance(row, a)
                    .partial_cmp(&squared_distance(row, b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

impl Estimator for KMeans {
    fn family(&self) -> EstimatorFamily {
        EstimatorFamily::Clusterer
    }

    fn fit(&mut self, x: &[Vec<f64>], _y: Option<&[Vec<f64>]>) -> Result<(), ModelError> {
        let width = check_matrix(x)?;

        // Deterministic init: first k distinct rows.
        let mut centroids: Vec<Vec<f64>> = Vec::new();
        for row in x {
            if !centroids.iter().any(|c| squared_distance(c, row) == 0.0) {
                centroids.push(row.clone());
                if centroids.len() == self.clusters {
                    break;
                }
            }
        }
        if centroids.len() < self.clusters {
            return Err(ModelError::Estimator(anyhow!(
                "training set has {} distinct rows, fewer than {} clusters",
                centroids.len(),
                self.clusters
            )));
        }
        self.centroids = centroids;

        let mut assignments = vec![0usize; x.len()];
        for _ in 0..self.max_iter {
            let next: Vec<usize> = x.iter().map(|row| self.nearest(row)).collect();
            let stable = next == assignments;
            assignments = next;

            let mut sums = vec![vec![0.0; width]; self.clusters];
            let mut counts = vec![0usize; self.clusters];
            for (row, &cluster) in x.iter().zip(&assignments) {
                counts[cluster] += 1;
                for (s, v) in sums[cluster].iter_mut().zip(row) {
                    *s += v;
                }
            }
            for (cluster, count) in counts.iter().enumerate() {
                // An emptied cluster keeps its previous centroid.
                if *count > 0 {
                    self.centroids[cluster] = sums[cluster]
                        .iter()
                        .map(|s| s / *count as f64)
                        .collect();
                }
            }

            if stable {
                break;
            }
        }

        self.labels = assignments.into_iter().map(|c| c as i64).collect();
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        if self.centroids.is_empty() {
            return Err(ModelError::Estimator(anyhow!("k-means estimator not fitted")));
        }
        Ok(x.iter()
            .map(|row| vec![self.nearest(row) as f64])
            .collect())
    }

    fn training_labels(&self) -> Option<&[i64]> {
        if self.labels.is_empty() {
            None
        } else {
            Some(&self.labels)
        }
    }

    fn save_state(&self) -> Result<serde_json::Value, ModelError> {
        Ok(serde_json::to_value(self)?)
    }
}

pub struct KMeansVariant;

impl EstimatorVariant for KMeansVariant {
    fn name(&self) -> &'static str {
        "k-means"
    }

    fn construct(&self, hyperparams: &Hyperparameters) -> Result<Box<dyn Estimator>, ModelError> {
        Ok(Box::new(KMeans::new(
            hyperparams.u64_or("clusters", DEFAULT_CLUSTERS)? as usize,
            hyperparams.u64_or("max_iter", DEFAULT_MAX_ITER)? as usize,
        )))
    }

    fn load(&self, state: &serde_json::Value) -> Result<Box<dyn Estimator>, ModelError> {
        let estimator: KMeans = serde_json::from_value(state.clone())?;
        Ok(Box::new(estimator))
    }
}

// ---------------------------------------------------------------------------
// single-linkage

/// Transductive clusterer: agglomerative single-linkage merged down to
/// the configured number of groups. Labels exist only for the training
/// set; it cannot predict on new rows.
#[derive(Debug, Serialize, Deserialize)]
pub struct SingleLinkage {
    clusters: usize,
    labels: Vec<i64>,
}

impl SingleLinkage {
    fn new(clusters: usize) -> Self {
        Self {
            clusters,
            labels: Vec::new(),
        }
    }
}

impl Estimator for SingleLinkage {
    fn family(&self) -> EstimatorFamily {
        EstimatorFamily::Clusterer
    }

    fn fit(&mut self, x: &[Vec<f64>], _y: Option<&[Vec<f64>]>) -> Result<(), ModelError> {
        check_matrix(x)?;
        if x.len() < self.clusters {
            return Err(ModelError::Estimator(anyhow!(
                "training set has {} rows, fewer than {} clusters",
                x.len(),
                self.clusters
            )));
        }

        // Each row starts as its own cluster; merge the closest pair
        // (single linkage) until the configured count remains.
        let mut membership: Vec<usize> = (0..x.len()).collect();
        let mut active = x.len();
        while active > self.clusters {
            let mut best: Option<(f64, usize, usize)> = None;
            for i in 0..x.len() {
                for j in (i + 1)..x.len() {
                    if membership[i] == membership[j] {
                        continue;
                    }
                    let d = squared_distance(&x[i], &x[j]);
                    if best.map(|(bd, _, _)| d < bd).unwrap_or(true) {
                        best = Some((d, membership[i], membership[j]));
                    }
                }
            }
            let Some((_, keep, merge)) = best else {
                break;
            };
            for m in membership.iter_mut() {
                if *m == merge {
                    *m = keep;
                }
            }
            active -= 1;
        }

        // Relabel to 0..clusters in order of first appearance.
        let mut seen: Vec<usize> = Vec::new();
        self.labels = membership
            .into_iter()
            .map(|m| match seen.iter().position(|&s| s == m) {
                Some(idx) => idx as i64,
                None => {
                    seen.push(m);
                    (seen.len() - 1) as i64
                }
            })
            .collect();
        Ok(())
    }

    fn predict(&self, _x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        Err(ModelError::Estimator(anyhow!(
            "single-linkage is transductive and cannot label unseen rows"
        )))
    }

    fn supports_predict(&self) -> bool {
        false
    }

    fn training_labels(&self) -> Option<&[i64]> {
        if self.labels.is_empty() {
            None
        } else {
            Some(&self.labels)
        }
    }

    fn save_state(&self) -> Result<serde_json::Value, ModelError> {
        Ok(serde_json::to_value(self)?)
    }
}

pub struct SingleLinkageVariant;

impl EstimatorVariant for SingleLinkageVariant {
    fn name(&self) -> &'static str {
        "single-linkage"
    }

    fn construct(&self, hyperparams: &Hyperparameters) -> Result<Box<dyn Estimator>, ModelError> {
        Ok(Box::new(SingleLinkage::new(
            hyperparams.u64_or("clusters", DEFAULT_CLUSTERS)? as usize,
        )))
    }

    fn load(&self, state: &serde_json::Value) -> Result<Box<dyn Estimator>, ModelError> {
        let estimator: SingleLinkage = serde_json::from_value(state.clone())?;
        Ok(Box::new(estimator))
    }
}
