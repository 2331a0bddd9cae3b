//! Gaussian naive Bayes: per-class independent normal likelihoods.

use std::collections::BTreeSet;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianNb {
    /// Fraction of the largest feature variance added to every variance.
    pub var_smoothing: f64,
}

impl Default for GaussianNb {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
        }
    }
}

impl GaussianNb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var_smoothing(mut self, var_smoothing: f64) -> Self {
        self.var_smoothing = var_smoothing;
        self
    }

    #[instrument(skip_all, fields(rows = x.nrows(), features = x.ncols()))]
    pub fn fit(&self, x: ArrayView2<f64>, y: &[usize]) -> Result<FittedGaussianNb> {
        if x.nrows() == 0 {
            return Err(Error::EmptyTrainingSet);
        }
        if x.nrows() != y.len() {
            return Err(Error::LabelCount {
                rows: x.nrows(),
                labels: y.len(),
            });
        }
        check_finite(x)?;

        let classes: Vec<usize> = y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let n_features = x.ncols();

        let max_var = x
            .var_axis(Axis(0), 0.0)
            .fold(0.0f64, |acc, &v| acc.max(v));
        // all-constant input would otherwise give zero variances
        let epsilon = match self.var_smoothing * max_var {
            e if e > 0.0 => e,
            _ => self.var_smoothing.max(f64::MIN_POSITIVE),
        };

        let mut theta = Array2::zeros((classes.len(), n_features));
        let mut var = Array2::zeros((classes.len(), n_features));
        let mut log_prior = Array1::zeros(classes.len());

        for (c, &class) in classes.iter().enumerate() {
            let rows: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, &label)| label == class)
                .map(|(i, _)| i)
                .collect();
            let subset = x.select(Axis(0), &rows);
            let mean = subset
                .mean_axis(Axis(0))
                .ok_or(Error::EmptyTrainingSet)?;
            theta.row_mut(c).assign(&mean);
            var.row_mut(c)
                .assign(&(subset.var_axis(Axis(0), 0.0) + epsilon));
            log_prior[c] = (rows.len() as f64 / y.len() as f64).ln();
            debug!(class, count = rows.len(), "fitted class");
        }

        Ok(FittedGaussianNb {
            classes,
            theta,
            var,
            log_prior,
            epsilon,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FittedGaussianNb {
    classes: Vec<usize>,
    /// Per-class feature means, classes x features.
    theta: Array2<f64>,
    /// Per-class feature variances including `epsilon`.
    var: Array2<f64>,
    log_prior: Array1<f64>,
    epsilon: f64,
}

impl FittedGaussianNb {
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.theta.ncols()
    }

    pub fn priors(&self) -> Array1<f64> {
        self.log_prior.mapv(f64::exp)
    }

    pub fn means(&self) -> ArrayView2<f64> {
        self.theta.view()
    }

    pub fn variances(&self) -> ArrayView2<f64> {
        self.var.view()
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// `ln P(class) + ln P(x | class)`, rows x classes.
    pub fn joint_log_likelihood(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(Error::FeatureCount {
                expected: self.n_features(),
                got: x.ncols(),
            });
        }

        let mut jll = Array2::zeros((x.nrows(), self.classes.len()));
        for (c, mut column) in jll.axis_iter_mut(Axis(1)).enumerate() {
            let mean = self.theta.row(c);
            let var = self.var.row(c);
            let norm = self.log_prior[c]
                - 0.5 * var.mapv(|v| (std::f64::consts::TAU * v).ln()).sum();

            for (row, out) in x.rows().into_iter().zip(column.iter_mut()) {
                let distance: f64 = row
                    .iter()
                    .zip(mean)
                    .zip(var)
                    .map(|((x, m), v)| (x - m).powi(2) / v)
                    .sum();
                *out = norm - 0.5 * distance;
            }
        }

        Ok(jll)
    }

    /// Most likely class per row; ties go to the smaller label.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        let jll = self.joint_log_likelihood(x)?;
        Ok(jll
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (c, &value) in row.iter().enumerate() {
                    if value > row[best] {
                        best = c;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    /// Posterior class probabilities, rows x classes in `classes()` order.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let mut jll = self.joint_log_likelihood(x)?;
        for mut row in jll.rows_mut() {
            let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let total = row.sum();
            row.mapv_inplace(|v| v / total);
        }
        Ok(jll)
    }
}

fn check_finite(x: ArrayView2<f64>) -> Result<()> {
    for ((row, column), value) in x.indexed_iter() {
        if !value.is_finite() {
            return Err(Error::NonFinite { row, column });
        }
    }
    Ok(())
}
