// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reference models that ignore document content
//!
//! Implements:
//! - Majority label set (always predict the most common training label row)
//! - Label prior (predict every label whose training frequency is at least 0.5,
//!   scored by that frequency)
//!
//! Any learned model should beat both on micro-F1.

use crate::error::{PipelineError, Result};
use crate::features::FeatureMatrix;
use crate::labels::LabelMatrix;
use crate::model::MultiLabelClassifier;
use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;

/// Majority baseline: always predicts the most frequent label combination
///
/// Has no notion of probability, so `predict_proba` is unavailable.
#[derive(Debug, Clone)]
pub struct MajorityLabelSet {
    row: Array1<u8>,
}

impl MajorityLabelSet {
    pub fn fit(labels: &LabelMatrix) -> Result<Self> {
        if labels.nrows() == 0 {
            return Err(PipelineError::InvalidInput("cannot fit majority baseline on zero rows".to_string()));
        }

        // (count, first occurrence) per distinct row; earliest wins ties
        let mut counts: HashMap<Vec<u8>, (usize, usize)> = HashMap::new();
        for (i, row) in labels.rows().into_iter().enumerate() {
            counts.entry(row.to_vec()).or_insert((0, i)).0 += 1;
        }
        let (row, (count, _)) = counts
            .into_iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then_with(|| b.1 .1.cmp(&a.1 .1)))
            .ok_or_else(|| PipelineError::InvalidInput("no label rows".to_string()))?;

        tracing::info!(
            "Majority label set covers {}/{} training rows",
            count,
            labels.nrows()
        );
        Ok(Self { row: Array1::from(row) })
    }

    pub fn label_row(&self) -> &Array1<u8> {
        &self.row
    }
}

impl MultiLabelClassifier for MajorityLabelSet {
    fn name(&self) -> &str {
        "majority"
    }

    fn description(&self) -> &str {
        "Always predicts the most frequent training label combination"
    }

    fn n_labels(&self) -> usize {
        self.row.len()
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<LabelMatrix> {
        let mut out = LabelMatrix::zeros((features.rows(), self.row.len()));
        out.rows_mut().into_iter().for_each(|mut r| r.assign(&self.row));
        Ok(out)
    }
}

/// Prior baseline: per-label training frequency
#[derive(Debug, Clone)]
pub struct LabelPrior {
    priors: Array1<f64>,
}

impl LabelPrior {
    pub fn fit(labels: &LabelMatrix) -> Result<Self> {
        if labels.nrows() == 0 {
            return Err(PipelineError::InvalidInput("cannot fit prior baseline on zero rows".to_string()));
        }
        let priors = labels
            .mapv(f64::from)
            .mean_axis(Axis(0))
            .ok_or_else(|| PipelineError::InvalidInput("no label rows".to_string()))?;
        Ok(Self { priors })
    }

    pub fn priors(&self) -> &Array1<f64> {
        &self.priors
    }
}

impl MultiLabelClassifier for LabelPrior {
    fn name(&self) -> &str {
        "prior"
    }

    fn description(&self) -> &str {
        "Predicts labels present in at least half of the training rows"
    }

    fn n_labels(&self) -> usize {
        self.priors.len()
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<LabelMatrix> {
        let row = self.priors.mapv(|p| u8::from(p >= 0.5));
        let mut out = LabelMatrix::zeros((features.rows(), row.len()));
        out.rows_mut().into_iter().for_each(|mut r| r.assign(&row));
        Ok(out)
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((features.rows(), self.priors.len()));
        out.rows_mut().into_iter().for_each(|mut r| r.assign(&self.priors));
        Ok(out)
    }

    fn supports_proba(&self) -> bool {
        true
    }
}
