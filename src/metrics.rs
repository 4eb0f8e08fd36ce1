// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for multilabel classification
//!
//! Implements:
//! - Per-label confusion counts, precision, recall and F1
//! - Exact-match ratio (subset accuracy)
//! - Micro, macro, weighted and samples averages
//! - Precision-recall curves and average precision (for probabilistic predictions)
//!
//! Every ratio with a zero denominator is reported as 0.

use crate::error::{PipelineError, Result};
use crate::labels::{LabelMatrix, LabelSpace};
use ndarray::{Array2, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

/// Binary confusion counts for one label column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Label present and predicted
    pub tp: usize,
    /// Label absent and not predicted
    pub tn: usize,
    /// Label absent but predicted
    pub fp: usize,
    /// Label present but missed
    pub fn_: usize,
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

fn harmonic(precision: f64, recall: f64) -> f64 {
    let denom = precision + recall;
    if denom == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / denom
    }
}

impl ConfusionMatrix {
    pub fn from_columns(truth: ArrayView1<'_, u8>, predicted: ArrayView1<'_, u8>) -> Self {
        let mut matrix = Self::default();
        Zip::from(&truth).and(&predicted).for_each(|&t, &p| match (t != 0, p != 0) {
            (true, true) => matrix.tp += 1,
            (false, false) => matrix.tn += 1,
            (false, true) => matrix.fp += 1,
            (true, false) => matrix.fn_ += 1,
        });
        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Positives in the ground truth
    pub fn support(&self) -> usize {
        self.tp + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall: TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1_score(&self) -> f64 {
        harmonic(self.precision(), self.recall())
    }

    /// As a 2x2 grid `[[tn, fp], [fn, tp]]` (rows actual, columns predicted)
    pub fn grid(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }
}

impl std::ops::Add for ConfusionMatrix {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            tp: self.tp + other.tp,
            tn: self.tn + other.tn,
            fp: self.fp + other.fp,
            fn_: self.fn_ + other.fn_,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
    pub confusion: ConfusionMatrix,
    /// Area under the precision-recall curve, when scores exist and the
    /// label has at least one positive
    pub average_precision: Option<f64>,
}

/// Precision, recall and F1 under one averaging scheme
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AverageScores {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Complete multilabel evaluation of one prediction matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLabelMetrics {
    pub n_samples: usize,
    /// Fraction of rows whose predicted label set equals the true set
    pub exact_match: f64,
    pub micro: AverageScores,
    #[serde(rename = "macro")]
    pub macro_avg: AverageScores,
    pub weighted: AverageScores,
    pub samples: AverageScores,
    pub per_class: Vec<ClassMetrics>,
}

impl MultiLabelMetrics {
    pub fn compute(truth: &LabelMatrix, predicted: &LabelMatrix, labels: &LabelSpace) -> Result<Self> {
        if truth.dim() != predicted.dim() {
            return Err(PipelineError::InvalidInput(format!(
                "prediction shape {:?} does not match ground truth {:?}",
                predicted.dim(),
                truth.dim()
            )));
        }
        if truth.ncols() != labels.len() {
            return Err(PipelineError::VocabularyMismatch {
                what: "label space",
                expected: labels.len(),
                actual: truth.ncols(),
            });
        }

        let n_samples = truth.nrows();
        let exact = truth
            .rows()
            .into_iter()
            .zip(predicted.rows())
            .filter(|(t, p)| t == p)
            .count();

        let per_class: Vec<ClassMetrics> = labels
            .classes()
            .iter()
            .enumerate()
            .map(|(j, label)| {
                let confusion = ConfusionMatrix::from_columns(truth.column(j), predicted.column(j));
                ClassMetrics {
                    label: label.clone(),
                    precision: confusion.precision(),
                    recall: confusion.recall(),
                    f1_score: confusion.f1_score(),
                    support: confusion.support(),
                    confusion,
                    average_precision: None,
                }
            })
            .collect();

        let total_support: usize = per_class.iter().map(|c| c.support).sum();

        let pooled = per_class
            .iter()
            .fold(ConfusionMatrix::default(), |acc, c| acc + c.confusion);
        let micro = AverageScores {
            precision: pooled.precision(),
            recall: pooled.recall(),
            f1_score: pooled.f1_score(),
            support: total_support,
        };

        let n_labels = per_class.len().max(1) as f64;
        let macro_avg = AverageScores {
            precision: per_class.iter().map(|c| c.precision).sum::<f64>() / n_labels,
            recall: per_class.iter().map(|c| c.recall).sum::<f64>() / n_labels,
            f1_score: per_class.iter().map(|c| c.f1_score).sum::<f64>() / n_labels,
            support: total_support,
        };

        let weighted_mean = |value: fn(&ClassMetrics) -> f64| {
            if total_support == 0 {
                0.0
            } else {
                per_class.iter().map(|c| value(c) * c.support as f64).sum::<f64>() / total_support as f64
            }
        };
        let weighted = AverageScores {
            precision: weighted_mean(|c| c.precision),
            recall: weighted_mean(|c| c.recall),
            f1_score: weighted_mean(|c| c.f1_score),
            support: total_support,
        };

        let mut samples = AverageScores {
            support: total_support,
            ..AverageScores::default()
        };
        for (t, p) in truth.rows().into_iter().zip(predicted.rows()) {
            let row = ConfusionMatrix::from_columns(t, p);
            samples.precision += row.precision();
            samples.recall += row.recall();
            samples.f1_score += row.f1_score();
        }
        if n_samples > 0 {
            let n = n_samples as f64;
            samples.precision /= n;
            samples.recall /= n;
            samples.f1_score /= n;
        }

        Ok(Self {
            n_samples,
            exact_match: ratio(exact, n_samples),
            micro,
            macro_avg,
            weighted,
            samples,
            per_class,
        })
    }

    /// Attach per-label average precision computed from `scores`
    pub fn with_scores(mut self, truth: &LabelMatrix, scores: &Array2<f64>) -> Result<Self> {
        if truth.dim() != scores.dim() {
            return Err(PipelineError::InvalidInput(format!(
                "score shape {:?} does not match ground truth {:?}",
                scores.dim(),
                truth.dim()
            )));
        }
        for (j, class) in self.per_class.iter_mut().enumerate() {
            class.average_precision = PrCurve::compute(scores.column(j), truth.column(j)).average_precision;
        }
        Ok(self)
    }

    pub fn f1_micro(&self) -> f64 {
        self.micro.f1_score
    }

    pub fn f1_macro(&self) -> f64 {
        self.macro_avg.f1_score
    }

    /// Mean average precision over labels where it is defined
    pub fn mean_average_precision(&self) -> Option<f64> {
        let values: Vec<f64> = self.per_class.iter().filter_map(|c| c.average_precision).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Plain-text report: headline ratios followed by a per-label table
    pub fn format(&self) -> String {
        let mut output = format!(
            "Exact Match Ratio: {:.4}\nF1 Micro: {:.4}\nF1 Macro: {:.4}\n\n",
            self.exact_match,
            self.f1_micro(),
            self.f1_macro()
        );

        let width = self
            .per_class
            .iter()
            .map(|c| c.label.chars().count())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        output.push_str(&format!(
            "{:>width$} {:>10} {:>10} {:>10} {:>10}\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        ));
        output.push('\n');

        for class in &self.per_class {
            output.push_str(&format!(
                "{:>width$} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
                class.label,
                class.precision,
                class.recall,
                class.f1_score,
                class.support,
                width = width
            ));
        }
        output.push('\n');

        for (name, avg) in [
            ("micro avg", &self.micro),
            ("macro avg", &self.macro_avg),
            ("weighted avg", &self.weighted),
            ("samples avg", &self.samples),
        ] {
            output.push_str(&format!(
                "{:>width$} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
                name,
                avg.precision,
                avg.recall,
                avg.f1_score,
                avg.support,
                width = width
            ));
        }

        if let Some(map) = self.mean_average_precision() {
            output.push_str(&format!("\nMean Average Precision: {:.4}\n", map));
        }

        output
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    /// Scores at or above this value count as positive
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Precision-recall curve over the distinct score thresholds of one label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrCurve {
    /// Ordered by descending threshold (ascending recall)
    pub points: Vec<PrPoint>,
    /// `sum (R_n - R_{n-1}) P_n`; `None` when the label has no positives
    pub average_precision: Option<f64>,
}

impl PrCurve {
    pub fn compute(scores: ArrayView1<'_, f64>, truth: ArrayView1<'_, u8>) -> Self {
        let mut pairs: Vec<(f64, bool)> = scores.iter().zip(truth.iter()).map(|(&s, &t)| (s, t != 0)).collect();
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let n_pos = pairs.iter().filter(|(_, positive)| *positive).count();
        if n_pos == 0 {
            return Self {
                points: Vec::new(),
                average_precision: None,
            };
        }

        let mut points = Vec::new();
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut ap = 0.0;
        let mut prev_recall = 0.0;

        let mut i = 0;
        while i < pairs.len() {
            let threshold = pairs[i].0;
            // consume every sample tied at this threshold
            while i < pairs.len() && pairs[i].0 == threshold {
                if pairs[i].1 {
                    tp += 1;
                } else {
                    fp += 1;
                }
                i += 1;
            }

            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, n_pos);
            ap += (recall - prev_recall) * precision;
            prev_recall = recall;

            points.push(PrPoint {
                threshold,
                precision,
                recall,
            });
        }

        Self {
            points,
            average_precision: Some(ap),
        }
    }
}
