// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Scoring a fitted model on one split and persisting the results
//!
//! A report sink is a directory. For run `logreg` on split `test` it receives:
//! - `logreg_test_metrics.txt` and `logreg_test_metrics.json`, written to
//!   temporary names first and renamed into place only after both succeed
//! - `logreg_test_f1_per_class.png`, `logreg_test_confusion_matrices.png` and
//!   `logreg_test_precision_recall.png` when plots are enabled
//!
//! Chart failures are recorded per artifact and never abort the evaluation.

use crate::error::{PipelineError, Result};
use crate::features::FeatureMatrix;
use crate::labels::{LabelMatrix, LabelSpace};
use crate::metrics::{MultiLabelMetrics, PrCurve};
use crate::model::MultiLabelClassifier;
use crate::plots;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOptions {
    /// Render PNG charts into the sink
    pub emit_plots: bool,
    /// Output directory; nothing is written when unset
    pub sink: Option<PathBuf>,
    /// TrueType font for chart text
    #[serde(default)]
    pub font: Option<PathBuf>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            emit_plots: true,
            sink: None,
            font: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Written,
    Skipped { reason: String },
    Failed { reason: String },
}

/// What happened to one file the evaluator tried to produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactOutcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: ArtifactStatus,
}

/// Machine-readable summary written next to the text report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    pub model: String,
    pub split: String,
    pub exact_match: f64,
    pub f1_micro: f64,
    pub f1_macro: f64,
    pub f1_weighted: f64,
    pub f1_samples: f64,
    /// Label -> F1
    pub per_class: BTreeMap<String, f64>,
    /// Label -> average precision, for models that produce scores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_precision: Option<BTreeMap<String, f64>>,
}

/// Result of evaluating one model on one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub model: String,
    pub split: String,
    pub metrics: MultiLabelMetrics,
    /// Whether per-label scores were available
    pub scored: bool,
    pub artifacts: Vec<ArtifactOutcome>,
}

impl MetricsReport {
    pub fn structured(&self) -> StructuredReport {
        let per_class = self
            .metrics
            .per_class
            .iter()
            .map(|c| (c.label.clone(), c.f1_score))
            .collect();
        let average_precision = self.scored.then(|| {
            self.metrics
                .per_class
                .iter()
                .filter_map(|c| c.average_precision.map(|ap| (c.label.clone(), ap)))
                .collect()
        });

        StructuredReport {
            model: self.model.clone(),
            split: self.split.clone(),
            exact_match: self.metrics.exact_match,
            f1_micro: self.metrics.f1_micro(),
            f1_macro: self.metrics.f1_macro(),
            f1_weighted: self.metrics.weighted.f1_score,
            f1_samples: self.metrics.samples.f1_score,
            per_class,
            average_precision,
        }
    }

    /// Plain-text report
    pub fn format(&self) -> String {
        self.metrics.format()
    }

    pub fn failed_artifacts(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.artifacts
            .iter()
            .filter(|a| matches!(a.status, ArtifactStatus::Failed { .. }))
    }
}

/// Lowercase, with every non-alphanumeric character replaced by `_`
pub fn sanitize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

pub struct Evaluator;

impl Evaluator {
    pub fn evaluate(
        model: &dyn MultiLabelClassifier,
        features: &FeatureMatrix,
        truth: &LabelMatrix,
        labels: &LabelSpace,
        run_name: &str,
        split_name: &str,
        options: &EvaluationOptions,
    ) -> Result<MetricsReport> {
        if model.n_labels() != labels.len() {
            return Err(PipelineError::VocabularyMismatch {
                what: "label space",
                expected: labels.len(),
                actual: model.n_labels(),
            });
        }
        if features.rows() != truth.nrows() {
            return Err(PipelineError::InvalidInput(format!(
                "{} feature rows but {} label rows",
                features.rows(),
                truth.nrows()
            )));
        }

        let predictions = model.predict(features)?;
        let mut metrics = MultiLabelMetrics::compute(truth, &predictions, labels)?;

        let proba = if model.supports_proba() {
            model.predict_proba(features)
        } else {
            Err(PipelineError::CapabilityUnavailable {
                model: model.name().to_string(),
                capability: "predict_proba",
            })
        };
        let scores = match proba {
            Ok(scores) => Some(scores),
            Err(PipelineError::CapabilityUnavailable { model: name, capability }) => {
                tracing::warn!(
                    "Model '{}' has no {}; skipping average precision and precision-recall plot",
                    name,
                    capability
                );
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(scores) = &scores {
            metrics = metrics.with_scores(truth, scores)?;
        }

        tracing::info!(
            "{} on {} ({} samples): exact match {:.4}, F1 micro {:.4}, F1 macro {:.4}",
            run_name,
            split_name,
            metrics.n_samples,
            metrics.exact_match,
            metrics.f1_micro(),
            metrics.f1_macro()
        );

        let mut report = MetricsReport {
            model: run_name.to_string(),
            split: split_name.to_string(),
            metrics,
            scored: scores.is_some(),
            artifacts: Vec::new(),
        };

        let Some(sink) = &options.sink else {
            return Ok(report);
        };
        fs::create_dir_all(sink).map_err(|e| PipelineError::sink(sink, e))?;

        let stem = format!("{}_{}", sanitize(run_name), sanitize(split_name));
        let text_path = sink.join(format!("{}_metrics.txt", stem));
        let json_path = sink.join(format!("{}_metrics.json", stem));
        write_report_pair(&report, &text_path, &json_path)?;
        report.artifacts.push(written(text_path));
        report.artifacts.push(written(json_path));

        if options.emit_plots {
            let title = format!("{} / {}", run_name, split_name);
            let font = options.font.as_deref();
            let metrics = &report.metrics;

            let f1_path = sink.join(format!("{}_f1_per_class.png", stem));
            let outcome = plots::f1_per_class(&f1_path, &title, metrics, font);
            let f1 = outcome_of(f1_path, outcome);

            let cm_path = sink.join(format!("{}_confusion_matrices.png", stem));
            let outcome = plots::confusion_matrices(&cm_path, &title, metrics, font);
            let cm = outcome_of(cm_path, outcome);

            let pr_path = sink.join(format!("{}_precision_recall.png", stem));
            let pr = match &scores {
                Some(scores) => {
                    let curves: Vec<(String, PrCurve)> = labels
                        .classes()
                        .iter()
                        .enumerate()
                        .map(|(j, label)| (label.clone(), PrCurve::compute(scores.column(j), truth.column(j))))
                        .collect();
                    let outcome = plots::precision_recall(&pr_path, &title, &curves, font);
                    outcome_of(pr_path, outcome)
                }
                None => ArtifactOutcome {
                    path: pr_path,
                    status: ArtifactStatus::Skipped {
                        reason: format!("model '{}' produces no scores", model.name()),
                    },
                },
            };

            report.artifacts.extend([f1, cm, pr]);
        }

        Ok(report)
    }
}

fn written(path: PathBuf) -> ArtifactOutcome {
    ArtifactOutcome {
        path,
        status: ArtifactStatus::Written,
    }
}

fn outcome_of(path: PathBuf, result: Result<()>) -> ArtifactOutcome {
    match result {
        Ok(()) => {
            tracing::info!("Plot saved: {}", path.display());
            written(path)
        }
        Err(e) => {
            tracing::warn!("{}", e);
            ArtifactOutcome {
                path,
                status: ArtifactStatus::Failed { reason: e.to_string() },
            }
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write text and JSON reports; neither appears unless both were written
fn write_report_pair(report: &MetricsReport, text_path: &Path, json_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&report.structured())
        .map_err(|e| PipelineError::InvalidInput(format!("cannot serialize report: {}", e)))?;
    let text = report.format();

    let text_tmp = tmp_path(text_path);
    let json_tmp = tmp_path(json_path);
    let cleanup = || {
        let _ = fs::remove_file(&text_tmp);
        let _ = fs::remove_file(&json_tmp);
    };

    if let Err(e) = fs::write(&text_tmp, text) {
        cleanup();
        return Err(PipelineError::sink(text_path, e));
    }
    if let Err(e) = fs::write(&json_tmp, json) {
        cleanup();
        return Err(PipelineError::sink(json_path, e));
    }
    if let Err(e) = fs::rename(&text_tmp, text_path) {
        cleanup();
        return Err(PipelineError::sink(text_path, e));
    }
    if let Err(e) = fs::rename(&json_tmp, json_path) {
        cleanup();
        let _ = fs::remove_file(text_path);
        return Err(PipelineError::sink(json_path, e));
    }

    tracing::info!("Reports saved: {} and {}", text_path.display(), json_path.display());
    Ok(())
}
