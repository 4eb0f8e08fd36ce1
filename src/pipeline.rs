// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible training and evaluation pipeline for biomedical abstracts
//!
//! Orchestrates:
//! - Dataset loading (file, URL or synthetic corpus)
//! - Stratified train / validation / test split
//! - Text cleaning, label binarization and TF-IDF fitted on train only
//! - Model training and per-split evaluation
//! - Model artifact and results serialization

use crate::baselines::{LabelPrior, MajorityLabelSet};
use crate::datasets::{load_table, LoadOptions, Table};
use crate::error::{PipelineError, Result};
use crate::evaluation::{EvaluationOptions, Evaluator, MetricsReport};
use crate::features::{FeatureMatrix, FittedVectorizer, TfidfVectorizer};
use crate::labels::{self, LabelMatrix, LabelSpace};
use crate::model::{ModelArtifact, ModelTrainer, MultiLabelClassifier, OneVsRestClassifier, TrainerConfig};
use crate::preprocess::prepare_corpus;
use crate::seed::Seed;
use crate::split::{SplitConfig, SplitTriple, Splitter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Dataset name that selects the built-in synthetic corpus
pub const SYNTHETIC_DATASET: &str = "synthetic";

/// Models the pipeline knows how to train
pub const AVAILABLE_MODELS: [&str; 3] = ["logreg", "majority", "prior"];

/// Splits a model can be evaluated on
pub const AVAILABLE_SPLITS: [&str; 3] = ["train", "validation", "test"];

/// Configuration for the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path or http(s) URL of a delimited file, or `synthetic`
    pub dataset: String,
    /// Record count when generating the synthetic corpus
    pub synthetic_size: usize,
    pub load: LoadOptions,
    pub split: SplitConfig,
    pub seed: Seed,
    pub vectorizer: TfidfVectorizer,
    pub trainer: TrainerConfig,
    /// Models to train, by name
    pub models: Vec<String>,
    /// Splits to evaluate every model on
    pub eval_splits: Vec<String>,
    /// Directory receiving reports, charts and results
    pub output_dir: PathBuf,
    /// Where to save the trained logistic regression, if anywhere
    pub model_path: Option<PathBuf>,
    pub emit_plots: bool,
    pub plot_font: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: SYNTHETIC_DATASET.to_string(),
            synthetic_size: 300,
            load: LoadOptions::default(),
            split: SplitConfig::default(),
            seed: Seed::DEFAULT,
            vectorizer: TfidfVectorizer::default(),
            trainer: TrainerConfig::default(),
            models: vec!["logreg".to_string(), "majority".to_string()],
            eval_splits: vec!["validation".to_string(), "test".to_string()],
            output_dir: PathBuf::from("results"),
            model_path: None,
            emit_plots: true,
            plot_font: None,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| PipelineError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(PipelineError::InvalidConfig("no models requested".to_string()));
        }
        if let Some(unknown) = self.models.iter().find(|m| !AVAILABLE_MODELS.contains(&m.as_str())) {
            return Err(PipelineError::InvalidConfig(format!(
                "unknown model '{}' (available: {})",
                unknown,
                AVAILABLE_MODELS.join(", ")
            )));
        }
        if self.eval_splits.is_empty() {
            return Err(PipelineError::InvalidConfig("no evaluation splits requested".to_string()));
        }
        if let Some(unknown) = self.eval_splits.iter().find(|s| !AVAILABLE_SPLITS.contains(&s.as_str())) {
            return Err(PipelineError::InvalidConfig(format!(
                "unknown split '{}' (available: {})",
                unknown,
                AVAILABLE_SPLITS.join(", ")
            )));
        }
        if self.dataset == SYNTHETIC_DATASET && self.synthetic_size == 0 {
            return Err(PipelineError::InvalidConfig("synthetic_size must be positive".to_string()));
        }
        self.load.validate()?;
        self.trainer.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub source: String,
    pub total_samples: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub test_samples: usize,
    pub labels: Vec<String>,
    pub n_features: usize,
    pub group_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelComparison {
    pub model: String,
    pub exact_match: f64,
    pub f1_micro: f64,
    pub f1_macro: f64,
    pub f1_weighted: f64,
    pub mean_average_precision: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Split the comparison is made on
    pub split: String,
    pub best_model: String,
    pub best_f1_micro: f64,
    pub best_exact_match: f64,
    pub comparison: Vec<ModelComparison>,
}

impl PipelineSummary {
    /// Rank models on `test` when it was evaluated, otherwise on the first split
    fn from_reports(reports: &[MetricsReport], eval_splits: &[String]) -> Self {
        let split = if eval_splits.iter().any(|s| s == "test") {
            "test".to_string()
        } else {
            eval_splits.first().cloned().unwrap_or_default()
        };

        let mut best_model = "None".to_string();
        let mut best_f1_micro = 0.0;
        let mut best_exact_match = 0.0;

        let comparison = reports
            .iter()
            .filter(|r| r.split == split)
            .map(|r| {
                if best_model == "None" || r.metrics.f1_micro() > best_f1_micro {
                    best_model = r.model.clone();
                    best_f1_micro = r.metrics.f1_micro();
                    best_exact_match = r.metrics.exact_match;
                }
                ModelComparison {
                    model: r.model.clone(),
                    exact_match: r.metrics.exact_match,
                    f1_micro: r.metrics.f1_micro(),
                    f1_macro: r.metrics.f1_macro(),
                    f1_weighted: r.metrics.weighted.f1_score,
                    mean_average_precision: r.metrics.mean_average_precision(),
                }
            })
            .collect();

        Self {
            split,
            best_model,
            best_f1_micro,
            best_exact_match,
            comparison,
        }
    }
}

/// Complete pipeline results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResults {
    pub config: PipelineConfig,
    pub dataset_info: DatasetInfo,
    pub reports: Vec<MetricsReport>,
    pub summary: PipelineSummary,
    /// Saved logistic regression artifact, if any
    pub model_artifact: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Features and labels for one split
struct Prepared {
    features: FeatureMatrix,
    labels: LabelMatrix,
}

fn prepare(table: &Table, vectorizer: &FittedVectorizer, space: &LabelSpace) -> Result<Prepared> {
    let corpus: Vec<String> = prepare_corpus(&table.records).collect();
    Ok(Prepared {
        features: vectorizer.transform(&corpus),
        labels: space.transform_table(table)?,
    })
}

/// Main pipeline
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn load_dataset(&self) -> Result<Table> {
        if self.config.dataset == SYNTHETIC_DATASET {
            tracing::info!(
                "Loading synthetic dataset: {} records, seed {}",
                self.config.synthetic_size,
                self.config.seed.value()
            );
            return Ok(Table::synthetic(self.config.synthetic_size, self.config.seed));
        }
        load_table(&self.config.dataset, &self.config.load)
    }

    /// Load the configured dataset and run every stage on it
    pub fn run(&self) -> Result<PipelineResults> {
        self.config.validate()?;
        let table = self.load_dataset()?;
        self.run_with_table(table)
    }

    /// Run every stage on an already loaded table
    pub fn run_with_table(&self, table: Table) -> Result<PipelineResults> {
        self.config.validate()?;
        if table.is_empty() {
            return Err(PipelineError::InvalidInput(format!("dataset {} has no records", table.source)));
        }

        let split = Splitter::new(self.config.split, self.config.seed).split(&table)?;

        let train_corpus: Vec<String> = prepare_corpus(&split.train.records).collect();
        let (train_labels, space) = labels::fit_transform(&split.train)?;
        let (train_features, vectorizer) = self.config.vectorizer.fit_transform(&train_corpus)?;
        let train = Prepared {
            features: train_features,
            labels: train_labels,
        };

        let mut eval_sets: Vec<(&str, Prepared)> = Vec::new();
        for name in &self.config.eval_splits {
            let prepared = match name.as_str() {
                "train" => prepare(&split.train, &vectorizer, &space)?,
                "validation" => prepare(&split.validation, &vectorizer, &space)?,
                _ => prepare(&split.test, &vectorizer, &space)?,
            };
            eval_sets.push((name.as_str(), prepared));
        }

        let options = EvaluationOptions {
            emit_plots: self.config.emit_plots,
            sink: Some(self.config.output_dir.clone()),
            font: self.config.plot_font.clone(),
        };

        let mut reports = Vec::new();
        let mut logreg: Option<OneVsRestClassifier> = None;

        for name in &self.config.models {
            tracing::info!("Training model: {}", name);
            let model: Box<dyn MultiLabelClassifier> = match name.as_str() {
                "logreg" => {
                    let fitted = ModelTrainer::new(self.config.trainer).fit(&train.features, &train.labels)?;
                    logreg = Some(fitted.clone());
                    Box::new(fitted)
                }
                "majority" => Box::new(MajorityLabelSet::fit(&train.labels)?),
                _ => Box::new(LabelPrior::fit(&train.labels)?),
            };
            tracing::info!("Trained {}: {}", model.name(), model.description());

            for (split_name, prepared) in &eval_sets {
                let report = Evaluator::evaluate(
                    model.as_ref(),
                    &prepared.features,
                    &prepared.labels,
                    &space,
                    name,
                    split_name,
                    &options,
                )?;
                for failed in report.failed_artifacts() {
                    tracing::warn!("Artifact not produced: {}", failed.path.display());
                }
                reports.push(report);
            }
        }

        let model_artifact = match (&self.config.model_path, logreg) {
            (Some(path), Some(classifier)) => {
                let artifact = ModelArtifact::new("logreg", vectorizer.clone(), space.clone(), classifier)?;
                artifact.save(path)?;
                Some(path.clone())
            }
            (Some(_), None) => {
                tracing::warn!("model_path set but 'logreg' was not trained; nothing saved");
                None
            }
            _ => None,
        };

        let summary = PipelineSummary::from_reports(&reports, &self.config.eval_splits);
        tracing::info!(
            "Best model on {}: {} (F1 micro {:.4})",
            summary.split,
            summary.best_model,
            summary.best_f1_micro
        );

        Ok(PipelineResults {
            config: self.config.clone(),
            dataset_info: dataset_info(&table, &split, &space, &vectorizer),
            reports,
            summary,
            model_artifact,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Save results to JSON file
    pub fn save_results(results: &PipelineResults, output_path: &Path) -> Result<()> {
        let parent = output_path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::sink(parent, e))?;
        let json = serde_json::to_string_pretty(results)
            .map_err(|e| PipelineError::InvalidInput(format!("cannot serialize results: {}", e)))?;
        std::fs::write(output_path, json).map_err(|e| PipelineError::sink(output_path, e))?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }

    /// Generate a markdown report
    pub fn generate_report(results: &PipelineResults) -> String {
        let mut report = String::new();

        report.push_str("# Biomedical Abstract Classification Report\n\n");
        report.push_str(&format!("**Generated:** {}\n\n", results.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
        report.push_str(&format!("**Version:** {}\n\n", results.version));

        let info = &results.dataset_info;
        report.push_str("## Dataset\n\n");
        report.push_str(&format!("- **Source:** {}\n", info.source));
        report.push_str(&format!("- **Total Samples:** {}\n", info.total_samples));
        report.push_str(&format!(
            "- **Split Sizes:** Train={}, Val={}, Test={}\n",
            info.train_samples, info.validation_samples, info.test_samples
        ));
        report.push_str(&format!("- **Labels ({}):** {}\n", info.labels.len(), info.labels.join(", ")));
        report.push_str(&format!("- **Features:** {}\n\n", info.n_features));

        report.push_str("| Group | Records |\n");
        report.push_str("|-------|---------|\n");
        for (group, count) in &info.group_distribution {
            report.push_str(&format!("| {} | {} |\n", group, count));
        }
        report.push('\n');

        report.push_str("## Summary\n\n");
        report.push_str(&format!(
            "**Best Model ({}):** {} (F1 micro={:.4}, Exact match={:.4})\n\n",
            results.summary.split, results.summary.best_model, results.summary.best_f1_micro, results.summary.best_exact_match
        ));

        report.push_str("### Model Comparison\n\n");
        report.push_str("| Model | Exact Match | F1 Micro | F1 Macro | F1 Weighted | mAP |\n");
        report.push_str("|-------|-------------|----------|----------|-------------|-----|\n");
        for row in &results.summary.comparison {
            let map = row.mean_average_precision.map_or("-".to_string(), |v| format!("{:.4}", v));
            report.push_str(&format!(
                "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {} |\n",
                row.model, row.exact_match, row.f1_micro, row.f1_macro, row.f1_weighted, map
            ));
        }

        report.push_str("\n## Detailed Results\n\n");
        for result in &results.reports {
            report.push_str(&format!("### {} / {}\n\n", result.model, result.split));
            report.push_str(&format!("```\n{}```\n\n", result.format()));

            let failed: Vec<_> = result.failed_artifacts().collect();
            if !failed.is_empty() {
                report.push_str("Artifacts not produced:\n\n");
                for artifact in failed {
                    report.push_str(&format!("- {}\n", artifact.path.display()));
                }
                report.push('\n');
            }
        }

        if let Some(path) = &results.model_artifact {
            report.push_str(&format!("**Model artifact:** {}\n\n", path.display()));
        }

        report.push_str("## Configuration\n\n");
        report.push_str(&format!(
            "```json\n{}\n```\n",
            serde_json::to_string_pretty(&results.config).unwrap_or_default()
        ));

        report
    }
}

fn dataset_info(table: &Table, split: &SplitTriple, space: &LabelSpace, vectorizer: &FittedVectorizer) -> DatasetInfo {
    DatasetInfo {
        source: table.source.clone(),
        total_samples: table.len(),
        train_samples: split.train.len(),
        validation_samples: split.validation.len(),
        test_samples: split.test.len(),
        labels: space.classes().to_vec(),
        n_features: vectorizer.n_features(),
        group_distribution: table.group_distribution(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(output_dir: &Path) -> PipelineConfig {
        PipelineConfig {
            synthetic_size: 120,
            output_dir: output_dir.to_path_buf(),
            emit_plots: false,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_pipeline_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let results = Pipeline::new(test_config(dir.path())).run().expect("Pipeline should succeed");

        assert_eq!(results.reports.len(), 4);
        assert_eq!(results.dataset_info.total_samples, 120);
        assert_eq!(results.dataset_info.labels.len(), 4);
        assert_eq!(results.summary.split, "test");
        assert!(results.summary.best_f1_micro >= 0.0 && results.summary.best_f1_micro <= 1.0);
        assert!(dir.path().join("logreg_test_metrics.txt").exists());
        assert!(dir.path().join("majority_validation_metrics.json").exists());
    }

    #[test]
    fn test_logreg_beats_majority() {
        let dir = tempfile::tempdir().unwrap();
        let results = Pipeline::new(test_config(dir.path())).run().unwrap();

        let f1 = |model: &str| {
            results
                .summary
                .comparison
                .iter()
                .find(|c| c.model == model)
                .map(|c| c.f1_micro)
                .unwrap()
        };
        assert!(f1("logreg") > f1("majority"));
        assert_eq!(results.summary.best_model, "logreg");
    }

    #[test]
    fn test_pipeline_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(test_config(dir.path()));
        let a = pipeline.run().unwrap();
        let b = pipeline.run().unwrap();

        for (x, y) in a.reports.iter().zip(&b.reports) {
            assert_eq!(x.structured(), y.structured());
        }
    }

    #[test]
    fn test_model_artifact_saved() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            model_path: Some(dir.path().join("model.json")),
            models: vec!["logreg".to_string()],
            eval_splits: vec!["validation".to_string()],
            ..test_config(dir.path())
        };
        let results = Pipeline::new(config).run().unwrap();

        assert_eq!(results.summary.split, "validation");
        let path = results.model_artifact.expect("artifact path");
        let artifact = ModelArtifact::load(&path).unwrap();
        assert_eq!(artifact.labels.classes(), results.dataset_info.labels.as_slice());
        assert_eq!(artifact.vectorizer.n_features(), results.dataset_info.n_features);
    }

    #[test]
    fn test_unknown_model_rejected() {
        let config = PipelineConfig {
            models: vec!["svm".to_string()],
            ..PipelineConfig::default()
        };
        let err = Pipeline::new(config).run().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "seed": 7, "models": ["prior"], "split": { "test_size": 0.25, "val_size": 0.1 } }"#)
            .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.seed, Seed::new(7));
        assert_eq!(config.models, vec!["prior".to_string()]);
        assert!((config.split.test_size - 0.25).abs() < 1e-12);
        assert_eq!(config.vectorizer.max_features, 5000);
        assert_eq!(config.trainer.max_iter, 200);
    }

    #[test]
    fn test_generate_report() {
        let dir = tempfile::tempdir().unwrap();
        let results = Pipeline::new(test_config(dir.path())).run().unwrap();
        let report = Pipeline::generate_report(&results);

        assert!(report.contains("Biomedical Abstract Classification Report"));
        assert!(report.contains("Model Comparison"));
        assert!(report.contains("Best Model"));
        assert!(report.contains("Exact Match Ratio"));

        let path = dir.path().join("nested").join("results.json");
        Pipeline::save_results(&results, &path).unwrap();
        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["summary"]["best_model"], results.summary.best_model.as_str());
    }
}
