// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Multilabel classification of biomedical abstracts
//!
//! This crate provides:
//! - Dataset loading from delimited files or URLs, plus a synthetic corpus
//! - Stratified train / validation / test splitting with explicit seeding
//! - Text normalization, label binarization and TF-IDF features
//! - One-vs-rest logistic regression and content-free baselines
//! - Multilabel metrics, text/JSON reports and PNG charts
//! - A reproducible end-to-end pipeline and a persistable model artifact

pub mod baselines;
pub mod datasets;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod labels;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod plots;
pub mod preprocess;
pub mod seed;
pub mod split;

pub use baselines::{LabelPrior, MajorityLabelSet};
pub use datasets::{load_table, LoadOptions, Record, Table};
pub use error::{PipelineError, Result};
pub use evaluation::{EvaluationOptions, Evaluator, MetricsReport, StructuredReport};
pub use features::{FeatureMatrix, FittedVectorizer, TfidfVectorizer};
pub use labels::{LabelMatrix, LabelSpace};
pub use metrics::{ConfusionMatrix, MultiLabelMetrics, PrCurve};
pub use model::{ModelArtifact, ModelTrainer, MultiLabelClassifier, OneVsRestClassifier, TrainerConfig};
pub use pipeline::{Pipeline, PipelineConfig, PipelineResults};
pub use preprocess::{clean, combine, prepare_corpus};
pub use seed::Seed;
pub use split::{SplitConfig, SplitTriple, Splitter};
