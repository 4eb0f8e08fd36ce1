// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! One-vs-rest logistic regression and the persisted model artifact
//!
//! Each label column gets its own binary logistic regression minimizing the
//! mean log-loss plus an L2 penalty of `||w||^2 / (2 C n)` (intercept
//! unpenalized) with L-BFGS and a backtracking line search. Training is
//! deterministic: there is no sampling and weights start at zero.

use crate::datasets::Record;
use crate::error::{PipelineError, Result};
use crate::features::{FeatureMatrix, FittedVectorizer};
use crate::labels::{LabelMatrix, LabelSpace};
use crate::preprocess::prepare_corpus;
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

/// Version tag written into every artifact file
pub const ARTIFACT_FORMAT: u32 = 1;

/// Common interface of every multilabel model the evaluator can score
pub trait MultiLabelClassifier: Send + Sync {
    /// Short identifier, used in report and plot file names
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn n_labels(&self) -> usize;

    /// Hard 0/1 predictions, one row per document
    fn predict(&self, features: &FeatureMatrix) -> Result<LabelMatrix>;

    /// Per-label positive-class probabilities
    fn predict_proba(&self, _features: &FeatureMatrix) -> Result<Array2<f64>> {
        Err(PipelineError::CapabilityUnavailable {
            model: self.name().to_string(),
            capability: "predict_proba",
        })
    }

    /// Whether `predict_proba` is implemented
    fn supports_proba(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Optimizer iterations per label before giving up
    pub max_iter: usize,
    /// Inverse regularization strength
    pub c: f64,
    /// Correction pairs kept by L-BFGS
    pub memory: usize,
    /// Convergence threshold on the largest gradient component
    pub tol: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            c: 1.0,
            memory: 10,
            tol: 1e-4,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(PipelineError::InvalidConfig("max_iter must be positive".to_string()));
        }
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!("C must be positive, got {}", self.c)));
        }
        if self.memory == 0 {
            return Err(PipelineError::InvalidConfig("memory must be positive".to_string()));
        }
        if !(self.tol >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!("tol must be non-negative, got {}", self.tol)));
        }
        Ok(())
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `log(1 + e^z)` without overflow
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// Armijo sufficient-decrease constant
const ARMIJO: f64 = 1e-4;
/// Step halvings tried before the line search gives up
const MAX_BACKTRACKS: usize = 40;

/// Penalized mean log-loss of one label column
///
/// Parameters are packed as `[w_0, .., w_{d-1}, intercept]`.
struct Objective<'a> {
    features: &'a FeatureMatrix,
    target: ArrayView1<'a, u8>,
    penalty: f64,
}

impl Objective<'_> {
    fn dim(&self) -> usize {
        self.features.cols() + 1
    }

    /// Loss at `params`; the gradient is written into `grad`
    fn evaluate(&self, params: &[f64], grad: &mut [f64]) -> f64 {
        let d = self.features.cols();
        let n = self.features.rows() as f64;
        let (weights, intercept) = (&params[..d], params[d]);

        grad.iter_mut().for_each(|g| *g = 0.0);
        let mut loss = 0.0;
        for (i, row) in self.features.outer_iterator().enumerate() {
            let z = intercept + row.iter().map(|(j, &v)| v * weights[j]).sum::<f64>();
            let y = self.target[i] as f64;
            loss += softplus(z) - y * z;
            let residual = (sigmoid(z) - y) / n;
            for (j, &v) in row.iter() {
                grad[j] += v * residual;
            }
            grad[d] += residual;
        }

        for (g, w) in grad[..d].iter_mut().zip(weights) {
            *g += self.penalty * w;
        }
        loss / n + 0.5 * self.penalty * dot(weights, weights)
    }
}

/// Binary logistic regression over sparse features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub intercept: f64,
    /// Optimizer iterations actually taken
    pub n_iter: usize,
    pub converged: bool,
}

impl LogisticRegression {
    fn fit<'a>(features: &'a FeatureMatrix, target: ArrayView1<'a, u8>, config: &TrainerConfig) -> Self {
        let objective = Objective {
            features,
            target,
            penalty: 1.0 / (config.c * features.rows() as f64),
        };
        let dim = objective.dim();

        let mut params = vec![0.0; dim];
        let mut grad = vec![0.0; dim];
        let mut loss = objective.evaluate(&params, &mut grad);

        // (s, y, 1 / y.s) correction pairs, oldest first
        let mut history: VecDeque<(Vec<f64>, Vec<f64>, f64)> = VecDeque::with_capacity(config.memory);
        let mut next_params = vec![0.0; dim];
        let mut next_grad = vec![0.0; dim];
        let mut n_iter = 0;

        while n_iter < config.max_iter && max_abs(&grad) >= config.tol {
            let mut direction = two_loop(&history, &grad);
            let mut slope = dot(&grad, &direction);
            if slope >= 0.0 {
                // curvature pairs went stale; restart from steepest descent
                history.clear();
                direction = grad.iter().map(|g| -g).collect();
                slope = -dot(&grad, &grad);
            }

            let mut step = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                for ((next, p), d) in next_params.iter_mut().zip(&params).zip(&direction) {
                    *next = p + step * d;
                }
                let next_loss = objective.evaluate(&next_params, &mut next_grad);
                if next_loss <= loss + ARMIJO * step * slope {
                    accepted = Some(next_loss);
                    break;
                }
                step *= 0.5;
            }
            let Some(next_loss) = accepted else {
                tracing::debug!("Line search stalled after {} iterations", n_iter);
                break;
            };

            let s: Vec<f64> = next_params.iter().zip(&params).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = next_grad.iter().zip(&grad).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if sy > f64::EPSILON * dot(&y, &y) {
                if history.len() == config.memory {
                    history.pop_front();
                }
                history.push_back((s, y, 1.0 / sy));
            }

            std::mem::swap(&mut params, &mut next_params);
            std::mem::swap(&mut grad, &mut next_grad);
            loss = next_loss;
            n_iter += 1;
        }

        let converged = max_abs(&grad) < config.tol;
        let intercept = params.pop().unwrap_or(0.0);
        Self {
            weights: params,
            intercept,
            n_iter,
            converged,
        }
    }

    fn decision(&self, row: sprs::CsVecView<'_, f64>) -> f64 {
        self.intercept + row.iter().map(|(j, &v)| v * self.weights[j]).sum::<f64>()
    }
}

/// L-BFGS search direction `-H g` from the stored correction pairs
fn two_loop(history: &VecDeque<(Vec<f64>, Vec<f64>, f64)>, grad: &[f64]) -> Vec<f64> {
    let mut q = grad.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y, rho) in history.iter().rev() {
        let alpha = rho * dot(s, &q);
        q.iter_mut().zip(y).for_each(|(q, y)| *q -= alpha * y);
        alphas.push(alpha);
    }

    let gamma = history.back().map_or(1.0, |(s, y, _)| dot(s, y) / dot(y, y));
    q.iter_mut().for_each(|q| *q *= gamma);

    for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = rho * dot(y, &q);
        q.iter_mut().zip(s).for_each(|(q, s)| *q += (alpha - beta) * s);
    }
    q.iter_mut().for_each(|q| *q = -*q);
    q
}

/// Per-label estimator; labels constant in training need no optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BinaryEstimator {
    Logistic(LogisticRegression),
    Constant { value: u8 },
}

impl BinaryEstimator {
    fn probability(&self, row: sprs::CsVecView<'_, f64>) -> f64 {
        match self {
            BinaryEstimator::Logistic(model) => sigmoid(model.decision(row)),
            BinaryEstimator::Constant { value } => *value as f64,
        }
    }

    fn predict(&self, row: sprs::CsVecView<'_, f64>) -> u8 {
        match self {
            BinaryEstimator::Logistic(model) => u8::from(model.decision(row) > 0.0),
            BinaryEstimator::Constant { value } => *value,
        }
    }
}

/// One binary estimator per label column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneVsRestClassifier {
    n_features: usize,
    estimators: Vec<BinaryEstimator>,
}

impl OneVsRestClassifier {
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn estimators(&self) -> &[BinaryEstimator] {
        &self.estimators
    }

    fn check_width(&self, features: &FeatureMatrix) -> Result<()> {
        if features.cols() != self.n_features {
            return Err(PipelineError::VocabularyMismatch {
                what: "feature columns",
                expected: self.n_features,
                actual: features.cols(),
            });
        }
        Ok(())
    }
}

impl MultiLabelClassifier for OneVsRestClassifier {
    fn name(&self) -> &str {
        "logreg"
    }

    fn description(&self) -> &str {
        "One-vs-rest L2 logistic regression over TF-IDF features"
    }

    fn n_labels(&self) -> usize {
        self.estimators.len()
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<LabelMatrix> {
        self.check_width(features)?;
        let mut out = LabelMatrix::zeros((features.rows(), self.estimators.len()));
        for (i, row) in features.outer_iterator().enumerate() {
            for (j, estimator) in self.estimators.iter().enumerate() {
                out[[i, j]] = estimator.predict(row.view());
            }
        }
        Ok(out)
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Array2<f64>> {
        self.check_width(features)?;
        let mut out = Array2::zeros((features.rows(), self.estimators.len()));
        for (i, row) in features.outer_iterator().enumerate() {
            for (j, estimator) in self.estimators.iter().enumerate() {
                out[[i, j]] = estimator.probability(row.view());
            }
        }
        Ok(out)
    }

    fn supports_proba(&self) -> bool {
        true
    }
}

pub struct ModelTrainer {
    config: TrainerConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Train one estimator per column of `labels`
    pub fn fit(&self, features: &FeatureMatrix, labels: &LabelMatrix) -> Result<OneVsRestClassifier> {
        self.config.validate()?;
        if features.rows() != labels.nrows() {
            return Err(PipelineError::InvalidInput(format!(
                "{} feature rows but {} label rows",
                features.rows(),
                labels.nrows()
            )));
        }
        if features.rows() == 0 {
            return Err(PipelineError::InvalidInput("cannot train on zero documents".to_string()));
        }

        let estimators = labels
            .columns()
            .into_iter()
            .enumerate()
            .map(|(j, column)| {
                let positives = column.iter().filter(|&&v| v != 0).count();
                if positives == 0 || positives == column.len() {
                    let value = u8::from(positives > 0);
                    tracing::info!("Label column {} is constant ({}) in training data", j, value);
                    return BinaryEstimator::Constant { value };
                }

                let model = LogisticRegression::fit(features, column, &self.config);
                if !model.converged {
                    tracing::warn!(
                        "Label column {} did not converge within {} iterations",
                        j,
                        self.config.max_iter
                    );
                }
                BinaryEstimator::Logistic(model)
            })
            .collect();

        tracing::info!(
            "Trained one-vs-rest classifier: {} labels x {} features",
            labels.ncols(),
            features.cols()
        );

        Ok(OneVsRestClassifier {
            n_features: features.cols(),
            estimators,
        })
    }
}

/// Everything needed to score raw text: vectorizer, label space and weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    /// Crate version that produced the artifact
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub vectorizer: FittedVectorizer,
    pub labels: LabelSpace,
    pub classifier: OneVsRestClassifier,
}

#[derive(Serialize, Deserialize)]
struct ArtifactFile {
    format: u32,
    /// Hex SHA-256 of the serialized `model`
    checksum: String,
    model: ModelArtifact,
}

fn checksum(model: &ModelArtifact) -> Result<String> {
    let bytes = serde_json::to_vec(model)
        .map_err(|e| PipelineError::InvalidInput(format!("cannot serialize model: {}", e)))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

impl ModelArtifact {
    pub fn new(
        name: impl Into<String>,
        vectorizer: FittedVectorizer,
        labels: LabelSpace,
        classifier: OneVsRestClassifier,
    ) -> Result<Self> {
        if classifier.n_features() != vectorizer.n_features() {
            return Err(PipelineError::VocabularyMismatch {
                what: "vectorizer vocabulary",
                expected: classifier.n_features(),
                actual: vectorizer.n_features(),
            });
        }
        if classifier.n_labels() != labels.len() {
            return Err(PipelineError::VocabularyMismatch {
                what: "label space",
                expected: classifier.n_labels(),
                actual: labels.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            vectorizer,
            labels,
            classifier,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = ArtifactFile {
            format: ARTIFACT_FORMAT,
            checksum: checksum(self)?,
            model: self.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| PipelineError::artifact(path, e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::artifact(path, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| PipelineError::artifact(path, e))?;
        fs::rename(&tmp, path).map_err(|e| PipelineError::artifact(path, e))?;

        tracing::info!("Model artifact saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::artifact(path, e))?;
        let file: ArtifactFile = serde_json::from_str(&content).map_err(|e| PipelineError::artifact(path, e))?;

        if file.format != ARTIFACT_FORMAT {
            return Err(PipelineError::artifact(
                path,
                format!("unsupported format {} (expected {})", file.format, ARTIFACT_FORMAT),
            ));
        }
        let actual = checksum(&file.model)?;
        if actual != file.checksum {
            return Err(PipelineError::artifact(
                path,
                format!("checksum mismatch: recorded {}, computed {}", file.checksum, actual),
            ));
        }

        tracing::info!(
            "Loaded model '{}' ({} labels, {} features) from {}",
            file.model.name,
            file.model.labels.len(),
            file.model.vectorizer.n_features(),
            path.display()
        );
        Ok(file.model)
    }

    /// Clean, vectorize and classify raw records
    pub fn featurize(&self, records: &[Record]) -> FeatureMatrix {
        let corpus: Vec<String> = prepare_corpus(records).collect();
        self.vectorizer.transform(&corpus)
    }

    /// Predicted label names per record
    pub fn predict_texts(&self, records: &[Record]) -> Result<Vec<Vec<String>>> {
        let features = self.featurize(records);
        let predictions = self.classifier.predict(&features)?;
        Ok(predictions
            .rows()
            .into_iter()
            .map(|row| self.labels.decode(row).into_iter().map(str::to_string).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::Table;
    use crate::features::TfidfVectorizer;
    use crate::labels::fit_transform;

    fn toy_table() -> Table {
        let docs = [
            ("cardiac arrest", "heart rhythm failure", "cardio"),
            ("heart attack", "cardiac muscle damage", "cardio"),
            ("arrhythmia", "heart rhythm monitoring", "cardio"),
            ("tumor growth", "cancer cell division", "onco"),
            ("cancer therapy", "tumor shrinkage rates", "onco"),
            ("metastasis", "cancer spread tumor", "onco"),
            ("cardiac tumor", "rare heart cancer", "cardio|onco"),
            ("heart cancer", "cardiac tumor case", "cardio|onco"),
        ];
        let records = docs
            .iter()
            .enumerate()
            .map(|(i, &(t, a, g))| Record::new(i, Some(t), Some(a), g))
            .collect();
        Table::new("toy", records)
    }

    fn train_toy() -> (FittedVectorizer, LabelSpace, OneVsRestClassifier, FeatureMatrix, LabelMatrix) {
        let table = toy_table();
        let corpus: Vec<String> = prepare_corpus(&table.records).collect();
        let (features, vectorizer) = TfidfVectorizer::default().fit_transform(&corpus).unwrap();
        let (labels, space) = fit_transform(&table).unwrap();
        // eight documents: weaker regularization so every training row is fitted exactly
        let config = TrainerConfig {
            c: 10.0,
            ..TrainerConfig::default()
        };
        let classifier = ModelTrainer::new(config).fit(&features, &labels).unwrap();
        (vectorizer, space, classifier, features, labels)
    }

    fn logistic(estimator: &BinaryEstimator) -> &LogisticRegression {
        match estimator {
            BinaryEstimator::Logistic(model) => model,
            other => panic!("expected a logistic estimator, got {:?}", other),
        }
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(!sigmoid(-800.0).is_nan());
    }

    #[test]
    fn test_learns_separable_corpus() {
        let (_, _, classifier, features, labels) = train_toy();
        let predictions = classifier.predict(&features).unwrap();
        assert_eq!(predictions, labels);

        let proba = classifier.predict_proba(&features).unwrap();
        assert_eq!(proba.dim(), (8, 2));
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_default_config_converges() {
        use crate::split::{SplitConfig, Splitter};
        use crate::Seed;

        let table = Table::synthetic(300, Seed::DEFAULT);
        let split = Splitter::new(SplitConfig::default(), Seed::DEFAULT).split(&table).unwrap();
        let corpus: Vec<String> = prepare_corpus(&split.train.records).collect();
        let (features, _) = TfidfVectorizer::default().fit_transform(&corpus).unwrap();
        let (labels, _) = fit_transform(&split.train).unwrap();

        let config = TrainerConfig::default();
        let classifier = ModelTrainer::new(config).fit(&features, &labels).unwrap();

        assert_eq!(classifier.estimators().len(), 4);
        for estimator in classifier.estimators() {
            let model = logistic(estimator);
            assert!(model.converged, "stopped after {} iterations", model.n_iter);
            assert!(model.n_iter < config.max_iter);
        }
        let predictions = classifier.predict(&features).unwrap();
        let exact = predictions.rows().into_iter().zip(labels.rows()).filter(|(p, t)| p == t).count();
        assert!(exact as f64 >= 0.9 * labels.nrows() as f64, "{} of {} rows", exact, labels.nrows());
    }

    #[test]
    fn test_more_iterations_do_not_move_a_converged_fit() {
        let (_, _, classifier, features, labels) = train_toy();
        let longer = ModelTrainer::new(TrainerConfig {
            c: 10.0,
            max_iter: 2000,
            ..TrainerConfig::default()
        })
        .fit(&features, &labels)
        .unwrap();

        for (a, b) in classifier.estimators().iter().zip(longer.estimators()) {
            let (a, b) = (logistic(a), logistic(b));
            assert!(a.converged);
            assert_eq!(a.n_iter, b.n_iter);
            assert_eq!(a.weights, b.weights);
        }
    }

    #[test]
    fn test_lbfgs_reaches_the_penalized_optimum() {
        let (features, _) = TfidfVectorizer::default()
            .fit_transform(&["alpha beta", "gamma delta", "alpha gamma", "beta delta"])
            .unwrap();
        let target = ndarray::array![1u8, 0, 1, 0];
        let config = TrainerConfig {
            tol: 1e-6,
            ..TrainerConfig::default()
        };
        let model = LogisticRegression::fit(&features, target.view(), &config);
        assert!(model.converged);

        let objective = Objective {
            features: &features,
            target: target.view(),
            penalty: 1.0 / (config.c * 4.0),
        };
        let mut params = model.weights.clone();
        params.push(model.intercept);
        let mut grad = vec![0.0; params.len()];
        let optimum = objective.evaluate(&params, &mut grad);
        assert!(max_abs(&grad) < 1e-6);

        // any nearby point is worse
        for j in 0..params.len() {
            for delta in [-1e-3, 1e-3] {
                let mut moved = params.clone();
                moved[j] += delta;
                assert!(objective.evaluate(&moved, &mut grad) > optimum);
            }
        }
    }

    #[test]
    fn test_constant_column_gets_constant_estimator() {
        let table = Table::new(
            "const",
            vec![
                Record::new(0, Some("alpha beta"), None, "x|always"),
                Record::new(1, Some("gamma delta"), None, "always"),
                Record::new(2, Some("alpha gamma"), None, "x|always"),
            ],
        );
        let corpus: Vec<String> = prepare_corpus(&table.records).collect();
        let (features, _) = TfidfVectorizer::default().fit_transform(&corpus).unwrap();
        let (labels, space) = fit_transform(&table).unwrap();
        let classifier = ModelTrainer::new(TrainerConfig::default()).fit(&features, &labels).unwrap();

        let always = space.index_of("always").unwrap();
        assert_eq!(classifier.estimators()[always], BinaryEstimator::Constant { value: 1 });
        let predictions = classifier.predict(&features).unwrap();
        assert!(predictions.column(always).iter().all(|&v| v == 1));
    }

    #[test]
    fn test_feature_width_mismatch() {
        let (_, _, classifier, _, _) = train_toy();
        let narrow: FeatureMatrix = sprs::TriMat::new((2, 3)).to_csr();
        let err = classifier.predict(&narrow).unwrap_err();
        assert!(matches!(err, PipelineError::VocabularyMismatch { actual: 3, .. }));
    }

    #[test]
    fn test_invalid_trainer_config() {
        let (features, _) = TfidfVectorizer::default().fit_transform(&["alpha beta", "gamma delta"]).unwrap();
        let labels = LabelMatrix::from_shape_vec((2, 1), vec![0, 1]).unwrap();
        for config in [
            TrainerConfig {
                c: 0.0,
                ..TrainerConfig::default()
            },
            TrainerConfig {
                memory: 0,
                ..TrainerConfig::default()
            },
        ] {
            assert!(matches!(
                ModelTrainer::new(config).fit(&features, &labels),
                Err(PipelineError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_artifact_roundtrip_predicts_identically() {
        let (vectorizer, space, classifier, features, _) = train_toy();
        let artifact = ModelArtifact::new("logreg", vectorizer, space, classifier).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("logreg.json");
        artifact.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();

        assert_eq!(loaded, artifact);
        assert_eq!(
            loaded.classifier.predict_proba(&features).unwrap(),
            artifact.classifier.predict_proba(&features).unwrap()
        );

        let table = toy_table();
        assert_eq!(
            loaded.predict_texts(&table.records).unwrap(),
            artifact.predict_texts(&table.records).unwrap()
        );
    }

    #[test]
    fn test_tampered_artifact_rejected() {
        let (vectorizer, space, classifier, _, _) = train_toy();
        let artifact = ModelArtifact::new("logreg", vectorizer, space, classifier).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logreg.json");
        artifact.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replacen("\"logreg\"", "\"tampered\"", 1)).unwrap();

        let err = ModelArtifact::load(&path).unwrap_err();
        match err {
            PipelineError::Artifact { reason, .. } => assert!(reason.contains("checksum")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_predict_texts_decodes_labels() {
        let (vectorizer, space, classifier, _, _) = train_toy();
        let artifact = ModelArtifact::new("logreg", vectorizer, space, classifier).unwrap();
        let records = vec![Record::new(0, Some("cardiac heart rhythm"), None, "unused")];
        let predicted = artifact.predict_texts(&records).unwrap();
        assert_eq!(predicted.len(), 1);
        assert!(predicted[0].contains(&"cardio".to_string()));
    }
}
