// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! TF-IDF feature extraction over word n-grams
//!
//! A [`TfidfVectorizer`] holds only hyperparameters. Fitting it on the training
//! corpus yields a [`FittedVectorizer`] (vocabulary plus idf weights) which is
//! the only thing able to transform validation and test text, so held-out data
//! can never leak into the vocabulary.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Sparse document-term matrix, one CSR row per document
pub type FeatureMatrix = sprs::CsMat<f64>;

/// Shortest token kept, in characters
const MIN_TOKEN_LEN: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    /// Vocabulary cap; the most frequent terms are kept
    pub max_features: usize,
    /// Inclusive (min, max) n-gram lengths
    pub ngram_range: (usize, usize),
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self {
            max_features: 5000,
            ngram_range: (1, 2),
        }
    }
}

impl TfidfVectorizer {
    pub fn new(max_features: usize, ngram_range: (usize, usize)) -> Self {
        Self {
            max_features,
            ngram_range,
        }
    }

    fn validate(&self) -> Result<()> {
        let (lo, hi) = self.ngram_range;
        if self.max_features == 0 {
            return Err(PipelineError::InvalidConfig("max_features must be positive".to_string()));
        }
        if lo == 0 || lo > hi {
            return Err(PipelineError::InvalidConfig(format!(
                "invalid ngram_range ({}, {})",
                lo, hi
            )));
        }
        Ok(())
    }

    /// Learn vocabulary and idf weights from `corpus`
    pub fn fit<S: AsRef<str>>(&self, corpus: &[S]) -> Result<FittedVectorizer> {
        self.validate()?;
        if corpus.is_empty() {
            return Err(PipelineError::InvalidInput("cannot fit vectorizer on an empty corpus".to_string()));
        }

        let mut term_counts: HashMap<String, usize> = HashMap::new();
        for doc in corpus {
            for term in analyze(doc.as_ref(), self.ngram_range) {
                *term_counts.entry(term).or_insert(0) += 1;
            }
        }
        if term_counts.is_empty() {
            return Err(PipelineError::InvalidInput(
                "empty vocabulary; documents contain no usable tokens".to_string(),
            ));
        }

        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);

        let vocabulary: BTreeMap<String, usize> = {
            let mut terms: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
            terms.sort();
            terms.into_iter().enumerate().map(|(i, term)| (term, i)).collect()
        };

        let mut doc_freq = vec![0usize; vocabulary.len()];
        for doc in corpus {
            let mut seen: Vec<usize> = analyze(doc.as_ref(), self.ngram_range)
                .filter_map(|term| vocabulary.get(&term).copied())
                .collect();
            seen.sort_unstable();
            seen.dedup();
            for idx in seen {
                doc_freq[idx] += 1;
            }
        }

        let n_docs = corpus.len() as f64;
        let idf = doc_freq
            .iter()
            .map(|&df| ((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        tracing::info!(
            "Vectorizer fitted on {} documents: {} features (ngram_range={:?})",
            corpus.len(),
            vocabulary.len(),
            self.ngram_range
        );

        Ok(FittedVectorizer {
            vocabulary,
            idf,
            ngram_range: self.ngram_range,
        })
    }

    pub fn fit_transform<S: AsRef<str>>(&self, corpus: &[S]) -> Result<(FeatureMatrix, FittedVectorizer)> {
        let fitted = self.fit(corpus)?;
        let matrix = fitted.transform(corpus);
        Ok((matrix, fitted))
    }
}

/// Vocabulary and idf weights learned from a training corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedVectorizer {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
    ngram_range: (usize, usize),
}

impl FittedVectorizer {
    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Terms in column order
    pub fn terms(&self) -> Vec<&str> {
        // Indices were assigned in alphabetical order, so map order is column order.
        self.vocabulary.keys().map(String::as_str).collect()
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    /// Weight `corpus` with the fitted vocabulary; unseen terms are dropped
    pub fn transform<S: AsRef<str>>(&self, corpus: &[S]) -> FeatureMatrix {
        let mut tri: sprs::TriMat<f64> = sprs::TriMat::new((corpus.len(), self.n_features()));

        for (doc_idx, doc) in corpus.iter().enumerate() {
            let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
            for term in analyze(doc.as_ref(), self.ngram_range) {
                if let Some(&idx) = self.vocabulary.get(&term) {
                    *counts.entry(idx).or_insert(0) += 1;
                }
            }

            let row: Vec<(usize, f64)> = counts
                .into_iter()
                .map(|(idx, count)| (idx, count as f64 * self.idf[idx]))
                .collect();
            let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
            if norm == 0.0 {
                continue;
            }
            for (idx, value) in row {
                tri.add_triplet(doc_idx, idx, value / norm);
            }
        }

        tri.to_csr()
    }

    /// Error unless `matrix` has this vectorizer's width
    pub fn check_width(&self, matrix: &FeatureMatrix) -> Result<()> {
        if matrix.cols() != self.n_features() {
            return Err(PipelineError::VocabularyMismatch {
                what: "feature columns",
                expected: self.n_features(),
                actual: matrix.cols(),
            });
        }
        Ok(())
    }
}

/// Word n-grams of `text` for every length in `ngram_range`
fn analyze(text: &str, ngram_range: (usize, usize)) -> impl Iterator<Item = String> + '_ {
    let tokens: Vec<&str> = text
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .collect();
    let (lo, hi) = ngram_range;

    (lo..=hi).flat_map(move |n| {
        let grams: Vec<String> = if n == 0 || n > tokens.len() {
            Vec::new()
        } else {
            tokens.windows(n).map(|w| w.join(" ")).collect()
        };
        grams
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "tumor suppressor gene tp53 mutation".to_string(),
            "heart failure and atrial fibrillation".to_string(),
            "tp53 mutation in heart tissue".to_string(),
            "a b c".to_string(),
        ]
    }

    fn dense_rows(matrix: &FeatureMatrix) -> Vec<Vec<f64>> {
        matrix
            .outer_iterator()
            .map(|row| {
                let mut dense = vec![0.0; matrix.cols()];
                for (idx, &value) in row.iter() {
                    dense[idx] = value;
                }
                dense
            })
            .collect()
    }

    #[test]
    fn test_transform_matches_fit_transform() {
        let (matrix, fitted) = TfidfVectorizer::default().fit_transform(&corpus()).unwrap();
        let again = fitted.transform(&corpus());

        assert_eq!(matrix.shape(), again.shape());
        for (a, b) in dense_rows(&matrix).iter().zip(dense_rows(&again).iter()) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_unigrams_and_bigrams() {
        let fitted = TfidfVectorizer::default().fit(&corpus()).unwrap();
        assert!(fitted.index_of("tp53").is_some());
        assert!(fitted.index_of("tp53 mutation").is_some());
        assert!(fitted.index_of("tumor suppressor gene").is_none());
        // single-character tokens are dropped
        assert!(fitted.index_of("a").is_none());
        assert!(fitted.index_of("b c").is_none());
    }

    #[test]
    fn test_columns_are_alphabetical() {
        let fitted = TfidfVectorizer::default().fit(&corpus()).unwrap();
        let terms = fitted.terms();
        let mut sorted = terms.clone();
        sorted.sort();
        assert_eq!(terms, sorted);
        for (i, term) in terms.iter().enumerate() {
            assert_eq!(fitted.index_of(term), Some(i));
        }
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let vectorizer = TfidfVectorizer::new(2, (1, 1));
        let fitted = vectorizer.fit(&corpus()).unwrap();
        assert_eq!(fitted.n_features(), 2);
        // "heart", "mutation" and "tp53" each occur twice; ties go to the smaller term
        assert_eq!(fitted.terms(), vec!["heart", "mutation"]);
    }

    #[test]
    fn test_rows_are_l2_normalized() {
        let (matrix, _) = TfidfVectorizer::default().fit_transform(&corpus()).unwrap();
        for (i, row) in matrix.outer_iterator().enumerate() {
            let norm: f64 = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
            if i == 3 {
                assert_eq!(row.nnz(), 0);
            } else {
                assert!((norm - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_smooth_idf() {
        let fitted = TfidfVectorizer::new(100, (1, 1)).fit(&corpus()).unwrap();
        let heart = fitted.index_of("heart").unwrap();
        let expected = (5.0f64 / 3.0).ln() + 1.0;
        assert!((fitted.idf()[heart] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unseen_terms_ignored() {
        let fitted = TfidfVectorizer::default().fit(&corpus()).unwrap();
        let matrix = fitted.transform(&["completely novel words"]);
        assert_eq!(matrix.shape(), (1, fitted.n_features()));
        assert_eq!(matrix.nnz(), 0);
    }

    #[test]
    fn test_empty_vocabulary_is_error() {
        let err = TfidfVectorizer::default().fit(&["a b", ""]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));

        let empty: Vec<String> = Vec::new();
        assert!(TfidfVectorizer::default().fit(&empty).is_err());
    }

    #[test]
    fn test_width_check() {
        let (matrix, fitted) = TfidfVectorizer::default().fit_transform(&corpus()).unwrap();
        assert!(fitted.check_width(&matrix).is_ok());

        let narrow = TfidfVectorizer::new(3, (1, 1)).fit(&corpus()).unwrap();
        let err = narrow.check_width(&matrix).unwrap_err();
        assert!(matches!(err, PipelineError::VocabularyMismatch { expected: 3, .. }));
    }
}
