// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Multilabel binarization of `|`-delimited group fields

use crate::datasets::{Record, Table};
use crate::error::{PipelineError, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Separator between label names inside a group field
pub const LABEL_SEPARATOR: char = '|';

/// Binary indicator matrix: rows are records, columns follow a [`LabelSpace`]
pub type LabelMatrix = Array2<u8>;

/// Split a group field into its distinct labels
///
/// Tokens are kept verbatim. Empty or whitespace-only tokens (`"A||B"`,
/// `"A| "`) are rejected as a data error.
pub fn parse_group(row: usize, group: &str) -> Result<BTreeSet<&str>> {
    let mut labels = BTreeSet::new();
    for token in group.split(LABEL_SEPARATOR) {
        if token.trim().is_empty() {
            return Err(PipelineError::InvalidLabels {
                row,
                value: group.to_string(),
            });
        }
        labels.insert(token);
    }
    Ok(labels)
}

/// Sorted set of label names fitted on a training table
///
/// Column `i` of every label matrix built from this space stands for
/// `classes()[i]`. Held-out data must be encoded with the space fitted on
/// train; there is no way to build a matrix without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpace {
    classes: Vec<String>,
}

impl LabelSpace {
    pub fn fit(records: &[Record]) -> Result<Self> {
        let mut classes = BTreeSet::new();
        for record in records {
            classes.extend(parse_group(record.row, &record.group)?);
        }
        if classes.is_empty() {
            return Err(PipelineError::InvalidInput("no labels to fit".to_string()));
        }
        Ok(Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        })
    }

    pub fn from_classes<I, S>(classes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: BTreeSet<String> = classes.into_iter().map(Into::into).collect();
        if classes.is_empty() {
            return Err(PipelineError::InvalidInput("no labels to fit".to_string()));
        }
        Ok(Self {
            classes: classes.into_iter().collect(),
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok()
    }

    /// Encode `records` against this space
    ///
    /// Labels the space has never seen have no column; they are logged and
    /// left out of the row.
    pub fn transform(&self, records: &[Record]) -> Result<LabelMatrix> {
        let mut matrix = LabelMatrix::zeros((records.len(), self.classes.len()));
        let mut unknown: BTreeMap<&str, usize> = BTreeMap::new();

        for (i, record) in records.iter().enumerate() {
            for label in parse_group(record.row, &record.group)? {
                match self.index_of(label) {
                    Some(j) => matrix[[i, j]] = 1,
                    None => *unknown.entry(label).or_insert(0) += 1,
                }
            }
        }

        for (label, count) in unknown {
            tracing::warn!("Label '{}' not in fitted label space, ignored in {} record(s)", label, count);
        }

        Ok(matrix)
    }

    pub fn transform_table(&self, table: &Table) -> Result<LabelMatrix> {
        self.transform(&table.records)
    }

    /// Label names set in one indicator row
    pub fn decode(&self, row: ArrayView1<'_, u8>) -> Vec<&str> {
        row.iter()
            .zip(&self.classes)
            .filter(|(&v, _)| v != 0)
            .map(|(_, label)| label.as_str())
            .collect()
    }
}

/// Fit a label space on `table` and encode it
pub fn fit_transform(table: &Table) -> Result<(LabelMatrix, LabelSpace)> {
    let space = LabelSpace::fit(&table.records)?;
    let matrix = space.transform(&table.records)?;
    tracing::info!("Label space fitted: {} classes {:?}", space.len(), space.classes());
    Ok((matrix, space))
}
