// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy shared by every pipeline stage

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Dataset could not be read or parsed. Logged at the loader boundary.
    #[error("dataset unavailable at {location}: {reason}")]
    SourceUnavailable { location: String, reason: String },

    /// A group value has too few members for the requested partition.
    #[error("cannot stratify on group '{group}': {members} member(s), at least {required} required")]
    StratificationInfeasible {
        group: String,
        members: usize,
        required: usize,
    },

    /// Data scored against artifacts fitted on a different corpus.
    #[error("{what} mismatch: fitted on {expected} columns, got {actual}")]
    VocabularyMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("model '{model}' does not support {capability}")]
    CapabilityUnavailable {
        model: String,
        capability: &'static str,
    },

    #[error("cannot write report sink {}: {source}", path.display())]
    SinkUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid group field at row {row}: {value:?}")]
    InvalidLabels { row: usize, value: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model artifact {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    #[error("failed to render {artifact}: {reason}")]
    Plot { artifact: String, reason: String },
}

impl PipelineError {
    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::Artifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::SinkUnwritable {
            path: path.into(),
            source,
        }
    }
}
