// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset loading for biomedical abstract classification
//!
//! Reads a delimited table with `title`, `abstract` and `group` columns from a
//! local path or an http(s) URL. Failures are returned as
//! [`PipelineError::SourceUnavailable`] after being logged, so callers always
//! get an explicit "no table" value rather than a crash.

use crate::error::{PipelineError, Result};
use crate::seed::{RngStream, Seed};
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::time::Duration;

/// Columns every input file must provide
pub const REQUIRED_COLUMNS: [&str; 3] = ["title", "abstract", "group"];

/// A single document from the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Position in the source table (0-based, header excluded)
    pub row: usize,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// `|`-joined label names
    pub group: String,
}

impl Record {
    pub fn new(row: usize, title: Option<&str>, abstract_text: Option<&str>, group: &str) -> Self {
        Self {
            row,
            title: title.map(str::to_string),
            abstract_text: abstract_text.map(str::to_string),
            group: group.to_string(),
        }
    }
}

/// Options for reading a delimited file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Column separator (ASCII)
    pub separator: char,
    /// Stop after this many data rows
    #[serde(default)]
    pub max_rows: Option<usize>,
    /// Timeout for remote sources
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Reject files without a non-empty `group` on every row
    #[serde(default = "default_require_group")]
    pub require_group: bool,
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_require_group() -> bool {
    true
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            separator: ';',
            max_rows: None,
            timeout_secs: default_timeout_secs(),
            require_group: default_require_group(),
        }
    }
}

/// An in-memory table of documents sharing one schema
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Where the rows came from (path, URL, or a derived name)
    pub source: String,
    pub records: Vec<Record>,
    columns: usize,
}

impl Table {
    pub fn new(source: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            source: source.into(),
            records,
            columns: REQUIRED_COLUMNS.len(),
        }
    }

    /// Table holding `records` taken from this one
    pub fn derive(&self, suffix: &str, records: Vec<Record>) -> Self {
        Self {
            source: format!("{}#{}", self.source, suffix),
            records,
            columns: self.columns,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// (rows, columns) as read from the source
    pub fn shape(&self) -> (usize, usize) {
        (self.records.len(), self.columns)
    }

    /// Number of records per distinct `group` value
    pub fn group_distribution(&self) -> BTreeMap<String, usize> {
        let mut dist = BTreeMap::new();
        for record in &self.records {
            *dist.entry(record.group.clone()).or_insert(0) += 1;
        }
        dist
    }

    /// Load a synthetic corpus for smoke runs and development
    ///
    /// Group values cycle through a fixed set of single and paired topics so
    /// every group has enough members to stratify once `size >= 12`.
    pub fn synthetic(size: usize, seed: Seed) -> Self {
        use rand::Rng;

        let mut rng = seed.rng(RngStream::Synthetic);

        let topics: [(&str, &[&str]); 4] = [
            ("cardiovascular", &["myocardial infarction", "atrial fibrillation", "hypertension", "coronary stenosis"]),
            ("hepatorenal", &["hepatic fibrosis", "renal failure", "cirrhosis", "glomerular filtration"]),
            ("neurological", &["alzheimer disease", "neuronal apoptosis", "epileptic seizures", "cortical atrophy"]),
            ("oncological", &["tumor suppressor", "metastatic carcinoma", "tp53 mutation", "chemotherapy response"]),
        ];
        let groups: [&[usize]; 6] = [&[0], &[1], &[2], &[3], &[0, 1], &[2, 3]];
        let fillers = [
            "in a randomized cohort",
            "measured in vitro",
            "across 120 patients",
            "with longitudinal follow up",
            "compared against placebo",
        ];

        let records = (0..size)
            .map(|i| {
                let topic_ids = groups[i % groups.len()];
                let mut title = Vec::new();
                let mut abstract_text = Vec::new();
                for &t in topic_ids {
                    let (_, phrases) = topics[t];
                    title.push(phrases[rng.gen_range(0..phrases.len())]);
                    abstract_text.push(format!(
                        "We study {} {}.",
                        phrases[rng.gen_range(0..phrases.len())],
                        fillers[rng.gen_range(0..fillers.len())]
                    ));
                }
                let group = topic_ids
                    .iter()
                    .map(|&t| topics[t].0)
                    .collect::<Vec<_>>()
                    .join("|");
                Record {
                    row: i,
                    title: Some(format!("Study {}: {}", i, title.join(" and "))),
                    abstract_text: Some(abstract_text.join(" ")),
                    group,
                }
            })
            .collect();

        Self::new("synthetic", records)
    }
}

impl LoadOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.separator.is_ascii() {
            return Err(PipelineError::InvalidConfig(format!(
                "separator {:?} is not an ASCII character",
                self.separator
            )));
        }
        if self.timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Initial buffer for remote downloads; `Content-Length` is only a hint
const MAX_PREALLOCATED_BYTES: usize = 1 << 24;

fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length
        .map(|len| usize::try_from(len).unwrap_or(usize::MAX))
        .unwrap_or(0)
        .min(MAX_PREALLOCATED_BYTES)
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Load a delimited table from a local path or URL
///
/// Any I/O, HTTP or parse problem is logged together with the location and
/// returned as [`PipelineError::SourceUnavailable`].
pub fn load_table(location: &str, options: &LoadOptions) -> Result<Table> {
    if let Err(e) = options.validate() {
        tracing::error!(location, error = %e, "Failed to load dataset");
        return Err(e);
    }

    let loaded = if is_remote(location) {
        fetch_remote(location, options.timeout_secs)
            .and_then(|bytes| parse_table(bytes.as_slice(), location, options))
    } else {
        File::open(location)
            .with_context(|| format!("failed to open {}", location))
            .and_then(|file| parse_table(file, location, options))
    };

    match loaded {
        Ok(table) => {
            let (rows, columns) = table.shape();
            tracing::info!("Dataset loaded from {}", location);
            tracing::info!("Shape: ({}, {})", rows, columns);
            Ok(table)
        }
        Err(e) => {
            tracing::error!(location, error = %format!("{:#}", e), "Failed to load dataset");
            Err(PipelineError::SourceUnavailable {
                location: location.to_string(),
                reason: format!("{:#}", e),
            })
        }
    }
}

fn fetch_remote(url: &str, timeout_secs: u64) -> anyhow::Result<Vec<u8>> {
    tracing::info!("Downloading from: {}", url);

    let mut response = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?
        .get(url)
        .send()
        .context("failed to send request")?;

    if !response.status().is_success() {
        anyhow::bail!("download failed with status: {}", response.status());
    }

    let content_length = response.content_length();
    let total_size = content_length.unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut content = Vec::with_capacity(initial_capacity(content_length));
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = response.read(&mut buffer).context("failed to read response")?;
        if bytes_read == 0 {
            break;
        }
        content.extend_from_slice(&buffer[..bytes_read]);
        pb.inc(bytes_read as u64);
    }

    pb.finish_with_message("Downloaded");
    Ok(content)
}

fn parse_table<R: Read>(input: R, location: &str, options: &LoadOptions) -> anyhow::Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.separator as u8)
        .has_headers(true)
        .from_reader(input);

    let headers = reader.headers().context("failed to read header row")?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| format!("missing required column '{}'", name))
    };
    let title_idx = column("title")?;
    let abstract_idx = column("abstract")?;
    let group_idx = match column("group") {
        Ok(idx) => Some(idx),
        Err(e) if options.require_group => return Err(e),
        Err(_) => None,
    };

    let non_empty = |value: Option<&str>| value.filter(|v| !v.is_empty()).map(str::to_string);

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        if options.max_rows.is_some_and(|max| idx >= max) {
            break;
        }
        let record = result.with_context(|| format!("failed to read record {}", idx))?;

        let group = group_idx.and_then(|i| record.get(i)).unwrap_or("");
        if options.require_group && group.trim().is_empty() {
            anyhow::bail!("record {} has an empty 'group' field", idx);
        }

        records.push(Record {
            row: idx,
            title: non_empty(record.get(title_idx)),
            abstract_text: non_empty(record.get(abstract_idx)),
            group: group.to_string(),
        });
    }

    Ok(Table {
        source: location.to_string(),
        records,
        columns: headers.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write csv");
        file
    }

    #[test]
    fn test_load_semicolon_table() {
        let file = write_csv(
            "title;abstract;group;journal\n\
             Cardiac study;Heart failure outcomes;cardiovascular;Lancet\n\
             ;Liver enzymes;hepatorenal|oncological;BMJ\n",
        );
        let table = load_table(file.path().to_str().unwrap(), &LoadOptions::default()).unwrap();

        assert_eq!(table.shape(), (2, 4));
        assert_eq!(table.records[0].title.as_deref(), Some("Cardiac study"));
        assert_eq!(table.records[1].title, None);
        assert_eq!(table.records[1].group, "hepatorenal|oncological");
        assert_eq!(table.records[1].row, 1);
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let err = load_table("/nonexistent/dataset.csv", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_missing_group_column_is_source_unavailable() {
        let file = write_csv("title;abstract\nA;B\n");
        let err = load_table(file.path().to_str().unwrap(), &LoadOptions::default()).unwrap_err();
        match err {
            PipelineError::SourceUnavailable { reason, .. } => assert!(reason.contains("group")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_group_rejected() {
        let file = write_csv("title;abstract;group\nA;B;\n");
        let err = load_table(file.path().to_str().unwrap(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_custom_separator_and_max_rows() {
        let file = write_csv("title,abstract,group\na,b,x\nc,d,y\ne,f,z\n");
        let options = LoadOptions {
            separator: ',',
            max_rows: Some(2),
            ..LoadOptions::default()
        };
        let table = load_table(file.path().to_str().unwrap(), &options).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_non_ascii_separator_rejected_before_reading() {
        let file = write_csv("title;abstract;group\nA;B;x\n");
        let options = LoadOptions {
            separator: '\u{00a7}',
            ..LoadOptions::default()
        };
        let err = load_table(file.path().to_str().unwrap(), &options).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert!(options.validate().is_err());
        assert!(LoadOptions::default().validate().is_ok());
    }

    #[test]
    fn test_preallocation_is_capped() {
        assert_eq!(initial_capacity(Some(1 << 40)), MAX_PREALLOCATED_BYTES);
        assert_eq!(initial_capacity(Some(u64::MAX)), MAX_PREALLOCATED_BYTES);
        assert_eq!(initial_capacity(Some(4096)), 4096);
        assert_eq!(initial_capacity(None), 0);
    }

    #[test]
    fn test_group_optional_for_scoring() {
        let file = write_csv("title;abstract\nHeart;Failure\n");
        let options = LoadOptions {
            require_group: false,
            ..LoadOptions::default()
        };
        let table = load_table(file.path().to_str().unwrap(), &options).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records[0].group, "");
    }

    #[test]
    fn test_synthetic_dataset() {
        let table = Table::synthetic(60, Seed::DEFAULT);
        assert_eq!(table.len(), 60);

        let dist = table.group_distribution();
        assert_eq!(dist.len(), 6);
        assert!(dist.values().all(|&count| count == 10));
        assert_eq!(table, Table::synthetic(60, Seed::DEFAULT));
    }
}
