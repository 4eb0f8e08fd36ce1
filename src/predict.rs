// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Standalone scorer for a saved model artifact
//!
//! Reads a delimited file with `title` and `abstract` columns and prints the
//! predicted labels of every record. A `group` column, when present, is used
//! to report metrics against the artifact's label space.

use anyhow::{Context, Result};
use biomed_classify::datasets::{load_table, LoadOptions};
use biomed_classify::evaluation::{EvaluationOptions, Evaluator};
use biomed_classify::model::ModelArtifact;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "biomed-predict")]
#[command(about = "Label biomedical abstracts with a saved model")]
#[command(version)]
struct Args {
    /// Model artifact written by biomed-classify
    #[arg(short, long)]
    model: PathBuf,

    /// Delimited input file or URL
    #[arg(short, long)]
    input: String,

    /// Column separator of the input file
    #[arg(short, long, default_value_t = ';')]
    separator: char,

    /// Score predictions against the input's group column
    #[arg(long)]
    evaluate: bool,

    /// Write metrics reports to this directory (implies --evaluate)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let artifact = ModelArtifact::load(&args.model)
        .with_context(|| format!("failed to load model {}", args.model.display()))?;

    let scoring = args.evaluate || args.output.is_some();
    let options = LoadOptions {
        separator: args.separator,
        require_group: scoring,
        ..LoadOptions::default()
    };
    let table = load_table(&args.input, &options)?;

    println!("\nModel: {} (v{}, {})", artifact.name, artifact.version, artifact.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Labels: {}", artifact.labels.classes().join(", "));
    println!("{}", "-".repeat(70));

    let predictions = artifact.predict_texts(&table.records)?;
    for (record, labels) in table.records.iter().zip(&predictions) {
        let title: String = record.title.as_deref().unwrap_or("").chars().take(50).collect();
        let labels = if labels.is_empty() { "-".to_string() } else { labels.join("|") };
        println!("{:>5}  {:<50}  {}", record.row, title, labels);
    }
    println!("{}", "-".repeat(70));

    if scoring {
        let features = artifact.featurize(&table.records);
        let truth = artifact.labels.transform_table(&table)?;
        let eval_options = EvaluationOptions {
            emit_plots: args.output.is_some(),
            sink: args.output.clone(),
            font: None,
        };
        let report = Evaluator::evaluate(
            &artifact.classifier,
            &features,
            &truth,
            &artifact.labels,
            &artifact.name,
            "input",
            &eval_options,
        )?;
        println!("\n{}", report.format());
    }

    Ok(())
}
