// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Training and evaluation CLI for biomedical abstract classification
//!
//! Usage:
//!   biomed-classify --dataset synthetic --seed 42
//!   biomed-classify --dataset data/abstracts.csv --model-path models/logreg.json
//!   biomed-classify --config pipeline.json --no-plots

use anyhow::{Context, Result};
use biomed_classify::pipeline::{Pipeline, PipelineConfig};
use biomed_classify::Seed;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "biomed-classify")]
#[command(about = "Train and evaluate multilabel classifiers on biomedical abstracts")]
#[command(version)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset path or URL, or "synthetic"
    #[arg(short, long)]
    dataset: Option<String>,

    /// Column separator of the input file
    #[arg(long)]
    separator: Option<char>,

    /// Records to generate for the synthetic dataset
    #[arg(long)]
    synthetic_size: Option<usize>,

    /// Random seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Fraction of records held out for test
    #[arg(long)]
    test_size: Option<f64>,

    /// Fraction of the remaining records held out for validation
    #[arg(long)]
    val_size: Option<f64>,

    /// Vocabulary cap for TF-IDF
    #[arg(long)]
    max_features: Option<usize>,

    /// Gradient descent iterations per label
    #[arg(long)]
    max_iter: Option<usize>,

    /// Inverse regularization strength
    #[arg(long)]
    c: Option<f64>,

    /// Models to train (comma-separated: logreg, majority, prior)
    #[arg(short, long, value_delimiter = ',')]
    models: Option<Vec<String>>,

    /// Splits to evaluate (comma-separated: train, validation, test)
    #[arg(long, value_delimiter = ',')]
    splits: Option<Vec<String>>,

    /// Output directory for reports and charts
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save the trained logistic regression here
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Skip PNG charts
    #[arg(long)]
    no_plots: bool,

    /// TrueType font for chart text
    #[arg(long)]
    plot_font: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(dataset) = self.dataset {
            config.dataset = dataset;
        }
        if let Some(separator) = self.separator {
            config.load.separator = separator;
        }
        if let Some(size) = self.synthetic_size {
            config.synthetic_size = size;
        }
        if let Some(seed) = self.seed {
            config.seed = Seed::new(seed);
        }
        if let Some(test_size) = self.test_size {
            config.split.test_size = test_size;
        }
        if let Some(val_size) = self.val_size {
            config.split.val_size = val_size;
        }
        if let Some(max_features) = self.max_features {
            config.vectorizer.max_features = max_features;
        }
        if let Some(max_iter) = self.max_iter {
            config.trainer.max_iter = max_iter;
        }
        if let Some(c) = self.c {
            config.trainer.c = c;
        }
        if let Some(models) = self.models {
            config.models = models.into_iter().map(|m| m.trim().to_string()).collect();
        }
        if let Some(splits) = self.splits {
            config.eval_splits = splits.into_iter().map(|s| s.trim().to_string()).collect();
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if self.model_path.is_some() {
            config.model_path = self.model_path;
        }
        if self.no_plots {
            config.emit_plots = false;
        }
        if self.plot_font.is_some() {
            config.plot_font = self.plot_font;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config()?;

    tracing::info!("Biomedical Abstract Classification Pipeline");
    tracing::info!("===========================================");
    tracing::info!("Dataset: {}", config.dataset);
    tracing::info!("Seed: {}", config.seed.value());
    tracing::info!("Models: {}", config.models.join(", "));

    let output_dir = config.output_dir.clone();
    let pipeline = Pipeline::new(config);
    let results = pipeline.run().context("pipeline failed")?;

    // Print summary to console
    println!("\n{}", "=".repeat(70));
    println!("EVALUATION SUMMARY ({})", results.summary.split);
    println!("{}", "=".repeat(70));
    println!(
        "\nBest Model: {} (F1 micro={:.4})",
        results.summary.best_model, results.summary.best_f1_micro
    );
    println!("\nModel Comparison:");
    println!("{:-<70}", "");
    println!(
        "{:<12} {:>11} {:>10} {:>10} {:>12} {:>10}",
        "Model", "Exact Match", "F1 Micro", "F1 Macro", "F1 Weighted", "mAP"
    );
    println!("{:-<70}", "");
    for row in &results.summary.comparison {
        let map = row.mean_average_precision.map_or("-".to_string(), |v| format!("{:.4}", v));
        println!(
            "{:<12} {:>11.4} {:>10.4} {:>10.4} {:>12.4} {:>10}",
            row.model, row.exact_match, row.f1_micro, row.f1_macro, row.f1_weighted, map
        );
    }
    println!("{:-<70}", "");

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");

    let json_path = output_dir.join(format!("results_{}.json", timestamp));
    Pipeline::save_results(&results, &json_path)?;
    println!("\nJSON results saved to: {}", json_path.display());

    let md_path = output_dir.join(format!("report_{}.md", timestamp));
    std::fs::write(&md_path, Pipeline::generate_report(&results))
        .with_context(|| format!("failed to write {}", md_path.display()))?;
    println!("Markdown report saved to: {}", md_path.display());

    if let Some(path) = &results.model_artifact {
        println!("Model saved to: {}", path.display());
    }

    println!("\nEvaluation complete!");

    Ok(())
}
