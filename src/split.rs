// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Stratified train / validation / test partitioning on the `group` column

use crate::datasets::{Record, Table};
use crate::error::{PipelineError, Result};
use crate::seed::{RngStream, Seed};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum members a group needs to appear on both sides of a partition
const MIN_GROUP_MEMBERS: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of the whole table held out for test
    pub test_size: f64,
    /// Fraction of the remaining train portion held out for validation
    pub val_size: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            val_size: 0.1,
        }
    }
}

/// Disjoint train, validation and test tables
#[derive(Debug, Clone)]
pub struct SplitTriple {
    pub train: Table,
    pub validation: Table,
    pub test: Table,
}

impl SplitTriple {
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

pub struct Splitter {
    config: SplitConfig,
    seed: Seed,
}

impl Splitter {
    pub fn new(config: SplitConfig, seed: Seed) -> Self {
        Self { config, seed }
    }

    /// Split off test, then carve validation out of what remains
    pub fn split(&self, table: &Table) -> Result<SplitTriple> {
        let mut rng = self.seed.rng(RngStream::Split);

        let (rest, test) = stratified_holdout(&table.records, self.config.test_size, &mut rng)?;
        let (train, validation) = stratified_holdout(&rest, self.config.val_size, &mut rng)?;

        tracing::info!(
            "Split {} records: train={}, validation={}, test={}",
            table.len(),
            train.len(),
            validation.len(),
            test.len()
        );

        Ok(SplitTriple {
            train: table.derive("train", train),
            validation: table.derive("validation", validation),
            test: table.derive("test", test),
        })
    }
}

/// Partition `records` into (kept, held out) with `fraction` held out per group
///
/// Holdout size is `ceil(fraction * n)`. Each group receives the floor of its
/// proportional share, and the leftover slots go to the groups with the
/// largest fractional remainders; ties are ordered by a seeded shuffle.
fn stratified_holdout(
    records: &[Record],
    fraction: f64,
    rng: &mut ChaCha8Rng,
) -> Result<(Vec<Record>, Vec<Record>)> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "split fraction must be in (0, 1), got {}",
            fraction
        )));
    }

    let n = records.len();
    let n_holdout = (fraction * n as f64).ceil() as usize;
    if n_holdout == 0 || n_holdout >= n {
        return Err(PipelineError::InvalidConfig(format!(
            "fraction {} of {} records leaves an empty partition",
            fraction, n
        )));
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        groups.entry(record.group.as_str()).or_default().push(idx);
    }

    if let Some((group, members)) = groups.iter().find(|(_, m)| m.len() < MIN_GROUP_MEMBERS) {
        return Err(PipelineError::StratificationInfeasible {
            group: group.to_string(),
            members: members.len(),
            required: MIN_GROUP_MEMBERS,
        });
    }

    let mut allocation: Vec<(&str, usize, f64)> = groups
        .iter()
        .map(|(group, members)| {
            let expected = members.len() as f64 * n_holdout as f64 / n as f64;
            (*group, expected.floor() as usize, expected - expected.floor())
        })
        .collect();

    let assigned: usize = allocation.iter().map(|(_, count, _)| count).sum();
    allocation.shuffle(rng);
    allocation.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    for slot in allocation.iter_mut().take(n_holdout.saturating_sub(assigned)) {
        slot.1 += 1;
    }
    let allocation: BTreeMap<&str, usize> =
        allocation.into_iter().map(|(group, count, _)| (group, count)).collect();

    let mut held_out = vec![false; n];
    for (group, members) in groups.iter_mut() {
        members.shuffle(rng);
        for &idx in members.iter().take(allocation[group]) {
            held_out[idx] = true;
        }
    }

    let mut kept = Vec::with_capacity(n - n_holdout);
    let mut holdout = Vec::with_capacity(n_holdout);
    for (record, out) in records.iter().zip(held_out) {
        if out {
            holdout.push(record.clone());
        } else {
            kept.push(record.clone());
        }
    }

    Ok((kept, holdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn table_from_groups(groups: &[&str]) -> Table {
        let records = groups
            .iter()
            .enumerate()
            .map(|(i, g)| Record::new(i, Some(format!("title {}", i).as_str()), Some("abstract"), g))
            .collect();
        Table::new("memory", records)
    }

    fn ten_records() -> Table {
        table_from_groups(&["A", "B", "A|B", "A", "B", "A|B", "A", "B", "A|B", "A"])
    }

    fn rows(table: &Table) -> HashSet<usize> {
        table.records.iter().map(|r| r.row).collect()
    }

    #[test]
    fn test_split_partitions_table() {
        let table = Table::synthetic(120, Seed::DEFAULT);
        let split = Splitter::new(SplitConfig::default(), Seed::DEFAULT).split(&table).unwrap();

        let train = rows(&split.train);
        let val = rows(&split.validation);
        let test = rows(&split.test);

        assert!(train.is_disjoint(&val));
        assert!(train.is_disjoint(&test));
        assert!(val.is_disjoint(&test));
        assert_eq!(split.total(), 120);
        let union: HashSet<usize> = train.union(&val).chain(test.iter()).copied().collect();
        assert_eq!(union, rows(&table));

        assert_eq!(split.test.len(), 24);
        assert_eq!(split.validation.len(), 10);
    }

    #[test]
    fn test_split_is_deterministic() {
        let table = Table::synthetic(90, Seed::DEFAULT);
        let splitter = Splitter::new(SplitConfig::default(), Seed::new(7));
        let a = splitter.split(&table).unwrap();
        let b = splitter.split(&table).unwrap();

        assert_eq!(a.train.records, b.train.records);
        assert_eq!(a.validation.records, b.validation.records);
        assert_eq!(a.test.records, b.test.records);
    }

    #[test]
    fn test_ten_record_scenario_keeps_proportions() {
        let table = ten_records();
        let split = Splitter::new(SplitConfig::default(), Seed::new(42)).split(&table).unwrap();

        assert_eq!(split.total(), 10);
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.validation.len(), 1);
        assert_eq!(split.train.len(), 7);
        assert!(rows(&split.train).is_disjoint(&rows(&split.test)));
        assert!(rows(&split.train).is_disjoint(&rows(&split.validation)));
        assert!(rows(&split.validation).is_disjoint(&rows(&split.test)));

        let full = table.group_distribution();
        for part in [&split.train, &split.validation, &split.test] {
            let dist = part.group_distribution();
            for (group, &count) in &full {
                let expected = count as f64 * part.len() as f64 / table.len() as f64;
                let actual = *dist.get(group).unwrap_or(&0) as f64;
                assert!(
                    (actual - expected).abs() <= 1.0,
                    "group {} in {}: expected {:.2}, got {}",
                    group,
                    part.source,
                    expected,
                    actual
                );
            }
        }
    }

    #[test]
    fn test_singleton_group_fails() {
        let table = table_from_groups(&["A", "A", "A", "B", "B", "B", "C"]);
        let err = Splitter::new(SplitConfig::default(), Seed::DEFAULT).split(&table).unwrap_err();
        match err {
            PipelineError::StratificationInfeasible { group, members, .. } => {
                assert_eq!(group, "C");
                assert_eq!(members, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let table = ten_records();
        let config = SplitConfig {
            test_size: 1.5,
            val_size: 0.1,
        };
        let err = Splitter::new(config, Seed::DEFAULT).split(&table).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_splits_preserve_row_order() {
        let table = Table::synthetic(60, Seed::DEFAULT);
        let split = Splitter::new(SplitConfig::default(), Seed::DEFAULT).split(&table).unwrap();
        for part in [&split.train, &split.validation, &split.test] {
            assert!(part.records.windows(2).all(|w| w[0].row < w[1].row));
        }
    }
}
