// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Text normalization for titles and abstracts

use crate::datasets::Record;

/// Lowercase, blank out everything except ASCII letters, digits and
/// whitespace, then collapse whitespace runs and trim
pub fn clean(text: &str) -> String {
    let replaced: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join title and abstract (missing parts count as empty) and clean the result
pub fn combine(title: Option<&str>, abstract_text: Option<&str>) -> String {
    clean(&format!("{} {}", title.unwrap_or(""), abstract_text.unwrap_or("")))
}

impl Record {
    /// Cleaned title + abstract for this record
    pub fn combined_text(&self) -> String {
        combine(self.title.as_deref(), self.abstract_text.as_deref())
    }
}

/// Cleaned text per record, in input order
///
/// Lazy: nothing is computed until iterated, and calling it again restarts
/// from the first record.
pub fn prepare_corpus(records: &[Record]) -> impl Iterator<Item = String> + '_ {
    records.iter().map(Record::combined_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_example() {
        let text = combine(Some("Title: TP53 Mutation!!"), Some("  Effects in vitro (n=12)."));
        assert_eq!(text, "title tp53 mutation effects in vitro n 12");
    }

    #[test]
    fn test_missing_parts_are_empty() {
        assert_eq!(combine(None, Some("Only abstract")), "only abstract");
        assert_eq!(combine(Some("Only title"), None), "only title");
        assert_eq!(combine(None, None), "");
    }

    #[test]
    fn test_non_ascii_letters_are_blanked() {
        assert_eq!(clean("Élan vital\u{00a0}— café"), "lan vital caf");
    }

    #[test]
    fn test_clean_output_alphabet() {
        let inputs = [
            "  IL-6/STAT3 signalling\t(p < 0.05)\n",
            "Über-Effekt: 3′-UTR …",
            "\u{2003}\u{2003}",
            "A|B;C",
        ];
        for input in inputs {
            let out = clean(input);
            assert!(out.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' '));
            assert!(!out.starts_with(' ') && !out.ends_with(' '));
            assert!(!out.contains("  "));
        }
    }

    #[test]
    fn test_prepare_corpus_is_restartable() {
        let records = vec![
            Record::new(0, Some("First"), None, "a"),
            Record::new(1, None, Some("Second!"), "b"),
        ];
        let first: Vec<String> = prepare_corpus(&records).collect();
        let second: Vec<String> = prepare_corpus(&records).collect();
        assert_eq!(first, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(first, second);
    }
}
