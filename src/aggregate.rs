//! Quarterly buzzword aggregation.
//!
//! Every abstract is scored against every target term. Per `(quarter, term)`
//! the [`QuarterTable`] keeps three counters: total occurrences, abstracts
//! containing the term, and abstracts read that quarter. The last one is the
//! same for every term of a quarter.
//!
//! Matching is by lower-cased substring, counted left to right without
//! overlap: `show` matches `shower`. Records are not deduplicated, so a paper
//! returned by two overlapping pages is counted twice.

use crate::error::{BuzzError, Result};
use crate::output;
use crate::quarter::Quarter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// One abstract as handed to the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbstractRecord {
    /// Abstract body
    pub text: String,
    /// Publication timestamp; the first 10 characters must be `YYYY-MM-DD`
    pub published: String,
    /// Category the record was fetched for
    #[serde(default)]
    pub category: String,
}

/// Counters for one `(quarter, term)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCount {
    /// Sum of per-abstract occurrence counts
    pub occurrences: u64,
    /// Abstracts containing the term at least once
    pub abstracts_hit: u64,
    /// Abstracts read in the quarter
    pub total_abstracts: u64,
}

impl TermCount {
    /// Mean occurrences per abstract, 0 when nothing was read.
    pub fn average_per_abstract(&self) -> f64 {
        if self.total_abstracts > 0 {
            self.occurrences as f64 / self.total_abstracts as f64
        } else {
            0.0
        }
    }

    /// Fraction of abstracts containing the term, 0 when nothing was read.
    pub fn ratio_of_abstracts(&self) -> f64 {
        if self.total_abstracts > 0 {
            self.abstracts_hit as f64 / self.total_abstracts as f64
        } else {
            0.0
        }
    }
}

/// Non-overlapping, left-to-right substring count.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

/// `(quarter, term) → TermCount`, with terms in a fixed order.
///
/// Entries exist only for quarters that were observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuarterTable {
    terms: Vec<String>,
    counts: HashMap<(Quarter, usize), TermCount>,
}

impl QuarterTable {
    pub fn new(terms: Vec<String>) -> Self {
        Self {
            terms,
            counts: HashMap::new(),
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Observed quarters, ascending.
    pub fn quarters(&self) -> Vec<Quarter> {
        self.counts
            .keys()
            .map(|(q, _)| *q)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn get(&self, quarter: Quarter, term: &str) -> Option<&TermCount> {
        let idx = self.terms.iter().position(|t| t == term)?;
        self.counts.get(&(quarter, idx))
    }

    /// Counts for the term at `idx`, one entry per observed quarter.
    pub(crate) fn term_counts(&self, idx: usize) -> impl Iterator<Item = (Quarter, &TermCount)> + '_ {
        self.counts
            .iter()
            .filter(move |((_, i), _)| *i == idx)
            .map(|((q, _), c)| (*q, c))
    }

    fn entry(&mut self, quarter: Quarter, idx: usize) -> &mut TermCount {
        self.counts.entry((quarter, idx)).or_default()
    }

    /// Flatten into output rows, sorted by quarter then term order.
    pub fn rows(&self) -> Vec<QuarterRow> {
        let mut rows = Vec::with_capacity(self.counts.len());
        for quarter in self.quarters() {
            for (idx, term) in self.terms.iter().enumerate() {
                if let Some(c) = self.counts.get(&(quarter, idx)) {
                    rows.push(QuarterRow {
                        quarter,
                        word: term.clone(),
                        word_count: c.occurrences,
                        abstract_count: c.abstracts_hit,
                        total_abstracts: c.total_abstracts,
                        average_per_abstract: c.average_per_abstract(),
                        ratio_of_abstracts: c.ratio_of_abstracts(),
                    });
                }
            }
        }
        rows
    }

    /// Rebuild a table from rows previously written by [`QuarterTable::rows`].
    ///
    /// Terms keep first-seen order. Rows that disagree on the abstract total
    /// within a quarter are rejected.
    pub fn from_rows(rows: &[QuarterRow]) -> Result<Self> {
        let mut table = QuarterTable::default();
        let mut totals: HashMap<Quarter, u64> = HashMap::new();

        for row in rows {
            if let Some(&seen) = totals.get(&row.quarter) {
                if seen != row.total_abstracts {
                    return Err(BuzzError::Validation(format!(
                        "quarter {} has inconsistent totals: {} vs {} (word {:?})",
                        row.quarter, seen, row.total_abstracts, row.word
                    )));
                }
            } else {
                totals.insert(row.quarter, row.total_abstracts);
            }

            let idx = match table.terms.iter().position(|t| *t == row.word) {
                Some(i) => i,
                None => {
                    table.terms.push(row.word.clone());
                    table.terms.len() - 1
                }
            };

            let entry = table.entry(row.quarter, idx);
            entry.occurrences += row.word_count;
            entry.abstracts_hit += row.abstract_count;
            entry.total_abstracts += row.total_abstracts;
        }

        Ok(table)
    }
}

/// One line of the per-category data CSV.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuarterRow {
    #[serde(rename = "Quarter")]
    pub quarter: Quarter,
    #[serde(rename = "Word")]
    pub word: String,
    #[serde(rename = "Word Count")]
    pub word_count: u64,
    // older data files carry the misspelt header
    #[serde(rename = "Abstract Count", alias = "Abstact Count")]
    pub abstract_count: u64,
    #[serde(rename = "Total Abstracts Read")]
    pub total_abstracts: u64,
    #[serde(rename = "Average per Abstract")]
    pub average_per_abstract: f64,
    #[serde(rename = "Ratio of Abstracts")]
    pub ratio_of_abstracts: f64,
}

/// Streams records into a [`QuarterTable`].
pub struct Aggregator {
    lowered: Vec<String>,
    table: QuarterTable,
    records: u64,
}

impl Aggregator {
    /// Create an aggregator for a fixed term list.
    pub fn new(terms: &[String]) -> Self {
        Self {
            lowered: terms.iter().map(|t| t.to_lowercase()).collect(),
            table: QuarterTable::new(terms.to_vec()),
            records: 0,
        }
    }

    /// Score one abstract.
    ///
    /// A bad publication date is an error and leaves the table untouched.
    pub fn add(&mut self, record: &AbstractRecord) -> Result<()> {
        let quarter = Quarter::from_published(&record.published)?;
        let text = record.text.to_lowercase();

        for (idx, term) in self.lowered.iter().enumerate() {
            let hits = count_occurrences(&text, term) as u64;
            let entry = self.table.entry(quarter, idx);
            entry.occurrences += hits;
            if hits > 0 {
                entry.abstracts_hit += 1;
            }
            entry.total_abstracts += 1;
        }

        self.records += 1;
        Ok(())
    }

    /// Score every record, stopping at the first bad date.
    pub fn extend<'a, I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a AbstractRecord>,
    {
        for record in records {
            self.add(record)?;
        }
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn table(&self) -> &QuarterTable {
        &self.table
    }

    pub fn finish(self) -> QuarterTable {
        debug!(records = self.records, "Aggregation finished");
        self.table
    }
}

/// Aggregate a complete batch of records in one pass.
pub fn aggregate(records: &[AbstractRecord], terms: &[String]) -> Result<QuarterTable> {
    let mut aggregator = Aggregator::new(terms);
    aggregator.extend(records)?;
    Ok(aggregator.finish())
}

/// Write a table to a data CSV.
pub fn save_table(path: &Path, table: &QuarterTable) -> Result<bool> {
    output::save_csv(path, &table.rows())
}

/// Read a data CSV back into a table.
pub fn load_table(path: &Path) -> Result<QuarterTable> {
    let rows: Vec<QuarterRow> = output::load_csv(path)?;
    let table = QuarterTable::from_rows(&rows)?;
    info!(
        path = %path.display(),
        quarters = table.quarters().len(),
        terms = table.terms().len(),
        "Loaded quarterly data"
    );
    Ok(table)
}

/// Load raw records from a CSV with `text,published[,category]` columns.
pub fn load_records(path: &Path) -> Result<Vec<AbstractRecord>> {
    output::load_csv(path)
}
