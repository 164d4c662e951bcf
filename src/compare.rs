//! Before/after comparison of term usage.
//!
//! Quarters are split at a cutoff: `before` is everything strictly earlier,
//! `after` is the cutoff and later. For each term the fraction of abstracts
//! containing it in each epoch is compared with a pooled two-proportion
//! z-test. Significance is `p < 0.05`, two-sided, with no correction for
//! multiple comparisons.

use crate::aggregate::QuarterTable;
use crate::error::Result;
use crate::output;
use crate::quarter::Quarter;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;
use std::f64::consts::SQRT_2;
use std::path::Path;
use tracing::{debug, info};

/// Two-sided significance level.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Marker written in the `Significant` column.
pub const SIGNIFICANT_MARK: &str = "✓";

/// Outcome of a pooled two-proportion z-test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZTest {
    pub p1: f64,
    pub p2: f64,
    pub pooled: f64,
    pub std_error: f64,
    pub z: f64,
    pub p_value: f64,
}

/// Pooled two-proportion z-test of `a/n1` against `b/n2`.
///
/// Returns `None` when either sample is empty. When the pooled proportion
/// is 0 or 1 the standard error vanishes and both proportions are equal;
/// that case reports `z = 0`, `p = 1`.
pub fn two_proportion_ztest(a: u64, n1: u64, b: u64, n2: u64) -> Option<ZTest> {
    if n1 == 0 || n2 == 0 {
        return None;
    }

    let (a, n1, b, n2) = (a as f64, n1 as f64, b as f64, n2 as f64);
    let p1 = a / n1;
    let p2 = b / n2;
    let pooled = (a + b) / (n1 + n2);
    let std_error = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    let (z, p_value) = if std_error > 0.0 {
        let z = (p1 - p2) / std_error;
        (z, two_sided_p_value(z))
    } else {
        (0.0, 1.0)
    };

    Some(ZTest {
        p1,
        p2,
        pooled,
        std_error,
        z,
        p_value,
    })
}

/// `2 * (1 - Φ(|z|))` for the standard normal Φ.
///
/// Computed as `erfc(|z| / √2)`, which is the same quantity without the
/// cancellation in `1 - Φ` for large `|z|`.
pub fn two_sided_p_value(z: f64) -> f64 {
    erfc(z.abs() / SQRT_2)
}

/// Round half-to-even on the exact binary value, as decimal formatting does.
pub fn round_to(value: f64, decimals: usize) -> f64 {
    format!("{:.*}", decimals, value)
        .parse()
        .unwrap_or(value)
}

/// Scientific notation with one mantissa decimal and a signed, two-digit
/// exponent, e.g. `4.0e-04`.
pub fn format_p_value(p: f64) -> String {
    if !p.is_finite() {
        return p.to_string();
    }
    let raw = format!("{:.1e}", p);
    match raw.split_once('e') {
        Some((mantissa, exp)) => match exp.parse::<i32>() {
            Ok(e) => format!(
                "{}e{}{:02}",
                mantissa,
                if e < 0 { '-' } else { '+' },
                e.abs()
            ),
            Err(_) => raw,
        },
        None => raw,
    }
}

/// Abstract totals over one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochTotals {
    /// Abstracts containing the term
    pub hits: u64,
    /// Abstracts read
    pub total: u64,
}

/// Comparison of one term across the two epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub term: String,
    pub before: EpochTotals,
    pub after: EpochTotals,
    /// Percent of abstracts before the cutoff, 2 dp
    pub before_pct: f64,
    /// Percent of abstracts from the cutoff on, 2 dp
    pub after_pct: f64,
    /// `after - before` in percentage points, 2 dp
    pub change_pct: f64,
    /// Unrounded z statistic
    pub z_statistic: f64,
    /// Unrounded two-sided p-value
    pub p_value: f64,
    pub is_significant: bool,
}

/// Compares epochs around a fixed cutoff quarter.
#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    cutoff: Quarter,
}

impl Comparator {
    pub fn new(cutoff: Quarter) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> Quarter {
        self.cutoff
    }

    /// Sum one term's counts on each side of the cutoff.
    pub fn epoch_totals(&self, table: &QuarterTable, term_idx: usize) -> (EpochTotals, EpochTotals) {
        let mut before = EpochTotals::default();
        let mut after = EpochTotals::default();
        for (quarter, count) in table.term_counts(term_idx) {
            let epoch = if quarter < self.cutoff {
                &mut before
            } else {
                &mut after
            };
            epoch.hits += count.abstracts_hit;
            epoch.total += count.total_abstracts;
        }
        (before, after)
    }

    /// One result per term with data on both sides, in term order.
    ///
    /// Terms with an empty epoch are left out.
    pub fn compare(&self, table: &QuarterTable) -> Vec<ComparisonResult> {
        let mut results = Vec::new();

        for (idx, term) in table.terms().iter().enumerate() {
            let (before, after) = self.epoch_totals(table, idx);
            let Some(test) = two_proportion_ztest(before.hits, before.total, after.hits, after.total)
            else {
                debug!(
                    term = %term,
                    before = before.total,
                    after = after.total,
                    "Insufficient data, skipping"
                );
                continue;
            };

            results.push(ComparisonResult {
                term: term.clone(),
                before,
                after,
                before_pct: round_to(test.p1 * 100.0, 2),
                after_pct: round_to(test.p2 * 100.0, 2),
                change_pct: round_to((test.p2 - test.p1) * 100.0, 2),
                z_statistic: test.z,
                p_value: test.p_value,
                is_significant: test.p_value < SIGNIFICANCE_LEVEL,
            });
        }

        results
    }

    /// [`Comparator::compare`], sorted ascending by p-value.
    pub fn compare_ranked(&self, table: &QuarterTable) -> Vec<ComparisonResult> {
        rank_by_p_value(self.compare(table))
    }
}

/// Stable ascending sort by unrounded p-value.
pub fn rank_by_p_value(mut results: Vec<ComparisonResult>) -> Vec<ComparisonResult> {
    results.sort_by(|a, b| a.p_value.total_cmp(&b.p_value));
    results
}

/// One line of the z-test CSV.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonRow {
    #[serde(rename = "Word")]
    pub word: String,
    #[serde(rename = "Before %")]
    pub before_pct: f64,
    #[serde(rename = "After %")]
    pub after_pct: f64,
    #[serde(rename = "Change in %")]
    pub change_pct: f64,
    #[serde(rename = "z-stat")]
    pub z_stat: f64,
    #[serde(rename = "p-value")]
    pub p_value: String,
    #[serde(rename = "Significant", alias = "Significant (p<0.05)")]
    pub significant: String,
}

impl ComparisonRow {
    pub fn is_significant(&self) -> bool {
        self.significant.trim() == SIGNIFICANT_MARK
    }
}

impl From<&ComparisonResult> for ComparisonRow {
    fn from(r: &ComparisonResult) -> Self {
        Self {
            word: r.term.clone(),
            before_pct: r.before_pct,
            after_pct: r.after_pct,
            change_pct: r.change_pct,
            z_stat: round_to(r.z_statistic, 4),
            p_value: format_p_value(r.p_value),
            significant: if r.is_significant {
                SIGNIFICANT_MARK.to_string()
            } else {
                String::new()
            },
        }
    }
}

/// Write ranked results to a z-test CSV.
pub fn save_results(path: &Path, results: &[ComparisonResult]) -> Result<bool> {
    let rows: Vec<ComparisonRow> = rank_by_p_value(results.to_vec())
        .iter()
        .map(ComparisonRow::from)
        .collect();
    let significant = rows.iter().filter(|r| r.is_significant()).count();
    info!(
        path = %path.display(),
        words = rows.len(),
        significant = significant,
        "Writing z-test results"
    );
    output::save_csv(path, &rows)
}

/// Read a z-test CSV.
pub fn load_results(path: &Path) -> Result<Vec<ComparisonRow>> {
    output::load_csv(path)
}
