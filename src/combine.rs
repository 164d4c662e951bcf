//! Cross-category summary of significant changes.
//!
//! For every category, only words whose change was significant contribute a
//! factor increase (`after % / before %`). The factors are laid out as a
//! word × category table. From that table we pick the words that grew by
//! more than a threshold in enough of the major categories.

use crate::compare::{self, round_to, ComparisonRow};
use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Factor value substituted for an infinite increase when thresholding.
pub const INFINITE_FACTOR_VALUE: f64 = 100.0;

/// Factor substituted for a missing cell when thresholding.
pub const MISSING_FACTOR_VALUE: f64 = 1.0;

/// How much more often a word appears after the cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FactorIncrease {
    /// `after % / before %`, rounded to 2 dp
    Ratio(f64),
    /// Absent before, present after
    Infinite,
}

impl FactorIncrease {
    /// Factor for one comparison row; `None` when the word never appears.
    pub fn from_percentages(before_pct: f64, after_pct: f64) -> Option<Self> {
        if before_pct > 0.0 {
            Some(Self::Ratio(round_to(after_pct / before_pct, 2)))
        } else if after_pct > 0.0 {
            Some(Self::Infinite)
        } else {
            None
        }
    }

    /// Value used for thresholding.
    pub fn value(&self) -> f64 {
        match self {
            Self::Ratio(v) => *v,
            Self::Infinite => INFINITE_FACTOR_VALUE,
        }
    }
}

impl fmt::Display for FactorIncrease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ratio(v) if v.fract() == 0.0 => write!(f, "{:.1}", v),
            Self::Ratio(v) => write!(f, "{}", v),
            Self::Infinite => write!(f, "-1"),
        }
    }
}

/// Word × category table of factor increases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorTable {
    categories: Vec<String>,
    rows: BTreeMap<String, BTreeMap<String, FactorIncrease>>,
}

impl FactorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one category's comparison rows. Non-significant rows are ignored.
    pub fn add_category(&mut self, category: &str, rows: &[ComparisonRow]) {
        if !self.categories.iter().any(|c| c == category) {
            self.categories.push(category.to_string());
        }
        for row in rows.iter().filter(|r| r.is_significant()) {
            if let Some(factor) = FactorIncrease::from_percentages(row.before_pct, row.after_pct) {
                self.rows
                    .entry(row.word.clone())
                    .or_default()
                    .insert(category.to_string(), factor);
            }
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Words with at least one factor, sorted.
    pub fn words(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    pub fn get(&self, word: &str, category: &str) -> Option<FactorIncrease> {
        self.rows.get(word)?.get(category).copied()
    }

    /// Words whose factor exceeds `threshold` in at least `min_categories` of
    /// `major`. Missing cells count as 1.0 and infinite ones as 100.
    pub fn significant_words(
        &self,
        major: &[String],
        threshold: f64,
        min_categories: usize,
    ) -> Vec<String> {
        self.rows
            .iter()
            .filter(|(_, cells)| {
                let exceeding = major
                    .iter()
                    .filter(|cat| {
                        cells
                            .get(cat.as_str())
                            .map_or(MISSING_FACTOR_VALUE, FactorIncrease::value)
                            > threshold
                    })
                    .count();
                exceeding >= min_categories
            })
            .map(|(word, _)| word.clone())
            .collect()
    }

    /// Write the table as CSV: `Word,<category>...`, empty cell when absent.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut wtr = csv::Writer::from_path(path)?;
        let mut header = vec!["Word".to_string()];
        header.extend(self.categories.iter().cloned());
        wtr.write_record(&header)?;

        for (word, cells) in &self.rows {
            let mut record = vec![word.clone()];
            record.extend(
                self.categories
                    .iter()
                    .map(|c| cells.get(c).map(|f| f.to_string()).unwrap_or_default()),
            );
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        info!(path = %path.display(), words = self.rows.len(), "Saved combined table");
        Ok(())
    }
}

/// Build the factor table from z-test files, one per category name.
///
/// Categories without a z-test file are skipped with a warning and get no
/// column.
pub fn build_factor_table<F>(categories: &[String], ztest_path: F) -> Result<FactorTable>
where
    F: Fn(&str) -> std::path::PathBuf,
{
    let mut table = FactorTable::new();

    for category in categories {
        let path = ztest_path(category);
        if !path.exists() {
            warn!(category = %category, path = %path.display(), "No z-test results, skipping");
            continue;
        }
        let rows = compare::load_results(&path)?;
        table.add_category(category, &rows);
    }

    Ok(table)
}

/// Write significant words one per line.
pub fn save_word_list(path: &Path, words: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, words.join("\n"))?;
    info!(path = %path.display(), count = words.len(), "Saved significant words");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::SIGNIFICANT_MARK;
    use tempfile::tempdir;

    fn row(word: &str, before: f64, after: f64, significant: bool) -> ComparisonRow {
        ComparisonRow {
            word: word.to_string(),
            before_pct: before,
            after_pct: after,
            change_pct: round_to(after - before, 2),
            z_stat: 0.0,
            p_value: "1.0e-03".to_string(),
            significant: if significant {
                SIGNIFICANT_MARK.to_string()
            } else {
                String::new()
            },
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_factor_rules() {
        assert_eq!(
            FactorIncrease::from_percentages(10.0, 30.0),
            Some(FactorIncrease::Ratio(3.0))
        );
        assert_eq!(
            FactorIncrease::from_percentages(3.0, 1.0),
            Some(FactorIncrease::Ratio(0.33))
        );
        assert_eq!(
            FactorIncrease::from_percentages(0.0, 2.5),
            Some(FactorIncrease::Infinite)
        );
        assert_eq!(FactorIncrease::from_percentages(0.0, 0.0), None);
        assert_eq!(FactorIncrease::Infinite.to_string(), "-1");
        assert_eq!(FactorIncrease::Ratio(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_only_significant_rows_count() {
        let mut table = FactorTable::new();
        table.add_category("cs", &[row("delv", 1.0, 5.0, true), row("show", 20.0, 21.0, false)]);
        assert_eq!(table.get("delv", "cs"), Some(FactorIncrease::Ratio(5.0)));
        assert_eq!(table.get("show", "cs"), None);
        assert_eq!(table.words().count(), 1);
    }

    #[test]
    fn test_significant_words() {
        let mut table = FactorTable::new();
        table.add_category("cs", &[row("delv", 1.0, 5.0, true), row("novel", 10.0, 14.0, true)]);
        table.add_category("hep", &[row("delv", 0.0, 1.0, true), row("novel", 10.0, 16.0, true)]);
        table.add_category("nucl", &[row("delv", 2.0, 4.0, true), row("novel", 10.0, 12.0, true)]);
        table.add_category("cond-mat", &[row("novel", 10.0, 20.0, true)]);

        let major = names(&["astro-ph", "cond-mat", "hep", "nucl", "cs"]);
        // delv: cs 5.0, hep inf, nucl 2.0 -> 3 hits
        // novel: cs 1.4, hep 1.6, nucl 1.2, cond-mat 2.0 -> 2 hits
        assert_eq!(table.significant_words(&major, 1.5, 3), vec!["delv"]);
        assert_eq!(table.significant_words(&major, 1.5, 2), vec!["delv", "novel"]);
    }

    #[test]
    fn test_missing_cells_do_not_count() {
        let mut table = FactorTable::new();
        table.add_category("cs", &[row("delv", 1.0, 5.0, true)]);
        let major = names(&["cs", "hep"]);
        assert!(table.significant_words(&major, 1.5, 2).is_empty());
        // missing counts as 1.0, which exceeds a threshold below 1
        assert_eq!(table.significant_words(&major, 0.5, 2), vec!["delv"]);
    }

    #[test]
    fn test_save_table() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("combined_ztest.csv");
        let mut table = FactorTable::new();
        table.add_category("cs", &[row("novel", 10.0, 15.0, true), row("delv", 0.0, 3.0, true)]);
        table.add_category("hep", &[row("novel", 10.0, 20.0, true)]);

        table.save(&path)?;
        let content = std::fs::read_to_string(&path)?;
        assert_eq!(content, "Word,cs,hep\ndelv,-1,\nnovel,1.5,2.0\n");
        Ok(())
    }

    #[test]
    fn test_build_factor_table_skips_missing() -> Result<()> {
        let dir = tempdir()?;
        let cs = dir.path().join("ztest_cs.csv");
        std::fs::write(
            &cs,
            "Word,Before %,After %,Change in %,z-stat,p-value,Significant\n\
             delv,1.0,4.0,3.0,-5.1,3.4e-07,✓\n\
             show,20.0,20.5,0.5,-0.2,8.1e-01,\n",
        )?;

        let categories = names(&["cs", "hep"]);
        let table = build_factor_table(&categories, |c| dir.path().join(format!("ztest_{}.csv", c)))?;
        assert_eq!(table.categories(), &["cs".to_string()]);
        assert_eq!(table.get("delv", "cs"), Some(FactorIncrease::Ratio(4.0)));
        assert_eq!(table.get("show", "cs"), None);
        Ok(())
    }

    #[test]
    fn test_save_word_list() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("significant_words.txt");
        save_word_list(&path, &names(&["delv", "intricate"]))?;
        assert_eq!(std::fs::read_to_string(&path)?, "delv\nintricate");
        Ok(())
    }
}
