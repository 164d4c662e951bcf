//! Stage drivers: fetch → aggregate → compare → combine.
//!
//! Each stage reads the previous stage's files from disk, so any of them can
//! be run on its own.

use crate::aggregate::{self, Aggregator, QuarterTable};
use crate::arxiv::ArxivClient;
use crate::combine::{self, FactorTable};
use crate::compare::{self, Comparator};
use crate::config::{category_name, Config};
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Fetch and aggregate every configured quarter of one category.
///
/// A malformed publication date aborts the category.
pub async fn fetch_category(
    config: &Config,
    client: &ArxivClient,
    category: &str,
) -> Result<QuarterTable> {
    let mut aggregator = Aggregator::new(&config.target_words);

    for quarter in config.quarters() {
        println!("Processing {} Q{}...", quarter.year(), quarter.quarter());
        let records = client.fetch_quarter(category, quarter).await;
        aggregator.extend(&records)?;
    }

    info!(
        category = category,
        records = aggregator.records(),
        "Category aggregated"
    );
    Ok(aggregator.finish())
}

/// Fetch every configured category and write its data CSV.
pub async fn run_fetch(config: &Config) -> Result<Vec<PathBuf>> {
    let client = ArxivClient::new(config)?;
    let mut written = Vec::new();

    for category in &config.categories {
        println!("--------{}--------", category_name(category));
        let table = fetch_category(config, &client, category).await?;
        let path = config.data_path(category);
        if aggregate::save_table(&path, &table)? {
            println!("Saved to {}", path.display());
            written.push(path);
        }
    }

    Ok(written)
}

/// Aggregate a local records CSV into the data CSV for `category`.
pub fn aggregate_file(config: &Config, input: &Path, category: &str) -> Result<Option<PathBuf>> {
    let records = aggregate::load_records(input)?;
    info!(input = %input.display(), records = records.len(), "Loaded records");

    let table = aggregate::aggregate(&records, &config.target_words)?;
    let path = config.data_path(category);
    Ok(aggregate::save_table(&path, &table)?.then_some(path))
}

/// `(category name, path)` for every `data_<name>.csv` in the database dir,
/// sorted by name.
pub fn data_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(name) = file_name
            .strip_prefix("data_")
            .and_then(|rest| rest.strip_suffix(".csv"))
        {
            if !name.is_empty() {
                files.push((name.to_string(), path.clone()));
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Run the before/after comparison for every data CSV.
pub fn run_compare(config: &Config) -> Result<Vec<PathBuf>> {
    let comparator = Comparator::new(config.cutoff);
    let mut written = Vec::new();

    let files = data_files(&config.database_dir)?;
    if files.is_empty() {
        warn!(dir = %config.database_dir.display(), "No data files found");
    }

    for (name, data_path) in files {
        let table = aggregate::load_table(&data_path)?;
        let results = comparator.compare(&table);
        let path = config.ztest_path(&name);
        if compare::save_results(&path, &results)? {
            println!("Saved results to {}", path.display());
            written.push(path);
        }
    }

    Ok(written)
}

/// Summary of a combine run.
#[derive(Debug)]
pub struct CombineSummary {
    pub table: FactorTable,
    pub significant_words: Vec<String>,
}

/// Category names considered when combining: the configured categories in
/// order, then any major category not already listed.
pub fn combine_categories(config: &Config) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let configured = config.categories.iter().map(|c| category_name(c));
    for name in configured.chain(config.major_categories.iter().map(String::as_str)) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Combine z-test results into the factor table and the significant words.
pub fn run_combine(config: &Config) -> Result<CombineSummary> {
    let categories = combine_categories(config);
    let table = combine::build_factor_table(&categories, |name| config.ztest_path(name))?;

    let combined = config.combined_path();
    table.save(&combined)?;
    println!("Combined CSV written to: {}", combined.display());

    let significant_words = table.significant_words(
        &config.major_categories,
        config.factor_threshold,
        config.min_categories,
    );
    let words_path = config.significant_words_path();
    combine::save_word_list(&words_path, &significant_words)?;
    println!(
        "{} significant words written to: {}",
        significant_words.len(),
        words_path.display()
    );

    Ok(CombineSummary {
        table,
        significant_words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> Config {
        Config {
            database_dir: dir.join("database"),
            output_dir: dir.join("ztest"),
            target_words: vec!["delv".to_string(), "show".to_string()],
            major_categories: vec!["cs".to_string(), "hep".to_string()],
            min_categories: 1,
            ..Config::default()
        }
    }

    fn write_records(path: &Path) -> Result<()> {
        let mut content = String::from("text,published,category\n");
        // before: 2 of 20 abstracts mention "delv", all mention "show"
        for i in 0..20 {
            let text = if i < 2 { "we delve and show" } else { "we show" };
            content.push_str(&format!("{},2022-0{}-15,cs.*\n", text, i % 9 + 1));
        }
        // after: 12 of 20
        for i in 0..20 {
            let text = if i < 12 { "we delve and show" } else { "we show" };
            content.push_str(&format!("{},2023-0{}-15,cs.*\n", text, i % 9 + 1));
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    #[test]
    fn test_data_files() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("data_cs.csv"), "")?;
        std::fs::write(dir.path().join("data_astro-ph.HE.csv"), "")?;
        std::fs::write(dir.path().join("notes.txt"), "")?;
        std::fs::write(dir.path().join("_data_hep.csv"), "")?;

        let names: Vec<String> = data_files(dir.path())?.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["astro-ph.HE", "cs"]);
        Ok(())
    }

    #[test]
    fn test_combine_categories() {
        let config = Config {
            categories: vec!["cs.*".to_string(), "astro-ph.HE".to_string()],
            major_categories: vec!["astro-ph".to_string(), "cs".to_string()],
            ..Config::default()
        };
        assert_eq!(combine_categories(&config), vec!["cs", "astro-ph.HE", "astro-ph"]);
    }

    #[test]
    fn test_offline_pipeline() -> Result<()> {
        let dir = tempdir()?;
        let config = config_in(dir.path());
        let input = dir.path().join("records.csv");
        write_records(&input)?;

        let data = aggregate_file(&config, &input, "cs.*")?;
        assert_eq!(data, Some(config.data_path("cs.*")));

        let written = run_compare(&config)?;
        assert_eq!(written, vec![config.ztest_path("cs")]);
        let rows = compare::load_results(&config.ztest_path("cs"))?;
        assert_eq!(rows[0].word, "delv");
        assert!(rows[0].is_significant());
        assert_eq!(rows[0].before_pct, 10.0);
        assert_eq!(rows[0].after_pct, 60.0);
        assert!(!rows[1].is_significant());

        let summary = run_combine(&config)?;
        assert_eq!(summary.significant_words, vec!["delv"]);
        assert!(config.combined_path().exists());
        assert_eq!(
            std::fs::read_to_string(config.significant_words_path())?,
            "delv"
        );
        Ok(())
    }

    #[test]
    fn test_bad_date_aborts_aggregation() -> Result<()> {
        let dir = tempdir()?;
        let config = config_in(dir.path());
        let input = dir.path().join("records.csv");
        std::fs::write(&input, "text,published,category\nwe delve,2022-01-01,cs\nwe show,soon,cs\n")?;

        assert!(aggregate_file(&config, &input, "cs").is_err());
        assert!(!config.data_path("cs").exists());
        Ok(())
    }
}
