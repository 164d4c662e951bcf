//! Pipeline configuration.
//!
//! One [`Config`] value is threaded through the fetcher, aggregator,
//! comparator and combiner. It is layered with `figment`: built-in defaults,
//! then an optional TOML file, then `RUSTBUZZ_*` environment variables.

use crate::error::{BuzzError, Result};
use crate::quarter::Quarter;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Words tracked by default. Matching is by lower-cased substring, so stems
/// like `leverag` cover "leverage", "leveraging", etc.
pub const DEFAULT_TARGET_WORDS: &[&str] = &[
    "leverag", "robust", "novel", "utiliz", "paradigm", "comprehensive", "boast", "convey",
    "driven by", "insight", "pivotal", "framework", "scalable", "rigorous", "in-depth",
    "systematic", "state-of-the-art", "groundbreaking", "promising", "remarkable", "delv",
    "intricate", "valuable", "exceptional", "notabl", "innovative", "primarily", "critical",
    "thoroughly", "subsequently", "particularly", "thereby", "significant", "foster",
    "crucial", "effectively", "additionally", "enhance", "capabilities", "paramount",
    "vital", "uncover", "unveil", "untangle", "albeit", "endeavor", "herein", "show",
    "small", "find", "help", "discover", "look", "need", "change", "make", "thing",
];

/// Environment variable prefix for overrides (e.g. `RUSTBUZZ_START_YEAR=2019`)
const ENV_PREFIX: &str = "RUSTBUZZ_";

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// arXiv category queries, e.g. `cs.*` or `astro-ph.HE`
    pub categories: Vec<String>,
    /// First year fetched (inclusive)
    pub start_year: i32,
    /// Last year fetched (inclusive)
    pub end_year: i32,
    /// Stop fetching after this quarter, if set
    pub last_quarter: Option<Quarter>,
    /// First quarter of the "after" epoch
    pub cutoff: Quarter,
    /// arXiv API endpoint
    pub api_url: String,
    /// Pause after every successful page, in seconds
    pub request_delay_secs: f64,
    /// Per-request HTTP timeout, in seconds
    pub request_timeout_secs: u64,
    /// Upper bound on `start` offsets requested per month
    pub max_results_per_month: usize,
    /// Page size (`max_results`) per request
    pub results_per_request: usize,
    /// Case-insensitive substrings to count
    pub target_words: Vec<String>,
    /// Where per-category data CSVs live
    pub database_dir: PathBuf,
    /// Where z-test and combined outputs live
    pub output_dir: PathBuf,
    /// Categories considered when picking significant words
    pub major_categories: Vec<String>,
    /// Factor increase a word must exceed in a category
    pub factor_threshold: f64,
    /// Number of major categories that must exceed the threshold
    pub min_categories: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            categories: vec!["cs.*".to_string()],
            start_year: 2022,
            end_year: 2022,
            last_quarter: None,
            cutoff: Quarter {
                year: 2023,
                quarter: 1,
            },
            api_url: "http://export.arxiv.org/api/query".to_string(),
            request_delay_secs: 2.0,
            request_timeout_secs: 10,
            max_results_per_month: 250,
            results_per_request: 250,
            target_words: DEFAULT_TARGET_WORDS.iter().map(|w| w.to_string()).collect(),
            database_dir: PathBuf::from("database"),
            output_dir: PathBuf::from("ztest"),
            major_categories: ["astro-ph", "cond-mat", "hep", "nucl", "cs"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            factor_threshold: 1.5,
            min_categories: 3,
        }
    }
}

/// Default config file: `<config_dir>/rustbuzz/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("rustbuzz").join("config.toml"))
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment.
    ///
    /// When `path` is `None` the default location is used if it exists.
    /// An explicit `path` that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(BuzzError::Config(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                debug!(path = %p.display(), "Loading config file");
                figment = figment.merge(Toml::file(p));
            }
            None => {
                if let Some(p) = default_config_path().filter(|p| p.exists()) {
                    debug!(path = %p.display(), "Loading default config file");
                    figment = figment.merge(Toml::file(p));
                }
            }
        }

        let config: Config = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.target_words.is_empty() {
            return Err(BuzzError::Validation("target_words is empty".to_string()));
        }
        if self.target_words.iter().any(|w| w.is_empty()) {
            return Err(BuzzError::Validation(
                "target_words contains an empty word".to_string(),
            ));
        }
        if self.start_year > self.end_year {
            return Err(BuzzError::Validation(format!(
                "start_year {} is after end_year {}",
                self.start_year, self.end_year
            )));
        }
        if self.results_per_request == 0 {
            return Err(BuzzError::Validation(
                "results_per_request must be positive".to_string(),
            ));
        }
        if !self.request_delay_secs.is_finite() || self.request_delay_secs < 0.0 {
            return Err(BuzzError::Validation(format!(
                "request_delay_secs must be a non-negative number, got {}",
                self.request_delay_secs
            )));
        }
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs)
    }

    /// Quarters to fetch, in order, honouring `last_quarter`.
    pub fn quarters(&self) -> Vec<Quarter> {
        (self.start_year..=self.end_year)
            .flat_map(|year| (1..=4).filter_map(move |q| Quarter::new(year, q).ok()))
            .take_while(|q| self.last_quarter.map_or(true, |last| *q <= last))
            .collect()
    }

    /// Path of the quarterly data CSV for a category.
    pub fn data_path(&self, category: &str) -> PathBuf {
        self.database_dir
            .join(format!("data_{}.csv", category_name(category)))
    }

    /// Path of the z-test CSV for a category name.
    pub fn ztest_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("ztest_{}.csv", name))
    }

    pub fn combined_path(&self) -> PathBuf {
        self.output_dir.join("combined_ztest.csv")
    }

    pub fn significant_words_path(&self) -> PathBuf {
        self.output_dir.join("significant_words.txt")
    }
}

/// File-friendly name of a category query.
///
/// Strips one trailing `*`, then one trailing `.` or `-`:
/// `cs.*` → `cs`, `hep-*` → `hep`, `astro-ph.HE` unchanged.
pub fn category_name(category: &str) -> &str {
    let name = category.strip_suffix('*').unwrap_or(category);
    name.strip_suffix('.')
        .or_else(|| name.strip_suffix('-'))
        .unwrap_or(name)
}
