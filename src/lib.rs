//! # rustbuzz
//!
//! arXiv Buzzword Frequency Pipeline
//!
//! ## Modules
//!
//! - [`arxiv`] - arXiv Atom API client
//! - [`aggregate`] - Quarterly per-word counts
//! - [`compare`] - Before/after two-proportion z-tests
//! - [`combine`] - Cross-category factor table and significant words
//! - [`pipeline`] - Stage drivers used by the CLI
//! - [`config`] - Layered configuration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustbuzz::{aggregate, compare::Comparator, Config};
//!
//! fn main() -> rustbuzz::Result<()> {
//!     let config = Config::load(None)?;
//!     let table = aggregate::load_table(&config.data_path("cs.*"))?;
//!     for result in Comparator::new(config.cutoff).compare_ranked(&table) {
//!         println!("{}: {:+.2}% (p={:.1e})", result.term, result.change_pct, result.p_value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod arxiv;
pub mod combine;
pub mod compare;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod quarter;

pub use config::Config;
pub use error::{BuzzError, Result};
pub use quarter::Quarter;
