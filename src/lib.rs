pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TomlConfig;

pub use adapters::{HttpTableSource, PngChartRenderer};
pub use crate::core::{engine::AnalysisEngine, pipeline::TablePipeline};
pub use domain::model::{AnswerSet, Dataset, Record};
pub use utils::error::{EtlError, Result};
