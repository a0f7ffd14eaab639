pub mod analysis;
pub mod engine;
pub mod normalize;
pub mod pipeline;

pub use crate::domain::model::{AnswerSet, Dataset, LinearFit, Record};
pub use crate::domain::ports::{ChartRenderer, ConfigProvider, Pipeline, TableSource};
pub use crate::utils::error::Result;
