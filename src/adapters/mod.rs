// Adapters layer: concrete implementations of the domain ports.

pub mod chart;
pub mod html_table;

pub use chart::{to_data_uri, PngChartRenderer};
pub use html_table::{parse_first_table, HttpTableSource};
