use crate::domain::model::{AnswerSet, Dataset, LinearFit};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Somewhere a URL can be turned into its first table.
pub trait TableSource: Send + Sync {
    fn fetch_table(&self, url: &str) -> impl std::future::Future<Output = Result<Dataset>> + Send;
}

/// Draws the Rank/Peak scatter with its fitted line and returns encoded image bytes.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, points: &[(f64, f64)], fit: &LinearFit) -> Result<Vec<u8>>;

    fn mime_type(&self) -> &'static str;
}

pub trait ConfigProvider: Send + Sync {
    fn host(&self) -> &str;
    fn port(&self) -> u16;
    fn user_agent(&self) -> &str;
    fn fetch_timeout(&self) -> Option<Duration>;
    fn chart_size(&self) -> (u32, u32);

    fn bind_address(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self, url: &str) -> Result<Dataset>;
    async fn transform(&self, data: Dataset) -> Result<Dataset>;
    async fn analyze(&self, data: &Dataset) -> Result<AnswerSet>;
}
