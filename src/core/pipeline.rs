use crate::adapters::chart::to_data_uri;
use crate::core::{analysis, normalize};
use crate::domain::model::{AnswerSet, Dataset};
use crate::domain::ports::{ChartRenderer, Pipeline, TableSource};
use crate::utils::error::Result;

/// Scrape → normalize → answer, generic over where tables come from and how
/// charts are drawn.
pub struct TablePipeline<S: TableSource, R: ChartRenderer> {
    pub(crate) source: S,
    pub(crate) renderer: R,
}

impl<S: TableSource, R: ChartRenderer> TablePipeline<S, R> {
    pub fn new(source: S, renderer: R) -> Self {
        Self { source, renderer }
    }

    /// Scatter of the valid (Rank, Peak) pairs with its regression line, as a
    /// data URI. Empty when there is nothing to plot.
    pub fn chart_data_uri(&self, data: &Dataset) -> Result<String> {
        let pairs = analysis::rank_peak_pairs(data);
        let Some(fit) = analysis::fit_line(&pairs) else {
            tracing::debug!("no (Rank, Peak) pairs; skipping chart");
            return Ok(String::new());
        };

        tracing::debug!(
            pairs = pairs.len(),
            slope = fit.slope,
            intercept = fit.intercept,
            "regression fitted"
        );
        let bytes = self.renderer.render(&pairs, &fit)?;
        Ok(to_data_uri(self.renderer.mime_type(), &bytes))
    }
}

#[async_trait::async_trait]
impl<S: TableSource, R: ChartRenderer> Pipeline for TablePipeline<S, R> {
    async fn extract(&self, url: &str) -> Result<Dataset> {
        self.source.fetch_table(url).await
    }

    async fn transform(&self, data: Dataset) -> Result<Dataset> {
        normalize::normalize(data)
    }

    async fn analyze(&self, data: &Dataset) -> Result<AnswerSet> {
        Ok(AnswerSet {
            count: analysis::count_two_billion_before_2000(data),
            earliest_title: analysis::earliest_over_one_and_a_half_billion(data)?,
            correlation: analysis::rank_peak_correlation(data),
            chart: self.chart_data_uri(data)?,
        })
    }
}
