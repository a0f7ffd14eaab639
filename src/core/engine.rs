use crate::domain::model::AnswerSet;
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;

/// Drives one URL through extract → transform → analyze.
pub struct AnalysisEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> AnalysisEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    pub async fn run(&self, url: &str) -> Result<AnswerSet> {
        // Extract
        let started = Instant::now();
        let raw = self.pipeline.extract(url).await?;
        tracing::info!(
            rows = raw.len(),
            columns = raw.columns.len(),
            "table scraped"
        );
        self.monitor.log_phase("extract", started.elapsed());

        // Transform
        let started = Instant::now();
        let data = self.pipeline.transform(raw).await?;
        tracing::debug!(columns = ?data.columns, "table normalized");
        self.monitor.log_phase("transform", started.elapsed());

        // Analyze
        let started = Instant::now();
        let answers = self.pipeline.analyze(&data).await?;
        tracing::info!(
            count = answers.count,
            earliest = %answers.earliest_title,
            correlation = ?answers.correlation,
            chart_bytes = answers.chart.len(),
            "answers computed"
        );
        self.monitor.log_phase("analyze", started.elapsed());

        Ok(answers)
    }
}
