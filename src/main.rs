use clap::Parser;
use table_analyst::domain::ports::ConfigProvider;
use table_analyst::utils::error::ErrorSeverity;
use table_analyst::utils::{logger, validation::Validate};
use table_analyst::{AnalysisEngine, CliConfig, HttpTableSource, PngChartRenderer, TablePipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting table-analyst");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 載入並驗證配置
    let config = match cli.resolve().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration failed: {}", e);
            tracing::error!("Suggestion: {}", e.recovery_suggestion());
            eprintln!("{}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if cli.monitor {
        tracing::info!("Per-phase process monitoring enabled");
    }
    if config.fetch_timeout().is_none() {
        tracing::debug!("No upstream fetch timeout configured");
    }

    let source = HttpTableSource::from_config(&config)?;
    let renderer = PngChartRenderer::from_config(&config);
    let pipeline = TablePipeline::new(source, renderer);
    let engine = AnalysisEngine::new_with_monitoring(pipeline, cli.monitor);

    if let Err(e) = table_analyst::app::serve(&config.bind_address(), engine).await {
        tracing::error!(
            "Server stopped: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("{}", e.user_friendly_message());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }

    Ok(())
}
