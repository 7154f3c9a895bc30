use chrono::Utc;
use clap::Parser;
use cns_cli::{exit_code, logging, Cli, Pipeline, PipelineConfig};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    logging::init();
    let cli = Cli::parse();

    let pipeline = match PipelineConfig::from_cli(&cli, |name| std::env::var(name).ok())
        .and_then(|config| Pipeline::from_config(&config))
    {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("❌ {}: {}", e.kind(), e);
            return ExitCode::from(exit_code(e.kind()));
        }
    };

    match pipeline.run(Utc::now()).await {
        Ok(report) => {
            print!("{}", report.render());
            ExitCode::SUCCESS
        }
        Err(failure) => {
            error!("❌ {}", failure);
            ExitCode::from(exit_code(failure.error.kind()))
        }
    }
}
