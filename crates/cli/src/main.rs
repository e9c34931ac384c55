//! # Beacon CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 事件追踪会话与队列排空
//! - 队列检查与清理

mod cli;
mod commands;
mod error;
mod session;

use anyhow::Result;
use clap::Parser;
use observability::{LogFormat, ObservabilityConfig};
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_purge, run_session, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(observability_config(&cli))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Beacon CLI starting");

    let result = match &cli.command {
        Commands::Run(args) => run_session(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args).await,
        Commands::Purge(args) => run_purge(args).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Map the CLI's verbosity and format flags onto the observability config
fn observability_config(cli: &Cli) -> ObservabilityConfig {
    let log_format = match cli.log_format {
        cli::LogFormat::Json => LogFormat::Json,
        cli::LogFormat::Pretty => LogFormat::Pretty,
        cli::LogFormat::Compact => LogFormat::Compact,
    };
    ObservabilityConfig::from_verbosity(cli.verbose, cli.quiet).with_log_format(log_format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observability_config_from_flags() {
        let cli = Cli::parse_from(["beacon", "-q", "--log-format", "json", "validate"]);
        let config = observability_config(&cli);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.metrics_port, None);

        let cli = Cli::parse_from(["beacon", "-vv", "validate"]);
        assert_eq!(observability_config(&cli).log_level, "trace");
    }
}
