//! # Observability
//!
//! 可观测性模块：日志订阅器 + Prometheus 指标。
//!
//! ## 功能
//!
//! - 按 CLI 的 `-v` / `-q` / `--log-format` 安装 tracing 订阅器，日志写到 stderr
//! - 可选的 Prometheus 导出端口
//! - 队列、barrier 与投递指标收集与统计
//!
//! ## 使用示例
//!
//! ```ignore
//! let config = ObservabilityConfig::from_verbosity(1, false).with_log_format(LogFormat::Compact);
//! observability::init_with_config(config)?;
//!
//! observability::record_dispatches_delivered("collect", batch.len());
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_ack_failure, record_barrier_state, record_batch_size, record_delivery_latency_ms,
    record_dispatches_delivered, record_dispatches_enqueued, record_dispatches_evicted,
    record_dispatches_expired, record_pending_count, ConsumerSummary, DrainStatsAggregator,
    MetricsSummary, RunningStats, StatsSummary,
};

/// 日志与指标配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// 没有 RUST_LOG（或忽略它）时的过滤指令
    pub log_level: String,
    /// 是否读取 RUST_LOG
    pub respect_env: bool,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: "info".to_string(),
            respect_env: true,
            metrics_port: None,
        }
    }
}

impl ObservabilityConfig {
    /// 由 `-v` 次数和 `-q` 推出日志级别
    ///
    /// `quiet` 固定为 warn，并忽略 RUST_LOG。
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self {
                log_level: "warn".to_string(),
                respect_env: false,
                ..Self::default()
            };
        }

        let log_level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        Self {
            log_level: log_level.to_string(),
            ..Self::default()
        }
    }

    pub fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    pub fn with_metrics_port(mut self, port: Option<u16>) -> Self {
        self.metrics_port = port;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        if self.respect_env {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::new(&self.log_level)
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    Json,
    /// 人类可读格式
    #[default]
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// 安装全局 tracing 订阅器，按需启动 Prometheus 导出
///
/// 日志写到 stderr，stdout 留给命令输出。
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        log_level = %config.log_level,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// 仅启动 Prometheus 导出（监听 0.0.0.0:`port`）
pub fn init_metrics(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
