//! 队列与投递指标收集模块
//!
//! 记录 dispatch 入队、淘汰、过期、投递与 barrier 状态，并在内存中聚合投递统计。

use std::collections::BTreeMap;

use contracts::{BarrierState, Dispatch};
use metrics::{counter, gauge, histogram};

/// 记录入队的 Dispatch 数量
pub fn record_dispatches_enqueued(count: usize) {
    counter!("beacon_dispatches_enqueued_total").increment(count as u64);
}

/// 记录因容量上限被淘汰的 Dispatch 数量
pub fn record_dispatches_evicted(count: usize) {
    if count > 0 {
        counter!("beacon_dispatches_evicted_total").increment(count as u64);
    }
}

/// 记录过期删除的 Dispatch 数量
pub fn record_dispatches_expired(count: usize) {
    if count > 0 {
        counter!("beacon_dispatches_expired_total").increment(count as u64);
    }
}

/// 记录已确认投递的 Dispatch
pub fn record_dispatches_delivered(consumer: &str, count: usize) {
    counter!(
        "beacon_dispatches_delivered_total",
        "consumer" => consumer.to_string()
    )
    .increment(count as u64);
}

/// 记录确认 (acknowledge) 失败
pub fn record_ack_failure(consumer: &str) {
    counter!(
        "beacon_ack_failures_total",
        "consumer" => consumer.to_string()
    )
    .increment(1);
}

/// 记录待投递数量
pub fn record_pending_count(consumer: &str, pending: usize) {
    gauge!(
        "beacon_pending_dispatches",
        "consumer" => consumer.to_string()
    )
    .set(pending as f64);
}

/// 记录组合 barrier 状态 (1 = Open, 0 = Closed)
pub fn record_barrier_state(consumer: &str, state: BarrierState) {
    let value = if state.is_open() { 1.0 } else { 0.0 };
    gauge!(
        "beacon_barrier_open",
        "consumer" => consumer.to_string()
    )
    .set(value);
}

/// 记录单次投递的批大小
pub fn record_batch_size(consumer: &str, size: usize) {
    histogram!(
        "beacon_batch_size",
        "consumer" => consumer.to_string()
    )
    .record(size as f64);
}

/// 记录从 track 到确认的延迟
pub fn record_delivery_latency_ms(consumer: &str, latency_ms: f64) {
    histogram!(
        "beacon_delivery_latency_ms",
        "consumer" => consumer.to_string()
    )
    .record(latency_ms);
}

/// 投递指标聚合器
///
/// 在内存中按 consumer 聚合投递统计，便于输出运行摘要。
#[derive(Debug, Clone, Default)]
pub struct DrainStatsAggregator {
    consumers: BTreeMap<String, ConsumerStats>,
}

#[derive(Debug, Clone, Default)]
struct ConsumerStats {
    batches: u64,
    delivered: u64,
    ack_failures: u64,
    batch_sizes: RunningStats,
    latency_ms: RunningStats,
}

impl DrainStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次投递尝试
    pub fn record_batch(&mut self, consumer: &str, size: usize) {
        let stats = self.consumers.entry(consumer.to_string()).or_default();
        stats.batches += 1;
        stats.batch_sizes.push(size as f64);
    }

    /// 记录已确认的 Dispatch, 延迟按 `now_ms - timestamp` 计算
    pub fn record_delivered(&mut self, consumer: &str, delivered: &[Dispatch], now_ms: i64) {
        let stats = self.consumers.entry(consumer.to_string()).or_default();
        stats.delivered += delivered.len() as u64;
        for dispatch in delivered {
            stats
                .latency_ms
                .push(now_ms.saturating_sub(dispatch.timestamp).max(0) as f64);
        }
    }

    /// 记录确认失败
    pub fn record_ack_failure(&mut self, consumer: &str) {
        self.consumers
            .entry(consumer.to_string())
            .or_default()
            .ack_failures += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let consumers = self
            .consumers
            .iter()
            .map(|(id, stats)| ConsumerSummary {
                consumer: id.clone(),
                batches: stats.batches,
                delivered: stats.delivered,
                ack_failures: stats.ack_failures,
                batch_size: StatsSummary::from(&stats.batch_sizes),
                latency_ms: StatsSummary::from(&stats.latency_ms),
            })
            .collect::<Vec<_>>();

        MetricsSummary {
            total_batches: consumers.iter().map(|c| c.batches).sum(),
            total_delivered: consumers.iter().map(|c| c.delivered).sum(),
            total_ack_failures: consumers.iter().map(|c| c.ack_failures).sum(),
            consumers,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_batches: u64,
    pub total_delivered: u64,
    pub total_ack_failures: u64,
    pub consumers: Vec<ConsumerSummary>,
}

/// 单个 consumer 的摘要
#[derive(Debug, Clone, Default)]
pub struct ConsumerSummary {
    pub consumer: String,
    pub batches: u64,
    pub delivered: u64,
    pub ack_failures: u64,
    pub batch_size: StatsSummary,
    pub latency_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Batches: {}", self.total_batches)?;
        writeln!(f, "Delivered: {}", self.total_delivered)?;
        writeln!(f, "Ack failures: {}", self.total_ack_failures)?;

        for consumer in &self.consumers {
            writeln!(f, "[{}]", consumer.consumer)?;
            writeln!(
                f,
                "  batches={} delivered={} ack_failures={}",
                consumer.batches, consumer.delivered, consumer.ack_failures
            )?;
            writeln!(f, "  batch size: {}", consumer.batch_size)?;
            writeln!(f, "  latency (ms): {}", consumer.latency_ms)?;
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
