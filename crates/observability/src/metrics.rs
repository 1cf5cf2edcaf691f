//! 投递指标收集模块
//!
//! 记录 Prometheus 指标 (通过 `metrics` facade)，并在内存中聚合 ack 延迟。
//! 所有函数只更新内存中的计数器，不做阻塞 I/O。

use std::collections::BTreeMap;

use contracts::{DeliveryError, DeliveryEvent};
use metrics::{counter, gauge, histogram};

/// 记录消息进入工作队列
pub fn record_message_queued() {
    counter!("ingest_messages_queued_total").increment(1);
}

/// 记录一次投递回执
pub fn record_delivery(acked: bool) {
    let status = if acked { "acked" } else { "failed" };
    counter!("ingest_deliveries_total", "status" => status).increment(1);
}

/// 记录一次重试
pub fn record_retry(error: &DeliveryError) {
    counter!("ingest_send_retries_total", "error" => error.kind()).increment(1);
}

/// 记录重试策略放弃的发送
pub fn record_send_aborted(error: &DeliveryError) {
    counter!("ingest_send_aborted_total", "error" => error.kind()).increment(1);
}

/// 记录数据源丢弃的行
pub fn record_rows_dropped(source: &str, count: u64) {
    counter!("ingest_rows_dropped_total", "source" => source.to_string()).increment(count);
}

/// 记录 ack 延迟 (毫秒)
pub fn record_delivery_latency_ms(latency_ms: f64) {
    histogram!("ingest_delivery_latency_ms").record(latency_ms);
}

/// 记录未完成消息数
pub fn record_pending(pending: u64) {
    gauge!("ingest_messages_pending").set(pending as f64);
}

/// 投递延迟聚合器
///
/// 由 Collector 独占，按回执更新；结束时生成摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryLatency {
    /// ack 数
    pub acked: u64,

    /// 失败数
    pub failed: u64,

    /// ack 延迟 (毫秒)
    pub ack_latency_ms: RunningStats,

    /// 各错误类型的失败次数
    pub failures_by_kind: BTreeMap<&'static str, u64>,
}

impl DeliveryLatency {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 按回执更新
    pub fn observe(&mut self, event: &DeliveryEvent) {
        match &event.result {
            Ok(()) => {
                self.acked += 1;
                self.ack_latency_ms
                    .push(event.latency.as_secs_f64() * 1000.0);
            }
            Err(err) => {
                self.failed += 1;
                *self.failures_by_kind.entry(err.kind()).or_insert(0) += 1;
            }
        }
    }

    /// 生成摘要
    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            acked: self.acked,
            failed: self.failed,
            ack_latency_ms: StatsSummary::from(&self.ack_latency_ms),
            failures_by_kind: self.failures_by_kind.clone(),
        }
    }
}

/// 延迟摘要
#[derive(Debug, Clone, Default)]
pub struct LatencySummary {
    pub acked: u64,
    pub failed: u64,
    pub ack_latency_ms: StatsSummary,
    pub failures_by_kind: BTreeMap<&'static str, u64>,
}

impl std::fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Delivery reports: {} acked, {} failed", self.acked, self.failed)?;
        writeln!(f, "Ack latency (ms): {}", self.ack_latency_ms)?;
        if !self.failures_by_kind.is_empty() {
            writeln!(f, "Failures by kind:")?;
            for (kind, count) in &self.failures_by_kind {
                writeln!(f, "  {kind}: {count}")?;
            }
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
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
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
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{LogPosition, MessageId};
    use std::time::Duration;

    fn event(id: u64, result: Result<(), DeliveryError>, latency_ms: u64) -> DeliveryEvent {
        DeliveryEvent {
            message_id: MessageId(id),
            key: format!("key-{id}"),
            position: result.is_ok().then_some(LogPosition {
                partition: 0,
                offset: id as i64,
            }),
            result,
            latency: Duration::from_millis(latency_ms),
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_latency_observe() {
        let mut latency = DeliveryLatency::new();
        latency.observe(&event(1, Ok(()), 10));
        latency.observe(&event(2, Ok(()), 30));
        latency.observe(&event(3, Err(DeliveryError::rejected("nope")), 5));
        latency.observe(&event(4, Err(DeliveryError::ReportDropped), 5));

        assert_eq!(latency.acked, 2);
        assert_eq!(latency.failed, 2);
        assert!((latency.ack_latency_ms.mean() - 20.0).abs() < 1e-9);
        assert_eq!(latency.failures_by_kind.get("rejected"), Some(&1));
        assert_eq!(latency.failures_by_kind.get("report_dropped"), Some(&1));
    }

    #[test]
    fn test_summary_display() {
        let mut latency = DeliveryLatency::new();
        latency.observe(&event(1, Ok(()), 12));
        latency.observe(&event(2, Err(DeliveryError::Closed), 1));

        let output = latency.summary().to_string();
        assert!(output.contains("1 acked, 1 failed"));
        assert!(output.contains("closed: 1"));
        assert!(output.contains("n=1"));
    }

    #[test]
    fn test_empty_summary() {
        let output = DeliveryLatency::new().summary().to_string();
        assert!(output.contains("Ack latency (ms): N/A"));
    }
}
