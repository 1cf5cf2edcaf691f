//! # Dispatcher
//!
//! 投递调度模块。
//!
//! 负责：
//! - 有界工作队列 + 固定数量 worker
//! - 按重试策略发送，区分可重试 / 不可重试错误
//! - 单一 Collector 消费投递回执，维护计数与状态

pub mod collector;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod retry;
pub mod state;

pub use collector::{Collector, CollectorSummary};
pub use error::DispatcherError;
pub use metrics::{DeliveryMetrics, MetricsSnapshot};
pub use pool::{
    spawn_batch_feeder, work_queue, PoolStats, WorkReceiver, WorkSender, WorkerContext,
    WorkerPool, WorkerStats,
};
pub use retry::{backoff, decide, RetryDecision, RetryPolicy};
pub use state::DeliveryTracker;
