//! 内存 Broker
//!
//! 进程内实现，用于测试和 dry-run，支持按 key 注入失败场景：
//! - 同步瞬时拒绝 N 次 (可重试)
//! - 同步永久拒绝
//! - 异步投递失败 (回执为错误)

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{DeliveryError, LogPosition, Message};
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use crate::transport::{BrokerTransport, DeliveryReporter, SubmitError};

/// 失败注入计划
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// key -> 剩余的瞬时拒绝次数
    pub transient_rejects: HashMap<String, u32>,
    /// 永久拒绝的 keys
    pub reject_keys: HashSet<String>,
    /// 接受后异步失败的 keys
    pub fail_async_keys: HashSet<String>,
}

impl FaultPlan {
    /// 前 `times` 次提交返回可重试错误
    pub fn transient(mut self, key: impl Into<String>, times: u32) -> Self {
        self.transient_rejects.insert(key.into(), times);
        self
    }

    /// 每次提交都被永久拒绝
    pub fn reject(mut self, key: impl Into<String>) -> Self {
        self.reject_keys.insert(key.into());
        self
    }

    /// 接受但回执失败
    pub fn fail_async(mut self, key: impl Into<String>) -> Self {
        self.fail_async_keys.insert(key.into());
        self
    }
}

/// 内存 Broker 配置
#[derive(Debug, Clone)]
pub struct MemoryBrokerConfig {
    /// 内部缓冲容量 (已接受未回执)
    pub buffer_capacity: usize,
    /// 分区数
    pub partitions: u32,
    /// 最大消息大小 (bytes)
    pub max_message_bytes: usize,
    /// 模拟 ack 延迟
    pub ack_latency: Duration,
    /// 失败注入
    pub faults: FaultPlan,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10_000,
            partitions: 6,
            max_message_bytes: 1_000_000,
            ack_latency: Duration::ZERO,
            faults: FaultPlan::default(),
        }
    }
}

/// 已落盘 (内存) 的消息
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub position: LogPosition,
    pub message: Message,
}

#[derive(Debug, Default)]
struct BrokerLog {
    next_offsets: HashMap<i32, i64>,
    delivered: Vec<DeliveredMessage>,
}

type Pending = (Message, DeliveryReporter);

/// 内存 Broker
pub struct MemoryBroker {
    config: MemoryBrokerConfig,
    queue: Mutex<Option<mpsc::Sender<Pending>>>,
    transient_left: Mutex<HashMap<String, u32>>,
    attempts: Mutex<HashMap<String, u32>>,
    log: Arc<Mutex<BrokerLog>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// key 哈希分区
pub fn partition_for(key: &str, partitions: u32) -> i32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(partitions.max(1))) as i32
}

impl MemoryBroker {
    /// 创建并启动后台投递任务
    ///
    /// 必须在 tokio runtime 内调用。
    pub fn start(config: MemoryBrokerConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.buffer_capacity.max(1));
        let log = Arc::new(Mutex::new(BrokerLog::default()));

        tokio::spawn(deliver_loop(
            rx,
            log.clone(),
            config.partitions,
            config.ack_latency,
            config.faults.fail_async_keys.clone(),
        ));

        Arc::new(Self {
            transient_left: Mutex::new(config.faults.transient_rejects.clone()),
            config,
            queue: Mutex::new(Some(tx)),
            attempts: Mutex::new(HashMap::new()),
            log,
        })
    }

    /// 已投递消息 (按投递顺序)
    pub fn delivered(&self) -> Vec<DeliveredMessage> {
        lock(&self.log).delivered.clone()
    }

    pub fn delivered_count(&self) -> usize {
        lock(&self.log).delivered.len()
    }

    /// 某个 key 的提交次数 (含被拒绝的)
    pub fn attempts(&self, key: &str) -> u32 {
        lock(&self.attempts).get(key).copied().unwrap_or(0)
    }

    /// 各分区下一个 offset
    pub fn next_offsets(&self) -> HashMap<i32, i64> {
        lock(&self.log).next_offsets.clone()
    }

    fn check(&self, message: &Message) -> Result<(), DeliveryError> {
        let size = message.size();
        if size > self.config.max_message_bytes {
            return Err(DeliveryError::MessageTooLarge {
                size,
                max: self.config.max_message_bytes,
            });
        }

        if self.config.faults.reject_keys.contains(&message.key) {
            return Err(DeliveryError::rejected("key rejected by broker"));
        }

        let mut transient = lock(&self.transient_left);
        if let Some(left) = transient.get_mut(&message.key) {
            if *left > 0 {
                *left -= 1;
                return Err(DeliveryError::transport("simulated transient failure"));
            }
        }
        Ok(())
    }
}

impl BrokerTransport for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    fn submit(&self, message: Message, reporter: DeliveryReporter) -> Result<(), SubmitError> {
        *lock(&self.attempts).entry(message.key.clone()).or_insert(0) += 1;

        let queue = lock(&self.queue);
        let Some(tx) = queue.as_ref() else {
            return Err(SubmitError::new(DeliveryError::Closed, message, reporter));
        };

        if let Err(error) = self.check(&message) {
            trace!(key = %message.key, error = %error, "memory broker rejected message");
            return Err(SubmitError::new(error, message, reporter));
        }

        tx.try_send((message, reporter)).map_err(|e| match e {
            mpsc::error::TrySendError::Full((message, reporter)) => SubmitError::new(
                DeliveryError::QueueFull {
                    capacity: self.config.buffer_capacity,
                },
                message,
                reporter,
            ),
            mpsc::error::TrySendError::Closed((message, reporter)) => {
                SubmitError::new(DeliveryError::Closed, message, reporter)
            }
        })
    }

    fn close(&self) {
        if lock(&self.queue).take().is_some() {
            debug!("memory broker closed");
        }
    }
}

#[instrument(name = "memory_broker_deliver", skip_all)]
async fn deliver_loop(
    mut rx: mpsc::Receiver<Pending>,
    log: Arc<Mutex<BrokerLog>>,
    partitions: u32,
    ack_latency: Duration,
    fail_async: HashSet<String>,
) {
    while let Some((message, reporter)) = rx.recv().await {
        if !ack_latency.is_zero() {
            tokio::time::sleep(ack_latency).await;
        }

        if fail_async.contains(&message.key) {
            reporter
                .report(Err(DeliveryError::transport(
                    "simulated asynchronous delivery failure",
                )))
                .await;
            continue;
        }

        let position = {
            let mut log = lock(&log);
            let partition = partition_for(&message.key, partitions);
            let next = log.next_offsets.entry(partition).or_insert(0);
            let position = LogPosition {
                partition,
                offset: *next,
            };
            *next += 1;
            log.delivered.push(DeliveredMessage { position, message });
            position
        };
        reporter.report(Ok(position)).await;
    }
    debug!("memory broker delivery loop finished");
}
