//! FileLogBroker - append-only JSON-lines log on disk
//!
//! One line per delivered message. A message is acknowledged only after its
//! line has been written and the writer flushed. A batch whose write fails is
//! cut back out of the file, so a message reported failed never appears in
//! the log and its offset is reused.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::future::Future;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{DeliveryError, Header, LogPosition, Message};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::BrokerError;
use crate::memory::partition_for;
use crate::transport::{BrokerTransport, DeliveryReporter, SubmitError};

/// Messages written per flush at most
const MAX_WRITE_BATCH: usize = 256;

/// On-disk line format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub headers: Vec<Header>,
    /// JSON body, or the raw body as a string if it isn't JSON
    pub body: serde_json::Value,
}

/// Configuration for FileLogBroker
#[derive(Debug, Clone)]
pub struct FileLogConfig {
    pub path: PathBuf,
    pub partitions: u32,
    pub buffer_capacity: usize,
    pub max_message_bytes: usize,
}

type Pending = (Message, DeliveryReporter);

/// Append-only target of the writer task
pub(crate) trait LogFile: AsyncWrite + Unpin + Send + 'static {
    /// Cut the log back to `len` bytes
    fn truncate(&mut self, len: u64) -> impl Future<Output = std::io::Result<()>> + Send;
}

impl LogFile for tokio::fs::File {
    async fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len).await
    }
}

/// Broker that appends messages to a local file
pub struct FileLogBroker {
    path: PathBuf,
    buffer_capacity: usize,
    max_message_bytes: usize,
    queue: Mutex<Option<mpsc::Sender<Pending>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FileLogBroker {
    /// Open (or create) the log and start the writer task
    ///
    /// Offsets continue from the highest offset already in the file.
    /// Must be called inside a tokio runtime.
    #[instrument(name = "file_broker_open", skip(config), fields(path = %config.path.display()))]
    pub fn open(config: FileLogConfig) -> Result<Self, BrokerError> {
        let open_err = |source: std::io::Error| BrokerError::Open {
            path: config.path.clone(),
            source,
        };

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(open_err)?;
            }
        }

        repair_torn_tail(&config.path).map_err(open_err)?;
        let next_offsets = existing_offsets(&config.path).map_err(open_err)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .map_err(open_err)?;
        let len = file.metadata().map_err(open_err)?.len();

        info!(
            partitions = config.partitions,
            resumed_partitions = next_offsets.len(),
            bytes = len,
            "file broker log opened"
        );

        Ok(Self::with_log(
            config,
            tokio::fs::File::from_std(file),
            next_offsets,
            len,
        ))
    }

    /// Start the writer task over `log`, which already holds `len` bytes
    pub(crate) fn with_log<W: LogFile>(
        config: FileLogConfig,
        log: W,
        next_offsets: HashMap<i32, i64>,
        len: u64,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_capacity.max(1));
        tokio::spawn(write_loop(rx, log, config.partitions, next_offsets, len));

        Self {
            path: config.path,
            buffer_capacity: config.buffer_capacity,
            max_message_bytes: config.max_message_bytes,
            queue: Mutex::new(Some(tx)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Terminate a line left torn by an interrupted write
///
/// The torn line itself is skipped when offsets are scanned.
fn repair_torn_tail(path: &Path) -> std::io::Result<()> {
    let mut file = match OpenOptions::new().read(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!(path = %path.display(), "log ends mid-line, terminating it");
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// Scan an existing log for the next offset of each partition
fn existing_offsets(path: &Path) -> std::io::Result<HashMap<i32, i64>> {
    let mut next = HashMap::new();
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(next),
        Err(e) => return Err(e),
    };

    for line in BufReader::new(file).lines() {
        let line = line?;
        match serde_json::from_str::<LogLine>(&line) {
            Ok(entry) => {
                let slot = next.entry(entry.partition).or_insert(0);
                *slot = (*slot).max(entry.offset + 1);
            }
            Err(e) => warn!(error = %e, "skipping unreadable log line"),
        }
    }
    Ok(next)
}

impl BrokerTransport for FileLogBroker {
    fn name(&self) -> &str {
        "file"
    }

    fn submit(&self, message: Message, reporter: DeliveryReporter) -> Result<(), SubmitError> {
        let queue = lock(&self.queue);
        let Some(tx) = queue.as_ref() else {
            return Err(SubmitError::new(DeliveryError::Closed, message, reporter));
        };

        let size = message.size();
        if size > self.max_message_bytes {
            let error = DeliveryError::MessageTooLarge {
                size,
                max: self.max_message_bytes,
            };
            return Err(SubmitError::new(error, message, reporter));
        }

        tx.try_send((message, reporter)).map_err(|e| match e {
            mpsc::error::TrySendError::Full((message, reporter)) => SubmitError::new(
                DeliveryError::QueueFull {
                    capacity: self.buffer_capacity,
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
            debug!(path = %self.path.display(), "file broker closed");
        }
    }
}

fn log_line(message: &Message, position: LogPosition) -> Result<Vec<u8>, DeliveryError> {
    let body = serde_json::from_slice(&message.payload).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&message.payload).into_owned())
    });
    let line = LogLine {
        topic: message.topic.clone(),
        partition: position.partition,
        offset: position.offset,
        key: message.key.clone(),
        headers: message.headers.clone(),
        body,
    };
    let mut bytes = serde_json::to_vec(&line).map_err(|e| DeliveryError::invalid(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[instrument(name = "file_broker_write", skip_all)]
async fn write_loop<W: LogFile>(
    mut rx: mpsc::Receiver<Pending>,
    mut log: W,
    partitions: u32,
    mut next_offsets: HashMap<i32, i64>,
    mut committed: u64,
) {
    let mut batch: Vec<Pending> = Vec::with_capacity(MAX_WRITE_BATCH);
    let mut positions: Vec<Option<LogPosition>> = Vec::with_capacity(MAX_WRITE_BATCH);
    let mut buf = Vec::new();
    // Set when a failed batch could not be cut back out of the file
    let mut poisoned: Option<String> = None;

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_WRITE_BATCH {
            match rx.try_recv() {
                Ok(next) => batch.push(next),
                Err(_) => break,
            }
        }

        let write_error = match poisoned.clone() {
            Some(reason) => Some(format!("log unusable after failed rollback: {reason}")),
            None => {
                // Offsets are staged and only committed with the bytes
                let mut staged = next_offsets.clone();
                buf.clear();
                for (message, _) in &batch {
                    let partition = partition_for(&message.key, partitions);
                    let offset = staged.get(&partition).copied().unwrap_or(0);
                    let position = LogPosition { partition, offset };
                    match log_line(message, position) {
                        Ok(bytes) => {
                            buf.extend_from_slice(&bytes);
                            staged.insert(partition, offset + 1);
                            positions.push(Some(position));
                        }
                        Err(e) => {
                            warn!(key = %message.key, error = %e, "message could not be encoded");
                            positions.push(None);
                        }
                    }
                }

                match append(&mut log, &buf).await {
                    Ok(()) => {
                        committed += buf.len() as u64;
                        next_offsets = staged;
                        None
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            batch = batch.len(),
                            "log write failed, rolling back batch"
                        );
                        if let Err(rollback) = log.truncate(committed).await {
                            error!(
                                error = %rollback,
                                "log rollback failed, rejecting further writes"
                            );
                            poisoned = Some(rollback.to_string());
                        }
                        Some(e.to_string())
                    }
                }
            }
        };

        positions.resize(batch.len(), None);
        for ((message, reporter), position) in batch.drain(..).zip(positions.drain(..)) {
            let result = match (&write_error, position) {
                (Some(e), _) => Err(DeliveryError::transport(format!("log write failed: {e}"))),
                (None, Some(position)) => Ok(position),
                (None, None) => Err(DeliveryError::invalid(format!(
                    "message '{}' could not be encoded",
                    message.key
                ))),
            };
            reporter.report(result).await;
        }
    }

    if let Err(e) = log.flush().await {
        error!(error = %e, "final log flush failed");
    }
    debug!("file broker writer finished");
}

async fn append<W: LogFile>(log: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    log.write_all(bytes).await?;
    log.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DeliveryClient;
    use bytes::Bytes;
    use contracts::MessageId;
    use std::time::Duration;

    fn config(path: PathBuf) -> FileLogConfig {
        FileLogConfig {
            path,
            partitions: 3,
            buffer_capacity: 64,
            max_message_bytes: 4096,
        }
    }

    fn message(key: &str) -> Message {
        Message {
            topic: "detections".to_string(),
            key: key.to_string(),
            payload: Bytes::from(format!(r#"{{"detection_id":"{key}"}}"#)),
            headers: vec![Header::new("vehicle_id", "vehicle-001")],
        }
    }

    fn read_lines(path: &Path) -> Vec<LogLine> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_ack_after_line_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log/detections.jsonl");
        let broker = std::sync::Arc::new(FileLogBroker::open(config(path.clone())).unwrap());
        let (client, mut events) = DeliveryClient::new(broker, 16);

        for i in 0..5 {
            client.send(message(&format!("k{i}")), MessageId(i)).unwrap();
        }
        for _ in 0..5 {
            assert!(events.recv().await.unwrap().is_ack());
        }
        assert_eq!(client.flush(Duration::from_secs(1)).await, 0);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].key, "k0");
        assert_eq!(lines[0].headers[0].value, "vehicle-001");
        assert_eq!(lines[0].body["detection_id"], "k0");
    }

    #[tokio::test]
    async fn test_offsets_resume_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.jsonl");

        for round in 0..2u64 {
            let broker = std::sync::Arc::new(FileLogBroker::open(config(path.clone())).unwrap());
            let (client, mut events) = DeliveryClient::new(broker, 16);
            client
                .send(message("same-key"), MessageId(round))
                .unwrap();
            let event = events.recv().await.unwrap();
            assert_eq!(event.position.unwrap().offset, round as i64);
            client.close();
        }

        assert_eq!(read_lines(&path).len(), 2);
    }

    /// In-memory log that fails once its write budget is used up
    #[derive(Clone, Default)]
    struct FlakyLog {
        state: std::sync::Arc<Mutex<FlakyState>>,
    }

    #[derive(Default)]
    struct FlakyState {
        data: Vec<u8>,
        write_budget: Option<usize>,
        fail_truncate: bool,
    }

    impl FlakyLog {
        fn set_budget(&self, budget: Option<usize>) {
            lock(&self.state).write_budget = budget;
        }

        fn contents(&self) -> String {
            String::from_utf8(lock(&self.state).data.clone()).unwrap()
        }
    }

    impl AsyncWrite for FlakyLog {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            let mut state = lock(&self.state);
            let n = match state.write_budget {
                Some(0) => {
                    return std::task::Poll::Ready(Err(std::io::Error::other("disk full")))
                }
                Some(budget) => budget.min(buf.len()),
                None => buf.len(),
            };
            if let Some(budget) = state.write_budget.as_mut() {
                *budget -= n;
            }
            state.data.extend_from_slice(&buf[..n]);
            std::task::Poll::Ready(Ok(n))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    impl LogFile for FlakyLog {
        async fn truncate(&mut self, len: u64) -> std::io::Result<()> {
            let mut state = lock(&self.state);
            if state.fail_truncate {
                return Err(std::io::Error::other("read-only"));
            }
            state.data.truncate(len as usize);
            Ok(())
        }
    }

    fn flaky_client(log: &FlakyLog) -> (DeliveryClient, crate::DeliveryEvents) {
        let broker = FileLogBroker::with_log(
            config(PathBuf::from("flaky.jsonl")),
            log.clone(),
            HashMap::new(),
            0,
        );
        DeliveryClient::new(std::sync::Arc::new(broker), 16)
    }

    #[tokio::test]
    async fn test_failed_batch_is_rolled_back() {
        let log = FlakyLog::default();
        log.set_budget(Some(50));
        let (client, mut events) = flaky_client(&log);

        for i in 0..3 {
            client.send(message(&format!("k{i}")), MessageId(i)).unwrap();
        }
        for _ in 0..3 {
            let event = events.recv().await.unwrap();
            assert!(matches!(event.result, Err(DeliveryError::Transport { .. })));
        }
        // The partial write was cut back out
        assert_eq!(log.contents(), "");

        log.set_budget(None);
        client.send(message("after"), MessageId(10)).unwrap();
        let event = events.recv().await.unwrap();
        assert!(event.is_ack());
        assert_eq!(event.position.unwrap().offset, 0);

        let contents = log.contents();
        let lines: Vec<LogLine> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].key, "after");
        assert_eq!(lines[0].offset, 0);
    }

    #[tokio::test]
    async fn test_failed_rollback_rejects_later_writes() {
        let log = FlakyLog::default();
        log.set_budget(Some(10));
        lock(&log.state).fail_truncate = true;
        let (client, mut events) = flaky_client(&log);

        client.send(message("torn"), MessageId(1)).unwrap();
        assert!(!events.recv().await.unwrap().is_ack());

        // Writes work again, but the torn bytes could not be removed
        log.set_budget(None);
        client.send(message("later"), MessageId(2)).unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event.result, Err(DeliveryError::Transport { .. })));
        assert_eq!(log.contents().len(), 10);
    }

    #[tokio::test]
    async fn test_torn_tail_repaired_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.jsonl");
        let intact = serde_json::to_string(&LogLine {
            topic: "detections".to_string(),
            partition: partition_for("same-key", 3),
            offset: 0,
            key: "same-key".to_string(),
            headers: vec![],
            body: serde_json::Value::Null,
        })
        .unwrap();
        std::fs::write(&path, format!("{intact}\n{{\"topic\":\"detec")).unwrap();

        let broker = std::sync::Arc::new(FileLogBroker::open(config(path.clone())).unwrap());
        let (client, mut events) = DeliveryClient::new(broker, 16);
        client.send(message("same-key"), MessageId(1)).unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.position.unwrap().offset, 1);
        client.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        let last: LogLine = serde_json::from_str(contents.lines().last().unwrap()).unwrap();
        assert_eq!(last.key, "same-key");
        assert_eq!(last.offset, 1);
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_oversized_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path().join("d.jsonl"));
        cfg.max_message_bytes = 16;
        let broker = std::sync::Arc::new(FileLogBroker::open(cfg).unwrap());
        let (client, _events) = DeliveryClient::new(broker, 16);

        let err = client.send(message("too-big"), MessageId(1)).unwrap_err();
        assert!(matches!(err.error, DeliveryError::MessageTooLarge { .. }));
    }
}
