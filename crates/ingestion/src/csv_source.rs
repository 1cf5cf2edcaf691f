//! CSV 检测数据源
//!
//! 表头映射列名；像素坐标取 `u`/`v`，或 `bbox_x1/y1/x2/y2` 的中心点。
//! 解析失败的行记 warn 日志、计数后丢弃，不中断读取。

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use contracts::{DetectionPayload, DetectionRecord, GpsFix};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{info, warn};

use crate::error::{IngestionError, Result};
use crate::metrics::SourceMetrics;
use crate::source::RecordSource;

/// 每读取多少条记录输出一次进度
const PROGRESS_EVERY: u64 = 10_000;

/// 像素坐标列
#[derive(Debug, Clone, Copy)]
enum PixelColumns {
    Centroid { u: usize, v: usize },
    BoundingBox { x1: usize, y1: usize, x2: usize, y2: usize },
}

/// 表头列索引
#[derive(Debug, Clone)]
struct ColumnMap {
    frame_number: usize,
    timestamp_sec: usize,
    pixel: PixelColumns,
    confidence: usize,
    class_name: usize,
    video_name: Option<usize>,
    vehicle_lat: Option<usize>,
    vehicle_lon: Option<usize>,
    heading: Option<usize>,
    recording_timestamp: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> std::result::Result<Self, String> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| find(name).ok_or_else(|| format!("missing column '{name}'"));

        let pixel = match (find("u"), find("v")) {
            (Some(u), Some(v)) => PixelColumns::Centroid { u, v },
            _ => match (
                find("bbox_x1"),
                find("bbox_y1"),
                find("bbox_x2"),
                find("bbox_y2"),
            ) {
                (Some(x1), Some(y1), Some(x2), Some(y2)) => {
                    PixelColumns::BoundingBox { x1, y1, x2, y2 }
                }
                _ => {
                    return Err(
                        "missing pixel coordinates (expected u/v or bbox_x1/y1/x2/y2)".to_string(),
                    )
                }
            },
        };

        Ok(Self {
            frame_number: require("frame_number")?,
            timestamp_sec: require("timestamp_sec")?,
            pixel,
            confidence: require("confidence")?,
            class_name: require("class_name")?,
            video_name: find("video_name"),
            vehicle_lat: find("vehicle_lat"),
            vehicle_lon: find("vehicle_lon"),
            heading: find("heading"),
            recording_timestamp: find("recording_timestamp"),
        })
    }

    /// 解析一行；错误时返回原因
    fn parse(&self, row: &StringRecord) -> std::result::Result<DetectionPayload, String> {
        let frame_number: u64 = required(row, self.frame_number, "frame_number")?
            .parse()
            .map_err(|e| format!("invalid frame_number: {e}"))?;

        let timestamp_sec = number(row, self.timestamp_sec, "timestamp_sec")?;
        if timestamp_sec < 0.0 {
            return Err(format!("negative timestamp_sec: {timestamp_sec}"));
        }

        let (pixel_u, pixel_v) = match self.pixel {
            PixelColumns::Centroid { u, v } => (number(row, u, "u")?, number(row, v, "v")?),
            PixelColumns::BoundingBox { x1, y1, x2, y2 } => {
                let x1 = number(row, x1, "bbox_x1")?;
                let y1 = number(row, y1, "bbox_y1")?;
                let x2 = number(row, x2, "bbox_x2")?;
                let y2 = number(row, y2, "bbox_y2")?;
                ((x1 + x2) / 2.0, (y1 + y2) / 2.0)
            }
        };

        let confidence = number(row, self.confidence, "confidence")?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence out of range: {confidence}"));
        }

        let class_name = required(row, self.class_name, "class_name")?.to_string();

        Ok(DetectionPayload {
            frame_number,
            timestamp_sec,
            pixel_u,
            pixel_v,
            confidence,
            class_name,
            video_name: optional(row, self.video_name).map(str::to_string),
            gps: GpsFix {
                vehicle_lat: optional_number(row, self.vehicle_lat),
                vehicle_lon: optional_number(row, self.vehicle_lon),
                heading: optional_number(row, self.heading),
                recording_timestamp: optional(row, self.recording_timestamp)
                    .map(str::to_string),
            },
        })
    }
}

fn required<'r>(
    row: &'r StringRecord,
    idx: usize,
    name: &str,
) -> std::result::Result<&'r str, String> {
    match row.get(idx) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(format!("missing {name}")),
    }
}

fn number(row: &StringRecord, idx: usize, name: &str) -> std::result::Result<f64, String> {
    let value: f64 = required(row, idx, name)?
        .parse()
        .map_err(|e| format!("invalid {name}: {e}"))?;
    if !value.is_finite() {
        return Err(format!("non-finite {name}"));
    }
    Ok(value)
}

fn optional(row: &StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| row.get(i)).filter(|v| !v.is_empty())
}

/// GPS 字段解析失败视为缺失
fn optional_number(row: &StringRecord, idx: Option<usize>) -> Option<f64> {
    optional(row, idx)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// CSV 数据源
///
/// 每条有效记录在读取时生成 detection id 并打上 vehicle/session 标识。
pub struct CsvRecordSource<R = File> {
    name: String,
    reader: csv::Reader<R>,
    columns: ColumnMap,
    vehicle_id: String,
    session_id: String,
    row: StringRecord,
    metrics: Arc<SourceMetrics>,
    started: Instant,
    finished: bool,
}

impl CsvRecordSource<File> {
    /// 打开 CSV 文件并解析表头
    ///
    /// 文件无法打开或表头不完整时返回错误。
    pub fn open(
        path: &Path,
        vehicle_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self> {
        let file = File::open(path).map_err(|source| IngestionError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(path.display().to_string(), file, vehicle_id, session_id)
    }
}

impl<R: Read + Send> CsvRecordSource<R> {
    /// 从任意 reader 构建
    pub fn from_reader(
        name: impl Into<String>,
        reader: R,
        vehicle_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| IngestionError::header(&name, e.to_string()))?
            .clone();
        let columns =
            ColumnMap::from_headers(&headers).map_err(|m| IngestionError::header(&name, m))?;

        info!(source = %name, columns = ?headers.iter().collect::<Vec<_>>(), "csv header parsed");

        Ok(Self {
            name,
            reader,
            columns,
            vehicle_id: vehicle_id.into(),
            session_id: session_id.into(),
            row: StringRecord::new(),
            metrics: Arc::new(SourceMetrics::new()),
            started: Instant::now(),
            finished: false,
        })
    }

    fn drop_row(&self, line: u64, reason: &str) {
        warn!(source = %self.name, line, reason, "dropping malformed row");
        self.metrics.record_dropped(&self.name);
    }

    fn log_progress(&self, emitted: u64) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            emitted as f64 / elapsed
        } else {
            0.0
        };
        info!(source = %self.name, records = emitted, rate = %format!("{rate:.2}"), "streaming progress");
    }

    fn finish(&mut self) {
        self.finished = true;
        let snapshot = self.metrics.snapshot();
        info!(
            source = %self.name,
            records = snapshot.records_emitted,
            dropped = snapshot.rows_dropped,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "csv source exhausted"
        );
    }
}

impl<R: Read + Send> RecordSource for CsvRecordSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_record(&mut self) -> Result<Option<DetectionRecord>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            match self.reader.read_record(&mut self.row) {
                Ok(true) => {}
                Ok(false) => {
                    self.finish();
                    return Ok(None);
                }
                Err(e) if e.is_io_error() => {
                    return Err(IngestionError::read(&self.name, e.to_string()));
                }
                Err(e) => {
                    self.metrics.record_read();
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    self.drop_row(line, &e.to_string());
                    continue;
                }
            }

            self.metrics.record_read();
            let line = self.row.position().map(|p| p.line()).unwrap_or(0);

            match self.columns.parse(&self.row) {
                Ok(payload) => {
                    let record = DetectionRecord::ingest(
                        payload,
                        self.vehicle_id.clone(),
                        self.session_id.clone(),
                    );
                    self.metrics.record_emitted();
                    let emitted = self.metrics.snapshot().records_emitted;
                    if emitted % PROGRESS_EVERY == 0 {
                        self.log_progress(emitted);
                    }
                    return Ok(Some(record));
                }
                Err(reason) => self.drop_row(line, &reason),
            }
        }
    }

    fn metrics(&self) -> Arc<SourceMetrics> {
        self.metrics.clone()
    }
}
