//! Ingestion 错误类型

use std::path::PathBuf;

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 数据源无法打开
    #[error("failed to open source {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 表头缺失或不完整
    #[error("invalid header in {source_name}: {message}")]
    Header {
        /// 数据源名称
        source_name: String,
        /// 错误消息
        message: String,
    },

    /// 读取底层数据失败
    #[error("read failed for {source_name}: {message}")]
    Read {
        /// 数据源名称
        source_name: String,
        /// 错误消息
        message: String,
    },

    /// 下游队列已关闭
    #[error("record queue closed for {source_name}")]
    ChannelClosed {
        /// 数据源名称
        source_name: String,
    },

    /// 后台读取任务异常退出
    #[error("source task failed: {0}")]
    Task(String),
}

impl IngestionError {
    pub fn header(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Header {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn read(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Read {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
