//! # Pipeline
//!
//! 管道编排：生命周期、批量 / 流式模式、flush 与最终报告。
//!
//! ## 关闭顺序
//! 停止数据源 → 取消 worker → 等待 worker → `flush(timeout)` → 关闭客户端
//! → Collector 排空剩余回执 → 生成报告
//!
//! ## 使用示例
//!
//! ```ignore
//! let controller = PipelineController::new(config);
//! let shutdown = controller.shutdown_handle();
//! let source = controller.open_source()?;
//! let report = controller.run(source).await?;
//! report.print_summary();
//! ```

mod controller;
mod error;
mod report;
mod shutdown;

pub use controller::PipelineController;
pub use error::{PipelineError, Result};
pub use report::PipelineReport;
pub use shutdown::ShutdownHandle;
