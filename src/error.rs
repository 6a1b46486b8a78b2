//! 配置错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 同步器配置错误（启动阶段即失败，不会进入同步循环）
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("batch size must be positive, got {0}")]
    InvalidBatchSize(usize),
    #[error("only one of the file name wildcard or file name regex can be specified")]
    ConflictingFilters,
    #[error("invalid file name pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("`{}` is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("directory `{}` does not exist and directory creation is disabled", .0.display())]
    DirectoryMissing(PathBuf),
    #[error("file name must be non empty")]
    EmptyFileName,
    #[error("listener list must be non empty")]
    NoListeners,
    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),
}
