//! 日志模块 - 提供文件日志和大小管理功能

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// 日志文件名
pub const LOG_FILE: &str = "bucketsync.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否写入日志文件
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 同时输出到控制台
    #[serde(default = "default_enabled")]
    pub console: bool,
    /// 日志目录，未设置时使用配置目录
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
            console: default_enabled(),
            directory: None,
        }
    }
}

impl LogConfig {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

type SharedWriter = Arc<Mutex<Option<BufWriter<File>>>>;

fn lock(writer: &SharedWriter) -> MutexGuard<'_, Option<BufWriter<File>>> {
    writer.lock().unwrap_or_else(|e| e.into_inner())
}

/// 带大小限制的日志写入器，超出后轮转为 .old
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: SharedWriter,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE);
        let max_size = (max_size_mb as u64) * 1024 * 1024;
        let writer = open_file(&file_path, max_size)?;

        Ok(Self {
            file_path,
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn open_file(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
    // 启动时已超过限制则先轮转
    if let Ok(metadata) = fs::metadata(file_path) {
        if metadata.len() > max_size {
            rotate_log(file_path)?;
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(file_path)?;
    Ok(BufWriter::new(file))
}

/// bucketsync.log -> bucketsync.log.old
fn rotate_log(file_path: &Path) -> io::Result<()> {
    let backup_path = file_path.with_extension("log.old");
    if backup_path.exists() {
        fs::remove_file(&backup_path)?;
    }
    fs::rename(file_path, &backup_path)
}

/// 检查大小并在需要时轮转，调用方持有锁
fn rotate_if_needed(
    guard: &mut MutexGuard<'_, Option<BufWriter<File>>>,
    file_path: &Path,
    max_size: u64,
) {
    let too_large = fs::metadata(file_path)
        .map(|m| m.len() > max_size)
        .unwrap_or(false);
    if !too_large {
        return;
    }

    if let Some(mut w) = guard.take() {
        let _ = w.flush();
    }
    let _ = rotate_log(file_path);
    if let Ok(new_writer) = open_file(file_path, max_size) {
        **guard = Some(new_writer);
    }
}

/// 单次日志写入
pub struct LogWriter {
    inner: SharedWriter,
    file_path: PathBuf,
    max_size: u64,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = lock(&self.inner);
        let Some(writer) = guard.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::Other, "Writer not available"));
        };

        let written = writer.write(buf)?;
        writer.flush()?;
        rotate_if_needed(&mut guard, &self.file_path, self.max_size);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock(&self.inner).as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            inner: self.writer.clone(),
            file_path: self.file_path.clone(),
            max_size: self.max_size,
        }
    }
}

/// 初始化全局日志，RUST_LOG 优先于配置中的级别
pub fn init(config: &LogConfig, default_dir: &Path) -> Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.tracing_level().to_string().to_lowercase()))
    };

    let file_layer = if config.enabled {
        let dir = config.directory.as_deref().unwrap_or(default_dir);
        let writer = SizeRotatingWriter::new(dir, config.max_size_mb)?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter()),
        )
    } else {
        None
    };

    let console_layer = config.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(filter())
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_level() {
        let mut config = LogConfig::default();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
        config.level = "DEBUG".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
        config.level = "verbose".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_writer_rotates_past_limit() {
        let dir = tempfile::tempdir().unwrap();
        // 0MB 表示每次写入后都会轮转
        let rotating = SizeRotatingWriter::new(dir.path(), 0).unwrap();
        assert_eq!(rotating.file_path(), dir.path().join(LOG_FILE));

        let mut writer = rotating.make_writer();
        writer.write_all(b"first line\n").unwrap();
        writer.flush().unwrap();

        let old = dir.path().join("bucketsync.log.old");
        assert_eq!(fs::read_to_string(&old).unwrap(), "first line\n");
        assert_eq!(fs::metadata(dir.path().join(LOG_FILE)).unwrap().len(), 0);
    }

    #[test]
    fn test_writer_appends_below_limit() {
        let dir = tempfile::tempdir().unwrap();
        let rotating = SizeRotatingWriter::new(dir.path(), 1).unwrap();

        rotating.make_writer().write_all(b"a\n").unwrap();
        rotating.make_writer().write_all(b"b\n").unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join(LOG_FILE)).unwrap(),
            "a\nb\n"
        );
        assert!(!dir.path().join("bucketsync.log.old").exists());
    }
}
