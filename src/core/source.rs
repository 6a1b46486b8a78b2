//! 同步消息源 - 把同步写入的新文件放入队列，按需拉取

use crate::config::SourceConfig;
use crate::core::engine::{InboundSynchronizer, SyncConfig, SyncReport};
use crate::core::writer::{FileEvent, FileOperation, LocalFileWriter};
use crate::error::SyncError;
use crate::storage::RemoteStore;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// 待处理文件队列容量
pub const QUEUE_CAPACITY: usize = 1024;

/// 同步消息源：队列为空时触发一次同步
pub struct InboundSyncSource {
    synchronizer: InboundSynchronizer,
    local_directory: PathBuf,
    bucket: String,
    remote_folder: Option<String>,
    queue: Mutex<mpsc::Receiver<PathBuf>>,
}

impl InboundSyncSource {
    pub fn new(store: Arc<dyn RemoteStore>, config: &SourceConfig) -> Result<Self, SyncError> {
        validate(config)?;

        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let mut writer = LocalFileWriter::new().with_temp_suffix(&config.temporary_suffix);
        writer.add_listener(Arc::new(move |event: &FileEvent| -> Result<()> {
            if event.operation != FileOperation::Create {
                return Ok(());
            }
            if let Err(e) = sender.try_send(event.file.clone()) {
                // 文件仍在磁盘上，只是不会通过队列通知
                warn!("文件队列已满，丢弃通知: {:?} - {}", event.file, e);
            }
            Ok(())
        }));

        let synchronizer = InboundSynchronizer::new(
            store,
            writer,
            SyncConfig {
                batch_size: config.max_objects_per_batch,
                file_wildcard: config.file_name_wildcard.clone(),
                file_regex: config.file_name_regex.clone(),
                accept_subfolders: config.accept_sub_folders,
            },
        )?;

        Ok(Self {
            synchronizer,
            local_directory: config.local_directory.clone(),
            bucket: config.bucket.clone(),
            remote_folder: config.remote_folder.clone(),
            queue: Mutex::new(receiver),
        })
    }

    pub fn local_directory(&self) -> &Path {
        &self.local_directory
    }

    pub fn synchronizer(&self) -> &InboundSynchronizer {
        &self.synchronizer
    }

    /// 执行一次同步
    pub async fn synchronize(&self) -> Result<SyncReport> {
        self.synchronizer
            .synchronize_to_local_directory(
                &self.local_directory,
                &self.bucket,
                self.remote_folder.as_deref(),
            )
            .await
    }

    /// 取出下一个新文件；队列为空时先同步一次再取，仍为空返回 None
    /// 同步期间不持有队列锁，并发调用会得到同步器的 Skipped 而不是排队等待。
    pub async fn receive(&self) -> Result<Option<PathBuf>> {
        if let Some(file) = self.pop().await {
            return Ok(Some(file));
        }

        let report = self.synchronize().await?;
        debug!("同步后队列检查: 写入 {} 个文件", report.files_written);

        Ok(self.pop().await)
    }

    async fn pop(&self) -> Option<PathBuf> {
        self.queue.lock().await.try_recv().ok()
    }
}

/// 启动前检查配置
fn validate(config: &SourceConfig) -> Result<(), SyncError> {
    if config.bucket.trim().is_empty() {
        return Err(SyncError::InvalidConfig("bucket must be specified".to_string()));
    }
    if config.temporary_suffix.trim().is_empty() {
        return Err(SyncError::InvalidConfig(
            "temporary suffix must be non empty".to_string(),
        ));
    }
    if config.max_objects_per_batch == 0 {
        return Err(SyncError::InvalidBatchSize(config.max_objects_per_batch));
    }

    let has_wildcard = config
        .file_name_wildcard
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    let has_regex = config
        .file_name_regex
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    if has_wildcard && has_regex {
        return Err(SyncError::ConflictingFilters);
    }

    let dir = &config.local_directory;
    if !dir.exists() {
        return Err(SyncError::DirectoryMissing(dir.clone()));
    }
    if !dir.is_dir() {
        return Err(SyncError::NotADirectory(dir.clone()));
    }
    Ok(())
}
