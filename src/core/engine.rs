use crate::core::detector::{ChangeDecision, ChangeDetector};
use crate::core::filter::{LeafMatcher, NameFilter};
use crate::core::writer::LocalFileWriter;
use crate::error::SyncError;
use crate::storage::{ObjectSummary, RemoteStore, PATH_SEPARATOR};
use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 默认每批列出的对象数
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 每次列表请求的最大对象数
    pub batch_size: usize,
    /// 文件名通配符（与正则互斥）
    pub file_wildcard: Option<String>,
    /// 文件名正则（与通配符互斥）
    pub file_regex: Option<String>,
    /// 是否同步子目录
    pub accept_subfolders: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            file_wildcard: None,
            file_regex: None,
            accept_subfolders: false,
        }
    }
}

/// 同步结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Completed,
    /// 已有同步在运行，本次直接返回
    Skipped,
}

/// 同步报告
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub pages: u32,
    pub objects_listed: u32,
    pub files_accepted: u32,
    pub files_written: u32,
    pub files_unchanged: u32,
    pub files_failed: u32,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(status: SyncStatus) -> Self {
        Self {
            status,
            pages: 0,
            objects_listed: 0,
            files_accepted: 0,
            files_written: 0,
            files_unchanged: 0,
            files_failed: 0,
            duration_ms: 0,
        }
    }

    pub fn skipped() -> Self {
        Self::new(SyncStatus::Skipped)
    }

    pub fn is_skipped(&self) -> bool {
        self.status == SyncStatus::Skipped
    }
}

/// 对象在本地的目标位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTarget {
    pub directory: PathBuf,
    pub file_name: String,
}

impl LocalTarget {
    /// 按 / 拆分 key：前面的段作为嵌套目录，最后一段作为文件名。
    /// 含有 . 或 .. 段的 key 会逃出本地根目录，返回 None。
    pub fn resolve(local_root: &Path, key: &str) -> Option<Self> {
        let mut segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        let file_name = segments.pop()?;

        let mut directory = local_root.to_path_buf();
        for segment in segments.iter().chain(std::iter::once(&file_name)) {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => {}
                _ => return None,
            }
        }
        for segment in segments {
            directory.push(segment);
        }

        Some(Self {
            directory,
            file_name: file_name.to_string(),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// 单个对象的处理结果
enum ObjectOutcome {
    Written,
    Unchanged,
}

/// 远程桶到本地目录的增量同步器
pub struct InboundSynchronizer {
    store: Arc<dyn RemoteStore>,
    writer: LocalFileWriter,
    filter: NameFilter,
    detector: ChangeDetector,
    batch_size: usize,
    running: AtomicBool,
}

impl InboundSynchronizer {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        mut writer: LocalFileWriter,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        if config.batch_size == 0 {
            return Err(SyncError::InvalidBatchSize(config.batch_size));
        }

        let matcher =
            LeafMatcher::from_options(config.file_wildcard.as_deref(), config.file_regex.as_deref())?;

        // 同步子目录时需要在本地创建对应目录
        if config.accept_subfolders {
            writer.set_create_dirs(true);
        }

        Ok(Self {
            store,
            writer,
            filter: NameFilter::new(matcher, config.accept_subfolders),
            detector: ChangeDetector::new(),
            batch_size: config.batch_size,
            running: AtomicBool::new(false),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn writer(&self) -> &LocalFileWriter {
        &self.writer
    }

    /// 当前是否有同步在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 将 bucket/remote_folder 下的对象同步到 local_dir。
    /// 已有同步在运行时直接返回 Skipped，不会排队等待。
    pub async fn synchronize_to_local_directory(
        &self,
        local_dir: &Path,
        bucket: &str,
        remote_folder: Option<&str>,
    ) -> Result<SyncReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("同步已在进行中，跳过本次请求");
            return Ok(SyncReport::skipped());
        }
        scopeguard::defer! {
            self.running.store(false, Ordering::SeqCst);
        }

        info!(
            "开始同步: {} bucket={}, folder={:?} -> {:?}",
            self.store.name(),
            bucket,
            remote_folder,
            local_dir
        );
        let started = Instant::now();

        let policy = self.filter.policy(remote_folder);
        let mut report = SyncReport::new(SyncStatus::Completed);
        let mut marker: Option<String> = None;

        loop {
            let listing = self
                .store
                .list_objects(bucket, policy.folder(), marker.as_deref(), self.batch_size)
                .await
                .with_context(|| format!("列出对象失败: bucket={}, marker={:?}", bucket, marker))?;

            // 没有需要同步的对象
            let Some(listing) = listing else {
                break;
            };
            report.pages += 1;
            debug!(
                "第 {} 页: {} 个对象, next_marker={:?}",
                report.pages,
                listing.summaries.len(),
                listing.next_marker
            );

            for summary in &listing.summaries {
                report.objects_listed += 1;
                if summary.key.ends_with('/') || !self.filter.accept(&summary.key, &policy) {
                    continue;
                }
                report.files_accepted += 1;

                match self.synchronize_object(local_dir, bucket, summary).await {
                    Ok(Some(ObjectOutcome::Written)) => report.files_written += 1,
                    Ok(Some(ObjectOutcome::Unchanged)) => report.files_unchanged += 1,
                    Ok(None) => {}
                    Err(e) => {
                        // 单个对象失败不影响本批次其他对象
                        error!("同步对象失败: {} - {:#}", summary.key, e);
                        report.files_failed += 1;
                    }
                }
            }

            marker = listing.next_marker;
            if marker.is_none() {
                break;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "同步完成: 列出 {}, 写入 {}, 未变化 {}, 失败 {} ({}ms)",
            report.objects_listed,
            report.files_written,
            report.files_unchanged,
            report.files_failed,
            report.duration_ms
        );

        Ok(report)
    }

    /// 同步单个对象，返回 None 表示对象被跳过
    async fn synchronize_object(
        &self,
        local_dir: &Path,
        bucket: &str,
        summary: &ObjectSummary,
    ) -> Result<Option<ObjectOutcome>> {
        let key = &summary.key;
        let Some(target) = LocalTarget::resolve(local_dir, key) else {
            warn!("对象 key 无法映射到本地路径，跳过: {}", key);
            return Ok(None);
        };

        // key 相对于桶，因此以根目录获取
        let Some(mut object) = self.store.get_object(bucket, PATH_SEPARATOR, key).await? else {
            warn!("对象在列出后已不存在，跳过: {}", key);
            return Ok(None);
        };

        let content_md5 = object.content_md5().map(str::to_string);
        let local_path = target.path();
        let exists = tokio::fs::try_exists(&local_path).await.unwrap_or(false);

        if exists {
            let decision = self
                .detector
                .detect(&local_path, summary, content_md5.as_deref())
                .await?;
            match decision {
                ChangeDecision::NotAFile => return Ok(None),
                ChangeDecision::Unchanged => return Ok(Some(ObjectOutcome::Unchanged)),
                ChangeDecision::Changed | ChangeDecision::Unverifiable => {
                    debug!("覆盖本地文件: {:?} ({:?})", local_path, decision);
                }
            }
        } else if target.directory != local_dir {
            // 嵌套目录按需创建
            tokio::fs::create_dir_all(&target.directory)
                .await
                .with_context(|| format!("创建目录失败: {:?}", target.directory))?;
        }

        self.writer
            .write(&target.directory, &target.file_name, &mut object.content)
            .await?;
        debug!("写入完成: {} -> {:?}", key, local_path);

        Ok(Some(ObjectOutcome::Written))
    }
}
