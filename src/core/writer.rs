//! 本地文件写入 - 先写临时文件再原子重命名，完成后通知监听者

use crate::error::SyncError;
use anyhow::Result;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// 默认临时文件后缀
pub const DEFAULT_TEMP_SUFFIX: &str = ".writing";
/// 复制缓冲区大小（4KB）
const COPY_BUFFER_SIZE: usize = 4096;

/// 文件操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Create,
}

/// 写入完成事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub operation: FileOperation,
    /// 重命名成功时为最终文件，否则为仍带后缀的临时文件
    pub file: PathBuf,
}

/// 文件事件监听接口
pub trait FileEventHandler: Send + Sync {
    fn on_event(&self, event: &FileEvent) -> Result<()>;
}

impl<F> FileEventHandler for F
where
    F: Fn(&FileEvent) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &FileEvent) -> Result<()> {
        self(event)
    }
}

/// 本地文件写入器
#[derive(Clone)]
pub struct LocalFileWriter {
    temp_suffix: String,
    create_dirs: bool,
    handlers: Vec<Arc<dyn FileEventHandler>>,
}

impl LocalFileWriter {
    pub fn new() -> Self {
        Self {
            temp_suffix: DEFAULT_TEMP_SUFFIX.to_string(),
            create_dirs: false,
            handlers: Vec::new(),
        }
    }

    /// 设置临时后缀，空字符串忽略，缺少开头的 . 时自动补上
    pub fn with_temp_suffix(mut self, suffix: &str) -> Self {
        let suffix = suffix.trim();
        if suffix.is_empty() {
            return self;
        }
        self.temp_suffix = if suffix.starts_with('.') {
            suffix.to_string()
        } else {
            format!(".{}", suffix)
        };
        self
    }

    /// 目录不存在时是否自动创建
    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    pub fn set_create_dirs(&mut self, create_dirs: bool) {
        self.create_dirs = create_dirs;
    }

    pub fn temp_suffix(&self) -> &str {
        &self.temp_suffix
    }

    pub fn create_dirs(&self) -> bool {
        self.create_dirs
    }

    /// 注册监听者
    pub fn add_listener(&mut self, handler: Arc<dyn FileEventHandler>) {
        self.handlers.push(handler);
    }

    /// 替换全部监听者，列表不能为空
    pub fn set_listeners(&mut self, handlers: Vec<Arc<dyn FileEventHandler>>) -> Result<(), SyncError> {
        if handlers.is_empty() {
            return Err(SyncError::NoListeners);
        }
        self.handlers = handlers;
        Ok(())
    }

    /// 检查目标目录，必要时创建
    async fn prepare_directory(&self, directory: &Path) -> Result<()> {
        match fs::metadata(directory).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(SyncError::NotADirectory(directory.to_path_buf()).into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !self.create_dirs {
                    return Err(SyncError::DirectoryMissing(directory.to_path_buf()).into());
                }
                fs::create_dir_all(directory).await?;
                debug!("创建目录: {:?}", directory);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 将 reader 的内容写入 directory/file_name，返回最终文件路径
    pub async fn write<R>(&self, directory: &Path, file_name: &str, reader: &mut R) -> Result<PathBuf>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if file_name.trim().is_empty() {
            return Err(SyncError::EmptyFileName.into());
        }
        self.prepare_directory(directory).await?;

        let temp_path = directory.join(format!("{}{}", file_name, self.temp_suffix));
        let dest_path = directory.join(file_name);

        if let Err(e) = Self::stream_to_file(reader, &temp_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.context(format!("写入临时文件失败: {:?}", temp_path)));
        }

        let result = self.replace(&temp_path, &dest_path).await;

        let event = FileEvent {
            operation: FileOperation::Create,
            file: if result.is_ok() {
                dest_path.clone()
            } else {
                temp_path.clone()
            },
        };
        self.notify(&event);

        result.map(|_| dest_path)
    }

    /// 分块复制到文件，不在内存中保留完整内容
    async fn stream_to_file<R>(reader: &mut R, path: &Path) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let file = fs::File::create(path).await?;
        let mut writer = BufWriter::new(file);
        let mut buffer = [0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await?;
            total += read as u64;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(total)
    }

    /// 用临时文件替换目标文件
    async fn replace(&self, temp_path: &Path, dest_path: &Path) -> Result<()> {
        let dest_exists = fs::try_exists(dest_path).await.unwrap_or(false);

        if dest_exists {
            match fs::remove_file(dest_path).await {
                Ok(()) => {
                    debug!("删除旧文件成功: {:?}", dest_path);
                    Self::rename(temp_path, dest_path).await
                }
                Err(e) => {
                    // 某些平台不允许删除或覆盖，退回到原地覆盖内容
                    warn!("删除旧文件失败，改为覆盖内容: {:?} - {}", dest_path, e);
                    fs::copy(temp_path, dest_path).await?;
                    if let Err(e) = fs::remove_file(temp_path).await {
                        warn!("删除临时文件失败: {:?} - {}", temp_path, e);
                    }
                    Ok(())
                }
            }
        } else {
            Self::rename(temp_path, dest_path).await
        }
    }

    async fn rename(from: &Path, to: &Path) -> Result<()> {
        match fs::rename(from, to).await {
            Ok(()) => {
                debug!("重命名成功: {:?} -> {:?}", from, to);
                Ok(())
            }
            Err(e) => {
                warn!("重命名失败: {:?} -> {:?} - {}", from, to, e);
                Err(e.into())
            }
        }
    }

    /// 依次通知监听者，单个监听者出错不影响其他监听者
    fn notify(&self, event: &FileEvent) {
        for (index, handler) in self.handlers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => info!("通知监听者 #{} 时出错: {}", index, e),
                Err(_) => info!("通知监听者 #{} 时发生 panic", index),
            }
        }
    }
}

impl Default for LocalFileWriter {
    fn default() -> Self {
        Self::new()
    }
}
