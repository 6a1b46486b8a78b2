use super::{list_prefix, object_key, ObjectListing, ObjectSummary, RemoteObject, RemoteStore};
use crate::core::digest::file_md5_blocking;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

/// 以本地目录模拟的对象存储：每个桶是根目录下的一个子目录
pub struct LocalObjectStore {
    base_path: PathBuf,
    name: String,
}

impl LocalObjectStore {
    pub fn new(path: &str) -> Result<Self> {
        let base_path = PathBuf::from(path);
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        let name = format!("local:{}", path);
        Ok(Self { base_path, name })
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }

    /// 遍历桶目录，只保留 prefix 之下、marker 之后的文件，按 key 排序后截取一页。
    /// 返回 (key, 路径) 列表以及页满时的下一页标记，此时尚未读取文件内容。
    fn collect_page(
        bucket_path: &Path,
        prefix: Option<&str>,
        marker: Option<&str>,
        page_size: usize,
    ) -> (Vec<(String, PathBuf)>, Option<String>) {
        let mut entries: Vec<(String, PathBuf)> = WalkDir::new(bucket_path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(bucket_path).ok()?.to_str()?;
                let key = Self::normalize_path(relative);
                let in_prefix = prefix.map_or(true, |p| key.starts_with(p));
                let after_marker = marker.map_or(true, |m| key.as_str() > m);
                (in_prefix && after_marker).then(|| (key, entry.into_path()))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let truncated = page_size > 0 && entries.len() > page_size;
        if truncated {
            entries.truncate(page_size);
        }
        let next_marker = if truncated {
            entries.last().map(|(key, _)| key.clone())
        } else {
            None
        };
        (entries, next_marker)
    }

    /// 为一页文件计算 MD5 并生成摘要，读取失败的文件跳过
    fn summarize(bucket: &str, entries: Vec<(String, PathBuf)>) -> Vec<ObjectSummary> {
        entries
            .into_iter()
            .filter_map(|(key, path)| {
                let metadata = std::fs::metadata(&path).ok()?;
                let etag = match file_md5_blocking(&path) {
                    Ok(md5) => md5,
                    Err(e) => {
                        warn!("计算文件 MD5 失败，跳过: {:?} - {}", path, e);
                        return None;
                    }
                };

                Some(ObjectSummary {
                    bucket: bucket.to_string(),
                    key,
                    etag,
                    size: metadata.len(),
                    last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                })
            })
            .collect()
    }
}

#[async_trait]
impl RemoteStore for LocalObjectStore {
    async fn list_objects(
        &self,
        bucket: &str,
        folder: Option<&str>,
        marker: Option<&str>,
        page_size: usize,
    ) -> Result<Option<ObjectListing>> {
        let bucket_path = self.bucket_path(bucket);
        if !bucket_path.is_dir() {
            return Err(anyhow::anyhow!("bucket `{}` not found in {}", bucket, self.name));
        }

        let bucket_name = bucket.to_string();
        let prefix = list_prefix(folder);
        let marker = marker.map(str::to_string);

        // 使用 spawn_blocking 避免阻塞 async runtime
        let listing = tokio::task::spawn_blocking(move || {
            let (entries, next_marker) =
                Self::collect_page(&bucket_path, prefix.as_deref(), marker.as_deref(), page_size);
            if entries.is_empty() {
                return None;
            }
            Some(ObjectListing {
                summaries: Self::summarize(&bucket_name, entries),
                next_marker,
            })
        })
        .await?;

        Ok(listing)
    }

    async fn get_object(
        &self,
        bucket: &str,
        folder: &str,
        key: &str,
    ) -> Result<Option<RemoteObject>> {
        let full_path = self.bucket_path(bucket).join(object_key(Some(folder), key));

        match fs::File::open(&full_path).await {
            Ok(file) => Ok(Some(RemoteObject::new(Box::pin(file), HashMap::new()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
