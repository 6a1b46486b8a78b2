pub mod local;
pub mod memory;
pub mod s3;

use crate::config::{StoreConfig, StoreType};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, list 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read 等
pub const IO_TIMEOUT_SECS: u64 = 300;
/// 路径分隔符，同时表示桶根目录
pub const PATH_SEPARATOR: &str = "/";
/// 分片上传时由上传方附带的完整内容 MD5（base64 编码）
pub const CONTENT_MD5: &str = "Content-MD5";

/// 列表返回的对象摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub bucket: String,
    /// 相对于桶的完整 key，以 / 分隔
    pub key: String,
    /// ETag（已去掉引号）
    pub etag: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// 一页列表结果
#[derive(Debug, Clone, Default)]
pub struct ObjectListing {
    pub summaries: Vec<ObjectSummary>,
    /// 下一页的起始标记，None 表示已经列完
    pub next_marker: Option<String>,
}

/// 对象内容流
pub type ContentStream = Pin<Box<dyn AsyncRead + Send>>;

/// 获取到的远程对象（内容只能被消费一次）
pub struct RemoteObject {
    pub content: ContentStream,
    pub user_metadata: HashMap<String, String>,
}

impl RemoteObject {
    pub fn new(content: ContentStream, user_metadata: HashMap<String, String>) -> Self {
        Self {
            content,
            user_metadata,
        }
    }

    /// 上传方附带的 Content-MD5（base64）
    pub fn content_md5(&self) -> Option<&str> {
        self.user_metadata.get(CONTENT_MD5).map(String::as_str)
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("user_metadata", &self.user_metadata)
            .finish_non_exhaustive()
    }
}

/// 远程对象存储抽象接口（路径均相对于桶）
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 分页列出对象，没有任何对象时返回 None
    async fn list_objects(
        &self,
        bucket: &str,
        folder: Option<&str>,
        marker: Option<&str>,
        page_size: usize,
    ) -> Result<Option<ObjectListing>>;

    /// 获取对象，folder 为 "/" 时 key 已是完整路径；对象不存在返回 None
    async fn get_object(&self, bucket: &str, folder: &str, key: &str)
        -> Result<Option<RemoteObject>>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 将 folder 转为列表前缀："/" 或空表示桶根目录，去掉开头的 /
pub fn list_prefix(folder: Option<&str>) -> Option<String> {
    let folder = folder?.trim();
    if folder.is_empty() || folder == PATH_SEPARATOR {
        return None;
    }
    Some(folder.trim_start_matches('/').to_string())
}

/// 拼接 folder 与对象名得到完整 key
pub fn object_key(folder: Option<&str>, name: &str) -> String {
    let name = name.strip_prefix('/').unwrap_or(name);
    match list_prefix(folder) {
        Some(prefix) if prefix.ends_with('/') => format!("{}{}", prefix, name),
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name.to_string(),
    }
}

/// 按 key 排序后截取 marker 之后的一页，page_size 为 0 表示不限制
pub(crate) fn paginate(
    mut summaries: Vec<ObjectSummary>,
    prefix: Option<&str>,
    marker: Option<&str>,
    page_size: usize,
) -> Option<ObjectListing> {
    summaries.retain(|s| {
        prefix.map_or(true, |p| s.key.starts_with(p)) && marker.map_or(true, |m| s.key.as_str() > m)
    });
    if summaries.is_empty() {
        return None;
    }
    summaries.sort_by(|a, b| a.key.cmp(&b.key));

    let truncated = page_size > 0 && summaries.len() > page_size;
    if truncated {
        summaries.truncate(page_size);
    }
    let next_marker = if truncated {
        summaries.last().map(|s| s.key.clone())
    } else {
        None
    };

    Some(ObjectListing {
        summaries,
        next_marker,
    })
}

/// 根据配置创建存储实例
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn RemoteStore>> {
    match config.typ {
        StoreType::Local => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Local store requires path"))?;
            tracing::info!("初始化本地对象存储: {}", path);
            Ok(Arc::new(LocalObjectStore::new(path)?) as Arc<dyn RemoteStore>)
        }
        StoreType::S3 => {
            let region = config
                .region
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 store requires region"))?;
            let access_key = config
                .access_key
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 store requires accessKey"))?;
            let secret_key = config
                .secret_key
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("S3 store requires secretKey"))?;
            tracing::info!("初始化S3存储: region={}, endpoint={:?}", region, config.endpoint);
            Ok(Arc::new(S3ObjectStore::new(
                region,
                access_key,
                secret_key,
                config.endpoint.clone(),
            )) as Arc<dyn RemoteStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_prefix() {
        assert_eq!(list_prefix(None), None);
        assert_eq!(list_prefix(Some("/")), None);
        assert_eq!(list_prefix(Some("  ")), None);
        assert_eq!(list_prefix(Some("/sub/")), Some("sub/".to_string()));
        assert_eq!(list_prefix(Some("sub")), Some("sub".to_string()));
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key(Some("/"), "sub1/test.txt"), "sub1/test.txt");
        assert_eq!(object_key(None, "/test.txt"), "test.txt");
        assert_eq!(object_key(Some("sub"), "test.txt"), "sub/test.txt");
        assert_eq!(object_key(Some("/sub/"), "test.txt"), "sub/test.txt");
    }

    fn summary(key: &str) -> ObjectSummary {
        ObjectSummary {
            bucket: "bucket".to_string(),
            key: key.to_string(),
            etag: String::new(),
            size: 0,
            last_modified: None,
        }
    }

    #[test]
    fn test_paginate_walks_pages_with_marker() {
        let all = vec![summary("c"), summary("a"), summary("b")];

        let first = paginate(all.clone(), None, None, 2).unwrap();
        let keys: Vec<_> = first.summaries.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(first.next_marker.as_deref(), Some("b"));

        let second = paginate(all.clone(), None, Some("b"), 2).unwrap();
        assert_eq!(second.summaries.len(), 1);
        assert_eq!(second.summaries[0].key, "c");
        assert!(second.next_marker.is_none());

        assert!(paginate(all, None, Some("c"), 2).is_none());
    }

    #[test]
    fn test_paginate_filters_prefix() {
        let all = vec![summary("sub/a"), summary("other/b"), summary("sub/c")];
        let page = paginate(all, Some("sub/"), None, 0).unwrap();
        assert_eq!(page.summaries.len(), 2);
        assert!(page.next_marker.is_none());
    }
}
