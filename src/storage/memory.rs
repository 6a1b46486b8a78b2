//! 内存对象存储 - 用于测试和嵌入场景

use super::{paginate, ObjectListing, ObjectSummary, RemoteObject, RemoteStore, CONTENT_MD5};
use crate::core::digest::calculate_md5;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    user_metadata: HashMap<String, String>,
    last_modified: DateTime<Utc>,
}

/// 内存中的多桶对象存储
pub struct MemoryObjectStore {
    name: String,
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    /// 每次列表前的人为延迟
    list_delay: Option<Duration>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            buckets: RwLock::new(HashMap::new()),
            list_delay: None,
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    /// 设置列表延迟（模拟慢速存储）
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// 以单次上传方式写入对象，ETag 为内容 MD5，返回 ETag
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>) -> String {
        let data = data.into();
        let etag = calculate_md5(&data);
        self.put_with_etag(bucket, key, data, &etag, HashMap::new());
        etag
    }

    /// 以分片上传方式写入对象，可选附带 Content-MD5
    pub fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        parts: usize,
        content_md5: Option<&str>,
    ) {
        let data = data.into();
        let etag = format!("{}-{}", calculate_md5(&data), parts);
        let mut metadata = HashMap::new();
        if let Some(md5) = content_md5 {
            metadata.insert(CONTENT_MD5.to_string(), md5.to_string());
        }
        self.put_with_etag(bucket, key, data, &etag, metadata);
    }

    /// 写入对象并指定 ETag 与用户元数据
    pub fn put_with_etag(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        etag: &str,
        user_metadata: HashMap<String, String>,
    ) {
        let object = StoredObject {
            data: data.into(),
            etag: etag.to_string(),
            user_metadata,
            last_modified: Utc::now(),
        };
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    /// 删除对象
    pub fn remove(&self, bucket: &str, key: &str) -> bool {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets
            .get_mut(bucket)
            .map(|objects| objects.remove(key).is_some())
            .unwrap_or(false)
    }

    /// list_objects 被调用的次数
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// get_object 被调用的次数
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryObjectStore {
    async fn list_objects(
        &self,
        bucket: &str,
        folder: Option<&str>,
        marker: Option<&str>,
        page_size: usize,
    ) -> Result<Option<ObjectListing>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }

        let summaries: Vec<ObjectSummary> = {
            let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
            let Some(objects) = buckets.get(bucket) else {
                return Err(anyhow::anyhow!("bucket `{}` not found", bucket));
            };
            objects
                .iter()
                .map(|(key, object)| ObjectSummary {
                    bucket: bucket.to_string(),
                    key: key.clone(),
                    etag: object.etag.clone(),
                    size: object.data.len() as u64,
                    last_modified: Some(object.last_modified),
                })
                .collect()
        };

        let prefix = super::list_prefix(folder);
        Ok(paginate(summaries, prefix.as_deref(), marker, page_size))
    }

    async fn get_object(
        &self,
        bucket: &str,
        folder: &str,
        key: &str,
    ) -> Result<Option<RemoteObject>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let key = super::object_key(Some(folder), key);

        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        let object = buckets.get(bucket).and_then(|objects| objects.get(&key));

        Ok(object.map(|object| {
            RemoteObject::new(
                Box::pin(Cursor::new(object.data.clone())),
                object.user_metadata.clone(),
            )
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_get_object_returns_content_and_metadata() {
        let store = MemoryObjectStore::new();
        store.put_multipart("bucket", "big.bin", "payload", 3, Some("abc="));

        let mut object = store
            .get_object("bucket", "/", "big.bin")
            .await
            .unwrap()
            .unwrap();
        let mut content = String::new();
        object.content.read_to_string(&mut content).await.unwrap();

        assert_eq!(content, "payload");
        assert_eq!(object.content_md5(), Some("abc="));
        assert!(store.get_object("bucket", "/", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_unknown_bucket_fails() {
        let store = MemoryObjectStore::new();
        assert!(store.list_objects("nope", None, None, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_single_part_etag_is_md5() {
        let store = MemoryObjectStore::new();
        let etag = store.put("bucket", "a.txt", "hello");
        assert_eq!(etag, "5d41402abc4b2a76b9719d911017c592");

        let listing = store
            .list_objects("bucket", Some("/"), None, 100)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listing.summaries[0].etag, etag);
        assert_eq!(listing.summaries[0].size, 5);
    }
}
