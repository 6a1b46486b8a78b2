use super::{
    list_prefix, object_key, ObjectListing, ObjectSummary, RemoteObject, RemoteStore, CONTENT_MD5,
    IO_TIMEOUT_SECS, OP_TIMEOUT_SECS,
};
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::debug;

/// S3 兼容对象存储，每个桶一个 Operator
pub struct S3ObjectStore {
    region: String,
    access_key: String,
    secret_key: String,
    endpoint: Option<String>,
    operators: Mutex<HashMap<String, Operator>>,
    name: String,
}

impl S3ObjectStore {
    pub fn new(
        region: &str,
        access_key: &str,
        secret_key: &str,
        endpoint: Option<String>,
    ) -> Self {
        let name = format!(
            "s3({}{})",
            region,
            endpoint
                .as_deref()
                .map(|ep| format!(", {}", ep))
                .unwrap_or_default()
        );

        Self {
            region: region.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            endpoint,
            operators: Mutex::new(HashMap::new()),
            name,
        }
    }

    /// 获取（必要时创建）桶对应的 Operator
    fn operator(&self, bucket: &str) -> Result<Operator> {
        let mut operators = self.operators.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(op) = operators.get(bucket) {
            return Ok(op.clone());
        }

        use opendal::services::S3;

        let mut builder = S3::default()
            .bucket(bucket)
            .region(&self.region)
            .access_key_id(&self.access_key)
            .secret_access_key(&self.secret_key);

        if let Some(ref ep) = self.endpoint {
            builder = builder.endpoint(ep);
        }

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        debug!("创建S3 Operator: bucket={}", bucket);
        operators.insert(bucket.to_string(), operator.clone());
        Ok(operator)
    }
}

#[async_trait]
impl RemoteStore for S3ObjectStore {
    async fn list_objects(
        &self,
        bucket: &str,
        folder: Option<&str>,
        marker: Option<&str>,
        page_size: usize,
    ) -> Result<Option<ObjectListing>> {
        let op = self.operator(bucket)?;

        // 列表路径必须以 / 结尾才表示目录
        let path = match list_prefix(folder) {
            Some(prefix) if prefix.ends_with('/') => prefix,
            Some(prefix) => format!("{}/", prefix),
            None => String::new(),
        };

        let mut builder = op
            .lister_with(&path)
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Etag | Metakey::Mode);
        if let Some(marker) = marker {
            builder = builder.start_after(marker);
        }
        let mut lister = builder.await?;

        let mut summaries = Vec::new();
        while let Some(entry) = lister.try_next().await? {
            let key = entry.path().trim_start_matches('/').to_string();

            // 跳过列表根目录本身
            if key.is_empty() || key == path {
                continue;
            }

            let meta = entry.metadata();
            summaries.push(ObjectSummary {
                bucket: bucket.to_string(),
                key,
                etag: meta
                    .etag()
                    .map(|s| s.trim_matches('"').to_string())
                    .unwrap_or_default(),
                size: meta.content_length(),
                last_modified: meta.last_modified(),
            });

            if page_size > 0 && summaries.len() >= page_size {
                break;
            }
        }

        if summaries.is_empty() {
            return Ok(None);
        }

        // 页满时可能还有剩余对象，以最后一个 key 作为下一页起点
        let next_marker = if page_size > 0 && summaries.len() >= page_size {
            summaries.last().map(|s| s.key.clone())
        } else {
            None
        };

        Ok(Some(ObjectListing {
            summaries,
            next_marker,
        }))
    }

    async fn get_object(
        &self,
        bucket: &str,
        folder: &str,
        key: &str,
    ) -> Result<Option<RemoteObject>> {
        let op = self.operator(bucket)?;
        let key = object_key(Some(folder), key);

        let meta = match op.stat(&key).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let user_metadata = collect_user_metadata(meta.user_metadata(), meta.content_md5());

        let stream = op
            .reader(&key)
            .await?
            .into_bytes_stream(..)
            .await?;

        Ok(Some(RemoteObject::new(
            Box::pin(StreamReader::new(stream)),
            user_metadata,
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 合并对象的用户元数据（x-amz-meta-*）与响应头中的 Content-MD5。
/// 上传方的哈希通常以 x-amz-meta-content-md5 保存，统一归到 CONTENT_MD5 下。
fn collect_user_metadata(
    user: Option<&HashMap<String, String>>,
    header_md5: Option<&str>,
) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    for (key, value) in user.into_iter().flatten() {
        if key.eq_ignore_ascii_case(CONTENT_MD5) {
            metadata.insert(CONTENT_MD5.to_string(), value.clone());
        } else {
            metadata.insert(key.clone(), value.clone());
        }
    }
    if let Some(md5) = header_md5 {
        metadata
            .entry(CONTENT_MD5.to_string())
            .or_insert_with(|| md5.to_string());
    }
    metadata
}
