//! 变化检测 - 判断远程对象与已有本地文件内容是否不同

use crate::core::digest::{content_md5_to_hex, file_md5, is_single_part_etag};
use crate::storage::ObjectSummary;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};

/// 检测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
    /// 内容相同，无需覆盖
    Unchanged,
    /// 内容不同
    Changed,
    /// 分片上传且没有可用的完整 MD5，无法证明相同
    Unverifiable,
    /// 本地路径不是普通文件（通常是目录）
    NotAFile,
}

impl ChangeDecision {
    pub fn should_overwrite(&self) -> bool {
        matches!(self, ChangeDecision::Changed | ChangeDecision::Unverifiable)
    }
}

/// 变化检测器
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// 比较本地文件与远程对象。单次上传的 ETag 就是内容 MD5，可直接比较；
    /// 分片上传需要依赖上传方附带的 Content-MD5，缺失时一律覆盖。
    pub async fn detect(
        &self,
        local: &Path,
        summary: &ObjectSummary,
        content_md5: Option<&str>,
    ) -> Result<ChangeDecision> {
        let meta = tokio::fs::metadata(local)
            .await
            .with_context(|| format!("读取本地文件信息失败: {:?}", local))?;
        if !meta.is_file() {
            warn!("{:?} 不是普通文件（可能是目录），跳过", local);
            return Ok(ChangeDecision::NotAFile);
        }

        let etag = summary.etag.trim_matches('"');
        let remote_md5 = if is_single_part_etag(etag) {
            etag.to_string()
        } else {
            match content_md5 {
                Some(encoded) => match content_md5_to_hex(encoded) {
                    Some(hex) => hex,
                    None => {
                        warn!("Content-MD5 不是合法的 base64: {} ({})", summary.key, encoded);
                        return Ok(ChangeDecision::Unverifiable);
                    }
                },
                None => {
                    debug!("分片上传对象没有 Content-MD5，强制覆盖: {}", summary.key);
                    return Ok(ChangeDecision::Unverifiable);
                }
            }
        };

        let local_md5 = file_md5(local)
            .await
            .with_context(|| format!("计算本地文件 MD5 失败: {:?}", local))?;

        if local_md5.eq_ignore_ascii_case(&remote_md5) {
            debug!("文件未变化: {}", summary.key);
            Ok(ChangeDecision::Unchanged)
        } else {
            debug!(
                "文件已变化: {} (local={}, remote={})",
                summary.key, local_md5, remote_md5
            );
            Ok(ChangeDecision::Changed)
        }
    }

    /// 是否需要用远程内容覆盖本地文件
    pub async fn should_overwrite(
        &self,
        local: &Path,
        summary: &ObjectSummary,
        content_md5: Option<&str>,
    ) -> Result<bool> {
        Ok(self.detect(local, summary, content_md5).await?.should_overwrite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::digest::calculate_md5;

    fn summary(etag: &str) -> ObjectSummary {
        ObjectSummary {
            bucket: "bucket".to_string(),
            key: "a.txt".to_string(),
            etag: etag.to_string(),
            size: 0,
            last_modified: None,
        }
    }

    #[tokio::test]
    async fn test_single_part_etag_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let detector = ChangeDetector::new();
        let same = summary(&calculate_md5(b"hello"));
        assert_eq!(
            detector.detect(&path, &same, None).await.unwrap(),
            ChangeDecision::Unchanged
        );

        // ETag 带引号时同样可以识别
        let quoted = summary(&format!("\"{}\"", calculate_md5(b"hello")));
        assert!(!detector.should_overwrite(&path, &quoted, None).await.unwrap());

        let different = summary(&calculate_md5(b"world"));
        assert_eq!(
            detector.detect(&path, &different, None).await.unwrap(),
            ChangeDecision::Changed
        );
    }

    #[tokio::test]
    async fn test_multipart_without_md5_always_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let multipart = summary(&format!("{}-2", calculate_md5(b"hello")));
        let decision = ChangeDetector::new()
            .detect(&path, &multipart, None)
            .await
            .unwrap();
        assert_eq!(decision, ChangeDecision::Unverifiable);
        assert!(decision.should_overwrite());
    }

    #[tokio::test]
    async fn test_multipart_uses_content_md5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();
        let multipart = summary("0123456789abcdef-4");
        let detector = ChangeDetector::new();

        // md5("hello") 的 base64
        let same = Some("XUFAKrxLKna5cZ2REBfFkg==");
        assert_eq!(
            detector.detect(&path, &multipart, same).await.unwrap(),
            ChangeDecision::Unchanged
        );

        // md5("") 的 base64
        let different = Some("1B2M2Y8AsgTpgAmY7PhCfg==");
        assert_eq!(
            detector.detect(&path, &multipart, different).await.unwrap(),
            ChangeDecision::Changed
        );

        let broken = Some("%%%");
        assert_eq!(
            detector.detect(&path, &multipart, broken).await.unwrap(),
            ChangeDecision::Unverifiable
        );
    }

    #[tokio::test]
    async fn test_directory_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a.txt");
        std::fs::create_dir(&sub).unwrap();

        let decision = ChangeDetector::new()
            .detect(&sub, &summary("x-1"), None)
            .await
            .unwrap();
        assert_eq!(decision, ChangeDecision::NotAFile);
        assert!(!decision.should_overwrite());
    }

    #[tokio::test]
    async fn test_missing_local_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ChangeDetector::new()
            .detect(&dir.path().join("missing"), &summary("x-1"), None)
            .await;
        assert!(result.is_err());
    }
}
