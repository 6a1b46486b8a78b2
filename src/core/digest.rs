//! 内容摘要 - MD5 与 ETag 相关的工具函数

use base64::{engine::general_purpose, Engine as _};
use std::io::{self, Read};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// 读取文件时的缓冲区大小
const HASH_BUFFER_SIZE: usize = 8192;

/// 计算内容的 MD5（小写十六进制）
pub fn calculate_md5(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

/// 流式计算本地文件的 MD5，不会把整个文件读入内存
pub async fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(hex::encode(context.compute().0))
}

/// 同步版本，供 spawn_blocking 中使用
pub fn file_md5_blocking(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(hex::encode(context.compute().0))
}

/// 判断 ETag 是否为单次上传的 MD5：恰好 32 个十六进制字符。
/// 分片上传的 ETag 形如 `<hash>-<分片数>`，不是内容的直接哈希。
pub fn is_single_part_etag(etag: &str) -> bool {
    etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit())
}

/// 将 base64 编码的 Content-MD5 转为十六进制，解码失败返回 None
pub fn content_md5_to_hex(encoded: &str) -> Option<String> {
    let raw = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    Some(hex::encode(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_single_part_etag() {
        assert!(is_single_part_etag("5d41402abc4b2a76b9719d911017c592"));
        assert!(is_single_part_etag("5D41402ABC4B2A76B9719D911017C592"));
        assert!(!is_single_part_etag("5d41402abc4b2a76b9719d911017c592-3"));
        assert!(!is_single_part_etag("5d41402abc4b2a76b9719d911017c59"));
        assert!(!is_single_part_etag("zd41402abc4b2a76b9719d911017c592"));
        assert!(!is_single_part_etag(""));
    }

    #[test]
    fn test_content_md5_to_hex() {
        // md5("hello") 的 base64 形式
        assert_eq!(
            content_md5_to_hex("XUFAKrxLKna5cZ2REBfFkg==").as_deref(),
            Some("5d41402abc4b2a76b9719d911017c592")
        );
        assert!(content_md5_to_hex("not base64!").is_none());
    }

    #[tokio::test]
    async fn test_file_md5_matches_in_memory_hash() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data = vec![7u8; HASH_BUFFER_SIZE * 3 + 11];
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let expected = calculate_md5(&data);
        assert_eq!(file_md5(file.path()).await.unwrap(), expected);
        assert_eq!(file_md5_blocking(file.path()).unwrap(), expected);
    }
}
