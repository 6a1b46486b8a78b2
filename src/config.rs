//! 应用配置模块

use crate::core::engine::DEFAULT_BATCH_SIZE;
use crate::core::writer::DEFAULT_TEMP_SUFFIX;
use crate::logging::LogConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// 存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    #[default]
    S3,
    Local,
}

/// 远程存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(rename = "type", default)]
    pub typ: StoreType,
    /// 本地对象存储的根目录（桶为其子目录）
    pub path: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// 自定义 endpoint（MinIO 等兼容服务）
    pub endpoint: Option<String>,
}

/// 同步源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// 本地目标目录
    #[serde(default)]
    pub local_directory: PathBuf,
    #[serde(default)]
    pub bucket: String,
    /// 远程目录，为空或 "/" 表示桶根目录
    #[serde(default)]
    pub remote_folder: Option<String>,
    #[serde(default = "default_temp_suffix")]
    pub temporary_suffix: String,
    #[serde(default = "default_batch_size")]
    pub max_objects_per_batch: usize,
    #[serde(default)]
    pub file_name_wildcard: Option<String>,
    #[serde(default)]
    pub file_name_regex: Option<String>,
    #[serde(default)]
    pub accept_sub_folders: bool,
    /// 两次轮询之间的间隔（秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_temp_suffix() -> String {
    DEFAULT_TEMP_SUFFIX.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_poll_interval() -> u64 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            local_directory: PathBuf::new(),
            bucket: String::new(),
            remote_folder: None,
            temporary_suffix: default_temp_suffix(),
            max_objects_per_batch: default_batch_size(),
            file_name_wildcard: None,
            file_name_regex: None,
            accept_sub_folders: false,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// 完整配置文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SourceConfig,
}

impl AppConfig {
    /// 从配置目录加载，文件不存在时使用默认配置
    pub fn load(config_dir: &Path) -> Result<Self> {
        Self::load_file(&config_dir.join(CONFIG_FILE))
    }

    /// 从指定文件加载，文件不存在时使用默认配置，格式错误则报错
    pub fn load_file(config_file: &Path) -> Result<Self> {
        if !config_file.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(config_file)
            .with_context(|| format!("读取配置文件失败: {:?}", config_file))?;
        serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {:?}", config_file))
    }

    /// 保存到配置目录
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        fs::create_dir_all(config_dir)?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(config_dir.join(CONFIG_FILE), content)?;
        Ok(())
    }
}

/// 默认配置目录
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("bucketsync"))
        .unwrap_or_else(|| PathBuf::from(".bucketsync"))
}
