// 配置管理模块

use crate::error::{BackupError, BackupResult};
use crate::inventory::FilterSpec;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 备份配置
    #[serde(default)]
    pub backup: BackupConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// 从配置文件加载，文件不存在时落回默认配置
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("配置文件不存在: {:?}, 使用默认配置", path);
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        let config: AppConfig =
            toml::from_str(&raw).with_context(|| format!("解析配置文件失败: {:?}", path))?;

        info!("已加载配置文件: {:?}", path);
        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self).context("序列化配置失败")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }
        fs::write(path, raw)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

/// MIME 类型分组
///
/// 面向用户的粗粒度选择，展开成具体的 MIME 类型集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeGroup {
    Images,
    Videos,
    Documents,
    Archives,
    /// 不展开任何类型，等价于不过滤
    Other,
}

impl MimeGroup {
    /// 分组包含的具体 MIME 类型
    pub fn mime_types(&self) -> &'static [&'static str] {
        match self {
            MimeGroup::Images => &["image/jpeg", "image/png", "image/gif", "image/webp"],
            MimeGroup::Videos => &["video/mp4", "video/quicktime", "video/x-matroska"],
            MimeGroup::Documents => &[
                "application/pdf",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/msword",
            ],
            MimeGroup::Archives => &[
                "application/zip",
                "application/x-tar",
                "application/x-7z-compressed",
                "application/x-rar-compressed",
            ],
            MimeGroup::Other => &[],
        }
    }
}

/// 备份配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// 下载根目录
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// 账号标签（拼进目标目录，区分多账号）
    #[serde(default = "default_account_label")]
    pub account_label: String,
    /// 清单文件目录
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,
    /// OAuth 令牌文件路径
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    /// 最小文件大小 (MB)，0 表示不限制
    #[serde(default = "default_min_size_mb")]
    pub min_size_mb: u64,
    /// MIME 分组过滤（空表示不限制）
    #[serde(default)]
    pub mime_groups: Vec<MimeGroup>,
    /// 文件名子串过滤
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
    /// 修改时间下界（YYYY-MM-DD，当天 00:00:00 起算）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_after: Option<String>,
    /// 修改时间上界（YYYY-MM-DD，当天 23:59:59 止）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_before: Option<String>,
    /// 下载分片大小 (MB)
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
    /// 并行工作数（1 为串行）
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// 是否在下载后计算 SHA-256
    #[serde(default = "default_compute_checksum")]
    pub compute_checksum: bool,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_account_label() -> String {
    "primary".to_string()
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("manifests")
}

fn default_token_file() -> PathBuf {
    PathBuf::from("secrets/token.json")
}

fn default_min_size_mb() -> u64 {
    50
}

fn default_chunk_size_mb() -> u64 {
    8
}

fn default_worker_count() -> usize {
    4
}

fn default_compute_checksum() -> bool {
    true
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            account_label: default_account_label(),
            manifest_dir: default_manifest_dir(),
            token_file: default_token_file(),
            min_size_mb: default_min_size_mb(),
            mime_groups: Vec::new(),
            name_contains: None,
            modified_after: None,
            modified_before: None,
            chunk_size_mb: default_chunk_size_mb(),
            worker_count: default_worker_count(),
            compute_checksum: default_compute_checksum(),
        }
    }
}

impl BackupConfig {
    /// 目标目录：下载根目录按账号标签分区
    pub fn dest_dir(&self) -> PathBuf {
        self.download_dir.join(&self.account_label)
    }

    /// 分片大小（字节），至少 1MB
    pub fn chunk_size_bytes(&self) -> usize {
        (self.chunk_size_mb.max(1) as usize) * 1024 * 1024
    }

    /// 由配置面构造过滤条件
    ///
    /// 日期展宽到整天边界后做区间校验，分组展开成 MIME 集合。
    pub fn filter_spec(&self) -> BackupResult<FilterSpec> {
        let mut mime_types: Vec<String> = Vec::new();
        for group in &self.mime_groups {
            for mime in group.mime_types() {
                if !mime_types.iter().any(|m| m == mime) {
                    mime_types.push((*mime).to_string());
                }
            }
        }

        let filter = FilterSpec {
            min_size_bytes: self.min_size_mb * 1024 * 1024,
            mime_types,
            modified_after: self
                .modified_after
                .as_deref()
                .map(|s| parse_day_bound(s, false))
                .transpose()?,
            modified_before: self
                .modified_before
                .as_deref()
                .map(|s| parse_day_bound(s, true))
                .transpose()?,
            name_contains: self
                .name_contains
                .as_ref()
                .filter(|s| !s.is_empty())
                .cloned(),
        };

        filter.validate()?;
        Ok(filter)
    }
}

/// 解析 YYYY-MM-DD 日期并展宽到当天边界
fn parse_day_bound(raw: &str, end_of_day: bool) -> BackupResult<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| BackupError::Config(format!("日期格式无效: '{}', 错误: {}", raw, e)))?;

    let naive = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| BackupError::Config(format!("日期无法展宽到整天边界: '{}'", raw)))?;

    Ok(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.backup.min_size_mb, 50);
        assert_eq!(config.backup.chunk_size_mb, 8);
        assert_eq!(config.backup.worker_count, 4);
        assert!(config.backup.compute_checksum);
        assert_eq!(config.backup.dest_dir(), PathBuf::from("downloads/primary"));
        assert!(config.log.enabled);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = AppConfig::default();
        config.backup.account_label = "work".to_string();
        config.backup.mime_groups = vec![MimeGroup::Videos, MimeGroup::Archives];
        config.backup.modified_after = Some("2024-01-01".to_string());

        let raw = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&raw).unwrap();

        assert_eq!(parsed.backup.account_label, "work");
        assert_eq!(
            parsed.backup.mime_groups,
            vec![MimeGroup::Videos, MimeGroup::Archives]
        );
        assert_eq!(parsed.backup.modified_after.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_filter_spec_expands_groups_and_widens_dates() {
        let config = BackupConfig {
            min_size_mb: 10,
            mime_groups: vec![MimeGroup::Videos],
            modified_after: Some("2024-01-01".to_string()),
            modified_before: Some("2024-06-30".to_string()),
            name_contains: Some("trip".to_string()),
            ..Default::default()
        };

        let filter = config.filter_spec().unwrap();
        assert_eq!(filter.min_size_bytes, 10 * 1024 * 1024);
        assert!(filter.mime_types.contains(&"video/mp4".to_string()));
        assert_eq!(filter.mime_types.len(), 3);

        let after = filter.modified_after.unwrap();
        assert_eq!((after.hour(), after.minute(), after.second()), (0, 0, 0));
        let before = filter.modified_before.unwrap();
        assert_eq!(
            (before.hour(), before.minute(), before.second()),
            (23, 59, 59)
        );
    }

    #[test]
    fn test_other_group_expands_to_nothing() {
        let config = BackupConfig {
            mime_groups: vec![MimeGroup::Other],
            ..Default::default()
        };
        let filter = config.filter_spec().unwrap();
        assert!(filter.mime_types.is_empty());
    }

    #[test]
    fn test_inverted_date_range_is_config_error() {
        let config = BackupConfig {
            modified_after: Some("2024-06-30".to_string()),
            modified_before: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.filter_spec(),
            Err(BackupError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_date_string_is_config_error() {
        let config = BackupConfig {
            modified_after: Some("01/02/2024".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.filter_spec(),
            Err(BackupError::Config(_))
        ));
    }

    #[test]
    fn test_empty_name_filter_is_dropped() {
        let config = BackupConfig {
            name_contains: Some(String::new()),
            ..Default::default()
        };
        let filter = config.filter_spec().unwrap();
        assert!(filter.name_contains.is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("config.toml"))
            .await
            .unwrap();
        assert_eq!(config.backup.min_size_mb, 50);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        let mut config = AppConfig::default();
        config.backup.worker_count = 2;
        config.save(&path).await.unwrap();

        let loaded = AppConfig::load_or_default(&path).await.unwrap();
        assert_eq!(loaded.backup.worker_count, 2);
    }
}
