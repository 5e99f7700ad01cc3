// 凭证数据类型定义

use crate::error::{BackupError, BackupResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// 访问凭证
///
/// 由外部 OAuth 流程写入令牌文件，本进程只读。
/// 生命周期：启动时加载，过期后由调用方重新授权并重启扫描。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// 访问令牌
    #[serde(alias = "token")]
    pub access_token: String,
    /// 刷新令牌（由外部授权工具使用，本进程不消费）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// 令牌过期时间
    #[serde(default, alias = "expiry")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// 从令牌文件加载凭证
    ///
    /// 文件缺失或内容无效都视为凭证错误，提示调用方先完成授权。
    pub async fn from_token_file(path: &Path) -> BackupResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            BackupError::Auth(format!(
                "读取令牌文件失败: {:?}, 错误: {}，请先完成 OAuth 授权",
                path, e
            ))
        })?;

        let credential: Credential = serde_json::from_str(&raw)
            .map_err(|e| BackupError::Auth(format!("令牌文件格式无效: {:?}, 错误: {}", path, e)))?;

        if credential.access_token.is_empty() {
            return Err(BackupError::Auth(format!(
                "令牌文件缺少访问令牌: {:?}",
                path
            )));
        }

        if credential.is_expired() {
            warn!("令牌已过期: {:?}", credential.expires_at);
            return Err(BackupError::Auth(
                "访问令牌已过期，请重新授权".to_string(),
            ));
        }

        info!("已加载访问凭证, 过期时间: {:?}", credential.expires_at);
        Ok(credential)
    }

    /// 令牌是否已过期（无过期时间视为长期有效）
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expiry) => expiry <= Utc::now(),
            None => false,
        }
    }

    /// Bearer 令牌值
    pub fn bearer(&self) -> &str {
        &self.access_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_token_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"token": "ya29.test", "refresh_token": "1//abc", "expiry": "2099-01-01T00:00:00Z"}}"#
        )
        .unwrap();

        let credential = Credential::from_token_file(file.path()).await.unwrap();
        assert_eq!(credential.bearer(), "ya29.test");
        assert!(!credential.is_expired());
    }

    #[tokio::test]
    async fn test_missing_token_file_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Credential::from_token_file(&dir.path().join("token.json")).await;
        assert!(matches!(result, Err(BackupError::Auth(_))));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"access_token": "stale", "expiry": "2020-01-01T00:00:00Z"}}"#
        )
        .unwrap();

        let result = Credential::from_token_file(file.path()).await;
        assert!(matches!(result, Err(BackupError::Auth(_))));
    }
}
