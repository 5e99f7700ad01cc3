// 远端客户端实现

use crate::auth::Credential;
use crate::drive::query::ListQuery;
use crate::drive::types::FileListResponse;
use crate::error::{BackupError, BackupResult};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

/// 列表接口地址
const FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";

/// 列表请求的字段投影，只取备份需要的元数据
const LIST_FIELDS: &str = "nextPageToken, files(id, name, size, mimeType, modifiedTime, md5Checksum)";

/// 文件内容字节流
pub type MediaStream = Box<dyn AsyncRead + Send + Unpin>;

/// 远端存储 API 抽象
///
/// 清单扫描与传输引擎都只依赖该接口，便于用脚本化的
/// 假传输在本地测试分页、过滤与重试路径。
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// 拉取一页文件列表
    async fn list_page(
        &self,
        query: &ListQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> BackupResult<FileListResponse>;

    /// 按文件ID获取内容字节流
    async fn fetch_media(&self, file_id: &str) -> BackupResult<MediaStream>;
}

/// 云盘客户端
#[derive(Debug, Clone)]
pub struct DriveClient {
    /// HTTP客户端
    client: Client,
    /// 访问凭证
    credential: Credential,
}

impl DriveClient {
    /// 创建新的云盘客户端
    ///
    /// # 参数
    /// * `credential` - 已加载的访问凭证
    pub fn new(credential: Credential) -> BackupResult<Self> {
        if credential.is_expired() {
            return Err(BackupError::Auth(
                "访问令牌已过期，无法创建客户端".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent("drive-backup-rust/0.4")
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(15))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| BackupError::Other(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("云盘客户端初始化完成");

        Ok(Self { client, credential })
    }

    /// 将非 2xx 响应映射为错误分类
    async fn classify_status(response: reqwest::Response) -> BackupResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(200).collect();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(BackupError::Auth(format!(
                "服务端返回 {}: {}",
                status, excerpt
            )));
        }
        if status.is_server_error() {
            return Err(BackupError::Transient(format!(
                "服务端返回 {}: {}",
                status, excerpt
            )));
        }
        Err(BackupError::Other(format!(
            "服务端返回 {}: {}",
            status, excerpt
        )))
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn list_page(
        &self,
        query: &ListQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> BackupResult<FileListResponse> {
        let q = query.to_q();
        debug!("列表查询: q={}, page_size={}, token={:?}", q, page_size, page_token);

        let mut params: Vec<(&str, String)> = vec![
            ("q", q),
            ("fields", LIST_FIELDS.to_string()),
            ("pageSize", page_size.to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response = self
            .client
            .get(FILES_ENDPOINT)
            .bearer_auth(self.credential.bearer())
            .query(&params)
            .send()
            .await?;

        let response = Self::classify_status(response).await?;

        let page: FileListResponse = response
            .json()
            .await
            .map_err(|e| BackupError::Parse(format!("解析文件列表响应失败: {}", e)))?;

        debug!(
            "收到一页: {} 条记录, 下一页令牌: {}",
            page.files.len(),
            if page.next_page_token.is_some() {
                "有"
            } else {
                "无"
            }
        );

        Ok(page)
    }

    async fn fetch_media(&self, file_id: &str) -> BackupResult<MediaStream> {
        let url = format!("{}/{}", FILES_ENDPOINT, file_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.credential.bearer())
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;

        let response = Self::classify_status(response).await.map_err(|e| {
            warn!("获取文件内容失败: id={}, 错误: {}", file_id, e);
            e
        })?;

        // 流内的读取错误统一转成 IO 错误，由引擎按瞬态处理
        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}
