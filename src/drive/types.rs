// 远端 API 数据类型

use serde::{Deserialize, Deserializer, Serialize};

/// 原生文档类型的目录 mime，列表查询时始终排除
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// 文件元数据记录
///
/// 由清单扫描产出后不再变更，调用方持有并据此创建下载任务。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// 文件ID（服务端稳定标识）
    pub id: String,

    /// 文件名
    pub name: String,

    /// 文件大小（字节）
    ///
    /// 服务端以字符串返回，原生文档格式没有该字段，统一归一化为整数，
    /// 缺失时记 0（因此任何非零的最小大小过滤都会排除原生文档）。
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: u64,

    /// MIME 类型
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,

    /// 服务端修改时间（RFC 3339）
    #[serde(rename = "modifiedTime", default)]
    pub modified_time: String,

    /// 服务端 MD5（原生文档没有）
    #[serde(rename = "md5Checksum", skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,
}

/// size 字段反序列化：兼容字符串、数字与缺失三种形态
fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    })
}

/// 文件列表响应（单页）
#[derive(Debug, Default, Deserialize)]
pub struct FileListResponse {
    /// 下一页令牌，缺失表示已到最后一页
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,

    /// 本页文件列表
    #[serde(default)]
    pub files: Vec<FileRecord>,
}
