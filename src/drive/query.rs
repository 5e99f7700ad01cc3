// 列表查询谓词构造

use crate::drive::types::FOLDER_MIME_TYPE;
use crate::inventory::FilterSpec;
use chrono::{DateTime, SecondsFormat, Utc};

/// 服务端可求值的查询谓词
///
/// 只承载远端查询语法能表达的维度。大小过滤不在其中：
/// 该 API 家族的查询语法不支持按 size 过滤（携带 size 条件会
/// 触发请求级校验错误），必须在取回每页后于客户端应用。
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// MIME 类型集合（OR 语义，空集不限制）
    pub mime_types: Vec<String>,
    /// 修改时间下界（含）
    pub modified_after: Option<DateTime<Utc>>,
    /// 修改时间上界（含）
    pub modified_before: Option<DateTime<Utc>>,
    /// 文件名子串（服务端按自身规则匹配，大小写不敏感）
    pub name_contains: Option<String>,
}

impl ListQuery {
    /// 从过滤条件构造服务端谓词（丢弃只能客户端求值的维度）
    pub fn from_filter(filter: &FilterSpec) -> Self {
        Self {
            mime_types: filter.mime_types.clone(),
            modified_after: filter.modified_after,
            modified_before: filter.modified_before,
            name_contains: filter.name_contains.clone(),
        }
    }

    /// 生成查询字符串
    ///
    /// 各维度以 and 连接；回收站与目录条目始终排除。
    pub fn to_q(&self) -> String {
        let mut parts: Vec<String> = vec![
            "trashed = false".to_string(),
            format!("mimeType != '{}'", FOLDER_MIME_TYPE),
        ];

        if !self.mime_types.is_empty() {
            let or_clause = self
                .mime_types
                .iter()
                .map(|mt| format!("mimeType = '{}'", mt))
                .collect::<Vec<_>>()
                .join(" or ");
            parts.push(format!("({})", or_clause));
        }

        if let Some(after) = self.modified_after {
            parts.push(format!(
                "modifiedTime >= '{}'",
                after.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }

        if let Some(before) = self.modified_before {
            parts.push(format!(
                "modifiedTime <= '{}'",
                before.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }

        if let Some(ref term) = self.name_contains {
            parts.push(format!("name contains '{}'", escape_query_term(term)));
        }

        parts.join(" and ")
    }
}

/// 转义搜索词中的引号字符，防止拼出畸形查询
fn escape_query_term(term: &str) -> String {
    term.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
impl ListQuery {
    /// 测试用：在本地模拟服务端对谓词的求值
    pub(crate) fn matches(&self, record: &crate::drive::FileRecord) -> bool {
        if record.mime_type == FOLDER_MIME_TYPE {
            return false;
        }
        if !self.mime_types.is_empty() && !self.mime_types.contains(&record.mime_type) {
            return false;
        }
        if self.modified_after.is_some() || self.modified_before.is_some() {
            let modified = match DateTime::parse_from_rfc3339(&record.modified_time) {
                Ok(dt) => dt.with_timezone(&chrono::Utc),
                Err(_) => return false,
            };
            if let Some(after) = self.modified_after {
                if modified < after {
                    return false;
                }
            }
            if let Some(before) = self.modified_before {
                if modified > before {
                    return false;
                }
            }
        }
        if let Some(ref term) = self.name_contains {
            if !record
                .name
                .to_lowercase()
                .contains(&term.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn filter_with_all_dimensions() -> FilterSpec {
        FilterSpec {
            min_size_bytes: 50 * 1024 * 1024,
            mime_types: vec!["video/mp4".to_string(), "video/quicktime".to_string()],
            modified_after: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            modified_before: Some(Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap()),
            name_contains: Some("vacation".to_string()),
        }
    }

    #[test]
    fn test_full_query_string() {
        let q = ListQuery::from_filter(&filter_with_all_dimensions()).to_q();
        assert_eq!(
            q,
            "trashed = false and \
             mimeType != 'application/vnd.google-apps.folder' and \
             (mimeType = 'video/mp4' or mimeType = 'video/quicktime') and \
             modifiedTime >= '2024-01-01T00:00:00Z' and \
             modifiedTime <= '2024-06-30T23:59:59Z' and \
             name contains 'vacation'"
        );
    }

    #[test]
    fn test_empty_filter_still_excludes_folders_and_trash() {
        let q = ListQuery::default().to_q();
        assert_eq!(
            q,
            "trashed = false and mimeType != 'application/vnd.google-apps.folder'"
        );
    }

    #[test]
    fn test_size_never_appears_in_query() {
        // 大小过滤只能客户端求值，出现在查询串里会被服务端拒绝
        let q = ListQuery::from_filter(&filter_with_all_dimensions()).to_q();
        assert!(!q.contains("size"));
    }

    #[test]
    fn test_quote_escaping() {
        assert_eq!(escape_query_term("it's"), "it\\'s");
        assert_eq!(escape_query_term("a\\b'c"), "a\\\\b\\'c");

        let query = ListQuery {
            name_contains: Some("o'brien".to_string()),
            ..Default::default()
        };
        assert!(query.to_q().contains("name contains 'o\\'brien'"));
    }
}
