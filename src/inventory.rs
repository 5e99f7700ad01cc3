// 清单扫描模块
//
// 对远端做分页列表查询，产出满足过滤条件的文件元数据记录。
// 服务端能求值的维度放进查询谓词，大小过滤在每页取回后于
// 客户端应用，因此总耗时随未过滤的结果规模增长。

use crate::drive::{DriveApi, FileRecord, ListQuery};
use crate::error::{BackupError, BackupResult};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// 服务端单页上限
pub const MAX_PAGE_SIZE: u32 = 1000;

/// 过滤条件
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    /// 最小文件大小（字节），0 表示不限制
    pub min_size_bytes: u64,
    /// MIME 类型集合（OR 语义，空集不限制）
    pub mime_types: Vec<String>,
    /// 修改时间下界（含）
    pub modified_after: Option<DateTime<Utc>>,
    /// 修改时间上界（含）
    pub modified_before: Option<DateTime<Utc>>,
    /// 文件名子串
    pub name_contains: Option<String>,
}

impl FilterSpec {
    /// 校验过滤条件组合
    ///
    /// 时间区间颠倒属于调用方配置错误，必须在发起任何远端请求之前报出。
    pub fn validate(&self) -> BackupResult<()> {
        if let (Some(after), Some(before)) = (self.modified_after, self.modified_before) {
            if after > before {
                return Err(BackupError::Config(format!(
                    "修改时间下界晚于上界: {} > {}",
                    after, before
                )));
            }
        }
        Ok(())
    }
}

/// 清单扫描器
///
/// 拉取式惰性序列：调用方按需取下一条记录，扫描器按需取下一页。
/// 一旦放弃即不可从中断点恢复，重新扫描需要重新构造。
pub struct InventoryLister {
    /// 远端 API
    drive: Arc<dyn DriveApi>,
    /// 服务端查询谓词
    query: ListQuery,
    /// 客户端大小过滤下限
    min_size_bytes: u64,
    /// 每页条数
    page_size: u32,
    /// 已取回、尚未被消费的记录
    buffer: VecDeque<FileRecord>,
    /// 下一页令牌
    page_token: Option<String>,
    /// 服务端已无更多页
    exhausted: bool,
    /// 服务端返回的记录总数（含被大小过滤丢弃的）
    scanned: u64,
}

impl InventoryLister {
    /// 创建扫描器，构造时校验过滤条件
    pub fn new(drive: Arc<dyn DriveApi>, filter: &FilterSpec) -> BackupResult<Self> {
        Self::with_page_size(drive, filter, MAX_PAGE_SIZE)
    }

    /// 指定页大小创建扫描器（超过服务端上限会被压到上限）
    pub fn with_page_size(
        drive: Arc<dyn DriveApi>,
        filter: &FilterSpec,
        page_size: u32,
    ) -> BackupResult<Self> {
        filter.validate()?;

        Ok(Self {
            drive,
            query: ListQuery::from_filter(filter),
            min_size_bytes: filter.min_size_bytes,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            buffer: VecDeque::new(),
            page_token: None,
            exhausted: false,
            scanned: 0,
        })
    }

    /// 取下一条满足过滤条件的记录，序列结束返回 None
    pub async fn next_record(&mut self) -> BackupResult<Option<FileRecord>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_next_page().await?;
        }
    }

    /// 取回一页并应用客户端过滤
    ///
    /// 页请求只尝试一次，失败直接上抛给调用方。
    async fn fetch_next_page(&mut self) -> BackupResult<()> {
        let page = self
            .drive
            .list_page(&self.query, self.page_size, self.page_token.as_deref())
            .await?;

        self.scanned += page.files.len() as u64;

        let mut kept = 0usize;
        for record in page.files {
            // 大小下限在客户端求值，被丢弃的记录仍占用了服务端页配额
            if record.size >= self.min_size_bytes {
                self.buffer.push_back(record);
                kept += 1;
            }
        }

        debug!(
            "取回一页: 保留 {} 条, 累计扫描 {} 条",
            kept, self.scanned
        );

        self.page_token = page.next_page_token;
        if self.page_token.is_none() {
            self.exhausted = true;
        }
        Ok(())
    }

    /// 消费整个序列，收集所有记录
    pub async fn collect_all(&mut self) -> BackupResult<Vec<FileRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await? {
            records.push(record);
        }
        info!(
            "扫描完成: 匹配 {} 条, 服务端共返回 {} 条",
            records.len(),
            self.scanned
        );
        Ok(records)
    }

    /// 服务端已返回的记录总数（含被过滤的）
    pub fn scanned(&self) -> u64 {
        self.scanned
    }
}

#[cfg(test)]
impl FilterSpec {
    /// 测试用：整套过滤条件对单条记录的求值
    pub(crate) fn matches(&self, record: &FileRecord) -> bool {
        record.size >= self.min_size_bytes && ListQuery::from_filter(self).matches(record)
    }
}
