// 备份清单模块
//
// 已完成传输的追加式记录，JSON Lines 格式，每行一条自包含记录：
// ```text
// {"id":"1a2b","name":"a.mp4","size":1048576,...,"localPath":"downloads/a.mp4",...}
// ```
// 文件只追加不改写，写入过程中随时可以被任何按行读取的
// 消费者增量读取。

use crate::drive::FileRecord;
use crate::error::{BackupError, BackupResult};
use chrono::{Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 清单记录
///
/// 远端元数据与本地落盘信息的合并，追加一次后不再改写。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// 文件ID
    pub id: String,
    /// 文件名
    pub name: String,
    /// 文件大小（字节）
    pub size: u64,
    /// MIME 类型
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// 服务端修改时间
    #[serde(rename = "modifiedTime")]
    pub modified_time: String,
    /// 服务端 MD5（如有）
    #[serde(rename = "md5Checksum", skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,
    /// 本地保存路径
    #[serde(rename = "localPath")]
    pub local_path: String,
    /// 下载完成时间
    #[serde(rename = "downloadedAt")]
    pub downloaded_at: String,
    /// 下载后计算的 SHA-256（如启用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ManifestEntry {
    /// 由远端记录与本地结果合并出清单记录，完成时间取当前时刻
    pub fn from_record(record: &FileRecord, local_path: &Path, checksum: Option<String>) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            size: record.size,
            mime_type: record.mime_type.clone(),
            modified_time: record.modified_time.clone(),
            md5_checksum: record.md5_checksum.clone(),
            local_path: local_path.display().to_string(),
            downloaded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            checksum,
        }
    }
}

/// 清单存储
///
/// 每次追加都是打开、写入一条完整记录、立即关闭，两次追加之间
/// 不在内存里保留任何清单状态。同一次运行内的并发追加由互斥锁
/// 串行化，锁只覆盖写入动作本身，不会串行化传输。
#[derive(Debug)]
pub struct ManifestStore {
    /// 清单文件路径
    path: PathBuf,
    /// 追加互斥锁
    lock: parking_lot::Mutex<()>,
}

impl ManifestStore {
    /// 创建清单存储（文件在首次追加时才会出现）
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: parking_lot::Mutex::new(()),
        }
    }

    /// 生成本次运行的清单文件路径
    ///
    /// 每次运行一个文件，文件名带启动时间戳。
    pub fn run_file(manifest_dir: &Path) -> PathBuf {
        let filename = format!("manifest_{}.jsonl", Local::now().format("%Y%m%d_%H%M%S"));
        manifest_dir.join(filename)
    }

    /// 清单文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录
    ///
    /// 整行（含换行符）先序列化进一个缓冲区，再以单次写入落盘，
    /// 保证并发追加不会交错出半条记录。
    pub fn append(&self, entry: &ManifestEntry) -> BackupResult<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| BackupError::Parse(format!("序列化清单记录失败: {}", e)))?;
        line.push('\n');

        let _guard = self.lock.lock();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!("已追加清单记录: {} -> {}", entry.id, entry.local_path);
        Ok(())
    }

    /// 加载清单文件中的全部完整记录
    ///
    /// 按行解析，空行跳过；进程在追加间隙被杀时文件尾部可能
    /// 残留半行，解析失败的行记警告后丢弃。
    pub fn load(path: &Path) -> BackupResult<Vec<ManifestEntry>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ManifestEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("解析清单记录失败 (行 {}): {}", line_num + 1, e);
                }
            }
        }

        Ok(entries)
    }
}
