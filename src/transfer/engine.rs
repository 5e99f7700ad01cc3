// 传输引擎
//
// 单文件的分片下载：创建目标文件、按分片搬运字节流、按分片
// 上报进度，瞬态失败在重试策略下整文件从头再来。成功落盘后
// 可选做一遍校验和读回，最后追加清单记录。

use crate::drive::{DriveApi, FileRecord};
use crate::error::{BackupError, BackupResult};
use crate::manifest::{ManifestEntry, ManifestStore};
use crate::transfer::progress::{ProgressSender, ProgressTracker};
use crate::transfer::retry::RetryPolicy;
use crate::util::human_size;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use uuid::Uuid;

/// 校验和读回的固定块大小，独立于下载分片大小
const CHECKSUM_BLOCK_SIZE: usize = 1024 * 1024;

/// 下载任务
///
/// 按选中文件逐个创建，消费一次；成功产出清单记录，
/// 失败在耗尽重试后以终态错误收尾。
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// 任务ID
    pub id: String,
    /// 远端文件记录
    pub record: FileRecord,
    /// 本地保存路径
    pub dest_path: PathBuf,
    /// 分片大小（字节）
    pub chunk_size: usize,
    /// 是否在下载后计算 SHA-256
    pub compute_checksum: bool,
}

impl DownloadTask {
    /// 创建下载任务，目标路径按文件名落在目标目录下
    ///
    /// 同名文件不做去重，并发下载重名文件会互相覆盖，由调用方保证。
    pub fn new(
        record: FileRecord,
        dest_dir: &Path,
        chunk_size: usize,
        compute_checksum: bool,
    ) -> Self {
        let dest_path = dest_dir.join(&record.name);
        Self {
            id: Uuid::new_v4().to_string(),
            record,
            dest_path,
            chunk_size: chunk_size.max(1),
            compute_checksum,
        }
    }
}

/// 传输引擎
pub struct TransferEngine {
    /// 远端 API
    drive: Arc<dyn DriveApi>,
    /// 清单存储
    manifest: Arc<ManifestStore>,
    /// 重试策略
    retry: RetryPolicy,
}

impl TransferEngine {
    /// 创建传输引擎（默认重试策略）
    pub fn new(drive: Arc<dyn DriveApi>, manifest: Arc<ManifestStore>) -> Self {
        Self::with_retry_policy(drive, manifest, RetryPolicy::default())
    }

    /// 使用指定重试策略创建传输引擎
    pub fn with_retry_policy(
        drive: Arc<dyn DriveApi>,
        manifest: Arc<ManifestStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            drive,
            manifest,
            retry,
        }
    }

    /// 下载单个文件并追加清单记录
    ///
    /// 清单追加只发生在文件完整写入之后；终态失败时目标文件的
    /// 内容不可信，调用方应视为可删除的残留。
    pub async fn download_file(
        &self,
        task: &DownloadTask,
        progress: Option<ProgressSender>,
    ) -> BackupResult<ManifestEntry> {
        info!(
            "开始下载: {} ({}) -> {:?}",
            task.record.name,
            human_size(task.record.size),
            task.dest_path
        );

        let tracker = ProgressTracker::new(task.id.clone(), progress);

        self.retry
            .run(|attempt| {
                let drive = Arc::clone(&self.drive);
                let task = task.clone();
                let tracker = tracker.clone();
                async move {
                    if attempt > 1 {
                        debug!(
                            "重新开始整文件传输: {} (第 {} 次尝试)",
                            task.record.name, attempt
                        );
                    }
                    transfer_once(drive.as_ref(), &task, &tracker).await
                }
            })
            .await?;

        tracker.report(1.0);

        let checksum = if task.compute_checksum {
            let digest = sha256_of_file(&task.dest_path).await?;
            debug!("校验和: {} sha256={}", task.record.name, digest);
            Some(digest)
        } else {
            None
        };

        let entry = ManifestEntry::from_record(&task.record, &task.dest_path, checksum);
        self.manifest.append(&entry)?;

        info!("✓ 下载完成: {} -> {}", entry.name, entry.local_path);
        Ok(entry)
    }
}

/// 执行一次完整的分片传输
///
/// 远端读取失败按瞬态上抛，本地写入失败按 IO 错误上抛；
/// 写完后与服务端元数据核对字节数，对不上也按瞬态处理，
/// 交给重试换一次干净的流。
async fn transfer_once(
    drive: &dyn DriveApi,
    task: &DownloadTask,
    tracker: &ProgressTracker,
) -> BackupResult<u64> {
    let mut media = drive.fetch_media(&task.record.id).await?;

    if let Some(parent) = task.dest_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(&task.dest_path).await?;

    let total = task.record.size;
    let mut written: u64 = 0;
    let mut buf = vec![0u8; task.chunk_size];

    loop {
        // 凑满一个分片，或读到流结束
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = media
                .read(&mut buf[filled..])
                .await
                .map_err(|e| BackupError::Transient(format!("读取远端字节流失败: {}", e)))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }

        file.write_all(&buf[..filled]).await?;
        written += filled as u64;

        if total > 0 {
            tracker.report(written as f64 / total as f64);
        }

        if filled < buf.len() {
            break;
        }
    }

    file.flush().await?;
    drop(file);

    if total > 0 && written != total {
        return Err(BackupError::Transient(format!(
            "文件大小不匹配: 实际 {} 字节, 期望 {} 字节",
            written, total
        )));
    }

    Ok(written)
}

/// 流式读回已完成的文件并计算 SHA-256
async fn sha256_of_file(path: &Path) -> BackupResult<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; CHECKSUM_BLOCK_SIZE];

    loop {
        let n = file.read(&mut block).await?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
