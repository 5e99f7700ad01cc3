use anyhow::{bail, Context, Result};
use drive_backup_rust::util::human_size;
use drive_backup_rust::{
    config::AppConfig, logging, run_batch, Credential, DownloadTask, DriveApi, DriveClient,
    InventoryLister, ManifestStore, ProgressEvent, TransferEngine,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// 默认配置文件路径（可用第一个命令行参数覆盖）
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 创建运行所需的目录
fn ensure_run_dirs(config: &AppConfig) -> Result<()> {
    let dirs = [
        config.log.log_dir.clone(),
        config.backup.manifest_dir.clone(),
        config.backup.dest_dir(),
    ];
    for dir in dirs {
        std::fs::create_dir_all(&dir).with_context(|| format!("创建目录失败: {:?}", dir))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_or_default(Path::new(&config_path)).await?;

    ensure_run_dirs(&config)?;
    let _log_guard = logging::init_logging(&config.log);

    info!("云盘备份启动, 账号标签: {}", config.backup.account_label);

    // 过滤条件在发起任何远端请求之前校验
    let filter = config.backup.filter_spec()?;

    // 凭证由外部 OAuth 流程写入令牌文件，这里只加载注入
    let credential = Credential::from_token_file(&config.backup.token_file).await?;
    let drive: Arc<dyn DriveApi> = Arc::new(DriveClient::new(credential)?);

    // 扫描清单
    let mut lister = InventoryLister::new(Arc::clone(&drive), &filter)?;
    let records = lister.collect_all().await?;
    if records.is_empty() {
        warn!("没有文件匹配过滤条件，可尝试调低大小下限、清除日期区间或移除类型过滤");
        return Ok(());
    }

    let total_bytes: u64 = records.iter().map(|r| r.size).sum();
    info!(
        "待备份 {} 个文件, 共 {}",
        records.len(),
        human_size(total_bytes)
    );

    // 组装下载任务
    let dest_dir = config.backup.dest_dir();
    let chunk_size = config.backup.chunk_size_bytes();
    let tasks: Vec<DownloadTask> = records
        .into_iter()
        .map(|record| {
            DownloadTask::new(record, &dest_dir, chunk_size, config.backup.compute_checksum)
        })
        .collect();

    // 本次运行的清单文件与传输引擎
    let manifest_path = ManifestStore::run_file(&config.backup.manifest_dir);
    info!("本次运行清单: {:?}", manifest_path);
    let manifest = Arc::new(ManifestStore::new(manifest_path));
    let engine = Arc::new(TransferEngine::new(drive, manifest));

    // 进度观察者：单任务进度走 debug，总体进度走 info
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let progress_logger = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            match event {
                ProgressEvent::File { task_id, fraction } => {
                    tracing::debug!("任务 {} 进度 {:.0}%", task_id, fraction * 100.0);
                }
                ProgressEvent::Overall {
                    completed,
                    total,
                    fraction,
                } => {
                    info!("总体进度 {}/{} ({:.0}%)", completed, total, fraction * 100.0);
                }
            }
        }
    });

    let report = run_batch(
        engine,
        tasks,
        config.backup.worker_count,
        Some(progress_tx),
    )
    .await;

    // 批次结束后发送端全部释放，观察者随之退出
    let _ = progress_logger.await;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(entry) => info!(
                "✓ {} -> {} ({})",
                outcome.file_name,
                entry.local_path,
                human_size(entry.size)
            ),
            Err(e) => warn!("✗ {}: {}", outcome.file_name, e),
        }
    }
    info!(
        "备份结束: 成功 {}, 失败 {}",
        report.succeeded(),
        report.failed()
    );

    if report.failed() > 0 {
        bail!("{} 个任务在耗尽重试后仍失败", report.failed());
    }
    Ok(())
}
