// 并发协调
//
// 把一批下载任务摊到有界工作池上执行。任务之间不共享可变
// 状态，唯一的共享面是清单文件（按整条记录串行化）和进度
// 通道（发布动作本身无锁且不阻塞传输）。

use crate::transfer::engine::{DownloadTask, TransferEngine};
use crate::transfer::progress::{ProgressEvent, ProgressSender};
use crate::error::{BackupError, BackupResult};
use crate::manifest::ManifestEntry;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

/// 工作池上限
pub const MAX_WORKERS: usize = 8;

/// 单任务结果
///
/// 成功与失败按任务独立观察，批次不做全有或全无。
#[derive(Debug)]
pub struct TaskOutcome {
    /// 任务ID
    pub task_id: String,
    /// 文件名
    pub file_name: String,
    /// 任务结果
    pub result: BackupResult<ManifestEntry>,
}

/// 批次执行报告
#[derive(Debug)]
pub struct BatchReport {
    /// 任务总数
    pub total: usize,
    /// 各任务结果（并行时按完成顺序）
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    /// 成功任务数
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// 失败任务数
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

/// 执行一批下载任务
///
/// 工作数小于等于 1 或只有一个任务时按输入顺序串行执行，
/// 否则摊到固定大小的工作池，完成顺序不保证。总体进度按
/// 已结束任务数（含失败）计算，每个任务结束时推进一格。
pub async fn run_batch(
    engine: Arc<TransferEngine>,
    tasks: Vec<DownloadTask>,
    worker_count: usize,
    progress: Option<ProgressSender>,
) -> BatchReport {
    let total = tasks.len();
    let mut outcomes = Vec::with_capacity(total);

    if total == 0 {
        info!("没有待执行的下载任务");
        return BatchReport { total, outcomes };
    }

    let workers = worker_count.clamp(1, MAX_WORKERS);

    if workers <= 1 || total <= 1 {
        info!("串行执行 {} 个下载任务", total);
        for (index, task) in tasks.into_iter().enumerate() {
            let outcome = execute_one(&engine, task, progress.clone()).await;
            publish_overall(&progress, index + 1, total);
            outcomes.push(outcome);
        }
        return BatchReport { total, outcomes };
    }

    info!("并行执行 {} 个下载任务, 工作池大小 {}", total, workers);

    let semaphore = Arc::new(Semaphore::new(workers));
    // 只串行化进度发布本身，计数加一和发布在同一临界区内完成
    let completed = Arc::new(parking_lot::Mutex::new(0usize));
    let mut join_set = JoinSet::new();

    for task in tasks {
        let engine = Arc::clone(&engine);
        let semaphore = Arc::clone(&semaphore);
        let completed = Arc::clone(&completed);
        let progress = progress.clone();

        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return TaskOutcome {
                        task_id: task.id.clone(),
                        file_name: task.record.name.clone(),
                        result: Err(BackupError::Other("工作池已关闭".to_string())),
                    };
                }
            };

            let outcome = execute_one(&engine, task, progress.clone()).await;
            {
                let mut count = completed.lock();
                *count += 1;
                publish_overall(&progress, *count, total);
            }
            outcome
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!("下载任务意外终止: {}", e),
        }
    }

    BatchReport { total, outcomes }
}

/// 执行单个任务，失败只影响自身
async fn execute_one(
    engine: &TransferEngine,
    task: DownloadTask,
    progress: Option<ProgressSender>,
) -> TaskOutcome {
    let task_id = task.id.clone();
    let file_name = task.record.name.clone();

    let result = engine.download_file(&task, progress).await;
    if let Err(ref e) = result {
        error!("✗ 任务失败: {} ({}), 错误: {}", file_name, task_id, e);
    }

    TaskOutcome {
        task_id,
        file_name,
        result,
    }
}

/// 发布批次总体进度
fn publish_overall(progress: &Option<ProgressSender>, completed: usize, total: usize) {
    if let Some(sink) = progress {
        let _ = sink.send(ProgressEvent::Overall {
            completed,
            total,
            fraction: completed as f64 / total as f64,
        });
    }
}
