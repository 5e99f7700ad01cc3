// 传输引擎模块

pub mod coordinator;
pub mod engine;
pub mod progress;
pub mod retry;

pub use coordinator::{run_batch, BatchReport, TaskOutcome, MAX_WORKERS};
pub use engine::{DownloadTask, TransferEngine};
pub use progress::{ProgressEvent, ProgressSender, ProgressTracker};
pub use retry::RetryPolicy;
