// 重试策略

use crate::error::{BackupError, BackupResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 指数退避重试策略
///
/// 只消化瞬态错误；其余错误第一次出现就原样上抛。
/// 预算耗尽后以终态错误收尾，由调用方决定善后。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    /// 首次重试前的等待
    pub base_delay: Duration,
    /// 等待上限
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次尝试失败后的退避时长（attempt 从 1 开始）
    ///
    /// base, base*2, base*4, ... 封顶于 max_delay。
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    /// 在本策略下执行操作
    ///
    /// `op` 每次调用需要产出一个全新的执行（重试会从头再来，
    /// 不存在半途续传），入参是从 1 开始的尝试序号。
    pub async fn run<T, F, Fut>(&self, mut op: F) -> BackupResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = BackupResult<T>>,
    {
        let mut last_error: Option<BackupError> = None;

        for attempt in 1..=self.max_attempts.max(1) {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if attempt < self.max_attempts {
                        let delay = self.delay_for(attempt);
                        warn!(
                            "第 {}/{} 次尝试失败: {}, {:?} 后重试",
                            attempt, self.max_attempts, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(BackupError::Terminal {
            attempts: self.max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "未知错误".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for(12), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let calls_in_op = calls.clone();
        let result = policy
            .run(|_attempt| {
                let calls = calls_in_op.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(BackupError::Transient("flaky".to_string()))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_yields_terminal_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let calls_in_op = calls.clone();
        let result: BackupResult<()> = policy
            .run(|_attempt| {
                let calls = calls_in_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(BackupError::Transient("still down".to_string()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match result {
            Err(BackupError::Terminal {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 5);
                assert!(last_error.contains("still down"));
            }
            other => panic!("expected terminal error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let calls_in_op = calls.clone();
        let result: BackupResult<()> = policy
            .run(|_attempt| {
                let calls = calls_in_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(BackupError::Auth("token revoked".to_string()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(BackupError::Auth(_))));
    }
}
