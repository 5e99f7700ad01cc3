// 进度事件

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 进度事件
///
/// 瞬态数据，只供观察者消费，不落盘。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// 单任务分片进度
    File {
        task_id: String,
        /// 完成比例，取值 [0, 1]
        fraction: f64,
    },
    /// 批次总体进度（按已结束任务数计算）
    Overall {
        completed: usize,
        total: usize,
        fraction: f64,
    },
}

/// 进度事件发送端
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// 单任务进度跟踪器
///
/// 保证对外发布的比例单调不减：重试从头开始传输时，
/// 已发布过的高水位不会回落。克隆共享同一高水位。
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    task_id: String,
    sink: Option<ProgressSender>,
    high_water: Arc<parking_lot::Mutex<f64>>,
}

impl ProgressTracker {
    pub fn new(task_id: String, sink: Option<ProgressSender>) -> Self {
        Self {
            task_id,
            sink,
            high_water: Arc::new(parking_lot::Mutex::new(0.0)),
        }
    }

    /// 发布一次进度，比例会被钳制到 [0, 1] 并与高水位取大
    pub fn report(&self, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        let published = {
            let mut high = self.high_water.lock();
            if clamped > *high {
                *high = clamped;
            }
            *high
        };

        if let Some(ref sink) = self.sink {
            // 接收端关闭只意味着没人听进度，不影响传输本身
            let _ = sink.send(ProgressEvent::File {
                task_id: self.task_id.clone(),
                fraction: published,
            });
        }
    }

    /// 当前高水位
    pub fn fraction(&self) -> f64 {
        *self.high_water.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_fractions(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<f64> {
        let mut fractions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::File { fraction, .. } = event {
                fractions.push(fraction);
            }
        }
        fractions
    }

    #[test]
    fn test_fraction_is_monotonic() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = ProgressTracker::new("t1".to_string(), Some(tx));

        tracker.report(0.25);
        tracker.report(0.5);
        // 重试从头传输导致的回落不应对外可见
        tracker.report(0.1);
        tracker.report(0.75);

        assert_eq!(collect_fractions(&mut rx), vec![0.25, 0.5, 0.5, 0.75]);
    }

    #[test]
    fn test_fraction_clamped_to_unit_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = ProgressTracker::new("t1".to_string(), Some(tx));

        tracker.report(1.7);
        tracker.report(-0.3);

        assert_eq!(collect_fractions(&mut rx), vec![1.0, 1.0]);
        assert_eq!(tracker.fraction(), 1.0);
    }

    #[test]
    fn test_clones_share_high_water() {
        let tracker = ProgressTracker::new("t1".to_string(), None);
        let clone = tracker.clone();

        clone.report(0.6);
        assert_eq!(tracker.fraction(), 0.6);
    }

    #[test]
    fn test_closed_receiver_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let tracker = ProgressTracker::new("t1".to_string(), Some(tx));
        tracker.report(0.5);
    }
}
