//! 协调任务
//!
//! 唯一消费检查请求的 tokio 任务。轮询定时器与变化监听都只投递请求，
//! 检查本身在阻塞线程池上串行执行，所以同一时刻最多只有一次检查在进行。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::capture::ObserverCore;

/// 请求队列容量；队列满时新的请求被丢弃（忙则跳过）。
pub(crate) const REQUEST_QUEUE_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckRequest {
    /// 定时轮询或手动刷新
    Poll,
    /// 其他程序写入了剪贴板
    OwnershipLost,
}

/// 合并已排队的请求：只要有一个 `OwnershipLost`，合并结果就是 `OwnershipLost`。
fn coalesce(first: CheckRequest, requests: &mut mpsc::Receiver<CheckRequest>) -> CheckRequest {
    let mut merged = first;
    while let Ok(next) = requests.try_recv() {
        if next == CheckRequest::OwnershipLost {
            merged = CheckRequest::OwnershipLost;
        }
    }
    merged
}

pub(crate) async fn run(
    core: Arc<ObserverCore>,
    mut requests: mpsc::Receiver<CheckRequest>,
    stopped: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(core.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    log::info!("🔄 剪贴板协调任务已启动（轮询间隔 {:?}）", core.config.poll_interval);

    loop {
        let request = tokio::select! {
            _ = ticker.tick() => CheckRequest::Poll,
            received = requests.recv() => match received {
                Some(request) => request,
                None => break,
            },
        };
        let request = coalesce(request, &mut requests);

        if request == CheckRequest::OwnershipLost {
            tokio::time::sleep(core.config.ownership_recovery_delay).await;
        }
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        let worker = Arc::clone(&core);
        match tokio::task::spawn_blocking(move || worker.run_check(request)).await {
            Ok(outcome) => {
                if outcome.text_added || outcome.image_added {
                    log::trace!("检查完成（{:?}）: {:?}", request, outcome);
                }
            }
            Err(e) => log::error!("剪贴板检查异常终止: {}", e),
        }
    }

    log::info!("🔄 剪贴板协调任务已退出");
}
