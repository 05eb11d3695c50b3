//! 系统剪贴板变化监听
//!
//! 在独立线程中运行 `clipboard-master`，每次变化都向协调任务投递一次
//! `OwnershipLost` 检查请求。队列已满时直接丢弃：协调任务稍后总会读到最新内容。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clipboard_master::{CallbackResult, ClipboardHandler, Master};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::coordinator::CheckRequest;

/// 剪贴板事件处理器（内部实现）
struct Handler {
    requests: mpsc::Sender<CheckRequest>,
    stopped: Arc<AtomicBool>,
}

impl ClipboardHandler for Handler {
    fn on_clipboard_change(&mut self) -> CallbackResult {
        if self.stopped.load(Ordering::SeqCst) {
            return CallbackResult::Stop;
        }

        match self.requests.try_send(CheckRequest::OwnershipLost) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::trace!("⏭️ 检查队列已满，跳过本次剪贴板变化");
            }
            Err(TrySendError::Closed(_)) => return CallbackResult::Stop,
        }
        CallbackResult::Next
    }

    fn on_clipboard_error(&mut self, error: std::io::Error) -> CallbackResult {
        log::error!("剪贴板错误：{}", error);
        CallbackResult::Next
    }
}

/// 在后台线程启动剪贴板变化监听
///
/// 创建失败或监听循环退出后，按固定间隔重试，直到 `stopped` 被置位。
/// 线程可能阻塞在系统事件上，停止后会在下一次剪贴板变化时退出。
pub(crate) fn spawn_change_monitor(
    requests: mpsc::Sender<CheckRequest>,
    stopped: Arc<AtomicBool>,
    retry_delay: Duration,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("cliptrail-clipboard-monitor".to_string())
        .spawn(move || {
            while !stopped.load(Ordering::SeqCst) {
                let handler = Handler {
                    requests: requests.clone(),
                    stopped: Arc::clone(&stopped),
                };
                match Master::new(handler) {
                    Ok(mut master) => {
                        log::info!("📋 剪贴板监听已启动");
                        if let Err(err) = master.run() {
                            log::warn!("📋 剪贴板监听异常退出: {}", err);
                        }
                    }
                    Err(err) => {
                        log::error!("📋 创建剪贴板监听失败: {}", err);
                    }
                }

                if stopped.load(Ordering::SeqCst) || requests.is_closed() {
                    break;
                }
                log::warn!("📋 剪贴板监听 {:?} 后重试", retry_delay);
                thread::sleep(retry_delay);
            }
            log::debug!("📋 剪贴板监听线程已退出");
        })?;
    Ok(())
}
