//! 后台磁盘线程子模块
//!
//! ## 职责
//! - 串行执行历史快照持久化与截图文件删除，调用线程永不等待磁盘
//! - 提供 `flush`：等待此前投递的任务全部完成（有超时上限）
//!
//! ## 错误语义
//! - 任务失败只记日志，线程继续处理后续任务

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::snapshot::SnapshotWriter;
use super::HistoryEntry;
use crate::error::AppError;
use crate::image_handler::ImageArtifacts;

pub(crate) enum DiskJob {
    Persist {
        generation: u64,
        entries: Vec<HistoryEntry>,
    },
    DeleteImages(Vec<(PathBuf, PathBuf)>),
    Flush(Sender<()>),
}

pub(crate) struct DiskWorker {
    sender: Mutex<Option<Sender<DiskJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DiskWorker {
    pub(crate) fn spawn(writer: Arc<SnapshotWriter>, artifacts: ImageArtifacts) -> Result<Self, AppError> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("cliptrail-disk-io".to_string())
            .spawn(move || run(receiver, writer, artifacts))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// 投递任务；线程已关闭时返回原任务，由调用方就地执行。
    pub(crate) fn submit(&self, job: DiskJob) -> Result<(), DiskJob> {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(sender) => sender.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    /// 等待此前投递的任务执行完毕，超时返回 `false`。
    pub(crate) fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.submit(DiskJob::Flush(ack_tx)).is_err() {
            return true;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// 关闭通道并在超时内等待线程退出。
    pub(crate) fn shutdown(&self, timeout: Duration) -> bool {
        let drained = self.flush(timeout);

        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if drained {
                if handle.join().is_err() {
                    log::error!("磁盘线程异常退出");
                }
            } else {
                log::warn!("磁盘线程未在 {:?} 内完成，放弃等待", timeout);
            }
        }
        drained
    }
}

/// 在当前线程上执行一个任务（线程关闭后的兜底路径，也供同步调用使用）。
pub(crate) fn execute(job: DiskJob, writer: &SnapshotWriter, artifacts: &ImageArtifacts) {
    match job {
        DiskJob::Persist {
            generation,
            entries,
        } => match writer.write(generation, &entries) {
            Ok(true) => log::trace!("💾 历史快照已写入（generation={}）", generation),
            Ok(false) => {}
            Err(e) => log::warn!("历史快照写入失败: {}", e),
        },
        DiskJob::DeleteImages(pairs) => {
            for (thumbnail_path, full_image_path) in pairs {
                artifacts.delete(&thumbnail_path, &full_image_path);
            }
        }
        DiskJob::Flush(ack) => {
            let _ = ack.send(());
        }
    }
}

fn run(receiver: Receiver<DiskJob>, writer: Arc<SnapshotWriter>, artifacts: ImageArtifacts) {
    log::debug!("💾 磁盘线程已启动");
    while let Ok(job) = receiver.recv() {
        execute(job, &writer, &artifacts);
    }
    log::debug!("💾 磁盘线程已退出");
}
