//! 剪贴板观察模块
//!
//! # 设计思路
//!
//! `ClipboardObserver` 是整个服务的协调者：
//! - **触发**：固定间隔轮询 + `clipboard-master` 系统变化事件，两者只投递检查请求
//! - **串行化**：一个 tokio 协调任务消费有界队列，队列满即丢弃，代替“处理中”标志
//! - **去重**：文本比较上一次指纹，图片按时间窗口比较指纹，自身写入有冷却期
//! - **通知**：最多一个 `HistoryListener`，注册时先回放历史
//!
//! # 实现思路
//!
//! - 观察者持有自己的多线程 tokio 运行时；检查与设置变更引起的磁盘操作都在其阻塞线程池上执行，
//!   调用方（通常是 UI 线程）不会因为磁盘 I/O 被阻塞。`clear_all` 例外：按约定同步执行。
//! - 每次 `start` 建立一个会话：协调任务句柄、请求发送端、停止标志。
//!   `stop` 终止协调任务并置位停止标志，监听线程在下一次事件时退出。
//! - 子模块按职责拆分：后端归 `backend`，检查归 `capture`，调度归 `coordinator`，
//!   系统变化监听归 `listener`，去重状态归 `dedup`，展示层通知归 `notify`。

mod backend;
mod capture;
mod config;
mod coordinator;
mod dedup;
mod listener;
mod notify;

pub use backend::{ClipboardBackend, SystemClipboard};
pub use capture::CheckOutcome;
pub use config::ObserverConfig;
pub use notify::HistoryListener;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use capture::ObserverCore;
use coordinator::{CheckRequest, REQUEST_QUEUE_CAPACITY};

use crate::error::AppError;
use crate::history::{EntryId, HistoryStore, ImageEntry};
use crate::settings::SettingsProvider;

/// 一次 `start` 到 `stop` 之间的运行状态
struct Session {
    stopped: Arc<AtomicBool>,
    requests: mpsc::Sender<CheckRequest>,
    task: JoinHandle<()>,
}

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{}锁中毒，继续使用恢复数据", name);
            poisoned.into_inner()
        }
    }
}

/// 剪贴板观察者
pub struct ClipboardObserver {
    core: Arc<ObserverCore>,
    runtime: Mutex<Option<Runtime>>,
    session: Mutex<Option<Session>>,
}

impl ClipboardObserver {
    /// 创建观察者（处于停止状态）。截图开关在此时从设置中读取一次。
    pub fn new(
        store: Arc<HistoryStore>,
        backend: Arc<dyn ClipboardBackend>,
        settings: Arc<dyn SettingsProvider>,
        config: ObserverConfig,
    ) -> Result<Self, AppError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("cliptrail-observer")
            .enable_time()
            .build()
            .map_err(|e| AppError::Runtime(format!("创建观察者运行时失败: {}", e)))?;

        Ok(Self {
            core: Arc::new(ObserverCore::new(store, backend, settings, config)),
            runtime: Mutex::new(Some(runtime)),
            session: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.core.store
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.core.config
    }

    // ========================================================================
    // 生命周期
    // ========================================================================

    /// 开始观察；已在观察或已关闭时什么都不做。
    pub fn start(&self) {
        let mut session = lock_or_recover(&self.session, "观察会话");
        if session.is_some() {
            log::debug!("剪贴板观察已在运行");
            return;
        }

        let runtime = lock_or_recover(&self.runtime, "观察者运行时");
        let Some(runtime) = runtime.as_ref() else {
            log::warn!("观察者已关闭，无法再次启动");
            return;
        };

        let (requests, receiver) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let stopped = Arc::new(AtomicBool::new(false));
        let task = runtime.spawn(coordinator::run(
            Arc::clone(&self.core),
            receiver,
            Arc::clone(&stopped),
        ));

        if self.core.config.watch_clipboard_events {
            if let Err(e) = listener::spawn_change_monitor(
                requests.clone(),
                Arc::clone(&stopped),
                self.core.config.setup_retry_delay,
            ) {
                log::error!("📋 无法启动剪贴板监听线程，仅使用轮询: {}", e);
            }
        }

        *session = Some(Session {
            stopped,
            requests,
            task,
        });
        log::info!("▶️ 剪贴板观察已启动");
    }

    /// 停止观察并释放剪贴板资源；可重复调用。
    pub fn stop(&self) {
        let Some(session) = lock_or_recover(&self.session, "观察会话").take() else {
            return;
        };
        session.stopped.store(true, Ordering::SeqCst);
        session.task.abort();
        drop(session.requests);

        self.core.backend.release();
        log::info!("⏹️ 剪贴板观察已停止");
    }

    /// 停止观察，在超时内等待后台任务与历史写入完成，之后观察者不能再启动。
    ///
    /// 从 tokio 运行时内部调用（或在其中 drop）时不等待后台任务，只等待历史写入。
    pub fn shutdown(&self) {
        self.stop();

        let runtime = lock_or_recover(&self.runtime, "观察者运行时").take();
        let Some(runtime) = runtime else {
            return;
        };
        let timeout = self.core.config.shutdown_timeout;
        // 在异步上下文中不能阻塞等待运行时退出，只能让它在后台关闭
        if tokio::runtime::Handle::try_current().is_ok() {
            log::debug!("在异步上下文中关闭观察者，运行时转为后台关闭");
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(timeout);
        }

        if !self.core.store.flush(timeout) {
            log::warn!("历史写入未在 {:?} 内完成", timeout);
        }
        self.core.backend.release();
        log::info!("👋 剪贴板观察者已关闭");
    }

    pub fn is_monitoring(&self) -> bool {
        lock_or_recover(&self.session, "观察会话").is_some()
    }

    /// 请求一次立即检查（手动刷新）；未在观察或队列已满时返回 `false`。
    pub fn request_check(&self) -> bool {
        lock_or_recover(&self.session, "观察会话")
            .as_ref()
            .is_some_and(|session| session.requests.try_send(CheckRequest::Poll).is_ok())
    }

    /// 在调用线程上同步执行一次检查，不需要处于观察状态。
    pub fn check_now(&self) -> CheckOutcome {
        self.core.run_check(CheckRequest::Poll)
    }

    // ========================================================================
    // 监听者
    // ========================================================================

    /// 注册监听者：先回放当前历史（从旧到新、不滚动），之后才会收到实时事件。
    pub fn set_listener(&self, listener: Arc<dyn HistoryListener>) {
        let store = Arc::clone(&self.core.store);
        self.core
            .listeners
            .install(listener, move || store.snapshot_entries());
    }

    pub fn clear_listener(&self) {
        self.core.listeners.remove();
    }

    // ========================================================================
    // 展示层操作
    // ========================================================================

    /// 把文本写入系统剪贴板，且不会被当作新的用户复制收录。
    pub fn copy_text_from_app(&self, text: &str) {
        match self.core.copy_text_from_app(text) {
            Ok(()) => log::debug!("📋 已写入剪贴板（{} 字符）", text.chars().count()),
            Err(e) => log::warn!("写入剪贴板失败: {}", e),
        }
    }

    pub fn remove_by_id(&self, id: EntryId) -> bool {
        self.core.store.remove_by_id(id)
    }

    pub fn remove_all_text_equal_to(&self, text: &str) -> usize {
        self.core.store.remove_all_text_equal_to(text)
    }

    /// 清空历史并通知监听者；在调用线程上同步完成。
    pub fn clear_all(&self) {
        self.core.clear_all();
    }

    /// 重新读取设置：截图开关立即生效，历史上限的裁剪在后台线程池上执行。
    pub fn apply_settings_change(&self) {
        self.core.refresh_capture_gate();

        let core = Arc::clone(&self.core);
        let retrim = move || {
            let max_items = core.settings.max_history_items().max(1);
            core.store.apply_new_max(max_items);
        };

        match lock_or_recover(&self.runtime, "观察者运行时").as_ref() {
            Some(runtime) => {
                runtime.spawn_blocking(retrim);
            }
            None => retrim(),
        }
    }

    pub fn get_clipboard_text_history(&self) -> Vec<String> {
        self.core.store.snapshot_text_entries()
    }

    pub fn get_screenshot_history(&self) -> Vec<ImageEntry> {
        self.core.store.snapshot_image_entries()
    }
}

impl Drop for ClipboardObserver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
