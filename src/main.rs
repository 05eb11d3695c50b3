//! # cliptrail：后台服务入口
//!
//! 本文件只负责初始化与生命周期：日志、目录、设置、历史加载、观察者启动，
//! 然后等待 Ctrl-C 并有序关闭。业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::sync::Arc;

use cliptrail::clipboard::{ClipboardObserver, HistoryListener, ObserverConfig, SystemClipboard};
use cliptrail::error::AppError;
use cliptrail::history::{HistoryStore, ImageEntry};
use cliptrail::image_handler::{ImageArtifacts, ImageConfig};
use cliptrail::settings::{SettingsProvider, SettingsStore};
use cliptrail::storage::AppPaths;

/// 没有展示层时，把通知写进日志
struct LogListener;

impl HistoryListener for LogListener {
    fn on_text_changed(&self, text: &str, should_notify_scroll: bool) {
        if should_notify_scroll {
            log::info!("📝 新文本（{} 字符）", text.chars().count());
        }
    }

    fn on_image_added(&self, entry: &ImageEntry) {
        log::info!("📸 新截图: {}", entry.full_image_path.display());
    }

    fn on_history_cleared(&self) {
        log::info!("🗑️ 历史已清空");
    }
}

fn run() -> Result<(), AppError> {
    let paths = AppPaths::resolve();
    paths.ensure_dirs()?;
    log::info!("📂 数据目录: {}", paths.root().display());

    let settings = Arc::new(SettingsStore::load(paths.settings_file()));
    let artifacts = ImageArtifacts::new(paths.screenshots_dir(), ImageConfig::default());
    let store = Arc::new(HistoryStore::open(
        paths.history_file(),
        artifacts,
        settings.max_history_items(),
    )?);
    store.load_from_disk();
    store.sweep_orphan_images();
    let usage = store.artifacts().usage();
    log::info!("🖼️ 截图目录 {} 个文件，共 {} 字节", usage.file_count, usage.total_size);

    let observer = ClipboardObserver::new(
        Arc::clone(&store),
        Arc::new(SystemClipboard::new()),
        settings,
        ObserverConfig::default(),
    )?;
    observer.set_listener(Arc::new(LogListener));
    observer.start();

    let signal_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Runtime(format!("创建信号运行时失败: {}", e)))?;
    if let Err(e) = signal_runtime.block_on(tokio::signal::ctrl_c()) {
        log::error!("等待退出信号失败: {}", e);
    }
    log::info!("收到退出信号，正在关闭…");

    observer.shutdown();
    if !store.shutdown(observer.config().shutdown_timeout) {
        log::warn!("历史写入未在超时内完成");
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("启动失败: {}", e);
        std::process::exit(1);
    }
}
