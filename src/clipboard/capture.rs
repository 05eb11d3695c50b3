//! 单次剪贴板检查
//!
//! # 实现思路
//!
//! 一次检查依次处理图片与文本，两者互不影响：
//! 1. 自身写入冷却期内直接跳过
//! 2. 图片（开启截图捕获时）：指纹 → 窗口去重 → 解码 → 落盘 → 入库 → 通知
//! 3. 文本：跳过空白 → 与上一次文本指纹比较 → 入库 → 通知
//! 4. 由剪贴板变化触发且当前只有文本时，重新写回文本以取得所有权
//!
//! 检查之间由协调任务串行化；`check_now` 与协调任务并发时，
//! 指纹状态的原子比较保证同一内容只入库一次。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::backend::ClipboardBackend;
use super::config::ObserverConfig;
use super::coordinator::CheckRequest;
use super::dedup::{LastText, RecentImageHashes, SelfCopyCooldown};
use super::notify::ListenerSlot;
use crate::error::AppError;
use crate::hasher::{fallback_fingerprint, hash_image, hash_text};
use crate::history::HistoryStore;
use crate::image_handler::decode_raw;
use crate::settings::SettingsProvider;

/// 单次检查的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    /// 处于自身写入冷却期，整次检查被跳过
    pub skipped_self_copy: bool,
    pub text_added: bool,
    pub image_added: bool,
}

enum ImageCheck {
    Absent,
    Present { added: bool },
}

/// 观察者各执行上下文共享的状态
pub(crate) struct ObserverCore {
    pub(crate) store: Arc<HistoryStore>,
    pub(crate) backend: Arc<dyn ClipboardBackend>,
    pub(crate) settings: Arc<dyn SettingsProvider>,
    pub(crate) config: ObserverConfig,
    pub(crate) capture_screenshots: AtomicBool,
    pub(crate) recent_images: RecentImageHashes,
    pub(crate) last_text: LastText,
    pub(crate) self_copy: SelfCopyCooldown,
    pub(crate) listeners: ListenerSlot,
}

impl ObserverCore {
    pub(crate) fn new(
        store: Arc<HistoryStore>,
        backend: Arc<dyn ClipboardBackend>,
        settings: Arc<dyn SettingsProvider>,
        config: ObserverConfig,
    ) -> Self {
        let capture_screenshots = settings.capture_screenshots();
        Self {
            recent_images: RecentImageHashes::new(
                config.image_dedup_window,
                config.image_hash_prune_threshold,
            ),
            store,
            backend,
            settings,
            config,
            capture_screenshots: AtomicBool::new(capture_screenshots),
            last_text: LastText::default(),
            self_copy: SelfCopyCooldown::default(),
            listeners: ListenerSlot::default(),
        }
    }

    pub(crate) fn run_check(&self, request: CheckRequest) -> CheckOutcome {
        if self.self_copy.is_active() {
            log::debug!("⏭️ 自身写入冷却期内，跳过本次检查（{:?}）", request);
            return CheckOutcome {
                skipped_self_copy: true,
                ..CheckOutcome::default()
            };
        }

        let mut outcome = CheckOutcome::default();

        let mut image_present = None;
        if self.capture_screenshots.load(Ordering::SeqCst) {
            match self.check_image() {
                Ok(ImageCheck::Absent) => image_present = Some(false),
                Ok(ImageCheck::Present { added }) => {
                    image_present = Some(true);
                    outcome.image_added = added;
                }
                Err(e) => log::warn!("截图检查失败: {}", e),
            }
        }

        match self.check_text() {
            Ok(Some((text, added))) => {
                outcome.text_added = added;
                if request == CheckRequest::OwnershipLost && self.config.reclaim_text_ownership {
                    self.reclaim_text(&text, image_present);
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("文本检查失败: {}", e),
        }

        outcome
    }

    fn check_image(&self) -> Result<ImageCheck, AppError> {
        let Some(raw) = self.backend.read_image()? else {
            return Ok(ImageCheck::Absent);
        };

        let fingerprint = hash_image(&raw).unwrap_or_else(|e| {
            log::debug!("图片指纹计算失败，使用时间戳指纹: {}", e);
            fallback_fingerprint()
        });
        if !self.recent_images.observe(fingerprint, Instant::now()) {
            log::trace!("⏭️ 重复截图 {}，跳过", fingerprint);
            return Ok(ImageCheck::Present { added: false });
        }

        // 指纹先占位，保证并发检查不会重复入库；落盘失败时撤销，下次检查重试
        let artifacts = self.store.artifacts();
        let stored = match decode_raw(&raw, artifacts.config())
            .and_then(|decoded| artifacts.store(&decoded))
        {
            Ok(stored) => stored,
            Err(e) => {
                self.recent_images.forget(fingerprint);
                return Err(e.into());
            }
        };
        let id = self
            .store
            .add_image(stored.thumbnail_path, stored.full_image_path);
        log::info!("📸 已捕获截图 {}x{}（{}）", raw.width, raw.height, id);

        if let Some(entry) = self.store.get(id) {
            if let Some(image) = entry.image_entry() {
                self.listeners.image_added(&image, entry.sequence);
            }
        }
        Ok(ImageCheck::Present { added: true })
    }

    /// 返回当前剪贴板文本以及它是否被新加入历史。
    fn check_text(&self) -> Result<Option<(String, bool)>, AppError> {
        let Some(text) = self.backend.read_text()? else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            return Ok(None);
        }

        if !self.last_text.replace_if_changed(hash_text(&text)) {
            return Ok(Some((text, false)));
        }

        let added = match self.store.add_text(&text) {
            Some(id) => {
                log::debug!("📝 新文本条目 {}（{} 字符）", id, text.chars().count());
                // 紧接着的下一次插入可能已把它挤出历史，此时不再通知
                if let Some(entry) = self.store.get(id) {
                    self.listeners.text_changed(&text, entry.sequence);
                }
                true
            }
            None => false,
        };
        Ok(Some((text, added)))
    }

    /// 写回文本取得所有权。剪贴板上同时有图片时不写回，以免丢掉图片表示。
    fn reclaim_text(&self, text: &str, image_present: Option<bool>) {
        let has_image = match image_present {
            Some(present) => present,
            None => matches!(self.backend.read_image(), Ok(Some(_))),
        };
        if has_image {
            return;
        }

        self.self_copy.arm(self.config.self_copy_cooldown);
        match self.backend.write_text(text) {
            Ok(()) => log::trace!("📋 已重新取得剪贴板所有权"),
            Err(e) => log::debug!("重新取得剪贴板所有权失败: {}", e),
        }
    }

    /// 应用自身写入：先进入冷却期并记录指纹，再写剪贴板。
    pub(crate) fn copy_text_from_app(&self, text: &str) -> Result<(), AppError> {
        self.self_copy.arm(self.config.self_copy_cooldown);
        self.last_text.set(hash_text(text));
        self.backend.write_text(text)
    }

    /// 重新读取截图开关。
    pub(crate) fn refresh_capture_gate(&self) {
        let capture = self.settings.capture_screenshots();
        if self.capture_screenshots.swap(capture, Ordering::SeqCst) != capture {
            log::info!("⚙️ 截图捕获已{}", if capture { "开启" } else { "关闭" });
        }
    }

    /// 清空历史；去重状态保留，剪贴板上现有的内容不会被立即重新收录。
    pub(crate) fn clear_all(&self) {
        self.store.clear();
        self.listeners.history_cleared();
    }
}
