//! 剪贴板访问后端
//!
//! 观察者只通过 `ClipboardBackend` 接触系统剪贴板，测试可以注入内存实现。

use std::sync::{Mutex, MutexGuard};

use arboard::Clipboard;

use crate::error::AppError;
use crate::image_handler::RawImage;

/// 系统剪贴板的最小访问面
pub trait ClipboardBackend: Send + Sync {
    /// 当前剪贴板文本；没有文本时返回 `Ok(None)`。
    fn read_text(&self) -> Result<Option<String>, AppError>;

    /// 当前剪贴板图片（RGBA8）；没有图片时返回 `Ok(None)`。
    fn read_image(&self) -> Result<Option<RawImage>, AppError>;

    fn write_text(&self, text: &str) -> Result<(), AppError>;

    /// 释放持有的剪贴板资源（所有权、句柄）。
    fn release(&self);
}

/// 基于 `arboard` 的系统剪贴板
///
/// 句柄在首次使用时创建；任何非“内容不可用”的错误都会丢弃句柄，下次访问时重建。
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<Clipboard>> {
        match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("剪贴板句柄锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    fn with_clipboard<T>(
        &self,
        op: impl FnOnce(&mut Clipboard) -> Result<T, arboard::Error>,
    ) -> Result<Option<T>, AppError> {
        let mut guard = self.lock_handle();
        if guard.is_none() {
            let clipboard = Clipboard::new()
                .map_err(|e| AppError::Clipboard(format!("无法访问系统剪贴板: {}", e)))?;
            *guard = Some(clipboard);
        }
        let clipboard = guard
            .as_mut()
            .ok_or_else(|| AppError::Clipboard("剪贴板句柄不可用".to_string()))?;

        match op(clipboard) {
            Ok(value) => Ok(Some(value)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => {
                log::debug!("剪贴板句柄出错，下次访问时重建: {}", e);
                *guard = None;
                Err(AppError::Clipboard(e.to_string()))
            }
        }
    }
}

impl ClipboardBackend for SystemClipboard {
    fn read_text(&self) -> Result<Option<String>, AppError> {
        self.with_clipboard(|clipboard| clipboard.get_text())
    }

    fn read_image(&self) -> Result<Option<RawImage>, AppError> {
        Ok(self
            .with_clipboard(|clipboard| clipboard.get_image())?
            .map(RawImage::from))
    }

    fn write_text(&self, text: &str) -> Result<(), AppError> {
        self.with_clipboard(|clipboard| clipboard.set_text(text.to_owned()))?;
        Ok(())
    }

    fn release(&self) {
        if self.lock_handle().take().is_some() {
            log::debug!("📋 已释放系统剪贴板句柄");
        }
    }
}
