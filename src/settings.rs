//! 应用设置模块
//!
//! # 设计思路
//!
//! 设置文件由展示层维护，核心只读取其中两个字段：
//! `maxHistoryItems` 与 `captureScreenshots`。
//! 通过 `SettingsProvider` trait 注入，观察者与设置的存储格式解耦。
//!
//! # 实现思路
//!
//! - `Settings` 使用 camelCase 键，缺失字段取默认值，未知字段忽略。
//! - 文件损坏或不可读时回退默认设置并记录日志，不阻断启动。
//! - `max_history_items` 在读取侧钳制到 ≥ 1。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::storage::write_atomically;

pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 50;

/// 核心读取的设置能力
pub trait SettingsProvider: Send + Sync {
    /// 历史条目上限，至少为 1
    fn max_history_items(&self) -> usize;

    /// 是否捕获剪贴板中的图片（截图）
    fn capture_screenshots(&self) -> bool;
}

/// `settings.json` 的内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub max_history_items: i64,
    pub auto_start: bool,
    pub capture_screenshots: bool,
    pub show_support_counter: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS as i64,
            auto_start: false,
            capture_screenshots: true,
            show_support_counter: 0,
        }
    }
}

impl Settings {
    /// 钳制后的历史上限
    pub fn effective_max_history_items(&self) -> usize {
        if self.max_history_items < 1 {
            log::warn!(
                "maxHistoryItems={} 无效，按 1 处理",
                self.max_history_items
            );
            return 1;
        }
        usize::try_from(self.max_history_items).unwrap_or(usize::MAX)
    }
}

impl SettingsProvider for Settings {
    fn max_history_items(&self) -> usize {
        self.effective_max_history_items()
    }

    fn capture_screenshots(&self) -> bool {
        self.capture_screenshots
    }
}

fn load_settings_from_path(path: &Path) -> Settings {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
        Err(e) => {
            log::warn!("读取设置文件失败，使用默认设置: {}", e);
            return Settings::default();
        }
    };

    match serde_json::from_str::<Settings>(&content) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("解析设置文件失败，使用默认设置: {}", e);
            Settings::default()
        }
    }
}

/// 基于 `settings.json` 的设置存储
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// 加载设置文件，失败时使用默认值
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = load_settings_from_path(&path);
        log::info!(
            "⚙️ 设置已加载: maxHistoryItems={}, captureScreenshots={}",
            current.max_history_items,
            current.capture_screenshots
        );
        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 重新读取磁盘上的设置（展示层写完文件后调用）
    pub fn reload(&self) {
        let fresh = load_settings_from_path(&self.path);
        *self.write_guard() = fresh;
    }

    pub fn snapshot(&self) -> Settings {
        self.read_guard().clone()
    }

    /// 修改设置并原子写回磁盘
    pub fn update(&self, mutate: impl FnOnce(&mut Settings)) -> Result<Settings, AppError> {
        let updated = {
            let mut guard = self.write_guard();
            mutate(&mut guard);
            guard.clone()
        };

        let content = serde_json::to_string_pretty(&updated)
            .map_err(|e| AppError::Storage(format!("序列化设置失败: {}", e)))?;
        write_atomically(&self.path, content.as_bytes())?;
        Ok(updated)
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Settings> {
        match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("设置读锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("设置写锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }
}

impl SettingsProvider for SettingsStore {
    fn max_history_items(&self) -> usize {
        self.read_guard().effective_max_history_items()
    }

    fn capture_screenshots(&self) -> bool {
        self.read_guard().capture_screenshots
    }
}
