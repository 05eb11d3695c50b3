//! 应用数据目录管理模块
//!
//! # 设计思路
//!
//! 统一管理历史快照、设置文件与截图目录的持久化路径，
//! 并在目录不存在时自动创建。
//!
//! # 实现思路
//!
//! - 默认使用用户级数据目录（`dirs::data_dir()`）下的 `cliptrail` 子目录。
//! - 取不到系统数据目录时回退到当前工作目录，保证服务仍可运行。
//! - 测试或自定义部署可通过 `AppPaths::at` 指定根目录。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;

const APP_DIR_NAME: &str = "cliptrail";
const HISTORY_FILE_NAME: &str = "history.json";
const SETTINGS_FILE_NAME: &str = "settings.json";
const SCREENSHOTS_DIR_NAME: &str = "screenshots";

/// 存储目录信息
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub path: String,
    pub total_size: u64,
    pub file_count: u64,
}

/// 用户级应用目录布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// 解析默认的用户级应用目录
    pub fn resolve() -> Self {
        let root = match dirs::data_dir() {
            Some(dir) => dir.join(APP_DIR_NAME),
            None => {
                log::warn!("无法获取系统数据目录，回退到当前目录");
                PathBuf::from(".").join(APP_DIR_NAME)
            }
        };
        Self { root }
    }

    /// 使用指定根目录
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn history_file(&self) -> PathBuf {
        self.root.join(HISTORY_FILE_NAME)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE_NAME)
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join(SCREENSHOTS_DIR_NAME)
    }

    /// 创建根目录与截图目录（幂等）
    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        for dir in [self.root.clone(), self.screenshots_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                AppError::Storage(format!("创建目录 '{}' 失败: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

/// 原子写入：先写同目录临时文件，再 rename 覆盖目标。
///
/// 进程在写入中途崩溃时，目标文件要么是旧内容，要么是新内容。
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| AppError::Storage(format!("无效的文件路径: {}", path.display())))?;
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}
