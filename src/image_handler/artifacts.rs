//! # 截图文件管理
//!
//! ## 设计思路
//!
//! 截图以“原图 + 缩略图”成对落盘到专用目录，历史快照中只保存路径。
//! 文件名由时间戳前缀与随机 id 组成：
//!
//! ```text
//! screenshots/
//!   20261018093015123_3f2a….png        原图
//!   20261018093015123_3f2a…_thumb.png  缩略图（≤ 120×120）
//! ```
//!
//! 删除是尽力而为：文件可能已被用户或上一次清理删掉，失败只记日志。

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use image::{ImageFormat, RgbaImage};
use uuid::Uuid;

use super::pipeline::make_thumbnail;
use super::{ImageConfig, ImageError, StoredImage};
use crate::storage::StorageInfo;

const THUMBNAIL_SUFFIX: &str = "_thumb";

/// 截图目录句柄，可廉价克隆并跨线程共享。
#[derive(Debug, Clone)]
pub struct ImageArtifacts {
    dir: PathBuf,
    config: ImageConfig,
}

impl ImageArtifacts {
    pub fn new(dir: impl Into<PathBuf>, config: ImageConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// 确保截图目录存在（幂等）。
    pub fn ensure_dir(&self) -> Result<(), ImageError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ImageError::FileSystem(format!("创建截图目录 '{}' 失败: {}", self.dir.display(), e))
        })
    }

    /// 写入原图与缩略图，返回两者路径。
    ///
    /// 任一文件写入失败时会清理已写出的另一半，避免留下孤儿文件。
    pub fn store(&self, image: &RgbaImage) -> Result<StoredImage, ImageError> {
        self.ensure_dir()?;

        let stem = format!(
            "{}_{}",
            Local::now().format("%Y%m%d%H%M%S%3f"),
            Uuid::new_v4().simple()
        );
        let full_image_path = self.dir.join(format!("{stem}.png"));
        let thumbnail_path = self.dir.join(format!("{stem}{THUMBNAIL_SUFFIX}.png"));

        image
            .save_with_format(&full_image_path, ImageFormat::Png)
            .map_err(|e| ImageError::Encode(format!("保存原图失败: {}", e)))?;

        let thumbnail = make_thumbnail(image, &self.config);
        if let Err(e) = thumbnail.save_with_format(&thumbnail_path, ImageFormat::Png) {
            remove_quietly(&full_image_path);
            return Err(ImageError::Encode(format!("保存缩略图失败: {}", e)));
        }

        log::debug!(
            "🖼️ 截图已保存: {} ({}x{})",
            full_image_path.display(),
            image.width(),
            image.height()
        );

        Ok(StoredImage {
            thumbnail_path,
            full_image_path,
        })
    }

    /// 尽力删除一对截图文件。
    pub fn delete(&self, thumbnail_path: &Path, full_image_path: &Path) {
        remove_quietly(thumbnail_path);
        remove_quietly(full_image_path);
    }

    /// 删除目录中未被任何条目引用的截图文件，返回删除数量。
    pub fn remove_orphans(&self, referenced: &HashSet<PathBuf>) -> usize {
        let referenced_names: HashSet<OsString> = referenced
            .iter()
            .filter_map(|path| path.file_name().map(|name| name.to_os_string()))
            .collect();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                log::warn!("读取截图目录失败 '{}': {}", self.dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_generated_png(&path) || referenced_names.contains(&entry.file_name()) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("删除孤儿截图失败 '{}': {}", path.display(), e),
            }
        }

        if removed > 0 {
            log::info!("🧹 已清理 {} 个孤儿截图文件", removed);
        }
        removed
    }

    /// 截图目录信息（路径 + 占用大小 + 文件数）
    pub fn usage(&self) -> StorageInfo {
        let mut total_size: u64 = 0;
        let mut file_count: u64 = 0;

        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    if metadata.is_file() {
                        total_size += metadata.len();
                        file_count += 1;
                    }
                }
            }
        }

        StorageInfo {
            path: self.dir.to_string_lossy().to_string(),
            total_size,
            file_count,
        }
    }
}

fn is_generated_png(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("删除截图文件失败 '{}': {}", path.display(), e),
    }
}
