//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“剪贴板原始像素”和“落盘结果”解耦：
//! - `RawImage` 表示从系统剪贴板读出、尚未校验的 RGBA 像素
//! - `StoredImage` 表示已写入截图目录的原图 + 缩略图路径对

use std::path::PathBuf;

/// 剪贴板读取阶段输出：未经校验的 RGBA8 像素。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    /// 图像宽度（像素）。
    pub width: usize,
    /// 图像高度（像素）。
    pub height: usize,
    /// RGBA 字节数组（期望长度 `width * height * 4`）。
    pub bytes: Vec<u8>,
}

impl RawImage {
    pub fn new(width: usize, height: usize, bytes: Vec<u8>) -> Self {
        Self { width, height, bytes }
    }

    /// 期望的缓冲区长度，溢出时返回 `None`。
    pub fn expected_len(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)
            .and_then(|pixels| pixels.checked_mul(4))
    }
}

impl From<arboard::ImageData<'_>> for RawImage {
    fn from(data: arboard::ImageData<'_>) -> Self {
        Self {
            width: data.width,
            height: data.height,
            bytes: data.bytes.into_owned(),
        }
    }
}

/// 落盘阶段输出：原图与缩略图的绝对路径。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub thumbnail_path: PathBuf,
    pub full_image_path: PathBuf,
}
