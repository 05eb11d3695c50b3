//! 内容指纹模块
//!
//! # 设计思路
//!
//! 去重只需要“便宜且进程内稳定”的指纹，不需要抗碰撞的密码学哈希。
//! 文本直接对 UTF-8 字节做 xxh3；图片只对宽高和约 10×10 的采样网格取 RGB，
//! 这样大截图的去重开销与分辨率无关。
//!
//! # 实现思路
//!
//! - 采样步长 `max(1, 边长 / 10)`，1×1 的退化图片也不会除零。
//! - 忽略 alpha 通道：同一张截图在不同平台上的 alpha 处理可能不一致。
//! - 图片缓冲区异常时返回 `ImageError`，由调用方回退到时间戳指纹。

use std::fmt;

use chrono::Utc;
use twox_hash::xxh3::hash64;

use crate::image_handler::{ImageError, RawImage};

const SAMPLE_GRID: usize = 10;

/// 内容指纹，仅用于相等判断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// 文本指纹。调用方负责先跳过空白文本。
pub fn hash_text(text: &str) -> Fingerprint {
    Fingerprint(hash64(text.as_bytes()))
}

/// 图片指纹：宽、高与稀疏网格上的 RGB 采样。
pub fn hash_image(image: &RawImage) -> Result<Fingerprint, ImageError> {
    let (width, height) = (image.width, image.height);
    if width == 0 || height == 0 {
        return Err(ImageError::Decode(format!("图片尺寸无效：{}x{}", width, height)));
    }

    let expected_len = image
        .expected_len()
        .ok_or_else(|| ImageError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))?;
    if image.bytes.len() < expected_len {
        return Err(ImageError::InvalidFormat(format!(
            "像素数据长度不足：{} < {}",
            image.bytes.len(),
            expected_len
        )));
    }

    let step_x = (width / SAMPLE_GRID).max(1);
    let step_y = (height / SAMPLE_GRID).max(1);

    let mut sample = Vec::with_capacity(16 + (SAMPLE_GRID + 1) * (SAMPLE_GRID + 1) * 3);
    sample.extend_from_slice(&(width as u64).to_le_bytes());
    sample.extend_from_slice(&(height as u64).to_le_bytes());

    for y in (0..height).step_by(step_y) {
        for x in (0..width).step_by(step_x) {
            let offset = (y * width + x) * 4;
            sample.extend_from_slice(&image.bytes[offset..offset + 3]);
        }
    }

    Ok(Fingerprint(hash64(&sample)))
}

/// 解码失败时的兜底指纹：保证流程继续，但这一次无法去重。
pub fn fallback_fingerprint() -> Fingerprint {
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros());
    Fingerprint(nanos as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(width: usize, height: usize, rgba: [u8; 4]) -> RawImage {
        let bytes = rgba.iter().copied().cycle().take(width * height * 4).collect();
        RawImage::new(width, height, bytes)
    }

    #[test]
    fn text_hash_is_deterministic_and_discriminating() {
        assert_eq!(hash_text("hello"), hash_text("hello"));
        assert_ne!(hash_text("hello"), hash_text("hello "));
    }

    #[test]
    fn identical_images_share_fingerprint() {
        let a = filled(64, 48, [10, 20, 30, 255]);
        let b = filled(64, 48, [10, 20, 30, 255]);
        assert_eq!(hash_image(&a).unwrap(), hash_image(&b).unwrap());
    }

    #[test]
    fn alpha_is_ignored() {
        let opaque = filled(20, 20, [10, 20, 30, 255]);
        let translucent = filled(20, 20, [10, 20, 30, 7]);
        assert_eq!(hash_image(&opaque).unwrap(), hash_image(&translucent).unwrap());
    }

    #[test]
    fn dimensions_participate_in_hash() {
        let wide = filled(40, 10, [1, 2, 3, 255]);
        let tall = filled(10, 40, [1, 2, 3, 255]);
        assert_ne!(hash_image(&wide).unwrap(), hash_image(&tall).unwrap());
    }

    #[test]
    fn sampled_pixel_change_changes_hash() {
        let base = filled(30, 30, [0, 0, 0, 255]);
        let mut changed = base.clone();
        // (0, 0) 一定在采样网格上
        changed.bytes[0] = 255;
        assert_ne!(hash_image(&base).unwrap(), hash_image(&changed).unwrap());
    }

    #[test]
    fn degenerate_one_pixel_image_hashes() {
        let tiny = filled(1, 1, [9, 9, 9, 255]);
        assert!(hash_image(&tiny).is_ok());
    }

    #[test]
    fn broken_buffers_are_errors() {
        assert!(hash_image(&RawImage::new(0, 0, Vec::new())).is_err());
        assert!(hash_image(&RawImage::new(10, 10, vec![0; 12])).is_err());
    }
}
