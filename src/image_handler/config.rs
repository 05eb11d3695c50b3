//! # 配置模块
//!
//! ## 设计思路
//!
//! 将截图落盘相关的“可调策略”集中到 `ImageConfig`，保证运行时行为可观测、可测试。
//! `Default` 提供生产可用的配置，测试可按需覆盖单个字段。

use fast_image_resize as fr;

/// 截图落盘配置。
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// 缩略图宽/高单边最大值（像素），等比缩放且不放大。
    pub thumbnail_max_dimension: u32,
    /// 缩略图平滑缩放使用的卷积滤镜。
    pub thumbnail_filter: fr::FilterType,
    /// 解码后允许的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            thumbnail_max_dimension: 120,
            thumbnail_filter: fr::FilterType::Lanczos3,
            max_decoded_pixels: 40_000_000,
        }
    }
}

/// 计算等比缩放后的缩略图尺寸。
///
/// 结果两边都不超过 `max_dimension`，不放大原图，且每边至少 1 像素。
pub fn thumbnail_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let max_dimension = max_dimension.max(1);
    if width <= max_dimension && height <= max_dimension {
        return (width.max(1), height.max(1));
    }

    let scale = (max_dimension as f64 / width.max(1) as f64)
        .min(max_dimension as f64 / height.max(1) as f64);

    let target_width = ((width as f64 * scale).round() as u32).clamp(1, max_dimension);
    let target_height = ((height as f64 * scale).round() as u32).clamp(1, max_dimension);
    (target_width, target_height)
}

#[cfg(test)]
mod tests {
    use super::thumbnail_dimensions;

    #[test]
    fn small_images_are_not_upscaled() {
        assert_eq!(thumbnail_dimensions(40, 30, 120), (40, 30));
        assert_eq!(thumbnail_dimensions(1, 1, 120), (1, 1));
    }

    #[test]
    fn landscape_fits_width() {
        assert_eq!(thumbnail_dimensions(1920, 1080, 120), (120, 68));
    }

    #[test]
    fn portrait_fits_height() {
        assert_eq!(thumbnail_dimensions(300, 1200, 120), (30, 120));
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        assert_eq!(thumbnail_dimensions(10_000, 2, 120), (120, 1));
    }
}
