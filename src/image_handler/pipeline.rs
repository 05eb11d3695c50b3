//! # 解码与缩略图流水线模块
//!
//! ## 设计思路
//!
//! 将“剪贴板原始像素 → 规范 RGBA 图像 → 缩略图”的过程集中管理，
//! 并在关键节点增加资源上限控制。
//!
//! ## 实现思路
//!
//! 1. 校验宽高与像素上限
//! 2. 校验缓冲区长度（部分平台会在行尾带填充字节，只取前 `w*h*4`）
//! 3. 构造 `RgbaImage`
//! 4. 缩略图优先走 `fast_image_resize`，失败时回退 `image::imageops::resize`

use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgba, RgbaImage};

use super::config::thumbnail_dimensions;
use super::{ImageConfig, ImageError, RawImage};

/// 将剪贴板原始像素解码为规范的 `RgbaImage`。
pub fn decode_raw(raw: &RawImage, config: &ImageConfig) -> Result<RgbaImage, ImageError> {
    if raw.width == 0 || raw.height == 0 {
        return Err(ImageError::Decode(format!(
            "图片尺寸无效：{}x{}",
            raw.width, raw.height
        )));
    }

    let pixels = (raw.width as u64)
        .checked_mul(raw.height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;
    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    let expected_len = raw
        .expected_len()
        .ok_or_else(|| ImageError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))?;
    if raw.bytes.len() < expected_len {
        return Err(ImageError::InvalidFormat(format!(
            "像素数据长度不足：{} < {}",
            raw.bytes.len(),
            expected_len
        )));
    }

    let width = u32::try_from(raw.width)
        .map_err(|_| ImageError::ResourceLimit("图片宽度超出范围".to_string()))?;
    let height = u32::try_from(raw.height)
        .map_err(|_| ImageError::ResourceLimit("图片高度超出范围".to_string()))?;

    RgbaImage::from_raw(width, height, raw.bytes[..expected_len].to_vec())
        .ok_or_else(|| ImageError::Decode("创建图像缓冲区失败".to_string()))
}

/// 生成等比缩放的缩略图。
pub fn make_thumbnail(image: &RgbaImage, config: &ImageConfig) -> RgbaImage {
    let (width, height) = image.dimensions();
    let (target_width, target_height) =
        thumbnail_dimensions(width, height, config.thumbnail_max_dimension);

    if (target_width, target_height) == (width, height) {
        return image.clone();
    }

    match resize_with_fast_image_resize(image, target_width, target_height, config.thumbnail_filter) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!(
                "⚠️ fast_image_resize 缩略图失败，回退 image::resize：{}",
                err
            );
            image::imageops::resize(image, target_width, target_height, FilterType::Triangle)
        }
    }
}

fn resize_with_fast_image_resize(
    image: &RgbaImage,
    target_width: u32,
    target_height: u32,
    filter: fr::FilterType,
) -> Result<RgbaImage, ImageError> {
    let (src_width, src_height) = image.dimensions();

    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        image.as_raw().clone(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(filter));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize) -> RawImage {
        RawImage::new(width, height, vec![200; width * height * 4])
    }

    #[test]
    fn decode_rejects_zero_dimensions() {
        let result = decode_raw(&RawImage::new(0, 5, Vec::new()), &ImageConfig::default());
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let raw = RawImage::new(4, 4, vec![0; 10]);
        assert!(matches!(
            decode_raw(&raw, &ImageConfig::default()),
            Err(ImageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn decode_ignores_trailing_padding() {
        let mut raw = solid(3, 2);
        raw.bytes.extend_from_slice(&[0; 8]);
        let image = decode_raw(&raw, &ImageConfig::default()).expect("decode should succeed");
        assert_eq!(image.dimensions(), (3, 2));
    }

    #[test]
    fn decode_enforces_pixel_limit() {
        let config = ImageConfig {
            max_decoded_pixels: 10,
            ..ImageConfig::default()
        };
        assert!(matches!(
            decode_raw(&solid(4, 4), &config),
            Err(ImageError::ResourceLimit(_))
        ));
    }

    #[test]
    fn thumbnail_is_bounded_and_keeps_aspect() {
        let image = decode_raw(&solid(480, 240), &ImageConfig::default()).expect("decode");
        let thumb = make_thumbnail(&image, &ImageConfig::default());
        assert_eq!(thumb.dimensions(), (120, 60));
    }

    #[test]
    fn thumbnail_of_tiny_image_is_a_copy() {
        let image = decode_raw(&solid(1, 1), &ImageConfig::default()).expect("decode");
        let thumb = make_thumbnail(&image, &ImageConfig::default());
        assert_eq!(thumb.dimensions(), (1, 1));
    }
}
