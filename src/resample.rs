//! # 最近邻重采样
//!
//! 遮罩与试穿图尺寸对齐都只允许最近邻：插值会在遮罩边缘引入中间灰度，
//! 在试穿图上则会混入不属于该服装的像素。
//!
//! 优先使用 `fast_image_resize`，失败时回退 `image::imageops::resize`。

use fast_image_resize as fr;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

/// 单通道最近邻缩放，尺寸相同直接返回副本。
pub(crate) fn gray_nearest(src: &GrayImage, width: u32, height: u32) -> GrayImage {
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    if width == 0 || height == 0 || src.width() == 0 || src.height() == 0 {
        return GrayImage::new(width, height);
    }

    match fast_nearest(src.as_raw(), src.dimensions(), (width, height), fr::PixelType::U8)
        .and_then(|buf| GrayImage::from_raw(width, height, buf))
    {
        Some(resized) => resized,
        None => {
            log::warn!("⚠️ fast_image_resize 遮罩缩放失败，回退 image::resize");
            imageops::resize(src, width, height, FilterType::Nearest)
        }
    }
}

/// RGBA 最近邻缩放，尺寸相同直接返回副本。
pub(crate) fn rgba_nearest(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    if width == 0 || height == 0 || src.width() == 0 || src.height() == 0 {
        return RgbaImage::new(width, height);
    }

    match fast_nearest(src.as_raw(), src.dimensions(), (width, height), fr::PixelType::U8x4)
        .and_then(|buf| RgbaImage::from_raw(width, height, buf))
    {
        Some(resized) => resized,
        None => {
            log::warn!("⚠️ fast_image_resize 位图缩放失败，回退 image::resize");
            imageops::resize(src, width, height, FilterType::Nearest)
        }
    }
}

fn fast_nearest(
    raw: &[u8],
    (src_width, src_height): (u32, u32),
    (dst_width, dst_height): (u32, u32),
    pixel_type: fr::PixelType,
) -> Option<Vec<u8>> {
    let src_image = fr::images::Image::from_vec_u8(src_width, src_height, raw.to_vec(), pixel_type)
        .map_err(|e| log::debug!("构建源图像缓冲失败：{}", e))
        .ok()?;
    let mut dst_image = fr::images::Image::new(dst_width, dst_height, pixel_type);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Nearest);
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| log::debug!("fast_image_resize 执行失败：{}", e))
        .ok()?;

    Some(dst_image.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn nearest_upscale_never_invents_values() {
        let src = GrayImage::from_fn(4, 4, |x, _| if x < 2 { Luma([0]) } else { Luma([255]) });

        let resized = gray_nearest(&src, 9, 7);

        assert_eq!(resized.dimensions(), (9, 7));
        assert!(resized.as_raw().iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn same_size_is_identity() {
        let src = RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8, y as u8, 7, 255]));

        assert_eq!(rgba_nearest(&src, 3, 2), src);
    }
}
