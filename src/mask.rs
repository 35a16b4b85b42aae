//! # 遮罩规范化
//!
//! ## 设计思路
//!
//! 服务端给出的区域遮罩可能是白底黑字、黑底白字、带透明通道的 PNG，
//! 尺寸也不一定与身体图一致。合成前统一转成“与身体图同尺寸的严格二值单通道图”。
//!
//! ## 实现思路
//!
//! 1. 单通道化：`luma(r,g,b) * a / 255`，luma 使用 BT.601 整数权重。
//!    白色画在黑底上、或不透明画在透明底上的遮罩都能得到正确的前景。
//! 2. 最近邻缩放到目标尺寸（尺寸一致时跳过）。
//! 3. 阈值化：`> MASK_THRESHOLD` 视为 255，否则为 0。
//!
//! 最近邻 + 阈值保证结果只含 0/255，且对已规范化的遮罩再次规范化结果不变。

use image::{GrayImage, Luma};

use crate::bitmap::{Bitmap, MASK_OPAQUE, MASK_TRANSPARENT, Mask};
use crate::resample;

/// 阈值：采样值严格大于该值才视为前景。
pub const MASK_THRESHOLD: u8 = 1;

const LUMA_R: u32 = 299;
const LUMA_G: u32 = 587;
const LUMA_B: u32 = 114;

/// 将任意 RGBA 遮罩图规范化为 `width × height` 的二值遮罩。
///
/// # 示例
/// ```rust
/// use tryon_compositor::{Bitmap, mask};
///
/// let raw = Bitmap::filled(4, 4, [255, 255, 255, 255]);
/// let normalized = mask::normalize(&raw, 8, 8);
/// assert_eq!(normalized.dimensions(), (8, 8));
/// assert_eq!(normalized.coverage(), 64);
/// ```
pub fn normalize(source: &Bitmap, width: u32, height: u32) -> Mask {
    normalize_gray(&to_single_channel(source), width, height)
}

/// 已是单通道的遮罩图直接缩放与阈值化。
pub fn normalize_gray(source: &GrayImage, width: u32, height: u32) -> Mask {
    let mut resized = resample::gray_nearest(source, width, height);
    for sample in resized.iter_mut() {
        *sample = threshold(*sample);
    }
    Mask::from_binary(resized)
}

fn to_single_channel(source: &Bitmap) -> GrayImage {
    let rgba = source.as_image();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        Luma([coverage_sample(r, g, b, a)])
    })
}

fn coverage_sample(r: u8, g: u8, b: u8, a: u8) -> u8 {
    let luma = (LUMA_R * r as u32 + LUMA_G * g as u32 + LUMA_B * b as u32) / 1000;
    (luma * a as u32 / 255) as u8
}

fn threshold(sample: u8) -> u8 {
    if sample > MASK_THRESHOLD {
        MASK_OPAQUE
    } else {
        MASK_TRANSPARENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn white_on_black_mask_keeps_foreground() {
        let src = RgbaImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });

        let mask = normalize(&Bitmap::new(src), 4, 2);

        assert!(mask.is_opaque(0, 0));
        assert!(mask.is_opaque(1, 1));
        assert!(!mask.is_opaque(2, 0));
        assert!(!mask.is_opaque(3, 1));
    }

    #[test]
    fn transparent_pixels_are_background_regardless_of_color() {
        let src = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([255, 255, 255, 0])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });

        let mask = normalize(&Bitmap::new(src), 2, 1);

        assert!(!mask.is_opaque(0, 0));
        assert!(mask.is_opaque(1, 0));
    }

    #[test]
    fn threshold_cut_point_is_one() {
        assert_eq!(threshold(0), MASK_TRANSPARENT);
        assert_eq!(threshold(1), MASK_TRANSPARENT);
        assert_eq!(threshold(2), MASK_OPAQUE);
        assert_eq!(coverage_sample(255, 255, 255, 255), 255);
        assert_eq!(coverage_sample(0, 0, 0, 255), 0);
    }

    #[test]
    fn resamples_to_target_size() {
        let src = GrayImage::from_pixel(16, 16, Luma([200]));

        let mask = normalize_gray(&src, 32, 8);

        assert_eq!(mask.dimensions(), (32, 8));
        assert_eq!(mask.coverage(), 32 * 8);
    }

    #[test]
    fn normalizing_twice_is_idempotent() {
        let src = GrayImage::from_fn(10, 10, |x, y| Luma([((x * 31 + y * 17) % 256) as u8]));

        let once = normalize_gray(&src, 7, 13);
        let twice = normalize_gray(once.as_image(), 7, 13);

        assert_eq!(once, twice);
    }
}
