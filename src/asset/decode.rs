//! # 解码
//!
//! 字节 → RGBA8 位图。先只读图片头拿到宽高，超出像素或内存预算就不做完整解码。
//! 这里**不做任何降采样**：身体图、遮罩与试穿图的像素尺寸必须原样保留，
//! 尺寸对齐是遮罩规范化与编排器的职责。

use image::{ImageFormat, ImageReader};
use std::io::Cursor;

use super::source::RawImageData;
use super::{AssetConfig, AssetLoader, ImageError};
use crate::bitmap::Bitmap;

const RGBA_BYTES_PER_PIXEL: u64 = 4;

impl AssetLoader {
    pub(crate) fn decode_bitmap(raw: &RawImageData, config: &AssetConfig) -> Result<Bitmap, ImageError> {
        let format = image::guess_format(&raw.bytes)
            .map_err(|e| ImageError::InvalidFormat(format!("无法识别的图片编码：{}", e)))?;

        let (width, height) = header_dimensions(&raw.bytes, format)?;
        check_decode_budget(config, width, height)?;

        let rgba = image::load_from_memory_with_format(&raw.bytes, format)
            .map_err(|e| ImageError::Decode(format!("{:?} 解码失败：{}", format, e)))?
            .into_rgba8();

        if rgba.dimensions() != (width, height) {
            return Err(ImageError::Decode(format!(
                "解码尺寸 {}x{} 与图片头 {}x{} 不一致",
                rgba.width(),
                rgba.height(),
                width,
                height
            )));
        }

        log::debug!(
            "🖼️ 解码完成 - 来源: {} 格式: {:?} 尺寸: {}x{}",
            raw.source_hint,
            format,
            width,
            height
        );

        Ok(Bitmap::new(rgba))
    }
}

fn header_dimensions(bytes: &[u8], format: ImageFormat) -> Result<(u32, u32), ImageError> {
    ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| ImageError::InvalidFormat(format!("图片头损坏：{}", e)))
}

/// 像素数与 RGBA 展开后的内存都要在预算内。
fn check_decode_budget(config: &AssetConfig, width: u32, height: u32) -> Result<(), ImageError> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels == 0 {
        return Err(ImageError::Decode(format!("图片尺寸为空：{}x{}", width, height)));
    }
    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "{}x{} 共 {} 像素，超过上限 {}",
            width, height, pixels, config.max_decoded_pixels
        )));
    }

    let rgba_bytes = pixels.saturating_mul(RGBA_BYTES_PER_PIXEL);
    if rgba_bytes > config.max_decoded_bytes {
        return Err(ImageError::ResourceLimit(format!(
            "解码需要 {:.1} MB，超过上限 {:.1} MB",
            rgba_bytes as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}
