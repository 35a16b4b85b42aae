//! # 合成结果导出
//!
//! # 设计思路
//!
//! 合成结果只在最后一步编码为 PNG，交给外部的相册 / 分享协作方：
//! - `encode_png`：按编码档位选择压缩参数
//! - `CompositeResult::to_base64` / `to_data_uri`：给 WebView / IPC 直接显示
//! - `save_to_dir`：按时间戳命名写入目标目录
//!
//! # 实现思路
//!
//! - 编码委托 `image` 的 `PngEncoder`。
//! - 文件名使用 `chrono::Local` 时间戳，精确到微秒，避免连续导出重名。

use std::fs;
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose};
use chrono::Local;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::bitmap::Bitmap;
use crate::config::EncodeProfile;
use crate::error::TryonError;
use crate::orchestrator::CompositeResult;

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// 将位图编码为 PNG 字节。
pub fn encode_png(bitmap: &Bitmap, profile: EncodeProfile) -> Result<Vec<u8>, TryonError> {
    let (compression, filter) = profile.png_settings();
    let mut buffer = Vec::new();

    PngEncoder::new_with_quality(&mut buffer, compression, filter)
        .write_image(
            bitmap.as_raw(),
            bitmap.width(),
            bitmap.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| TryonError::Encode(format!("PNG 编码失败：{}", e)))?;

    Ok(buffer)
}

impl CompositeResult {
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.png)
    }

    pub fn to_data_uri(&self) -> String {
        format!("{}{}", DATA_URI_PREFIX, self.to_base64())
    }
}

/// 写入 `dir/tryon_<时间戳>.png`，目录不存在时创建。
pub fn save_to_dir(result: &CompositeResult, dir: impl AsRef<Path>) -> Result<PathBuf, TryonError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let timestamp = Local::now().format("%Y%m%d%H%M%S%f");
    let file_path = dir.join(format!("tryon_{}.png", timestamp));
    fs::write(&file_path, &result.png)?;

    log::info!(
        "💾 合成结果已导出 - 第 {} 代 {}x{} -> {}",
        result.generation,
        result.width,
        result.height,
        file_path.display()
    );

    Ok(file_path)
}
