//! # 区域合成
//!
//! `apply(base, garment, mask)`：遮罩不透明处取试穿图像素，其余保持身体图像素。
//! 不做任何混合，输出只会包含两张输入图中已有的像素值。
//!
//! 按行并行（`rayon`），每行只读三份输入、只写输出的一行。

use rayon::prelude::*;

use crate::bitmap::{Bitmap, MASK_OPAQUE, Mask};
use crate::error::TryonError;

/// 尺寸不一致时记录错误并返回身体图副本。
///
/// # 示例
/// ```rust
/// use tryon_compositor::{Bitmap, compositor, mask};
///
/// let base = Bitmap::filled(2, 2, [0, 0, 0, 255]);
/// let garment = Bitmap::filled(2, 2, [255, 0, 0, 255]);
/// let full = mask::normalize(&Bitmap::filled(2, 2, [255, 255, 255, 255]), 2, 2);
///
/// let out = compositor::apply(&base, &garment, &full);
/// assert_eq!(out.pixel(1, 1), [255, 0, 0, 255]);
/// ```
pub fn apply(base: &Bitmap, garment: &Bitmap, mask: &Mask) -> Bitmap {
    match try_apply(base, garment, mask) {
        Ok(out) => out,
        Err(e) => {
            log::error!("❌ 区域合成跳过：{}", e);
            base.clone()
        }
    }
}

/// 严格版本：三者尺寸必须一致。
pub fn try_apply(base: &Bitmap, garment: &Bitmap, mask: &Mask) -> Result<Bitmap, TryonError> {
    let expected = base.dimensions();
    for actual in [garment.dimensions(), mask.dimensions()] {
        if actual != expected {
            return Err(TryonError::DimensionMismatch { expected, actual });
        }
    }

    let (width, height) = expected;
    if width == 0 || height == 0 {
        return Ok(base.clone());
    }

    let row_bytes = width as usize * 4;
    let row_mask = width as usize;
    let mut out = base.as_raw().to_vec();

    out.par_chunks_exact_mut(row_bytes)
        .zip(garment.as_raw().par_chunks_exact(row_bytes))
        .zip(mask.as_raw().par_chunks_exact(row_mask))
        .for_each(|((dst_row, src_row), mask_row)| {
            for (x, &m) in mask_row.iter().enumerate() {
                if m == MASK_OPAQUE {
                    let i = x * 4;
                    dst_row[i..i + 4].copy_from_slice(&src_row[i..i + 4]);
                }
            }
        });

    Bitmap::from_raw(width, height, out)
        .ok_or_else(|| TryonError::Encode("合成输出缓冲长度异常".to_string()))
}
