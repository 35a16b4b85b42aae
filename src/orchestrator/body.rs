//! # 身体图预处理
//!
//! 每个身体只加载一次：身体图 + 三张遮罩（各自可缺失），
//! 遮罩在此处规范化为与身体图同尺寸的二值图，之后每次重算直接复用。

use std::time::Instant;

use crate::asset::{AssetLoader, AssetRef};
use crate::bitmap::{Bitmap, Mask};
use crate::error::TryonError;
use crate::mask;
use crate::tryon::{BodyRecord, Region};

/// 已解码的身体图与规范化遮罩。
#[derive(Debug, Clone)]
pub struct PreparedBody {
    body_id: String,
    base: Bitmap,
    upper: Option<Mask>,
    lower: Option<Mask>,
    dress: Option<Mask>,
}

impl PreparedBody {
    /// 不带任何遮罩的身体图；此时所有区域都会被跳过。
    pub fn new(body_id: impl Into<String>, base: Bitmap) -> Self {
        Self {
            body_id: body_id.into(),
            base,
            upper: None,
            lower: None,
            dress: None,
        }
    }

    /// 规范化并挂上某区域的遮罩。
    pub fn with_mask(mut self, region: Region, raw: &Bitmap) -> Self {
        let (width, height) = self.base.dimensions();
        *self.mask_slot(region) = Some(mask::normalize(raw, width, height));
        self
    }

    pub fn body_id(&self) -> &str {
        &self.body_id
    }

    pub fn base(&self) -> &Bitmap {
        &self.base
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.base.dimensions()
    }

    pub fn mask(&self, region: Region) -> Option<&Mask> {
        match region {
            Region::Upper => self.upper.as_ref(),
            Region::Lower => self.lower.as_ref(),
            Region::Dress => self.dress.as_ref(),
        }
    }

    fn mask_slot(&mut self, region: Region) -> &mut Option<Mask> {
        match region {
            Region::Upper => &mut self.upper,
            Region::Lower => &mut self.lower,
            Region::Dress => &mut self.dress,
        }
    }
}

/// 加载身体记录：身体图失败即整体失败，遮罩失败只禁用对应区域。
pub async fn prepare_body(loader: &AssetLoader, record: &BodyRecord) -> Result<PreparedBody, TryonError> {
    let start = Instant::now();

    let base_ref = AssetRef::parse(&record.image_url);
    let (base, upper, lower, dress) = tokio::join!(
        loader.load(&base_ref),
        load_mask(loader, record, Region::Upper),
        load_mask(loader, record, Region::Lower),
        load_mask(loader, record, Region::Dress),
    );
    let base = base.map_err(|e| TryonError::asset(format!("身体图 {}", record.id), e))?;

    let body_id = record.id.clone();
    let prepared = tokio::task::spawn_blocking(move || {
        let mut body = PreparedBody::new(body_id, base);
        for (region, raw) in [(Region::Upper, upper), (Region::Lower, lower), (Region::Dress, dress)] {
            if let Some(raw) = raw {
                body = body.with_mask(region, &raw);
            }
        }
        body
    })
    .await
    .map_err(|e| TryonError::State(format!("遮罩规范化任务异常退出：{}", e)))?;

    log::info!(
        "✅ 身体图就绪 - id: {} 尺寸: {}x{} 遮罩: upper={} lower={} dress={} total={}ms",
        prepared.body_id(),
        prepared.dimensions().0,
        prepared.dimensions().1,
        prepared.mask(Region::Upper).is_some(),
        prepared.mask(Region::Lower).is_some(),
        prepared.mask(Region::Dress).is_some(),
        start.elapsed().as_millis()
    );

    Ok(prepared)
}

async fn load_mask(loader: &AssetLoader, record: &BodyRecord, region: Region) -> Option<Bitmap> {
    let reference = record.mask_for(region)?;
    match loader.load(&AssetRef::parse(reference)).await {
        Ok(bitmap) => Some(bitmap),
        Err(e) => {
            log::warn!(
                "⚠️ {} 遮罩不可用，该区域禁用 - 错误码: {} 阶段: {} 详情: {}",
                region.as_str(),
                e.code(),
                e.stage(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_mask_normalizes_to_base_size() {
        let body = PreparedBody::new("b1", Bitmap::filled(8, 6, [0, 0, 0, 255]))
            .with_mask(Region::Upper, &Bitmap::filled(4, 3, [255, 255, 255, 255]));

        let upper = body.mask(Region::Upper).expect("upper mask");
        assert_eq!(upper.dimensions(), (8, 6));
        assert_eq!(upper.coverage(), 48);
        assert!(body.mask(Region::Lower).is_none());
    }
}
