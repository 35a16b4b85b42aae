//! # 图层规划与合成
//!
//! 规划规则：
//! - 连衣裙就绪时完全优先，上下装即使同时存在也被忽略
//! - 否则按固定顺序 upper → lower
//! - 未就绪的槽位、缺少遮罩的区域直接跳过
//!
//! 合成是对 `compositor::apply` 的纯折叠，与图片加载完成顺序无关。

use crate::asset::AssetRef;
use crate::bitmap::Bitmap;
use crate::compositor;
use crate::resample;
use crate::selection::Selection;
use crate::tryon::{GarmentRender, Region};

use super::PreparedBody;

/// 一次合成中需要加载并叠加的图层。
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLayer {
    pub region: Region,
    pub render_id: String,
    pub output: AssetRef,
}

pub fn plan_layers(selection: &Selection, body: &PreparedBody) -> Vec<PlannedLayer> {
    if let Some(dress) = selection.dress.as_ref().filter(|r| r.is_ready()) {
        return layer_for(Region::Dress, dress, body).into_iter().collect();
    }

    [Region::Upper, Region::Lower]
        .into_iter()
        .filter_map(|region| {
            let render = selection.slot(region).filter(|r| r.is_ready())?;
            layer_for(region, render, body)
        })
        .collect()
}

fn layer_for(region: Region, render: &GarmentRender, body: &PreparedBody) -> Option<PlannedLayer> {
    if body.mask(region).is_none() {
        log::debug!("{} 区域缺少遮罩，跳过试穿图 {}", region.as_str(), render.id);
        return None;
    }

    Some(PlannedLayer {
        region,
        render_id: render.id.clone(),
        output: render.output.clone()?,
    })
}

/// 依次叠加各图层；尺寸与身体图不同的试穿图先最近邻缩放。
pub fn compose(body: &PreparedBody, layers: &[(Region, Bitmap)]) -> Bitmap {
    let (width, height) = body.dimensions();

    layers.iter().fold(body.base().clone(), |acc, (region, garment)| {
        let Some(mask) = body.mask(*region) else {
            return acc;
        };

        if garment.dimensions() == (width, height) {
            compositor::apply(&acc, garment, mask)
        } else {
            log::debug!(
                "{} 试穿图尺寸 {}x{} 与身体图不一致，缩放到 {}x{}",
                region.as_str(),
                garment.width(),
                garment.height(),
                width,
                height
            );
            let fitted = Bitmap::new(resample::rgba_nearest(garment.as_image(), width, height));
            compositor::apply(&acc, &fitted, mask)
        }
    })
}
