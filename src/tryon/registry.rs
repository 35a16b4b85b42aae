//! # 试穿列表
//!
//! 客户端维护的 `GarmentRender` 集合，以及“服装 → 区域”映射。
//! 区域只在 `register_clothing` 时解析一次，之后所有记录都携带封闭的 `Region`。

use std::collections::HashMap;

use super::{GarmentRender, Region, RenderStatus, TryonRecord, TryonUpdate, pending_id};
use crate::asset::AssetRef;
use crate::error::TryonError;

#[derive(Debug, Default)]
pub struct TryonRegistry {
    regions: HashMap<String, Region>,
    renders: Vec<GarmentRender>,
}

impl TryonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记服装及其类别，返回解析出的区域。
    pub fn register_clothing(&mut self, clothing_id: &str, category: &str) -> Result<Region, TryonError> {
        let region = Region::parse(category)?;
        self.regions.insert(clothing_id.to_string(), region);
        Ok(region)
    }

    pub fn region_of(&self, clothing_id: &str) -> Option<Region> {
        self.regions.get(clothing_id).copied()
    }

    /// 首次拉取列表后整体替换。
    pub fn replace_all(&mut self, renders: Vec<GarmentRender>) {
        self.renders = renders;
    }

    /// 把列表接口的原始记录按已登记区域转换；未登记的服装跳过。
    pub fn convert_records(&self, records: Vec<TryonRecord>) -> Vec<GarmentRender> {
        records
            .into_iter()
            .filter_map(|record| match self.region_of(&record.clothing_id) {
                Some(region) => Some(record.into_render(region)),
                None => {
                    log::warn!(
                        "⚠️ 试穿记录 {} 的服装 {} 未登记区域，已跳过",
                        record.id,
                        record.clothing_id
                    );
                    None
                }
            })
            .collect()
    }

    /// 请求试穿后立即插入占位；该服装已有记录时不重复插入，返回 `None`。
    pub fn add_pending(&mut self, body_id: &str, clothing_id: &str) -> Result<Option<GarmentRender>, TryonError> {
        let region = self
            .region_of(clothing_id)
            .ok_or_else(|| TryonError::UnknownGarment(clothing_id.to_string()))?;

        if self.renders.iter().any(|r| r.clothing_id == clothing_id) {
            return Ok(None);
        }

        let placeholder = GarmentRender::pending(body_id, clothing_id, region);
        self.renders.push(placeholder.clone());
        Ok(Some(placeholder))
    }

    /// 合并事件通道推送的更新，返回合并后的记录。
    ///
    /// 查找顺序：同 id 记录 → 同服装的占位记录 → 按已登记区域新建。
    pub fn apply_update(&mut self, update: TryonUpdate) -> Result<GarmentRender, TryonError> {
        if let Some(existing) = self.renders.iter_mut().find(|r| r.id == update.tryon_id) {
            merge(existing, update);
            return Ok(existing.clone());
        }

        if let Some(clothing_id) = update.clothing_id.clone() {
            let placeholder = pending_id(&clothing_id);
            if let Some(existing) = self.renders.iter_mut().find(|r| r.id == placeholder) {
                existing.id = update.tryon_id.clone();
                merge(existing, update);
                return Ok(existing.clone());
            }

            if let Some(region) = self.region_of(&clothing_id) {
                let mut render = GarmentRender {
                    id: update.tryon_id.clone(),
                    clothing_id,
                    body_id: None,
                    region,
                    status: RenderStatus::Pending,
                    output: None,
                    version: None,
                };
                merge(&mut render, update);
                self.renders.push(render.clone());
                return Ok(render);
            }
        }

        Err(TryonError::UnknownGarment(update.tryon_id))
    }

    /// 删除该服装的全部试穿记录，返回删除数量。
    pub fn remove_clothing(&mut self, clothing_id: &str) -> usize {
        let before = self.renders.len();
        self.renders.retain(|r| r.clothing_id != clothing_id);
        self.regions.remove(clothing_id);
        before - self.renders.len()
    }

    pub fn get(&self, id: &str) -> Option<&GarmentRender> {
        self.renders.iter().find(|r| r.id == id)
    }

    pub fn ready(&self) -> Vec<&GarmentRender> {
        self.renders.iter().filter(|r| r.is_ready()).collect()
    }

    pub fn len(&self) -> usize {
        self.renders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renders.is_empty()
    }
}

fn merge(render: &mut GarmentRender, update: TryonUpdate) {
    render.status = RenderStatus::from_wire(&update.status);
    if let Some(url) = update.output_url.as_deref().filter(|u| !u.trim().is_empty()) {
        render.output = Some(AssetRef::parse(url));
    }
    if update.body_id.is_some() {
        render.body_id = update.body_id;
    }
    if update.version.is_some() {
        render.version = update.version;
    }
}
