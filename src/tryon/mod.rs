//! # 试穿记录模型（tryon）
//!
//! ## 设计思路
//!
//! 服务端与事件通道传来的都是松散 JSON：服装类别是自由字符串，状态也是字符串。
//! 在**摄入边界**一次性收敛为封闭类型：
//!
//! - `Region`：`Upper | Lower | Dress`，未知类别直接拒绝
//! - `RenderStatus`：`Pending | Ready | Failed`
//! - `GarmentRender`：编排器唯一认识的试穿结果记录
//!
//! 子模块：
//! - `registry`：客户端试穿列表（全量替换、事件合并、占位、按服装删除）
//! - `events`：事件通道消息解析与泵送

mod events;
mod registry;

pub use events::{TryonEvent, spawn_event_pump};
pub use registry::TryonRegistry;

use serde::{Deserialize, Serialize};

use crate::asset::AssetRef;
use crate::error::TryonError;

/// 身体区域。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Upper,
    Lower,
    Dress,
}

impl Region {
    /// 固定顺序，遍历三种遮罩时使用。
    pub const ALL: [Region; 3] = [Region::Upper, Region::Lower, Region::Dress];

    /// 从服装类别字符串解析区域（不区分大小写）。
    ///
    /// # 示例
    /// ```rust
    /// use tryon_compositor::Region;
    ///
    /// assert_eq!(Region::parse("T-Shirt")?, Region::Upper);
    /// assert_eq!(Region::parse("pants")?, Region::Lower);
    /// assert!(Region::parse("hat").is_err());
    /// # Ok::<(), tryon_compositor::TryonError>(())
    /// ```
    pub fn parse(category: &str) -> Result<Self, TryonError> {
        let normalized = category.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "upper" | "top" | "tops" | "shirt" | "shirts" | "t_shirt" | "tshirt" | "blouse"
            | "sweater" | "hoodie" | "jacket" | "coat" | "upper_body" => Ok(Self::Upper),
            "lower" | "bottom" | "bottoms" | "pants" | "trousers" | "jeans" | "shorts"
            | "skirt" | "lower_body" => Ok(Self::Lower),
            "dress" | "dresses" | "overall" | "overalls" | "jumpsuit" | "full_body"
            | "fullbody" => Ok(Self::Dress),
            _ => Err(TryonError::UnknownRegion(category.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upper => "upper",
            Self::Lower => "lower",
            Self::Dress => "dress",
        }
    }
}

/// 试穿结果状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Pending,
    Ready,
    Failed,
}

impl RenderStatus {
    /// 服务端状态字符串映射；未识别的中间状态按 `Pending` 处理。
    pub fn from_wire(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "ready" | "completed" | "done" | "succeeded" => Self::Ready,
            "failed" | "error" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// 单件服装的试穿结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarmentRender {
    pub id: String,
    pub clothing_id: String,
    pub body_id: Option<String>,
    pub region: Region,
    pub status: RenderStatus,
    pub output: Option<AssetRef>,
    pub version: Option<u32>,
}

impl GarmentRender {
    /// 请求试穿时立即插入的占位记录，id 为 `pending-<clothing_id>`。
    pub fn pending(body_id: &str, clothing_id: &str, region: Region) -> Self {
        Self {
            id: pending_id(clothing_id),
            clothing_id: clothing_id.to_string(),
            body_id: Some(body_id.to_string()),
            region,
            status: RenderStatus::Pending,
            output: None,
            version: None,
        }
    }

    /// 已完成的试穿结果。
    pub fn ready(id: &str, clothing_id: &str, region: Region, output: AssetRef) -> Self {
        Self {
            id: id.to_string(),
            clothing_id: clothing_id.to_string(),
            body_id: None,
            region,
            status: RenderStatus::Ready,
            output: Some(output),
            version: None,
        }
    }

    /// 只有 `Ready` 且带输出图的记录可以参与合成。
    pub fn is_ready(&self) -> bool {
        self.status == RenderStatus::Ready && self.output.is_some()
    }

    pub fn is_placeholder(&self) -> bool {
        self.id == pending_id(&self.clothing_id)
    }
}

pub(crate) fn pending_id(clothing_id: &str) -> String {
    format!("pending-{}", clothing_id)
}

/// 身体记录（API JSON）。遮罩在服务端预处理完成前可能缺失。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyRecord {
    pub id: String,
    pub image_url: String,
    #[serde(default)]
    pub mask_upper: Option<String>,
    #[serde(default)]
    pub mask_lower: Option<String>,
    #[serde(default)]
    pub mask_dress: Option<String>,
}

impl BodyRecord {
    pub fn mask_for(&self, region: Region) -> Option<&str> {
        let mask = match region {
            Region::Upper => self.mask_upper.as_deref(),
            Region::Lower => self.mask_lower.as_deref(),
            Region::Dress => self.mask_dress.as_deref(),
        };
        mask.filter(|m| !m.trim().is_empty())
    }
}

/// 试穿列表接口中的单项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryonRecord {
    pub id: String,
    #[serde(default)]
    pub body_id: Option<String>,
    pub clothing_id: String,
    #[serde(default)]
    pub output_url: Option<String>,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
}

impl TryonRecord {
    pub fn into_render(self, region: Region) -> GarmentRender {
        GarmentRender {
            id: self.id,
            clothing_id: self.clothing_id,
            body_id: self.body_id,
            region,
            status: RenderStatus::from_wire(&self.status),
            output: self.output_url.as_deref().map(AssetRef::parse),
            version: self.version,
        }
    }
}

/// 事件通道推送的试穿状态更新。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TryonUpdate {
    pub tryon_id: String,
    #[serde(default)]
    pub output_url: Option<String>,
    pub status: String,
    #[serde(default)]
    pub body_id: Option<String>,
    #[serde(default)]
    pub clothing_id: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
}
