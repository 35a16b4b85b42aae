//! # 虚拟试穿合成核心 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │        宿主 (UI / IPC / HTTP API / 事件通道传输)          │
//! └───────┬───────────────────────────────▲──────────────────┘
//!         ↓ 命令 / 事件文本帧              │ CompositeResult (watch)
//! ┌───────┼───────────────────────────────┼──────────────────┐
//! │  service ── TryonServiceState (可注入状态)                │
//! │  │                                                       │
//! │  ├─ tryon ────── Region / GarmentRender / 列表 / 事件     │
//! │  ├─ selection ── 三槽位互斥状态机                         │
//! │  ├─ orchestrator  图层规划·并发加载·代数守卫·发布         │
//! │  │   ├─ compositor  apply(base, garment, mask)           │
//! │  │   └─ mask        单通道化·最近邻·二值化                │
//! │  ├─ asset ────── URL/内置/文件/Base64 加载与解码          │
//! │  └─ export ───── PNG / Base64 / Data URI / 落盘           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `TryonError` |
//! | [`config`] | `TryonConfig` 与编码档位 `EncodeProfile` |
//! | [`asset`] | 图片引用解析、下载校验、解码 |
//! | [`bitmap`] | `Bitmap`（RGBA8）与 `Mask`（严格二值） |
//! | [`mask`] | 遮罩规范化 |
//! | [`compositor`] | 单区域像素替换 |
//! | [`orchestrator`] | 合成顺序、代数守卫、结果发布 |
//! | [`selection`] | 选择状态机 |
//! | [`tryon`] | 试穿记录、列表维护、事件解析 |
//! | [`export`] | 合成结果编码与导出 |
//! | [`service`] | 对外服务入口 |

pub mod asset;
pub mod bitmap;
pub mod compositor;
pub mod config;
pub mod error;
pub mod export;
pub mod mask;
pub mod orchestrator;
mod resample;
pub mod selection;
pub mod service;
pub mod tryon;

pub use bitmap::{Bitmap, Mask};
pub use config::{EncodeProfile, TryonConfig};
pub use error::TryonError;
pub use orchestrator::{CompositeResult, Orchestrator, OrchestratorState, PreparedBody};
pub use selection::{Selection, SelectionMachine};
pub use service::TryonServiceState;
pub use tryon::{
    BodyRecord, GarmentRender, Region, RenderStatus, TryonEvent, TryonRecord, TryonRegistry,
    TryonUpdate,
};
