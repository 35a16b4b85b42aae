//! # 资源加载模块（asset）
//!
//! ## 设计思路
//!
//! 将“引用识别 → 取字节与校验 → 解码”按职责拆分为多个子模块：
//!
//! - `source`：资源引用 `AssetRef` 与中间数据模型
//! - `fetch`：远程下载（逐跳协议校验、限额读取，仅连接超时）
//! - `loader`：Base64 / 文件 / 内置资源 / 内存字节，以及共用的签名校验
//! - `decode`：解码、像素与内存上限控制
//! - `handler`：`AssetLoader` 编排与阶段耗时日志，内置资源 LRU 缓存
//! - `config/error`：配置与错误
//!
//! ## 调用链
//!
//! ```text
//! 编排器 / 服务层
//!    ↓
//! handler.rs（配置快照 + 缓存 + 阶段耗时）
//!    ├─ fetch.rs（远程下载）
//!    ├─ loader.rs（本地来源 + 签名校验）
//!    └─ decode.rs（解码 + 像素限制，spawn_blocking）
//!    ↓
//! Bitmap 或 ImageError
//! ```

mod config;
mod decode;
mod error;
mod fetch;
mod handler;
mod loader;
mod source;

pub use config::AssetConfig;
pub use error::ImageError;
pub use handler::AssetLoader;
pub use source::AssetRef;
