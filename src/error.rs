//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义 crate 级统一的 `TryonError`，所有公开操作返回 `Result<T, TryonError>`。
//! 资源层的 `ImageError` 通过 `AssetUnavailable` 包装，保留 `what`（哪张图）
//! 与原始错误，方便按区域跳过并记录诊断日志。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 实现 `Serialize` 将错误序列化为字符串，满足 IPC 层要求。

use serde::Serialize;

use crate::asset::ImageError;

/// crate 级统一错误类型。
///
/// 没有任何分支是致命的：调用方要么跳过对应区域，要么保留上一张合成结果。
#[derive(Debug, thiserror::Error)]
pub enum TryonError {
    /// 某张图片（身体图 / 遮罩 / 试穿图）无法取得或解码
    #[error("资源不可用（{what}）：{source}")]
    AssetUnavailable {
        what: String,
        #[source]
        source: ImageError,
    },

    /// 参与合成的位图与遮罩尺寸不一致
    #[error("尺寸不一致：期望 {}x{}，实际 {}x{}", .expected.0, .expected.1, .actual.0, .actual.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// 该次合成已被更新的请求取代
    #[error("合成结果已过期：第 {generation} 代（最新 {latest} 代）")]
    StaleGeneration { generation: u64, latest: u64 },

    /// 无法识别的服装类别
    #[error("未知服装区域: {0}")]
    UnknownRegion(String),

    /// 未登记区域的服装
    #[error("未知服装: {0}")]
    UnknownGarment(String),

    /// 事件消息格式错误
    #[error("事件解析失败: {0}")]
    Event(String),

    /// 合成结果编码失败
    #[error("编码失败: {0}")]
    Encode(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 状态锁不可用
    #[error("状态不可用: {0}")]
    State(String),
}

impl TryonError {
    /// 将资源错误标注上“哪张图”。
    pub fn asset(what: impl Into<String>, source: ImageError) -> Self {
        Self::AssetUnavailable {
            what: what.into(),
            source,
        }
    }
}

/// IPC 层要求返回值实现 `Serialize`。
/// 将错误序列化为人类可读的字符串。
impl Serialize for TryonError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
