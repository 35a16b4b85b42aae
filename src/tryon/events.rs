//! # 事件通道消息
//!
//! 传输层（WebSocket / SSE）不在本 crate 内，调用方把收到的文本帧送进
//! `tokio::sync::mpsc` 通道，由 `spawn_event_pump` 逐条交给服务层处理。
//! 只有 `type == "tryon_update"` 的消息有意义，其余类型忽略。

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::TryonUpdate;
use crate::error::TryonError;
use crate::service::TryonServiceState;

const TRYON_UPDATE: &str = "tryon_update";

/// 解析后的事件。
#[derive(Debug, Clone, PartialEq)]
pub enum TryonEvent {
    Update(TryonUpdate),
    /// 其他类型的消息，保留类型名用于日志。
    Ignored(String),
}

impl TryonEvent {
    /// # 示例
    /// ```rust
    /// use tryon_compositor::TryonEvent;
    ///
    /// let event = TryonEvent::parse(r#"{"type":"ping"}"#)?;
    /// assert_eq!(event, TryonEvent::Ignored("ping".to_string()));
    /// # Ok::<(), tryon_compositor::TryonError>(())
    /// ```
    pub fn parse(message: &str) -> Result<Self, TryonError> {
        let value: Value = serde_json::from_str(message)
            .map_err(|e| TryonError::Event(format!("消息不是合法 JSON：{}", e)))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TryonError::Event("消息缺少 type 字段".to_string()))?
            .to_string();

        if kind != TRYON_UPDATE {
            return Ok(Self::Ignored(kind));
        }

        serde_json::from_value(value)
            .map(Self::Update)
            .map_err(|e| TryonError::Event(format!("tryon_update 字段错误：{}", e)))
    }
}

/// 启动事件泵：通道关闭时任务结束。
///
/// 单条消息处理失败只记录日志，不会中断后续消息。
pub fn spawn_event_pump(
    service: Arc<TryonServiceState>,
    mut messages: mpsc::Receiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("📡 试穿事件泵已启动");
        while let Some(message) = messages.recv().await {
            if let Err(e) = service.handle_event(&message).await {
                log::warn!("⚠️ 事件处理失败：{}", e);
            }
        }
        log::info!("📡 试穿事件通道已关闭");
    })
}
