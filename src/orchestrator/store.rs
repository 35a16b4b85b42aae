//! # 合成结果发布
//!
//! 单写（编排器）多读（`watch::Receiver` / `current()`）。
//! 只接受比当前已发布结果更新的代数，读者永远只看到完整结果。

use std::sync::Arc;

use tokio::sync::watch;

use crate::bitmap::Bitmap;

/// 一次完整合成的产物。
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    pub generation: u64,
    pub width: u32,
    pub height: u32,
    pub bitmap: Bitmap,
    /// PNG 编码后的字节。
    pub png: Vec<u8>,
    /// 实际叠加的试穿结果 id（按叠加顺序）。
    pub applied: Vec<String>,
}

pub(crate) struct ResultStore {
    sender: watch::Sender<Option<Arc<CompositeResult>>>,
}

impl ResultStore {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Arc<CompositeResult>>> {
        self.sender.subscribe()
    }

    pub(crate) fn current(&self) -> Option<Arc<CompositeResult>> {
        self.sender.borrow().clone()
    }

    /// 代数不大于当前结果、或 `still_latest` 为假时拒绝，返回是否发布成功。
    ///
    /// `still_latest` 在通道写锁内求值，检查与写入之间不会插入其他发布。
    pub(crate) fn publish(&self, result: Arc<CompositeResult>, still_latest: impl FnOnce() -> bool) -> bool {
        self.sender.send_if_modified(|current| {
            let newer = current
                .as_ref()
                .is_none_or(|c| c.generation < result.generation)
                && still_latest();
            if newer {
                *current = Some(result.clone());
            }
            newer
        })
    }
}
