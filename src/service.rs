//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! 使用 `TryonServiceState` 作为 UI / IPC 层的注入状态，替代全局单例：
//! 1. 生命周期由宿主统一管理
//! 2. 测试可创建独立实例，互不影响
//!
//! ## 实现思路
//!
//! - 持有资源加载器、试穿列表、选择状态机、编排器与当前身体。
//! - 同步状态使用 `std::sync::{Mutex, RwLock}`，锁中毒映射为 `TryonError::State`，
//!   且任何锁都不跨 `.await` 持有。
//! - 选择类命令只改状态并返回新快照；选择确实变化时让进行中的重算过期，
//!   新的重算由调用方显式触发，事件泵在被选中的试穿结果变化时自动触发。
//! - 重算在持有选择锁期间分配代数，选择快照与代数一一对应。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::watch;

use crate::asset::{AssetConfig, AssetLoader, ImageError};
use crate::config::{EncodeProfile, TryonConfig};
use crate::error::TryonError;
use crate::export;
use crate::orchestrator::{CompositeResult, Orchestrator, OrchestratorState, PreparedBody, prepare_body};
use crate::selection::{Selection, SelectionMachine};
use crate::tryon::{BodyRecord, GarmentRender, Region, TryonEvent, TryonRecord, TryonRegistry};

/// 试穿合成服务状态。
pub struct TryonServiceState {
    loader: Arc<AssetLoader>,
    orchestrator: Orchestrator,
    registry: Mutex<TryonRegistry>,
    selection: Mutex<SelectionMachine>,
    body: RwLock<Option<Arc<PreparedBody>>>,
}

impl TryonServiceState {
    /// 使用默认配置创建服务状态。
    ///
    /// # 示例
    /// ```rust
    /// use tryon_compositor::TryonServiceState;
    ///
    /// let service = TryonServiceState::new()?;
    /// assert!(service.selection()?.is_empty());
    /// # Ok::<(), tryon_compositor::TryonError>(())
    /// ```
    pub fn new() -> Result<Self, TryonError> {
        Self::with_config(TryonConfig::default())
    }

    /// 使用自定义配置创建服务状态，非法的资源配置会被拒绝。
    pub fn with_config(config: TryonConfig) -> Result<Self, TryonError> {
        config
            .asset
            .validate()
            .map_err(|e| TryonError::State(format!("资源配置非法：{}", e)))?;

        let loader = Arc::new(AssetLoader::new(config.asset));
        Ok(Self {
            orchestrator: Orchestrator::new(loader.clone(), config.encode),
            loader,
            registry: Mutex::new(TryonRegistry::new()),
            selection: Mutex::new(SelectionMachine::new()),
            body: RwLock::new(None),
        })
    }

    /// 加载并预处理身体；失败时保留之前的身体。
    pub async fn load_body(&self, record: BodyRecord) -> Result<(), TryonError> {
        let prepared = prepare_body(&self.loader, &record).await?;
        let mut guard = self
            .body
            .write()
            .map_err(|_| TryonError::State("身体状态写入锁已中毒".to_string()))?;
        *guard = Some(Arc::new(prepared));
        Ok(())
    }

    pub fn current_body_id(&self) -> Result<Option<String>, TryonError> {
        Ok(self.prepared_body()?.map(|b| b.body_id().to_string()))
    }

    pub fn register_clothing(&self, clothing_id: &str, category: &str) -> Result<Region, TryonError> {
        self.registry()?.register_clothing(clothing_id, category)
    }

    /// 整体替换试穿列表：已选中的记录同步刷新，不在新列表里的从选择中移除。
    pub fn sync_tryons(&self, renders: Vec<GarmentRender>) -> Result<usize, TryonError> {
        let count = renders.len();
        {
            let known: HashSet<&str> = renders.iter().map(|r| r.id.as_str()).collect();
            self.change_selection(|machine| {
                for render in &renders {
                    machine.refresh(render);
                }
                machine.retain(|r| known.contains(r.id.as_str()));
            })?;
        }
        self.registry()?.replace_all(renders);
        Ok(count)
    }

    /// 列表接口原始记录版本，按已登记的服装区域转换。
    pub fn sync_records(&self, records: Vec<TryonRecord>) -> Result<usize, TryonError> {
        let renders = self.registry()?.convert_records(records);
        self.sync_tryons(renders)
    }

    /// 请求试穿：立即插入占位记录。
    pub fn request_tryon(&self, body_id: &str, clothing_id: &str) -> Result<Option<GarmentRender>, TryonError> {
        self.registry()?.add_pending(body_id, clothing_id)
    }

    /// 按试穿 id 选中，放入其区域对应的槽位。
    pub fn select(&self, tryon_id: &str) -> Result<Selection, TryonError> {
        let render = self.find_render(tryon_id)?;
        self.change_selection(|machine| {
            machine.select(render);
        })
    }

    /// 同时选中上下装（任一可为空）。
    pub fn select_upper_lower(
        &self,
        upper_id: Option<&str>,
        lower_id: Option<&str>,
    ) -> Result<Selection, TryonError> {
        let upper = upper_id
            .map(|id| self.find_render_in(id, Region::Upper))
            .transpose()?;
        let lower = lower_id
            .map(|id| self.find_render_in(id, Region::Lower))
            .transpose()?;

        self.change_selection(|machine| {
            machine.set_upper_lower(upper, lower);
        })
    }

    pub fn clear_selection(&self) -> Result<Selection, TryonError> {
        self.change_selection(|machine| {
            machine.clear();
        })
    }

    /// 服装被删除：移除其试穿记录并清理选择。
    pub fn remove_clothing(&self, clothing_id: &str) -> Result<Selection, TryonError> {
        let removed = self.registry()?.remove_clothing(clothing_id);
        log::info!("🗑️ 服装 {} 已删除，清理试穿记录 {} 条", clothing_id, removed);
        self.change_selection(|machine| {
            machine.remove_clothing(clothing_id);
        })
    }

    pub fn selection(&self) -> Result<Selection, TryonError> {
        Ok(self.selection_machine()?.selection().clone())
    }

    /// 处理一条事件通道消息，返回合并后的试穿记录（忽略的消息返回 `None`）。
    ///
    /// 若该记录当前被选中则触发重算；过期的重算结果静默丢弃。
    pub async fn handle_event(&self, message: &str) -> Result<Option<GarmentRender>, TryonError> {
        let update = match TryonEvent::parse(message)? {
            TryonEvent::Update(update) => update,
            TryonEvent::Ignored(kind) => {
                log::debug!("忽略事件类型：{}", kind);
                return Ok(None);
            }
        };

        let render = self.registry()?.apply_update(update)?;
        let mut selected = false;
        self.change_selection(|machine| selected = machine.refresh(&render))?;
        log::info!(
            "📨 试穿 {} 状态更新为 {:?}（{}）",
            render.id,
            render.status,
            if selected { "已选中，重新合成" } else { "未选中" }
        );

        if selected {
            match self.recompute().await {
                Ok(_) | Err(TryonError::StaleGeneration { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(Some(render))
    }

    /// 以当前身体与选择重新合成。
    pub async fn recompute(&self) -> Result<Arc<CompositeResult>, TryonError> {
        let body = self.prepared_body()?.ok_or_else(|| {
            TryonError::asset("身体图", ImageError::FileSystem("尚未加载身体".to_string()))
        })?;
        let (generation, selection) = {
            let machine = self.selection_machine()?;
            (self.orchestrator.next_generation(), machine.selection().clone())
        };

        self.orchestrator.recompute_as(generation, body, &selection).await
    }

    pub fn current_result(&self) -> Option<Arc<CompositeResult>> {
        self.orchestrator.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CompositeResult>>> {
        self.orchestrator.subscribe()
    }

    pub fn state(&self) -> OrchestratorState {
        self.orchestrator.state()
    }

    /// 导出当前合成结果到目录。
    pub fn export_current(&self, dir: impl AsRef<Path>) -> Result<PathBuf, TryonError> {
        let result = self
            .current_result()
            .ok_or_else(|| TryonError::State("当前没有合成结果".to_string()))?;
        export::save_to_dir(&result, dir)
    }

    /// 切换编码档位。
    pub fn set_encode_profile(&self, profile: &str) -> Result<(), TryonError> {
        let profile = EncodeProfile::from_str(profile)?;
        self.orchestrator.set_encode_profile(profile)?;
        log::info!("🎚️ 编码档位已切换为 {}", profile.as_str());
        Ok(())
    }

    pub fn get_encode_profile(&self) -> Result<String, TryonError> {
        Ok(self.orchestrator.encode_profile()?.as_str().to_string())
    }

    /// 替换资源加载配置，非法配置被拒绝且原配置不变。
    pub fn set_asset_config(&self, config: AssetConfig) -> Result<(), TryonError> {
        self.loader
            .set_config(config)
            .map_err(|e| TryonError::State(format!("资源配置非法：{}", e)))
    }

    fn prepared_body(&self) -> Result<Option<Arc<PreparedBody>>, TryonError> {
        self.body
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| TryonError::State("身体状态读取锁已中毒".to_string()))
    }

    fn find_render(&self, tryon_id: &str) -> Result<GarmentRender, TryonError> {
        self.registry()?
            .get(tryon_id)
            .cloned()
            .ok_or_else(|| TryonError::UnknownGarment(tryon_id.to_string()))
    }

    fn find_render_in(&self, tryon_id: &str, region: Region) -> Result<GarmentRender, TryonError> {
        let render = self.find_render(tryon_id)?;
        if render.region != region {
            return Err(TryonError::UnknownGarment(format!(
                "{}（区域为 {}，期望 {}）",
                tryon_id,
                render.region.as_str(),
                region.as_str()
            )));
        }
        Ok(render)
    }

    fn registry(&self) -> Result<MutexGuard<'_, TryonRegistry>, TryonError> {
        self.registry
            .lock()
            .map_err(|_| TryonError::State("试穿列表锁已中毒".to_string()))
    }

    /// 在选择锁内修改选择；版本号变化则让进行中的重算过期。
    fn change_selection(&self, change: impl FnOnce(&mut SelectionMachine)) -> Result<Selection, TryonError> {
        let mut machine = self.selection_machine()?;
        let before = machine.revision();
        change(&mut *machine);
        if machine.revision() != before {
            self.orchestrator.supersede();
        }
        Ok(machine.selection().clone())
    }

    fn selection_machine(&self) -> Result<MutexGuard<'_, SelectionMachine>, TryonError> {
        self.selection
            .lock()
            .map_err(|_| TryonError::State("选择状态锁已中毒".to_string()))
    }
}
