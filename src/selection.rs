//! # 选择状态机
//!
//! 三个槽位：`upper`、`lower`、`dress`。连衣裙与（上装或下装）互斥：
//!
//! | 操作 | upper | lower | dress |
//! |------|-------|-------|-------|
//! | `set_upper(g)` | g | 不变 | 清空 |
//! | `set_lower(g)` | 不变 | g | 清空 |
//! | `set_dress(g)` | 清空 | 清空 | g |
//! | `set_upper_lower(u, l)` | u | l | 清空 |
//! | `clear()` | 清空 | 清空 | 清空 |
//!
//! 任何调用都不会被拒绝，调用后状态一定合法。
//! `set_*`、`select`、`clear` 每次调用都递增 `revision`；
//! `remove_clothing`、`retain`、`refresh` 只在槽位确实变化时递增。
//! 传入区域与槽位不符的记录属于调用方违约，仅在 debug 构建中断言。

use serde::Serialize;

use crate::tryon::{GarmentRender, Region};

/// 三槽位选择快照。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Selection {
    pub upper: Option<GarmentRender>,
    pub lower: Option<GarmentRender>,
    pub dress: Option<GarmentRender>,
}

impl Selection {
    pub fn slot(&self, region: Region) -> Option<&GarmentRender> {
        match region {
            Region::Upper => self.upper.as_ref(),
            Region::Lower => self.lower.as_ref(),
            Region::Dress => self.dress.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upper.is_none() && self.lower.is_none() && self.dress.is_none()
    }

    /// 是否有槽位持有该 id 的记录。
    pub fn holds(&self, render_id: &str) -> bool {
        Region::ALL
            .iter()
            .any(|&region| self.slot(region).is_some_and(|r| r.id == render_id))
    }
}

/// 选择状态机，选择变化时递增 `revision`。
#[derive(Debug, Default)]
pub struct SelectionMachine {
    selection: Selection,
    revision: u64,
}

impl SelectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_upper(&mut self, render: GarmentRender) -> &Selection {
        debug_assert_eq!(render.region, Region::Upper);
        self.selection.upper = Some(render);
        self.selection.dress = None;
        self.bump()
    }

    pub fn set_lower(&mut self, render: GarmentRender) -> &Selection {
        debug_assert_eq!(render.region, Region::Lower);
        self.selection.lower = Some(render);
        self.selection.dress = None;
        self.bump()
    }

    pub fn set_dress(&mut self, render: GarmentRender) -> &Selection {
        debug_assert_eq!(render.region, Region::Dress);
        self.selection.dress = Some(render);
        self.selection.upper = None;
        self.selection.lower = None;
        self.bump()
    }

    /// 按记录自身的区域放入对应槽位。
    pub fn select(&mut self, render: GarmentRender) -> &Selection {
        match render.region {
            Region::Upper => self.set_upper(render),
            Region::Lower => self.set_lower(render),
            Region::Dress => self.set_dress(render),
        }
    }

    /// 同时设置上下装（任一可为空），连衣裙清空。
    pub fn set_upper_lower(
        &mut self,
        upper: Option<GarmentRender>,
        lower: Option<GarmentRender>,
    ) -> &Selection {
        debug_assert!(upper.as_ref().is_none_or(|r| r.region == Region::Upper));
        debug_assert!(lower.as_ref().is_none_or(|r| r.region == Region::Lower));
        self.selection.upper = upper;
        self.selection.lower = lower;
        self.selection.dress = None;
        self.bump()
    }

    pub fn clear(&mut self) -> &Selection {
        self.selection = Selection::default();
        self.bump()
    }

    /// 服装被删除：清空所有持有其试穿结果的槽位。
    pub fn remove_clothing(&mut self, clothing_id: &str) -> &Selection {
        self.retain(|r| r.clothing_id != clothing_id)
    }

    /// 清空 `keep` 返回假的槽位。
    pub fn retain(&mut self, keep: impl Fn(&GarmentRender) -> bool) -> &Selection {
        let mut changed = false;
        for slot in self.slots_mut() {
            if slot.as_ref().is_some_and(|r| !keep(r)) {
                *slot = None;
                changed = true;
            }
        }
        if changed {
            self.revision += 1;
        }
        &self.selection
    }

    /// 用最新记录替换同 id 的槽位内容，返回是否命中。
    ///
    /// 槽位里若是同一服装的占位记录，也视为同一条（占位 id 会在首个事件后被替换）。
    pub fn refresh(&mut self, render: &GarmentRender) -> bool {
        let mut hit = false;
        for slot in self.slots_mut() {
            let same = |r: &&mut GarmentRender| {
                r.id == render.id || (r.is_placeholder() && r.clothing_id == render.clothing_id)
            };
            if let Some(current) = slot.as_mut().filter(same) {
                *current = render.clone();
                hit = true;
            }
        }
        if hit {
            self.bump();
        }
        hit
    }

    fn slots_mut(&mut self) -> [&mut Option<GarmentRender>; 3] {
        [
            &mut self.selection.upper,
            &mut self.selection.lower,
            &mut self.selection.dress,
        ]
    }

    fn bump(&mut self) -> &Selection {
        self.revision += 1;
        &self.selection
    }
}
