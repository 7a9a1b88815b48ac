use crate::domain::model::{ChangeReason, Origin, PhysicalUnit, Slot};
use crate::utils::error::{ReconError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// `move_to_removed` 的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// 客戶設備移入拆除池，待處置
    Removed,
    /// 本次作業才裝上的設備，回到原本的池
    Reverted(Origin),
    /// 設備本來就不在已安裝池
    Unchanged,
}

/// 三個互斥的設備池，以及槽位綁定
///
/// 設備只能透過這裡的操作換池，總數在互動編輯期間不變。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentPools {
    stock: Vec<PhysicalUnit>,
    installed: Vec<PhysicalUnit>,
    removed: Vec<PhysicalUnit>,
    /// slot id -> unit id
    bindings: BTreeMap<String, String>,
}

impl EquipmentPools {
    pub fn from_inventory(
        stock: Vec<PhysicalUnit>,
        installed: Vec<PhysicalUnit>,
        removed: Vec<PhysicalUnit>,
    ) -> Self {
        let mut pools = Self::default();
        let mut seen = HashSet::new();
        for (origin, units) in [
            (Origin::Installed, installed),
            (Origin::Stock, stock),
            (Origin::Removed, removed),
        ] {
            for mut unit in units {
                if !seen.insert(unit.id.clone()) {
                    tracing::warn!("⚠️ Unit {} listed in more than one pool, keeping first", unit.id);
                    continue;
                }
                unit.origin = origin;
                unit.provenance = origin;
                pools.pool_mut(origin).push(unit);
            }
        }
        pools
    }

    pub fn stock(&self) -> &[PhysicalUnit] {
        &self.stock
    }

    pub fn installed(&self) -> &[PhysicalUnit] {
        &self.installed
    }

    pub fn removed(&self) -> &[PhysicalUnit] {
        &self.removed
    }

    pub fn bindings(&self) -> &BTreeMap<String, String> {
        &self.bindings
    }

    pub fn total_units(&self) -> usize {
        self.stock.len() + self.installed.len() + self.removed.len()
    }

    /// 三個池所有設備編號，已排序
    pub fn unit_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .stock
            .iter()
            .chain(&self.installed)
            .chain(&self.removed)
            .map(|u| u.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn find(&self, unit_id: &str) -> Option<&PhysicalUnit> {
        self.stock
            .iter()
            .chain(&self.installed)
            .chain(&self.removed)
            .find(|u| u.id == unit_id)
    }

    pub fn require(&self, unit_id: &str) -> Result<&PhysicalUnit> {
        self.find(unit_id).ok_or_else(|| ReconError::UnknownUnit {
            unit_id: unit_id.to_string(),
        })
    }

    pub fn locate(&self, unit_id: &str) -> Option<Origin> {
        self.find(unit_id).map(|u| u.origin)
    }

    pub fn bound_unit_id(&self, slot_id: &str) -> Option<&str> {
        self.bindings.get(slot_id).map(String::as_str)
    }

    pub fn bound_unit(&self, slot_id: &str) -> Option<&PhysicalUnit> {
        self.bound_unit_id(slot_id).and_then(|id| self.find(id))
    }

    pub fn slot_of(&self, unit_id: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(_, bound)| bound.as_str() == unit_id)
            .map(|(slot, _)| slot.as_str())
    }

    pub fn move_to_installed(
        &mut self,
        unit_id: &str,
        slot: &Slot,
        reason: ChangeReason,
    ) -> Result<()> {
        if let Some(bound) = self.bindings.get(&slot.id) {
            return Err(ReconError::SlotAlreadyBound {
                slot_id: slot.id.clone(),
                unit_id: bound.clone(),
            });
        }

        let unit = self.require(unit_id)?;
        if !slot.accepts(unit) {
            return Err(mismatch(slot, unit));
        }
        if let Some(other) = self.slot_of(unit_id) {
            return Err(ReconError::UnitUnavailable {
                unit_id: unit_id.to_string(),
                reason: format!("already bound to slot {}", other),
            });
        }

        let mut unit = self.take(unit_id)?;
        unit.origin = Origin::Installed;
        unit.change_reason = reason;
        self.installed.push(unit);
        self.bindings.insert(slot.id.clone(), unit_id.to_string());
        Ok(())
    }

    pub fn move_to_removed(&mut self, unit_id: &str) -> Result<RemovalOutcome> {
        let unit = self.require(unit_id)?;
        if unit.origin != Origin::Installed {
            return Ok(RemovalOutcome::Unchanged);
        }

        self.bindings.retain(|_, bound| bound.as_str() != unit_id);
        let mut unit = self.take(unit_id)?;
        let outcome = match unit.provenance {
            Origin::Installed => {
                unit.origin = Origin::Removed;
                RemovalOutcome::Removed
            }
            previous => {
                unit.origin = previous;
                unit.change_reason = ChangeReason::Existing;
                RemovalOutcome::Reverted(previous)
            }
        };
        let target = unit.origin;
        self.pool_mut(target).push(unit);
        Ok(outcome)
    }

    pub fn reuse(&mut self, unit_id: &str, slot: &Slot) -> Result<()> {
        if self.require(unit_id)?.origin != Origin::Removed {
            return Err(ReconError::UnitNotRemoved {
                unit_id: unit_id.to_string(),
            });
        }
        self.move_to_installed(unit_id, slot, ChangeReason::Reuse)
    }

    pub(crate) fn bind_existing(&mut self, slot_id: &str, unit_id: &str) {
        self.bindings.insert(slot_id.to_string(), unit_id.to_string());
    }

    /// 重新載入後把設備搬到指定池；只在外部刷新時使用
    pub(crate) fn relocate(
        &mut self,
        unit_id: &str,
        origin: Origin,
        reason: ChangeReason,
    ) -> Result<()> {
        let mut unit = self.take(unit_id)?;
        unit.origin = origin;
        unit.change_reason = reason;
        self.pool_mut(origin).push(unit);
        Ok(())
    }

    fn take(&mut self, unit_id: &str) -> Result<PhysicalUnit> {
        let origin = self.locate(unit_id).ok_or_else(|| ReconError::UnknownUnit {
            unit_id: unit_id.to_string(),
        })?;
        let pool = self.pool_mut(origin);
        let index = pool
            .iter()
            .position(|u| u.id == unit_id)
            .ok_or_else(|| ReconError::UnknownUnit {
                unit_id: unit_id.to_string(),
            })?;
        Ok(pool.remove(index))
    }

    fn pool_mut(&mut self, origin: Origin) -> &mut Vec<PhysicalUnit> {
        match origin {
            Origin::Stock => &mut self.stock,
            Origin::Installed => &mut self.installed,
            Origin::Removed => &mut self.removed,
        }
    }
}

pub(crate) fn mismatch(slot: &Slot, unit: &PhysicalUnit) -> ReconError {
    ReconError::ModelMismatch {
        slot_id: slot.id.clone(),
        slot_category: slot.category.clone(),
        slot_model: slot.required_model.clone(),
        unit_id: unit.id.clone(),
        unit_category: unit.category.clone(),
        unit_model: unit.model.clone(),
    }
}
