use crate::core::catalog::SlotCatalog;
use crate::core::pool::{EquipmentPools, RemovalOutcome};
use crate::domain::model::{
    AssignmentRecord, CommitPayload, InventorySnapshot, LossDisposition, LossRecord, Origin,
    PhysicalUnit, RemovalRecord, Slot, WorkContext,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// 槽位狀態；過期綁定視為未指派
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState<'a> {
    Unassigned,
    Assigned(&'a PhysicalUnit),
}

/// 呈現層用的唯讀投影：合約槽位 + 實際設備
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub slot: Slot,
    pub unit: Option<PhysicalUnit>,
    /// 槽位上仍掛著型號已不符的設備
    pub stale_unit: Option<String>,
}

/// 一張工單的設備組成
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    pub(crate) catalog: SlotCatalog,
    pub(crate) pools: EquipmentPools,
    /// 本次拆除、待處置的設備
    pub(crate) loss_dispositions: BTreeMap<String, LossDisposition>,
}

impl Composition {
    /// 由查詢結果建立；客戶已安裝設備先對應型號相符的槽位，
    /// 找不到時才退而對應同類別的空槽位（成為過期綁定）
    pub fn from_inventory(inventory: &InventorySnapshot) -> Self {
        let catalog = SlotCatalog::new(inventory.slots.clone());
        let mut pools = EquipmentPools::from_inventory(
            inventory.stock_units.clone(),
            inventory.installed_units.clone(),
            inventory.removed_units.clone(),
        );

        let mut matched: HashSet<String> = HashSet::new();
        let mut unplaced: Vec<&PhysicalUnit> = Vec::new();
        for unit in &inventory.installed_units {
            match catalog
                .slots()
                .iter()
                .find(|s| !matched.contains(&s.id) && s.accepts(unit))
            {
                Some(slot) => {
                    matched.insert(slot.id.clone());
                    pools.bind_existing(&slot.id, &unit.id);
                }
                None => unplaced.push(unit),
            }
        }

        for unit in unplaced {
            match catalog
                .by_category(&unit.category)
                .find(|s| !matched.contains(&s.id))
            {
                Some(slot) => {
                    matched.insert(slot.id.clone());
                    pools.bind_existing(&slot.id, &unit.id);
                }
                None => tracing::debug!("Installed unit {} has no matching slot", unit.id),
            }
        }

        Self {
            catalog,
            pools,
            loss_dispositions: BTreeMap::new(),
        }
    }

    pub fn catalog(&self) -> &SlotCatalog {
        &self.catalog
    }

    pub fn pools(&self) -> &EquipmentPools {
        &self.pools
    }

    pub fn loss_dispositions(&self) -> &BTreeMap<String, LossDisposition> {
        &self.loss_dispositions
    }

    pub fn loss_disposition(&self, unit_id: &str) -> Option<&LossDisposition> {
        self.loss_dispositions.get(unit_id)
    }

    pub fn slot_state(&self, slot_id: &str) -> SlotState<'_> {
        match self.pools.bound_unit(slot_id) {
            Some(unit) if self.catalog.binding_is_valid(slot_id, unit) => SlotState::Assigned(unit),
            _ => SlotState::Unassigned,
        }
    }

    /// 有效綁定，依槽位順序
    pub fn assigned(&self) -> impl Iterator<Item = (&Slot, &PhysicalUnit)> + '_ {
        self.catalog.slots().iter().filter_map(move |slot| match self.slot_state(&slot.id) {
            SlotState::Assigned(unit) => Some((slot, unit)),
            SlotState::Unassigned => None,
        })
    }

    /// 型號已不符槽位的舊綁定
    pub fn stale_bindings(&self) -> impl Iterator<Item = (&Slot, &PhysicalUnit)> + '_ {
        self.catalog.slots().iter().filter_map(move |slot| {
            let unit = self.pools.bound_unit(&slot.id)?;
            (!slot.accepts(unit)).then_some((slot, unit))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.assigned().next().is_none()
    }

    pub fn slot_views(&self) -> Vec<SlotView> {
        self.catalog
            .slots()
            .iter()
            .map(|slot| {
                let bound = self.pools.bound_unit(&slot.id);
                let valid = bound.filter(|unit| slot.accepts(unit));
                SlotView {
                    slot: slot.clone(),
                    unit: valid.cloned(),
                    stale_unit: bound.filter(|unit| !slot.accepts(unit)).map(|u| u.id.clone()),
                }
            })
            .collect()
    }

    /// 可指派到該槽位的庫存設備；未選槽位時列出全部庫存
    pub fn candidates(&self, slot_id: Option<&str>) -> Vec<&PhysicalUnit> {
        let slot = slot_id.and_then(|id| self.catalog.get(id));
        self.pools
            .stock()
            .iter()
            .filter(|unit| slot.map_or(true, |s| s.accepts(unit)))
            .collect()
    }

    /// 可再利用、且符合該槽位的拆除池設備
    pub fn reuse_candidates(&self, slot_id: Option<&str>) -> Vec<&PhysicalUnit> {
        let slot = slot_id.and_then(|id| self.catalog.get(id));
        self.pools
            .removed()
            .iter()
            .filter(|unit| slot.map_or(true, |s| s.accepts(unit)))
            .collect()
    }

    /// 本次作業拆下的客戶設備
    pub fn pending_removals(&self) -> impl Iterator<Item = &PhysicalUnit> + '_ {
        self.pools
            .removed()
            .iter()
            .filter(|unit| unit.provenance == Origin::Installed)
    }

    pub fn flatten(&self, context: &WorkContext) -> CommitPayload {
        let assignments = self
            .assigned()
            .map(|(slot, unit)| AssignmentRecord {
                slot_id: slot.id.clone(),
                unit_id: unit.id.clone(),
                category: unit.category.clone(),
                model: unit.model.clone(),
                lending_code: unit.lending_code.clone(),
                change_reason: unit.change_reason,
                mac_address: unit.mac_address.clone(),
                sale_amount: unit.sale_amount,
            })
            .collect();

        let removals = self
            .pending_removals()
            .map(|unit| RemovalRecord {
                unit_id: unit.id.clone(),
                category: unit.category.clone(),
                model: unit.model.clone(),
                reusable: self
                    .loss_dispositions
                    .get(&unit.id)
                    .map_or(true, LossDisposition::reusable),
            })
            .collect();

        let loss_dispositions = self
            .loss_dispositions
            .iter()
            .filter(|(_, disposition)| disposition.any())
            .map(|(unit_id, disposition)| LossRecord {
                unit_id: unit_id.clone(),
                disposition: *disposition,
            })
            .collect();

        CommitPayload {
            work_order_id: context.work_order_id.clone(),
            work_type: context.work_type,
            assignments,
            removals,
            loss_dispositions,
        }
    }

    /// 以新的查詢結果重建，保留仍存在設備的本地綁定與拆除紀錄
    pub fn rebase(&self, inventory: &InventorySnapshot) -> Self {
        let mut next = Self::from_inventory(inventory);

        for unit in self.pending_removals() {
            if next.pools.locate(&unit.id) != Some(Origin::Installed) {
                continue;
            }
            if let Ok(RemovalOutcome::Removed) = next.pools.move_to_removed(&unit.id) {
                let disposition = self.loss_dispositions.get(&unit.id).copied().unwrap_or_default();
                next.loss_dispositions.insert(unit.id.clone(), disposition);
            }
        }

        for (slot_id, unit_id) in self.pools.bindings() {
            if next.catalog.get(slot_id).is_none() {
                tracing::warn!("⚠️ Slot {} disappeared after reload, dropping local binding", slot_id);
                continue;
            }
            if next.pools.bound_unit_id(slot_id) == Some(unit_id.as_str()) {
                continue;
            }
            if next.pools.bound_unit_id(slot_id).is_some() || next.pools.slot_of(unit_id).is_some() {
                tracing::warn!("⚠️ Binding {} -> {} conflicts with reloaded data", slot_id, unit_id);
                continue;
            }
            let Some(origin) = next.pools.locate(unit_id) else {
                tracing::warn!("⚠️ Unit {} no longer in inventory, dropping binding", unit_id);
                continue;
            };
            if origin != Origin::Installed {
                let reason = self
                    .pools
                    .find(unit_id)
                    .map(|u| u.change_reason)
                    .unwrap_or_default();
                if next.pools.relocate(unit_id, Origin::Installed, reason).is_err() {
                    continue;
                }
            }
            next.pools.bind_existing(slot_id, unit_id);
        }

        next
    }
}
