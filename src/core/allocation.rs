//! 槽位與設備的指派狀態機
//!
//! 所有組成變更都經過這裡；任何一步失敗時組成維持上一個正確狀態。

use crate::config::rules::EngineRules;
use crate::core::composition::{Composition, SlotState};
use crate::core::pool::{mismatch, RemovalOutcome};
use crate::core::validator::CompositionValidator;
use crate::domain::model::{
    ChangeReason, LossDisposition, LossFlag, Origin, PhysicalUnit, SignalStatus, WorkContext,
};
use crate::utils::error::{ReconError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub slot: Option<String>,
    pub unit: Option<String>,
}

impl Cursor {
    fn clear(&mut self) {
        self.slot = None;
        self.unit = None;
    }
}

pub struct AllocationEngine {
    context: WorkContext,
    rules: EngineRules,
    composition: Composition,
    cursor: Cursor,
    signal_status: SignalStatus,
    signal_detail: String,
    stale: bool,
}

impl AllocationEngine {
    pub fn new(context: WorkContext, rules: EngineRules, composition: Composition) -> Self {
        Self {
            context,
            rules,
            composition,
            cursor: Cursor::default(),
            signal_status: SignalStatus::Idle,
            signal_detail: String::new(),
            stale: false,
        }
    }

    pub fn context(&self) -> &WorkContext {
        &self.context
    }

    pub fn rules(&self) -> &EngineRules {
        &self.rules
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn signal_status(&self) -> SignalStatus {
        self.signal_status
    }

    pub fn signal_detail(&self) -> &str {
        &self.signal_detail
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub(crate) fn mark_stale(&mut self, stale: bool) {
        self.stale = stale;
    }

    /// 以新組成取代（刷新、還原草稿、捨棄時使用）
    pub(crate) fn replace_composition(&mut self, composition: Composition) {
        self.composition = composition;
        self.cursor.clear();
    }

    pub(crate) fn restore_signal(&mut self, status: SignalStatus, detail: String) {
        self.signal_status = status;
        self.signal_detail = detail;
    }

    pub fn record_signal(&mut self, status: SignalStatus, detail: impl Into<String>) {
        self.signal_status = status;
        self.signal_detail = detail.into();
    }

    pub fn select_slot(&mut self, slot_id: &str) -> Result<()> {
        self.composition.catalog.require(slot_id)?;

        if self.cursor.slot.as_deref() == Some(slot_id) {
            tracing::debug!("Slot {} deselected", slot_id);
            self.cursor.clear();
            return Ok(());
        }

        self.cursor.slot = Some(slot_id.to_string());
        self.cursor.unit = match self.composition.slot_state(slot_id) {
            SlotState::Assigned(unit) => Some(unit.id.clone()),
            SlotState::Unassigned => None,
        };
        tracing::debug!("Slot {} selected (unit cursor {:?})", slot_id, self.cursor.unit);
        Ok(())
    }

    pub fn select_unit(&mut self, unit_id: &str) -> Result<()> {
        self.composition.pools.require(unit_id)?;

        if self.cursor.unit.as_deref() == Some(unit_id) {
            self.cursor.unit = None;
        } else {
            self.cursor.unit = Some(unit_id.to_string());
        }
        tracing::debug!("Unit cursor now {:?}", self.cursor.unit);
        Ok(())
    }

    pub fn assign(&mut self) -> Result<()> {
        self.ensure_editable()?;
        let (slot_id, unit_id) = self.both_cursors()?;
        let slot = self.composition.catalog.require(&slot_id)?.clone();
        let unit = self.composition.pools.require(&unit_id)?.clone();

        if !slot.accepts(&unit) {
            return Err(mismatch(&slot, &unit));
        }
        self.check_gates(&unit)?;

        match unit.origin {
            Origin::Removed => {
                return Err(ReconError::UnitUnavailable {
                    unit_id,
                    reason: "unit was removed; reuse it instead".to_string(),
                })
            }
            Origin::Installed => {
                if let Some(other) = self.composition.pools.slot_of(&unit_id) {
                    return Err(ReconError::UnitUnavailable {
                        unit_id: unit_id.clone(),
                        reason: format!("already bound to slot {}", other),
                    });
                }
            }
            Origin::Stock => {}
        }

        // 先決定舊綁定如何處理，再動任何狀態
        let replaced = self.composition.pools.bound_unit(&slot_id).cloned();
        if let Some(existing) = &replaced {
            let stale = !slot.accepts(existing);
            if !stale && existing.provenance != Origin::Stock {
                return Err(ReconError::SlotAlreadyBound {
                    slot_id,
                    unit_id: existing.id.clone(),
                });
            }
        }
        self.check_ceiling_after_assign(&unit, replaced.as_ref())?;

        let reason = if self.context.work_type.is_exchange() {
            ChangeReason::Exchange
        } else {
            ChangeReason::Install
        };

        self.transact(|composition| {
            if let Some(existing) = &replaced {
                vacate(composition, existing)?;
            }
            composition.pools.move_to_installed(&unit.id, &slot, reason)
        })?;

        tracing::info!("✅ Unit {} assigned to slot {}", unit.id, slot.id);
        self.after_mutation();
        Ok(())
    }

    pub fn unassign(&mut self) -> Result<()> {
        self.ensure_editable()?;
        let unit_id = self.cursor.unit.clone().ok_or(ReconError::NoUnitSelected)?;
        let unit = self.composition.pools.require(&unit_id)?.clone();
        if unit.origin != Origin::Installed {
            return Err(ReconError::UnitNotInstalled { unit_id });
        }
        self.check_gates(&unit)?;

        let outcome = self.transact(|composition| retire(composition, &unit.id))?;

        match outcome {
            RemovalOutcome::Removed => tracing::info!("📤 Unit {} moved to removed pool", unit.id),
            RemovalOutcome::Reverted(origin) => {
                tracing::info!("↩️ Unit {} returned to {} pool", unit.id, origin)
            }
            RemovalOutcome::Unchanged => {}
        }
        self.after_mutation();
        Ok(())
    }

    /// 成功後一律清除兩個游標，與 assign/unassign 一致
    pub fn reuse(&mut self) -> Result<()> {
        self.ensure_editable()?;
        let (slot_id, unit_id) = self.both_cursors()?;
        let slot = self.composition.catalog.require(&slot_id)?.clone();
        let unit = self.composition.pools.require(&unit_id)?.clone();

        if unit.origin != Origin::Removed {
            return Err(ReconError::UnitNotRemoved { unit_id });
        }
        if !slot.accepts(&unit) {
            return Err(mismatch(&slot, &unit));
        }
        self.check_gates(&unit)?;

        let stale = match self.composition.pools.bound_unit(&slot_id) {
            Some(existing) if slot.accepts(existing) => {
                return Err(ReconError::SlotAlreadyBound {
                    slot_id,
                    unit_id: existing.id.clone(),
                })
            }
            other => other.cloned(),
        };
        self.check_ceiling_after_assign(&unit, None)?;

        self.transact(|composition| {
            if let Some(existing) = &stale {
                vacate(composition, existing)?;
            }
            composition.pools.reuse(&unit.id, &slot)?;
            composition.loss_dispositions.remove(&unit.id);
            Ok(())
        })?;

        tracing::info!("♻️ Unit {} reused in slot {}", unit.id, slot.id);
        self.after_mutation();
        Ok(())
    }

    /// 設定拆除設備的遺失/損壞旗標；不影響訊號狀態
    pub fn set_loss_flag(&mut self, unit_id: &str, flag: LossFlag, value: bool) -> Result<()> {
        self.ensure_editable()?;
        let unit = self.composition.pools.require(unit_id)?;
        if self.rules.is_customer_owned(&unit.lending_code) {
            return Err(ReconError::LossNotApplicable {
                unit_id: unit_id.to_string(),
                reason: "customer-owned equipment".to_string(),
            });
        }
        let disposition = self
            .composition
            .loss_dispositions
            .get_mut(unit_id)
            .ok_or_else(|| ReconError::UnitNotRemoved {
                unit_id: unit_id.to_string(),
            })?;
        disposition.set(flag, value);
        tracing::debug!("Loss flag {:?}={} on unit {}", flag, value, unit_id);
        Ok(())
    }

    fn both_cursors(&self) -> Result<(String, String)> {
        let slot = self.cursor.slot.clone().ok_or(ReconError::NoSlotSelected)?;
        let unit = self.cursor.unit.clone().ok_or(ReconError::NoUnitSelected)?;
        Ok((slot, unit))
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.stale {
            return Err(ReconError::CompositionStale {
                work_order_id: self.context.work_order_id.clone(),
            });
        }
        Ok(())
    }

    fn check_gates(&self, unit: &PhysicalUnit) -> Result<()> {
        let work_type = self.context.work_type;

        let gate = &self.rules.contract_gate;
        if gate.work_types.contains(&work_type)
            && !gate.editable_statuses.contains(&self.context.contract_status)
        {
            tracing::warn!(
                "⚠️ Contract {} not editable for work type {}",
                self.context.contract_status,
                work_type
            );
            return Err(ReconError::ContractNotEditable {
                work_type: work_type.code().to_string(),
                status: self.context.contract_status.clone(),
            });
        }

        for swap in self.rules.restricted_swaps.iter().filter(|s| s.work_types.contains(&work_type)) {
            if !swap.allowed.iter().any(|key| key.matches(unit)) {
                tracing::warn!("⚠️ {}/{} is restricted under work type {}", unit.category, unit.model, work_type);
                return Err(ReconError::RestrictedEquipmentType {
                    work_type: work_type.code().to_string(),
                    category: unit.category.clone(),
                    model: unit.model.clone(),
                });
            }
        }

        Ok(())
    }

    fn check_ceiling_after_assign(
        &self,
        unit: &PhysicalUnit,
        replaced: Option<&PhysicalUnit>,
    ) -> Result<()> {
        let current = self
            .composition
            .assigned()
            .filter(|(_, u)| u.category == unit.category)
            .filter(|(_, u)| replaced.map_or(true, |r| r.id != u.id))
            .count();
        let validator = CompositionValidator::new(&self.rules, &self.context);
        match validator.check_ceiling(&unit.category, current + 1) {
            Some(violation) => Err(ReconError::ValidationFailed(vec![violation])),
            None => Ok(()),
        }
    }

    /// 失敗時還原整個組成
    fn transact<T>(&mut self, op: impl FnOnce(&mut Composition) -> Result<T>) -> Result<T> {
        let backup = self.composition.clone();
        match op(&mut self.composition) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.composition = backup;
                Err(e)
            }
        }
    }

    fn after_mutation(&mut self) {
        self.cursor.clear();
        self.signal_status = SignalStatus::Idle;
        self.signal_detail.clear();
    }
}

/// 拆下設備；客戶原有設備進拆除池並開立處置紀錄，其餘退回原本的池
fn retire(composition: &mut Composition, unit_id: &str) -> Result<RemovalOutcome> {
    let outcome = composition.pools.move_to_removed(unit_id)?;
    if outcome == RemovalOutcome::Removed {
        composition
            .loss_dispositions
            .insert(unit_id.to_string(), LossDisposition::default());
    }
    Ok(outcome)
}

/// 騰出槽位；被換下的客戶設備必須出現在提交的拆除清單
fn vacate(composition: &mut Composition, existing: &PhysicalUnit) -> Result<()> {
    if retire(composition, &existing.id)? == RemovalOutcome::Removed {
        tracing::info!("📤 Stale unit {} moved to removed pool", existing.id);
    }
    Ok(())
}
