use crate::config::rules::EngineRules;
use crate::core::allocation::{AllocationEngine, Cursor};
use crate::core::composition::{Composition, SlotView};
use crate::core::eligibility::{Eligibility, EligibilityParser};
use crate::core::validator::{CompositionValidator, ValidationMode, Violation};
use crate::domain::model::{
    CommitReceipt, DraftSnapshot, FilterMetadata, InventorySnapshot, LossFlag, PhysicalUnit,
    SignalKind, SignalStatus, SlotRevision, TargetAssignment, WorkContext,
};
use crate::domain::ports::{DraftStore, FieldBackend};
use crate::utils::error::{ReconError, Result};
use chrono::Utc;
use tokio::sync::watch;

/// 一張工單的對帳作業
///
/// 持有組成與游標，每次變更後把整個組成寫回草稿儲存。
pub struct ReconciliationSession<B: FieldBackend, D: DraftStore> {
    backend: B,
    store: D,
    engine: AllocationEngine,
    inventory: InventorySnapshot,
    committed: bool,
    signal_tx: watch::Sender<SignalStatus>,
    validation_tx: watch::Sender<Vec<Violation>>,
}

impl<B: FieldBackend, D: DraftStore> ReconciliationSession<B, D> {
    /// 載入庫存並建立組成；外部沒有已安裝設備時才還原本地草稿
    pub async fn open(backend: B, store: D, context: WorkContext, rules: EngineRules) -> Result<Self> {
        tracing::info!("📥 Opening work order {} ({})", context.work_order_id, context.work_type);
        let inventory = backend.load_inventory(&context).await?;
        tracing::info!(
            "📊 Loaded {} slots, {} stock, {} installed, {} removed",
            inventory.slots.len(),
            inventory.stock_units.len(),
            inventory.installed_units.len(),
            inventory.removed_units.len()
        );

        let mut engine = AllocationEngine::new(
            context.clone(),
            rules,
            Composition::from_inventory(&inventory),
        );

        if inventory.installed_units.is_empty() {
            match store.get(&context.work_order_id).await? {
                Some(draft) if draft.work_order_id == context.work_order_id => {
                    tracing::info!("♻️ Restored draft saved at {}", draft.saved_at);
                    engine.replace_composition(draft.composition);
                    engine.restore_signal(draft.signal_status, draft.signal_detail);
                }
                Some(draft) => tracing::warn!(
                    "⚠️ Draft belongs to work order {}, ignoring",
                    draft.work_order_id
                ),
                None => tracing::debug!("No draft for work order {}", context.work_order_id),
            }
        } else {
            tracing::debug!("Installed units reported, local draft not consulted");
        }

        let (signal_tx, _) = watch::channel(engine.signal_status());
        let (validation_tx, _) = watch::channel(Vec::new());

        Ok(Self {
            backend,
            store,
            engine,
            inventory,
            committed: false,
            signal_tx,
            validation_tx,
        })
    }

    pub fn context(&self) -> &WorkContext {
        self.engine.context()
    }

    pub fn composition(&self) -> &Composition {
        self.engine.composition()
    }

    pub fn cursor(&self) -> &Cursor {
        self.engine.cursor()
    }

    pub fn signal_status(&self) -> SignalStatus {
        self.engine.signal_status()
    }

    pub fn signal_detail(&self) -> &str {
        self.engine.signal_detail()
    }

    pub fn filter_metadata(&self) -> &FilterMetadata {
        &self.inventory.filter_metadata
    }

    pub fn is_stale(&self) -> bool {
        self.engine.is_stale()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn slot_views(&self) -> Vec<SlotView> {
        self.composition().slot_views()
    }

    /// 依目前選取的槽位過濾的庫存設備
    pub fn candidates(&self) -> Vec<&PhysicalUnit> {
        self.composition().candidates(self.cursor().slot.as_deref())
    }

    pub fn reuse_candidates(&self) -> Vec<&PhysicalUnit> {
        self.composition().reuse_candidates(self.cursor().slot.as_deref())
    }

    pub fn subscribe_signal(&self) -> watch::Receiver<SignalStatus> {
        self.signal_tx.subscribe()
    }

    pub fn subscribe_validation(&self) -> watch::Receiver<Vec<Violation>> {
        self.validation_tx.subscribe()
    }

    pub fn select_slot(&mut self, slot_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.engine.select_slot(slot_id)
    }

    pub fn select_unit(&mut self, unit_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.engine.select_unit(unit_id)
    }

    pub async fn assign(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.engine.assign()?;
        self.after_mutation().await
    }

    pub async fn unassign(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.engine.unassign()?;
        self.after_mutation().await
    }

    pub async fn reuse(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.engine.reuse()?;
        self.after_mutation().await
    }

    pub async fn set_loss_flag(&mut self, unit_id: &str, flag: LossFlag, value: bool) -> Result<()> {
        self.ensure_open()?;
        self.engine.set_loss_flag(unit_id, flag, value)?;
        self.persist().await
    }

    /// 該設備可選的租賃類型；空結果不是錯誤
    pub fn lending_options(&self, unit_id: &str) -> Result<Eligibility> {
        let unit = self.composition().pools().require(unit_id)?;
        let parser = EligibilityParser::new(
            &self.inventory.lending_types,
            &self.inventory.installment_offers,
            &self.engine.rules().installment_code,
        );
        Ok(parser.allowed_for(unit))
    }

    pub fn violations(&self) -> Vec<Violation> {
        CompositionValidator::new(self.engine.rules(), self.engine.context())
            .violations(self.composition())
    }

    /// 檢查組成並把完整違規清單推給訂閱者
    pub fn validate(&self, mode: ValidationMode) -> Result<()> {
        let validator = CompositionValidator::new(self.engine.rules(), self.engine.context());
        self.validation_tx
            .send_replace(validator.violations(self.composition()));
        validator.validate(self.composition(), mode)
    }

    /// 重新查詢庫存，保留仍然有效的本地變更
    pub async fn refresh(&mut self) -> Result<()> {
        self.ensure_open()?;
        let inventory = self.backend.load_inventory(self.engine.context()).await?;
        let rebased = self.composition().rebase(&inventory);

        let stale = rebased.stale_bindings().count();
        if stale > 0 {
            tracing::warn!("⚠️ {} slot(s) now expect a different model", stale);
        }

        self.inventory = inventory;
        self.engine.replace_composition(rebased);
        self.engine.mark_stale(false);
        tracing::info!("🔄 Inventory reloaded for {}", self.engine.context().work_order_id);
        self.persist().await
    }

    /// 遠端重組型號；成功後重新載入，回傳解碼後的項目
    pub async fn recompose(&mut self, targets: &[TargetAssignment]) -> Result<Vec<SlotRevision>> {
        self.ensure_open()?;
        self.engine.mark_stale(true);

        // 傳輸失敗時無法得知遠端是否已套用，維持過期狀態直到重新載入
        let outcome = self.backend.recompose(self.engine.context(), targets).await?;
        if !outcome.success {
            self.engine.mark_stale(false);
            tracing::warn!("⚠️ Recomposition rejected: {:?}", outcome.message);
            return Err(ReconError::external("recompose", outcome.message));
        }

        tracing::info!("✅ Recomposition accepted ({} item(s))", outcome.updated_slots.len());
        self.refresh().await?;
        Ok(outcome.updated_slots)
    }

    /// 發送開通訊號；結果只影響訊號狀態
    pub async fn send_signal(
        &mut self,
        kind: SignalKind,
        primary_unit_id: Option<&str>,
        secondary_unit_id: Option<&str>,
    ) -> Result<SignalStatus> {
        self.ensure_open()?;
        let result = self
            .backend
            .send_signal(self.engine.context(), kind, primary_unit_id, secondary_unit_id)
            .await;

        let (status, detail) = match result {
            Ok(result) if result.success => (SignalStatus::Success, result.detail.unwrap_or_default()),
            Ok(result) => (SignalStatus::Fail, result.detail.unwrap_or_default()),
            Err(e) => {
                tracing::warn!("⚠️ Signal {:?} failed: {}", kind, e);
                (SignalStatus::Fail, e.user_friendly_message())
            }
        };

        tracing::info!("📡 Signal {:?} -> {:?}", kind, status);
        self.engine.record_signal(status, detail);
        self.signal_tx.send_replace(status);
        self.persist().await?;
        Ok(status)
    }

    /// 送出完工；成功後清除草稿，失敗只能由操作人員重送
    pub async fn commit(&mut self) -> Result<CommitReceipt> {
        self.ensure_current()?;
        if let Err(e) = self.validate(ValidationMode::CollectAll) {
            tracing::warn!("⚠️ Commit blocked: {}", e);
            return Err(e);
        }

        let payload = self.composition().flatten(self.engine.context());
        tracing::info!(
            "📤 Committing {} assignment(s), {} removal(s), {} loss record(s)",
            payload.assignments.len(),
            payload.removals.len(),
            payload.loss_dispositions.len()
        );

        let receipt = self.backend.commit_work(&payload).await?;
        if !receipt.success {
            tracing::error!("❌ Commit rejected: {:?}", receipt.message);
            return Err(ReconError::external("commit", receipt.message));
        }

        self.store.clear(&self.engine.context().work_order_id).await?;
        self.committed = true;
        tracing::info!("✅ Work order {} committed", self.engine.context().work_order_id);
        Ok(receipt)
    }

    /// 捨棄本地變更，回到最後一次載入的狀態
    pub async fn discard(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.store.clear(&self.engine.context().work_order_id).await?;
        self.engine
            .replace_composition(Composition::from_inventory(&self.inventory));
        self.engine.restore_signal(SignalStatus::Idle, String::new());
        self.engine.mark_stale(false);
        self.signal_tx.send_replace(SignalStatus::Idle);
        tracing::info!("🗑️ Draft discarded for {}", self.engine.context().work_order_id);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.committed {
            return Err(ReconError::CompositionCommitted {
                work_order_id: self.engine.context().work_order_id.clone(),
            });
        }
        Ok(())
    }

    fn ensure_current(&self) -> Result<()> {
        self.ensure_open()?;
        if self.engine.is_stale() {
            return Err(ReconError::CompositionStale {
                work_order_id: self.engine.context().work_order_id.clone(),
            });
        }
        Ok(())
    }

    async fn after_mutation(&mut self) -> Result<()> {
        self.signal_tx.send_replace(self.engine.signal_status());
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = DraftSnapshot {
            work_order_id: self.engine.context().work_order_id.clone(),
            composition: self.composition().clone(),
            signal_status: self.engine.signal_status(),
            signal_detail: self.engine.signal_detail().to_string(),
            saved_at: Utc::now(),
        };
        self.store
            .set(&self.engine.context().work_order_id, &snapshot)
            .await
    }
}
