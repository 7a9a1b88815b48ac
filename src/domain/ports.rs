use crate::domain::model::{
    CommitPayload, CommitReceipt, DraftSnapshot, InventorySnapshot, RecompositionOutcome,
    SignalKind, SignalResult, TargetAssignment, WorkContext,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 以工單編號為鍵的草稿儲存
pub trait DraftStore: Send + Sync {
    fn get(
        &self,
        work_order_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<DraftSnapshot>>> + Send;
    fn set(
        &self,
        work_order_id: &str,
        snapshot: &DraftSnapshot,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn clear(&self, work_order_id: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait InventoryQuery: Send + Sync {
    async fn load_inventory(&self, context: &WorkContext) -> Result<InventorySnapshot>;
}

#[async_trait]
pub trait RecompositionCommand: Send + Sync {
    async fn recompose(
        &self,
        context: &WorkContext,
        targets: &[TargetAssignment],
    ) -> Result<RecompositionOutcome>;
}

#[async_trait]
pub trait ActivationSignal: Send + Sync {
    async fn send_signal(
        &self,
        context: &WorkContext,
        kind: SignalKind,
        primary_unit_id: Option<&str>,
        secondary_unit_id: Option<&str>,
    ) -> Result<SignalResult>;
}

#[async_trait]
pub trait CommitWork: Send + Sync {
    async fn commit_work(&self, payload: &CommitPayload) -> Result<CommitReceipt>;
}

/// 工單作業需要的全部遠端服務
pub trait FieldBackend: InventoryQuery + RecompositionCommand + ActivationSignal + CommitWork {}

impl<T> FieldBackend for T where T: InventoryQuery + RecompositionCommand + ActivationSignal + CommitWork {}
