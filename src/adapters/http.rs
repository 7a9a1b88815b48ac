use crate::adapters::ingest::{inventory_from_value, recomposition_from_value, remote_status};
use crate::domain::model::{
    CommitPayload, CommitReceipt, InventorySnapshot, RecompositionOutcome, SignalKind,
    SignalResult, TargetAssignment, WorkContext,
};
use crate::domain::ports::{ActivationSignal, CommitWork, InventoryQuery, RecompositionCommand};
use crate::utils::error::{ReconError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

/// 以 JSON POST 呼叫工單後端
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut base_url = Url::parse(endpoint).map_err(|e| ReconError::InvalidConfigValueError {
            field: "endpoint".to_string(),
            value: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        // 沒有結尾斜線時 join 會取代最後一段
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post_json(&self, operation: &str, path: &str, body: &Value) -> Result<Value> {
        let url = self.base_url.join(path).map_err(|e| ReconError::ConfigError {
            message: format!("Invalid endpoint path '{}': {}", path, e),
        })?;

        tracing::debug!("POST {}", url);
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        tracing::debug!("{} response status: {}", operation, status);

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|value| remote_status(&value).1);
            tracing::error!("❌ {} failed with HTTP {}", operation, status);
            Err(ReconError::external(operation, message))
        }
    }
}

/// 回應明確帶了狀態且不是成功
fn reports_failure(envelope: &Value) -> bool {
    let has_status = envelope.get("success").is_some() || envelope.get("status").is_some();
    has_status && !remote_status(envelope).0
}

#[async_trait]
impl InventoryQuery for HttpBackend {
    async fn load_inventory(&self, context: &WorkContext) -> Result<InventorySnapshot> {
        let envelope = self
            .post_json("inventory", "equipment/inventory", &json!({ "context": context }))
            .await?;
        if reports_failure(&envelope) {
            return Err(ReconError::external("inventory", remote_status(&envelope).1));
        }
        inventory_from_value(&envelope)
    }
}

#[async_trait]
impl RecompositionCommand for HttpBackend {
    async fn recompose(
        &self,
        context: &WorkContext,
        targets: &[TargetAssignment],
    ) -> Result<RecompositionOutcome> {
        let envelope = self
            .post_json(
                "recompose",
                "equipment/recompose",
                &json!({ "context": context, "targets": targets }),
            )
            .await?;
        Ok(recomposition_from_value(&envelope))
    }
}

#[async_trait]
impl ActivationSignal for HttpBackend {
    async fn send_signal(
        &self,
        context: &WorkContext,
        kind: SignalKind,
        primary_unit_id: Option<&str>,
        secondary_unit_id: Option<&str>,
    ) -> Result<SignalResult> {
        let envelope = self
            .post_json(
                "signal",
                "equipment/signal",
                &json!({
                    "context": context,
                    "kind": kind,
                    "primaryUnitId": primary_unit_id,
                    "secondaryUnitId": secondary_unit_id,
                }),
            )
            .await?;
        let (success, detail) = remote_status(&envelope);
        Ok(SignalResult { success, detail })
    }
}

#[async_trait]
impl CommitWork for HttpBackend {
    async fn commit_work(&self, payload: &CommitPayload) -> Result<CommitReceipt> {
        let envelope = self
            .post_json("commit", "work/complete", &serde_json::to_value(payload)?)
            .await?;
        let (success, message) = remote_status(&envelope);
        Ok(CommitReceipt { success, message })
    }
}
