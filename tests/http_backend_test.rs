use equip_recon::domain::model::{
    CommitPayload, Origin, SignalKind, TargetAssignment, WorkContext, WorkType,
};
use equip_recon::domain::ports::{
    ActivationSignal, CommitWork, InventoryQuery, RecompositionCommand,
};
use equip_recon::{EngineRules, HttpBackend, LocalDraftStore, ReconError, ReconciliationSession};
use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn inventory_body() -> serde_json::Value {
    json!({
        "contractEquipments": [
            {"SVC_CMPS_ID": "SVC001", "ITEM_MID_CD": "04", "EQT_CL_CD": "090403", "ITEM_MID_NM": "Modem"},
            {"SVC_CMPS_ID": "SVC002", "ITEM_MID_CD": "05", "ITEM_MID_NM": "Set-top box"}
        ],
        "technicianEquipments": [
            {"EQT_NO": "EQT001", "EQT_SERNO": "RSM100001", "ITEM_MID_CD": "04", "EQT_CL": "090403",
             "MAC_ADDRESS": "AA:BB:CC:DD:EE:01", "LENT_YN": "|0904031|"}
        ],
        "customerEquipments": [
            {"eqtNo": "CUST01", "itemMidCd": "05", "eqtClCd": "092101"}
        ],
        "removedEquipments": [],
        "kpiProdGrpCd": "I",
        "lendingTypes": [{"COMMON_CD": "10", "COMMON_CD_NM": "Rental", "REF_CODE": "1"}]
    })
}

#[tokio::test]
async fn test_load_inventory_normalizes_records() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/equipment/inventory")
                .body_contains("\"work_order_id\":\"WO-1\"");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(inventory_body());
        })
        .await;

    let backend = HttpBackend::new(&server.url("/api")).unwrap();
    let inventory = backend
        .load_inventory(&WorkContext::new("WO-1", WorkType::Install))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(inventory.slots.len(), 2);
    assert_eq!(inventory.stock_units[0].id, "EQT001");
    assert_eq!(inventory.stock_units[0].mac_address.as_deref(), Some("AA:BB:CC:DD:EE:01"));
    assert_eq!(inventory.installed_units[0].origin, Origin::Installed);
    assert_eq!(inventory.installed_units[0].model, "092101");
}

#[tokio::test]
async fn test_remote_error_message_is_propagated() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/work/complete");
            then.status(500)
                .header("Content-Type", "application/json")
                .json_body(json!({"status": "FAIL", "message": "Equipment EQT001 is already registered"}));
        })
        .await;

    let backend = HttpBackend::new(&server.url("/api")).unwrap();
    let payload = CommitPayload {
        work_order_id: "WO-1".to_string(),
        work_type: WorkType::Install,
        assignments: vec![],
        removals: vec![],
        loss_dispositions: vec![],
    };

    match backend.commit_work(&payload).await {
        Err(ReconError::ExternalCallFailed { operation, message }) => {
            assert_eq!(operation, "commit");
            assert_eq!(message, "Equipment EQT001 is already registered");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_remote_error_without_body_uses_generic_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/equipment/signal");
            then.status(502);
        })
        .await;

    let backend = HttpBackend::new(&server.url("/api")).unwrap();
    let err = backend
        .send_signal(
            &WorkContext::new("WO-1", WorkType::Install),
            SignalKind::Activation,
            Some("EQT001"),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.user_friendly_message(), "The request could not be completed.");
}

#[tokio::test]
async fn test_recompose_decodes_packed_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/equipment/recompose");
            then.status(200).json_body(json!({
                "status": "SUCCESS",
                "output1": [{
                    "ITEM_MID_CDS": "04        ",
                    "EQT_CLS": "090405    ",
                    "LENTS": "[31]",
                    "EQT_USE_STATS": "1",
                    "ITLLMT_PRDS": "24",
                    "PROD_CMPS_CLS": "231"
                }]
            }));
        })
        .await;

    let backend = HttpBackend::new(&server.url("/api")).unwrap();
    let targets = vec![TargetAssignment {
        category: "04".to_string(),
        model: "090405".to_string(),
        lending_code: "31".to_string(),
        usage_state: "1".to_string(),
        installment_period: "24".to_string(),
    }];
    let outcome = backend
        .recompose(&WorkContext::new("WO-1", WorkType::ProductChange), &targets)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.updated_slots.len(), 1);
    assert_eq!(outcome.updated_slots[0].model, "090405");
    assert_eq!(outcome.updated_slots[0].lending_code, "31");
    assert_eq!(outcome.updated_slots[0].installment_period, "24");
}

#[tokio::test]
async fn test_session_over_http_writes_local_draft() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/equipment/inventory");
            then.status(200).json_body(inventory_body());
        })
        .await;
    let commit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/work/complete")
                .body_contains("\"unit_id\":\"EQT001\"");
            then.status(200).json_body(json!({"success": true, "message": "completed"}));
        })
        .await;

    let dir = TempDir::new().unwrap();
    let store = LocalDraftStore::new(dir.path().to_str().unwrap().to_string());
    let backend = HttpBackend::new(&server.url("/api")).unwrap();
    let mut session = ReconciliationSession::open(
        backend,
        store.clone(),
        WorkContext::new("WO-7", WorkType::Install),
        EngineRules::default(),
    )
    .await
    .unwrap();

    session.select_slot("SVC001").unwrap();
    session.select_unit("EQT001").unwrap();
    session.assign().await.unwrap();
    assert!(store.draft_path("WO-7").exists());

    let receipt = session.commit().await.unwrap();
    commit.assert_async().await;
    assert_eq!(receipt.message.as_deref(), Some("completed"));
    assert!(!store.draft_path("WO-7").exists());
}
