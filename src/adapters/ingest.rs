//! 外部回應正規化
//!
//! 遠端回傳的欄位名稱依來源不同而有多種寫法，只在這裡對應一次，
//! 之後引擎只處理強型別的 `Slot` / `PhysicalUnit`。

use crate::core::codec::{recomposition_schema, split_type_sequence};
use crate::domain::model::{
    FilterMetadata, InstallmentOffer, InventorySnapshot, LendingType, Origin, PhysicalUnit,
    RecompositionOutcome, Slot, SlotRevision,
};
use crate::utils::error::{ReconError, Result};
use serde_json::Value;
use std::collections::HashMap;

const UNIT_ID: &[&str] = &["EQT_NO", "id", "eqtNo"];
const SERIAL: &[&str] = &["EQT_SERNO", "serialNumber"];
const CATEGORY: &[&str] = &["ITEM_MID_CD", "itemMidCd"];
const MODEL: &[&str] = &["EQT_CL_CD", "EQT_CL", "eqtClCd"];
const LENDING_CODE: &[&str] = &["LENT", "lendingCode"];
const ELIGIBILITY_TAG: &[&str] = &["LENT_YN", "lentYn"];
const USAGE_STATE: &[&str] = &["EQT_USE_STAT_CD", "usageState"];
const MAC: &[&str] = &["MAC_ADDRESS", "MAC_ADDR", "macAddress"];
const SALE_AMOUNT: &[&str] = &["EQT_SALE_AMT", "saleAmount"];

const SLOT_ID: &[&str] = &["SVC_CMPS_ID", "PROD_CMPS_ID", "id"];
const SLOT_NAME: &[&str] = &["EQT_CL_NM", "ITEM_MID_NM", "EQT_NM", "displayName"];

/// 依序取第一個非空值；數字也接受
pub fn first_string(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn required(record: &Value, keys: &[&str], pool: &str, index: usize) -> Result<String> {
    first_string(record, keys).ok_or_else(|| ReconError::IngestionError {
        pool: pool.to_string(),
        index,
        message: format!("missing field (tried {})", keys.join(", ")),
    })
}

fn parse_amount(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u64>() {
        Ok(amount) => Some(amount),
        Err(_) => {
            tracing::debug!("Ignoring non-numeric sale amount '{}'", trimmed);
            None
        }
    }
}

pub fn slot_from_value(record: &Value, index: usize) -> Result<Slot> {
    let id = required(record, SLOT_ID, "slots", index)?;
    let category = required(record, CATEGORY, "slots", index)?;
    let model = first_string(record, MODEL).unwrap_or_default();

    let mut slot = Slot::new(id, category, model);
    if let Some(name) = first_string(record, SLOT_NAME) {
        slot.display_name = name;
    }
    Ok(slot)
}

pub fn unit_from_value(record: &Value, origin: Origin, index: usize) -> Result<PhysicalUnit> {
    let pool = origin.to_string();
    let id = required(record, UNIT_ID, &pool, index)?;
    let category = required(record, CATEGORY, &pool, index)?;
    let model = first_string(record, MODEL).unwrap_or_default();

    let mut unit = PhysicalUnit::new(id, category, model, origin);
    unit.serial_no = first_string(record, SERIAL);
    unit.lending_code = first_string(record, LENDING_CODE).unwrap_or_default();
    unit.eligibility_tag = first_string(record, ELIGIBILITY_TAG).unwrap_or_default();
    unit.usage_state = first_string(record, USAGE_STATE).unwrap_or_default();
    unit.mac_address = first_string(record, MAC);
    unit.sale_amount = first_string(record, SALE_AMOUNT).and_then(|s| parse_amount(&s));
    Ok(unit)
}

pub fn lending_type_from_value(record: &Value) -> Option<LendingType> {
    let code = first_string(record, &["COMMON_CD", "code"])?;
    Some(LendingType {
        name: first_string(record, &["COMMON_CD_NM", "name"]).unwrap_or_else(|| code.clone()),
        reference_code: first_string(record, &["REF_CODE", "referenceCode"]).unwrap_or_default(),
        code,
    })
}

pub fn installment_offer_from_value(record: &Value) -> InstallmentOffer {
    let period_eligible = match record.get("PRED").or_else(|| record.get("periodEligible")) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim() == "1",
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        _ => false,
    };
    InstallmentOffer {
        usage_state: first_string(record, USAGE_STATE).unwrap_or_default(),
        model: first_string(record, MODEL).unwrap_or_default(),
        period_eligible,
    }
}

fn records<'a>(envelope: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| envelope.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn units(envelope: &Value, keys: &[&str], origin: Origin) -> Result<Vec<PhysicalUnit>> {
    records(envelope, keys)
        .iter()
        .enumerate()
        .map(|(index, record)| unit_from_value(record, origin, index))
        .collect()
}

/// 庫存查詢回應 -> `InventorySnapshot`
pub fn inventory_from_value(envelope: &Value) -> Result<InventorySnapshot> {
    let slots = records(envelope, &["contractEquipments", "slots"])
        .iter()
        .enumerate()
        .map(|(index, record)| slot_from_value(record, index))
        .collect::<Result<Vec<_>>>()?;

    let filter_metadata = FilterMetadata {
        kpi_product_group: first_string(envelope, &["kpiProdGrpCd", "KPI_PROD_GRP_CD"]),
        product_change_kind: first_string(envelope, &["prodChgGb", "PROD_CHG_GB"]),
        changed_kpi_product_group: first_string(envelope, &["chgKpiProdGrpCd", "CHG_KPI_PROD_GRP_CD"]),
        product_group: first_string(envelope, &["prodGrp", "PROD_GRP"]),
    };

    Ok(InventorySnapshot {
        slots,
        stock_units: units(envelope, &["technicianEquipments", "stockUnits"], Origin::Stock)?,
        installed_units: units(envelope, &["customerEquipments", "installedUnits"], Origin::Installed)?,
        removed_units: units(envelope, &["removedEquipments", "removedUnits"], Origin::Removed)?,
        filter_metadata,
        lending_types: records(envelope, &["lendingTypes", "LENT"])
            .iter()
            .filter_map(lending_type_from_value)
            .collect(),
        installment_offers: records(envelope, &["installmentOffers", "saleProducts"])
            .iter()
            .map(installment_offer_from_value)
            .collect(),
    })
}

/// 遠端狀態：`success: true` 或 `status: "success"`，並取出訊息
pub fn remote_status(envelope: &Value) -> (bool, Option<String>) {
    let success = match (envelope.get("success"), envelope.get("status")) {
        (Some(Value::Bool(b)), _) => *b,
        (_, Some(Value::String(s))) => s.eq_ignore_ascii_case("success") || s.eq_ignore_ascii_case("ok"),
        _ => false,
    };
    let message = first_string(envelope, &["message", "MSG", "resultDetail"]);
    (success, message)
}

/// 重組回應 -> `RecompositionOutcome`，打包字串依固定寬度拆解
pub fn recomposition_from_value(envelope: &Value) -> RecompositionOutcome {
    let (success, message) = remote_status(envelope);

    let info = records(envelope, &["output1", "serviceComposition"])
        .first()
        .or_else(|| envelope.get("composition"));
    let Some(info) = info else {
        return RecompositionOutcome {
            success,
            message,
            updated_slots: Vec::new(),
        };
    };

    // 打包欄位不可 trim，否則寬度會位移
    let mut columns: HashMap<String, String> = recomposition_schema()
        .fields()
        .iter()
        .filter_map(|field| {
            let raw = match info.get(field.name)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((field.name.to_string(), raw))
        })
        .collect();
    if let Some(lents) = columns.get_mut("LENTS") {
        lents.retain(|c| c != '[' && c != ']');
    }

    let sequences = first_string(info, &["PROD_CMPS_CLS"])
        .map(|packed| split_type_sequence(&packed))
        .unwrap_or_default();

    let updated_slots = recomposition_schema()
        .decode(&columns)
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let cell = |name: &str, fallback: &str| {
                record
                    .get(name)
                    .filter(|v| !v.is_empty())
                    .cloned()
                    .unwrap_or_else(|| fallback.to_string())
            };
            SlotRevision {
                category: cell("ITEM_MID_CDS", ""),
                model: cell("EQT_CLS", ""),
                lending_code: cell("LENTS", "10"),
                usage_state: cell("EQT_USE_STATS", "1"),
                installment_period: cell("ITLLMT_PRDS", "00"),
                sale_amount: record.get("EQT_SALE_AMTS").and_then(|s| parse_amount(s)),
                product_code: cell("PROD_CDS", ""),
                service_code: cell("SVC_CDS", ""),
                provisional_sequence: sequences.get(index).cloned(),
            }
        })
        .collect();

    RecompositionOutcome {
        success,
        message,
        updated_slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unit_aliases_resolve_to_canonical_fields() {
        let legacy = json!({
            "EQT_NO": "EQT001",
            "EQT_SERNO": "SN-1",
            "ITEM_MID_CD": "04",
            "EQT_CL": "090403",
            "LENT": "10",
            "LENT_YN": "|0904031|",
            "MAC_ADDR": "AA:BB",
            "EQT_SALE_AMT": "15000"
        });
        let modern = json!({
            "id": "EQT001",
            "serialNumber": "SN-1",
            "itemMidCd": "04",
            "eqtClCd": "090403",
            "lendingCode": "10",
            "lentYn": "|0904031|",
            "macAddress": "AA:BB",
            "saleAmount": 15000
        });

        let a = unit_from_value(&legacy, Origin::Stock, 0).unwrap();
        let b = unit_from_value(&modern, Origin::Stock, 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.model, "090403");
        assert_eq!(a.sale_amount, Some(15000));
    }

    #[test]
    fn test_first_non_empty_alias_wins() {
        let record = json!({"EQT_CL_CD": "", "EQT_CL": "090805"});
        assert_eq!(first_string(&record, MODEL).as_deref(), Some("090805"));
    }

    #[test]
    fn test_missing_category_names_pool_and_index() {
        let err = unit_from_value(&json!({"EQT_NO": "X"}), Origin::Installed, 3).unwrap_err();
        match err {
            ReconError::IngestionError { pool, index, .. } => {
                assert_eq!(pool, "INSTALLED");
                assert_eq!(index, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_inventory_envelope() {
        let envelope = json!({
            "contractEquipments": [
                {"SVC_CMPS_ID": "SVC001", "ITEM_MID_CD": "04", "ITEM_MID_NM": "Modem"}
            ],
            "technicianEquipments": [
                {"EQT_NO": "EQT001", "ITEM_MID_CD": "04", "EQT_CL_CD": "090403"}
            ],
            "customerEquipments": [],
            "removedEquipments": [],
            "kpiProdGrpCd": "I",
            "lendingTypes": [{"COMMON_CD": "10", "COMMON_CD_NM": "Rental", "REF_CODE": "1"}],
            "saleProducts": [{"PRED": "1", "EQT_USE_STAT_CD": "1", "EQT_CL_CD": "090403"}]
        });

        let inventory = inventory_from_value(&envelope).unwrap();
        assert_eq!(inventory.slots[0].display_name, "Modem");
        assert_eq!(inventory.slots[0].required_model, "");
        assert_eq!(inventory.stock_units[0].origin, Origin::Stock);
        assert_eq!(inventory.filter_metadata.kpi_product_group.as_deref(), Some("I"));
        assert_eq!(inventory.lending_types[0].reference_code, "1");
        assert!(inventory.installment_offers[0].period_eligible);
    }

    #[test]
    fn test_recomposition_decodes_packed_columns() {
        let envelope = json!({
            "status": "SUCCESS",
            "output1": [{
                "ITEM_MID_CDS": "02        05        ",
                "EQT_CLS": "090805    092101    ",
                "LENTS": "[10][31]",
                "EQT_USE_STATS": "1",
                "ITLLMT_PRDS": "0024",
                "EQT_SALE_AMTS": "          99000     ",
                "PROD_CMPS_CLS": "231232"
            }]
        });

        let outcome = recomposition_from_value(&envelope);
        assert!(outcome.success);
        assert_eq!(outcome.updated_slots.len(), 2);
        let second = &outcome.updated_slots[1];
        assert_eq!(second.model, "092101");
        assert_eq!(second.lending_code, "31");
        assert_eq!(second.usage_state, "1");
        assert_eq!(second.installment_period, "24");
        assert_eq!(second.sale_amount, Some(99000));
        assert_eq!(second.provisional_sequence, Some(("2".to_string(), "32".to_string())));
        assert_eq!(outcome.updated_slots[0].sale_amount, None);
    }

    #[test]
    fn test_remote_status_variants() {
        assert_eq!(remote_status(&json!({"success": true})), (true, None));
        assert_eq!(
            remote_status(&json!({"status": "FAIL", "message": "contract locked"})),
            (false, Some("contract locked".to_string()))
        );
    }
}
