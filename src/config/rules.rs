use crate::domain::model::{EquipmentKey, WorkType};
use crate::utils::error::{ReconError, Result};
use crate::utils::validation::{
    validate_model_code, validate_non_empty_string, validate_positive_number, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 設備組成的業務規則
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineRules {
    pub contract_gate: ContractGate,
    pub restricted_swaps: Vec<RestrictedSwap>,
    pub ceilings: Vec<QuantityCeiling>,
    pub pairs: Vec<PairRule>,
    pub mandatory: Vec<MandatoryRule>,
    /// 允許空組成的作業類型
    pub empty_allowed: Vec<WorkType>,
    pub installment_code: String,
    pub customer_owned_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractGate {
    pub work_types: Vec<WorkType>,
    pub editable_statuses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedSwap {
    pub work_types: Vec<WorkType>,
    pub allowed: Vec<EquipmentKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityCeiling {
    pub category: String,
    pub label: String,
    pub max: usize,
    /// 綁約加購商品時的上限
    #[serde(default)]
    pub bundle_max: Option<usize>,
    /// 只對這些基本商品生效；未設定時適用所有商品
    #[serde(default)]
    pub base_products: Option<Vec<String>>,
}

impl QuantityCeiling {
    pub fn applies_to(&self, base_product: &str) -> bool {
        self.base_products
            .as_ref()
            .map_or(true, |products| products.iter().any(|p| p == base_product))
    }

    pub fn limit(&self, bundle_product: bool) -> usize {
        match (bundle_product, self.bundle_max) {
            (true, Some(max)) => max,
            _ => self.max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRule {
    pub first: EquipmentKey,
    pub first_label: String,
    pub second: EquipmentKey,
    pub second_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandatoryRule {
    pub base_products: Vec<String>,
    pub required: EquipmentKey,
    pub label: String,
}

impl Default for ContractGate {
    fn default() -> Self {
        Self {
            work_types: vec![WorkType::AfterService],
            editable_statuses: vec!["20".to_string()],
        }
    }
}

impl Default for EngineRules {
    fn default() -> Self {
        // 大樓內移機只能搬動這些無線/OTT 型號
        let reusable_models = ["091001", "091005", "091006", "091401", "092401", "090251"];

        Self {
            contract_gate: ContractGate::default(),
            restricted_swaps: vec![RestrictedSwap {
                work_types: vec![WorkType::InternalMove],
                allowed: reusable_models
                    .iter()
                    .map(|model| EquipmentKey {
                        category: model_category(model).to_string(),
                        model: Some(model.to_string()),
                    })
                    .collect(),
            }],
            // 同類別依序比對，第一條適用的生效
            ceilings: vec![
                QuantityCeiling {
                    category: "10".to_string(),
                    label: "Wireless AP".to_string(),
                    max: 1,
                    bundle_max: Some(2),
                    // 合作商品清單由遠端代碼表提供，於規則檔設定
                    base_products: Some(Vec::new()),
                },
                QuantityCeiling {
                    category: "10".to_string(),
                    label: "Wireless AP".to_string(),
                    max: 180,
                    bundle_max: Some(2),
                    base_products: None,
                },
                QuantityCeiling {
                    category: "09".to_string(),
                    label: "Handset".to_string(),
                    max: 180,
                    bundle_max: None,
                    base_products: None,
                },
            ],
            pairs: vec![
                PairRule {
                    first: EquipmentKey::new("02", Some("090805")),
                    first_label: "WIFI".to_string(),
                    second: EquipmentKey::new("02", Some("091002")),
                    second_label: "AP (WiFi)".to_string(),
                },
                PairRule {
                    first: EquipmentKey::new("08", Some("090804")),
                    first_label: "DECT".to_string(),
                    second: EquipmentKey::new("08", Some("090901")),
                    second_label: "HANDY".to_string(),
                },
            ],
            mandatory: vec![MandatoryRule {
                base_products: vec!["MAXW001".into(), "MAXW002".into(), "MAXW003".into()],
                required: EquipmentKey::new("05", Some("092101")),
                label: "Compact TV".to_string(),
            }],
            empty_allowed: vec![
                WorkType::Removal,
                WorkType::Suspension,
                WorkType::RelocationRemoval,
            ],
            installment_code: "31".to_string(),
            customer_owned_code: "40".to_string(),
        }
    }
}

fn model_category(model: &str) -> &'static str {
    match model {
        "092401" => "05",
        _ => "02",
    }
}

impl EngineRules {
    /// 從 TOML 檔案載入規則
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析規則，未列出的區段沿用預設值
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ReconError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${EDITABLE_STATUS})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ReconError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn ceiling_for(&self, category: &str, base_product: &str) -> Option<&QuantityCeiling> {
        self.ceilings
            .iter()
            .find(|c| c.category == category && c.applies_to(base_product))
    }

    pub fn allows_empty(&self, work_type: WorkType) -> bool {
        self.empty_allowed.contains(&work_type)
    }

    pub fn is_customer_owned(&self, lending_code: &str) -> bool {
        !self.customer_owned_code.is_empty() && lending_code == self.customer_owned_code
    }
}

impl Validate for EngineRules {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("installment_code", &self.installment_code)?;

        for ceiling in &self.ceilings {
            validate_non_empty_string("ceilings.category", &ceiling.category)?;
            validate_positive_number("ceilings.max", ceiling.max, 1)?;
            if let Some(bundle_max) = ceiling.bundle_max {
                validate_positive_number("ceilings.bundle_max", bundle_max, 1)?;
            }
            for product in ceiling.base_products.iter().flatten() {
                validate_non_empty_string("ceilings.base_products", product)?;
            }
        }

        let keys = self
            .pairs
            .iter()
            .flat_map(|p| [&p.first, &p.second])
            .chain(self.mandatory.iter().map(|m| &m.required))
            .chain(self.restricted_swaps.iter().flat_map(|r| r.allowed.iter()));
        for key in keys {
            validate_non_empty_string("equipment.category", &key.category)?;
            if let Some(model) = &key.model {
                validate_model_code("equipment.model", model)?;
            }
        }

        Ok(())
    }
}
