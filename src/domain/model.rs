use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 設備目前所在的池
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// 技師隨身庫存
    Stock,
    /// 客戶端已安裝
    Installed,
    /// 已拆回、可再利用
    Removed,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Origin::Stock => "STOCK",
            Origin::Installed => "INSTALLED",
            Origin::Removed => "REMOVED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeReason {
    /// 由庫存載入時即存在的設備，尚未變動
    #[default]
    Existing,
    Install,
    Reuse,
    Exchange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalUnit {
    pub id: String,
    pub serial_no: Option<String>,
    pub category: String,
    pub model: String,
    /// 目前所在的池
    pub origin: Origin,
    /// 載入時所在的池，之後不會改變
    pub provenance: Origin,
    pub lending_code: String,
    pub eligibility_tag: String,
    pub usage_state: String,
    pub mac_address: Option<String>,
    pub sale_amount: Option<u64>,
    pub change_reason: ChangeReason,
}

impl PhysicalUnit {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        model: impl Into<String>,
        origin: Origin,
    ) -> Self {
        Self {
            id: id.into(),
            serial_no: None,
            category: category.into(),
            model: model.into(),
            origin,
            provenance: origin,
            lending_code: String::new(),
            eligibility_tag: String::new(),
            usage_state: String::new(),
            mac_address: None,
            sale_amount: None,
            change_reason: ChangeReason::Existing,
        }
    }

    pub fn with_lending(mut self, lending_code: &str, eligibility_tag: &str) -> Self {
        self.lending_code = lending_code.to_string();
        self.eligibility_tag = eligibility_tag.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub category: String,
    /// 空字串代表同類別任何型號都可
    pub required_model: String,
    pub display_name: String,
}

impl Slot {
    pub fn new(id: impl Into<String>, category: impl Into<String>, required_model: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            category: category.into(),
            required_model: required_model.into(),
        }
    }

    pub fn accepts(&self, unit: &PhysicalUnit) -> bool {
        unit.category == self.category
            && (self.required_model.is_empty() || unit.model == self.required_model)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFlag {
    Unit,
    Accessory,
    Remote,
    Cable,
    Cradle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LossDisposition {
    pub unit_lost: bool,
    pub accessory_lost: bool,
    pub remote_lost: bool,
    pub cable_lost: bool,
    pub cradle_lost: bool,
}

impl LossDisposition {
    pub fn set(&mut self, flag: LossFlag, value: bool) {
        match flag {
            LossFlag::Unit => self.unit_lost = value,
            LossFlag::Accessory => self.accessory_lost = value,
            LossFlag::Remote => self.remote_lost = value,
            LossFlag::Cable => self.cable_lost = value,
            LossFlag::Cradle => self.cradle_lost = value,
        }
    }

    pub fn any(&self) -> bool {
        self.unit_lost || self.accessory_lost || self.remote_lost || self.cable_lost || self.cradle_lost
    }

    /// 任一旗標為真即不可再利用
    pub fn reusable(&self) -> bool {
        !self.any()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    #[default]
    Idle,
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkType {
    #[serde(rename = "01")]
    Install,
    #[serde(rename = "02")]
    Removal,
    #[serde(rename = "03")]
    AfterService,
    #[serde(rename = "04")]
    Suspension,
    #[serde(rename = "05")]
    ProductChange,
    #[serde(rename = "06")]
    InternalMove,
    #[serde(rename = "07")]
    RelocationInstall,
    #[serde(rename = "08")]
    RelocationRemoval,
    #[serde(rename = "09")]
    AddOn,
}

impl WorkType {
    pub fn code(&self) -> &'static str {
        match self {
            WorkType::Install => "01",
            WorkType::Removal => "02",
            WorkType::AfterService => "03",
            WorkType::Suspension => "04",
            WorkType::ProductChange => "05",
            WorkType::InternalMove => "06",
            WorkType::RelocationInstall => "07",
            WorkType::RelocationRemoval => "08",
            WorkType::AddOn => "09",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let work_type = match code.trim() {
            "01" => WorkType::Install,
            "02" => WorkType::Removal,
            "03" => WorkType::AfterService,
            "04" => WorkType::Suspension,
            "05" => WorkType::ProductChange,
            "06" => WorkType::InternalMove,
            "07" => WorkType::RelocationInstall,
            "08" => WorkType::RelocationRemoval,
            "09" => WorkType::AddOn,
            _ => return None,
        };
        Some(work_type)
    }

    /// 以庫存設備替換既有設備的作業
    pub fn is_exchange(&self) -> bool {
        matches!(self, WorkType::AfterService | WorkType::ProductChange)
    }
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkContext {
    pub work_order_id: String,
    pub work_type: WorkType,
    pub contract_status: String,
    pub base_product: String,
    /// 綁約加購商品，影響無線 AP 上限
    pub bundle_product: bool,
}

impl WorkContext {
    pub fn new(work_order_id: impl Into<String>, work_type: WorkType) -> Self {
        Self {
            work_order_id: work_order_id.into(),
            work_type,
            contract_status: "20".to_string(),
            base_product: String::new(),
            bundle_product: false,
        }
    }
}

/// 類別 + 選填型號，用於規則比對
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquipmentKey {
    pub category: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl EquipmentKey {
    pub fn new(category: &str, model: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            model: model.map(str::to_string),
        }
    }

    pub fn matches(&self, unit: &PhysicalUnit) -> bool {
        unit.category == self.category
            && self.model.as_deref().map_or(true, |model| unit.model == model)
    }
}

impl std::fmt::Display for EquipmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{}/{}", self.category, model),
            None => write!(f, "{}", self.category),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingType {
    pub code: String,
    pub name: String,
    pub reference_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentOffer {
    pub usage_state: String,
    pub model: String,
    pub period_eligible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterMetadata {
    pub kpi_product_group: Option<String>,
    pub product_change_kind: Option<String>,
    pub changed_kpi_product_group: Option<String>,
    pub product_group: Option<String>,
}

/// 庫存/合約查詢結果，已完成欄位正規化
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub slots: Vec<Slot>,
    pub stock_units: Vec<PhysicalUnit>,
    pub installed_units: Vec<PhysicalUnit>,
    pub removed_units: Vec<PhysicalUnit>,
    #[serde(default)]
    pub filter_metadata: FilterMetadata,
    #[serde(default)]
    pub lending_types: Vec<LendingType>,
    #[serde(default)]
    pub installment_offers: Vec<InstallmentOffer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAssignment {
    pub category: String,
    pub model: String,
    pub lending_code: String,
    pub usage_state: String,
    pub installment_period: String,
}

/// 遠端重組回傳的單一項目
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRevision {
    pub category: String,
    pub model: String,
    pub lending_code: String,
    pub usage_state: String,
    pub installment_period: String,
    pub sale_amount: Option<u64>,
    pub product_code: String,
    pub service_code: String,
    /// 無分隔的類型+序號字串拆出的暫定值，不作為槽位身分
    pub provisional_sequence: Option<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecompositionOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub updated_slots: Vec<SlotRevision>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Activation,
    TemporaryActivation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalResult {
    pub success: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub slot_id: String,
    pub unit_id: String,
    pub category: String,
    pub model: String,
    pub lending_code: String,
    pub change_reason: ChangeReason,
    pub mac_address: Option<String>,
    pub sale_amount: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalRecord {
    pub unit_id: String,
    pub category: String,
    pub model: String,
    pub reusable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossRecord {
    pub unit_id: String,
    pub disposition: LossDisposition,
}

/// 送出完工時的扁平化資料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPayload {
    pub work_order_id: String,
    pub work_type: WorkType,
    pub assignments: Vec<AssignmentRecord>,
    pub removals: Vec<RemovalRecord>,
    pub loss_dispositions: Vec<LossRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub work_order_id: String,
    pub composition: crate::core::composition::Composition,
    pub signal_status: SignalStatus,
    #[serde(default)]
    pub signal_detail: String,
    pub saved_at: DateTime<Utc>,
}
