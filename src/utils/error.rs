use crate::core::validator::Violation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Unit {unit_id} ({unit_category}/{unit_model}) does not fit slot {slot_id} ({slot_category}/{slot_model})")]
    ModelMismatch {
        slot_id: String,
        slot_category: String,
        slot_model: String,
        unit_id: String,
        unit_category: String,
        unit_model: String,
    },

    #[error("Equipment {category}/{model} cannot be changed under work type {work_type}")]
    RestrictedEquipmentType {
        work_type: String,
        category: String,
        model: String,
    },

    #[error("Contract status {status} does not allow equipment changes for work type {work_type}")]
    ContractNotEditable { work_type: String, status: String },

    #[error("Slot {slot_id} is already bound to unit {unit_id}; unassign it first")]
    SlotAlreadyBound { slot_id: String, unit_id: String },

    #[error("Composition validation failed: {}", summarize(.0))]
    ValidationFailed(Vec<Violation>),

    #[error("External call '{operation}' failed: {message}")]
    ExternalCallFailed { operation: String, message: String },

    #[error("Unknown slot: {slot_id}")]
    UnknownSlot { slot_id: String },

    #[error("Unknown unit: {unit_id}")]
    UnknownUnit { unit_id: String },

    #[error("No slot selected")]
    NoSlotSelected,

    #[error("No unit selected")]
    NoUnitSelected,

    #[error("Unit {unit_id} is not currently installed")]
    UnitNotInstalled { unit_id: String },

    #[error("Unit {unit_id} is not in the removed pool")]
    UnitNotRemoved { unit_id: String },

    #[error("Unit {unit_id} is not available for assignment: {reason}")]
    UnitUnavailable { unit_id: String, reason: String },

    #[error("Loss disposition does not apply to unit {unit_id}: {reason}")]
    LossNotApplicable { unit_id: String, reason: String },

    #[error("Composition for work order {work_order_id} is stale; reload inventory first")]
    CompositionStale { work_order_id: String },

    #[error("Work order {work_order_id} has already been committed")]
    CompositionCommitted { work_order_id: String },

    #[error("Ingestion error in {pool} record #{index}: {message}")]
    IngestionError {
        pool: String,
        index: usize,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}': '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ReconError>;

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Matching,
    Gate,
    Validation,
    Selection,
    External,
    Storage,
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReconError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ReconError::ModelMismatch { .. }
            | ReconError::SlotAlreadyBound { .. }
            | ReconError::UnitUnavailable { .. } => ErrorCategory::Matching,
            ReconError::RestrictedEquipmentType { .. }
            | ReconError::ContractNotEditable { .. }
            | ReconError::CompositionStale { .. }
            | ReconError::CompositionCommitted { .. } => ErrorCategory::Gate,
            ReconError::ValidationFailed(_) | ReconError::LossNotApplicable { .. } => {
                ErrorCategory::Validation
            }
            ReconError::UnknownSlot { .. }
            | ReconError::UnknownUnit { .. }
            | ReconError::NoSlotSelected
            | ReconError::NoUnitSelected
            | ReconError::UnitNotInstalled { .. }
            | ReconError::UnitNotRemoved { .. } => ErrorCategory::Selection,
            ReconError::ExternalCallFailed { .. }
            | ReconError::HttpError(_)
            | ReconError::IngestionError { .. } => ErrorCategory::External,
            ReconError::IoError(_) | ReconError::SerializationError(_) => ErrorCategory::Storage,
            ReconError::ConfigError { .. }
            | ReconError::InvalidConfigValueError { .. } => ErrorCategory::Config,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Selection => ErrorSeverity::Low,
            ErrorCategory::Matching | ErrorCategory::Gate | ErrorCategory::Validation => {
                ErrorSeverity::Medium
            }
            ErrorCategory::External => ErrorSeverity::High,
            ErrorCategory::Storage | ErrorCategory::Config => ErrorSeverity::Critical,
        }
    }

    /// 給操作人員看的訊息
    pub fn user_friendly_message(&self) -> String {
        match self {
            ReconError::ValidationFailed(violations) => {
                let lines: Vec<String> = violations.iter().map(|v| format!("- {}", v)).collect();
                format!("The equipment composition cannot be saved:\n{}", lines.join("\n"))
            }
            ReconError::ExternalCallFailed { message, .. } => message.clone(),
            ReconError::HttpError(_) => {
                "The server could not be reached. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Matching => "Pick a unit whose category and model match the slot",
            ErrorCategory::Gate => "Check the work type and contract status, or reload inventory",
            ErrorCategory::Validation => "Fix the listed composition problems and submit again",
            ErrorCategory::Selection => "Select a slot and a unit first",
            ErrorCategory::External => "Resubmit once the remote service is reachable",
            ErrorCategory::Storage => "Check the draft directory permissions and disk space",
            ErrorCategory::Config => "Check the rules file and command line arguments",
        }
    }

    pub(crate) fn external(operation: &str, message: Option<String>) -> Self {
        ReconError::ExternalCallFailed {
            operation: operation.to_string(),
            message: message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "The request could not be completed.".to_string()),
        }
    }
}
