pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{HttpBackend, LocalDraftStore, MemoryDraftStore};
pub use config::rules::EngineRules;
pub use core::allocation::AllocationEngine;
pub use core::composition::{Composition, SlotState, SlotView};
pub use core::session::ReconciliationSession;
pub use core::validator::{ValidationMode, Violation};
pub use utils::error::{ReconError, Result};
