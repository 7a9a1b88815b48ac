pub mod allocation;
pub mod catalog;
pub mod codec;
pub mod composition;
pub mod eligibility;
pub mod pool;
pub mod session;
pub mod validator;

pub use crate::domain::ports::{DraftStore, FieldBackend};
pub use crate::utils::error::Result;
