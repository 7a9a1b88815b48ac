// 外部系統的具體實作：遠端後端、草稿儲存、回應正規化
pub mod http;
pub mod ingest;
pub mod storage;

pub use http::HttpBackend;
pub use storage::{LocalDraftStore, MemoryDraftStore};
