use crate::domain::model::DraftSnapshot;
use crate::domain::ports::DraftStore;
use crate::utils::error::Result;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// 草稿存成 `<base>/draft_<work order id>.json`
#[derive(Debug, Clone)]
pub struct LocalDraftStore {
    base_path: String,
}

impl LocalDraftStore {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }

    pub fn draft_path(&self, work_order_id: &str) -> PathBuf {
        let safe: String = work_order_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        Path::new(&self.base_path).join(format!("draft_{}.json", safe))
    }
}

impl DraftStore for LocalDraftStore {
    async fn get(&self, work_order_id: &str) -> Result<Option<DraftSnapshot>> {
        let full_path = self.draft_path(work_order_id);
        let data = match fs::read(&full_path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&data) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!("⚠️ Unreadable draft {}: {}", full_path.display(), e);
                Ok(None)
            }
        }
    }

    async fn set(&self, work_order_id: &str, snapshot: &DraftSnapshot) -> Result<()> {
        let full_path = self.draft_path(work_order_id);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&full_path, data)?;
        tracing::debug!("Draft saved to {}", full_path.display());
        Ok(())
    }

    async fn clear(&self, work_order_id: &str) -> Result<()> {
        match fs::remove_file(self.draft_path(work_order_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 行程內的草稿儲存，clone 後共用同一份資料
#[derive(Debug, Clone, Default)]
pub struct MemoryDraftStore {
    drafts: Arc<Mutex<HashMap<String, DraftSnapshot>>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, work_order_id: &str) -> bool {
        self.with_drafts(|drafts| drafts.contains_key(work_order_id))
    }

    fn with_drafts<T>(&self, f: impl FnOnce(&mut HashMap<String, DraftSnapshot>) -> T) -> T {
        // 鎖中毒時沿用既有內容
        let mut guard = match self.drafts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl DraftStore for MemoryDraftStore {
    async fn get(&self, work_order_id: &str) -> Result<Option<DraftSnapshot>> {
        Ok(self.with_drafts(|drafts| drafts.get(work_order_id).cloned()))
    }

    async fn set(&self, work_order_id: &str, snapshot: &DraftSnapshot) -> Result<()> {
        self.with_drafts(|drafts| drafts.insert(work_order_id.to_string(), snapshot.clone()));
        Ok(())
    }

    async fn clear(&self, work_order_id: &str) -> Result<()> {
        self.with_drafts(|drafts| drafts.remove(work_order_id));
        Ok(())
    }
}
