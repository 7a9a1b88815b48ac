use crate::domain::model::{PhysicalUnit, Slot};
use crate::utils::error::{ReconError, Result};
use serde::{Deserialize, Serialize};

/// 一個服務組成的合約槽位，保持載入順序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCatalog {
    slots: Vec<Slot>,
}

impl SlotCatalog {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot_id: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }

    pub fn require(&self, slot_id: &str) -> Result<&Slot> {
        self.get(slot_id).ok_or_else(|| ReconError::UnknownSlot {
            slot_id: slot_id.to_string(),
        })
    }

    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Slot> + 'a {
        self.slots.iter().filter(move |s| s.category == category)
    }

    /// 綁定只在設備型號仍符合槽位目前接受的型號時有效；
    /// 合約更新後的舊綁定視為未綁定
    pub fn binding_is_valid(&self, slot_id: &str, unit: &PhysicalUnit) -> bool {
        self.get(slot_id).is_some_and(|slot| slot.accepts(unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Origin;

    fn catalog() -> SlotCatalog {
        SlotCatalog::new(vec![
            Slot::new("S1", "router", "R1"),
            Slot::new("S2", "stb", ""),
            Slot::new("S3", "router", "R2"),
        ])
    }

    #[test]
    fn test_lookup_by_id_and_category() {
        let catalog = catalog();
        assert_eq!(catalog.get("S2").map(|s| s.category.as_str()), Some("stb"));
        assert!(catalog.get("S9").is_none());
        assert!(matches!(catalog.require("S9"), Err(ReconError::UnknownSlot { .. })));
        let routers: Vec<&str> = catalog.by_category("router").map(|s| s.id.as_str()).collect();
        assert_eq!(routers, vec!["S1", "S3"]);
    }

    #[test]
    fn test_binding_validity_follows_accepted_model() {
        let catalog = catalog();
        let r1 = PhysicalUnit::new("U1", "router", "R1", Origin::Installed);
        let any_stb = PhysicalUnit::new("U2", "stb", "X7", Origin::Installed);
        assert!(catalog.binding_is_valid("S1", &r1));
        assert!(!catalog.binding_is_valid("S3", &r1));
        assert!(catalog.binding_is_valid("S2", &any_stb));
        assert!(!catalog.binding_is_valid("S9", &r1));
    }
}
