use crate::config::rules::EngineRules;
use crate::core::composition::Composition;
use crate::domain::model::WorkContext;
use crate::utils::error::{ReconError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// 違反的組成規則，每一種都有獨立的提示訊息
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Violation {
    #[error("At least one piece of equipment must be registered")]
    EmptyComposition,

    #[error("{label} cannot exceed {ceiling} unit(s) (requested {count})")]
    QuantityExceeded {
        category: String,
        label: String,
        ceiling: usize,
        count: usize,
    },

    #[error("{first} and {second} must both be registered")]
    UnpairedCategory { first: String, second: String },

    #[error("Product {product} requires {required}")]
    MissingMandatory { product: String, required: String },

    #[error("Unit {unit_id} is registered in more than one slot")]
    DuplicateUnit { unit_id: String },

    #[error("Slot {slot_id} now expects model {expected} but unit {unit_id} is {actual}; register a matching unit")]
    StaleBinding {
        slot_id: String,
        unit_id: String,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// 送出前檢查，遇到第一個違規就停
    FailFast,
    /// 摘要畫面用，列出所有違規
    CollectAll,
}

pub struct CompositionValidator<'a> {
    rules: &'a EngineRules,
    context: &'a WorkContext,
}

impl<'a> CompositionValidator<'a> {
    pub fn new(rules: &'a EngineRules, context: &'a WorkContext) -> Self {
        Self { rules, context }
    }

    pub fn validate(&self, composition: &Composition, mode: ValidationMode) -> Result<()> {
        let violations = match mode {
            ValidationMode::FailFast => self.first_violation(composition).into_iter().collect(),
            ValidationMode::CollectAll => self.violations(composition),
        };
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ReconError::ValidationFailed(violations))
        }
    }

    pub fn first_violation(&self, composition: &Composition) -> Option<Violation> {
        self.checks()
            .iter()
            .find_map(|check| check(self, composition).into_iter().next())
    }

    pub fn violations(&self, composition: &Composition) -> Vec<Violation> {
        self.checks()
            .iter()
            .flat_map(|check| check(self, composition))
            .collect()
    }

    /// 單一類別的數量上限，指派時也會用到
    pub fn check_ceiling(&self, category: &str, count: usize) -> Option<Violation> {
        let ceiling = self
            .rules
            .ceiling_for(category, &self.context.base_product)?;
        let limit = ceiling.limit(self.context.bundle_product);
        (count > limit).then(|| Violation::QuantityExceeded {
            category: category.to_string(),
            label: ceiling.label.clone(),
            ceiling: limit,
            count,
        })
    }

    fn checks(&self) -> [fn(&Self, &Composition) -> Vec<Violation>; 6] {
        [
            Self::check_not_empty,
            Self::check_ceilings,
            Self::check_pairs,
            Self::check_mandatory,
            Self::check_duplicates,
            Self::check_stale_bindings,
        ]
    }

    fn check_not_empty(&self, composition: &Composition) -> Vec<Violation> {
        if composition.is_empty() && !self.rules.allows_empty(self.context.work_type) {
            vec![Violation::EmptyComposition]
        } else {
            Vec::new()
        }
    }

    fn check_ceilings(&self, composition: &Composition) -> Vec<Violation> {
        let categories: BTreeSet<&str> =
            self.rules.ceilings.iter().map(|c| c.category.as_str()).collect();
        categories
            .into_iter()
            .filter_map(|category| {
                let count = composition
                    .assigned()
                    .filter(|(_, unit)| unit.category == category)
                    .count();
                self.check_ceiling(category, count)
            })
            .collect()
    }

    fn check_pairs(&self, composition: &Composition) -> Vec<Violation> {
        self.rules
            .pairs
            .iter()
            .filter(|pair| {
                let has_first = composition.assigned().any(|(_, u)| pair.first.matches(u));
                let has_second = composition.assigned().any(|(_, u)| pair.second.matches(u));
                has_first != has_second
            })
            .map(|pair| Violation::UnpairedCategory {
                first: pair.first_label.clone(),
                second: pair.second_label.clone(),
            })
            .collect()
    }

    fn check_mandatory(&self, composition: &Composition) -> Vec<Violation> {
        let product = self.context.base_product.as_str();
        self.rules
            .mandatory
            .iter()
            .filter(|rule| rule.base_products.iter().any(|p| p == product))
            .filter(|rule| !composition.assigned().any(|(_, u)| rule.required.matches(u)))
            .map(|rule| Violation::MissingMandatory {
                product: product.to_string(),
                required: rule.label.clone(),
            })
            .collect()
    }

    fn check_duplicates(&self, composition: &Composition) -> Vec<Violation> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        composition
            .pools()
            .bindings()
            .values()
            .filter(|unit_id| !seen.insert(unit_id.as_str()))
            .filter(|unit_id| reported.insert(unit_id.as_str()))
            .map(|unit_id| Violation::DuplicateUnit {
                unit_id: unit_id.clone(),
            })
            .collect()
    }

    fn check_stale_bindings(&self, composition: &Composition) -> Vec<Violation> {
        composition
            .stale_bindings()
            .map(|(slot, unit)| Violation::StaleBinding {
                slot_id: slot.id.clone(),
                unit_id: unit.id.clone(),
                expected: slot.required_model.clone(),
                actual: unit.model.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rules::{PairRule, QuantityCeiling};
    use crate::domain::model::{EquipmentKey, InventorySnapshot, Origin, PhysicalUnit, Slot, WorkType};

    fn rules() -> EngineRules {
        EngineRules {
            ceilings: vec![QuantityCeiling {
                category: "ap".into(),
                label: "Wireless AP".into(),
                max: 1,
                bundle_max: Some(2),
                base_products: None,
            }],
            pairs: vec![PairRule {
                first: EquipmentKey::new("wifi", None),
                first_label: "WIFI".into(),
                second: EquipmentKey::new("ap", None),
                second_label: "AP".into(),
            }],
            ..EngineRules::default()
        }
    }

    fn composition(slots: Vec<Slot>, installed: Vec<PhysicalUnit>) -> Composition {
        Composition::from_inventory(&InventorySnapshot {
            slots,
            installed_units: installed,
            ..InventorySnapshot::default()
        })
    }

    #[test]
    fn test_empty_composition_depends_on_work_type() {
        let rules = rules();
        let empty = composition(vec![Slot::new("S1", "router", "")], vec![]);

        let install = WorkContext::new("WO-1", WorkType::Install);
        let validator = CompositionValidator::new(&rules, &install);
        assert_eq!(validator.violations(&empty), vec![Violation::EmptyComposition]);

        let removal = WorkContext::new("WO-1", WorkType::Removal);
        let validator = CompositionValidator::new(&rules, &removal);
        assert!(validator.validate(&empty, ValidationMode::CollectAll).is_ok());
    }

    #[test]
    fn test_pair_rule_needs_both_members() {
        let rules = rules();
        let context = WorkContext::new("WO-1", WorkType::Install);
        let validator = CompositionValidator::new(&rules, &context);

        let solo = composition(
            vec![Slot::new("S1", "wifi", ""), Slot::new("S2", "ap", "")],
            vec![PhysicalUnit::new("W1", "wifi", "M1", Origin::Installed)],
        );
        assert_eq!(
            validator.violations(&solo),
            vec![Violation::UnpairedCategory { first: "WIFI".into(), second: "AP".into() }]
        );

        let both = composition(
            vec![Slot::new("S1", "wifi", ""), Slot::new("S2", "ap", "")],
            vec![
                PhysicalUnit::new("W1", "wifi", "M1", Origin::Installed),
                PhysicalUnit::new("A1", "ap", "M2", Origin::Installed),
            ],
        );
        assert!(validator.violations(&both).is_empty());
    }

    #[test]
    fn test_ceiling_cites_limit_and_honours_bundle_flag() {
        let rules = rules();
        let mut context = WorkContext::new("WO-1", WorkType::Install);
        let validator = CompositionValidator::new(&rules, &context);
        let violation = validator.check_ceiling("ap", 2).unwrap();
        assert_eq!(
            violation,
            Violation::QuantityExceeded {
                category: "ap".into(),
                label: "Wireless AP".into(),
                ceiling: 1,
                count: 2
            }
        );
        assert!(violation.to_string().contains("cannot exceed 1"));

        context.bundle_product = true;
        let validator = CompositionValidator::new(&rules, &context);
        assert!(validator.check_ceiling("ap", 2).is_none());
        assert!(validator.check_ceiling("router", 99).is_none());
    }

    #[test]
    fn test_ap_ceiling_depends_on_base_product() {
        let mut rules = EngineRules::default();
        rules.ceilings[0].base_products = Some(vec!["UPLS001".into()]);
        let two_aps = composition(
            vec![Slot::new("S1", "10", ""), Slot::new("S2", "10", "")],
            vec![
                PhysicalUnit::new("A1", "10", "091002", Origin::Installed),
                PhysicalUnit::new("A2", "10", "091002", Origin::Installed),
            ],
        );

        let mut context = WorkContext::new("WO-1", WorkType::Install);
        context.base_product = "UPLS001".into();
        let validator = CompositionValidator::new(&rules, &context);
        assert_eq!(
            validator.violations(&two_aps),
            vec![Violation::QuantityExceeded {
                category: "10".into(),
                label: "Wireless AP".into(),
                ceiling: 1,
                count: 2
            }]
        );

        context.base_product = "ISPW01".into();
        let validator = CompositionValidator::new(&rules, &context);
        assert!(validator.violations(&two_aps).is_empty());
    }

    #[test]
    fn test_mandatory_category_for_listed_base_product() {
        let rules = EngineRules::default();
        let mut context = WorkContext::new("WO-1", WorkType::Install);
        context.base_product = "MAXW002".into();
        let validator = CompositionValidator::new(&rules, &context);

        let without_tv = composition(
            vec![Slot::new("S1", "04", "")],
            vec![PhysicalUnit::new("M1", "04", "090403", Origin::Installed)],
        );
        assert!(matches!(
            validator.first_violation(&without_tv),
            Some(Violation::MissingMandatory { .. })
        ));

        let with_tv = composition(
            vec![Slot::new("S1", "04", ""), Slot::new("S2", "05", "092101")],
            vec![
                PhysicalUnit::new("M1", "04", "090403", Origin::Installed),
                PhysicalUnit::new("TV1", "05", "092101", Origin::Installed),
            ],
        );
        assert!(validator.violations(&with_tv).is_empty());

        context.base_product = "BASIC01".into();
        let validator = CompositionValidator::new(&rules, &context);
        assert!(validator.violations(&without_tv).is_empty());
    }

    #[test]
    fn test_pair_rule_clears_when_solo_member_is_removed() {
        let rules = rules();
        let context = WorkContext::new("WO-1", WorkType::Install);
        let validator = CompositionValidator::new(&rules, &context);

        let mut solo = composition(
            vec![Slot::new("S1", "wifi", ""), Slot::new("S2", "ap", ""), Slot::new("S3", "router", "")],
            vec![
                PhysicalUnit::new("W1", "wifi", "M1", Origin::Installed),
                PhysicalUnit::new("R1", "router", "M3", Origin::Installed),
            ],
        );
        assert_eq!(validator.violations(&solo).len(), 1);

        solo.pools.move_to_removed("W1").unwrap();
        assert!(validator.violations(&solo).is_empty());
    }

    #[test]
    fn test_unit_bound_to_two_slots_is_reported() {
        let rules = rules();
        let context = WorkContext::new("WO-1", WorkType::Install);
        let validator = CompositionValidator::new(&rules, &context);

        let mut doubled = composition(
            vec![Slot::new("S1", "router", ""), Slot::new("S2", "router", "")],
            vec![PhysicalUnit::new("R1", "router", "M3", Origin::Installed)],
        );
        doubled.pools.bind_existing("S2", "R1");
        let expected = vec![Violation::DuplicateUnit { unit_id: "R1".into() }];

        match validator.validate(&doubled, ValidationMode::FailFast) {
            Err(ReconError::ValidationFailed(list)) => assert_eq!(list, expected),
            other => panic!("unexpected result: {:?}", other),
        }
        match validator.validate(&doubled, ValidationMode::CollectAll) {
            Err(ReconError::ValidationFailed(list)) => assert_eq!(list, expected),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_fail_fast_returns_single_violation() {
        let rules = rules();
        let context = WorkContext::new("WO-1", WorkType::Install);
        let validator = CompositionValidator::new(&rules, &context);
        let stale = composition(
            vec![Slot::new("S1", "wifi", "M9")],
            vec![PhysicalUnit::new("W1", "wifi", "M1", Origin::Installed)],
        );

        match validator.validate(&stale, ValidationMode::FailFast) {
            Err(ReconError::ValidationFailed(list)) => assert_eq!(list, vec![Violation::EmptyComposition]),
            other => panic!("unexpected result: {:?}", other),
        }
        match validator.validate(&stale, ValidationMode::CollectAll) {
            Err(ReconError::ValidationFailed(list)) => {
                assert_eq!(list.len(), 2);
                assert!(matches!(list[1], Violation::StaleBinding { .. }));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
