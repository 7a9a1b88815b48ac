//! 租賃類型資格標籤解析
//!
//! 標籤格式為 `|{型號 6 碼}{資格碼 1 碼}|...`，例如 `0904031` 代表型號 `090403`
//! 允許參考碼 `1` 的租賃類型。

use crate::domain::model::{InstallmentOffer, LendingType, PhysicalUnit};
use std::collections::BTreeSet;

const FIELD_DELIMITER: char = '|';
const MODEL_WIDTH: usize = 6;

pub const NO_OPTIONS_MESSAGE: &str = "No lending type is available for this equipment.";

/// 解析結果；空集合是合法結果，呼叫端要顯示「無可選項目」
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    codes: Vec<String>,
}

impl Eligibility {
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    pub fn into_codes(self) -> Vec<String> {
        self.codes
    }
}

pub struct EligibilityParser<'a> {
    master: &'a [LendingType],
    offers: &'a [InstallmentOffer],
    installment_code: &'a str,
}

impl<'a> EligibilityParser<'a> {
    pub fn new(
        master: &'a [LendingType],
        offers: &'a [InstallmentOffer],
        installment_code: &'a str,
    ) -> Self {
        Self {
            master,
            offers,
            installment_code,
        }
    }

    pub fn allowed_for(&self, unit: &PhysicalUnit) -> Eligibility {
        let allowed = allowed_reference_codes(&unit.eligibility_tag, &unit.model);
        if allowed.is_empty() {
            tracing::debug!("No eligibility tokens for unit {} (model {})", unit.id, unit.model);
            return Eligibility::default();
        }

        let mut codes: Vec<String> = self
            .master
            .iter()
            .filter(|lt| !lt.reference_code.is_empty() && allowed.contains(lt.reference_code.as_str()))
            .map(|lt| lt.code.clone())
            .collect();

        if codes.iter().any(|c| c == self.installment_code) && !self.has_installment_offer(unit) {
            tracing::debug!(
                "Dropping installment lending type for unit {}: no compatible period offer",
                unit.id
            );
            codes.retain(|c| c != self.installment_code);
        }

        Eligibility { codes }
    }

    fn has_installment_offer(&self, unit: &PhysicalUnit) -> bool {
        self.offers.iter().any(|offer| {
            offer.period_eligible && offer.usage_state == unit.usage_state && offer.model == unit.model
        })
    }
}

/// 取出與型號相符的資格碼；空標籤不做任何預設補值
pub fn allowed_reference_codes(tag: &str, model: &str) -> BTreeSet<String> {
    let mut allowed = BTreeSet::new();
    if model.is_empty() {
        return allowed;
    }

    for token in tag.split(FIELD_DELIMITER).map(str::trim).filter(|t| !t.is_empty()) {
        let mut chars = token.chars();
        let model_part: String = chars.by_ref().take(MODEL_WIDTH).collect();
        let Some(code) = chars.next() else {
            continue;
        };
        if model_part.chars().count() == MODEL_WIDTH && model_part == model {
            allowed.insert(code.to_string());
        }
    }

    allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Origin;

    fn master() -> Vec<LendingType> {
        vec![
            LendingType { code: "10".into(), name: "Rental".into(), reference_code: "1".into() },
            LendingType { code: "31".into(), name: "Installment".into(), reference_code: "2".into() },
            LendingType { code: "20".into(), name: "Free".into(), reference_code: "2".into() },
            LendingType { code: "40".into(), name: "Customer owned".into(), reference_code: "1".into() },
            LendingType { code: "50".into(), name: "Sale".into(), reference_code: "".into() },
        ]
    }

    fn unit(tag: &str) -> PhysicalUnit {
        let mut unit = PhysicalUnit::new("EQ1", "04", "090403", Origin::Stock).with_lending("10", tag);
        unit.usage_state = "1".into();
        unit
    }

    #[test]
    fn test_single_token_selects_matching_reference_code() {
        let master = master();
        let parser = EligibilityParser::new(&master, &[], "31");
        let result = parser.allowed_for(&unit("|0904031|"));
        assert_eq!(result.codes(), &["10".to_string(), "40".to_string()]);
    }

    #[test]
    fn test_empty_tag_has_no_fallback() {
        let master = master();
        let parser = EligibilityParser::new(&master, &[], "31");
        assert!(parser.allowed_for(&unit("")).is_empty());
        assert!(parser.allowed_for(&unit(" | | ")).is_empty());
    }

    #[test]
    fn test_tokens_for_other_models_and_short_tokens_are_ignored() {
        let master = master();
        let parser = EligibilityParser::new(&master, &[], "31");
        assert!(parser.allowed_for(&unit("|0999991|090403|")).is_empty());
    }

    #[test]
    fn test_installment_requires_compatible_offer() {
        let master = master();
        let no_offer = EligibilityParser::new(&master, &[], "31");
        assert_eq!(no_offer.allowed_for(&unit("0904032")).codes(), &["20".to_string()]);

        let offers = vec![
            InstallmentOffer { usage_state: "2".into(), model: "090403".into(), period_eligible: true },
            InstallmentOffer { usage_state: "1".into(), model: "090403".into(), period_eligible: true },
        ];
        let with_offer = EligibilityParser::new(&master, &offers, "31");
        assert_eq!(
            with_offer.allowed_for(&unit("0904032")).codes(),
            &["31".to_string(), "20".to_string()]
        );
    }

    #[test]
    fn test_ineligible_offer_does_not_count() {
        let master = master();
        let offers = vec![InstallmentOffer {
            usage_state: "1".into(),
            model: "090403".into(),
            period_eligible: false,
        }];
        let parser = EligibilityParser::new(&master, &offers, "31");
        assert!(!parser.allowed_for(&unit("0904032")).contains("31"));
    }
}
