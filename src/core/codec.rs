//! 固定寬度打包字串解碼
//!
//! 遠端重組回應把每個項目的欄位串成一條固定寬度的長字串，每個欄位一條。
//! 這裡以 `{name, width}` 描述欄位，統一切割。

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedField {
    /// 回應中的欄位鍵
    pub name: &'static str,
    pub width: usize,
}

impl PackedField {
    pub const fn new(name: &'static str, width: usize) -> Self {
        Self { name, width }
    }
}

/// 一個項目解碼後的欄位值（已去除空白）
pub type PackedRecord = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSchema {
    fields: Vec<PackedField>,
    /// 由此欄位長度決定項目數
    count_field: &'static str,
}

impl PackedSchema {
    pub fn new(fields: Vec<PackedField>, count_field: &'static str) -> Self {
        Self { fields, count_field }
    }

    pub fn fields(&self) -> &[PackedField] {
        &self.fields
    }

    pub fn item_count(&self, columns: &HashMap<String, String>) -> usize {
        let Some(field) = self.fields.iter().find(|f| f.name == self.count_field) else {
            return 0;
        };
        if field.width == 0 {
            return 0;
        }
        columns
            .get(field.name)
            .map_or(0, |value| value.chars().count() / field.width)
    }

    /// 依 schema 切出每個項目；欄位不足時為空字串
    pub fn decode(&self, columns: &HashMap<String, String>) -> Vec<PackedRecord> {
        let count = self.item_count(columns);
        let split: Vec<(&'static str, Vec<char>, usize)> = self
            .fields
            .iter()
            .map(|field| {
                let chars = columns
                    .get(field.name)
                    .map(|value| value.chars().collect())
                    .unwrap_or_default();
                (field.name, chars, field.width)
            })
            .collect();

        (0..count)
            .map(|index| {
                split
                    .iter()
                    .map(|(name, chars, width)| (*name, cell(chars, index, *width)))
                    .collect()
            })
            .collect()
    }
}

fn cell(chars: &[char], index: usize, width: usize) -> String {
    let start = (index * width).min(chars.len());
    let end = (start + width).min(chars.len());
    chars[start..end].iter().collect::<String>().trim().to_string()
}

/// 重組回應的欄位配置
pub fn recomposition_schema() -> PackedSchema {
    PackedSchema::new(
        vec![
            PackedField::new("ITEM_MID_CDS", 10),
            PackedField::new("EQT_CLS", 10),
            PackedField::new("LENTS", 2),
            PackedField::new("EQT_USE_STATS", 1),
            PackedField::new("ITLLMT_PRDS", 2),
            PackedField::new("EQT_SALE_AMTS", 10),
            PackedField::new("PROD_CDS", 10),
            PackedField::new("SVC_CDS", 10),
        ],
        "ITEM_MID_CDS",
    )
}

/// 拆解「類型 1 碼 + 序號最多 2 碼」的無分隔字串
///
/// 這種編碼本身有歧義（"231" 可讀成 2+31 或 23+1），結果只能當暫定資訊。
pub fn split_type_sequence(packed: &str) -> Vec<(String, String)> {
    let mut groups = Vec::new();
    let mut chars = packed.chars().peekable();
    while let Some(kind) = chars.next() {
        let mut sequence = String::new();
        while sequence.len() < 2 {
            match chars.peek() {
                Some(c) if c.is_ascii_digit() => {
                    sequence.push(*c);
                    chars.next();
                }
                _ => break,
            }
        }
        groups.push((kind.to_string(), sequence));
    }
    groups
}
