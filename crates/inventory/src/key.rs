use serde::{Deserialize, Serialize};

/// Identity of a stock record: normalized name + unit.
///
/// "Cement  OPC 53" in "Bags" and "cement opc 53" in "bags" are the same stock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InventoryKey {
    name: String,
    unit: String,
}

impl InventoryKey {
    pub fn new(name: &str, unit: &str) -> Self {
        Self {
            name: normalize_name(name),
            unit: normalize_name(unit),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }
}

impl core::fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} [{}]", self.name, self.unit)
    }
}

/// Trim, collapse internal whitespace, lowercase.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn case_and_spacing_do_not_matter() {
        assert_eq!(
            InventoryKey::new("  Cement   OPC 53 ", "Bags"),
            InventoryKey::new("cement opc 53", "bags")
        );
    }

    #[test]
    fn unit_is_part_of_identity() {
        assert_ne!(
            InventoryKey::new("rebar 12mm", "kg"),
            InventoryKey::new("rebar 12mm", "pcs")
        );
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "[ a-zA-Z0-9]{0,24}") {
            let once = normalize_name(&raw);
            prop_assert_eq!(normalize_name(&once), once.clone());
            prop_assert!(!once.starts_with(' ') && !once.ends_with(' '));
        }
    }
}
