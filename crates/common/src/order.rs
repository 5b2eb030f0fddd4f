//! Order snapshot types: line items, the merge-updated shipping address,
//! and the order context handed to saga steps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::OrderId;

/// A single order line: a SKU and how many units of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub qty: u32,
}

impl LineItem {
    pub fn new(sku: impl Into<String>, qty: u32) -> Self {
        Self {
            sku: sku.into(),
            qty,
        }
    }
}

/// Shipping address as a string-to-string mapping.
///
/// Address patches merge key by key: applying `{city: "Boston"}` then
/// `{street: "456 Elm"}` yields both keys, and re-applying a key
/// overwrites its previous value. Deserialization only accepts an object
/// whose values are all strings; anything else is a serde error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(BTreeMap<String, String>);

impl Address {
    /// Creates an empty address.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites one field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merges `patch` into this address. Every key of the patch is
    /// inserted; existing keys are overwritten (last write wins per key).
    pub fn merge(&mut self, patch: Address) {
        self.0.extend(patch.0);
    }

    /// Returns the value for a field, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, String)> for Address {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The order snapshot a saga carries through its steps.
///
/// Owned exclusively by the running saga instance; the address field is
/// refreshed from saga state before each step that consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderContext {
    pub order_id: OrderId,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub address: Address,
}

impl OrderContext {
    /// Creates a context with an empty address.
    pub fn new(order_id: OrderId, items: Vec<LineItem>) -> Self {
        Self {
            order_id,
            items,
            address: Address::new(),
        }
    }

    /// Returns the context with its address replaced by `address`.
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    /// Total units across all line items. The stub charge amount is
    /// derived from this.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.qty)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(pairs: &[(&str, &str)]) -> Address {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn merge_applies_every_key() {
        let mut address = patch(&[("city", "Amherst")]);
        address.merge(patch(&[("city", "Boston"), ("street", "456 Elm Ave")]));

        assert_eq!(address.get("city"), Some("Boston"));
        assert_eq!(address.get("street"), Some("456 Elm Ave"));
        assert_eq!(address.len(), 2);
    }

    #[test]
    fn merge_of_disjoint_patches_is_order_independent() {
        let city = patch(&[("city", "Boston")]);
        let street = patch(&[("street", "456 Elm")]);

        let mut forward = Address::new();
        forward.merge(city.clone());
        forward.merge(street.clone());

        let mut backward = Address::new();
        backward.merge(street);
        backward.merge(city);

        assert_eq!(forward, backward);
    }

    #[test]
    fn merge_is_last_write_wins_per_key() {
        let mut address = patch(&[("city", "Amherst"), ("zip", "01002")]);
        address.merge(patch(&[("city", "Boston")]));

        assert_eq!(address.get("city"), Some("Boston"));
        assert_eq!(address.get("zip"), Some("01002"));
    }

    #[test]
    fn address_rejects_non_string_values() {
        let result: Result<Address, _> = serde_json::from_value(serde_json::json!({"qty": 3}));
        assert!(result.is_err());

        let result: Result<Address, _> = serde_json::from_value(serde_json::json!("not a map"));
        assert!(result.is_err());
    }

    #[test]
    fn address_deserializes_plain_object() {
        let address: Address =
            serde_json::from_value(serde_json::json!({"city": "Amherst"})).unwrap();
        assert_eq!(address.get("city"), Some("Amherst"));
    }

    #[test]
    fn with_address_replaces_not_merges() {
        let context = OrderContext::new(OrderId::new("42"), vec![LineItem::new("ABC", 1)])
            .with_address(patch(&[("city", "Amherst")]));
        let context = context.with_address(patch(&[("street", "456 Elm")]));

        assert_eq!(context.address.get("city"), None);
        assert_eq!(context.address.get("street"), Some("456 Elm"));
    }

    #[test]
    fn total_quantity_sums_line_items() {
        let context = OrderContext::new(
            OrderId::new("42"),
            vec![LineItem::new("ABC", 1), LineItem::new("DEF", 1)],
        );
        assert_eq!(context.total_quantity(), 2);

        let empty = OrderContext::new(OrderId::new("43"), vec![]);
        assert_eq!(empty.total_quantity(), 0);
    }
}
