//! Per-Security Field History
//!
//! Last-known-value cache consulted by the pricing rules when the
//! current tick is missing fields. One store exists per live
//! subscription; it is created on the first update and discarded when
//! the subscription ends.

use std::collections::HashMap;

use crate::domain::message::{FieldValue, Message};

/// Last observed value per field name for one security.
///
/// The normalization pipeline processes one security's updates
/// serially, so the store needs no interior locking; it is only safe
/// for sequential reuse.
#[derive(Debug, Default, Clone)]
pub struct FieldHistoryStore {
    values: HashMap<String, FieldValue>,
}

impl FieldHistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an incoming tick into the stored state.
    ///
    /// Only fields present in `message` are overwritten (last-write-wins
    /// per field); untouched fields persist. For duplicate names the
    /// latest occurrence in the message wins.
    pub fn live_data_received(&mut self, message: &Message) {
        for field in message {
            self.values
                .insert(field.name.clone(), field.value.clone());
        }
    }

    /// Last observed value for `name`, if any.
    #[must_use]
    pub fn last_known(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Last observed value for `name` interpreted as a decimal.
    #[must_use]
    pub fn last_known_decimal(&self, name: &str) -> Option<rust_decimal::Decimal> {
        self.last_known(name).and_then(FieldValue::as_decimal)
    }

    /// Read-only merged view of all last-known values.
    #[must_use]
    pub const fn last_known_values(&self) -> &HashMap<String, FieldValue> {
        &self.values
    }

    /// Whether no update has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
