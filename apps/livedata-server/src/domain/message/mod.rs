//! Tick Message Container
//!
//! The wire-agnostic field container that every normalization rule
//! operates on: an ordered sequence of `(name, value)` pairs in which
//! duplicate names are permitted and order is preserved. Equality is
//! by field sequence, so two messages with the same fields in a
//! different order are not equal.

use chrono::NaiveDate;
use rust_decimal::Decimal;

// =============================================================================
// Field Values
// =============================================================================

/// A typed value carried by one message field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Text value.
    String(String),
    /// Decimal value (prices, volatilities, yields).
    Decimal(Decimal),
    /// Integer value (sizes, counts).
    Integer(i64),
    /// Calendar date value (dividend dates).
    Date(NaiveDate),
}

impl FieldValue {
    /// Interpret the value as a decimal, coercing integers.
    ///
    /// Returns `None` for strings and dates.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(d) => Some(*d),
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::String(_) | Self::Date(_) => None,
        }
    }

    /// Interpret the value as a date.
    #[must_use]
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

// =============================================================================
// Fields and Messages
// =============================================================================

/// One named field within a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name. Names are not unique within a message.
    pub name: String,
    /// Field value.
    pub value: FieldValue,
}

/// One market-data update for a security.
///
/// An ordered, duplicate-name-tolerant field sequence. Rules either
/// return the same message, build a new one, or signal an explicit
/// drop; an empty message is still a present message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    fields: Vec<Field>,
}

impl Message {
    /// Create an empty message.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Append a field. Existing fields with the same name are kept.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Builder-style [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.add(name, value);
        self
    }

    /// First value stored under `name`, in field order.
    #[must_use]
    pub fn first_by_name(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    /// All values stored under `name`, in field order.
    #[must_use]
    pub fn all_by_name(&self, name: &str) -> Vec<&FieldValue> {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .map(|f| &f.value)
            .collect()
    }

    /// First value under `name` interpreted as a decimal.
    #[must_use]
    pub fn first_decimal(&self, name: &str) -> Option<Decimal> {
        self.first_by_name(name).and_then(FieldValue::as_decimal)
    }

    /// Whether at least one field is stored under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Remove every field stored under `name`.
    pub fn remove_by_name(&mut self, name: &str) {
        self.fields.retain(|f| f.name != name);
    }

    /// Number of fields (duplicates counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the message has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over fields in order.
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn add_preserves_order_and_duplicates() {
        let msg = Message::new()
            .with("BID", dec("50.80"))
            .with("BID", dec("50.81"))
            .with("ASK", dec("50.90"));

        assert_eq!(msg.len(), 3);
        let bids = msg.all_by_name("BID");
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].as_decimal(), Some(dec("50.80")));
        assert_eq!(bids[1].as_decimal(), Some(dec("50.81")));
    }

    #[test]
    fn first_by_name_returns_earliest_occurrence() {
        let msg = Message::new()
            .with("LAST", dec("10"))
            .with("LAST", dec("11"));

        assert_eq!(msg.first_decimal("LAST"), Some(dec("10")));
    }

    #[test]
    fn remove_by_name_removes_all_occurrences() {
        let mut msg = Message::new()
            .with("BID", dec("1"))
            .with("ASK", dec("2"))
            .with("BID", dec("3"));

        msg.remove_by_name("BID");

        assert_eq!(msg.len(), 1);
        assert!(!msg.contains("BID"));
        assert!(msg.contains("ASK"));
    }

    #[test]
    fn equality_is_by_field_sequence() {
        let a = Message::new().with("A", 1i64).with("B", 2i64);
        let b = Message::new().with("A", 1i64).with("B", 2i64);
        let reordered = Message::new().with("B", 2i64).with("A", 1i64);

        assert_eq!(a, b);
        assert_ne!(a, reordered);
    }

    #[test]
    fn empty_message_is_distinct_from_absent() {
        let msg = Message::new();
        assert!(msg.is_empty());
        assert_eq!(msg.first_by_name("BID"), None);
    }

    #[test]
    fn integer_coerces_to_decimal() {
        let msg = Message::new().with("SIZE", 500i64);
        assert_eq!(msg.first_decimal("SIZE"), Some(dec("500")));
    }

    #[test]
    fn string_and_date_do_not_coerce_to_decimal() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let msg = Message::new().with("NAME", "ACME").with("DATE", date);

        assert_eq!(msg.first_decimal("NAME"), None);
        assert_eq!(msg.first_decimal("DATE"), None);
        assert_eq!(
            msg.first_by_name("DATE").and_then(FieldValue::as_date),
            Some(date)
        );
    }
}
