//! Normalization Rule Sets
//!
//! A named, ordered rule pipeline. Each invocation is a two-state
//! machine: flowing while rules keep delivering, terminally dropped the
//! moment any rule drops — later rules (and their history side effects)
//! never run.

use std::sync::Arc;

use crate::domain::message::Message;
use crate::domain::normalization::history::FieldHistoryStore;
use crate::domain::normalization::rules::{NormalizationError, NormalizationRule, Normalized};
use crate::domain::subscription::SecurityId;

/// Separator used when deriving a topic suffix from a rule-set name.
const TOPIC_SEPARATOR: &str = ".";

/// A named, ordered list of normalization rules.
#[derive(Clone)]
pub struct NormalizationRuleSet {
    name: String,
    rules: Vec<Arc<dyn NormalizationRule>>,
}

impl NormalizationRuleSet {
    /// Create a rule set with the given name and ordered rules.
    #[must_use]
    pub fn new(name: impl Into<String>, rules: Vec<Arc<dyn NormalizationRule>>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// The rule-set name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rules in the pipeline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the pipeline has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Deterministic topic suffix derived from the rule-set name.
    ///
    /// An empty name yields an empty suffix; a name already carrying
    /// the separator prefix is returned unchanged.
    #[must_use]
    pub fn topic_suffix(&self) -> String {
        if self.name.is_empty() {
            return String::new();
        }
        if self.name.starts_with(TOPIC_SEPARATOR) {
            return self.name.clone();
        }
        format!("{TOPIC_SEPARATOR}{}", self.name)
    }

    /// Run one raw tick through the pipeline.
    ///
    /// Rules execute in order; the first drop short-circuits the rest.
    ///
    /// # Errors
    ///
    /// The first rule error aborts the pass and propagates.
    pub fn normalize(
        &self,
        raw: Message,
        security: &SecurityId,
        history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        let mut current = raw;
        for rule in &self.rules {
            match rule.apply(current, security, history)? {
                Normalized::Delivered(next) => current = next,
                Normalized::Dropped => return Ok(Normalized::Dropped),
            }
        }
        Ok(Normalized::Delivered(current))
    }
}

impl PartialEq for NormalizationRuleSet {
    /// Equality by name and ordered rule identity.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.rules.len() == other.rules.len()
            && self
                .rules
                .iter()
                .zip(&other.rules)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl std::fmt::Debug for NormalizationRuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizationRuleSet")
            .field("name", &self.name)
            .field("rules", &self.rules.len())
            .finish()
    }
}
