//! Tick Normalization Pipeline
//!
//! Transforms provider-specific raw fields into the canonical
//! per-security schema. A pipeline is an ordered list of rules that
//! either deliver a (possibly rebuilt) message or drop the tick; the
//! per-security [`FieldHistoryStore`] supplies last-known values when
//! the current tick is missing fields.

mod history;
mod rules;
mod ruleset;

pub use history::FieldHistoryStore;
pub use rules::{
    DividendYieldCalculator, FieldFilter, FieldHistoryUpdater, FieldNameChange,
    ImpliedVolatilityCalculator, MarketValueCalculator, NextDividendDateCalculator,
    NormalizationError, NormalizationRule, Normalized, RequiredFieldFilter, SecurityRuleApplier,
    SecurityRuleProvider, UnitChange, fields,
};
pub use ruleset::NormalizationRuleSet;
