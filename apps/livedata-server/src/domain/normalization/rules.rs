//! Normalization Rules
//!
//! The closed set of per-tick transforms that make up a normalization
//! pipeline. Each rule is a stateless function of
//! `(message, security, history)` returning either the message to pass
//! on or an explicit drop; history mutation is the only permitted side
//! effect.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::message::{FieldValue, Message};
use crate::domain::normalization::history::FieldHistoryStore;
use crate::domain::subscription::SecurityId;

// =============================================================================
// Canonical Field Names
// =============================================================================

/// Canonical field names produced and consumed by the pipeline.
pub mod fields {
    /// Best bid price.
    pub const BID: &str = "BID";
    /// Best ask price.
    pub const ASK: &str = "ASK";
    /// Last trade price.
    pub const LAST: &str = "LAST";
    /// Direct mid price supplied by the provider.
    pub const MID: &str = "MID";
    /// Previous close price.
    pub const CLOSE: &str = "CLOSE";
    /// Closing bid price.
    pub const CLOSING_BID: &str = "CLOSING_BID";
    /// Closing ask price.
    pub const CLOSING_ASK: &str = "CLOSING_ASK";
    /// Derived canonical market value.
    pub const MARKET_VALUE: &str = "MARKET_VALUE";
    /// Derived canonical implied volatility.
    pub const IMPLIED_VOLATILITY: &str = "IMPLIED_VOLATILITY";
    /// Best implied volatility quote.
    pub const BEST_IMPLIED_VOLATILITY: &str = "BEST_IMPLIED_VOLATILITY";
    /// Mid implied volatility quote.
    pub const MID_IMPLIED_VOLATILITY: &str = "MID_IMPLIED_VOLATILITY";
    /// Last-trade implied volatility quote.
    pub const LAST_IMPLIED_VOLATILITY: &str = "LAST_IMPLIED_VOLATILITY";
    /// Bid-side implied volatility quote.
    pub const BID_IMPLIED_VOLATILITY: &str = "BID_IMPLIED_VOLATILITY";
    /// Ask-side implied volatility quote.
    pub const ASK_IMPLIED_VOLATILITY: &str = "ASK_IMPLIED_VOLATILITY";
    /// Annualized dividend amount.
    pub const ANNUAL_DIVIDEND: &str = "ANNUAL_DIVIDEND";
    /// Derived dividend yield.
    pub const DIVIDEND_YIELD: &str = "DIVIDEND_YIELD";
    /// Next dividend payment date.
    pub const NEXT_DIVIDEND_DATE: &str = "NEXT_DIVIDEND_DATE";
}

use fields::{
    ANNUAL_DIVIDEND, ASK, ASK_IMPLIED_VOLATILITY, BEST_IMPLIED_VOLATILITY, BID,
    BID_IMPLIED_VOLATILITY, CLOSE, CLOSING_ASK, CLOSING_BID, DIVIDEND_YIELD, IMPLIED_VOLATILITY,
    LAST, LAST_IMPLIED_VOLATILITY, MARKET_VALUE, MID, MID_IMPLIED_VOLATILITY, NEXT_DIVIDEND_DATE,
};

// =============================================================================
// Rule Contract
// =============================================================================

/// Outcome of applying a rule (or a whole rule set) to one tick.
///
/// A dropped tick is type-distinguishable from a delivered empty
/// message; an overloaded null is never used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// The tick continues through the pipeline / is delivered.
    Delivered(Message),
    /// The tick is discarded; later rules must not run.
    Dropped,
}

impl Normalized {
    /// Unwrap the delivered message, if any.
    #[must_use]
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Delivered(msg) => Some(msg),
            Self::Dropped => None,
        }
    }
}

/// Error raised while applying a normalization rule.
#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    /// Resolving a per-security rule from the provider failed.
    #[error("security rule lookup failed for {security}: {detail}")]
    RuleLookup {
        /// Security whose rule lookup failed.
        security: String,
        /// Provider error detail.
        detail: String,
    },
    /// A rule itself failed.
    #[error("rule failed for {security}: {detail}")]
    RuleFailed {
        /// Security being normalized.
        security: String,
        /// Failure detail.
        detail: String,
    },
}

/// One stateless per-tick transform.
///
/// Rules run on whatever thread delivers the tick and must not block.
pub trait NormalizationRule: Send + Sync {
    /// Apply the transform to one tick.
    ///
    /// # Errors
    ///
    /// Rule failures propagate to the caller unless isolated by
    /// [`SecurityRuleApplier`].
    fn apply(
        &self,
        message: Message,
        security: &SecurityId,
        history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError>;
}

/// Resolves an optional per-security custom rule.
///
/// Consulted by [`SecurityRuleApplier`]; lookups may fail.
pub trait SecurityRuleProvider: Send + Sync {
    /// Rule for `security`, or `None` when no customization exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup itself fails.
    fn rule_for(
        &self,
        security: &SecurityId,
    ) -> Result<Option<Arc<dyn NormalizationRule>>, NormalizationError>;
}

// =============================================================================
// Field Selection Rules
// =============================================================================

/// Keeps only fields whose name is in a configured accept-set.
///
/// A message left with zero fields is dropped, not delivered empty.
pub struct FieldFilter {
    accepted: HashSet<String>,
}

impl FieldFilter {
    /// Create a filter from an accept-set of field names.
    #[must_use]
    pub fn new<I, S>(accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accepted: accepted.into_iter().map(Into::into).collect(),
        }
    }
}

impl NormalizationRule for FieldFilter {
    fn apply(
        &self,
        message: Message,
        _security: &SecurityId,
        _history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        let mut filtered = Message::new();
        for field in &message {
            if self.accepted.contains(&field.name) {
                filtered.add(field.name.clone(), field.value.clone());
            }
        }
        if filtered.is_empty() {
            return Ok(Normalized::Dropped);
        }
        Ok(Normalized::Delivered(filtered))
    }
}

/// Drops the whole message unless every required name occurs at least
/// once. An empty required-set is the identity.
pub struct RequiredFieldFilter {
    required: HashSet<String>,
}

impl RequiredFieldFilter {
    /// Create a filter from a set of required field names.
    #[must_use]
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }
}

impl NormalizationRule for RequiredFieldFilter {
    fn apply(
        &self,
        message: Message,
        _security: &SecurityId,
        _history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        if self.required.iter().all(|name| message.contains(name)) {
            Ok(Normalized::Delivered(message))
        } else {
            Ok(Normalized::Dropped)
        }
    }
}

/// Re-homes every field named `from` under the name `to`.
///
/// The renamed fields are appended at the end of the message;
/// pre-existing fields already named `to` are left untouched, so the
/// result may legitimately carry duplicate names.
pub struct FieldNameChange {
    from: String,
    to: String,
}

impl FieldNameChange {
    /// Create a rename from `from` to `to`.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl NormalizationRule for FieldNameChange {
    fn apply(
        &self,
        mut message: Message,
        _security: &SecurityId,
        _history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        let values: Vec<FieldValue> = message
            .all_by_name(&self.from)
            .into_iter()
            .cloned()
            .collect();
        if values.is_empty() {
            return Ok(Normalized::Delivered(message));
        }
        message.remove_by_name(&self.from);
        for value in values {
            message.add(self.to.clone(), value);
        }
        Ok(Normalized::Delivered(message))
    }
}

/// Scales a named numeric field by a fixed factor.
///
/// Original occurrences are removed and the scaled values appended;
/// non-numeric occurrences and all other fields are untouched.
pub struct UnitChange {
    field: String,
    multiplier: Decimal,
}

impl UnitChange {
    /// Create a unit change for `field` with the given `multiplier`.
    #[must_use]
    pub fn new(field: impl Into<String>, multiplier: Decimal) -> Self {
        Self {
            field: field.into(),
            multiplier,
        }
    }
}

impl NormalizationRule for UnitChange {
    fn apply(
        &self,
        mut message: Message,
        _security: &SecurityId,
        _history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        let values: Vec<FieldValue> = message
            .all_by_name(&self.field)
            .into_iter()
            .cloned()
            .collect();
        if values.is_empty() {
            return Ok(Normalized::Delivered(message));
        }
        message.remove_by_name(&self.field);
        for value in values {
            match value.as_decimal() {
                Some(d) => message.add(self.field.clone(), d * self.multiplier),
                None => message.add(self.field.clone(), value),
            }
        }
        Ok(Normalized::Delivered(message))
    }
}

// =============================================================================
// History Update Rule
// =============================================================================

/// Side-effect-only passthrough: records the current message in the
/// history store and returns it unchanged.
#[derive(Debug, Default)]
pub struct FieldHistoryUpdater;

impl NormalizationRule for FieldHistoryUpdater {
    fn apply(
        &self,
        message: Message,
        _security: &SecurityId,
        history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        history.live_data_received(&message);
        Ok(Normalized::Delivered(message))
    }
}

// =============================================================================
// Derivation Rules
// =============================================================================

/// Current-message value, falling back to the last known value.
fn current_or_history(
    message: &Message,
    history: &FieldHistoryStore,
    name: &str,
) -> Option<Decimal> {
    message
        .first_decimal(name)
        .or_else(|| history.last_known_decimal(name))
}

/// Derives a canonical `MARKET_VALUE` field and appends it.
///
/// Source precedence, first available wins:
/// 1. a direct `MID` field;
/// 2. a bid/ask pair (both current, else both historical, never mixed):
///    the pair mid, unless the spread exceeds the liquidity threshold
///    and a `LAST` exists, in which case `LAST` clamped into
///    `[bid, ask]`;
/// 3. `LAST` (current or historical);
/// 4. a historical `MARKET_VALUE`;
/// 5. `CLOSE`, else the average of `CLOSING_BID`/`CLOSING_ASK`;
/// 6. nothing is appended.
pub struct MarketValueCalculator {
    liquidity_threshold: Decimal,
}

impl MarketValueCalculator {
    /// Default spread threshold beyond which `LAST` is trusted over the
    /// bid/ask mid.
    pub const DEFAULT_LIQUIDITY_THRESHOLD: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

    /// Create a calculator with the default liquidity threshold.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            liquidity_threshold: Self::DEFAULT_LIQUIDITY_THRESHOLD,
        }
    }

    /// Create a calculator with a custom liquidity threshold.
    #[must_use]
    pub const fn with_threshold(liquidity_threshold: Decimal) -> Self {
        Self {
            liquidity_threshold,
        }
    }

    /// The bid/ask pair to price from: both legs from the current
    /// message when present, otherwise both legs from history. A
    /// current bid never combines with a historical ask.
    fn bid_ask_pair(message: &Message, history: &FieldHistoryStore) -> Option<(Decimal, Decimal)> {
        if let (Some(bid), Some(ask)) = (message.first_decimal(BID), message.first_decimal(ASK)) {
            return Some((bid, ask));
        }
        if let (Some(bid), Some(ask)) = (
            history.last_known_decimal(BID),
            history.last_known_decimal(ASK),
        ) {
            return Some((bid, ask));
        }
        None
    }

    fn derive(&self, message: &Message, history: &FieldHistoryStore) -> Option<Decimal> {
        if let Some(mid) = current_or_history(message, history, MID) {
            return Some(mid);
        }

        if let Some((bid, ask)) = Self::bid_ask_pair(message, history) {
            let mid = (bid + ask) / Decimal::TWO;
            if ask - bid > self.liquidity_threshold {
                if let Some(last) = current_or_history(message, history, LAST) {
                    return Some(last.clamp(bid, ask));
                }
            }
            return Some(mid);
        }

        if let Some(last) = current_or_history(message, history, LAST) {
            return Some(last);
        }

        if let Some(previous) = history.last_known_decimal(MARKET_VALUE) {
            return Some(previous);
        }

        if let Some(close) = current_or_history(message, history, CLOSE) {
            return Some(close);
        }
        if let (Some(cb), Some(ca)) = (
            current_or_history(message, history, CLOSING_BID),
            current_or_history(message, history, CLOSING_ASK),
        ) {
            return Some((cb + ca) / Decimal::TWO);
        }

        None
    }
}

impl Default for MarketValueCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationRule for MarketValueCalculator {
    fn apply(
        &self,
        mut message: Message,
        _security: &SecurityId,
        history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        if let Some(value) = self.derive(&message, history) {
            message.add(MARKET_VALUE, value);
        }
        Ok(Normalized::Delivered(message))
    }
}

/// Derives a canonical `IMPLIED_VOLATILITY` field and appends it.
///
/// Precedence: best, mid, then last-trade implied volatility from the
/// current message; then the average of the bid/ask implied
/// volatilities (both present); then the last known canonical value.
#[derive(Debug, Default)]
pub struct ImpliedVolatilityCalculator;

impl ImpliedVolatilityCalculator {
    fn derive(message: &Message, history: &FieldHistoryStore) -> Option<Decimal> {
        message
            .first_decimal(BEST_IMPLIED_VOLATILITY)
            .or_else(|| message.first_decimal(MID_IMPLIED_VOLATILITY))
            .or_else(|| message.first_decimal(LAST_IMPLIED_VOLATILITY))
            .or_else(|| {
                let bid = message.first_decimal(BID_IMPLIED_VOLATILITY)?;
                let ask = message.first_decimal(ASK_IMPLIED_VOLATILITY)?;
                Some((bid + ask) / Decimal::TWO)
            })
            .or_else(|| history.last_known_decimal(IMPLIED_VOLATILITY))
    }
}

impl NormalizationRule for ImpliedVolatilityCalculator {
    fn apply(
        &self,
        mut message: Message,
        _security: &SecurityId,
        history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        if let Some(value) = Self::derive(&message, history) {
            message.add(IMPLIED_VOLATILITY, value);
        }
        Ok(Normalized::Delivered(message))
    }
}

/// Derives a `DIVIDEND_YIELD` field.
///
/// When no dividend or market-value signal exists anywhere (live or
/// historical), the message passes through unchanged. Otherwise the
/// yield is `ANNUAL_DIVIDEND / MARKET_VALUE` when a non-zero market
/// value resolves, else a historical `DIVIDEND_YIELD` is carried
/// forward, else nothing is added.
#[derive(Debug, Default)]
pub struct DividendYieldCalculator;

impl NormalizationRule for DividendYieldCalculator {
    fn apply(
        &self,
        mut message: Message,
        _security: &SecurityId,
        history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        let has_signal = [ANNUAL_DIVIDEND, MARKET_VALUE, DIVIDEND_YIELD]
            .iter()
            .any(|name| message.contains(name) || history.last_known(name).is_some());
        if !has_signal {
            return Ok(Normalized::Delivered(message));
        }

        let dividend = current_or_history(&message, history, ANNUAL_DIVIDEND);
        let market_value = current_or_history(&message, history, MARKET_VALUE);
        match (dividend, market_value) {
            (Some(dividend), Some(market_value)) if !market_value.is_zero() => {
                message.add(DIVIDEND_YIELD, dividend / market_value);
            }
            _ => {
                if let Some(previous) = history.last_known_decimal(DIVIDEND_YIELD) {
                    message.add(DIVIDEND_YIELD, previous);
                }
            }
        }
        Ok(Normalized::Delivered(message))
    }
}

/// Carries `NEXT_DIVIDEND_DATE` forward from history when the current
/// tick lacks it.
#[derive(Debug, Default)]
pub struct NextDividendDateCalculator;

impl NormalizationRule for NextDividendDateCalculator {
    fn apply(
        &self,
        mut message: Message,
        _security: &SecurityId,
        history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        if !message.contains(NEXT_DIVIDEND_DATE) {
            if let Some(previous) = history.last_known(NEXT_DIVIDEND_DATE) {
                message.add(NEXT_DIVIDEND_DATE, previous.clone());
            }
        }
        Ok(Normalized::Delivered(message))
    }
}

// =============================================================================
// Per-Security Customization
// =============================================================================

/// Applies an optional per-security rule resolved from a provider.
///
/// This is the pipeline's fault-isolation boundary: a failing lookup or
/// a failing resolved rule drops the tick for that security instead of
/// disrupting the shared pipeline.
pub struct SecurityRuleApplier {
    provider: Arc<dyn SecurityRuleProvider>,
}

impl SecurityRuleApplier {
    /// Create an applier backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn SecurityRuleProvider>) -> Self {
        Self { provider }
    }
}

impl NormalizationRule for SecurityRuleApplier {
    fn apply(
        &self,
        message: Message,
        security: &SecurityId,
        history: &mut FieldHistoryStore,
    ) -> Result<Normalized, NormalizationError> {
        let rule = match self.provider.rule_for(security) {
            Ok(rule) => rule,
            Err(err) => {
                tracing::warn!(security = %security, error = %err, "Security rule lookup failed, dropping tick");
                return Ok(Normalized::Dropped);
            }
        };
        match rule {
            None => Ok(Normalized::Delivered(message)),
            Some(rule) => match rule.apply(message, security, history) {
                Ok(outcome) => Ok(outcome),
                Err(err) => {
                    tracing::warn!(security = %security, error = %err, "Security rule failed, dropping tick");
                    Ok(Normalized::Dropped)
                }
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
