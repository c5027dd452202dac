use serde::Deserialize;

use crate::error::{GraphQLError, GraphQLResult};

/// Runtime switches for translation and execution.
///
/// Loaded from JSON. Every key is optional and missing keys take their defaults.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub filters: FilterConfig,
    pub pagination: PaginationConfig,
    pub limits: LimitConfig,
    /// Deepest relationship nesting accepted in a single selection
    pub max_depth: usize,
    /// Collect mutation metadata and publish subscription events
    pub subscriptions: bool,
    /// Upper bound on a single executor round trip
    pub query_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filters: FilterConfig::default(),
            pagination: PaginationConfig::default(),
            limits: LimitConfig::default(),
            max_depth: 32,
            subscriptions: false,
            query_timeout_ms: None,
        }
    }
}

impl Config {
    pub fn from_json(value: &serde_json::Value) -> GraphQLResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| GraphQLError::configuration(e.to_string()))
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterConfig {
    /// `_LT`, `_LTE`, `_GT` and `_GTE` on String and ID fields
    pub string_range: bool,
    /// `_MATCHES` on String and ID fields
    pub regex: bool,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PaginationConfig {
    pub has_previous_page: HasPreviousPageRule,
}

/// How `hasPreviousPage` is derived from the decoded `after` offset.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HasPreviousPageRule {
    /// `lastOffset > 0`
    #[default]
    PositiveOffset,
    /// `lastOffset > -1`, any decodable cursor counts as a prior page
    AnyPriorOffset,
}

impl HasPreviousPageRule {
    pub fn has_previous_page(&self, last_offset: i64) -> bool {
        match self {
            Self::PositiveOffset => last_offset > 0,
            Self::AnyPriorOffset => last_offset > -1,
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LimitConfig {
    pub default: Option<i64>,
    pub max: Option<i64>,
}

impl LimitConfig {
    /// Applies the configured default and cap to a requested limit
    pub fn effective(&self, requested: Option<i64>) -> Option<i64> {
        let limit = requested.or(self.default);
        match (limit, self.max) {
            (Some(l), Some(max)) => Some(l.min(max)),
            (None, Some(max)) => Some(max),
            (l, None) => l,
        }
    }
}
