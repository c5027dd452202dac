//! Per-subscriber filtering of published events.

use std::cmp::Ordering;
use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use crate::constants::logical;
use crate::error::{GraphQLError, GraphQLResult};
use crate::events::{EventType, Properties, SubscriptionsEvent};

/// Deepest `AND`/`OR`/`NOT` nesting accepted in a subscription where
const MAX_LOGICAL_DEPTH: usize = 32;

const OPERATORS: [&str; 12] = [
    "_NOT_IN",
    "_NOT",
    "_IN",
    "_UNDEFINED",
    "_CONTAINS",
    "_STARTS_WITH",
    "_ENDS_WITH",
    "_LTE",
    "_LT",
    "_GTE",
    "_GT",
    "",
];

/// What one subscription listens to
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriptionFilter {
    pub event_type: Option<EventType>,
    /// Typename of node events, or of either side of relationship events
    pub typename: Option<String>,
    pub relationship_name: Option<String>,
    /// Node events match against the node's properties. Relationship events take
    /// `{ from, to, relationship }`.
    #[serde(rename = "where")]
    pub where_: Option<Value>,
    /// Updates pass when at least one of these properties changed
    pub props_updated: Option<Vec<String>>,
}

impl SubscriptionFilter {
    pub fn from_json(value: &Value) -> GraphQLResult<Self> {
        let filter: Self = serde_json::from_value(value.clone())
            .map_err(|e| GraphQLError::validation(e.to_string()))?;
        if let Some(where_) = &filter.where_ {
            validate_where(where_, 0)?;
        }
        Ok(filter)
    }
}

/// Applies a `SubscriptionFilter` to a stream of events.
///
/// Deleted nodes carry no properties of their own worth matching on, so the filter keeps
/// the last snapshot of every node it saw created or updated and substitutes it. Deletes
/// of nodes it never saw are dropped.
#[derive(Debug, Default)]
pub struct EventFilter {
    filter: SubscriptionFilter,
    sub_cache: Mutex<HashMap<String, Properties>>,
}

impl EventFilter {
    pub fn new(filter: SubscriptionFilter) -> Self {
        Self {
            filter,
            sub_cache: Mutex::new(HashMap::new()),
        }
    }

    /// The event to deliver, if any
    pub fn apply(&self, event: SubscriptionsEvent) -> Option<SubscriptionsEvent> {
        let event = match event {
            SubscriptionsEvent::Create(created) => {
                if self.typename_matches(&created.typename) {
                    self.sub_cache
                        .lock()
                        .insert(created.id.to_string(), created.properties.new.clone());
                }
                SubscriptionsEvent::Create(created)
            }
            SubscriptionsEvent::Update(updated) => {
                if self.typename_matches(&updated.typename) {
                    self.sub_cache
                        .lock()
                        .insert(updated.id.to_string(), updated.properties.new.clone());
                }
                SubscriptionsEvent::Update(updated)
            }
            SubscriptionsEvent::Delete(mut deleted) => {
                let cached = self.sub_cache.lock().remove(&deleted.id.to_string());
                match cached {
                    Some(snapshot) => {
                        deleted.properties.old = snapshot;
                        SubscriptionsEvent::Delete(deleted)
                    }
                    None => return None,
                }
            }
            relationship => relationship,
        };
        self.matches(&event).then_some(event)
    }

    fn typename_matches(&self, typename: &str) -> bool {
        self.filter
            .typename
            .as_deref()
            .map_or(true, |expected| expected == typename)
    }

    fn matches(&self, event: &SubscriptionsEvent) -> bool {
        if let Some(expected) = self.filter.event_type {
            if expected != event.event_type() {
                return false;
            }
        }
        let where_ = self.filter.where_.as_ref();
        match event {
            SubscriptionsEvent::Create(created) => {
                self.typename_matches(&created.typename)
                    && where_.map_or(true, |w| matches_where(w, &created.properties.new))
            }
            SubscriptionsEvent::Update(updated) => {
                let props_updated = match &self.filter.props_updated {
                    Some(names) => names.iter().any(|name| {
                        updated.properties.old.get(name) != updated.properties.new.get(name)
                    }),
                    None => true,
                };
                self.typename_matches(&updated.typename)
                    && props_updated
                    && where_.map_or(true, |w| matches_where(w, &updated.properties.new))
            }
            SubscriptionsEvent::Delete(deleted) => {
                self.typename_matches(&deleted.typename)
                    && where_.map_or(true, |w| matches_where(w, &deleted.properties.old))
            }
            SubscriptionsEvent::CreateRelationship(rel)
            | SubscriptionsEvent::DeleteRelationship(rel) => {
                let typename = self.filter.typename.as_deref().map_or(true, |expected| {
                    expected == rel.from_typename || expected == rel.to_typename
                });
                let name = self
                    .filter
                    .relationship_name
                    .as_deref()
                    .map_or(true, |expected| expected == rel.relationship_name);
                let sides = where_.map_or(true, |w| {
                    [
                        ("from", &rel.properties.from),
                        ("to", &rel.properties.to),
                        ("relationship", &rel.properties.relationship),
                    ]
                    .into_iter()
                    .all(|(key, properties)| {
                        w.get(key).map_or(true, |side| matches_where(side, properties))
                    })
                });
                typename && name && sides
            }
        }
    }
}

fn split(key: &str) -> (&str, &'static str) {
    for operator in OPERATORS {
        if let Some(field) = key.strip_suffix(operator) {
            if !field.is_empty() {
                return (field, operator);
            }
        }
    }
    (key, "")
}

fn validate_where(where_: &Value, depth: usize) -> GraphQLResult<()> {
    if depth > MAX_LOGICAL_DEPTH {
        return Err(GraphQLError::validation(format!(
            "subscription where exceeds the maximum nesting of {MAX_LOGICAL_DEPTH}"
        )));
    }
    let object = where_
        .as_object()
        .ok_or_else(|| GraphQLError::validation("subscription where must be an object"))?;
    for (key, value) in object {
        match key.as_str() {
            logical::AND | logical::OR => {
                let items = value.as_array().ok_or_else(|| {
                    GraphQLError::validation(format!("{key} takes a list of filters"))
                })?;
                for item in items {
                    validate_where(item, depth + 1)?;
                }
            }
            logical::NOT => validate_where(value, depth + 1)?,
            _ => {
                let (_, operator) = split(key);
                if matches!(operator, "_IN" | "_NOT_IN") && !value.is_array() {
                    return Err(GraphQLError::validation(format!("{key} takes a list")));
                }
            }
        }
    }
    Ok(())
}

/// Every key of `where_` must hold for `properties`. Keys naming absent fields hold
/// unless they ask for a value. Nothing matches a where nested deeper than a
/// `SubscriptionFilter` accepts.
pub fn matches_where(where_: &Value, properties: &Properties) -> bool {
    matches_at(where_, properties, 0).unwrap_or(false)
}

fn matches_at(where_: &Value, properties: &Properties, depth: usize) -> Option<bool> {
    if depth > MAX_LOGICAL_DEPTH {
        return None;
    }
    let object = match where_.as_object() {
        Some(object) => object,
        None => return Some(true),
    };
    let nested = |w: &Value| matches_at(w, properties, depth + 1);
    let mut matched = true;
    for (key, expected) in object {
        let holds = match key.as_str() {
            logical::AND => match expected.as_array() {
                Some(items) => items
                    .iter()
                    .map(nested)
                    .collect::<Option<Vec<_>>>()?
                    .into_iter()
                    .all(|m| m),
                None => true,
            },
            logical::OR => match expected.as_array() {
                Some(items) => items
                    .iter()
                    .map(nested)
                    .collect::<Option<Vec<_>>>()?
                    .into_iter()
                    .any(|m| m),
                None => true,
            },
            logical::NOT => !nested(expected)?,
            _ => {
                let (field, operator) = split(key);
                matches_field(operator, properties.get(field), expected)
            }
        };
        matched = matched && holds;
    }
    Some(matched)
}

fn matches_field(operator: &str, actual: Option<&Value>, expected: &Value) -> bool {
    let actual = actual.filter(|v| !v.is_null());
    if operator == "_UNDEFINED" {
        return expected.as_bool().map_or(true, |undefined| undefined == actual.is_none());
    }
    let actual = match actual {
        Some(actual) => actual,
        None => return matches!(operator, "_NOT" | "_NOT_IN") || expected.is_null(),
    };
    let text = |f: fn(&str, &str) -> bool| match (actual.as_str(), expected.as_str()) {
        (Some(actual), Some(expected)) => f(actual, expected),
        _ => false,
    };
    let within = || {
        expected
            .as_array()
            .map_or(false, |items| items.iter().any(|item| equal(actual, item)))
    };
    match operator {
        "" => equal(actual, expected),
        "_NOT" => !equal(actual, expected),
        "_IN" => within(),
        "_NOT_IN" => !within(),
        "_CONTAINS" => match actual {
            Value::Array(items) => items.iter().any(|item| equal(item, expected)),
            _ => text(|a, e| a.contains(e)),
        },
        "_STARTS_WITH" => text(|a, e| a.starts_with(e)),
        "_ENDS_WITH" => text(|a, e| a.ends_with(e)),
        "_LT" => compare(actual, expected) == Some(Ordering::Less),
        "_LTE" => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        "_GT" => compare(actual, expected) == Some(Ordering::Greater),
        "_GTE" => matches!(
            compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        _ => false,
    }
}

/// Numbers compare by value, so `1` equals `1.0`
fn equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) => a == e,
        _ => actual == expected,
    }
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(e)) => a.as_f64()?.partial_cmp(&e.as_f64()?),
        (Value::String(a), Value::String(e)) => Some(a.cmp(e)),
        _ => None,
    }
}
