use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{GraphQLError, GraphQLResult};
use crate::schema::Entity;

/// Child selections keyed by response key (alias or name)
pub type FieldMap = IndexMap<String, ResolveTree>;

/// Normalized view of one requested field: which arguments it was called with and
/// which children were requested, grouped by the concrete type they apply to.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveTree {
    pub name: String,
    pub alias: String,
    pub args: IndexMap<String, Value>,
    pub fields_by_type_name: IndexMap<String, FieldMap>,
}

impl ResolveTree {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            ..Default::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.insert(name.into(), value);
        self
    }

    /// Adds children under `type_name`, merging with children already there
    pub fn with_fields(mut self, type_name: impl Into<String>, fields: Vec<ResolveTree>) -> Self {
        let entry = self.fields_by_type_name.entry(type_name.into()).or_default();
        for field in fields {
            entry.insert(field.alias.clone(), field);
        }
        self
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name).filter(|v| !v.is_null())
    }

    pub fn arg_i64(&self, name: &str) -> GraphQLResult<Option<i64>> {
        match self.arg(name) {
            None => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| {
                GraphQLError::validation(format!("argument {name} must be an integer"))
            }),
        }
    }

    pub fn arg_str(&self, name: &str) -> GraphQLResult<Option<&str>> {
        match self.arg(name) {
            None => Ok(None),
            Some(v) => v.as_str().map(Some).ok_or_else(|| {
                GraphQLError::validation(format!("argument {name} must be a string"))
            }),
        }
    }

    /// Object type the children were selected on. For abstract selections this is the
    /// first concrete type.
    pub fn type_name(&self) -> Option<&str> {
        self.fields_by_type_name.keys().next().map(String::as_str)
    }

    /// Union of the children of every type key, first occurrence of a response key wins
    pub fn fields(&self) -> FieldMap {
        let mut merged = FieldMap::new();
        for fields in self.fields_by_type_name.values() {
            for (key, field) in fields {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), field.clone());
                }
            }
        }
        merged
    }

    /// Children that apply to `entity`: its own key plus the keys of the interfaces it
    /// implements. Falls back to every key when none of them is present.
    pub fn fields_for_entity(&self, entity: &Entity) -> FieldMap {
        let keys: Vec<&String> = self
            .fields_by_type_name
            .keys()
            .filter(|k| **k == entity.name || entity.implements.contains(*k))
            .collect();
        if keys.is_empty() {
            return self.fields();
        }
        let mut merged = FieldMap::new();
        for key in keys {
            for (alias, field) in &self.fields_by_type_name[key] {
                if !merged.contains_key(alias) {
                    merged.insert(alias.clone(), field.clone());
                }
            }
        }
        merged
    }

    /// First child, across all type keys, with the given field name
    pub fn find_field(&self, name: &str) -> Option<&ResolveTree> {
        self.fields_by_type_name
            .values()
            .flat_map(|fields| fields.values())
            .find(|f| f.name == name)
    }

    /// Every child, across all type keys, with the given field name
    pub fn find_fields(&self, name: &str) -> Vec<&ResolveTree> {
        let mut found: Vec<&ResolveTree> = vec![];
        for field in self
            .fields_by_type_name
            .values()
            .flat_map(|fields| fields.values())
        {
            if field.name == name && !found.iter().any(|f| f.alias == field.alias) {
                found.push(field);
            }
        }
        found
    }

    pub fn is_leaf(&self) -> bool {
        self.fields_by_type_name.values().all(|f| f.is_empty())
    }
}

/// Coerces a single input element into a one element list
pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => vec![],
        other => vec![other],
    }
}
