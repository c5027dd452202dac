//! Re-shapes returned rows into the GraphQL response tree.
//!
//! Projections already key values by response alias. What is left for this side is
//! everything the database cannot render in its final form: temporal canonicalization,
//! points, cursors and page info, global ids and the mutation envelope.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::config::HasPreviousPageRule;
use crate::constants::{aggregate, args, connection, introspection, mutation};
use crate::cursor::to_global_id;
use crate::error::{GraphQLError, GraphQLResult};
use crate::executor::{ExecutionResult, QueryStatistics};
use crate::pagination::{create_connection_with_edge_properties, Connection, ConnectionArgs};
use crate::resolve_tree::ResolveTree;
use crate::schema::{Entity, Field, FieldKind, SchemaModel, TemporalKind};
use crate::translate::{ResultKind, Translation};

pub struct Shaper<'a> {
    schema: &'a SchemaModel,
    rule: HasPreviousPageRule,
}

impl<'a> Shaper<'a> {
    pub fn new(schema: &'a SchemaModel, rule: HasPreviousPageRule) -> Self {
        Self { schema, rule }
    }

    /// Response value of the root field `translation` was built for
    pub fn shape(
        &self,
        translation: &Translation,
        result: ExecutionResult,
    ) -> GraphQLResult<Value> {
        let entity = &translation.entity;
        let tree = &translation.tree;
        let mut rows = result.records.into_iter();
        match &translation.kind {
            ResultKind::Read => rows
                .map(|mut row| self.node(entity, tree, take(&mut row, "this")))
                .collect::<GraphQLResult<Vec<_>>>()
                .map(Value::Array),
            ResultKind::Node => match rows.next() {
                Some(mut row) => self.node(entity, tree, take(&mut row, "this")),
                None => Ok(Value::Null),
            },
            ResultKind::Connection(column) => {
                let value = rows
                    .next()
                    .map(|mut row| take(&mut row, column))
                    .unwrap_or(Value::Null);
                self.connection(entity, None, tree, value)
            }
            ResultKind::Aggregate => {
                let value = rows
                    .next()
                    .map(|mut row| take(&mut row, "this"))
                    .unwrap_or(Value::Null);
                Ok(self.aggregate(&entity.fields, &[], tree, value))
            }
            ResultKind::Search => rows
                .map(|mut row| self.search_hit(entity, tree, take(&mut row, "this")))
                .collect::<GraphQLResult<Vec<_>>>()
                .map(Value::Array),
            ResultKind::Create | ResultKind::Update => {
                let data = rows
                    .next()
                    .map(|mut row| take(&mut row, mutation::DATA))
                    .unwrap_or(Value::Null);
                let info = result_stats(&result.statistics, &result.bookmark);
                self.mutation_response(entity, tree, data, &info)
            }
            ResultKind::Delete => {
                let info = result_stats(&result.statistics, &result.bookmark);
                Ok(select_fields(tree, info))
            }
        }
    }

    /// A node projection of `entity`, or a list of them
    fn node(&self, entity: &Arc<Entity>, tree: &ResolveTree, value: Value) -> GraphQLResult<Value> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.node(entity, tree, item))
                .collect::<GraphQLResult<Vec<_>>>()
                .map(Value::Array),
            Value::Object(mut map) => {
                let entity = match map.remove(introspection::RESOLVE_TYPE) {
                    Some(Value::String(name)) => self
                        .schema
                        .entity(&name)
                        .cloned()
                        .ok_or_else(|| GraphQLError::internal(format!("unknown type {name}")))?,
                    _ => entity.clone(),
                };
                for (alias, child) in tree.fields_for_entity(&entity) {
                    if let Some(value) = map.remove(&alias) {
                        let shaped = self.field(&entity, &child, value)?;
                        map.insert(alias, shaped);
                    }
                }
                Ok(Value::Object(map))
            }
            other => Ok(other),
        }
    }

    fn field(
        &self,
        entity: &Arc<Entity>,
        tree: &ResolveTree,
        value: Value,
    ) -> GraphQLResult<Value> {
        if tree.name == args::ID && entity.global_id().is_some() {
            return Ok(match value {
                Value::Null => Value::Null,
                value => Value::String(to_global_id(&entity.name, &value)),
            });
        }
        if let Some(field) = entity.field(&tree.name) {
            return self.field_value(field, tree, value);
        }
        let derived = |suffix: &str| {
            tree.name
                .strip_suffix(suffix)
                .and_then(|base| entity.field(base))
                .filter(|field| field.relationship().is_some())
        };
        if let Some(field) = derived(connection::SUFFIX) {
            let rel = field.relationship().map(|rel| rel.properties.as_slice());
            let target = self.target(field)?;
            return self.connection(&target, rel, tree, value);
        }
        if let Some(field) = derived(aggregate::SUFFIX) {
            let properties = field
                .relationship()
                .map(|rel| rel.properties.clone())
                .unwrap_or_default();
            let target = self.target(field)?;
            return Ok(self.aggregate(&target.fields, &properties, tree, value));
        }
        Ok(value)
    }

    fn field_value(&self, field: &Field, tree: &ResolveTree, value: Value) -> GraphQLResult<Value> {
        match &field.kind {
            FieldKind::Relationship(_) => self.node(&self.target(field)?, tree, value),
            FieldKind::Cypher(cypher) if cypher.target.is_some() => {
                self.node(&self.target(field)?, tree, value)
            }
            FieldKind::Temporal { temporal } => {
                Ok(map_list(value, &|v| canonicalize(*temporal, v)))
            }
            FieldKind::Point { cartesian } => Ok(map_list(value, &|v| point(*cartesian, tree, v))),
            _ => Ok(value),
        }
    }

    /// Concrete target of a relationship or `@cypher` node field. Abstract targets fall back to
    /// the first member, the actual type comes with every value as `__resolveType`.
    fn target(&self, field: &Field) -> GraphQLResult<Arc<Entity>> {
        let name = match &field.kind {
            FieldKind::Relationship(rel) => rel.target.as_str(),
            FieldKind::Cypher(cypher) => cypher.target.as_deref().unwrap_or_default(),
            _ => return Err(GraphQLError::internal(format!("{} is not a node field", field.name))),
        };
        self.schema
            .concrete_entities(name)
            .into_iter()
            .next()
            .ok_or_else(|| GraphQLError::internal(format!("unknown type {name}")))
    }

    /// `{ edges, totalCount }` from the database into a full connection
    fn connection(
        &self,
        target: &Arc<Entity>,
        properties: Option<&[Arc<Field>]>,
        tree: &ResolveTree,
        value: Value,
    ) -> GraphQLResult<Value> {
        let args = ConnectionArgs::from_tree(tree)?;
        let edges = match value.get(connection::EDGES) {
            Some(Value::Array(edges)) => edges.clone(),
            _ => vec![],
        };
        let total_count = value
            .get(connection::TOTAL_COUNT)
            .and_then(Value::as_i64)
            .unwrap_or(edges.len() as i64);
        let Connection {
            edges,
            page_info,
            total_count,
        } = create_connection_with_edge_properties(edges, &args, total_count, self.rule)?;

        let mut out = Map::new();
        for (alias, child) in tree.fields() {
            let shaped = match child.name.as_str() {
                connection::TOTAL_COUNT => Value::from(total_count),
                connection::PAGE_INFO => {
                    let info = serde_json::to_value(&page_info)
                        .map_err(|e| GraphQLError::internal(e.to_string()))?;
                    select_fields(&child, info)
                }
                connection::EDGES => edges
                    .iter()
                    .map(|edge| self.edge(target, properties, &child, edge.clone()))
                    .collect::<GraphQLResult<Vec<_>>>()
                    .map(Value::Array)?,
                introspection::TYPENAME => typename(tree),
                other => {
                    return Err(GraphQLError::field_not_found(other, connection::SUFFIX));
                }
            };
            out.insert(alias, shaped);
        }
        Ok(Value::Object(out))
    }

    fn edge(
        &self,
        target: &Arc<Entity>,
        properties: Option<&[Arc<Field>]>,
        tree: &ResolveTree,
        edge: Value,
    ) -> GraphQLResult<Value> {
        let mut edge = match edge {
            Value::Object(map) => map,
            _ => return Ok(Value::Null),
        };
        let cursor = edge.remove(connection::CURSOR).unwrap_or(Value::Null);
        let mut out = Map::new();
        for (alias, child) in tree.fields() {
            let value = match child.name.as_str() {
                connection::CURSOR => cursor.clone(),
                connection::NODE => self.node(target, &child, take(&mut edge, &alias))?,
                _ => {
                    let value = take(&mut edge, &alias);
                    match properties.and_then(|p| p.iter().find(|f| f.name == child.name)) {
                        Some(property) => self.field_value(property, &child, value)?,
                        None => value,
                    }
                }
            };
            out.insert(alias, value);
        }
        Ok(Value::Object(out))
    }

    /// Aggregation results only need their temporal minimums and maximums canonicalized
    fn aggregate(
        &self,
        node_fields: &[Arc<Field>],
        edge_fields: &[Arc<Field>],
        tree: &ResolveTree,
        value: Value,
    ) -> Value {
        let mut map = match value {
            Value::Object(map) => map,
            other => return other,
        };
        for (alias, child) in tree.fields() {
            let fields = match child.name.as_str() {
                aggregate::NODE => Some(node_fields),
                aggregate::EDGE => Some(edge_fields),
                _ => None,
            };
            if let Some(fields) = fields {
                if let Some(inner) = map.remove(&alias) {
                    map.insert(alias, self.aggregate(fields, &[], &child, inner));
                }
                continue;
            }
            let temporal = node_fields
                .iter()
                .find(|f| f.name == child.name)
                .and_then(|f| f.temporal());
            if let (Some(temporal), Some(Value::Object(inner))) = (temporal, map.get_mut(&alias)) {
                for value in inner.values_mut() {
                    *value = canonicalize(temporal, value.take());
                }
            }
        }
        Value::Object(map)
    }

    fn search_hit(
        &self,
        entity: &Arc<Entity>,
        tree: &ResolveTree,
        value: Value,
    ) -> GraphQLResult<Value> {
        let mut map = match value {
            Value::Object(map) => map,
            other => return Ok(other),
        };
        let entity_key = crate::schema::lower_first(&entity.name);
        for (alias, child) in tree.fields() {
            if child.name == entity_key {
                let node = take(&mut map, &alias);
                map.insert(alias, self.node(entity, &child, node)?);
            }
        }
        Ok(Value::Object(map))
    }

    /// `{ info, <plural> }` of create and update
    fn mutation_response(
        &self,
        entity: &Arc<Entity>,
        tree: &ResolveTree,
        data: Value,
        info: &Value,
    ) -> GraphQLResult<Value> {
        let plural = entity.plural();
        let mut out = Map::new();
        for (alias, child) in tree.fields() {
            if child.name == introspection::TYPENAME {
                out.insert(alias, typename(tree));
            } else if child.name == mutation::INFO {
                out.insert(alias, select_fields(&child, info.clone()));
            } else if child.name == plural {
                let nodes = match &data {
                    Value::Null => Value::Array(vec![]),
                    data => self.node(entity, &child, data.clone())?,
                };
                out.insert(alias, nodes);
            }
        }
        Ok(Value::Object(out))
    }
}

fn take(map: &mut Map<String, Value>, key: &str) -> Value {
    map.remove(key).unwrap_or(Value::Null)
}

fn map_list(value: Value, f: &dyn Fn(Value) -> Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(f).collect()),
        Value::Null => Value::Null,
        value => f(value),
    }
}

/// Counters and bookmark of a write, keyed by their response names
fn result_stats(statistics: &QueryStatistics, bookmark: &Option<String>) -> Value {
    let mut info = Map::new();
    info.insert(
        mutation::BOOKMARK.to_string(),
        bookmark.clone().map(Value::String).unwrap_or(Value::Null),
    );
    info.insert(mutation::NODES_CREATED.to_string(), statistics.nodes_created.into());
    info.insert(mutation::NODES_DELETED.to_string(), statistics.nodes_deleted.into());
    info.insert(
        mutation::RELATIONSHIPS_CREATED.to_string(),
        statistics.relationships_created.into(),
    );
    info.insert(
        mutation::RELATIONSHIPS_DELETED.to_string(),
        statistics.relationships_deleted.into(),
    );
    Value::Object(info)
}

/// Picks the selected keys of a plain object, renaming them to their aliases. Returns the
/// whole value when nothing is selected.
fn select_fields(tree: &ResolveTree, value: Value) -> Value {
    let fields = tree.fields();
    if fields.is_empty() {
        return value;
    }
    let mut map = match value {
        Value::Object(map) => map,
        other => return other,
    };
    let mut out = Map::new();
    for (alias, child) in fields {
        let value = match child.name.as_str() {
            introspection::TYPENAME => typename(tree),
            name => take(&mut map, name),
        };
        out.insert(alias, value);
    }
    Value::Object(out)
}

fn typename(tree: &ResolveTree) -> Value {
    tree.type_name()
        .map(|name| Value::String(name.to_string()))
        .unwrap_or(Value::Null)
}

/// DateTime as RFC 3339 in UTC with millisecond precision, LocalDateTime the same without
/// zone. Other kinds are already canonical.
pub fn canonicalize(kind: TemporalKind, value: Value) -> Value {
    let text = match &value {
        Value::String(text) => text,
        _ => return value,
    };
    let canonical = match kind {
        TemporalKind::DateTime => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true)),
        TemporalKind::LocalDateTime => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
        _ => return value,
    };
    match canonical {
        Some(canonical) => Value::String(canonical),
        None => {
            tracing::warn!(value = %text, kind = kind.name(), "unparseable temporal value");
            value
        }
    }
}

/// `{ point, crs }` projected by the database into the selected point fields
fn point(cartesian: bool, tree: &ResolveTree, value: Value) -> Value {
    let point = match value.get("point") {
        Some(point) if !point.is_null() => point,
        _ => return Value::Null,
    };
    let coordinate = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| point.get(*key))
            .cloned()
            .unwrap_or(Value::Null)
    };
    let x = coordinate(&["x", "longitude"]);
    let y = coordinate(&["y", "latitude"]);
    let z = coordinate(&["z", "height"]);
    let mut full = Map::new();
    if !cartesian {
        full.insert("longitude".to_string(), x.clone());
        full.insert("latitude".to_string(), y.clone());
        full.insert("height".to_string(), z.clone());
    }
    full.insert("x".to_string(), x);
    full.insert("y".to_string(), y);
    full.insert("z".to_string(), z);
    full.insert("srid".to_string(), coordinate(&["srid"]));
    full.insert(
        "crs".to_string(),
        value.get("crs").cloned().unwrap_or(Value::Null),
    );
    select_fields(tree, Value::Object(full))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Dialect;
    use crate::auth::AuthorizationContext;
    use crate::config::Config;
    use crate::cursor::offset_to_cursor;
    use crate::schema::OperationKind;
    use crate::test_fixtures::movie_schema;
    use crate::translate::translate;
    use serde_json::json;

    fn shape(
        operation: OperationKind,
        tree: ResolveTree,
        result: ExecutionResult,
    ) -> GraphQLResult<Value> {
        let schema = movie_schema();
        let config = Config::default();
        let translation = translate(
            &schema,
            &config,
            Dialect::default(),
            &AuthorizationContext::default(),
            operation,
            &tree,
        )?;
        Shaper::new(&schema, config.pagination.has_previous_page).shape(&translation, result)
    }

    fn rows(rows: Vec<Value>) -> ExecutionResult {
        ExecutionResult {
            records: rows
                .into_iter()
                .map(|row| row.as_object().cloned().unwrap())
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn canonicalize_test() {
        assert_eq!(
            canonicalize(TemporalKind::DateTime, json!("2024-03-01T10:15:30.123456789+02:00")),
            json!("2024-03-01T08:15:30.123Z")
        );
        assert_eq!(
            canonicalize(TemporalKind::DateTime, json!("2024-03-01T10:15:30Z")),
            json!("2024-03-01T10:15:30.000Z")
        );
        assert_eq!(
            canonicalize(TemporalKind::LocalDateTime, json!("2024-03-01T10:15:30.5")),
            json!("2024-03-01T10:15:30.500")
        );
        assert_eq!(
            canonicalize(TemporalKind::Date, json!("2024-03-01")),
            json!("2024-03-01")
        );
        assert_eq!(
            canonicalize(TemporalKind::DateTime, json!("yesterday")),
            json!("yesterday")
        );
    }

    #[test]
    fn read_shape_test() {
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            vec![
                ResolveTree::new("releasedAt"),
                ResolveTree::new("location").with_fields(
                    "Point",
                    vec![ResolveTree::new("longitude"), ResolveTree::new("srid")],
                ),
                ResolveTree::new("related")
                    .with_fields("Movie", vec![ResolveTree::new("title")])
                    .with_fields("Genre", vec![ResolveTree::new("id")]),
            ],
        );
        let result = rows(vec![json!({"this": {
            "releasedAt": "1999-03-31T00:00:00+00:00",
            "location": {"point": {"x": 1.5, "y": 2.5, "srid": 4326}, "crs": "wgs-84"},
            "related": [
                {"__resolveType": "Genre", "id": "Drama"},
                {"__resolveType": "Movie", "title": "Up"}
            ]
        }})]);
        let res = shape(OperationKind::Query, tree, result);
        assert!(res.is_ok());
        let res = res.unwrap();
        assert_eq!(
            res,
            json!([{
                "releasedAt": "1999-03-31T00:00:00.000Z",
                "location": {"longitude": 1.5, "srid": 4326},
                "related": [
                    {"id": to_global_id("Genre", &json!("Drama"))},
                    {"title": "Up"}
                ]
            }])
        );
    }

    #[test]
    fn connection_shape_test() {
        let tree = ResolveTree::new("moviesConnection")
            .with_arg("first", json!(1))
            .with_arg("after", json!(offset_to_cursor(0)))
            .with_fields(
                "MoviesConnection",
                vec![
                    ResolveTree::new("totalCount"),
                    ResolveTree::new("pageInfo").with_fields(
                        "PageInfo",
                        vec![
                            ResolveTree::new("hasNextPage").with_alias("more"),
                            ResolveTree::new("endCursor"),
                        ],
                    ),
                    ResolveTree::new("edges").with_fields(
                        "MovieEdge",
                        vec![
                            ResolveTree::new("cursor"),
                            ResolveTree::new("node")
                                .with_fields("Movie", vec![ResolveTree::new("title")]),
                        ],
                    ),
                ],
            );
        let result = rows(vec![json!({"var1": {
            "edges": [{"node": {"title": "B"}}],
            "totalCount": 3
        }})]);
        let res = shape(OperationKind::Query, tree, result);
        assert!(res.is_ok());
        let res = res.unwrap();
        assert_eq!(
            res,
            json!({
                "totalCount": 3,
                "pageInfo": {"more": true, "endCursor": offset_to_cursor(1)},
                "edges": [{"cursor": offset_to_cursor(1), "node": {"title": "B"}}]
            })
        );
    }

    #[test]
    fn typename_on_wrapper_objects_test() {
        let tree = ResolveTree::new("moviesConnection").with_fields(
            "MoviesConnection",
            vec![
                ResolveTree::new("__typename"),
                ResolveTree::new("pageInfo").with_fields(
                    "PageInfo",
                    vec![ResolveTree::new("__typename"), ResolveTree::new("hasNextPage")],
                ),
            ],
        );
        let result = rows(vec![json!({"var1": {"edges": [], "totalCount": 0}})]);
        let res = shape(OperationKind::Query, tree, result);
        assert!(res.is_ok());
        assert_eq!(
            res.unwrap(),
            json!({
                "__typename": "MoviesConnection",
                "pageInfo": {"__typename": "PageInfo", "hasNextPage": false}
            })
        );

        let tree = ResolveTree::new("createMovies")
            .with_arg("input", json!([{"title": "Up"}]))
            .with_fields(
                "CreateMoviesMutationResponse",
                vec![
                    ResolveTree::new("__typename").with_alias("kind"),
                    ResolveTree::new("info").with_fields(
                        "CreateInfo",
                        vec![ResolveTree::new("__typename"), ResolveTree::new("nodesCreated")],
                    ),
                ],
            );
        let result = ExecutionResult {
            statistics: QueryStatistics {
                nodes_created: 1,
                ..Default::default()
            },
            ..rows(vec![json!({"data": []})])
        };
        let res = shape(OperationKind::Mutation, tree, result);
        assert!(res.is_ok());
        assert_eq!(
            res.unwrap(),
            json!({
                "kind": "CreateMoviesMutationResponse",
                "info": {"__typename": "CreateInfo", "nodesCreated": 1}
            })
        );

        let tree = ResolveTree::new("deleteMovies").with_fields(
            "DeleteInfo",
            vec![ResolveTree::new("__typename"), ResolveTree::new("nodesDeleted")],
        );
        let res = shape(OperationKind::Mutation, tree, ExecutionResult::default());
        assert_eq!(
            res.unwrap(),
            json!({"__typename": "DeleteInfo", "nodesDeleted": 0})
        );
    }

    #[test]
    fn node_lookup_shape_test() {
        let id = to_global_id("Genre", &json!("Drama"));
        let tree = ResolveTree::new("node")
            .with_arg("id", json!(id.clone()))
            .with_fields("Genre", vec![ResolveTree::new("id")]);
        let res = shape(OperationKind::Query, tree.clone(), rows(vec![json!({"this": {"id": "Drama"}})]));
        assert_eq!(res.unwrap(), json!({"id": id}));
        let res = shape(OperationKind::Query, tree, rows(vec![]));
        assert_eq!(res.unwrap(), Value::Null);
    }

    #[test]
    fn aggregate_shape_test() {
        let tree = ResolveTree::new("moviesAggregate").with_fields(
            "MovieAggregateSelection",
            vec![
                ResolveTree::new("count"),
                ResolveTree::new("releasedAt").with_fields(
                    "DateTimeAggregateSelection",
                    vec![ResolveTree::new("min")],
                ),
            ],
        );
        let result = rows(vec![json!({"this": {
            "count": 2,
            "releasedAt": {"min": "1999-03-31T00:00:00+00:00"}
        }})]);
        let res = shape(OperationKind::Query, tree, result);
        assert_eq!(
            res.unwrap(),
            json!({"count": 2, "releasedAt": {"min": "1999-03-31T00:00:00.000Z"}})
        );
    }

    #[test]
    fn mutation_envelope_test() {
        let tree = ResolveTree::new("createMovies")
            .with_arg("input", json!([{"title": "Up"}]))
            .with_fields(
                "CreateMoviesMutationResponse",
                vec![
                    ResolveTree::new("info").with_fields(
                        "CreateInfo",
                        vec![ResolveTree::new("nodesCreated"), ResolveTree::new("bookmark")],
                    ),
                    ResolveTree::new("movies")
                        .with_fields("Movie", vec![ResolveTree::new("title")]),
                ],
            );
        let result = ExecutionResult {
            statistics: QueryStatistics {
                nodes_created: 1,
                ..Default::default()
            },
            bookmark: Some("bm1".to_string()),
            ..rows(vec![json!({"data": [{"title": "Up"}]})])
        };
        let res = shape(OperationKind::Mutation, tree, result);
        assert!(res.is_ok());
        assert_eq!(
            res.unwrap(),
            json!({
                "info": {"nodesCreated": 1, "bookmark": "bm1"},
                "movies": [{"title": "Up"}]
            })
        );
    }

    #[test]
    fn delete_info_test() {
        let tree = ResolveTree::new("deleteMovies").with_fields(
            "DeleteInfo",
            vec![ResolveTree::new("nodesDeleted"), ResolveTree::new("relationshipsDeleted")],
        );
        let result = ExecutionResult {
            statistics: QueryStatistics {
                nodes_deleted: 2,
                relationships_deleted: 5,
                ..Default::default()
            },
            ..Default::default()
        };
        let res = shape(OperationKind::Mutation, tree, result);
        assert_eq!(
            res.unwrap(),
            json!({"nodesDeleted": 2, "relationshipsDeleted": 5})
        );
    }
}
