//! Turns a resolve tree into a nested map projection.
//!
//! Scalars read properties of the bound node directly. Everything that needs another
//! traversal (relationships, connections, aggregations, `@cypher` fields) becomes a
//! `CALL` subquery binding a fresh variable, and the map entry references that variable.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::aggregate;
use crate::ast::{
    Clause, Expr, MapEntry, NodePattern, OrderItem, Pattern, Projection, ReturnItem, Statement,
};
use crate::auth::{filter_predicate, validate_predicate, AuthorizationOperation, ValidateWhen};
use crate::config::LimitConfig;
use crate::constants::{
    aggregate as aggregate_names, args, connection, cypher, introspection, pagination,
};
use crate::context::TranslationContext;
use crate::cypher_field;
use crate::error::{GraphQLError, GraphQLResult};
use crate::filter::{compile_connection_where, compile_where, label_predicate, Predicate};
use crate::pagination::ConnectionArgs;
use crate::resolve_tree::{FieldMap, ResolveTree};
use crate::schema::{upper_first, CypherField, Entity, Field, FieldKind, RelationshipField};

/// Map entries for one node plus the subqueries they reference
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectionResult {
    pub entries: Vec<MapEntry>,
    pub subqueries: Vec<Clause>,
}

impl ProjectionResult {
    pub fn to_map(&self, variable: &str) -> Expr {
        Expr::MapProjection {
            variable: variable.to_string(),
            entries: self.entries.clone(),
        }
    }
}

/// Projects the fields `selection` requests on `entity`, bound to `variable`
pub fn build_projection(
    ctx: &mut TranslationContext,
    entity: &Entity,
    selection: &ResolveTree,
    variable: &str,
) -> GraphQLResult<ProjectionResult> {
    project_fields(ctx, entity, &selection.fields_for_entity(entity), variable)
}

pub fn project_fields(
    ctx: &mut TranslationContext,
    entity: &Entity,
    fields: &FieldMap,
    variable: &str,
) -> GraphQLResult<ProjectionResult> {
    let mut result = ProjectionResult::default();
    for (alias, tree) in fields {
        if tree.name == introspection::TYPENAME {
            result
                .entries
                .push(MapEntry::Entry(alias.clone(), Expr::string(&entity.name)));
            continue;
        }
        if tree.name == args::ID {
            if let Some(field) = entity.global_id() {
                result.entries.push(property_entry(variable, alias, field));
                continue;
            }
        }
        let field = match entity.field(&tree.name) {
            Some(field) => field.clone(),
            None => {
                let (clause, bound) = derived_field(ctx, entity, variable, tree)?;
                result.subqueries.push(clause);
                result
                    .entries
                    .push(MapEntry::Entry(alias.clone(), Expr::var(bound)));
                continue;
            }
        };
        match &field.kind {
            FieldKind::Relationship(rel) => {
                let (clause, bound) = relationship_subquery(ctx, variable, &field, rel, tree)?;
                result.subqueries.push(clause);
                result
                    .entries
                    .push(MapEntry::Entry(alias.clone(), Expr::var(bound)));
            }
            FieldKind::Cypher(cypher_field) => {
                let (clause, bound) = match &cypher_field.target {
                    Some(_) => cypher_node_subquery(ctx, variable, &field, cypher_field, tree)?,
                    None => cypher_field::scalar_subquery(
                        ctx,
                        variable,
                        &field,
                        cypher_field,
                        &tree.args,
                    ),
                };
                result.subqueries.push(clause);
                result
                    .entries
                    .push(MapEntry::Entry(alias.clone(), Expr::var(bound)));
            }
            FieldKind::Point { .. } => {
                let expr = point_projection(Expr::prop(variable, field.db_name()), field.list);
                result.entries.push(MapEntry::Entry(alias.clone(), expr));
            }
            _ => result.entries.push(property_entry(variable, alias, &field)),
        }
    }
    Ok(result)
}

/// `<relationship>Connection` and `<relationship>Aggregate`
fn derived_field(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    tree: &ResolveTree,
) -> GraphQLResult<(Clause, String)> {
    let relationship = |suffix: &str| {
        tree.name
            .strip_suffix(suffix)
            .and_then(|base| entity.field(base))
            .filter(|field| field.relationship().is_some())
            .cloned()
    };
    if let Some(field) = relationship(connection::SUFFIX) {
        if let Some(rel) = field.relationship() {
            return connection_subquery(ctx, entity, variable, &field, rel, tree);
        }
    }
    if let Some(field) = relationship(aggregate_names::SUFFIX) {
        if let Some(rel) = field.relationship() {
            return aggregate::relationship_aggregate(ctx, entity, &field, rel, variable, tree);
        }
    }
    Err(GraphQLError::field_not_found(&tree.name, &entity.name))
}

fn property_entry(variable: &str, alias: &str, field: &Field) -> MapEntry {
    if alias == field.name && field.db_name() == field.name {
        MapEntry::Property(field.name.clone())
    } else {
        MapEntry::Entry(alias.to_string(), Expr::prop(variable, field.db_name()))
    }
}

/// `{ point: p, crs: p.crs }`, null when the property is unset
pub fn point_projection(value: Expr, list: bool) -> Expr {
    let point = |p: Expr| {
        Expr::Map(vec![
            ("point".to_string(), p.clone()),
            ("crs".to_string(), p.dot("crs")),
        ])
    };
    if list {
        Expr::ListComprehension {
            variable: "p".to_string(),
            source: Box::new(value),
            filter: None,
            map: Some(Box::new(point(Expr::var("p")))),
        }
    } else {
        Expr::Case {
            branches: vec![(Expr::is_not_null(value.clone()), point(value))],
            default: Some(Box::new(Expr::null())),
        }
    }
}

/// Filter for nodes of `entity` read through `variable`: the caller's `where` and the
/// entity's read authorization
pub fn read_predicate(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    where_: Option<&Value>,
) -> GraphQLResult<Predicate> {
    let mut predicate = Predicate::default();
    if let Some(where_) = where_ {
        predicate = predicate.and(compile_where(ctx, entity, variable, where_)?);
    }
    let operation = AuthorizationOperation::Read;
    predicate = predicate.and(filter_predicate(ctx, entity, variable, operation)?);
    predicate = predicate.and(validate_predicate(
        ctx,
        entity,
        variable,
        operation,
        ValidateWhen::Before,
    )?);
    Ok(predicate)
}

/// `MATCH pattern WHERE predicate`, hoisting the predicate into a `WITH *` when it depends
/// on subqueries
pub fn match_clauses(pattern: Pattern, predicate: Predicate, optional: bool) -> Vec<Clause> {
    if predicate.subqueries.is_empty() {
        return vec![Clause::Match {
            optional,
            pattern,
            filter: predicate.expr,
        }];
    }
    let mut clauses = vec![Clause::Match {
        optional,
        pattern,
        filter: None,
    }];
    clauses.extend(predicate.subqueries);
    clauses.extend(predicate.expr.map(Clause::with_star_where));
    clauses
}

fn collected(variable: &str, list: bool) -> Expr {
    let collect = Expr::func("collect", vec![Expr::var(variable)]);
    if list {
        collect
    } else {
        Expr::func("head", vec![collect])
    }
}

fn project_as(expr: Expr, variable: &str) -> Clause {
    Clause::With {
        projection: Projection::items(vec![ReturnItem::new(expr, variable)]),
        filter: None,
    }
}

/// Children of `tree` selected on `entity` itself or on an interface it implements
fn member_fields(tree: &ResolveTree, entity: &Entity) -> FieldMap {
    let mut merged = FieldMap::new();
    for (key, fields) in &tree.fields_by_type_name {
        if *key == entity.name || entity.implements.contains(key) {
            for (alias, field) in fields {
                merged
                    .entry(alias.clone())
                    .or_insert_with(|| field.clone());
            }
        }
    }
    merged
}

fn target_entity(ctx: &TranslationContext, name: &str) -> GraphQLResult<Arc<Entity>> {
    ctx.schema
        .entity(name)
        .cloned()
        .ok_or_else(|| GraphQLError::schema(format!("unknown type {name}")))
}

fn relationship_subquery(
    ctx: &mut TranslationContext,
    variable: &str,
    field: &Field,
    rel: &RelationshipField,
    tree: &ResolveTree,
) -> GraphQLResult<(Clause, String)> {
    if ctx.schema.is_abstract(&rel.target) {
        return abstract_relationship_subquery(ctx, variable, field, rel, tree);
    }
    let target = target_entity(ctx, &rel.target)?;
    let edge = ctx.next_var(cypher::THIS);
    let node = ctx.next_var(cypher::THIS);
    let pattern = Pattern::relationship(
        NodePattern::var(variable),
        Some(&edge),
        &rel.rel_type,
        rel.direction.pattern_direction(),
        NodePattern::new(Some(&node), &target.labels()),
    );

    let mut clauses = vec![Clause::with_vars(&[variable])];
    ctx.nested(|ctx| {
        let predicate = read_predicate(ctx, &target, &node, tree.arg(args::WHERE))?;
        clauses.extend(match_clauses(pattern, predicate, false));
        if field.list {
            let options = ReadOptions::from_tree(tree, &ctx.config.limits)?;
            clauses.extend(options.clauses(ctx, &target, &node)?);
        }
        let projection = build_projection(ctx, &target, tree, &node)?;
        let map = projection.to_map(&node);
        clauses.extend(projection.subqueries);
        clauses.push(project_as(map, &node));
        Ok(())
    })?;

    let result = ctx.next_var("var");
    clauses.push(Clause::Return(Projection::items(vec![ReturnItem::new(
        collected(&node, field.list),
        &result,
    )])));
    Ok((Clause::Call(Statement::new(clauses)), result))
}

/// One `UNION` branch per concrete type, each tagged with `__resolveType`
fn abstract_relationship_subquery(
    ctx: &mut TranslationContext,
    variable: &str,
    field: &Field,
    rel: &RelationshipField,
    tree: &ResolveTree,
) -> GraphQLResult<(Clause, String)> {
    let schema = ctx.schema;
    let is_union = schema.union(&rel.target).is_some();
    let where_ = tree.arg(args::WHERE);
    let column = ctx.next_var("var");

    let mut branches = vec![];
    for member in schema.concrete_entities(&rel.target) {
        let member_where = match (is_union, where_) {
            (true, Some(where_)) => match where_.get(&member.name) {
                Some(member_where) => Some(member_where),
                None => continue,
            },
            (_, where_) => where_,
        };
        let edge = ctx.next_var(cypher::THIS);
        let node = ctx.next_var(cypher::THIS);
        let pattern = Pattern::relationship(
            NodePattern::var(variable),
            Some(&edge),
            &rel.rel_type,
            rel.direction.pattern_direction(),
            NodePattern::new(Some(&node), &member.labels()),
        );
        let branch = ctx.nested(|ctx| {
            let mut clauses = vec![Clause::with_vars(&[variable])];
            let predicate = read_predicate(ctx, &member, &node, member_where)?;
            clauses.extend(match_clauses(pattern, predicate, false));
            let mut projection =
                project_fields(ctx, &member, &member_fields(tree, &member), &node)?;
            projection.entries.insert(
                0,
                MapEntry::Entry(
                    introspection::RESOLVE_TYPE.to_string(),
                    Expr::string(&member.name),
                ),
            );
            let map = projection.to_map(&node);
            clauses.extend(projection.subqueries);
            clauses.push(project_as(map, &node));
            clauses.push(Clause::Return(Projection::items(vec![ReturnItem::new(
                Expr::var(&node),
                &column,
            )])));
            Ok(Statement::new(clauses))
        })?;
        branches.push(branch);
    }
    if branches.is_empty() {
        return Err(GraphQLError::validation(format!(
            "where on {} selects none of its members",
            rel.target
        )));
    }

    let mut clauses = vec![
        Clause::with_vars(&[variable]),
        Clause::Call(Statement::new(vec![Clause::Union(branches)])),
        Clause::with_vars(&[&column]),
    ];
    if field.list {
        let options = ReadOptions::from_tree(tree, &ctx.config.limits)?;
        clauses.extend(options.projected_clauses(ctx, &column));
    }
    clauses.push(Clause::Return(Projection::items(vec![ReturnItem::new(
        collected(&column, field.list),
        &column,
    )])));
    Ok((Clause::Call(Statement::new(clauses)), column))
}

/// `@cypher` field returning nodes: the statement runs in a subquery and each returned
/// node is projected like a relationship target
fn cypher_node_subquery(
    ctx: &mut TranslationContext,
    variable: &str,
    field: &Field,
    cypher_field: &CypherField,
    tree: &ResolveTree,
) -> GraphQLResult<(Clause, String)> {
    let schema = ctx.schema;
    let target = cypher_field.target.as_deref().unwrap_or_default();
    let members = schema.concrete_entities(target);
    if members.is_empty() {
        return Err(GraphQLError::schema(format!("unknown type {target}")));
    }
    let statement =
        cypher_field::bind_arguments(&cypher_field.statement, &tree.args, &mut ctx.params);
    let node = ctx.next_var(cypher::THIS);

    let mut clauses = vec![
        Clause::with_vars(&[variable]),
        cypher_field::statement_call(variable, statement),
        project_as(Expr::var(&cypher_field.column_name), &node),
    ];
    ctx.nested(|ctx| {
        if schema.is_abstract(target) {
            let mut branches = vec![];
            for member in &members {
                let mut projection =
                    project_fields(ctx, member, &member_fields(tree, member), &node)?;
                projection.entries.insert(
                    0,
                    MapEntry::Entry(
                        introspection::RESOLVE_TYPE.to_string(),
                        Expr::string(&member.name),
                    ),
                );
                let condition = label_predicate(&node, std::slice::from_ref(member))
                    .unwrap_or_else(|| Expr::bool(false));
                branches.push((condition, projection.to_map(&node)));
                clauses.extend(projection.subqueries);
            }
            clauses.push(project_as(
                Expr::Case {
                    branches,
                    default: None,
                },
                &node,
            ));
        } else {
            let entity = &members[0];
            let predicate = read_predicate(ctx, entity, &node, tree.arg(args::WHERE))?;
            clauses.extend(predicate.subqueries);
            clauses.extend(predicate.expr.map(Clause::with_star_where));
            let projection = build_projection(ctx, entity, tree, &node)?;
            let map = projection.to_map(&node);
            clauses.extend(projection.subqueries);
            clauses.push(project_as(map, &node));
        }
        Ok(())
    })?;

    let result = ctx.next_var("var");
    clauses.push(Clause::Return(Projection::items(vec![ReturnItem::new(
        collected(&node, field.list),
        &result,
    )])));
    Ok((Clause::Call(Statement::new(clauses)), result))
}

/// What a connection ranges over: the node, and the relationship reaching it when there
/// is one
pub struct ConnectionSource<'s> {
    pub entity: &'s Entity,
    pub node: String,
    pub relationship: Option<(&'s RelationshipField, String)>,
    /// `__typename` of an edge
    pub edge_typename: String,
}

/// Clauses turning matched rows of `source` into `{ edges, totalCount }`, bound to the
/// returned variable. Cursors and page info are added while shaping.
pub fn connection_clauses(
    ctx: &mut TranslationContext,
    source: &ConnectionSource,
    tree: &ResolveTree,
) -> GraphQLResult<(Vec<Clause>, String)> {
    let args = ConnectionArgs::from_tree(tree)?;
    let node = source.node.as_str();

    let mut edge_entries = vec![(connection::NODE.to_string(), Expr::var(node))];
    if let Some((_, edge)) = &source.relationship {
        edge_entries.push(("relationship".to_string(), Expr::var(edge)));
    }
    let mut clauses = vec![
        project_as(
            Expr::func("collect", vec![Expr::Map(edge_entries)]),
            cypher::EDGES,
        ),
        Clause::With {
            projection: Projection::items(vec![
                ReturnItem::var(cypher::EDGES),
                ReturnItem::new(
                    Expr::func("size", vec![Expr::var(cypher::EDGES)]),
                    cypher::TOTAL_COUNT,
                ),
            ]),
            filter: None,
        },
    ];

    let mut unpack = vec![ReturnItem::new(
        Expr::var("edge").dot(connection::NODE),
        node,
    )];
    if let Some((_, edge)) = &source.relationship {
        unpack.push(ReturnItem::new(Expr::var("edge").dot("relationship"), edge));
    }
    let mut page = vec![
        Clause::with_vars(&[cypher::EDGES]),
        Clause::Unwind {
            expr: Expr::var(cypher::EDGES),
            variable: "edge".to_string(),
        },
        Clause::With {
            projection: Projection::items(unpack),
            filter: None,
        },
    ];

    let edges_result = ctx.nested(|ctx| {
        let sort = connection_sort(ctx, source, tree)?;
        let (sort_subqueries, order_by) = sort;
        page.extend(sort_subqueries);
        let skip = args.skip().map(|skip| ctx.params.clause_for(json!(skip)));
        let limit = args.first.map(|first| ctx.params.clause_for(json!(first)));
        if !order_by.is_empty() || skip.is_some() || limit.is_some() {
            page.push(Clause::With {
                projection: Projection {
                    items: vec![ReturnItem::star()],
                    order_by,
                    skip,
                    limit,
                    ..Default::default()
                },
                filter: None,
            });
        }

        let mut fields = FieldMap::new();
        for edges in tree.find_fields(connection::EDGES) {
            for (alias, child) in edges.fields() {
                fields.entry(alias).or_insert(child);
            }
        }
        let mut entries = vec![];
        for (alias, child) in &fields {
            if child.name == connection::NODE {
                let projection = build_projection(ctx, source.entity, child, node)?;
                entries.push((alias.clone(), projection.to_map(node)));
                page.extend(projection.subqueries);
            } else if child.name == introspection::TYPENAME {
                entries.push((alias.clone(), Expr::string(&source.edge_typename)));
            } else if child.name == connection::CURSOR {
                continue;
            } else {
                let (rel, edge) = source.relationship.as_ref().ok_or_else(|| {
                    GraphQLError::field_not_found(&child.name, &source.edge_typename)
                })?;
                let property = rel
                    .properties
                    .iter()
                    .find(|p| p.name == child.name)
                    .ok_or_else(|| {
                        GraphQLError::field_not_found(&child.name, &source.edge_typename)
                    })?;
                let value = Expr::prop(edge, property.db_name());
                let value = if property.is_point() {
                    point_projection(value, property.list)
                } else {
                    value
                };
                entries.push((alias.clone(), value));
            }
        }
        let result = ctx.next_var("var");
        page.push(Clause::Return(Projection::items(vec![ReturnItem::new(
            Expr::func("collect", vec![Expr::Map(entries)]),
            &result,
        )])));
        Ok(result)
    })?;
    clauses.push(Clause::Call(Statement::new(page)));

    let result = ctx.next_var("var");
    clauses.push(Clause::Return(Projection::items(vec![ReturnItem::new(
        Expr::Map(vec![
            (connection::EDGES.to_string(), Expr::var(&edges_result)),
            (
                connection::TOTAL_COUNT.to_string(),
                Expr::var(cypher::TOTAL_COUNT),
            ),
        ]),
        &result,
    )])));
    Ok((clauses, result))
}

/// `sort: [{ node: {..} }, { edge: {..} }]`, or plain node sorts on root connections
fn connection_sort(
    ctx: &mut TranslationContext,
    source: &ConnectionSource,
    tree: &ResolveTree,
) -> GraphQLResult<(Vec<Clause>, Vec<OrderItem>)> {
    let mut subqueries = vec![];
    let mut order_by = vec![];
    let items = match tree.arg(pagination::SORT) {
        Some(sort) => crate::resolve_tree::as_list(sort),
        None => return Ok((subqueries, order_by)),
    };
    for item in items {
        let object = item.as_object().ok_or_else(|| {
            GraphQLError::validation("sort entries must be objects")
        })?;
        let nested = object.contains_key(args::NODE) || object.contains_key(args::EDGE);
        if !nested {
            for sort in SortField::parse_object(item)? {
                let (clauses, expr) = sort_expr(ctx, source.entity, &source.node, &sort.field)?;
                subqueries.extend(clauses);
                order_by.push(OrderItem {
                    expr,
                    descending: sort.descending,
                });
            }
            continue;
        }
        if let Some(node_sort) = object.get(args::NODE) {
            for sort in SortField::parse_object(node_sort)? {
                let (clauses, expr) = sort_expr(ctx, source.entity, &source.node, &sort.field)?;
                subqueries.extend(clauses);
                order_by.push(OrderItem {
                    expr,
                    descending: sort.descending,
                });
            }
        }
        if let Some(edge_sort) = object.get(args::EDGE) {
            let (rel, edge) = source.relationship.as_ref().ok_or_else(|| {
                GraphQLError::validation("edge sort requires a relationship connection")
            })?;
            for sort in SortField::parse_object(edge_sort)? {
                let property = rel
                    .properties
                    .iter()
                    .find(|p| p.name == sort.field)
                    .ok_or_else(|| {
                        GraphQLError::validation(format!(
                            "{} is not a sortable edge property",
                            sort.field
                        ))
                    })?;
                order_by.push(OrderItem {
                    expr: Expr::prop(edge, property.db_name()),
                    descending: sort.descending,
                });
            }
        }
    }
    Ok((subqueries, order_by))
}

fn connection_subquery(
    ctx: &mut TranslationContext,
    owner: &Entity,
    variable: &str,
    field: &Field,
    rel: &RelationshipField,
    tree: &ResolveTree,
) -> GraphQLResult<(Clause, String)> {
    if ctx.schema.is_abstract(&rel.target) {
        return Err(GraphQLError::validation(format!(
            "{}.{}{} targets the abstract type {}, which cannot be paginated",
            owner.name,
            field.name,
            connection::SUFFIX,
            rel.target
        )));
    }
    let target = target_entity(ctx, &rel.target)?;
    let edge = ctx.next_var(cypher::THIS);
    let node = ctx.next_var(cypher::THIS);
    let pattern = Pattern::relationship(
        NodePattern::var(variable),
        Some(&edge),
        &rel.rel_type,
        rel.direction.pattern_direction(),
        NodePattern::new(Some(&node), &target.labels()),
    );

    let mut predicate = match tree.arg(args::WHERE) {
        Some(where_) => compile_connection_where(ctx, rel, &edge, &node, where_)?,
        None => Predicate::default(),
    };
    predicate = predicate.and(read_predicate(ctx, &target, &node, None)?);

    let mut clauses = vec![Clause::with_vars(&[variable])];
    clauses.extend(match_clauses(pattern, predicate, false));
    let source = ConnectionSource {
        entity: &target,
        node: node.clone(),
        relationship: Some((rel, edge.clone())),
        edge_typename: format!("{}{}Relationship", owner.name, upper_first(&field.name)),
    };
    let (body, result) = connection_clauses(ctx, &source, tree)?;
    clauses.extend(body);
    Ok((Clause::Call(Statement::new(clauses)), result))
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

impl SortField {
    /// `{ title: ASC, released: DESC }`
    pub fn parse_object(value: &Value) -> GraphQLResult<Vec<SortField>> {
        let object = value
            .as_object()
            .ok_or_else(|| GraphQLError::validation("sort entries must be objects"))?;
        object
            .iter()
            .map(|(field, direction)| {
                let descending = match direction.as_str() {
                    Some("ASC") => false,
                    Some("DESC") => true,
                    _ => {
                        return Err(GraphQLError::validation(format!(
                            "sort direction of {field} must be ASC or DESC"
                        )))
                    }
                };
                Ok(SortField {
                    field: field.clone(),
                    descending,
                })
            })
            .collect()
    }
}

/// `options: { sort, limit, offset }` of a list field
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadOptions {
    pub sort: Vec<SortField>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ReadOptions {
    /// Reads `options`, or `sort`/`limit`/`offset` passed as arguments directly
    pub fn from_tree(tree: &ResolveTree, limits: &LimitConfig) -> GraphQLResult<Self> {
        let integer = |key: &str| -> GraphQLResult<Option<i64>> {
            match option_arg(tree, key) {
                None => Ok(None),
                Some(value) => match value.as_i64() {
                    Some(n) if n >= 0 => Ok(Some(n)),
                    _ => Err(GraphQLError::validation(format!(
                        "{key} must be a non-negative integer"
                    ))),
                },
            }
        };
        let mut sort = vec![];
        if let Some(items) = option_arg(tree, pagination::SORT) {
            for item in crate::resolve_tree::as_list(items) {
                sort.extend(SortField::parse_object(item)?);
            }
        }
        Ok(Self {
            sort,
            limit: limits.effective(integer(pagination::LIMIT)?),
            offset: integer(pagination::OFFSET)?,
        })
    }

    fn is_empty(&self) -> bool {
        self.sort.is_empty() && self.limit.is_none() && self.offset.is_none()
    }

    fn page(&self, ctx: &mut TranslationContext, order_by: Vec<OrderItem>) -> Clause {
        let skip = self.offset.map(|offset| ctx.params.clause_for(json!(offset)));
        let limit = self.limit.map(|limit| ctx.params.clause_for(json!(limit)));
        Clause::With {
            projection: Projection {
                items: vec![ReturnItem::star()],
                order_by,
                skip,
                limit,
                ..Default::default()
            },
            filter: None,
        }
    }

    /// `WITH * ORDER BY .. SKIP .. LIMIT ..` over nodes of `entity` bound to `variable`,
    /// preceded by the subqueries computed sort keys need
    pub fn clauses(
        &self,
        ctx: &mut TranslationContext,
        entity: &Entity,
        variable: &str,
    ) -> GraphQLResult<Vec<Clause>> {
        if self.is_empty() {
            return Ok(vec![]);
        }
        let mut clauses = vec![];
        let mut order_by = vec![];
        for sort in &self.sort {
            let (subqueries, expr) = sort_expr(ctx, entity, variable, &sort.field)?;
            clauses.extend(subqueries);
            order_by.push(OrderItem {
                expr,
                descending: sort.descending,
            });
        }
        clauses.push(self.page(ctx, order_by));
        Ok(clauses)
    }

    /// Same, for rows that are already projected maps
    fn projected_clauses(&self, ctx: &mut TranslationContext, variable: &str) -> Vec<Clause> {
        if self.is_empty() {
            return vec![];
        }
        let order_by = self
            .sort
            .iter()
            .map(|sort| OrderItem {
                expr: Expr::prop(variable, &sort.field),
                descending: sort.descending,
            })
            .collect();
        vec![self.page(ctx, order_by)]
    }
}

fn option_arg<'t>(tree: &'t ResolveTree, key: &str) -> Option<&'t Value> {
    match tree.arg(pagination::OPTIONS) {
        Some(options) => options.get(key).filter(|v| !v.is_null()),
        None => tree.arg(key),
    }
}

/// Sort key for `name` on `entity`, with the subquery a computed key needs
pub fn sort_expr(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    name: &str,
) -> GraphQLResult<(Vec<Clause>, Expr)> {
    let field = entity.field(name).ok_or_else(|| {
        GraphQLError::validation(format!("{}.{name} is not a sortable field", entity.name))
    })?;
    match &field.kind {
        FieldKind::Cypher(cypher_field) if cypher_field.target.is_none() && !field.list => {
            let (clause, bound) = cypher_field::scalar_subquery(
                ctx,
                variable,
                field,
                cypher_field,
                &Default::default(),
            );
            Ok((vec![clause], Expr::var(bound)))
        }
        _ if field.is_property() && !field.is_point() => {
            Ok((vec![], Expr::prop(variable, field.db_name())))
        }
        _ => Err(GraphQLError::validation(format!(
            "{}.{name} is not a sortable field",
            entity.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Dialect;
    use crate::config::Config;
    use crate::test_fixtures::{context, movie_schema};

    fn render(clauses: Vec<Clause>) -> String {
        Statement::new(clauses).render(Dialect::default())
    }

    #[test]
    fn scalar_fields_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let movie = schema.entity("Movie").unwrap();
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            vec![
                ResolveTree::new("title"),
                ResolveTree::new("released").with_alias("year"),
                ResolveTree::new("imdbId"),
                ResolveTree::new("__typename"),
            ],
        );
        let res = build_projection(&mut ctx, movie, &tree, "this");
        assert!(res.is_ok());
        let res = res.unwrap();
        assert!(res.subqueries.is_empty());
        assert_eq!(
            render(vec![Clause::Return(Projection::items(vec![ReturnItem::new(
                res.to_map("this"),
                "this"
            )]))]),
            "RETURN this { .title, year: this.released, imdbId: this.imdb_id, __typename: \"Movie\" } AS this"
        );
    }

    #[test]
    fn point_fields_test() {
        let single = point_projection(Expr::prop("this", "location"), false);
        let list = point_projection(Expr::prop("this", "locations"), true);
        assert_eq!(
            render(vec![Clause::Return(Projection::items(vec![
                ReturnItem::new(single, "a"),
                ReturnItem::new(list, "b"),
            ]))]),
            "RETURN CASE WHEN this.location IS NOT NULL THEN { point: this.location, crs: this.location.crs } ELSE NULL END AS a, [p IN this.locations | { point: p, crs: p.crs }] AS b"
        );
    }

    #[test]
    fn relationship_field_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let movie = schema.entity("Movie").unwrap();
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            vec![
                ResolveTree::new("title"),
                ResolveTree::new("actors")
                    .with_arg("where", json!({"name": "Keanu"}))
                    .with_fields("Actor", vec![ResolveTree::new("name")]),
            ],
        );
        let res = build_projection(&mut ctx, movie, &tree, "this").unwrap();
        assert_eq!(res.subqueries.len(), 1);
        assert_eq!(
            render(res.subqueries.clone()),
            "CALL {\n    WITH this\n    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor:Person)\n    WHERE this1.name = $param0\n    WITH this1 { .name } AS this1\n    RETURN collect(this1) AS var2\n}"
        );
        assert_eq!(res.entries[1], MapEntry::Entry("actors".to_string(), Expr::var("var2")));
    }

    #[test]
    fn singular_relationship_uses_head_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let series = schema.entity("Series").unwrap();
        let tree = ResolveTree::new("series").with_fields(
            "Series",
            vec![ResolveTree::new("director")
                .with_fields("Person", vec![ResolveTree::new("name")])],
        );
        let res = build_projection(&mut ctx, series, &tree, "this").unwrap();
        let text = render(res.subqueries);
        assert!(text.contains("MATCH (this)<-[this0:DIRECTED]-(this1:Person)"));
        assert!(text.ends_with("RETURN head(collect(this1)) AS var2\n}"));
    }

    #[test]
    fn relationship_options_test() {
        let schema = movie_schema();
        let config = Config {
            limits: LimitConfig {
                default: None,
                max: Some(10),
            },
            ..Config::default()
        };
        let mut ctx = context(&schema, &config);
        let movie = schema.entity("Movie").unwrap();
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            vec![ResolveTree::new("actors")
                .with_arg("options", json!({"sort": [{"name": "DESC"}], "limit": 50, "offset": 2}))
                .with_fields("Actor", vec![ResolveTree::new("name")])],
        );
        let res = build_projection(&mut ctx, movie, &tree, "this").unwrap();
        let text = render(res.subqueries);
        assert!(text.contains(
            "WITH *\n    ORDER BY this1.name DESC\n    SKIP $param0\n    LIMIT $param1"
        ));
        assert_eq!(ctx.params.params["param1"], json!(10));

        let tree = ResolveTree::new("actors").with_arg("options", json!({"limit": -1}));
        assert!(ReadOptions::from_tree(&tree, &LimitConfig::default())
            .unwrap_err()
            .is_validation());
        let tree = ResolveTree::new("actors").with_arg("options", json!({"sort": [{"name": "UP"}]}));
        assert!(ReadOptions::from_tree(&tree, &LimitConfig::default())
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn union_relationship_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let movie = schema.entity("Movie").unwrap();
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            vec![ResolveTree::new("related")
                .with_fields("Movie", vec![ResolveTree::new("title")])
                .with_fields("Genre", vec![ResolveTree::new("name")])],
        );
        let res = build_projection(&mut ctx, movie, &tree, "this").unwrap();
        let text = render(res.subqueries);
        assert!(text.contains(
            "WITH this2 { __resolveType: \"Movie\", .title } AS this2\n        RETURN this2 AS var0"
        ));
        assert!(text.contains("\n        UNION\n"));
        assert!(text.contains("WITH this4 { __resolveType: \"Genre\", .name } AS this4"));
        assert!(text.ends_with("WITH var0\n    RETURN collect(var0) AS var0\n}"));
        assert_eq!(res.entries[0], MapEntry::Entry("related".to_string(), Expr::var("var0")));
    }

    #[test]
    fn union_where_selects_members_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let movie = schema.entity("Movie").unwrap();
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            vec![ResolveTree::new("related")
                .with_arg("where", json!({"Genre": {"name": "Drama"}}))
                .with_fields("Genre", vec![ResolveTree::new("name")])],
        );
        let res = build_projection(&mut ctx, movie, &tree, "this").unwrap();
        let text = render(res.subqueries);
        assert!(!text.contains("UNION"));
        assert!(text.contains("WHERE this2.name = $param0"));
    }

    #[test]
    fn cypher_fields_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let movie = schema.entity("Movie").unwrap();
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            vec![
                ResolveTree::new("averageRating"),
                ResolveTree::new("recommended")
                    .with_arg("limit", json!(3))
                    .with_fields("Movie", vec![ResolveTree::new("title")]),
            ],
        );
        let res = build_projection(&mut ctx, movie, &tree, "this").unwrap();
        assert_eq!(res.subqueries.len(), 2);
        let text = render(vec![res.subqueries[1].clone()]);
        assert_eq!(
            text,
            "CALL {\n    WITH this\n    CALL {\n        WITH this\n        WITH this\n        MATCH (this)-[:IN_GENRE]->()<-[:IN_GENRE]-(m:Movie) RETURN m LIMIT $param0\n    }\n    WITH m AS this1\n    WITH this1 { .title } AS this1\n    RETURN collect(this1) AS var2\n}"
        );
        assert_eq!(ctx.params.params["param0"], json!(3));
        assert_eq!(
            res.entries,
            vec![
                MapEntry::Entry("averageRating".to_string(), Expr::var("this0")),
                MapEntry::Entry("recommended".to_string(), Expr::var("var2")),
            ]
        );
    }

    #[test]
    fn connection_field_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let movie = schema.entity("Movie").unwrap();
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            vec![ResolveTree::new("actorsConnection")
                .with_arg("first", json!(2))
                .with_arg("where", json!({"edge": {"screenTime_GT": 10}}))
                .with_arg("sort", json!([{"edge": {"screenTime": "DESC"}}]))
                .with_fields(
                    "MovieActorsConnection",
                    vec![
                        ResolveTree::new("totalCount"),
                        ResolveTree::new("edges").with_fields(
                            "MovieActorsRelationship",
                            vec![
                                ResolveTree::new("screenTime"),
                                ResolveTree::new("cursor"),
                                ResolveTree::new("node")
                                    .with_fields("Actor", vec![ResolveTree::new("name")]),
                            ],
                        ),
                    ],
                )],
        );
        let res = build_projection(&mut ctx, movie, &tree, "this").unwrap();
        let text = render(res.subqueries);
        assert_eq!(
            text,
            "CALL {\n    WITH this\n    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor:Person)\n    WHERE this0.screenTime > $param0\n    WITH collect({ node: this1, relationship: this0 }) AS edges\n    WITH edges, size(edges) AS totalCount\n    CALL {\n        WITH edges\n        UNWIND edges AS edge\n        WITH edge.node AS this1, edge.relationship AS this0\n        WITH *\n        ORDER BY this0.screenTime DESC\n        LIMIT $param1\n        RETURN collect({ screenTime: this0.screenTime, node: this1 { .name } }) AS var2\n    }\n    RETURN { edges: var2, totalCount: totalCount } AS var3\n}"
        );
        assert_eq!(
            res.entries[0],
            MapEntry::Entry("actorsConnection".to_string(), Expr::var("var3"))
        );
    }

    #[test]
    fn abstract_connection_is_rejected_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let movie = schema.entity("Movie").unwrap();
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            vec![ResolveTree::new("relatedConnection")],
        );
        let res = build_projection(&mut ctx, movie, &tree, "this");
        assert!(res.unwrap_err().is_validation());
    }

    #[test]
    fn unknown_field_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let movie = schema.entity("Movie").unwrap();
        let tree = ResolveTree::new("movies").with_fields("Movie", vec![ResolveTree::new("nope")]);
        let res = build_projection(&mut ctx, movie, &tree, "this");
        assert!(matches!(res, Err(GraphQLError::FieldNotFound { .. })));
    }

    #[test]
    fn global_id_and_auth_filter_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let genre = schema.entity("Genre").unwrap();
        let tree = ResolveTree::new("genres").with_fields("Genre", vec![ResolveTree::new("id")]);
        let res = build_projection(&mut ctx, genre, &tree, "this").unwrap();
        assert_eq!(
            res.entries,
            vec![MapEntry::Entry("id".to_string(), Expr::prop("this", "name"))]
        );

        let user = schema.entity("User").unwrap();
        let tree = ResolveTree::new("users").with_fields(
            "User",
            vec![ResolveTree::new("posts").with_fields("Post", vec![ResolveTree::new("content")])],
        );
        let res = build_projection(&mut ctx, user, &tree, "this").unwrap();
        let text = render(res.subqueries);
        assert!(text.contains(
            "WHERE ($isAuthenticated = true AND EXISTS { MATCH (this1)<-[:HAS_POST]-(this2:User) WHERE this2.id = $jwt.sub })"
        ));
    }
}
