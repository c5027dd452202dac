//! Aggregation selections, at the root (`moviesAggregate`) and over relationships
//! (`actorsAggregate`).
//!
//! Every selected aggregate runs in its own subquery over the same match, so each one
//! scans the matched rows independently and ordering for `shortest`/`longest` never leaks
//! between them.

use std::sync::Arc;

use crate::ast::{
    Clause, Expr, NodePattern, OrderItem, Pattern, Projection, ReturnItem, Statement,
};
use crate::auth::{filter_predicate, validate_predicate, AuthorizationOperation, ValidateWhen};
use crate::constants::{aggregate, args, cypher, introspection};
use crate::context::{FieldMeta, TranslationContext};
use crate::error::{GraphQLError, GraphQLResult};
use crate::filter::{compile_where, Predicate};
use crate::projection::match_clauses;
use crate::resolve_tree::ResolveTree;
use crate::schema::{upper_first, Entity, Field, FieldKind, RelationshipField};

/// Which aggregators a field supports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AggregateKind {
    /// `shortest`, `longest`
    Text,
    /// `min`, `max`, `average`, `sum`
    Numeric,
    /// `min`, `max`
    Ordered,
}

impl AggregateKind {
    fn of(field: &Field) -> Option<Self> {
        match &field.kind {
            FieldKind::Primitive { scalar } if scalar.is_textual() => Some(Self::Text),
            FieldKind::Primitive { scalar } if scalar.is_numeric() => Some(Self::Numeric),
            FieldKind::Temporal { .. } => Some(Self::Ordered),
            _ => None,
        }
        .filter(|_| !field.list)
    }

    fn supports(&self, aggregator: &str) -> bool {
        match self {
            Self::Text => matches!(aggregator, aggregate::SHORTEST | aggregate::LONGEST),
            Self::Numeric => matches!(
                aggregator,
                aggregate::MIN | aggregate::MAX | aggregate::AVERAGE | aggregate::SUM
            ),
            Self::Ordered => matches!(aggregator, aggregate::MIN | aggregate::MAX),
        }
    }
}

/// Where input and authorization for aggregations over `entity`
fn aggregate_predicate(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    where_: Option<&serde_json::Value>,
) -> GraphQLResult<Predicate> {
    let mut predicate = Predicate::default();
    if let Some(where_) = where_ {
        predicate = predicate.and(compile_where(ctx, entity, variable, where_)?);
    }
    let operation = AuthorizationOperation::Aggregate;
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

fn subquery(base: &[Clause], mut tail: Vec<Clause>) -> Clause {
    let mut clauses = base.to_vec();
    clauses.append(&mut tail);
    Clause::Call(Statement::new(clauses))
}

fn return_as(expr: Expr, variable: &str) -> Clause {
    Clause::Return(Projection::items(vec![ReturnItem::new(expr, variable)]))
}

/// Subquery computing the aggregators selected on `field` of the node or relationship
/// named by the current aggregate field meta
fn field_aggregation(
    ctx: &mut TranslationContext,
    base: &[Clause],
    owner: &str,
    field: &Field,
    selection: &ResolveTree,
) -> GraphQLResult<(Clause, String)> {
    let target = match ctx.field_meta() {
        Some(FieldMeta::Aggregate { target_variable }) => target_variable.clone(),
        _ => return Err(GraphQLError::internal("aggregation outside of an aggregate field")),
    };
    let kind = AggregateKind::of(field).ok_or_else(|| {
        GraphQLError::validation(format!("{owner}.{} cannot be aggregated", field.name))
    })?;
    let value = Expr::prop(&target, field.db_name());
    let result = ctx.next_var("var");

    let mut entries = vec![];
    for (alias, aggregator) in selection.fields() {
        if aggregator.name == introspection::TYPENAME {
            continue;
        }
        if !kind.supports(&aggregator.name) {
            return Err(GraphQLError::validation(format!(
                "{} is not an aggregation of {owner}.{}",
                aggregator.name, field.name
            )));
        }
        let expr = match aggregator.name.as_str() {
            aggregate::LONGEST => Expr::func("head", vec![Expr::var("list")]),
            aggregate::SHORTEST => Expr::func("last", vec![Expr::var("list")]),
            aggregate::AVERAGE => Expr::func("avg", vec![value.clone()]),
            other => Expr::func(other, vec![value.clone()]),
        };
        entries.push((alias, expr));
    }

    let tail = if kind == AggregateKind::Text {
        vec![
            Clause::With {
                projection: Projection {
                    items: vec![ReturnItem::var(&target)],
                    order_by: vec![OrderItem {
                        expr: Expr::func("size", vec![value.clone()]),
                        descending: true,
                    }],
                    ..Default::default()
                },
                filter: None,
            },
            Clause::With {
                projection: Projection::items(vec![ReturnItem::new(
                    Expr::func("collect", vec![value]),
                    "list",
                )]),
                filter: None,
            },
            return_as(Expr::Map(entries), &result),
        ]
    } else {
        vec![return_as(Expr::Map(entries), &result)]
    };
    Ok((subquery(base, tail), result))
}

/// Subqueries and map entries for a selection of `count` and per-field aggregates.
/// `target_variable` is what the fields are read from, `count_variable` what is counted.
fn aggregation_selection(
    ctx: &mut TranslationContext,
    base: &[Clause],
    owner: &str,
    fields: &[Arc<Field>],
    selection: &ResolveTree,
    target_variable: &str,
    count_variable: Option<&str>,
) -> GraphQLResult<(Vec<Clause>, Vec<(String, Expr)>)> {
    let meta = FieldMeta::Aggregate {
        target_variable: target_variable.to_string(),
    };
    ctx.with_field_meta(meta, |ctx| {
        let mut subqueries = vec![];
        let mut entries = vec![];
        for (alias, child) in selection.fields() {
            if child.name == introspection::TYPENAME {
                entries.push((alias, Expr::string(selection_typename(owner))));
                continue;
            }
            if let (aggregate::COUNT, Some(counted)) = (child.name.as_str(), count_variable) {
                let result = ctx.next_var("var");
                subqueries.push(subquery(
                    base,
                    vec![return_as(
                        Expr::func("count", vec![Expr::var(counted)]),
                        &result,
                    )],
                ));
                entries.push((alias, Expr::var(result)));
                continue;
            }
            let field = fields
                .iter()
                .find(|f| f.name == child.name)
                .ok_or_else(|| {
                    GraphQLError::validation(format!(
                        "{} is not an aggregatable field of {owner}",
                        child.name
                    ))
                })?;
            let (clause, result) = field_aggregation(ctx, base, owner, field, &child)?;
            subqueries.push(clause);
            entries.push((alias, Expr::var(result)));
        }
        Ok((subqueries, entries))
    })
}

fn selection_typename(owner: &str) -> String {
    format!("{owner}AggregateSelection")
}

/// `<plural>Aggregate(where)` as a complete statement
pub fn root_aggregate(
    ctx: &mut TranslationContext,
    entity: &Entity,
    tree: &ResolveTree,
    variable: &str,
) -> GraphQLResult<Statement> {
    let pattern = Pattern::node(NodePattern::new(Some(variable), &entity.labels()));
    let predicate = aggregate_predicate(ctx, entity, variable, tree.arg(args::WHERE))?;
    let base = match_clauses(pattern, predicate, false);
    let (subqueries, entries) = aggregation_selection(
        ctx,
        &base,
        &entity.name,
        &entity.fields,
        tree,
        variable,
        Some(variable),
    )?;
    let mut statement = Statement::new(subqueries);
    statement.push(return_as(Expr::Map(entries), cypher::THIS));
    Ok(statement)
}

/// `<relationship>Aggregate(where) { count node {..} edge {..} }` of the node bound to
/// `variable`
pub fn relationship_aggregate(
    ctx: &mut TranslationContext,
    owner: &Entity,
    field: &Field,
    rel: &RelationshipField,
    variable: &str,
    tree: &ResolveTree,
) -> GraphQLResult<(Clause, String)> {
    let target = ctx.schema.entity(&rel.target).cloned().ok_or_else(|| {
        GraphQLError::validation(format!(
            "{}.{}{} cannot aggregate over the abstract type {}",
            owner.name,
            field.name,
            aggregate::SUFFIX,
            rel.target
        ))
    })?;
    let edge = ctx.next_var(cypher::THIS);
    let node = ctx.next_var(cypher::THIS);
    let pattern = Pattern::relationship(
        NodePattern::var(variable),
        Some(&edge),
        &rel.rel_type,
        rel.direction.pattern_direction(),
        NodePattern::new(Some(&node), &target.labels()),
    );
    let prefix = format!("{}{}{}", owner.name, target.name, upper_first(&field.name));

    let (subqueries, entries) = ctx.nested(|ctx| {
        let predicate = aggregate_predicate(ctx, &target, &node, tree.arg(args::WHERE))?;
        let mut base = vec![Clause::with_vars(&[variable])];
        base.extend(match_clauses(pattern, predicate, false));

        let mut subqueries = vec![];
        let mut entries = vec![];
        for (alias, child) in tree.fields() {
            match child.name.as_str() {
                aggregate::COUNT => {
                    let result = ctx.next_var("var");
                    subqueries.push(subquery(
                        &base,
                        vec![return_as(Expr::func("count", vec![Expr::var(&node)]), &result)],
                    ));
                    entries.push((alias, Expr::var(result)));
                }
                aggregate::NODE => {
                    let (clauses, inner) = aggregation_selection(
                        ctx,
                        &base,
                        &format!("{prefix}Node"),
                        &target.fields,
                        &child,
                        &node,
                        None,
                    )?;
                    subqueries.extend(clauses);
                    entries.push((alias, Expr::Map(inner)));
                }
                aggregate::EDGE => {
                    let (clauses, inner) = aggregation_selection(
                        ctx,
                        &base,
                        &format!("{prefix}Edge"),
                        &rel.properties,
                        &child,
                        &edge,
                        None,
                    )?;
                    subqueries.extend(clauses);
                    entries.push((alias, Expr::Map(inner)));
                }
                introspection::TYPENAME => {
                    entries.push((alias, Expr::string(format!("{prefix}AggregationSelection"))));
                }
                other => {
                    return Err(GraphQLError::validation(format!(
                        "{other} is not a field of {prefix}AggregationSelection"
                    )))
                }
            }
        }
        Ok((subqueries, entries))
    })?;

    let result = ctx.next_var("var");
    let mut clauses = vec![Clause::with_vars(&[variable])];
    clauses.extend(subqueries);
    clauses.push(return_as(Expr::Map(entries), &result));
    Ok((Clause::Call(Statement::new(clauses)), result))
}
