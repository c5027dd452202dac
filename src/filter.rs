//! Compiles `where` inputs into Cypher predicates.
//!
//! A where input is an object whose keys are `AND`, `OR`, `NOT` or `<field>[_OPERATOR]`.
//! Property keys compare the bound node, relationship keys become existence checks over
//! the relationship pattern and `@cypher` keys are evaluated by a subquery first. Every
//! value is bound as a parameter, never inlined.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::ast::{BinaryOperator, Clause, Expr, NodePattern, Pattern, QuantifierKind};
use crate::constants::{aggregate, args, connection, cypher, logical};
use crate::context::TranslationContext;
use crate::cursor::from_global_id;
use crate::cypher_field;
use crate::error::{GraphQLError, GraphQLResult};
use crate::schema::{Entity, Field, FieldKind, PrimitiveScalar, RelationshipField, TemporalKind};

/// A compiled filter. `expr` is `None` when the filter accepts everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Predicate {
    pub expr: Option<Expr>,
    /// Clauses that must run before `expr` can be evaluated
    pub subqueries: Vec<Clause>,
}

impl Predicate {
    pub fn new(expr: Option<Expr>) -> Self {
        Self {
            expr,
            subqueries: vec![],
        }
    }

    pub fn and(mut self, other: Predicate) -> Self {
        self.subqueries.extend(other.subqueries);
        self.expr = Expr::and_all(self.expr.into_iter().chain(other.expr).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.expr.is_none() && self.subqueries.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Equal,
    Not,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Matches,
    Lt,
    Lte,
    Gt,
    Gte,
    Distance,
    Includes,
    NotIncludes,
}

// negated forms first so `_NOT_IN` is never read as `_IN`
const OPERATOR_SUFFIXES: &[(&str, Operator)] = &[
    ("_NOT_IN", Operator::NotIn),
    ("_NOT_CONTAINS", Operator::NotContains),
    ("_NOT_STARTS_WITH", Operator::NotStartsWith),
    ("_NOT_ENDS_WITH", Operator::NotEndsWith),
    ("_NOT_INCLUDES", Operator::NotIncludes),
    ("_NOT", Operator::Not),
    ("_IN", Operator::In),
    ("_CONTAINS", Operator::Contains),
    ("_STARTS_WITH", Operator::StartsWith),
    ("_ENDS_WITH", Operator::EndsWith),
    ("_MATCHES", Operator::Matches),
    ("_LTE", Operator::Lte),
    ("_LT", Operator::Lt),
    ("_GTE", Operator::Gte),
    ("_GT", Operator::Gt),
    ("_DISTANCE", Operator::Distance),
    ("_INCLUDES", Operator::Includes),
];

impl Operator {
    /// Splits `released_GTE` into `("released", Gte)`
    pub fn split(key: &str) -> (&str, Operator) {
        for (suffix, op) in OPERATOR_SUFFIXES {
            if let Some(base) = key.strip_suffix(suffix) {
                if !base.is_empty() {
                    return (base, *op);
                }
            }
        }
        (key, Operator::Equal)
    }

    pub fn suffix(&self) -> &'static str {
        OPERATOR_SUFFIXES
            .iter()
            .find(|(_, op)| op == self)
            .map(|(suffix, _)| *suffix)
            .unwrap_or("")
    }

    /// The positive operator and whether the clause must be negated
    pub fn positive(self) -> (Operator, bool) {
        match self {
            Self::Not => (Self::Equal, true),
            Self::NotIn => (Self::In, true),
            Self::NotContains => (Self::Contains, true),
            Self::NotStartsWith => (Self::StartsWith, true),
            Self::NotEndsWith => (Self::EndsWith, true),
            Self::NotIncludes => (Self::Includes, true),
            other => (other, false),
        }
    }

    fn binary(self) -> Option<BinaryOperator> {
        Some(match self {
            Self::Equal | Self::Distance => BinaryOperator::Eq,
            Self::In => BinaryOperator::In,
            Self::Contains => BinaryOperator::Contains,
            Self::StartsWith => BinaryOperator::StartsWith,
            Self::EndsWith => BinaryOperator::EndsWith,
            Self::Matches => BinaryOperator::Matches,
            Self::Lt => BinaryOperator::Lt,
            Self::Lte => BinaryOperator::Lte,
            Self::Gt => BinaryOperator::Gt,
            Self::Gte => BinaryOperator::Gte,
            _ => return None,
        })
    }

    fn is_range(&self) -> bool {
        matches!(self, Self::Lt | Self::Lte | Self::Gt | Self::Gte)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Quantifier {
    Some,
    None,
    All,
    Single,
    /// `_NOT`, same as `None` except when compared with null
    Not,
}

fn split_quantifier(key: &str) -> Option<(&str, Quantifier)> {
    [
        ("_SOME", Quantifier::Some),
        ("_NONE", Quantifier::None),
        ("_ALL", Quantifier::All),
        ("_SINGLE", Quantifier::Single),
        ("_NOT", Quantifier::Not),
    ]
    .into_iter()
    .find_map(|(suffix, q)| key.strip_suffix(suffix).map(|base| (base, q)))
}

#[derive(Clone, Copy, Debug, Default)]
struct Options {
    /// Splice `"$jwt.claim"` string values as references to the JWT parameter
    jwt_references: bool,
}

/// What a where object is compiled against
struct Scope<'s> {
    owner: &'s str,
    fields: &'s [Arc<Field>],
    variable: &'s str,
    entity: Option<&'s Entity>,
}

impl<'s> Scope<'s> {
    fn entity(entity: &'s Entity, variable: &'s str) -> Self {
        Self {
            owner: &entity.name,
            fields: &entity.fields,
            variable,
            entity: Some(entity),
        }
    }

    fn field(&self, name: &str) -> Option<&'s Arc<Field>> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Compiles the `where` argument of a field returning `entity`, bound to `variable`
pub fn compile_where(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    where_: &Value,
) -> GraphQLResult<Predicate> {
    compile_object(ctx, &Scope::entity(entity, variable), where_, Options::default())
}

/// Like [`compile_where`], additionally resolving `"$jwt.claim"` values
pub fn compile_authorization_where(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    where_: &Value,
) -> GraphQLResult<Predicate> {
    let options = Options {
        jwt_references: true,
    };
    compile_object(ctx, &Scope::entity(entity, variable), where_, options)
}

/// Compiles a where over relationship properties bound to `variable`
pub fn compile_edge_where(
    ctx: &mut TranslationContext,
    rel: &RelationshipField,
    variable: &str,
    where_: &Value,
) -> GraphQLResult<Predicate> {
    let scope = Scope {
        owner: &rel.rel_type,
        fields: &rel.properties,
        variable,
        entity: None,
    };
    compile_object(ctx, &scope, where_, Options::default())
}

/// Compiles the `where` of a connection field, `{ node, edge, AND, OR, NOT }`
pub fn compile_connection_where(
    ctx: &mut TranslationContext,
    rel: &RelationshipField,
    edge_variable: &str,
    target_variable: &str,
    where_: &Value,
) -> GraphQLResult<Predicate> {
    connection_object(
        ctx,
        rel,
        edge_variable,
        target_variable,
        where_,
        Options::default(),
    )
}

/// Compiles a where over the claims of the decoded JWT, bound as `$jwt`
pub fn compile_jwt_where(ctx: &mut TranslationContext, where_: &Value) -> GraphQLResult<Predicate> {
    let object = as_object(where_, cypher::JWT)?;
    let mut predicate = Predicate::default();
    for (key, value) in object {
        let next = match key.as_str() {
            logical::AND | logical::OR | logical::NOT => {
                compile_logical(ctx, key, value, cypher::JWT, &mut |ctx, v| {
                    compile_jwt_where(ctx, v)
                })?
            }
            _ => {
                let (claim, op) = Operator::split(key);
                let (op, negated) = op.positive();
                let left = jwt_claim(claim);
                let expr = if value.is_null() && op == Operator::Equal {
                    Expr::is_null(left)
                } else {
                    let param = ctx.params.clause_for(value.clone());
                    match op {
                        Operator::Includes => Expr::binary(param, BinaryOperator::In, left),
                        Operator::Matches if !ctx.config.filters.regex => {
                            return Err(disabled(cypher::JWT, claim, op))
                        }
                        other => {
                            let binary = other.binary().ok_or_else(|| {
                                GraphQLError::validation(format!(
                                    "unsupported operator on jwt claim {key}"
                                ))
                            })?;
                            Expr::binary(left, binary, param)
                        }
                    }
                };
                Predicate::new(Some(negate(expr, negated)))
            }
        };
        predicate = predicate.and(next);
    }
    Ok(predicate)
}

/// `$jwt.a.b` for the claim path `a.b`
pub fn jwt_claim(path: &str) -> Expr {
    path.split('.')
        .fold(Expr::param(cypher::JWT), |expr, key| expr.dot(key))
}

fn as_object<'v>(value: &'v Value, owner: &str) -> GraphQLResult<&'v Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| {
            GraphQLError::validation(format!("where input for {owner} must be an object"))
        })
}

fn negate(expr: Expr, negated: bool) -> Expr {
    if negated {
        Expr::not(expr)
    } else {
        expr
    }
}

fn disabled(owner: &str, field: &str, op: Operator) -> GraphQLError {
    GraphQLError::validation(format!(
        "{owner}.{field}{} is not an enabled filter",
        op.suffix()
    ))
}

type Compile<'f, 'a> =
    dyn FnMut(&mut TranslationContext<'a>, &Value) -> GraphQLResult<Predicate> + 'f;

/// `AND`, `OR` and `NOT` over any where object kind
fn compile_logical<'a>(
    ctx: &mut TranslationContext<'a>,
    key: &str,
    value: &Value,
    owner: &str,
    compile: &mut Compile<'_, 'a>,
) -> GraphQLResult<Predicate> {
    match key {
        logical::NOT => {
            if value.is_null() {
                return Ok(Predicate::default());
            }
            let inner = ctx.deeper(|ctx| compile(ctx, value))?;
            Ok(Predicate {
                expr: inner.expr.map(Expr::not),
                subqueries: inner.subqueries,
            })
        }
        _ => {
            let items = value.as_array().ok_or_else(|| {
                GraphQLError::validation(format!("{key} on {owner} expects a list"))
            })?;
            let mut subqueries = vec![];
            let mut exprs = vec![];
            let mut unconditional = false;
            for item in items {
                let inner = ctx.deeper(|ctx| compile(ctx, item))?;
                subqueries.extend(inner.subqueries);
                match inner.expr {
                    Some(expr) => exprs.push(expr),
                    None => unconditional = true,
                }
            }
            let expr = if key == logical::AND {
                Expr::and_all(exprs)
            } else if unconditional {
                None
            } else if exprs.is_empty() {
                Some(Expr::bool(false))
            } else {
                Expr::or_all(exprs)
            };
            Ok(Predicate { expr, subqueries })
        }
    }
}

fn compile_object(
    ctx: &mut TranslationContext,
    scope: &Scope,
    where_: &Value,
    options: Options,
) -> GraphQLResult<Predicate> {
    let object = as_object(where_, scope.owner)?;
    let mut predicate = Predicate::default();
    for (key, value) in object {
        let next = match key.as_str() {
            logical::AND | logical::OR | logical::NOT => {
                compile_logical(ctx, key, value, scope.owner, &mut |ctx, v| {
                    compile_object(ctx, scope, v, options)
                })?
            }
            _ => compile_key(ctx, scope, key, value, options)?,
        };
        predicate = predicate.and(next);
    }
    Ok(predicate)
}

fn compile_key(
    ctx: &mut TranslationContext,
    scope: &Scope,
    key: &str,
    value: &Value,
    options: Options,
) -> GraphQLResult<Predicate> {
    if key == args::ID {
        if let Some((entity, field)) = scope.entity.and_then(|e| e.global_id().map(|f| (e, f))) {
            return compile_global_id(ctx, scope, entity, field, value);
        }
    }
    if let Some(field) = scope.field(key) {
        return match &field.kind {
            FieldKind::Relationship(rel) => {
                compile_relationship(ctx, scope, rel, Quantifier::Some, value, options)
            }
            _ => compile_property(ctx, scope, field, Operator::Equal, value, options),
        };
    }
    let (base, quantifier) = split_quantifier(key).unwrap_or((key, Quantifier::Some));
    if let Some(rel) = scope.field(base).and_then(|f| f.relationship()) {
        return compile_relationship(ctx, scope, rel, quantifier, value, options);
    }
    if let Some(rel) = base
        .strip_suffix(connection::SUFFIX)
        .and_then(|b| scope.field(b))
        .and_then(|f| f.relationship())
    {
        return compile_connection(ctx, scope, rel, quantifier, value, options);
    }
    if let Some(rel) = key
        .strip_suffix(aggregate::SUFFIX)
        .and_then(|b| scope.field(b))
        .and_then(|f| f.relationship())
    {
        return compile_aggregate(ctx, scope, rel, value);
    }
    let (base, op) = Operator::split(key);
    match scope.field(base) {
        Some(field) if op != Operator::Equal && field.relationship().is_none() => {
            compile_property(ctx, scope, field, op, value, options)
        }
        _ => Err(GraphQLError::validation(format!(
            "unknown filter {key} on {}",
            scope.owner
        ))),
    }
}

fn compile_global_id(
    ctx: &mut TranslationContext,
    scope: &Scope,
    entity: &Entity,
    field: &Field,
    value: &Value,
) -> GraphQLResult<Predicate> {
    let id = value
        .as_str()
        .ok_or_else(|| GraphQLError::validation("id filter expects a global id string"))?;
    let (type_name, raw) = from_global_id(id)
        .ok_or_else(|| GraphQLError::validation(format!("invalid global id {id}")))?;
    if type_name != entity.name {
        return Ok(Predicate::new(Some(Expr::bool(false))));
    }
    let raw = match field.kind {
        FieldKind::Primitive { scalar } if scalar.is_numeric() => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(raw)),
        _ => Value::String(raw),
    };
    let param = ctx.params.clause_for(raw);
    Ok(Predicate::new(Some(Expr::eq(
        Expr::prop(scope.variable, field.db_name()),
        param,
    ))))
}

fn ensure_allowed(
    ctx: &TranslationContext,
    owner: &str,
    field: &Field,
    op: Operator,
) -> GraphQLResult<()> {
    use Operator::*;
    let textual = |ctx: &TranslationContext, op: Operator| match op {
        Equal | In | Contains | StartsWith | EndsWith => Ok(true),
        Matches if ctx.config.filters.regex => Ok(true),
        Lt | Lte | Gt | Gte if ctx.config.filters.string_range => Ok(true),
        Matches | Lt | Lte | Gt | Gte => Err(disabled(owner, &field.name, op)),
        _ => Ok(false),
    };
    let allowed = match &field.kind {
        _ if field.list && field.cypher().is_none() => matches!(op, Equal | Includes),
        FieldKind::Primitive { scalar } if scalar.is_textual() => textual(ctx, op)?,
        FieldKind::Primitive {
            scalar: PrimitiveScalar::Boolean,
        } => op == Equal,
        FieldKind::Primitive { .. } => op == Equal || op == In || op.is_range(),
        FieldKind::Enum { .. } | FieldKind::CustomScalar { .. } => matches!(op, Equal | In),
        FieldKind::Temporal { .. } => op == Equal || op == In || op.is_range(),
        FieldKind::Point { .. } => op == Equal || op == In || op == Distance || op.is_range(),
        FieldKind::Cypher(c) => match c.scalar {
            Some(scalar) if scalar.is_textual() => textual(ctx, op)?,
            Some(PrimitiveScalar::Boolean) => op == Equal,
            Some(_) => op == Equal || op == In || op.is_range(),
            None => false,
        },
        FieldKind::Relationship(_) => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(GraphQLError::validation(format!(
            "{owner}.{}{} is not a supported filter",
            field.name,
            op.suffix()
        )))
    }
}

fn compile_property(
    ctx: &mut TranslationContext,
    scope: &Scope,
    field: &Field,
    op: Operator,
    value: &Value,
    options: Options,
) -> GraphQLResult<Predicate> {
    let (op, negated) = op.positive();
    ensure_allowed(ctx, scope.owner, field, op)?;

    let mut subqueries = vec![];
    let property = match field.cypher() {
        Some(cypher_field) => {
            let (clause, variable) = cypher_field::scalar_subquery(
                ctx,
                scope.variable,
                field,
                cypher_field,
                &IndexMap::new(),
            );
            subqueries.push(clause);
            Expr::var(variable)
        }
        None => Expr::prop(scope.variable, field.db_name()),
    };

    let expr = if value.is_null() {
        if op != Operator::Equal {
            return Err(GraphQLError::validation(format!(
                "{}.{}{} does not accept null",
                scope.owner,
                field.name,
                op.suffix()
            )));
        }
        if negated {
            Expr::is_not_null(property)
        } else {
            Expr::is_null(property)
        }
    } else {
        negate(comparison(ctx, field, property, op, value, options)?, negated)
    };
    Ok(Predicate {
        expr: Some(expr),
        subqueries,
    })
}

fn bind(ctx: &mut TranslationContext, value: &Value, options: Options) -> Expr {
    if options.jwt_references {
        if let Some(claim) = value.as_str().and_then(|s| s.strip_prefix("$jwt.")) {
            return jwt_claim(claim);
        }
    }
    ctx.params.clause_for(value.clone())
}

/// `[p IN source | function(p)]`
fn map_list(source: Expr, function: &str) -> Expr {
    Expr::ListComprehension {
        variable: "p".to_string(),
        source: Box::new(source),
        filter: None,
        map: Some(Box::new(Expr::func(function, vec![Expr::var("p")]))),
    }
}

fn comparison(
    ctx: &mut TranslationContext,
    field: &Field,
    property: Expr,
    op: Operator,
    value: &Value,
    options: Options,
) -> GraphQLResult<Expr> {
    let param = bind(ctx, value, options);
    let binary = |op: Operator| {
        op.binary().ok_or_else(|| {
            GraphQLError::validation(format!("unsupported operator on {}", field.name))
        })
    };
    let is_list = field.list && field.cypher().is_none();
    Ok(match (&field.kind, is_list) {
        (FieldKind::Point { .. }, true) => match op {
            Operator::Includes => Expr::binary(
                Expr::func("point", vec![param]),
                BinaryOperator::In,
                property,
            ),
            _ => Expr::eq(property, map_list(param, "point")),
        },
        (_, true) => match op {
            Operator::Includes => Expr::binary(param, BinaryOperator::In, property),
            _ => Expr::eq(property, param),
        },
        (FieldKind::Point { .. }, false) => match op {
            Operator::Equal => Expr::eq(property, Expr::func("point", vec![param])),
            Operator::In => Expr::binary(property, BinaryOperator::In, map_list(param, "point")),
            _ => Expr::binary(
                Expr::Distance(
                    Box::new(property),
                    Box::new(Expr::func("point", vec![param.clone().dot("point")])),
                ),
                binary(op)?,
                param.dot("distance"),
            ),
        },
        (
            FieldKind::Temporal {
                temporal: TemporalKind::Duration,
            },
            false,
        ) => match op {
            Operator::Equal => Expr::eq(property, Expr::func("duration", vec![param])),
            Operator::In => Expr::binary(property, BinaryOperator::In, map_list(param, "duration")),
            _ => Expr::binary(
                Expr::binary(Expr::func("datetime", vec![]), BinaryOperator::Add, property),
                binary(op)?,
                Expr::binary(
                    Expr::func("datetime", vec![]),
                    BinaryOperator::Add,
                    Expr::func("duration", vec![param]),
                ),
            ),
        },
        (FieldKind::Temporal { temporal }, false) => match op {
            Operator::In => Expr::binary(
                property,
                BinaryOperator::In,
                map_list(param, temporal.constructor()),
            ),
            _ => Expr::binary(
                property,
                binary(op)?,
                Expr::func(temporal.constructor(), vec![param]),
            ),
        },
        _ => Expr::binary(property, binary(op)?, param),
    })
}

fn relationship_pattern(
    ctx: &TranslationContext,
    variable: &str,
    edge_variable: Option<&str>,
    rel: &RelationshipField,
    target_variable: &str,
) -> Pattern {
    let labels = ctx
        .schema
        .entity(&rel.target)
        .map(|e| e.labels())
        .unwrap_or_default();
    Pattern::relationship(
        NodePattern::var(variable),
        edge_variable,
        &rel.rel_type,
        rel.direction.pattern_direction(),
        NodePattern::new(Some(target_variable), &labels),
    )
}

/// Label check matching any of `entities`
pub fn label_predicate(variable: &str, entities: &[Arc<Entity>]) -> Option<Expr> {
    Expr::or_all(
        entities
            .iter()
            .filter_map(|entity| {
                Expr::and_all(
                    entity
                        .labels()
                        .into_iter()
                        .map(|label| Expr::HasLabel {
                            variable: variable.to_string(),
                            label,
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}

/// Expressions inside a pattern predicate cannot depend on subqueries
fn inline(predicate: Predicate, owner: &str) -> GraphQLResult<Option<Expr>> {
    if predicate.subqueries.is_empty() {
        Ok(predicate.expr)
    } else {
        Err(GraphQLError::validation(format!(
            "computed fields of {owner} cannot be filtered across a relationship"
        )))
    }
}

/// Predicate on the node at the far end of `rel`, covering abstract targets
fn target_predicate(
    ctx: &mut TranslationContext,
    rel: &RelationshipField,
    variable: &str,
    where_: &Value,
    options: Options,
) -> GraphQLResult<Option<Expr>> {
    let schema = ctx.schema;
    if let Some(entity) = schema.entity(&rel.target) {
        let predicate = compile_object(ctx, &Scope::entity(entity, variable), where_, options)?;
        return inline(predicate, &entity.name);
    }
    if let Some(union) = schema.union(&rel.target) {
        let object = as_object(where_, &union.name)?;
        let mut branches = vec![];
        for (member, member_where) in object {
            let entity = union
                .members
                .iter()
                .find(|m| *m == member)
                .and_then(|m| schema.entity(m))
                .ok_or_else(|| {
                    GraphQLError::validation(format!("{member} is not a member of {}", union.name))
                })?;
            let predicate =
                compile_object(ctx, &Scope::entity(entity, variable), member_where, options)?;
            let predicate = inline(predicate, &entity.name)?;
            let labels = label_predicate(variable, std::slice::from_ref(entity));
            if let Some(branch) = Expr::and_all(labels.into_iter().chain(predicate).collect()) {
                branches.push(branch);
            }
        }
        return Ok(Expr::or_all(branches));
    }
    let interface = schema.interface(&rel.target).ok_or_else(|| {
        GraphQLError::schema(format!("unknown relationship target {}", rel.target))
    })?;
    let scope = Scope {
        owner: &interface.name,
        fields: &interface.fields,
        variable,
        entity: None,
    };
    let predicate = inline(compile_object(ctx, &scope, where_, options)?, &interface.name)?;
    let labels = label_predicate(variable, &schema.concrete_entities(&interface.name));
    Ok(Expr::and_all(labels.into_iter().chain(predicate).collect()))
}

fn quantify(
    ctx: &mut TranslationContext,
    quantifier: Quantifier,
    pattern: Pattern,
    inner: Option<Expr>,
) -> Option<Expr> {
    Some(match quantifier {
        Quantifier::Some => Expr::Exists {
            pattern,
            filter: inner.map(Box::new),
        },
        Quantifier::None | Quantifier::Not => Expr::not(Expr::Exists {
            pattern,
            filter: inner.map(Box::new),
        }),
        Quantifier::All => {
            let inner = inner?;
            Expr::And(vec![
                Expr::Exists {
                    pattern: pattern.clone(),
                    filter: Some(Box::new(inner.clone())),
                },
                Expr::not(Expr::Exists {
                    pattern,
                    filter: Some(Box::new(Expr::not(inner))),
                }),
            ])
        }
        Quantifier::Single => Expr::Quantifier {
            kind: QuantifierKind::Single,
            variable: ctx.next_var("var"),
            source: Box::new(Expr::PatternComprehension {
                pattern,
                filter: inner.map(Box::new),
                map: Box::new(Expr::int(1)),
            }),
            predicate: Box::new(Expr::bool(true)),
        },
    })
}

/// `rel: null` means no related node, `rel_NOT: null` means at least one
fn null_relationship(
    quantifier: Quantifier,
    pattern: Pattern,
    key: &str,
) -> GraphQLResult<Predicate> {
    let exists = Expr::Exists {
        pattern,
        filter: None,
    };
    match quantifier {
        Quantifier::Some => Ok(Predicate::new(Some(Expr::not(exists)))),
        Quantifier::Not => Ok(Predicate::new(Some(exists))),
        _ => Err(GraphQLError::validation(format!("{key} does not accept null"))),
    }
}

fn compile_relationship(
    ctx: &mut TranslationContext,
    scope: &Scope,
    rel: &RelationshipField,
    quantifier: Quantifier,
    value: &Value,
    options: Options,
) -> GraphQLResult<Predicate> {
    let target = ctx.next_var(cypher::THIS);
    let pattern = relationship_pattern(ctx, scope.variable, None, rel, &target);
    if value.is_null() {
        return null_relationship(quantifier, pattern, &rel.rel_type);
    }
    let inner = ctx.nested(|ctx| target_predicate(ctx, rel, &target, value, options))?;
    Ok(Predicate::new(quantify(ctx, quantifier, pattern, inner)))
}

fn compile_connection(
    ctx: &mut TranslationContext,
    scope: &Scope,
    rel: &RelationshipField,
    quantifier: Quantifier,
    value: &Value,
    options: Options,
) -> GraphQLResult<Predicate> {
    let edge = ctx.next_var(cypher::THIS);
    let target = ctx.next_var(cypher::THIS);
    let pattern = relationship_pattern(ctx, scope.variable, Some(&edge), rel, &target);
    if value.is_null() {
        return null_relationship(quantifier, pattern, &rel.rel_type);
    }
    let inner = ctx.nested(|ctx| {
        let predicate = connection_object(ctx, rel, &edge, &target, value, options)?;
        inline(predicate, &rel.rel_type)
    })?;
    Ok(Predicate::new(quantify(ctx, quantifier, pattern, inner)))
}

/// `{ node, edge, AND, OR, NOT }`
fn connection_object(
    ctx: &mut TranslationContext,
    rel: &RelationshipField,
    edge: &str,
    target: &str,
    value: &Value,
    options: Options,
) -> GraphQLResult<Predicate> {
    let owner = format!("{}Connection", rel.rel_type);
    let object = as_object(value, &owner)?;
    let mut predicate = Predicate::default();
    for (key, value) in object {
        let next = match key.as_str() {
            args::NODE => Predicate::new(target_predicate(ctx, rel, target, value, options)?),
            args::EDGE => {
                let scope = Scope {
                    owner: &rel.rel_type,
                    fields: &rel.properties,
                    variable: edge,
                    entity: None,
                };
                compile_object(ctx, &scope, value, options)?
            }
            logical::AND | logical::OR | logical::NOT => {
                compile_logical(ctx, key, value, &owner, &mut |ctx, v| {
                    connection_object(ctx, rel, edge, target, v, options)
                })?
            }
            other => {
                return Err(GraphQLError::validation(format!(
                    "unknown connection filter {other} on {owner}"
                )))
            }
        };
        predicate = predicate.and(next);
    }
    Ok(predicate)
}

fn compile_aggregate(
    ctx: &mut TranslationContext,
    scope: &Scope,
    rel: &RelationshipField,
    value: &Value,
) -> GraphQLResult<Predicate> {
    let target = ctx.next_var(cypher::THIS);
    let size = Expr::PatternSize {
        pattern: relationship_pattern(ctx, scope.variable, None, rel, &target),
        filter: None,
    };
    aggregate_object(ctx, &size, &rel.rel_type, value)
}

fn aggregate_object(
    ctx: &mut TranslationContext,
    size: &Expr,
    owner: &str,
    value: &Value,
) -> GraphQLResult<Predicate> {
    let object = as_object(value, owner)?;
    let mut predicate = Predicate::default();
    for (key, value) in object {
        let next = match key.as_str() {
            logical::AND | logical::OR | logical::NOT => {
                compile_logical(ctx, key, value, owner, &mut |ctx, v| {
                    aggregate_object(ctx, size, owner, v)
                })?
            }
            _ => {
                let (base, op) = Operator::split(key);
                let binary = match op {
                    Operator::Equal
                    | Operator::Lt
                    | Operator::Lte
                    | Operator::Gt
                    | Operator::Gte => op.binary(),
                    _ => None,
                };
                match (base, binary) {
                    (aggregate::COUNT, Some(binary)) if value.is_i64() => {
                        let param = ctx.params.clause_for(value.clone());
                        Predicate::new(Some(Expr::binary(size.clone(), binary, param)))
                    }
                    _ => {
                        return Err(GraphQLError::validation(format!(
                            "unsupported aggregation filter {key} on {owner}"
                        )))
                    }
                }
            }
        };
        predicate = predicate.and(next);
    }
    Ok(predicate)
}
