//! Create, update and delete translation.
//!
//! Every nested write becomes a `CALL` subquery importing the variables of the scope it
//! hangs off. With mutation metadata enabled each subquery returns its collected list and
//! the parent folds it into its own running list. Otherwise the subqueries are unit
//! subqueries and the row count of the parent is left untouched.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ast::{
    BinaryOperator, Clause, Expr, NodePattern, Pattern, PatternDirection, Projection,
    RelationshipPattern, ReturnItem, SetItem, Statement,
};
use crate::auth::{
    authentication_clause, filter_predicate, validate_clauses, AuthorizationOperation,
    ValidateWhen,
};
use crate::constants::{args, cypher, mutation, signals};
use crate::context::TranslationContext;
use crate::error::{GraphQLError, GraphQLResult};
use crate::filter::{compile_connection_where, compile_where, Predicate};
use crate::mutation_meta::{MutationMeta, ScopeId, Side, StageOptions, WithProjector};
use crate::projection::{build_projection, match_clauses};
use crate::resolve_tree::{as_list, ResolveTree};
use crate::schema::{
    Autogenerate, Direction, Entity, Field, FieldKind, PrimitiveScalar, RelationshipField,
    TemporalKind,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriteKind {
    Create,
    Update,
}

impl WriteKind {
    fn operation(&self) -> AuthorizationOperation {
        match self {
            Self::Create => AuthorizationOperation::Create,
            Self::Update => AuthorizationOperation::Update,
        }
    }

    fn nested_operations(&self) -> &'static [&'static str] {
        match self {
            Self::Create => &[args::CREATE, args::CONNECT, args::CONNECT_OR_CREATE],
            Self::Update => &[
                args::CREATE,
                args::CONNECT,
                args::CONNECT_OR_CREATE,
                args::DISCONNECT,
                args::DELETE,
                args::UPDATE,
            ],
        }
    }
}

const ARITHMETIC: [(&str, BinaryOperator); 6] = [
    ("_INCREMENT", BinaryOperator::Add),
    ("_DECREMENT", BinaryOperator::Sub),
    ("_ADD", BinaryOperator::Add),
    ("_SUBTRACT", BinaryOperator::Sub),
    ("_MULTIPLY", BinaryOperator::Mul),
    ("_DIVIDE", BinaryOperator::Div),
];

const PUSH: &str = "_PUSH";
const POP: &str = "_POP";

/// A node variable and the scope it is bound in
#[derive(Clone, Debug)]
struct Bound {
    entity: Arc<Entity>,
    variable: String,
    scope: ScopeId,
}

/// Relationship field being written through, resolved to one concrete target
struct Link<'l> {
    field: &'l Field,
    rel: &'l RelationshipField,
    target: Arc<Entity>,
}

/// `CREATE` one node per `input` element
pub fn create(
    ctx: &mut TranslationContext,
    entity: &Arc<Entity>,
    tree: &ResolveTree,
) -> GraphQLResult<Statement> {
    MutationBuilder::new(ctx, &[]).create(entity, tree)
}

/// `SET` on every node matching `where`, then the nested operations
pub fn update(
    ctx: &mut TranslationContext,
    entity: &Arc<Entity>,
    tree: &ResolveTree,
) -> GraphQLResult<Statement> {
    MutationBuilder::new(ctx, &[cypher::THIS]).update(entity, tree)
}

/// `DETACH DELETE` every node matching `where`, after the nested deletes
pub fn delete(
    ctx: &mut TranslationContext,
    entity: &Arc<Entity>,
    tree: &ResolveTree,
) -> GraphQLResult<Statement> {
    MutationBuilder::new(ctx, &[cypher::THIS]).delete(entity, tree)
}

struct MutationBuilder<'c, 'a> {
    ctx: &'c mut TranslationContext<'a>,
    projector: WithProjector,
    depth: usize,
}

impl<'c, 'a> MutationBuilder<'c, 'a> {
    fn new(ctx: &'c mut TranslationContext<'a>, variables: &[&str]) -> Self {
        let enabled = ctx.config.subscriptions;
        Self {
            ctx,
            projector: WithProjector::new(variables, enabled),
            depth: 0,
        }
    }

    fn create(mut self, entity: &Arc<Entity>, tree: &ResolveTree) -> GraphQLResult<Statement> {
        let root = self.projector.root();
        let mut statement = Statement::default();
        let mut variables = vec![];
        for input in tree.arg(args::INPUT).map(as_list).unwrap_or_default() {
            let input = input_object(input, args::INPUT)?;
            let variable = self.ctx.next_var(cypher::THIS);
            let scope = self.projector.create_child(root, &format!("create_{variable}"));
            self.projector.add_variable(scope, &variable);
            let bound = Bound {
                entity: entity.clone(),
                variable: variable.clone(),
                scope,
            };

            let (mut body, relationships) = self.create_node(&bound, input)?;
            body.extend(self.finish_node(&bound, relationships, WriteKind::Create)?);
            let mut items = vec![ReturnItem::var(&variable)];
            items.extend(self.projector.return_item(scope, StageOptions::default()));
            body.push(Clause::Return(Projection::items(items)));

            statement.push(Clause::Call(Statement::new(body)));
            self.projector.merge_with_child(root, scope);
            variables.push(variable);
        }

        let selection = mutation_selection(entity, tree);
        let mut nodes = vec![];
        for variable in &variables {
            let projection = build_projection(self.ctx, entity, &selection, variable)?;
            nodes.push(projection.to_map(variable));
            statement.extend(projection.subqueries);
        }
        let mut items = vec![ReturnItem::new(Expr::List(nodes), mutation::DATA)];
        items.extend(
            self.projector
                .final_list()
                .map(|list| ReturnItem::new(list, cypher::MUTATE_META)),
        );
        statement.push(Clause::Return(Projection::items(items)));
        Ok(statement)
    }

    fn update(mut self, entity: &Arc<Entity>, tree: &ResolveTree) -> GraphQLResult<Statement> {
        let operation = AuthorizationOperation::Update;
        let root = Bound {
            entity: entity.clone(),
            variable: cypher::THIS.to_string(),
            scope: self.projector.root(),
        };
        let mut statement = Statement::default();
        statement.extend(self.match_root(&root, tree, operation)?);

        let empty = Map::new();
        let input = match tree.arg(args::UPDATE) {
            Some(value) => input_object(value, args::UPDATE)?,
            None => &empty,
        };
        let (clauses, relationships) = self.update_node(&root, input)?;
        statement.extend(clauses);

        let mut written = vec![];
        for (field, value) in relationships {
            statement.extend(self.relationship_input(&root, &field, value, WriteKind::Update)?);
            written.push(field.name.clone());
        }
        for argument in [
            args::CREATE,
            args::CONNECT,
            args::CONNECT_OR_CREATE,
            args::DISCONNECT,
            args::DELETE,
        ] {
            if let Some(value) = tree.arg(argument) {
                statement.extend(self.field_operations(&root, argument, value, &mut written)?);
            }
        }
        statement.extend(self.cardinality_checks(entity, &root.variable, &written));
        statement.extend(validate_clauses(
            self.ctx,
            entity,
            &root.variable,
            operation,
            ValidateWhen::After,
        )?);

        let selection = mutation_selection(entity, tree);
        let projection = build_projection(self.ctx, entity, &selection, &root.variable)?;
        statement.extend(projection.subqueries.clone());
        let data = Expr::Function {
            name: "collect".to_string(),
            args: vec![projection.to_map(&root.variable)],
            distinct: true,
        };
        let mut items = vec![ReturnItem::new(data, mutation::DATA)];
        items.extend(self.projector.final_list().map(|list| {
            ReturnItem::new(Expr::flatten_collected(list), cypher::MUTATE_META)
        }));
        statement.push(Clause::Return(Projection::items(items)));
        Ok(statement)
    }

    fn delete(mut self, entity: &Arc<Entity>, tree: &ResolveTree) -> GraphQLResult<Statement> {
        let root = Bound {
            entity: entity.clone(),
            variable: cypher::THIS.to_string(),
            scope: self.projector.root(),
        };
        let mut statement = Statement::default();
        statement.extend(self.match_root(&root, tree, AuthorizationOperation::Delete)?);
        if let Some(value) = tree.arg(args::DELETE) {
            statement.extend(self.field_operations(&root, args::DELETE, value, &mut vec![])?);
        }
        statement.extend(self.detach_delete(&root)?);
        if let Some(list) = self.projector.final_list() {
            statement.push(Clause::Return(Projection::items(vec![ReturnItem::new(
                Expr::flatten_collected(list),
                cypher::MUTATE_META,
            )])));
        }
        Ok(statement)
    }

    /// Authentication, `MATCH ... WHERE` with the authorization filter, and the validate
    /// rules that run before the write
    fn match_root(
        &mut self,
        root: &Bound,
        tree: &ResolveTree,
        operation: AuthorizationOperation,
    ) -> GraphQLResult<Vec<Clause>> {
        let entity = &root.entity;
        let variable = &root.variable;
        let mut clauses: Vec<Clause> =
            authentication_clause(self.ctx, entity, operation)?.into_iter().collect();
        let mut predicate = Predicate::default();
        if let Some(where_) = tree.arg(args::WHERE) {
            predicate = predicate.and(compile_where(self.ctx, entity, variable, where_)?);
        }
        predicate = predicate.and(filter_predicate(self.ctx, entity, variable, operation)?);
        let pattern = Pattern::node(NodePattern::new(Some(variable), &entity.labels()));
        clauses.extend(match_clauses(pattern, predicate, false));
        clauses.extend(validate_clauses(
            self.ctx,
            entity,
            variable,
            operation,
            ValidateWhen::Before,
        )?);
        Ok(clauses)
    }

    /// `CREATE` and `SET` of a new node. Relationship inputs are handed back for
    /// [`Self::finish_node`], so callers can attach the node to its parent first.
    fn create_node<'v>(
        &mut self,
        bound: &Bound,
        input: &'v Map<String, Value>,
    ) -> GraphQLResult<(Vec<Clause>, Vec<(Arc<Field>, &'v Value)>)> {
        let entity = bound.entity.clone();
        let mut clauses: Vec<Clause> =
            authentication_clause(self.ctx, &entity, AuthorizationOperation::Create)?
                .into_iter()
                .collect();
        clauses.push(Clause::Create(Pattern::node(NodePattern::new(
            Some(&bound.variable),
            &entity.labels(),
        ))));
        let (sets, relationships) = self.property_sets(
            &entity.name,
            &entity.fields,
            &bound.variable,
            input,
            WriteKind::Create,
        )?;
        if !sets.is_empty() {
            clauses.push(Clause::Set(sets));
        }
        self.projector.mark_mutation_meta(
            bound.scope,
            MutationMeta::created(&bound.variable, &entity.name),
        );
        Ok((clauses, relationships))
    }

    /// `SET` on an existing node, snapshotting its properties first when metadata is
    /// collected
    fn update_node<'v>(
        &mut self,
        bound: &Bound,
        input: &'v Map<String, Value>,
    ) -> GraphQLResult<(Vec<Clause>, Vec<(Arc<Field>, &'v Value)>)> {
        let entity = bound.entity.clone();
        let (sets, relationships) = self.property_sets(
            &entity.name,
            &entity.fields,
            &bound.variable,
            input,
            WriteKind::Update,
        )?;
        let mut clauses = vec![];
        if sets.is_empty() {
            return Ok((clauses, relationships));
        }
        if self.projector.is_enabled() {
            let old = format!("{}_old", bound.variable);
            let mut stage = self
                .projector
                .next_stage_variables(bound.scope, StageOptions::default());
            if let Clause::With { projection, .. } = &mut stage {
                projection
                    .items
                    .push(ReturnItem::new(Expr::all_properties(&bound.variable), &old));
            }
            clauses.push(stage);
            self.projector.add_variable(bound.scope, &old);
            self.projector.mark_mutation_meta(
                bound.scope,
                MutationMeta::updated(&bound.variable, &entity.name, Expr::var(&old)),
            );
        }
        clauses.push(Clause::Set(sets));
        Ok((clauses, relationships))
    }

    /// Nested relationship inputs, cardinality checks and the validate rules that run
    /// after the write
    fn finish_node(
        &mut self,
        bound: &Bound,
        relationships: Vec<(Arc<Field>, &Value)>,
        kind: WriteKind,
    ) -> GraphQLResult<Vec<Clause>> {
        let mut clauses = vec![];
        let mut written = vec![];
        for (field, value) in relationships {
            clauses.extend(self.relationship_input(bound, &field, value, kind)?);
            written.push(field.name.clone());
        }
        clauses.extend(self.cardinality_checks(&bound.entity, &bound.variable, &written));
        clauses.extend(validate_clauses(
            self.ctx,
            &bound.entity,
            &bound.variable,
            kind.operation(),
            ValidateWhen::After,
        )?);
        Ok(clauses)
    }

    fn property_sets<'v>(
        &mut self,
        owner: &str,
        fields: &[Arc<Field>],
        variable: &str,
        input: &'v Map<String, Value>,
        kind: WriteKind,
    ) -> GraphQLResult<(Vec<SetItem>, Vec<(Arc<Field>, &'v Value)>)> {
        let mut sets = vec![];
        let mut relationships = vec![];
        for (key, value) in input {
            if let Some(field) = fields.iter().find(|f| &f.name == key) {
                match &field.kind {
                    FieldKind::Relationship(_) => relationships.push((field.clone(), value)),
                    FieldKind::Cypher(_) => {
                        return Err(GraphQLError::validation(format!(
                            "{owner}.{key} is computed and cannot be written"
                        )))
                    }
                    _ if field.autogenerate.is_some() => {
                        return Err(GraphQLError::validation(format!(
                            "{owner}.{key} is generated and cannot be written"
                        )))
                    }
                    _ => sets.push(SetItem {
                        target: Expr::prop(variable, field.db_name()),
                        value: self.property_value(field, value),
                    }),
                }
                continue;
            }
            match kind {
                WriteKind::Update => {
                    sets.push(self.list_or_arithmetic(owner, fields, variable, key, value)?)
                }
                WriteKind::Create => return Err(GraphQLError::field_not_found(key, owner)),
            }
        }

        for field in fields.iter().filter(|f| f.is_property()) {
            let generated = match (field.autogenerate, kind) {
                (Some(Autogenerate::Id), WriteKind::Create) => {
                    Some(Expr::func("randomUUID", vec![]))
                }
                (
                    Some(Autogenerate::Timestamp | Autogenerate::TimestampOnCreate),
                    WriteKind::Create,
                )
                | (
                    Some(Autogenerate::Timestamp | Autogenerate::TimestampOnUpdate),
                    WriteKind::Update,
                ) => {
                    let temporal = field.temporal().unwrap_or(TemporalKind::DateTime);
                    Some(Expr::func(temporal.constructor(), vec![]))
                }
                (None, WriteKind::Create) if !input.contains_key(&field.name) => field
                    .default_value
                    .as_ref()
                    .map(|default| self.property_value(field, default)),
                _ => None,
            };
            if let Some(value) = generated {
                sets.push(SetItem {
                    target: Expr::prop(variable, field.db_name()),
                    value,
                });
            }
        }
        Ok((sets, relationships))
    }

    /// `_INCREMENT`, `_ADD` and friends on numbers, `_PUSH` and `_POP` on lists
    fn list_or_arithmetic(
        &mut self,
        owner: &str,
        fields: &[Arc<Field>],
        variable: &str,
        key: &str,
        value: &Value,
    ) -> GraphQLResult<SetItem> {
        let lookup = |suffix: &str| {
            key.strip_suffix(suffix)
                .and_then(|name| fields.iter().find(|f| f.name == name && f.is_property()))
        };
        let unsupported = |name: &str, suffix: &str| {
            GraphQLError::validation(format!(
                "{} is not supported on {owner}.{name}",
                &suffix[1..]
            ))
        };

        for (suffix, op) in ARITHMETIC {
            let field = match lookup(suffix) {
                Some(field) => field,
                None => continue,
            };
            let integral = matches!(suffix, "_INCREMENT" | "_DECREMENT");
            let allowed = !field.list
                && match field.kind {
                    FieldKind::Primitive {
                        scalar: PrimitiveScalar::Int | PrimitiveScalar::BigInt,
                    } => integral,
                    FieldKind::Primitive {
                        scalar: PrimitiveScalar::Float,
                    } => !integral,
                    _ => false,
                };
            if !allowed {
                return Err(unsupported(&field.name, suffix));
            }
            let current = Expr::prop(variable, field.db_name());
            let operand = self.ctx.params.clause_for(value.clone());
            return Ok(SetItem {
                target: current.clone(),
                value: Expr::binary(current, op, operand),
            });
        }

        if let Some(field) = lookup(PUSH) {
            if !field.list {
                return Err(unsupported(&field.name, PUSH));
            }
            let items = match value {
                Value::Array(_) => value.clone(),
                other => Value::Array(vec![other.clone()]),
            };
            let current = Expr::prop(variable, field.db_name());
            let pushed = self.property_value(field, &items);
            return Ok(SetItem {
                target: current.clone(),
                value: Expr::binary(current, BinaryOperator::Add, pushed),
            });
        }

        if let Some(field) = lookup(POP) {
            if !field.list || !value.is_u64() {
                return Err(unsupported(&field.name, POP));
            }
            let current = Expr::prop(variable, field.db_name());
            let count = self.ctx.params.clause_for(value.clone());
            let end = Expr::binary(
                Expr::func("size", vec![current.clone()]),
                BinaryOperator::Sub,
                count,
            );
            return Ok(SetItem {
                target: current.clone(),
                value: Expr::Slice {
                    list: Box::new(current),
                    start: Some(Box::new(Expr::int(0))),
                    end: Some(Box::new(end)),
                },
            });
        }

        Err(GraphQLError::field_not_found(key, owner))
    }

    /// Parameter for a property value, converted to the stored type where Cypher needs it
    fn property_value(&mut self, field: &Field, value: &Value) -> Expr {
        if value.is_null() {
            return Expr::null();
        }
        let param = self.ctx.params.clause_for(value.clone());
        let constructor = match field.temporal() {
            Some(temporal) => temporal.constructor(),
            None if field.is_point() => "point",
            None => return param,
        };
        if field.list {
            Expr::ListComprehension {
                variable: "v".to_string(),
                source: Box::new(param),
                filter: None,
                map: Some(Box::new(Expr::func(constructor, vec![Expr::var("v")]))),
            }
        } else {
            Expr::func(constructor, vec![param])
        }
    }

    /// A required singular relationship must exist exactly once, a nullable one that was
    /// written at most once
    fn cardinality_checks(
        &self,
        entity: &Entity,
        variable: &str,
        written: &[String],
    ) -> Vec<Clause> {
        let schema = self.ctx.schema;
        entity
            .relationship_fields()
            .filter(|(field, _)| !field.list && (!field.nullable || written.contains(&field.name)))
            .map(|(field, rel)| {
                let labels = schema
                    .entity(&rel.target)
                    .map(|target| target.labels())
                    .unwrap_or_default();
                let count = Expr::PatternSize {
                    pattern: link_pattern(variable, None, rel, NodePattern::new(None, &labels)),
                    filter: None,
                };
                let (op, requirement) = if field.nullable {
                    (BinaryOperator::Lte, "must not have more than one node")
                } else {
                    (BinaryOperator::Eq, "required exactly once")
                };
                Clause::validate(
                    Expr::not(Expr::binary(count, op, Expr::int(1))),
                    &format!(
                        "{} {}.{} {requirement}",
                        signals::RELATIONSHIP_REQUIRED,
                        entity.name,
                        field.name
                    ),
                )
            })
            .collect()
    }

    /// Concrete targets of a nested input. Abstract targets are addressed by member name.
    fn targets<'v>(
        &self,
        field: &Field,
        rel: &RelationshipField,
        value: &'v Value,
    ) -> GraphQLResult<Vec<(Arc<Entity>, &'v Value)>> {
        let schema = self.ctx.schema;
        if let Some(target) = schema.entity(&rel.target) {
            return Ok(vec![(target.clone(), value)]);
        }
        let members = schema.concrete_entities(&rel.target);
        input_object(value, &field.name)?
            .iter()
            .map(|(name, input)| {
                members
                    .iter()
                    .find(|m| &m.name == name)
                    .map(|member| (member.clone(), input))
                    .ok_or_else(|| {
                        GraphQLError::validation(format!(
                            "{name} is not a member of {}",
                            rel.target
                        ))
                    })
            })
            .collect()
    }

    /// `{ create, connect, ... }` objects under a relationship key of a create or update input
    fn relationship_input(
        &mut self,
        parent: &Bound,
        field: &Field,
        value: &Value,
        kind: WriteKind,
    ) -> GraphQLResult<Vec<Clause>> {
        let rel = relationship_of(field)?;
        let mut clauses = vec![];
        for (target, part) in self.targets(field, rel, value)? {
            for item in as_list(part) {
                let object = input_object(item, &field.name)?;
                for (operation, input) in object {
                    if kind == WriteKind::Update && operation == args::WHERE {
                        continue;
                    }
                    if !kind
                        .nested_operations()
                        .iter()
                        .any(|allowed| *allowed == operation.as_str())
                    {
                        return Err(GraphQLError::validation(format!(
                            "{operation} is not a valid operation on {}.{}",
                            parent.entity.name, field.name
                        )));
                    }
                    let link = Link {
                        field,
                        rel,
                        target: target.clone(),
                    };
                    if operation == args::UPDATE {
                        let where_ = object.get(args::WHERE).filter(|w| !w.is_null());
                        clauses.extend(self.nested_update(parent, &link, where_, input)?);
                        continue;
                    }
                    for input in as_list(input) {
                        clauses.extend(self.nested(parent, &link, operation, input)?);
                    }
                }
            }
        }
        Ok(clauses)
    }

    /// Mutation level `connect`, `disconnect`, `create`, `delete` and `connectOrCreate`
    /// arguments, keyed by relationship field
    fn field_operations(
        &mut self,
        parent: &Bound,
        operation: &str,
        value: &Value,
        written: &mut Vec<String>,
    ) -> GraphQLResult<Vec<Clause>> {
        let entity = parent.entity.clone();
        let mut clauses = vec![];
        for (key, input) in input_object(value, operation)? {
            let field = entity
                .field(key)
                .filter(|f| f.relationship().is_some())
                .ok_or_else(|| GraphQLError::field_not_found(key, &entity.name))?;
            let rel = relationship_of(field)?;
            for (target, part) in self.targets(field, rel, input)? {
                let link = Link {
                    field,
                    rel,
                    target,
                };
                for item in as_list(part) {
                    clauses.extend(self.nested(parent, &link, operation, item)?);
                }
            }
            written.push(field.name.clone());
        }
        Ok(clauses)
    }

    fn nested(
        &mut self,
        parent: &Bound,
        link: &Link,
        operation: &str,
        input: &Value,
    ) -> GraphQLResult<Vec<Clause>> {
        if self.depth >= self.ctx.config.max_depth {
            return Err(GraphQLError::validation(format!(
                "mutation exceeds the maximum depth of {}",
                self.ctx.config.max_depth
            )));
        }
        self.depth += 1;
        let result = match operation {
            args::CREATE => self.nested_create(parent, link, input),
            args::CONNECT => self.nested_connect(parent, link, input),
            args::CONNECT_OR_CREATE => self.nested_connect_or_create(parent, link, input),
            args::DISCONNECT => self.nested_disconnect(parent, link, input),
            args::DELETE => self.nested_delete(parent, link, input),
            other => Err(GraphQLError::unsupported_operation(other)),
        };
        self.depth -= 1;
        result
    }

    /// Child scope for a subquery below `parent`, and the clause importing its variables
    fn open(&mut self, parent: &Bound, operation: &str, variable: &str) -> (ScopeId, Vec<Clause>) {
        let child = self
            .projector
            .create_child(parent.scope, &format!("{operation}_{variable}"));
        let import = Clause::with_vars(&self.projector.scope(parent.scope).variables);
        (child, vec![import])
    }

    /// Wraps `body` into a `CALL` and folds the child's metadata back into `parent`
    fn close(&mut self, parent: &Bound, child: ScopeId, mut body: Vec<Clause>) -> Vec<Clause> {
        body.extend(
            self.projector
                .next_return(child, StageOptions { reduce_meta: true }),
        );
        self.projector.merge_with_child(parent.scope, child);
        vec![
            Clause::Call(Statement::new(body)),
            self.projector
                .next_stage_variables(parent.scope, StageOptions::default()),
        ]
    }

    fn bind(
        &mut self,
        parent: &Bound,
        operation: &str,
        target: &Arc<Entity>,
    ) -> (Bound, String, Vec<Clause>) {
        let node = self.ctx.next_var(cypher::THIS);
        let edge = self.ctx.next_var(cypher::THIS);
        let (scope, body) = self.open(parent, operation, &node);
        self.projector.add_variable(scope, &node);
        self.projector.add_variable(scope, &edge);
        let bound = Bound {
            entity: target.clone(),
            variable: node,
            scope,
        };
        (bound, edge, body)
    }

    fn nested_create(
        &mut self,
        parent: &Bound,
        link: &Link,
        input: &Value,
    ) -> GraphQLResult<Vec<Clause>> {
        let node_input = input
            .get(args::NODE)
            .ok_or_else(|| {
                GraphQLError::argument(format!("{}.create requires node", link.field.name))
            })
            .and_then(|node| input_object(node, args::NODE))?;
        let (bound, edge, mut body) = self.bind(parent, args::CREATE, &link.target);

        let (clauses, relationships) = self.create_node(&bound, node_input)?;
        body.extend(clauses);
        body.push(Clause::Create(link_pattern(
            &parent.variable,
            Some(&edge),
            link.rel,
            NodePattern::var(&bound.variable),
        )));
        body.extend(self.edge_sets(link.rel, &edge, input, WriteKind::Create)?);
        let meta = self.link_meta(parent, link, &edge, &bound.variable, MutationMeta::connected);
        self.projector.mark_mutation_meta(bound.scope, meta);
        body.extend(self.finish_node(&bound, relationships, WriteKind::Create)?);
        Ok(self.close(parent, bound.scope, body))
    }

    fn nested_connect(
        &mut self,
        parent: &Bound,
        link: &Link,
        input: &Value,
    ) -> GraphQLResult<Vec<Clause>> {
        let operation = AuthorizationOperation::CreateRelationship;
        let (bound, edge, mut body) = self.bind(parent, args::CONNECT, &link.target);
        body.extend(self.authenticate_both(parent, &bound, operation)?);

        let mut predicate = Predicate::default();
        if let Some(where_) = input
            .get(args::WHERE)
            .and_then(|w| w.get(args::NODE))
            .filter(|w| !w.is_null())
        {
            predicate =
                predicate.and(compile_where(self.ctx, &bound.entity, &bound.variable, where_)?);
        }
        let pattern =
            Pattern::node(NodePattern::new(Some(&bound.variable), &bound.entity.labels()));
        body.extend(match_clauses(pattern, predicate, false));
        body.extend(self.validate_both(parent, &bound, operation, ValidateWhen::Before)?);

        body.push(Clause::Merge {
            pattern: link_pattern(
                &parent.variable,
                Some(&edge),
                link.rel,
                NodePattern::var(&bound.variable),
            ),
            on_create: vec![],
        });
        body.extend(self.edge_sets(link.rel, &edge, input, WriteKind::Create)?);
        let meta = self.link_meta(parent, link, &edge, &bound.variable, MutationMeta::connected);
        self.projector.mark_mutation_meta(bound.scope, meta);

        if let Some(value) = input.get(args::CONNECT).filter(|v| !v.is_null()) {
            body.extend(self.field_operations(&bound, args::CONNECT, value, &mut vec![])?);
        }
        body.extend(self.validate_both(parent, &bound, operation, ValidateWhen::After)?);
        Ok(self.close(parent, bound.scope, body))
    }

    /// `MERGE` on the unique properties in `where.node`, `onCreate` applied only to new nodes
    fn nested_connect_or_create(
        &mut self,
        parent: &Bound,
        link: &Link,
        input: &Value,
    ) -> GraphQLResult<Vec<Clause>> {
        let operation = AuthorizationOperation::CreateRelationship;
        let target = link.target.clone();
        let keys = input
            .get(args::WHERE)
            .and_then(|w| w.get(args::NODE))
            .and_then(Value::as_object)
            .filter(|keys| !keys.is_empty())
            .ok_or_else(|| {
                GraphQLError::argument(format!(
                    "{}.connectOrCreate requires where.node",
                    link.field.name
                ))
            })?;
        let (bound, edge, mut body) = self.bind(parent, args::CONNECT_OR_CREATE, &target);
        body.extend(authentication_clause(self.ctx, &target, AuthorizationOperation::Create)?);
        body.extend(self.authenticate_both(parent, &bound, operation)?);

        let mut node = NodePattern::new(Some(&bound.variable), &target.labels());
        for (key, value) in keys {
            let field = target
                .field(key)
                .filter(|f| f.unique || f.autogenerate == Some(Autogenerate::Id))
                .ok_or_else(|| {
                    GraphQLError::validation(format!(
                        "{key} is not a unique field of {}",
                        target.name
                    ))
                })?;
            let value = self.property_value(field, value);
            node.properties.push((field.db_name().to_string(), value));
        }
        let merged: Vec<Expr> = node
            .properties
            .iter()
            .map(|(key, _)| Expr::prop(&bound.variable, key.clone()))
            .collect();

        let on_create = input.get(args::ON_CREATE).filter(|v| !v.is_null());
        let empty = Map::new();
        let node_input = match on_create.and_then(|c| c.get(args::NODE)).filter(|v| !v.is_null()) {
            Some(value) => input_object(value, args::NODE)?,
            None => &empty,
        };
        let (mut node_sets, relationships) = self.property_sets(
            &target.name,
            &target.fields,
            &bound.variable,
            node_input,
            WriteKind::Create,
        )?;
        if !relationships.is_empty() {
            return Err(GraphQLError::validation(format!(
                "onCreate of {}.connectOrCreate cannot write relationships",
                link.field.name
            )));
        }
        node_sets.retain(|set| !merged.contains(&set.target));
        body.push(Clause::Merge {
            pattern: Pattern::node(node),
            on_create: node_sets,
        });

        let edge_input = on_create.cloned().unwrap_or(Value::Null);
        let edge_sets = match self
            .edge_sets(link.rel, &edge, &edge_input, WriteKind::Create)?
            .pop()
        {
            Some(Clause::Set(items)) => items,
            _ => vec![],
        };
        body.push(Clause::Merge {
            pattern: link_pattern(
                &parent.variable,
                Some(&edge),
                link.rel,
                NodePattern::var(&bound.variable),
            ),
            on_create: edge_sets,
        });
        let meta = self.link_meta(parent, link, &edge, &bound.variable, MutationMeta::connected);
        self.projector.mark_mutation_meta(bound.scope, meta);
        body.extend(self.validate_both(parent, &bound, operation, ValidateWhen::After)?);
        Ok(self.close(parent, bound.scope, body))
    }

    fn nested_disconnect(
        &mut self,
        parent: &Bound,
        link: &Link,
        input: &Value,
    ) -> GraphQLResult<Vec<Clause>> {
        let operation = AuthorizationOperation::DeleteRelationship;
        let (bound, edge, mut body) = self.bind(parent, args::DISCONNECT, &link.target);
        body.extend(self.authenticate_both(parent, &bound, operation)?);
        body.extend(self.match_linked(parent, link, &bound, &edge, input.get(args::WHERE), None)?);
        body.extend(self.validate_both(parent, &bound, operation, ValidateWhen::Before)?);

        let meta = self.link_meta(parent, link, &edge, &bound.variable, MutationMeta::disconnected);
        self.projector.mark_mutation_meta(bound.scope, meta);
        if self.projector.is_enabled() {
            body.push(self.projector.next_stage_variables(bound.scope, StageOptions::default()));
        }
        body.push(Clause::Delete {
            detach: false,
            variables: vec![edge],
        });

        if let Some(value) = input.get(args::DISCONNECT).filter(|v| !v.is_null()) {
            body.extend(self.field_operations(&bound, args::DISCONNECT, value, &mut vec![])?);
        }
        body.extend(self.validate_both(parent, &bound, operation, ValidateWhen::After)?);
        Ok(self.close(parent, bound.scope, body))
    }

    fn nested_delete(
        &mut self,
        parent: &Bound,
        link: &Link,
        input: &Value,
    ) -> GraphQLResult<Vec<Clause>> {
        let operation = AuthorizationOperation::Delete;
        let (bound, edge, mut body) = self.bind(parent, args::DELETE, &link.target);
        body.extend(authentication_clause(self.ctx, &bound.entity, operation)?);
        body.extend(self.match_linked(
            parent,
            link,
            &bound,
            &edge,
            input.get(args::WHERE),
            Some(operation),
        )?);
        body.extend(validate_clauses(
            self.ctx,
            &bound.entity,
            &bound.variable,
            operation,
            ValidateWhen::Before,
        )?);
        if let Some(value) = input.get(args::DELETE).filter(|v| !v.is_null()) {
            body.extend(self.field_operations(&bound, args::DELETE, value, &mut vec![])?);
        }
        body.extend(self.detach_delete(&bound)?);
        Ok(self.close(parent, bound.scope, body))
    }

    fn nested_update(
        &mut self,
        parent: &Bound,
        link: &Link,
        where_: Option<&Value>,
        input: &Value,
    ) -> GraphQLResult<Vec<Clause>> {
        let operation = AuthorizationOperation::Update;
        let (bound, edge, mut body) = self.bind(parent, args::UPDATE, &link.target);
        body.extend(authentication_clause(self.ctx, &bound.entity, operation)?);
        body.extend(self.match_linked(parent, link, &bound, &edge, where_, Some(operation))?);
        body.extend(validate_clauses(
            self.ctx,
            &bound.entity,
            &bound.variable,
            operation,
            ValidateWhen::Before,
        )?);

        let empty = Map::new();
        let node_input = match input.get(args::NODE).filter(|v| !v.is_null()) {
            Some(value) => input_object(value, args::NODE)?,
            None => &empty,
        };
        let (clauses, relationships) = self.update_node(&bound, node_input)?;
        body.extend(clauses);
        let edge_sets = self.edge_sets(link.rel, &edge, input, WriteKind::Update)?;
        if !edge_sets.is_empty() {
            body.extend(edge_sets);
            let meta = self.link_meta(
                parent,
                link,
                &edge,
                &bound.variable,
                MutationMeta::relationship_updated,
            );
            self.projector.mark_mutation_meta(bound.scope, meta);
        }
        body.extend(self.finish_node(&bound, relationships, WriteKind::Update)?);
        Ok(self.close(parent, bound.scope, body))
    }

    /// `MATCH (parent)-[edge]-(node)` filtered by a connection where and, for deletes and
    /// updates, the target's authorization filter
    fn match_linked(
        &mut self,
        parent: &Bound,
        link: &Link,
        bound: &Bound,
        edge: &str,
        where_: Option<&Value>,
        filter: Option<AuthorizationOperation>,
    ) -> GraphQLResult<Vec<Clause>> {
        let mut predicate = Predicate::default();
        if let Some(where_) = where_.filter(|w| !w.is_null()) {
            predicate = predicate.and(compile_connection_where(
                self.ctx,
                link.rel,
                edge,
                &bound.variable,
                where_,
            )?);
        }
        if let Some(operation) = filter {
            predicate = predicate.and(filter_predicate(
                self.ctx,
                &bound.entity,
                &bound.variable,
                operation,
            )?);
        }
        let pattern = link_pattern(
            &parent.variable,
            Some(edge),
            link.rel,
            NodePattern::new(Some(&bound.variable), &bound.entity.labels()),
        );
        Ok(match_clauses(pattern, predicate, false))
    }

    /// `SET` of the `edge` object of `input`, empty when there is nothing to write
    fn edge_sets(
        &mut self,
        rel: &RelationshipField,
        edge: &str,
        input: &Value,
        kind: WriteKind,
    ) -> GraphQLResult<Vec<Clause>> {
        let empty = Map::new();
        let edge_input = match input.get(args::EDGE).filter(|v| !v.is_null()) {
            Some(value) => input_object(value, args::EDGE)?,
            None => &empty,
        };
        let (sets, _) = self.property_sets(&rel.rel_type, &rel.properties, edge, edge_input, kind)?;
        Ok(if sets.is_empty() {
            vec![]
        } else {
            vec![Clause::Set(sets)]
        })
    }

    /// Metadata captured first, then `DETACH DELETE`. Relationships removed along with the
    /// node are recorded as disconnections.
    fn detach_delete(&mut self, bound: &Bound) -> GraphQLResult<Vec<Clause>> {
        let mut clauses = vec![];
        if self.projector.is_enabled() {
            let edge = self.ctx.next_var(cypher::THIS);
            let from = self.ctx.next_var(cypher::THIS);
            let to = self.ctx.next_var(cypher::THIS);
            let (child, mut body) = self.open(bound, "cascade", &edge);
            body.push(Clause::Match {
                optional: false,
                pattern: Pattern {
                    start: NodePattern::var(&bound.variable),
                    segments: vec![(
                        RelationshipPattern {
                            variable: Some(edge.clone()),
                            rel_type: None,
                            direction: PatternDirection::Undirected,
                        },
                        NodePattern::default(),
                    )],
                },
                filter: None,
            });
            body.push(Clause::With {
                projection: Projection::items(vec![
                    ReturnItem::var(&edge),
                    ReturnItem::new(Expr::func("startNode", vec![Expr::var(&edge)]), &from),
                    ReturnItem::new(Expr::func("endNode", vec![Expr::var(&edge)]), &to),
                ]),
                filter: None,
            });
            self.projector
                .mark_mutation_meta(child, MutationMeta::detached(&from, &edge, &to));
            clauses.extend(self.close(bound, child, body));
            self.projector.mark_mutation_meta(
                bound.scope,
                MutationMeta::deleted(&bound.variable, &bound.entity.name),
            );
            clauses.push(
                self.projector
                    .next_stage_variables(bound.scope, StageOptions::default()),
            );
        }
        clauses.push(Clause::Delete {
            detach: true,
            variables: vec![bound.variable.clone()],
        });
        Ok(clauses)
    }

    fn authenticate_both(
        &mut self,
        parent: &Bound,
        bound: &Bound,
        operation: AuthorizationOperation,
    ) -> GraphQLResult<Vec<Clause>> {
        let mut clauses: Vec<Clause> = authentication_clause(self.ctx, &parent.entity, operation)?
            .into_iter()
            .collect();
        if bound.entity.name != parent.entity.name {
            clauses.extend(authentication_clause(self.ctx, &bound.entity, operation)?);
        }
        Ok(clauses)
    }

    fn validate_both(
        &mut self,
        parent: &Bound,
        bound: &Bound,
        operation: AuthorizationOperation,
        when: ValidateWhen,
    ) -> GraphQLResult<Vec<Clause>> {
        let mut clauses =
            validate_clauses(self.ctx, &parent.entity, &parent.variable, operation, when)?;
        clauses.extend(validate_clauses(
            self.ctx,
            &bound.entity,
            &bound.variable,
            operation,
            when,
        )?);
        Ok(clauses)
    }

    /// Relationship metadata oriented the way the relationship is stored
    fn link_meta(
        &self,
        parent: &Bound,
        link: &Link,
        edge: &str,
        node: &str,
        build: fn((&str, &Side), (&str, &str), (&str, &Side)) -> MutationMeta,
    ) -> MutationMeta {
        let parent_side = Side::Typename(parent.entity.name.clone());
        let target_side = Side::Typename(link.target.name.clone());
        let relationship = (edge, link.rel.rel_type.as_str());
        match link.rel.direction {
            Direction::Out => build(
                (parent.variable.as_str(), &parent_side),
                relationship,
                (node, &target_side),
            ),
            Direction::In => build(
                (node, &target_side),
                relationship,
                (parent.variable.as_str(), &parent_side),
            ),
        }
    }
}

fn link_pattern(
    parent: &str,
    edge: Option<&str>,
    rel: &RelationshipField,
    target: NodePattern,
) -> Pattern {
    Pattern::relationship(
        NodePattern::var(parent),
        edge,
        &rel.rel_type,
        rel.direction.pattern_direction(),
        target,
    )
}

fn relationship_of(field: &Field) -> GraphQLResult<&RelationshipField> {
    field
        .relationship()
        .ok_or_else(|| GraphQLError::internal(format!("{} is not a relationship", field.name)))
}

fn input_object<'v>(value: &'v Value, name: &str) -> GraphQLResult<&'v Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| GraphQLError::argument(format!("{name} must be an object")))
}

/// Every selection of the plural field of a mutation response, merged
fn mutation_selection(entity: &Entity, tree: &ResolveTree) -> ResolveTree {
    let plural = entity.plural();
    let mut selection = ResolveTree::new(plural.as_str());
    for found in tree.find_fields(&plural) {
        for (type_name, fields) in &found.fields_by_type_name {
            selection =
                selection.with_fields(type_name.clone(), fields.values().cloned().collect());
        }
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Dialect;
    use crate::config::Config;
    use crate::test_fixtures::{context, movie_schema};
    use serde_json::json;

    fn movies(fields: &[&str]) -> ResolveTree {
        ResolveTree::new("movies").with_fields(
            "Movie",
            fields.iter().map(|f| ResolveTree::new(*f)).collect(),
        )
    }

    fn translate(
        config: &Config,
        entity: &str,
        tree: ResolveTree,
        f: fn(&mut TranslationContext, &Arc<Entity>, &ResolveTree) -> GraphQLResult<Statement>,
    ) -> GraphQLResult<(String, Map<String, Value>)> {
        let schema = movie_schema();
        let mut ctx = context(&schema, config);
        let entity = schema.entity(entity).unwrap().clone();
        let statement = f(&mut ctx, &entity, &tree)?;
        Ok((statement.render(Dialect::default()), ctx.params.into_json()))
    }

    #[test]
    fn create_test() {
        let tree = ResolveTree::new("createMovies")
            .with_arg("input", json!([{"title": "Dune"}, {"title": "Arrival"}]))
            .with_fields("CreateMoviesMutationResponse", vec![movies(&["title"])]);
        let res = translate(&Config::default(), "Movie", tree, create);
        assert!(res.is_ok());
        let (text, params) = res.unwrap();
        assert_eq!(
            text,
            "CALL {\n    CREATE (this0:Movie)\n    SET this0.title = $param0\n    RETURN this0\n}\n\
             CALL {\n    CREATE (this1:Movie)\n    SET this1.title = $param1\n    RETURN this1\n}\n\
             RETURN [this0 { .title }, this1 { .title }] AS data"
        );
        assert_eq!(params["param0"], json!("Dune"));
        assert_eq!(params["param1"], json!("Arrival"));
    }

    #[test]
    fn create_generated_values_test() {
        let tree = ResolveTree::new("createPosts").with_arg("input", json!([{"content": "hi"}]));
        let (text, params) = translate(&Config::default(), "Post", tree, create).unwrap();
        assert!(text.contains(
            "SET this0.content = $param0, this0.id = randomUUID(), this0.createdAt = datetime(), this0.views = $param1"
        ));
        assert_eq!(params["param1"], json!(0));
        // validate rules run after the node exists
        assert!(text.contains("WITH *\n    WHERE apoc.util.validatePredicate("));

        let tree = ResolveTree::new("createPosts").with_arg("input", json!([{"id": "x"}]));
        let res = translate(&Config::default(), "Post", tree, create);
        assert!(res.unwrap_err().is_validation());
    }

    #[test]
    fn nested_create_and_connect_test() {
        let tree = ResolveTree::new("createMovies").with_arg(
            "input",
            json!([{
                "title": "Dune",
                "actors": {
                    "create": [{"node": {"name": "Zendaya"}, "edge": {"screenTime": 12}}],
                    "connect": [{"where": {"node": {"name": "Javier"}}}]
                }
            }]),
        );
        let (text, params) = translate(&Config::default(), "Movie", tree, create).unwrap();
        assert!(text.contains("CALL {\n        WITH this0\n        CREATE (this1:Actor:Person)"));
        assert!(text.contains("CREATE (this0)<-[this2:ACTED_IN]-(this1)"));
        assert!(text.contains("SET this2.screenTime = $param2"));
        assert!(text.contains("MATCH (this3:Actor:Person)\n        WHERE this3.name = $param3"));
        assert!(text.contains("MERGE (this0)<-[this4:ACTED_IN]-(this3)"));
        assert!(!text.contains("mutateMeta"));
        assert_eq!(params["param1"], json!("Zendaya"));
        assert_eq!(params["param2"], json!(12));
    }

    #[test]
    fn required_relationship_test() {
        let tree = ResolveTree::new("createSeries").with_arg("input", json!([{"title": "Dark"}]));
        let (text, _) = translate(&Config::default(), "Series", tree, create).unwrap();
        assert!(text.contains(
            "CALL apoc.util.validate(NOT (size([(this0)<-[:DIRECTED]-(:Person) | 1]) = 1), \
             \"@cypher_graphql/RELATIONSHIP-REQUIRED Series.director required exactly once\", [0])"
        ));
    }

    #[test]
    fn connect_or_create_test() {
        let tree = ResolveTree::new("updateMovies").with_arg(
            "connectOrCreate",
            json!({"genres": [{
                "where": {"node": {"name": "Drama"}},
                "onCreate": {"node": {"name": "Drama"}}
            }]}),
        );
        let (text, _) = translate(&Config::default(), "Movie", tree, update).unwrap();
        assert!(text.contains("MERGE (this0:Genre { name: $param0 })\n"));
        assert!(text.contains("MERGE (this)-[this1:IN_GENRE]->(this0)"));
        assert!(!text.contains("ON CREATE SET this0.name"));

        let tree = ResolveTree::new("updateMovies").with_arg(
            "connectOrCreate",
            json!({"actors": [{"where": {"node": {"name": "Zendaya"}}}]}),
        );
        let res = translate(&Config::default(), "Movie", tree, update);
        assert!(res.unwrap_err().is_validation());
    }

    #[test]
    fn update_test() {
        let tree = ResolveTree::new("updateMovies")
            .with_arg("where", json!({"title": "Dune"}))
            .with_arg(
                "update",
                json!({"released_INCREMENT": 1, "rating_MULTIPLY": 1.5, "tags_POP": 2, "releasedAt": "2021-10-22T00:00:00Z"}),
            )
            .with_fields("UpdateMoviesMutationResponse", vec![movies(&["title"])]);
        let res = translate(&Config::default(), "Movie", tree, update);
        assert!(res.is_ok());
        let (text, _) = res.unwrap();
        assert_eq!(
            text,
            "MATCH (this:Movie)\nWHERE this.title = $param0\n\
             SET this.released = this.released + $param1, this.rating = this.rating * $param2, \
             this.tags = this.tags[0..size(this.tags) - $param3], this.releasedAt = datetime($param4)\n\
             RETURN collect(DISTINCT this { .title }) AS data"
        );
    }

    #[test]
    fn invalid_update_operators_test() {
        for update_input in [
            json!({"released_ADD": 1}),
            json!({"rating_INCREMENT": 1}),
            json!({"title_PUSH": "x"}),
            json!({"tags_POP": -1}),
        ] {
            let tree = ResolveTree::new("updateMovies").with_arg("update", update_input);
            let res = translate(&Config::default(), "Movie", tree, update);
            assert!(res.unwrap_err().is_validation());
        }
        let tree = ResolveTree::new("updateMovies").with_arg("update", json!({"nope": 1}));
        let res = translate(&Config::default(), "Movie", tree, update);
        assert!(matches!(res, Err(GraphQLError::FieldNotFound { .. })));
    }

    #[test]
    fn nested_update_disconnect_delete_test() {
        let tree = ResolveTree::new("updateMovies").with_arg(
            "update",
            json!({"actors": [{
                "where": {"node": {"name": "Zendaya"}},
                "update": {"node": {"born": 1996}, "edge": {"screenTime": 30}},
                "disconnect": [{"where": {"node": {"name": "Javier"}}}],
                "delete": [{"where": {"edge": {"screenTime_LT": 5}}}]
            }]}),
        );
        let (text, _) = translate(&Config::default(), "Movie", tree, update).unwrap();
        assert!(text.contains(
            "MATCH (this)<-[this1:ACTED_IN]-(this0:Actor:Person)\n    WHERE this0.name = $param0"
        ));
        assert!(text.contains("SET this0.born = $param1"));
        assert!(text.contains("SET this1.screenTime = $param2"));
        assert!(text.contains("DELETE this3\n"));
        assert!(text.contains("DETACH DELETE this4"));
        assert!(text.contains("WHERE this5.screenTime < $param4"));
    }

    #[test]
    fn update_metadata_test() {
        let config = Config {
            subscriptions: true,
            ..Default::default()
        };
        let tree = ResolveTree::new("updateMovies")
            .with_arg("update", json!({"title": "Dune: Part One"}))
            .with_arg("connect", json!({"genres": [{"where": {"node": {"name": "Drama"}}}]}));
        let (text, _) = translate(&config, "Movie", tree, update).unwrap();
        assert!(text.contains("WITH this, this { .* } AS this_old\nSET this.title = $param0"));
        assert!(text.contains("type: \"Updated\""));
        assert!(text.contains("AS connect_this0_mutateMeta"));
        assert!(text.contains(
            "type: \"Connected\", id: elementId(this), name: \"Movie\", toID: elementId(this0), toName: \"Genre\""
        ));
        assert!(text.ends_with(
            "RETURN collect(DISTINCT this {}) AS data, REDUCE(acc = [], m IN collect(mutateMeta) | acc + m) AS mutateMeta"
        ));
    }

    #[test]
    fn create_metadata_test() {
        let config = Config {
            subscriptions: true,
            ..Default::default()
        };
        let tree = ResolveTree::new("createMovies").with_arg("input", json!([{"title": "Dune"}]));
        let (text, _) = translate(&config, "Movie", tree, create).unwrap();
        assert!(text.contains("RETURN this0, [metaVal IN [{ type: \"Created\""));
        assert!(text.contains("AS create_this0_mutateMeta\n}"));
        assert!(text.ends_with("RETURN [this0 {}] AS data, create_this0_mutateMeta AS mutateMeta"));
    }

    #[test]
    fn delete_test() {
        let tree = ResolveTree::new("deleteMovies")
            .with_arg("where", json!({"title": "Dune"}))
            .with_arg("delete", json!({"actors": [{"where": {"node": {"name": "Zendaya"}}}]}));
        let (text, _) = translate(&Config::default(), "Movie", tree, delete).unwrap();
        assert_eq!(
            text,
            "MATCH (this:Movie)\nWHERE this.title = $param0\n\
             CALL {\n    WITH this\n    MATCH (this)<-[this1:ACTED_IN]-(this0:Actor:Person)\n    \
             WHERE this0.name = $param1\n    DETACH DELETE this0\n}\n\
             WITH this\n\
             DETACH DELETE this"
        );
    }

    #[test]
    fn delete_metadata_test() {
        let config = Config {
            subscriptions: true,
            ..Default::default()
        };
        let tree = ResolveTree::new("deleteMovies").with_arg("where", json!({"title": "Dune"}));
        let (text, _) = translate(&config, "Movie", tree, delete).unwrap();
        assert!(text.contains(
            "MATCH (this)-[this0]-()\n    WITH this0, startNode(this0) AS this1, endNode(this0) AS this2"
        ));
        assert!(text.contains("relationshipName: type(this0)"));
        assert!(text.contains("type: \"Deleted\""));
        let delete_at = text.find("DETACH DELETE this").unwrap();
        let deleted_at = text.find("type: \"Deleted\"").unwrap();
        assert!(deleted_at < delete_at);
        assert!(text.ends_with(
            "RETURN REDUCE(acc = [], m IN collect(mutateMeta) | acc + m) AS mutateMeta"
        ));
    }

    #[test]
    fn delete_authentication_test() {
        let tree = ResolveTree::new("deletePosts");
        let (text, _) = translate(&Config::default(), "Post", tree, delete).unwrap();
        assert!(text.starts_with(
            "CALL apoc.util.validate(NOT ($isAuthenticated = true), \"@cypher_graphql/UNAUTHENTICATED\", [0])"
        ));
    }

    #[test]
    fn union_targets_by_member_test() {
        let tree = ResolveTree::new("createMovies").with_arg(
            "input",
            json!([{"related": {"Genre": {"create": [{"node": {"name": "Noir"}}]}}}]),
        );
        let (text, _) = translate(&Config::default(), "Movie", tree, create).unwrap();
        assert!(text.contains("CREATE (this1:Genre)"));
        assert!(text.contains("CREATE (this0)-[this2:RELATED]->(this1)"));

        let tree = ResolveTree::new("createMovies").with_arg(
            "input",
            json!([{"related": {"Actor": {"create": [{"node": {"name": "x"}}]}}}]),
        );
        let res = translate(&Config::default(), "Movie", tree, create);
        assert!(res.unwrap_err().is_validation());
    }
}
