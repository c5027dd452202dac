//! Root field translation: picks the statement builder for a root field and packages
//! the statement with its parameters and what the result will look like.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::aggregate::root_aggregate;
use crate::ast::{
    BinaryOperator, Clause, Dialect, Expr, NodePattern, OrderItem, Pattern, Projection,
    ReturnItem, Statement,
};
use crate::auth::{authentication_clause, AuthorizationContext, AuthorizationOperation};
use crate::config::Config;
use crate::constants::{args, cypher, introspection, pagination, root, search};
use crate::context::{FieldMeta, TranslationContext};
use crate::cursor::from_global_id;
use crate::error::{GraphQLError, GraphQLResult};
use crate::executor::{AccessMode, Rendered};
use crate::filter::label_predicate;
use crate::mutation;
use crate::projection::{
    build_projection, connection_clauses, match_clauses, read_predicate, sort_expr,
    ConnectionSource, ReadOptions, SortField,
};
use crate::resolve_tree::{as_list, ResolveTree};
use crate::schema::{
    lower_first, Entity, FieldKind, OperationKind, PrimitiveScalar, RootFieldKind, SchemaModel,
    SearchIndex,
};

/// What the rows of a translated statement hold, and so how they are shaped
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultKind {
    /// One row per node, column `this`
    Read,
    /// A `node(id:)` lookup: at most one row, column `this`
    Node,
    /// A single row holding `{ edges, totalCount }` in the named column
    Connection(String),
    /// A single row, column `this`
    Aggregate,
    /// One row per hit, column `this`
    Search,
    Create,
    Update,
    Delete,
}

/// A statement for one root field
#[derive(Clone, Debug)]
pub struct Translation {
    pub statement: Statement,
    pub params: Map<String, Value>,
    pub mode: AccessMode,
    pub kind: ResultKind,
    pub entity: Arc<Entity>,
    /// The selection the result is shaped against. Differs from the requested one only
    /// for `node(id:)`, which is rewritten into a read.
    pub tree: ResolveTree,
}

impl Translation {
    pub fn render(&self, dialect: Dialect) -> Rendered {
        (self.statement.render(dialect), self.params.clone())
    }
}

pub fn translate(
    schema: &SchemaModel,
    config: &Config,
    dialect: Dialect,
    auth: &AuthorizationContext,
    operation: OperationKind,
    tree: &ResolveTree,
) -> GraphQLResult<Translation> {
    let mut ctx = TranslationContext::new(schema, config, dialect);
    auth.bind(&mut ctx.params);

    if operation == OperationKind::Query && tree.name == root::NODE {
        let (entity, rewritten) = node_lookup(schema, tree)?;
        let statement = read(&mut ctx, &entity, &rewritten)?;
        return Ok(Translation {
            statement,
            params: ctx.params.into_json(),
            mode: AccessMode::Read,
            kind: ResultKind::Node,
            entity,
            tree: rewritten,
        });
    }

    let root_field = schema.root_field(operation, &tree.name).ok_or_else(|| {
        let type_name = match operation {
            OperationKind::Query => root::QUERY,
            OperationKind::Mutation => root::MUTATION,
        };
        GraphQLError::field_not_found(&tree.name, type_name)
    })?;
    let entity = root_field.entity;
    let (statement, kind) = match root_field.kind {
        RootFieldKind::Read => (read(&mut ctx, &entity, tree)?, ResultKind::Read),
        RootFieldKind::Connection => {
            let (statement, column) = connection(&mut ctx, &entity, tree)?;
            (statement, ResultKind::Connection(column))
        }
        RootFieldKind::Aggregate => (aggregate(&mut ctx, &entity, tree)?, ResultKind::Aggregate),
        RootFieldKind::Fulltext(index) => (
            search_statement(&mut ctx, &entity, index, SearchKind::Fulltext, tree)?,
            ResultKind::Search,
        ),
        RootFieldKind::Vector(index) => (
            search_statement(&mut ctx, &entity, index, SearchKind::Vector, tree)?,
            ResultKind::Search,
        ),
        RootFieldKind::Create => (mutation::create(&mut ctx, &entity, tree)?, ResultKind::Create),
        RootFieldKind::Update => (mutation::update(&mut ctx, &entity, tree)?, ResultKind::Update),
        RootFieldKind::Delete => (mutation::delete(&mut ctx, &entity, tree)?, ResultKind::Delete),
    };
    let mode = match operation {
        OperationKind::Query => AccessMode::Read,
        OperationKind::Mutation => AccessMode::Write,
    };
    Ok(Translation {
        statement,
        params: ctx.params.into_json(),
        mode,
        kind,
        entity,
        tree: tree.clone(),
    })
}

/// Rewrites `node(id:)` into a read of the plural root field filtered on the global id
/// property
fn node_lookup(
    schema: &SchemaModel,
    tree: &ResolveTree,
) -> GraphQLResult<(Arc<Entity>, ResolveTree)> {
    let id = tree
        .arg_str(args::ID)?
        .ok_or_else(|| GraphQLError::validation("node requires an id"))?;
    let invalid = || GraphQLError::validation(format!("invalid global id {id}"));
    let (type_name, raw) = from_global_id(id).ok_or_else(invalid)?;
    let entity = schema.entity(&type_name).cloned().ok_or_else(invalid)?;
    let field = entity.global_id().cloned().ok_or_else(invalid)?;

    let value = match &field.kind {
        FieldKind::Primitive {
            scalar: PrimitiveScalar::Int | PrimitiveScalar::BigInt,
        } => raw.parse::<i64>().map(Value::from).map_err(|_| invalid())?,
        FieldKind::Primitive {
            scalar: PrimitiveScalar::Float,
        } => {
            raw.parse::<f64>().map(Value::from).map_err(|_| invalid())?
        }
        _ => Value::String(raw),
    };

    let mut where_ = Map::new();
    where_.insert(field.name.clone(), value);
    let mut rewritten = ResolveTree::new(entity.plural())
        .with_alias(tree.alias.clone())
        .with_arg(args::WHERE, Value::Object(where_));
    rewritten.fields_by_type_name.insert(
        entity.name.clone(),
        tree.fields_by_type_name
            .get(&entity.name)
            .cloned()
            .unwrap_or_default(),
    );
    Ok((entity, rewritten))
}

fn root_match(
    ctx: &mut TranslationContext,
    entity: &Entity,
    operation: AuthorizationOperation,
    tree: &ResolveTree,
) -> GraphQLResult<Vec<Clause>> {
    let mut clauses: Vec<Clause> = authentication_clause(ctx, entity, operation)?
        .into_iter()
        .collect();
    let pattern = Pattern::node(NodePattern::new(Some(cypher::THIS), &entity.labels()));
    let predicate = read_predicate(ctx, entity, cypher::THIS, tree.arg(args::WHERE))?;
    clauses.extend(match_clauses(pattern, predicate, false));
    Ok(clauses)
}

fn read(
    ctx: &mut TranslationContext,
    entity: &Entity,
    tree: &ResolveTree,
) -> GraphQLResult<Statement> {
    let mut statement =
        Statement::new(root_match(ctx, entity, AuthorizationOperation::Read, tree)?);
    let options = ReadOptions::from_tree(tree, &ctx.config.limits)?;
    statement.extend(options.clauses(ctx, entity, cypher::THIS)?);
    let projection = build_projection(ctx, entity, tree, cypher::THIS)?;
    let map = projection.to_map(cypher::THIS);
    statement.extend(projection.subqueries);
    statement.push(Clause::Return(Projection::items(vec![ReturnItem::new(
        map,
        cypher::THIS,
    )])));
    Ok(statement)
}

fn connection(
    ctx: &mut TranslationContext,
    entity: &Entity,
    tree: &ResolveTree,
) -> GraphQLResult<(Statement, String)> {
    let mut statement =
        Statement::new(root_match(ctx, entity, AuthorizationOperation::Read, tree)?);
    let source = ConnectionSource {
        entity,
        node: cypher::THIS.to_string(),
        relationship: None,
        edge_typename: format!("{}Edge", entity.name),
    };
    let (clauses, column) = connection_clauses(ctx, &source, tree)?;
    statement.extend(clauses);
    Ok((statement, column))
}

fn aggregate(
    ctx: &mut TranslationContext,
    entity: &Entity,
    tree: &ResolveTree,
) -> GraphQLResult<Statement> {
    let mut statement = Statement::new(
        authentication_clause(ctx, entity, AuthorizationOperation::Aggregate)?
            .into_iter()
            .collect(),
    );
    statement.extend(root_aggregate(ctx, entity, tree, cypher::THIS)?.clauses);
    Ok(statement)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SearchKind {
    Fulltext,
    Vector,
}

/// `CALL db.index.<kind>.queryNodes(..) YIELD node, score` followed by the usual read
/// filtering, ranked hits projected as `{ score, <entity> }`
fn search_statement(
    ctx: &mut TranslationContext,
    entity: &Arc<Entity>,
    index: SearchIndex,
    kind: SearchKind,
    tree: &ResolveTree,
) -> GraphQLResult<Statement> {
    let meta = FieldMeta::Search {
        index,
        score_variable: search::SCORE.to_string(),
    };
    ctx.with_field_meta(meta, |ctx| search_body(ctx, entity, kind, tree))
}

fn search_body(
    ctx: &mut TranslationContext,
    entity: &Arc<Entity>,
    kind: SearchKind,
    tree: &ResolveTree,
) -> GraphQLResult<Statement> {
    let (index, score) = match ctx.field_meta() {
        Some(FieldMeta::Search {
            index,
            score_variable,
        }) => (index.clone(), score_variable.clone()),
        _ => return Err(GraphQLError::internal("search translated without an index")),
    };
    let entity_key = lower_first(&entity.name);
    let mut clauses: Vec<Clause> = authentication_clause(ctx, entity, AuthorizationOperation::Read)?
        .into_iter()
        .collect();

    let limit = ctx.config.limits.effective(tree.arg_i64(pagination::LIMIT)?);
    if matches!(limit, Some(limit) if limit < 0) {
        return Err(GraphQLError::validation("limit must be a non-negative integer"));
    }
    let call_args = match kind {
        SearchKind::Fulltext => {
            let phrase = tree
                .arg_str(args::PHRASE)?
                .ok_or_else(|| GraphQLError::validation("fulltext search requires a phrase"))?;
            vec![
                Expr::string(index.index_name()),
                ctx.params.clause_for(json!(phrase)),
            ]
        }
        SearchKind::Vector => {
            let vector = tree
                .arg(args::VECTOR)
                .filter(|v| v.is_array())
                .ok_or_else(|| GraphQLError::validation("vector search requires a vector"))?;
            let neighbours = limit.ok_or_else(|| {
                GraphQLError::validation("vector search requires a limit")
            })?;
            vec![
                Expr::string(index.index_name()),
                ctx.params.clause_for(json!(neighbours)),
                ctx.params.clause_for(vector.clone()),
            ]
        }
    };
    let procedure = match kind {
        SearchKind::Fulltext => "db.index.fulltext.queryNodes",
        SearchKind::Vector => "db.index.vector.queryNodes",
    };

    let where_ = tree.arg(args::WHERE);
    let mut predicate = read_predicate(
        ctx,
        entity,
        cypher::THIS,
        where_.and_then(|w| w.get(&entity_key)).filter(|w| !w.is_null()),
    )?;
    let mut conditions: Vec<Expr> = label_predicate(cypher::THIS, std::slice::from_ref(entity))
        .into_iter()
        .collect();
    if let Some(bounds) = where_.and_then(|w| w.get(search::SCORE)) {
        for (key, op) in [("min", BinaryOperator::Gte), ("max", BinaryOperator::Lte)] {
            if let Some(bound) = bounds.get(key).filter(|b| !b.is_null()) {
                let bound = ctx.params.clause_for(bound.clone());
                conditions.push(Expr::binary(Expr::var(&score), op, bound));
            }
        }
    }
    conditions.extend(predicate.expr.take());
    let filter = Expr::and_all(conditions);
    let yields = vec![format!("node AS {}", cypher::THIS), score.clone()];
    if predicate.subqueries.is_empty() {
        clauses.push(Clause::CallProcedure {
            name: procedure.to_string(),
            args: call_args,
            yields,
            filter,
        });
    } else {
        clauses.push(Clause::CallProcedure {
            name: procedure.to_string(),
            args: call_args,
            yields,
            filter: None,
        });
        clauses.extend(predicate.subqueries);
        clauses.extend(filter.map(Clause::with_star_where));
    }

    let mut order_by = vec![];
    if let Some(sort) = tree.arg(pagination::SORT) {
        for item in as_list(sort) {
            if let Some(direction) = item.get(search::SCORE) {
                let descending = match direction.as_str() {
                    Some("ASC") => false,
                    Some("DESC") => true,
                    _ => {
                        return Err(GraphQLError::validation(
                            "sort direction of score must be ASC or DESC",
                        ))
                    }
                };
                order_by.push(OrderItem {
                    expr: Expr::var(&score),
                    descending,
                });
            }
            if let Some(node_sort) = item.get(&entity_key) {
                for sort in SortField::parse_object(node_sort)? {
                    let (subqueries, expr) = sort_expr(ctx, entity, cypher::THIS, &sort.field)?;
                    clauses.extend(subqueries);
                    order_by.push(OrderItem {
                        expr,
                        descending: sort.descending,
                    });
                }
            }
        }
    }
    let offset = tree.arg_i64(pagination::OFFSET)?;
    if matches!(offset, Some(offset) if offset < 0) {
        return Err(GraphQLError::validation("offset must be a non-negative integer"));
    }
    if !order_by.is_empty()
        || offset.is_some()
        || (kind == SearchKind::Fulltext && limit.is_some())
    {
        let skip = offset.map(|offset| ctx.params.clause_for(json!(offset)));
        let limit = limit
            .filter(|_| kind == SearchKind::Fulltext)
            .map(|limit| ctx.params.clause_for(json!(limit)));
        clauses.push(Clause::With {
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

    let mut entries = vec![];
    for (alias, child) in tree.fields() {
        if child.name == search::SCORE {
            entries.push((alias, Expr::var(&score)));
        } else if child.name == entity_key {
            let projection = build_projection(ctx, entity, &child, cypher::THIS)?;
            entries.push((alias, projection.to_map(cypher::THIS)));
            clauses.extend(projection.subqueries);
        } else if child.name == introspection::TYPENAME {
            entries.push((alias, Expr::string(format!("{}SearchResult", entity.name))));
        } else {
            return Err(GraphQLError::field_not_found(
                &child.name,
                format!("{}SearchResult", entity.name),
            ));
        }
    }
    clauses.push(Clause::Return(Projection::items(vec![ReturnItem::new(
        Expr::Map(entries),
        cypher::THIS,
    )])));
    Ok(Statement::new(clauses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::to_global_id;
    use crate::test_fixtures::movie_schema;

    fn run(
        config: &Config,
        auth: &AuthorizationContext,
        operation: OperationKind,
        tree: ResolveTree,
    ) -> GraphQLResult<(String, Translation)> {
        let schema = movie_schema();
        let translation = translate(&schema, config, Dialect::default(), auth, operation, &tree)?;
        let (text, _) = translation.render(Dialect::default());
        Ok((text, translation))
    }

    fn query(tree: ResolveTree) -> GraphQLResult<(String, Translation)> {
        run(
            &Config::default(),
            &AuthorizationContext::default(),
            OperationKind::Query,
            tree,
        )
    }

    #[test]
    fn read_test() {
        let tree = ResolveTree::new("movies")
            .with_arg("where", json!({"title": "Matrix"}))
            .with_arg("options", json!({"limit": 2}))
            .with_fields(
                "Movie",
                vec![
                    ResolveTree::new("title"),
                    ResolveTree::new("actors").with_fields("Actor", vec![ResolveTree::new("name")]),
                ],
            );
        let res = query(tree);
        assert!(res.is_ok());
        let (text, translation) = res.unwrap();
        assert_eq!(
            text,
            "MATCH (this:Movie)\nWHERE this.title = $param0\nWITH *\nLIMIT $param1\nCALL {\n    WITH this\n    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor:Person)\n    WITH this1 { .name } AS this1\n    RETURN collect(this1) AS var2\n}\nRETURN this { .title, actors: var2 } AS this"
        );
        assert_eq!(translation.mode, AccessMode::Read);
        assert_eq!(translation.kind, ResultKind::Read);
        assert_eq!(translation.params["param0"], json!("Matrix"));
        assert_eq!(translation.params["param1"], json!(2));
        assert_eq!(translation.params["isAuthenticated"], json!(false));
    }

    #[test]
    fn unknown_root_field_test() {
        let res = query(ResolveTree::new("films"));
        assert!(matches!(res, Err(GraphQLError::FieldNotFound { .. })));
    }

    #[test]
    fn default_limit_test() {
        let config = Config::from_json(&json!({"limits": {"default": 20, "max": 50}})).unwrap();
        let tree = ResolveTree::new("movies").with_fields("Movie", vec![ResolveTree::new("title")]);
        let res = run(
            &config,
            &AuthorizationContext::default(),
            OperationKind::Query,
            tree,
        );
        assert!(res.is_ok());
        let (text, translation) = res.unwrap();
        assert!(text.contains("WITH *\nLIMIT $param0"));
        assert_eq!(translation.params["param0"], json!(20));
    }

    #[test]
    fn connection_test() {
        let tree = ResolveTree::new("moviesConnection")
            .with_arg("first", json!(1))
            .with_arg("sort", json!([{"title": "ASC"}]))
            .with_fields(
                "MoviesConnection",
                vec![
                    ResolveTree::new("totalCount"),
                    ResolveTree::new("edges").with_fields(
                        "MovieEdge",
                        vec![ResolveTree::new("node")
                            .with_fields("Movie", vec![ResolveTree::new("title")])],
                    ),
                ],
            );
        let res = query(tree);
        assert!(res.is_ok());
        let (text, translation) = res.unwrap();
        assert!(text.starts_with("MATCH (this:Movie)\nWITH collect({ node: this }) AS edges"));
        assert!(text.contains("ORDER BY this.title"));
        let column = match &translation.kind {
            ResultKind::Connection(column) => column.clone(),
            other => panic!("unexpected kind {other:?}"),
        };
        assert!(text.ends_with(&format!(
            "RETURN {{ edges: var0, totalCount: totalCount }} AS {column}"
        )));
    }

    #[test]
    fn aggregate_test() {
        let tree = ResolveTree::new("moviesAggregate")
            .with_fields("MovieAggregateSelection", vec![ResolveTree::new("count")]);
        let res = query(tree);
        assert!(res.is_ok());
        let (text, translation) = res.unwrap();
        assert_eq!(
            text,
            "CALL {\n    MATCH (this:Movie)\n    RETURN count(this) AS var0\n}\nRETURN { count: var0 } AS this"
        );
        assert_eq!(translation.kind, ResultKind::Aggregate);
    }

    #[test]
    fn fulltext_test() {
        let tree = ResolveTree::new("moviesFulltextMovieTitle")
            .with_arg("phrase", json!("matrix"))
            .with_arg("where", json!({"score": {"min": 0.5}, "movie": {"released_GT": 1990}}))
            .with_arg("sort", json!([{"score": "DESC"}, {"movie": {"title": "ASC"}}]))
            .with_fields(
                "MovieSearchResult",
                vec![
                    ResolveTree::new("score"),
                    ResolveTree::new("movie").with_fields("Movie", vec![ResolveTree::new("title")]),
                ],
            );
        let res = query(tree);
        assert!(res.is_ok());
        let (text, translation) = res.unwrap();
        assert!(text.starts_with(
            "CALL db.index.fulltext.queryNodes(\"MovieTitle\", $param0) YIELD node AS this, score\nWHERE "
        ));
        assert!(text.contains("score >= $param2"));
        assert!(text.contains("this.released > $param1"));
        assert!(text.contains("ORDER BY score DESC, this.title"));
        assert!(text.ends_with("RETURN { score: score, movie: this { .title } } AS this"));
        assert_eq!(translation.kind, ResultKind::Search);
        assert_eq!(translation.params["param0"], json!("matrix"));
    }

    #[test]
    fn fulltext_requires_phrase_test() {
        let tree = ResolveTree::new("moviesFulltextMovieTitle")
            .with_fields("MovieSearchResult", vec![ResolveTree::new("score")]);
        assert!(query(tree).unwrap_err().is_validation());
    }

    #[test]
    fn node_lookup_test() {
        let id = to_global_id("Genre", &json!("Drama"));
        let tree = ResolveTree::new("node")
            .with_arg("id", json!(id))
            .with_fields("Genre", vec![ResolveTree::new("id"), ResolveTree::new("name")])
            .with_fields("Movie", vec![ResolveTree::new("title")]);
        let res = query(tree);
        assert!(res.is_ok());
        let (text, translation) = res.unwrap();
        assert_eq!(
            text,
            "MATCH (this:Genre)\nWHERE this.name = $param0\nRETURN this { id: this.name, .name } AS this"
        );
        assert_eq!(translation.kind, ResultKind::Node);
        assert_eq!(translation.tree.name, "genres");
        assert_eq!(translation.params["param0"], json!("Drama"));
    }

    #[test]
    fn node_lookup_invalid_id_test() {
        let tree = ResolveTree::new("node").with_arg("id", json!("bm9wZQ=="));
        assert!(query(tree).unwrap_err().is_validation());
        let id = to_global_id("Movie", &json!("x"));
        let tree = ResolveTree::new("node").with_arg("id", json!(id));
        assert!(query(tree).unwrap_err().is_validation());
    }

    #[test]
    fn mutation_dispatch_test() {
        let tree = ResolveTree::new("createMovies")
            .with_arg("input", json!([{"title": "Up"}]))
            .with_fields(
                "CreateMoviesMutationResponse",
                vec![ResolveTree::new("movies")
                    .with_fields("Movie", vec![ResolveTree::new("title")])],
            );
        let res = run(
            &Config::default(),
            &AuthorizationContext::default(),
            OperationKind::Mutation,
            tree,
        );
        assert!(res.is_ok());
        let (text, translation) = res.unwrap();
        assert!(text.starts_with("CALL {\n    CREATE (this0:Movie)"));
        assert_eq!(translation.mode, AccessMode::Write);
        assert_eq!(translation.kind, ResultKind::Create);
    }

    #[test]
    fn authentication_on_delete_test() {
        let tree = ResolveTree::new("deletePosts").with_arg("where", json!({"content": "x"}));
        let auth = AuthorizationContext::authenticated(json!({"sub": "u1"}));
        let res = run(&Config::default(), &auth, OperationKind::Mutation, tree);
        assert!(res.is_ok());
        let (text, translation) = res.unwrap();
        assert!(text.starts_with(
            "CALL apoc.util.validate(NOT ($isAuthenticated = true), \"@cypher_graphql/UNAUTHENTICATED\", [0])"
        ));
        assert_eq!(translation.params["isAuthenticated"], json!(true));
        assert_eq!(translation.params["jwt"], json!({"sub": "u1"}));
        assert_eq!(translation.kind, ResultKind::Delete);
    }
}
