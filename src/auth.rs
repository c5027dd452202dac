use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::{Clause, Expr, ParamContext};
use crate::constants::{cypher, signals};
use crate::context::TranslationContext;
use crate::error::GraphQLResult;
use crate::filter::{compile_authorization_where, compile_jwt_where, Predicate};
use crate::schema::Entity;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationOperation {
    Read,
    Aggregate,
    Create,
    Update,
    Delete,
    CreateRelationship,
    DeleteRelationship,
    Subscribe,
}

fn all_operations() -> Vec<AuthorizationOperation> {
    use AuthorizationOperation::*;
    vec![
        Read,
        Aggregate,
        Create,
        Update,
        Delete,
        CreateRelationship,
        DeleteRelationship,
        Subscribe,
    ]
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidateWhen {
    Before,
    After,
}

fn both_phases() -> Vec<ValidateWhen> {
    vec![ValidateWhen::Before, ValidateWhen::After]
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct AuthenticationAnnotation {
    #[serde(default = "all_operations")]
    pub operations: Vec<AuthorizationOperation>,
    /// Where on JWT claims that must hold in addition to being authenticated
    #[serde(default)]
    pub jwt: Option<Value>,
}

/// Condition of an authorization rule. `node` filters the guarded node, `jwt` the caller's
/// claims.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AuthorizationWhere {
    #[serde(default)]
    pub node: Option<Value>,
    #[serde(default)]
    pub jwt: Option<Value>,
    #[serde(default, rename = "AND")]
    pub and: Vec<AuthorizationWhere>,
    #[serde(default, rename = "OR")]
    pub or: Vec<AuthorizationWhere>,
    #[serde(default, rename = "NOT")]
    pub not: Option<Box<AuthorizationWhere>>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationFilterRule {
    #[serde(default = "all_operations")]
    pub operations: Vec<AuthorizationOperation>,
    #[serde(default = "default_true")]
    pub require_authentication: bool,
    #[serde(rename = "where")]
    pub where_: AuthorizationWhere,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationValidateRule {
    #[serde(default = "all_operations")]
    pub operations: Vec<AuthorizationOperation>,
    #[serde(default = "both_phases")]
    pub when: Vec<ValidateWhen>,
    #[serde(default = "default_true")]
    pub require_authentication: bool,
    #[serde(rename = "where")]
    pub where_: AuthorizationWhere,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AuthorizationAnnotation {
    #[serde(default)]
    pub filter: Vec<AuthorizationFilterRule>,
    #[serde(default)]
    pub validate: Vec<AuthorizationValidateRule>,
}

/// Who is asking. Produced by whatever decoded the request's JWT.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthorizationContext {
    pub is_authenticated: bool,
    pub claims: Option<IndexMap<String, String>>,
    pub jwt: Option<Value>,
}

impl AuthorizationContext {
    pub fn authenticated(jwt: Value) -> Self {
        Self {
            is_authenticated: true,
            claims: None,
            jwt: Some(jwt),
        }
    }

    /// The decoded token, falling back to the flat claims map
    pub fn jwt_value(&self) -> Value {
        match (&self.jwt, &self.claims) {
            (Some(jwt), _) => jwt.clone(),
            (None, Some(claims)) => Value::Object(
                claims
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            (None, None) => Value::Object(Default::default()),
        }
    }

    /// Binds `$isAuthenticated` and `$jwt`, the only names authorization predicates use
    pub fn bind(&self, params: &mut ParamContext) {
        params.bind_named(cypher::IS_AUTHENTICATED, Value::Bool(self.is_authenticated));
        params.bind_named(cypher::JWT, self.jwt_value());
    }
}

fn is_authenticated() -> Expr {
    Expr::eq(Expr::param(cypher::IS_AUTHENTICATED), Expr::bool(true))
}

/// Aborts with the unauthenticated signal when `entity` demands authentication for
/// `operation` and the caller has none.
pub fn authentication_clause(
    ctx: &mut TranslationContext,
    entity: &Entity,
    operation: AuthorizationOperation,
) -> GraphQLResult<Option<Clause>> {
    let annotation = match &entity.authentication {
        Some(annotation) if annotation.operations.contains(&operation) => annotation,
        _ => return Ok(None),
    };
    let mut condition = vec![is_authenticated()];
    if let Some(jwt) = &annotation.jwt {
        condition.extend(compile_jwt_where(ctx, jwt)?.expr);
    }
    let condition = Expr::and_all(condition).unwrap_or_else(|| Expr::bool(true));
    Ok(Some(Clause::validate(
        Expr::not(condition),
        signals::UNAUTHENTICATED,
    )))
}

fn compile_rule_where(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    where_: &AuthorizationWhere,
) -> GraphQLResult<Predicate> {
    let mut predicate = Predicate::default();
    if let Some(node) = &where_.node {
        predicate = predicate.and(compile_authorization_where(ctx, entity, variable, node)?);
    }
    if let Some(jwt) = &where_.jwt {
        predicate = predicate.and(compile_jwt_where(ctx, jwt)?);
    }
    for inner in &where_.and {
        predicate = predicate.and(compile_rule_where(ctx, entity, variable, inner)?);
    }
    if !where_.or.is_empty() {
        let mut branches = vec![];
        let mut unconditional = false;
        for inner in &where_.or {
            let inner = compile_rule_where(ctx, entity, variable, inner)?;
            predicate.subqueries.extend(inner.subqueries);
            match inner.expr {
                Some(expr) => branches.push(expr),
                None => unconditional = true,
            }
        }
        if !unconditional {
            predicate = predicate.and(Predicate::new(Expr::or_all(branches)));
        }
    }
    if let Some(inner) = &where_.not {
        let inner = compile_rule_where(ctx, entity, variable, inner)?;
        predicate = predicate.and(Predicate {
            expr: inner.expr.map(Expr::not),
            subqueries: inner.subqueries,
        });
    }
    Ok(predicate)
}

/// OR of the given rules. `None` when no rule applies at all.
fn any_rule<'r>(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    rules: impl Iterator<Item = (bool, &'r AuthorizationWhere)>,
) -> GraphQLResult<Option<Predicate>> {
    let mut applied = false;
    let mut unconditional = false;
    let mut subqueries = vec![];
    let mut branches = vec![];
    for (require_authentication, where_) in rules {
        applied = true;
        let rule = compile_rule_where(ctx, entity, variable, where_)?;
        subqueries.extend(rule.subqueries);
        let guard = require_authentication.then(is_authenticated);
        match Expr::and_all(guard.into_iter().chain(rule.expr).collect()) {
            Some(expr) => branches.push(expr),
            None => unconditional = true,
        }
    }
    if !applied {
        return Ok(None);
    }
    let expr = if unconditional {
        None
    } else {
        Expr::or_all(branches)
    };
    Ok(Some(Predicate { expr, subqueries }))
}

/// Restricts `variable` to the nodes the caller may see through `operation`. Rows that do
/// not match are silently dropped.
pub fn filter_predicate(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    operation: AuthorizationOperation,
) -> GraphQLResult<Predicate> {
    let rules = match &entity.authorization {
        Some(annotation) => annotation
            .filter
            .iter()
            .filter(|rule| rule.operations.contains(&operation))
            .map(|rule| (rule.require_authentication, &rule.where_))
            .collect::<Vec<_>>(),
        None => return Ok(Predicate::default()),
    };
    Ok(any_rule(ctx, entity, variable, rules.into_iter())?.unwrap_or_default())
}

/// `apoc.util.validatePredicate(NOT (rules), FORBIDDEN, [0])` for the validate rules of
/// `entity` matching `operation` and `when`. Evaluates to true unless the rules reject.
pub fn validate_predicate(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    operation: AuthorizationOperation,
    when: ValidateWhen,
) -> GraphQLResult<Predicate> {
    let rules = match &entity.authorization {
        Some(annotation) => annotation
            .validate
            .iter()
            .filter(|rule| rule.operations.contains(&operation) && rule.when.contains(&when))
            .map(|rule| (rule.require_authentication, &rule.where_))
            .collect::<Vec<_>>(),
        None => return Ok(Predicate::default()),
    };
    let predicate = match any_rule(ctx, entity, variable, rules.into_iter())? {
        Some(predicate) => predicate,
        None => return Ok(Predicate::default()),
    };
    let expr = predicate.expr.map(|allowed| {
        Expr::func(
            "apoc.util.validatePredicate",
            vec![
                Expr::not(allowed),
                Expr::string(signals::FORBIDDEN),
                Expr::List(vec![Expr::int(0)]),
            ],
        )
    });
    Ok(Predicate {
        expr,
        subqueries: predicate.subqueries,
    })
}

/// Validate rules as standalone clauses, for use between write stages
pub fn validate_clauses(
    ctx: &mut TranslationContext,
    entity: &Entity,
    variable: &str,
    operation: AuthorizationOperation,
    when: ValidateWhen,
) -> GraphQLResult<Vec<Clause>> {
    let predicate = validate_predicate(ctx, entity, variable, operation, when)?;
    let mut clauses = predicate.subqueries;
    if let Some(expr) = predicate.expr {
        clauses.push(Clause::with_star_where(expr));
    }
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Dialect, Statement};
    use crate::config::Config;
    use crate::test_fixtures::{context, movie_schema};
    use serde_json::json;

    fn render(clauses: Vec<Clause>) -> String {
        Statement::new(clauses).render(Dialect::default())
    }

    #[test]
    fn deserialize_annotations_test() {
        let schema = movie_schema();
        let post = schema.entity("Post").unwrap();
        let authorization = post.authorization.as_ref().unwrap();
        assert_eq!(authorization.filter.len(), 1);
        assert!(authorization.filter[0].require_authentication);
        assert_eq!(authorization.filter[0].operations.len(), 8);
        assert_eq!(authorization.validate[0].when, vec![ValidateWhen::After]);
        assert_eq!(
            authorization.validate[0].operations,
            vec![AuthorizationOperation::Create, AuthorizationOperation::Update]
        );
        assert_eq!(
            post.authentication.as_ref().unwrap().operations,
            vec![AuthorizationOperation::Delete]
        );
    }

    #[test]
    fn authentication_clause_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let post = schema.entity("Post").unwrap().clone();

        let res = authentication_clause(&mut ctx, &post, AuthorizationOperation::Delete);
        assert!(res.is_ok());
        let res = res.unwrap();
        assert_eq!(
            render(res.into_iter().collect()),
            "CALL apoc.util.validate(NOT ($isAuthenticated = true), \"@cypher_graphql/UNAUTHENTICATED\", [0])"
        );
        let res = authentication_clause(&mut ctx, &post, AuthorizationOperation::Read).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn filter_predicate_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let post = schema.entity("Post").unwrap().clone();
        let predicate =
            filter_predicate(&mut ctx, &post, "this", AuthorizationOperation::Read).unwrap();
        assert_eq!(
            render(vec![Clause::with_star_where(predicate.expr.unwrap())]),
            "WITH *\nWHERE ($isAuthenticated = true AND EXISTS { MATCH (this)<-[:HAS_POST]-(this0:User) WHERE this0.id = $jwt.sub })"
        );

        let movie = schema.entity("Movie").unwrap().clone();
        let predicate =
            filter_predicate(&mut ctx, &movie, "this", AuthorizationOperation::Read).unwrap();
        assert!(predicate.is_empty());
    }

    #[test]
    fn validate_clauses_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let user = schema.entity("User").unwrap().clone();
        let clauses = validate_clauses(
            &mut ctx,
            &user,
            "this",
            AuthorizationOperation::Delete,
            ValidateWhen::Before,
        )
        .unwrap();
        assert_eq!(
            render(clauses),
            "WITH *\nWHERE apoc.util.validatePredicate(NOT ($param0 IN $jwt.roles), \"@cypher_graphql/FORBIDDEN\", [0])"
        );

        let post = schema.entity("Post").unwrap().clone();
        let clauses = validate_clauses(
            &mut ctx,
            &post,
            "this",
            AuthorizationOperation::Create,
            ValidateWhen::Before,
        )
        .unwrap();
        assert!(clauses.is_empty());
        let clauses = validate_clauses(
            &mut ctx,
            &post,
            "this",
            AuthorizationOperation::Create,
            ValidateWhen::After,
        )
        .unwrap();
        assert_eq!(clauses.len(), 1);
    }

    #[test]
    fn rule_junctions_test() {
        let schema = movie_schema();
        let config = Config::default();
        let mut ctx = context(&schema, &config);
        let user = schema.entity("User").unwrap().clone();
        let where_: AuthorizationWhere = serde_json::from_value(json!({
            "OR": [
                {"node": {"id": "$jwt.sub"}},
                {"jwt": {"admin": true}}
            ],
            "NOT": {"node": {"name": "root"}}
        }))
        .unwrap();
        let predicate = compile_rule_where(&mut ctx, &user, "this", &where_).unwrap();
        assert_eq!(
            render(vec![Clause::with_star_where(predicate.expr.unwrap())]),
            "WITH *\nWHERE ((this.id = $jwt.sub OR $jwt.admin = $param0) AND NOT (this.name = $param1))"
        );
    }

    #[test]
    fn bind_context_test() {
        let mut params = ParamContext::default();
        AuthorizationContext::authenticated(json!({"sub": "u1"})).bind(&mut params);
        assert_eq!(params.params["isAuthenticated"], json!(true));
        assert_eq!(params.params["jwt"], json!({"sub": "u1"}));

        let mut claims = IndexMap::new();
        claims.insert("sub".to_string(), "u2".to_string());
        let auth = AuthorizationContext {
            is_authenticated: false,
            claims: Some(claims),
            jwt: None,
        };
        let mut params = ParamContext::default();
        auth.bind(&mut params);
        assert_eq!(params.params["jwt"], json!({"sub": "u2"}));
        assert_eq!(
            AuthorizationContext::default().jwt_value(),
            json!({})
        );
    }
}
