use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::ast::{Clause, Expr, ParamContext, Projection, ReturnItem, Statement};
use crate::constants::cypher;
use crate::context::TranslationContext;
use crate::schema::{CypherField, Field};

lazy_static! {
    static ref PARAMETER_RE: Regex = Regex::new(r"\$([_A-Za-z][_0-9A-Za-z]*)").unwrap();
}

/// Rewrites `$name` references to caller arguments into bound parameters. References that
/// are not arguments, `$jwt` for one, are left as written.
pub fn bind_arguments(
    statement: &str,
    args: &IndexMap<String, Value>,
    params: &mut ParamContext,
) -> String {
    let mut bound: IndexMap<String, String> = IndexMap::new();
    PARAMETER_RE
        .replace_all(statement, |caps: &Captures| {
            let name = &caps[1];
            match args.get(name) {
                Some(value) => {
                    let param = bound
                        .entry(name.to_string())
                        .or_insert_with(|| params.bind(value.clone()));
                    format!("${param}")
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// `CALL { WITH v WITH v AS this <statement> }`
pub fn statement_call(variable: &str, statement: String) -> Clause {
    Clause::Call(Statement::new(vec![
        Clause::with_vars(&[variable]),
        Clause::With {
            projection: Projection::items(vec![ReturnItem::new(
                Expr::var(variable),
                cypher::THIS,
            )]),
            filter: None,
        },
        Clause::Raw(statement),
    ]))
}

/// Subquery evaluating a scalar `@cypher` field of `variable`. Returns the clause and the
/// variable the value ends up bound to.
pub fn scalar_subquery(
    ctx: &mut TranslationContext,
    variable: &str,
    field: &Field,
    cypher_field: &CypherField,
    args: &IndexMap<String, Value>,
) -> (Clause, String) {
    let statement = bind_arguments(&cypher_field.statement, args, &mut ctx.params);
    let result = ctx.next_var(cypher::THIS);
    let collected = Expr::func("collect", vec![Expr::var(&result)]);
    let value = if field.list {
        collected
    } else {
        Expr::func("head", vec![collected])
    };
    let clause = Clause::Call(Statement::new(vec![
        Clause::with_vars(&[variable]),
        statement_call(variable, statement),
        Clause::Unwind {
            expr: Expr::var(&cypher_field.column_name),
            variable: result.clone(),
        },
        Clause::Return(Projection::items(vec![ReturnItem::new(value, &result)])),
    ]));
    (clause, result)
}
