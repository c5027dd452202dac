use graphql_parser::query::{
    Directive, Field, FragmentDefinition, Selection, SelectionSet, Text, TypeCondition,
    Value as GqlValue,
};
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{GraphQLError, GraphQLResult};
use crate::resolve_tree::ResolveTree;
use crate::schema::{SchemaModel, Shape};

pub fn alias_or_name<'a, T>(query_field: &Field<'a, T>) -> String
where
    T: Text<'a> + Eq + AsRef<str>,
{
    query_field
        .alias
        .as_ref()
        .map(|x| x.as_ref().to_string())
        .unwrap_or_else(|| query_field.name.as_ref().to_string())
}

/// Flattens fragment spreads and inline fragments into the fields that apply to a value
/// whose type is any of `type_names`, dropping `@skip`/`@include` exclusions.
pub fn normalize_selection_set<'a, 'b, T>(
    selection_set: &'b SelectionSet<'a, T>,
    fragment_definitions: &'b [FragmentDefinition<'a, T>],
    type_names: &[String],
    variables: &Value,
) -> GraphQLResult<Vec<&'b Field<'a, T>>>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let mut selections: Vec<&'b Field<'a, T>> = vec![];

    for selection in &selection_set.items {
        if should_skip(selection, variables)? {
            continue;
        }
        match selection {
            Selection::Field(field) => selections.push(field),
            Selection::FragmentSpread(fragment_spread) => {
                let frag_name = fragment_spread.fragment_name.as_ref();
                let frag_def = fragment_definitions
                    .iter()
                    .find(|x| x.name.as_ref() == frag_name)
                    .ok_or_else(|| {
                        GraphQLError::validation(format!("no fragment named {frag_name}"))
                    })?;

                // Fragments can have type conditions
                // https://spec.graphql.org/June2018/#sec-Type-Conditions
                let applies = match &frag_def.type_condition {
                    TypeCondition::On(frag_type_name) => {
                        type_names.iter().any(|t| t == frag_type_name.as_ref())
                    }
                };
                if applies {
                    selections.extend(normalize_selection_set(
                        &frag_def.selection_set,
                        fragment_definitions,
                        type_names,
                        variables,
                    )?);
                }
            }
            Selection::InlineFragment(inline_fragment) => {
                let inline_fragment_applies: bool = match &inline_fragment.type_condition {
                    Some(TypeCondition::On(infrag_name)) => {
                        type_names.iter().any(|t| t == infrag_name.as_ref())
                    }
                    None => true,
                };

                if inline_fragment_applies {
                    selections.extend(normalize_selection_set(
                        &inline_fragment.selection_set,
                        fragment_definitions,
                        type_names,
                        variables,
                    )?);
                }
            }
        }
    }
    Ok(selections)
}

fn should_skip<'a, T>(selection: &Selection<'a, T>, variables: &Value) -> GraphQLResult<bool>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let directives = match selection {
        Selection::Field(field) => &field.directives,
        Selection::FragmentSpread(fragment_spread) => &fragment_spread.directives,
        Selection::InlineFragment(inline_fragment) => &inline_fragment.directives,
    };

    let skip = evaluate_if_argument(directives, "skip", variables)?.unwrap_or(false);
    let include = evaluate_if_argument(directives, "include", variables)?.unwrap_or(true);
    Ok(skip || !include)
}

fn evaluate_if_argument<'a, T>(
    directives: &[Directive<'a, T>],
    directive_name: &str,
    variables: &Value,
) -> GraphQLResult<Option<bool>>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let val = directives
        .iter()
        .find(|d| d.name.as_ref() == directive_name)
        .and_then(|d| {
            d.arguments
                .iter()
                .find(|(name, _)| name.as_ref() == "if")
                .map(|(_, val)| val)
        });
    Ok(match val {
        None => None,
        Some(GqlValue::Boolean(val)) => Some(*val),
        Some(GqlValue::Variable(var_name)) => {
            let var = variables.get(var_name.as_ref()).ok_or_else(|| {
                GraphQLError::validation(format!(
                    "missing value for variable ${}",
                    var_name.as_ref()
                ))
            })?;
            var.as_bool()
        }
        Some(_) => None,
    })
}

/// Converts a literal argument value, substituting variables
pub fn to_json<'a, T>(graphql_value: &GqlValue<'a, T>, variables: &Value) -> GraphQLResult<Value>
where
    T: Text<'a> + AsRef<str>,
{
    let result = match graphql_value {
        GqlValue::Null => Value::Null,
        GqlValue::Boolean(x) => Value::Bool(*x),
        GqlValue::Int(x) => x
            .as_i64()
            .map(Value::from)
            .ok_or_else(|| GraphQLError::argument("integer value out of range"))?,
        GqlValue::Float(x) => serde_json::Number::from_f64(*x)
            .map(Value::Number)
            .ok_or_else(|| GraphQLError::argument("float value is not finite"))?,
        GqlValue::String(x) => Value::String(x.clone()),
        GqlValue::Enum(x) => Value::String(x.as_ref().to_string()),
        GqlValue::Variable(var_name) => variables
            .get(var_name.as_ref())
            .cloned()
            .unwrap_or(Value::Null),
        GqlValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| to_json(item, variables))
                .collect::<GraphQLResult<Vec<_>>>()?,
        ),
        GqlValue::Object(obj) => {
            let mut map = serde_json::Map::new();
            for (key, value) in obj {
                map.insert(key.as_ref().to_string(), to_json(value, variables)?);
            }
            Value::Object(map)
        }
    };
    Ok(result)
}

/// Builds the resolve trees of the root fields of an operation
pub fn root_resolve_trees<'a, T>(
    selection_set: &SelectionSet<'a, T>,
    root: &Shape,
    schema: &SchemaModel,
    fragment_definitions: &[FragmentDefinition<'a, T>],
    variables: &Value,
) -> GraphQLResult<Vec<ResolveTree>>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let fields = normalize_selection_set(
        selection_set,
        fragment_definitions,
        &[root.type_name()],
        variables,
    )?;
    let children = fields
        .into_iter()
        .map(|field| build_resolve_tree(field, root, schema, fragment_definitions, variables))
        .collect::<GraphQLResult<Vec<_>>>()?;
    Ok(merge(children)?.into_values().collect())
}

pub fn build_resolve_tree<'a, T>(
    field: &Field<'a, T>,
    parent: &Shape,
    schema: &SchemaModel,
    fragment_definitions: &[FragmentDefinition<'a, T>],
    variables: &Value,
) -> GraphQLResult<ResolveTree>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let name = field.name.as_ref();
    let shape = schema
        .child_shape(parent, name)
        .ok_or_else(|| GraphQLError::field_not_found(name, parent.type_name()))?;

    let mut tree = ResolveTree::new(name).with_alias(alias_or_name(field));
    for (arg_name, arg_value) in &field.arguments {
        tree.args
            .insert(arg_name.as_ref().to_string(), to_json(arg_value, variables)?);
    }

    if field.selection_set.items.is_empty() {
        return Ok(tree);
    }
    if shape.is_leaf() {
        return Err(GraphQLError::validation(format!(
            "field {name} of type {} must not have a selection",
            shape.type_name()
        )));
    }

    for concrete in shape.possible_shapes() {
        let mut type_names = vec![concrete.type_name()];
        if concrete != shape {
            type_names.push(shape.type_name());
        }
        if let Shape::Entity(entity) = &concrete {
            type_names.extend(entity.implements.iter().cloned());
        }
        let fields = normalize_selection_set(
            &field.selection_set,
            fragment_definitions,
            &type_names,
            variables,
        )?;
        let children = fields
            .into_iter()
            .map(|f| build_resolve_tree(f, &concrete, schema, fragment_definitions, variables))
            .collect::<GraphQLResult<Vec<_>>>()?;
        tree.fields_by_type_name
            .insert(concrete.type_name(), merge(children)?);
    }
    Ok(tree)
}

/// Merges fields sharing a response key, combining their sub-selections
pub fn merge(fields: Vec<ResolveTree>) -> GraphQLResult<IndexMap<String, ResolveTree>> {
    let mut merged: IndexMap<String, ResolveTree> = IndexMap::new();
    for current_field in fields {
        match merged.get_mut(&current_field.alias) {
            Some(existing_field) => merge_into(existing_field, current_field)?,
            None => {
                merged.insert(current_field.alias.clone(), current_field);
            }
        }
    }
    Ok(merged)
}

fn merge_into(existing: &mut ResolveTree, other: ResolveTree) -> GraphQLResult<()> {
    if existing.name != other.name {
        return Err(GraphQLError::validation(format!(
            "Field {} and {} are different",
            other.name, existing.name
        )));
    }
    for (type_name, fields) in other.fields_by_type_name {
        let target = existing.fields_by_type_name.entry(type_name).or_default();
        for (key, field) in fields {
            match target.get_mut(&key) {
                Some(e) => merge_into(e, field)?,
                None => {
                    target.insert(key, field);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::movie_schema;
    use graphql_parser::query::{parse_query, Definition, OperationDefinition};
    use serde_json::json;

    fn trees(query: &str, variables: Value) -> GraphQLResult<Vec<ResolveTree>> {
        let schema = movie_schema();
        let document = parse_query::<&str>(query).unwrap();
        let mut fragments = vec![];
        let mut selection_set = None;
        for def in document.definitions {
            match def {
                Definition::Fragment(f) => fragments.push(f),
                Definition::Operation(OperationDefinition::Query(q)) => {
                    selection_set = Some(q.selection_set)
                }
                Definition::Operation(OperationDefinition::SelectionSet(s)) => {
                    selection_set = Some(s)
                }
                _ => {}
            }
        }
        root_resolve_trees(
            &selection_set.unwrap(),
            &Shape::Query,
            &schema,
            &fragments,
            &variables,
        )
    }

    #[test]
    fn simple_selection_test() {
        let res = trees(
            r#"{ movies(where: {title: "Matrix"}) { title t: title released } }"#,
            json!({}),
        );
        assert!(res.is_ok());
        let res = res.unwrap();
        assert_eq!(res.len(), 1);
        let movies = &res[0];
        assert_eq!(movies.args["where"], json!({"title": "Matrix"}));
        let fields = &movies.fields_by_type_name["Movie"];
        assert_eq!(
            fields.keys().cloned().collect::<Vec<_>>(),
            vec!["title", "t", "released"]
        );
        assert_eq!(fields["t"].name, "title");
    }

    #[test]
    fn variables_and_directives_test() {
        let res = trees(
            r#"query Q($w: MovieWhere, $skip: Boolean!) {
                movies(where: $w) { title released @skip(if: $skip) tags @include(if: false) }
            }"#,
            json!({"w": {"released_GT": 2000}, "skip": true}),
        )
        .unwrap();
        let movies = &res[0];
        assert_eq!(movies.args["where"], json!({"released_GT": 2000}));
        assert_eq!(movies.fields_by_type_name["Movie"].len(), 1);
    }

    #[test]
    fn fragments_and_merging_test() {
        let res = trees(
            r#"
            { movies { ...M actors { name } actors { born } } }
            fragment M on Movie { title }
            "#,
            json!({}),
        )
        .unwrap();
        let fields = &res[0].fields_by_type_name["Movie"];
        assert!(fields.contains_key("title"));
        let actors = &fields["actors"].fields_by_type_name["Actor"];
        assert_eq!(actors.len(), 2);
    }

    #[test]
    fn abstract_selection_is_keyed_per_concrete_type_test() {
        let res = trees(
            r#"{ movies { related { __typename ... on Movie { title } ... on Genre { name } } } }"#,
            json!({}),
        )
        .unwrap();
        let search = &res[0].fields_by_type_name["Movie"]["related"];
        let movie = &search.fields_by_type_name["Movie"];
        let genre = &search.fields_by_type_name["Genre"];
        assert!(movie.contains_key("__typename") && movie.contains_key("title"));
        assert!(genre.contains_key("__typename") && genre.contains_key("name"));
        assert!(!genre.contains_key("title"));
    }

    #[test]
    fn unknown_field_test() {
        let res = trees("{ movies { nope } }", json!({}));
        assert!(matches!(res, Err(GraphQLError::FieldNotFound { .. })));
    }

    #[test]
    fn conflicting_response_keys_test() {
        let res = trees("{ movies { a: title a: released } }", json!({}));
        assert!(res.unwrap_err().is_validation());
    }
}
