use std::sync::Arc;

use graphql_parser::query::{
    parse_query, Definition, Document, FragmentDefinition, OperationDefinition, Text,
};
use itertools::Itertools;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;

use crate::auth::AuthorizationContext;
use crate::config::Config;
use crate::constants::{cypher, introspection, root};
use crate::error::{GraphQLError, GraphQLResult};
use crate::events::{parse_mutation_meta, publish_events, SubscriptionsEngine};
use crate::executor::{execute_with_retry, AccessMode, DatabaseInfoCache, ExecutionResult, Executor};
use crate::omit::{ErrorMessage, GraphQLResponse, Omit};
use crate::parser_util::root_resolve_trees;
use crate::resolve_tree::ResolveTree;
use crate::schema::{OperationKind, SchemaModel, Shape};
use crate::shape::Shaper;
use crate::translate::{translate, Translation};

/// Resolves GraphQL documents against a database.
///
/// Root fields of a query are resolved one after another and each failure is reported
/// on its own. A mutation stops at its first failing root field.
pub struct Resolver {
    schema: Arc<SchemaModel>,
    config: Config,
    executor: Arc<dyn Executor>,
    cache: Arc<DatabaseInfoCache>,
    engine: Option<Arc<dyn SubscriptionsEngine>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

/// The selected operation, normalized
struct Operation {
    kind: OperationKind,
    trees: Vec<ResolveTree>,
}

impl Resolver {
    pub fn new(
        schema: Arc<SchemaModel>,
        config: Config,
        executor: Arc<dyn Executor>,
        cache: Arc<DatabaseInfoCache>,
    ) -> Self {
        Self {
            schema,
            config,
            executor,
            cache,
            engine: None,
            pending: Mutex::new(vec![]),
        }
    }

    /// Publishes the events of successful mutations to `engine`. Only takes effect when
    /// `subscriptions` is enabled in the config, since that is what makes mutations
    /// collect their change records.
    pub fn with_engine(mut self, engine: Arc<dyn SubscriptionsEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub async fn resolve_document(
        &self,
        query: &str,
        variables: &Value,
        operation_name: Option<&str>,
        auth: &AuthorizationContext,
    ) -> GraphQLResponse {
        if !variables.is_object() {
            return GraphQLResponse::error("variables must be an object");
        }
        let operation = match parse_query::<&str>(query) {
            Ok(document) => select_operation(document, variables, operation_name, &self.schema),
            Err(err) => Err(GraphQLError::from(err).to_string()),
        };
        let operation = match operation {
            Ok(operation) => operation,
            Err(message) => return GraphQLResponse::error(message),
        };
        if operation.trees.is_empty() {
            return GraphQLResponse::error("Selection set must not be empty");
        }

        let mut data = Map::new();
        let mut errors: Vec<ErrorMessage> = vec![];
        for tree in &operation.trees {
            match self.resolve_field(operation.kind, tree, auth).await {
                Ok(value) => {
                    data.insert(tree.alias.clone(), value);
                }
                Err(err) => {
                    tracing::debug!(field = %tree.name, error = %err, "root field failed");
                    errors.push(ErrorMessage {
                        message: err.to_string(),
                    });
                    if operation.kind == OperationKind::Mutation {
                        break;
                    }
                }
            }
        }

        GraphQLResponse {
            data: match errors.len() {
                0 => Omit::Present(Value::Object(data)),
                _ => Omit::Present(Value::Null),
            },
            errors: match errors.len() {
                0 => Omit::Omitted,
                _ => Omit::Present(errors),
            },
        }
    }

    /// Waits for every event batch handed to the subscriptions engine so far
    pub async fn flush_events(&self) {
        let handles = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "event publishing task failed");
            }
        }
    }

    async fn resolve_field(
        &self,
        kind: OperationKind,
        tree: &ResolveTree,
        auth: &AuthorizationContext,
    ) -> GraphQLResult<Value> {
        if tree.name == introspection::TYPENAME {
            return Ok(json!(match kind {
                OperationKind::Query => root::QUERY,
                OperationKind::Mutation => root::MUTATION,
            }));
        }
        let mode = match kind {
            OperationKind::Query => AccessMode::Read,
            OperationKind::Mutation => AccessMode::Write,
        };

        // Rebuilt per dialect. The translation kept is the one that ran.
        let last: Mutex<Option<Translation>> = Mutex::new(None);
        let mut result = execute_with_retry(
            self.executor.as_ref(),
            &self.cache,
            mode,
            self.config.query_timeout_ms,
            |dialect| {
                let translation = translate(&self.schema, &self.config, dialect, auth, kind, tree)?;
                let rendered = translation.render(dialect);
                *last.lock() = Some(translation);
                Ok(rendered)
            },
        )
        .await?;
        let translation = last
            .into_inner()
            .ok_or_else(|| GraphQLError::internal("no statement was rendered"))?;

        let meta = match kind {
            OperationKind::Mutation if self.config.subscriptions => take_mutation_meta(&mut result),
            _ => vec![],
        };
        let value = Shaper::new(&self.schema, self.config.pagination.has_previous_page)
            .shape(&translation, result)?;
        self.publish(&meta);
        Ok(value)
    }

    fn publish(&self, meta: &[Value]) {
        let engine = match &self.engine {
            Some(engine) if !meta.is_empty() => engine.clone(),
            _ => return,
        };
        let events = parse_mutation_meta(meta, &self.schema);
        if let Some(handle) = publish_events(engine, events) {
            let mut pending = self.pending.lock();
            pending.retain(|handle| !handle.is_finished());
            pending.push(handle);
        }
    }
}

/// Removes the change records from every row, in row order
fn take_mutation_meta(result: &mut ExecutionResult) -> Vec<Value> {
    result
        .records
        .iter_mut()
        .filter_map(|record| record.remove(cypher::MUTATE_META))
        .flat_map(|meta| match meta {
            Value::Array(items) => items,
            Value::Null => vec![],
            other => vec![other],
        })
        .collect()
}

fn select_operation<'a, T>(
    document: Document<'a, T>,
    variables: &Value,
    operation_name: Option<&str>,
    schema: &SchemaModel,
) -> Result<Operation, String>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    // Removes FragmentDefinitions
    let mut operation_defs: Vec<OperationDefinition<T>> = vec![];
    let mut fragment_defs: Vec<FragmentDefinition<T>> = vec![];

    for def in document.definitions {
        match def {
            Definition::Operation(v) => operation_defs.push(v),
            Definition::Fragment(v) => fragment_defs.push(v),
        }
    }

    let operation_names: Vec<Option<String>> = operation_defs
        .iter()
        .map(|def| match def {
            OperationDefinition::Query(q) => q.name.as_ref().map(|x| x.as_ref().to_string()),
            OperationDefinition::Mutation(m) => m.name.as_ref().map(|x| x.as_ref().to_string()),
            OperationDefinition::Subscription(s) => {
                s.name.as_ref().map(|x| x.as_ref().to_string())
            }
            OperationDefinition::SelectionSet(_) => None,
        })
        .collect();

    if operation_names.iter().filter(|x| x.is_none()).count() >= 1 && operation_names.len() > 1 {
        return Err("Anonymous operations must be the only defined operation".to_string());
    }

    if operation_names.iter().unique().count() != operation_names.len() {
        return Err("Operation names must be unique".to_string());
    }

    let requested = operation_name.map(str::to_string);
    let maybe_op = operation_defs
        .into_iter()
        .zip(&operation_names)
        .find(|x| {
            // Names match
            *x.1 == requested
            // Or only 1 operation, and no operation was requested by name
            || (operation_names.len() == 1 && requested.is_none())
        })
        .map(|x| x.0);

    let (kind, selection_set) = match maybe_op {
        None => return Err("Operation not found".to_string()),
        Some(OperationDefinition::Query(query)) => (OperationKind::Query, query.selection_set),
        Some(OperationDefinition::SelectionSet(selection_set)) => {
            (OperationKind::Query, selection_set)
        }
        Some(OperationDefinition::Mutation(mutation)) => {
            (OperationKind::Mutation, mutation.selection_set)
        }
        Some(OperationDefinition::Subscription(_)) => {
            return Err("Subscriptions are not supported".to_string())
        }
    };
    let root = match kind {
        OperationKind::Query => Shape::Query,
        OperationKind::Mutation => Shape::Mutation,
    };
    let trees = root_resolve_trees(&selection_set, &root, schema, &fragment_defs, variables)
        .map_err(|err| err.to_string())?;
    Ok(Operation { kind, trees })
}
