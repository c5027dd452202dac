use crate::ast::{Dialect, ParamContext};
use crate::config::Config;
use crate::error::{GraphQLError, GraphQLResult};
use crate::schema::{SchemaModel, SearchIndex};

/// Extra state attached to a single field while it is being translated
#[derive(Clone, Debug, PartialEq)]
pub enum FieldMeta {
    /// A fulltext or vector index query, scores are bound to `score_variable`
    Search {
        index: SearchIndex,
        score_variable: String,
    },
    /// An aggregation over the matches bound to `target_variable`
    Aggregate { target_variable: String },
}

/// Everything translation of one operation needs. Owns the parameters and the name
/// counter, so identical inputs always produce identical query text.
pub struct TranslationContext<'a> {
    pub schema: &'a SchemaModel,
    pub config: &'a Config,
    pub dialect: Dialect,
    pub params: ParamContext,
    field_meta: Option<FieldMeta>,
    depth: usize,
}

impl<'a> TranslationContext<'a> {
    pub fn new(schema: &'a SchemaModel, config: &'a Config, dialect: Dialect) -> Self {
        Self {
            schema,
            config,
            dialect,
            params: ParamContext::default(),
            field_meta: None,
            depth: 0,
        }
    }

    pub fn field_meta(&self) -> Option<&FieldMeta> {
        self.field_meta.as_ref()
    }

    /// Runs `f` with `meta` attached, restoring whatever was attached before
    pub fn with_field_meta<R>(&mut self, meta: FieldMeta, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.field_meta.replace(meta);
        let result = f(self);
        self.field_meta = previous;
        result
    }

    /// Runs `f` one relationship level deeper. Field meta belongs to the enclosing field
    /// and is hidden from nested ones.
    pub fn nested<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> GraphQLResult<R>,
    ) -> GraphQLResult<R> {
        self.deeper(|ctx| {
            let previous = ctx.field_meta.take();
            let result = f(ctx);
            ctx.field_meta = previous;
            result
        })
    }

    /// Runs `f` one nesting level deeper within the same field, as logical operators do
    pub fn deeper<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> GraphQLResult<R>,
    ) -> GraphQLResult<R> {
        if self.depth >= self.config.max_depth {
            return Err(GraphQLError::validation(format!(
                "selection exceeds the maximum depth of {}",
                self.config.max_depth
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub fn next_var(&mut self, prefix: &str) -> String {
        self.params.next_var(prefix)
    }
}
