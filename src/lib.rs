//! Translates GraphQL operations over a graph schema into parameterized Cypher, runs them
//! through an [`Executor`] and reshapes the rows into GraphQL responses.
//!
//! Mutations can additionally collect change records, which are turned into
//! subscription events and handed to a [`SubscriptionsEngine`].

pub mod aggregate;
pub mod ast;
pub mod auth;
pub mod config;
pub mod constants;
pub mod context;
pub mod cursor;
pub mod cypher_field;
pub mod error;
pub mod event_filter;
pub mod events;
pub mod executor;
pub mod filter;
pub mod mutation;
pub mod mutation_meta;
pub mod omit;
pub mod pagination;
pub mod parser_util;
pub mod projection;
pub mod resolve;
pub mod resolve_tree;
pub mod schema;
pub mod shape;
pub mod translate;

#[cfg(test)]
pub mod test_fixtures;

pub use auth::AuthorizationContext;
pub use config::Config;
pub use error::{GraphQLError, GraphQLResult};
pub use event_filter::{EventFilter, SubscriptionFilter};
pub use events::{SubscriptionsEngine, SubscriptionsEvent};
pub use executor::{
    AccessMode, DatabaseInfo, DatabaseInfoCache, ExecutionResult, Executor, ExecutorError,
};
pub use omit::GraphQLResponse;
pub use resolve::Resolver;
pub use schema::SchemaModel;
pub use translate::{translate, Translation};
