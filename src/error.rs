use graphql_parser::query::ParseError as GraphQLParseError;
use thiserror::Error;

use crate::executor::ExecutorError;

/// Central error type for translation, execution and result shaping.
#[derive(Debug, Error)]
pub enum GraphQLError {
    /// GraphQL query parsing errors
    #[error("Parse error: {0}")]
    Parse(#[from] GraphQLParseError),

    /// Field resolution errors
    #[error("Field not found: {field} on type {type_name}")]
    FieldNotFound { field: String, type_name: String },

    /// Malformed arguments, disallowed filter operators, bad aggregation references
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required relationship was missing or duplicated after a write
    #[error("{message}")]
    RelationshipRequirement {
        type_name: String,
        field: String,
        message: String,
    },

    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthenticated")]
    Unauthenticated,

    /// The cached database version no longer matches the server. Consumed by the
    /// retry boundary and never surfaced unless the retry fails as well.
    #[error("Database version mismatch: expected {expected}, found {actual}")]
    VersionMismatch { expected: String, actual: String },

    /// Upstream executor errors, passed through unchanged
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// General operation errors with context
    #[error("{context}: {message}")]
    Operation { context: String, message: String },
}

impl GraphQLError {
    /// Creates a field not found error
    pub fn field_not_found(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::FieldNotFound {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn relationship_requirement(
        type_name: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RelationshipRequirement {
            type_name: type_name.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Operation {
            context: "Schema error".to_string(),
            message: message.into(),
        }
    }

    /// Creates an argument error
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Operation {
            context: "Argument error".to_string(),
            message: message.into(),
        }
    }

    /// Creates an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Operation {
            context: "Internal error".to_string(),
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error
    pub fn unsupported_operation(operation: impl Into<String>) -> Self {
        Self::Operation {
            context: "Operation not supported".to_string(),
            message: operation.into(),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Operation {
            context: "Configuration error".to_string(),
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Type alias for Results that use GraphQLError
pub type GraphQLResult<T> = Result<T, GraphQLError>;
