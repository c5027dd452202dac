//! The seam between translation and the database driver.
//!
//! Drivers implement [`Executor`]. Everything on this side of the trait is driver
//! agnostic: the version cache, timeouts, the single retry after a version change and
//! the mapping of database signals back into [`GraphQLError`]s.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ast::Dialect;
use crate::constants::signals;
use crate::error::{GraphQLError, GraphQLResult};

lazy_static! {
    static ref RELATIONSHIP_REQUIRED: Regex =
        Regex::new(r"@cypher_graphql/RELATIONSHIP-REQUIRED (\w+)\.(\w+)(.*)").unwrap();
    static ref DIALECT_ERROR: Regex =
        Regex::new(r"(?i)(syntax ?error|unknown function|invalid input)").unwrap();
    static ref VERSION: Regex = Regex::new(r"^(\d+)").unwrap();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
}

/// Counters the database reports for a write
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatistics {
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionResult {
    /// One map per returned row, keyed by column
    pub records: Vec<Map<String, Value>>,
    pub statistics: QueryStatistics,
    pub bookmark: Option<String>,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// An error raised by the database while running a statement
    #[error("{message}")]
    Database {
        code: Option<String>,
        message: String,
    },

    #[error("query timed out after {0} ms")]
    Timeout(u64),

    #[error("connection error: {0}")]
    Connection(String),
}

impl ExecutorError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            code: None,
            message: message.into(),
        }
    }

    /// Errors the statement could have avoided had it been rendered for another version
    fn is_dialect_error(&self) -> bool {
        match self {
            Self::Database { code, message } => {
                code.as_deref().map_or(false, |c| DIALECT_ERROR.is_match(c))
                    || DIALECT_ERROR.is_match(message)
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub version: String,
    #[serde(default)]
    pub edition: Option<String>,
}

impl DatabaseInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            edition: None,
        }
    }

    /// Unparseable versions are assumed current
    pub fn dialect(&self) -> Dialect {
        VERSION
            .captures(&self.version)
            .and_then(|c| c[1].parse().ok())
            .map(|major| Dialect { major })
            .unwrap_or_default()
    }
}

/// Runs rendered statements. Implemented by drivers, and by in-memory fakes in tests.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        params: &Map<String, Value>,
        mode: AccessMode,
    ) -> Result<ExecutionResult, ExecutorError>;

    async fn database_info(&self) -> Result<DatabaseInfo, ExecutorError>;
}

/// Lazily loaded database version. Concurrent loads may race, the last one wins.
#[derive(Debug, Default)]
pub struct DatabaseInfoCache {
    inner: RwLock<Option<DatabaseInfo>>,
}

impl DatabaseInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that starts out knowing the version
    pub fn with_info(info: DatabaseInfo) -> Self {
        Self {
            inner: RwLock::new(Some(info)),
        }
    }

    pub fn get(&self) -> Option<DatabaseInfo> {
        self.inner.read().clone()
    }

    pub async fn get_or_load(&self, executor: &dyn Executor) -> GraphQLResult<DatabaseInfo> {
        if let Some(info) = self.get() {
            return Ok(info);
        }
        let info = executor.database_info().await?;
        tracing::debug!(version = %info.version, "loaded database version");
        self.replace(info.clone());
        Ok(info)
    }

    pub fn replace(&self, info: DatabaseInfo) {
        *self.inner.write() = Some(info);
    }

    pub fn invalidate(&self) {
        *self.inner.write() = None;
    }
}

/// A statement ready to run: text and parameters
pub type Rendered = (String, Map<String, Value>);

/// Renders with the cached dialect and runs the result. When the database rejects the
/// text and reports a different version than the cached one, the cache is refreshed and
/// the statement rendered and run once more.
pub async fn execute_with_retry<F>(
    executor: &dyn Executor,
    cache: &DatabaseInfoCache,
    mode: AccessMode,
    timeout_ms: Option<u64>,
    render: F,
) -> GraphQLResult<ExecutionResult>
where
    F: Fn(Dialect) -> GraphQLResult<Rendered>,
{
    let info = cache.get_or_load(executor).await?;
    let (query, params) = render(info.dialect())?;
    let err = match run(executor, &query, &params, mode, timeout_ms).await {
        Ok(result) => return Ok(result),
        Err(err) if err.is_dialect_error() => err,
        Err(err) => return Err(map_error(err)),
    };

    let fresh = executor.database_info().await?;
    if fresh.dialect() == info.dialect() {
        return Err(map_error(err));
    }
    let mismatch = GraphQLError::VersionMismatch {
        expected: info.version,
        actual: fresh.version.clone(),
    };
    tracing::info!(%mismatch, "retrying with the refreshed database version");
    cache.replace(fresh.clone());
    let (query, params) = render(fresh.dialect())?;
    run(executor, &query, &params, mode, timeout_ms)
        .await
        .map_err(map_error)
}

async fn run(
    executor: &dyn Executor,
    query: &str,
    params: &Map<String, Value>,
    mode: AccessMode,
    timeout_ms: Option<u64>,
) -> Result<ExecutionResult, ExecutorError> {
    tracing::debug!(
        query,
        params = ?params.keys().collect::<Vec<_>>(),
        ?mode,
        "executing statement"
    );
    let execution = executor.execute(query, params, mode);
    match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), execution)
            .await
            .map_err(|_| ExecutorError::Timeout(ms))?,
        None => execution.await,
    }
}

/// Recovers the error kinds signalled from inside a statement. Anything unrecognized
/// passes through unchanged.
pub fn map_error(err: ExecutorError) -> GraphQLError {
    let message = match &err {
        ExecutorError::Database { message, .. } => message.as_str(),
        _ => {
            tracing::error!(error = %err, "executor failed");
            return GraphQLError::Executor(err);
        }
    };
    if message.contains(signals::FORBIDDEN) {
        return GraphQLError::Forbidden;
    }
    if message.contains(signals::UNAUTHENTICATED) {
        return GraphQLError::Unauthenticated;
    }
    if let Some(captures) = RELATIONSHIP_REQUIRED.captures(message) {
        let type_name = captures[1].to_string();
        let field = captures[2].to_string();
        let detail = captures[3].trim();
        let message = format!("{type_name}.{field} {detail}").trim_end().to_string();
        return GraphQLError::relationship_requirement(type_name, field, message);
    }
    tracing::error!(error = %err, "database error");
    GraphQLError::Executor(err)
}
