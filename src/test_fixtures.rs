use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::ast::Dialect;
use crate::config::Config;
use crate::context::TranslationContext;
use crate::executor::{AccessMode, DatabaseInfo, ExecutionResult, Executor, ExecutorError};
use crate::schema::SchemaModel;

pub fn movie_schema_json() -> serde_json::Value {
    json!({
        "entities": [
            {
                "name": "Movie",
                "implements": ["Production"],
                "fulltextIndexes": [{"name": "MovieTitle", "fields": ["title"]}],
                "fields": [
                    {"name": "title", "kind": "primitive", "scalar": "String"},
                    {"name": "released", "kind": "primitive", "scalar": "Int"},
                    {"name": "rating", "kind": "primitive", "scalar": "Float"},
                    {"name": "available", "kind": "primitive", "scalar": "Boolean"},
                    {"name": "tags", "kind": "primitive", "scalar": "String", "list": true},
                    {"name": "releasedAt", "kind": "temporal", "temporal": "DateTime"},
                    {"name": "runtime", "kind": "temporal", "temporal": "Duration"},
                    {"name": "location", "kind": "point"},
                    {"name": "locations", "kind": "point", "list": true},
                    {"name": "imdbId", "dbName": "imdb_id", "kind": "primitive", "scalar": "ID"},
                    {
                        "name": "actors", "kind": "relationship", "type": "ACTED_IN",
                        "direction": "IN", "target": "Actor", "list": true,
                        "properties": [{"name": "screenTime", "kind": "primitive", "scalar": "Int"}]
                    },
                    {
                        "name": "genres", "kind": "relationship", "type": "IN_GENRE",
                        "direction": "OUT", "target": "Genre", "list": true
                    },
                    {
                        "name": "related", "kind": "relationship", "type": "RELATED",
                        "direction": "OUT", "target": "Search", "list": true
                    },
                    {
                        "name": "averageRating", "kind": "cypher", "scalar": "Float",
                        "statement": "MATCH (this)<-[r:REVIEWED]-() RETURN avg(r.score) AS result",
                        "columnName": "result"
                    },
                    {
                        "name": "recommended", "kind": "cypher", "target": "Movie", "list": true,
                        "statement": "MATCH (this)-[:IN_GENRE]->()<-[:IN_GENRE]-(m:Movie) RETURN m LIMIT $limit",
                        "columnName": "m"
                    }
                ]
            },
            {
                "name": "Actor",
                "labels": ["Actor", "Person"],
                "fields": [
                    {"name": "name", "kind": "primitive", "scalar": "String"},
                    {"name": "born", "kind": "primitive", "scalar": "Int"},
                    {
                        "name": "movies", "kind": "relationship", "type": "ACTED_IN",
                        "direction": "OUT", "target": "Movie", "list": true,
                        "properties": [{"name": "screenTime", "kind": "primitive", "scalar": "Int"}]
                    }
                ]
            },
            {
                "name": "Person",
                "fields": [
                    {"name": "name", "kind": "primitive", "scalar": "String"}
                ]
            },
            {
                "name": "Genre",
                "globalIdField": "name",
                "fields": [
                    {"name": "name", "kind": "primitive", "scalar": "String", "unique": true},
                    {
                        "name": "movies", "kind": "relationship", "type": "IN_GENRE",
                        "direction": "IN", "target": "Movie", "list": true
                    }
                ]
            },
            {
                "name": "Series",
                "plural": "series",
                "implements": ["Production"],
                "fields": [
                    {"name": "title", "kind": "primitive", "scalar": "String"},
                    {
                        "name": "director", "kind": "relationship", "type": "DIRECTED",
                        "direction": "IN", "target": "Person", "nullable": false
                    }
                ]
            },
            {
                "name": "Post",
                "authentication": {"operations": ["DELETE"]},
                "authorization": {
                    "filter": [{"where": {"node": {"author": {"id": "$jwt.sub"}}}}],
                    "validate": [{
                        "operations": ["CREATE", "UPDATE"],
                        "when": ["AFTER"],
                        "where": {"node": {"author": {"id": "$jwt.sub"}}}
                    }]
                },
                "fields": [
                    {"name": "id", "kind": "primitive", "scalar": "ID", "autogenerate": "id"},
                    {"name": "content", "kind": "primitive", "scalar": "String"},
                    {"name": "createdAt", "kind": "temporal", "temporal": "DateTime", "autogenerate": "timestampOnCreate"},
                    {"name": "views", "kind": "primitive", "scalar": "Int", "defaultValue": 0},
                    {
                        "name": "author", "kind": "relationship", "type": "HAS_POST",
                        "direction": "IN", "target": "User"
                    }
                ]
            },
            {
                "name": "User",
                "authorization": {
                    "validate": [{
                        "operations": ["DELETE"],
                        "requireAuthentication": false,
                        "where": {"jwt": {"roles_INCLUDES": "admin"}}
                    }]
                },
                "fields": [
                    {"name": "id", "kind": "primitive", "scalar": "ID"},
                    {"name": "name", "kind": "primitive", "scalar": "String"},
                    {
                        "name": "posts", "kind": "relationship", "type": "HAS_POST",
                        "direction": "OUT", "target": "Post", "list": true
                    }
                ]
            }
        ],
        "interfaces": [
            {"name": "Production", "fields": [{"name": "title", "kind": "primitive", "scalar": "String"}]}
        ],
        "unions": [
            {"name": "Search", "members": ["Movie", "Genre"]}
        ]
    })
}

pub fn movie_schema() -> SchemaModel {
    SchemaModel::from_json(&movie_schema_json()).unwrap()
}

pub fn context<'a>(schema: &'a SchemaModel, config: &'a Config) -> TranslationContext<'a> {
    TranslationContext::new(schema, config, Dialect::default())
}

/// In-memory executor answering from a queue of canned results
pub struct MockExecutor {
    version: String,
    delay: Option<Duration>,
    responses: Mutex<VecDeque<Result<ExecutionResult, ExecutorError>>>,
    executed: Mutex<Vec<(String, Map<String, Value>, AccessMode)>>,
    info_requests: Mutex<usize>,
}

impl MockExecutor {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            delay: None,
            responses: Mutex::new(VecDeque::new()),
            executed: Mutex::new(vec![]),
            info_requests: Mutex::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues rows, each a JSON object keyed by column
    pub fn respond(&self, rows: Vec<Value>) {
        let records = rows
            .into_iter()
            .map(|row| row.as_object().cloned().unwrap())
            .collect();
        self.respond_with(ExecutionResult {
            records,
            ..Default::default()
        });
    }

    pub fn respond_with(&self, result: ExecutionResult) {
        self.responses.lock().push_back(Ok(result));
    }

    pub fn fail(&self, err: ExecutorError) {
        self.responses.lock().push_back(Err(err));
    }

    pub fn queries(&self) -> Vec<String> {
        self.executed.lock().iter().map(|(q, _, _)| q.clone()).collect()
    }

    pub fn params(&self, index: usize) -> Map<String, Value> {
        self.executed.lock()[index].1.clone()
    }

    pub fn modes(&self) -> Vec<AccessMode> {
        self.executed.lock().iter().map(|(_, _, m)| *m).collect()
    }

    pub fn info_requests(&self) -> usize {
        *self.info_requests.lock()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(
        &self,
        query: &str,
        params: &Map<String, Value>,
        mode: AccessMode,
    ) -> Result<ExecutionResult, ExecutorError> {
        self.executed
            .lock()
            .push((query.to_string(), params.clone(), mode));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecutionResult::default()))
    }

    async fn database_info(&self) -> Result<DatabaseInfo, ExecutorError> {
        *self.info_requests.lock() += 1;
        Ok(DatabaseInfo::new(self.version.as_str()))
    }
}
