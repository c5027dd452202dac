/// GraphQL field, argument and Cypher name constants used throughout the codebase
///
/// This module centralizes all magic strings to prevent typos and make refactoring easier.

/// GraphQL introspection field names
pub mod introspection {
    pub const TYPENAME: &str = "__typename";
    /// Synthetic key carried by abstract-type projections, stripped while shaping
    pub const RESOLVE_TYPE: &str = "__resolveType";
}

/// Connection-related field names
pub mod connection {
    pub const EDGES: &str = "edges";
    pub const NODE: &str = "node";
    pub const PAGE_INFO: &str = "pageInfo";
    pub const TOTAL_COUNT: &str = "totalCount";
    pub const CURSOR: &str = "cursor";
    pub const SUFFIX: &str = "Connection";
}

/// Mutation result field names
pub mod mutation {
    pub const INFO: &str = "info";
    pub const BOOKMARK: &str = "bookmark";
    pub const NODES_CREATED: &str = "nodesCreated";
    pub const NODES_DELETED: &str = "nodesDeleted";
    pub const RELATIONSHIPS_CREATED: &str = "relationshipsCreated";
    pub const RELATIONSHIPS_DELETED: &str = "relationshipsDeleted";
    /// Record key carrying the projected nodes of a write
    pub const DATA: &str = "data";
}

/// Pagination argument names
pub mod pagination {
    pub const FIRST: &str = "first";
    pub const AFTER: &str = "after";
    pub const OPTIONS: &str = "options";
    pub const LIMIT: &str = "limit";
    pub const OFFSET: &str = "offset";
    pub const SORT: &str = "sort";
}

/// Query argument names
pub mod args {
    pub const WHERE: &str = "where";
    pub const INPUT: &str = "input";
    pub const UPDATE: &str = "update";
    pub const CREATE: &str = "create";
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const DELETE: &str = "delete";
    pub const CONNECT_OR_CREATE: &str = "connectOrCreate";
    pub const NODE: &str = "node";
    pub const EDGE: &str = "edge";
    pub const ON_CREATE: &str = "onCreate";
    pub const PHRASE: &str = "phrase";
    pub const VECTOR: &str = "vector";
    pub const ID: &str = "id";
}

/// Logical combinators of where inputs
pub mod logical {
    pub const AND: &str = "AND";
    pub const OR: &str = "OR";
    pub const NOT: &str = "NOT";
}

/// Aggregate selection field names
pub mod aggregate {
    pub const SUFFIX: &str = "Aggregate";
    pub const COUNT: &str = "count";
    pub const SUM: &str = "sum";
    pub const AVERAGE: &str = "average";
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const SHORTEST: &str = "shortest";
    pub const LONGEST: &str = "longest";
    pub const NODE: &str = "node";
    pub const EDGE: &str = "edge";
}

/// PageInfo field names
pub mod page_info {
    pub const HAS_NEXT_PAGE: &str = "hasNextPage";
    pub const HAS_PREVIOUS_PAGE: &str = "hasPreviousPage";
    pub const START_CURSOR: &str = "startCursor";
    pub const END_CURSOR: &str = "endCursor";
}

/// Fulltext and vector search result fields
pub mod search {
    pub const SCORE: &str = "score";
    pub const FULLTEXT_INFIX: &str = "Fulltext";
    pub const VECTOR_INFIX: &str = "VectorSearch";
}

/// Cypher variable and parameter names shared with the executor contract
pub mod cypher {
    pub const THIS: &str = "this";
    pub const MUTATE_META: &str = "mutateMeta";
    pub const JWT: &str = "jwt";
    pub const IS_AUTHENTICATED: &str = "isAuthenticated";
    pub const EDGES: &str = "edges";
    pub const TOTAL_COUNT: &str = "totalCount";
}

/// Markers the database raises through `apoc.util.validate*`. Error messages are
/// matched against these to recover the error kind.
pub mod signals {
    pub const FORBIDDEN: &str = "@cypher_graphql/FORBIDDEN";
    pub const UNAUTHENTICATED: &str = "@cypher_graphql/UNAUTHENTICATED";
    pub const RELATIONSHIP_REQUIRED: &str = "@cypher_graphql/RELATIONSHIP-REQUIRED";
}

/// Root type names
pub mod root {
    pub const QUERY: &str = "Query";
    pub const MUTATION: &str = "Mutation";
    pub const NODE: &str = "node";
}
