use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use crate::ast::PatternDirection;
use crate::auth::{AuthenticationAnnotation, AuthorizationAnnotation};
use crate::constants::{aggregate, connection, introspection, mutation, root, search};
use crate::error::{GraphQLError, GraphQLResult};

#[derive(Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PrimitiveScalar {
    String,
    #[serde(rename = "ID")]
    Id,
    Int,
    Float,
    BigInt,
    Boolean,
}

impl PrimitiveScalar {
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Id => "ID",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::BigInt => "BigInt",
            Self::Boolean => "Boolean",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::BigInt)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::Id)
    }
}

#[derive(Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TemporalKind {
    DateTime,
    LocalDateTime,
    Date,
    Time,
    LocalTime,
    Duration,
}

impl TemporalKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DateTime => "DateTime",
            Self::LocalDateTime => "LocalDateTime",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::LocalTime => "LocalTime",
            Self::Duration => "Duration",
        }
    }

    /// Cypher function constructing a value of this kind from its string form
    pub fn constructor(&self) -> &'static str {
        match self {
            Self::DateTime => "datetime",
            Self::LocalDateTime => "localdatetime",
            Self::Date => "date",
            Self::Time => "time",
            Self::LocalTime => "localtime",
            Self::Duration => "duration",
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn pattern_direction(&self) -> PatternDirection {
        match self {
            Self::In => PatternDirection::Left,
            Self::Out => PatternDirection::Right,
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipField {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub direction: Direction,
    /// Entity, interface or union name
    pub target: String,
    /// Properties stored on the relationship itself
    #[serde(default)]
    pub properties: Vec<Arc<Field>>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CypherField {
    pub statement: String,
    pub column_name: String,
    /// Entity returned by the statement, `None` for scalar results
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub scalar: Option<PrimitiveScalar>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FieldKind {
    Primitive {
        scalar: PrimitiveScalar,
    },
    CustomScalar {
        scalar: String,
    },
    Enum {
        #[serde(rename = "enumName")]
        enum_name: String,
    },
    Temporal {
        temporal: TemporalKind,
    },
    Point {
        #[serde(default)]
        cartesian: bool,
    },
    Relationship(RelationshipField),
    Cypher(CypherField),
}

#[derive(Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Autogenerate {
    Id,
    Timestamp,
    TimestampOnCreate,
    TimestampOnUpdate,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    /// Property name in the database when it differs from the GraphQL name
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub autogenerate: Option<Autogenerate>,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl Field {
    pub fn db_name(&self) -> &str {
        self.db_name.as_deref().unwrap_or(&self.name)
    }

    pub fn relationship(&self) -> Option<&RelationshipField> {
        match &self.kind {
            FieldKind::Relationship(rel) => Some(rel),
            _ => None,
        }
    }

    pub fn cypher(&self) -> Option<&CypherField> {
        match &self.kind {
            FieldKind::Cypher(c) => Some(c),
            _ => None,
        }
    }

    /// Stored property, as opposed to relationships and computed fields
    pub fn is_property(&self) -> bool {
        !matches!(self.kind, FieldKind::Relationship(_) | FieldKind::Cypher(_))
    }

    pub fn temporal(&self) -> Option<TemporalKind> {
        match self.kind {
            FieldKind::Temporal { temporal } => Some(temporal),
            _ => None,
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self.kind, FieldKind::Point { .. })
    }

    /// GraphQL named type of a scalar-ish field
    pub fn type_name(&self) -> String {
        match &self.kind {
            FieldKind::Primitive { scalar } => scalar.name().to_string(),
            FieldKind::CustomScalar { scalar } => scalar.clone(),
            FieldKind::Enum { enum_name } => enum_name.clone(),
            FieldKind::Temporal { temporal } => temporal.name().to_string(),
            FieldKind::Point { cartesian: true } => "CartesianPoint".to_string(),
            FieldKind::Point { cartesian: false } => "Point".to_string(),
            FieldKind::Relationship(rel) => rel.target.clone(),
            FieldKind::Cypher(c) => c
                .target
                .clone()
                .or_else(|| c.scalar.map(|s| s.name().to_string()))
                .unwrap_or_else(|| "String".to_string()),
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndex {
    pub name: String,
    /// Database index name, defaults to `name`
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl SearchIndex {
    pub fn index_name(&self) -> &str {
        self.index_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub fields: Vec<Arc<Field>>,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub fulltext_indexes: Vec<SearchIndex>,
    #[serde(default)]
    pub vector_indexes: Vec<SearchIndex>,
    /// Property exposed as a relay global `id`
    #[serde(default)]
    pub global_id_field: Option<String>,
    #[serde(default)]
    pub authentication: Option<AuthenticationAnnotation>,
    #[serde(default)]
    pub authorization: Option<AuthorizationAnnotation>,
}

impl Entity {
    pub fn plural(&self) -> String {
        self.plural
            .clone()
            .unwrap_or_else(|| format!("{}s", lower_first(&self.name)))
    }

    pub fn labels(&self) -> Vec<String> {
        if self.labels.is_empty() {
            vec![self.name.clone()]
        } else {
            self.labels.clone()
        }
    }

    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relationship_fields(&self) -> impl Iterator<Item = (&Arc<Field>, &RelationshipField)> {
        self.fields
            .iter()
            .filter_map(|f| f.relationship().map(|rel| (f, rel)))
    }

    /// The field carrying the global id, when the entity exposes `id` that way
    pub fn global_id(&self) -> Option<&Arc<Field>> {
        self.global_id_field
            .as_ref()
            .and_then(|name| self.field(name))
            .filter(|_| self.field(crate::constants::args::ID).is_none())
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Arc<Field>>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Union {
    pub name: String,
    pub members: Vec<String>,
}

/// Static description of the graph consumed by every translator
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct SchemaModel {
    pub entities: Vec<Arc<Entity>>,
    #[serde(default)]
    pub interfaces: Vec<Arc<Interface>>,
    #[serde(default)]
    pub unions: Vec<Arc<Union>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RootFieldKind {
    Read,
    Connection,
    Aggregate,
    Fulltext(SearchIndex),
    Vector(SearchIndex),
    Create,
    Update,
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RootField {
    pub kind: RootFieldKind,
    pub entity: Arc<Entity>,
}

impl SchemaModel {
    pub fn from_json(value: &serde_json::Value) -> GraphQLResult<Self> {
        let model: SchemaModel = serde_json::from_value(value.clone())
            .map_err(|e| GraphQLError::schema(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> GraphQLResult<()> {
        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.name.as_str()) {
                return Err(GraphQLError::schema(format!(
                    "duplicate type {}",
                    entity.name
                )));
            }
            for (field, rel) in entity.relationship_fields() {
                if self.entity(&rel.target).is_none()
                    && self.interface(&rel.target).is_none()
                    && self.union(&rel.target).is_none()
                {
                    return Err(GraphQLError::schema(format!(
                        "{}.{} targets unknown type {}",
                        entity.name, field.name, rel.target
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<Entity>> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn interface(&self, name: &str) -> Option<&Arc<Interface>> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn union(&self, name: &str) -> Option<&Arc<Union>> {
        self.unions.iter().find(|u| u.name == name)
    }

    pub fn is_abstract(&self, name: &str) -> bool {
        self.interface(name).is_some() || self.union(name).is_some()
    }

    /// Entities a value of the named type may be at runtime
    pub fn concrete_entities(&self, type_name: &str) -> Vec<Arc<Entity>> {
        if let Some(entity) = self.entity(type_name) {
            return vec![entity.clone()];
        }
        if let Some(union) = self.union(type_name) {
            return union
                .members
                .iter()
                .filter_map(|m| self.entity(m).cloned())
                .collect();
        }
        self.entities
            .iter()
            .filter(|e| e.implements.iter().any(|i| i == type_name))
            .cloned()
            .collect()
    }

    /// All type names whose labels are contained in `labels`
    pub fn typenames_for_labels(&self, labels: &[String]) -> Vec<String> {
        let available: HashSet<&str> = labels.iter().map(String::as_str).collect();
        self.entities
            .iter()
            .filter(|e| e.labels().iter().all(|l| available.contains(l.as_str())))
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn root_field(&self, operation: OperationKind, name: &str) -> Option<RootField> {
        self.entities.iter().find_map(|entity| {
            let plural = entity.plural();
            let kind = match operation {
                OperationKind::Query => {
                    if name == plural {
                        Some(RootFieldKind::Read)
                    } else if name == format!("{plural}{}", connection::SUFFIX) {
                        Some(RootFieldKind::Connection)
                    } else if name == format!("{plural}{}", aggregate::SUFFIX) {
                        Some(RootFieldKind::Aggregate)
                    } else if let Some(index) = name
                        .strip_prefix(&format!("{plural}{}", search::FULLTEXT_INFIX))
                        .and_then(|rest| {
                            entity
                                .fulltext_indexes
                                .iter()
                                .find(|i| upper_first(&i.name) == rest)
                        })
                    {
                        Some(RootFieldKind::Fulltext(index.clone()))
                    } else {
                        name.strip_prefix(&format!("{plural}{}", search::VECTOR_INFIX))
                            .and_then(|rest| {
                                entity
                                    .vector_indexes
                                    .iter()
                                    .find(|i| upper_first(&i.name) == rest)
                            })
                            .map(|index| RootFieldKind::Vector(index.clone()))
                    }
                }
                OperationKind::Mutation => {
                    let upper = upper_first(&plural);
                    if name == format!("create{upper}") {
                        Some(RootFieldKind::Create)
                    } else if name == format!("update{upper}") {
                        Some(RootFieldKind::Update)
                    } else if name == format!("delete{upper}") {
                        Some(RootFieldKind::Delete)
                    } else {
                        None
                    }
                }
            };
            kind.map(|kind| RootField {
                kind,
                entity: entity.clone(),
            })
        })
    }

    /// Shape of a named output type that is an entity, interface or union
    pub fn shape_for_type(&self, type_name: &str) -> Option<Shape> {
        if let Some(entity) = self.entity(type_name) {
            return Some(Shape::Entity(entity.clone()));
        }
        if self.is_abstract(type_name) {
            let fields = self
                .interface(type_name)
                .map(|i| i.fields.clone())
                .unwrap_or_default();
            return Some(Shape::Abstract {
                name: type_name.to_string(),
                members: self.concrete_entities(type_name),
                fields,
            });
        }
        None
    }

    /// Shape of the value selected by `field` on a value of shape `parent`.
    ///
    /// Encodes the naming conventions of the generated GraphQL schema so that a raw
    /// document can be normalized into resolve trees without the executable schema.
    pub fn child_shape(&self, parent: &Shape, field: &str) -> Option<Shape> {
        if field == introspection::TYPENAME {
            return Some(Shape::Leaf("String".to_string()));
        }
        match parent {
            Shape::Query => {
                if field == root::NODE {
                    return Some(Shape::Abstract {
                        name: "Node".to_string(),
                        members: self
                            .entities
                            .iter()
                            .filter(|e| e.global_id().is_some())
                            .cloned()
                            .collect(),
                        fields: vec![],
                    });
                }
                let root = self.root_field(OperationKind::Query, field)?;
                let entity = root.entity.clone();
                Some(match root.kind {
                    RootFieldKind::Read => Shape::Entity(entity),
                    RootFieldKind::Connection => Shape::Connection {
                        name: format!("{}{}", upper_first(&entity.plural()), connection::SUFFIX),
                        edge_name: format!("{}Edge", entity.name),
                        target: entity.name.clone(),
                        properties: vec![],
                    },
                    RootFieldKind::Aggregate => Shape::Aggregate {
                        name: format!("{}AggregateSelection", entity.name),
                        fields: entity.fields.clone(),
                    },
                    RootFieldKind::Fulltext(_) | RootFieldKind::Vector(_) => Shape::SearchResult {
                        name: format!("{}SearchResult", entity.name),
                        entity,
                    },
                    _ => return None,
                })
            }
            Shape::Mutation => {
                let root = self.root_field(OperationKind::Mutation, field)?;
                let plural = upper_first(&root.entity.plural());
                Some(match root.kind {
                    RootFieldKind::Create => Shape::MutationResponse {
                        name: format!("Create{plural}MutationResponse"),
                        info: "CreateInfo".to_string(),
                        entity: root.entity,
                    },
                    RootFieldKind::Update => Shape::MutationResponse {
                        name: format!("Update{plural}MutationResponse"),
                        info: "UpdateInfo".to_string(),
                        entity: root.entity,
                    },
                    RootFieldKind::Delete => Shape::Info("DeleteInfo".to_string()),
                    _ => return None,
                })
            }
            Shape::MutationResponse { info, entity, .. } => {
                if field == mutation::INFO {
                    Some(Shape::Info(info.clone()))
                } else if field == entity.plural() {
                    Some(Shape::Entity(entity.clone()))
                } else {
                    None
                }
            }
            Shape::SearchResult { entity, .. } => {
                if field == search::SCORE {
                    Some(Shape::Leaf("Float".to_string()))
                } else if field == lower_first(&entity.name) {
                    Some(Shape::Entity(entity.clone()))
                } else {
                    None
                }
            }
            Shape::Entity(entity) => self.entity_field_shape(
                &entity.name,
                &entity.fields,
                field,
                entity.global_id().is_some(),
            ),
            Shape::Abstract { name, fields, .. } => {
                self.entity_field_shape(name, fields, field, false)
            }
            Shape::Connection {
                edge_name,
                target,
                properties,
                ..
            } => match field {
                connection::EDGES => Some(Shape::Edge {
                    name: edge_name.clone(),
                    target: target.clone(),
                    properties: properties.clone(),
                }),
                connection::PAGE_INFO => Some(Shape::PageInfo),
                connection::TOTAL_COUNT => Some(Shape::Leaf("Int".to_string())),
                _ => None,
            },
            Shape::Edge {
                target, properties, ..
            } => match field {
                connection::NODE => self.shape_for_type(target),
                connection::CURSOR => Some(Shape::Leaf("String".to_string())),
                _ => properties
                    .iter()
                    .find(|p| p.name == field)
                    .map(|p| scalar_shape(p)),
            },
            Shape::Aggregate { name, fields } => {
                if field == aggregate::COUNT {
                    return Some(Shape::Leaf("Int".to_string()));
                }
                if field == aggregate::NODE || field == aggregate::EDGE {
                    return None;
                }
                let f = fields.iter().find(|f| f.name == field && f.is_property())?;
                Some(Shape::AggregateField(format!("{name}{}", upper_first(&f.name))))
            }
            Shape::RelationshipAggregate {
                name,
                node_fields,
                edge_fields,
            } => match field {
                aggregate::COUNT => Some(Shape::Leaf("Int".to_string())),
                aggregate::NODE => Some(Shape::Aggregate {
                    name: format!("{name}Node"),
                    fields: node_fields.clone(),
                }),
                aggregate::EDGE => Some(Shape::Aggregate {
                    name: format!("{name}Edge"),
                    fields: edge_fields.clone(),
                }),
                _ => None,
            },
            Shape::PageInfo | Shape::Info(_) | Shape::AggregateField(_) | Shape::Point(_) => {
                Some(Shape::Leaf(leaf_type_for(field)))
            }
            Shape::Leaf(_) => None,
        }
    }

    fn entity_field_shape(
        &self,
        owner: &str,
        fields: &[Arc<Field>],
        field: &str,
        has_global_id: bool,
    ) -> Option<Shape> {
        if has_global_id && field == crate::constants::args::ID {
            return Some(Shape::Leaf("ID".to_string()));
        }
        if let Some(f) = fields.iter().find(|f| f.name == field) {
            return match &f.kind {
                FieldKind::Relationship(rel) => self.shape_for_type(&rel.target),
                FieldKind::Cypher(CypherField {
                    target: Some(target),
                    ..
                }) => self.shape_for_type(target),
                _ => Some(scalar_shape(f)),
            };
        }
        if let Some(base) = field.strip_suffix(connection::SUFFIX) {
            let f = fields.iter().find(|f| f.name == base)?;
            let rel = f.relationship()?;
            let prefix = format!("{owner}{}", upper_first(base));
            return Some(Shape::Connection {
                name: format!("{prefix}{}", connection::SUFFIX),
                edge_name: format!("{prefix}Relationship"),
                target: rel.target.clone(),
                properties: rel.properties.clone(),
            });
        }
        if let Some(base) = field.strip_suffix(aggregate::SUFFIX) {
            let f = fields.iter().find(|f| f.name == base)?;
            let rel = f.relationship()?;
            let node_fields = self
                .entity(&rel.target)
                .map(|e| e.fields.clone())
                .or_else(|| self.interface(&rel.target).map(|i| i.fields.clone()))
                .unwrap_or_default();
            return Some(Shape::RelationshipAggregate {
                name: format!("{owner}{}{}AggregationSelection", rel.target, upper_first(base)),
                node_fields,
                edge_fields: rel.properties.clone(),
            });
        }
        None
    }
}

fn scalar_shape(field: &Field) -> Shape {
    if field.is_point() {
        Shape::Point(field.type_name())
    } else {
        Shape::Leaf(field.type_name())
    }
}

fn leaf_type_for(field: &str) -> String {
    match field {
        "hasNextPage" | "hasPreviousPage" => "Boolean",
        "srid" | "nodesCreated" | "nodesDeleted" | "relationshipsCreated"
        | "relationshipsDeleted" => "Int",
        "longitude" | "latitude" | "height" | "x" | "y" | "z" | "average" | "sum" => "Float",
        _ => "String",
    }
    .to_string()
}

/// What a selection set is selecting from. Drives resolve tree normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Query,
    Mutation,
    Entity(Arc<Entity>),
    Abstract {
        name: String,
        members: Vec<Arc<Entity>>,
        fields: Vec<Arc<Field>>,
    },
    MutationResponse {
        name: String,
        info: String,
        entity: Arc<Entity>,
    },
    SearchResult {
        name: String,
        entity: Arc<Entity>,
    },
    Connection {
        name: String,
        edge_name: String,
        target: String,
        properties: Vec<Arc<Field>>,
    },
    Edge {
        name: String,
        target: String,
        properties: Vec<Arc<Field>>,
    },
    PageInfo,
    Info(String),
    Aggregate {
        name: String,
        fields: Vec<Arc<Field>>,
    },
    RelationshipAggregate {
        name: String,
        node_fields: Vec<Arc<Field>>,
        edge_fields: Vec<Arc<Field>>,
    },
    AggregateField(String),
    Point(String),
    Leaf(String),
}

impl Shape {
    pub fn type_name(&self) -> String {
        match self {
            Self::Query => root::QUERY.to_string(),
            Self::Mutation => root::MUTATION.to_string(),
            Self::Entity(entity) => entity.name.clone(),
            Self::PageInfo => "PageInfo".to_string(),
            Self::Abstract { name, .. }
            | Self::MutationResponse { name, .. }
            | Self::SearchResult { name, .. }
            | Self::Connection { name, .. }
            | Self::Edge { name, .. }
            | Self::Info(name)
            | Self::Aggregate { name, .. }
            | Self::RelationshipAggregate { name, .. }
            | Self::AggregateField(name)
            | Self::Point(name)
            | Self::Leaf(name) => name.clone(),
        }
    }

    /// Concrete shapes a selection on this shape is keyed under
    pub fn possible_shapes(&self) -> Vec<Shape> {
        match self {
            Self::Abstract { members, .. } => {
                members.iter().map(|m| Shape::Entity(m.clone())).collect()
            }
            other => vec![other.clone()],
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }
}

pub fn upper_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn lower_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
