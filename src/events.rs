//! Subscription events recovered from the change records a write query returns.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::mutation_meta::MetaKind;
use crate::schema::SchemaModel;

pub type Properties = Map<String, Value>;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CreatedProperties {
    pub new: Properties,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UpdatedProperties {
    pub old: Properties,
    pub new: Properties,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DeletedProperties {
    pub old: Properties,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeSubscriptionsEvent<P> {
    pub id: Value,
    pub typename: String,
    pub properties: P,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RelationshipProperties {
    pub from: Properties,
    pub to: Properties,
    pub relationship: Properties,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSubscriptionsEvent {
    /// Identity of the relationship itself
    pub id: Value,
    #[serde(rename = "id_from")]
    pub id_from: Value,
    #[serde(rename = "id_to")]
    pub id_to: Value,
    pub relationship_name: String,
    pub from_typename: String,
    pub to_typename: String,
    pub properties: RelationshipProperties,
    pub timestamp: i64,
}

/// What subscribers receive. Each node variant only carries the snapshots that exist
/// for its kind of change.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SubscriptionsEvent {
    Create(NodeSubscriptionsEvent<CreatedProperties>),
    Update(NodeSubscriptionsEvent<UpdatedProperties>),
    Delete(NodeSubscriptionsEvent<DeletedProperties>),
    CreateRelationship(RelationshipSubscriptionsEvent),
    DeleteRelationship(RelationshipSubscriptionsEvent),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Create,
    Update,
    Delete,
    CreateRelationship,
    DeleteRelationship,
}

impl SubscriptionsEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Create(_) => EventType::Create,
            Self::Update(_) => EventType::Update,
            Self::Delete(_) => EventType::Delete,
            Self::CreateRelationship(_) => EventType::CreateRelationship,
            Self::DeleteRelationship(_) => EventType::DeleteRelationship,
        }
    }

    pub fn id(&self) -> &Value {
        match self {
            Self::Create(event) => &event.id,
            Self::Update(event) => &event.id,
            Self::Delete(event) => &event.id,
            Self::CreateRelationship(event) | Self::DeleteRelationship(event) => &event.id,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Create(event) => event.timestamp,
            Self::Update(event) => event.timestamp,
            Self::Delete(event) => event.timestamp,
            Self::CreateRelationship(event) | Self::DeleteRelationship(event) => event.timestamp,
        }
    }
}

/// One change record as written by the mutation query
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    #[serde(rename = "type")]
    kind: MetaKind,
    id: Value,
    name: Option<String>,
    labels: Option<Vec<String>>,
    #[serde(rename = "toID")]
    to_id: Option<Value>,
    to_name: Option<String>,
    to_labels: Option<Vec<String>>,
    relationship_name: Option<String>,
    #[serde(rename = "relationshipID")]
    relationship_id: Option<Value>,
    #[serde(default)]
    properties: RawProperties,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Deserialize, Debug, Default)]
struct RawProperties {
    old: Option<Properties>,
    new: Option<Properties>,
    from: Option<Properties>,
    to: Option<Properties>,
    relationship: Option<Properties>,
}

/// Typenames one side of a record stands for. A bare label set may match several
/// types.
fn typenames(
    schema: &SchemaModel,
    name: Option<&String>,
    labels: Option<&Vec<String>>,
) -> Vec<String> {
    match (name, labels) {
        (Some(name), _) => vec![name.clone()],
        (None, Some(labels)) => schema.typenames_for_labels(labels),
        (None, None) => vec![],
    }
}

/// Turns the collected change records of one execution into events, in record order.
///
/// Relationship records whose sides are only known by labels produce one event per
/// combination of matching typenames. Repeated relationship events and repeated deletes
/// of the same node are dropped.
pub fn parse_mutation_meta(records: &[Value], schema: &SchemaModel) -> Vec<SubscriptionsEvent> {
    let mut events = vec![];
    for record in records {
        let raw: RawMeta = match serde_json::from_value(record.clone()) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed mutation record");
                continue;
            }
        };
        let from = typenames(schema, raw.name.as_ref(), raw.labels.as_ref());
        let properties = raw.properties;
        match raw.kind {
            MetaKind::Created => {
                for typename in from {
                    events.push(SubscriptionsEvent::Create(NodeSubscriptionsEvent {
                        id: raw.id.clone(),
                        typename,
                        properties: CreatedProperties {
                            new: properties.new.clone().unwrap_or_default(),
                        },
                        timestamp: raw.timestamp,
                    }));
                }
            }
            MetaKind::Updated => {
                for typename in from {
                    events.push(SubscriptionsEvent::Update(NodeSubscriptionsEvent {
                        id: raw.id.clone(),
                        typename,
                        properties: UpdatedProperties {
                            old: properties.old.clone().unwrap_or_default(),
                            new: properties.new.clone().unwrap_or_default(),
                        },
                        timestamp: raw.timestamp,
                    }));
                }
            }
            MetaKind::Deleted => {
                for typename in from {
                    events.push(SubscriptionsEvent::Delete(NodeSubscriptionsEvent {
                        id: raw.id.clone(),
                        typename,
                        properties: DeletedProperties {
                            old: properties.old.clone().unwrap_or_default(),
                        },
                        timestamp: raw.timestamp,
                    }));
                }
            }
            MetaKind::Connected | MetaKind::Disconnected => {
                let to = typenames(schema, raw.to_name.as_ref(), raw.to_labels.as_ref());
                let (Some(relationship_id), Some(to_id), Some(relationship_name)) =
                    (raw.relationship_id, raw.to_id, raw.relationship_name)
                else {
                    tracing::warn!(
                        id = %raw.id,
                        "skipping relationship record without its relationship"
                    );
                    continue;
                };
                let relationship_properties = RelationshipProperties {
                    from: properties.from.unwrap_or_default(),
                    to: properties.to.unwrap_or_default(),
                    relationship: properties.relationship.unwrap_or_default(),
                };
                for from_typename in &from {
                    for to_typename in &to {
                        let event = RelationshipSubscriptionsEvent {
                            id: relationship_id.clone(),
                            id_from: raw.id.clone(),
                            id_to: to_id.clone(),
                            relationship_name: relationship_name.clone(),
                            from_typename: from_typename.clone(),
                            to_typename: to_typename.clone(),
                            properties: relationship_properties.clone(),
                            timestamp: raw.timestamp,
                        };
                        events.push(match raw.kind {
                            MetaKind::Connected => SubscriptionsEvent::CreateRelationship(event),
                            _ => SubscriptionsEvent::DeleteRelationship(event),
                        });
                    }
                }
            }
            MetaKind::RelationshipUpdated => {
                tracing::debug!(id = %raw.id, "relationship updates are not published");
            }
        }
    }
    dedup(events)
}

fn dedup(events: Vec<SubscriptionsEvent>) -> Vec<SubscriptionsEvent> {
    let mut relationships = HashSet::new();
    let mut deleted = HashSet::new();
    events
        .into_iter()
        .filter(|event| match event {
            SubscriptionsEvent::CreateRelationship(rel)
            | SubscriptionsEvent::DeleteRelationship(rel) => {
                relationships.insert((
                    event.event_type(),
                    rel.id.to_string(),
                    rel.from_typename.clone(),
                    rel.to_typename.clone(),
                ))
            }
            SubscriptionsEvent::Delete(node) => deleted.insert(node.id.to_string()),
            _ => true,
        })
        .collect()
}

#[derive(Debug, Error)]
#[error("failed to publish event: {0}")]
pub struct PublishError(pub String);

/// Where events go once a write has committed
#[async_trait]
pub trait SubscriptionsEngine: Send + Sync {
    async fn publish(&self, event: SubscriptionsEvent) -> Result<(), PublishError>;
}

/// Publishes `events` in the background, in order. Failures are logged and otherwise
/// ignored.
pub fn publish_events(
    engine: Arc<dyn SubscriptionsEngine>,
    events: Vec<SubscriptionsEvent>,
) -> Option<JoinHandle<()>> {
    if events.is_empty() {
        return None;
    }
    Some(tokio::spawn(async move {
        for event in events {
            let event_type = event.event_type();
            if let Err(err) = engine.publish(event).await {
                tracing::warn!(error = %err, ?event_type, "publishing subscription event failed");
            }
        }
    }))
}
