use serde::{Deserialize, Serialize};

use crate::domain::EntityId;

/// Completion notices published by the mutation flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EntityEvent {
    Created { id: EntityId },
    Updated { id: EntityId },
    Deleted { id: EntityId },
}

impl EntityEvent {
    pub fn id(&self) -> EntityId {
        match self {
            EntityEvent::Created { id }
            | EntityEvent::Updated { id }
            | EntityEvent::Deleted { id } => *id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntityResponse {
    pub id: EntityId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameAvailableQuery {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_id: Option<EntityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameAvailableResponse {
    pub available: bool,
}
