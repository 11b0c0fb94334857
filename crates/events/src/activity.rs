use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use billbook_core::{DomainError, SellerId};

use crate::event::Event;

/// Role of whoever triggered an activity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Seller,
    Admin,
    System,
}

impl ActorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorRole::Seller => "seller",
            ActorRole::Admin => "admin",
            ActorRole::System => "system",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "seller" => Ok(ActorRole::Seller),
            "admin" => Ok(ActorRole::Admin),
            "system" => Ok(ActorRole::System),
            other => Err(DomainError::validation(
                "actor_role",
                format!("unknown role {other:?}"),
            )),
        }
    }
}

/// Who performed an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn seller(id: SellerId) -> Self {
        Self {
            id: id.to_string(),
            role: ActorRole::Seller,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Admin,
        }
    }

    /// Background passes such as the overdue sweep.
    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            role: ActorRole::System,
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub action_type: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    pub fn record<E: Event>(actor: &Actor, event: &E, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            action_type: event.event_type().to_string(),
            description: event.describe(),
            timestamp: at,
        }
    }
}
