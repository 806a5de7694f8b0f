use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(EntityId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub child_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable fields submitted by create and update forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFields {
    pub name: String,
}

impl EntityFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The trigger that asked for an entity to be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Direct,
    Table,
    Create,
    Update,
    DeleteCompleted,
}

impl Source {
    /// Rank in the fixed order `direct > {create, update} > table`.
    ///
    /// `DeleteCompleted` never competes for the active slot and ranks above
    /// everything else.
    pub fn priority(self) -> u8 {
        match self {
            Source::Table => 1,
            Source::Create | Source::Update => 2,
            Source::Direct => 3,
            Source::DeleteCompleted => 4,
        }
    }

    /// Whether a request from `self` may cancel an active request from `active`.
    /// Equal ranks never preempt each other.
    pub fn outranks(self, active: Source) -> bool {
        self.priority() > active.priority()
    }

    /// Loads that follow a saved create or update, after which the list is
    /// out of date.
    pub fn follows_save(self) -> bool {
        matches!(self, Source::Create | Source::Update)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Direct => "direct",
            Source::Table => "table",
            Source::Create => "create",
            Source::Update => "update",
            Source::DeleteCompleted => "delete-completed",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub id: EntityId,
    pub source: Source,
}

impl LoadRequest {
    pub fn new(id: EntityId, source: Source) -> Self {
        Self { id, source }
    }
}
