// src/models/taxonomy.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'streams' table: the root level of the taxonomy
/// (e.g., an exam such as "JEE" or "NEET").
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Stream {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'subjects' table. Name is unique within its stream.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub stream_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'topics' table. Name is unique within its subject.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub subject_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a stream.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateStreamRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// DTO for creating a subject under a stream.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubjectRequest {
    pub stream_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// DTO for creating a topic under a subject.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTopicRequest {
    pub subject_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// DTO for updating a taxonomy node. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateNodeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Activation state of a taxonomy node.
///
/// Transitions: `Active ⇄ Inactive`. Deactivation requires that the node
/// has no active children (subjects under a stream, topics under a subject,
/// questions under a topic); reactivation is unconditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Active,
    Inactive,
}

impl NodeState {
    pub fn from_flag(is_active: bool) -> Self {
        if is_active {
            NodeState::Active
        } else {
            NodeState::Inactive
        }
    }

    pub fn as_flag(self) -> bool {
        matches!(self, NodeState::Active)
    }

    /// Attempts the `Active -> Inactive` transition.
    pub fn deactivate(self, active_children: i64) -> Result<NodeState, String> {
        if active_children > 0 {
            return Err(format!(
                "Cannot deactivate: {} active child node(s) remain",
                active_children
            ));
        }
        Ok(NodeState::Inactive)
    }

    /// The `Inactive -> Active` transition. Always permitted.
    pub fn activate(self) -> NodeState {
        NodeState::Active
    }
}
