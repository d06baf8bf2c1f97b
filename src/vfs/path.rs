// src/vfs/path.rs
//! Task identifiers and the two-segment virtual path scheme
//!
//! Guests see exactly two kinds of paths: `in/<task-id>` and
//! `out/<task-id>`. Anything else is rejected as a permission failure.

use crate::utils::errors::{BridgeError, Result};
use crate::vfs::virtual_file::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Opaque per-task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh, unique task id
    pub fn generate() -> Self {
        Self(Ulid::new().to_string().to_lowercase())
    }

    /// Check that the id can be addressed through a virtual path
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() || self.0.contains('/') {
            return Err(BridgeError::InvalidTaskId(self.0.clone()));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Virtual path for one side of this task
    pub fn path(&self, direction: Direction) -> String {
        format!("{}/{}", direction.segment(), self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Parsed `direction/task-id` path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPath {
    pub direction: Direction,
    pub task_id: TaskId,
}

impl VirtualPath {
    /// Split a guest path into its two segments
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments = path.split('/');

        let (head, id) = match (segments.next(), segments.next(), segments.next()) {
            (Some(head), Some(id), None) => (head, id),
            _ => return Err(BridgeError::PermissionDenied(path.to_string())),
        };

        let direction = Direction::from_segment(head)
            .ok_or_else(|| BridgeError::PermissionDenied(path.to_string()))?;

        Ok(Self {
            direction,
            task_id: TaskId::from(id),
        })
    }
}
