//! Checkpoint (sync token) model

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::record::RecordId;

/// Client-facing collection label for a synchronized resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Business records
    Businesses,
}

impl ResourceType {
    /// Every resource type the server synchronizes
    pub const ALL: [Self; 1] = [Self::Businesses];

    /// Wire label of this resource type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Businesses => "businesses",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "businesses" | "business" => Ok(Self::Businesses),
            other => Err(format!("unknown resource type: {other}")),
        }
    }
}

/// A unique identifier for a checkpoint. Always minted by the server (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId(Uuid);

impl CheckpointId {
    /// Create a new random checkpoint ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CheckpointId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Record identities touched per resource type
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TouchedSet(BTreeMap<ResourceType, BTreeSet<RecordId>>);

impl TouchedSet {
    /// Create an empty touched set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` of `resource` was touched
    pub fn insert(&mut self, resource: ResourceType, id: RecordId) {
        self.0.entry(resource).or_default().insert(id);
    }

    /// Union another touched set into this one
    pub fn merge(&mut self, other: &Self) {
        for (resource, ids) in &other.0 {
            self.0.entry(*resource).or_default().extend(ids.iter().copied());
        }
    }

    /// Ids touched for `resource`
    pub fn ids(&self, resource: ResourceType) -> impl Iterator<Item = RecordId> + '_ {
        self.0.get(&resource).into_iter().flatten().copied()
    }

    /// Iterate over every `(resource, id)` pair
    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, RecordId)> + '_ {
        self.0
            .iter()
            .flat_map(|(resource, ids)| ids.iter().map(move |id| (*resource, *id)))
    }

    /// Total number of touched ids across resource types
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    /// Whether nothing was touched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(ResourceType, RecordId)> for TouchedSet {
    fn from_iter<I: IntoIterator<Item = (ResourceType, RecordId)>>(iter: I) -> Self {
        let mut touched = Self::new();
        for (resource, id) in iter {
            touched.insert(resource, id);
        }
        touched
    }
}

/// An immutable marker in a user's checkpoint chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique identifier
    pub id: CheckpointId,
    /// Owning user
    pub owner_id: String,
    /// Records touched by the batch that minted this checkpoint
    pub touched: TouchedSet,
    /// True only for a bootstrap checkpoint; the client must treat the
    /// accompanying data as a full snapshot
    pub full_sync: bool,
    /// Creation timestamp (Unix ms), strictly increasing per owner
    pub created_at: i64,
}
