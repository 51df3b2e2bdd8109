//! Business record model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Field name -> validation messages, reported back to the client verbatim.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// A unique identifier for a record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A business record owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier
    pub id: RecordId,
    /// Owning user, never changes after creation
    pub owner_id: String,
    /// Display name
    pub name: String,
    /// Optional icon key
    pub icon: Option<String>,
    /// Optional display color
    pub color: Option<String>,
    /// Client-defined sort position
    pub order: Option<i64>,
    /// Optional currency code
    pub currency: Option<String>,
    /// Soft delete flag (tombstone)
    pub is_deleted: bool,
    /// Archived flag
    pub is_archived: bool,
    /// Favorite flag
    pub is_favorite: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Record {
    /// Create a new live record for `owner_id` from validated attributes
    #[must_use]
    pub fn new(owner_id: impl Into<String>, attrs: NewRecord) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: RecordId::new(),
            owner_id: owner_id.into(),
            name: attrs.name,
            icon: attrs.icon,
            color: attrs.color,
            order: attrs.order,
            currency: attrs.currency,
            is_deleted: false,
            is_archived: false,
            is_favorite: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge the fields present in `patch`, leaving the rest untouched
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(icon) = &patch.icon {
            self.icon = Some(icon.clone());
        }
        if let Some(color) = &patch.color {
            self.color = Some(color.clone());
        }
        if let Some(order) = patch.order {
            self.order = Some(order);
        }
        if let Some(currency) = &patch.currency {
            self.currency = Some(currency.clone());
        }
        if let Some(archived) = patch.is_archived {
            self.is_archived = archived;
        }
        if let Some(favorite) = patch.is_favorite {
            self.is_favorite = favorite;
        }
        self.updated_at = chrono::Utc::now()
            .timestamp_millis()
            .max(self.updated_at);
    }
}

/// Validated attributes for a record about to be created
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewRecord {
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub order: Option<i64>,
    pub currency: Option<String>,
}

impl NewRecord {
    /// Create attributes with only a name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a record's mutable attributes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, alias = "archived", skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(default, alias = "favorite", skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl RecordPatch {
    /// Check that the patch leaves the record with a usable name
    pub fn validate(&self) -> Result<(), FieldErrors> {
        match &self.name {
            Some(name) if name.trim().is_empty() => Err(FieldErrors::from([(
                "name".to_string(),
                vec![NAME_REQUIRED.to_string()],
            )])),
            _ => Ok(()),
        }
    }

    /// Build creation attributes, requiring a non-empty name
    pub fn into_new_record(self) -> Result<NewRecord, FieldErrors> {
        let name = self
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                FieldErrors::from([("name".to_string(), vec![NAME_REQUIRED.to_string()])])
            })?;

        Ok(NewRecord {
            name,
            icon: self.icon,
            color: self.color,
            order: self.order,
            currency: self.currency,
        })
    }
}

/// Validation message for a missing or blank record name
pub const NAME_REQUIRED: &str = "Please Enter Name";

/// Lifecycle-flag filter for owner listings. `None` means "either".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFilter {
    pub deleted: Option<bool>,
    pub archived: Option<bool>,
    pub favorite: Option<bool>,
}

impl RecordFilter {
    /// Filter selecting every record that is not soft-deleted
    #[must_use]
    pub const fn live() -> Self {
        Self {
            deleted: Some(false),
            archived: None,
            favorite: None,
        }
    }
}
