//! Location domain model.
//!
//! # Responsibility
//! - Define the placement record of a content item in the tree.
//! - Define create/update inputs consumed by the location store.
//!
//! # Invariants
//! - `path_string` equals the parent's path plus `/{id}/`.
//! - `is_invisible` is true iff the location or an ancestor is hidden.
//! - Exactly one location per content item has `is_main` set.

use serde::{Deserialize, Serialize};

/// Storage-assigned location identifier.
pub type LocationId = i64;

/// Storage-assigned content identifier.
pub type ContentId = i64;

/// Storage-assigned section identifier.
pub type SectionId = i64;

/// Id of the seeded tree root location (`/1/`).
pub const ROOT_LOCATION_ID: LocationId = 1;

/// Attribute children of a location are listed by. Opaque to the tree engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Path,
    Published,
    Modified,
    Section,
    Depth,
    ClassIdentifier,
    ClassName,
    Priority,
    Name,
    ModifiedSubnode,
    LocationId,
    ContentId,
}

impl SortField {
    /// Stable storage/text representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Published => "published",
            Self::Modified => "modified",
            Self::Section => "section",
            Self::Depth => "depth",
            Self::ClassIdentifier => "class_identifier",
            Self::ClassName => "class_name",
            Self::Priority => "priority",
            Self::Name => "name",
            Self::ModifiedSubnode => "modified_subnode",
            Self::LocationId => "location_id",
            Self::ContentId => "content_id",
        }
    }

    /// Parses the representation produced by [`SortField::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "path" => Some(Self::Path),
            "published" => Some(Self::Published),
            "modified" => Some(Self::Modified),
            "section" => Some(Self::Section),
            "depth" => Some(Self::Depth),
            "class_identifier" => Some(Self::ClassIdentifier),
            "class_name" => Some(Self::ClassName),
            "priority" => Some(Self::Priority),
            "name" => Some(Self::Name),
            "modified_subnode" => Some(Self::ModifiedSubnode),
            "location_id" => Some(Self::LocationId),
            "content_id" => Some(Self::ContentId),
            _ => None,
        }
    }
}

/// Direction children are listed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// One placement of a content item in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub content_id: ContentId,
    /// `None` only for the tree root.
    pub parent_id: Option<LocationId>,
    /// Materialized ancestor chain, e.g. `/1/5/42/`.
    pub path_string: String,
    /// Number of ancestors; the root has depth 0.
    pub depth: u32,
    /// Hidden by direct action.
    pub is_hidden: bool,
    /// Hidden directly or through an ancestor.
    pub is_invisible: bool,
    pub is_main: bool,
    pub priority: i32,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    /// Externally stable identifier, unique across locations.
    pub remote_id: String,
    /// Epoch ms of the last change in this location's subtree.
    pub modified_subnode_at: i64,
}

impl Location {
    /// Whether the location is visible to readers.
    pub fn is_visible(&self) -> bool {
        !self.is_invisible
    }
}

/// Input for placing a content item under a parent location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStruct {
    pub parent_id: LocationId,
    pub content_id: ContentId,
    pub is_hidden: bool,
    pub priority: i32,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    /// Generated when `None`.
    pub remote_id: Option<String>,
}

impl CreateStruct {
    /// Visible placement with default ordering metadata.
    pub fn new(parent_id: LocationId, content_id: ContentId) -> Self {
        Self {
            parent_id,
            content_id,
            is_hidden: false,
            priority: 0,
            sort_field: SortField::default(),
            sort_order: SortOrder::default(),
            remote_id: None,
        }
    }
}

/// Mutable location attributes; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateStruct {
    pub priority: Option<i32>,
    pub sort_field: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub remote_id: Option<String>,
}

impl UpdateStruct {
    /// Whether the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.priority.is_none()
            && self.sort_field.is_none()
            && self.sort_order.is_none()
            && self.remote_id.is_none()
    }
}
