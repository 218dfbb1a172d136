//! Location store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist locations and their materialized paths.
//! - Run every tree mutation (create, move, copy, swap, hide, remove, ...)
//!   as one `IMMEDIATE` transaction, so concurrent writers are serialized and
//!   readers never see a half-rewritten subtree.
//! - Keep content-side effects consistent through [`ContentBridge`].
//!
//! # Invariants
//! - `path_string` equals the parent's path plus `/{id}/`.
//! - Subtrees are addressed by path range scans, never recursive queries.
//! - Exactly one main location per content item that has locations.
//! - Relationship checks (cycles, root, ownership) run before any write.

use crate::db::DbError;
use crate::model::location::{
    ContentId, CreateStruct, Location, LocationId, SectionId, SortField, SortOrder, UpdateStruct,
};
use crate::repo::content_repo::{
    bool_to_int, generate_remote_id, load_required_content, ContentBridge, ContentRepoError,
    SqliteContentBridge,
};
use crate::repo::schema::{check_schema, SchemaProblem};
use crate::tree::main_location::{resolve_main_location, MainLocationDecision, RemainingLocation};
use crate::tree::path::{
    child_path, depth_of, is_within, parent_path, parse_path, rewrite_prefix, subtree_bounds,
    PathError,
};
use crate::tree::visibility::{hide_subtree, recompute_subtree, SubtreeNode, VisibilityUpdate};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

const LOCATION_COLUMNS: &[&str] = &[
    "id",
    "parent_id",
    "content_id",
    "path_string",
    "depth",
    "is_hidden",
    "is_invisible",
    "is_main",
    "priority",
    "sort_field",
    "sort_order",
    "remote_id",
    "modified_subnode_at",
];

/// Result type used by location store operations.
pub type LocationRepoResult<T> = Result<T, LocationRepoError>;

/// Coarse classification of [`LocationRepoError`] for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An id or remote id does not resolve.
    NotFound,
    /// Input has the wrong shape.
    InvalidArgument,
    /// The ids resolve but cannot be related this way.
    InvalidRelationship,
    /// Uniqueness or concurrent write conflict.
    Conflict,
    /// Storage failure or corrupt persisted state.
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidRelationship => "invalid_relationship",
            Self::Conflict => "conflict",
            Self::Storage => "storage",
        }
    }
}

/// Errors from location store operations.
#[derive(Debug)]
pub enum LocationRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Content-side failure not covered by a more specific variant.
    Bridge(ContentRepoError),
    LocationNotFound(LocationId),
    RemoteIdNotFound(String),
    ContentNotFound(ContentId),
    /// Content must be published to be copied.
    PublishedVersionNotFound(ContentId),
    SectionNotFound(SectionId),
    InvalidArgument {
        field: &'static str,
        message: String,
    },
    /// Destination lies inside the subtree being moved or copied.
    CycleDetected {
        location_id: LocationId,
        destination_id: LocationId,
    },
    /// The tree root cannot be moved, swapped or removed.
    RootLocationImmutable(LocationId),
    /// Operation needs two distinct locations.
    SameLocation(LocationId),
    LocationNotOwnedByContent {
        location_id: LocationId,
        content_id: ContentId,
    },
    RemoteIdConflict(String),
    /// Content already placed directly under this parent.
    DuplicatePlacement {
        parent_id: LocationId,
        content_id: ContentId,
    },
    /// Another writer held the database lock past the busy timeout.
    ConcurrentWrite(DbError),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl LocationRepoError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LocationNotFound(_)
            | Self::RemoteIdNotFound(_)
            | Self::ContentNotFound(_)
            | Self::PublishedVersionNotFound(_)
            | Self::SectionNotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::CycleDetected { .. }
            | Self::RootLocationImmutable(_)
            | Self::SameLocation(_)
            | Self::LocationNotOwnedByContent { .. } => ErrorKind::InvalidRelationship,
            Self::RemoteIdConflict(_)
            | Self::DuplicatePlacement { .. }
            | Self::ConcurrentWrite(_) => ErrorKind::Conflict,
            Self::Db(_)
            | Self::Bridge(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::InvalidData(_) => ErrorKind::Storage,
        }
    }
}

impl Display for LocationRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Bridge(err) => write!(f, "{err}"),
            Self::LocationNotFound(id) => write!(f, "location not found: {id}"),
            Self::RemoteIdNotFound(remote_id) => {
                write!(f, "location not found for remote id: {remote_id}")
            }
            Self::ContentNotFound(id) => write!(f, "content not found: {id}"),
            Self::PublishedVersionNotFound(id) => {
                write!(f, "content {id} has no published version")
            }
            Self::SectionNotFound(id) => write!(f, "section not found: {id}"),
            Self::InvalidArgument { field, message } => {
                write!(f, "invalid argument `{field}`: {message}")
            }
            Self::CycleDetected {
                location_id,
                destination_id,
            } => write!(
                f,
                "location {destination_id} is inside the subtree of {location_id}"
            ),
            Self::RootLocationImmutable(id) => {
                write!(f, "root location {id} cannot be moved, swapped or removed")
            }
            Self::SameLocation(id) => write!(f, "location {id} cannot be paired with itself"),
            Self::LocationNotOwnedByContent {
                location_id,
                content_id,
            } => write!(
                f,
                "location {location_id} does not belong to content {content_id}"
            ),
            Self::RemoteIdConflict(remote_id) => {
                write!(f, "location remote id already in use: {remote_id}")
            }
            Self::DuplicatePlacement {
                parent_id,
                content_id,
            } => write!(
                f,
                "content {content_id} is already placed under location {parent_id}"
            ),
            Self::ConcurrentWrite(err) => write!(f, "concurrent write conflict: {err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "location repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "location repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "location repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid location data: {message}"),
        }
    }
}

impl Error for LocationRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) | Self::ConcurrentWrite(err) => Some(err),
            Self::Bridge(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for LocationRepoError {
    fn from(value: DbError) -> Self {
        if value.is_busy() {
            Self::ConcurrentWrite(value)
        } else {
            Self::Db(value)
        }
    }
}

impl From<rusqlite::Error> for LocationRepoError {
    fn from(value: rusqlite::Error) -> Self {
        DbError::Sqlite(value).into()
    }
}

impl From<ContentRepoError> for LocationRepoError {
    fn from(value: ContentRepoError) -> Self {
        match value {
            ContentRepoError::Db(err) => err.into(),
            ContentRepoError::ContentNotFound(id) => Self::ContentNotFound(id),
            ContentRepoError::PublishedVersionNotFound(id) => Self::PublishedVersionNotFound(id),
            ContentRepoError::SectionNotFound(id) => Self::SectionNotFound(id),
            ContentRepoError::LocationNotFound(id) => Self::LocationNotFound(id),
            other => Self::Bridge(other),
        }
    }
}

impl From<PathError> for LocationRepoError {
    fn from(value: PathError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

impl From<SchemaProblem> for LocationRepoError {
    fn from(value: SchemaProblem) -> Self {
        match value {
            SchemaProblem::Db(err) => err.into(),
            SchemaProblem::VersionMismatch { expected, actual } => Self::UninitializedConnection {
                expected_version: expected,
                actual_version: actual,
            },
            SchemaProblem::MissingTable(table) => Self::MissingRequiredTable(table),
            SchemaProblem::MissingColumn { table, column } => {
                Self::MissingRequiredColumn { table, column }
            }
        }
    }
}

/// What `remove_subtree` did besides deleting locations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtreeRemoval {
    /// Number of deleted locations, root included.
    pub removed_locations: usize,
    /// Content items left without locations and deleted through the bridge.
    pub deleted_content: Vec<ContentId>,
    /// Locations promoted to main for content that lost its main location.
    pub promoted_main_locations: Vec<LocationId>,
}

/// Repository interface for the location tree.
pub trait LocationRepository {
    /// Loads one location.
    fn load(&self, location_id: LocationId) -> LocationRepoResult<Location>;
    /// Loads one location by remote id.
    fn load_by_remote_id(&self, remote_id: &str) -> LocationRepoResult<Location>;
    /// Maps every location of the subtree, root included, to its content id.
    fn load_subtree_ids(
        &self,
        location_id: LocationId,
    ) -> LocationRepoResult<BTreeMap<LocationId, ContentId>>;
    /// Lists locations of a content item, optionally inside one subtree.
    fn load_locations_by_content(
        &self,
        content_id: ContentId,
        root_location_id: Option<LocationId>,
    ) -> LocationRepoResult<Vec<Location>>;
    /// Lists parents an unpublished content item is assigned to.
    fn load_parent_locations_for_draft_content(
        &self,
        content_id: ContentId,
    ) -> LocationRepoResult<Vec<Location>>;
    /// Lists direct children ordered by priority, then id.
    fn load_children(&self, location_id: LocationId) -> LocationRepoResult<Vec<Location>>;
    /// Places a content item under a parent location.
    fn create(&self, create: &CreateStruct) -> LocationRepoResult<Location>;
    /// Changes ordering metadata and remote id.
    fn update(&self, update: &UpdateStruct, location_id: LocationId)
        -> LocationRepoResult<Location>;
    /// Deep-copies a subtree, cloning published content, under a new parent.
    fn copy_subtree(
        &self,
        source_id: LocationId,
        destination_parent_id: LocationId,
    ) -> LocationRepoResult<Location>;
    /// Moves a subtree under a new parent.
    fn move_subtree(
        &self,
        source_id: LocationId,
        destination_parent_id: LocationId,
    ) -> LocationRepoResult<()>;
    /// Exchanges the content two locations point at.
    fn swap(&self, location_id1: LocationId, location_id2: LocationId) -> LocationRepoResult<()>;
    /// Hides a location; the whole subtree becomes invisible.
    fn hide(&self, location_id: LocationId) -> LocationRepoResult<()>;
    /// Unhides a location; visibility is restored down to hidden descendants.
    fn un_hide(&self, location_id: LocationId) -> LocationRepoResult<()>;
    /// Stamps a location and all its ancestors as modified.
    fn mark_subtree_modified(
        &self,
        location_id: LocationId,
        timestamp: Option<i64>,
    ) -> LocationRepoResult<()>;
    /// Removes a subtree, deleting content left without locations.
    fn remove_subtree(&self, location_id: LocationId) -> LocationRepoResult<SubtreeRemoval>;
    /// Assigns a section to the content of every main location in a subtree.
    ///
    /// Returns the number of content items updated.
    fn set_section_for_subtree(
        &self,
        location_id: LocationId,
        section_id: SectionId,
    ) -> LocationRepoResult<usize>;
    /// Makes `location_id` the main location of `content_id`.
    fn change_main_location(
        &self,
        content_id: ContentId,
        location_id: LocationId,
    ) -> LocationRepoResult<()>;
}

/// SQLite-backed location store.
pub struct SqliteLocationRepository<'conn, B: ContentBridge = SqliteContentBridge> {
    conn: &'conn Connection,
    bridge: B,
}

impl<'conn> SqliteLocationRepository<'conn> {
    /// Creates repository from migrated connection with the SQLite content bridge.
    pub fn try_new(conn: &'conn Connection) -> LocationRepoResult<Self> {
        Self::with_bridge(conn, SqliteContentBridge)
    }
}

impl<'conn, B: ContentBridge> SqliteLocationRepository<'conn, B> {
    /// Creates repository from migrated connection and a custom content bridge.
    pub fn with_bridge(conn: &'conn Connection, bridge: B) -> LocationRepoResult<Self> {
        check_schema(
            conn,
            &[
                ("locations", LOCATION_COLUMNS),
                (
                    "node_assignments",
                    &["content_id", "version_no", "parent_location_id"],
                ),
                ("content", &["id", "status", "section_id"]),
            ],
        )?;
        Ok(Self { conn, bridge })
    }

    fn begin_write(&self) -> LocationRepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    fn begin_read(&self) -> LocationRepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Deferred,
        )?)
    }
}

impl<B: ContentBridge> LocationRepository for SqliteLocationRepository<'_, B> {
    fn load(&self, location_id: LocationId) -> LocationRepoResult<Location> {
        load_required_location(self.conn, location_id)
    }

    fn load_by_remote_id(&self, remote_id: &str) -> LocationRepoResult<Location> {
        let mut locations = query_locations(
            self.conn,
            "WHERE remote_id = ?1",
            vec![Value::Text(remote_id.to_string())],
        )?;
        locations
            .pop()
            .ok_or_else(|| LocationRepoError::RemoteIdNotFound(remote_id.to_string()))
    }

    fn load_subtree_ids(
        &self,
        location_id: LocationId,
    ) -> LocationRepoResult<BTreeMap<LocationId, ContentId>> {
        let tx = self.begin_read()?;
        let root = load_required_location(&tx, location_id)?;
        let (lower, upper) = subtree_bounds(&root.path_string)?;

        let mut ids = BTreeMap::new();
        {
            let mut stmt = tx.prepare(
                "SELECT id, content_id
                 FROM locations
                 WHERE path_string >= ?1
                   AND path_string < ?2;",
            )?;
            let mut rows = stmt.query(params![lower, upper])?;
            while let Some(row) = rows.next()? {
                ids.insert(row.get(0)?, row.get(1)?);
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    fn load_locations_by_content(
        &self,
        content_id: ContentId,
        root_location_id: Option<LocationId>,
    ) -> LocationRepoResult<Vec<Location>> {
        let tx = self.begin_read()?;
        let locations = match root_location_id {
            Some(root_id) => {
                let root = load_required_location(&tx, root_id)?;
                let (lower, upper) = subtree_bounds(&root.path_string)?;
                query_locations(
                    &tx,
                    "WHERE content_id = ?1
                       AND path_string >= ?2
                       AND path_string < ?3
                     ORDER BY id ASC",
                    vec![
                        Value::Integer(content_id),
                        Value::Text(lower),
                        Value::Text(upper),
                    ],
                )?
            }
            None => query_locations(
                &tx,
                "WHERE content_id = ?1 ORDER BY id ASC",
                vec![Value::Integer(content_id)],
            )?,
        };
        tx.commit()?;
        Ok(locations)
    }

    fn load_parent_locations_for_draft_content(
        &self,
        content_id: ContentId,
    ) -> LocationRepoResult<Vec<Location>> {
        query_locations(
            self.conn,
            "WHERE id IN (
                SELECT na.parent_location_id
                FROM node_assignments na
                INNER JOIN content c ON c.id = na.content_id
                WHERE na.content_id = ?1
                  AND c.status = 'draft'
             )
             ORDER BY id ASC",
            vec![Value::Integer(content_id)],
        )
    }

    fn load_children(&self, location_id: LocationId) -> LocationRepoResult<Vec<Location>> {
        let tx = self.begin_read()?;
        load_required_location(&tx, location_id)?;
        let children = query_locations(
            &tx,
            "WHERE parent_id = ?1 ORDER BY priority ASC, id ASC",
            vec![Value::Integer(location_id)],
        )?;
        tx.commit()?;
        Ok(children)
    }

    fn create(&self, create: &CreateStruct) -> LocationRepoResult<Location> {
        let requested_remote_id = create
            .remote_id
            .as_deref()
            .map(normalize_remote_id)
            .transpose()?;

        let tx = self.begin_write()?;
        let parent = load_required_location(&tx, create.parent_id)?;
        load_required_content(&tx, create.content_id)?;
        let remote_id = match requested_remote_id {
            Some(remote_id) => {
                ensure_remote_id_free(&tx, &remote_id, None)?;
                remote_id
            }
            None => generate_remote_id(),
        };
        ensure_single_placement(&tx, parent.id, create.content_id, &[])?;

        let is_main = !content_has_main_location(&tx, create.content_id)?;
        let location_id = insert_location(
            &tx,
            &NewLocationRow {
                parent: &parent,
                content_id: create.content_id,
                is_hidden: create.is_hidden,
                is_main,
                priority: create.priority,
                sort_field: create.sort_field,
                sort_order: create.sort_order,
                remote_id: &remote_id,
            },
        )?;
        stamp_modified(&tx, &parent.path_string, now_epoch_ms())?;

        let location = load_required_location(&tx, location_id)?;
        tx.commit()?;
        Ok(location)
    }

    fn update(
        &self,
        update: &UpdateStruct,
        location_id: LocationId,
    ) -> LocationRepoResult<Location> {
        if update.is_empty() {
            return load_required_location(self.conn, location_id);
        }
        let requested_remote_id = update
            .remote_id
            .as_deref()
            .map(normalize_remote_id)
            .transpose()?;

        let tx = self.begin_write()?;
        let current = load_required_location(&tx, location_id)?;
        let remote_id = match requested_remote_id {
            Some(remote_id) if remote_id != current.remote_id => {
                ensure_remote_id_free(&tx, &remote_id, Some(location_id))?;
                remote_id
            }
            _ => current.remote_id.clone(),
        };

        tx.execute(
            "UPDATE locations
             SET priority = ?2,
                 sort_field = ?3,
                 sort_order = ?4,
                 remote_id = ?5
             WHERE id = ?1;",
            params![
                location_id,
                update.priority.unwrap_or(current.priority),
                update.sort_field.unwrap_or(current.sort_field).as_str(),
                update.sort_order.unwrap_or(current.sort_order).as_str(),
                remote_id,
            ],
        )?;

        let location = load_required_location(&tx, location_id)?;
        tx.commit()?;
        Ok(location)
    }

    fn copy_subtree(
        &self,
        source_id: LocationId,
        destination_parent_id: LocationId,
    ) -> LocationRepoResult<Location> {
        let tx = self.begin_write()?;
        let source = load_required_location(&tx, source_id)?;
        let destination = load_required_location(&tx, destination_parent_id)?;
        if is_within(&destination.path_string, &source.path_string) {
            return Err(LocationRepoError::CycleDetected {
                location_id: source_id,
                destination_id: destination_parent_id,
            });
        }

        let subtree = load_subtree(&tx, &source.path_string)?;
        let mut copied_locations: HashMap<LocationId, Location> = HashMap::new();
        let mut copied_content: HashMap<ContentId, ContentId> = HashMap::new();

        // Path order visits every parent before its children.
        for original in &subtree {
            let new_parent = if original.id == source.id {
                &destination
            } else {
                original
                    .parent_id
                    .and_then(|parent_id| copied_locations.get(&parent_id))
                    .ok_or_else(|| {
                        LocationRepoError::InvalidData(format!(
                            "location {} has no parent inside copied subtree",
                            original.id
                        ))
                    })?
            };

            let content_id = match copied_content.get(&original.content_id) {
                Some(content_id) => *content_id,
                None => {
                    let version = self
                        .bridge
                        .current_published_version(&tx, original.content_id)?;
                    let content_id = self.bridge.create_content_from_version(&tx, &version)?;
                    copied_content.insert(original.content_id, content_id);
                    content_id
                }
            };

            let is_main = !content_has_main_location(&tx, content_id)?;
            let remote_id = generate_remote_id();
            let copy_id = insert_location(
                &tx,
                &NewLocationRow {
                    parent: new_parent,
                    content_id,
                    is_hidden: original.is_hidden,
                    is_main,
                    priority: original.priority,
                    sort_field: original.sort_field,
                    sort_order: original.sort_order,
                    remote_id: &remote_id,
                },
            )?;
            let copy = load_required_location(&tx, copy_id)?;
            copied_locations.insert(original.id, copy);
        }
        stamp_modified(&tx, &destination.path_string, now_epoch_ms())?;

        let new_root = copied_locations
            .remove(&source.id)
            .ok_or_else(|| LocationRepoError::InvalidData("copied subtree has no root".to_string()))?;
        tx.commit()?;

        debug!(
            "event=location_copy_rows module=location source_id={} new_root_id={} locations={} content={}",
            source_id,
            new_root.id,
            subtree.len(),
            copied_content.len()
        );
        Ok(new_root)
    }

    fn move_subtree(
        &self,
        source_id: LocationId,
        destination_parent_id: LocationId,
    ) -> LocationRepoResult<()> {
        let tx = self.begin_write()?;
        let source = load_required_location(&tx, source_id)?;
        let destination = load_required_location(&tx, destination_parent_id)?;
        let Some(old_parent_id) = source.parent_id else {
            return Err(LocationRepoError::RootLocationImmutable(source_id));
        };
        if is_within(&destination.path_string, &source.path_string) {
            return Err(LocationRepoError::CycleDetected {
                location_id: source_id,
                destination_id: destination_parent_id,
            });
        }
        if old_parent_id == destination.id {
            tx.commit()?;
            return Ok(());
        }
        ensure_single_placement(&tx, destination.id, source.content_id, &[source.id])?;

        let old_prefix = source.path_string.clone();
        let new_prefix = child_path(&destination.path_string, source.id)?;
        let subtree = load_subtree(&tx, &old_prefix)?;

        {
            let mut stmt = tx.prepare(
                "UPDATE locations
                 SET path_string = ?2,
                     depth = ?3
                 WHERE id = ?1;",
            )?;
            for location in &subtree {
                let new_path = rewrite_prefix(&location.path_string, &old_prefix, &new_prefix)?;
                let depth = depth_of(&new_path)?;
                stmt.execute(params![location.id, new_path, depth])?;
            }
        }
        tx.execute(
            "UPDATE locations SET parent_id = ?2 WHERE id = ?1;",
            params![source.id, destination.id],
        )?;

        let nodes = subtree_nodes(&subtree);
        let updates = recompute_subtree(
            &nodes,
            source.id,
            source.is_hidden,
            destination.is_invisible,
        );
        apply_visibility(&tx, &updates)?;

        let now = now_epoch_ms();
        if let Some(old_parent_path) = parent_path(&old_prefix)? {
            stamp_modified(&tx, &old_parent_path, now)?;
        }
        stamp_modified(&tx, &new_prefix, now)?;
        tx.commit()?;

        debug!(
            "event=location_move_rows module=location source_id={} destination_id={} locations={} visibility_changes={}",
            source_id,
            destination_parent_id,
            subtree.len(),
            updates.len()
        );
        Ok(())
    }

    fn swap(&self, location_id1: LocationId, location_id2: LocationId) -> LocationRepoResult<()> {
        if location_id1 == location_id2 {
            return Err(LocationRepoError::SameLocation(location_id1));
        }

        let tx = self.begin_write()?;
        let first = load_required_location(&tx, location_id1)?;
        let second = load_required_location(&tx, location_id2)?;
        let (Some(first_parent), Some(second_parent)) = (first.parent_id, second.parent_id) else {
            let root_id = if first.parent_id.is_none() {
                first.id
            } else {
                second.id
            };
            return Err(LocationRepoError::RootLocationImmutable(root_id));
        };
        if first.content_id == second.content_id {
            tx.commit()?;
            return Ok(());
        }
        let pair = [first.id, second.id];
        ensure_single_placement(&tx, first_parent, second.content_id, &pair)?;
        ensure_single_placement(&tx, second_parent, first.content_id, &pair)?;

        // Clear both main flags first: the one-main-per-content index is
        // checked row by row.
        tx.execute(
            "UPDATE locations SET is_main = 0 WHERE id IN (?1, ?2);",
            params![first.id, second.id],
        )?;
        tx.execute(
            "UPDATE locations SET content_id = ?2, is_main = ?3 WHERE id = ?1;",
            params![first.id, second.content_id, bool_to_int(second.is_main)],
        )?;
        tx.execute(
            "UPDATE locations SET content_id = ?2, is_main = ?3 WHERE id = ?1;",
            params![second.id, first.content_id, bool_to_int(first.is_main)],
        )?;

        let now = now_epoch_ms();
        stamp_modified(&tx, &first.path_string, now)?;
        stamp_modified(&tx, &second.path_string, now)?;
        tx.commit()?;
        Ok(())
    }

    fn hide(&self, location_id: LocationId) -> LocationRepoResult<()> {
        let tx = self.begin_write()?;
        let location = load_required_location(&tx, location_id)?;
        tx.execute(
            "UPDATE locations SET is_hidden = 1 WHERE id = ?1;",
            [location_id],
        )?;

        let subtree = load_subtree(&tx, &location.path_string)?;
        let updates = hide_subtree(&subtree_nodes(&subtree));
        apply_visibility(&tx, &updates)?;
        stamp_modified(&tx, &location.path_string, now_epoch_ms())?;
        tx.commit()?;

        debug!(
            "event=location_hide_rows module=location location_id={} visibility_changes={}",
            location_id,
            updates.len()
        );
        Ok(())
    }

    fn un_hide(&self, location_id: LocationId) -> LocationRepoResult<()> {
        let tx = self.begin_write()?;
        let location = load_required_location(&tx, location_id)?;
        let parent_invisible = match location.parent_id {
            Some(parent_id) => load_required_location(&tx, parent_id)?.is_invisible,
            None => false,
        };
        tx.execute(
            "UPDATE locations SET is_hidden = 0 WHERE id = ?1;",
            [location_id],
        )?;

        let subtree = load_subtree(&tx, &location.path_string)?;
        let updates = recompute_subtree(
            &subtree_nodes(&subtree),
            location_id,
            false,
            parent_invisible,
        );
        apply_visibility(&tx, &updates)?;
        stamp_modified(&tx, &location.path_string, now_epoch_ms())?;
        tx.commit()?;

        debug!(
            "event=location_unhide_rows module=location location_id={} visibility_changes={}",
            location_id,
            updates.len()
        );
        Ok(())
    }

    fn mark_subtree_modified(
        &self,
        location_id: LocationId,
        timestamp: Option<i64>,
    ) -> LocationRepoResult<()> {
        if let Some(value) = timestamp {
            if value < 0 {
                return Err(LocationRepoError::InvalidArgument {
                    field: "timestamp",
                    message: format!("must not be negative, got {value}"),
                });
            }
        }

        let tx = self.begin_write()?;
        let location = load_required_location(&tx, location_id)?;
        stamp_modified(
            &tx,
            &location.path_string,
            timestamp.unwrap_or_else(now_epoch_ms),
        )?;
        tx.commit()?;
        Ok(())
    }

    fn remove_subtree(&self, location_id: LocationId) -> LocationRepoResult<SubtreeRemoval> {
        let tx = self.begin_write()?;
        let root = load_required_location(&tx, location_id)?;
        if root.parent_id.is_none() {
            return Err(LocationRepoError::RootLocationImmutable(location_id));
        }

        let subtree = load_subtree(&tx, &root.path_string)?;
        let affected_content: BTreeSet<ContentId> =
            subtree.iter().map(|location| location.content_id).collect();
        let (lower, upper) = subtree_bounds(&root.path_string)?;
        let removed_locations = tx.execute(
            "DELETE FROM locations
             WHERE path_string >= ?1
               AND path_string < ?2;",
            params![lower, upper],
        )?;

        let mut removal = SubtreeRemoval {
            removed_locations,
            ..SubtreeRemoval::default()
        };
        for content_id in affected_content {
            let remaining = load_remaining_locations(&tx, content_id)?;
            match resolve_main_location(&remaining) {
                MainLocationDecision::Keep(_) => {}
                MainLocationDecision::Promote(promoted_id) => {
                    tx.execute(
                        "UPDATE locations SET is_main = 1 WHERE id = ?1;",
                        [promoted_id],
                    )?;
                    removal.promoted_main_locations.push(promoted_id);
                }
                MainLocationDecision::DeleteContent => {
                    self.bridge.delete_content(&tx, content_id)?;
                    removal.deleted_content.push(content_id);
                }
            }
        }

        if let Some(parent_path) = parent_path(&root.path_string)? {
            stamp_modified(&tx, &parent_path, now_epoch_ms())?;
        }
        tx.commit()?;

        debug!(
            "event=location_remove_rows module=location location_id={} locations={} deleted_content={} promoted={}",
            location_id,
            removal.removed_locations,
            removal.deleted_content.len(),
            removal.promoted_main_locations.len()
        );
        Ok(removal)
    }

    fn set_section_for_subtree(
        &self,
        location_id: LocationId,
        section_id: SectionId,
    ) -> LocationRepoResult<usize> {
        let tx = self.begin_write()?;
        let root = load_required_location(&tx, location_id)?;
        let updated = assign_section_to_subtree(&tx, &self.bridge, &root, section_id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn change_main_location(
        &self,
        content_id: ContentId,
        location_id: LocationId,
    ) -> LocationRepoResult<()> {
        let tx = self.begin_write()?;
        let location = load_required_location(&tx, location_id)?;
        load_required_content(&tx, content_id)?;
        if location.content_id != content_id {
            return Err(LocationRepoError::LocationNotOwnedByContent {
                location_id,
                content_id,
            });
        }

        if !location.is_main {
            tx.execute(
                "UPDATE locations SET is_main = 0 WHERE content_id = ?1 AND is_main = 1;",
                [content_id],
            )?;
            tx.execute(
                "UPDATE locations SET is_main = 1 WHERE id = ?1;",
                [location_id],
            )?;
        }

        // The new main location's subtree follows the section of its parent's content.
        if let Some(parent_id) = location.parent_id {
            let parent = load_required_location(&tx, parent_id)?;
            let parent_content = load_required_content(&tx, parent.content_id)?;
            assign_section_to_subtree(&tx, &self.bridge, &location, parent_content.section_id)?;
        }
        tx.commit()?;
        Ok(())
    }
}

struct NewLocationRow<'a> {
    parent: &'a Location,
    content_id: ContentId,
    is_hidden: bool,
    is_main: bool,
    priority: i32,
    sort_field: SortField,
    sort_order: SortOrder,
    remote_id: &'a str,
}

/// Inserts a location under `row.parent` and derives its path from the new id.
fn insert_location(conn: &Connection, row: &NewLocationRow<'_>) -> LocationRepoResult<LocationId> {
    // The path depends on the id, so insert with a unique placeholder first.
    let placeholder = format!("pending:{}", row.remote_id);
    conn.execute(
        "INSERT INTO locations (
            parent_id,
            content_id,
            path_string,
            depth,
            is_hidden,
            is_invisible,
            is_main,
            priority,
            sort_field,
            sort_order,
            remote_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
        params![
            row.parent.id,
            row.content_id,
            placeholder,
            row.parent.depth + 1,
            bool_to_int(row.is_hidden),
            bool_to_int(row.is_hidden || row.parent.is_invisible),
            bool_to_int(row.is_main),
            row.priority,
            row.sort_field.as_str(),
            row.sort_order.as_str(),
            row.remote_id,
        ],
    )?;
    let location_id = conn.last_insert_rowid();
    let path = child_path(&row.parent.path_string, location_id)?;
    conn.execute(
        "UPDATE locations SET path_string = ?2 WHERE id = ?1;",
        params![location_id, path],
    )?;
    Ok(location_id)
}

fn assign_section_to_subtree<B: ContentBridge>(
    conn: &Connection,
    bridge: &B,
    root: &Location,
    section_id: SectionId,
) -> LocationRepoResult<usize> {
    let section_exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sections WHERE id = ?1);",
        [section_id],
        |row| row.get(0),
    )?;
    if section_exists == 0 {
        return Err(LocationRepoError::SectionNotFound(section_id));
    }

    let (lower, upper) = subtree_bounds(&root.path_string)?;
    let mut content_ids = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT content_id
             FROM locations
             WHERE path_string >= ?1
               AND path_string < ?2
               AND is_main = 1
             ORDER BY content_id ASC;",
        )?;
        let mut rows = stmt.query(params![lower, upper])?;
        while let Some(row) = rows.next()? {
            content_ids.push(row.get::<_, ContentId>(0)?);
        }
    }
    for content_id in &content_ids {
        bridge.set_section(conn, *content_id, section_id)?;
    }
    Ok(content_ids.len())
}

fn load_required_location(
    conn: &Connection,
    location_id: LocationId,
) -> LocationRepoResult<Location> {
    let mut locations = query_locations(
        conn,
        "WHERE id = ?1",
        vec![Value::Integer(location_id)],
    )?;
    locations
        .pop()
        .ok_or(LocationRepoError::LocationNotFound(location_id))
}

/// Loads the subtree rooted at `root_path`, ancestors before descendants.
fn load_subtree(conn: &Connection, root_path: &str) -> LocationRepoResult<Vec<Location>> {
    let (lower, upper) = subtree_bounds(root_path)?;
    query_locations(
        conn,
        "WHERE path_string >= ?1
           AND path_string < ?2
         ORDER BY path_string ASC",
        vec![Value::Text(lower), Value::Text(upper)],
    )
}

fn query_locations(
    conn: &Connection,
    clause: &str,
    bind_values: Vec<Value>,
) -> LocationRepoResult<Vec<Location>> {
    let sql = format!(
        "SELECT {} FROM locations {clause};",
        LOCATION_COLUMNS.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut locations = Vec::new();
    while let Some(row) = rows.next()? {
        locations.push(parse_location_row(row)?);
    }
    Ok(locations)
}

fn load_remaining_locations(
    conn: &Connection,
    content_id: ContentId,
) -> LocationRepoResult<Vec<RemainingLocation>> {
    let mut stmt = conn.prepare(
        "SELECT id, is_main
         FROM locations
         WHERE content_id = ?1
         ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query([content_id])?;
    let mut remaining = Vec::new();
    while let Some(row) = rows.next()? {
        remaining.push(RemainingLocation {
            id: row.get(0)?,
            is_main: row.get::<_, i64>(1)? == 1,
        });
    }
    Ok(remaining)
}

fn content_has_main_location(conn: &Connection, content_id: ContentId) -> LocationRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM locations WHERE content_id = ?1 AND is_main = 1
        );",
        [content_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_remote_id_free(
    conn: &Connection,
    remote_id: &str,
    owner: Option<LocationId>,
) -> LocationRepoResult<()> {
    let holder: Option<LocationId> = conn
        .query_row(
            "SELECT id FROM locations WHERE remote_id = ?1;",
            [remote_id],
            |row| row.get(0),
        )
        .optional()?;
    match holder {
        Some(id) if Some(id) != owner => {
            Err(LocationRepoError::RemoteIdConflict(remote_id.to_string()))
        }
        _ => Ok(()),
    }
}

/// Fails if `content_id` already sits directly under `parent_id` at a
/// location other than `ignored`.
fn ensure_single_placement(
    conn: &Connection,
    parent_id: LocationId,
    content_id: ContentId,
    ignored: &[LocationId],
) -> LocationRepoResult<()> {
    let mut stmt = conn.prepare(
        "SELECT id
         FROM locations
         WHERE parent_id = ?1
           AND content_id = ?2;",
    )?;
    let mut rows = stmt.query(params![parent_id, content_id])?;
    while let Some(row) = rows.next()? {
        let id: LocationId = row.get(0)?;
        if !ignored.contains(&id) {
            return Err(LocationRepoError::DuplicatePlacement {
                parent_id,
                content_id,
            });
        }
    }
    Ok(())
}

fn apply_visibility(conn: &Connection, updates: &[VisibilityUpdate]) -> LocationRepoResult<()> {
    let mut stmt = conn.prepare("UPDATE locations SET is_invisible = ?2 WHERE id = ?1;")?;
    for update in updates {
        stmt.execute(params![update.id, bool_to_int(update.is_invisible)])?;
    }
    Ok(())
}

/// Stamps the location at `path` and every ancestor.
fn stamp_modified(conn: &Connection, path: &str, timestamp: i64) -> LocationRepoResult<()> {
    let mut stmt = conn.prepare("UPDATE locations SET modified_subnode_at = ?2 WHERE id = ?1;")?;
    for id in parse_path(path)? {
        stmt.execute(params![id, timestamp])?;
    }
    Ok(())
}

fn subtree_nodes(subtree: &[Location]) -> Vec<SubtreeNode> {
    subtree
        .iter()
        .map(|location| SubtreeNode {
            id: location.id,
            parent_id: location.parent_id,
            is_hidden: location.is_hidden,
            is_invisible: location.is_invisible,
        })
        .collect()
}

fn normalize_remote_id(value: &str) -> LocationRepoResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LocationRepoError::InvalidArgument {
            field: "remote_id",
            message: "must not be blank".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

fn parse_location_row(row: &Row<'_>) -> LocationRepoResult<Location> {
    let sort_field_text: String = row.get("sort_field")?;
    let sort_field = SortField::parse(&sort_field_text).ok_or_else(|| {
        LocationRepoError::InvalidData(format!(
            "invalid sort field `{sort_field_text}` in locations.sort_field"
        ))
    })?;
    let sort_order_text: String = row.get("sort_order")?;
    let sort_order = SortOrder::parse(&sort_order_text).ok_or_else(|| {
        LocationRepoError::InvalidData(format!(
            "invalid sort order `{sort_order_text}` in locations.sort_order"
        ))
    })?;

    Ok(Location {
        id: row.get("id")?,
        content_id: row.get("content_id")?,
        parent_id: row.get("parent_id")?,
        path_string: row.get("path_string")?,
        depth: row.get("depth")?,
        is_hidden: parse_flag(row, "is_hidden")?,
        is_invisible: parse_flag(row, "is_invisible")?,
        is_main: parse_flag(row, "is_main")?,
        priority: row.get("priority")?,
        sort_field,
        sort_order,
        remote_id: row.get("remote_id")?,
        modified_subnode_at: row.get("modified_subnode_at")?,
    })
}

fn parse_flag(row: &Row<'_>, column: &'static str) -> LocationRepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(LocationRepoError::InvalidData(format!(
            "invalid {column} value `{other}` in locations.{column}"
        ))),
    }
}
