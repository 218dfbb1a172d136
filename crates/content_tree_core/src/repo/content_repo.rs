//! Content repository and the content side of the location bridge.
//!
//! # Responsibility
//! - Create, publish and version content items that locations point at.
//! - Implement [`ContentBridge`], the only path through which location
//!   operations touch content rows.
//!
//! # Invariants
//! - Bridge calls run on the caller's connection, i.e. inside the caller's
//!   open transaction, so content side effects commit or roll back with the
//!   tree mutation that caused them.
//! - A content item has at most one published version.
//! - Content rows referenced by a location cannot be deleted (FK).

use crate::db::DbError;
use crate::model::content::{
    is_valid_language_code, ContentInfo, ContentStatus, FieldData, NewContent, Section,
    VersionData, VersionInfo, VersionStatus,
};
use crate::model::location::{ContentId, LocationId, SectionId};
use crate::repo::schema::{check_schema, SchemaProblem};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const CONTENT_SELECT_SQL: &str = "SELECT
    id,
    remote_id,
    name,
    section_id,
    main_language_code,
    always_available,
    status,
    current_version_no
FROM content";

pub type ContentRepoResult<T> = Result<T, ContentRepoError>;

/// Errors from content persistence and bridge operations.
#[derive(Debug)]
pub enum ContentRepoError {
    Db(DbError),
    ContentNotFound(ContentId),
    VersionNotFound {
        content_id: ContentId,
        version_no: u32,
    },
    /// Content exists but has never been published.
    PublishedVersionNotFound(ContentId),
    SectionNotFound(SectionId),
    LocationNotFound(LocationId),
    /// Version exists but is not a draft.
    VersionNotDraft {
        content_id: ContentId,
        version_no: u32,
    },
    RemoteIdConflict(String),
    SectionIdentifierConflict(String),
    InvalidArgument {
        field: &'static str,
        message: String,
    },
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    InvalidData(String),
}

impl Display for ContentRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ContentNotFound(id) => write!(f, "content not found: {id}"),
            Self::VersionNotFound {
                content_id,
                version_no,
            } => write!(f, "version {version_no} of content {content_id} not found"),
            Self::PublishedVersionNotFound(id) => {
                write!(f, "content {id} has no published version")
            }
            Self::SectionNotFound(id) => write!(f, "section not found: {id}"),
            Self::LocationNotFound(id) => write!(f, "location not found: {id}"),
            Self::VersionNotDraft {
                content_id,
                version_no,
            } => write!(
                f,
                "version {version_no} of content {content_id} is not a draft"
            ),
            Self::RemoteIdConflict(remote_id) => {
                write!(f, "content remote id already in use: {remote_id}")
            }
            Self::SectionIdentifierConflict(identifier) => {
                write!(f, "section identifier already in use: {identifier}")
            }
            Self::InvalidArgument { field, message } => {
                write!(f, "invalid argument `{field}`: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "content repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "content repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "content repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid content data: {message}"),
        }
    }
}

impl Error for ContentRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ContentRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ContentRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SchemaProblem> for ContentRepoError {
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

/// Content-side operations the location store depends on.
///
/// Every method receives the connection the caller is working on; when the
/// caller holds an open transaction, the bridge's writes are part of it.
pub trait ContentBridge {
    /// Deletes a content item with all versions, fields and draft placements.
    fn delete_content(&self, conn: &Connection, content_id: ContentId) -> ContentRepoResult<()>;
    /// Loads the current published version with its fields.
    fn current_published_version(
        &self,
        conn: &Connection,
        content_id: ContentId,
    ) -> ContentRepoResult<VersionData>;
    /// Creates a new published content item holding a copy of `version` only.
    fn create_content_from_version(
        &self,
        conn: &Connection,
        version: &VersionData,
    ) -> ContentRepoResult<ContentId>;
    /// Assigns a content item to a section.
    fn set_section(
        &self,
        conn: &Connection,
        content_id: ContentId,
        section_id: SectionId,
    ) -> ContentRepoResult<()>;
}

/// Bridge over the SQLite content tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteContentBridge;

impl ContentBridge for SqliteContentBridge {
    fn delete_content(&self, conn: &Connection, content_id: ContentId) -> ContentRepoResult<()> {
        let changed = conn.execute("DELETE FROM content WHERE id = ?1;", [content_id])?;
        if changed == 0 {
            return Err(ContentRepoError::ContentNotFound(content_id));
        }
        Ok(())
    }

    fn current_published_version(
        &self,
        conn: &Connection,
        content_id: ContentId,
    ) -> ContentRepoResult<VersionData> {
        let content = load_required_content(conn, content_id)?;
        let row: Option<(i64, u32, String)> = conn
            .query_row(
                "SELECT id, version_no, initial_language_code
                 FROM content_versions
                 WHERE content_id = ?1
                   AND status = 'published';",
                [content_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((version_row_id, version_no, initial_language_code)) = row else {
            return Err(ContentRepoError::PublishedVersionNotFound(content_id));
        };

        Ok(VersionData {
            content,
            version: VersionInfo {
                content_id,
                version_no,
                status: VersionStatus::Published,
                initial_language_code,
            },
            fields: load_fields(conn, version_row_id)?,
        })
    }

    fn create_content_from_version(
        &self,
        conn: &Connection,
        version: &VersionData,
    ) -> ContentRepoResult<ContentId> {
        let source = &version.content;
        conn.execute(
            "INSERT INTO content (
                remote_id,
                name,
                section_id,
                main_language_code,
                always_available,
                status,
                current_version_no
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'published', 1);",
            params![
                generate_remote_id(),
                source.name.as_str(),
                source.section_id,
                source.main_language_code.as_str(),
                bool_to_int(source.always_available),
            ],
        )?;
        let content_id = conn.last_insert_rowid();
        let version_row_id = insert_version(
            conn,
            content_id,
            1,
            VersionStatus::Published,
            &version.version.initial_language_code,
        )?;
        insert_fields(conn, version_row_id, &version.fields)?;
        Ok(content_id)
    }

    fn set_section(
        &self,
        conn: &Connection,
        content_id: ContentId,
        section_id: SectionId,
    ) -> ContentRepoResult<()> {
        ensure_section_exists(conn, section_id)?;
        let changed = conn.execute(
            "UPDATE content
             SET section_id = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![content_id, section_id],
        )?;
        if changed == 0 {
            return Err(ContentRepoError::ContentNotFound(content_id));
        }
        Ok(())
    }
}

/// Repository interface for content, version and section records.
pub trait ContentRepository {
    /// Creates a section.
    fn create_section(&self, identifier: &str, name: &str) -> ContentRepoResult<Section>;
    /// Loads a section by id.
    fn load_section(&self, section_id: SectionId) -> ContentRepoResult<Section>;
    /// Creates a never-published content item with draft version 1.
    fn create_content(&self, content: &NewContent) -> ContentRepoResult<ContentInfo>;
    /// Loads content metadata.
    fn load_content_info(&self, content_id: ContentId) -> ContentRepoResult<ContentInfo>;
    /// Publishes a draft version, archiving the previously published one.
    fn publish_version(&self, content_id: ContentId, version_no: u32)
        -> ContentRepoResult<ContentInfo>;
    /// Creates a new draft version copying the published fields.
    fn create_draft_from_published(&self, content_id: ContentId) -> ContentRepoResult<VersionInfo>;
    /// Lists every version, oldest first.
    fn list_versions(&self, content_id: ContentId) -> ContentRepoResult<Vec<VersionInfo>>;
    /// Records a parent location the current draft will be placed under on publish.
    fn add_draft_placement(
        &self,
        content_id: ContentId,
        parent_location_id: LocationId,
    ) -> ContentRepoResult<()>;
}

/// SQLite-backed content repository.
pub struct SqliteContentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContentRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> ContentRepoResult<Self> {
        check_schema(
            conn,
            &[
                ("sections", &["id", "identifier", "name"]),
                (
                    "content",
                    &[
                        "id",
                        "remote_id",
                        "name",
                        "section_id",
                        "main_language_code",
                        "always_available",
                        "status",
                        "current_version_no",
                    ],
                ),
                (
                    "content_versions",
                    &["id", "content_id", "version_no", "status", "initial_language_code"],
                ),
                (
                    "content_fields",
                    &["version_id", "field_identifier", "language_code", "value"],
                ),
                (
                    "node_assignments",
                    &["content_id", "version_no", "parent_location_id"],
                ),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl ContentRepository for SqliteContentRepository<'_> {
    fn create_section(&self, identifier: &str, name: &str) -> ContentRepoResult<Section> {
        let identifier = require_text("identifier", identifier)?;
        let name = require_text("name", name)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let taken: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM sections WHERE identifier = ?1);",
            [identifier],
            |row| row.get(0),
        )?;
        if taken == 1 {
            return Err(ContentRepoError::SectionIdentifierConflict(
                identifier.to_string(),
            ));
        }
        tx.execute(
            "INSERT INTO sections (identifier, name) VALUES (?1, ?2);",
            params![identifier, name],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Section {
            id,
            identifier: identifier.to_string(),
            name: name.to_string(),
        })
    }

    fn load_section(&self, section_id: SectionId) -> ContentRepoResult<Section> {
        self.conn
            .query_row(
                "SELECT id, identifier, name FROM sections WHERE id = ?1;",
                [section_id],
                |row| {
                    Ok(Section {
                        id: row.get(0)?,
                        identifier: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or(ContentRepoError::SectionNotFound(section_id))
    }

    fn create_content(&self, content: &NewContent) -> ContentRepoResult<ContentInfo> {
        validate_new_content(content)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_section_exists(&tx, content.section_id)?;
        let remote_id = match content.remote_id.as_deref() {
            Some(remote_id) => {
                let remote_id = require_text("remote_id", remote_id)?;
                let taken: i64 = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM content WHERE remote_id = ?1);",
                    [remote_id],
                    |row| row.get(0),
                )?;
                if taken == 1 {
                    return Err(ContentRepoError::RemoteIdConflict(remote_id.to_string()));
                }
                remote_id.to_string()
            }
            None => generate_remote_id(),
        };

        tx.execute(
            "INSERT INTO content (
                remote_id,
                name,
                section_id,
                main_language_code,
                always_available,
                status,
                current_version_no
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'draft', 1);",
            params![
                remote_id,
                content.name.trim(),
                content.section_id,
                content.main_language_code.as_str(),
                bool_to_int(content.always_available),
            ],
        )?;
        let content_id = tx.last_insert_rowid();
        let version_row_id = insert_version(
            &tx,
            content_id,
            1,
            VersionStatus::Draft,
            &content.main_language_code,
        )?;
        insert_fields(&tx, version_row_id, &content.fields)?;
        let info = load_required_content(&tx, content_id)?;
        tx.commit()?;
        Ok(info)
    }

    fn load_content_info(&self, content_id: ContentId) -> ContentRepoResult<ContentInfo> {
        load_required_content(self.conn, content_id)
    }

    fn publish_version(
        &self,
        content_id: ContentId,
        version_no: u32,
    ) -> ContentRepoResult<ContentInfo> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_required_content(&tx, content_id)?;
        let status = load_version_status(&tx, content_id, version_no)?;
        if status != VersionStatus::Draft {
            return Err(ContentRepoError::VersionNotDraft {
                content_id,
                version_no,
            });
        }

        tx.execute(
            "UPDATE content_versions
             SET status = 'archived'
             WHERE content_id = ?1
               AND status = 'published';",
            [content_id],
        )?;
        tx.execute(
            "UPDATE content_versions
             SET status = 'published'
             WHERE content_id = ?1
               AND version_no = ?2;",
            params![content_id, version_no],
        )?;
        tx.execute(
            "UPDATE content
             SET status = 'published',
                 current_version_no = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![content_id, version_no],
        )?;
        let info = load_required_content(&tx, content_id)?;
        tx.commit()?;
        Ok(info)
    }

    fn create_draft_from_published(&self, content_id: ContentId) -> ContentRepoResult<VersionInfo> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let published = SqliteContentBridge.current_published_version(&tx, content_id)?;
        let next_version_no: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version_no), 0) + 1
             FROM content_versions
             WHERE content_id = ?1;",
            [content_id],
            |row| row.get(0),
        )?;
        let version_row_id = insert_version(
            &tx,
            content_id,
            next_version_no,
            VersionStatus::Draft,
            &published.version.initial_language_code,
        )?;
        insert_fields(&tx, version_row_id, &published.fields)?;
        tx.commit()?;

        Ok(VersionInfo {
            content_id,
            version_no: next_version_no,
            status: VersionStatus::Draft,
            initial_language_code: published.version.initial_language_code,
        })
    }

    fn list_versions(&self, content_id: ContentId) -> ContentRepoResult<Vec<VersionInfo>> {
        load_required_content(self.conn, content_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT content_id, version_no, status, initial_language_code
             FROM content_versions
             WHERE content_id = ?1
             ORDER BY version_no ASC;",
        )?;
        let mut rows = stmt.query([content_id])?;
        let mut versions = Vec::new();
        while let Some(row) = rows.next()? {
            let status_text: String = row.get(2)?;
            versions.push(VersionInfo {
                content_id: row.get(0)?,
                version_no: row.get(1)?,
                status: parse_version_status(&status_text)?,
                initial_language_code: row.get(3)?,
            });
        }
        Ok(versions)
    }

    fn add_draft_placement(
        &self,
        content_id: ContentId,
        parent_location_id: LocationId,
    ) -> ContentRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let content = load_required_content(&tx, content_id)?;
        let parent_exists: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM locations WHERE id = ?1);",
            [parent_location_id],
            |row| row.get(0),
        )?;
        if parent_exists == 0 {
            return Err(ContentRepoError::LocationNotFound(parent_location_id));
        }
        tx.execute(
            "INSERT OR IGNORE INTO node_assignments (
                content_id,
                version_no,
                parent_location_id
            ) VALUES (?1, ?2, ?3);",
            params![content_id, content.current_version_no, parent_location_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Loads content metadata or fails with `ContentNotFound`.
pub(crate) fn load_required_content(
    conn: &Connection,
    content_id: ContentId,
) -> ContentRepoResult<ContentInfo> {
    let mut stmt = conn.prepare(&format!("{CONTENT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([content_id])?;
    if let Some(row) = rows.next()? {
        return parse_content_row(row);
    }
    Err(ContentRepoError::ContentNotFound(content_id))
}

fn ensure_section_exists(conn: &Connection, section_id: SectionId) -> ContentRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sections WHERE id = ?1);",
        [section_id],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(ContentRepoError::SectionNotFound(section_id));
    }
    Ok(())
}

fn load_version_status(
    conn: &Connection,
    content_id: ContentId,
    version_no: u32,
) -> ContentRepoResult<VersionStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status
             FROM content_versions
             WHERE content_id = ?1
               AND version_no = ?2;",
            params![content_id, version_no],
            |row| row.get(0),
        )
        .optional()?;
    match status {
        Some(value) => parse_version_status(&value),
        None => Err(ContentRepoError::VersionNotFound {
            content_id,
            version_no,
        }),
    }
}

fn insert_version(
    conn: &Connection,
    content_id: ContentId,
    version_no: u32,
    status: VersionStatus,
    initial_language_code: &str,
) -> ContentRepoResult<i64> {
    conn.execute(
        "INSERT INTO content_versions (
            content_id,
            version_no,
            status,
            initial_language_code
        ) VALUES (?1, ?2, ?3, ?4);",
        params![
            content_id,
            version_no,
            version_status_to_db(status),
            initial_language_code
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_fields(conn: &Connection, version_row_id: i64, fields: &[FieldData]) -> ContentRepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO content_fields (
            version_id,
            field_identifier,
            language_code,
            value
        ) VALUES (?1, ?2, ?3, ?4);",
    )?;
    for field in fields {
        stmt.execute(params![
            version_row_id,
            field.identifier.as_str(),
            field.language_code.as_str(),
            field.value.as_str(),
        ])?;
    }
    Ok(())
}

fn load_fields(conn: &Connection, version_row_id: i64) -> ContentRepoResult<Vec<FieldData>> {
    let mut stmt = conn.prepare(
        "SELECT field_identifier, language_code, value
         FROM content_fields
         WHERE version_id = ?1
         ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query([version_row_id])?;
    let mut fields = Vec::new();
    while let Some(row) = rows.next()? {
        fields.push(FieldData {
            identifier: row.get(0)?,
            language_code: row.get(1)?,
            value: row.get(2)?,
        });
    }
    Ok(fields)
}

fn validate_new_content(content: &NewContent) -> ContentRepoResult<()> {
    require_text("name", &content.name)?;
    if !is_valid_language_code(&content.main_language_code) {
        return Err(ContentRepoError::InvalidArgument {
            field: "main_language_code",
            message: format!("`{}` is not a language code", content.main_language_code),
        });
    }
    for field in &content.fields {
        require_text("fields.identifier", &field.identifier)?;
        if !is_valid_language_code(&field.language_code) {
            return Err(ContentRepoError::InvalidArgument {
                field: "fields.language_code",
                message: format!("`{}` is not a language code", field.language_code),
            });
        }
    }
    Ok(())
}

fn require_text<'a>(field: &'static str, value: &'a str) -> ContentRepoResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ContentRepoError::InvalidArgument {
            field,
            message: "must not be blank".to_string(),
        });
    }
    Ok(trimmed)
}

fn parse_content_row(row: &Row<'_>) -> ContentRepoResult<ContentInfo> {
    let status_text: String = row.get("status")?;
    let status = match status_text.as_str() {
        "draft" => ContentStatus::Draft,
        "published" => ContentStatus::Published,
        other => {
            return Err(ContentRepoError::InvalidData(format!(
                "invalid status `{other}` in content.status"
            )));
        }
    };
    let always_available = match row.get::<_, i64>("always_available")? {
        0 => false,
        1 => true,
        other => {
            return Err(ContentRepoError::InvalidData(format!(
                "invalid always_available value `{other}` in content.always_available"
            )));
        }
    };

    Ok(ContentInfo {
        id: row.get("id")?,
        remote_id: row.get("remote_id")?,
        name: row.get("name")?,
        section_id: row.get("section_id")?,
        main_language_code: row.get("main_language_code")?,
        always_available,
        status,
        current_version_no: row.get("current_version_no")?,
    })
}

fn version_status_to_db(status: VersionStatus) -> &'static str {
    match status {
        VersionStatus::Draft => "draft",
        VersionStatus::Published => "published",
        VersionStatus::Archived => "archived",
    }
}

fn parse_version_status(value: &str) -> ContentRepoResult<VersionStatus> {
    match value {
        "draft" => Ok(VersionStatus::Draft),
        "published" => Ok(VersionStatus::Published),
        "archived" => Ok(VersionStatus::Archived),
        other => Err(ContentRepoError::InvalidData(format!(
            "invalid version status `{other}` in content_versions.status"
        ))),
    }
}

/// New opaque remote id.
pub(crate) fn generate_remote_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
