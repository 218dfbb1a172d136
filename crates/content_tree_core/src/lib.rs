//! Content tree persistence core.
//! Stores the location tree content items are placed in and keeps paths,
//! visibility and main locations consistent across every mutation.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;
pub mod tree;

pub use config::{ConfigError, CoreConfig, DatabaseConfig, JournalMode, LoggingConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::content::{
    ContentInfo, ContentStatus, FieldData, NewContent, Section, VersionData, VersionInfo,
    VersionStatus,
};
pub use model::location::{
    ContentId, CreateStruct, Location, LocationId, SectionId, SortField, SortOrder, UpdateStruct,
    ROOT_LOCATION_ID,
};
pub use query::criterion::{
    Criterion, CriterionError, CriterionValue, LanguageCode, Operator, Scalar, Specification,
    ValueFormat, ValueType,
};
pub use repo::content_repo::{
    ContentBridge, ContentRepoError, ContentRepoResult, ContentRepository,
    SqliteContentBridge, SqliteContentRepository,
};
pub use repo::location_repo::{
    ErrorKind, LocationRepoError, LocationRepoResult, LocationRepository,
    SqliteLocationRepository, SubtreeRemoval,
};
pub use service::location_service::{LocationService, TreeEntry};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
