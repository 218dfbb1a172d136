use content_tree_core::db::open_db_in_memory;
use content_tree_core::{
    ContentBridge, ContentRepoError, ContentRepository, ContentStatus, NewContent,
    SqliteContentBridge, SqliteContentRepository, VersionStatus,
};
use rusqlite::Connection;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn create_content_starts_as_draft_version_one() {
    let conn = setup();
    let repo = SqliteContentRepository::try_new(&conn).unwrap();

    let content = repo
        .create_content(
            &NewContent::new("  About us ", 1, "eng-GB").with_field("title", "eng-GB", "About"),
        )
        .unwrap();

    assert_eq!(content.name, "About us");
    assert_eq!(content.status, ContentStatus::Draft);
    assert_eq!(content.current_version_no, 1);
    assert!(content.always_available);
    let versions = repo.list_versions(content.id).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].status, VersionStatus::Draft);
}

#[test]
fn create_content_validates_input() {
    let conn = setup();
    let repo = SqliteContentRepository::try_new(&conn).unwrap();

    let blank = repo.create_content(&NewContent::new(" ", 1, "eng-GB")).unwrap_err();
    assert!(matches!(blank, ContentRepoError::InvalidArgument { field: "name", .. }));

    let language = repo.create_content(&NewContent::new("x", 1, "en")).unwrap_err();
    assert!(matches!(
        language,
        ContentRepoError::InvalidArgument {
            field: "main_language_code",
            ..
        }
    ));

    let section = repo.create_content(&NewContent::new("x", 42, "eng-GB")).unwrap_err();
    assert!(matches!(section, ContentRepoError::SectionNotFound(42)));

    let mut with_remote = NewContent::new("x", 1, "eng-GB");
    with_remote.remote_id = Some("content-tree-root".to_string());
    let taken = repo.create_content(&with_remote).unwrap_err();
    assert!(matches!(taken, ContentRepoError::RemoteIdConflict(_)));
}

#[test]
fn publishing_new_version_archives_previous_one() {
    let conn = setup();
    let repo = SqliteContentRepository::try_new(&conn).unwrap();
    let content = repo
        .create_content(&NewContent::new("page", 1, "eng-GB").with_field("body", "eng-GB", "v1"))
        .unwrap();
    let published = repo.publish_version(content.id, 1).unwrap();
    assert_eq!(published.status, ContentStatus::Published);

    let draft = repo.create_draft_from_published(content.id).unwrap();
    assert_eq!(draft.version_no, 2);
    let published = repo.publish_version(content.id, 2).unwrap();
    assert_eq!(published.current_version_no, 2);

    let statuses: Vec<VersionStatus> = repo
        .list_versions(content.id)
        .unwrap()
        .into_iter()
        .map(|version| version.status)
        .collect();
    assert_eq!(statuses, vec![VersionStatus::Archived, VersionStatus::Published]);

    let again = repo.publish_version(content.id, 2).unwrap_err();
    assert!(matches!(again, ContentRepoError::VersionNotDraft { .. }));
    let missing = repo.publish_version(content.id, 9).unwrap_err();
    assert!(matches!(missing, ContentRepoError::VersionNotFound { .. }));
}

#[test]
fn draft_from_unpublished_content_is_rejected() {
    let conn = setup();
    let repo = SqliteContentRepository::try_new(&conn).unwrap();
    let content = repo.create_content(&NewContent::new("page", 1, "eng-GB")).unwrap();

    let err = repo.create_draft_from_published(content.id).unwrap_err();
    assert!(matches!(err, ContentRepoError::PublishedVersionNotFound(_)));
}

#[test]
fn sections_have_unique_identifiers() {
    let conn = setup();
    let repo = SqliteContentRepository::try_new(&conn).unwrap();

    let media = repo.create_section("media", "Media").unwrap();
    assert_eq!(repo.load_section(media.id).unwrap(), media);
    assert_eq!(repo.load_section(1).unwrap().identifier, "standard");

    let duplicate = repo.create_section("media", "Other").unwrap_err();
    assert!(matches!(duplicate, ContentRepoError::SectionIdentifierConflict(_)));
    assert!(matches!(
        repo.load_section(99),
        Err(ContentRepoError::SectionNotFound(99))
    ));
}

#[test]
fn bridge_clones_published_version_into_new_content() {
    let conn = setup();
    let repo = SqliteContentRepository::try_new(&conn).unwrap();
    let content = repo
        .create_content(
            &NewContent::new("page", 1, "eng-GB")
                .with_field("title", "eng-GB", "Hello")
                .with_field("title", "ger-DE", "Hallo"),
        )
        .unwrap();
    repo.publish_version(content.id, 1).unwrap();

    let version = SqliteContentBridge
        .current_published_version(&conn, content.id)
        .unwrap();
    let clone_id = SqliteContentBridge
        .create_content_from_version(&conn, &version)
        .unwrap();

    let clone = repo.load_content_info(clone_id).unwrap();
    assert_eq!(clone.name, "page");
    assert_eq!(clone.status, ContentStatus::Published);
    assert_ne!(clone.remote_id, content.remote_id);
    let cloned_version = SqliteContentBridge
        .current_published_version(&conn, clone_id)
        .unwrap();
    assert_eq!(cloned_version.version.version_no, 1);
    assert_eq!(cloned_version.fields, version.fields);

    SqliteContentBridge.delete_content(&conn, clone_id).unwrap();
    assert!(matches!(
        repo.load_content_info(clone_id),
        Err(ContentRepoError::ContentNotFound(_))
    ));
}

#[test]
fn draft_placement_requires_existing_parent() {
    let conn = setup();
    let repo = SqliteContentRepository::try_new(&conn).unwrap();
    let content = repo.create_content(&NewContent::new("page", 1, "eng-GB")).unwrap();

    repo.add_draft_placement(content.id, 1).unwrap();
    repo.add_draft_placement(content.id, 1).unwrap();
    let err = repo.add_draft_placement(content.id, 77).unwrap_err();
    assert!(matches!(err, ContentRepoError::LocationNotFound(77)));
}
