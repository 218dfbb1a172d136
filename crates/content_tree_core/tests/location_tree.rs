use content_tree_core::db::{open_db_in_memory, open_with_config};
use content_tree_core::{
    ContentBridge, ContentId, ContentRepoError, ContentRepoResult, ContentRepository,
    CreateStruct, DatabaseConfig, ErrorKind, Location, LocationId, LocationRepoError,
    LocationRepository, LocationService, NewContent, SectionId, SqliteContentBridge,
    SqliteContentRepository, SqliteLocationRepository, UpdateStruct, VersionData,
    VersionStatus, ROOT_LOCATION_ID,
};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap, HashSet};

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn publish_in_section(conn: &Connection, name: &str, section_id: SectionId) -> ContentId {
    let repo = SqliteContentRepository::try_new(conn).unwrap();
    let content = repo
        .create_content(
            &NewContent::new(name, section_id, "eng-GB").with_field("title", "eng-GB", name),
        )
        .unwrap();
    repo.publish_version(content.id, 1).unwrap();
    content.id
}

fn publish(conn: &Connection, name: &str) -> ContentId {
    publish_in_section(conn, name, 1)
}

fn place(conn: &Connection, parent_id: LocationId, content_id: ContentId) -> Location {
    SqliteLocationRepository::try_new(conn)
        .unwrap()
        .create(&CreateStruct::new(parent_id, content_id))
        .unwrap()
}

fn place_new(conn: &Connection, parent_id: LocationId, name: &str) -> Location {
    let content_id = publish(conn, name);
    place(conn, parent_id, content_id)
}

fn load(conn: &Connection, location_id: LocationId) -> Location {
    SqliteLocationRepository::try_new(conn)
        .unwrap()
        .load(location_id)
        .unwrap()
}

fn all_locations(conn: &Connection) -> Vec<Location> {
    let repo = SqliteLocationRepository::try_new(conn).unwrap();
    repo.load_subtree_ids(ROOT_LOCATION_ID)
        .unwrap()
        .keys()
        .map(|id| repo.load(*id).unwrap())
        .collect()
}

fn content_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM content;", [], |row| row.get(0))
        .unwrap()
}

fn section_of(conn: &Connection, content_id: ContentId) -> SectionId {
    SqliteContentRepository::try_new(conn)
        .unwrap()
        .load_content_info(content_id)
        .unwrap()
        .section_id
}

/// Checks path, depth, visibility and main-location invariants over the whole tree.
fn assert_tree_consistent(conn: &Connection) {
    let all = all_locations(conn);
    let by_id: HashMap<LocationId, &Location> = all.iter().map(|l| (l.id, l)).collect();
    let mut mains: HashMap<ContentId, usize> = HashMap::new();

    for location in &all {
        match location.parent_id {
            None => {
                assert_eq!(location.path_string, format!("/{}/", location.id));
                assert_eq!(location.depth, 0);
                assert_eq!(location.is_invisible, location.is_hidden);
            }
            Some(parent_id) => {
                let parent = by_id[&parent_id];
                assert_eq!(
                    location.path_string,
                    format!("{}{}/", parent.path_string, location.id)
                );
                assert_eq!(location.depth, parent.depth + 1);
                assert_eq!(
                    location.is_invisible,
                    location.is_hidden || parent.is_invisible,
                    "visibility of {}",
                    location.id
                );
            }
        }
        let counter = mains.entry(location.content_id).or_insert(0);
        if location.is_main {
            *counter += 1;
        }
    }
    for (content_id, count) in mains {
        assert_eq!(count, 1, "content {content_id} must have exactly one main location");
    }
}

struct FailingDeleteBridge;

impl ContentBridge for FailingDeleteBridge {
    fn delete_content(&self, _conn: &Connection, _content_id: ContentId) -> ContentRepoResult<()> {
        Err(ContentRepoError::InvalidData("content store offline".to_string()))
    }

    fn current_published_version(
        &self,
        conn: &Connection,
        content_id: ContentId,
    ) -> ContentRepoResult<VersionData> {
        SqliteContentBridge.current_published_version(conn, content_id)
    }

    fn create_content_from_version(
        &self,
        conn: &Connection,
        version: &VersionData,
    ) -> ContentRepoResult<ContentId> {
        SqliteContentBridge.create_content_from_version(conn, version)
    }

    fn set_section(
        &self,
        conn: &Connection,
        content_id: ContentId,
        section_id: SectionId,
    ) -> ContentRepoResult<()> {
        SqliteContentBridge.set_section(conn, content_id, section_id)
    }
}

#[test]
fn seeded_root_is_main_location_of_root_content() {
    let conn = setup();
    let root = load(&conn, ROOT_LOCATION_ID);

    assert_eq!(root.path_string, "/1/");
    assert_eq!(root.parent_id, None);
    assert_eq!(root.depth, 0);
    assert!(root.is_main);
    assert!(root.is_visible());
}

#[test]
fn create_derives_path_from_parent_and_marks_first_location_main() {
    let conn = setup();
    let folder = place_new(&conn, ROOT_LOCATION_ID, "folder");
    let article = place_new(&conn, folder.id, "article");

    assert_eq!(folder.path_string, format!("/1/{}/", folder.id));
    assert_eq!(
        article.path_string,
        format!("/1/{}/{}/", folder.id, article.id)
    );
    assert_eq!(article.depth, 2);
    assert_eq!(article.parent_id, Some(folder.id));
    assert!(article.is_main);
    assert_eq!(article.remote_id.len(), 32);

    let second = place(&conn, ROOT_LOCATION_ID, article.content_id);
    assert!(!second.is_main);
    assert_tree_consistent(&conn);
}

#[test]
fn create_rejects_duplicate_placement_and_taken_remote_id() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let content_id = publish(&conn, "page");
    let first = repo
        .create(&CreateStruct {
            remote_id: Some("landing".to_string()),
            ..CreateStruct::new(ROOT_LOCATION_ID, content_id)
        })
        .unwrap();
    assert_eq!(first.remote_id, "landing");

    let duplicate = repo
        .create(&CreateStruct::new(ROOT_LOCATION_ID, content_id))
        .unwrap_err();
    assert!(matches!(duplicate, LocationRepoError::DuplicatePlacement { .. }));
    assert_eq!(duplicate.kind(), ErrorKind::Conflict);

    let other = publish(&conn, "other");
    let taken = repo
        .create(&CreateStruct {
            remote_id: Some(" landing ".to_string()),
            ..CreateStruct::new(ROOT_LOCATION_ID, other)
        })
        .unwrap_err();
    assert!(matches!(taken, LocationRepoError::RemoteIdConflict(ref id) if id == "landing"));

    let blank = repo
        .create(&CreateStruct {
            remote_id: Some("   ".to_string()),
            ..CreateStruct::new(ROOT_LOCATION_ID, other)
        })
        .unwrap_err();
    assert_eq!(blank.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn create_reports_missing_parent_and_content() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let content_id = publish(&conn, "page");

    let missing_parent = repo.create(&CreateStruct::new(999, content_id)).unwrap_err();
    assert!(matches!(missing_parent, LocationRepoError::LocationNotFound(999)));
    assert_eq!(missing_parent.kind(), ErrorKind::NotFound);

    let missing_content = repo
        .create(&CreateStruct::new(ROOT_LOCATION_ID, 999))
        .unwrap_err();
    assert!(matches!(missing_content, LocationRepoError::ContentNotFound(999)));
}

#[test]
fn hide_then_unhide_restores_never_hidden_descendants() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let parent = place_new(&conn, ROOT_LOCATION_ID, "parent");
    let child = place_new(&conn, parent.id, "child");

    repo.hide(parent.id).unwrap();
    let hidden_parent = repo.load(parent.id).unwrap();
    let hidden_child = repo.load(child.id).unwrap();
    assert!(hidden_parent.is_hidden && hidden_parent.is_invisible);
    assert!(!hidden_child.is_hidden && hidden_child.is_invisible);

    repo.un_hide(parent.id).unwrap();
    assert!(repo.load(parent.id).unwrap().is_visible());
    assert!(repo.load(child.id).unwrap().is_visible());
    assert_tree_consistent(&conn);
}

#[test]
fn unhide_keeps_independently_hidden_branch_invisible() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let top = place_new(&conn, ROOT_LOCATION_ID, "top");
    let hidden_branch = place_new(&conn, top.id, "hidden-branch");
    let below_hidden = place_new(&conn, hidden_branch.id, "below-hidden");
    let open_branch = place_new(&conn, top.id, "open-branch");

    repo.hide(hidden_branch.id).unwrap();
    repo.hide(top.id).unwrap();
    repo.un_hide(top.id).unwrap();

    assert!(repo.load(top.id).unwrap().is_visible());
    assert!(repo.load(open_branch.id).unwrap().is_visible());
    assert!(repo.load(hidden_branch.id).unwrap().is_invisible);
    assert!(repo.load(below_hidden.id).unwrap().is_invisible);
    assert_tree_consistent(&conn);
}

#[test]
fn unhide_under_hidden_ancestor_stays_invisible() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let top = place_new(&conn, ROOT_LOCATION_ID, "top");
    let middle = place_new(&conn, top.id, "middle");

    repo.hide(middle.id).unwrap();
    repo.hide(top.id).unwrap();
    repo.un_hide(middle.id).unwrap();

    let middle = repo.load(middle.id).unwrap();
    assert!(!middle.is_hidden);
    assert!(middle.is_invisible);
    assert_tree_consistent(&conn);
}

#[test]
fn create_under_invisible_parent_starts_invisible() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let top = place_new(&conn, ROOT_LOCATION_ID, "top");
    repo.hide(top.id).unwrap();

    let child = place_new(&conn, top.id, "child");
    assert!(!child.is_hidden);
    assert!(child.is_invisible);
}

#[test]
fn subtree_ids_match_whole_path_segments_only() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let siblings: Vec<Location> = (0..25)
        .map(|index| place_new(&conn, ROOT_LOCATION_ID, &format!("sibling-{index}")))
        .collect();
    let first = &siblings[0];
    let lookalike = siblings
        .iter()
        .find(|sibling| {
            sibling.id != first.id && sibling.id.to_string().starts_with(&first.id.to_string())
        })
        .unwrap();

    let inside = place_new(&conn, first.id, "inside");
    place_new(&conn, lookalike.id, "outside");

    let ids = repo.load_subtree_ids(first.id).unwrap();
    let expected: BTreeMap<LocationId, ContentId> = [
        (first.id, first.content_id),
        (inside.id, inside.content_id),
    ]
    .into_iter()
    .collect();
    assert_eq!(ids, expected);

    let missing = repo.load_subtree_ids(999).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn move_rewrites_paths_depths_and_stamps_both_ancestries() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let old_parent = place_new(&conn, ROOT_LOCATION_ID, "old-parent");
    let moved = place_new(&conn, old_parent.id, "moved");
    let leaf = place_new(&conn, moved.id, "leaf");
    let new_parent = place_new(&conn, ROOT_LOCATION_ID, "new-parent");
    repo.mark_subtree_modified(old_parent.id, Some(5)).unwrap();
    repo.mark_subtree_modified(new_parent.id, Some(5)).unwrap();

    repo.move_subtree(moved.id, new_parent.id).unwrap();

    let moved = repo.load(moved.id).unwrap();
    let leaf = repo.load(leaf.id).unwrap();
    assert_eq!(moved.parent_id, Some(new_parent.id));
    assert_eq!(
        moved.path_string,
        format!("/1/{}/{}/", new_parent.id, moved.id)
    );
    assert_eq!(
        leaf.path_string,
        format!("/1/{}/{}/{}/", new_parent.id, moved.id, leaf.id)
    );
    assert_eq!(leaf.depth, 3);
    assert!(repo.load(old_parent.id).unwrap().modified_subnode_at > 5);
    assert!(repo.load(new_parent.id).unwrap().modified_subnode_at > 5);

    let ids = repo.load_subtree_ids(old_parent.id).unwrap();
    assert_eq!(ids.len(), 1);
    assert_tree_consistent(&conn);
}

#[test]
fn move_into_own_subtree_is_rejected_and_tree_is_unchanged() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let top = place_new(&conn, ROOT_LOCATION_ID, "top");
    let middle = place_new(&conn, top.id, "middle");
    let bottom = place_new(&conn, middle.id, "bottom");
    let before = all_locations(&conn);

    for destination in [bottom.id, top.id] {
        let err = repo.move_subtree(top.id, destination).unwrap_err();
        assert!(matches!(err, LocationRepoError::CycleDetected { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidRelationship);
    }
    let root = repo.move_subtree(ROOT_LOCATION_ID, top.id).unwrap_err();
    assert!(matches!(root, LocationRepoError::RootLocationImmutable(1)));

    assert_eq!(all_locations(&conn), before);
}

#[test]
fn move_under_hidden_parent_hides_subtree_until_moved_back() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let archive = place_new(&conn, ROOT_LOCATION_ID, "archive");
    let news = place_new(&conn, ROOT_LOCATION_ID, "news");
    let story = place_new(&conn, news.id, "story");
    repo.hide(archive.id).unwrap();

    repo.move_subtree(news.id, archive.id).unwrap();
    assert!(repo.load(news.id).unwrap().is_invisible);
    assert!(repo.load(story.id).unwrap().is_invisible);
    assert_tree_consistent(&conn);

    repo.move_subtree(news.id, ROOT_LOCATION_ID).unwrap();
    assert!(repo.load(news.id).unwrap().is_visible());
    assert!(repo.load(story.id).unwrap().is_visible());
    assert_tree_consistent(&conn);
}

#[test]
fn move_next_to_same_content_is_a_conflict() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let left = place_new(&conn, ROOT_LOCATION_ID, "left");
    let right = place_new(&conn, ROOT_LOCATION_ID, "right");
    let shared = publish(&conn, "shared");
    let in_left = place(&conn, left.id, shared);
    place(&conn, right.id, shared);

    let err = repo.move_subtree(in_left.id, right.id).unwrap_err();
    assert!(matches!(err, LocationRepoError::DuplicatePlacement { .. }));
    assert_eq!(repo.load(in_left.id).unwrap().parent_id, Some(left.id));
}

#[test]
fn copy_subtree_clones_shape_and_published_content() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let content_repo = SqliteContentRepository::try_new(&conn).unwrap();
    let source = place_new(&conn, ROOT_LOCATION_ID, "source");
    let shared = place_new(&conn, source.id, "shared");
    let hidden = place_new(&conn, source.id, "hidden");
    let shared_again = place(&conn, hidden.id, shared.content_id);
    repo.hide(hidden.id).unwrap();
    let destination = place_new(&conn, ROOT_LOCATION_ID, "destination");

    let source_ids = repo.load_subtree_ids(source.id).unwrap();
    let source_rows: Vec<Location> = source_ids.keys().map(|id| repo.load(*id).unwrap()).collect();

    let copy = repo.copy_subtree(source.id, destination.id).unwrap();
    assert_eq!(copy.parent_id, Some(destination.id));
    assert_eq!(copy.depth, source.depth + 1);
    assert!(copy.is_main);
    assert_ne!(copy.content_id, source.content_id);
    assert_ne!(copy.remote_id, source.remote_id);

    let copied_ids = repo.load_subtree_ids(copy.id).unwrap();
    assert_eq!(copied_ids.len(), source_ids.len());
    let copied_rows: Vec<Location> = copied_ids.keys().map(|id| repo.load(*id).unwrap()).collect();
    let mut relative_depths: Vec<u32> = copied_rows.iter().map(|l| l.depth - copy.depth).collect();
    let mut source_depths: Vec<u32> = source_rows.iter().map(|l| l.depth - source.depth).collect();
    relative_depths.sort_unstable();
    source_depths.sort_unstable();
    assert_eq!(relative_depths, source_depths);

    // Content placed twice in the source is cloned once.
    let copied_content: HashSet<ContentId> = copied_ids.values().copied().collect();
    assert_eq!(copied_content.len(), 3);
    for content_id in &copied_content {
        assert!(!source_ids.values().any(|source_content| source_content == content_id));
        let versions = content_repo.list_versions(*content_id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].status, VersionStatus::Published);
    }

    let copied_hidden = copied_rows
        .iter()
        .find(|l| l.is_hidden)
        .unwrap();
    let below_copied_hidden = copied_rows
        .iter()
        .find(|l| l.parent_id == Some(copied_hidden.id))
        .unwrap();
    assert!(copied_hidden.is_invisible);
    assert!(below_copied_hidden.is_invisible);
    assert!(!below_copied_hidden.is_main);

    let source_version = SqliteContentBridge
        .current_published_version(&conn, shared.content_id)
        .unwrap();
    let cloned_version = SqliteContentBridge
        .current_published_version(&conn, below_copied_hidden.content_id)
        .unwrap();
    assert_eq!(cloned_version.fields, source_version.fields);

    let after: Vec<Location> = source_ids.keys().map(|id| repo.load(*id).unwrap()).collect();
    assert_eq!(after, source_rows);
    assert_eq!(repo.load(shared_again.id).unwrap().content_id, shared.content_id);
    assert_tree_consistent(&conn);
}

#[test]
fn copy_rejects_own_subtree_and_unpublished_content() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let source = place_new(&conn, ROOT_LOCATION_ID, "source");
    let inner = place_new(&conn, source.id, "inner");

    let cycle = repo.copy_subtree(source.id, inner.id).unwrap_err();
    assert!(matches!(cycle, LocationRepoError::CycleDetected { .. }));

    let draft = SqliteContentRepository::try_new(&conn)
        .unwrap()
        .create_content(&NewContent::new("draft", 1, "eng-GB"))
        .unwrap();
    place(&conn, inner.id, draft.id);
    let destination = place_new(&conn, ROOT_LOCATION_ID, "destination");
    let before_locations = all_locations(&conn);
    let before_content = content_count(&conn);

    let err = repo.copy_subtree(source.id, destination.id).unwrap_err();
    assert!(matches!(err, LocationRepoError::PublishedVersionNotFound(id) if id == draft.id));
    assert_eq!(all_locations(&conn), before_locations);
    assert_eq!(content_count(&conn), before_content);
}

#[test]
fn remove_subtree_deletes_orphaned_content_and_promotes_main() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let content_repo = SqliteContentRepository::try_new(&conn).unwrap();
    let doomed = place_new(&conn, ROOT_LOCATION_ID, "doomed");
    let only_here = place_new(&conn, doomed.id, "only-here");
    let elsewhere = place_new(&conn, ROOT_LOCATION_ID, "elsewhere");
    let shared = publish(&conn, "shared");
    let shared_main = place(&conn, doomed.id, shared);
    let shared_other = place(&conn, elsewhere.id, shared);
    assert!(shared_main.is_main);

    let removal = repo.remove_subtree(doomed.id).unwrap();

    assert_eq!(removal.removed_locations, 3);
    assert_eq!(removal.promoted_main_locations, vec![shared_other.id]);
    let deleted: HashSet<ContentId> = removal.deleted_content.iter().copied().collect();
    assert_eq!(
        deleted,
        [doomed.content_id, only_here.content_id]
            .into_iter()
            .collect::<HashSet<_>>()
    );
    assert!(matches!(
        content_repo.load_content_info(only_here.content_id),
        Err(ContentRepoError::ContentNotFound(_))
    ));
    assert!(content_repo.load_content_info(shared).is_ok());
    assert!(repo.load(shared_other.id).unwrap().is_main);
    assert!(matches!(
        repo.load(only_here.id),
        Err(LocationRepoError::LocationNotFound(_))
    ));
    assert_tree_consistent(&conn);
}

#[test]
fn remove_subtree_rejects_root() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let err = repo.remove_subtree(ROOT_LOCATION_ID).unwrap_err();
    assert!(matches!(err, LocationRepoError::RootLocationImmutable(1)));
}

#[test]
fn failing_content_bridge_rolls_back_whole_removal() {
    let conn = setup();
    let doomed = place_new(&conn, ROOT_LOCATION_ID, "doomed");
    place_new(&conn, doomed.id, "child");
    let before_locations = all_locations(&conn);
    let before_content = content_count(&conn);

    let repo = SqliteLocationRepository::with_bridge(&conn, FailingDeleteBridge).unwrap();
    let err = repo.remove_subtree(doomed.id).unwrap_err();

    assert!(matches!(err, LocationRepoError::Bridge(_)));
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(all_locations(&conn), before_locations);
    assert_eq!(content_count(&conn), before_content);
}

#[test]
fn failure_after_path_rewrite_rolls_back_move() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let source = place_new(&conn, ROOT_LOCATION_ID, "source");
    place_new(&conn, source.id, "child");
    let destination = place_new(&conn, ROOT_LOCATION_ID, "destination");
    conn.execute_batch(
        "CREATE TRIGGER fail_reparent
         BEFORE UPDATE OF parent_id ON locations
         BEGIN
             SELECT RAISE(ABORT, 'injected failure');
         END;",
    )
    .unwrap();
    let before = all_locations(&conn);

    let err = repo.move_subtree(source.id, destination.id).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(all_locations(&conn), before);
}

#[test]
fn swap_exchanges_content_and_main_flags() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let first_parent = place_new(&conn, ROOT_LOCATION_ID, "first-parent");
    let second_parent = place_new(&conn, ROOT_LOCATION_ID, "second-parent");
    let shared = publish(&conn, "shared");
    let shared_main = place(&conn, ROOT_LOCATION_ID, shared);
    let shared_secondary = place(&conn, first_parent.id, shared);
    let single = place_new(&conn, second_parent.id, "single");

    repo.swap(shared_secondary.id, single.id).unwrap();

    let swapped_first = repo.load(shared_secondary.id).unwrap();
    let swapped_second = repo.load(single.id).unwrap();
    assert_eq!(swapped_first.content_id, single.content_id);
    assert!(swapped_first.is_main);
    assert_eq!(swapped_second.content_id, shared);
    assert!(!swapped_second.is_main);
    assert!(repo.load(shared_main.id).unwrap().is_main);
    assert_eq!(swapped_first.path_string, shared_secondary.path_string);
    assert_tree_consistent(&conn);
}

#[test]
fn swap_rejects_same_location_root_and_duplicate_result() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let folder = place_new(&conn, ROOT_LOCATION_ID, "folder");
    let other_folder = place_new(&conn, ROOT_LOCATION_ID, "other-folder");
    let x = publish(&conn, "x");
    let x_in_folder = place(&conn, folder.id, x);
    let y_in_folder = place_new(&conn, folder.id, "y");
    let x_elsewhere = place(&conn, other_folder.id, x);

    let same = repo.swap(folder.id, folder.id).unwrap_err();
    assert!(matches!(same, LocationRepoError::SameLocation(_)));
    let root = repo.swap(ROOT_LOCATION_ID, folder.id).unwrap_err();
    assert!(matches!(root, LocationRepoError::RootLocationImmutable(1)));

    let duplicate = repo.swap(y_in_folder.id, x_elsewhere.id).unwrap_err();
    assert!(matches!(duplicate, LocationRepoError::DuplicatePlacement { .. }));

    // Siblings may trade content.
    repo.swap(x_in_folder.id, y_in_folder.id).unwrap();
    assert_eq!(repo.load(x_in_folder.id).unwrap().content_id, y_in_folder.content_id);
    assert_tree_consistent(&conn);
}

#[test]
fn change_main_location_moves_flag_and_applies_parent_section() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let media = SqliteContentRepository::try_new(&conn)
        .unwrap()
        .create_section("media", "Media")
        .unwrap();
    let media_content = publish_in_section(&conn, "media-root", media.id);
    let media_root = place(&conn, ROOT_LOCATION_ID, media_content);
    let image = publish(&conn, "image");
    let standard_location = place(&conn, ROOT_LOCATION_ID, image);
    let media_location = place(&conn, media_root.id, image);
    let thumbnail = place_new(&conn, media_location.id, "thumbnail");

    repo.change_main_location(image, media_location.id).unwrap();

    assert!(repo.load(media_location.id).unwrap().is_main);
    assert!(!repo.load(standard_location.id).unwrap().is_main);
    assert_eq!(section_of(&conn, image), media.id);
    assert_eq!(section_of(&conn, thumbnail.content_id), media.id);
    assert_tree_consistent(&conn);

    let foreign = repo
        .change_main_location(thumbnail.content_id, media_location.id)
        .unwrap_err();
    assert!(matches!(foreign, LocationRepoError::LocationNotOwnedByContent { .. }));
    assert_eq!(foreign.kind(), ErrorKind::InvalidRelationship);

    let missing = repo.change_main_location(999, media_location.id).unwrap_err();
    assert!(matches!(missing, LocationRepoError::ContentNotFound(999)));
}

#[test]
fn set_section_for_subtree_only_touches_main_locations() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let restricted = SqliteContentRepository::try_new(&conn)
        .unwrap()
        .create_section("restricted", "Restricted")
        .unwrap();
    let top = place_new(&conn, ROOT_LOCATION_ID, "top");
    let child = place_new(&conn, top.id, "child");
    let outsider = place_new(&conn, ROOT_LOCATION_ID, "outsider");
    place(&conn, top.id, outsider.content_id);

    let updated = repo.set_section_for_subtree(top.id, restricted.id).unwrap();

    assert_eq!(updated, 2);
    assert_eq!(section_of(&conn, top.content_id), restricted.id);
    assert_eq!(section_of(&conn, child.content_id), restricted.id);
    assert_eq!(section_of(&conn, outsider.content_id), 1);

    let missing = repo.set_section_for_subtree(top.id, 999).unwrap_err();
    assert!(matches!(missing, LocationRepoError::SectionNotFound(999)));
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn mark_subtree_modified_stamps_ancestors_only() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let parent = place_new(&conn, ROOT_LOCATION_ID, "parent");
    let child = place_new(&conn, parent.id, "child");
    let sibling = place_new(&conn, ROOT_LOCATION_ID, "sibling");
    repo.mark_subtree_modified(sibling.id, Some(1)).unwrap();

    repo.mark_subtree_modified(child.id, Some(1_234)).unwrap();

    assert_eq!(repo.load(child.id).unwrap().modified_subnode_at, 1_234);
    assert_eq!(repo.load(parent.id).unwrap().modified_subnode_at, 1_234);
    assert_eq!(repo.load(ROOT_LOCATION_ID).unwrap().modified_subnode_at, 1_234);
    assert_eq!(repo.load(sibling.id).unwrap().modified_subnode_at, 1);

    repo.mark_subtree_modified(child.id, None).unwrap();
    assert!(repo.load(child.id).unwrap().modified_subnode_at > 1_234);

    let negative = repo.mark_subtree_modified(child.id, Some(-1)).unwrap_err();
    assert_eq!(negative.kind(), ErrorKind::InvalidArgument);
    let missing = repo.mark_subtree_modified(999, None).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn load_by_remote_id_and_by_content_with_subtree_filter() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let left = place_new(&conn, ROOT_LOCATION_ID, "left");
    let right = place_new(&conn, ROOT_LOCATION_ID, "right");
    let shared = publish(&conn, "shared");
    let in_left = place(&conn, left.id, shared);
    let in_right = place(&conn, right.id, shared);

    assert_eq!(repo.load_by_remote_id(&in_left.remote_id).unwrap(), in_left);
    let missing = repo.load_by_remote_id("nope").unwrap_err();
    assert!(matches!(missing, LocationRepoError::RemoteIdNotFound(_)));

    let everywhere = repo.load_locations_by_content(shared, None).unwrap();
    assert_eq!(
        everywhere.iter().map(|l| l.id).collect::<Vec<_>>(),
        vec![in_left.id, in_right.id]
    );
    let under_right = repo.load_locations_by_content(shared, Some(right.id)).unwrap();
    assert_eq!(under_right, vec![in_right]);
}

#[test]
fn draft_parent_locations_come_from_node_assignments() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let content_repo = SqliteContentRepository::try_new(&conn).unwrap();
    let first = place_new(&conn, ROOT_LOCATION_ID, "first");
    let second = place_new(&conn, ROOT_LOCATION_ID, "second");
    let draft = content_repo
        .create_content(&NewContent::new("draft", 1, "eng-GB"))
        .unwrap();
    content_repo.add_draft_placement(draft.id, second.id).unwrap();
    content_repo.add_draft_placement(draft.id, first.id).unwrap();

    let parents = repo.load_parent_locations_for_draft_content(draft.id).unwrap();
    assert_eq!(
        parents.iter().map(|l| l.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );

    content_repo.publish_version(draft.id, 1).unwrap();
    assert!(repo
        .load_parent_locations_for_draft_content(draft.id)
        .unwrap()
        .is_empty());
}

#[test]
fn update_changes_ordering_and_children_follow_priority() {
    let conn = setup();
    let repo = SqliteLocationRepository::try_new(&conn).unwrap();
    let folder = place_new(&conn, ROOT_LOCATION_ID, "folder");
    let first = place_new(&conn, folder.id, "first");
    let second = place_new(&conn, folder.id, "second");
    let third = place_new(&conn, folder.id, "third");

    let updated = repo
        .update(
            &UpdateStruct {
                priority: Some(-5),
                remote_id: Some("pinned".to_string()),
                ..UpdateStruct::default()
            },
            third.id,
        )
        .unwrap();
    assert_eq!(updated.priority, -5);
    assert_eq!(updated.remote_id, "pinned");
    assert_eq!(updated.path_string, third.path_string);

    let children = repo.load_children(folder.id).unwrap();
    assert_eq!(
        children.iter().map(|l| l.id).collect::<Vec<_>>(),
        vec![third.id, first.id, second.id]
    );

    let conflict = repo
        .update(
            &UpdateStruct {
                remote_id: Some("pinned".to_string()),
                ..UpdateStruct::default()
            },
            first.id,
        )
        .unwrap_err();
    assert_eq!(conflict.kind(), ErrorKind::Conflict);
    assert!(repo.update(&UpdateStruct::default(), 999).is_err());
}

#[test]
fn service_walks_tree_depth_first() {
    let conn = setup();
    let top = place_new(&conn, ROOT_LOCATION_ID, "top");
    let nested = place_new(&conn, top.id, "nested");
    let next = place_new(&conn, ROOT_LOCATION_ID, "next");
    let service = LocationService::new(SqliteLocationRepository::try_new(&conn).unwrap());

    let walk: Vec<(u32, LocationId)> = service
        .walk_subtree(ROOT_LOCATION_ID)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.level, entry.location.id))
        .collect();
    assert_eq!(
        walk,
        vec![(0, ROOT_LOCATION_ID), (1, top.id), (2, nested.id), (1, next.id)]
    );

    service.hide(top.id).unwrap();
    assert!(service.load(nested.id).unwrap().is_invisible);
}

#[test]
fn blocked_writer_reports_concurrent_write_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: Some(dir.path().join("tree.db")),
        busy_timeout_ms: 50,
        ..DatabaseConfig::default()
    };
    let holder = open_with_config(&config).unwrap();
    let contender = open_with_config(&config).unwrap();
    let target = place_new(&holder, ROOT_LOCATION_ID, "target");

    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let repo = SqliteLocationRepository::try_new(&contender).unwrap();
    let err = repo.hide(target.id).unwrap_err();
    assert!(matches!(err, LocationRepoError::ConcurrentWrite(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    holder.execute_batch("ROLLBACK;").unwrap();

    repo.hide(target.id).unwrap();
    assert!(repo.load(target.id).unwrap().is_hidden);
}
