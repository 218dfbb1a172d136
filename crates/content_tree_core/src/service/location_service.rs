//! Location tree use-case service.
//!
//! # Responsibility
//! - Provide stable entry points for tree mutations and reads.
//! - Log every mutation once with outcome, duration and error kind.
//!
//! # Invariants
//! - Service APIs never bypass repository validation or transactions.
//! - Log lines carry ids and counts only, never content field values.

use crate::logging::sanitize_message;
use crate::model::location::{
    ContentId, CreateStruct, Location, LocationId, SectionId, UpdateStruct,
};
use crate::repo::location_repo::{LocationRepoResult, LocationRepository, SubtreeRemoval};
use log::{info, warn};
use std::collections::BTreeMap;
use std::time::Instant;

const MAX_LOGGED_ERROR_CHARS: usize = 200;

/// One location of a subtree walk with its depth below the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub level: u32,
    pub location: Location,
}

/// Location tree service facade.
pub struct LocationService<R: LocationRepository> {
    repo: R,
}

impl<R: LocationRepository> LocationService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn load(&self, location_id: LocationId) -> LocationRepoResult<Location> {
        self.repo.load(location_id)
    }

    pub fn load_by_remote_id(&self, remote_id: &str) -> LocationRepoResult<Location> {
        self.repo.load_by_remote_id(remote_id.trim())
    }

    pub fn load_subtree_ids(
        &self,
        location_id: LocationId,
    ) -> LocationRepoResult<BTreeMap<LocationId, ContentId>> {
        self.repo.load_subtree_ids(location_id)
    }

    pub fn load_locations_by_content(
        &self,
        content_id: ContentId,
        root_location_id: Option<LocationId>,
    ) -> LocationRepoResult<Vec<Location>> {
        self.repo
            .load_locations_by_content(content_id, root_location_id)
    }

    pub fn load_parent_locations_for_draft_content(
        &self,
        content_id: ContentId,
    ) -> LocationRepoResult<Vec<Location>> {
        self.repo.load_parent_locations_for_draft_content(content_id)
    }

    pub fn load_children(&self, location_id: LocationId) -> LocationRepoResult<Vec<Location>> {
        self.repo.load_children(location_id)
    }

    /// Walks the subtree depth-first, children in priority order.
    ///
    /// The root is returned first with level 0.
    pub fn walk_subtree(&self, location_id: LocationId) -> LocationRepoResult<Vec<TreeEntry>> {
        let root = self.repo.load(location_id)?;
        let mut entries = Vec::new();
        let mut stack = vec![TreeEntry {
            level: 0,
            location: root,
        }];
        while let Some(entry) = stack.pop() {
            let children = self.repo.load_children(entry.location.id)?;
            // Reverse so the first child is popped first.
            for child in children.into_iter().rev() {
                stack.push(TreeEntry {
                    level: entry.level + 1,
                    location: child,
                });
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn create(&self, create: &CreateStruct) -> LocationRepoResult<Location> {
        self.observe("location_create", create.parent_id, |repo| {
            repo.create(create)
        })
    }

    pub fn update(
        &self,
        update: &UpdateStruct,
        location_id: LocationId,
    ) -> LocationRepoResult<Location> {
        self.observe("location_update", location_id, |repo| {
            repo.update(update, location_id)
        })
    }

    /// Copies a subtree and returns the root of the copy.
    pub fn copy_subtree(
        &self,
        source_id: LocationId,
        destination_parent_id: LocationId,
    ) -> LocationRepoResult<Location> {
        self.observe("location_copy", source_id, |repo| {
            repo.copy_subtree(source_id, destination_parent_id)
        })
    }

    pub fn move_subtree(
        &self,
        source_id: LocationId,
        destination_parent_id: LocationId,
    ) -> LocationRepoResult<()> {
        self.observe("location_move", source_id, |repo| {
            repo.move_subtree(source_id, destination_parent_id)
        })
    }

    pub fn swap(&self, location_id1: LocationId, location_id2: LocationId) -> LocationRepoResult<()> {
        self.observe("location_swap", location_id1, |repo| {
            repo.swap(location_id1, location_id2)
        })
    }

    pub fn hide(&self, location_id: LocationId) -> LocationRepoResult<()> {
        self.observe("location_hide", location_id, |repo| repo.hide(location_id))
    }

    pub fn un_hide(&self, location_id: LocationId) -> LocationRepoResult<()> {
        self.observe("location_unhide", location_id, |repo| {
            repo.un_hide(location_id)
        })
    }

    pub fn mark_subtree_modified(
        &self,
        location_id: LocationId,
        timestamp: Option<i64>,
    ) -> LocationRepoResult<()> {
        self.observe("location_mark_modified", location_id, |repo| {
            repo.mark_subtree_modified(location_id, timestamp)
        })
    }

    pub fn remove_subtree(&self, location_id: LocationId) -> LocationRepoResult<SubtreeRemoval> {
        self.observe("location_remove", location_id, |repo| {
            repo.remove_subtree(location_id)
        })
    }

    /// Returns the number of content items moved to `section_id`.
    pub fn set_section_for_subtree(
        &self,
        location_id: LocationId,
        section_id: SectionId,
    ) -> LocationRepoResult<usize> {
        self.observe("location_set_section", location_id, |repo| {
            repo.set_section_for_subtree(location_id, section_id)
        })
    }

    pub fn change_main_location(
        &self,
        content_id: ContentId,
        location_id: LocationId,
    ) -> LocationRepoResult<()> {
        self.observe("location_change_main", location_id, |repo| {
            repo.change_main_location(content_id, location_id)
        })
    }

    fn observe<T>(
        &self,
        event: &'static str,
        location_id: LocationId,
        op: impl FnOnce(&R) -> LocationRepoResult<T>,
    ) -> LocationRepoResult<T> {
        let started_at = Instant::now();
        let result = op(&self.repo);
        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => info!(
                "event={} module=location status=ok location_id={} duration_ms={}",
                event, location_id, duration_ms
            ),
            Err(err) => warn!(
                "event={} module=location status=error location_id={} duration_ms={} error_kind={} error={}",
                event,
                location_id,
                duration_ms,
                err.kind().as_str(),
                sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
            ),
        }
        result
    }
}
