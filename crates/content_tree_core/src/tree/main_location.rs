//! Main-location selection for content that lost locations.

/// Location that survived a removal, as seen by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainingLocation {
    pub id: i64,
    pub is_main: bool,
}

/// Outcome for one content item after some of its locations were removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainLocationDecision {
    /// A remaining location already carries the main flag.
    Keep(i64),
    /// No remaining location is main; flag this one.
    Promote(i64),
    /// Nothing remains; the content item must be deleted.
    DeleteContent,
}

/// Picks the main location among what is left of a content item's placements.
///
/// The first remaining location by ascending id is promoted, independent of
/// the order the caller loaded them in.
pub fn resolve_main_location(remaining: &[RemainingLocation]) -> MainLocationDecision {
    if let Some(main) = remaining.iter().find(|location| location.is_main) {
        return MainLocationDecision::Keep(main.id);
    }
    match remaining.iter().map(|location| location.id).min() {
        Some(id) => MainLocationDecision::Promote(id),
        None => MainLocationDecision::DeleteContent,
    }
}
