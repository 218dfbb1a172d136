//! Materialized tree path codec.
//!
//! A path string lists every ancestor id from the root down to the location
//! itself, each segment wrapped in `/`: the location `42` under `5` under the
//! root `1` has path `/1/5/42/`. Because every segment is closed by a
//! delimiter, a prefix test on path strings is an exact ancestor test: `/1/5/`
//! never matches `/1/50/`.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Segment delimiter.
pub const PATH_DELIMITER: char = '/';

/// Errors raised when a path string is malformed or outside an expected prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path is not `/id/.../id/` with positive integer ids.
    Malformed(String),
    /// Path does not start with the prefix it is being rewritten from.
    OutsidePrefix { path: String, prefix: String },
}

impl Display for PathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(path) => write!(f, "malformed tree path `{path}`"),
            Self::OutsidePrefix { path, prefix } => {
                write!(f, "tree path `{path}` is not inside `{prefix}`")
            }
        }
    }
}

impl Error for PathError {}

/// Path of a tree root with the given id.
pub fn root_path(id: i64) -> String {
    format!("{PATH_DELIMITER}{id}{PATH_DELIMITER}")
}

/// Path of `child_id` placed directly under the location at `parent_path`.
pub fn child_path(parent_path: &str, child_id: i64) -> Result<String, PathError> {
    parse_path(parent_path)?;
    if child_id <= 0 {
        return Err(PathError::Malformed(format!("{parent_path}{child_id}/")));
    }
    Ok(format!("{parent_path}{child_id}{PATH_DELIMITER}"))
}

/// Splits a path into its ids, root first.
pub fn parse_path(path: &str) -> Result<Vec<i64>, PathError> {
    let inner = path
        .strip_prefix(PATH_DELIMITER)
        .and_then(|rest| rest.strip_suffix(PATH_DELIMITER))
        .filter(|inner| !inner.is_empty())
        .ok_or_else(|| PathError::Malformed(path.to_string()))?;

    inner
        .split(PATH_DELIMITER)
        .map(|segment| {
            if segment.is_empty() || !segment.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(PathError::Malformed(path.to_string()));
            }
            match segment.parse::<i64>() {
                Ok(id) if id > 0 => Ok(id),
                _ => Err(PathError::Malformed(path.to_string())),
            }
        })
        .collect()
}

/// Depth of the location at `path`; a root has depth 0.
pub fn depth_of(path: &str) -> Result<u32, PathError> {
    let segments = parse_path(path)?.len();
    Ok((segments - 1) as u32)
}

/// Path of the parent location, or `None` for a root.
pub fn parent_path(path: &str) -> Result<Option<String>, PathError> {
    let ids = parse_path(path)?;
    if ids.len() == 1 {
        return Ok(None);
    }
    Ok(Some(join_ids(&ids[..ids.len() - 1])))
}

/// Ids of every strict ancestor, root first.
pub fn ancestor_ids(path: &str) -> Result<Vec<i64>, PathError> {
    let mut ids = parse_path(path)?;
    ids.pop();
    Ok(ids)
}

/// Whether `path` is `ancestor_path` itself or lies below it.
pub fn is_within(path: &str, ancestor_path: &str) -> bool {
    path.starts_with(ancestor_path)
}

/// Replaces `old_prefix` with `new_prefix` at the start of `path`.
///
/// Both prefixes must be full paths (delimiter terminated), so the rewrite
/// can only ever touch whole segments.
pub fn rewrite_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> Result<String, PathError> {
    parse_path(old_prefix)?;
    parse_path(new_prefix)?;
    let rest = path
        .strip_prefix(old_prefix)
        .ok_or_else(|| PathError::OutsidePrefix {
            path: path.to_string(),
            prefix: old_prefix.to_string(),
        })?;
    Ok(format!("{new_prefix}{rest}"))
}

/// Half-open range `[lower, upper)` of path strings inside the subtree at `path`.
///
/// Equivalent to `path_string LIKE 'path%'` but usable as an index range scan:
/// the byte after `/` is `0`, so replacing the trailing delimiter with `0`
/// gives the first string that no longer shares the prefix.
pub fn subtree_bounds(path: &str) -> Result<(String, String), PathError> {
    parse_path(path)?;
    let stem = &path[..path.len() - PATH_DELIMITER.len_utf8()];
    Ok((path.to_string(), format!("{stem}0")))
}

fn join_ids(ids: &[i64]) -> String {
    let mut path = String::from(PATH_DELIMITER);
    for id in ids {
        path.push_str(&id.to_string());
        path.push(PATH_DELIMITER);
    }
    path
}
