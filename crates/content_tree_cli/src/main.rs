//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a content tree database (in memory when no path is given).
//! - Print core version, schema version and the location tree.
//!
//! Usage: `content_tree_cli [DB_PATH]`

use content_tree_core::db::migrations::current_user_version;
use content_tree_core::db::{open_db, open_db_in_memory};
use content_tree_core::{LocationService, SqliteLocationRepository, ROOT_LOCATION_ID};
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("content_tree_cli: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(db_path: Option<String>) -> Result<(), String> {
    let conn = match db_path.as_deref() {
        Some(path) => open_db(path),
        None => open_db_in_memory(),
    }
    .map_err(|err| err.to_string())?;

    println!("content_tree_core version={}", content_tree_core::core_version());
    println!(
        "schema version={}",
        current_user_version(&conn).map_err(|err| err.to_string())?
    );

    let repo = SqliteLocationRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let service = LocationService::new(repo);
    for entry in service
        .walk_subtree(ROOT_LOCATION_ID)
        .map_err(|err| err.to_string())?
    {
        let location = &entry.location;
        let mut markers = String::new();
        if location.is_main {
            markers.push_str(" main");
        }
        if location.is_hidden {
            markers.push_str(" hidden");
        } else if location.is_invisible {
            markers.push_str(" invisible");
        }
        println!(
            "{}{} content={} path={}{}",
            "  ".repeat(entry.level as usize),
            location.id,
            location.content_id,
            location.path_string,
            markers
        );
    }
    Ok(())
}
