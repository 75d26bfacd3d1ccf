//! Session bookkeeping outside a run: `theme-builder list` and `theme-builder archive <id>`.

use anyhow::{Context, Result};
use std::path::Path;
use theme_builder::config::Config;
use theme_builder::session::SessionStore;
use theme_builder::ui::Console;

fn store(root: &Path) -> SessionStore {
    SessionStore::new(Config::sessions_dir_for(root))
}

pub fn cmd_list(root: &Path) -> Result<()> {
    let console = Console::new();
    let sessions = store(root)
        .list_sessions()
        .context("Failed to list sessions")?;
    if sessions.is_empty() {
        console.info("No sessions yet. Run `theme-builder` to start one.");
        return Ok(());
    }
    console.section("Sessions");
    for summary in &sessions {
        console.key_value(&summary.id, summary.label());
    }
    Ok(())
}

pub fn cmd_archive(root: &Path, id: &str) -> Result<()> {
    let target = store(root)
        .archive_session(id)
        .with_context(|| format!("Failed to archive session {id}"))?;
    Console::new().path("Archived to", &target);
    Ok(())
}
