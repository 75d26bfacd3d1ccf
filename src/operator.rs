//! The operator seam: everything a phase asks of the person driving the session.

use crate::approval::Reviewer;
use anyhow::Result;

/// Free-form input requested by phases outside the approval loop.
pub trait Prompter: Send + Sync {
    fn text(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;

    /// Index of the chosen item.
    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize>;

    /// Collect entries until a blank answer.
    fn list(&self, prompt: &str) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        loop {
            let label = format!("{} ({} so far, blank to finish)", prompt, entries.len());
            let entry = self.text(&label, Some(""))?;
            let entry = entry.trim();
            if entry.is_empty() {
                return Ok(entries);
            }
            entries.push(entry.to_string());
        }
    }
}

/// A full operator: approves artifacts and answers phase prompts.
pub trait Operator: Reviewer + Prompter {
    fn as_reviewer(&self) -> &dyn Reviewer;
}

impl<T: Reviewer + Prompter> Operator for T {
    fn as_reviewer(&self) -> &dyn Reviewer {
        self
    }
}
