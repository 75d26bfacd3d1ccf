pub mod icons;
pub mod terminal;

pub use terminal::TerminalOperator;

use crate::phase::{PHASE_ORDER, Phase};
use crate::session::state::{SectionKind, SessionState};
use crate::ui::icons::{CHECK, CROSS, FOLDER, INFO, ROUND, SPARKLE, WARN};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

const WRAP_WIDTH: usize = 88;

/// Console renderer for headers, proposals, and progress.
///
/// A quiet console drops all output and hands out hidden progress bars, which
/// keeps scripted runs and tests silent.
#[derive(Debug, Clone, Default)]
pub struct Console {
    quiet: bool,
}

impl Console {
    pub fn new() -> Self {
        Self { quiet: false }
    }

    pub fn quiet() -> Self {
        Self { quiet: true }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    fn line(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", msg.as_ref());
        }
    }

    pub fn newline(&self) {
        self.line("");
    }

    pub fn banner(&self, title: &str, subtitle: &str) {
        let rule = "═".repeat(60);
        self.line(format!("\n{}", style(&rule).cyan()));
        self.line(format!("  {}{}", SPARKLE, style(title).bold()));
        self.line(format!("  {}", style(subtitle).dim()));
        self.line(format!("{}\n", style(&rule).cyan()));
    }

    pub fn phase_header(&self, phase: Phase) {
        self.line(format!(
            "\n{} {} {}",
            style(format!("[{}/{}]", phase.index() + 1, PHASE_ORDER.len())).dim(),
            style("Phase:").bold(),
            style(phase.title()).yellow().bold()
        ));
        self.line(style("─".repeat(60)).dim().to_string());
    }

    pub fn section(&self, title: &str) {
        self.line(format!("\n{}", style(title).bold().underlined()));
    }

    pub fn success(&self, msg: &str) {
        self.line(format!("{}{}", CHECK, style(msg).green()));
    }

    pub fn info(&self, msg: &str) {
        self.line(format!("{}{}", INFO, msg));
    }

    pub fn warning(&self, msg: &str) {
        self.line(format!("{}{}", WARN, style(msg).yellow()));
    }

    pub fn error(&self, msg: &str) {
        if self.quiet {
            return;
        }
        eprintln!("{}{}", CROSS, style(msg).red());
    }

    pub fn key_value(&self, key: &str, value: impl std::fmt::Display) {
        self.line(format!("  {:<22} {}", style(format!("{key}:")).dim(), value));
    }

    pub fn list(&self, items: &[String]) {
        for item in items {
            self.line(format!("  • {item}"));
        }
    }

    pub fn path(&self, label: &str, path: &Path) {
        self.line(format!("{}{} {}", FOLDER, label, style(path.display()).cyan()));
    }

    /// A generated artifact, wrapped for reading.
    pub fn proposal(&self, title: &str, body: &str) {
        if self.quiet {
            return;
        }
        self.section(title);
        let options = textwrap::Options::new(WRAP_WIDTH)
            .initial_indent("  ")
            .subsequent_indent("  ");
        for paragraph in body.lines() {
            if paragraph.trim().is_empty() {
                println!();
            } else {
                println!("{}", textwrap::fill(paragraph, &options));
            }
        }
    }

    /// Source code is shown as-is, truncated to `max_lines`.
    pub fn code(&self, title: &str, code: &str, max_lines: usize) {
        if self.quiet {
            return;
        }
        self.section(title);
        let total = code.lines().count();
        for line in code.lines().take(max_lines) {
            println!("  {}", style(line).dim());
        }
        if total > max_lines {
            println!("  {}", style(format!("... {} more lines", total - max_lines)).dim());
        }
    }

    pub fn iteration(&self, iteration: u32, max: u32) {
        self.line(format!(
            "{}{}",
            ROUND,
            style(format!("Iteration {iteration}/{max}")).cyan()
        ));
    }

    pub fn spinner(&self, msg: impl Into<String>) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("progress bar template is a valid static string"),
        );
        bar.set_message(msg.into());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    pub fn progress(&self, len: u64, prefix: &str) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("progress bar template is a valid static string")
                .progress_chars("█▓▒░"),
        );
        bar.set_prefix(prefix.to_string());
        bar
    }

    /// Summary shown before the resume menu.
    pub fn session_info(&self, session: &SessionState) {
        self.section("Session Information");
        self.key_value("Session ID", &session.id);
        self.key_value(
            "Theme Name",
            if session.theme_name.is_empty() {
                "(not set)"
            } else {
                &session.theme_name
            },
        );
        self.key_value("Started", session.started_at.format("%Y-%m-%d %H:%M"));
        self.key_value("Last Updated", session.last_updated_at.format("%Y-%m-%d %H:%M"));
        self.key_value("Current Phase", session.current_phase.title());

        let completed: Vec<String> = session
            .completed_phases
            .iter()
            .map(|p| p.title().to_string())
            .collect();
        if !completed.is_empty() {
            self.line("  Completed phases:");
            self.list(&completed);
        }

        self.section("Data Summary");
        match &session.brief {
            Some(brief) => {
                self.key_value("Industry", &brief.industry);
                self.key_value("Target Market", &brief.target_market);
            }
            None => self.key_value("Brief", "(not collected)"),
        }
        self.key_value("Products", format!("{} defined", session.products.len()));
        self.key_value(
            "With images",
            session
                .products
                .iter()
                .filter(|p| p.images.studio.is_some())
                .count(),
        );
        self.key_value(
            "Sections",
            format!(
                "{} new, {} modified",
                session.sections_of(SectionKind::New).count(),
                session.sections_of(SectionKind::Modified).count()
            ),
        );
        self.key_value(
            "Design System",
            if session.design_system.is_some() {
                "configured"
            } else {
                "(not set)"
            },
        );
        if !session.test_results.is_empty() {
            let passed = session.test_results.iter().filter(|t| t.passed).count();
            self.key_value(
                "Test Results",
                format!("{}/{} passed", passed, session.test_results.len()),
            );
        }
        self.newline();
    }
}
