//! Theme assembly: base theme, generated files and design tokens written to `output/<theme>/theme`.

use crate::context::PhaseContext;
use crate::controller::PhaseHandler;
use crate::errors::PhaseError;
use crate::phase::Phase;
use crate::phases::design_system::{css_variables, settings_data};
use crate::session::state::{
    CodeArtifact, DesignSystem, SectionProposal, SessionState, ThemePackage,
};
use crate::ui::icons::FOLDER;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub const SETTINGS_DATA_PATH: &str = "config/settings_data.json";
pub const DESIGN_CSS_PATH: &str = "assets/design-system.css";
pub const MANIFEST_FILE: &str = "theme-manifest.json";

/// Everything the assembler needs, detached from the session so it can run on a blocking thread.
struct AssemblyInput {
    theme_dir: PathBuf,
    base_theme: Option<PathBuf>,
    artifacts: Vec<CodeArtifact>,
    design: DesignSystem,
}

#[derive(Debug, Default)]
struct Assembly {
    base_files: usize,
    new_files: BTreeSet<String>,
    modified_files: BTreeSet<String>,
    excluded_steps: BTreeSet<String>,
}

impl Assembly {
    fn record(&mut self, path: &str, base: &HashSet<String>) {
        if base.contains(path) {
            self.modified_files.insert(path.to_string());
        } else {
            self.new_files.insert(path.to_string());
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThemeManifest<'a> {
    session_id: &'a str,
    theme_name: &'a str,
    generated_at: DateTime<Utc>,
    theme_path: &'a Path,
    base_theme: Option<&'a Path>,
    product_count: usize,
    sections: &'a [SectionProposal],
    new_files: &'a [String],
    modified_files: &'a [String],
    excluded_steps: &'a [String],
    design_system: &'a DesignSystem,
}

pub struct CodeGenerationPhase;

#[async_trait]
impl PhaseHandler for CodeGenerationPhase {
    fn phase(&self) -> Phase {
        Phase::CodeGeneration
    }

    async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> Result<()> {
        let design = session
            .design_system
            .clone()
            .ok_or(PhaseError::MissingPrerequisite {
                phase: Phase::CodeGeneration,
                requirement: "a design system",
            })?;
        let output_dir = ctx.output_dir(&session.output_name());
        let theme_dir = output_dir.join("theme");

        let base_theme = match &ctx.config.theme.base_theme_dir {
            Some(dir) if dir.is_dir() => Some(dir.clone()),
            Some(dir) => {
                tracing::warn!(path = %dir.display(), "Base theme directory not found");
                ctx.console.warning(&format!(
                    "Base theme not found at {}; assembling generated files only",
                    dir.display()
                ));
                None
            }
            None => None,
        };

        ctx.console.section(&format!("{FOLDER}Assembling Theme"));
        if let Some(base) = &base_theme {
            ctx.console.path("Base theme", base);
        }
        let spinner = ctx.console.spinner("Writing theme files...");
        let input = AssemblyInput {
            theme_dir: theme_dir.clone(),
            base_theme: base_theme.clone(),
            artifacts: session.generated_code.clone(),
            design: design.clone(),
        };
        let assembly = tokio::task::spawn_blocking(move || assemble(&input))
            .await
            .context("Theme assembly task panicked")??;
        spinner.finish_and_clear();

        let package = ThemePackage {
            theme_path: theme_dir.clone(),
            assembled_at: Utc::now(),
            new_files: assembly.new_files.into_iter().collect(),
            modified_files: assembly.modified_files.into_iter().collect(),
            excluded_steps: assembly.excluded_steps.into_iter().collect(),
        };

        let manifest = ThemeManifest {
            session_id: &session.id,
            theme_name: &session.theme_name,
            generated_at: package.assembled_at,
            theme_path: &package.theme_path,
            base_theme: base_theme.as_deref(),
            product_count: session.products.len(),
            sections: &session.sections,
            new_files: &package.new_files,
            modified_files: &package.modified_files,
            excluded_steps: &package.excluded_steps,
            design_system: &design,
        };
        let manifest_path = output_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&manifest).context("Failed to serialize theme manifest")?;
        tokio::fs::write(&manifest_path, json)
            .await
            .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

        tracing::info!(
            base_files = assembly.base_files,
            new_files = package.new_files.len(),
            modified_files = package.modified_files.len(),
            excluded = package.excluded_steps.len(),
            "Theme assembled"
        );
        ctx.console.key_value("Base files", assembly.base_files);
        ctx.console.key_value("New files", package.new_files.len());
        ctx.console.key_value("Modified files", package.modified_files.len());
        if !package.excluded_steps.is_empty() {
            ctx.console.warning(&format!(
                "Left out skipped steps: {}",
                package.excluded_steps.join(", ")
            ));
        }
        ctx.console.path("Theme", &theme_dir);
        ctx.console.path("Manifest", &manifest_path);

        session.theme_package = Some(package);
        Ok(())
    }
}

/// Build the theme directory from scratch.
fn assemble(input: &AssemblyInput) -> Result<Assembly> {
    if input.theme_dir.exists() {
        std::fs::remove_dir_all(&input.theme_dir)
            .with_context(|| format!("Failed to clear {}", input.theme_dir.display()))?;
    }
    std::fs::create_dir_all(&input.theme_dir)
        .with_context(|| format!("Failed to create {}", input.theme_dir.display()))?;

    let base_files = match &input.base_theme {
        Some(base) => copy_tree(base, &input.theme_dir)?,
        None => HashSet::new(),
    };
    let mut assembly = Assembly {
        base_files: base_files.len(),
        ..Default::default()
    };

    for artifact in &input.artifacts {
        if artifact.skipped {
            assembly.excluded_steps.insert(artifact.step.clone());
            continue;
        }
        if !is_theme_relative(&artifact.path) {
            tracing::warn!(path = %artifact.path, step = %artifact.step, "Refusing path outside the theme");
            assembly.excluded_steps.insert(artifact.step.clone());
            continue;
        }
        write_file(&input.theme_dir, &artifact.path, &artifact.content)?;
        assembly.record(&artifact.path, &base_files);
    }

    let settings = serde_json::to_string_pretty(&settings_data(&input.design))
        .context("Failed to serialize theme settings")?;
    write_file(&input.theme_dir, SETTINGS_DATA_PATH, &settings)?;
    assembly.record(SETTINGS_DATA_PATH, &base_files);
    write_file(&input.theme_dir, DESIGN_CSS_PATH, &css_variables(&input.design))?;
    assembly.record(DESIGN_CSS_PATH, &base_files);

    Ok(assembly)
}

/// Copy every file under `src` into `dest`, returning the copied relative paths.
fn copy_tree(src: &Path, dest: &Path) -> Result<HashSet<String>> {
    let mut copied = HashSet::new();
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to read base theme {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .context("Base theme entry outside its root")?;
        if relative.as_os_str().is_empty() || is_hidden(relative) {
            continue;
        }
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            copied.insert(theme_path(relative));
        }
    }
    Ok(copied)
}

fn write_file(theme_dir: &Path, relative: &str, content: &str) -> Result<()> {
    let path = theme_dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Forward-slash form of a relative path, matching artifact paths.
fn theme_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

fn is_theme_relative(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}
