//! Submission: final verification, preview URL, key features and the documentation set.

use crate::approval::SKIPPED_FEEDBACK;
use crate::context::PhaseContext;
use crate::controller::PhaseHandler;
use crate::errors::PhaseError;
use crate::operator::Prompter;
use crate::phase::Phase;
use crate::config::GenerationSettings;
use crate::phases::differentiation::{STEP_FOOTER_CODE, STEP_HEADER_CODE};
use crate::phases::testing::CATEGORY_REVIEW;
use crate::session::state::{
    DocumentationPaths, SectionKind, SessionState, SubmissionAssets, ThemePackage,
};
use crate::shopify::ThemeCheckReport;
use crate::ui::icons::SPARKLE;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Write as _;
use std::path::Path;

pub const DOCUMENTATION_FILE: &str = "documentation.md";
pub const CHECKLIST_FILE: &str = "submission-checklist.md";
pub const REPORT_FILE: &str = "generation-report.md";

const FEATURE_COUNT: usize = 3;
const SHOWN_ERRORS: usize = 5;

pub struct SubmissionPhase;

#[async_trait]
impl PhaseHandler for SubmissionPhase {
    fn phase(&self) -> Phase {
        Phase::Submission
    }

    async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> Result<()> {
        let package = session
            .theme_package
            .clone()
            .ok_or(PhaseError::MissingPrerequisite {
                phase: Phase::Submission,
                requirement: "an assembled theme package",
            })?;
        let output_dir = ctx.output_dir(&session.output_name());

        ctx.console.section("Step 1: Final Verification");
        let spinner = ctx.console.spinner("Running Theme Check...");
        let report = ctx.theme_cli.run_theme_check(&package.theme_path).await;
        spinner.finish_and_clear();
        verify(ctx, &report)?;

        ctx.console.section("Step 2: Preview");
        let preview_url = preview_url(ctx, session, &package).await?;
        match &preview_url {
            Some(url) => ctx.console.key_value("Preview URL", url),
            None => ctx.console.warning("No preview URL; submission screenshots must be taken manually"),
        }

        ctx.console.section("Step 3: Key Features");
        let defaults = default_features(session);
        ctx.console.list(&defaults);
        let key_features = if ctx
            .operator
            .confirm("Customize the key feature highlights?", false)?
        {
            customize_features(ctx, &defaults)?
        } else {
            defaults
        };

        let score = differentiation_score(
            session,
            ctx.config.generation.new_sections,
            ctx.config.generation.modified_sections,
        );
        let assets = SubmissionAssets {
            theme_name: session.theme_name.clone(),
            prepared_at: Utc::now(),
            preview_url,
            key_features,
            differentiation_score: score,
        };

        ctx.console.section("Step 4: Documentation");
        tokio::fs::create_dir_all(&output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        let docs = DocumentationPaths {
            documentation: output_dir.join(DOCUMENTATION_FILE),
            checklist: output_dir.join(CHECKLIST_FILE),
            report: output_dir.join(REPORT_FILE),
        };
        write_doc(&docs.documentation, &render_documentation(session, &assets)).await?;
        write_doc(
            &docs.checklist,
            &render_checklist(session, &assets, &report, &ctx.config.generation),
        )
        .await?;
        write_doc(&docs.report, &render_report(session, &package, &assets)).await?;
        for path in [&docs.documentation, &docs.checklist, &docs.report] {
            ctx.console.path("Wrote", path);
        }

        ctx.console.section(&format!("{SPARKLE}Theme Generation Complete"));
        ctx.console.key_value("Theme", &assets.theme_name);
        ctx.console
            .key_value("Differentiation score", format!("{score}%"));
        ctx.console.path("Theme files", &package.theme_path);
        tracing::info!(score, preview = assets.preview_url.is_some(), "Submission prepared");

        if let Some(theme_id) = session.submission_theme_id.clone()
            && ctx
                .operator
                .confirm("Delete the submission preview theme from Shopify?", true)?
        {
            if ctx.theme_cli.delete_theme(&theme_id).await {
                ctx.console.success("Submission preview theme deleted");
                session.submission_theme_id = None;
            } else {
                ctx.console
                    .warning("Could not delete the preview theme; remove it manually");
            }
        }

        ctx.console.info("Next steps:");
        ctx.console.list(&[
            format!("Review {CHECKLIST_FILE}"),
            "Test the theme on a staging store".to_string(),
            "Submit through the Shopify Partner Dashboard".to_string(),
        ]);

        session.submission_assets = Some(assets);
        session.documentation = Some(docs);
        Ok(())
    }
}

fn verify(ctx: &PhaseContext, report: &ThemeCheckReport) -> Result<()> {
    if let Some(failure) = &report.failure {
        ctx.console
            .warning(&format!("Could not run Theme Check: {failure}"));
        return Ok(());
    }
    let errors: Vec<_> = report.errors().collect();
    if errors.is_empty() {
        ctx.console.success(&format!(
            "Theme Check passed ({} warnings)",
            report.warnings().count()
        ));
        return Ok(());
    }
    ctx.console
        .error(&format!("Theme Check found {} errors:", errors.len()));
    for issue in errors.iter().take(SHOWN_ERRORS) {
        ctx.console
            .error(&format!("  {}: {}", issue.path, issue.message));
    }
    if !ctx
        .operator
        .confirm("The theme has errors. Continue anyway?", false)?
    {
        bail!("Theme verification failed; submission aborted");
    }
    Ok(())
}

/// The testing preview when there is one, else a fresh push or a manually entered URL.
async fn preview_url(
    ctx: &PhaseContext,
    session: &mut SessionState,
    package: &ThemePackage,
) -> Result<Option<String>> {
    if let Some(url) = &session.test_theme_preview_url {
        return Ok(Some(url.clone()));
    }
    ctx.console.warning("No preview URL from the testing phase");
    if ctx
        .operator
        .confirm("Push the theme to Shopify now for a preview?", true)?
    {
        let name = format!("{} - Submission Preview", session.theme_name);
        let spinner = ctx.console.spinner("Pushing theme...");
        let push = ctx.theme_cli.push_theme(&package.theme_path, &name).await;
        spinner.finish_and_clear();
        if push.success
            && let Some(theme_id) = push.theme_id
        {
            let url = push
                .preview_url
                .unwrap_or_else(|| ctx.theme_cli.preview_url(&theme_id));
            tracing::info!(%theme_id, "Submission preview pushed");
            session.submission_theme_id = Some(theme_id);
            return Ok(Some(url));
        }
        ctx.console.error(&format!(
            "Failed to push theme: {}",
            push.error.as_deref().unwrap_or("no theme id returned")
        ));
    }
    let manual = ctx
        .operator
        .text("Preview URL (leave empty to skip)", Some(""))?;
    let manual = manual.trim();
    Ok((!manual.is_empty()).then(|| manual.to_string()))
}

/// Feature highlights from what the session produced.
pub fn default_features(session: &SessionState) -> Vec<String> {
    let mut features: Vec<String> = session
        .sections_of(SectionKind::New)
        .take(2)
        .map(|s| {
            if s.concept.is_empty() {
                s.name.clone()
            } else {
                format!("{}: {}", s.name, s.concept)
            }
        })
        .collect();
    features.push(
        "Custom design system: cohesive palette, typography and spacing".to_string(),
    );
    let fillers = [
        "Rewritten header and footer built for conversion",
        "Mobile-first, accessible markup throughout",
        "Lightweight vanilla JavaScript enhancements",
    ];
    for filler in fillers {
        if features.len() >= FEATURE_COUNT {
            break;
        }
        features.push(filler.to_string());
    }
    features
}

fn customize_features(ctx: &PhaseContext, defaults: &[String]) -> Result<Vec<String>> {
    let mut features = Vec::with_capacity(FEATURE_COUNT);
    for i in 0..FEATURE_COUNT {
        let default = defaults.get(i).map(String::as_str).unwrap_or("");
        let answer = ctx
            .operator
            .text(&format!("Feature {}", i + 1), Some(default))?;
        let answer = answer.trim();
        features.push(if answer.is_empty() { default.to_string() } else { answer.to_string() });
    }
    features.retain(|f| !f.is_empty());
    Ok(features)
}

/// 0-100: a quarter each for new sections, modified sections, the design system,
/// and a rewritten header and footer.
pub fn differentiation_score(session: &SessionState, new_target: usize, modified_target: usize) -> u32 {
    let coverage = |kind: SectionKind, target: usize| {
        let count = session.sections_of(kind).count() as f64;
        (count / target.max(1) as f64).min(1.0) * 25.0
    };
    let written = |step: &str| {
        session
            .generated_code
            .iter()
            .any(|c| c.step == step && !c.skipped)
    };
    let header_footer = [STEP_HEADER_CODE, STEP_FOOTER_CODE]
        .into_iter()
        .filter(|&step| written(step))
        .count() as f64
        * 12.5;
    let design = if session.design_system.is_some() { 25.0 } else { 0.0 };
    (coverage(SectionKind::New, new_target) + coverage(SectionKind::Modified, modified_target) + design + header_footer)
        .round() as u32
}

async fn write_doc(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn render_documentation(session: &SessionState, assets: &SubmissionAssets) -> String {
    let mut doc = format!("# {}\n\n", assets.theme_name);
    if let Some(brief) = &session.brief {
        let _ = writeln!(
            doc,
            "A {} Shopify theme for {} stores, designed for {}.\n",
            brief.style_direction, brief.industry, brief.target_market
        );
        if let Some(positioning) = &brief.positioning {
            let _ = writeln!(doc, "{positioning}\n");
        }
    }

    doc.push_str("## Key Features\n\n");
    for feature in &assets.key_features {
        let _ = writeln!(doc, "- {feature}");
    }

    for (kind, title) in [(SectionKind::New, "New Sections"), (SectionKind::Modified, "Enhanced Sections")] {
        let sections: Vec<_> = session.sections_of(kind).collect();
        if sections.is_empty() {
            continue;
        }
        let _ = writeln!(doc, "\n## {title}\n");
        for section in sections {
            let _ = writeln!(doc, "### {}\n\n{}\n", section.name, section.concept);
            if !section.unique_features.is_empty() {
                for feature in &section.unique_features {
                    let _ = writeln!(doc, "- {feature}");
                }
                doc.push('\n');
            }
        }
    }

    if let Some(design) = &session.design_system {
        doc.push_str("\n## Design System\n\n");
        if let Some(scheme) = design.selected_scheme() {
            let _ = writeln!(
                doc,
                "- Default color scheme: {} (primary {}, accent {})",
                scheme.name, scheme.primary, scheme.accent
            );
        }
        let _ = writeln!(
            doc,
            "- Typography: {} headings, {} body, {}px base",
            design.typography.heading_font, design.typography.body_font, design.typography.base_size_px
        );
        let _ = writeln!(
            doc,
            "- Color schemes available: {}",
            design
                .color_schemes
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    doc.push_str(
        "\n## Installation\n\n\
         1. In the Shopify admin go to Online Store > Themes.\n\
         2. Upload the theme and open the theme editor.\n\
         3. Pick a color scheme under Theme settings > Colors.\n\
         4. Add the new sections to your templates from the section picker.\n",
    );
    if let Some(url) = &assets.preview_url {
        let _ = writeln!(doc, "\n## Preview\n\n{url}");
    }
    doc
}

fn render_checklist(
    session: &SessionState,
    assets: &SubmissionAssets,
    report: &ThemeCheckReport,
    generation: &GenerationSettings,
) -> String {
    let new_count = session.sections_of(SectionKind::New).count();
    let modified_count = session.sections_of(SectionKind::Modified).count();
    let items = [
        (
            new_count >= generation.new_sections,
            format!("{new_count} new sections (target {})", generation.new_sections),
        ),
        (
            modified_count >= generation.modified_sections,
            format!(
                "{modified_count} modified sections (target {})",
                generation.modified_sections
            ),
        ),
        (
            session.design_system.is_some(),
            "Design system with multiple color schemes".to_string(),
        ),
        (report.passed(), "Theme Check passes with no errors".to_string()),
        (
            session.test_results.iter().any(|r| r.passed && r.category == CATEGORY_REVIEW),
            "Visual review passed on the dev store".to_string(),
        ),
        (assets.preview_url.is_some(), "Live preview URL available".to_string()),
        (true, "Documentation written".to_string()),
        (false, "Submission screenshots captured (desktop and mobile)".to_string()),
        (false, "Theme listing copy and pricing prepared".to_string()),
    ];

    let mut doc = format!("# Submission Checklist: {}\n\n", assets.theme_name);
    for (done, item) in items {
        let _ = writeln!(doc, "- [{}] {item}", if done { "x" } else { " " });
    }
    let _ = writeln!(doc, "\nDifferentiation score: {}%", assets.differentiation_score);
    doc
}

fn render_report(session: &SessionState, package: &ThemePackage, assets: &SubmissionAssets) -> String {
    let records = &session.approval_history;
    let accepted = records.iter().filter(|r| r.accepted).count();
    let revisions = records
        .iter()
        .filter(|r| !r.accepted && r.feedback.as_deref() != Some(SKIPPED_FEEDBACK))
        .count();
    let skipped: Vec<&str> = records
        .iter()
        .filter(|r| r.feedback.as_deref() == Some(SKIPPED_FEEDBACK))
        .map(|r| r.step.as_str())
        .collect();
    let images: usize = session.products.iter().map(|p| p.images.count()).sum();

    let mut doc = format!("# Generation Report: {}\n\n", assets.theme_name);
    let _ = writeln!(doc, "- Session: {}", session.id);
    let _ = writeln!(doc, "- Started: {}", session.started_at.to_rfc3339());
    let _ = writeln!(doc, "- Prepared: {}", assets.prepared_at.to_rfc3339());
    let _ = writeln!(doc, "- Products: {} ({images} images)", session.products.len());
    let _ = writeln!(
        doc,
        "- Files: {} new, {} modified",
        package.new_files.len(),
        package.modified_files.len()
    );
    let _ = writeln!(doc, "- Differentiation score: {}%", assets.differentiation_score);

    doc.push_str("\n## Approvals\n\n");
    let _ = writeln!(doc, "- Accepted steps: {accepted}");
    let _ = writeln!(doc, "- Revision rounds: {revisions}");
    if skipped.is_empty() {
        doc.push_str("- Skipped steps: none\n");
    } else {
        let _ = writeln!(doc, "- Skipped steps: {}", skipped.join(", "));
    }

    if !session.test_results.is_empty() {
        doc.push_str("\n## Test Results\n\n");
        for result in &session.test_results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            let _ = writeln!(
                doc,
                "- [{status}] {}: {}",
                result.name,
                result.message.as_deref().unwrap_or("OK")
            );
        }
    }
    doc
}
