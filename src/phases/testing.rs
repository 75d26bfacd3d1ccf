//! Testing: Theme Check, an unpublished push to the dev store, manual review and cleanup.

use crate::context::PhaseContext;
use crate::controller::PhaseHandler;
use crate::errors::PhaseError;
use crate::operator::Prompter;
use crate::phase::Phase;
use crate::session::state::{SessionState, Severity, TestResult};
use crate::shopify::ThemeCheckReport;
use crate::ui::icons::{CHECK, CROSS};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;

pub const CATEGORY_THEME_CHECK: &str = "theme-check";
pub const CATEGORY_PUSH: &str = "shopify-push";
pub const CATEGORY_REVIEW: &str = "manual-review";

const SHOWN_ERRORS: usize = 10;
const SHOWN_WARNINGS: usize = 5;

const REVIEW_CHECKLIST: [&str; 7] = [
    "Header displays correctly on desktop and mobile",
    "Footer displays correctly",
    "New sections render properly",
    "Modified sections work as expected",
    "JavaScript interactions function correctly",
    "Colors and typography match the design system",
    "No console errors in browser dev tools",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Review {
    Pass,
    Minor,
    Fail,
}

impl Review {
    const ALL: [Review; 3] = [Review::Pass, Review::Minor, Review::Fail];

    fn label(self) -> &'static str {
        match self {
            Review::Pass => "Looks good - ready for final packaging",
            Review::Minor => "Minor issues - note them and continue",
            Review::Fail => "Major issues - need to fix before continuing",
        }
    }

    fn result(self) -> TestResult {
        let (passed, severity, message) = match self {
            Review::Pass => (true, Severity::Info, "Approved"),
            Review::Minor => (true, Severity::Warning, "Minor issues noted"),
            Review::Fail => (false, Severity::Error, "Failed review"),
        };
        TestResult {
            category: CATEGORY_REVIEW.to_string(),
            name: "Visual Review".to_string(),
            passed,
            severity,
            message: Some(message.to_string()),
        }
    }
}

pub struct TestingPhase;

#[async_trait]
impl PhaseHandler for TestingPhase {
    fn phase(&self) -> Phase {
        Phase::Testing
    }

    async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> Result<()> {
        let theme_path = session
            .theme_package
            .as_ref()
            .map(|p| p.theme_path.clone())
            .ok_or(PhaseError::MissingPrerequisite {
                phase: Phase::Testing,
                requirement: "an assembled theme package",
            })?;

        ctx.console.section("Testing Framework");
        ctx.console.list(&[
            "Run Shopify Theme Check".to_string(),
            "Push to the dev store as an unpublished theme".to_string(),
            "Manual review in the browser".to_string(),
            "Clean up the test theme".to_string(),
        ]);
        session.test_results.clear();
        session.test_theme_preview_url = None;

        if !ctx.operator.confirm("Ready to begin testing?", true)? {
            ctx.console
                .info("Skipping automated testing. You can test the theme manually.");
            session.test_results.push(TestResult {
                category: "testing".to_string(),
                name: "Testing".to_string(),
                passed: false,
                severity: Severity::Warning,
                message: Some("Skipped by operator".to_string()),
            });
            return Ok(());
        }

        let mut test_theme_id = None;
        let outcome = exercise(ctx, session, &theme_path, &mut test_theme_id).await;
        if let Some(theme_id) = &test_theme_id {
            cleanup(ctx, theme_id).await?;
        }
        outcome?;

        summarize(ctx, &session.test_results);
        Ok(())
    }
}

async fn exercise(
    ctx: &PhaseContext,
    session: &mut SessionState,
    theme_path: &Path,
    test_theme_id: &mut Option<String>,
) -> Result<()> {
    ctx.console.section("Step 1: Theme Check");
    let spinner = ctx.console.spinner("Running Theme Check...");
    let report = ctx.theme_cli.run_theme_check(theme_path).await;
    spinner.finish_and_clear();
    let check = check_result(&report);
    let errors = report.errors().count();
    session.test_results.push(check);
    show_check(ctx, &report);
    if errors > 0 && !ctx.operator.confirm("Continue with errors?", false)? {
        bail!("Theme Check found {errors} errors; fix them and resume the session");
    }

    ctx.console.section("Step 2: Push to Shopify");
    let name = format!(
        "{} - Test {}",
        if session.theme_name.is_empty() { "Theme" } else { session.theme_name.as_str() },
        Utc::now().format("%Y%m%d%H%M%S")
    );
    ctx.console.key_value("Theme name", &name);
    let spinner = ctx.console.spinner("Pushing theme...");
    let push = ctx.theme_cli.push_theme(theme_path, &name).await;
    spinner.finish_and_clear();
    if !push.success {
        let error = push.error.unwrap_or_else(|| "unknown error".to_string());
        tracing::warn!(%error, "Test theme push failed");
        ctx.console.error(&format!("Failed to push theme: {error}"));
        session.test_results.push(TestResult {
            category: CATEGORY_PUSH.to_string(),
            name: "Theme Push".to_string(),
            passed: false,
            severity: Severity::Error,
            message: Some(error),
        });
        return Ok(());
    }
    *test_theme_id = push.theme_id.clone();
    let preview_url = push
        .preview_url
        .clone()
        .or_else(|| push.theme_id.as_deref().map(|id| ctx.theme_cli.preview_url(id)));
    tracing::info!(theme_id = ?push.theme_id, "Test theme pushed");
    ctx.console.success("Theme pushed");
    ctx.console
        .key_value("Theme ID", push.theme_id.as_deref().unwrap_or("unknown"));
    if let Some(url) = &preview_url {
        ctx.console.key_value("Preview URL", url);
    }
    session.test_results.push(TestResult {
        category: CATEGORY_PUSH.to_string(),
        name: "Theme Push".to_string(),
        passed: true,
        severity: Severity::Info,
        message: push.theme_id.as_ref().map(|id| format!("Theme ID: {id}")),
    });
    session.test_theme_preview_url = preview_url;

    ctx.console.section("Step 3: Manual Review");
    ctx.console.info("Review the theme in your browser and check:");
    ctx.console
        .list(&REVIEW_CHECKLIST.map(str::to_string));
    let labels: Vec<String> = Review::ALL.iter().map(|r| r.label().to_string()).collect();
    let review = Review::ALL[ctx.operator.select("How does the theme look?", &labels, 0)?];
    session.test_results.push(review.result());
    if review == Review::Fail {
        ctx.console
            .warning("Theme failed manual review. Fix the issues and rewind to testing.");
    } else {
        ctx.console.success("Testing complete");
    }
    Ok(())
}

fn check_result(report: &ThemeCheckReport) -> TestResult {
    let errors = report.errors().count();
    let (passed, severity, message) = match (&report.failure, errors) {
        (Some(failure), _) => (
            false,
            Severity::Warning,
            Some(format!("Theme Check could not run: {failure}")),
        ),
        (None, 0) => (true, Severity::Info, None),
        (None, n) => (false, Severity::Error, Some(format!("{n} errors found"))),
    };
    TestResult {
        category: CATEGORY_THEME_CHECK.to_string(),
        name: "Theme Check Validation".to_string(),
        passed,
        severity,
        message,
    }
}

fn show_check(ctx: &PhaseContext, report: &ThemeCheckReport) {
    if let Some(failure) = &report.failure {
        ctx.console
            .warning(&format!("Theme Check could not run: {failure}"));
        return;
    }
    let errors: Vec<_> = report.errors().collect();
    if errors.is_empty() {
        ctx.console.success("Theme Check passed");
    } else {
        ctx.console
            .error(&format!("Theme Check found {} errors:", errors.len()));
        for issue in errors.iter().take(SHOWN_ERRORS) {
            ctx.console
                .error(&format!("  {}: {}", issue.path, issue.message));
        }
        if errors.len() > SHOWN_ERRORS {
            ctx.console
                .error(&format!("  ... and {} more", errors.len() - SHOWN_ERRORS));
        }
    }
    let warnings: Vec<_> = report.warnings().collect();
    if !warnings.is_empty() {
        ctx.console
            .warning(&format!("{} warnings found", warnings.len()));
        for issue in warnings.iter().take(SHOWN_WARNINGS) {
            ctx.console
                .warning(&format!("  {}: {}", issue.path, issue.message));
        }
    }
}

async fn cleanup(ctx: &PhaseContext, theme_id: &str) -> Result<()> {
    ctx.console.section("Step 4: Cleanup");
    if !ctx
        .operator
        .confirm("Delete the test theme from Shopify?", true)?
    {
        ctx.console
            .info(&format!("Test theme remains on the store. Theme ID: {theme_id}"));
        return Ok(());
    }
    if ctx.theme_cli.delete_theme(theme_id).await {
        ctx.console.success("Test theme deleted");
    } else {
        tracing::warn!(theme_id, "Test theme deletion failed");
        ctx.console
            .warning("Could not delete the test theme; remove it manually");
    }
    Ok(())
}

fn summarize(ctx: &PhaseContext, results: &[TestResult]) {
    let passed = results.iter().filter(|r| r.passed).count();
    ctx.console.section("Test Results Summary");
    ctx.console.key_value("Passed", passed);
    ctx.console.key_value("Failed", results.len() - passed);
    for result in results {
        let icon = if result.passed { CHECK } else { CROSS };
        ctx.console.info(&format!(
            "{icon}{}: {}",
            result.name,
            result.message.as_deref().unwrap_or("OK")
        ));
    }
}
