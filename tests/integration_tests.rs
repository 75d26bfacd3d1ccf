//! Integration tests for the theme builder
//!
//! These drive whole sessions through the public library API with stub
//! services, plus a few checks of the binary itself.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use async_trait::async_trait;
use predicates::prelude::*;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use theme_builder::ai::{ChatClient, Message, TaskType};
use theme_builder::approval::{
    ApprovalEngine, ForcedChoice, Resolution, Reviewer, Round, SKIPPED_FEEDBACK, ScriptedAnswer,
    ScriptedOperator, Verdict,
};
use theme_builder::config::{BuilderToml, Config};
use theme_builder::context::PhaseContext;
use theme_builder::controller::{PhaseHandler, PhaseRegistry, SessionController};
use theme_builder::errors::{GeneratorError, PhaseError, SessionError};
use theme_builder::images::{ImageGenerator, ImageKind, ImageResult};
use theme_builder::operator::{Operator, Prompter};
use theme_builder::phase::{PHASE_ORDER, Phase};
use theme_builder::phases::standard_handlers;
use theme_builder::session::{SessionState, SessionStore, owned_fields, reset_to_phase};
use theme_builder::shopify::{ThemeCheckReport, ThemeCli, ThemePushResult};
use theme_builder::ui::Console;

fn theme_builder() -> Command {
    cargo_bin_cmd!("theme-builder")
}

// =============================================================================
// Stub services
// =============================================================================

/// Answers every completion with prose, so each phase takes its fallback path.
struct ProseChat;

#[async_trait]
impl ChatClient for ProseChat {
    async fn chat(&self, _messages: &[Message], _task: TaskType) -> Result<String, GeneratorError> {
        Ok("Here is a thoughtful idea without any structure.".to_string())
    }
}

struct StubImages;

#[async_trait]
impl ImageGenerator for StubImages {
    async fn generate(&self, prompt: &str, kind: ImageKind, variant: Option<&str>) -> ImageResult {
        ImageResult {
            kind,
            variant: variant.map(str::to_string),
            prompt: prompt.to_string(),
            image_url: Some("https://img.test/image.png".to_string()),
            error: None,
        }
    }

    async fn download(&self, _url: &str, dest: &Path) -> Result<(), GeneratorError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(dest, b"png").unwrap();
        Ok(())
    }
}

#[derive(Default)]
struct StubCli {
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl ThemeCli for StubCli {
    async fn push_theme(&self, _theme_path: &Path, _theme_name: &str) -> ThemePushResult {
        ThemePushResult {
            success: true,
            theme_id: Some("77".to_string()),
            preview_url: Some(self.preview_url("77")),
            editor_url: None,
            error: None,
        }
    }

    async fn delete_theme(&self, theme_id: &str) -> bool {
        self.deleted.lock().unwrap().push(theme_id.to_string());
        true
    }

    async fn run_theme_check(&self, _theme_path: &Path) -> ThemeCheckReport {
        ThemeCheckReport::default()
    }

    fn preview_url(&self, theme_id: &str) -> String {
        format!("https://dev.myshopify.com/?preview_theme_id={theme_id}")
    }
}

/// Answers brief questions from a queue, takes every prompt default, accepts
/// every artifact except `revise` steps, which are revised until forced.
struct Driver {
    answers: Mutex<VecDeque<String>>,
    revise: Vec<&'static str>,
    skip: Vec<&'static str>,
}

impl Driver {
    fn new(revise: Vec<&'static str>, skip: Vec<&'static str>) -> Self {
        Self {
            answers: Mutex::new(
                ["Specialty coffee", "Home baristas who care about origin"]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            ),
            revise,
            skip,
        }
    }
}

impl Reviewer for Driver {
    fn decide(&self, round: &Round<'_>) -> anyhow::Result<Verdict> {
        Ok(if self.revise.iter().any(|s| *s == round.step) {
            Verdict::Revise
        } else {
            Verdict::Accept
        })
    }

    fn feedback(&self, _round: &Round<'_>) -> anyhow::Result<String> {
        Ok("Make it bolder".to_string())
    }

    fn force(&self, round: &Round<'_>) -> anyhow::Result<ForcedChoice> {
        Ok(if self.skip.iter().any(|s| *s == round.step) {
            ForcedChoice::Skip
        } else {
            ForcedChoice::Accept
        })
    }
}

impl Prompter for Driver {
    fn text(&self, _prompt: &str, default: Option<&str>) -> anyhow::Result<String> {
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| default.unwrap_or_default().to_string()))
    }

    fn confirm(&self, _prompt: &str, default: bool) -> anyhow::Result<bool> {
        Ok(default)
    }

    fn select(&self, _prompt: &str, _items: &[String], default: usize) -> anyhow::Result<usize> {
        Ok(default)
    }
}

fn config(root: &Path, max_iterations: u32) -> Config {
    let mut file = BuilderToml::default();
    file.generation.max_approval_iterations = max_iterations;
    file.generation.products_count = 2;
    file.generation.new_sections = 2;
    file.generation.modified_sections = 1;
    file.generation.angles_per_product = 1;
    file.generation.lifestyle_per_product = 1;
    Config::from_lookup(root.to_path_buf(), file, |key| Some(format!("{key}-value"))).unwrap()
}

fn context(root: &Path, operator: Arc<dyn Operator>, cli: Arc<StubCli>) -> PhaseContext {
    PhaseContext {
        config: Arc::new(config(root, 2)),
        chat: Arc::new(ProseChat),
        images: Arc::new(StubImages),
        theme_cli: cli,
        operator,
        console: Console::quiet(),
    }
}

fn controller(root: &Path, operator: Arc<dyn Operator>, cli: Arc<StubCli>) -> SessionController {
    let ctx = context(root, operator, cli);
    let store = SessionStore::new(ctx.config.sessions_dir.clone());
    SessionController::new(store, PhaseRegistry::standard().unwrap(), ctx)
}

// =============================================================================
// Full sessions with the standard phases
// =============================================================================

mod full_flow {
    use super::*;

    #[tokio::test]
    async fn test_session_runs_every_phase_and_persists() {
        let dir = TempDir::new().unwrap();
        let cli = Arc::new(StubCli::default());
        let controller = controller(dir.path(), Arc::new(Driver::new(vec![], vec![])), cli.clone());
        let mut session = controller.store().create_session().unwrap();

        let report = controller.run_generation_flow(&mut session).await.unwrap();
        assert!(report.complete);
        assert_eq!(report.phases_run, PHASE_ORDER.to_vec());
        assert_eq!(session.completed_phases, PHASE_ORDER.to_vec());
        assert!(session.checkpoints.is_empty());

        assert_eq!(session.products.len(), 2);
        assert!(session.products.iter().all(|p| p.images.count() == 3));
        assert_eq!(session.sections.len(), 3);
        assert!(session.design_system.is_some());
        assert!(!session.theme_name.is_empty());

        let package = session.theme_package.as_ref().unwrap();
        assert!(package.theme_path.join("sections/header.liquid").exists());
        assert!(package.theme_path.join("config/settings_data.json").exists());
        assert!(package.excluded_steps.is_empty());

        assert!(session.test_results.iter().all(|r| r.passed));
        assert_eq!(*cli.deleted.lock().unwrap(), vec!["77".to_string()]);
        let assets = session.submission_assets.as_ref().unwrap();
        assert_eq!(
            assets.preview_url.as_deref(),
            Some("https://dev.myshopify.com/?preview_theme_id=77")
        );
        let docs = session.documentation.as_ref().unwrap();
        assert!(docs.documentation.exists());
        assert!(docs.checklist.exists());
        assert!(docs.report.exists());

        let reloaded = controller.store().load_session(&session.id).unwrap();
        assert_eq!(reloaded.completed_phases, session.completed_phases);
        assert_eq!(reloaded.theme_name, session.theme_name);
        assert_eq!(reloaded.approval_history.len(), session.approval_history.len());

        // A complete session returns immediately.
        let again = controller.run_generation_flow(&mut session).await.unwrap();
        assert!(again.complete);
        assert!(again.phases_run.is_empty());
    }

    #[tokio::test]
    async fn test_forced_skip_is_recorded_and_excluded_from_assembly() {
        let dir = TempDir::new().unwrap();
        let driver = Driver::new(vec!["header-code"], vec!["header-code"]);
        let controller = controller(dir.path(), Arc::new(driver), Arc::new(StubCli::default()));
        let mut session = controller.store().create_session().unwrap();

        controller.run_generation_flow(&mut session).await.unwrap();

        let history = session.step_history(Phase::Differentiation, "header-code");
        assert_eq!(history.len(), 3);
        assert!(history[..2].iter().all(|r| !r.accepted));
        assert_eq!(history[2].iteration, 3);
        assert_eq!(history[2].feedback.as_deref(), Some(SKIPPED_FEEDBACK));
        assert!(!session.was_step_accepted(Phase::Differentiation, "header-code"));

        let package = session.theme_package.as_ref().unwrap();
        assert!(package.excluded_steps.iter().any(|s| s == "header-code"));
        assert!(!package.theme_path.join("sections/header.liquid").exists());
        assert!(package.theme_path.join("sections/footer.liquid").exists());
    }

    #[tokio::test]
    async fn test_rewind_clears_later_work_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let controller = controller(
            dir.path(),
            Arc::new(Driver::new(vec![], vec![])),
            Arc::new(StubCli::default()),
        );
        let mut session = controller.store().create_session().unwrap();
        controller.run_generation_flow(&mut session).await.unwrap();

        reset_to_phase(&mut session, Phase::DesignSystem);
        assert_eq!(session.current_phase, Phase::DesignSystem);
        assert_eq!(
            session.completed_phases,
            vec![Phase::Brief, Phase::Products, Phase::Images, Phase::Differentiation]
        );
        assert!(session.design_system.is_none());
        assert!(session.theme_package.is_none());
        assert!(session.test_results.is_empty());
        assert!(session.test_theme_preview_url.is_none());
        assert!(session.submission_assets.is_none());
        assert!(session.documentation.is_none());
        assert!(session.brief.is_some());
        assert_eq!(session.products.len(), 2);
        assert!(!session.sections.is_empty());
        assert!(session.approval_history.iter().all(|r| r.phase < Phase::DesignSystem));

        let once = serde_json::to_value(&session).unwrap();
        reset_to_phase(&mut session, Phase::DesignSystem);
        assert_eq!(serde_json::to_value(&session).unwrap(), once);

        // Re-running from the rewind rebuilds everything after it.
        let report = controller.run_generation_flow(&mut session).await.unwrap();
        assert!(report.complete);
        assert_eq!(report.phases_run.first(), Some(&Phase::DesignSystem));
        assert!(session.design_system.is_some());
        assert!(session.documentation.is_some());
    }

    #[tokio::test]
    async fn test_every_step_resolves_at_most_once_and_acceptance_ends_it() {
        let dir = TempDir::new().unwrap();
        let driver = Driver::new(vec!["header-code", "market-analysis"], vec!["header-code"]);
        let controller = controller(dir.path(), Arc::new(driver), Arc::new(StubCli::default()));
        let mut session = controller.store().create_session().unwrap();
        controller.run_generation_flow(&mut session).await.unwrap();

        let mut steps: Vec<(Phase, String)> = session
            .approval_history
            .iter()
            .map(|r| (r.phase, r.step.clone()))
            .collect();
        steps.dedup();
        assert!(!steps.is_empty());
        for (phase, step) in &steps {
            let history = session.step_history(*phase, step);
            let accepted = history.iter().filter(|r| r.accepted).count();
            assert!(accepted <= 1, "{phase}/{step} accepted {accepted} times");
            if accepted == 1 {
                assert!(history.last().unwrap().accepted, "{phase}/{step} continued after acceptance");
            }
            let iterations: Vec<u32> = history.iter().map(|r| r.iteration).collect();
            let expected: Vec<u32> = (1..=history.len() as u32).collect();
            assert_eq!(iterations, expected, "{phase}/{step} iterations");
        }
        assert_eq!(session.step_history(Phase::Brief, "market-analysis").len(), 3);
    }

    /// Wraps a standard handler and records any field owned by this or a
    /// later phase that is already populated when the phase starts.
    struct FreshnessCheck {
        inner: Box<dyn PhaseHandler>,
        violations: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PhaseHandler for FreshnessCheck {
        fn phase(&self) -> Phase {
            self.inner.phase()
        }

        async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> anyhow::Result<()> {
            for phase in session.current_phase.remaining() {
                for field in owned_fields(*phase) {
                    if !field.is_empty(session) {
                        self.violations
                            .lock()
                            .unwrap()
                            .push(format!("{field} populated before {}", self.phase()));
                    }
                }
            }
            self.inner.run(ctx, session).await
        }
    }

    #[tokio::test]
    async fn test_phases_start_with_their_fields_empty() {
        let dir = TempDir::new().unwrap();
        let violations = Arc::new(Mutex::new(Vec::new()));
        let handlers: Vec<Box<dyn PhaseHandler>> = standard_handlers()
            .into_iter()
            .map(|inner| {
                Box::new(FreshnessCheck {
                    inner,
                    violations: violations.clone(),
                }) as Box<dyn PhaseHandler>
            })
            .collect();
        let ctx = context(
            dir.path(),
            Arc::new(Driver::new(vec![], vec![])),
            Arc::new(StubCli::default()),
        );
        let store = SessionStore::new(ctx.config.sessions_dir.clone());
        let controller = SessionController::new(store, PhaseRegistry::new(handlers).unwrap(), ctx);
        let mut session = controller.store().create_session().unwrap();

        controller.run_generation_flow(&mut session).await.unwrap();
        assert!(violations.lock().unwrap().is_empty(), "{:?}", violations.lock().unwrap());

        reset_to_phase(&mut session, Phase::Images);
        controller.run_generation_flow(&mut session).await.unwrap();
        assert!(violations.lock().unwrap().is_empty(), "{:?}", violations.lock().unwrap());
        assert!(session.is_complete());
    }
}

// =============================================================================
// Controller failure and resume with stub phases
// =============================================================================

mod resume {
    use super::*;

    struct StubPhase {
        phase: Phase,
        fail: Arc<AtomicBool>,
        runs: Arc<Mutex<Vec<Phase>>>,
    }

    #[async_trait]
    impl PhaseHandler for StubPhase {
        fn phase(&self) -> Phase {
            self.phase
        }

        async fn run(&self, _ctx: &PhaseContext, session: &mut SessionState) -> anyhow::Result<()> {
            self.runs.lock().unwrap().push(self.phase);
            if self.phase == Phase::Brief {
                session.theme_name = "Stub Theme".into();
            }
            if self.phase == Phase::Images && self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("image service unavailable");
            }
            Ok(())
        }
    }

    fn stub_phases(fail: &Arc<AtomicBool>, runs: &Arc<Mutex<Vec<Phase>>>) -> PhaseRegistry {
        let handlers: Vec<Box<dyn PhaseHandler>> = PHASE_ORDER
            .iter()
            .map(|&phase| {
                Box::new(StubPhase {
                    phase,
                    fail: fail.clone(),
                    runs: runs.clone(),
                }) as Box<dyn PhaseHandler>
            })
            .collect();
        PhaseRegistry::new(handlers).unwrap()
    }

    #[tokio::test]
    async fn test_failure_saves_position_and_resume_continues_there() {
        let dir = TempDir::new().unwrap();
        let fail = Arc::new(AtomicBool::new(true));
        let runs = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(
            dir.path(),
            Arc::new(ScriptedOperator::new(Vec::new())),
            Arc::new(StubCli::default()),
        );
        let store = SessionStore::new(ctx.config.sessions_dir.clone());
        let controller = SessionController::new(store, stub_phases(&fail, &runs), ctx);
        let mut session = controller.store().create_session().unwrap();

        let err = controller.run_generation_flow(&mut session).await.unwrap_err();
        match err {
            PhaseError::Failed { phase, .. } => assert_eq!(phase, Phase::Images),
            other => panic!("Expected a failed phase, got {other}"),
        }

        let mut saved = controller.store().load_session(&session.id).unwrap();
        assert_eq!(saved.current_phase, Phase::Images);
        assert_eq!(saved.completed_phases, vec![Phase::Brief, Phase::Products]);
        assert_eq!(saved.theme_name, "Stub Theme");

        fail.store(false, Ordering::SeqCst);
        runs.lock().unwrap().clear();
        let report = controller.run_generation_flow(&mut saved).await.unwrap();
        assert!(report.complete);
        assert_eq!(runs.lock().unwrap().first(), Some(&Phase::Images));
        assert_eq!(runs.lock().unwrap().len(), 6);
        assert_eq!(saved.completed_phases, PHASE_ORDER.to_vec());
    }

    #[tokio::test]
    async fn test_second_controller_on_same_session_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));
        let session = store.create_session().unwrap();

        let _held = store.lock(&session.id).unwrap();
        match store.lock(&session.id) {
            Err(SessionError::Locked { id }) => assert_eq!(id, session.id),
            other => panic!("Expected Locked, got {:?}", other.map(|_| ())),
        }
    }
}

// =============================================================================
// Approval loop
// =============================================================================

mod approval {
    use super::*;

    #[tokio::test]
    async fn test_revisions_feed_back_until_forced_skip() {
        let operator = ScriptedOperator::new([
            ScriptedAnswer::Revise("warmer palette".into()),
            ScriptedAnswer::Revise("less text".into()),
            ScriptedAnswer::Revise("bigger images".into()),
            ScriptedAnswer::Force(ForcedChoice::Skip),
        ]);
        let engine = ApprovalEngine::new(&operator, 3);
        let mut seen = Vec::new();

        let outcome = engine
            .run(
                Phase::Differentiation,
                "new-sections",
                &mut Vec::new(),
                |feedback: Option<String>| {
                    seen.push(feedback);
                    let draft = format!("draft-{}", seen.len());
                    async move { Ok::<_, anyhow::Error>(draft) }
                },
                |_: &String| {},
            )
            .await
            .unwrap();

        assert_eq!(outcome.resolution, Resolution::Skipped);
        assert_eq!(outcome.artifact, "draft-4");
        assert_eq!(outcome.rejected_rounds.len(), 3);
        assert_eq!(outcome.record.iteration, 4);
        assert_eq!(outcome.record.feedback.as_deref(), Some(SKIPPED_FEEDBACK));
        assert_eq!(
            seen,
            vec![
                None,
                Some("warmer palette".to_string()),
                Some("less text".to_string()),
                Some("bigger images".to_string()),
            ]
        );
        assert!(operator.is_drained());
    }

    #[tokio::test]
    async fn test_acceptance_on_first_round() {
        let operator = ScriptedOperator::new([ScriptedAnswer::Accept]);
        let engine = ApprovalEngine::new(&operator, 3);
        let outcome = engine
            .run(
                Phase::Brief,
                "market-analysis",
                &mut Vec::new(),
                |_| async { Ok::<_, anyhow::Error>("analysis".to_string()) },
                |_: &String| {},
            )
            .await
            .unwrap();
        assert_eq!(outcome.resolution, Resolution::Accepted);
        assert_eq!(outcome.record.iteration, 1);
        assert!(outcome.record.accepted);
        assert!(outcome.rejected_rounds.is_empty());
    }
}

// =============================================================================
// Binary
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        theme_builder()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("theme builder"));
    }

    #[test]
    fn test_version() {
        theme_builder().arg("--version").assert().success();
    }

    #[test]
    fn test_list_without_sessions() {
        let dir = TempDir::new().unwrap();
        theme_builder()
            .current_dir(dir.path())
            .arg("--root")
            .arg(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No sessions yet"));
    }

    #[test]
    fn test_missing_environment_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut cmd = theme_builder();
        cmd.current_dir(dir.path()).arg("--root").arg(dir.path());
        for key in theme_builder::config::REQUIRED_ENV_KEYS {
            cmd.env_remove(key);
        }
        cmd.assert()
            .failure()
            .stderr(predicate::str::contains("Missing required environment variables"))
            .stdout(predicate::str::contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_archive_unknown_session_fails() {
        let dir = TempDir::new().unwrap();
        theme_builder()
            .current_dir(dir.path())
            .args(["archive", "does-not-exist", "--root"])
            .arg(dir.path())
            .assert()
            .failure();
    }
}
