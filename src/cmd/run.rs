//! The interactive generation flow: pick or create a session, then run phases to the end.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use theme_builder::ai::OpenRouterClient;
use theme_builder::approval::AutoApprove;
use theme_builder::config::Config;
use theme_builder::context::PhaseContext;
use theme_builder::controller::{PhaseRegistry, SessionController};
use theme_builder::images::ReplicateClient;
use theme_builder::operator::{Operator, Prompter};
use theme_builder::errors::SessionError;
use theme_builder::session::{
    ResumeChoice, SessionLock, SessionState, SessionStore, apply_resume_choice,
};
use theme_builder::shopify::ShopifyCli;
use theme_builder::ui::{Console, TerminalOperator};

pub async fn cmd_run(root: PathBuf, yes: bool, session_id: Option<String>) -> Result<()> {
    let config = Config::load(root)?;
    let console = Console::new();
    console.banner(
        "Shopify Theme Builder",
        "Human-in-the-loop theme generation with approval at every step",
    );

    let operator: Arc<dyn Operator> = if yes || config.auto_approve {
        console.warning("Auto-approve mode: every artifact is accepted as generated");
        Arc::new(AutoApprove)
    } else {
        Arc::new(TerminalOperator::new(console.clone()))
    };

    let chat = OpenRouterClient::new(&config.openrouter, config.models.clone())
        .context("Failed to build the completion client")?;
    let images =
        ReplicateClient::new(&config.replicate).context("Failed to build the image client")?;
    let theme_cli = ShopifyCli::new(&config.shopify);

    let store = SessionStore::new(config.sessions_dir.clone());
    // The lock is taken before the session is read and held until the run ends.
    let (lock, mut session) = match session_id {
        Some(id) => {
            let lock = store.lock(&id)?;
            let session = store.load_session(&id)?;
            let session = prepare_resume(&store, operator.as_ref(), &console, &lock, session)?;
            (lock, session)
        }
        None => pick_session(&store, operator.as_ref(), &console)?,
    };

    let ctx = PhaseContext {
        config: Arc::new(config),
        chat: Arc::new(chat),
        images: Arc::new(images),
        theme_cli: Arc::new(theme_cli),
        operator,
        console: console.clone(),
    };
    let controller = SessionController::new(store, PhaseRegistry::standard()?, ctx);

    let report = controller.run_locked(&lock, &mut session).await?;
    if report.complete {
        console.success("All phases complete");
        console.path(
            "Output",
            &controller.context().output_dir(&session.output_name()),
        );
    }
    tracing::info!(
        session_id = %report.session_id,
        phases = report.phases_run.len(),
        complete = report.complete,
        "Generation flow finished"
    );
    Ok(())
}

/// Offer a new session or any stored one; stored sessions can also be archived here.
/// The returned session was read while holding its lock.
fn pick_session(
    store: &SessionStore,
    operator: &dyn Operator,
    console: &Console,
) -> Result<(SessionLock, SessionState)> {
    loop {
        let sessions = store.list_sessions()?;
        if sessions.is_empty() {
            return new_session(store);
        }

        let mut items = vec!["Start a new session".to_string()];
        items.extend(sessions.iter().map(|s| s.label()));
        let choice = operator.select("Select a session", &items, 0)?;
        let Some(summary) = choice.checked_sub(1).and_then(|i| sessions.get(i)) else {
            return new_session(store);
        };

        let actions = ["Resume".to_string(), "Archive".to_string(), "Back".to_string()];
        match operator.select(&format!("Session {}", summary.id), &actions, 0)? {
            0 => {
                let lock = match store.lock(&summary.id) {
                    Ok(lock) => lock,
                    Err(SessionError::Locked { id }) => {
                        console.warning(&format!("Session {id} is in use by another process"));
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                let session = store.load_session(&summary.id)?;
                let session = prepare_resume(store, operator, console, &lock, session)?;
                return Ok((lock, session));
            }
            1 => match store.archive_session(&summary.id) {
                Ok(target) => console.path("Archived to", &target),
                Err(SessionError::Locked { id }) => {
                    console.warning(&format!("Session {id} is in use and was not archived"));
                }
                Err(e) => return Err(e.into()),
            },
            _ => {}
        }
    }
}

fn new_session(store: &SessionStore) -> Result<(SessionLock, SessionState)> {
    let session = store.create_session()?;
    let lock = store.lock(&session.id)?;
    Ok((lock, session))
}

/// Show where the session stands and apply the operator's resume choice.
/// A rewind is saved under `lock`, which the caller holds for the whole run.
fn prepare_resume(
    store: &SessionStore,
    operator: &dyn Operator,
    console: &Console,
    lock: &SessionLock,
    mut session: SessionState,
) -> Result<SessionState> {
    debug_assert_eq!(lock.id(), session.id);
    console.session_info(&session);
    if session.is_complete() {
        console.success("This session has completed every phase");
        return Ok(session);
    }

    let options = ResumeChoice::options_for(&session);
    let labels: Vec<String> = options.iter().map(|o| o.label(&session)).collect();
    let index = operator.select("How do you want to continue?", &labels, 0)?;
    let choice = options.get(index).copied().unwrap_or(ResumeChoice::Continue);
    if apply_resume_choice(&mut session, choice) {
        tracing::info!(session_id = %session.id, phase = %session.current_phase, ?choice, "Session rewound");
        store.save_session(&mut session)?;
    }
    Ok(session)
}
