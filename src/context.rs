//! Services handed to every phase handler.

use crate::ai::ChatClient;
use crate::approval::ApprovalEngine;
use crate::config::Config;
use crate::images::ImageGenerator;
use crate::operator::Operator;
use crate::shopify::ThemeCli;
use crate::ui::Console;
use std::path::PathBuf;
use std::sync::Arc;

/// Explicitly constructed collaborators. Production wiring lives in `main`;
/// tests swap in stubs and a scripted operator.
#[derive(Clone)]
pub struct PhaseContext {
    pub config: Arc<Config>,
    pub chat: Arc<dyn ChatClient>,
    pub images: Arc<dyn ImageGenerator>,
    pub theme_cli: Arc<dyn ThemeCli>,
    pub operator: Arc<dyn Operator>,
    pub console: Console,
}

impl PhaseContext {
    pub fn approval_engine(&self) -> ApprovalEngine<'_> {
        ApprovalEngine::new(
            self.operator.as_reviewer(),
            self.config.generation.max_approval_iterations,
        )
    }

    /// `output/<theme>` for the given session output name.
    pub fn output_dir(&self, output_name: &str) -> PathBuf {
        self.config.session_output_dir(output_name)
    }
}
