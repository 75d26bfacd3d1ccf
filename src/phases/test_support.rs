//! Stub services for exercising phases without network or CLI access.

use crate::ai::{ChatClient, Message, TaskType};
use crate::approval::ScriptedOperator;
use crate::config::{BuilderToml, Config};
use crate::context::PhaseContext;
use crate::errors::GeneratorError;
use crate::images::{ImageGenerator, ImageKind, ImageResult};
use crate::operator::Operator;
use crate::shopify::{ThemeCheckReport, ThemeCli, ThemePushResult};
use crate::ui::Console;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Replays queued responses, then repeats `fallback`.
pub struct StubChat {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl StubChat {
    pub fn new(responses: impl IntoIterator<Item = String>, fallback: &str) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            fallback: fallback.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: &str) -> Self {
        Self::new([], text)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for StubChat {
    async fn chat(&self, messages: &[Message], _task: TaskType) -> Result<String, GeneratorError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Succeeds with a fake URL per call; downloads write a small placeholder file.
#[derive(Default)]
pub struct StubImages {
    pub fail: bool,
    pub generated: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageGenerator for StubImages {
    async fn generate(&self, prompt: &str, kind: ImageKind, variant: Option<&str>) -> ImageResult {
        let mut generated = self.generated.lock().unwrap();
        generated.push(prompt.to_string());
        let (image_url, error) = if self.fail {
            (None, Some("generation disabled".to_string()))
        } else {
            (Some(format!("https://img.test/{}.png", generated.len())), None)
        };
        ImageResult {
            kind,
            variant: variant.map(str::to_string),
            prompt: prompt.to_string(),
            image_url,
            error,
        }
    }

    async fn download(&self, _url: &str, dest: &Path) -> Result<(), GeneratorError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| GeneratorError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(dest, b"png").map_err(|source| GeneratorError::Io {
            path: dest.to_path_buf(),
            source,
        })
    }
}

pub struct StubCli {
    pub push: ThemePushResult,
    pub check: ThemeCheckReport,
    pub deleted: Mutex<Vec<String>>,
    pub pushed: Mutex<Vec<PathBuf>>,
}

impl Default for StubCli {
    fn default() -> Self {
        Self {
            push: ThemePushResult {
                success: true,
                theme_id: Some("1001".into()),
                preview_url: Some("https://dev.myshopify.com/?preview_theme_id=1001".into()),
                editor_url: None,
                error: None,
            },
            check: ThemeCheckReport::default(),
            deleted: Mutex::new(Vec::new()),
            pushed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ThemeCli for StubCli {
    async fn push_theme(&self, theme_path: &Path, _theme_name: &str) -> ThemePushResult {
        self.pushed.lock().unwrap().push(theme_path.to_path_buf());
        self.push.clone()
    }

    async fn delete_theme(&self, theme_id: &str) -> bool {
        self.deleted.lock().unwrap().push(theme_id.to_string());
        true
    }

    async fn run_theme_check(&self, _theme_path: &Path) -> ThemeCheckReport {
        self.check.clone()
    }

    fn preview_url(&self, theme_id: &str) -> String {
        format!("https://dev.myshopify.com/?preview_theme_id={theme_id}")
    }
}

pub fn config(root: &Path, max_iterations: u32) -> Config {
    let vars = [
        ("OPENROUTER_API_KEY", "k"),
        ("REPLICATE_API_TOKEN", "t"),
        ("SHOPIFY_CLI_THEME_TOKEN", "s"),
        ("SHOPIFY_DEV_STORE", "dev.myshopify.com"),
    ];
    let mut file = BuilderToml::default();
    file.generation.max_approval_iterations = max_iterations;
    file.generation.products_count = 2;
    file.generation.new_sections = 1;
    file.generation.modified_sections = 1;
    file.generation.angles_per_product = 1;
    file.generation.lifestyle_per_product = 1;
    Config::from_lookup(root.to_path_buf(), file, |k| {
        vars.iter()
            .find(|(key, _)| *key == k)
            .map(|(_, v)| v.to_string())
    })
    .unwrap()
}

pub fn context(
    root: &Path,
    chat: Arc<StubChat>,
    operator: Arc<dyn Operator>,
) -> PhaseContext {
    PhaseContext {
        config: Arc::new(config(root, 3)),
        chat,
        images: Arc::new(StubImages::default()),
        theme_cli: Arc::new(StubCli::default()),
        operator,
        console: Console::quiet(),
    }
}

pub fn scripted(
    answers: impl IntoIterator<Item = crate::approval::ScriptedAnswer>,
) -> Arc<ScriptedOperator> {
    Arc::new(ScriptedOperator::new(answers))
}
