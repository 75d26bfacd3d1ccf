//! Shopify CLI integration: push, delete, and lint themes on the dev store.

use crate::config::ShopifySettings;
use crate::errors::GeneratorError;
use crate::session::state::Severity;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const PUSH_TIMEOUT: Duration = Duration::from_secs(300);
const DELETE_TIMEOUT: Duration = Duration::from_secs(60);
const CHECK_TIMEOUT: Duration = Duration::from_secs(120);

static THEME_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Theme ID:\s*#?(\d+)").expect("theme id pattern is valid"));
static PREVIEW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Preview:\s*(https?://\S+)").expect("preview pattern is valid"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThemePushResult {
    pub success: bool,
    pub theme_id: Option<String>,
    pub preview_url: Option<String>,
    pub editor_url: Option<String>,
    pub error: Option<String>,
}

impl ThemePushResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckIssue {
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThemeCheckReport {
    pub issues: Vec<CheckIssue>,
    /// Set when the check itself could not run.
    pub failure: Option<String>,
}

impl ThemeCheckReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &CheckIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CheckIssue> {
        self.issues.iter().filter(|i| i.severity != Severity::Error)
    }
}

/// Operations the testing and submission phases need from the store tooling.
#[async_trait]
pub trait ThemeCli: Send + Sync {
    async fn push_theme(&self, theme_path: &Path, theme_name: &str) -> ThemePushResult;

    /// Returns false when the theme could not be deleted; never fails the caller.
    async fn delete_theme(&self, theme_id: &str) -> bool;

    async fn run_theme_check(&self, theme_path: &Path) -> ThemeCheckReport;

    fn preview_url(&self, theme_id: &str) -> String;
}

pub struct ShopifyCli {
    program: String,
    store: String,
    token: String,
}

impl ShopifyCli {
    pub fn new(settings: &ShopifySettings) -> Self {
        Self {
            program: "shopify".to_string(),
            store: settings.dev_store.clone(),
            token: settings.cli_theme_token.clone(),
        }
    }

    async fn run(
        &self,
        args: &[String],
        limit: Duration,
    ) -> Result<std::process::Output, GeneratorError> {
        let operation = format!("{} {}", self.program, args.first().map(String::as_str).unwrap_or(""));
        tracing::debug!(%operation, ?args, "Running Shopify CLI");

        let child = Command::new(&self.program)
            .args(args)
            .env("SHOPIFY_CLI_THEME_TOKEN", &self.token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GeneratorError::Io {
                path: self.program.clone().into(),
                source,
            })?;

        match timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| GeneratorError::Io {
                path: self.program.clone().into(),
                source,
            }),
            Err(_) => Err(GeneratorError::Timeout {
                operation,
                seconds: limit.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl ThemeCli for ShopifyCli {
    async fn push_theme(&self, theme_path: &Path, theme_name: &str) -> ThemePushResult {
        let args = vec![
            "theme".to_string(),
            "push".to_string(),
            theme_path.display().to_string(),
            "--unpublished".to_string(),
            format!("--store={}", self.store),
            format!("--theme={theme_name}"),
            "--json".to_string(),
        ];
        let output = match self.run(&args, PUSH_TIMEOUT).await {
            Ok(output) => output,
            Err(e) => return ThemePushResult::failed(e.to_string()),
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return ThemePushResult::failed(format!(
                "theme push exited with {}: {}",
                output.status.code().unwrap_or(-1),
                crate::util::truncate(stderr.trim(), 500)
            ));
        }
        let mut result = parse_push_output(&stdout)
            .unwrap_or_else(|| ThemePushResult::failed("Could not parse theme push output"));
        if result.success && result.preview_url.is_none() {
            result.preview_url = result.theme_id.as_deref().map(|id| self.preview_url(id));
        }
        tracing::info!(theme_id = ?result.theme_id, success = result.success, "Theme pushed");
        result
    }

    async fn delete_theme(&self, theme_id: &str) -> bool {
        let args = vec![
            "theme".to_string(),
            "delete".to_string(),
            format!("--theme={theme_id}"),
            format!("--store={}", self.store),
            "--force".to_string(),
        ];
        match self.run(&args, DELETE_TIMEOUT).await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::warn!(
                    theme_id,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Theme delete failed"
                );
                false
            }
            Err(e) => {
                tracing::warn!(theme_id, error = %e, "Theme delete failed");
                false
            }
        }
    }

    async fn run_theme_check(&self, theme_path: &Path) -> ThemeCheckReport {
        let args = vec![
            "theme".to_string(),
            "check".to_string(),
            "--path".to_string(),
            theme_path.display().to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        match self.run(&args, CHECK_TIMEOUT).await {
            // theme check exits non-zero when it finds errors; the JSON is still on stdout
            Ok(output) => parse_theme_check_output(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => ThemeCheckReport {
                issues: Vec::new(),
                failure: Some(e.to_string()),
            },
        }
    }

    fn preview_url(&self, theme_id: &str) -> String {
        format!("https://{}/?preview_theme_id={}", self.store, theme_id)
    }
}

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    theme: PushedTheme,
}

#[derive(Debug, Deserialize)]
struct PushedTheme {
    id: serde_json::Value,
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(default)]
    editor_url: Option<String>,
}

/// Interpret `theme push` output: JSON first, then the human-readable lines.
pub fn parse_push_output(stdout: &str) -> Option<ThemePushResult> {
    let json = crate::util::extract_json_object(stdout);
    if let Some(envelope) = json.and_then(|j| serde_json::from_str::<PushEnvelope>(&j).ok()) {
        let theme_id = match envelope.theme.id {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        return Some(ThemePushResult {
            success: true,
            theme_id,
            preview_url: envelope.theme.preview_url,
            editor_url: envelope.theme.editor_url,
            error: None,
        });
    }

    let theme_id = THEME_ID_RE
        .captures(stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())?;
    let preview_url = PREVIEW_RE
        .captures(stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Some(ThemePushResult {
        success: true,
        theme_id: Some(theme_id),
        preview_url,
        editor_url: None,
        error: None,
    })
}

#[derive(Debug, Deserialize)]
struct RawOffense {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    severity: serde_json::Value,
    #[serde(default)]
    offenses: Vec<RawOffense>,
}

fn severity_of(value: &serde_json::Value) -> Severity {
    match value {
        serde_json::Value::String(s) if s.eq_ignore_ascii_case("error") => Severity::Error,
        serde_json::Value::String(s) if s.eq_ignore_ascii_case("info") => Severity::Info,
        serde_json::Value::Number(n) if n.as_u64() == Some(0) => Severity::Error,
        serde_json::Value::Number(n) if n.as_u64() == Some(2) => Severity::Info,
        _ => Severity::Warning,
    }
}

/// Interpret `theme check` JSON. Accepts a flat list of offenses or a list of
/// files each carrying `offenses`. Output without JSON means no issues.
pub fn parse_theme_check_output(stdout: &str) -> ThemeCheckReport {
    let Some(json) = crate::util::extract_json_array(stdout) else {
        return ThemeCheckReport::default();
    };
    let Ok(entries) = serde_json::from_str::<Vec<RawOffense>>(&json) else {
        return ThemeCheckReport::default();
    };

    let mut issues = Vec::new();
    for entry in entries {
        if entry.offenses.is_empty() {
            if !entry.message.is_empty() {
                issues.push(CheckIssue {
                    path: entry.path.unwrap_or_default(),
                    message: entry.message,
                    severity: severity_of(&entry.severity),
                });
            }
            continue;
        }
        let file = entry.path.unwrap_or_default();
        for offense in entry.offenses {
            issues.push(CheckIssue {
                path: offense.path.unwrap_or_else(|| file.clone()),
                message: offense.message,
                severity: severity_of(&offense.severity),
            });
        }
    }
    ThemeCheckReport {
        issues,
        failure: None,
    }
}
