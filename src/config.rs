//! Runtime configuration.
//!
//! Secrets come from the environment (a `.env` file is loaded at startup).
//! Tunables come from an optional `builder.toml` under the builder home:
//!
//! ```toml
//! [generation]
//! products_count = 20
//! new_sections = 4
//! modified_sections = 4
//! angles_per_product = 4
//! lifestyle_per_product = 3
//! max_approval_iterations = 10
//!
//! [models.planning]
//! id = "anthropic/claude-sonnet-4"
//! temperature = 0.7
//! max_tokens = 4096
//!
//! [theme]
//! base_theme_dir = "./dawn"
//! ```

use crate::ai::TaskType;
use crate::approval::DEFAULT_MAX_ITERATIONS;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const REQUIRED_ENV_KEYS: [&str; 4] = [
    "OPENROUTER_API_KEY",
    "REPLICATE_API_TOKEN",
    "SHOPIFY_CLI_THEME_TOKEN",
    "SHOPIFY_DEV_STORE",
];

pub const HOME_ENV: &str = "THEME_BUILDER_HOME";
pub const AUTO_APPROVE_ENV: &str = "THEME_BUILDER_AUTO_APPROVE";
pub const CONFIG_FILE_NAME: &str = "builder.toml";

const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_REPLICATE_BASE_URL: &str = "https://api.replicate.com/v1";
const DEFAULT_IMAGE_MODEL: &str = "black-forest-labs/flux-1.1-pro";

fn default_products_count() -> usize {
    20
}

fn default_new_sections() -> usize {
    4
}

fn default_modified_sections() -> usize {
    4
}

fn default_angles() -> usize {
    4
}

fn default_lifestyle() -> usize {
    3
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_products_count")]
    pub products_count: usize,
    #[serde(default = "default_new_sections")]
    pub new_sections: usize,
    #[serde(default = "default_modified_sections")]
    pub modified_sections: usize,
    #[serde(default = "default_angles")]
    pub angles_per_product: usize,
    #[serde(default = "default_lifestyle")]
    pub lifestyle_per_product: usize,
    #[serde(default = "default_max_iterations")]
    pub max_approval_iterations: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            products_count: default_products_count(),
            new_sections: default_new_sections(),
            modified_sections: default_modified_sections(),
            angles_per_product: default_angles(),
            lifestyle_per_product: default_lifestyle(),
            max_approval_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub id: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

fn default_planning_model() -> ModelSettings {
    ModelSettings {
        id: "anthropic/claude-sonnet-4".to_string(),
        temperature: 0.7,
        max_tokens: 4096,
    }
}

fn default_coding_model() -> ModelSettings {
    ModelSettings {
        id: "anthropic/claude-sonnet-4".to_string(),
        temperature: 0.2,
        max_tokens: 8192,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTable {
    #[serde(default = "default_planning_model")]
    pub planning: ModelSettings,
    #[serde(default = "default_coding_model")]
    pub coding: ModelSettings,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            planning: default_planning_model(),
            coding: default_coding_model(),
        }
    }
}

impl ModelTable {
    pub fn for_task(&self, task: TaskType) -> &ModelSettings {
        match task {
            TaskType::Planning => &self.planning,
            TaskType::Coding => &self.coding,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeSettings {
    /// Stock theme copied under the generated files, when present.
    #[serde(default)]
    pub base_theme_dir: Option<PathBuf>,
}

/// The `builder.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuilderToml {
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub models: ModelTable,
    #[serde(default)]
    pub theme: ThemeSettings,
}

impl BuilderToml {
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `builder.toml` from `root`, falling back to defaults when absent.
    pub fn load_or_default(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content, &path)
    }
}

#[derive(Debug, Clone)]
pub struct OpenRouterSettings {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ReplicateSettings {
    pub api_token: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ShopifySettings {
    pub cli_theme_token: String,
    pub dev_store: String,
}

/// Everything the builder needs at runtime.
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub sessions_dir: PathBuf,
    pub output_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub log_dir: PathBuf,
    pub openrouter: OpenRouterSettings,
    pub replicate: ReplicateSettings,
    pub shopify: ShopifySettings,
    pub generation: GenerationSettings,
    pub models: ModelTable,
    pub theme: ThemeSettings,
    pub auto_approve: bool,
}

impl Config {
    /// The builder home: `THEME_BUILDER_HOME` or the current directory.
    pub fn root_from_env() -> PathBuf {
        std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Session records live here; usable before the environment is validated.
    pub fn sessions_dir_for(root: &Path) -> PathBuf {
        root.join("sessions")
    }

    pub fn log_dir_for(root: &Path) -> PathBuf {
        root.join("logs")
    }

    /// Load from the process environment and `<root>/builder.toml`.
    pub fn load(root: PathBuf) -> Result<Self, ConfigError> {
        let file = BuilderToml::load_or_default(&root)?;
        Self::from_lookup(root, file, |key| std::env::var(key).ok())
    }

    /// Required keys that `lookup` cannot resolve to a non-empty value.
    pub fn missing_keys(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        REQUIRED_ENV_KEYS
            .iter()
            .copied()
            .filter(|key| lookup(key).is_none_or(|v| v.trim().is_empty()))
            .map(|key| key.to_string())
            .collect()
    }

    pub fn from_lookup(
        root: PathBuf,
        file: BuilderToml,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let missing = Self::missing_keys(&lookup);
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys { keys: missing });
        }
        let required = |key: &str| lookup(key).unwrap_or_default();
        let optional = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let auto_approve = lookup(AUTO_APPROVE_ENV)
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let mut theme = file.theme;
        if let Some(dir) = theme.base_theme_dir.take() {
            theme.base_theme_dir = Some(if dir.is_absolute() { dir } else { root.join(dir) });
        }

        Ok(Self {
            sessions_dir: Self::sessions_dir_for(&root),
            output_dir: root.join("output"),
            prompts_dir: root.join("prompts"),
            log_dir: Self::log_dir_for(&root),
            openrouter: OpenRouterSettings {
                api_key: required("OPENROUTER_API_KEY"),
                base_url: optional("OPENROUTER_BASE_URL", DEFAULT_OPENROUTER_BASE_URL),
            },
            replicate: ReplicateSettings {
                api_token: required("REPLICATE_API_TOKEN"),
                base_url: optional("REPLICATE_BASE_URL", DEFAULT_REPLICATE_BASE_URL),
                model: optional("REPLICATE_MODEL", DEFAULT_IMAGE_MODEL),
            },
            shopify: ShopifySettings {
                cli_theme_token: required("SHOPIFY_CLI_THEME_TOKEN"),
                dev_store: required("SHOPIFY_DEV_STORE"),
            },
            generation: file.generation,
            models: file.models,
            theme,
            auto_approve,
            root,
        })
    }

    /// Per-session output directory.
    pub fn session_output_dir(&self, output_name: &str) -> PathBuf {
        self.output_dir.join(output_name)
    }

    /// A prompt template override from the prompts directory, if one exists.
    pub fn prompt_template(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.prompts_dir.join(name)).ok()
    }
}
