//! Chat-completion seam used by every phase that generates text or code.

pub mod openrouter;
pub mod retry;

pub use openrouter::OpenRouterClient;
pub use retry::{RetryPolicy, with_retries};

use crate::errors::GeneratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Selects the model profile: creative planning or deterministic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Planning,
    Coding,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, messages: &[Message], task: TaskType) -> Result<String, GeneratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_with_lowercase_role() {
        let json = serde_json::to_value(Message::system("be terse")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be terse");
    }
}
