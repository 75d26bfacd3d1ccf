//! Product photography generation.

pub mod replicate;

pub use replicate::ReplicateClient;

use crate::errors::GeneratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ANGLE_VARIANTS: [&str; 4] = ["front", "side", "detail", "flat-lay"];
pub const LIFESTYLE_VARIANTS: [&str; 3] = ["in-use", "environment", "styled"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Studio,
    Angle,
    Lifestyle,
}

/// One generation attempt. Failures are data, not errors, so a batch can continue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub kind: ImageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageResult {
    pub fn succeeded(&self) -> bool {
        self.image_url.is_some()
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, kind: ImageKind, variant: Option<&str>) -> ImageResult;

    async fn download(&self, url: &str, dest: &Path) -> Result<(), GeneratorError>;
}

/// Prompt for the hero studio shot.
pub fn studio_prompt(name: &str, description: &str, style: &str, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "Professional e-commerce studio photograph of {name}. {description}. \
         Clean seamless white background, soft diffused lighting, sharp focus, \
         {style} aesthetic, high resolution product photography."
    );
    if let Some(feedback) = feedback {
        prompt.push_str(&format!(" Adjustments: {feedback}."));
    }
    prompt
}

pub fn angle_prompt(name: &str, style: &str, variant: &str) -> String {
    let framing = match variant {
        "front" => "straight-on front view",
        "side" => "three-quarter side view",
        "detail" => "close-up detail shot showing texture and materials",
        _ => "overhead flat-lay arrangement",
    };
    format!(
        "E-commerce product photograph of {name}, {framing}, neutral background, \
         consistent studio lighting, {style} aesthetic."
    )
}

pub fn lifestyle_prompt(name: &str, style: &str, target_market: &str, variant: &str) -> String {
    let scene = match variant {
        "in-use" => "being used naturally by a person",
        "environment" => "placed in a realistic home environment",
        _ => "in an editorial styled scene with complementary props",
    };
    format!(
        "Lifestyle photograph of {name} {scene}, appealing to {target_market}, \
         natural light, {style} aesthetic, magazine quality."
    )
}
