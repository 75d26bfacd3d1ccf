//! The persisted session record and the artifact types it carries.

use crate::phase::{PHASE_ORDER, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeBrief {
    pub industry: String,
    pub target_market: String,
    pub style_direction: String,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positioning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default)]
    pub inventory: u32,
}

/// Local paths of the images generated for one product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub studio: Option<String>,
    #[serde(default)]
    pub angles: Vec<String>,
    #[serde(default)]
    pub lifestyle: Vec<String>,
}

impl ProductImages {
    pub fn is_empty(&self) -> bool {
        self.studio.is_none() && self.angles.is_empty() && self.lifestyle.is_empty()
    }

    pub fn count(&self) -> usize {
        usize::from(self.studio.is_some()) + self.angles.len() + self.lifestyle.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<f64>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub images: ProductImages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub path: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub product_count: usize,
    pub image_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    New,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionProposal {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SectionKind,
    pub concept: String,
    #[serde(default)]
    pub functionality: String,
    #[serde(default)]
    pub unique_features: Vec<String>,
}

/// One generated theme file, keyed by its path relative to the theme root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeArtifact {
    pub step: String,
    pub path: String,
    pub content: String,
    /// True when the step was force-skipped; skipped artifacts never reach the theme.
    #[serde(default)]
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorScheme {
    pub name: String,
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub background: String,
    pub text: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypographyConfig {
    pub heading_font: String,
    pub body_font: String,
    pub heading_weight: u32,
    pub body_weight: u32,
    pub base_size_px: u32,
    pub scale_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacingConfig {
    pub base_unit_px: u32,
    pub section_padding_px: u32,
    pub grid_gap_px: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CornerStyle {
    Sharp,
    Rounded,
    Pill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    Filled,
    Outline,
    Ghost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonConfig {
    pub style: ButtonStyle,
    pub radius_px: u32,
    pub padding_x_px: u32,
    pub padding_y_px: u32,
    #[serde(default)]
    pub uppercase: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignSystem {
    pub color_schemes: Vec<ColorScheme>,
    pub default_scheme: usize,
    pub typography: TypographyConfig,
    pub spacing: SpacingConfig,
    pub corners: CornerStyle,
    pub buttons: ButtonConfig,
}

impl DesignSystem {
    pub fn selected_scheme(&self) -> Option<&ColorScheme> {
        self.color_schemes
            .get(self.default_scheme)
            .or_else(|| self.color_schemes.first())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemePackage {
    pub theme_path: PathBuf,
    pub assembled_at: DateTime<Utc>,
    #[serde(default)]
    pub new_files: Vec<String>,
    #[serde(default)]
    pub modified_files: Vec<String>,
    /// Steps whose artifacts were left out because the operator skipped them.
    #[serde(default)]
    pub excluded_steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub category: String,
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAssets {
    pub theme_name: String,
    pub prepared_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub key_features: Vec<String>,
    pub differentiation_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationPaths {
    pub documentation: PathBuf,
    pub checklist: PathBuf,
    pub report: PathBuf,
}

/// The outcome of one round of the approval loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub phase: Phase,
    pub step: String,
    pub iteration: u32,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A resolved step inside a phase that has not committed yet.
///
/// Re-entering the phase after a failure reuses the artifact instead of
/// negotiating the step again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCheckpoint {
    pub phase: Phase,
    pub step: String,
    pub artifact: serde_json::Value,
    #[serde(default)]
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: String,
    #[serde(default)]
    pub theme_name: String,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub current_phase: Phase,
    #[serde(default)]
    pub completed_phases: Vec<Phase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<ThemeBrief>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_manifest: Option<ImageManifest>,
    #[serde(default)]
    pub sections: Vec<SectionProposal>,
    #[serde(default)]
    pub generated_code: Vec<CodeArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_system: Option<DesignSystem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_package: Option<ThemePackage>,
    #[serde(default)]
    pub test_results: Vec<TestResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_theme_preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_assets: Option<SubmissionAssets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_theme_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<DocumentationPaths>,

    #[serde(default)]
    pub approval_history: Vec<ApprovalRecord>,
    #[serde(default)]
    pub checkpoints: Vec<StepCheckpoint>,
}

/// Lightweight listing entry for the session picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    #[serde(default)]
    pub theme_name: String,
    pub current_phase: Phase,
    #[serde(default)]
    pub completed_phases: Vec<Phase>,
    pub last_updated_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn label(&self) -> String {
        let name = if self.theme_name.is_empty() {
            "Untitled"
        } else {
            &self.theme_name
        };
        format!(
            "{} - {} ({}/{} phases, updated {})",
            name,
            self.current_phase.title(),
            self.completed_phases.len(),
            PHASE_ORDER.len(),
            self.last_updated_at.format("%Y-%m-%d %H:%M")
        )
    }
}

impl SessionState {
    /// A fresh session positioned at the first phase with every payload empty.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            theme_name: String::new(),
            started_at: now,
            last_updated_at: now,
            current_phase: Phase::first(),
            completed_phases: Vec::new(),
            brief: None,
            products: Vec::new(),
            image_manifest: None,
            sections: Vec::new(),
            generated_code: Vec::new(),
            design_system: None,
            theme_package: None,
            test_results: Vec::new(),
            test_theme_preview_url: None,
            submission_assets: None,
            submission_theme_id: None,
            documentation: None,
            approval_history: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            theme_name: self.theme_name.clone(),
            current_phase: self.current_phase,
            completed_phases: self.completed_phases.clone(),
            last_updated_at: self.last_updated_at,
        }
    }

    /// Directory name used under the output root for this session's files.
    pub fn output_name(&self) -> String {
        let slug = crate::util::slugify(&self.theme_name);
        if slug.is_empty() { self.id.clone() } else { slug }
    }

    pub fn is_completed(&self, phase: Phase) -> bool {
        self.completed_phases.contains(&phase)
    }

    /// True once every phase has committed.
    pub fn is_complete(&self) -> bool {
        PHASE_ORDER.iter().all(|p| self.is_completed(*p))
    }

    /// Record that `phase` committed, keeping `completed_phases` in workflow order.
    pub fn mark_completed(&mut self, phase: Phase) {
        if !self.is_completed(phase) {
            self.completed_phases.push(phase);
            self.completed_phases.sort();
        }
    }

    pub fn phase_history(&self, phase: Phase) -> Vec<&ApprovalRecord> {
        self.approval_history
            .iter()
            .filter(|r| r.phase == phase)
            .collect()
    }

    pub fn step_history(&self, phase: Phase, step: &str) -> Vec<&ApprovalRecord> {
        self.approval_history
            .iter()
            .filter(|r| r.phase == phase && r.step == step)
            .collect()
    }

    pub fn was_step_accepted(&self, phase: Phase, step: &str) -> bool {
        self.approval_history
            .iter()
            .any(|r| r.phase == phase && r.step == step && r.accepted)
    }

    /// The record that ended the step's loop, if it ended: an accept or a forced skip.
    pub fn resolved_step(&self, phase: Phase, step: &str) -> Option<&ApprovalRecord> {
        self.approval_history
            .iter()
            .rev()
            .find(|r| r.phase == phase && r.step == step)
            .filter(|r| {
                r.accepted
                    || r.feedback.as_deref() == Some(crate::approval::SKIPPED_FEEDBACK)
            })
    }

    pub fn checkpoint(&self, phase: Phase, step: &str) -> Option<&StepCheckpoint> {
        self.checkpoints
            .iter()
            .find(|c| c.phase == phase && c.step == step)
    }

    pub fn set_checkpoint(&mut self, checkpoint: StepCheckpoint) {
        self.checkpoints
            .retain(|c| !(c.phase == checkpoint.phase && c.step == checkpoint.step));
        self.checkpoints.push(checkpoint);
    }

    pub fn clear_checkpoints(&mut self, phase: Phase) {
        self.checkpoints.retain(|c| c.phase != phase);
    }

    /// Drop every record and checkpoint of one step so it can be negotiated from scratch.
    pub fn forget_step(&mut self, phase: Phase, step: &str) {
        self.approval_history
            .retain(|r| !(r.phase == phase && r.step == step));
        self.checkpoints
            .retain(|c| !(c.phase == phase && c.step == step));
    }

    /// Insert or replace a generated file, keyed by its theme-relative path.
    pub fn upsert_code(&mut self, artifact: CodeArtifact) {
        match self
            .generated_code
            .iter_mut()
            .find(|existing| existing.path == artifact.path)
        {
            Some(existing) => *existing = artifact,
            None => self.generated_code.push(artifact),
        }
    }

    /// Replace every section proposal of `kind` with `sections`.
    pub fn replace_sections(&mut self, kind: SectionKind, sections: Vec<SectionProposal>) {
        self.sections.retain(|s| s.kind != kind);
        self.sections.extend(sections);
    }

    pub fn sections_of(&self, kind: SectionKind) -> impl Iterator<Item = &SectionProposal> {
        self.sections.iter().filter(move |s| s.kind == kind)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(phase: Phase, step: &str, iteration: u32, accepted: bool) -> ApprovalRecord {
        ApprovalRecord {
            phase,
            step: step.to_string(),
            iteration,
            accepted,
            feedback: (!accepted).then(|| "more contrast".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_new_session_starts_at_first_phase() {
        let session = SessionState::new();
        assert_eq!(session.current_phase, Phase::Brief);
        assert!(session.completed_phases.is_empty());
        assert!(session.brief.is_none());
        assert!(session.approval_history.is_empty());
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn test_mark_completed_is_ordered_and_deduplicated() {
        let mut session = SessionState::new();
        session.mark_completed(Phase::Products);
        session.mark_completed(Phase::Brief);
        session.mark_completed(Phase::Products);
        assert_eq!(session.completed_phases, vec![Phase::Brief, Phase::Products]);
    }

    #[test]
    fn test_is_complete_requires_every_phase() {
        let mut session = SessionState::new();
        for phase in PHASE_ORDER.iter().take(PHASE_ORDER.len() - 1) {
            session.mark_completed(*phase);
        }
        assert!(!session.is_complete());
        session.mark_completed(Phase::Submission);
        assert!(session.is_complete());
    }

    #[test]
    fn test_history_queries() {
        let mut session = SessionState::new();
        session.approval_history = vec![
            record(Phase::Brief, "market-analysis", 1, false),
            record(Phase::Brief, "market-analysis", 2, true),
            record(Phase::Products, "product-catalog", 1, false),
        ];
        assert_eq!(session.phase_history(Phase::Brief).len(), 2);
        assert_eq!(
            session.step_history(Phase::Products, "product-catalog").len(),
            1
        );
        assert!(session.was_step_accepted(Phase::Brief, "market-analysis"));
        assert!(!session.was_step_accepted(Phase::Products, "product-catalog"));
        assert_eq!(
            session
                .resolved_step(Phase::Brief, "market-analysis")
                .map(|r| r.iteration),
            Some(2)
        );
        assert!(session.resolved_step(Phase::Products, "product-catalog").is_none());
    }

    #[test]
    fn test_checkpoints_replace_per_step() {
        let mut session = SessionState::new();
        let cp = |value: i64| StepCheckpoint {
            phase: Phase::Differentiation,
            step: "header-proposal".into(),
            artifact: serde_json::json!({ "v": value }),
            skipped: false,
        };
        session.set_checkpoint(cp(1));
        session.set_checkpoint(cp(2));
        assert_eq!(session.checkpoints.len(), 1);
        assert_eq!(
            session
                .checkpoint(Phase::Differentiation, "header-proposal")
                .map(|c| c.artifact["v"].as_i64()),
            Some(Some(2))
        );
        session.clear_checkpoints(Phase::Differentiation);
        assert!(session.checkpoints.is_empty());
    }

    #[test]
    fn test_forget_step_drops_records_and_checkpoint() {
        let mut session = SessionState::new();
        session.approval_history = vec![
            record(Phase::Brief, "market-analysis", 1, true),
            record(Phase::Products, "product-catalog", 1, true),
        ];
        session.set_checkpoint(StepCheckpoint {
            phase: Phase::Brief,
            step: "market-analysis".into(),
            artifact: serde_json::Value::Null,
            skipped: false,
        });
        session.forget_step(Phase::Brief, "market-analysis");
        assert_eq!(session.approval_history.len(), 1);
        assert!(session.checkpoints.is_empty());
    }

    #[test]
    fn test_upsert_code_replaces_by_path() {
        let mut session = SessionState::new();
        let artifact = |content: &str| CodeArtifact {
            step: "header-code".into(),
            path: "sections/header.liquid".into(),
            content: content.into(),
            skipped: false,
        };
        session.upsert_code(artifact("v1"));
        session.upsert_code(artifact("v2"));
        assert_eq!(session.generated_code.len(), 1);
        assert_eq!(session.generated_code[0].content, "v2");
    }

    #[test]
    fn test_output_name_prefers_theme_slug() {
        let mut session = SessionState::new();
        assert_eq!(session.output_name(), session.id);
        session.theme_name = "Urban Bloom".into();
        assert_eq!(session.output_name(), "urban-bloom");
    }

    #[test]
    fn test_missing_optional_fields_deserialize_to_defaults() {
        let json = r#"{
            "id": "abc",
            "startedAt": "2026-01-01T00:00:00Z",
            "lastUpdatedAt": "2026-01-01T00:00:00Z",
            "currentPhase": "products"
        }"#;
        let session: SessionState = serde_json::from_str(json).unwrap();
        assert_eq!(session.current_phase, Phase::Products);
        assert!(session.products.is_empty());
        assert!(session.checkpoints.is_empty());
    }
}
