//! Phase-owned session fields and the rewind operation that clears them.
//!
//! Every session payload field is written by exactly one phase. Rewinding to
//! a phase clears the fields owned by that phase and by every later phase, and
//! drops approval history and checkpoints from the same range, so a rewound
//! session never carries artifacts derived from discarded work.

use crate::errors::RegistryError;
use crate::phase::{PHASE_ORDER, Phase};
use crate::session::state::{ProductImages, SessionState};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionField {
    Brief,
    ThemeName,
    Products,
    ProductImages,
    ImageManifest,
    Sections,
    GeneratedCode,
    DesignSystem,
    ThemePackage,
    TestResults,
    TestPreviewUrl,
    SubmissionAssets,
    SubmissionThemeId,
    Documentation,
}

impl SessionField {
    pub const ALL: [SessionField; 14] = [
        SessionField::Brief,
        SessionField::ThemeName,
        SessionField::Products,
        SessionField::ProductImages,
        SessionField::ImageManifest,
        SessionField::Sections,
        SessionField::GeneratedCode,
        SessionField::DesignSystem,
        SessionField::ThemePackage,
        SessionField::TestResults,
        SessionField::TestPreviewUrl,
        SessionField::SubmissionAssets,
        SessionField::SubmissionThemeId,
        SessionField::Documentation,
    ];

    /// Reset the field to its empty value on `session`.
    pub fn clear(self, session: &mut SessionState) {
        match self {
            SessionField::Brief => session.brief = None,
            SessionField::ThemeName => session.theme_name.clear(),
            SessionField::Products => session.products.clear(),
            SessionField::ProductImages => {
                for product in &mut session.products {
                    product.images = ProductImages::default();
                }
            }
            SessionField::ImageManifest => session.image_manifest = None,
            SessionField::Sections => session.sections.clear(),
            SessionField::GeneratedCode => session.generated_code.clear(),
            SessionField::DesignSystem => session.design_system = None,
            SessionField::ThemePackage => session.theme_package = None,
            SessionField::TestResults => session.test_results.clear(),
            SessionField::TestPreviewUrl => session.test_theme_preview_url = None,
            SessionField::SubmissionAssets => session.submission_assets = None,
            SessionField::SubmissionThemeId => session.submission_theme_id = None,
            SessionField::Documentation => session.documentation = None,
        }
    }

    /// Whether the field holds its empty value on `session`.
    pub fn is_empty(self, session: &SessionState) -> bool {
        match self {
            SessionField::Brief => session.brief.is_none(),
            SessionField::ThemeName => session.theme_name.is_empty(),
            SessionField::Products => session.products.is_empty(),
            SessionField::ProductImages => session.products.iter().all(|p| p.images.is_empty()),
            SessionField::ImageManifest => session.image_manifest.is_none(),
            SessionField::Sections => session.sections.is_empty(),
            SessionField::GeneratedCode => session.generated_code.is_empty(),
            SessionField::DesignSystem => session.design_system.is_none(),
            SessionField::ThemePackage => session.theme_package.is_none(),
            SessionField::TestResults => session.test_results.is_empty(),
            SessionField::TestPreviewUrl => session.test_theme_preview_url.is_none(),
            SessionField::SubmissionAssets => session.submission_assets.is_none(),
            SessionField::SubmissionThemeId => session.submission_theme_id.is_none(),
            SessionField::Documentation => session.documentation.is_none(),
        }
    }
}

impl fmt::Display for SessionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub type OwnershipTable = [(Phase, &'static [SessionField])];

/// Which phase writes which session fields.
pub const FIELD_OWNERSHIP: &OwnershipTable = &[
    (Phase::Brief, &[SessionField::Brief, SessionField::ThemeName]),
    (Phase::Products, &[SessionField::Products]),
    (
        Phase::Images,
        &[SessionField::ProductImages, SessionField::ImageManifest],
    ),
    (
        Phase::Differentiation,
        &[SessionField::Sections, SessionField::GeneratedCode],
    ),
    (Phase::DesignSystem, &[SessionField::DesignSystem]),
    (Phase::CodeGeneration, &[SessionField::ThemePackage]),
    (
        Phase::Testing,
        &[SessionField::TestResults, SessionField::TestPreviewUrl],
    ),
    (
        Phase::Submission,
        &[
            SessionField::SubmissionAssets,
            SessionField::SubmissionThemeId,
            SessionField::Documentation,
        ],
    ),
];

pub fn owned_fields(phase: Phase) -> &'static [SessionField] {
    FIELD_OWNERSHIP
        .iter()
        .find(|(owner, _)| *owner == phase)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

/// Check that `table` lists every phase once, in order, and every field exactly once.
pub fn validate_table(table: &OwnershipTable) -> Result<(), RegistryError> {
    let mut previous: Option<Phase> = None;
    for (phase, _) in table {
        if let Some(prev) = previous {
            if prev == *phase {
                return Err(RegistryError::DuplicateOwner(*phase));
            }
            if prev > *phase {
                return Err(RegistryError::OutOfOrder(*phase));
            }
        }
        previous = Some(*phase);
    }

    for phase in PHASE_ORDER {
        if !table.iter().any(|(owner, _)| *owner == phase) {
            return Err(RegistryError::MissingOwner(phase));
        }
    }

    for field in SessionField::ALL {
        let mut owners = table
            .iter()
            .filter(|(_, fields)| fields.contains(&field))
            .map(|(owner, _)| *owner);
        match (owners.next(), owners.next()) {
            (None, _) => return Err(RegistryError::UnownedField(field.to_string())),
            (Some(first), Some(second)) => {
                return Err(RegistryError::FieldOwnedTwice {
                    field: field.to_string(),
                    first,
                    second,
                });
            }
            (Some(_), None) => {}
        }
    }

    Ok(())
}

/// Validate the built-in ownership table. Run once at startup.
pub fn validate_ownership_table() -> Result<(), RegistryError> {
    validate_table(FIELD_OWNERSHIP)
}

/// Rewind `session` so `target` runs next with a clean slate for it and every later phase.
///
/// Idempotent: applying the same rewind twice leaves the session unchanged.
pub fn reset_to_phase(session: &mut SessionState, target: Phase) {
    session.current_phase = target;
    session.approval_history.retain(|r| r.phase < target);
    session.checkpoints.retain(|c| c.phase < target);
    session.completed_phases.retain(|p| *p < target);

    let mut cleared = 0;
    for phase in target.remaining() {
        for field in owned_fields(*phase) {
            if !field.is_empty(session) {
                field.clear(session);
                cleared += 1;
            }
        }
    }

    tracing::info!(
        session_id = %session.id,
        phase = %target,
        cleared,
        "Session rewound"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::{
        ApprovalRecord, CodeArtifact, Product, SectionKind, SectionProposal, Severity,
        StepCheckpoint, SubmissionAssets, TestResult, ThemeBrief,
    };
    use chrono::Utc;

    fn populated_session() -> SessionState {
        let mut session = SessionState::new();
        session.theme_name = "Urban Bloom".into();
        session.brief = Some(ThemeBrief {
            industry: "plants".into(),
            target_market: "apartment dwellers".into(),
            style_direction: "minimal".into(),
            competitors: vec![],
            brand_name: Some("Urban Bloom".into()),
            positioning: None,
        });
        let mut product = Product {
            id: "p1".into(),
            name: "Fern".into(),
            description: "A fern".into(),
            price: 20.0,
            compare_at_price: None,
            category: "plants".into(),
            collection: "indoor".into(),
            tags: vec![],
            variants: vec![],
            images: Default::default(),
        };
        product.images.studio = Some("images/p1/studio.png".into());
        session.products = vec![product];
        session.sections = vec![SectionProposal {
            id: "lookbook".into(),
            name: "Lookbook".into(),
            kind: SectionKind::New,
            concept: "grid".into(),
            functionality: String::new(),
            unique_features: vec![],
        }];
        session.generated_code = vec![CodeArtifact {
            step: "header-code".into(),
            path: "sections/header.liquid".into(),
            content: "<header></header>".into(),
            skipped: false,
        }];
        session.test_theme_preview_url = Some("https://preview".into());
        session.submission_assets = Some(SubmissionAssets {
            theme_name: "Urban Bloom".into(),
            prepared_at: Utc::now(),
            preview_url: None,
            key_features: vec![],
            differentiation_score: 80,
        });
        for phase in PHASE_ORDER {
            session.mark_completed(phase);
            session.approval_history.push(ApprovalRecord {
                phase,
                step: "step".into(),
                iteration: 1,
                accepted: true,
                feedback: None,
                timestamp: Utc::now(),
            });
            session.checkpoints.push(StepCheckpoint {
                phase,
                step: "step".into(),
                artifact: serde_json::Value::Null,
                skipped: false,
            });
        }
        session.current_phase = Phase::Submission;
        session
    }

    #[test]
    fn test_builtin_table_is_valid() {
        validate_ownership_table().unwrap();
    }

    #[test]
    fn test_every_phase_owns_at_least_one_field() {
        for phase in PHASE_ORDER {
            assert!(!owned_fields(phase).is_empty(), "{phase} owns nothing");
        }
    }

    #[test]
    fn test_validate_rejects_missing_phase() {
        let table: &OwnershipTable = &FIELD_OWNERSHIP[..7];
        assert!(matches!(
            validate_table(table),
            Err(RegistryError::MissingOwner(Phase::Submission))
        ));
    }

    #[test]
    fn test_validate_rejects_doubly_owned_field() {
        let mut table: Vec<(Phase, &'static [SessionField])> = FIELD_OWNERSHIP.to_vec();
        table[1] = (
            Phase::Products,
            &[SessionField::Products, SessionField::Brief],
        );
        assert!(matches!(
            validate_table(&table),
            Err(RegistryError::FieldOwnedTwice { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_order() {
        let mut table: Vec<(Phase, &'static [SessionField])> = FIELD_OWNERSHIP.to_vec();
        table.swap(0, 1);
        assert!(matches!(
            validate_table(&table),
            Err(RegistryError::OutOfOrder(Phase::Brief))
        ));
    }

    #[test]
    fn test_reset_to_images_clears_downstream_only() {
        let mut session = populated_session();
        reset_to_phase(&mut session, Phase::Images);

        assert_eq!(session.current_phase, Phase::Images);
        assert_eq!(session.completed_phases, vec![Phase::Brief, Phase::Products]);
        assert!(session.brief.is_some());
        assert_eq!(session.theme_name, "Urban Bloom");
        assert_eq!(session.products.len(), 1);
        assert!(session.products[0].images.is_empty());
        assert!(session.sections.is_empty());
        assert!(session.generated_code.is_empty());
        assert!(session.test_theme_preview_url.is_none());
        assert!(session.submission_assets.is_none());
        assert!(
            session
                .approval_history
                .iter()
                .all(|r| r.phase < Phase::Images)
        );
        assert!(session.checkpoints.iter().all(|c| c.phase < Phase::Images));
    }

    #[test]
    fn test_reset_to_first_phase_clears_everything() {
        let mut session = populated_session();
        reset_to_phase(&mut session, Phase::Brief);
        let fresh = SessionState::new();
        assert!(session.brief.is_none());
        assert!(session.theme_name.is_empty());
        assert_eq!(session.products, fresh.products);
        assert!(session.approval_history.is_empty());
        assert!(session.completed_phases.is_empty());
    }

    #[test]
    fn test_reset_is_idempotent() {
        for target in PHASE_ORDER {
            let mut once = populated_session();
            reset_to_phase(&mut once, target);
            let mut twice = once.clone();
            reset_to_phase(&mut twice, target);
            assert_eq!(once, twice, "reset to {target} not idempotent");
        }
    }

    #[test]
    fn test_rewind_from_design_system_to_products_keeps_brief() {
        let mut session = populated_session();
        session.test_results = vec![TestResult {
            category: "structure".into(),
            name: "layout/theme.liquid".into(),
            passed: false,
            severity: Severity::Error,
            message: Some("missing".into()),
        }];
        reset_to_phase(&mut session, Phase::DesignSystem);
        session.test_results = vec![TestResult {
            category: "structure".into(),
            name: "templates/index.json".into(),
            passed: true,
            severity: Severity::Info,
            message: None,
        }];
        let brief = session.brief.clone();

        reset_to_phase(&mut session, Phase::Products);

        assert_eq!(session.current_phase, Phase::Products);
        assert_eq!(session.brief, brief);
        assert_eq!(session.theme_name, "Urban Bloom");
        assert_eq!(session.completed_phases, vec![Phase::Brief]);
        assert!(session.test_results.is_empty());
        assert!(session.products.is_empty());
        assert!(session.sections.is_empty());
        assert!(session.approval_history.iter().all(|r| r.phase == Phase::Brief));
        for phase in Phase::Products.remaining() {
            for field in owned_fields(*phase) {
                assert!(field.is_empty(&session), "{field} survived the rewind");
            }
        }
    }

    #[test]
    fn test_is_empty_matches_clear() {
        let mut session = populated_session();
        for field in SessionField::ALL {
            field.clear(&mut session);
            assert!(field.is_empty(&session), "{field} not empty after clear");
        }
    }
}
