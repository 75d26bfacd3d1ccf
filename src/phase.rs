//! The fixed, totally ordered sequence of workflow phases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A workflow stage. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Brief,
    Products,
    Images,
    Differentiation,
    DesignSystem,
    CodeGeneration,
    Testing,
    Submission,
}

pub const PHASE_ORDER: [Phase; 8] = [
    Phase::Brief,
    Phase::Products,
    Phase::Images,
    Phase::Differentiation,
    Phase::DesignSystem,
    Phase::CodeGeneration,
    Phase::Testing,
    Phase::Submission,
];

impl Phase {
    pub const fn first() -> Self {
        Phase::Brief
    }

    /// Zero-based position in [`PHASE_ORDER`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Phase> {
        PHASE_ORDER.get(self.index() + 1).copied()
    }

    /// The phases from `self` (inclusive) to the end of the workflow.
    pub fn remaining(self) -> &'static [Phase] {
        &PHASE_ORDER[self.index()..]
    }

    /// The phases strictly before `self`.
    pub fn preceding(self) -> &'static [Phase] {
        &PHASE_ORDER[..self.index()]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Brief => "brief",
            Phase::Products => "products",
            Phase::Images => "images",
            Phase::Differentiation => "differentiation",
            Phase::DesignSystem => "design-system",
            Phase::CodeGeneration => "code-generation",
            Phase::Testing => "testing",
            Phase::Submission => "submission",
        }
    }

    /// Human-readable name shown in phase headers and menus.
    pub const fn title(self) -> &'static str {
        match self {
            Phase::Brief => "Brief & Market Analysis",
            Phase::Products => "Product Catalog",
            Phase::Images => "Product Images",
            Phase::Differentiation => "Theme Differentiation",
            Phase::DesignSystem => "Design System",
            Phase::CodeGeneration => "Theme Assembly",
            Phase::Testing => "Testing",
            Phase::Submission => "Submission Preparation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PHASE_ORDER
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid phase '{}'. Valid phases: {}",
                    s,
                    PHASE_ORDER
                        .iter()
                        .map(|p| p.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_phase_order() {
        for (i, phase) in PHASE_ORDER.iter().enumerate() {
            assert_eq!(phase.index(), i);
        }
    }

    #[test]
    fn test_ordering_follows_workflow() {
        assert!(Phase::Brief < Phase::Products);
        assert!(Phase::DesignSystem < Phase::CodeGeneration);
        assert!(Phase::Testing < Phase::Submission);
    }

    #[test]
    fn test_next_walks_to_end() {
        assert_eq!(Phase::Brief.next(), Some(Phase::Products));
        assert_eq!(Phase::Testing.next(), Some(Phase::Submission));
        assert_eq!(Phase::Submission.next(), None);
    }

    #[test]
    fn test_remaining_and_preceding_partition_order() {
        let remaining = Phase::Images.remaining();
        let preceding = Phase::Images.preceding();
        assert_eq!(remaining.first(), Some(&Phase::Images));
        assert_eq!(remaining.len() + preceding.len(), PHASE_ORDER.len());
        assert_eq!(preceding, &[Phase::Brief, Phase::Products]);
    }

    #[test]
    fn test_serde_uses_kebab_case_names() {
        let json = serde_json::to_string(&Phase::DesignSystem).unwrap();
        assert_eq!(json, "\"design-system\"");
        let parsed: Phase = serde_json::from_str("\"code-generation\"").unwrap();
        assert_eq!(parsed, Phase::CodeGeneration);
    }

    #[test]
    fn test_from_str_accepts_every_name() {
        for phase in PHASE_ORDER {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "deploy".parse::<Phase>().unwrap_err();
        assert!(err.to_string().contains("Invalid phase"));
    }
}
