//! Theme differentiation: rewritten header and footer, new JavaScript, new and modified sections.
//!
//! Every file produced here is recorded as a [`CodeArtifact`] on the session;
//! the code-generation phase writes them into the theme. A skipped proposal
//! also skips its code step, leaving the base theme's version in place.

use crate::ai::TaskType;
use crate::context::PhaseContext;
use crate::controller::PhaseHandler;
use crate::errors::PhaseError;
use crate::generate::{ParseOutcome, parse_json};
use crate::phase::Phase;
use crate::phases::{ask_code, ask_json, bullets, negotiate, system_prompt};
use crate::session::state::{CodeArtifact, SectionKind, SectionProposal, SessionState, ThemeBrief};
use crate::ui::icons::SPARKLE;
use crate::util::{slugify, title_case};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const STEP_HEADER_PROPOSAL: &str = "header-proposal";
pub const STEP_HEADER_CODE: &str = "header-code";
pub const STEP_FOOTER_PROPOSAL: &str = "footer-proposal";
pub const STEP_FOOTER_CODE: &str = "footer-code";
pub const STEP_JS_ENHANCEMENTS: &str = "js-enhancements";
pub const STEP_JS_CODE: &str = "js-code";
pub const STEP_NEW_SECTIONS: &str = "new-sections";
pub const STEP_MODIFIED_SECTIONS: &str = "modified-sections";

pub const JS_PATH: &str = "assets/theme-enhancements.js";

/// Sections offered for modification when no base theme is configured.
const DEFAULT_MODIFIABLE: [&str; 8] = [
    "image-banner",
    "featured-collection",
    "rich-text",
    "multicolumn",
    "collage",
    "image-with-text",
    "newsletter",
    "main-product",
];

/// Deterministic section ideas used when a proposal cannot be read.
const FALLBACK_NEW_SECTIONS: [(&str, &str, &str); 6] = [
    (
        "shop-the-look",
        "Shop the Look",
        "Lifestyle image with hotspots linking to the featured products",
    ),
    (
        "story-timeline",
        "Story Timeline",
        "Scroll-driven brand timeline with milestone cards",
    ),
    (
        "comparison-table",
        "Comparison Table",
        "Side-by-side product comparison with highlighted differences",
    ),
    (
        "ingredient-spotlight",
        "Ingredient Spotlight",
        "Materials and sourcing details with expandable panels",
    ),
    (
        "testimonial-marquee",
        "Testimonial Marquee",
        "Continuously scrolling customer quotes with ratings",
    ),
    (
        "bundle-builder",
        "Bundle Builder",
        "Pick-and-mix bundle selector with a running total",
    ),
];

const CODE_PREVIEW_LINES: usize = 40;

pub fn new_section_step(id: &str) -> String {
    format!("new-section-{id}")
}

pub fn modified_section_step(id: &str) -> String {
    format!("modified-section-{id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderProposal {
    pub concept: String,
    pub layout: String,
    pub features: Vec<String>,
    pub mega_menu: bool,
    pub sticky: bool,
    pub search_style: String,
}

impl Default for HeaderProposal {
    fn default() -> Self {
        Self {
            concept: String::new(),
            layout: String::new(),
            features: Vec::new(),
            mega_menu: false,
            sticky: true,
            search_style: "overlay".to_string(),
        }
    }
}

impl HeaderProposal {
    fn fallback(brief: &ThemeBrief) -> Self {
        Self {
            concept: format!(
                "Split header for a {} store with centered logo and utility icons",
                brief.style_direction
            ),
            layout: "Logo centered, navigation left, search, account and cart right".to_string(),
            features: vec![
                "Announcement bar".to_string(),
                "Predictive search".to_string(),
                "Cart count badge".to_string(),
            ],
            mega_menu: true,
            sticky: true,
            search_style: "overlay".to_string(),
        }
    }

    fn render(&self) -> String {
        format!(
            "Concept: {}\nLayout: {}\nMega menu: {}\nSticky: {}\nSearch: {}\n\nFeatures:\n{}",
            self.concept,
            self.layout,
            yes_no(self.mega_menu),
            yes_no(self.sticky),
            self.search_style,
            bullets(&self.features)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FooterProposal {
    pub concept: String,
    pub layout: String,
    pub columns: u32,
    pub features: Vec<String>,
    pub newsletter: bool,
    pub social_style: String,
}

impl Default for FooterProposal {
    fn default() -> Self {
        Self {
            concept: String::new(),
            layout: String::new(),
            columns: 4,
            features: Vec::new(),
            newsletter: true,
            social_style: "icons".to_string(),
        }
    }
}

impl FooterProposal {
    fn fallback(brief: &ThemeBrief) -> Self {
        Self {
            concept: format!(
                "Four-column {} footer with trust signals and a newsletter band",
                brief.style_direction
            ),
            layout: "Newsletter band above link columns, payment icons and legal row below"
                .to_string(),
            columns: 4,
            features: vec![
                "Trust badges".to_string(),
                "Store policies".to_string(),
                "Social links".to_string(),
            ],
            newsletter: true,
            social_style: "icons".to_string(),
        }
    }

    fn render(&self) -> String {
        format!(
            "Concept: {}\nLayout: {}\nColumns: {}\nNewsletter: {}\nSocial: {}\n\nFeatures:\n{}",
            self.concept,
            self.layout,
            self.columns,
            yes_no(self.newsletter),
            self.social_style,
            bullets(&self.features)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsEnhancement {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_enhancement_kind")]
    pub kind: String,
    #[serde(default)]
    pub affected_elements: Vec<String>,
}

fn default_enhancement_kind() -> String {
    "interaction".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnhancementsResponse {
    Wrapped { enhancements: Vec<JsEnhancement> },
    Bare(Vec<JsEnhancement>),
}

fn fallback_enhancements() -> Vec<JsEnhancement> {
    [
        (
            "Scroll reveal",
            "Fade sections in as they enter the viewport",
            "animation",
            "section",
        ),
        (
            "Quick add",
            "Add to cart from product cards without leaving the page",
            "interaction",
            ".product-card",
        ),
        (
            "Sticky add to cart",
            "Keep the buy button visible on long product pages",
            "utility",
            ".product-form",
        ),
    ]
    .into_iter()
    .map(|(name, description, kind, element)| JsEnhancement {
        name: name.to_string(),
        description: description.to_string(),
        kind: kind.to_string(),
        affected_elements: vec![element.to_string()],
    })
    .collect()
}

fn render_enhancements(enhancements: &[JsEnhancement]) -> String {
    enhancements
        .iter()
        .enumerate()
        .map(|(i, e)| {
            format!(
                "{}. {} [{}]\n   {}\n   Affects: {}",
                i + 1,
                e.name,
                e.kind,
                e.description,
                e.affected_elements.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A generated Liquid section with optional companion assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub liquid: String,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub js: Option<String>,
}

/// Theme paths a [`GeneratedCode`] is written to.
struct CodePaths {
    liquid: String,
    css: Option<String>,
    js: Option<String>,
}

impl CodePaths {
    fn section(id: &str) -> Self {
        Self {
            liquid: format!("sections/{id}.liquid"),
            css: Some(format!("assets/section-{id}.css")),
            js: None,
        }
    }
}

/// Section idea as the model describes it; the kind is assigned by the caller.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SectionIdea {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default, alias = "description")]
    concept: String,
    #[serde(default)]
    functionality: String,
    #[serde(default)]
    unique_features: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SectionsResponse {
    Wrapped { sections: Vec<SectionIdea> },
    Bare(Vec<SectionIdea>),
}

impl SectionsResponse {
    fn into_ideas(self) -> Vec<SectionIdea> {
        match self {
            SectionsResponse::Wrapped { sections } | SectionsResponse::Bare(sections) => sections,
        }
    }
}

pub struct DifferentiationPhase;

#[async_trait]
impl PhaseHandler for DifferentiationPhase {
    fn phase(&self) -> Phase {
        Phase::Differentiation
    }

    async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> Result<()> {
        let brief = session
            .brief
            .clone()
            .ok_or(PhaseError::MissingPrerequisite {
                phase: Phase::Differentiation,
                requirement: "a completed brief",
            })?;
        let generation = &ctx.config.generation;

        ctx.console.section("Differentiation Requirements");
        ctx.console.info(
            "Theme Store submissions must be substantially different from existing themes.",
        );
        ctx.console.list(&[
            "Complete header rewrite".to_string(),
            "Complete footer rewrite".to_string(),
            "New JavaScript enhancements".to_string(),
            format!("{} brand new sections", generation.new_sections),
            format!("{} substantially modified sections", generation.modified_sections),
        ]);

        // Rebuilt from checkpoints on re-entry.
        session.generated_code.clear();

        header(ctx, session, &brief).await?;
        footer(ctx, session, &brief).await?;
        javascript(ctx, session, &brief).await?;
        new_sections(ctx, session, &brief, generation.new_sections).await?;
        modified_sections(ctx, session, &brief, generation.modified_sections).await?;

        let written = session.generated_code.iter().filter(|c| !c.skipped).count();
        let skipped = session.generated_code.len() - written;
        tracing::info!(written, skipped, sections = session.sections.len(), "Differentiation finished");
        ctx.console.success(&format!(
            "Differentiation complete: {written} files generated, {skipped} skipped"
        ));
        Ok(())
    }
}

async fn header(ctx: &PhaseContext, session: &mut SessionState, brief: &ThemeBrief) -> Result<()> {
    ctx.console.section("Step 1: Header Rewrite");
    let prompt = system_prompt(ctx, "header.md", &designer_prompt(brief, "header"));
    let system = prompt.as_str();
    let proposal = negotiate(
        ctx,
        session,
        Phase::Differentiation,
        STEP_HEADER_PROPOSAL,
        |feedback| async move {
            let outcome = ask_json::<HeaderProposal>(
                ctx,
                TaskType::Planning,
                system,
                "Generate the header proposal now. Respond with JSON: {\"concept\", \"layout\", \
                 \"features\": [], \"megaMenu\", \"sticky\", \"searchStyle\"}.",
                feedback.as_deref(),
            )
            .await?
            .or_fallback(STEP_HEADER_PROPOSAL, || HeaderProposal::fallback(brief));
            Ok(outcome.into_result()?)
        },
        |p: &HeaderProposal| ctx.console.proposal("Header Proposal", &p.render()),
    )
    .await?;
    if proposal.skipped {
        ctx.console.info("Keeping the base theme header");
        return Ok(());
    }

    let proposal_json = serde_json::to_string_pretty(&proposal.artifact)?;
    let request = format!(
        "Generate a complete header section for a {} store in a {} style from this proposal:\n{proposal_json}\n\n\
         Include the section schema, mobile-responsive markup, WCAG 2.1 accessibility and CSS \
         variables for theming.",
        brief.industry, brief.style_direction
    );
    code_step(
        ctx,
        session,
        STEP_HEADER_CODE,
        "Header",
        &request,
        CodePaths {
            liquid: "sections/header.liquid".to_string(),
            css: Some("assets/header.css".to_string()),
            js: Some("assets/header.js".to_string()),
        },
    )
    .await
}

async fn footer(ctx: &PhaseContext, session: &mut SessionState, brief: &ThemeBrief) -> Result<()> {
    ctx.console.section("Step 2: Footer Rewrite");
    let prompt = system_prompt(ctx, "footer.md", &designer_prompt(brief, "footer"));
    let system = prompt.as_str();
    let proposal = negotiate(
        ctx,
        session,
        Phase::Differentiation,
        STEP_FOOTER_PROPOSAL,
        |feedback| async move {
            let outcome = ask_json::<FooterProposal>(
                ctx,
                TaskType::Planning,
                system,
                "Generate the footer proposal now. Respond with JSON: {\"concept\", \"layout\", \
                 \"columns\", \"features\": [], \"newsletter\", \"socialStyle\"}.",
                feedback.as_deref(),
            )
            .await?
            .or_fallback(STEP_FOOTER_PROPOSAL, || FooterProposal::fallback(brief));
            Ok(outcome.into_result()?)
        },
        |p: &FooterProposal| ctx.console.proposal("Footer Proposal", &p.render()),
    )
    .await?;
    if proposal.skipped {
        ctx.console.info("Keeping the base theme footer");
        return Ok(());
    }

    let proposal_json = serde_json::to_string_pretty(&proposal.artifact)?;
    let request = format!(
        "Generate a complete footer section for a {} store from this proposal:\n{proposal_json}\n\n\
         Include the section schema, trust signals, mobile-first layout and accessible markup.",
        brief.industry
    );
    code_step(
        ctx,
        session,
        STEP_FOOTER_CODE,
        "Footer",
        &request,
        CodePaths {
            liquid: "sections/footer.liquid".to_string(),
            css: Some("assets/footer.css".to_string()),
            js: None,
        },
    )
    .await
}

async fn javascript(
    ctx: &PhaseContext,
    session: &mut SessionState,
    brief: &ThemeBrief,
) -> Result<()> {
    ctx.console.section("Step 3: JavaScript Enhancements");
    ctx.console
        .info("Most of the theme JavaScript must be new code for Theme Store acceptance.");
    let prompt = system_prompt(ctx, "javascript.md", &designer_prompt(brief, "JavaScript layer"));
    let system = prompt.as_str();
    let enhancements = negotiate(
        ctx,
        session,
        Phase::Differentiation,
        STEP_JS_ENHANCEMENTS,
        |feedback| async move {
            let outcome = ask_json::<EnhancementsResponse>(
                ctx,
                TaskType::Planning,
                system,
                "Propose 3-5 JavaScript enhancements. Respond with a JSON array of \
                 {\"name\", \"description\", \"type\": \"animation|interaction|utility\", \
                 \"affectedElements\": []}.",
                feedback.as_deref(),
            )
            .await?
            .map(|response| match response {
                EnhancementsResponse::Wrapped { enhancements }
                | EnhancementsResponse::Bare(enhancements) => enhancements,
            });
            let outcome = match outcome {
                ParseOutcome::Parsed(list) if list.is_empty() => {
                    ParseOutcome::Failed("no enhancements proposed".to_string())
                }
                other => other,
            }
            .or_fallback(STEP_JS_ENHANCEMENTS, fallback_enhancements);
            Ok(outcome.into_result()?)
        },
        |list: &Vec<JsEnhancement>| {
            ctx.console
                .proposal("JavaScript Enhancements", &render_enhancements(list))
        },
    )
    .await?;
    if enhancements.skipped {
        ctx.console.info("No JavaScript enhancements will be added");
        return Ok(());
    }

    let plan = serde_json::to_string_pretty(&enhancements.artifact)?;
    let coder_text = coder_prompt(ctx);
    let request_text = format!(
        "Write modern vanilla JavaScript (ES2020, no frameworks) implementing these enhancements \
         for a Shopify theme:\n{plan}\n\nUse custom elements where it fits, respect \
         prefers-reduced-motion, and return only the code."
    );
    let (coder, request) = (coder_text.as_str(), request_text.as_str());
    let code = negotiate(
        ctx,
        session,
        Phase::Differentiation,
        STEP_JS_CODE,
        |feedback| async move { ask_code(ctx, coder, request, feedback.as_deref()).await },
        |js: &String| ctx.console.code("Generated JavaScript", js, CODE_PREVIEW_LINES),
    )
    .await?;
    session.upsert_code(CodeArtifact {
        step: STEP_JS_CODE.to_string(),
        path: JS_PATH.to_string(),
        content: code.artifact,
        skipped: code.skipped,
    });
    Ok(())
}

async fn new_sections(
    ctx: &PhaseContext,
    session: &mut SessionState,
    brief: &ThemeBrief,
    count: usize,
) -> Result<()> {
    ctx.console
        .section(&format!("Step 4: Generate {count} New Sections"));
    if count == 0 {
        session.replace_sections(SectionKind::New, Vec::new());
        return Ok(());
    }
    let system = system_prompt(ctx, "sections.md", &designer_prompt(brief, "custom sections"));
    let request = format!(
        "Propose exactly {count} brand new sections that typical themes lack. Respond with a JSON \
         array of {{\"id\": \"kebab-case-id\", \"name\", \"concept\", \"functionality\", \
         \"uniqueFeatures\": []}}."
    );
    let proposals = negotiate(
        ctx,
        session,
        Phase::Differentiation,
        STEP_NEW_SECTIONS,
        |feedback| {
            propose_sections(ctx, &system, &request, SectionKind::New, count, feedback, || {
                fallback_new_sections(count)
            })
        },
        |sections: &Vec<SectionProposal>| {
            ctx.console.proposal("New Sections", &render_sections(sections))
        },
    )
    .await?;
    let sections = if proposals.skipped {
        ctx.console.info("No new sections will be added");
        Vec::new()
    } else {
        proposals.artifact
    };
    session.replace_sections(SectionKind::New, sections.clone());

    let total = sections.len();
    for (i, section) in sections.iter().enumerate() {
        ctx.console.section(&format!(
            "{SPARKLE}Generating Section {}/{total}: {}",
            i + 1,
            section.name
        ));
        let request = format!(
            "Generate a complete Shopify section for a {} store from this proposal:\n{}\n\n\
             Include the schema with presets and configurable settings.",
            brief.industry,
            serde_json::to_string_pretty(section)?
        );
        code_step(
            ctx,
            session,
            &new_section_step(&section.id),
            &section.name,
            &request,
            CodePaths::section(&section.id),
        )
        .await?;
    }
    Ok(())
}

async fn modified_sections(
    ctx: &PhaseContext,
    session: &mut SessionState,
    brief: &ThemeBrief,
    count: usize,
) -> Result<()> {
    ctx.console
        .section(&format!("Step 5: Modify {count} Existing Sections"));
    if count == 0 {
        session.replace_sections(SectionKind::Modified, Vec::new());
        return Ok(());
    }
    let base_sections = ctx
        .config
        .theme
        .base_theme_dir
        .as_deref()
        .map(|dir| dir.join("sections"));
    let available = modifiable_sections(base_sections.as_deref());
    ctx.console.info("Available sections to modify:");
    ctx.console.list(&available);

    let system = system_prompt(ctx, "sections.md", &designer_prompt(brief, "custom sections"));
    let request = format!(
        "Choose exactly {count} of these existing sections and propose substantial \
         modifications: {}. Respond with a JSON array of {{\"id\": \"existing section id\", \
         \"name\", \"concept\", \"functionality\", \"uniqueFeatures\": []}}.",
        available.join(", ")
    );
    let proposals = negotiate(
        ctx,
        session,
        Phase::Differentiation,
        STEP_MODIFIED_SECTIONS,
        |feedback| {
            propose_sections(
                ctx,
                &system,
                &request,
                SectionKind::Modified,
                count,
                feedback,
                || fallback_modified_sections(&available, count),
            )
        },
        |sections: &Vec<SectionProposal>| {
            ctx.console
                .proposal("Section Modifications", &render_sections(sections))
        },
    )
    .await?;
    let sections = if proposals.skipped {
        ctx.console.info("Existing sections will be kept as-is");
        Vec::new()
    } else {
        proposals.artifact
    };
    session.replace_sections(SectionKind::Modified, sections.clone());

    let total = sections.len();
    for (i, section) in sections.iter().enumerate() {
        ctx.console.section(&format!(
            "Modifying Section {}/{total}: {}",
            i + 1,
            section.name
        ));
        let original = match &base_sections {
            Some(dir) => original_section(ctx, dir, &section.id).await,
            None => String::new(),
        };
        let original = if original.is_empty() {
            "(original not available; write the section from scratch)".to_string()
        } else {
            original
        };
        let request = format!(
            "Substantially modify this Shopify section according to the proposal. Keep existing \
             settings working and add the new functionality.\n\nPROPOSAL:\n{}\n\nORIGINAL:\n{original}",
            serde_json::to_string_pretty(section)?
        );
        code_step(
            ctx,
            session,
            &modified_section_step(&section.id),
            &section.name,
            &request,
            CodePaths::section(&section.id),
        )
        .await?;
    }
    Ok(())
}

/// Negotiate one code step and record its files.
async fn code_step(
    ctx: &PhaseContext,
    session: &mut SessionState,
    step: &str,
    title: &str,
    request: &str,
    paths: CodePaths,
) -> Result<()> {
    let coder = coder_prompt(ctx);
    let code = negotiate(
        ctx,
        session,
        Phase::Differentiation,
        step,
        |feedback| generate_code(ctx, &coder, request, feedback),
        |code: &GeneratedCode| ctx.console.code(title, &code.liquid, CODE_PREVIEW_LINES),
    )
    .await?;

    let skipped = code.skipped;
    let GeneratedCode { liquid, css, js } = code.artifact;
    let files = [
        (Some(paths.liquid), Some(liquid)),
        (paths.css, css),
        (paths.js, js),
    ];
    for (path, content) in files {
        if let (Some(path), Some(content)) = (path, content)
            && !content.trim().is_empty()
        {
            session.upsert_code(CodeArtifact {
                step: step.to_string(),
                path,
                content,
                skipped,
            });
        }
    }
    if !skipped {
        ctx.console.success(&format!("{title} generated"));
    }
    Ok(())
}

/// The model may answer with `{"liquid", "css", "js"}` JSON or with plain Liquid.
async fn generate_code(
    ctx: &PhaseContext,
    system: &str,
    request: &str,
    feedback: Option<String>,
) -> Result<GeneratedCode> {
    let request = format!(
        "{request}\n\nRespond with JSON {{\"liquid\": \"...\", \"css\": \"...\", \"js\": \"...\"}} \
         where css and js are optional."
    );
    let text = ask_code(ctx, system, &request, feedback.as_deref()).await?;
    Ok(match parse_json::<GeneratedCode>(&text) {
        ParseOutcome::Parsed(code) if !code.liquid.trim().is_empty() => code,
        _ => GeneratedCode {
            liquid: text,
            css: None,
            js: None,
        },
    })
}

async fn propose_sections(
    ctx: &PhaseContext,
    system: &str,
    request: &str,
    kind: SectionKind,
    count: usize,
    feedback: Option<String>,
    fallback: impl FnOnce() -> Vec<SectionProposal>,
) -> Result<Vec<SectionProposal>> {
    let outcome = match ask_json::<SectionsResponse>(
        ctx,
        TaskType::Planning,
        system,
        request,
        feedback.as_deref(),
    )
    .await?
    .map(|response| normalize_sections(response.into_ideas(), kind, count))
    {
        ParseOutcome::Parsed(sections) if sections.is_empty() => {
            ParseOutcome::Failed("no sections proposed".to_string())
        }
        other => other,
    }
    .or_fallback("sections", fallback);
    if outcome.is_fallback() {
        ctx.console
            .warning("Could not read the section proposals; showing default sections");
    }
    Ok(outcome.into_result()?)
}

/// Slug ids, unique, at most `count`.
fn normalize_sections(ideas: Vec<SectionIdea>, kind: SectionKind, count: usize) -> Vec<SectionProposal> {
    let mut seen = HashSet::new();
    ideas
        .into_iter()
        .filter_map(|idea| {
            let mut id = slugify(&idea.id);
            if id.is_empty() {
                id = slugify(&idea.name);
            }
            if id.is_empty() || !seen.insert(id.clone()) {
                return None;
            }
            Some(SectionProposal {
                id,
                name: idea.name,
                kind,
                concept: idea.concept,
                functionality: idea.functionality,
                unique_features: idea.unique_features,
            })
        })
        .take(count)
        .collect()
}

fn fallback_new_sections(count: usize) -> Vec<SectionProposal> {
    FALLBACK_NEW_SECTIONS
        .iter()
        .cycle()
        .take(count)
        .enumerate()
        .map(|(i, (id, name, concept))| {
            let round = i / FALLBACK_NEW_SECTIONS.len();
            let id = if round == 0 {
                id.to_string()
            } else {
                format!("{id}-{}", round + 1)
            };
            SectionProposal {
                id,
                name: name.to_string(),
                kind: SectionKind::New,
                concept: concept.to_string(),
                functionality: String::new(),
                unique_features: Vec::new(),
            }
        })
        .collect()
}

fn fallback_modified_sections(available: &[String], count: usize) -> Vec<SectionProposal> {
    available
        .iter()
        .take(count)
        .map(|id| SectionProposal {
            id: id.clone(),
            name: title_case(id),
            kind: SectionKind::Modified,
            concept: "Restyled layout with new display options and richer settings".to_string(),
            functionality: String::new(),
            unique_features: Vec::new(),
        })
        .collect()
}

/// Section ids of the base theme minus header and footer, or a stock list.
fn modifiable_sections(sections_dir: Option<&Path>) -> Vec<String> {
    let from_base = sections_dir
        .and_then(|dir| std::fs::read_dir(dir).ok())
        .map(|entries| {
            let mut ids: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    name.strip_suffix(".liquid").map(str::to_string)
                })
                .filter(|id| id != "header" && id != "footer")
                .collect();
            ids.sort();
            ids
        })
        .unwrap_or_default();
    if from_base.is_empty() {
        DEFAULT_MODIFIABLE.iter().map(|s| s.to_string()).collect()
    } else {
        from_base
    }
}

async fn original_section(ctx: &PhaseContext, sections_dir: &Path, id: &str) -> String {
    let path = sections_dir.join(format!("{id}.liquid"));
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Original section unreadable");
            ctx.console
                .warning(&format!("Could not read original section: {id}"));
            String::new()
        }
    }
}

fn render_sections(sections: &[SectionProposal]) -> String {
    sections
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut block = format!("{}. {} ({})\n   {}", i + 1, s.name, s.id, s.concept);
            if !s.functionality.is_empty() {
                block.push_str(&format!("\n   Functionality: {}", s.functionality));
            }
            if !s.unique_features.is_empty() {
                block.push_str(&format!("\n   Unique: {}", s.unique_features.join(", ")));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn designer_prompt(brief: &ThemeBrief, subject: &str) -> String {
    format!(
        "You are a senior Shopify theme developer designing the {subject} of a theme for a {} \
         store targeting {}.\nStyle direction: {}\nBrand positioning: {}\n\nThe result must be \
         substantially different from typical Shopify themes, fit the industry, and work well on \
         mobile and desktop. Respond with valid JSON only.",
        brief.industry,
        brief.target_market,
        brief.style_direction,
        brief.positioning.as_deref().unwrap_or("Premium quality"),
    )
}

fn coder_prompt(ctx: &PhaseContext) -> String {
    system_prompt(
        ctx,
        "coder.md",
        "You are an expert Shopify Liquid developer. Write complete, production-ready theme code: \
         semantic HTML, accessible markup, CSS custom properties for theming, and a valid \
         {% schema %} block for every section.",
    )
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}
