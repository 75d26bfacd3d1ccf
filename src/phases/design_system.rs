//! Design system: color schemes, typography, spacing and button styles.

use crate::ai::TaskType;
use crate::context::PhaseContext;
use crate::controller::PhaseHandler;
use crate::errors::PhaseError;
use crate::generate::ParseOutcome;
use crate::operator::Prompter;
use crate::phase::Phase;
use crate::phases::{ask_json, negotiate, system_prompt};
use crate::session::state::{
    ButtonConfig, ButtonStyle, ColorScheme, CornerStyle, DesignSystem, SessionState, SpacingConfig,
    ThemeBrief, TypographyConfig,
};
use crate::ui::icons::PALETTE;
use crate::util::title_case;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::LazyLock;

pub const STEP_COLOR_SCHEMES: &str = "color-schemes";
pub const STEP_TYPOGRAPHY: &str = "typography";
pub const STEP_SPACING: &str = "spacing";
pub const STEP_BUTTONS: &str = "buttons";

const SCHEME_COUNT: usize = 5;

static HEX_COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("hex color pattern is valid")
});

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SchemesResponse {
    Wrapped {
        #[serde(rename = "colorSchemes", alias = "schemes")]
        color_schemes: Vec<ColorScheme>,
    },
    Bare(Vec<ColorScheme>),
}

pub struct DesignSystemPhase;

#[async_trait]
impl PhaseHandler for DesignSystemPhase {
    fn phase(&self) -> Phase {
        Phase::DesignSystem
    }

    async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> Result<()> {
        let brief = session
            .brief
            .clone()
            .ok_or(PhaseError::MissingPrerequisite {
                phase: Phase::DesignSystem,
                requirement: "a completed brief",
            })?;
        let prompt = system_prompt(ctx, "design-system.md", &designer_prompt(&brief));
        let system = prompt.as_str();

        ctx.console.section(&format!("{PALETTE}Design System"));
        ctx.console
            .info("Creating a cohesive visual system for the theme");

        ctx.console.section("Step 1: Color Schemes");
        let schemes = negotiate(
            ctx,
            session,
            Phase::DesignSystem,
            STEP_COLOR_SCHEMES,
            |feedback| async move {
                let request = format!(
                    "Generate {SCHEME_COUNT} color schemes. Respond with a JSON array of \
                     {{\"name\", \"primary\", \"secondary\", \"accent\", \"background\", \"text\", \
                     \"description\"}} using 6-digit hex colors."
                );
                let outcome = ask_json::<SchemesResponse>(
                    ctx,
                    TaskType::Planning,
                    system,
                    &request,
                    feedback.as_deref(),
                )
                .await?
                .map(|response| match response {
                    SchemesResponse::Wrapped { color_schemes } | SchemesResponse::Bare(color_schemes) => {
                        valid_schemes(color_schemes)
                    }
                });
                let outcome = match outcome {
                    ParseOutcome::Parsed(schemes) if schemes.is_empty() => {
                        ParseOutcome::Failed("no valid color schemes".to_string())
                    }
                    other => other,
                }
                .or_fallback(STEP_COLOR_SCHEMES, fallback_schemes);
                Ok(outcome.into_result()?)
            },
            |schemes: &Vec<ColorScheme>| ctx.console.proposal("Color Schemes", &render_schemes(schemes)),
        )
        .await?;
        let color_schemes = if schemes.skipped {
            ctx.console.info("Using the default color schemes");
            fallback_schemes()
        } else {
            schemes.artifact
        };
        let choices: Vec<String> = color_schemes
            .iter()
            .map(|s| format!("{} (primary {})", s.name, s.primary))
            .collect();
        let default_scheme = ctx
            .operator
            .select("Which color scheme should be the default?", &choices, 0)?;
        ctx.console
            .success(&format!("Selected: {}", color_schemes[default_scheme].name));

        ctx.console.section("Step 2: Typography");
        let typography = design_step(
            ctx,
            session,
            STEP_TYPOGRAPHY,
            system,
            "Propose a heading and body font pairing from Google Fonts. Respond with JSON \
             {\"headingFont\", \"bodyFont\", \"headingWeight\", \"bodyWeight\", \"baseSizePx\", \
             \"scaleRatio\"}.",
            || fallback_typography(&brief.style_direction),
            render_typography,
        )
        .await?;

        ctx.console.section("Step 3: Spacing & Layout");
        let spacing = design_step(
            ctx,
            session,
            STEP_SPACING,
            system,
            "Propose a spacing system. Respond with JSON {\"baseUnitPx\", \"sectionPaddingPx\", \
             \"gridGapPx\"}.",
            fallback_spacing,
            render_spacing,
        )
        .await?;

        ctx.console.section("Step 4: Button Styles");
        let buttons = design_step(
            ctx,
            session,
            STEP_BUTTONS,
            system,
            "Propose the button style. Respond with JSON {\"style\": \"filled|outline|ghost\", \
             \"radiusPx\", \"paddingXPx\", \"paddingYPx\", \"uppercase\"}.",
            || fallback_buttons(&brief.style_direction),
            render_buttons,
        )
        .await?;

        let design = DesignSystem {
            color_schemes,
            default_scheme,
            typography,
            spacing,
            corners: corners_for(buttons.radius_px),
            buttons,
        };
        tracing::info!(
            schemes = design.color_schemes.len(),
            default_scheme,
            heading_font = %design.typography.heading_font,
            "Design system resolved"
        );
        ctx.console.success("Design system complete");
        session.design_system = Some(design);
        Ok(())
    }
}

/// Negotiate one design token group; a skipped step falls back to the defaults.
async fn design_step<T, F, R>(
    ctx: &PhaseContext,
    session: &mut SessionState,
    step: &str,
    system: &str,
    request: &str,
    fallback: F,
    render: R,
) -> Result<T>
where
    T: serde::Serialize + DeserializeOwned,
    F: Fn() -> T,
    R: Fn(&T) -> String,
{
    let title = title_case(step);
    let fallback = &fallback;
    let negotiated = negotiate(
        ctx,
        session,
        Phase::DesignSystem,
        step,
        |feedback| async move {
            let outcome = ask_json::<T>(ctx, TaskType::Planning, system, request, feedback.as_deref())
                .await?
                .or_fallback(step, fallback);
            Ok(outcome.into_result()?)
        },
        |value: &T| ctx.console.proposal(&title, &render(value)),
    )
    .await?;
    if negotiated.skipped {
        ctx.console.info(&format!("Using the default {step}"));
        return Ok(fallback());
    }
    Ok(negotiated.artifact)
}

/// Shopify `config/settings_data.json` for the design system.
pub fn settings_data(design: &DesignSystem) -> Value {
    let scheme = design.selected_scheme();
    let color = |pick: fn(&ColorScheme) -> &str| scheme.map(pick).unwrap_or_default().to_string();
    let t = &design.typography;
    let b = &design.buttons;
    let text_transform = if b.uppercase { "uppercase" } else { "none" };
    json!({
        "current": {
            "sections": {},
            "blocks": {},
            "settings": {
                "colors_primary": color(|s| s.primary.as_str()),
                "colors_secondary": color(|s| s.secondary.as_str()),
                "colors_accent": color(|s| s.accent.as_str()),
                "colors_background": color(|s| s.background.as_str()),
                "colors_text": color(|s| s.text.as_str()),
                "type_heading_font": t.heading_font,
                "type_heading_weight": t.heading_weight,
                "type_body_font": t.body_font,
                "type_body_weight": t.body_weight,
                "type_base_size": t.base_size_px,
                "type_scale": t.scale_ratio,
                "spacing_base": design.spacing.base_unit_px,
                "spacing_section": design.spacing.section_padding_px,
                "layout_grid_gap": design.spacing.grid_gap_px,
                "button_style": b.style,
                "button_border_radius": b.radius_px,
                "button_padding_x": b.padding_x_px,
                "button_padding_y": b.padding_y_px,
                "button_text_transform": text_transform,
                "corner_style": design.corners,
            }
        },
        "presets": {
            "default": {
                "settings": {},
                "sections": {},
                "blocks": {}
            }
        }
    })
}

/// CSS custom properties for the design system, written to `assets/design-system.css`.
pub fn css_variables(design: &DesignSystem) -> String {
    let mut css = String::from(":root {\n");
    let mut var = |name: &str, value: String| css.push_str(&format!("  --{name}: {value};\n"));

    if let Some(scheme) = design.selected_scheme() {
        var("color-primary", scheme.primary.clone());
        var("color-secondary", scheme.secondary.clone());
        var("color-accent", scheme.accent.clone());
        var("color-background", scheme.background.clone());
        var("color-text", scheme.text.clone());
    }

    let t = &design.typography;
    var("font-heading", format!("\"{}\", serif", t.heading_font));
    var("font-body", format!("\"{}\", sans-serif", t.body_font));
    var("font-weight-heading", t.heading_weight.to_string());
    var("font-weight-body", t.body_weight.to_string());
    var("font-size-base", format!("{}px", t.base_size_px));
    var("type-scale", t.scale_ratio.to_string());
    var("font-size-sm", "calc(var(--font-size-base) / var(--type-scale))".to_string());
    var("font-size-lg", "calc(var(--font-size-base) * var(--type-scale))".to_string());
    var(
        "font-size-xl",
        "calc(var(--font-size-base) * var(--type-scale) * var(--type-scale))".to_string(),
    );

    let s = &design.spacing;
    var("spacing-unit", format!("{}px", s.base_unit_px));
    for (name, factor) in [("xs", 1), ("sm", 2), ("md", 4), ("lg", 6), ("xl", 8)] {
        var(
            &format!("spacing-{name}"),
            format!("calc(var(--spacing-unit) * {factor})"),
        );
    }
    var("section-padding", format!("{}px", s.section_padding_px));
    var("grid-gap", format!("{}px", s.grid_gap_px));

    let b = &design.buttons;
    var("button-radius", format!("{}px", b.radius_px));
    var("button-padding-x", format!("{}px", b.padding_x_px));
    var("button-padding-y", format!("{}px", b.padding_y_px));
    var(
        "button-text-transform",
        if b.uppercase { "uppercase" } else { "none" }.to_string(),
    );

    let radius = match design.corners {
        CornerStyle::Sharp => "0",
        CornerStyle::Rounded => "8px",
        CornerStyle::Pill => "9999px",
    };
    var("radius", radius.to_string());
    css.push_str("}\n");
    css
}

fn valid_schemes(schemes: Vec<ColorScheme>) -> Vec<ColorScheme> {
    schemes
        .into_iter()
        .filter(|s| {
            [&s.primary, &s.secondary, &s.accent, &s.background, &s.text]
                .iter()
                .all(|c| HEX_COLOR_RE.is_match(c.trim()))
        })
        .take(SCHEME_COUNT)
        .collect()
}

fn corners_for(radius_px: u32) -> CornerStyle {
    match radius_px {
        0 => CornerStyle::Sharp,
        1..=23 => CornerStyle::Rounded,
        _ => CornerStyle::Pill,
    }
}

fn fallback_schemes() -> Vec<ColorScheme> {
    [
        ("Classic", "#1a1a1a", "#4a4a4a", "#c8a165", "#ffffff", "#1a1a1a", "Timeless neutrals with a warm accent"),
        ("Forest", "#2f4a3a", "#6b8f71", "#d9a441", "#f7f5ef", "#1f2a24", "Deep greens on a natural off-white"),
        ("Ocean", "#0f3d5e", "#3c7ea6", "#f2994a", "#f5f9fc", "#102a3c", "Cool blues with a sunset highlight"),
        ("Blush", "#8c3b4a", "#d98c9a", "#3b6b8c", "#fff7f6", "#2b1a1d", "Soft rose tones with a cool contrast"),
        ("Midnight", "#e6e6e6", "#9a9a9a", "#7c5cff", "#121212", "#f2f2f2", "Dark mode with an electric accent"),
    ]
    .into_iter()
    .map(|(name, primary, secondary, accent, background, text, description)| ColorScheme {
        name: name.to_string(),
        primary: primary.to_string(),
        secondary: secondary.to_string(),
        accent: accent.to_string(),
        background: background.to_string(),
        text: text.to_string(),
        description: description.to_string(),
    })
    .collect()
}

fn fallback_typography(style: &str) -> TypographyConfig {
    let (heading, body, ratio) = match style {
        "luxury" => ("Playfair Display", "Lato", 1.333),
        "bold" => ("Archivo Black", "Inter", 1.414),
        "organic" => ("Fraunces", "Nunito Sans", 1.25),
        "modern" => ("Space Grotesk", "IBM Plex Sans", 1.25),
        "playful" => ("Baloo 2", "Quicksand", 1.333),
        _ => ("Inter", "Inter", 1.25),
    };
    TypographyConfig {
        heading_font: heading.to_string(),
        body_font: body.to_string(),
        heading_weight: 700,
        body_weight: 400,
        base_size_px: 16,
        scale_ratio: ratio,
    }
}

fn fallback_spacing() -> SpacingConfig {
    SpacingConfig {
        base_unit_px: 8,
        section_padding_px: 64,
        grid_gap_px: 24,
    }
}

fn fallback_buttons(style: &str) -> ButtonConfig {
    let (button_style, radius_px, uppercase) = match style {
        "luxury" => (ButtonStyle::Outline, 0, true),
        "playful" => (ButtonStyle::Filled, 9999, false),
        "minimalist" => (ButtonStyle::Ghost, 4, false),
        _ => (ButtonStyle::Filled, 8, false),
    };
    ButtonConfig {
        style: button_style,
        radius_px,
        padding_x_px: 24,
        padding_y_px: 12,
        uppercase,
    }
}

fn render_schemes(schemes: &[ColorScheme]) -> String {
    schemes
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{}. {}\n   Primary {}  Secondary {}  Accent {}\n   Background {}  Text {}\n   {}",
                i + 1,
                s.name,
                s.primary,
                s.secondary,
                s.accent,
                s.background,
                s.text,
                s.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_typography(t: &TypographyConfig) -> String {
    format!(
        "Headings: {} ({})\nBody: {} ({})\nBase size: {}px\nScale ratio: {}",
        t.heading_font, t.heading_weight, t.body_font, t.body_weight, t.base_size_px, t.scale_ratio
    )
}

fn render_spacing(s: &SpacingConfig) -> String {
    format!(
        "Base unit: {}px\nSection padding: {}px\nGrid gap: {}px",
        s.base_unit_px, s.section_padding_px, s.grid_gap_px
    )
}

fn render_buttons(b: &ButtonConfig) -> String {
    format!(
        "Style: {:?}\nRadius: {}px\nPadding: {}px x {}px\nUppercase: {}",
        b.style, b.radius_px, b.padding_y_px, b.padding_x_px, b.uppercase
    )
}

fn designer_prompt(brief: &ThemeBrief) -> String {
    format!(
        "You are a senior brand and UI designer creating the design system for a Shopify theme.\n\
         Industry: {}\nTarget market: {}\nStyle direction: {}\nBrand: {}\n\n\
         Choose values that are accessible (WCAG AA contrast), cohesive and distinctive. \
         Respond with valid JSON only.",
        brief.industry,
        brief.target_market,
        brief.style_direction,
        brief.brand_name.as_deref().unwrap_or(&brief.industry),
    )
}
