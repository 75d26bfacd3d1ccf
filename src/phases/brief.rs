//! Brief collection and market analysis.

use crate::ai::TaskType;
use crate::context::PhaseContext;
use crate::controller::PhaseHandler;
use crate::operator::{Operator, Prompter};
use crate::phase::Phase;
use crate::phases::{ask_json, bullets, negotiate, system_prompt};
use crate::session::state::{SessionState, ThemeBrief};
use crate::util::slugify;
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const STEP_MARKET_ANALYSIS: &str = "market-analysis";

const STYLE_OPTIONS: [(&str, &str); 6] = [
    ("Minimalist & Clean", "minimalist"),
    ("Bold & Vibrant", "bold"),
    ("Luxury & Elegant", "luxury"),
    ("Warm & Organic", "organic"),
    ("Modern & Technical", "modern"),
    ("Playful & Creative", "playful"),
];

const REQUIRED_ANSWER_ATTEMPTS: usize = 3;

const DEFAULT_PROMPT: &str = r#"You are a senior e-commerce strategist and brand consultant.
Analyze this theme brief and produce a market analysis.

BRIEF:
- Industry/Niche: {{INDUSTRY}}
- Target Market: {{TARGET_MARKET}}
- Style Direction: {{STYLE_DIRECTION}}
- Competitors: {{COMPETITORS}}

Respond with JSON only, in this shape:
{
  "brandName": "...",
  "positioning": "...",
  "targetAudience": { "demographics": "...", "psychographics": "...", "painPoints": ["..."] },
  "differentiation": { "uniqueValue": "...", "competitorGaps": ["..."], "opportunities": ["..."] },
  "themeFeatures": { "mustHave": ["..."], "niceToHave": ["..."], "unique": ["..."] },
  "colorMood": { "primary": "...", "mood": "...", "reasoning": "..." }
}"#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetAudience {
    pub demographics: String,
    pub psychographics: String,
    pub pain_points: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketDifferentiation {
    pub unique_value: String,
    pub competitor_gaps: Vec<String>,
    pub opportunities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThemeFeatures {
    pub must_have: Vec<String>,
    pub nice_to_have: Vec<String>,
    pub unique: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorMood {
    pub primary: String,
    pub mood: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketAnalysis {
    pub brand_name: String,
    pub positioning: String,
    pub target_audience: TargetAudience,
    pub differentiation: MarketDifferentiation,
    pub theme_features: ThemeFeatures,
    pub color_mood: ColorMood,
}

impl MarketAnalysis {
    /// Deterministic analysis derived from the brief alone.
    pub fn fallback(brief: &ThemeBrief) -> Self {
        let first_word = brief.industry.split_whitespace().next().unwrap_or("Theme");
        let industry = brief.industry.to_lowercase();
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            brand_name: format!("{first_word} Store"),
            positioning: format!("Premium {industry} for {}", brief.target_market),
            target_audience: TargetAudience {
                demographics: brief.target_market.clone(),
                psychographics: "Quality-focused, design-conscious consumers".to_string(),
                pain_points: strings(&[
                    "Finding quality products",
                    "Trusting online stores",
                    "Getting good value",
                ]),
            },
            differentiation: MarketDifferentiation {
                unique_value: format!("Curated {industry} with exceptional design"),
                competitor_gaps: strings(&[
                    "Better user experience",
                    "Stronger visual identity",
                    "More engaging content",
                ]),
                opportunities: strings(&["Niche positioning", "Premium branding", "Community building"]),
            },
            theme_features: ThemeFeatures {
                must_have: strings(&["Quick shop", "Product filtering", "Mobile-first design"]),
                nice_to_have: strings(&["Wishlist", "Size guide", "Product comparisons"]),
                unique: strings(&["Style quiz", "Shop the look"]),
            },
            color_mood: ColorMood {
                primary: if brief.style_direction == "luxury" {
                    "Deep navy or black".to_string()
                } else {
                    "Warm neutral".to_string()
                },
                mood: brief.style_direction.clone(),
                reasoning: format!(
                    "Aligns with the {} aesthetic and target market expectations",
                    brief.style_direction
                ),
            },
        }
    }

    pub fn render(&self) -> String {
        format!(
            "BRAND NAME: {}\n\nPOSITIONING\n{}\n\nTARGET AUDIENCE\nDemographics: {}\nPsychographics: {}\nPain points:\n{}\n\n\
             DIFFERENTIATION\nUnique value: {}\nCompetitor gaps:\n{}\nOpportunities:\n{}\n\n\
             THEME FEATURES\nMust have:\n{}\nNice to have:\n{}\nUnique:\n{}\n\n\
             COLOR & MOOD\nPrimary: {}\nMood: {}\nReasoning: {}",
            self.brand_name,
            self.positioning,
            self.target_audience.demographics,
            self.target_audience.psychographics,
            bullets(&self.target_audience.pain_points),
            self.differentiation.unique_value,
            bullets(&self.differentiation.competitor_gaps),
            bullets(&self.differentiation.opportunities),
            bullets(&self.theme_features.must_have),
            bullets(&self.theme_features.nice_to_have),
            bullets(&self.theme_features.unique),
            self.color_mood.primary,
            self.color_mood.mood,
            self.color_mood.reasoning,
        )
    }
}

pub struct BriefPhase;

#[async_trait]
impl PhaseHandler for BriefPhase {
    fn phase(&self) -> Phase {
        Phase::Brief
    }

    async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> Result<()> {
        let brief = match session.brief.clone() {
            Some(brief) => {
                ctx.console.info("Using the brief collected earlier");
                brief
            }
            None => {
                ctx.console.section("Theme Brief");
                let brief = collect_brief(ctx.operator.as_ref())?;
                session.brief = Some(brief.clone());
                brief
            }
        };

        ctx.console.section("Market Analysis");
        let system = fill_template(
            &system_prompt(ctx, "market-analysis.md", DEFAULT_PROMPT),
            &brief,
        );
        let negotiated = negotiate(
            ctx,
            session,
            Phase::Brief,
            STEP_MARKET_ANALYSIS,
            |feedback| generate_analysis(ctx, &system, &brief, feedback),
            |analysis: &MarketAnalysis| {
                ctx.console
                    .proposal("Market Analysis Proposal", &analysis.render())
            },
        )
        .await?;

        let analysis = (!negotiated.skipped).then_some(negotiated.artifact);
        apply_analysis(session, &brief, analysis.as_ref());
        ctx.console
            .success(&format!("Brief complete for {}", session.theme_name));
        Ok(())
    }
}

fn collect_brief(operator: &dyn Operator) -> Result<ThemeBrief> {
    let industry = required_text(operator, "What industry or niche is this theme for?")?;
    let target_market = required_text(operator, "Describe your target customer")?;
    let labels: Vec<String> = STYLE_OPTIONS.iter().map(|(l, _)| l.to_string()).collect();
    let style = operator.select("What overall style direction?", &labels, 0)?;
    let competitors = operator.list("Competitor store URL")?;
    Ok(ThemeBrief {
        industry,
        target_market,
        style_direction: STYLE_OPTIONS[style].1.to_string(),
        competitors,
        brand_name: None,
        positioning: None,
    })
}

fn required_text(operator: &dyn Operator, prompt: &str) -> Result<String> {
    for _ in 0..REQUIRED_ANSWER_ATTEMPTS {
        let answer = operator.text(prompt, None)?;
        let answer = answer.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
    }
    bail!("No answer given for: {prompt}")
}

fn fill_template(template: &str, brief: &ThemeBrief) -> String {
    let competitors = if brief.competitors.is_empty() {
        "None provided".to_string()
    } else {
        brief.competitors.join(", ")
    };
    template
        .replace("{{INDUSTRY}}", &brief.industry)
        .replace("{{TARGET_MARKET}}", &brief.target_market)
        .replace("{{STYLE_DIRECTION}}", &brief.style_direction)
        .replace("{{COMPETITORS}}", &competitors)
}

async fn generate_analysis(
    ctx: &PhaseContext,
    system: &str,
    brief: &ThemeBrief,
    feedback: Option<String>,
) -> Result<MarketAnalysis> {
    let outcome = ask_json::<MarketAnalysis>(
        ctx,
        TaskType::Planning,
        system,
        "Generate the market analysis now. Respond with valid JSON only.",
        feedback.as_deref(),
    )
    .await?
    .or_fallback(STEP_MARKET_ANALYSIS, || MarketAnalysis::fallback(brief));
    if outcome.is_fallback() {
        ctx.console
            .warning("The analysis was not valid JSON; showing a default analysis instead");
    }
    Ok(outcome.into_result()?)
}

/// Copy the accepted analysis onto the brief and name the theme.
fn apply_analysis(session: &mut SessionState, brief: &ThemeBrief, analysis: Option<&MarketAnalysis>) {
    let mut brief = brief.clone();
    let brand_name = analysis
        .map(|a| a.brand_name.trim().to_string())
        .filter(|name| !name.is_empty());
    if let Some(analysis) = analysis
        && !analysis.positioning.trim().is_empty()
    {
        brief.positioning = Some(analysis.positioning.clone());
    }
    brief.brand_name = brand_name.clone();
    session.theme_name = brand_name.unwrap_or_else(|| slugify(&brief.industry));
    session.brief = Some(brief);
}
