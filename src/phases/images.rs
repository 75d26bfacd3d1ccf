//! Product photography: an approved studio shot per product, then angle and lifestyle variations.

use crate::context::PhaseContext;
use crate::controller::PhaseHandler;
use crate::errors::PhaseError;
use crate::images::{
    ANGLE_VARIANTS, ImageKind, ImageResult, LIFESTYLE_VARIANTS, angle_prompt, lifestyle_prompt,
    studio_prompt,
};
use crate::operator::Prompter;
use crate::phase::Phase;
use crate::phases::negotiate;
use crate::session::state::{ImageManifest, Product, ProductImages, SessionState};
use crate::ui::icons::CAMERA;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub fn studio_step(product_id: &str) -> String {
    format!("studio-{product_id}")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry<'a> {
    id: &'a str,
    name: &'a str,
    images: &'a ProductImages,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFile<'a> {
    theme_name: &'a str,
    generated_at: chrono::DateTime<Utc>,
    products: Vec<ManifestEntry<'a>>,
}

pub struct ImagesPhase;

#[async_trait]
impl PhaseHandler for ImagesPhase {
    fn phase(&self) -> Phase {
        Phase::Images
    }

    async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> Result<()> {
        let style = session
            .brief
            .as_ref()
            .map(|b| b.style_direction.clone())
            .ok_or(PhaseError::MissingPrerequisite {
                phase: Phase::Images,
                requirement: "a completed brief",
            })?;
        if session.products.is_empty() {
            return Err(PhaseError::MissingPrerequisite {
                phase: Phase::Images,
                requirement: "a product catalog",
            }
            .into());
        }
        let target_market = session
            .brief
            .as_ref()
            .map(|b| b.target_market.clone())
            .unwrap_or_default();

        let generation = &ctx.config.generation;
        let angles = &ANGLE_VARIANTS[..generation.angles_per_product.min(ANGLE_VARIANTS.len())];
        let lifestyle =
            &LIFESTYLE_VARIANTS[..generation.lifestyle_per_product.min(LIFESTYLE_VARIANTS.len())];
        let per_product = 1 + angles.len() + lifestyle.len();
        let images_dir = ctx.output_dir(&session.output_name()).join("images");

        ctx.console.section("Image Generation");
        ctx.console.key_value("Products", session.products.len());
        ctx.console.key_value(
            "Images per product",
            format!("{per_product} (1 studio + {} angles + {} lifestyle)", angles.len(), lifestyle.len()),
        );
        ctx.console
            .key_value("Total images", session.products.len() * per_product);
        if !ctx.operator.confirm("Ready to begin image generation?", true)? {
            bail!("Image generation postponed; resume the session to continue");
        }

        let total = session.products.len();
        for index in 0..total {
            let product = session.products[index].clone();
            if !product.images.is_empty() {
                tracing::debug!(product = %product.id, "Images already generated");
                continue;
            }
            ctx.console.section(&format!(
                "{CAMERA}Product {}/{total}: {}",
                index + 1,
                product.name
            ));
            let product_dir = images_dir.join(&product.id);
            let images = product_images(
                ctx,
                session,
                &product,
                &style,
                &target_market,
                angles,
                lifestyle,
                &product_dir,
            )
            .await?;
            ctx.console.key_value(
                "Saved",
                format!("{}/{per_product} images", images.count()),
            );
            session.products[index].images = images;
            write_manifest(&images_dir, session).await?;
        }

        let image_count: usize = session.products.iter().map(|p| p.images.count()).sum();
        let expected = session.products.len() * per_product;
        session.image_manifest = Some(ImageManifest {
            path: images_dir.join("manifest.json"),
            generated_at: Utc::now(),
            product_count: session.products.len(),
            image_count,
            failed_count: expected.saturating_sub(image_count),
        });
        write_manifest(&images_dir, session).await?;
        tracing::info!(image_count, expected, "Image generation finished");
        ctx.console.success(&format!(
            "Generated {image_count} of {expected} images for {} products",
            session.products.len()
        ));
        ctx.console.path("Images saved to", &images_dir);
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn product_images(
    ctx: &PhaseContext,
    session: &mut SessionState,
    product: &Product,
    style: &str,
    target_market: &str,
    angles: &[&str],
    lifestyle: &[&str],
    product_dir: &Path,
) -> Result<ProductImages> {
    let step = studio_step(&product.id);
    let title = format!("Studio Shot: {}", product.name);
    let negotiated = negotiate(
        ctx,
        session,
        Phase::Images,
        &step,
        |feedback| async move {
            let prompt = studio_prompt(&product.name, &product.description, style, feedback.as_deref());
            let spinner = ctx.console.spinner("Generating studio image...");
            let result = ctx.images.generate(&prompt, ImageKind::Studio, None).await;
            spinner.finish_and_clear();
            Ok(result)
        },
        |result: &ImageResult| ctx.console.proposal(&title, &describe(result)),
    )
    .await?;

    let mut images = ProductImages::default();
    let studio = negotiated.artifact;
    if !negotiated.skipped
        && let Some(url) = &studio.image_url
    {
        images.studio = save(ctx, url, &product_dir.join("studio-main.png")).await;
    }

    images.angles = variations(ctx, product_dir, angles, "angle", |variant| {
        (ImageKind::Angle, angle_prompt(&product.name, style, variant))
    })
    .await;
    images.lifestyle = variations(ctx, product_dir, lifestyle, "lifestyle", |variant| {
        (
            ImageKind::Lifestyle,
            lifestyle_prompt(&product.name, style, target_market, variant),
        )
    })
    .await;
    Ok(images)
}

async fn variations(
    ctx: &PhaseContext,
    product_dir: &Path,
    variants: &[&str],
    label: &str,
    prompt_for: impl Fn(&str) -> (ImageKind, String),
) -> Vec<String> {
    let bar = ctx.console.progress(variants.len() as u64, label);
    let mut saved = Vec::new();
    for &variant in variants {
        let (kind, prompt) = prompt_for(variant);
        bar.set_message(variant.to_string());
        let result = ctx.images.generate(&prompt, kind, Some(variant)).await;
        match &result.image_url {
            Some(url) => {
                let dest = product_dir.join(format!("{label}-{variant}.png"));
                if let Some(path) = save(ctx, url, &dest).await {
                    saved.push(path);
                }
            }
            None => {
                let reason = result.error.as_deref().unwrap_or("no output");
                tracing::warn!(variant, reason, "Variation failed");
                ctx.console
                    .warning(&format!("Failed: {label}-{variant} ({reason})"));
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    saved
}

/// Download to `dest`, returning the saved path. Failures are reported and skipped.
async fn save(ctx: &PhaseContext, url: &str, dest: &Path) -> Option<String> {
    match ctx.images.download(url, dest).await {
        Ok(()) => Some(dest.display().to_string()),
        Err(e) => {
            tracing::warn!(url, error = %e, "Image download failed");
            ctx.console.warning(&format!("Could not download {url}: {e}"));
            None
        }
    }
}

fn describe(result: &ImageResult) -> String {
    match (&result.image_url, &result.error) {
        (Some(url), _) => format!("Image: {url}\n\nPrompt: {}", result.prompt),
        (None, Some(error)) => format!(
            "Generation failed: {error}\n\nRequest changes to try again, or accept to continue without a studio shot."
        ),
        (None, None) => "No image was returned.".to_string(),
    }
}

async fn write_manifest(images_dir: &Path, session: &SessionState) -> Result<PathBuf> {
    let manifest = ManifestFile {
        theme_name: &session.theme_name,
        generated_at: Utc::now(),
        products: session
            .products
            .iter()
            .map(|p| ManifestEntry {
                id: &p.id,
                name: &p.name,
                images: &p.images,
            })
            .collect(),
    };
    let path = images_dir.join("manifest.json");
    tokio::fs::create_dir_all(images_dir)
        .await
        .with_context(|| format!("Failed to create {}", images_dir.display()))?;
    let json = serde_json::to_string_pretty(&manifest).context("Failed to serialize image manifest")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
