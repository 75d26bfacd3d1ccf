//! Product catalog generation.

use crate::ai::TaskType;
use crate::context::PhaseContext;
use crate::controller::PhaseHandler;
use crate::errors::PhaseError;
use crate::generate::ParseOutcome;
use crate::operator::Prompter;
use crate::phase::Phase;
use crate::phases::{ask_json, negotiate};
use crate::session::state::{Product, ProductImages, ProductVariant, SessionState, ThemeBrief};
use crate::util::slugify;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

pub const STEP_PRODUCT_CATALOG: &str = "product-catalog";

const MIN_PRODUCTS: usize = 1;
const MAX_PRODUCTS: usize = 50;

/// Price tiers cycled by the fallback catalog: budget, mid-range, premium.
const PRICE_TIERS: [(f64, f64); 3] = [(19.99, 39.99), (49.99, 89.99), (99.99, 199.99)];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogResponse {
    Wrapped { products: Vec<Product> },
    Bare(Vec<Product>),
}

impl CatalogResponse {
    fn into_products(self) -> Vec<Product> {
        match self {
            CatalogResponse::Wrapped { products } | CatalogResponse::Bare(products) => products,
        }
    }
}

pub struct ProductsPhase;

#[async_trait]
impl PhaseHandler for ProductsPhase {
    fn phase(&self) -> Phase {
        Phase::Products
    }

    async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> Result<()> {
        let brief = session
            .brief
            .clone()
            .ok_or(PhaseError::MissingPrerequisite {
                phase: Phase::Products,
                requirement: "a completed brief",
            })?;

        ctx.console.section("Product Catalog");
        let count = product_count(ctx)?;
        let system = catalog_prompt(&brief, count);

        let negotiated = negotiate(
            ctx,
            session,
            Phase::Products,
            STEP_PRODUCT_CATALOG,
            |feedback| generate_catalog(ctx, &system, &brief, count, feedback),
            |products: &Vec<Product>| ctx.console.proposal("Product Catalog", &render_catalog(products)),
        )
        .await?;

        let products = if negotiated.skipped {
            ctx.console
                .warning("Catalog skipped; using the default catalog so later phases have products");
            fallback_catalog(&brief, count)
        } else {
            negotiated.artifact
        };
        tracing::info!(products = products.len(), "Product catalog resolved");
        ctx.console
            .success(&format!("{} products in the catalog", products.len()));
        session.products = products;
        Ok(())
    }
}

fn product_count(ctx: &PhaseContext) -> Result<usize> {
    let default = ctx.config.generation.products_count;
    if ctx
        .operator
        .confirm(&format!("Generate {default} products?"), true)?
    {
        return Ok(default);
    }
    let answer = ctx
        .operator
        .text("How many products?", Some(&default.to_string()))?;
    Ok(parse_count(&answer, default))
}

fn parse_count(answer: &str, default: usize) -> usize {
    answer
        .trim()
        .parse::<usize>()
        .unwrap_or(default)
        .clamp(MIN_PRODUCTS, MAX_PRODUCTS)
}

fn catalog_prompt(brief: &ThemeBrief, count: usize) -> String {
    format!(
        "You are an expert e-commerce product manager and copywriter. Generate a realistic \
         product catalog for a {industry} store targeting {market}.\n\n\
         BRAND: {brand}\nSTYLE: {style}\nPOSITIONING: {positioning}\n\n\
         Generate exactly {count} products with varied price points, a mix of product types, \
         and 2-4 variants where appropriate. Respond with JSON only:\n\
         {{\"products\": [{{\"id\": \"product-handle\", \"name\": \"...\", \"description\": \"...\", \
         \"price\": 49.99, \"compareAtPrice\": 69.99, \"category\": \"...\", \"collection\": \"...\", \
         \"tags\": [\"...\"], \"variants\": [{{\"title\": \"Small\", \"sku\": \"PROD-S\", \"inventory\": 25}}]}}]}}",
        industry = brief.industry,
        market = brief.target_market,
        brand = brief.brand_name.as_deref().unwrap_or(&brief.industry),
        style = brief.style_direction,
        positioning = brief.positioning.as_deref().unwrap_or("Premium quality products"),
    )
}

async fn generate_catalog(
    ctx: &PhaseContext,
    system: &str,
    brief: &ThemeBrief,
    count: usize,
    feedback: Option<String>,
) -> Result<Vec<Product>> {
    let request = format!("Generate {count} products now. Respond with valid JSON only.");
    let outcome = match ask_json::<CatalogResponse>(
        ctx,
        TaskType::Planning,
        system,
        &request,
        feedback.as_deref(),
    )
    .await?
    .map(CatalogResponse::into_products)
    {
        ParseOutcome::Parsed(products) if products.is_empty() => {
            ParseOutcome::Failed("catalog contained no products".to_string())
        }
        other => other,
    }
    .or_fallback(STEP_PRODUCT_CATALOG, || fallback_catalog(brief, count));

    if outcome.is_fallback() {
        ctx.console
            .warning("Could not read the generated catalog; showing the default catalog");
    }
    Ok(normalize(outcome.into_result()?))
}

/// Unique, non-empty ids and no image references.
fn normalize(products: Vec<Product>) -> Vec<Product> {
    let mut seen = HashSet::new();
    products
        .into_iter()
        .enumerate()
        .map(|(i, mut product)| {
            let mut id = slugify(&product.id);
            if id.is_empty() {
                id = slugify(&product.name);
            }
            if id.is_empty() {
                id = format!("product-{}", i + 1);
            }
            if !seen.insert(id.clone()) {
                id = format!("{id}-{}", i + 1);
                seen.insert(id.clone());
            }
            product.id = id;
            product.images = ProductImages::default();
            product
        })
        .collect()
}

/// Deterministic catalog built from the brief.
pub fn fallback_catalog(brief: &ThemeBrief, count: usize) -> Vec<Product> {
    let brand = brief.brand_name.as_deref().unwrap_or("Our Store");
    (1..=count)
        .map(|i| {
            let (min, max) = PRICE_TIERS[i % PRICE_TIERS.len()];
            let step = (i * 37 % 100) as f64 / 100.0;
            let price = ((min + (max - min) * step) * 100.0).round() / 100.0;
            let collection = match i {
                1..=5 => "New Arrivals",
                6..=10 => "Best Sellers",
                _ => "All Products",
            };
            Product {
                id: format!("product-{i}"),
                name: format!("{} Product {i}", brief.industry),
                description: format!(
                    "High-quality {} product designed for {}. Premium materials and craftsmanship.",
                    brief.industry.to_lowercase(),
                    brief.target_market
                ),
                price,
                compare_at_price: Some((price * 1.3 * 100.0).round() / 100.0),
                category: format!("Category {}", i.div_ceil(5)),
                collection: collection.to_string(),
                tags: vec![slugify(&brief.industry), slugify(brand)],
                variants: vec![ProductVariant {
                    title: "Default".to_string(),
                    sku: Some(format!("PROD-{i}")),
                    inventory: 25,
                }],
                images: ProductImages::default(),
            }
        })
        .collect()
}

fn render_catalog(products: &[Product]) -> String {
    if products.is_empty() {
        return "No products".to_string();
    }
    let mut by_category: BTreeMap<&str, Vec<&Product>> = BTreeMap::new();
    for product in products {
        by_category.entry(product.category.as_str()).or_default().push(product);
    }
    let prices = products.iter().map(|p| p.price);
    let min = prices.clone().fold(f64::INFINITY, f64::min);
    let max = prices.clone().fold(f64::NEG_INFINITY, f64::max);
    let avg = prices.sum::<f64>() / products.len() as f64;

    let mut out = format!(
        "Total products: {}\nCategories: {}\nPrice range: ${min:.2} - ${max:.2}\nAverage price: ${avg:.2}\n",
        products.len(),
        by_category.len()
    );
    for (category, items) in &by_category {
        out.push_str(&format!("\n{category} ({} products)\n", items.len()));
        for product in items {
            let sale = if product.compare_at_price.is_some() { " [SALE]" } else { "" };
            out.push_str(&format!(
                "  {}{sale}: ${:.2}, {} variant(s), {}\n",
                product.name,
                product.price,
                product.variants.len().max(1),
                product.collection
            ));
        }
    }
    let collections: Vec<&str> = {
        let mut seen = HashSet::new();
        products
            .iter()
            .map(|p| p.collection.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    };
    out.push_str(&format!("\nCollections: {}", collections.join(", ")));
    out
}
