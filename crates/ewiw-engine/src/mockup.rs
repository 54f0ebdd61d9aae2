use std::path::Path;

use anyhow::{Context, Result};
use ewiw_contracts::catalog::{Product, ProductType};
use ewiw_contracts::images::ImagePayload;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

pub const MOCKUP_WIDTH: u32 = 400;
pub const MOCKUP_HEIGHT: u32 = 500;

const FALLBACK_SWATCH: [u8; 3] = [128, 128, 128];

/// RGB value for a catalog swatch name.
pub fn swatch_rgb(name: &str) -> Option<[u8; 3]> {
    let rgb = match name.trim().to_ascii_lowercase().as_str() {
        "black" => [17, 17, 17],
        "white" => [250, 250, 250],
        "gray" | "grey" => [140, 140, 140],
        "silver" => [192, 192, 192],
        "navy" => [20, 33, 61],
        "blue" => [40, 90, 200],
        "red" => [200, 30, 45],
        "green" => [40, 140, 70],
        "yellow" => [240, 210, 60],
        "orange" => [240, 130, 40],
        "purple" => [110, 60, 160],
        "pink" => [240, 150, 180],
        "brown" => [110, 70, 40],
        "beige" => [220, 205, 175],
        "gold" => [212, 175, 55],
        "teal" => [0, 128, 128],
        _ => return None,
    };
    Some(rgb)
}

/// Share of the canvas the printed design may cover, as (width, height, top).
fn print_area(product: ProductType) -> (f32, f32, f32) {
    match product {
        ProductType::Tshirt | ProductType::Shirt | ProductType::Hoodie => (0.5, 0.4, 0.25),
        ProductType::Bottle => (0.4, 0.35, 0.35),
        ProductType::Notebook => (0.7, 0.6, 0.2),
    }
}

/// Composites a design onto a flat product canvas filled with the swatch
/// colour. Unknown swatches fall back to neutral gray.
pub fn render_mockup(design: &ImagePayload, product: &Product, swatch: &str) -> Result<RgbaImage> {
    let [r, g, b] = swatch_rgb(swatch).unwrap_or_else(|| {
        tracing::warn!(swatch, "unknown swatch colour; using gray");
        FALLBACK_SWATCH
    });
    let mut canvas = RgbaImage::from_pixel(MOCKUP_WIDTH, MOCKUP_HEIGHT, Rgba([r, g, b, 255]));

    let decoded = image::load_from_memory(&design.bytes)
        .with_context(|| format!("failed to decode {} design for mockup", design.mime_type))?;
    let (area_w, area_h, top) = print_area(product.key);
    let max_w = (MOCKUP_WIDTH as f32 * area_w) as u32;
    let max_h = (MOCKUP_HEIGHT as f32 * area_h) as u32;
    let fitted = decoded.resize(max_w, max_h, FilterType::Lanczos3).to_rgba8();

    let x = i64::from((MOCKUP_WIDTH - fitted.width()) / 2);
    let y = (MOCKUP_HEIGHT as f32 * top) as i64;
    imageops::overlay(&mut canvas, &fitted, x, y);
    Ok(canvas)
}

pub fn save_mockup(mockup: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    mockup
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    Ok(())
}
