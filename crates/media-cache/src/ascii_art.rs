//! Deterministic image-to-text rendering.

use image::imageops::FilterType;

use crate::error::MediaCacheError;

/// Density characters from darkest to lightest pixel.
pub const DENSITY_RAMP: [char; 10] = ['@', '%', '#', '*', '+', '=', '-', ':', '.', ' '];

/// Terminal cells are roughly twice as tall as they are wide.
const CELL_ASPECT: f64 = 0.5;

/// Maximum size of the rendered art, frame excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtBounds {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ArtBounds {
    fn default() -> Self {
        Self {
            max_width: 50,
            max_height: 25,
        }
    }
}

/// Render encoded image bytes as framed ASCII art.
pub fn render_ascii_art(bytes: &[u8], bounds: ArtBounds) -> Result<String, MediaCacheError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|err| MediaCacheError::Decode(err.to_string()))?;
    let gray = decoded.to_luma8();
    let (width, height) = fit_cells(gray.width(), gray.height(), bounds);
    let scaled = image::imageops::resize(&gray, width, height, FilterType::Triangle);

    let border = format!("+{}+", "-".repeat(width as usize));
    let mut out = String::with_capacity((width as usize + 3) * (height as usize + 2));
    out.push_str(&border);
    out.push('\n');
    for y in 0..height {
        out.push('|');
        for x in 0..width {
            out.push(density_char(scaled.get_pixel(x, y).0[0]));
        }
        out.push_str("|\n");
    }
    out.push_str(&border);
    Ok(out)
}

fn density_char(luma: u8) -> char {
    let bucket = usize::from(luma) * DENSITY_RAMP.len() / 256;
    DENSITY_RAMP[bucket]
}

/// Character-cell size preserving the source aspect ratio within `bounds`.
fn fit_cells(src_width: u32, src_height: u32, bounds: ArtBounds) -> (u32, u32) {
    let max_width = bounds.max_width.max(1);
    let max_height = bounds.max_height.max(1);
    let src_width = f64::from(src_width.max(1));
    let src_height = f64::from(src_height.max(1));
    let ratio = src_height / src_width * CELL_ASPECT;

    let mut width = f64::from(max_width).min(src_width);
    let mut height = (width * ratio).round().max(1.0);
    if height > f64::from(max_height) {
        height = f64::from(max_height);
        width = (height / ratio).round().clamp(1.0, f64::from(max_width));
    }
    (width as u32, height as u32)
}
