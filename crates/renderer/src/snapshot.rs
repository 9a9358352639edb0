//! Still-frame export through the CPU mirror of the fragment programs.

use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec2;
use image::{Rgba, RgbaImage};

use crate::effects::{self, FrameInputs};
use crate::types::EffectParams;

/// Renders one frame at `time` seconds. Row 0 of the image is the top of the
/// surface, matching what the GPU path presents.
pub fn render(params: &EffectParams, time: f32, width: u32, height: u32) -> RgbaImage {
    let inputs = FrameInputs {
        time,
        resolution: Vec2::new(width as f32, height as f32),
    };
    RgbaImage::from_fn(width, height, |x, row| {
        let frag_coord = Vec2::new(x as f32 + 0.5, (height - row) as f32 - 0.5);
        let color = effects::shade(params, frag_coord, &inputs);
        let [r, g, b] = color.to_array().map(to_channel);
        Rgba([r, g, b, 255])
    })
}

/// Renders and writes a PNG, creating parent directories as needed.
pub fn export_png(
    params: &EffectParams,
    time: f32,
    width: u32,
    height: u32,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let image = render(params, time, width, height);
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
    tracing::info!(path = %path.display(), width, height, time, "snapshot written");
    Ok(())
}

fn to_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
